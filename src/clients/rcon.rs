//! Minimal RCON client (the Source engine protocol as spoken by Minecraft).
//!
//! Every packet is `length | request id | type | body | 0x00 0x00`, all
//! integers little-endian, where `length` counts the bytes after itself.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const PACKET_LOGIN: i32 = 3;
const PACKET_COMMAND: i32 = 2;
const PACKET_AUTH_RESPONSE: i32 = 2;
const PACKET_RESPONSE: i32 = 0;

/// id + type + the two trailing nul bytes
const HEADER_LEN: i32 = 10;
/// Largest payload Minecraft sends in a single response packet.
const MAX_RESPONSE_BODY: i32 = 4096;
/// Largest command body Minecraft accepts.
pub const MAX_COMMAND_LEN: usize = 1446;

#[derive(Debug, Error)]
pub enum RconError {
    #[error("Connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication rejected")]
    AuthRejected,

    #[error("Command too long ({0} bytes)")]
    CommandTooLong(usize),

    #[error("Malformed packet: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body = self.body.as_bytes();
        let length = HEADER_LEN + i32::try_from(body.len()).unwrap_or(i32::MAX - HEADER_LEN);

        let mut buf = Vec::with_capacity(body.len() + 14);
        buf.extend_from_slice(&length.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    /// Reads one packet from `reader`.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, RconError>
    where
        R: AsyncRead + Unpin,
    {
        let length = reader.read_i32_le().await?;
        if !(HEADER_LEN..=HEADER_LEN + MAX_RESPONSE_BODY).contains(&length) {
            return Err(RconError::Malformed(format!("length {length}")));
        }

        let id = reader.read_i32_le().await?;
        let kind = reader.read_i32_le().await?;

        // length was range-checked above
        let body_len = usize::try_from(length - HEADER_LEN).unwrap_or_default();
        let mut body = vec![0u8; body_len + 2];
        reader.read_exact(&mut body).await?;

        if body[body_len..] != [0, 0] {
            return Err(RconError::Malformed("missing terminator".to_string()));
        }
        body.truncate(body_len);

        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// An authenticated RCON connection.
#[derive(Debug)]
pub struct RconClient {
    stream: TcpStream,
    next_id: i32,
    timeout: Duration,
}

impl RconClient {
    /// Connects and logs in.
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, RconError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| RconError::Timeout(timeout))??;

        let mut client = Self {
            stream,
            next_id: 1,
            timeout,
        };
        client.authenticate(password).await?;

        debug!("RCON session established with {host}:{port}");
        Ok(client)
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        let id = self.take_id();
        self.write(&Packet {
            id,
            kind: PACKET_LOGIN,
            body: password.to_string(),
        })
        .await?;

        // Source servers send an empty RESPONSE_VALUE ahead of the auth
        // response; Minecraft does not. Skip it when present.
        loop {
            let packet = self.read().await?;
            if packet.kind != PACKET_AUTH_RESPONSE {
                continue;
            }
            // id -1 means a wrong password
            if packet.id != id {
                return Err(RconError::AuthRejected);
            }
            return Ok(());
        }
    }

    /// Sends a single command and returns the server's textual response.
    ///
    /// Minecraft splits long responses over several packets and never marks
    /// the last one, so the command is followed by an empty packet of an
    /// unknown type. The server answers it only after the whole response,
    /// which tells us where the response ends.
    pub async fn send_command(&mut self, command: &str) -> Result<String, RconError> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(RconError::CommandTooLong(command.len()));
        }

        let id = self.take_id();
        self.write(&Packet {
            id,
            kind: PACKET_COMMAND,
            body: command.to_string(),
        })
        .await?;

        let sentinel = self.take_id();
        self.write(&Packet {
            id: sentinel,
            kind: PACKET_RESPONSE,
            body: String::new(),
        })
        .await?;

        let mut response = String::new();
        loop {
            let packet = self.read().await?;

            if packet.id == sentinel {
                return Ok(response);
            }
            if packet.id != id {
                // Source servers answer the end marker twice.
                debug!("Discarding stale RCON packet id={}", packet.id);
                continue;
            }
            if packet.kind != PACKET_RESPONSE {
                return Err(RconError::Malformed(format!(
                    "unexpected packet id={} type={}",
                    packet.id, packet.kind
                )));
            }

            response.push_str(&packet.body);
        }
    }

    const fn take_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = if self.next_id == i32::MAX { 1 } else { self.next_id + 1 };
        id
    }

    async fn write(&mut self, packet: &Packet) -> Result<(), RconError> {
        let bytes = packet.encode();
        tokio::time::timeout(self.timeout, self.stream.write_all(&bytes))
            .await
            .map_err(|_| RconError::Timeout(self.timeout))??;
        Ok(())
    }

    async fn read(&mut self) -> Result<Packet, RconError> {
        tokio::time::timeout(self.timeout, Packet::read_from(&mut self.stream))
            .await
            .map_err(|_| RconError::Timeout(self.timeout))?
    }
}
