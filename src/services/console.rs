//! Remote console for a stored game server.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::clients::rcon::{MAX_COMMAND_LEN, RconClient};
use crate::db::Server;

/// A server record plus its lazily established RCON session.
///
/// Failures never propagate: a command that cannot be delivered yields an
/// empty response and drops the session, so the next command dials again.
/// Overlong commands are refused before touching the session.
pub struct ServerConsole {
    server: Server,
    timeout: Duration,
    connection: Mutex<Option<RconClient>>,
}

impl ServerConsole {
    #[must_use]
    pub fn new(server: Server, timeout: Duration) -> Self {
        Self {
            server,
            timeout,
            connection: Mutex::new(None),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Sends `command` and returns the response, or an empty string when the
    /// server could not be reached or the command failed.
    pub async fn cmd(&self, command: &str) -> String {
        if command.len() > MAX_COMMAND_LEN {
            warn!(
                "Refusing {} byte command for {}:{}, the limit is {MAX_COMMAND_LEN}",
                command.len(),
                self.server.host,
                self.server.port
            );
            metrics::counter!("sorbet_rcon_commands_total", "outcome" => "rejected").increment(1);
            return String::new();
        }

        let mut connection = self.connection.lock().await;

        if connection.is_none() {
            match RconClient::connect(
                &self.server.host,
                self.server.port,
                &self.server.password,
                self.timeout,
            )
            .await
            {
                Ok(client) => *connection = Some(client),
                Err(e) => {
                    warn!(
                        "Error connecting to {}:{}: {e}",
                        self.server.host, self.server.port
                    );
                    metrics::counter!("sorbet_rcon_commands_total", "outcome" => "unreachable")
                        .increment(1);
                    return String::new();
                }
            }
        }

        let Some(client) = connection.as_mut() else {
            return String::new();
        };

        match client.send_command(command).await {
            Ok(response) => {
                metrics::counter!("sorbet_rcon_commands_total", "outcome" => "success")
                    .increment(1);
                response
            }
            Err(e) => {
                warn!(
                    "Error sending command to {}:{}: {e}",
                    self.server.host, self.server.port
                );
                metrics::counter!("sorbet_rcon_commands_total", "outcome" => "failure")
                    .increment(1);
                *connection = None;
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::rcon::tests::{spawn_fake_server, spawn_flaky_server};

    fn server(port: u16, password: &str) -> Server {
        Server {
            id: 1,
            host: "127.0.0.1".to_string(),
            port,
            password: password.to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn connects_lazily_and_reuses_session() {
        let port = spawn_fake_server("pw").await;
        let console = ServerConsole::new(server(port, "pw"), Duration::from_secs(5));

        assert!(!console.is_connected().await);
        assert_eq!(console.cmd("time query daytime").await, "echo: time query daytime");
        assert!(console.is_connected().await);
        assert_eq!(console.cmd("list").await, "echo: list");
    }

    #[tokio::test]
    async fn unreachable_server_yields_empty_response() {
        let port = closed_port().await;
        let console = ServerConsole::new(server(port, "pw"), Duration::from_secs(2));

        assert_eq!(console.cmd("list").await, "");
        assert!(!console.is_connected().await);
    }

    #[tokio::test]
    async fn rejected_password_yields_empty_response() {
        let port = spawn_fake_server("pw").await;
        let console = ServerConsole::new(server(port, "wrong"), Duration::from_secs(5));

        assert_eq!(console.cmd("list").await, "");
        assert!(!console.is_connected().await);
    }

    #[tokio::test]
    async fn overlong_command_keeps_the_session() {
        let port = spawn_fake_server("pw").await;
        let console = ServerConsole::new(server(port, "pw"), Duration::from_secs(5));

        assert_eq!(console.cmd("list").await, "echo: list");
        assert_eq!(console.cmd(&"x".repeat(MAX_COMMAND_LEN + 1)).await, "");
        assert!(console.is_connected().await);
        assert_eq!(console.cmd("list").await, "echo: list");
    }

    #[tokio::test]
    async fn overlong_command_does_not_dial() {
        let port = closed_port().await;
        let console = ServerConsole::new(server(port, "pw"), Duration::from_secs(2));

        assert_eq!(console.cmd(&"x".repeat(5000)).await, "");
        assert!(!console.is_connected().await);
    }

    #[tokio::test]
    async fn failed_send_drops_the_session() {
        let port = spawn_flaky_server("pw").await;
        let console = ServerConsole::new(server(port, "pw"), Duration::from_secs(5));

        // The first connection hangs up instead of answering.
        assert_eq!(console.cmd("list").await, "");
        assert!(!console.is_connected().await);

        // Next command dials again.
        assert_eq!(console.cmd("list").await, "echo: list");
        assert!(console.is_connected().await);
    }
}
