//! Game server command handlers

use std::time::Duration;

use crate::config::Config;
use crate::db::Store;
use crate::services::ServerConsole;

async fn open_store(config: &Config) -> anyhow::Result<Store> {
    Store::connect(&config.database, config.general.debug).await
}

pub async fn cmd_server_list(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let servers = store.list_servers().await?;

    if servers.is_empty() {
        println!("No servers stored.");
        println!();
        println!("Add one with: sorbet servers add <host> --password <password>");
        return Ok(());
    }

    println!("Servers ({} total)", servers.len());
    println!("{:-<50}", "");

    for server in servers {
        println!("  [{}] {}:{}", server.id, server.host, server.port);
    }

    Ok(())
}

pub async fn cmd_server_add(
    config: &Config,
    host: &str,
    port: u16,
    password: &str,
) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    let server = store.add_server(host, port, password).await?;

    println!("Added server {} ({}:{})", server.id, server.host, server.port);
    Ok(())
}

pub async fn cmd_server_remove(config: &Config, id: i32) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    if store.remove_server(id).await? {
        println!("Removed server {id}");
    } else {
        println!("Server {id} not found");
    }

    Ok(())
}

/// Prints the response; prints nothing when the server could not be reached.
pub async fn cmd_server_command(config: &Config, id: i32, command: &str) -> anyhow::Result<()> {
    let store = open_store(config).await?;

    let Some(server) = store.get_server(id).await? else {
        anyhow::bail!("Server {id} not found");
    };

    let console = ServerConsole::new(server, Duration::from_secs(config.rcon.timeout_seconds));
    let response = console.cmd(command).await;

    if !response.is_empty() {
        println!("{response}");
    }

    Ok(())
}
