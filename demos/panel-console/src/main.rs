//! Console tail for a PufferPanel server.
//!
//! Run with:
//!
//! ```text
//! PUFFER_URL=https://panel.example.com PUFFER_EMAIL=me@example.com \
//! PUFFER_PASSWORD=... PUFFER_SERVER_ID=a1b2c3 cargo run -p panel-console
//! ```
//!
//! Without `PUFFER_SERVER_ID` it only lists servers and templates.

use anyhow::{Context as _, Result};
use futures::StreamExt;
use puffer_client::PanelClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let client = PanelClient::from_env().context("Failed to read PUFFER_* configuration")?;
    client.login().await.context("Login failed")?;
    let me = client.who_am_i().await?;
    tracing::info!(user = me.username(), "Logged in");

    let servers = client.servers().await?;
    for server in &servers {
        println!("server   {:<12} {}", server.id(), server.name());
    }
    for template in client.templates().await? {
        println!("template {:<12} {}", template.name(), template.display());
    }

    let Ok(server_id) = std::env::var("PUFFER_SERVER_ID") else {
        tracing::info!("PUFFER_SERVER_ID not set; nothing to tail");
        return Ok(());
    };
    let mut server = servers
        .into_iter()
        .find(|s| s.id() == server_id)
        .with_context(|| format!("No server with id {server_id}"))?;

    server.connect().await?;
    for line in server.replay_logs().await? {
        print!("{line}");
    }

    let stats = server.stats().await?;
    tracing::info!(
        memory_mib = stats.memory / 1_048_576.0,
        cpu = stats.cpu,
        "Resource usage"
    );

    let mut log = server.channel()?.events("log");
    loop {
        tokio::select! {
            frame = log.next() => match frame {
                Some(frame) => println!("{}", frame.log_text()),
                None => {
                    tracing::warn!("Daemon closed the connection");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    drop(log);

    server.disconnect().await?;
    Ok(())
}
