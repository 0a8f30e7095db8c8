use busrt::broker::{Broker, ServerConfig};
use datatracker::AppConfig;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::load_or_default(AppConfig::default_path())?;
    let address = config
        .bus_address
        .unwrap_or_else(|| "127.0.0.1:7777".to_string());

    let mut broker = Broker::new();
    let server_config = ServerConfig::default().buf_ttl(std::time::Duration::from_millis(100));
    broker.spawn_tcp_server(&address, server_config).await?;

    tracing::info!(bus = %address, "broker started");

    signal::ctrl_c().await?;
    tracing::info!("broker shutting down");

    Ok(())
}
