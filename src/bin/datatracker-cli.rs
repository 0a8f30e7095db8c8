use async_trait::async_trait;
use busrt::client::AsyncClient;
use busrt::ipc::{Client, Config};
use busrt::rpc::{Rpc, RpcClient, RpcEvent, RpcHandlers, RpcResult};
use busrt::QoS;
use datatracker::commands::Command;
use datatracker::format::{bytes_to_human, speed_to_human};
use datatracker::ledger::Ledger;
use datatracker::telemetry::{NetworkInfo, UpdatePayload};
use datatracker::AppConfig;
use serde_json::Value;
use tokio::signal;

struct CliHandlers {
    update_topic: String,
    identity_topic: String,
}

#[async_trait]
impl RpcHandlers for CliHandlers {
    async fn handle_call(&self, _event: RpcEvent) -> RpcResult {
        Ok(None)
    }
    async fn handle_notification(&self, _event: RpcEvent) {}
    async fn handle_frame(&self, frame: busrt::Frame) {
        let Some(topic) = frame.topic() else {
            return;
        };
        if topic == self.update_topic {
            if let Ok(update) = serde_json::from_slice::<UpdatePayload>(frame.payload()) {
                println!(
                    "down {:>12}  up {:>12}  total {:>12}",
                    speed_to_human(update.download_speed_bytes_per_sec),
                    speed_to_human(update.upload_speed_bytes_per_sec),
                    speed_to_human(update.speed_bytes_per_sec)
                );
            }
        } else if topic == self.identity_topic {
            if let Ok(info) = serde_json::from_slice::<NetworkInfo>(frame.payload()) {
                print_info(&info);
            }
        }
    }
}

fn print_ledger(ledger: &Ledger) {
    if ledger.is_empty() {
        println!("No usage recorded yet");
        return;
    }
    for (day, entry) in ledger.iter().rev() {
        println!(
            "{day}  total {:>10}  down {:>10}  up {:>10}",
            bytes_to_human(entry.rx_tx_bytes),
            bytes_to_human(entry.rx_bytes),
            bytes_to_human(entry.tx_bytes)
        );
        for (name, usage) in &entry.networks {
            println!(
                "    {name} ({})  {}",
                usage.interface_label,
                bytes_to_human(usage.rx_tx_bytes)
            );
        }
    }
}

fn print_info(info: &NetworkInfo) {
    println!("Interface: {}", info.interface);
    println!("Network:   {}", info.network_name);
    println!("Signal:    {}", info.signal_strength);
    println!("Link:      {}", info.link_speed);
    println!("Uptime:    {}", info.uptime);
}

fn usage() -> ! {
    println!(
        "Usage: datatracker-cli <daily|info|reset|path|watch>\n\
         daily   Print recorded usage per day and network\n\
         info    Print the active network\n\
         reset   Erase all recorded usage\n\
         path    Print where usage is stored\n\
         watch   Stream live speed and network changes"
    );
    std::process::exit(0);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let action = std::env::args().nth(1).unwrap_or_else(|| usage());
    let command = match action.as_str() {
        "daily" => Some(Command::GetDailyData),
        "info" => Some(Command::GetNetworkInfo),
        "reset" => Some(Command::ResetData),
        "path" => Some(Command::GetStorePath),
        "watch" => None,
        _ => usage(),
    };

    let config = AppConfig::load_or_default(AppConfig::default_path())?;
    let address = config
        .bus_address
        .clone()
        .unwrap_or_else(|| "127.0.0.1:7777".to_string());
    let name = format!("datatracker.cli.{}", std::process::id());

    let bus_config = Config::new(&address, &name);
    let mut client = Client::connect(&bus_config).await?;

    if command.is_none() {
        client.subscribe(&config.update_topic, QoS::Processed).await?;
        client.subscribe(&config.identity_topic, QoS::Processed).await?;
    }

    let handlers = CliHandlers {
        update_topic: config.update_topic.clone(),
        identity_topic: config.identity_topic.clone(),
    };
    let rpc_client = RpcClient::new(client, handlers);

    let Some(command) = command else {
        println!("Listening for updates. Press Ctrl-C to exit.");
        signal::ctrl_c().await?;
        return Ok(());
    };

    let response = rpc_client
        .call(
            &config.bus_client_name,
            command.method(),
            Vec::new().into(),
            QoS::Processed,
        )
        .await?;
    let reply: Value = serde_json::from_slice(response.payload())?;

    match command {
        Command::GetDailyData => print_ledger(&serde_json::from_value(reply)?),
        Command::GetNetworkInfo => match serde_json::from_value::<Option<NetworkInfo>>(reply)? {
            Some(info) => print_info(&info),
            None => println!("No network connected"),
        },
        Command::ResetData => {
            if reply.as_bool().unwrap_or(false) {
                println!("Usage data reset");
            } else {
                println!("Reset failed, see tracker log");
            }
        }
        Command::GetStorePath => println!("{reply:#}"),
    }

    Ok(())
}
