use anyhow::{bail, Context, Result};
use datatracker::{logging, simulator, AppConfig, Service};

#[derive(Debug)]
struct Cli {
    config_path: String,
    replay_path: Option<String>,
}

impl Cli {
    fn parse() -> Result<Self> {
        let mut args = std::env::args().skip(1);
        let mut config_path: Option<String> = None;
        let mut replay_path: Option<String> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                    config_path = Some(value);
                }
                "--replay" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("--replay requires a path"))?;
                    replay_path = Some(value);
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: datatracker [--config <path>] [--replay <trace>]\n\
                         --config <path>   Path to TOML configuration (default: config/datatracker.toml)\n\
                         --replay <path>   Feed a recorded counter trace through the ledger instead of the OS"
                    );
                    std::process::exit(0);
                }
                other => {
                    if config_path.is_none() {
                        config_path = Some(other.to_string());
                    } else {
                        bail!("unknown argument '{other}'");
                    }
                }
            }
        }

        Ok(Self {
            config_path: config_path.unwrap_or_else(|| AppConfig::default_path().into()),
            replay_path,
        })
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse()?;

    let config = AppConfig::load_or_default(&cli.config_path)
        .with_context(|| format!("unable to load configuration from {}", cli.config_path))?;

    let _log_guard = logging::init(&config)?;

    if let Some(trace) = cli.replay_path {
        tracing::info!(trace = %trace, data_file = %config.data_file().display(), "replaying counter trace");
        simulator::replay_trace(trace, &config).await.map(|_| ())
    } else {
        Service::new(config).run().await
    }
}
