use clap::Parser;
use client::ApiClient;
use cmd::command;
use cmd::command::Cfg;
use cmd::command::Commands;
use cmd::config::Config;
use cmd::config::LogLevel;
use cmd::error::Result;
use cmd::output;
use cmd::output::Format;
use tracing::debug;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(propagate_version = true)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    cfg: Cfg,
    /// Overrides the level from the config
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum, default_value = "table")]
    format: Format,
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut builder = config::Config::builder();
    if let Some(path) = &args.cfg.config {
        builder = builder.add_source(config::File::from(path.clone()));
    }
    let cfg: Config = builder
        .add_source(config::Environment::with_prefix("AMPL").separator("__"))
        .build()?
        .try_deserialize()?;
    let cfg: common::config::Config = cfg.try_into()?;

    let level = args.log_level.map(Into::into).unwrap_or(cfg.log.level);
    let subscriber = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    debug!("host {}", cfg.host);

    let api = ApiClient::new(cfg)?;
    let out = command::run(&api, &args.command).await?;
    output::write(&mut std::io::stdout().lock(), &out, args.format)?;

    Ok(())
}
