//! raffle: referral giveaway server
//!
//! Usage:
//!   raffle                          → serve with defaults (or ./raffle.toml)
//!   raffle serve --port 8080        → serve with overrides
//!   raffle stats --data db.json     → print admin stats from a store file
//!   raffle prune                    → drop expired rate-limit windows
//!   raffle version                  → show version

use clap::{Args, Parser, Subcommand};
use raffle_core::{AuthMode, BindMode, RaffleConfig};
use raffle_engine::GiveawayService;
use raffle_gateway::start_gateway;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "raffle.toml";

#[derive(Parser)]
#[command(
    name = "raffle",
    about = "Referral giveaways with weighted winner draws",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Store file (overrides config)
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Print admin statistics for a store file
    Stats,
    /// Drop expired rate-limit windows from a store file
    Prune,
    /// Print the effective configuration as TOML
    Config,
    /// Show version
    Version,
}

#[derive(Args, Default)]
struct ServeArgs {
    #[arg(short, long)]
    port: Option<u16>,
    /// Bind mode: lan or loopback
    #[arg(short, long)]
    bind: Option<String>,
    /// Admin token (or set RAFFLE_ADMIN_TOKEN)
    #[arg(short, long)]
    token: Option<String>,
    /// Disable admin authentication
    #[arg(long, default_value_t = false)]
    no_auth: bool,
    /// Origin used in referral links
    #[arg(long)]
    base_url: Option<String>,
    /// Take client IPs from X-Forwarded-For
    #[arg(long, default_value_t = false)]
    trust_forwarded_for: bool,
    /// Emit JSON log lines
    #[arg(long, default_value_t = false)]
    log_json: bool,
    /// Write logs to a file (in addition to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("raffle v{}", env!("CARGO_PKG_VERSION"));
        }

        Some(Commands::Config) => {
            let config = load_config(cli.config.as_deref(), cli.data);
            print!("{}", config.to_toml());
        }

        Some(Commands::Stats) => {
            let _guard = init_tracing(false, None)?;
            let config = load_config(cli.config.as_deref(), cli.data);
            let service = GiveawayService::open(config).await?;
            let stats = service.admin_stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Some(Commands::Prune) => {
            let _guard = init_tracing(false, None)?;
            let config = load_config(cli.config.as_deref(), cli.data);
            let service = GiveawayService::open(config).await?;
            let removed = service.prune_rate_limits().await?;
            println!("Removed {} expired rate-limit windows", removed);
        }

        Some(Commands::Serve(args)) => {
            serve(cli.config.as_deref(), cli.data, args).await?;
        }

        // No subcommand = serve with defaults
        None => {
            serve(cli.config.as_deref(), cli.data, ServeArgs::default()).await?;
        }
    }

    Ok(())
}

async fn serve(config_path: Option<&Path>, data: Option<PathBuf>, args: ServeArgs) -> anyhow::Result<()> {
    let _guard = init_tracing(args.log_json, args.log_file.as_deref())?;

    let mut config = load_config(config_path, data);
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        config.server.bind = BindMode::parse(bind);
    }
    if let Some(url) = args.base_url {
        config.server.public_base_url = url;
    }
    if args.trust_forwarded_for {
        config.server.trust_forwarded_for = true;
    }
    if args.no_auth {
        config.auth.mode = AuthMode::None;
        config.auth.token = None;
    } else if args.token.is_some() {
        config.auth.token = args.token;
    }

    start_gateway(config).await
}

fn load_config(path: Option<&Path>, data: Option<PathBuf>) -> RaffleConfig {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG));
    let mut config = RaffleConfig::load(path).with_env_token(std::env::var("RAFFLE_ADMIN_TOKEN").ok());
    if let Some(data) = data {
        config.store.path = data;
    }
    config
}

fn init_tracing(json: bool, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "raffle=info,raffle_gateway=info,raffle_engine=info,raffle_store=info,tower_http=info".into());

    let (json_layer, text_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer()))
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (
                Some(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
