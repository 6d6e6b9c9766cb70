//! Landing Track CLI
//!
//! Passive visitor capture for landing pages.

use clap::{Parser, Subcommand, ValueEnum};
use landing_track::{
    collector::{load_script, CollectorConfig, ElementSnapshot, PageCollector, ScriptPlayer},
    config::Config,
    core::{classify, FieldKind, HostFingerprintSource},
    transparency::create_shared_log_with_persistence,
    DryRunTransport, SessionTransport, TrackingService, PRIVACY_DECLARATION, VERSION,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "gateway")]
use landing_track::{GatewayClient, GatewayConfig};

#[derive(Parser)]
#[command(name = "landing-track")]
#[command(version = VERSION)]
#[command(about = "Passive visitor capture for landing pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted page interaction through a tracking service
    Replay {
        /// JSON Lines script of click/type/clear/wait steps
        script: PathBuf,

        /// Log session records instead of posting them
        #[arg(long)]
        dry_run: bool,

        /// Collection endpoint (overrides config and environment)
        #[arg(long)]
        endpoint: Option<String>,

        /// Delay between typed characters in milliseconds
        #[arg(long, default_value = "30")]
        keystroke_delay: u64,
    },

    /// Show how an element would be classified
    Classify {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        id: Option<String>,

        /// The element's `type` attribute
        #[arg(long = "type")]
        input_type: Option<String>,
    },

    /// Check a value against the email or phone rules
    Validate {
        kind: KindArg,
        value: String,
    },

    /// Run the collection endpoint
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, default_value = "8787")]
        port: u16,
    },

    /// Show cumulative statistics
    Status,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Email,
    Phone,
}

impl From<KindArg> for FieldKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Email => FieldKind::Email,
            KindArg::Phone => FieldKind::Phone,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            script,
            dry_run,
            endpoint,
            keystroke_delay,
        } => cmd_replay(script, dry_run, endpoint, keystroke_delay).await,
        Commands::Classify {
            name,
            id,
            input_type,
        } => {
            cmd_classify(name, id, input_type);
            Ok(())
        }
        Commands::Validate { kind, value } => {
            cmd_validate(kind.into(), &value);
            Ok(())
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => cmd_serve(port).await,
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            Ok(())
        }
        Commands::Config { save } => cmd_config(save),
    }
}

async fn cmd_replay(
    script: PathBuf,
    dry_run: bool,
    endpoint: Option<String>,
    keystroke_delay: u64,
) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_default();
    if let Some(endpoint) = endpoint {
        config.endpoint_url = endpoint;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let steps = load_script(&script)?;
    let player =
        ScriptPlayer::new(steps).with_keystroke_delay(Duration::from_millis(keystroke_delay));

    println!("Landing Track v{VERSION}");
    println!();
    println!("Replaying {} step(s) from {:?}", player.steps().len(), script);

    if dry_run {
        println!("  Endpoint: none (dry run)");
        return replay_with(DryRunTransport, &config, &player).await;
    }

    #[cfg(feature = "gateway")]
    {
        let client = GatewayClient::new(GatewayConfig::from_config(&config))?;
        println!("  Endpoint: {}", client.endpoint_url());
        return replay_with(client, &config, &player).await;
    }

    #[cfg(not(feature = "gateway"))]
    {
        eprintln!("Warning: built without the gateway feature, falling back to a dry run");
        return replay_with(DryRunTransport, &config, &player).await;
    }
}

async fn replay_with<T: SessionTransport>(
    transport: T,
    config: &Config,
    player: &ScriptPlayer,
) -> anyhow::Result<()> {
    let log = create_shared_log_with_persistence(config.transparency_path());

    let mut collector = PageCollector::new(CollectorConfig::default());
    collector.start()?;
    let events = collector.take_receiver()?;
    let sender = collector.sender();

    let mut service =
        TrackingService::new(config.tracker_config(), transport, HostFingerprintSource)
            .with_log(log.clone());
    service.start(events)?;
    println!("  Session: {}", service.session_id());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let interrupted = CancellationToken::new();
    let token = interrupted.clone();
    ctrlc::set_handler(move || token.cancel())?;

    tokio::select! {
        stats = player.play(&sender) => {
            tracing::info!(
                clicks = stats.clicks,
                keystrokes = stats.keystrokes,
                unfocused = stats.unfocused_keystrokes,
                "script finished"
            );
        }
        _ = interrupted.cancelled() => {
            println!();
            println!("Interrupted, stopping...");
        }
    }

    collector.stop();
    service.stop().await;

    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save transparency stats: {e}");
    }

    println!();
    println!("Final session record:");
    println!("{}", serde_json::to_string_pretty(&service.session())?);
    println!();
    println!("{}", log.summary());
    Ok(())
}

fn cmd_classify(name: Option<String>, id: Option<String>, input_type: Option<String>) {
    let mut element = ElementSnapshot::new(0);
    element.name = name;
    element.id = id;
    element.input_type = input_type;

    match classify(&element) {
        None => println!("unidentifiable (no name, id or type)"),
        Some(classification) => {
            let tags: Vec<String> = classification.tags().iter().map(|t| t.to_string()).collect();
            println!("{}", tags.join(", "));
        }
    }
}

fn cmd_validate(kind: FieldKind, value: &str) {
    if kind.validate(value) {
        println!("valid {kind}");
    } else {
        println!("invalid {kind}");
        std::process::exit(1);
    }
}

#[cfg(feature = "server")]
async fn cmd_serve(port: u16) -> anyhow::Result<()> {
    use landing_track::server::{run, ServerConfig};

    let (addr, shutdown_tx) = run(ServerConfig::new(port)).await?;
    println!("Collection endpoint on http://{addr}/track");
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(());
    Ok(())
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Landing Track Status");
    println!("====================");
    println!();

    println!("Configuration:");
    println!("  Endpoint: {}", config.endpoint_url);
    println!("  Debounce: {}ms", config.debounce.as_millis());
    println!(
        "  Fingerprint timeout: {}ms",
        config.fingerprint_timeout.as_millis()
    );
    println!("  Dedupe watchers: {}", config.dedupe_watchers);
    println!();

    // Load and show transparency stats if available
    let stats_path = config.transparency_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                if let Some(clicks) = stats.get("clicks_observed") {
                    println!("  Clicks observed: {clicks}");
                }
                if let Some(accepted) = stats.get("values_accepted") {
                    println!("  Values accepted: {accepted}");
                }
                if let Some(sent) = stats.get("submissions_sent") {
                    println!("  Submissions sent: {sent}");
                }
                if let Some(failed) = stats.get("submissions_failed") {
                    println!("  Submissions failed: {failed}");
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config(save: bool) -> anyhow::Result<()> {
    // Never overwrite a file that failed to parse.
    let config = if save {
        Config::load()?
    } else {
        Config::load().unwrap_or_default()
    };

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );

    if save {
        config.save()?;
        println!();
        println!("Saved to {:?}", Config::config_path());
    }
    Ok(())
}
