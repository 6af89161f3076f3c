use anyhow::Result;
use clap::Parser;
use sentrycam::{SentrycamConfig, SentrycamContext};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sentrycam")]
#[command(about = "Security-camera monitoring core with object detection and alerting")]
#[command(version)]
#[command(long_about = "Runs the sentrycam detection-and-alert pipeline: camera \
lifecycle, periodic frame capture, submission to a remote (or simulated) object \
detection backend, and the rolling alert log consumed by the dashboard.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sentrycam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Start every configured camera immediately
    #[arg(long, help = "Start all configured cameras on startup")]
    autostart: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting sentrycam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match SentrycamConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        // load_from_file already validated; reaching this point means it passed
        println!("✓ Configuration is valid");
        return Ok(());
    }

    let context = SentrycamContext::new(config);
    context.init();

    if args.autostart {
        for camera in context.cameras() {
            if let Err(e) = context.start_camera(&camera.id).await {
                error!("Failed to start camera {}: {}", camera.id, e);
            }
        }
    }

    info!("sentrycam running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown requested");
    context.dispose();
    info!("sentrycam stopped");

    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sentrycam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

fn print_default_config() {
    match toml::to_string_pretty(&SentrycamConfig::default()) {
        Ok(toml) => println!("{}", toml),
        Err(e) => eprintln!("Failed to serialize default configuration: {}", e),
    }
}
