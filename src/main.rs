use anyhow::Result;
use clap::Parser;
use sandwich_server::{BootstrapController, DirectoryAssets, ExitStatus, ServerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "sandwich-server")]
#[command(about = "Web backend with phased bootstrap and bounded graceful shutdown")]
#[command(version)]
#[command(long_about = "Starts the HTTP listener immediately, initializes the database, \
business routes and client assets in the background, and keeps answering health probes \
even when that initialization fails. SIGTERM/SIGINT close the listener and exit within \
a bounded time window.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "sandwich.toml", help = "Path to TOML configuration file")]
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
    #[arg(long, help = "Validate configuration file and exit without starting the server")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let guard = init_logging(&args)?;

    info!("Starting sandwich-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match ServerConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                drop(guard);
                std::process::exit(1);
            }
        }
    }

    let assets = Arc::new(DirectoryAssets::new(&config.assets));
    let controller = BootstrapController::builder(config)
        .assets(assets)
        .build()
        .map_err(|e| {
            error!("Failed to create bootstrap controller: {}", e);
            e
        })?;
    let controller = Arc::new(controller);

    controller.fault_handler().install_panic_hook();

    let status = match controller.run().await {
        Ok(status) => status,
        Err(e) => {
            error!("Lifecycle error: {}", e);
            ExitStatus::Forced
        }
    };

    info!("sandwich-server exited with code: {}", status.code());

    // Flush buffered log lines before the process goes away
    drop(guard);
    std::process::exit(status.code());
}

fn init_logging(args: &Args) -> Result<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sandwich_server={}", log_level)));

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# sandwich-server configuration file");
    println!("# PORT, NODE_ENV and VERCEL override the values below");
    println!();
    println!("{}", toml::to_string_pretty(&ServerConfig::default())?);
    Ok(())
}
