use anyhow::{Context, Result};
use clap::Parser;
use motioncam::{CameraDevice, MotioncamApp, MotioncamConfig, Scene, SyntheticCamera};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "motioncam")]
#[command(about = "Motion-triggered camera recorder with still-image notifications")]
#[command(version)]
#[command(long_about = "Watches a camera feed for motion, records debounced video segments \
while motion lasts and mails the operator a still image once per motion episode.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "motioncam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (trace level)
    #[arg(short, long, help = "Enable verbose trace level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to this file
    #[arg(long, value_name = "PATH", help = "Write logs to a file in addition to stdout")]
    log_file: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the system")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Use the software camera instead of hardware
    #[arg(long, help = "Run against a synthetic camera with periodic motion")]
    synthetic: bool,

    /// Enable keyboard control
    #[arg(long, help = "Enable keyboard control: a=arm, d=disarm, s=status, q=quit")]
    keyboard: bool,

    /// Do not arm on startup
    #[arg(long, help = "Start disarmed regardless of system.start_armed")]
    start_disarmed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("# Motioncam configuration file");
        println!("# Every option with its default value");
        println!();
        println!("{}", MotioncamConfig::default().to_toml()?);
        return Ok(());
    }

    let config = MotioncamConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    let log_file = args.log_file.clone().or_else(|| config.system.log_file());
    let log_guard = init_logging(&args, log_file)?;

    info!("Starting motioncam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

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
                std::process::exit(1);
            }
        }
    }

    let camera = if args.synthetic {
        synthetic_camera(&config)
    } else {
        hardware_camera(&config)?
    };

    let mut app = MotioncamApp::new(config, camera).map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;
    app.set_keyboard_enabled(args.keyboard);
    if args.start_disarmed {
        app.set_start_armed(false);
    }

    app.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    if let Err(e) = app.start().await {
        error!("Failed to start system: {}", e);
        let _ = app.shutdown().await;
        return Err(e.into());
    }

    let exit_code = app.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Motioncam exited with code: {}", exit_code);
    drop(log_guard);
    std::process::exit(exit_code);
}

/// A moving target for three seconds out of every twenty
fn synthetic_camera(config: &MotioncamConfig) -> Arc<dyn CameraDevice> {
    let fps = config.camera.fps.max(1) as u64;
    info!("Using synthetic camera");
    Arc::new(
        SyntheticCamera::builder()
            .scene(Scene::Bursts {
                every: fps * 20,
                length: fps * 3,
            })
            .fps(config.camera.fps)
            .build(),
    )
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn hardware_camera(config: &MotioncamConfig) -> Result<Arc<dyn CameraDevice>> {
    let camera = motioncam::GstCamera::new(config.camera.device.clone())?;
    Ok(Arc::new(camera))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn hardware_camera(_config: &MotioncamConfig) -> Result<Arc<dyn CameraDevice>> {
    anyhow::bail!("built without camera support; run with --synthetic")
}

fn init_logging(args: &Args, log_file: Option<PathBuf>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "trace"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("motioncam={}", log_level)));

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
            .with_thread_names(true)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_names(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path {}", path.display()))?;
            std::fs::create_dir_all(&directory)
                .with_context(|| format!("Failed to create {}", directory.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}
