use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use scancam::{
    CameraHost, Decoder, DecoderFactory, DirectorySink, EventFilter, EventReceiver, FileSink,
    Frame, MockCameraHost, PixelFormat, QrDecoder, Resolution, ScancamConfig, SessionController,
};

/// scancam: decode barcodes from a camera stream or a still image
#[derive(Parser, Debug)]
#[command(name = "scancam", version)]
#[command(about = "Barcode scanner over a camera session, with photo and clip capture")]
#[command(long_about = "Runs the scancam pipeline outside a device. Point --analyze at an \
image to decode it once, or --simulate to replay it as a live stream through a mock camera \
and watch the scanner events as JSON lines.")]
struct Args {
    /// Settings file; missing files fall back to defaults and SCANCAM__* variables
    #[arg(short, long, default_value = "scancam.toml")]
    config: String,

    /// Log every pipeline decision
    #[arg(short, long)]
    debug: bool,

    /// Log session lifecycle
    #[arg(short, long)]
    verbose: bool,

    /// Log failures only
    #[arg(short, long)]
    quiet: bool,

    /// Check the settings file and exit
    #[arg(long)]
    validate_config: bool,

    /// Dump the built-in settings as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Decode one image and print the barcodes as JSON
    #[arg(long, value_name = "IMAGE")]
    analyze: Option<PathBuf>,

    /// Replay an image as camera frames and print scanner events
    #[arg(long, value_name = "IMAGE")]
    simulate: Option<PathBuf>,

    /// Frames to replay with --simulate
    #[arg(long, default_value_t = 30)]
    frames: u32,

    /// Log line format: json, pretty or compact
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<String>,
}

impl Args {
    fn log_level(&self) -> &'static str {
        match (self.debug, self.verbose, self.quiet) {
            (true, _, _) => "debug",
            (_, true, _) => "info",
            (_, _, true) => "error",
            _ => "warn",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting scancam v{}", env!("CARGO_PKG_VERSION"));

    let config = ScancamConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    if let Some(image) = &args.analyze {
        let host = Arc::new(MockCameraHost::new());
        let controller = controller(&config, host);
        let results = controller.analyze_image(image).await?;
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if let Some(image) = &args.simulate {
        return simulate(&config, image, args.frames).await;
    }

    eprintln!("Nothing to do: pass --analyze or --simulate (see --help)");
    Ok(())
}

fn controller(config: &ScancamConfig, host: Arc<MockCameraHost>) -> SessionController {
    let camera: Arc<dyn CameraHost> = host;
    let decoders: Arc<dyn DecoderFactory> =
        Arc::new(|| -> Arc<dyn Decoder> { Arc::new(QrDecoder::new()) });
    let sink: Arc<dyn FileSink> = Arc::new(DirectorySink::new(config.output_dir()));

    SessionController::new(camera, decoders, sink, Default::default())
        .with_recording_options(config.recording_options())
        .with_scan_image_width(config.capture.scan_image_width)
}

/// Feed `image` through a mock camera and print every scanner event
async fn simulate(config: &ScancamConfig, image: &Path, frames: u32) -> Result<()> {
    let luma = image::open(image)
        .with_context(|| format!("Failed to open {}", image.display()))?
        .to_luma8();
    let (width, height) = luma.dimensions();
    let data = luma.into_raw();

    let host = Arc::new(
        MockCameraHost::new()
            .with_stream(Resolution::new(width, height))
            .with_sensor_rotation(Some(0)),
    );
    let controller = controller(config, Arc::clone(&host));
    let mut events = EventReceiver::new(controller.event_bus().subscribe(), EventFilter::All);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Could not serialize event: {}", e),
            }
        }
    });

    let started = controller.start(config.start_config()).await?;
    info!(
        "Simulated session {} at {}x{}",
        started.session_id, started.width, started.height
    );

    for id in 0..u64::from(frames) {
        let frame = Frame::new(id, data.clone(), width, height, 0, PixelFormat::Luma8);
        host.push_frame(frame);
        tokio::time::sleep(Duration::from_millis(33)).await;
    }

    // Let the last decode finish before tearing down
    tokio::time::sleep(Duration::from_millis(250)).await;
    controller.stop().await?;
    drop(controller);

    // The bus closes once the controller is gone
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // RUST_LOG wins over the command line flags
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scancam={}", args.log_level())));

    // Events go to stdout in --simulate, so logs stay on stderr
    let layer = match args.log_format.as_deref().unwrap_or("compact") {
        "json" => fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_file(args.debug)
            .with_line_number(args.debug)
            .with_writer(std::io::stderr)
            .boxed(),
        "compact" => fmt::layer().compact().with_writer(std::io::stderr).boxed(),
        other => anyhow::bail!("unknown log format '{}', expected json, pretty or compact", other),
    };

    tracing_subscriber::registry().with(layer).with(filter).try_init()?;
    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Scancam Configuration File");
    println!("# Every option with its default value");
    println!();
    println!("{}", toml::to_string_pretty(&ScancamConfig::default())?);
    Ok(())
}
