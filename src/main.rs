//! AAV Recorder CLI
//!
//! Records synthetic integrating-camera video into AAV files and inspects
//! existing recordings.

use aav_recorder::{
    aav::{AavFileReader, StatusValue},
    capture::{FileConfig, FrameSource, MockCamera},
    metrics::MetricsRegistry,
    timing::datetime_from_ticks,
    ImageLayoutChoice, Session,
};
use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(name = "aav-recorder", version, about = "Analogue video frame integration and AAV recording")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record frames from the synthetic camera into a new AAV file
    Record(RecordArgs),

    /// Print the header, layouts and frame index of an AAV file
    Inspect {
        file: PathBuf,

        /// Also list every frame with its status values
        #[arg(long)]
        frames: bool,
    },
}

#[derive(Args)]
struct RecordArgs {
    /// Output file, must not exist yet
    #[arg(short, long)]
    output: PathBuf,

    /// Number of video frames to capture
    #[arg(short = 'n', long, default_value_t = 250)]
    frames: u64,

    /// Video frames per camera exposure
    #[arg(long, default_value_t = 4)]
    integration_rate: u32,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image layout for recorded frames (raw, differential, compressed)
    #[arg(long)]
    layout: Option<ImageLayoutChoice>,

    /// Lock integration, averaging over each detected exposure
    #[arg(long)]
    lock: bool,

    /// Seed for the synthetic sensor noise
    #[arg(long)]
    seed: Option<u64>,

    /// Print the final metrics in Prometheus text format
    #[arg(long)]
    print_metrics: bool,

    /// Serve metrics over HTTP on this port
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_port: Option<u16>,
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Record(args) => record(args),
        Command::Inspect { file, frames } => inspect(&file, frames),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn record(options: RecordArgs) -> Result<(), Box<dyn Error>> {
    info!("AAV Recorder v{}", aav_recorder::VERSION);
    info!("Recording from a synthetic camera");

    let mut file_config = match &options.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(layout) = options.layout {
        file_config.recording.image_layout = layout;
    }
    let camera_config = file_config.camera.clone();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let registry = MetricsRegistry::new()?;
    #[cfg(feature = "metrics")]
    let metrics_state = {
        let port = options.metrics_port.unwrap_or(file_config.metrics.port);
        if port != 0 {
            Some(spawn_metrics_server(port)?)
        } else {
            None
        }
    };

    let mut camera = MockCamera::new(options.integration_rate);
    if let Some(seed) = options.seed {
        camera = camera.with_seed(seed);
    }
    camera.open(&camera_config)?;

    let session = Session::with_recording_config(file_config.recording.clone())
        .with_user_tag("CAPTURE-SOURCE", "MockCamera")
        .with_user_tag("INTEGRATION-RATE", options.integration_rate.to_string());
    session.lock_integration(options.lock);
    session.configure_camera(camera_config)?;
    session.start_recording(&options.output)?;

    info!(
        output = %options.output.display(),
        layout = ?file_config.recording.image_layout,
        frames = options.frames,
        "Processing frames..."
    );

    for i in 0..options.frames {
        if !running.load(Ordering::SeqCst) {
            warn!(captured = i, "Interrupted, stopping recording");
            break;
        }

        let frame = camera.capture()?;
        let status = session.process_frame(frame.pixels(), frame.ticks());
        debug!(
            camera_frame = status.camera_frame_no,
            integrated_frame = status.integrated_frame_no,
            signature = status.frame_diff_signature,
            ratio = status.current_signature_ratio,
            "Frame processed"
        );

        if i % 25 == 0 {
            let snapshot = session.metrics_snapshot();
            registry.update(&snapshot);
            #[cfg(feature = "metrics")]
            {
                if let Some(state) = &metrics_state {
                    state.blocking_write().update(&snapshot);
                }
            }
        }

        if !session.is_recording() {
            error!("Recording aborted by the writer");
            break;
        }
    }

    let summary = session.stop_recording()?;
    let snapshot = session.metrics_snapshot();
    registry.update(&snapshot);

    let status = session.get_current_image_status();
    info!(
        frames_processed = snapshot.frames_processed,
        integrated_frames = snapshot.integrated_frames,
        last_exposure_frames = status.counted_frames,
        cutoff_ratio = status.cutoff_ratio,
        "Capture finished"
    );
    if let Some(summary) = summary {
        info!(
            path = %summary.path.display(),
            frames = summary.frames_written,
            "Recording sealed"
        );
    }

    if options.print_metrics {
        print!("{}", registry.encode()?);
    }
    Ok(())
}

#[cfg(feature = "metrics")]
fn spawn_metrics_server(
    port: u16,
) -> Result<
    Arc<tokio::sync::RwLock<aav_recorder::metrics::MetricsState>>,
    Box<dyn Error>,
> {
    use aav_recorder::metrics::{MetricsServer, MetricsServerConfig};

    let server = MetricsServer::new(MetricsServerConfig::with_port(port), MetricsRegistry::new()?);
    let state = server.state();
    let runtime = tokio::runtime::Runtime::new()?;
    std::thread::Builder::new()
        .name("metrics-server".to_string())
        .spawn(move || {
            if let Err(e) = runtime.block_on(server.run()) {
                error!(error = %e, "Metrics server stopped");
            }
        })?;
    Ok(state)
}

fn format_ticks(ticks: i64) -> String {
    datetime_from_ticks(ticks)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| format!("{} ticks", ticks))
}

fn format_value(value: &StatusValue) -> String {
    match value {
        StatusValue::Text(s) => s.clone(),
        StatusValue::UInt8(v) => v.to_string(),
        StatusValue::UInt16(v) => v.to_string(),
        StatusValue::UInt64(v) => v.to_string(),
        StatusValue::Real(v) => format!("{:.3}", v),
        StatusValue::Messages(m) => m.join(" | "),
    }
}

fn inspect(path: &Path, list_frames: bool) -> Result<(), Box<dyn Error>> {
    let mut reader = AavFileReader::open(path)?;

    println!("File:       {}", path.display());
    println!(
        "Format:     version {}{}",
        reader.version(),
        if reader.is_sealed() { "" } else { " (not sealed, index rebuilt)" }
    );
    println!("Image:      {}x{} @ {} bpp", reader.width(), reader.height(), reader.bpp());

    println!("\nFile tags:");
    for (key, value) in reader.file_tags() {
        println!("  {:<24} {}", key, value);
    }
    if !reader.user_tags().is_empty() {
        println!("\nUser tags:");
        for (key, value) in reader.user_tags() {
            println!("  {:<24} {}", key, value);
        }
    }

    println!("\nImage layouts:");
    for layout in reader.layouts() {
        println!(
            "  {} {:<32} {:<12} key frame {:<4} base {}",
            layout.id,
            layout.layout_type,
            layout.compression.name(),
            layout.key_frame_interval,
            layout.diff_base.as_deref().unwrap_or("-")
        );
    }
    for (key, value) in reader.image_tags() {
        println!("  {:<24} {}", key, value);
    }

    println!("\nStatus tags:");
    for (id, tag) in reader.status_tags().iter().enumerate() {
        println!("  {:>3} {:<24} {:?}", id, tag.name, tag.tag_type);
    }

    let index = reader.index();
    println!("\nFrames:     {}", index.len());
    if let (Some(first), Some(last)) = (index.first(), index.last()) {
        println!("Elapsed:    {} ms .. {} ms", first.elapsed_ms, last.elapsed_ms);
        let bytes: u64 = index.iter().map(|e| u64::from(e.length)).sum();
        println!("Frame data: {} bytes", bytes);
    }

    if list_frames {
        println!();
        let names: Vec<String> = reader.status_tags().iter().map(|t| t.name.clone()).collect();
        for i in 0..reader.frame_count() {
            let frame = reader.read_frame(i)?;
            let values = frame
                .values
                .iter()
                .map(|(id, value)| {
                    let name = names.get(*id as usize).map_or("?", String::as_str);
                    format!("{}={}", name, format_value(value))
                })
                .collect::<Vec<_>>()
                .join(" ");
            println!(
                "{:>6} {} {:>8} ms exp {:>6} layout {} {}",
                i,
                format_ticks(frame.timestamp),
                frame.elapsed_ms,
                frame.exposure,
                frame.layout_id,
                values
            );
        }
    }

    Ok(())
}
