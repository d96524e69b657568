use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use code_scanner::camera::{DeviceManager, ReplayBackend};
use code_scanner::classify::{MockCatalog, ScanResultClassifier};
use code_scanner::{
    DecodedPayload, Provenance, QrDecoder, SamplingPreset, ScanResult, Scanner, ScannerConfig,
    StaticImageDecoder, UploadedImage,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Scan QR codes from replayed camera frames or image files and classify
/// the payload into product, order, location or document records.
#[derive(Parser, Debug)]
#[command(name = "scan")]
#[command(about = "📷 Scan and classify machine-readable codes")]
#[command(long_about = "Scan and classify machine-readable codes.
A directory of still images stands in for the camera: each sub-directory is a device and its images are played back as frames.")]
struct Args {
    /// Scanner configuration file (TOML)
    #[arg(long, global = true, help = "Path to a scanner.toml configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List replay devices as JSON
    Devices {
        /// Directory of replay frames
        frames: PathBuf,
    },

    /// Run the live pipeline against a replay camera
    Live {
        /// Directory of replay frames
        frames: PathBuf,

        /// Prefer a front-facing camera
        #[arg(long)]
        front: bool,

        /// Open this device instead of the preferred one
        #[arg(short, long)]
        device: Option<String>,

        /// How long to scan before giving up
        #[arg(short, long, default_value = "10s",
              help = "How long to scan: 30s (30 seconds), 2m (2 minutes), 1h (1 hour)")]
        timeout: String,

        /// Decode downsampling preset
        #[arg(short, long, value_enum)]
        sampling: Option<SamplingPreset>,

        /// Turn the torch on while scanning
        #[arg(long)]
        torch: bool,
    },

    /// Decode and classify a single image file
    Decode {
        image: PathBuf,

        /// Decode downsampling preset
        #[arg(short, long, value_enum)]
        sampling: Option<SamplingPreset>,
    },

    /// Classify a raw payload string
    Classify { payload: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = ScannerConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Devices { frames } => list_devices(&frames).await,
        Command::Live {
            frames,
            front,
            device,
            timeout,
            sampling,
            torch,
        } => {
            let mut config = config;
            config.prefer_front |= front;
            let timeout = parse_duration(&timeout)?;
            live(config, &frames, device.as_deref(), timeout, sampling, torch).await
        }
        Command::Decode { image, sampling } => decode(&config, &image, sampling).await,
        Command::Classify { payload } => {
            let catalog = sample_catalog(&config);
            let classifier = ScanResultClassifier::with_mock_catalog(catalog);
            let result = classifier.classify(&DecodedPayload::new(payload, Provenance::Live)).await;
            print_result(&result)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,code_scanner=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn list_devices(frames: &Path) -> Result<()> {
    let backend = Arc::new(ReplayBackend::from_directory(frames)?);
    let manager = DeviceManager::new(backend);

    let mut listing = Vec::new();
    for device in manager.list_devices().await? {
        let capabilities = manager.capabilities(&device.id).await?;
        listing.push(serde_json::json!({
            "id": device.id,
            "label": device.label,
            "facing": device.facing,
            "capabilities": capabilities,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

async fn live(
    config: ScannerConfig,
    frames: &Path,
    device: Option<&str>,
    timeout: Duration,
    sampling: Option<SamplingPreset>,
    torch: bool,
) -> Result<()> {
    let backend = Arc::new(ReplayBackend::from_directory(frames)?);
    let max_side = sampling.map_or(config.max_decode_side(), SamplingPreset::max_long_side);
    let decoder = QrDecoder::new().with_max_long_side(max_side);
    let catalog = sample_catalog(&config);
    let mut scanner = Scanner::new(config, backend, Arc::new(decoder), Arc::new(catalog));

    let opened = match device {
        Some(id) => scanner.select_device(id).await?,
        None => scanner.start().await?,
    };
    info!(device = %opened.id, timeout = ?timeout, "Scanning");

    if torch {
        scanner.set_torch(true).await?;
    }

    let outcome = tokio::time::timeout(timeout, scanner.controller().resolved()).await;
    scanner.shutdown().await;

    match outcome {
        Ok(Some(result)) => print_result(&result),
        Ok(None) => Err(anyhow!("result controller closed before a code was classified")),
        Err(_) => Err(anyhow!("no code found within {:?}", timeout)),
    }
}

async fn decode(config: &ScannerConfig, image: &Path, sampling: Option<SamplingPreset>) -> Result<()> {
    let upload = UploadedImage::from_path(image)?;
    let max_side = sampling.map_or(config.max_decode_side(), SamplingPreset::max_long_side);
    let decoder = StaticImageDecoder::new(Arc::new(QrDecoder::new().with_max_long_side(max_side)));
    let payload = decoder
        .decode_image(upload)
        .await
        .with_context(|| format!("decoding {}", image.display()))?;

    let classifier = ScanResultClassifier::with_mock_catalog(sample_catalog(config));
    print_result(&classifier.classify(&payload).await)
}

/// Sample catalog with the configured lookup latency.
fn sample_catalog(config: &ScannerConfig) -> MockCatalog {
    MockCatalog::new().with_latency(config.lookup_latency())
}

fn print_result(result: &ScanResult) -> Result<()> {
    println!("{}", result.to_json_pretty()?);
    Ok(())
}

/// Parse duration string like "30s", "2m", "1h"
fn parse_duration(duration: &str) -> Result<Duration> {
    if let Ok(seconds) = duration.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let len = duration.len();
    if len < 2 || !duration.is_ascii() {
        return Err(anyhow!("Invalid duration format: {}", duration));
    }

    let (num_str, unit) = duration.split_at(len - 1);
    let num: u64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid number in duration: {}", num_str))?;

    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => {
            return Err(anyhow!(
                "Invalid duration unit: {}. Use 's' for seconds, 'm' for minutes, 'h' for hours",
                unit
            ));
        }
    };
    num.checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow!("Duration too large: {}", duration))
}
