//! heapscry: decode a pool-node heap image into its hidden hints and
//! assembled plaintext.

use anyhow::Context;
use clap::Parser;
use heapscry::memory::ImageFile;
use heapscry::DecodeConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Heap image to decode.
    image: PathBuf,

    /// Write the assembled plaintext here.
    #[arg(short, long, default_value = "output.bin")]
    output: PathBuf,

    /// Write the decrypted hints here, one per line.
    #[arg(long)]
    hints: Option<PathBuf>,

    /// Write a JSON decode report here ("-" for stdout).
    #[arg(long)]
    report: Option<PathBuf>,

    /// JSON decode configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the dependency message marker.
    #[arg(long)]
    marker: Option<String>,

    /// Override the corrupted-node flag mask (hex).
    #[arg(long, value_parser = parse_hex)]
    corrupted_flag: Option<u64>,
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value '{}': {}", s, e))
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DecodeConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DecodeConfig::default(),
    };
    if let Some(marker) = cli.marker {
        config.message_marker = marker;
    }
    if let Some(flag) = cli.corrupted_flag {
        config.corrupted_flag = flag;
    }

    let image = ImageFile::open(&cli.image)
        .with_context(|| format!("opening image {}", cli.image.display()))?;
    tracing::info!("decoding {} ({} bytes)", image.path().display(), image.len());

    let report = heapscry::decode(image.bytes(), &config)
        .inspect_err(|e| tracing::error!("decode failed: {}", e))?;

    std::fs::write(&cli.output, &report.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;
    if let Some(path) = &cli.hints {
        std::fs::write(path, &report.hint_stream)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    match &cli.report {
        Some(path) if path.as_os_str() == "-" => println!("{}", report.to_json()?),
        Some(path) => std::fs::write(path, report.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?,
        None => {}
    }

    if report.is_complete() {
        tracing::info!(
            "wrote {} bytes to {} (fully verified)",
            report.output_len,
            cli.output.display()
        );
    } else {
        tracing::warn!(
            "wrote {} bytes to {} (partial: chunks {:?} dropped, {} skips total)",
            report.output_len,
            cli.output.display(),
            report.dropped_chunks(),
            report.skipped.len()
        );
    }
    Ok(())
}
