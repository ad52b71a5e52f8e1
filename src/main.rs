// src/main.rs

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use eventstream_modules::session::{export::export_session_to_wav, Session};

#[derive(Debug, Parser)]
#[command(name = "es_render")]
#[command(about = "Render an event schedule to a WAV file")]
struct Cli {
    /// Schedule manifest (JSON).
    schedule: PathBuf,

    /// Output WAV path.
    output: PathBuf,

    /// Override the schedule's total sample budget.
    #[arg(long)]
    max_length: Option<u64>,

    /// Override the samples requested per fill call.
    #[arg(long)]
    block_size: Option<usize>,
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut session = Session::load(&cli.schedule.to_string_lossy())?;
    if let Some(max_length) = cli.max_length {
        session.manifest.config.max_length = Some(max_length);
    }
    if let Some(block_size) = cli.block_size {
        session.manifest.config.block_size = block_size;
    }

    let frames = export_session_to_wav(&session, &cli.output.to_string_lossy())?;
    println!(
        "✅ Wrote {} frames ({:.2}s) to {}",
        frames,
        frames as f64 / session.manifest.config.sample_rate as f64,
        cli.output.display()
    );
    Ok(())
}
