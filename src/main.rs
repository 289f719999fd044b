//! Chartify - replays a chart script against the chart registry and writes
//! every chart still live at the end as a PNG.

use anyhow::Context;
use chartify_registry::data::{ScriptLoader, ScriptRunner};
use chartify_registry::tracing_setup::init_tracing;
use chartify_registry::{BitmapEngine, ChartRegistry};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chartify", version, about = "Replay a chart script and export live charts as PNG")]
struct Args {
    /// Chart script (JSON)
    script: PathBuf,

    /// Directory for the exported PNG files
    #[arg(short, long, default_value = "charts")]
    out_dir: PathBuf,

    /// Canvas width in pixels (overrides the script)
    #[arg(long)]
    width: Option<u32>,

    /// Canvas height in pixels (overrides the script)
    #[arg(long)]
    height: Option<u32>,

    /// Font file for titles and labels (overrides the script)
    #[arg(long)]
    font: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let script = ScriptLoader::load_file(&args.script)
        .with_context(|| format!("loading script {}", args.script.display()))?;

    let mut canvas = script.canvas.clone();
    if let Some(width) = args.width {
        canvas.width = width;
    }
    if let Some(height) = args.height {
        canvas.height = height;
    }
    if args.font.is_some() {
        canvas.font = args.font.clone();
    }

    let engine = BitmapEngine::with_surfaces(canvas, script.surfaces.iter().cloned())
        .context("creating rendering engine")?;
    let mut registry = ChartRegistry::new(engine);

    let report = ScriptRunner::run(&mut registry, &script.steps);
    for failure in &report.failures {
        eprintln!("step {} ({}): {}", failure.index, failure.op, failure.error);
    }

    let written = ScriptRunner::export_pngs(&registry, &args.out_dir)
        .with_context(|| format!("exporting charts to {}", args.out_dir.display()))?;

    println!(
        "{} steps applied, {} failed, {} charts written to {}",
        report.applied,
        report.failures.len(),
        written.len(),
        args.out_dir.display()
    );
    Ok(())
}
