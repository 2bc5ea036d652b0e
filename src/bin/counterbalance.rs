use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use emeg::{counterbalance, StimulusTable};

#[derive(Parser)]
#[command(name = "counterbalance", about = "Split the stimulus table into two presentation lists")]
struct Args {
    /// Stimulus table (comma-separated, with header)
    #[arg(long)]
    input: PathBuf,

    /// Directory for List1.txt and List2.txt (default: next to the input)
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("read {}", args.input.display()))?;
    let table = StimulusTable::parse_csv(&text)
        .with_context(|| format!("parse {}", args.input.display()))?;
    let (list1, list2) = counterbalance(&table)?;

    let out_dir = args
        .out_dir
        .or_else(|| args.input.parent().map(PathBuf::from))
        .unwrap_or_default();
    fs::create_dir_all(&out_dir)?;
    for (name, list) in [("List1.txt", &list1), ("List2.txt", &list2)] {
        let path = out_dir.join(name);
        fs::write(&path, list.to_tsv()).with_context(|| format!("write {}", path.display()))?;
        info!(path = %path.display(), n_items = list.rows.len(), "wrote list");
    }
    Ok(())
}
