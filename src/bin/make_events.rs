//! make_events: decode trigger channels into the study's event files.
//!
//! ```bash
//! # every subject of the project config
//! make_events run --config emeg.json
//!
//! # selected subjects, regenerating existing files
//! make_events run --config emeg.json --subject A0023 --subject A0078 --redo
//!
//! # decode an already extracted list of stim steps
//! make_events decode --steps A0023_steps.txt --subject A0023 --exp OLDT --out-dir out/
//! ```
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use emeg::{
    make_events, process_subject, read_events, write_subject_events, EventPaths,
    ProjectConfig, SubjectOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "make_events", version, about = "Decode MEG trigger channels into event files")]
struct Cli {
    /// Log filter (error, warn, info, debug, trace); RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process subjects listed in a project config
    Run {
        /// Project config (JSON); study defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the data root of the config
        #[arg(long)]
        data_root: Option<PathBuf>,

        /// Subjects to process (default: every subject with a data directory)
        #[arg(long = "subject")]
        subjects: Vec<String>,

        /// Experiment tag (OLDT…, SENT…)
        #[arg(long)]
        exp: Option<String>,

        /// Rebuild event files that already exist
        #[arg(long)]
        redo: bool,

        /// Also write the conditions event file
        #[arg(long)]
        conditions: bool,
    },

    /// Decode a stim-step file (`sample prev code` rows)
    Decode {
        #[arg(long)]
        steps: PathBuf,

        #[arg(long)]
        subject: String,

        #[arg(long, default_value = "OLDT")]
        exp: String,

        #[arg(long)]
        out_dir: PathBuf,

        #[arg(long)]
        conditions: bool,
    },
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Command::Run { config, data_root, subjects, exp, redo, conditions } => {
            run(config, data_root, subjects, exp, redo, conditions)
        }
        Command::Decode { steps, subject, exp, out_dir, conditions } => {
            decode_file(&steps, &subject, &exp, &out_dir, conditions).map(|()| true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every subject succeeded.
fn run(
    config: Option<PathBuf>,
    data_root: Option<PathBuf>,
    subjects: Vec<String>,
    exp: Option<String>,
    redo: bool,
    conditions: bool,
) -> Result<bool> {
    let mut cfg = match &config {
        Some(path) => ProjectConfig::load(path)?,
        None => ProjectConfig::default(),
    };
    if let Some(root) = data_root {
        cfg.data_root = root;
    }
    if let Some(exp) = exp {
        cfg.experiment = exp;
    }
    cfg.redo |= redo;
    cfg.write_conditions |= conditions;
    emeg::Variant::from_tag(&cfg.experiment)?;

    let subjects: Vec<String> = if subjects.is_empty() {
        cfg.available_subjects().into_iter().map(str::to_string).collect()
    } else {
        subjects
    };
    if subjects.is_empty() {
        warn!(root = %cfg.data_root.display(), "no subject directories found");
    }

    let mut failed = 0usize;
    for subject in &subjects {
        info!("{}", banner(subject));
        match process_subject(&cfg, subject) {
            Ok(SubjectOutcome::Skipped) => {}
            Ok(SubjectOutcome::Written { n_events, n_trials }) => {
                info!(subject, n_events, n_trials, "done");
            }
            Err(e) => {
                error!(subject, "{e:#}");
                failed += 1;
            }
        }
    }
    info!(n_subjects = subjects.len(), failed, "finished");
    Ok(failed == 0)
}

fn decode_file(
    steps: &std::path::Path,
    subject: &str,
    exp: &str,
    out_dir: &std::path::Path,
    conditions: bool,
) -> Result<()> {
    let steps = read_events(steps)?;
    let events = make_events(&steps, exp)?;
    let paths = EventPaths::in_dir(out_dir, subject, exp, conditions);
    write_subject_events(&paths, &events)?;
    info!(
        n_steps = steps.len(),
        n_events = events.master.len(),
        n_trials = events.n_trials(),
        "decoded"
    );
    Ok(())
}

fn banner(subject: &str) -> String {
    let bar = "#".repeat(subject.len() + 4);
    format!("\n{bar}\n# {subject} #\n{bar}")
}
