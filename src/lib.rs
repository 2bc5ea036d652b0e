//! # emeg: trigger decoding for the E-MEG semantic priming study
//!
//! `emeg` turns the trigger channel of an MEG recording into the event files
//! the analysis scripts consume. The trigger codes written by the
//! presentation computer are bit-packed; this crate unpacks them into
//! fixation / prime / target events, groups them into trials and writes
//! MNE-compatible event lists.
//!
//! ## Pipeline overview
//!
//! ```text
//! <subject>_<run>_raw.fif  (one per run)
//!   │
//!   ├─ fiff::open_raw()            native FIFF reader
//!   ├─ stim::read_trigger_channel  stim channel → integer codes
//!   ├─ stim::concatenate           runs in presentation order
//!   ├─ stim::find_stim_steps       (sample, prev, code), merge = -2
//!   ├─ decode::make_events         OLDT / SENT bit fields → labels
//!   └─ io::write_subject_events    master, trials, coreg files
//! ```
//!
//! ## Quick start
//!
//! ```
//! use emeg::{make_events, StimStep};
//!
//! // OLDT block bit (32) + position: fixation, prime, primed target.
//! let steps = [
//!     StimStep::new(1000, 0, 32),
//!     StimStep::new(1300, 0, 33),
//!     StimStep::new(1600, 0, 32 | 16 | 2),
//! ];
//! let events = make_events(&steps, "OLDT1").unwrap();
//!
//! let codes: Vec<u32> = events.master.iter().map(|e| e.code).collect();
//! assert_eq!(codes, [128, 64, 64]);
//! assert_eq!(events.master[2].label.name(), "word/target/primed");
//! assert_eq!(events.trials.len(), 2);
//! ```
//!
//! ## Running a whole subject
//!
//! ```no_run
//! use emeg::{process_subject, ProjectConfig};
//!
//! let cfg = ProjectConfig::load("emeg.json".as_ref()).unwrap();
//! let outcome = process_subject(&cfg, "A0023").unwrap();
//! println!("{outcome:?}");
//! ```

pub mod config;
pub mod counterbalance;
pub mod decode;
pub mod error;
pub mod fiff;
pub mod io;
pub mod stim;
pub mod trigger;

use anyhow::{bail, Context, Result};
use tracing::{info, info_span};

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use config::ProjectConfig;
pub use counterbalance::{counterbalance, StimulusTable};
pub use decode::{make_events, DecodedEvent, DecodedEvents, TrialRow};
pub use error::DecodeError;
pub use io::{read_events, write_events, write_subject_events, EventPaths};
pub use stim::{
    combine_binary_channels, concatenate, find_stim_steps, read_trigger_channel,
    BitOrder, StimStep, TriggerChannel, TriggerSource,
};
pub use trigger::{classify, event_id, Label, Lexicality, Position, Priming, TriggerFields, Variant};

/// What happened to one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectOutcome {
    /// Event files exist and `redo` is off.
    Skipped,
    Written { n_events: usize, n_trials: u32 },
}

/// Read a subject's runs, decode them together and write the event files.
///
/// # Steps
///
/// 1. Resolve the runs to decode ([`ProjectConfig::runs_to_decode`]).
/// 2. Skip when the master file exists and [`ProjectConfig::redo`] is off.
/// 3. Open each run and extract its trigger channel; the subject's bad
///    channels are never picked as the stim channel fallback.
/// 4. Concatenate the runs and find stim steps with [`ProjectConfig::merge`].
/// 5. Decode with [`ProjectConfig::experiment`].
/// 6. Write master, trials and coreg files (and the conditions file when
///    [`ProjectConfig::write_conditions`] is set) into `<root>/<subject>/mne`.
///
/// # Errors
///
/// Fails on an invalid experiment tag, a subject without decodable runs, or
/// any I/O problem reading recordings or writing outputs. Nothing is written
/// when it fails.
pub fn process_subject(cfg: &ProjectConfig, subject: &str) -> Result<SubjectOutcome> {
    let _span = info_span!("subject", subject).entered();
    Variant::from_tag(&cfg.experiment)?;

    let paths = EventPaths::in_dir(
        &cfg.mne_dir(subject),
        subject,
        &cfg.experiment,
        cfg.write_conditions,
    );
    if paths.master.exists() && !cfg.redo {
        info!(path = %paths.master.display(), "event file exists, skipping");
        return Ok(SubjectOutcome::Skipped);
    }

    let runs = cfg.runs_to_decode(subject);
    if runs.is_empty() {
        bail!("subject {subject} has no runs to decode");
    }

    let mut channels = Vec::with_capacity(runs.len());
    for run in &runs {
        let path = cfg.raw_path(subject, run);
        let raw = fiff::open_raw(&path)?;
        let ch = read_trigger_channel(&raw, &cfg.trigger, cfg.bads_for(subject))
            .with_context(|| format!("trigger channel of run {run}"))?;
        info!(run, n_times = ch.n_times(), sfreq = ch.sfreq, "read trigger channel");
        channels.push(ch);
    }
    let Some(channel) = concatenate(channels)? else {
        bail!("subject {subject} has no runs to decode");
    };

    let steps = channel.steps(cfg.merge);
    let events = make_events(&steps, &cfg.experiment)?;
    for (position, n) in decode::position_counts(&events) {
        info!(?position, n, "events");
    }
    write_subject_events(&paths, &events)?;

    Ok(SubjectOutcome::Written {
        n_events: events.master.len(),
        n_trials: events.n_trials(),
    })
}
