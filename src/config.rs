//! Project configuration.
//!
//! [`ProjectConfig`] holds everything the event-making stage needs: where the
//! data lives, which runs each subject recorded, and how to read triggers.
//! It is passed explicitly to every stage; nothing is read from globals.
//!
//! The defaults reproduce the E-MEG study. A JSON file may override any
//! subset of fields:
//!
//! ```
//! use emeg::ProjectConfig;
//!
//! let cfg: ProjectConfig = serde_json::from_str(r#"{
//!     "data_root": "/Volumes/server/E-MEG/data",
//!     "redo": false
//! }"#).unwrap();
//! assert_eq!(cfg.merge, -2);
//! assert_eq!(cfg.subjects["A0023"], ["OLDT2", "SENT2", "OLDT1"]);
//! ```
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::stim::TriggerSource;

/// Placeholder for a run that was not recorded.
pub const MISSING_RUN: &str = "n/a";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root holding one directory per subject.
    pub data_root: PathBuf,

    /// Runs of each subject in presentation order; [`MISSING_RUN`] marks a
    /// run that does not exist.
    pub subjects: BTreeMap<String, Vec<String>>,

    /// Indices into a subject's run list that are decoded together.
    ///
    /// Default: `[0, 2]`, the two lexical decision runs around the
    /// sentence block.
    pub decode_runs: Vec<usize>,

    /// Experiment tag used for decoding and output names.
    ///
    /// Default: `"OLDT"`.
    pub experiment: String,

    /// Where the trigger codes are in each recording.
    ///
    /// Default: the `STI 014` stim channel.
    pub trigger: TriggerSource,

    /// Step merge window in samples (see [`crate::stim::find_stim_steps`]).
    ///
    /// Default: `-2`.
    pub merge: i64,

    /// Known-bad channels per subject, carried for downstream stages.
    pub bads: BTreeMap<String, Vec<String>>,

    /// Rebuild event files even when they exist.
    ///
    /// Default: `true`.
    pub redo: bool,

    /// Also write the conditions event file with composite codes.
    ///
    /// Default: `false`.
    pub write_conditions: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        let order = |a: &str, b: &str, c: &str| vec![a.to_string(), b.to_string(), c.to_string()];
        let subjects: BTreeMap<String, Vec<String>> = [
            ("A0023", order("OLDT2", "SENT2", "OLDT1")),
            ("A0078", order("OLDT1", "SENT1", "OLDT2")),
            ("A0085", order("OLDT2", "SENT2", "OLDT1")),
            ("A0100", order("OLDT1", "SENT1", "OLDT2")),
            ("A0106", order("OLDT1", "SENT1", "OLDT2")),
            ("A0110", order("OLDT2", "SENT2", "OLDT1")),
            ("A0123", order("OLDT1", "SENT1", "OLDT2")),
            ("A0125", order("OLDT1", "SENT2", "OLDT2")),
            ("A0127", order("OLDT2", "SENT1", "OLDT1")),
            ("A0129", order("OLDT1", "SENT1", "OLDT2")),
            ("A0130", order("OLDT2", "SENT2", "OLDT1")),
            ("A0134", order("OLDT2", "SENT2", "OLDT1")),
            ("A0136", order("OLDT1", "SENT1", "OLDT2")),
            ("A0148", order("OLDT1", "SENT1", "OLDT2")),
            ("A0150", order("OLDT2", "SENT2", "OLDT1")),
            ("A0155", order("OLDT2", "SENT2", "OLDT1")),
            ("A0159", order("OLDT1", "SENT1", "OLDT2")),
            ("A0161", order("OLDT1", "SENT1", "OLDT2")),
            ("A0163", order("OLDT2", "SENT2", "OLDT1")),
            ("A0164", order("OLDT2", "SENT2", "OLDT1")),
        ]
        .into_iter()
        .map(|(s, runs)| (s.to_string(), runs))
        .collect();

        let bads: BTreeMap<String, Vec<String>> = [
            ("A0023", vec!["MEG 059", "MEG 049", "MEG 054"]),
            ("A0136", vec!["MEG 057", "MEG 128", "MEG 179"]),
            ("A0106", vec!["MEG 160", "MEG 072"]),
        ]
        .into_iter()
        .map(|(s, chs)| (s.to_string(), chs.into_iter().map(str::to_string).collect()))
        .collect();

        Self {
            data_root: PathBuf::from("data"),
            subjects,
            decode_runs: vec![0, 2],
            experiment: "OLDT".into(),
            trigger: TriggerSource::default(),
            merge: -2,
            bads,
            redo: true,
            write_conditions: false,
        }
    }
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parse config {}", path.display()))
    }

    pub fn subject_dir(&self, subject: &str) -> PathBuf {
        self.data_root.join(subject)
    }

    /// Directory the event files go to: `<root>/<subject>/mne`.
    pub fn mne_dir(&self, subject: &str) -> PathBuf {
        self.subject_dir(subject).join("mne")
    }

    /// Recording of one run: `<root>/<subject>/raw/<subject>_<run>_raw.fif`.
    pub fn raw_path(&self, subject: &str, run: &str) -> PathBuf {
        self.subject_dir(subject).join("raw").join(format!("{subject}_{run}_raw.fif"))
    }

    /// Runs of `subject` that get decoded, missing ones left out.
    /// Empty for an unknown subject.
    pub fn runs_to_decode(&self, subject: &str) -> Vec<&str> {
        let Some(runs) = self.subjects.get(subject) else { return vec![] };
        self.decode_runs
            .iter()
            .filter_map(|&i| runs.get(i))
            .map(String::as_str)
            .filter(|r| *r != MISSING_RUN)
            .collect()
    }

    /// Subjects whose data directory exists.
    pub fn available_subjects(&self) -> Vec<&str> {
        self.subjects
            .keys()
            .map(String::as_str)
            .filter(|s| self.subject_dir(s).is_dir())
            .collect()
    }

    pub fn bads_for(&self, subject: &str) -> &[String] {
        self.bads.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }
}
