//! Plain-text event files.
//!
//! Event files (master, co-registration, conditions) are header-less rows of
//! `sample prev code`, one space apart, the layout MNE's `read_events`
//! accepts. The trials file is tab-separated with a header:
//!
//! ```text
//! trialid	i_start	prev_trigger	trigger
//! 1	2400	0	64
//! ```
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::decode::{DecodedEvents, TrialRow};
use crate::stim::StimStep;

pub const TRIALS_HEADER: &str = "trialid\ti_start\tprev_trigger\ttrigger";

// ── Writers ───────────────────────────────────────────────────────────────

pub fn write_event_rows<W: Write>(mut w: W, rows: &[StimStep]) -> Result<()> {
    for r in rows {
        writeln!(w, "{} {} {}", r.sample, r.prev, r.code)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_trial_rows<W: Write>(mut w: W, rows: &[TrialRow]) -> Result<()> {
    writeln!(w, "{TRIALS_HEADER}")?;
    for r in rows {
        writeln!(w, "{}\t{}\t{}\t{}", r.trial_id, r.sample, r.prev, r.trigger)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_events(path: &Path, rows: &[StimStep]) -> Result<()> {
    let f = fs::File::create(path)
        .with_context(|| format!("create {}", path.display()))?;
    write_event_rows(BufWriter::new(f), rows)
        .with_context(|| format!("write {}", path.display()))
}

// ── Readers ───────────────────────────────────────────────────────────────

/// Parse event rows. Accepts `sample prev code` and MNE's four-column
/// `sample time prev code`; blank lines and `#` comments are skipped.
pub fn parse_events(text: &str) -> Result<Vec<StimStep>> {
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        let (sample, prev, code) = match cols.as_slice() {
            [s, p, c] => (*s, *p, *c),
            [s, _t, p, c] => (*s, *p, *c),
            _ => bail!("line {}: expected 3 or 4 columns, got {}", lineno + 1, cols.len()),
        };
        let parse_u = |v: &str| {
            v.parse::<u32>()
                .with_context(|| format!("line {}: bad trigger value {v:?}", lineno + 1))
        };
        out.push(StimStep {
            sample: sample
                .parse()
                .with_context(|| format!("line {}: bad sample {sample:?}", lineno + 1))?,
            prev: parse_u(prev)?,
            code: parse_u(code)?,
        });
    }
    Ok(out)
}

pub fn read_events(path: &Path) -> Result<Vec<StimStep>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))?;
    parse_events(&text).with_context(|| format!("parse {}", path.display()))
}

/// Parse a trials file written by [`write_trial_rows`].
pub fn parse_trials(text: &str) -> Result<Vec<TrialRow>> {
    let mut lines = text.lines();
    match lines.next() {
        Some(h) if h.trim_end() == TRIALS_HEADER => {}
        other => bail!("unexpected trials header {other:?}"),
    }
    let mut out = Vec::new();
    for (i, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        let [id, sample, prev, trigger] = cols.as_slice() else {
            bail!("trials line {}: expected 4 columns, got {}", i + 2, cols.len());
        };
        out.push(TrialRow {
            trial_id: id.trim().parse().with_context(|| format!("trials line {}", i + 2))?,
            sample:   sample.trim().parse().with_context(|| format!("trials line {}", i + 2))?,
            prev:     prev.trim().parse().with_context(|| format!("trials line {}", i + 2))?,
            trigger:  trigger.trim().parse().with_context(|| format!("trials line {}", i + 2))?,
        });
    }
    Ok(out)
}

// ── Per-subject output set ────────────────────────────────────────────────

/// Output files of one subject/experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPaths {
    pub master:     PathBuf,
    pub trials:     PathBuf,
    pub coreg:      PathBuf,
    pub conditions: Option<PathBuf>,
}

impl EventPaths {
    /// `<dir>/<subject>_<exp>-eve.txt` and siblings.
    pub fn in_dir(dir: &Path, subject: &str, exp: &str, conditions: bool) -> Self {
        Self {
            master:     dir.join(format!("{subject}_{exp}-eve.txt")),
            trials:     dir.join(format!("{subject}_{exp}_trials.txt")),
            coreg:      dir.join(format!("{subject}_{exp}_coreg-eve.txt")),
            conditions: conditions.then(|| dir.join(format!("{subject}_{exp}_conditions-eve.txt"))),
        }
    }

    fn all(&self) -> Vec<&Path> {
        let mut v = vec![self.master.as_path(), self.trials.as_path(), self.coreg.as_path()];
        if let Some(c) = &self.conditions {
            v.push(c.as_path());
        }
        v
    }
}

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

fn remove_all(paths: &[PathBuf]) {
    for p in paths {
        let _ = fs::remove_file(p);
    }
}

/// Write every output of `events`. Either all files end up replaced or the
/// previous set is left as it was, with no `.partial` or `.bak` leftovers.
pub fn write_subject_events(paths: &EventPaths, events: &DecodedEvents) -> Result<()> {
    let targets = paths.all();
    if let Some(dir) = paths.master.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    if let Some(blocked) = targets.iter().find(|p| p.exists() && !p.is_file()) {
        bail!("{} exists and is not a file", blocked.display());
    }
    let temps: Vec<PathBuf> = targets.iter().map(|p| sibling_path(p, ".partial")).collect();

    let written = (|| -> Result<()> {
        write_events(&temps[0], &events.master_rows())?;
        let f = fs::File::create(&temps[1])
            .with_context(|| format!("create {}", temps[1].display()))?;
        write_trial_rows(BufWriter::new(f), &events.trials)
            .with_context(|| format!("write {}", temps[1].display()))?;
        write_events(&temps[2], &events.coreg())?;
        if temps.len() > 3 {
            write_events(&temps[3], &events.condition_rows())?;
        }
        Ok(())
    })();
    if let Err(e) = written {
        remove_all(&temps);
        return Err(e);
    }

    if let Err(e) = commit(&temps, &targets) {
        remove_all(&temps);
        return Err(e);
    }
    info!(
        master = %paths.master.display(),
        n_events = events.master.len(),
        n_trial_rows = events.trials.len(),
        "event files written"
    );
    Ok(())
}

/// Move `temps` onto `targets`, first setting existing targets aside. On any
/// failure the targets are restored.
fn commit(temps: &[PathBuf], targets: &[&Path]) -> Result<()> {
    // (backup, original) pairs that were moved aside.
    let mut backups: Vec<(PathBuf, &Path)> = Vec::new();
    let mut placed: Vec<&Path> = Vec::new();

    let result = (|| -> Result<()> {
        for &dst in targets {
            if dst.exists() {
                let bak = sibling_path(dst, ".bak");
                fs::rename(dst, &bak)
                    .with_context(|| format!("set {} aside", dst.display()))?;
                backups.push((bak, dst));
            }
        }
        for (tmp, &dst) in temps.iter().zip(targets) {
            fs::rename(tmp, dst)
                .with_context(|| format!("move {} into place", dst.display()))?;
            placed.push(dst);
            debug!(path = %dst.display(), "wrote");
        }
        Ok(())
    })();

    match result {
        Ok(()) => {
            for (bak, _) in &backups {
                let _ = fs::remove_file(bak);
            }
            Ok(())
        }
        Err(e) => {
            for dst in placed {
                let _ = fs::remove_file(dst);
            }
            for (bak, dst) in &backups {
                if let Err(restore) = fs::rename(bak, dst) {
                    warn!(path = %dst.display(), error = %restore, "could not restore previous file");
                }
            }
            Err(e)
        }
    }
}
