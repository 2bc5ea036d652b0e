//! Trigger channel extraction and step detection.
//!
//! A trigger channel holds the current trigger code at every sample; an event
//! is a *step*, a sample where that value changes. Steps carry the value before
//! and after the change so offsets (`code → 0`) stay distinguishable from
//! onsets.
use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::fiff::constants::FIFFV_STIM_CH;
use crate::fiff::RawFif;

/// One change of the trigger channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StimStep {
    /// Sample index in acquisition time (includes `first_samp`).
    pub sample: i64,
    /// Channel value before the step.
    pub prev:   u32,
    /// Channel value from this sample on.
    pub code:   u32,
}

impl StimStep {
    pub fn new(sample: i64, prev: u32, code: u32) -> Self {
        Self { sample, prev, code }
    }
}

// ── Trigger channel ───────────────────────────────────────────────────────

/// Integer trigger codes for one continuous recording.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerChannel {
    pub first_samp: i64,
    pub sfreq:      f64,
    pub data:       Vec<i64>,
}

impl TriggerChannel {
    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.len()
    }

    /// Steps of this channel; see [`find_stim_steps`].
    pub fn steps(&self, merge: i64) -> Vec<StimStep> {
        find_stim_steps(&self.data, self.first_samp, merge)
    }
}

/// Bit significance of binary trigger lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BitOrder {
    /// First line is the least significant bit (`<`).
    #[serde(rename = "<")]
    LittleEndian,
    /// First line is the most significant bit (`>`).
    #[serde(rename = ">")]
    BigEndian,
}

/// Where the trigger codes live in the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// A ready-made stim channel holding integer codes.
    Channel(String),
    /// Analog trigger lines, one bit each, combined into codes.
    Lines {
        names:     Vec<String>,
        order:     BitOrder,
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
}

fn default_threshold() -> f64 {
    1.0
}

impl Default for TriggerSource {
    fn default() -> Self {
        TriggerSource::Channel("STI 014".into())
    }
}

/// Combine binary trigger lines (`[n_lines, n_times]`) into one code per sample.
///
/// A line is "on" where it exceeds `threshold` (positive-going triggers).
///
/// ```
/// use emeg::stim::{combine_binary_channels, BitOrder};
/// use ndarray::array;
///
/// let lines = array![[0.0, 5.0, 5.0], [0.0, 0.0, 5.0]];
/// assert_eq!(combine_binary_channels(lines.view(), BitOrder::LittleEndian, 1.0), vec![0, 1, 3]);
/// assert_eq!(combine_binary_channels(lines.view(), BitOrder::BigEndian, 1.0), vec![0, 2, 3]);
/// ```
pub fn combine_binary_channels(lines: ArrayView2<f64>, order: BitOrder, threshold: f64) -> Vec<i64> {
    let (n_lines, n_times) = lines.dim();
    let mut out = vec![0i64; n_times];
    for (k, line) in lines.outer_iter().enumerate() {
        let bit = match order {
            BitOrder::LittleEndian => k,
            BitOrder::BigEndian => n_lines - 1 - k,
        };
        let weight = 1i64 << bit;
        for (v, &x) in out.iter_mut().zip(line.iter()) {
            if x > threshold {
                *v += weight;
            }
        }
    }
    out
}

/// Pull the trigger channel out of an opened recording.
///
/// `bads` lists channels known to be broken for this subject. Together with
/// the bad channels stored in the file they are never chosen by the stim
/// channel fallback; naming one explicitly still reads it, with a warning.
pub fn read_trigger_channel(
    raw:    &RawFif,
    source: &TriggerSource,
    bads:   &[String],
) -> Result<TriggerChannel> {
    let data = match source {
        TriggerSource::Channel(name) => {
            let pick = pick_channel(raw, name, bads)?;
            let samples = raw.read_channels(&[pick])?;
            samples.row(0).iter().map(|&v| v.round() as i64).collect()
        }
        TriggerSource::Lines { names, order, threshold } => {
            if names.is_empty() {
                return Err(DecodeError::NoTriggerLines.into());
            }
            let picks = names
                .iter()
                .map(|n| pick_channel(raw, n, bads))
                .collect::<Result<Vec<_>>>()?;
            let lines: Array2<f64> = raw.read_channels(&picks)?;
            combine_binary_channels(lines.view(), *order, *threshold)
        }
    };
    Ok(TriggerChannel {
        first_samp: raw.first_samp as i64,
        sfreq:      raw.info.sfreq,
        data,
    })
}

/// Index of the channel called `name`. Falls back to the first good stim
/// channel when the name is the generic `STI 014` and the system calls it
/// otherwise.
fn pick_channel(raw: &RawFif, name: &str, bads: &[String]) -> Result<usize> {
    let norm = |s: &str| s.replace(' ', "").to_lowercase();
    let is_bad = |ch: &str| {
        bads.iter()
            .chain(&raw.info.bad_ch_names)
            .any(|b| norm(b) == norm(ch))
    };
    if let Some(idx) = raw.info.chs.iter().position(|c| norm(&c.name) == norm(name)) {
        if is_bad(name) {
            warn!(channel = name, "trigger channel is marked bad, reading it anyway");
        }
        return Ok(idx);
    }
    if norm(name) == "sti014" {
        let fallback = raw
            .info
            .chs
            .iter()
            .position(|c| c.kind == FIFFV_STIM_CH && !is_bad(&c.name));
        if let Some(idx) = fallback {
            debug!(channel = %raw.info.chs[idx].name, "using first stim channel");
            return Ok(idx);
        }
    }
    Err(DecodeError::MissingTriggerChannel(name.to_string()))
        .with_context(|| format!("reading {}", raw.path.display()))
}

/// Append runs in presentation order.
///
/// The result keeps the first run's `first_samp`; later runs continue the
/// sample count, so a step at a run boundary shows up when the codes differ.
pub fn concatenate(runs: Vec<TriggerChannel>) -> Result<Option<TriggerChannel>> {
    let mut iter = runs.into_iter();
    let Some(mut out) = iter.next() else { return Ok(None) };
    for run in iter {
        if (run.sfreq - out.sfreq).abs() > 1e-3 {
            return Err(DecodeError::SfreqMismatch { first: out.sfreq, other: run.sfreq }.into());
        }
        out.data.extend(run.data);
    }
    Ok(Some(out))
}

// ── Step detection ────────────────────────────────────────────────────────

/// Find every sample where `data` changes value.
///
/// `first_samp` offsets the returned sample indices into acquisition time.
/// Negative values are taken by absolute value; values beyond `u32::MAX`
/// are clamped to it.
///
/// `merge` joins steps at most `|merge|` samples apart, which happens when
/// trigger lines do not flip on exactly the same sample:
/// * `merge < 0` keeps the earlier step, carrying the later step's new value;
/// * `merge > 0` keeps the later step, carrying the earlier step's old value.
///
/// Merging reads the unmerged values, so a chain of three close steps does
/// not cascade. A merged step whose old and new value agree is dropped.
pub fn find_stim_steps(data: &[i64], first_samp: i64, merge: i64) -> Vec<StimStep> {
    let (mut negative, mut too_large) = (false, false);
    let mut value = |i: usize| -> u32 {
        let v = data[i];
        if v < 0 && !negative {
            warn!("trigger channel contains negative values, using absolute value");
            negative = true;
        }
        u32::try_from(v.unsigned_abs()).unwrap_or_else(|_| {
            if !too_large {
                warn!(value = v, "trigger value exceeds 32 bits, clamping");
                too_large = true;
            }
            u32::MAX
        })
    };

    let mut steps = Vec::new();
    for i in 1..data.len() {
        let prev = value(i - 1);
        let code = value(i);
        if prev != code {
            steps.push(StimStep::new(first_samp + i as i64, prev, code));
        }
    }

    if merge == 0 || steps.len() < 2 {
        return steps;
    }

    let close: Vec<bool> = steps
        .windows(2)
        .map(|w| w[1].sample - w[0].sample <= merge.abs())
        .collect();
    if !close.iter().any(|&c| c) {
        return steps;
    }

    let orig = steps.clone();
    let mut keep = vec![true; steps.len()];
    for (i, &c) in close.iter().enumerate() {
        if !c {
            continue;
        }
        if merge > 0 {
            steps[i + 1].prev = orig[i].prev;
            keep[i] = false;
        } else {
            steps[i].code = orig[i + 1].code;
            keep[i + 1] = false;
        }
    }
    let merged: Vec<StimStep> = steps
        .into_iter()
        .zip(keep)
        .filter(|(s, k)| *k && s.prev != s.code)
        .map(|(s, _)| s)
        .collect();
    debug!(before = orig.len(), after = merged.len(), merge, "merged stim steps");
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn no_steps_in_flat_channel() {
        assert!(find_stim_steps(&[0, 0, 0, 0], 0, 0).is_empty());
        assert!(find_stim_steps(&[], 0, 0).is_empty());
        assert!(find_stim_steps(&[7], 0, -2).is_empty());
    }

    #[test]
    fn onsets_and_offsets() {
        let data = [0, 0, 5, 5, 0, 0, 9];
        let steps = find_stim_steps(&data, 100, 0);
        assert_eq!(
            steps,
            vec![
                StimStep::new(102, 0, 5),
                StimStep::new(104, 5, 0),
                StimStep::new(106, 0, 9),
            ]
        );
    }

    #[test]
    fn negative_values_use_abs() {
        let steps = find_stim_steps(&[0, -3, -3, 0], 0, 0);
        assert_eq!(steps, vec![StimStep::new(1, 0, 3), StimStep::new(3, 3, 0)]);
    }

    #[test]
    fn merge_negative_keeps_earlier_step() {
        // Lines flip one sample apart: 0 → 1 → 33.
        let data = [0, 0, 1, 33, 33, 33, 0];
        let steps = find_stim_steps(&data, 0, -2);
        assert_eq!(steps, vec![StimStep::new(2, 0, 33), StimStep::new(6, 33, 0)]);
    }

    #[test]
    fn merge_positive_keeps_later_step() {
        let data = [0, 0, 1, 33, 33, 33, 0];
        let steps = find_stim_steps(&data, 0, 2);
        assert_eq!(steps, vec![StimStep::new(3, 0, 33), StimStep::new(6, 33, 0)]);
    }

    #[test]
    fn merge_drops_glitch() {
        // A one-sample blip that returns to the same value disappears.
        let data = [4, 4, 6, 4, 4];
        let steps = find_stim_steps(&data, 0, -2);
        assert!(steps.is_empty());
    }

    #[test]
    fn oversized_values_are_clamped() {
        let big = i64::from(u32::MAX) + 5;
        let steps = find_stim_steps(&[0, big, -big, 3], 0, 0);
        assert_eq!(
            steps,
            vec![StimStep::new(1, 0, u32::MAX), StimStep::new(3, u32::MAX, 3)]
        );
    }

    #[test]
    fn merge_does_not_cascade() {
        // Three steps within the window: the first takes the second's value only.
        let data = [0, 1, 3, 7, 7, 7];
        let steps = find_stim_steps(&data, 0, -2);
        assert_eq!(steps, vec![StimStep::new(1, 0, 3)]);
    }

    #[test]
    fn combine_lines_threshold() {
        let lines = array![[0.5, 1.5, 0.0], [2.0, 2.0, 0.0], [0.0, 0.0, 3.0]];
        assert_eq!(combine_binary_channels(lines.view(), BitOrder::LittleEndian, 1.0), vec![2, 3, 4]);
        assert_eq!(combine_binary_channels(lines.view(), BitOrder::BigEndian, 1.0), vec![2, 6, 1]);
    }

    #[test]
    fn concatenate_keeps_first_samp() {
        let a = TriggerChannel { first_samp: 10, sfreq: 1000.0, data: vec![0, 1] };
        let b = TriggerChannel { first_samp: 0, sfreq: 1000.0, data: vec![1, 0] };
        let joined = concatenate(vec![a, b]).unwrap().unwrap();
        assert_eq!(joined.first_samp, 10);
        assert_eq!(joined.data, vec![0, 1, 1, 0]);
        assert_eq!(
            joined.steps(0),
            vec![StimStep::new(11, 0, 1), StimStep::new(13, 1, 0)]
        );
    }

    #[test]
    fn concatenate_rejects_mixed_sfreq() {
        let a = TriggerChannel { first_samp: 0, sfreq: 1000.0, data: vec![0] };
        let b = TriggerChannel { first_samp: 0, sfreq: 500.0, data: vec![0] };
        assert!(concatenate(vec![a, b]).is_err());
        assert!(concatenate(vec![]).unwrap().is_none());
    }

    #[test]
    fn trigger_source_json() {
        let src: TriggerSource =
            serde_json::from_str(r#"{"lines": {"names": ["MISC 001", "MISC 002"], "order": ">"}}"#)
                .unwrap();
        assert_eq!(
            src,
            TriggerSource::Lines {
                names: vec!["MISC 001".into(), "MISC 002".into()],
                order: BitOrder::BigEndian,
                threshold: 1.0,
            }
        );
        let src: TriggerSource = serde_json::from_str(r#"{"channel": "STI 101"}"#).unwrap();
        assert_eq!(src, TriggerSource::Channel("STI 101".into()));
    }
}
