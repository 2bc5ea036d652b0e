//! Trigger decoding: raw stim steps → master, trial and co-registration streams.
//!
//! # Algorithm
//! 1. Keep steps whose block bit belongs to the variant and whose code is non-zero.
//! 2. Classify every kept code ([`classify`]) and compute its composite
//!    condition code.
//! 3. Recode fixation, prime and target onsets to the sentinels 128 / 64;
//!    reserved slots are dropped.
//! 4. Stable-sort by sample → *master* stream.
//! 5. Walk master: each fixation opens a new trial, every other event becomes
//!    a trial row → *trials* stream. Rows before the first fixation get trial
//!    id 0. The co-registration stream is the trial rows in event-file form.
//!
//! The function holds no state between calls, so subjects can be decoded in
//! parallel by the caller.
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::stim::StimStep;
use crate::trigger::{classify, Label, Position, Variant, FIXATION_CODE};

/// A kept trigger event with its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedEvent {
    /// The step as read; `step.code` is the raw trigger code.
    pub step:      StimStep,
    pub label:     Label,
    /// Composite priming/word code (see [`Label::condition`]).
    pub condition: u32,
    /// Sentinel written to the master file: 64 or 128.
    pub code:      u32,
}

impl DecodedEvent {
    #[inline]
    pub fn is_fixation(&self) -> bool {
        self.code == FIXATION_CODE
    }

    /// Row of the master event file.
    #[inline]
    pub fn master_row(&self) -> StimStep {
        StimStep::new(self.step.sample, self.step.prev, self.code)
    }

    /// Row of the conditions event file.
    #[inline]
    pub fn condition_row(&self) -> StimStep {
        StimStep::new(self.step.sample, self.step.prev, self.condition)
    }
}

/// One line of the trials file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialRow {
    /// Incremented at every fixation, so the first trial is 1; events before
    /// the first fixation carry 0.
    pub trial_id: u32,
    pub sample:   i64,
    pub prev:     u32,
    /// Master-file code of the event.
    pub trigger:  u32,
}

impl TrialRow {
    #[inline]
    pub fn as_step(&self) -> StimStep {
        StimStep::new(self.sample, self.prev, self.trigger)
    }
}

/// Everything decoded from one subject's trigger stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedEvents {
    pub variant_tag: String,
    /// Structural events sorted by sample.
    pub master:      Vec<DecodedEvent>,
    /// One row per non-fixation master event.
    pub trials:      Vec<TrialRow>,
}

impl DecodedEvents {
    pub fn master_rows(&self) -> Vec<StimStep> {
        self.master.iter().map(DecodedEvent::master_row).collect()
    }

    pub fn condition_rows(&self) -> Vec<StimStep> {
        self.master.iter().map(DecodedEvent::condition_row).collect()
    }

    /// Co-registration stream: the trial rows in event-file form.
    pub fn coreg(&self) -> Vec<StimStep> {
        self.trials.iter().map(TrialRow::as_step).collect()
    }

    pub fn n_trials(&self) -> u32 {
        self.trials.last().map_or(0, |r| r.trial_id)
    }

    pub fn is_empty(&self) -> bool {
        self.master.is_empty()
    }
}

/// Decode `steps` under the experiment tagged `exp` (`OLDT…` or `SENT…`).
pub fn make_events(steps: &[StimStep], exp: &str) -> Result<DecodedEvents, DecodeError> {
    let variant = Variant::from_tag(exp)?;
    Ok(decode_steps(steps, variant, exp))
}

fn decode_steps(steps: &[StimStep], variant: Variant, tag: &str) -> DecodedEvents {
    let block_bit = variant.block_bit();
    let mut other_block = 0usize;
    let mut reserved = 0usize;

    let mut master: Vec<DecodedEvent> = Vec::new();
    for step in steps {
        if step.code == 0 {
            continue;
        }
        if step.code & block_bit == 0 {
            other_block += 1;
            continue;
        }
        let label = classify(step.code, variant);
        let Some(code) = label.sentinel() else {
            reserved += 1;
            continue;
        };
        master.push(DecodedEvent { step: *step, label, condition: label.condition(), code });
    }
    master.sort_by_key(|e| e.step.sample);

    let trials = number_trials(&master);
    debug!(
        variant = %variant,
        n_steps = steps.len(),
        n_events = master.len(),
        n_trials = trials.last().map_or(0, |r| r.trial_id),
        other_block,
        reserved,
        "decoded trigger stream"
    );

    DecodedEvents { variant_tag: tag.to_string(), master, trials }
}

/// Split sorted master events into trials at each fixation.
fn number_trials(master: &[DecodedEvent]) -> Vec<TrialRow> {
    let mut trial_id = 0u32;
    let mut orphans = 0usize;
    let mut rows = Vec::with_capacity(master.len());
    for ev in master {
        if ev.is_fixation() {
            trial_id += 1;
            continue;
        }
        if trial_id == 0 {
            orphans += 1;
        }
        rows.push(TrialRow {
            trial_id,
            sample:  ev.step.sample,
            prev:    ev.step.prev,
            trigger: ev.code,
        });
    }
    if orphans > 0 {
        warn!(orphans, "events before the first fixation, written as trial 0");
    }
    rows
}

/// Count master events per position, for the run summary.
pub fn position_counts(events: &DecodedEvents) -> [(Position, usize); 3] {
    let count = |p: Position| events.master.iter().filter(|e| e.label.position == p).count();
    [
        (Position::Fixation, count(Position::Fixation)),
        (Position::Prime, count(Position::Prime)),
        (Position::Target, count(Position::Target)),
    ]
}
