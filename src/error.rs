//! Domain errors.
//!
//! File-level plumbing (FIFF parsing, event-file I/O) reports through
//! `anyhow`; the variants here are the failures callers may want to match on.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The experiment tag does not start with `OLDT` or `SENT`.
    #[error("this decoder only works for OLDTx or SENTx experiments, not {0:?}")]
    InvalidExperimentVariant(String),

    /// The requested trigger channel is not in the recording.
    #[error("trigger channel {0:?} not found in recording")]
    MissingTriggerChannel(String),

    /// Binary trigger decoding was asked for with no lines.
    #[error("no trigger lines given")]
    NoTriggerLines,

    /// Runs to concatenate disagree on sampling rate.
    #[error("cannot concatenate runs: sfreq {first} Hz vs {other} Hz")]
    SfreqMismatch { first: f64, other: f64 },

    /// A stimulus table is missing a column the counterbalancing needs.
    #[error("stimulus table has no {0:?} column")]
    MissingColumn(String),

    /// A stimulus table row has a different number of fields than the header.
    #[error("stimulus row {row} has {got} fields, header has {expected}")]
    RaggedRow { row: usize, got: usize, expected: usize },
}
