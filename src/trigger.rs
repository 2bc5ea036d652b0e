//! Trigger code bit fields.
//!
//! The presentation computer writes one integer per stimulus onset onto the
//! trigger channel. Each experiment variant packs its trial structure into
//! that integer differently:
//!
//! ```text
//! OLDT  bit  5    4         3 2           1 0
//!            │    │         └┬┘           └┬┘
//!          block semantic  nonword_pos   current_pos
//!
//! SENT  bit  4    3         2 1 0
//!            │    │         └─┬─┘
//!          block semantic   current_pos
//! ```
//!
//! `current_pos` is the slot of the event inside the trial
//! (0 = fixation, 1 = prime, 2 = target for OLDT, 3 = target for SENT).
//! `nonword_pos` names the slot holding a nonword (0 = none).
//! The block bit marks which task the event belongs to, so a session
//! recorded across both tasks can be split by variant.
use std::fmt;
use std::str::FromStr;

use crate::error::DecodeError;

// ── Masks ─────────────────────────────────────────────────────────────────

pub const OLDT_POS_MASK:      u32 = 0b0000_0011;
pub const OLDT_NONWORD_MASK:  u32 = 0b0000_1100;
pub const OLDT_NONWORD_SHIFT: u32 = 2;
pub const OLDT_SEMANTIC_BIT:  u32 = 1 << 4;
pub const OLDT_BLOCK_BIT:     u32 = 1 << 5;

pub const SENT_POS_MASK:      u32 = 0b0000_0111;
pub const SENT_SEMANTIC_BIT:  u32 = 1 << 3;
pub const SENT_BLOCK_BIT:     u32 = 1 << 4;

// ── Composite condition code ──────────────────────────────────────────────

pub const COND_PRIME:   u32 = 1;
pub const COND_TARGET:  u32 = 2;
pub const COND_PRIMED:  u32 = 4;
pub const COND_NONWORD: u32 = 8;

/// Master-file code for prime and target onsets.
pub const ALIGNMENT_CODE: u32 = 64;
/// Master-file code for fixation onsets.
pub const FIXATION_CODE:  u32 = 128;

// ── Variant ───────────────────────────────────────────────────────────────

/// Experiment variant, selecting the bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// Overt lexical decision task.
    Oldt,
    /// Sentence reading task.
    Sent,
}

impl Variant {
    /// Parse an experiment tag by prefix, so run names like `OLDT1` resolve.
    ///
    /// ```
    /// use emeg::Variant;
    /// assert_eq!(Variant::from_tag("OLDT2").unwrap(), Variant::Oldt);
    /// assert!(Variant::from_tag("RSVP").is_err());
    /// ```
    pub fn from_tag(tag: &str) -> Result<Self, DecodeError> {
        if tag.starts_with("OLDT") {
            Ok(Variant::Oldt)
        } else if tag.starts_with("SENT") {
            Ok(Variant::Sent)
        } else {
            Err(DecodeError::InvalidExperimentVariant(tag.to_string()))
        }
    }

    /// Bit that marks an event as belonging to this variant's block.
    #[inline]
    pub fn block_bit(self) -> u32 {
        match self {
            Variant::Oldt => OLDT_BLOCK_BIT,
            Variant::Sent => SENT_BLOCK_BIT,
        }
    }

    /// `current_pos` value of the target slot.
    #[inline]
    pub fn target_pos(self) -> u8 {
        match self {
            Variant::Oldt => 2,
            Variant::Sent => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Oldt => "OLDT",
            Variant::Sent => "SENT",
        }
    }
}

impl FromStr for Variant {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::from_tag(s)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Bit-field record ──────────────────────────────────────────────────────

/// The named fields of one raw trigger code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerFields {
    pub current_pos: u8,
    /// Always 0 for SENT.
    pub nonword_pos: u8,
    pub semantic:    bool,
    pub block:       bool,
}

impl TriggerFields {
    /// Extract the fields of `code` under `variant`'s layout.
    pub fn extract(code: u32, variant: Variant) -> Self {
        match variant {
            Variant::Oldt => Self {
                current_pos: (code & OLDT_POS_MASK) as u8,
                nonword_pos: ((code & OLDT_NONWORD_MASK) >> OLDT_NONWORD_SHIFT) as u8,
                semantic:    code & OLDT_SEMANTIC_BIT != 0,
                block:       code & OLDT_BLOCK_BIT != 0,
            },
            Variant::Sent => Self {
                current_pos: (code & SENT_POS_MASK) as u8,
                nonword_pos: 0,
                semantic:    code & SENT_SEMANTIC_BIT != 0,
                block:       code & SENT_BLOCK_BIT != 0,
            },
        }
    }

    /// Slot matches the designated nonword slot, and that slot is not "none".
    #[inline]
    pub fn is_nonword(&self) -> bool {
        self.nonword_pos != 0 && self.current_pos == self.nonword_pos
    }

    /// Word test as used by the presentation script: a slot other than the
    /// nonword slot, which is either before it, in a trial without a nonword,
    /// or not the fixation.
    #[inline]
    pub fn is_word(&self) -> bool {
        self.current_pos != self.nonword_pos
            && (self.current_pos < self.nonword_pos
                || self.nonword_pos == 0
                || self.current_pos != 0)
    }
}

// ── Labels ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Fixation,
    Prime,
    Target,
    /// A slot the trial structure does not use (reserved codes).
    Other(u8),
}

impl Position {
    /// Fixation, prime and target onsets; the rest is ignored downstream.
    #[inline]
    pub fn is_structural(self) -> bool {
        !matches!(self, Position::Other(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lexicality {
    Word,
    Nonword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priming {
    Primed,
    Unprimed,
}

/// Semantic label of one trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label {
    pub position:   Position,
    /// OLDT prime/target only.
    pub lexicality: Option<Lexicality>,
    /// Targets that are words only.
    pub priming:    Option<Priming>,
}

impl Label {
    /// Composite code: +1 prime, +2 target, +4 primed target, +8 nonword.
    pub fn condition(&self) -> u32 {
        let mut code = 0;
        match self.position {
            Position::Prime => code += COND_PRIME,
            Position::Target => code += COND_TARGET,
            _ => {}
        }
        if self.priming == Some(Priming::Primed) {
            code += COND_PRIMED;
        }
        if self.lexicality == Some(Lexicality::Nonword) {
            code += COND_NONWORD;
        }
        code
    }

    /// Sentinel written to the master event file, `None` for reserved slots.
    pub fn sentinel(&self) -> Option<u32> {
        match self.position {
            Position::Fixation => Some(FIXATION_CODE),
            Position::Prime | Position::Target => Some(ALIGNMENT_CODE),
            Position::Other(_) => None,
        }
    }

    /// Slash-separated name in the style of the analysis event ids,
    /// e.g. `word/target/primed` or `nonword/prime`.
    pub fn name(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        match self.lexicality {
            Some(Lexicality::Word) => parts.push("word"),
            Some(Lexicality::Nonword) => parts.push("nonword"),
            None => {}
        }
        let pos = match self.position {
            Position::Fixation => "fixation".to_string(),
            Position::Prime => "prime".to_string(),
            Position::Target => "target".to_string(),
            Position::Other(p) => format!("pos{p}"),
        };
        let mut out = parts.join("/");
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&pos);
        match self.priming {
            Some(Priming::Primed) => out.push_str("/primed"),
            Some(Priming::Unprimed) => out.push_str("/unprimed"),
            None => {}
        }
        out
    }
}

/// Classify one raw trigger code. Pure in `(code, variant)`.
pub fn classify(code: u32, variant: Variant) -> Label {
    let f = TriggerFields::extract(code, variant);
    let position = match f.current_pos {
        0 => Position::Fixation,
        1 => Position::Prime,
        p if p == variant.target_pos() => Position::Target,
        p => Position::Other(p),
    };

    let lexicality = match (variant, position) {
        (Variant::Oldt, Position::Prime | Position::Target) => Some(if f.is_nonword() {
            Lexicality::Nonword
        } else {
            Lexicality::Word
        }),
        _ => None,
    };

    // SENT has no nonwords, so every target there counts as a word.
    let target_word = position == Position::Target
        && match variant {
            Variant::Oldt => f.is_word(),
            Variant::Sent => true,
        };
    let priming = target_word.then(|| {
        if f.semantic { Priming::Primed } else { Priming::Unprimed }
    });

    Label { position, lexicality, priming }
}

/// Event ids used by the downstream epoching, keyed by [`Label::name`].
pub fn event_id() -> Vec<(&'static str, u32)> {
    vec![
        ("word/prime/unprimed",  1),
        ("word/target/unprimed", 2),
        ("word/prime/primed",    5),
        ("word/target/primed",   6),
        ("nonword/prime",        9),
        ("nonword/target",      10),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oldt(current: u32, nonword: u32, semantic: bool) -> u32 {
        OLDT_BLOCK_BIT | current | (nonword << 2) | if semantic { OLDT_SEMANTIC_BIT } else { 0 }
    }

    #[test]
    fn variant_prefixes() {
        assert_eq!(Variant::from_tag("OLDT").unwrap(), Variant::Oldt);
        assert_eq!(Variant::from_tag("OLDT1").unwrap(), Variant::Oldt);
        assert_eq!(Variant::from_tag("SENT2").unwrap(), Variant::Sent);
        assert_eq!(
            Variant::from_tag("oldt"),
            Err(DecodeError::InvalidExperimentVariant("oldt".into()))
        );
        assert!("LEX".parse::<Variant>().is_err());
    }

    #[test]
    fn extract_oldt_fields() {
        let f = TriggerFields::extract(0b11_1110, Variant::Oldt);
        assert_eq!(f.current_pos, 2);
        assert_eq!(f.nonword_pos, 3);
        assert!(f.semantic);
        assert!(f.block);
    }

    #[test]
    fn extract_sent_fields() {
        let f = TriggerFields::extract(0b1_1011, Variant::Sent);
        assert_eq!(f.current_pos, 3);
        assert_eq!(f.nonword_pos, 0);
        assert!(f.semantic);
        assert!(f.block);
        assert!(!TriggerFields::extract(0b0_0011, Variant::Sent).block);
    }

    #[test]
    fn primed_target_word() {
        let label = classify(oldt(2, 0, true), Variant::Oldt);
        assert_eq!(label.position, Position::Target);
        assert_eq!(label.lexicality, Some(Lexicality::Word));
        assert_eq!(label.priming, Some(Priming::Primed));
        assert_eq!(label.condition(), 6);
        assert_eq!(label.sentinel(), Some(ALIGNMENT_CODE));
        assert_eq!(label.name(), "word/target/primed");
    }

    #[test]
    fn nonword_prime() {
        let label = classify(oldt(1, 1, false), Variant::Oldt);
        assert_eq!(label.position, Position::Prime);
        assert_eq!(label.lexicality, Some(Lexicality::Nonword));
        assert_eq!(label.priming, None);
        assert_eq!(label.condition(), 9);
        assert_eq!(label.sentinel(), Some(ALIGNMENT_CODE));
    }

    #[test]
    fn nonword_target_is_never_primed() {
        let label = classify(oldt(2, 2, true), Variant::Oldt);
        assert_eq!(label.lexicality, Some(Lexicality::Nonword));
        assert_eq!(label.priming, None);
        assert_eq!(label.condition(), 10);
    }

    #[test]
    fn nonword_rule_over_all_fields() {
        for cur in 1..=2u32 {
            for nw in 0..=3u32 {
                for sem in [false, true] {
                    let label = classify(oldt(cur, nw, sem), Variant::Oldt);
                    let expected = if cur == nw && nw != 0 {
                        Lexicality::Nonword
                    } else {
                        Lexicality::Word
                    };
                    assert_eq!(label.lexicality, Some(expected), "cur={cur} nw={nw}");
                }
            }
        }
    }

    #[test]
    fn fixation_sentinel() {
        let label = classify(oldt(0, 2, false), Variant::Oldt);
        assert_eq!(label.position, Position::Fixation);
        assert_eq!(label.lexicality, None);
        assert_eq!(label.condition(), 0);
        assert_eq!(label.sentinel(), Some(FIXATION_CODE));

        let label = classify(SENT_BLOCK_BIT, Variant::Sent);
        assert_eq!(label.position, Position::Fixation);
        assert_eq!(label.sentinel(), Some(FIXATION_CODE));
    }

    #[test]
    fn sent_target_and_unused_slot() {
        let label = classify(SENT_BLOCK_BIT | SENT_SEMANTIC_BIT | 3, Variant::Sent);
        assert_eq!(label.position, Position::Target);
        assert_eq!(label.lexicality, None);
        assert_eq!(label.priming, Some(Priming::Primed));
        assert_eq!(label.condition(), 6);

        let label = classify(SENT_BLOCK_BIT | 2, Variant::Sent);
        assert_eq!(label.position, Position::Other(2));
        assert_eq!(label.sentinel(), None);
    }

    #[test]
    fn oldt_reserved_slot() {
        let label = classify(oldt(3, 0, false), Variant::Oldt);
        assert_eq!(label.position, Position::Other(3));
        assert!(!label.position.is_structural());
    }

    #[test]
    fn composite_codes_stay_below_sentinels() {
        for code in 0..64u32 {
            for variant in [Variant::Oldt, Variant::Sent] {
                let c = classify(code, variant).condition();
                assert!(c < ALIGNMENT_CODE, "code={code} cond={c}");
            }
        }
    }

    #[test]
    fn event_id_names_match_labels() {
        let table = event_id();
        let cases = [
            (oldt(1, 0, false), "word/prime"),
            (oldt(2, 0, false), "word/target/unprimed"),
            (oldt(2, 0, true), "word/target/primed"),
            (oldt(1, 1, false), "nonword/prime"),
            (oldt(2, 2, false), "nonword/target"),
        ];
        for (code, name) in cases {
            let label = classify(code, Variant::Oldt);
            assert_eq!(label.name(), name);
            if let Some((_, id)) = table.iter().find(|(n, _)| *n == name) {
                assert_eq!(*id, label.condition(), "{name}");
            }
        }
    }
}
