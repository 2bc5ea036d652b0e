//! Stimulus list counterbalancing.
//!
//! The master stimulus table (comma-separated, one item per row, with a
//! header) is normalised and split into two presentation lists so that each
//! participant sees every item family once:
//!
//! * `prime` is lowercased; `target` and `post` are lowercased too, except
//!   the `Incorrect` foil which is uppercased;
//! * the `blank` column is dropped;
//! * list 1 takes rows `0 mod 4` followed by rows `3 mod 4`,
//!   list 2 takes rows `1 mod 4` followed by rows `2 mod 4`.
use anyhow::{Context, Result};

use crate::error::DecodeError;

const INCORRECT: &str = "Incorrect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusTable {
    pub header: Vec<String>,
    pub rows:   Vec<Vec<String>>,
}

impl StimulusTable {
    /// Parse comma-separated text; the first line is the header.
    pub fn parse_csv(text: &str) -> Result<Self> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let header: Vec<String> = lines
            .next()
            .context("stimulus table is empty")?
            .split(',')
            .map(|h| h.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for (i, line) in lines.enumerate() {
            let row: Vec<String> = line.split(',').map(|v| v.trim().to_string()).collect();
            if row.len() != header.len() {
                return Err(DecodeError::RaggedRow { row: i + 1, got: row.len(), expected: header.len() }.into());
            }
            rows.push(row);
        }
        Ok(Self { header, rows })
    }

    pub fn column(&self, name: &str) -> Result<usize, DecodeError> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| DecodeError::MissingColumn(name.to_string()))
    }

    /// Header and rows, tab-separated, newline after every line.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for line in std::iter::once(&self.header).chain(&self.rows) {
            out.push_str(&line.join("\t"));
            out.push('\n');
        }
        out
    }
}

fn normalise_word(word: &str) -> String {
    if word == INCORRECT {
        word.to_uppercase()
    } else {
        word.to_lowercase()
    }
}

/// Normalise `table` and split it into the two counterbalanced lists.
pub fn counterbalance(table: &StimulusTable) -> Result<(StimulusTable, StimulusTable), DecodeError> {
    let prime = table.column("prime")?;
    let target = table.column("target")?;
    let post = table.column("post")?;
    let blank = table.column("blank")?;

    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(i, _)| *i != blank)
                .map(|(i, v)| match i {
                    i if i == prime => v.to_lowercase(),
                    i if i == target || i == post => normalise_word(v),
                    _ => v.clone(),
                })
                .collect()
        })
        .collect();
    let mut header = table.header.clone();
    header.remove(blank);

    let pick = |phases: [usize; 2]| -> StimulusTable {
        let rows = phases
            .iter()
            .flat_map(|&phase| rows.iter().skip(phase).step_by(4).cloned())
            .collect();
        StimulusTable { header: header.clone(), rows }
    };
    Ok((pick([0, 3]), pick([1, 2])))
}
