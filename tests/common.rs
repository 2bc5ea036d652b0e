/// Shared helpers: a minimal FIF writer and trigger-stream builders.
use std::path::Path;

use emeg::fiff::constants::*;
use emeg::fiff::ChannelInfo;
use emeg::trigger::{OLDT_BLOCK_BIT, OLDT_SEMANTIC_BIT};
use emeg::StimStep;

#[allow(unused)]
/// OLDT trigger code from its fields, block bit set.
pub fn oldt_code(current: u32, nonword: u32, semantic: bool) -> u32 {
    OLDT_BLOCK_BIT | current | (nonword << 2) | if semantic { OLDT_SEMANTIC_BIT } else { 0 }
}

#[allow(unused)]
/// Onset steps (prev = 0) at `spacing` sample intervals.
pub fn onsets(codes: &[u32], spacing: i64) -> Vec<StimStep> {
    codes
        .iter()
        .enumerate()
        .map(|(i, &c)| StimStep::new(i as i64 * spacing, 0, c))
        .collect()
}

#[allow(unused)]
/// A trigger channel holding each code for `hold` samples, separated by
/// `gap` samples of zero.
pub fn pulse_train(codes: &[u32], hold: usize, gap: usize) -> Vec<f32> {
    let mut out = vec![0.0; gap];
    for &c in codes {
        out.extend(std::iter::repeat(c as f32).take(hold));
        out.extend(std::iter::repeat(0.0).take(gap));
    }
    out
}

/// Writes a raw FIF file with float buffers and no embedded directory.
#[allow(unused)]
pub struct FifBuilder {
    pub sfreq:      f32,
    pub first_samp: i32,
    pub chs:        Vec<ChannelInfo>,
    /// `[n_chan][n_times]`
    pub data:       Vec<Vec<f32>>,
    /// Samples per buffer.
    pub buffer:     usize,
}

#[allow(unused)]
impl FifBuilder {
    pub fn new(sfreq: f32, first_samp: i32) -> Self {
        Self { sfreq, first_samp, chs: vec![], data: vec![], buffer: 100 }
    }

    pub fn channel(mut self, name: &str, kind: i32, samples: Vec<f32>) -> Self {
        self.chs.push(ChannelInfo {
            scan_no: self.chs.len() as i32 + 1,
            kind,
            range: 1.0,
            cal: 1.0,
            name: name.to_string(),
        });
        self.data.push(samples);
        self
    }

    pub fn write(&self, path: &Path) {
        let n_chan = self.chs.len();
        let n_times = self.data.iter().map(Vec::len).max().unwrap_or(0);
        let mut tags: Vec<(i32, u32, Vec<u8>)> = vec![
            (FIFF_FILE_ID, 31, vec![0u8; 20]),
            (FIFF_DIR_POINTER, FIFFT_INT, (-1_i32).to_be_bytes().to_vec()),
            (FIFF_BLOCK_START, FIFFT_INT, FIFFB_MEAS.to_be_bytes().to_vec()),
            (FIFF_BLOCK_START, FIFFT_INT, FIFFB_MEAS_INFO.to_be_bytes().to_vec()),
            (FIFF_NCHAN, FIFFT_INT, (n_chan as i32).to_be_bytes().to_vec()),
            (FIFF_SFREQ, FIFFT_FLOAT, self.sfreq.to_be_bytes().to_vec()),
        ];
        for ch in &self.chs {
            tags.push((FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, ch.to_bytes().to_vec()));
        }
        tags.push((FIFF_BLOCK_END, FIFFT_INT, FIFFB_MEAS_INFO.to_be_bytes().to_vec()));
        tags.push((FIFF_BLOCK_START, FIFFT_INT, FIFFB_RAW_DATA.to_be_bytes().to_vec()));
        tags.push((FIFF_FIRST_SAMPLE, FIFFT_INT, self.first_samp.to_be_bytes().to_vec()));

        let mut t0 = 0;
        while t0 < n_times {
            let t1 = (t0 + self.buffer).min(n_times);
            let mut payload = Vec::with_capacity((t1 - t0) * n_chan * 4);
            for t in t0..t1 {
                for ch in &self.data {
                    let v = ch.get(t).copied().unwrap_or(0.0);
                    payload.extend_from_slice(&v.to_be_bytes());
                }
            }
            tags.push((FIFF_DATA_BUFFER, FIFFT_FLOAT, payload));
            t0 = t1;
        }
        tags.push((FIFF_BLOCK_END, FIFFT_INT, FIFFB_RAW_DATA.to_be_bytes().to_vec()));
        tags.push((FIFF_BLOCK_END, FIFFT_INT, FIFFB_MEAS.to_be_bytes().to_vec()));

        let mut bytes = Vec::new();
        let last = tags.len() - 1;
        for (i, (kind, ftype, payload)) in tags.iter().enumerate() {
            let next: i32 = if i == last { -1 } else { 0 };
            bytes.extend_from_slice(&kind.to_be_bytes());
            bytes.extend_from_slice(&ftype.to_be_bytes());
            bytes.extend_from_slice(&(payload.len() as i32).to_be_bytes());
            bytes.extend_from_slice(&next.to_be_bytes());
            bytes.extend_from_slice(payload);
        }
        std::fs::write(path, bytes).unwrap();
    }
}
