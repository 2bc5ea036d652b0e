//! Continuous-data access for a raw FIF recording.
//!
//! Opening a file reads the directory, the block tree and the measurement
//! info, then records where each data buffer sits. Samples are only read on
//! request, and only for the channels asked for, which keeps pulling a single
//! stim channel out of a 160-channel recording cheap.
//!
//! Buffers are stored `[n_samp, n_chan]` interleaved, big-endian; values are
//! scaled by `cal × range` per channel on the way out.
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use ndarray::{s, Array2};
use tracing::debug;

use super::constants::*;
use super::info::{read_meas_info, MeasInfo};
use super::tag::{read_i32, TagHeader};
use super::tree::{load_directory, read_tree};

/// One data buffer, or a skipped gap when `tag` is `None`.
#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub tag:        Option<TagHeader>,
    pub first_samp: u64,
    pub n_samp:     usize,
}

#[derive(Debug, Clone)]
pub struct RawFif {
    pub info:       MeasInfo,
    pub first_samp: u64,
    /// Inclusive.
    pub last_samp:  u64,
    pub path:       PathBuf,
    pub buffers:    Vec<BufferRecord>,
}

impl RawFif {
    #[inline]
    pub fn n_times(&self) -> usize {
        (self.last_samp - self.first_samp + 1) as usize
    }

    /// Calibrated samples of `picks`, shape `[picks.len(), n_times]`.
    /// Gaps read as zeros.
    pub fn read_channels(&self, picks: &[usize]) -> Result<Array2<f64>> {
        let n_ch = self.info.n_chan;
        if let Some(&bad) = picks.iter().find(|&&p| p >= n_ch) {
            bail!("channel index {bad} out of range ({n_ch} channels)");
        }
        let cals = self.info.cals();
        let mut out = Array2::<f64>::zeros((picks.len(), self.n_times()));

        let file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut reader = BufReader::new(file);
        let mut t0 = 0usize;

        for buf in &self.buffers {
            if let Some(tag) = &buf.tag {
                let block = read_buffer(&mut reader, tag, buf.n_samp, n_ch, picks, &cals)?;
                out.slice_mut(s![.., t0..t0 + buf.n_samp]).assign(&block);
            }
            t0 += buf.n_samp;
        }
        Ok(out)
    }
}

/// Open `path` without reading any samples.
pub fn open_raw<P: AsRef<Path>>(path: P) -> Result<RawFif> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let directory = load_directory(&mut reader)
        .with_context(|| format!("read tag directory of {}", path.display()))?;
    let tree = read_tree(&mut reader, &directory)?;
    let info = read_meas_info(&mut reader, &tree)?;

    let meas = tree
        .find_block(FIFFB_MEAS)
        .ok_or_else(|| anyhow!("FIFFB_MEAS not found"))?;
    let raw_node = meas
        .find_block(FIFFB_RAW_DATA)
        .or_else(|| meas.find_block(FIFFB_CONTINUOUS_DATA))
        .ok_or_else(|| anyhow!("no raw-data block in {}", path.display()))?;

    let mut first_samp: u64 = 0;
    if let Some(tag) = raw_node.tags(FIFF_FIRST_SAMPLE).next() {
        first_samp = read_i32(&mut reader, tag)?.max(0) as u64;
    }

    // A skip count before the first buffer shifts first_samp; later ones
    // become zero-filled gaps sized like the buffer that follows.
    let mut buffers: Vec<BufferRecord> = Vec::new();
    let mut pending_skip: usize = 0;
    let mut sample = first_samp;

    for ent in &raw_node.entries {
        match ent.kind {
            FIFF_DATA_SKIP => pending_skip += read_i32(&mut reader, ent)?.max(0) as usize,
            FIFF_DATA_BUFFER => {
                let bps = bytes_per_sample(ent.ftype)
                    .ok_or_else(|| anyhow!("unknown buffer type {}", ent.ftype))?;
                let n_samp = ent.size.max(0) as usize / (bps * info.n_chan.max(1));
                if pending_skip > 0 {
                    let gap = n_samp * pending_skip;
                    if buffers.is_empty() {
                        sample += gap as u64;
                    } else {
                        buffers.push(BufferRecord { tag: None, first_samp: sample, n_samp: gap });
                        sample += gap as u64;
                    }
                    pending_skip = 0;
                }
                buffers.push(BufferRecord { tag: Some(*ent), first_samp: sample, n_samp });
                sample += n_samp as u64;
            }
            _ => {}
        }
    }

    let Some(first) = buffers.first() else {
        bail!("no FIFF_DATA_BUFFER tags in {}", path.display());
    };
    let first_samp = first.first_samp;
    if sample <= first_samp {
        bail!("raw-data block of {} holds no samples", path.display());
    }
    debug!(
        path = %path.display(),
        n_chan = info.n_chan,
        sfreq = info.sfreq,
        n_buffers = buffers.len(),
        "opened raw recording"
    );
    Ok(RawFif {
        info,
        first_samp,
        last_samp: sample - 1,
        path: path.to_path_buf(),
        buffers,
    })
}

/// Read one buffer and keep only `picks`, returning `[picks.len(), n_samp]`.
fn read_buffer<R: Read + Seek>(
    reader: &mut R,
    tag:    &TagHeader,
    n_samp: usize,
    n_chan: usize,
    picks:  &[usize],
    cals:   &[f64],
) -> Result<Array2<f64>> {
    let bps = bytes_per_sample(tag.ftype)
        .ok_or_else(|| anyhow!("unsupported buffer type {}", tag.ftype))?;
    reader
        .seek(SeekFrom::Start(tag.data_pos()))
        .with_context(|| format!("seek to buffer data @ {:#x}", tag.data_pos()))?;
    let mut bytes = vec![0u8; n_samp * n_chan * bps];
    reader.read_exact(&mut bytes)
        .with_context(|| format!("read buffer @ {:#x}", tag.data_pos()))?;

    let decode = |b: &[u8]| -> f64 {
        match tag.ftype {
            FIFFT_FLOAT => f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
            FIFFT_DOUBLE => f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
            FIFFT_INT => i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
            _ => i16::from_be_bytes([b[0], b[1]]) as f64,
        }
    };

    let mut out = Array2::<f64>::zeros((picks.len(), n_samp));
    for t in 0..n_samp {
        for (row, &c) in picks.iter().enumerate() {
            let off = (t * n_chan + c) * bps;
            out[[row, t]] = decode(&bytes[off..off + bps]) * cals[c];
        }
    }
    Ok(out)
}
