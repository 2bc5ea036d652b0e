//! Measurement info: the channel list and sampling rate.
use std::io::{Read, Seek};
use anyhow::{anyhow, bail, Result};

use super::constants::*;
use super::tag::*;
use super::tree::Node;

/// One `FIFFT_CH_INFO_STRUCT` entry.
///
/// Payload layout (big-endian, 96 bytes):
/// ```text
///  0  scanno  i32     4  logno  i32     8  kind  i32
/// 12  range   f32    16  cal    f32    20  coil_type i32
/// 24  loc     12 × f32
/// 72  unit    i32    76  unit_mul i32
/// 80  name    16 × u8, NUL padded Latin-1
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub scan_no: i32,
    pub kind:    i32,
    pub range:   f32,
    pub cal:     f32,
    pub name:    String,
}

pub const CH_INFO_LEN: usize = 96;

impl ChannelInfo {
    /// Factor taking stored values to physical units.
    #[inline]
    pub fn calibration(&self) -> f64 {
        self.cal as f64 * self.range as f64
    }

    pub fn is_stim(&self) -> bool {
        self.kind == FIFFV_STIM_CH
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < CH_INFO_LEN {
            bail!("ch_info payload too short: {} bytes (need {CH_INFO_LEN})", raw.len());
        }
        let i32_at = |o: usize| i32::from_be_bytes([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]);
        let f32_at = |o: usize| f32::from_be_bytes([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]);
        let name_bytes = &raw[80..96];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        Ok(ChannelInfo {
            scan_no: i32_at(0),
            kind:    i32_at(8),
            range:   f32_at(12),
            cal:     f32_at(16),
            name:    name_bytes[..end].iter().map(|&b| b as char).collect(),
        })
    }

    /// Inverse of [`ChannelInfo::from_bytes`]; unused fields are written as 0.
    pub fn to_bytes(&self) -> [u8; CH_INFO_LEN] {
        let mut out = [0u8; CH_INFO_LEN];
        out[0..4].copy_from_slice(&self.scan_no.to_be_bytes());
        out[4..8].copy_from_slice(&self.scan_no.to_be_bytes());
        out[8..12].copy_from_slice(&self.kind.to_be_bytes());
        out[12..16].copy_from_slice(&self.range.to_be_bytes());
        out[16..20].copy_from_slice(&self.cal.to_be_bytes());
        for (dst, b) in out[80..96].iter_mut().zip(self.name.chars().map(|c| c as u8)) {
            *dst = b;
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasInfo {
    pub n_chan:       usize,
    pub sfreq:        f64,
    pub chs:          Vec<ChannelInfo>,
    pub bad_ch_names: Vec<String>,
}

impl MeasInfo {
    pub fn cals(&self) -> Vec<f64> {
        self.chs.iter().map(ChannelInfo::calibration).collect()
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.chs.iter().map(|c| c.name.as_str()).collect()
    }

    /// Indices of all stim channels.
    pub fn stim_picks(&self) -> Vec<usize> {
        self.chs.iter().enumerate().filter(|(_, c)| c.is_stim()).map(|(i, _)| i).collect()
    }
}

pub fn read_meas_info<R: Read + Seek>(reader: &mut R, tree: &Node) -> Result<MeasInfo> {
    let info_node = tree
        .find_block(FIFFB_MEAS)
        .and_then(|m| m.find_block(FIFFB_MEAS_INFO))
        .ok_or_else(|| anyhow!("FIFFB_MEAS_INFO block not found"))?;

    let mut n_chan = None::<usize>;
    let mut sfreq = None::<f64>;
    let mut chs = Vec::new();
    let mut bad_ch_names = Vec::new();

    for ent in &info_node.entries {
        match ent.kind {
            FIFF_NCHAN => n_chan = Some(read_i32(reader, ent)?.max(0) as usize),
            FIFF_SFREQ => sfreq = Some(read_f32(reader, ent)? as f64),
            FIFF_CH_INFO => chs.push(ChannelInfo::from_bytes(&read_raw_bytes(reader, ent)?)?),
            FIFF_BAD_CHS => {
                bad_ch_names = read_string(reader, ent)?
                    .split(':')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => {}
        }
    }

    let n_chan = n_chan.ok_or_else(|| anyhow!("FIFF_NCHAN not found"))?;
    let sfreq = sfreq.ok_or_else(|| anyhow!("FIFF_SFREQ not found"))?;
    if chs.len() != n_chan {
        bail!("expected {n_chan} ch_info structs, got {}", chs.len());
    }
    Ok(MeasInfo { n_chan, sfreq, chs, bad_ch_names })
}
