//! FIFF tag headers and the payload readers the trigger reader uses.
//!
//! Every tag is a 16-byte big-endian header followed by `size` payload bytes:
//!
//! ```text
//! kind : i32 │ type : u32 │ size : i32 │ next : i32 │ payload …
//! ```
//!
//! `next == 0` continues right after the payload, `next > 0` is an absolute
//! offset and `next == -1` ends the chain.
use std::io::{Read, Seek, SeekFrom};
use anyhow::{bail, Context, Result};

use super::constants::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub kind:  i32,
    pub ftype: u32,
    pub size:  i32,
    pub next:  i32,
    /// Byte offset of the header.
    pub pos:   u64,
}

impl TagHeader {
    #[inline]
    pub fn data_pos(&self) -> u64 {
        self.pos + 16
    }

    pub fn next_pos(&self) -> Option<u64> {
        match self.next {
            FIFFV_NEXT_SEQ => Some(self.data_pos() + self.size.max(0) as u64),
            n if n > 0 => Some(n as u64),
            _ => None,
        }
    }

    #[inline]
    fn payload_len(&self) -> usize {
        self.size.max(0) as usize
    }
}

fn be_i32(b: &[u8]) -> i32 {
    i32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

pub fn read_tag_header<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<TagHeader> {
    reader.seek(SeekFrom::Start(pos))
        .with_context(|| format!("seek to tag header @ {pos:#x}"))?;
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf)
        .with_context(|| format!("read tag header @ {pos:#x}"))?;
    Ok(TagHeader {
        kind:  be_i32(&buf[0..4]),
        ftype: be_u32(&buf[4..8]),
        size:  be_i32(&buf[8..12]),
        next:  be_i32(&buf[12..16]),
        pos,
    })
}

/// Payload bytes of `tag`, unparsed.
pub fn read_raw_bytes<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<u8>> {
    reader
        .seek(SeekFrom::Start(tag.data_pos()))
        .with_context(|| format!("seek to tag data @ {:#x}", tag.data_pos()))?;
    let mut buf = vec![0u8; tag.payload_len()];
    reader.read_exact(&mut buf)
        .with_context(|| format!("read {} payload bytes of tag {}", buf.len(), tag.kind))?;
    Ok(buf)
}

pub fn read_i32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<i32> {
    let raw = read_raw_bytes(reader, tag)?;
    if raw.len() < 4 {
        bail!("tag {} too short for i32 ({} bytes)", tag.kind, raw.len());
    }
    Ok(be_i32(&raw))
}

pub fn read_f32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<f32> {
    let raw = read_raw_bytes(reader, tag)?;
    if raw.len() < 4 {
        bail!("tag {} too short for f32 ({} bytes)", tag.kind, raw.len());
    }
    Ok(f32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Latin-1 string payload.
pub fn read_string<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<String> {
    Ok(read_raw_bytes(reader, tag)?.iter().map(|&b| b as char).collect())
}

/// Entries of a `FIFFT_DIR_ENTRY_STRUCT` tag. The last word of each entry is
/// the tag's file position, not a `next` pointer.
pub fn read_directory<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<TagHeader>> {
    if tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        bail!("expected FIFFT_DIR_ENTRY_STRUCT, got {}", tag.ftype);
    }
    let raw = read_raw_bytes(reader, tag)?;
    Ok(raw
        .chunks_exact(16)
        .map(|e| TagHeader {
            kind:  be_i32(&e[0..4]),
            ftype: be_u32(&e[4..8]),
            size:  be_i32(&e[8..12]),
            next:  FIFFV_NEXT_NONE,
            pos:   be_u32(&e[12..16]) as u64,
        })
        .collect())
}
