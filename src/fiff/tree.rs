//! Block tree of a FIF file.
//!
//! The flat tag directory is grouped into nested blocks delimited by
//! `FIFF_BLOCK_START` / `FIFF_BLOCK_END`; each start tag carries the block kind.
use std::io::{Read, Seek};
use anyhow::Result;
use tracing::debug;

use super::constants::*;
use super::tag::{read_directory, read_i32, read_tag_header, TagHeader};

#[derive(Debug, Default, Clone)]
pub struct Node {
    /// Block kind, 0 for the root.
    pub block:    i32,
    /// Non-structural tags directly inside this block.
    pub entries:  Vec<TagHeader>,
    pub children: Vec<Node>,
}

impl Node {
    /// Depth-first search for the first block of `kind` (including `self`).
    pub fn find_block(&self, kind: i32) -> Option<&Node> {
        if self.block == kind {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_block(kind))
    }

    /// Tags of `kind` directly in this block.
    pub fn tags(&self, kind: i32) -> impl Iterator<Item = &TagHeader> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}

/// Group `directory` into blocks, reading each block kind from the file.
/// Unterminated blocks are closed at the end of the directory.
pub fn read_tree<R: Read + Seek>(reader: &mut R, directory: &[TagHeader]) -> Result<Node> {
    let mut stack: Vec<Node> = vec![Node::default()];

    for tag in directory {
        match tag.kind {
            FIFF_BLOCK_START => {
                let block = read_i32(reader, tag)?;
                stack.push(Node { block, ..Node::default() });
            }
            FIFF_BLOCK_END => close_block(&mut stack),
            _ => {
                if let Some(node) = stack.last_mut() {
                    node.entries.push(*tag);
                }
            }
        }
    }
    while stack.len() > 1 {
        close_block(&mut stack);
    }
    Ok(stack.pop().unwrap_or_default())
}

fn close_block(stack: &mut Vec<Node>) {
    // A stray BLOCK_END at root level is ignored.
    if stack.len() < 2 {
        return;
    }
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(done);
        }
    }
}

/// Follow the `next` chain from offset 0.
pub fn scan_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<TagHeader>> {
    let mut directory = Vec::new();
    let mut pos = Some(0u64);
    while let Some(p) = pos {
        let tag = read_tag_header(reader, p)?;
        pos = tag.next_pos();
        directory.push(tag);
    }
    Ok(directory)
}

/// The directory embedded by the writer: file id, then a dir pointer whose
/// payload is the offset of a `FIFFT_DIR_ENTRY_STRUCT` tag.
/// `None` when the file has no usable embedded directory.
pub fn try_load_directory<R: Read + Seek>(reader: &mut R) -> Result<Option<Vec<TagHeader>>> {
    let id_tag = read_tag_header(reader, 0)?;
    if id_tag.kind != FIFF_FILE_ID {
        return Ok(None);
    }
    let Some(next) = id_tag.next_pos() else { return Ok(None) };
    let ptr = read_tag_header(reader, next)?;
    if ptr.kind != FIFF_DIR_POINTER {
        return Ok(None);
    }
    let dirpos = read_i32(reader, &ptr)?;
    if dirpos <= 0 {
        return Ok(None);
    }
    let dir_tag = read_tag_header(reader, dirpos as u64)?;
    if dir_tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        debug!(pos = dirpos, "dir pointer does not point at a directory, scanning");
        return Ok(None);
    }
    Ok(Some(read_directory(reader, &dir_tag)?))
}

/// Embedded directory if present, full scan otherwise.
pub fn load_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<TagHeader>> {
    match try_load_directory(reader)? {
        Some(d) => Ok(d),
        None => scan_directory(reader),
    }
}
