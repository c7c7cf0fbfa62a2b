//! Image metadata reading and re-embedding.
//!
//! This module provides:
//!
//! - [`read_image`]: open a PNG or JPEG and expose its text metadata as an ordered [`MetadataMap`]
//! - [`embed_field`]: produce a copy of a PNG with one text field rewritten
//! - [`write_json`]: write a workflow document as a standalone `.json` file
//!
//! PNG text comes from `tEXt`, `zTXt` and `iTXt` chunks, keyed by the chunk keyword.
//! Compressed chunks are kept as [`FieldValue::Compressed`] and only inflated when
//! a caller asks for the text, so a corrupt stream surfaces as an error on that
//! field alone. JPEG text comes from `COM` segments and a few EXIF tags, and is
//! read-only.

mod reader;
mod writer;

pub use reader::read_image;
pub use writer::{embed_field, json_file_name, modified_file_name, write_json};
pub(crate) use writer::unix_timestamp;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use img_parts::Bytes;
use std::borrow::Cow;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::pipeline::ImageKind;

/// The value of one metadata field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Already-decoded text.
    Text(String),
    /// A zlib (DEFLATE) stream holding UTF-8 text.
    Compressed(Vec<u8>),
}

impl FieldValue {
    /// Return the field as text, inflating compressed values.
    pub fn decode(&self) -> Result<Cow<'_, str>> {
        match self {
            Self::Text(s) => Ok(Cow::Borrowed(s)),
            Self::Compressed(data) => inflate(data).map(Cow::Owned),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed(_))
    }
}

/// Inflate a zlib stream into UTF-8 text.
pub fn inflate(data: &[u8]) -> Result<String> {
    let mut text = String::new();
    ZlibDecoder::new(data)
        .read_to_string(&mut text)
        .context("Failed to decompress zlib stream")?;
    Ok(text)
}

pub(crate) fn deflate(text: &str) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(text.as_bytes())
        .context("Failed to compress text")?;
    encoder.finish().context("Failed to finish zlib stream")
}

/// Ordered mapping from field name to value.
///
/// Inserting a name that is already present replaces its value but keeps the
/// original position, so each name maps to exactly one value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataMap {
    entries: Vec<(String, FieldValue)>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Field names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, FieldValue)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (N, FieldValue)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// An opened image: its raw container bytes plus the decoded metadata.
///
/// One handle is created per input file and dropped before the next one is opened.
#[derive(Debug)]
pub struct ImageHandle {
    path: PathBuf,
    kind: ImageKind,
    bytes: Bytes,
    metadata: MetadataMap,
}

impl ImageHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub(crate) fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}
