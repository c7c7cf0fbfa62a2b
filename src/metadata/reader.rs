use anyhow::{Context, Result, anyhow};
use img_parts::Bytes;
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use nom_exif::{EntryValue, Exif, ExifIter, ExifTag, MediaParser, MediaSource};
use std::path::Path;

use super::{FieldValue, ImageHandle, MetadataMap};
use crate::pipeline::ImageKind;

const JPEG_COM: u8 = 0xFE;

// Prefixes (matched case-insensitively) used by node-graph tools when they store
// workflow JSON in EXIF strings, and the field each one maps to.
const EXIF_PREFIXES: &[(&str, &str)] = &[("prompt:", "prompt"), ("workflow:", "workflow")];

// EXIF UserComment starts with an 8-byte character code.
const USER_COMMENT_HEADERS: &[&str] = &["ASCII\0\0\0", "UNICODE\0", "JIS\0\0\0\0\0", "\0\0\0\0\0\0\0\0"];

/// How a PNG text chunk stores its payload. Kept so a rewrite can use the same layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TextLayout {
    /// `tEXt`
    Plain,
    /// `zTXt`
    Compressed,
    /// `iTXt`
    International {
        compressed: bool,
        language: Vec<u8>,
        translated: Vec<u8>,
    },
}

/// A decoded PNG text chunk.
#[derive(Debug, Clone)]
pub(crate) struct TextChunk {
    pub keyword: String,
    pub layout: TextLayout,
    pub value: FieldValue,
}

/// Open an image file and collect its text metadata.
///
/// PNG and JPEG are supported (by extension). Pixel data is not decoded; the
/// container is parsed only far enough to find metadata chunks/segments.
pub fn read_image(path: &Path) -> Result<ImageHandle> {
    let kind = ImageKind::from_path(path)
        .with_context(|| format!("Unsupported image type: {}", path.display()))?;
    let bytes = Bytes::from(std::fs::read(path).context("Failed to read image file")?);

    let metadata = match kind {
        ImageKind::Png => {
            let png = Png::from_bytes(bytes.clone())
                .map_err(|e| anyhow!("Failed to parse PNG: {e}"))?;
            png_metadata(&png)
        }
        ImageKind::Jpeg => {
            let jpeg = Jpeg::from_bytes(bytes.clone())
                .map_err(|e| anyhow!("Failed to parse JPEG: {e}"))?;
            let mut metadata = jpeg_comments(&jpeg);
            for (name, text) in read_exif_fields(path) {
                metadata.insert(name, FieldValue::Text(text));
            }
            metadata
        }
    };

    log::debug!(
        "{}: {} metadata field(s): {}",
        path.display(),
        metadata.len(),
        metadata.names().join(", ")
    );

    Ok(ImageHandle {
        path: path.to_path_buf(),
        kind,
        bytes,
        metadata,
    })
}

fn png_metadata(png: &Png) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for chunk in png.chunks() {
        let kind = chunk.kind();
        if !is_text_chunk(&kind) {
            continue;
        }
        match decode_text_chunk(kind, chunk.contents()) {
            Some(text) => metadata.insert(text.keyword, text.value),
            None => log::debug!(
                "Ignoring malformed {} chunk",
                String::from_utf8_lossy(&kind)
            ),
        }
    }
    metadata
}

pub(crate) fn is_text_chunk(kind: &[u8; 4]) -> bool {
    matches!(kind, b"tEXt" | b"zTXt" | b"iTXt")
}

/// Decode a `tEXt`, `zTXt` or `iTXt` chunk body. Returns `None` for other
/// chunk types and for bodies missing their required separators.
pub(crate) fn decode_text_chunk(kind: [u8; 4], contents: &[u8]) -> Option<TextChunk> {
    let (keyword, rest) = split_nul(contents)?;
    let keyword = latin1(keyword);

    match &kind {
        b"tEXt" => {
            let text = String::from_utf8(rest.to_vec()).unwrap_or_else(|_| latin1(rest));
            Some(TextChunk {
                keyword,
                layout: TextLayout::Plain,
                value: FieldValue::Text(text),
            })
        }
        b"zTXt" => {
            // compression method byte, then the zlib stream
            let (_method, data) = rest.split_first()?;
            Some(TextChunk {
                keyword,
                layout: TextLayout::Compressed,
                value: FieldValue::Compressed(data.to_vec()),
            })
        }
        b"iTXt" => {
            let (&flag, rest) = rest.split_first()?;
            let (_method, rest) = rest.split_first()?;
            let (language, rest) = split_nul(rest)?;
            let (translated, text) = split_nul(rest)?;
            let compressed = flag != 0;
            let value = if compressed {
                FieldValue::Compressed(text.to_vec())
            } else {
                FieldValue::Text(String::from_utf8_lossy(text).into_owned())
            };
            Some(TextChunk {
                keyword,
                layout: TextLayout::International {
                    compressed,
                    language: language.to_vec(),
                    translated: translated.to_vec(),
                },
                value,
            })
        }
        _ => None,
    }
}

fn split_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = data.iter().position(|&b| b == 0)?;
    Some((&data[..pos], &data[pos + 1..]))
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn jpeg_comments(jpeg: &Jpeg) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for segment in jpeg.segments().iter().filter(|s| s.marker() == JPEG_COM) {
        let text = String::from_utf8_lossy(segment.contents());
        metadata.insert("comment", FieldValue::Text(text.trim_end_matches('\0').to_string()));
    }
    metadata
}

/// Read the EXIF strings that can carry workflow JSON in a JPEG.
fn read_exif_fields(path: &Path) -> Vec<(&'static str, String)> {
    let mut parser = MediaParser::new();
    let ms = match MediaSource::file_path(path) {
        Ok(ms) => ms,
        Err(e) => {
            log::debug!("Cannot open {} for EXIF: {e}", path.display());
            return Vec::new();
        }
    };

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(_) => {
            log::debug!("No EXIF data found in {}", path.display());
            return Vec::new();
        }
    };
    let exif: Exif = iter.into();

    let strings: Vec<String> = [ExifTag::Make, ExifTag::Model, ExifTag::ImageDescription]
        .into_iter()
        .filter_map(|tag| exif.get(tag).map(entry_text))
        .collect();
    exif_workflow_fields(&strings, exif.get(ExifTag::UserComment).map(user_comment_text))
}

fn entry_text(val: &EntryValue) -> String {
    match val {
        EntryValue::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `UserComment` is usually stored as UNDEFINED bytes behind a character code.
fn user_comment_text(val: &EntryValue) -> String {
    match val {
        EntryValue::Undefined(raw) | EntryValue::U8Array(raw) => decode_user_comment(raw),
        EntryValue::Text(s) => USER_COMMENT_HEADERS
            .iter()
            .find_map(|h| s.strip_prefix(h))
            .unwrap_or(s)
            .to_string(),
        other => other.to_string(),
    }
}

/// Decode a raw `UserComment` value according to its 8-byte character code.
pub(crate) fn decode_user_comment(raw: &[u8]) -> String {
    if raw.len() < 8 {
        return String::from_utf8_lossy(raw).into_owned();
    }
    let (code, body) = raw.split_at(8);
    match code {
        b"UNICODE\0" => utf16_text(body),
        b"ASCII\0\0\0" | b"JIS\0\0\0\0\0" => String::from_utf8_lossy(body).into_owned(),
        c if c.iter().all(|&b| b == 0) => String::from_utf8_lossy(body).into_owned(),
        _ => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// UTF-16 in either byte order. Without a BOM the order is guessed from where
/// the zero bytes of ASCII-range characters fall.
fn utf16_text(body: &[u8]) -> String {
    let (body, big_endian) = match body {
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        _ => {
            let even_zeros = body.iter().step_by(2).filter(|&&b| b == 0).count();
            let odd_zeros = body.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
            (body, even_zeros > odd_zeros)
        }
    };
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// Map EXIF strings onto metadata field names.
///
/// Any of `strings` (`Make`, `Model`, `ImageDescription`) starting with
/// `prompt:` or `workflow:` becomes that field; the first match wins. The
/// already-decoded `UserComment` becomes `parameters`.
pub(crate) fn exif_workflow_fields(
    strings: &[String],
    user_comment: Option<String>,
) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();

    for (prefix, field) in EXIF_PREFIXES {
        if let Some(json) = strings
            .iter()
            .find_map(|s| strip_prefix_ignore_case(s.trim(), prefix))
        {
            fields.push((*field, json.trim_end_matches('\0').to_string()));
        }
    }
    if let Some(comment) = user_comment {
        let body = comment.trim_end_matches('\0').trim();
        if !body.is_empty() {
            fields.push(("parameters", body.to_string()));
        }
    }

    fields
}
