use anyhow::{Context, Result, anyhow};
use img_parts::Bytes;
use img_parts::png::{Png, PngChunk};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::reader::{TextLayout, decode_text_chunk, is_text_chunk};
use super::{ImageHandle, deflate};
use crate::pipeline::ImageKind;

/// Re-encode a PNG with the text field `field` set to `text`.
///
/// Every other chunk (pixels, palette, other text) is kept byte-for-byte.
/// The first chunk carrying `field` is rewritten in place and later chunks with
/// the same keyword are dropped. If no chunk carries `field`, a new one is
/// inserted before `IEND`.
///
/// The chunk type follows the original when the new text allows it: ASCII text
/// stays in `tEXt`/`zTXt`, anything else moves to a UTF-8 `iTXt` chunk.
pub fn embed_field(handle: &ImageHandle, field: &str, text: &str) -> Result<Bytes> {
    if handle.kind() != ImageKind::Png {
        anyhow::bail!(
            "Re-embedding metadata is only supported for PNG: {}",
            handle.path().display()
        );
    }

    let mut png = Png::from_bytes(handle.bytes().clone())
        .map_err(|e| anyhow!("Failed to parse PNG: {e}"))?;

    let matches: Vec<(usize, TextLayout)> = png
        .chunks()
        .iter()
        .enumerate()
        .filter(|(_, c)| is_text_chunk(&c.kind()))
        .filter_map(|(i, c)| {
            decode_text_chunk(c.kind(), c.contents())
                .filter(|t| t.keyword == field)
                .map(|t| (i, t.layout))
        })
        .collect();

    let chunks = png.chunks_mut();
    match matches.split_first() {
        Some(((first, layout), rest)) => {
            chunks[*first] = encode_text_chunk(field, text, layout)?;
            for (pos, _) in rest.iter().rev() {
                chunks.remove(*pos);
            }
            if !rest.is_empty() {
                log::debug!("Dropped {} duplicate '{field}' chunk(s)", rest.len());
            }
        }
        None => {
            let pos = chunks.len().saturating_sub(1);
            chunks.insert(pos, encode_text_chunk(field, text, &TextLayout::Plain)?);
        }
    }

    Ok(png.encoder().bytes())
}

fn encode_text_chunk(keyword: &str, text: &str, layout: &TextLayout) -> Result<PngChunk> {
    let mut body: Vec<u8> = keyword.chars().map(|c| c as u8).collect();
    body.push(0);

    let kind = match layout {
        TextLayout::Plain if text.is_ascii() => {
            body.extend_from_slice(text.as_bytes());
            *b"tEXt"
        }
        TextLayout::Compressed if text.is_ascii() => {
            body.push(0); // deflate
            body.extend_from_slice(&deflate(text)?);
            *b"zTXt"
        }
        TextLayout::International {
            compressed,
            language,
            translated,
        } => {
            push_international(&mut body, text, *compressed, language, translated)?;
            *b"iTXt"
        }
        TextLayout::Plain => {
            push_international(&mut body, text, false, &[], &[])?;
            *b"iTXt"
        }
        TextLayout::Compressed => {
            push_international(&mut body, text, true, &[], &[])?;
            *b"iTXt"
        }
    };

    Ok(PngChunk::new(kind, Bytes::from(body)))
}

fn push_international(
    body: &mut Vec<u8>,
    text: &str,
    compressed: bool,
    language: &[u8],
    translated: &[u8],
) -> Result<()> {
    body.push(u8::from(compressed));
    body.push(0); // deflate
    body.extend_from_slice(language);
    body.push(0);
    body.extend_from_slice(translated);
    body.push(0);
    if compressed {
        body.extend_from_slice(&deflate(text)?);
    } else {
        body.extend_from_slice(text.as_bytes());
    }
    Ok(())
}

/// Write a workflow document as a standalone JSON file.
pub fn write_json(path: &Path, document: &serde_json::Value, pretty: bool) -> Result<()> {
    let mut contents = if pretty {
        serde_json::to_string_pretty(document)
    } else {
        serde_json::to_string(document)
    }
    .context("Failed to serialize workflow JSON")?;
    contents.push('\n');
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// `<stem>_modified_<timestamp>.png`
pub fn modified_file_name(stem: &str, timestamp: u64) -> String {
    format!("{stem}_modified_{timestamp}.png")
}

/// `<stem>.json`
pub fn json_file_name(stem: &str) -> String {
    format!("{stem}.json")
}

pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
