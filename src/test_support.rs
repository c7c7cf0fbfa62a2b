//! Fixture builders for unit tests: real 1×1 images with metadata spliced in.

use image::{ImageFormat, RgbImage};
use img_parts::{Bytes, ImageEXIF};
use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::png::{Png, PngChunk};
use std::io::Cursor;

pub(crate) type RawChunk = ([u8; 4], Vec<u8>);

fn encode(format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    RgbImage::new(1, 1)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

/// A PNG with the given chunks inserted just before `IEND`.
pub(crate) fn png_with_chunks(chunks: &[RawChunk]) -> Vec<u8> {
    let mut png = Png::from_bytes(Bytes::from(encode(ImageFormat::Png))).unwrap();
    for (kind, body) in chunks {
        let pos = png.chunks().len() - 1;
        png.chunks_mut()
            .insert(pos, PngChunk::new(*kind, Bytes::from(body.clone())));
    }
    png.encoder().bytes().to_vec()
}

pub(crate) fn text_chunk(keyword: &str, text: &str) -> RawChunk {
    let mut body = keyword.as_bytes().to_vec();
    body.push(0);
    body.extend_from_slice(text.as_bytes());
    (*b"tEXt", body)
}

/// `zTXt` chunk around an arbitrary (possibly invalid) compressed stream.
pub(crate) fn ztxt_chunk(keyword: &str, stream: Vec<u8>) -> RawChunk {
    let mut body = keyword.as_bytes().to_vec();
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(&stream);
    (*b"zTXt", body)
}

/// Uncompressed `iTXt` chunk with no language tag.
pub(crate) fn itxt_chunk(keyword: &str, text: &str) -> RawChunk {
    let mut body = keyword.as_bytes().to_vec();
    body.extend_from_slice(&[0, 0, 0, 0, 0]);
    body.extend_from_slice(text.as_bytes());
    (*b"iTXt", body)
}

/// A JPEG carrying one `COM` segment.
pub(crate) fn jpeg_with_comment(text: &str) -> Vec<u8> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(encode(ImageFormat::Jpeg))).unwrap();
    let segment = JpegSegment::new_with_contents(0xFE, Bytes::from(text.as_bytes().to_vec()));
    let segments = jpeg.segments_mut();
    let pos = segments.len().min(1);
    segments.insert(pos, segment);
    jpeg.encoder().bytes().to_vec()
}

pub(crate) const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
pub(crate) const TAG_MAKE: u16 = 0x010F;
pub(crate) const TAG_MODEL: u16 = 0x0110;
pub(crate) const TAG_USER_COMMENT: u16 = 0x9286;
const TAG_EXIF_IFD: u16 = 0x8769;

pub(crate) const ASCII: u16 = 2;
const LONG: u16 = 4;
pub(crate) const UNDEFINED: u16 = 7;

/// `(tag, type, raw value)`; ASCII values carry their trailing NUL.
pub(crate) type ExifEntry = (u16, u16, Vec<u8>);

pub(crate) fn ascii(text: &str) -> Vec<u8> {
    let mut value = text.as_bytes().to_vec();
    value.push(0);
    value
}

/// A JPEG with an `APP1` EXIF block holding `ifd0` and, if non-empty, an Exif sub-IFD.
pub(crate) fn jpeg_with_exif(ifd0: &[ExifEntry], exif_ifd: &[ExifEntry]) -> Vec<u8> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(encode(ImageFormat::Jpeg))).unwrap();
    jpeg.set_exif(Some(Bytes::from(tiff_le(ifd0, exif_ifd))));
    jpeg.encoder().bytes().to_vec()
}

/// Little-endian TIFF structure. The Exif sub-IFD is written first so its
/// offset is known when IFD0 points at it.
fn tiff_le(ifd0: &[ExifEntry], exif_ifd: &[ExifEntry]) -> Vec<u8> {
    let mut buf = b"II*\0\0\0\0\0".to_vec();
    let mut ifd0 = ifd0.to_vec();
    if !exif_ifd.is_empty() {
        let offset = buf.len() as u32;
        write_ifd(&mut buf, exif_ifd);
        ifd0.push((TAG_EXIF_IFD, LONG, offset.to_le_bytes().to_vec()));
    }
    ifd0.sort_by_key(|(tag, _, _)| *tag);

    let ifd0_offset = buf.len() as u32;
    buf[4..8].copy_from_slice(&ifd0_offset.to_le_bytes());
    write_ifd(&mut buf, &ifd0);
    buf
}

fn write_ifd(buf: &mut Vec<u8>, entries: &[ExifEntry]) {
    let mut data_pos = buf.len() + 2 + entries.len() * 12 + 4;
    let mut data = Vec::new();

    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, kind, value) in entries {
        let count = if *kind == LONG { value.len() / 4 } else { value.len() };
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&kind.to_le_bytes());
        buf.extend_from_slice(&(count as u32).to_le_bytes());
        if value.len() <= 4 {
            let mut inline = value.clone();
            inline.resize(4, 0);
            buf.extend_from_slice(&inline);
        } else {
            buf.extend_from_slice(&(data_pos as u32).to_le_bytes());
            data.extend_from_slice(value);
            if value.len() % 2 == 1 {
                data.push(0);
            }
            data_pos += value.len() + value.len() % 2;
        }
    }
    // no next IFD
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&data);
}
