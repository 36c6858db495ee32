//! PDF text layer and embedded raster access via lopdf.

use anyhow::Result;
use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Document, Object, Stream};
use std::io::Cursor;
use tracing::debug;

/// Source of text embedded in a PDF, read without rendering.
pub trait NativeTextSource: Send + Sync {
    fn extract_text(&self, data: &[u8]) -> Result<String>;
}

/// Reads the PDF text layer page by page.
#[derive(Debug, Clone, Default)]
pub struct LopdfTextSource;

impl NativeTextSource for LopdfTextSource {
    fn extract_text(&self, data: &[u8]) -> Result<String> {
        let doc = load(data)?;

        let mut text = String::new();
        for (page_num, _) in doc.get_pages() {
            if let Ok(content) = doc.extract_text(&[page_num]) {
                text.push_str(&content);
                text.push('\n');
            }
        }

        debug!("Native text layer: {} chars", text.trim().len());
        Ok(text)
    }
}

fn load(data: &[u8]) -> Result<Document> {
    Document::load_from(Cursor::new(data)).map_err(|e| anyhow::anyhow!("Failed to load PDF: {}", e))
}

/// The largest decodable image XObject in the PDF.
///
/// Scanned certificates are usually a single page image, stored either as
/// DCT (JPEG) or as raw or Flate-compressed 8-bit gray/RGB samples. `Ok(None)`
/// means the PDF parsed but holds no raster we can decode; `Err` means the
/// bytes are not a loadable PDF.
pub fn largest_embedded_raster(data: &[u8]) -> Result<Option<DynamicImage>> {
    let doc = load(data)?;

    let mut images: Vec<&Stream> = doc
        .objects
        .values()
        .filter_map(|object| match object {
            Object::Stream(stream) => Some(stream),
            _ => None,
        })
        .filter(|stream| name_is(stream.dict.get(b"Subtype").ok(), b"Image"))
        .collect();
    images.sort_by_key(|stream| std::cmp::Reverse(pixel_area(stream)));

    Ok(images.into_iter().find_map(decode_raster))
}

fn pixel_area(stream: &Stream) -> i64 {
    dimension(stream, b"Width").unwrap_or(0) * dimension(stream, b"Height").unwrap_or(0)
}

fn dimension(stream: &Stream, key: &[u8]) -> Option<i64> {
    stream.dict.get(key).and_then(Object::as_i64).ok()
}

fn decode_raster(stream: &Stream) -> Option<DynamicImage> {
    let filter = stream.dict.get(b"Filter").ok();

    if has_filter(filter, b"DCTDecode") {
        return match image::load_from_memory(&stream.content) {
            Ok(img) => Some(img),
            Err(e) => {
                debug!("Embedded JPEG not decodable: {}", e);
                None
            }
        };
    }

    let samples = match filter {
        None => stream.content.clone(),
        Some(_) if has_filter(filter, b"FlateDecode") => match stream.decompressed_content() {
            Ok(samples) => samples,
            Err(e) => {
                debug!("Embedded Flate image not inflatable: {}", e);
                return None;
            }
        },
        Some(_) => return None,
    };

    let bits = dimension(stream, b"BitsPerComponent").unwrap_or(8);
    let width = u32::try_from(dimension(stream, b"Width")?).ok()?;
    let height = u32::try_from(dimension(stream, b"Height")?).ok()?;
    if bits != 8 {
        debug!("Skipping {}-bit embedded image", bits);
        return None;
    }

    let color_space = stream.dict.get(b"ColorSpace").ok();
    if name_is(color_space, b"DeviceGray") {
        GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8)
    } else if name_is(color_space, b"DeviceRGB") {
        RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8)
    } else {
        debug!("Skipping embedded image with unsupported color space");
        None
    }
}

fn has_filter(filter: Option<&Object>, expected: &[u8]) -> bool {
    name_is(filter, expected)
        || matches!(filter, Some(Object::Array(items))
            if items.len() == 1 && name_is(items.first(), expected))
}

fn name_is(object: Option<&Object>, expected: &[u8]) -> bool {
    matches!(object, Some(Object::Name(name)) if name.as_slice() == expected)
}
