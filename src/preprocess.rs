//! Image preparation ahead of OCR.
//!
//! Decode, convert to grayscale, stretch contrast to the full range, then
//! apply an unsharp mask. Output is always PNG, except for PDFs without a
//! decodable embedded raster, which pass through unchanged.
//!
//! All of this is CPU-bound; async callers run it on the blocking pool.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageOutputFormat};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::pdf;

pub const PDF_MIME: &str = "application/pdf";

/// Longest side handed to OCR backends.
const MAX_DIMENSION: u32 = 3000;

const UNSHARPEN_SIGMA: f32 = 1.0;
const UNSHARPEN_THRESHOLD: i32 = 2;

/// Document bytes ready for an OCR backend.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl PreparedImage {
    pub fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME
    }

    pub fn file_name(&self) -> &'static str {
        if self.is_pdf() {
            "document.pdf"
        } else {
            "document.png"
        }
    }
}

/// Prepare raw upload bytes for OCR.
///
/// Fails only when the bytes are neither a loadable PDF nor a decodable image,
/// whatever the declared type.
pub fn prepare(data: &[u8], mime_type: &str) -> Result<PreparedImage, PipelineError> {
    if mime_type == PDF_MIME {
        match pdf::largest_embedded_raster(data) {
            Ok(Some(img)) => return enhance(img),
            Ok(None) => {
                info!("No usable raster in PDF, passing original bytes to OCR");
                return Ok(PreparedImage {
                    data: data.to_vec(),
                    mime_type: PDF_MIME.to_string(),
                    width: 0,
                    height: 0,
                });
            }
            Err(e) => debug!("Declared PDF did not parse, trying image decode: {:#}", e),
        }
    }

    let img = image::load_from_memory(data).map_err(|e| {
        PipelineError::UnprocessableDocument(format!(
            "neither a readable PDF nor a decodable image ({}): {}",
            mime_type, e
        ))
    })?;
    enhance(img)
}

fn enhance(img: DynamicImage) -> Result<PreparedImage, PipelineError> {
    let img = if img.width().max(img.height()) > MAX_DIMENSION {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::CatmullRom)
    } else {
        img
    };

    let mut gray = img.to_luma8();
    stretch_contrast(&mut gray);
    let sharpened = DynamicImage::ImageLuma8(gray).unsharpen(UNSHARPEN_SIGMA, UNSHARPEN_THRESHOLD);

    let (width, height) = (sharpened.width(), sharpened.height());
    let mut data = Vec::new();
    sharpened
        .write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Png)
        .map_err(|e| PipelineError::UnprocessableDocument(format!("PNG encoding failed: {}", e)))?;

    debug!("Prepared {}x{} grayscale image ({} bytes)", width, height, data.len());
    Ok(PreparedImage {
        data,
        mime_type: "image/png".to_string(),
        width,
        height,
    })
}

/// Linear min/max stretch to 0..=255. Flat images are left alone.
fn stretch_contrast(gray: &mut GrayImage) {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if max <= min {
        return;
    }
    let range = (max - min) as u32;
    for p in gray.pixels_mut() {
        p[0] = ((p[0] - min) as u32 * 255 / range) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_stretch_contrast_fills_range() {
        let mut gray = GrayImage::from_fn(10, 1, |x, _| Luma([100 + x as u8 * 5]));
        stretch_contrast(&mut gray);
        let values: Vec<u8> = gray.pixels().map(|p| p[0]).collect();
        assert_eq!(values.first(), Some(&0));
        assert_eq!(values.last(), Some(&255));
    }

    #[test]
    fn test_flat_image_unchanged() {
        let mut gray = GrayImage::from_pixel(4, 4, Luma([77]));
        stretch_contrast(&mut gray);
        assert!(gray.pixels().all(|p| p[0] == 77));
    }

    #[test]
    fn test_prepare_color_image() {
        let img = RgbImage::from_fn(40, 20, |x, _| Rgb([x as u8 * 3, 120, 200]));
        let prepared = prepare(&png_bytes(DynamicImage::ImageRgb8(img)), "image/png").unwrap();

        assert_eq!(prepared.mime_type, "image/png");
        assert_eq!((prepared.width, prepared.height), (40, 20));
        let decoded = image::load_from_memory(&prepared.data).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_large_image_downscaled() {
        let img = GrayImage::from_pixel(MAX_DIMENSION * 2, 10, Luma([200]));
        let prepared = prepare(&png_bytes(DynamicImage::ImageLuma8(img)), "image/png").unwrap();
        assert_eq!(prepared.width, MAX_DIMENSION);
    }

    fn pdf_with_gray_raster(width: u32, height: u32) -> Vec<u8> {
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let mut image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            GrayImage::from_fn(width, height, |x, _| Luma([x as u8])).into_raw(),
        );
        let _ = image.compress();
        let image_id = doc.add_object(image);
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Thumb" => image_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_scanned_pdf_raster_is_enhanced() {
        let prepared = prepare(&pdf_with_gray_raster(120, 60), PDF_MIME).unwrap();
        assert_eq!(prepared.mime_type, "image/png");
        assert_eq!((prepared.width, prepared.height), (120, 60));
    }

    #[test]
    fn test_mislabelled_image_declared_as_pdf() {
        let img = RgbImage::from_pixel(10, 10, Rgb([10, 20, 30]));
        let prepared = prepare(&png_bytes(DynamicImage::ImageRgb8(img)), PDF_MIME).unwrap();
        assert!(!prepared.is_pdf());
    }

    #[test]
    fn test_undecodable_bytes_are_unprocessable() {
        let err = prepare(b"\x00\x01not an image", "image/jpeg").unwrap_err();
        assert!(matches!(err, PipelineError::UnprocessableDocument(_)));

        let err = prepare(b"%PDF-1.4 truncated", PDF_MIME).unwrap_err();
        assert!(matches!(err, PipelineError::UnprocessableDocument(_)));
    }
}
