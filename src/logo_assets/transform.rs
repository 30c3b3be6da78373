//! Logo normalization
//!
//! Every uploaded logo is scaled to fit a fixed 4:3 canvas without cropping,
//! centered, padded and re-encoded in a single configured format, so clients
//! can lay logos out on a grid without knowing anything about the source.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{self, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;
use tracing::debug;

use crate::config::{PngCompression, TransformConfig};
use crate::errors::TransformError;
use crate::models::OutputFormat;

/// Encoded logo ready for storage
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

/// Scaled size of a `width x height` source fitted inside the canvas.
///
/// Aspect ratio is preserved, the source is never cropped, and upscaling is
/// allowed. Both sides are clamped to at least one pixel.
pub fn fit_dimensions(width: u32, height: u32, canvas_width: u32, canvas_height: u32) -> (u32, u32) {
    let scale = f64::min(
        f64::from(canvas_width) / f64::from(width),
        f64::from(canvas_height) / f64::from(height),
    );

    let scaled_width = (f64::from(width) * scale).round() as u32;
    let scaled_height = (f64::from(height) * scale).round() as u32;

    (
        scaled_width.clamp(1, canvas_width),
        scaled_height.clamp(1, canvas_height),
    )
}

/// Stateless transformer built from the `[transform]` configuration
#[derive(Debug, Clone)]
pub struct ImageTransformer {
    config: TransformConfig,
}

impl ImageTransformer {
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// Decode, fit, center and re-encode `bytes`
    pub fn transform(&self, bytes: &[u8]) -> Result<TransformedImage, TransformError> {
        let source = decode(bytes)?;
        let (canvas_width, canvas_height) = (self.config.width, self.config.height);
        let (scaled_width, scaled_height) =
            fit_dimensions(source.width(), source.height(), canvas_width, canvas_height);

        let scaled = imageops::resize(
            &source.to_rgba8(),
            scaled_width,
            scaled_height,
            FilterType::Lanczos3,
        );

        let x = (canvas_width - scaled_width) / 2;
        let y = (canvas_height - scaled_height) / 2;

        let canvas = if self.config.format.supports_transparency() {
            let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, Rgba([0, 0, 0, 0]));
            imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
            canvas
        } else {
            let [r, g, b] = self.config.background;
            let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, Rgba([r, g, b, 255]));
            // Composite source alpha over the solid fill
            imageops::overlay(&mut canvas, &scaled, i64::from(x), i64::from(y));
            canvas
        };

        debug!(
            "Transformed {}x{} logo to {}x{} at ({}, {}) on {}x{} {} canvas",
            source.width(),
            source.height(),
            scaled_width,
            scaled_height,
            x,
            y,
            canvas_width,
            canvas_height,
            self.config.format
        );

        let bytes = self.encode(canvas)?;
        Ok(TransformedImage {
            bytes,
            format: self.config.format,
            width: canvas_width,
            height: canvas_height,
        })
    }

    fn encode(&self, canvas: RgbaImage) -> Result<Vec<u8>, TransformError> {
        let format = self.config.format;
        let (width, height) = canvas.dimensions();
        let mut buffer = Vec::new();

        let result = match format {
            OutputFormat::Png => {
                let compression = match self.config.png_compression {
                    PngCompression::Fast => png::CompressionType::Fast,
                    PngCompression::Default => png::CompressionType::Default,
                    PngCompression::Best => png::CompressionType::Best,
                };
                PngEncoder::new_with_quality(&mut buffer, compression, png::FilterType::Adaptive)
                    .write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgba8)
            }
            OutputFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
                JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality)
                    .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            }
            OutputFormat::Webp => WebPEncoder::new_lossless(&mut buffer).write_image(
                canvas.as_raw(),
                width,
                height,
                ExtendedColorType::Rgba8,
            ),
        };

        result.map_err(|e| TransformError::encode(format, e))?;
        Ok(buffer)
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, TransformError> {
    if bytes.is_empty() {
        return Err(TransformError::decode("empty input"));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(TransformError::decode)?;
    if reader.format().is_none() {
        return Err(TransformError::decode("unrecognized image format"));
    }

    let image = reader.decode().map_err(TransformError::decode)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(TransformError::decode("image has zero area"));
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn transformer(format: OutputFormat) -> ImageTransformer {
        ImageTransformer::new(TransformConfig {
            format,
            ..TransformConfig::default()
        })
    }

    #[test]
    fn test_square_logo_is_centered_with_transparent_padding() {
        let source = RgbaImage::from_pixel(100, 100, Rgba([200, 10, 10, 255]));
        let result = transformer(OutputFormat::Png)
            .transform(&png_bytes(&source))
            .unwrap();

        assert_eq!((result.width, result.height), (720, 540));
        let output = image::load_from_memory(&result.bytes).unwrap().to_rgba8();
        assert_eq!(output.dimensions(), (720, 540));

        // 540x540 content starting at x = 90
        assert_eq!(output.get_pixel(89, 270)[3], 0);
        assert_eq!(output.get_pixel(90, 270)[3], 255);
        assert_eq!(output.get_pixel(360, 270), &Rgba([200, 10, 10, 255]));
        assert_eq!(output.get_pixel(629, 270)[3], 255);
        assert_eq!(output.get_pixel(630, 270)[3], 0);
        assert_eq!(output.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_wide_logo_is_letterboxed() {
        let source = RgbaImage::from_pixel(400, 100, Rgba([0, 0, 255, 255]));
        let result = transformer(OutputFormat::Png)
            .transform(&png_bytes(&source))
            .unwrap();
        let output = image::load_from_memory(&result.bytes).unwrap().to_rgba8();

        // 720x180 content starting at y = 180
        assert_eq!(output.get_pixel(360, 179)[3], 0);
        assert_eq!(output.get_pixel(360, 180)[3], 255);
        assert_eq!(output.get_pixel(0, 270)[3], 255);
        assert_eq!(output.get_pixel(360, 360)[3], 0);
    }

    #[test]
    fn test_jpeg_output_uses_background_fill() {
        let source = RgbaImage::from_pixel(50, 50, Rgba([0, 0, 0, 0]));
        let result = transformer(OutputFormat::Jpeg)
            .transform(&png_bytes(&source))
            .unwrap();

        assert_eq!(result.format, OutputFormat::Jpeg);
        let output = image::load_from_memory(&result.bytes).unwrap().to_rgb8();
        assert_eq!(output.dimensions(), (720, 540));
        // Transparent source composited over white stays white
        for pixel in [output.get_pixel(0, 0), output.get_pixel(360, 270)] {
            assert!(pixel.0.iter().all(|&c| c > 245), "expected white, got {:?}", pixel);
        }
    }

    #[test]
    fn test_webp_output_keeps_alpha() {
        let source = RgbaImage::from_pixel(30, 60, Rgba([10, 200, 10, 255]));
        let result = transformer(OutputFormat::Webp)
            .transform(&png_bytes(&source))
            .unwrap();

        let output = image::load_from_memory(&result.bytes).unwrap().to_rgba8();
        assert_eq!(output.dimensions(), (720, 540));
        assert_eq!(output.get_pixel(0, 0)[3], 0);
        assert_eq!(output.get_pixel(360, 270), &Rgba([10, 200, 10, 255]));
    }

    #[test]
    fn test_jpeg_input_is_accepted() {
        let source = RgbImage::from_pixel(64, 48, Rgb([120, 120, 120]));
        let mut buffer = Cursor::new(Vec::new());
        source.write_to(&mut buffer, ImageFormat::Jpeg).unwrap();

        let result = transformer(OutputFormat::Png)
            .transform(buffer.get_ref())
            .unwrap();
        let output = image::load_from_memory(&result.bytes).unwrap();
        assert_eq!((output.width(), output.height()), (720, 540));
    }

    #[test]
    fn test_invalid_input_is_decode_error() {
        let transformer = transformer(OutputFormat::Png);
        assert!(matches!(
            transformer.transform(b""),
            Err(TransformError::Decode { .. })
        ));
        assert!(matches!(
            transformer.transform(b"definitely not an image"),
            Err(TransformError::Decode { .. })
        ));

        // Valid signature, truncated body
        let mut truncated = png_bytes(&RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255])));
        truncated.truncate(30);
        assert!(matches!(
            transformer.transform(&truncated),
            Err(TransformError::Decode { .. })
        ));
    }

    #[test]
    fn test_fit_dimensions_examples() {
        assert_eq!(fit_dimensions(100, 100, 720, 540), (540, 540));
        assert_eq!(fit_dimensions(400, 100, 720, 540), (720, 180));
        assert_eq!(fit_dimensions(1440, 1080, 720, 540), (720, 540));
        assert_eq!(fit_dimensions(10_000, 1, 720, 540), (720, 1));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_scaled_rect_fits_canvas(
                width in 1u32..5000,
                height in 1u32..5000,
                unit in 1u32..400,
            ) {
                let (canvas_width, canvas_height) = (unit * 4, unit * 3);
                let (sw, sh) = fit_dimensions(width, height, canvas_width, canvas_height);

                prop_assert!(sw >= 1 && sw <= canvas_width);
                prop_assert!(sh >= 1 && sh <= canvas_height);
                // One side always touches the canvas edge
                prop_assert!(sw == canvas_width || sh == canvas_height);

                let x = (canvas_width - sw) / 2;
                let y = (canvas_height - sh) / 2;
                prop_assert!(x + sw <= canvas_width);
                prop_assert!(y + sh <= canvas_height);
            }
        }
    }
}
