//! Thumbnail naming and resizing

use crate::error::{FilesError, FilesResult};
use image::imageops::FilterType;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

/// How the source is fitted into the requested box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbMode {
    /// Portrait or landscape depending on the source orientation
    #[default]
    Auto,
    /// Exactly the requested size, ignoring the aspect ratio
    Exact,
    /// Requested height, width follows the aspect ratio
    Portrait,
    /// Requested width, height follows the aspect ratio
    Landscape,
    /// Cover the box, then cut it out at the offset
    Crop,
    /// Largest size that fits inside the box
    Fit,
}

impl ThumbMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ThumbMode::Auto => "auto",
            ThumbMode::Exact => "exact",
            ThumbMode::Portrait => "portrait",
            ThumbMode::Landscape => "landscape",
            ThumbMode::Crop => "crop",
            ThumbMode::Fit => "fit",
        }
    }
}

impl fmt::Display for ThumbMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThumbMode {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ThumbMode::Auto),
            "exact" => Ok(ThumbMode::Exact),
            "portrait" => Ok(ThumbMode::Portrait),
            "landscape" => Ok(ThumbMode::Landscape),
            "crop" => Ok(ThumbMode::Crop),
            "fit" => Ok(ThumbMode::Fit),
            other => Err(FilesError::Invalid(format!("unknown thumbnail mode {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbOptions {
    pub mode: ThumbMode,
    /// Crop offset in pixels
    pub offset: (i32, i32),
    /// JPEG quality, 1-100
    pub quality: u8,
    /// Sharpening amount, 0-100
    pub sharpen: u8,
    /// Requested interlacing. The encoders used here write baseline output,
    /// so this only takes part in the option set.
    pub interlace: bool,
    /// Output extension; `None` keeps the source extension
    pub extension: Option<String>,
}

impl Default for ThumbOptions {
    fn default() -> Self {
        Self {
            mode: ThumbMode::Auto,
            offset: (0, 0),
            quality: 90,
            sharpen: 0,
            interlace: false,
            extension: None,
        }
    }
}

impl ThumbOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: ThumbMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn offset(mut self, x: i32, y: i32) -> Self {
        self.offset = (x, y);
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn sharpen(mut self, sharpen: u8) -> Self {
        self.sharpen = sharpen.min(100);
        self
    }

    pub fn interlace(mut self, interlace: bool) -> Self {
        self.interlace = interlace;
        self
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into().to_lowercase());
        self
    }

    /// Fill the output extension from the source when unset. Sources whose
    /// format has no encoder here (webp) produce PNG thumbnails, named `.png`.
    pub fn resolved(mut self, source_extension: &str) -> Self {
        let extension = self
            .extension
            .take()
            .filter(|ext| ext != "auto")
            .unwrap_or_else(|| source_extension.to_lowercase());
        self.extension = Some(encodable(&extension).to_string());
        self
    }

    /// Extension of the encoded thumbnail. Both the file name and the
    /// encoder use it, so an unsupported extension reads as `png` here too.
    pub fn output_extension(&self) -> &str {
        self.extension.as_deref().map(encodable).unwrap_or("png")
    }
}

fn encodable(extension: &str) -> &str {
    match extension {
        "jpg" | "jpeg" | "png" | "gif" | "bmp" => extension,
        _ => "png",
    }
}

/// `thumb_{id}_{width}_{height}_{offset x}_{offset y}_{mode}.{extension}`
pub fn thumb_file_name(id: &str, width: u32, height: u32, options: &ThumbOptions) -> String {
    format!(
        "thumb_{}_{}_{}_{}_{}_{}.{}",
        id,
        width,
        height,
        options.offset.0,
        options.offset.1,
        options.mode,
        options.output_extension()
    )
}

/// Prefix shared by every thumbnail of one file
pub fn thumb_prefix(id: &str) -> String {
    format!("thumb_{}_", id)
}

/// Size of the resized image before any crop. A zero width or height
/// follows the aspect ratio of the source.
pub fn target_dimensions(source: (u32, u32), width: u32, height: u32, mode: ThumbMode) -> (u32, u32) {
    let (source_width, source_height) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let ratio = source_width / source_height;
    let by_height = |h: u32| (((h as f64) * ratio).round().max(1.0) as u32, h);
    let by_width = |w: u32| (w, ((w as f64) / ratio).round().max(1.0) as u32);

    if width == 0 && height == 0 {
        return source;
    }
    if width == 0 {
        return by_height(height);
    }
    if height == 0 {
        return by_width(width);
    }

    match mode {
        ThumbMode::Exact => (width, height),
        ThumbMode::Portrait => by_height(height),
        ThumbMode::Landscape => by_width(width),
        ThumbMode::Auto => {
            if source_height < source_width {
                by_width(width)
            } else if source_height > source_width {
                by_height(height)
            } else if height < width {
                by_width(width)
            } else {
                by_height(height)
            }
        }
        ThumbMode::Fit => {
            let scale = (width as f64 / source_width).min(height as f64 / source_height);
            (
                (source_width * scale).round().max(1.0) as u32,
                (source_height * scale).round().max(1.0) as u32,
            )
        }
        ThumbMode::Crop => {
            let scale = (width as f64 / source_width).max(height as f64 / source_height);
            (
                (source_width * scale).round().max(width as f64) as u32,
                (source_height * scale).round().max(height as f64) as u32,
            )
        }
    }
}

/// Resize encoded image data. CPU bound; call from a blocking task.
pub fn resize(data: &[u8], width: u32, height: u32, options: &ThumbOptions) -> FilesResult<Vec<u8>> {
    let image = image::load_from_memory(data)?;
    let (target_width, target_height) = target_dimensions((image.width(), image.height()), width, height, options.mode);

    let mut resized = if (target_width, target_height) == (image.width(), image.height()) {
        image
    } else {
        image.resize_exact(target_width, target_height, FilterType::Lanczos3)
    };

    if options.mode == ThumbMode::Crop && width > 0 && height > 0 {
        let max_x = resized.width().saturating_sub(width);
        let max_y = resized.height().saturating_sub(height);
        let x = (max_x / 2).saturating_add_signed(options.offset.0).min(max_x);
        let y = (max_y / 2).saturating_add_signed(options.offset.1).min(max_y);
        resized = resized.crop_imm(x, y, width.min(resized.width()), height.min(resized.height()));
    }

    if options.sharpen > 0 {
        resized = resized.unsharpen(options.sharpen as f32 / 50.0, 1);
    }

    encode(&resized, options)
}

/// Stand-in image written when the source cannot be thumbnailed
pub fn placeholder_image(width: u32, height: u32, options: &ThumbOptions) -> FilesResult<Vec<u8>> {
    let (width, height) = match (width, height) {
        (0, 0) => (100, 100),
        (0, h) => (h, h),
        (w, 0) => (w, w),
        (w, h) => (w, h),
    };
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([238, 238, 238, 255]));
    // A diagonal cross marks the image as broken
    let steps = width.max(height);
    for step in 0..steps {
        let x = step * width / steps;
        let y = step * height / steps;
        canvas.put_pixel(x.min(width - 1), y.min(height - 1), Rgba([204, 0, 0, 255]));
        canvas.put_pixel(x.min(width - 1), (height - 1).saturating_sub(y), Rgba([204, 0, 0, 255]));
    }
    encode(&DynamicImage::ImageRgba8(canvas), options)
}

fn encode(image: &DynamicImage, options: &ThumbOptions) -> FilesResult<Vec<u8>> {
    let mut output = Vec::new();
    let (image, format) = match options.output_extension() {
        "jpg" | "jpeg" => (
            DynamicImage::ImageRgb8(image.to_rgb8()),
            ImageOutputFormat::Jpeg(options.quality.clamp(1, 100)),
        ),
        "gif" => (image.clone(), ImageOutputFormat::Gif),
        "bmp" => (image.clone(), ImageOutputFormat::Bmp),
        _ => (image.clone(), ImageOutputFormat::Png),
    };
    image.write_to(&mut Cursor::new(&mut output), format)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([10, 120, 200, 255]));
        let mut data = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Png)
            .unwrap();
        data
    }

    #[test]
    fn test_thumb_file_name() {
        let options = ThumbOptions::new().mode(ThumbMode::Crop).offset(5, -3).resolved("JPG");
        assert_eq!(thumb_file_name("12", 100, 50, &options), "thumb_12_100_50_5_-3_crop.jpg");
        assert!(thumb_file_name("12", 1, 1, &options).starts_with(&thumb_prefix("12")));
    }

    #[test]
    fn test_resolved_extension() {
        assert_eq!(ThumbOptions::new().resolved("jpeg").output_extension(), "jpeg");
        assert_eq!(ThumbOptions::new().resolved("webp").output_extension(), "png");
        assert_eq!(ThumbOptions::new().extension("auto").resolved("gif").output_extension(), "gif");
        assert_eq!(ThumbOptions::new().extension("JPG").resolved("png").output_extension(), "jpg");
    }

    #[test]
    fn test_unsupported_extension_names_and_encodes_png() {
        let options = ThumbOptions::new().extension("webp");
        assert_eq!(options.output_extension(), "png");
        assert!(thumb_file_name("4", 8, 8, &options).ends_with("_auto.png"));

        let thumb = resize(&png(16, 16), 8, 8, &options).unwrap();
        assert_eq!(image::guess_format(&thumb).unwrap(), image::ImageFormat::Png);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Crop".parse::<ThumbMode>().unwrap(), ThumbMode::Crop);
        assert!("stretch".parse::<ThumbMode>().is_err());
        assert_eq!(ThumbMode::default().to_string(), "auto");
    }

    #[test]
    fn test_target_dimensions() {
        assert_eq!(target_dimensions((400, 200), 100, 100, ThumbMode::Auto), (100, 50));
        assert_eq!(target_dimensions((200, 400), 100, 100, ThumbMode::Auto), (50, 100));
        assert_eq!(target_dimensions((400, 200), 100, 100, ThumbMode::Exact), (100, 100));
        assert_eq!(target_dimensions((400, 200), 100, 100, ThumbMode::Portrait), (200, 100));
        assert_eq!(target_dimensions((400, 200), 100, 100, ThumbMode::Landscape), (100, 50));
        assert_eq!(target_dimensions((400, 200), 100, 100, ThumbMode::Fit), (100, 50));
        assert_eq!(target_dimensions((400, 200), 100, 100, ThumbMode::Crop), (200, 100));
        assert_eq!(target_dimensions((400, 200), 0, 50, ThumbMode::Exact), (100, 50));
        assert_eq!(target_dimensions((400, 200), 0, 0, ThumbMode::Auto), (400, 200));
    }

    #[test]
    fn test_resize_and_crop() {
        let source = png(40, 20);
        let options = ThumbOptions::new().resolved("png");
        let thumb = image::load_from_memory(&resize(&source, 10, 10, &options).unwrap()).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (10, 5));

        let options = ThumbOptions::new().mode(ThumbMode::Crop).resolved("png");
        let thumb = image::load_from_memory(&resize(&source, 10, 10, &options).unwrap()).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (10, 10));
    }

    #[test]
    fn test_resize_rejects_garbage() {
        assert!(resize(b"not an image", 10, 10, &ThumbOptions::new().resolved("png")).is_err());
    }

    #[test]
    fn test_placeholder_is_deterministic() {
        let options = ThumbOptions::new().resolved("jpg");
        let first = placeholder_image(30, 20, &options).unwrap();
        assert_eq!(first, placeholder_image(30, 20, &options).unwrap());
        let decoded = image::load_from_memory(&first).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (30, 20));
    }
}
