//! Image loading, scaling and PNG output for icon processing.
//!
//! Raster formats are handled by the `image` crate, vector icons are
//! rasterized through `resvg`, and XPM (still common for legacy pixmap
//! icons) is decoded by a small built-in reader. Output is always PNG,
//! optionally squeezed through `optipng` when available.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use image::DynamicImage;
use tracing::debug;

/// Recognized image formats, determined by file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IconFormat {
    /// Portable Network Graphics.
    Png,
    /// JPEG.
    Jpeg,
    /// GIF.
    Gif,
    /// Windows icon container.
    Ico,
    /// Bitmap.
    Bmp,
    /// X PixMap.
    Xpm,
    /// Scalable Vector Graphics.
    Svg,
    /// Gzip-compressed SVG.
    Svgz,
    /// Anything else.
    Unknown,
}

impl IconFormat {
    /// Determine the format from a file name.
    #[must_use]
    pub fn from_filename(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".png") {
            Self::Png
        } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
            Self::Jpeg
        } else if lower.ends_with(".gif") {
            Self::Gif
        } else if lower.ends_with(".ico") {
            Self::Ico
        } else if lower.ends_with(".bmp") {
            Self::Bmp
        } else if lower.ends_with(".xpm") {
            Self::Xpm
        } else if lower.ends_with(".svgz") {
            Self::Svgz
        } else if lower.ends_with(".svg") {
            Self::Svg
        } else {
            Self::Unknown
        }
    }

    /// Whether this format is a vector format.
    #[must_use]
    pub const fn is_vector(self) -> bool {
        matches!(self, Self::Svg | Self::Svgz)
    }
}

/// A decoded raster image.
pub struct RasterImage {
    img: DynamicImage,
}

impl RasterImage {
    /// What: Decode a raster image from memory.
    ///
    /// Inputs:
    /// - `data`: Raw file bytes
    /// - `format`: Format determined from the source file name
    ///
    /// Output:
    /// - The decoded image, or an error for unsupported or corrupt data
    pub fn load(data: &[u8], format: IconFormat) -> Result<Self> {
        let img = match format {
            IconFormat::Xpm => DynamicImage::ImageRgba8(decode_xpm(data)?),
            IconFormat::Svg | IconFormat::Svgz => {
                bail!("vector images must be rendered, not loaded as raster data")
            }
            _ => image::load_from_memory(data).context("unable to decode image data")?,
        };
        Ok(Self { img })
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.img.width()
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.img.height()
    }

    /// Scale to the exact target size.
    pub fn scale(&mut self, width: u32, height: u32) {
        if self.width() == width && self.height() == height {
            return;
        }
        self.img = self
            .img
            .resize_exact(width, height, image::imageops::FilterType::Lanczos3);
    }

    /// What: Write the image as PNG.
    ///
    /// Inputs:
    /// - `dest`: Destination path (parent must exist)
    /// - `optipng`: Optimizer binary to run over the result, when enabled
    pub fn save_png(&self, dest: &Path, optipng: Option<&Path>) -> Result<()> {
        self.img
            .save_with_format(dest, image::ImageFormat::Png)
            .with_context(|| format!("unable to write PNG to {}", dest.display()))?;
        optimize_png(dest, optipng);
        Ok(())
    }
}

/// What: Rasterize an SVG or SVGZ icon straight to a PNG file.
///
/// Inputs:
/// - `data`: SVG(Z) bytes
/// - `width`/`height`: Target canvas size in pixels
/// - `dest`: Destination PNG path (parent must exist)
/// - `optipng`: Optimizer binary, when enabled
pub fn render_svg_to_png(
    data: &[u8],
    width: u32,
    height: u32,
    dest: &Path,
    optipng: Option<&Path>,
) -> Result<()> {
    let options = resvg::usvg::Options::default();
    let tree = resvg::usvg::Tree::from_data(data, &options).context("unable to parse SVG data")?;

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .context("unable to allocate render target")?;

    let size = tree.size();
    let sx = width as f32 / size.width();
    let sy = height as f32 / size.height();
    let transform = resvg::tiny_skia::Transform::from_scale(sx, sy);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    pixmap
        .save_png(dest)
        .with_context(|| format!("unable to write PNG to {}", dest.display()))?;
    optimize_png(dest, optipng);
    Ok(())
}

/// Run `optipng` over a file when configured; failures only log.
fn optimize_png(dest: &Path, optipng: Option<&Path>) {
    let Some(optipng) = optipng else { return };
    match Command::new(optipng).arg("-quiet").arg(dest).status() {
        Ok(status) if status.success() => {}
        Ok(status) => debug!(file = %dest.display(), ?status, "optipng exited with failure"),
        Err(e) => debug!(file = %dest.display(), error = %e, "unable to run optipng"),
    }
}

/// Parse a named or hex XPM color. Unknown names map to opaque black.
fn parse_xpm_color(spec: &str) -> [u8; 4] {
    let spec = spec.trim();
    if spec.eq_ignore_ascii_case("none") {
        return [0, 0, 0, 0];
    }
    if let Some(hex) = spec.strip_prefix('#') {
        let parse = |s: &str| u8::from_str_radix(s, 16).unwrap_or(0);
        match hex.len() {
            6 => return [parse(&hex[0..2]), parse(&hex[2..4]), parse(&hex[4..6]), 255],
            12 => {
                // 16-bit channels, keep the high byte
                return [parse(&hex[0..2]), parse(&hex[4..6]), parse(&hex[8..10]), 255];
            }
            _ => return [0, 0, 0, 255],
        }
    }
    match spec.to_lowercase().as_str() {
        "white" => [255, 255, 255, 255],
        "red" => [255, 0, 0, 255],
        "green" => [0, 255, 0, 255],
        "blue" => [0, 0, 255, 255],
        "gray" | "grey" => [128, 128, 128, 255],
        _ => [0, 0, 0, 255],
    }
}

/// Decode an XPM3 image into RGBA pixels.
fn decode_xpm(data: &[u8]) -> Result<image::RgbaImage> {
    let text = String::from_utf8_lossy(data);

    // pull all double-quoted strings out of the C array syntax
    let mut strings: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for c in text.chars() {
        match c {
            '"' if in_string => {
                strings.push(std::mem::take(&mut current));
                in_string = false;
            }
            '"' => in_string = true,
            _ if in_string => current.push(c),
            _ => {}
        }
    }

    let Some(header) = strings.first() else {
        bail!("XPM data contains no values");
    };
    let header_fields: Vec<u32> = header
        .split_whitespace()
        .take(4)
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .context("invalid XPM header")?;
    let [width, height, ncolors, cpp] = header_fields.as_slice() else {
        bail!("XPM header is incomplete");
    };
    let (width, height, ncolors, cpp) =
        (*width as usize, *height as usize, *ncolors as usize, *cpp as usize);
    if width == 0 || height == 0 || cpp == 0 {
        bail!("XPM image has a zero dimension");
    }
    if strings.len() < 1 + ncolors + height {
        bail!("XPM data is truncated");
    }

    let mut palette: HashMap<&str, [u8; 4]> = HashMap::with_capacity(ncolors);
    for color_line in &strings[1..=ncolors] {
        if color_line.len() < cpp {
            bail!("XPM color definition is too short");
        }
        let (code, rest) = color_line.split_at(cpp);
        // use the color visual ("c") key; fall back to the last value
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let mut value = None;
        let mut i = 0;
        while i + 1 < tokens.len() {
            if tokens[i] == "c" {
                value = Some(tokens[i + 1..].join(" "));
                break;
            }
            i += 2;
        }
        let value = value.or_else(|| tokens.last().map(|s| (*s).to_string()));
        let rgba = value.map_or([0, 0, 0, 255], |v| parse_xpm_color(&v));
        palette.insert(code, rgba);
    }

    let mut img = image::RgbaImage::new(width as u32, height as u32);
    for (y, row) in strings[1 + ncolors..1 + ncolors + height].iter().enumerate() {
        let chars: Vec<char> = row.chars().collect();
        if chars.len() < width * cpp {
            bail!("XPM pixel row {y} is too short");
        }
        for x in 0..width {
            let code: String = chars[x * cpp..(x + 1) * cpp].iter().collect();
            let rgba = palette.get(code.as_str()).copied().unwrap_or([0, 0, 0, 0]);
            img.put_pixel(x as u32, y as u32, image::Rgba(rgba));
        }
    }

    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY_XPM: &str = r#"/* XPM */
static char * tiny_xpm[] = {
"2 2 2 1",
"  c None",
". c #FF0000",
". ",
" ."};
"#;

    #[test]
    fn format_detection_by_extension() {
        assert_eq!(IconFormat::from_filename("a.png"), IconFormat::Png);
        assert_eq!(IconFormat::from_filename("a.SVG"), IconFormat::Svg);
        assert_eq!(IconFormat::from_filename("a.svgz"), IconFormat::Svgz);
        assert_eq!(IconFormat::from_filename("a.xpm"), IconFormat::Xpm);
        assert_eq!(IconFormat::from_filename("a.tiff"), IconFormat::Unknown);
        assert!(IconFormat::Svgz.is_vector());
        assert!(!IconFormat::Png.is_vector());
    }

    #[test]
    fn xpm_decoding_works() {
        let img = decode_xpm(TINY_XPM.as_bytes()).expect("decode");
        assert_eq!(img.width(), 2);
        assert_eq!(img.height(), 2);
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0, 0]);
        assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn raster_scaling_changes_dimensions() {
        let mut img = RasterImage::load(TINY_XPM.as_bytes(), IconFormat::Xpm).expect("load");
        img.scale(8, 8);
        assert_eq!(img.width(), 8);
        assert_eq!(img.height(), 8);
    }

    #[test]
    fn svg_rendering_produces_png() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16"><rect width="16" height="16" fill="red"/></svg>"#;
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("out.png");
        render_svg_to_png(svg, 64, 64, &dest, None).expect("render");
        let img = image::open(&dest).expect("reopen png");
        assert_eq!(img.width(), 64);
        assert_eq!(img.height(), 64);
    }
}
