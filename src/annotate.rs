// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Rendering of detections onto the original image.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::error::{InferenceError, Result};
use crate::postprocessing::MASK_THRESHOLD;
use crate::results::Results;

/// Assets URL for downloading fonts
const ASSETS_URL: &str = "https://github.com/ultralytics/assets/releases/download/v0.0.0";

/// Font download timeouts.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Mask blend factor.
const MASK_ALPHA: f32 = 0.5;

/// Ultralytics Color Palette
pub const COLORS: [[u8; 3]; 20] = [
    [4, 42, 255],    // #042aff
    [11, 219, 235],  // #0bdbeb
    [243, 243, 243], // #f3f3f3
    [0, 223, 183],   // #00dfb7
    [17, 31, 104],   // #111f68
    [255, 111, 221], // #ff6fdd
    [255, 68, 79],   // #ff444f
    [204, 237, 0],   // #cced00
    [0, 243, 68],    // #00f344
    [189, 0, 255],   // #bd00ff
    [0, 180, 255],   // #00b4ff
    [221, 0, 186],   // #dd00ba
    [0, 255, 255],   // #00ffff
    [38, 192, 0],    // #26c000
    [1, 255, 179],   // #01ffb3
    [125, 36, 255],  // #7d24ff
    [123, 0, 104],   // #7b0068
    [255, 27, 108],  // #ff1b6c
    [252, 109, 47],  // #fc6d2f
    [162, 255, 11],  // #a2ff0b
];

/// Get color for a class ID
#[must_use]
pub const fn get_class_color(class_id: usize) -> Rgb<u8> {
    Rgb(COLORS[class_id % COLORS.len()])
}

/// Check if font exists locally or download it into the Ultralytics config dir.
pub fn check_font(font: &str) -> Option<PathBuf> {
    let font_name = Path::new(font).file_name()?.to_string_lossy().into_owned();
    let config_dir = dirs::config_dir()?.join("Ultralytics");
    let font_path = config_dir.join(&font_name);

    if font_path.exists() {
        return Some(font_path);
    }

    if let Err(e) = fs::create_dir_all(&config_dir) {
        warn!("Failed to create config directory {}: {e}", config_dir.display());
        return None;
    }

    let url = format!("{ASSETS_URL}/{font_name}");
    info!("Downloading {url} to {}", font_path.display());

    download_font(&url, &font_path, CONNECT_TIMEOUT, READ_TIMEOUT).then_some(font_path)
}

/// Fetch `url` into `dest`, giving up after the given timeouts.
///
/// Returns `false` and leaves no file behind on failure.
fn download_font(url: &str, dest: &Path, connect_timeout: Duration, read_timeout: Duration) -> bool {
    let config = ureq::Agent::config_builder()
        .timeout_resolve(Some(connect_timeout))
        .timeout_connect(Some(connect_timeout))
        .timeout_recv_response(Some(read_timeout))
        .timeout_recv_body(Some(read_timeout))
        .build();
    let agent = ureq::Agent::new_with_config(config);

    let response = match agent.get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Timeout(_)) => {
            warn!("Timed out downloading font from {url}");
            return false;
        }
        Err(e) => {
            warn!("Failed to download font from {url}: {e}");
            return false;
        }
    };

    let mut file = match File::create(dest) {
        Ok(f) => f,
        Err(e) => {
            warn!("Failed to create font file: {e}");
            return false;
        }
    };

    let mut reader = response.into_body().into_reader();
    if let Err(e) = io::copy(&mut reader, &mut file) {
        warn!("Failed to download font: {e}");
        let _ = fs::remove_file(dest);
        return false;
    }

    true
}

/// Draws masks, boxes and labels.
///
/// Labels need a TrueType font; without one only masks and boxes are drawn.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Annotator with an already loaded font (or none).
    #[must_use]
    pub const fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    /// Load a font from a TTF/OTF file.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::Io`] if the file cannot be read and
    /// [`InferenceError::ConfigError`] if it is not a valid font.
    pub fn from_font_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let font = FontVec::try_from_vec(data).map_err(|e| {
            InferenceError::ConfigError(format!("Invalid font {}: {e}", path.display()))
        })?;
        Ok(Self::new(Some(font)))
    }

    /// Resolve the label font at startup.
    ///
    /// An explicit path must load. Otherwise Arial (or Arial Unicode when a
    /// class name is non-ASCII) is taken from the font cache, downloading it
    /// on first use; if that fails labels are disabled.
    ///
    /// # Errors
    ///
    /// Returns an error only if an explicit `font` cannot be loaded.
    pub fn resolve(font: Option<&Path>, names: &HashMap<usize, String>) -> Result<Self> {
        if let Some(path) = font {
            return Self::from_font_file(path);
        }

        let font_name = if names.values().all(|n| n.is_ascii()) {
            "Arial.ttf"
        } else {
            "Arial.Unicode.ttf"
        };

        match check_font(font_name).map(Self::from_font_file) {
            Some(Ok(annotator)) => Ok(annotator),
            Some(Err(e)) => {
                warn!("Ignoring cached font {font_name}: {e}. Labels will not be drawn");
                Ok(Self::new(None))
            }
            None => {
                warn!("No font available, labels will not be drawn");
                Ok(Self::new(None))
            }
        }
    }

    /// Whether labels will be drawn.
    #[must_use]
    pub const fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render `results` onto a copy of `image`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn annotate(&self, image: &DynamicImage, results: &Results) -> RgbImage {
        let mut img = image.to_rgb8();
        let Some(ref boxes) = results.boxes else {
            return img;
        };

        let (width, height) = img.dimensions();
        let line_width = line_width(width, height);
        let cls = boxes.cls();
        let xyxy = boxes.xyxy();

        if let Some(ref masks) = results.masks {
            if masks.orig_shape == (height, width) {
                for i in 0..masks.len().min(boxes.len()) {
                    let mask = match masks.upsample(i) {
                        Ok(mask) => mask,
                        Err(e) => {
                            warn!("Skipping mask {i}: {e}");
                            continue;
                        }
                    };
                    let color = get_class_color(cls[i] as usize);
                    let b = xyxy.row(i);
                    let (xs, ys) = box_region([b[0], b[1], b[2], b[3]], width, height);
                    for y in ys {
                        for x in xs.clone() {
                            if mask[[y, x]] > MASK_THRESHOLD {
                                blend(img.get_pixel_mut(x as u32, y as u32), color, MASK_ALPHA);
                            }
                        }
                    }
                }
            } else {
                warn!(
                    mask_image = ?masks.orig_shape,
                    "Masks were built for a different image size, skipping masks"
                );
            }
        }

        let conf = boxes.conf();

        for i in 0..boxes.len() {
            let class_id = cls[i] as usize;
            let color = get_class_color(class_id);

            let x1 = (xyxy[[i, 0]].round() as i32).clamp(0, width as i32 - 1);
            let y1 = (xyxy[[i, 1]].round() as i32).clamp(0, height as i32 - 1);
            let x2 = (xyxy[[i, 2]].round() as i32).clamp(0, width as i32 - 1);
            let y2 = (xyxy[[i, 3]].round() as i32).clamp(0, height as i32 - 1);

            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            for t in 0..line_width {
                let (tx1, ty1, tx2, ty2) = (x1 + t, y1 + t, x2 - t, y2 - t);
                if tx2 > tx1 && ty2 > ty1 {
                    let rect = Rect::at(tx1, ty1).of_size((tx2 - tx1) as u32, (ty2 - ty1) as u32);
                    draw_hollow_rect_mut(&mut img, rect, color);
                }
            }

            if let Some(ref font) = self.font {
                let label = format!("{} {:.2}", results.class_name(class_id), conf[i]);
                draw_label(&mut img, font, &label, (x1, y1, y2), color, line_width);
            }
        }

        img
    }
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("has_font", &self.has_font())
            .finish()
    }
}

/// Pixel columns and rows with `x1 <= x <= x2` and `y1 <= y <= y2`, inside the image.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn box_region(xyxy: [f32; 4], width: u32, height: u32) -> (Range<usize>, Range<usize>) {
    let (w, h) = (width as usize, height as usize);
    let x_lo = (xyxy[0].max(0.0).ceil() as usize).min(w);
    let y_lo = (xyxy[1].max(0.0).ceil() as usize).min(h);
    let x_hi = ((xyxy[2].max(0.0).floor() as usize) + 1).min(w);
    let y_hi = ((xyxy[3].max(0.0).floor() as usize) + 1).min(h);
    (x_lo..x_hi.max(x_lo), y_lo..y_hi.max(y_lo))
}

/// Box line width scaled to the image size (minimum 2 px).
#[allow(clippy::cast_possible_truncation)]
fn line_width(width: u32, height: u32) -> i32 {
    let lw = (f64::from(width + height) / 2.0 * 0.003).round() as i32;
    lw.max(2)
}

/// Draw `label` on a filled strip above the box, or inside its top edge
/// when there is no room above.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
fn draw_label(
    img: &mut RgbImage,
    font: &FontVec,
    label: &str,
    (x1, y1, y2): (i32, i32, i32),
    color: Rgb<u8>,
    line_width: i32,
) {
    let scale = PxScale::from((line_width as f32 * 6.0).max(12.0));
    let (text_w, text_h) = text_size(scale, font, label);
    let pad = line_width.max(1);
    let strip_w = text_w as i32 + 2 * pad;
    let strip_h = text_h as i32 + 2 * pad;

    let top = if y1 >= strip_h { y1 - strip_h } else { y1.min(y2 - 1).max(0) };
    let strip = Rect::at(x1, top).of_size(strip_w.max(1) as u32, strip_h.max(1) as u32);
    draw_filled_rect_mut(img, strip, color);
    draw_text_mut(img, text_color(color), x1 + pad, top + pad, scale, font, label);
}

/// Black or white text, whichever contrasts with `background`.
fn text_color(background: Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = background.0;
    let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    if luma > 150.0 {
        Rgb([0, 0, 0])
    } else {
        Rgb([255, 255, 255])
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(pixel: &mut Rgb<u8>, color: Rgb<u8>, alpha: f32) {
    for (p, c) in pixel.0.iter_mut().zip(color.0) {
        *p = (f32::from(*p) * (1.0 - alpha) + f32::from(c) * alpha).round() as u8;
    }
}
