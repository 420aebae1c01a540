//! Local pixel operations for the adjust and blend nodes
//!
//! Images travel between nodes as URLs. Data URLs are decoded in place;
//! anything else is fetched through the provider client. Results are
//! re-encoded as PNG data URLs.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ImageEncoder, Rgba, RgbaImage};
use pipeline_engine::{PipelineError, Result};

use crate::api::PipelineApi;
use crate::kinds::BlendMode;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Decode the payload of a base64 `data:` URL, `None` for other URLs
pub fn decode_data_url(url: &str) -> Option<Result<Vec<u8>>> {
    let rest = url.strip_prefix("data:")?;
    let Some((meta, payload)) = rest.split_once(',') else {
        return Some(Err(PipelineError::image("Malformed data URL")));
    };
    if !meta.ends_with(";base64") {
        return Some(Err(PipelineError::image(format!(
            "Unsupported data URL encoding: {}",
            meta
        ))));
    }
    Some(
        BASE64
            .decode(payload.trim())
            .map_err(|e| PipelineError::image(format!("Invalid base64 image data: {}", e))),
    )
}

/// Load an image from a data URL or a remote URL
pub async fn load_image(api: &dyn PipelineApi, url: &str) -> Result<RgbaImage> {
    let bytes = match decode_data_url(url) {
        Some(decoded) => decoded?,
        None => api.fetch_image(url).await?,
    };
    let image = image::load_from_memory(&bytes)
        .map_err(|e| PipelineError::image(format!("Failed to decode image: {}", e)))?;
    Ok(image.to_rgba8())
}

/// Encode as a PNG data URL
pub fn encode_png_data_url(image: &RgbaImage) -> Result<String> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| PipelineError::image(format!("Failed to encode PNG: {}", e)))?;
    Ok(format!("{}{}", PNG_DATA_URL_PREFIX, BASE64.encode(png)))
}

/// Filter multiplier for a slider value in `-50..=50`
pub fn slider_factor(value: f64) -> f32 {
    (1.0 + value / 50.0) as f32
}

/// Brightness, then contrast, then saturation, each clamped per stage
///
/// Factors are multipliers where 1 leaves the channel unchanged.
pub fn adjust(image: &RgbaImage, brightness: f32, contrast: f32, saturation: f32) -> RgbaImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let mut rgb = [
            f32::from(pixel[0]) / 255.0,
            f32::from(pixel[1]) / 255.0,
            f32::from(pixel[2]) / 255.0,
        ];
        for c in &mut rgb {
            *c = (*c * brightness).clamp(0.0, 1.0);
        }
        for c in &mut rgb {
            *c = ((*c - 0.5) * contrast + 0.5).clamp(0.0, 1.0);
        }
        rgb = saturate(rgb, saturation);
        for (channel, c) in pixel.0.iter_mut().zip(rgb) {
            *channel = to_u8(c);
        }
    }
    out
}

// Luminance-preserving matrix of the CSS `saturate()` filter.
fn saturate([r, g, b]: [f32; 3], s: f32) -> [f32; 3] {
    [
        (0.213 + 0.787 * s) * r + (0.715 - 0.715 * s) * g + (0.072 - 0.072 * s) * b,
        (0.213 - 0.213 * s) * r + (0.715 + 0.285 * s) * g + (0.072 - 0.072 * s) * b,
        (0.213 - 0.213 * s) * r + (0.715 - 0.715 * s) * g + (0.072 + 0.928 * s) * b,
    ]
    .map(|c| c.clamp(0.0, 1.0))
}

/// Composite `top` over `bottom` on a canvas sized to the larger of both
///
/// Both images are stretched to fill the canvas. `opacity` is in `0..=1`.
pub fn blend(bottom: &RgbaImage, top: &RgbaImage, mode: BlendMode, opacity: f32) -> RgbaImage {
    let width = bottom.width().max(top.width());
    let height = bottom.height().max(top.height());
    let mut canvas = fit(bottom, width, height);
    let top = fit(top, width, height);
    let opacity = opacity.clamp(0.0, 1.0);

    for (dst, src) in canvas.pixels_mut().zip(top.pixels()) {
        *dst = composite(*dst, *src, mode, opacity);
    }
    canvas
}

fn fit(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::Triangle)
    }
}

fn composite(backdrop: Rgba<u8>, source: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    let ab = f32::from(backdrop[3]) / 255.0;
    let a_s = f32::from(source[3]) / 255.0 * opacity;
    let ao = a_s + ab * (1.0 - a_s);
    if ao <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for i in 0..3 {
        let cb = f32::from(backdrop[i]) / 255.0;
        let cs = f32::from(source[i]) / 255.0;
        // Mixed source colour, then source-over.
        let mixed = (1.0 - ab) * cs + ab * blend_channel(mode, cb, cs);
        let co = a_s * mixed + ab * cb * (1.0 - a_s);
        out[i] = to_u8(co / ao);
    }
    out[3] = to_u8(ao);
    Rgba(out)
}

fn blend_channel(mode: BlendMode, cb: f32, cs: f32) -> f32 {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => cb * cs,
        BlendMode::Screen => cb + cs - cb * cs,
        BlendMode::Overlay => {
            if cb <= 0.5 {
                2.0 * cb * cs
            } else {
                1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
            }
        }
        BlendMode::Difference => (cb - cs).abs(),
    }
}

fn to_u8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}
