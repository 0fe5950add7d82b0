//! Built-in image transforms
//!
//! Every transform takes the input frame by reference and returns a new
//! frame; none of them keep state between calls or use randomness, so the
//! output is a pure function of the frame and the validated parameters.
//! Borders are handled by clamping coordinates to the nearest edge pixel.
//!
//! Parameters arrive as [`ValidatedParams`] and are decoded into a small
//! typed record per filter before any pixel is touched.

use super::schema::ValidatedParams;
use crate::error::FilterError;
use crate::frame::{Channels, Frame};

type TransformResult = std::result::Result<Frame, FilterError>;

// ==================== Parameter records ====================

fn int_param(filter: &str, params: &ValidatedParams, name: &str) -> Result<i64, FilterError> {
    params.int(name).ok_or_else(|| FilterError::MissingParam {
        filter: filter.to_string(),
        param: name.to_string(),
    })
}

fn real_param(filter: &str, params: &ValidatedParams, name: &str) -> Result<f64, FilterError> {
    params.real(name).ok_or_else(|| FilterError::MissingParam {
        filter: filter.to_string(),
        param: name.to_string(),
    })
}

/// Odd square kernel size
struct KernelParams {
    ksize: usize,
}

impl KernelParams {
    fn decode(filter: &str, params: &ValidatedParams) -> Result<Self, FilterError> {
        let ksize = int_param(filter, params, "ksize")?.max(1) as usize;
        Ok(Self { ksize })
    }
}

struct CannyParams {
    low: f32,
    high: f32,
}

struct SobelParams {
    dx: bool,
    dy: bool,
    ksize: usize,
}

struct BrightnessContrastParams {
    alpha: f32,
    beta: f32,
}

struct BokehParams {
    ksize: usize,
    center_x: f32,
    center_y: f32,
    radius: f32,
}

// ==================== Helpers ====================

fn require_rgb(filter: &str, frame: &Frame) -> Result<(), FilterError> {
    if frame.channels() != Channels::Rgb {
        return Err(FilterError::UnsupportedChannels {
            filter: filter.to_string(),
            channels: frame.channels().count(),
        });
    }
    Ok(())
}

fn rebuild(frame: &Frame, width: u32, height: u32, channels: Channels, data: Vec<u8>) -> TransformResult {
    frame
        .derive(width, height, channels, data)
        .ok_or_else(|| FilterError::InvalidFrame("buffer size mismatch".to_string()))
}

fn same_shape(frame: &Frame, data: Vec<u8>) -> TransformResult {
    rebuild(frame, frame.width(), frame.height(), frame.channels(), data)
}

#[inline]
fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// 1-D Gaussian weights for an odd kernel size
///
/// Sigma follows the usual derivation from the kernel size:
/// `0.3 * ((ksize - 1) / 2 - 1) + 0.8`.
fn gaussian_kernel(ksize: usize) -> Vec<f32> {
    let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (ksize / 2) as i64;
    let raw: Vec<f64> = (-half..=half)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Separable convolution over every channel with edge clamping
fn separable(frame: &Frame, horizontal: &[f32], vertical: &[f32]) -> Vec<f32> {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let c = frame.channel_count();
    let src = frame.data();
    let hh = (horizontal.len() / 2) as isize;
    let vh = (vertical.len() / 2) as isize;

    let mut tmp = vec![0f32; w * h * c];
    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                let mut acc = 0f32;
                for (k, weight) in horizontal.iter().enumerate() {
                    let sx = (x as isize + k as isize - hh).clamp(0, w as isize - 1) as usize;
                    acc += weight * src[(y * w + sx) * c + ch] as f32;
                }
                tmp[(y * w + x) * c + ch] = acc;
            }
        }
    }

    let mut out = vec![0f32; w * h * c];
    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                let mut acc = 0f32;
                for (k, weight) in vertical.iter().enumerate() {
                    let sy = (y as isize + k as isize - vh).clamp(0, h as isize - 1) as usize;
                    acc += weight * tmp[(sy * w + x) * c + ch];
                }
                out[(y * w + x) * c + ch] = acc;
            }
        }
    }
    out
}

fn gaussian(frame: &Frame, ksize: usize) -> Vec<u8> {
    if ksize <= 1 || frame.is_empty() {
        return frame.data().to_vec();
    }
    let kernel = gaussian_kernel(ksize);
    separable(frame, &kernel, &kernel)
        .into_iter()
        .map(saturate)
        .collect()
}

/// Luma using integer BT.601 weights that sum to 256
fn luma(frame: &Frame) -> Vec<u8> {
    match frame.channels() {
        Channels::Intensity => frame.data().to_vec(),
        Channels::Rgb => frame
            .data()
            .chunks_exact(3)
            .map(|px| {
                ((77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32 + 128) >> 8) as u8
            })
            .collect(),
    }
}

fn luma_frame(frame: &Frame) -> TransformResult {
    rebuild(frame, frame.width(), frame.height(), Channels::Intensity, luma(frame))
}

// ==================== Transforms ====================

pub fn convert_to_grayscale(frame: &Frame, _params: &ValidatedParams) -> TransformResult {
    luma_frame(frame)
}

pub fn gaussian_blur(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let p = KernelParams::decode("apply_gaussian_blur", params)?;
    same_shape(frame, gaussian(frame, p.ksize))
}

pub fn median_blur(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let p = KernelParams::decode("apply_median_blur", params)?;
    if p.ksize <= 1 || frame.is_empty() {
        return same_shape(frame, frame.data().to_vec());
    }

    let w = frame.width() as isize;
    let h = frame.height() as isize;
    let c = frame.channel_count();
    let half = (p.ksize / 2) as isize;
    let src = frame.data();
    let mut window = Vec::with_capacity(p.ksize * p.ksize);
    let mut out = vec![0u8; src.len()];

    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                window.clear();
                for dy in -half..=half {
                    let sy = (y + dy).clamp(0, h - 1);
                    for dx in -half..=half {
                        let sx = (x + dx).clamp(0, w - 1);
                        window.push(src[((sy * w + sx) as usize) * c + ch]);
                    }
                }
                let mid = window.len() / 2;
                let (_, median, _) = window.select_nth_unstable(mid);
                out[((y * w + x) as usize) * c + ch] = *median;
            }
        }
    }
    same_shape(frame, out)
}

/// Smoothing and derivative taps for Sobel apertures 1, 3, 5 and 7
fn sobel_taps(ksize: usize) -> (Vec<f32>, Vec<f32>) {
    match ksize {
        1 => (vec![1.0], vec![-1.0, 0.0, 1.0]),
        3 => (vec![1.0, 2.0, 1.0], vec![-1.0, 0.0, 1.0]),
        5 => (
            vec![1.0, 4.0, 6.0, 4.0, 1.0],
            vec![-1.0, -2.0, 0.0, 2.0, 1.0],
        ),
        _ => (
            vec![1.0, 6.0, 15.0, 20.0, 15.0, 6.0, 1.0],
            vec![-1.0, -4.0, -5.0, 0.0, 5.0, 4.0, 1.0],
        ),
    }
}

pub fn sobel_edges(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let filter = "apply_sobel_edge_detection";
    let p = SobelParams {
        dx: int_param(filter, params, "dx")? != 0,
        dy: int_param(filter, params, "dy")? != 0,
        ksize: int_param(filter, params, "ksize")?.max(1) as usize,
    };
    let gray = luma_frame(frame)?;
    let (smooth, deriv) = sobel_taps(p.ksize);

    let gx = if p.dx {
        separable(&gray, &deriv, &smooth)
    } else {
        vec![0.0; gray.pixel_count()]
    };
    let gy = if p.dy {
        separable(&gray, &smooth, &deriv)
    } else {
        vec![0.0; gray.pixel_count()]
    };

    let data = gx
        .iter()
        .zip(gy.iter())
        .map(|(x, y)| saturate(x.abs() + y.abs()))
        .collect();
    same_shape(&gray, data)
}

pub fn canny_edges(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let filter = "apply_canny_edge_detection";
    let mut p = CannyParams {
        low: int_param(filter, params, "low_threshold")? as f32,
        high: int_param(filter, params, "high_threshold")? as f32,
    };
    if p.low > p.high {
        std::mem::swap(&mut p.low, &mut p.high);
    }

    let gray = luma_frame(frame)?;
    let w = gray.width() as usize;
    let h = gray.height() as usize;
    if w == 0 || h == 0 {
        return Ok(gray);
    }

    let smoothed = rebuild(&gray, gray.width(), gray.height(), Channels::Intensity, gaussian(&gray, 5))?;
    let (smooth, deriv) = sobel_taps(3);
    let gx = separable(&smoothed, &deriv, &smooth);
    let gy = separable(&smoothed, &smooth, &deriv);
    let magnitude: Vec<f32> = gx.iter().zip(&gy).map(|(x, y)| x.abs() + y.abs()).collect();

    // Non-maximum suppression along the quantized gradient direction
    let mut thin = vec![0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = magnitude[i];
            if m == 0.0 {
                continue;
            }
            let angle = gy[i].atan2(gx[i]).to_degrees().rem_euclid(180.0);
            let (ox, oy): (isize, isize) = if !(22.5..157.5).contains(&angle) {
                (1, 0)
            } else if angle < 67.5 {
                (1, 1)
            } else if angle < 112.5 {
                (0, 1)
            } else {
                (-1, 1)
            };
            let at = |dx: isize, dy: isize| {
                let sx = (x as isize + dx).clamp(0, w as isize - 1) as usize;
                let sy = (y as isize + dy).clamp(0, h as isize - 1) as usize;
                magnitude[sy * w + sx]
            };
            if m >= at(ox, oy) && m > at(-ox, -oy) {
                thin[i] = m;
            }
        }
    }

    // Hysteresis: strong pixels seed, weak pixels join when connected
    let mut out = vec![0u8; w * h];
    let mut stack: Vec<usize> = thin
        .iter()
        .enumerate()
        .filter(|(_, m)| **m >= p.high && **m > 0.0)
        .map(|(i, _)| i)
        .collect();
    for &i in &stack {
        out[i] = 255;
    }
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if out[n] == 0 && thin[n] >= p.low && thin[n] > 0.0 {
                    out[n] = 255;
                    stack.push(n);
                }
            }
        }
    }
    same_shape(&gray, out)
}

pub fn laplacian_sharpen(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let strength = real_param("apply_laplacian_sharpen", params, "strength")? as f32;
    let w = frame.width() as isize;
    let h = frame.height() as isize;
    let c = frame.channel_count();
    let src = frame.data();
    let at = |x: isize, y: isize, ch: usize| -> f32 {
        let sx = x.clamp(0, w - 1);
        let sy = y.clamp(0, h - 1);
        src[((sy * w + sx) as usize) * c + ch] as f32
    };

    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            for ch in 0..c {
                let center = at(x, y, ch);
                let laplacian = at(x - 1, y, ch) + at(x + 1, y, ch) + at(x, y - 1, ch)
                    + at(x, y + 1, ch)
                    - 4.0 * center;
                out[((y * w + x) as usize) * c + ch] = saturate(center - strength * laplacian);
            }
        }
    }
    same_shape(frame, out)
}

pub fn invert_colors(frame: &Frame, _params: &ValidatedParams) -> TransformResult {
    same_shape(frame, frame.data().iter().map(|v| 255 - v).collect())
}

pub fn brightness_contrast(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let filter = "adjust_brightness_contrast";
    let p = BrightnessContrastParams {
        alpha: real_param(filter, params, "alpha")? as f32,
        beta: int_param(filter, params, "beta")? as f32,
    };
    let data = frame
        .data()
        .iter()
        .map(|&v| saturate(p.alpha * v as f32 + p.beta))
        .collect();
    same_shape(frame, data)
}

/// Scale HSV saturation while keeping hue and value
///
/// With hue and value fixed, each channel's distance from the value (max)
/// channel is proportional to saturation, so scaling S scales that distance.
pub fn adjust_saturation(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let filter = "adjust_saturation";
    let factor = real_param(filter, params, "saturation_factor")? as f32;
    require_rgb(filter, frame)?;

    let mut data = Vec::with_capacity(frame.data().len());
    for px in frame.data().chunks_exact(3) {
        let max = px.iter().copied().max().unwrap_or(0) as f32;
        let min = px.iter().copied().min().unwrap_or(0) as f32;
        if max == 0.0 || max == min {
            data.extend_from_slice(px);
            continue;
        }
        let s = (max - min) / max;
        let scaled = (s * factor).clamp(0.0, 1.0);
        let ratio = scaled / s;
        data.extend(px.iter().map(|&v| saturate(max - (max - v as f32) * ratio)));
    }
    same_shape(frame, data)
}

pub fn sepia_tint(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let filter = "sepia_tint";
    let strength = real_param(filter, params, "strength")? as f32;
    require_rgb(filter, frame)?;

    const SEPIA: [[f32; 3]; 3] = [
        [0.393, 0.769, 0.189],
        [0.349, 0.686, 0.168],
        [0.272, 0.534, 0.131],
    ];

    let mut data = Vec::with_capacity(frame.data().len());
    for px in frame.data().chunks_exact(3) {
        let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
        for (row, &orig) in SEPIA.iter().zip(px.iter()) {
            let toned = row[0] * r + row[1] * g + row[2] * b;
            data.push(saturate((1.0 - strength) * orig as f32 + strength * toned));
        }
    }
    same_shape(frame, data)
}

/// Blur everything outside a circular focus area, feathering the boundary
pub fn bokeh_effect(frame: &Frame, params: &ValidatedParams) -> TransformResult {
    let filter = "bokeh_effect";
    let p = BokehParams {
        ksize: int_param(filter, params, "ksize")?.max(1) as usize,
        center_x: real_param(filter, params, "center_x")? as f32,
        center_y: real_param(filter, params, "center_y")? as f32,
        radius: real_param(filter, params, "radius")? as f32,
    };
    let blurred = gaussian(frame, p.ksize);

    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let c = frame.channel_count();
    let scale = w.max(h) as f32;
    let cx = p.center_x * w as f32;
    let cy = p.center_y * h as f32;
    let inner = p.radius * scale;
    let outer = inner * 1.25;

    let src = frame.data();
    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        for x in 0..w {
            let dist = ((x as f32 + 0.5 - cx).powi(2) + (y as f32 + 0.5 - cy).powi(2)).sqrt();
            let t = ((dist - inner) / (outer - inner).max(f32::EPSILON)).clamp(0.0, 1.0);
            let blend = t * t * (3.0 - 2.0 * t);
            for ch in 0..c {
                let i = (y * w + x) * c + ch;
                out[i] = saturate((1.0 - blend) * src[i] as f32 + blend * blurred[i] as f32);
            }
        }
    }
    same_shape(frame, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::schema::ParamValue;

    fn params(values: &[(&str, ParamValue)]) -> ValidatedParams {
        ValidatedParams::from_values(
            values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        )
    }

    fn gradient(width: u32, height: u32) -> Frame {
        let data = (0..height)
            .flat_map(|y| (0..width).flat_map(move |x| {
                let v = ((x * 255) / width.max(1)) as u8;
                [v, (y * 10) as u8, 255 - v]
            }))
            .collect();
        Frame::from_raw(width, height, Channels::Rgb, data).unwrap()
    }

    #[test]
    fn test_grayscale_flat_field_exact() {
        let frame = Frame::filled(4, 4, Channels::Rgb, 128);
        let gray = convert_to_grayscale(&frame, &ValidatedParams::default()).unwrap();
        assert_eq!(gray.channels(), Channels::Intensity);
        assert!(gray.data().iter().all(|&v| v == 128));
    }

    #[test]
    fn test_gaussian_kernel_normalized() {
        for k in [3, 5, 9, 31] {
            let kernel = gaussian_kernel(k);
            assert_eq!(kernel.len(), k);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_blur_flat_field_unchanged() {
        let frame = Frame::filled(4, 4, Channels::Intensity, 128);
        let out = gaussian_blur(&frame, &params(&[("ksize", ParamValue::Integer(9))])).unwrap();
        assert!(out.same_pixels(&frame));
    }

    #[test]
    fn test_median_removes_single_outlier() {
        let mut data = vec![50u8; 25];
        data[12] = 255;
        let frame = Frame::from_raw(5, 5, Channels::Intensity, data).unwrap();
        let out = median_blur(&frame, &params(&[("ksize", ParamValue::Integer(3))])).unwrap();
        assert!(out.data().iter().all(|&v| v == 50));
    }

    #[test]
    fn test_invert_twice_is_identity() {
        let frame = gradient(8, 4);
        let once = invert_colors(&frame, &ValidatedParams::default()).unwrap();
        let twice = invert_colors(&once, &ValidatedParams::default()).unwrap();
        assert!(twice.same_pixels(&frame));
        assert_eq!(once.sequence(), frame.sequence());
    }

    #[test]
    fn test_brightness_contrast_saturates() {
        let frame = Frame::filled(2, 2, Channels::Rgb, 200);
        let p = params(&[("alpha", ParamValue::Real(2.0)), ("beta", ParamValue::Integer(10))]);
        let out = brightness_contrast(&frame, &p).unwrap();
        assert!(out.data().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_saturation_rejects_intensity() {
        let frame = Frame::filled(2, 2, Channels::Intensity, 10);
        let p = params(&[("saturation_factor", ParamValue::Real(1.5))]);
        let err = adjust_saturation(&frame, &p).unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedChannels { channels: 1, .. }));
    }

    #[test]
    fn test_zero_saturation_is_gray() {
        let frame = Frame::from_raw(1, 1, Channels::Rgb, vec![200, 100, 50]).unwrap();
        let p = params(&[("saturation_factor", ParamValue::Real(0.0))]);
        let out = adjust_saturation(&frame, &p).unwrap();
        assert_eq!(out.data(), &[200, 200, 200]);
    }

    #[test]
    fn test_sepia_strength_zero_is_identity() {
        let frame = gradient(6, 3);
        let p = params(&[("strength", ParamValue::Real(0.0))]);
        let out = sepia_tint(&frame, &p).unwrap();
        assert!(out.same_pixels(&frame));
    }

    #[test]
    fn test_sobel_flat_field_has_no_edges() {
        let frame = Frame::filled(6, 6, Channels::Rgb, 90);
        let p = params(&[
            ("dx", ParamValue::Integer(1)),
            ("dy", ParamValue::Integer(1)),
            ("ksize", ParamValue::Integer(3)),
        ]);
        let out = sobel_edges(&frame, &p).unwrap();
        assert_eq!(out.channels(), Channels::Intensity);
        assert!(out.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_canny_finds_vertical_step() {
        let data = (0..16u32)
            .flat_map(|_| (0..16u32).map(|x| if x < 8 { 0u8 } else { 255u8 }))
            .collect();
        let frame = Frame::from_raw(16, 16, Channels::Intensity, data).unwrap();
        let p = params(&[
            ("low_threshold", ParamValue::Integer(50)),
            ("high_threshold", ParamValue::Integer(150)),
        ]);
        let out = canny_edges(&frame, &p).unwrap();
        assert!(out.data().iter().all(|&v| v == 0 || v == 255));
        // every row has an edge pixel next to the step, none far from it
        for y in 0..16 {
            let row = &out.data()[y * 16..(y + 1) * 16];
            assert!(row[6..10].contains(&255), "row {} has no edge", y);
            assert!(row[..4].iter().all(|&v| v == 0));
            assert!(row[12..].iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn test_sharpen_flat_field_unchanged() {
        let frame = Frame::filled(5, 5, Channels::Rgb, 77);
        let out = laplacian_sharpen(&frame, &params(&[("strength", ParamValue::Real(1.0))])).unwrap();
        assert!(out.same_pixels(&frame));
    }

    #[test]
    fn test_bokeh_keeps_focus_center() {
        let frame = gradient(32, 32);
        let p = params(&[
            ("ksize", ParamValue::Integer(9)),
            ("center_x", ParamValue::Real(0.5)),
            ("center_y", ParamValue::Real(0.5)),
            ("radius", ParamValue::Real(0.2)),
        ]);
        let out = bokeh_effect(&frame, &p).unwrap();
        assert_eq!(out.sample(16, 16, 0), frame.sample(16, 16, 0));
        assert_ne!(out.data(), frame.data());
    }

    #[test]
    fn test_missing_param_reported() {
        let frame = Frame::filled(2, 2, Channels::Rgb, 0);
        let err = gaussian_blur(&frame, &ValidatedParams::default()).unwrap_err();
        assert!(matches!(err, FilterError::MissingParam { .. }));
    }
}
