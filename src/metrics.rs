//! Histogram and image-quality metrics
//!
//! Pure functions over frames; nothing here keeps state or returns an error.
//! Inputs that cannot be compared meaningfully (empty frames, non-finite
//! intermediates) produce [`QualityMetrics::degenerate`] instead.
//!
//! # Quality
//!
//! - **PSNR** with a data range of 255; identical frames give `f64::INFINITY`
//! - **SSIM** over a 7×7 uniform window with K1 = 0.01 and K2 = 0.03, using
//!   sample (N-1) covariance, averaged over every window position that fits
//!   inside the frame and over channels. Frames smaller than the window use
//!   the largest odd window that fits.
//! - **Mean absolute difference** over all samples

use crate::frame::{Channels, Frame};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

const DATA_RANGE: f64 = 255.0;
const SSIM_WINDOW: usize = 7;
const SSIM_K1: f64 = 0.01;
const SSIM_K2: f64 = 0.03;

/// Which histogram the worker computes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramMode {
    /// One histogram of per-pixel intensity
    #[default]
    Intensity,
    /// One histogram per channel
    PerChannel,
}

/// 256-bin sample counts
#[derive(Debug, Clone, PartialEq)]
pub enum Histogram {
    Intensity(Box<[u32; 256]>),
    PerChannel(Vec<[u32; 256]>),
}

impl Histogram {
    /// Sum of all counts across all bins and channels
    pub fn total(&self) -> u64 {
        match self {
            Histogram::Intensity(bins) => bins.iter().map(|&c| c as u64).sum(),
            Histogram::PerChannel(channels) => channels
                .iter()
                .flat_map(|bins| bins.iter())
                .map(|&c| c as u64)
                .sum(),
        }
    }

    /// Bins for one channel; intensity histograms only have channel 0
    pub fn channel(&self, index: usize) -> Option<&[u32; 256]> {
        match self {
            Histogram::Intensity(bins) => (index == 0).then_some(&**bins),
            Histogram::PerChannel(channels) => channels.get(index),
        }
    }
}

/// Compute the histogram of `frame`
///
/// Intensity of a color pixel is the truncated mean of its channels.
pub fn histogram(frame: &Frame, mode: HistogramMode) -> Histogram {
    match mode {
        HistogramMode::Intensity => {
            let mut bins = Box::new([0u32; 256]);
            for v in frame.intensity() {
                bins[v as usize] += 1;
            }
            Histogram::Intensity(bins)
        }
        HistogramMode::PerChannel => {
            let c = frame.channel_count();
            let mut channels = vec![[0u32; 256]; c];
            for px in frame.data().chunks_exact(c) {
                for (bins, &v) in channels.iter_mut().zip(px) {
                    bins[v as usize] += 1;
                }
            }
            Histogram::PerChannel(channels)
        }
    }
}

/// Similarity between an original and a processed frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Peak signal-to-noise ratio in dB
    pub psnr: f64,
    /// Structural similarity index
    pub ssim: f64,
    pub mean_abs_diff: f64,
    /// Set when the inputs could not be compared; the other fields are zero
    pub degenerate: bool,
}

impl QualityMetrics {
    /// Sentinel for inputs that cannot be compared
    pub fn degenerate() -> Self {
        Self {
            psnr: 0.0,
            ssim: 0.0,
            mean_abs_diff: 0.0,
            degenerate: true,
        }
    }
}

/// Compare `processed` against `original`
///
/// The processed frame is resized (bilinear) to the original's dimensions
/// when they differ. When channel counts differ both sides are compared as
/// intensity.
pub fn quality(original: &Frame, processed: &Frame) -> QualityMetrics {
    if original.is_empty() || processed.is_empty() {
        return QualityMetrics::degenerate();
    }

    let resized;
    let processed = if (processed.width(), processed.height()) != (original.width(), original.height()) {
        let img = processed
            .to_dynamic_image()
            .resize_exact(original.width(), original.height(), FilterType::Triangle);
        resized = Frame::from_dynamic_image(&img);
        &resized
    } else {
        processed
    };

    let (a, b, channels) = if original.channels() == processed.channels() {
        (
            original.data().to_vec(),
            processed.data().to_vec(),
            original.channel_count(),
        )
    } else {
        (original.intensity(), processed.intensity(), Channels::Intensity.count() as usize)
    };
    if a.len() != b.len() || a.is_empty() {
        return QualityMetrics::degenerate();
    }

    let width = original.width() as usize;
    let height = original.height() as usize;
    let metrics = QualityMetrics {
        psnr: psnr(&a, &b),
        ssim: ssim(&a, &b, width, height, channels),
        mean_abs_diff: mean_abs_diff(&a, &b),
        degenerate: false,
    };

    if metrics.ssim.is_nan() || metrics.psnr.is_nan() || !metrics.mean_abs_diff.is_finite() {
        tracing::debug!("Quality metrics not finite, reporting degenerate result");
        return QualityMetrics::degenerate();
    }
    metrics
}

fn psnr(a: &[u8], b: &[u8]) -> f64 {
    let mse = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        / a.len() as f64;
    if mse == 0.0 {
        return f64::INFINITY;
    }
    10.0 * (DATA_RANGE * DATA_RANGE / mse).log10()
}

fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x as i16 - y as i16).unsigned_abs() as f64)
        .sum::<f64>()
        / a.len() as f64
}

/// Largest odd window no bigger than `SSIM_WINDOW` that fits the frame
fn ssim_window(width: usize, height: usize) -> usize {
    let fit = SSIM_WINDOW.min(width).min(height);
    if fit % 2 == 0 {
        fit.saturating_sub(1)
    } else {
        fit
    }
}

/// Summed-area table with a zero row and column in front
struct Integral {
    stride: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(width: usize, height: usize, value: impl Fn(usize) -> f64) -> Self {
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += value(y * width + x);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    /// Sum over the `size`×`size` window whose top-left corner is (x, y)
    fn window(&self, x: usize, y: usize, size: usize) -> f64 {
        let s = self.stride;
        self.sums[(y + size) * s + x + size] - self.sums[y * s + x + size] - self.sums[(y + size) * s + x]
            + self.sums[y * s + x]
    }
}

fn ssim(a: &[u8], b: &[u8], width: usize, height: usize, channels: usize) -> f64 {
    let win = ssim_window(width, height);
    if win == 0 {
        return f64::NAN;
    }
    let np = (win * win) as f64;
    let cov_norm = if win > 1 { np / (np - 1.0) } else { 1.0 };
    let c1 = (SSIM_K1 * DATA_RANGE).powi(2);
    let c2 = (SSIM_K2 * DATA_RANGE).powi(2);

    let mut total = 0.0;
    for ch in 0..channels {
        let x = |i: usize| a[i * channels + ch] as f64;
        let y = |i: usize| b[i * channels + ch] as f64;
        let sx = Integral::new(width, height, x);
        let sy = Integral::new(width, height, y);
        let sxx = Integral::new(width, height, |i| x(i) * x(i));
        let syy = Integral::new(width, height, |i| y(i) * y(i));
        let sxy = Integral::new(width, height, |i| x(i) * y(i));

        let mut sum = 0.0;
        let mut count = 0usize;
        for wy in 0..=height - win {
            for wx in 0..=width - win {
                let ux = sx.window(wx, wy, win) / np;
                let uy = sy.window(wx, wy, win) / np;
                let vx = cov_norm * (sxx.window(wx, wy, win) / np - ux * ux);
                let vy = cov_norm * (syy.window(wx, wy, win) / np - uy * uy);
                let vxy = cov_norm * (sxy.window(wx, wy, win) / np - ux * uy);

                let numerator = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
                let denominator = (ux * ux + uy * uy + c1) * (vx + vy + c2);
                sum += numerator / denominator;
                count += 1;
            }
        }
        total += sum / count as f64;
    }
    total / channels as f64
}
