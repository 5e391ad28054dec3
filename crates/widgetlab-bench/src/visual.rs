//! Screenshot comparison.
//!
//! Pixels are compared with the YIQ colour-delta metric used by pixelmatch, with
//! translucent pixels blended over white. Images of different sizes are padded with
//! transparent pixels to the larger canvas; nothing is scaled.

use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageFormat, Rgba, RgbaImage};

use crate::rules::{EvalRule, RuleResult};

/// Per-pixel colour distance threshold, 0..=1.
pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Largest possible YIQ delta between two colours.
const MAX_YIQ_DELTA: f64 = 35215.0;

const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const UNCHANGED_ALPHA: f64 = 0.1;

/// Result of comparing two images.
#[derive(Debug, Clone)]
pub struct PixelDiff {
    pub width: u32,
    pub height: u32,
    pub diff_pixels: u64,
    pub diff_image: RgbaImage,
}

impl PixelDiff {
    pub fn total_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Share of differing pixels in percent. Zero for empty images.
    pub fn percent(&self) -> f64 {
        let total = self.total_pixels();
        if total == 0 {
            0.0
        } else {
            self.diff_pixels as f64 / total as f64 * 100.0
        }
    }
}

fn blend(channel: f64, alpha: f64) -> f64 {
    255.0 + (channel - 255.0) * alpha
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

fn blended(px: &Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, a] = px.0;
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    if a < 255 {
        let alpha = f64::from(a) / 255.0;
        (blend(r, alpha), blend(g, alpha), blend(b, alpha))
    } else {
        (r, g, b)
    }
}

/// Squared YIQ distance between two pixels.
pub fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    if a == b {
        return 0.0;
    }
    let (r1, g1, b1) = blended(a);
    let (r2, g2, b2) = blended(b);
    let y = rgb2y(r1, g1, b1) - rgb2y(r2, g2, b2);
    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q
}

fn faded(px: &Rgba<u8>) -> Rgba<u8> {
    let [r, g, b, a] = px.0;
    let luma = rgb2y(f64::from(r), f64::from(g), f64::from(b));
    let value = blend(luma, UNCHANGED_ALPHA * f64::from(a) / 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([value, value, value, 255])
}

/// Copy `image` onto a transparent canvas of `width` × `height`.
pub fn pad_to(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    let mut canvas = RgbaImage::new(width, height);
    let copy_w = image.width().min(width);
    let copy_h = image.height().min(height);
    for y in 0..copy_h {
        for x in 0..copy_w {
            canvas.put_pixel(x, y, *image.get_pixel(x, y));
        }
    }
    canvas
}

/// Compare two images, padding both to the larger dimensions first.
pub fn compare_images(expected: &RgbaImage, actual: &RgbaImage, threshold: f64) -> PixelDiff {
    let width = expected.width().max(actual.width());
    let height = expected.height().max(actual.height());
    let expected = pad_to(expected, width, height);
    let actual = pad_to(actual, width, height);
    let max_delta = MAX_YIQ_DELTA * threshold * threshold;

    let mut diff_image = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;
    for (x, y, want) in expected.enumerate_pixels() {
        let got = actual.get_pixel(x, y);
        if color_delta(want, got) > max_delta {
            diff_pixels += 1;
            diff_image.put_pixel(x, y, DIFF_COLOR);
        } else {
            diff_image.put_pixel(x, y, faded(want));
        }
    }

    PixelDiff {
        width,
        height,
        diff_pixels,
        diff_image,
    }
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .context("decode png")?
        .to_rgba8())
}

pub async fn write_png(path: &Path, image: &RgbaImage) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .context("encode png")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("write {}", path.display()))
}

/// Evaluate a `screenshot` rule and write the diff image to `diff_path`.
pub async fn eval_screenshot(
    rule: &EvalRule,
    max_pixel_diff_percent: f64,
    gt_path: &Path,
    submission_path: &Path,
    diff_path: &Path,
) -> Result<RuleResult> {
    let Ok(gt_bytes) = tokio::fs::read(gt_path).await else {
        return Ok(RuleResult::new(
            rule,
            false,
            format!(
                "Screenshot comparison failed: ground truth screenshot not found at {}",
                gt_path.display()
            ),
        ));
    };
    let Ok(submission_bytes) = tokio::fs::read(submission_path).await else {
        return Ok(RuleResult::new(
            rule,
            false,
            format!(
                "Screenshot comparison failed: submission screenshot not found at {}",
                submission_path.display()
            ),
        ));
    };

    let decoded = decode_png(&gt_bytes)
        .with_context(|| format!("ground truth screenshot {}", gt_path.display()))
        .and_then(|gt| {
            decode_png(&submission_bytes)
                .with_context(|| format!("submission screenshot {}", submission_path.display()))
                .map(|submission| (gt, submission))
        });
    let (gt, submission) = match decoded {
        Ok(images) => images,
        Err(err) => {
            return Ok(RuleResult::new(
                rule,
                false,
                format!("Screenshot comparison failed: {err:#}"),
            ))
        }
    };

    let diff = compare_images(&gt, &submission, DEFAULT_THRESHOLD);
    write_png(diff_path, &diff.diff_image).await?;

    let percent = diff.percent();
    let pass = percent <= max_pixel_diff_percent;
    let message = if pass {
        format!(
            "Screenshot diff: {percent:.2}% pixels differ (threshold: {max_pixel_diff_percent}%)"
        )
    } else {
        format!(
            "Screenshot diff too high: {percent:.2}% pixels differ (threshold: {max_pixel_diff_percent}%)"
        )
    };
    Ok(RuleResult::new(rule, pass, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn test_identical_images_have_no_diff() {
        let a = solid(8, 8, [10, 200, 30, 255]);
        let diff = compare_images(&a, &a.clone(), DEFAULT_THRESHOLD);
        assert_eq!(diff.diff_pixels, 0);
        assert_eq!(diff.percent(), 0.0);
    }

    #[test]
    fn test_inverted_images_fully_differ() {
        let white = solid(4, 4, [255, 255, 255, 255]);
        let black = solid(4, 4, [0, 0, 0, 255]);
        let diff = compare_images(&white, &black, DEFAULT_THRESHOLD);
        assert_eq!(diff.diff_pixels, 16);
        assert_eq!(diff.percent(), 100.0);
        assert_eq!(*diff.diff_image.get_pixel(0, 0), DIFF_COLOR);
    }

    #[test]
    fn test_small_colour_shift_is_within_threshold() {
        let a = solid(4, 4, [100, 100, 100, 255]);
        let b = solid(4, 4, [102, 101, 100, 255]);
        assert_eq!(compare_images(&a, &b, DEFAULT_THRESHOLD).diff_pixels, 0);
    }

    #[test]
    fn test_padding_is_transparent() {
        let small = solid(2, 2, [0, 0, 0, 255]);
        let padded = pad_to(&small, 4, 3);
        assert_eq!(padded.dimensions(), (4, 3));
        assert_eq!(*padded.get_pixel(1, 1), Rgba([0, 0, 0, 255]));
        assert_eq!(*padded.get_pixel(3, 2), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_size_mismatch_counts_padded_area() {
        // Padding blends to white, so it only differs where the other image is dark.
        let white_small = solid(10, 10, [255, 255, 255, 255]);
        let mut tall = solid(10, 20, [255, 255, 255, 255]);
        for y in 10..20 {
            for x in 0..10 {
                tall.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let diff = compare_images(&white_small, &tall, DEFAULT_THRESHOLD);
        assert_eq!((diff.width, diff.height), (10, 20));
        assert_eq!(diff.diff_pixels, 100);
        assert_eq!(diff.percent(), 50.0);
    }

    #[test]
    fn test_padding_against_white_is_not_a_difference() {
        let small = solid(10, 10, [255, 255, 255, 255]);
        let tall = solid(10, 20, [255, 255, 255, 255]);
        let diff = compare_images(&small, &tall, DEFAULT_THRESHOLD);
        assert_eq!((diff.width, diff.height), (10, 20));
        assert_eq!(diff.diff_pixels, 0);
    }

    #[test]
    fn test_transparent_matches_white() {
        let clear = solid(3, 3, [0, 0, 0, 0]);
        let white = solid(3, 3, [255, 255, 255, 255]);
        assert_eq!(compare_images(&clear, &white, DEFAULT_THRESHOLD).diff_pixels, 0);
    }

    fn rule(max: f64) -> EvalRule {
        EvalRule::Screenshot {
            max_pixel_diff_percent: max,
            viewport_width: None,
            viewport_height: None,
        }
    }

    #[tokio::test]
    async fn test_eval_screenshot_missing_submission() {
        let dir = tempfile::tempdir().unwrap();
        let gt = dir.path().join("target.png");
        write_png(&gt, &solid(2, 2, [0, 0, 0, 255])).await.unwrap();
        let missing = dir.path().join("widget.png");
        let result = eval_screenshot(&rule(5.0), 5.0, &gt, &missing, &dir.path().join("diff.png"))
            .await
            .unwrap();
        assert!(!result.pass);
        assert_eq!(
            result.message,
            format!(
                "Screenshot comparison failed: submission screenshot not found at {}",
                missing.display()
            )
        );
    }

    #[tokio::test]
    async fn test_eval_screenshot_writes_diff() {
        let dir = tempfile::tempdir().unwrap();
        let gt = dir.path().join("gt/target.png");
        let sub = dir.path().join("sub/widget.png");
        write_png(&gt, &solid(4, 4, [255, 255, 255, 255])).await.unwrap();
        let mut image = solid(4, 4, [255, 255, 255, 255]);
        image.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        write_png(&sub, &image).await.unwrap();

        let diff_path = dir.path().join("results/case/model/diff.png");
        let result = eval_screenshot(&rule(5.0), 5.0, &gt, &sub, &diff_path).await.unwrap();
        assert!(!result.pass);
        assert_eq!(
            result.message,
            "Screenshot diff too high: 6.25% pixels differ (threshold: 5%)"
        );
        assert!(diff_path.exists());

        let result = eval_screenshot(&rule(10.0), 10.0, &gt, &sub, &diff_path).await.unwrap();
        assert!(result.pass);
        assert_eq!(result.message, "Screenshot diff: 6.25% pixels differ (threshold: 10%)");
    }

    #[tokio::test]
    async fn test_eval_screenshot_corrupt_png_fails_rule() {
        let dir = tempfile::tempdir().unwrap();
        let gt = dir.path().join("target.png");
        let sub = dir.path().join("widget.png");
        tokio::fs::write(&gt, b"not a png").await.unwrap();
        write_png(&sub, &solid(1, 1, [0, 0, 0, 255])).await.unwrap();
        let result = eval_screenshot(&rule(5.0), 5.0, &gt, &sub, &dir.path().join("diff.png"))
            .await
            .unwrap();
        assert!(!result.pass);
        assert!(result
            .message
            .starts_with("Screenshot comparison failed: ground truth screenshot"));
    }
}
