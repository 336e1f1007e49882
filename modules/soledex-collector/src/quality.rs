//! Image quality gate: size, resolution, sharpness, aspect-ratio and
//! keyword heuristics. Explicitly a heuristic, not a classifier — the
//! keyword lists and thresholds are configuration. Rejections are
//! counted and logged, never retried.

use image::DynamicImage;
use thiserror::Error;

use soledex_common::QualityConfig;

/// Gradient magnitude above which a pixel counts as an edge, for the
/// busy-scene ratio.
const EDGE_THRESHOLD: i32 = 128;

/// Why a candidate was rejected. Stable snake_case codes feed the run
/// stats and logs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("too_small_bytes ({0} bytes)")]
    TooSmallBytes(u64),

    #[error("too_large_bytes ({0} bytes)")]
    TooLargeBytes(u64),

    #[error("undecodable")]
    Undecodable,

    #[error("low_resolution ({width}x{height})")]
    LowResolution { width: u32, height: u32 },

    #[error("blurry (sharpness {0:.1})")]
    Blurry(f64),

    #[error("extreme_aspect ({0:.2})")]
    ExtremeAspect(f64),

    #[error("busy_scene (edge ratio {0:.2})")]
    BusyScene(f64),

    #[error("off_subject ({0})")]
    OffSubject(String),
}

/// Decode-derived measurements of an accepted image.
#[derive(Debug, Clone, Copy)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub sharpness: f64,
}

pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Keyword heuristic over the source URL and alt text. Runs before
    /// the download so denied candidates never cost a fetch. A candidate
    /// is rejected when deny keywords outscore subject keywords.
    pub fn screen(&self, source_url: &str, alt_text: Option<&str>) -> Result<(), Rejection> {
        let haystack = match alt_text {
            Some(alt) => format!("{} {}", source_url.to_lowercase(), alt.to_lowercase()),
            None => source_url.to_lowercase(),
        };

        let subject_score = self
            .config
            .subject_keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .count();
        let deny_hits: Vec<&str> = self
            .config
            .deny_keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .map(|k| k.as_str())
            .collect();

        if !deny_hits.is_empty() && deny_hits.len() > subject_score {
            return Err(Rejection::OffSubject(deny_hits.join(",")));
        }
        Ok(())
    }

    /// Byte-size bounds, both inclusive.
    pub fn check_size(&self, byte_size: u64) -> Result<(), Rejection> {
        if byte_size < self.config.min_bytes {
            return Err(Rejection::TooSmallBytes(byte_size));
        }
        if byte_size > self.config.max_bytes {
            return Err(Rejection::TooLargeBytes(byte_size));
        }
        Ok(())
    }

    /// Decode-based checks: resolution, aspect ratio, sharpness, edge
    /// density.
    pub fn inspect(&self, img: &DynamicImage) -> Result<ImageMeta, Rejection> {
        let width = img.width();
        let height = img.height();

        if width < self.config.min_width || height < self.config.min_height {
            return Err(Rejection::LowResolution { width, height });
        }

        let aspect = width as f64 / height as f64;
        if aspect < self.config.min_aspect || aspect > self.config.max_aspect {
            return Err(Rejection::ExtremeAspect(aspect));
        }

        let luma = img.to_luma8();
        let (sharpness, edge_ratio) = focus_metrics(&luma);

        if sharpness < self.config.sharpness_floor {
            return Err(Rejection::Blurry(sharpness));
        }

        if edge_ratio > self.config.max_edge_ratio {
            return Err(Rejection::BusyScene(edge_ratio));
        }

        Ok(ImageMeta {
            width,
            height,
            sharpness,
        })
    }
}

/// Laplacian variance (sharpness) and the fraction of high-gradient
/// pixels (busy-scene indicator), in one pass over the interior pixels.
fn focus_metrics(luma: &image::GrayImage) -> (f64, f64) {
    let width = luma.width();
    let height = luma.height();
    if width < 3 || height < 3 {
        return (0.0, 0.0);
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut edge_pixels = 0u64;
    let mut count = 0u64;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = luma.get_pixel(x, y)[0] as i32;
            let left = luma.get_pixel(x - 1, y)[0] as i32;
            let right = luma.get_pixel(x + 1, y)[0] as i32;
            let up = luma.get_pixel(x, y - 1)[0] as i32;
            let down = luma.get_pixel(x, y + 1)[0] as i32;

            let lap = (4 * center - left - right - up - down) as f64;
            sum += lap;
            sum_sq += lap * lap;
            count += 1;

            let gradient = (center - right).abs() + (center - down).abs();
            if gradient >= EDGE_THRESHOLD {
                edge_pixels += 1;
            }
        }
    }

    let mean = sum / count as f64;
    let variance = sum_sq / count as f64 - mean * mean;
    let edge_ratio = edge_pixels as f64 / count as f64;
    (variance, edge_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gate() -> QualityGate {
        QualityGate::new(QualityConfig::default())
    }

    fn gate_with(config: QualityConfig) -> QualityGate {
        QualityGate::new(config)
    }

    /// Left half black, right half white: sharp but not busy.
    fn split_image(width: u32, height: u32) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        DynamicImage::ImageLuma8(img)
    }

    fn flat_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([128])))
    }

    /// 1px checkerboard: every pixel is an edge.
    fn noise_image(width: u32, height: u32) -> DynamicImage {
        let img = GrayImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn byte_size_boundaries_are_inclusive() {
        let mut config = QualityConfig::default();
        config.min_bytes = 5000;
        let gate = gate_with(config);

        assert_eq!(gate.check_size(4999), Err(Rejection::TooSmallBytes(4999)));
        assert!(gate.check_size(5000).is_ok());
        assert!(gate.check_size(10 * 1024 * 1024).is_ok());
        assert!(matches!(
            gate.check_size(10 * 1024 * 1024 + 1),
            Err(Rejection::TooLargeBytes(_))
        ));
    }

    #[test]
    fn low_resolution_is_rejected() {
        let result = gate().inspect(&split_image(100, 100));
        assert_eq!(
            result.unwrap_err(),
            Rejection::LowResolution {
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn minimum_resolution_is_accepted_inclusive() {
        let meta = gate().inspect(&split_image(300, 300)).unwrap();
        assert_eq!(meta.width, 300);
        assert_eq!(meta.height, 300);
    }

    #[test]
    fn banner_ratio_is_rejected() {
        let result = gate().inspect(&split_image(1200, 300));
        assert!(matches!(result, Err(Rejection::ExtremeAspect(_))));
    }

    #[test]
    fn flat_placeholder_is_rejected_as_blurry() {
        let result = gate().inspect(&flat_image(400, 400));
        assert!(matches!(result, Err(Rejection::Blurry(_))));
    }

    #[test]
    fn busy_scene_is_rejected() {
        let result = gate().inspect(&noise_image(400, 400));
        assert!(matches!(result, Err(Rejection::BusyScene(_))));
    }

    #[test]
    fn product_photo_passes_inspection() {
        let meta = gate().inspect(&split_image(800, 600)).unwrap();
        assert!(meta.sharpness >= 100.0);
    }

    #[test]
    fn deny_keywords_reject_before_download() {
        let gate = gate();
        let result = gate.screen("https://cdn.example.com/street-lifestyle-shot.jpg", None);
        assert!(matches!(result, Err(Rejection::OffSubject(_))));
    }

    #[test]
    fn subject_keywords_outweigh_a_deny_hit() {
        let gate = gate();
        // "model" is denied but "sneaker" and "nike" vouch for the subject.
        gate.screen("https://cdn.example.com/nike-sneaker-model-3.jpg", None)
            .unwrap();
    }

    #[test]
    fn alt_text_feeds_the_heuristic() {
        let gate = gate();
        let result = gate.screen(
            "https://cdn.example.com/img/883921.jpg",
            Some("man wearing jeans on the street"),
        );
        assert!(matches!(result, Err(Rejection::OffSubject(_))));
        gate.screen("https://cdn.example.com/img/883921.jpg", Some("Air Jordan 1 sole"))
            .unwrap();
    }
}
