//! Region analyzer: separates foreground shapes from a flat background.
//!
//! 1. The background colour is estimated as the mean of the border pixels.
//! 2. A pixel is foreground when it is not transparent and its RGB distance
//!    from the background exceeds the tolerance.
//! 3. Foreground pixels are grouped by breadth-first region growing over
//!    8-connected neighbours.
//! 4. Regions smaller than `min_region_area` pixels are dropped; each
//!    remaining region becomes an RGBA crop of its bounding box whose alpha
//!    is zero outside the region.
//!
//! Scanned plates and illustrations on paper are the common case in archive
//! material, which is what this is tuned for.

use std::collections::VecDeque;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use montage_core::{Analyzer, CapabilityFailure, Fragment, Region, SourceItem};
use tracing::debug;

use crate::extract_blocking;
use crate::passthrough::UNKNOWN_LABEL;

#[derive(Debug, Clone)]
pub struct RegionAnalyzer {
    min_region_area: u64,
    background_tolerance: f32,
}

impl RegionAnalyzer {
    pub fn new(min_region_area: u64, background_tolerance: f32) -> Self {
        Self {
            min_region_area,
            background_tolerance,
        }
    }
}

impl Default for RegionAnalyzer {
    fn default() -> Self {
        Self::new(500, 48.0)
    }
}

fn border_colour(image: &RgbaImage) -> [f32; 3] {
    let (w, h) = image.dimensions();
    let mut sum = [0f64; 3];
    let mut count = 0u64;

    let mut add = |x: u32, y: u32| {
        let p = image.get_pixel(x, y);
        for c in 0..3 {
            sum[c] += f64::from(p[c]);
        }
        count += 1;
    };

    for x in 0..w {
        add(x, 0);
        if h > 1 {
            add(x, h - 1);
        }
    }
    for y in 1..h.saturating_sub(1) {
        add(0, y);
        if w > 1 {
            add(w - 1, y);
        }
    }

    if count == 0 {
        return [255.0; 3];
    }
    sum.map(|s| (s / count as f64) as f32)
}

fn colour_distance(p: &Rgba<u8>, bg: &[f32; 3]) -> f32 {
    (0..3)
        .map(|c| {
            let d = f32::from(p[c]) - bg[c];
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Segment one image into foreground-region fragments.
pub fn segment(source_id: &str, image: &RgbaImage, min_region_area: u64, tolerance: f32) -> Vec<Fragment> {
    let (w, h) = image.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    if wu == 0 || hu == 0 {
        return Vec::new();
    }

    let bg = border_colour(image);
    let foreground: Vec<bool> = image
        .pixels()
        .map(|p| p[3] > 0 && colour_distance(p, &bg) > tolerance)
        .collect();

    let mut visited = vec![false; wu * hu];
    let mut fragments = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..wu * hu {
        if visited[start] || !foreground[start] {
            continue;
        }

        // Grow the region from this seed.
        let mut members = Vec::new();
        let (mut x1, mut y1, mut x2, mut y2) = (usize::MAX, usize::MAX, 0usize, 0usize);
        visited[start] = true;
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            let (x, y) = (idx % wu, idx / wu);
            members.push(idx);
            x1 = x1.min(x);
            y1 = y1.min(y);
            x2 = x2.max(x);
            y2 = y2.max(y);

            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= wu as i64 || ny >= hu as i64 {
                        continue;
                    }
                    let n = ny as usize * wu + nx as usize;
                    if !visited[n] && foreground[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }

        if (members.len() as u64) < min_region_area {
            continue;
        }

        let region = Region::new(x1 as u32, y1 as u32, x2 as u32 + 1, y2 as u32 + 1);
        let mut crop = RgbaImage::new(region.width(), region.height());
        for idx in members {
            let (x, y) = ((idx % wu) as u32, (idx / wu) as u32);
            crop.put_pixel(x - region.x1, y - region.y1, *image.get_pixel(x, y));
        }

        let id = format!("{source_id}_region_{}", fragments.len());
        fragments.push(Fragment::new(id, source_id, region, UNKNOWN_LABEL, crop));
    }

    fragments
}

#[async_trait]
impl Analyzer for RegionAnalyzer {
    fn name(&self) -> &str {
        "region"
    }

    async fn analyze(&self, sources: &[SourceItem]) -> Result<Vec<Fragment>, CapabilityFailure> {
        let min_area = self.min_region_area;
        let tolerance = self.background_tolerance;

        let fragments = extract_blocking(sources, move |source_id, image| {
            let found = segment(source_id, &image, min_area, tolerance);
            debug!(source = source_id, regions = found.len(), "Segmented preview");
            found
        })
        .await?;

        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{solid, source, write_preview};

    /// White 60x60 page with two 10x10 black squares and a 2x2 speck.
    fn page() -> RgbaImage {
        let mut img = solid(60, 60, [255, 255, 255, 255]);
        for (ox, oy, size) in [(5, 5, 10), (40, 38, 10), (30, 5, 2)] {
            for y in oy..oy + size {
                for x in ox..ox + size {
                    img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
                }
            }
        }
        img
    }

    #[test]
    fn border_colour_is_mean_of_edges() {
        let bg = border_colour(&page());
        assert!(bg.iter().all(|c| (*c - 255.0).abs() < 0.01));
    }

    #[test]
    fn finds_regions_above_threshold() {
        let fragments = segment("plate", &page(), 50, 48.0);
        assert_eq!(fragments.len(), 2);

        assert_eq!(fragments[0].id, "plate_region_0");
        assert_eq!(fragments[0].region, Region::new(5, 5, 15, 15));
        assert_eq!(fragments[1].id, "plate_region_1");
        assert_eq!(fragments[1].region, Region::new(40, 38, 50, 48));
        assert_eq!(fragments[1].image.dimensions(), (10, 10));
        assert!(fragments.iter().all(|f| f.source_id == "plate"));
    }

    #[test]
    fn crop_alpha_is_zero_outside_region() {
        let mut img = solid(20, 20, [255, 255, 255, 255]);
        // An L shape: its bounding box contains background.
        for i in 2..12 {
            img.put_pixel(2, i, Rgba([200, 0, 0, 255]));
            img.put_pixel(i, 11, Rgba([200, 0, 0, 255]));
        }
        let fragments = segment("l", &img, 5, 48.0);
        assert_eq!(fragments.len(), 1);

        let crop = &fragments[0].image;
        assert_eq!(crop.dimensions(), (10, 10));
        assert_eq!(crop.get_pixel(0, 0)[3], 255);
        assert_eq!(crop.get_pixel(5, 2)[3], 0);
    }

    #[test]
    fn uniform_image_has_no_regions() {
        let fragments = segment("blank", &solid(16, 16, [12, 34, 56, 255]), 1, 10.0);
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn analyzes_cached_previews() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_preview(dir.path(), "plate", &page());
        let analyzer = RegionAnalyzer::new(50, 48.0);

        let fragments = analyzer.analyze(&[source("plate", Some(path))]).await.unwrap();
        assert_eq!(fragments.len(), 2);
    }
}
