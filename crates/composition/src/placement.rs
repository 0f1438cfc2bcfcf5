//! Placement engine shared by every compositor.
//!
//! The canvas starts white, or as the background stretched to the canvas
//! size. Fragments are alpha-composited in order; a fragment that does not
//! fit is pinned to the top-left corner.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use montage_core::{CanvasSize, FinalOutput, Fragment, Placement, ProvenanceEntry};
use rand::Rng;

pub const MIN_SCALE: f32 = 0.1;
pub const MAX_SCALE: f32 = 4.0;

/// What a compositor wants for one fragment. Missing positions are random.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub scale: f32,
    pub position: Option<(i64, i64)>,
    pub reason: Option<String>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            scale: 1.0,
            position: None,
            reason: None,
        }
    }
}

fn scaled(image: &RgbaImage, scale: f32) -> Option<RgbaImage> {
    if (scale - 1.0).abs() < f32::EPSILON {
        return None;
    }
    let w = ((image.width() as f32 * scale) as u32).max(1);
    let h = ((image.height() as f32 * scale) as u32).max(1);
    Some(imageops::resize(image, w, h, FilterType::Lanczos3))
}

fn base_canvas(canvas: CanvasSize, background: Option<&RgbaImage>) -> RgbaImage {
    let (w, h) = (canvas.width(), canvas.height());
    match background {
        Some(bg) if bg.dimensions() == (w, h) => bg.clone(),
        Some(bg) => imageops::resize(bg, w, h, FilterType::Triangle),
        None => RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])),
    }
}

/// Lay out `fragments` on the canvas and record provenance for each.
pub fn render<R, F>(
    fragments: &[Fragment],
    canvas: CanvasSize,
    background: Option<&RgbaImage>,
    rng: &mut R,
    mut layout: F,
) -> FinalOutput
where
    R: Rng,
    F: FnMut(&Fragment) -> Layout,
{
    let mut board = base_canvas(canvas, background);
    let mut provenance = Vec::with_capacity(fragments.len());

    for fragment in fragments {
        let wanted = layout(fragment);
        let scale = wanted.scale.clamp(MIN_SCALE, MAX_SCALE);
        let resized = scaled(&fragment.image, scale);
        let image = resized.as_ref().unwrap_or(&fragment.image);

        let max_x = canvas.width().saturating_sub(image.width());
        let max_y = canvas.height().saturating_sub(image.height());
        let (x, y) = match wanted.position {
            Some((x, y)) => (
                x.clamp(0, i64::from(max_x)) as u32,
                y.clamp(0, i64::from(max_y)) as u32,
            ),
            None => (rng.random_range(0..=max_x), rng.random_range(0..=max_y)),
        };

        imageops::overlay(&mut board, image, i64::from(x), i64::from(y));

        provenance.push(ProvenanceEntry::for_fragment(
            fragment,
            Some(Placement {
                x,
                y,
                scale,
                reason: wanted.reason,
            }),
        ));
    }

    FinalOutput {
        image: DynamicImage::ImageRgba8(board).to_rgb8(),
        width: canvas.width(),
        height: canvas.height(),
        provenance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use montage_core::Region;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn canvas(w: u32, h: u32) -> CanvasSize {
        CanvasSize::new(w, h).unwrap()
    }

    fn red(id: &str, w: u32, h: u32) -> Fragment {
        Fragment::new(id, "src", Region::full(w, h), "unknown", RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn explicit_position_is_used_and_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let fragments = vec![red("a", 10, 10), red("b", 10, 10)];
        let out = render(&fragments, canvas(100, 50), None, &mut rng, |f| Layout {
            position: Some(if f.id == "a" { (5, 7) } else { (500, -3) }),
            reason: Some("because".into()),
            ..Layout::default()
        });

        let a = out.provenance[0].placement.as_ref().unwrap();
        assert_eq!((a.x, a.y), (5, 7));
        assert_eq!(a.reason.as_deref(), Some("because"));
        let b = out.provenance[1].placement.as_ref().unwrap();
        assert_eq!((b.x, b.y), (90, 0));

        assert_eq!(*out.image.get_pixel(5, 7), Rgb([255, 0, 0]));
        assert_eq!(*out.image.get_pixel(0, 49), Rgb([255, 255, 255]));
    }

    #[test]
    fn oversized_fragment_is_pinned_to_origin() {
        let mut rng = StdRng::seed_from_u64(9);
        let out = render(&[red("big", 300, 300)], canvas(64, 64), None, &mut rng, |_| Layout::default());
        let p = out.provenance[0].placement.as_ref().unwrap();
        assert_eq!((p.x, p.y), (0, 0));
        assert_eq!(out.image.dimensions(), (64, 64));
    }

    #[test]
    fn scale_is_clamped_and_applied() {
        let mut rng = StdRng::seed_from_u64(3);
        let out = render(&[red("s", 10, 10)], canvas(200, 200), None, &mut rng, |_| Layout {
            scale: 9.0,
            position: Some((0, 0)),
            reason: None,
        });
        let p = out.provenance[0].placement.as_ref().unwrap();
        assert!((p.scale - MAX_SCALE).abs() < f32::EPSILON);
        assert_eq!(*out.image.get_pixel(39, 39), Rgb([255, 0, 0]));
        assert_eq!(*out.image.get_pixel(41, 41), Rgb([255, 255, 255]));
    }

    #[test]
    fn transparent_pixels_show_the_background() {
        let mut rng = StdRng::seed_from_u64(5);
        let bg = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]));
        let ghost = Fragment::new("g", "src", Region::full(8, 8), "unknown", RgbaImage::new(8, 8));

        let out = render(&[ghost], canvas(16, 16), Some(&bg), &mut rng, |_| Layout::default());
        assert!(out.image.pixels().all(|p| *p == Rgb([0, 0, 255])));
        assert_eq!(out.provenance.len(), 1);
    }
}
