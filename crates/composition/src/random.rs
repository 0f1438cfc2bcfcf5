use image::RgbaImage;
use montage_core::{CanvasSize, CapabilityFailure, Compositor, FinalOutput, Fragment};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::placement::{render, Layout};

/// Default compositor: every fragment at its own size, at a random spot.
#[derive(Debug, Default, Clone)]
pub struct RandomCompositor {
    seed: Option<u64>,
}

impl RandomCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same seed, same inputs, same collage.
    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

/// A generator from `seed`, or from the thread RNG when there is none.
pub(crate) fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

impl Compositor for RandomCompositor {
    fn name(&self) -> &str {
        "random"
    }

    fn compose(
        &self,
        fragments: &[Fragment],
        canvas: CanvasSize,
        background: Option<&RgbaImage>,
    ) -> Result<FinalOutput, CapabilityFailure> {
        let mut rng = rng_for(self.seed);
        let output = render(fragments, canvas, background, &mut rng, |_| Layout::default());
        debug!(placed = output.provenance.len(), canvas = %canvas, "Random composition done");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use montage_core::Region;

    fn fragments() -> Vec<Fragment> {
        (0..3)
            .map(|i| {
                Fragment::new(
                    format!("s{i}_unknown_0"),
                    format!("s{i}"),
                    Region::full(20, 10),
                    "unknown",
                    RgbaImage::from_pixel(20, 10, Rgba([0, 128, 0, 255])),
                )
            })
            .collect()
    }

    #[test]
    fn output_matches_canvas_and_lists_every_fragment() {
        let canvas = CanvasSize::new(320, 200).unwrap();
        let out = RandomCompositor::new().compose(&fragments(), canvas, None).unwrap();
        assert_eq!((out.width, out.height), (320, 200));
        assert_eq!(out.image.dimensions(), (320, 200));
        let ids: Vec<_> = out.provenance.iter().map(|p| p.source_id.as_str()).collect();
        assert_eq!(ids, vec!["s0", "s1", "s2"]);
        for entry in &out.provenance {
            let p = entry.placement.as_ref().unwrap();
            assert!(p.x <= 300 && p.y <= 190);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let canvas = CanvasSize::new(500, 500).unwrap();
        let a = RandomCompositor::seeded(42).compose(&fragments(), canvas, None).unwrap();
        let b = RandomCompositor::seeded(42).compose(&fragments(), canvas, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn no_fragments_gives_blank_canvas() {
        let canvas = CanvasSize::new(8, 8).unwrap();
        let out = RandomCompositor::new().compose(&[], canvas, None).unwrap();
        assert_eq!(out, FinalOutput::blank(8, 8));
    }
}
