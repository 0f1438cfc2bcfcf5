//! Colour grading applied uniformly to every fragment and the background.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use image::RgbaImage;
use montage_core::{CapabilityFailure, PipelineHook, RunState};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteMode {
    /// Desaturated and washed toward white
    Pastel,
    /// Boosted saturation and contrast
    Vivid,
    /// Sepia-toned greyscale
    Vintage,
    /// Low contrast under a light grey wash
    Faded,
}

impl PaletteMode {
    pub const ALL: [PaletteMode; 4] = [
        PaletteMode::Pastel,
        PaletteMode::Vivid,
        PaletteMode::Vintage,
        PaletteMode::Faded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaletteMode::Pastel => "pastel",
            PaletteMode::Vivid => "vivid",
            PaletteMode::Vintage => "vintage",
            PaletteMode::Faded => "faded",
        }
    }
}

impl fmt::Display for PaletteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaletteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown palette mode '{s}' (expected pastel, vivid, vintage, or faded)"))
    }
}

fn luma(rgb: [f32; 3]) -> f32 {
    0.299 * rgb[0] + 0.587 * rgb[1] + 0.114 * rgb[2]
}

fn lerp(from: [f32; 3], to: [f32; 3], t: f32) -> [f32; 3] {
    [0, 1, 2].map(|c| from[c] + (to[c] - from[c]) * t)
}

/// Scale saturation: 0 is greyscale, 1 is unchanged.
fn saturate(rgb: [f32; 3], factor: f32) -> [f32; 3] {
    let grey = luma(rgb);
    lerp([grey; 3], rgb, factor)
}

/// Scale contrast around `pivot`.
fn contrast(rgb: [f32; 3], pivot: f32, factor: f32) -> [f32; 3] {
    lerp([pivot; 3], rgb, factor)
}

/// Mean luminance of the visible pixels; the contrast pivot.
fn mean_luma(image: &RgbaImage) -> f32 {
    let (sum, n) = image
        .pixels()
        .filter(|p| p[3] > 0)
        .fold((0f64, 0u64), |(sum, n), p| {
            (sum + f64::from(luma([p[0], p[1], p[2]].map(f32::from))), n + 1)
        });
    if n == 0 { 128.0 } else { (sum / n as f64) as f32 }
}

/// Grade `image` in place. Alpha is untouched.
pub fn apply_palette(image: &mut RgbaImage, mode: PaletteMode) {
    let pivot = match mode {
        PaletteMode::Vivid | PaletteMode::Faded => mean_luma(image),
        _ => 0.0,
    };

    for pixel in image.pixels_mut() {
        let rgb = [pixel[0], pixel[1], pixel[2]].map(f32::from);
        let graded = match mode {
            PaletteMode::Pastel => lerp(saturate(rgb, 0.5), [255.0; 3], 0.3),
            PaletteMode::Vivid => contrast(saturate(rgb, 1.8), pivot, 1.3),
            PaletteMode::Vintage => {
                let grey = luma(rgb);
                [grey * 1.08, grey * 0.85, grey * 0.66]
            }
            PaletteMode::Faded => lerp(contrast(rgb, pivot, 0.7), [200.0; 3], 0.2),
        };
        for c in 0..3 {
            pixel[c] = graded[c].round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Additive hook grading every fragment and the background the same way.
pub struct PaletteGrader {
    mode: PaletteMode,
    name: String,
}

impl PaletteGrader {
    pub fn new(mode: PaletteMode) -> Self {
        Self {
            mode,
            name: format!("palette_{mode}"),
        }
    }

    pub fn mode(&self) -> PaletteMode {
        self.mode
    }
}

#[async_trait]
impl PipelineHook for PaletteGrader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut RunState) -> Result<(), CapabilityFailure> {
        if let Some(background) = state.background_image.as_mut() {
            apply_palette(background, self.mode);
        }
        for fragment in &mut state.fragments {
            apply_palette(&mut fragment.image, self.mode);
        }
        debug!(mode = %self.mode, fragments = state.fragments.len(), "Palette applied");
        Ok(())
    }
}
