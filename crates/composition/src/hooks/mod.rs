//! Hooks bundled with montage.
//!
//! | hook | point | needs an LLM |
//! |---|---|---|
//! | [`BackgroundSelector`] | `after_curation` | yes |
//! | [`PaletteGrader`] | `pre_composition` | no |
//! | [`AgenticCompositor`] | `composition_strategy` | yes |

pub mod agentic;
pub mod background;
pub mod palette;

pub use agentic::AgenticCompositor;
pub use background::BackgroundSelector;
pub use palette::{PaletteGrader, PaletteMode};
