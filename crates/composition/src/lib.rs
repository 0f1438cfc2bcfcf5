//! Composition for montage: the default compositor, the bundled hooks, and
//! saving finished runs to disk.

pub mod hooks;
pub mod persist;
pub mod placement;
pub mod random;

pub use hooks::{AgenticCompositor, BackgroundSelector, PaletteGrader, PaletteMode};
pub use persist::{save_run, SaveError};
pub use placement::{render, Layout};
pub use random::RandomCompositor;
