//! Fragment extraction and annotation for montage.
//!
//! Analyzers turn cached source previews into [`Fragment`]s; annotators
//! attach text descriptions to them. Decoding and segmentation are CPU
//! bound and run on the blocking thread pool.

pub mod annotator;
pub mod passthrough;
pub mod region;

pub use annotator::{LlmAnnotator, PlaceholderAnnotator};
pub use passthrough::PassthroughAnalyzer;
pub use region::RegionAnalyzer;

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbaImage};
use montage_core::{CapabilityFailure, Fragment, SourceItem};
use tracing::warn;

/// Decode a cached preview. The cache stores files without extensions,
/// so the format is sniffed from the content.
pub fn load_rgba(path: &Path) -> Result<RgbaImage, CapabilityFailure> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image.to_rgba8())
}

/// `(source id, cached path)` for every source that has a cached preview.
pub(crate) fn cached_sources(sources: &[SourceItem]) -> Vec<(String, PathBuf)> {
    sources
        .iter()
        .filter_map(|s| match &s.local_path {
            Some(path) => Some((s.id.clone(), path.clone())),
            None => {
                warn!(source = %s.id, "No cached preview, skipping");
                None
            }
        })
        .collect()
}

/// Run `extract` over each cached source on the blocking pool.
///
/// Previews that fail to decode are logged and skipped.
pub(crate) async fn extract_blocking<F>(sources: &[SourceItem], extract: F) -> Result<Vec<Fragment>, CapabilityFailure>
where
    F: Fn(&str, RgbaImage) -> Vec<Fragment> + Send + 'static,
{
    let work = cached_sources(sources);

    tokio::task::spawn_blocking(move || {
        let mut fragments = Vec::new();
        for (id, path) in work {
            match load_rgba(&path) {
                Ok(image) => fragments.extend(extract(&id, image)),
                Err(e) => warn!(source = %id, path = %path.display(), error = %e, "Cannot decode preview"),
            }
        }
        fragments
    })
    .await
    .map_err(|e| CapabilityFailure::Backend(format!("analysis task failed: {e}")))
}
