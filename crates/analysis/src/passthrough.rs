use async_trait::async_trait;
use montage_core::{Analyzer, CapabilityFailure, Fragment, Region, SourceItem};
use tracing::debug;

use crate::extract_blocking;

/// Label given to fragments nothing has classified.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Wraps each cached preview as a single full-frame fragment.
#[derive(Debug, Default, Clone)]
pub struct PassthroughAnalyzer;

#[async_trait]
impl Analyzer for PassthroughAnalyzer {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn analyze(&self, sources: &[SourceItem]) -> Result<Vec<Fragment>, CapabilityFailure> {
        let fragments = extract_blocking(sources, |source_id, image| {
            let region = Region::full(image.width(), image.height());
            vec![Fragment::new(
                format!("{source_id}_{UNKNOWN_LABEL}_0"),
                source_id,
                region,
                UNKNOWN_LABEL,
                image,
            )]
        })
        .await?;

        debug!(sources = sources.len(), fragments = fragments.len(), "Passthrough analysis done");
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{solid, source, write_preview};

    #[tokio::test]
    async fn one_full_frame_fragment_per_cached_source() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_preview(dir.path(), "a", &solid(40, 30, [10, 20, 30, 255]));
        let b = write_preview(dir.path(), "b", &solid(8, 8, [0, 0, 0, 255]));
        let sources = vec![source("a", Some(a)), source("missing", None), source("b", Some(b))];

        let fragments = PassthroughAnalyzer.analyze(&sources).await.unwrap();
        assert_eq!(fragments.len(), 2);

        let first = &fragments[0];
        assert_eq!(first.id, "a_unknown_0");
        assert_eq!(first.source_id, "a");
        assert_eq!(first.label, "unknown");
        assert_eq!(first.region, Region::full(40, 30));
        assert_eq!(first.image.dimensions(), (40, 30));
        assert_eq!(fragments[1].id, "b_unknown_0");
    }

    #[tokio::test]
    async fn undecodable_preview_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("junk");
        std::fs::write(&junk, b"not an image").unwrap();

        let fragments = PassthroughAnalyzer
            .analyze(&[source("junk", Some(junk))])
            .await
            .unwrap();
        assert!(fragments.is_empty());
    }
}
