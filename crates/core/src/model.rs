//! Domain value objects that flow between pipeline stages.
//!
//! Discovery produces [`SourceCandidate`]s → curation and caching turn them
//! into [`SourceItem`]s → analysis extracts [`Fragment`]s → composition
//! returns a [`FinalOutput`] whose provenance links every placed fragment
//! back to its source.

use std::fmt;
use std::path::PathBuf;

use image::{RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

/// One search issued against the discovery backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Keywords, optionally in Lucene boolean syntax
    pub keywords: String,

    /// Restrict to a backend collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Date range such as `1900 TO 1950`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_filter: Option<String>,
}

impl SearchQuery {
    pub fn keywords(keywords: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            collection: None,
            date_filter: None,
        }
    }
}

/// The ordered set of searches a discovery agent wants executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub queries: Vec<SearchQuery>,
}

impl QueryPlan {
    pub fn new(queries: Vec<SearchQuery>) -> Self {
        Self { queries }
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// A raw discovery hit, before curation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    /// External identifier, unique within the backend
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    /// Low-resolution preview asset
    pub preview_url: String,
    /// Human-facing page for the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
}

/// A curated source. `local_path` is filled in by the caching stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    pub preview_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl From<SourceCandidate> for SourceItem {
    fn from(c: SourceCandidate) -> Self {
        Self {
            id: c.id,
            title: c.title,
            description: c.description,
            year: c.year,
            creator: c.creator,
            preview_url: c.preview_url,
            details_url: c.details_url,
            local_path: None,
        }
    }
}

/// Pixel region in source-image coordinates, `[x1, x2) × [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Region {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The region covering a whole `width × height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }
}

/// An extracted visual element with its own alpha mask.
#[derive(Clone, PartialEq)]
pub struct Fragment {
    /// Unique within one run
    pub id: String,
    /// The `SourceItem::id` this fragment was cut from
    pub source_id: String,
    pub region: Region,
    pub label: String,
    pub description: Option<String>,
    pub image: RgbaImage,
}

impl Fragment {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        region: Region,
        label: impl Into<String>,
        image: RgbaImage,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            region,
            label: label.into(),
            description: None,
            image,
        }
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.id)
            .field("source_id", &self.source_id)
            .field("region", &self.region)
            .field("label", &self.label)
            .field("description", &self.description)
            .field("image", &format_args!("{}x{}", self.image.width(), self.image.height()))
            .finish()
    }
}

/// Where and how a fragment landed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub scale: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Links one element of the final image back to its fragment and source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub fragment_id: String,
    pub source_id: String,
    pub label: String,
    pub description: Option<String>,
    pub region: Region,
    pub placement: Option<Placement>,
}

impl ProvenanceEntry {
    pub fn for_fragment(fragment: &Fragment, placement: Option<Placement>) -> Self {
        Self {
            fragment_id: fragment.id.clone(),
            source_id: fragment.source_id.clone(),
            label: fragment.label.clone(),
            description: fragment.description.clone(),
            region: fragment.region,
            placement,
        }
    }
}

/// The composed collage.
#[derive(Clone, PartialEq)]
pub struct FinalOutput {
    pub image: RgbImage,
    pub width: u32,
    pub height: u32,
    pub provenance: Vec<ProvenanceEntry>,
}

impl FinalOutput {
    /// A plain white canvas with no provenance.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])),
            width,
            height,
            provenance: Vec::new(),
        }
    }
}

impl fmt::Debug for FinalOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalOutput")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_geometry() {
        let r = Region::new(10, 20, 60, 45);
        assert_eq!(r.width(), 50);
        assert_eq!(r.height(), 25);
        assert_eq!(r.area(), 1250);
        assert_eq!(Region::full(4, 3).area(), 12);
    }

    #[test]
    fn source_item_from_candidate_has_no_local_path() {
        let item = SourceItem::from(SourceCandidate {
            id: "botany-1".into(),
            title: "Ferns".into(),
            description: None,
            year: Some("1890".into()),
            creator: None,
            preview_url: "https://example.org/botany-1.jpg".into(),
            details_url: None,
        });
        assert_eq!(item.id, "botany-1");
        assert_eq!(item.year.as_deref(), Some("1890"));
        assert!(item.local_path.is_none());
    }

    #[test]
    fn fragment_debug_omits_pixels() {
        let frag = Fragment::new("a_unknown_0", "a", Region::full(3, 2), "unknown", RgbaImage::new(3, 2));
        let text = format!("{frag:?}");
        assert!(text.contains("3x2"));
        assert!(text.contains("a_unknown_0"));
    }

    #[test]
    fn provenance_copies_fragment_metadata() {
        let mut frag = Fragment::new("f1", "s1", Region::full(5, 5), "bird", RgbaImage::new(5, 5));
        frag.description = Some("a heron".into());
        let entry = ProvenanceEntry::for_fragment(
            &frag,
            Some(Placement { x: 1, y: 2, scale: 1.0, reason: None }),
        );
        assert_eq!(entry.source_id, "s1");
        assert_eq!(entry.description.as_deref(), Some("a heron"));
        assert_eq!(entry.placement.map(|p| (p.x, p.y)), Some((1, 2)));
    }

    #[test]
    fn query_plan_serialization_skips_absent_filters() {
        let plan = QueryPlan::new(vec![SearchQuery::keywords("ferns")]);
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("ferns"));
        assert!(!json.contains("collection"));
    }
}
