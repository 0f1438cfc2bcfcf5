//! Discovery for montage: turning a prompt into candidate source images.
//!
//! - [`planner`]: query planners implementing `DiscoveryAgent`
//! - [`archive`]: the Internet Archive search backend
//! - [`cache`]: the on-disk preview cache implementing `AssetCache`

pub mod archive;
pub mod cache;
pub mod planner;

pub use archive::InternetArchiveBackend;
pub use cache::{AssetFetcher, FileAssetCache, HttpFetcher};
pub use planner::{KeywordQueryPlanner, LlmQueryPlanner};
