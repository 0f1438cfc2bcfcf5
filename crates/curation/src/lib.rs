//! Selection capabilities for montage.
//!
//! The same `Selector` contract curates both sources and fragments.

pub mod first;
pub mod llm;

pub use first::FirstSelector;
pub use llm::LlmSelector;
