//! Saving a finished run: `{dir}/{YYYY-MM-DD_HH-MM-SS}/collage.png` plus
//! `metadata.json` describing the prompt, sources, and provenance.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use montage_core::{CanvasSize, FinalOutput, ProvenanceEntry, SourceItem};
use serde::Serialize;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode collage: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to write metadata: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct RunMetadata<'a> {
    timestamp: String,
    prompt: &'a str,
    canvas_size: [u32; 2],
    sources: Vec<SourceRecord<'a>>,
    fragments: &'a [ProvenanceEntry],
}

#[derive(Debug, Serialize)]
struct SourceRecord<'a> {
    identifier: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<&'a str>,
    preview_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details_url: Option<&'a str>,
}

/// Write the collage and its metadata; returns the run directory.
pub fn save_run(
    output: &FinalOutput,
    sources: &[SourceItem],
    prompt: &str,
    canvas: CanvasSize,
    output_dir: &Path,
) -> Result<PathBuf, SaveError> {
    save_run_at(output, sources, prompt, canvas, output_dir, Local::now())
}

fn save_run_at(
    output: &FinalOutput,
    sources: &[SourceItem],
    prompt: &str,
    canvas: CanvasSize,
    output_dir: &Path,
    timestamp: DateTime<Local>,
) -> Result<PathBuf, SaveError> {
    let run_dir = output_dir.join(timestamp.format("%Y-%m-%d_%H-%M-%S").to_string());
    std::fs::create_dir_all(&run_dir)?;

    output
        .image
        .save_with_format(run_dir.join("collage.png"), image::ImageFormat::Png)?;

    let metadata = RunMetadata {
        timestamp: timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
        prompt,
        canvas_size: [canvas.width(), canvas.height()],
        sources: sources
            .iter()
            .map(|s| SourceRecord {
                identifier: &s.id,
                title: &s.title,
                year: s.year.as_deref(),
                preview_url: &s.preview_url,
                details_url: s.details_url.as_deref(),
            })
            .collect(),
        fragments: &output.provenance,
    };

    let mut json = serde_json::to_string_pretty(&metadata)?;
    json.push('\n');
    std::fs::write(run_dir.join("metadata.json"), json)?;

    info!(dir = %run_dir.display(), "Run saved");
    Ok(run_dir)
}
