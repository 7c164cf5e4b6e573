use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::document::Document;
use crate::output::{OutputOptions, OutputWriter};
use crate::render::{RenderMode, Renderer};
use crate::segment::{BoundaryRules, Entry, segment};

#[derive(Debug, Clone, Default)]
pub struct NewsOptions {
    pub rules: BoundaryRules,
    pub output: OutputOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenEntry {
    pub identifier: String,
    pub sequence_index: usize,
    pub date_display: Option<String>,
    pub date: Option<NaiveDate>,
    pub path: PathBuf,
}

impl WrittenEntry {
    fn from_entry(entry: &Entry<'_>, path: PathBuf) -> Self {
        Self {
            identifier: entry.identifier.clone(),
            sequence_index: entry.sequence_index,
            date_display: entry.date_display.clone(),
            date: entry.date_normalized,
            path,
        }
    }

    /// The date as written in the heading, or `Entry N` when undated.
    pub fn label(&self) -> String {
        match &self.date_display {
            Some(display) => display.clone(),
            None => format!("Entry {}", self.sequence_index),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewsSummary {
    pub total: usize,
    pub with_dates: usize,
    pub without_dates: usize,
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
}

impl NewsSummary {
    fn record(&mut self, date: Option<NaiveDate>) {
        self.total += 1;
        let Some(date) = date else {
            self.without_dates += 1;
            return;
        };
        self.with_dates += 1;
        self.earliest = Some(self.earliest.map_or(date, |current| current.min(date)));
        self.latest = Some(self.latest.map_or(date, |current| current.max(date)));
    }
}

impl fmt::Display for NewsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            return f.write_str("0 entries");
        }
        write!(
            f,
            "{} entries: {} with dates, {} without",
            self.total, self.with_dates, self.without_dates
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewsReport {
    pub mode: RenderMode,
    pub fell_back: bool,
    pub entries: Vec<WrittenEntry>,
    pub summary: NewsSummary,
}

/// Split the listing page at `input` into one file per entry under
/// `output_dir`. Entries are written one at a time in document order;
/// `on_entry` sees each one right after its file lands.
pub fn extract_news(
    input: &Path,
    output_dir: &Path,
    options: &NewsOptions,
    renderer: &Renderer,
    mut on_entry: impl FnMut(&WrittenEntry),
) -> Result<NewsReport> {
    let document = Document::read(input)?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let entries = segment(&document, &options.rules);
    debug!(count = entries.len(), input = %input.display(), "segmented listing");

    let writer = OutputWriter::new(output_dir, options.output.clone());
    let mut written = Vec::with_capacity(entries.len());
    let mut summary = NewsSummary::default();

    for entry in &entries {
        let rendered = renderer.render(&entry.body_span);
        let path = writer.write_entry(entry, &rendered)?;
        debug!(id = %entry.identifier, path = %path.display(), "wrote entry");

        let record = WrittenEntry::from_entry(entry, path);
        summary.record(record.date);
        on_entry(&record);
        written.push(record);
    }

    Ok(NewsReport {
        mode: renderer.mode(),
        fell_back: renderer.fell_back(),
        entries: written,
        summary,
    })
}
