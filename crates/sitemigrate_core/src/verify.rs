use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use similar::TextDiff;
use walkdir::WalkDir;

use crate::checksum::sha256_hex;
use crate::document::Document;
use crate::report::{normalize_path, write_json_report};

const MAX_DIFF_OUTPUT_LINES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompareStatus {
    ExactMatch,
    NormalizedMatch,
    Different,
    Error,
}

impl CompareStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactMatch => "EXACT_MATCH",
            Self::NormalizedMatch => "NORMALIZED_MATCH",
            Self::Different => "DIFFERENT",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageComparison {
    pub page: String,
    pub status: CompareStatus,
    pub original_path: String,
    pub generated_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_identical: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_output: Option<String>,
}

impl PageComparison {
    fn new(page: &str, original: &Path, generated: &Path) -> Self {
        Self {
            page: page.to_string(),
            status: CompareStatus::Error,
            original_path: normalize_path(original),
            generated_path: normalize_path(generated),
            error: None,
            original_sha256: None,
            generated_sha256: None,
            original_size: None,
            generated_size: None,
            normalized_identical: None,
            diff_lines: None,
            diff_output: None,
        }
    }

    fn failed(mut self, message: String) -> Self {
        self.status = CompareStatus::Error;
        self.error = Some(message);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonScope {
    pub original_dir: String,
    pub generated_dir: String,
    pub pages_compared: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub comparison: ComparisonScope,
    pub results: Vec<PageComparison>,
}

impl VerifyReport {
    pub fn count(&self, status: CompareStatus) -> usize {
        self.results
            .iter()
            .filter(|result| result.status == status)
            .count()
    }

    pub fn passed(&self) -> bool {
        self.count(CompareStatus::Different) == 0 && self.count(CompareStatus::Error) == 0
    }
}

/// Compare one original page with its regenerated counterpart. Missing or
/// unreadable files are reported in the result, not returned as errors.
pub fn compare_files(page: &str, original: &Path, generated: &Path) -> PageComparison {
    let result = PageComparison::new(page, original, generated);
    if !original.exists() {
        return result.failed(format!("Original file not found: {}", original.display()));
    }
    if !generated.exists() {
        return result.failed(format!("Generated file not found: {}", generated.display()));
    }
    let original_content = match read_page(original) {
        Ok(content) => content,
        Err(error) => return result.failed(format!("{error:#}")),
    };
    let generated_content = match read_page(generated) {
        Ok(content) => content,
        Err(error) => return result.failed(format!("{error:#}")),
    };
    compare_contents(result, &original_content, &generated_content)
}

fn compare_contents(mut result: PageComparison, original: &str, generated: &str) -> PageComparison {
    let original_sha = sha256_hex(original.as_bytes());
    let generated_sha = sha256_hex(generated.as_bytes());
    let identical = original_sha == generated_sha;
    result.original_size = Some(original.chars().count());
    result.generated_size = Some(generated.chars().count());
    result.original_sha256 = Some(original_sha);
    result.generated_sha256 = Some(generated_sha);

    if identical {
        result.status = CompareStatus::ExactMatch;
        return result;
    }

    let normalized_identical =
        Document::parse(original).to_html() == Document::parse(generated).to_html();
    result.normalized_identical = Some(normalized_identical);
    if normalized_identical {
        result.status = CompareStatus::NormalizedMatch;
        return result;
    }

    let file_name = Path::new(&result.original_path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| result.page.clone());
    let unified = TextDiff::from_lines(original, generated)
        .unified_diff()
        .header(
            &format!("original/{file_name}"),
            &format!("generated/{file_name}"),
        )
        .to_string();
    let lines: Vec<&str> = unified.lines().collect();

    result.status = CompareStatus::Different;
    result.diff_lines = Some(
        lines
            .iter()
            .filter(|line| line.starts_with('+') || line.starts_with('-'))
            .count(),
    );
    result.diff_output = Some(
        lines
            .iter()
            .take(MAX_DIFF_OUTPUT_LINES)
            .copied()
            .collect::<Vec<_>>()
            .join("\n"),
    );
    result
}

/// Page names (file stems) of every `*.html` directly under `dir`, sorted.
pub fn list_pages(dir: &Path) -> Result<Vec<String>> {
    let mut pages = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("html") {
            continue;
        }
        if let Some(stem) = path.file_stem() {
            pages.push(stem.to_string_lossy().to_string());
        }
    }
    pages.sort();
    Ok(pages)
}

/// Compare `page` (or every page of `original_dir`) against `generated_dir`.
pub fn verify_pages(
    original_dir: &Path,
    generated_dir: &Path,
    page: Option<&str>,
    mut on_page: impl FnMut(&PageComparison),
) -> Result<VerifyReport> {
    if !original_dir.exists() {
        bail!("original directory not found: {}", original_dir.display());
    }
    if !generated_dir.exists() {
        bail!("generated directory not found: {}", generated_dir.display());
    }

    let pages = match page {
        Some(page) => vec![page.to_string()],
        None => list_pages(original_dir)?,
    };

    let mut results = Vec::with_capacity(pages.len());
    for page in &pages {
        let file_name = format!("{page}.html");
        let result = compare_files(
            page,
            &original_dir.join(&file_name),
            &generated_dir.join(&file_name),
        );
        on_page(&result);
        results.push(result);
    }

    Ok(VerifyReport {
        comparison: ComparisonScope {
            original_dir: normalize_path(original_dir),
            generated_dir: normalize_path(generated_dir),
            pages_compared: results.len(),
        },
        results,
    })
}

pub fn write_report(report: &VerifyReport, path: &Path) -> Result<PathBuf> {
    write_json_report(report, path)
}

fn read_page(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
