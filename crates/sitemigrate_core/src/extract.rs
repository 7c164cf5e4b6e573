use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, warn};

use crate::analyze::{SiteLayout, read_page_list};
use crate::checksum::sha256_hex;
use crate::output::{DEFAULT_EXTENSION, FrontmatterFormat, fenced_frontmatter};
use crate::report::{normalize_path, write_json_report};

pub const INDEX_PAGE: &str = "index";
pub const ALL_PAGES: &str = "all";
pub const DEFAULT_EXTRACT_REPORT_PATH: &str = "extraction_report.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageChecksums {
    pub content: String,
    pub title: String,
    pub js: String,
}

/// A page's body, title and script includes, read verbatim from the
/// source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSource {
    pub name: String,
    pub title: String,
    pub content: String,
    pub js_includes: String,
    pub checksums: PageChecksums,
}

impl PageSource {
    /// `homepage` for the index page, `page` for everything else.
    pub fn page_type(&self) -> &'static str {
        if self.name == INDEX_PAGE {
            "homepage"
        } else {
            "page"
        }
    }
}

/// Read `name` from the source directory. The title and content files are
/// required; the script include file is optional.
pub fn read_page_source(layout: &SiteLayout, name: &str) -> Result<PageSource> {
    let title_path = layout.title_file(name);
    if !title_path.exists() {
        bail!("title file not found: {}", title_path.display());
    }
    let title = fs::read_to_string(&title_path)
        .with_context(|| format!("failed to read {}", title_path.display()))?
        .trim()
        .to_string();

    let content_path = layout.page_file(name);
    if !content_path.exists() {
        bail!("content file not found: {}", content_path.display());
    }
    let content_bytes = fs::read(&content_path)
        .with_context(|| format!("failed to read {}", content_path.display()))?;
    let content_checksum = sha256_hex(&content_bytes);
    let content = String::from_utf8(content_bytes)
        .with_context(|| format!("{} is not valid UTF-8", content_path.display()))?;

    let js_path = layout.js_file(name);
    let js_includes = if js_path.exists() {
        fs::read_to_string(&js_path)
            .with_context(|| format!("failed to read {}", js_path.display()))?
            .trim()
            .to_string()
    } else {
        String::new()
    };

    Ok(PageSource {
        name: name.to_string(),
        checksums: PageChecksums {
            content: content_checksum,
            title: sha256_hex(title.as_bytes()),
            js: sha256_hex(js_includes.as_bytes()),
        },
        title,
        content,
        js_includes,
    })
}

#[derive(Debug, Serialize)]
struct PageFrontmatter<'a> {
    title: &'a str,
    slug: &'a str,
    #[serde(rename = "type")]
    page_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    js_includes: Option<&'a str>,
    checksums: &'a PageChecksums,
}

/// Writes one content file per page. The body is copied byte for byte.
#[derive(Debug, Clone)]
pub struct PageWriter {
    output_dir: PathBuf,
    format: FrontmatterFormat,
    extension: String,
}

impl PageWriter {
    pub fn new(output_dir: &Path, format: FrontmatterFormat) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            format,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The index page becomes the section's `_index` file.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let stem = if name == INDEX_PAGE { "_index" } else { name };
        self.output_dir.join(format!("{stem}.{}", self.extension))
    }

    pub fn compose_header(&self, page: &PageSource) -> Result<String> {
        let frontmatter = PageFrontmatter {
            title: &page.title,
            slug: &page.name,
            page_type: page.page_type(),
            js_includes: (!page.js_includes.is_empty()).then_some(page.js_includes.as_str()),
            checksums: &page.checksums,
        };
        fenced_frontmatter(self.format, &frontmatter)
    }

    pub fn write_page(&self, page: &PageSource) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        let header = self.compose_header(page)?;
        let path = self.path_for(&page.name);
        fs::write(&path, format!("{header}\n{}", page.content))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractStatus {
    Success,
    Error,
}

impl ExtractStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageExtraction {
    pub page: String,
    pub status: ExtractStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksums: Option<PageChecksums>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionScope {
    pub pages_requested: usize,
    pub pages_successful: usize,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub extraction: ExtractionScope,
    pub results: Vec<PageExtraction>,
}

impl ExtractionReport {
    pub fn passed(&self) -> bool {
        self.extraction.pages_successful == self.extraction.pages_requested
    }
}

/// Resolve a page request against the Makefile page list. `None` and `all`
/// select every page.
pub fn select_pages(available: &[String], requested: Option<&str>) -> Result<Vec<String>> {
    match requested {
        None | Some(ALL_PAGES) => Ok(available.to_vec()),
        Some(page) if available.iter().any(|name| name == page) => Ok(vec![page.to_string()]),
        Some(page) => bail!(
            "page `{page}` is not listed in Makefile SRCS (available: {})",
            available.join(", ")
        ),
    }
}

/// Extract the requested pages into `writer`'s directory. A page that fails
/// is recorded in the report and does not stop the others.
pub fn extract_pages(
    layout: &SiteLayout,
    requested: Option<&str>,
    writer: &PageWriter,
    mut on_page: impl FnMut(&PageExtraction),
) -> Result<ExtractionReport> {
    let available = read_page_list(layout)?;
    let pages = select_pages(&available, requested)?;

    let mut results = Vec::with_capacity(pages.len());
    for page in &pages {
        let result = match extract_one(layout, page, writer) {
            Ok((source, path)) => {
                debug!(page = %page, path = %path.display(), "extracted page");
                PageExtraction {
                    page: page.clone(),
                    status: ExtractStatus::Success,
                    output: Some(normalize_path(&path)),
                    checksums: Some(source.checksums),
                    error: None,
                }
            }
            Err(error) => {
                warn!(page = %page, "{error:#}");
                PageExtraction {
                    page: page.clone(),
                    status: ExtractStatus::Error,
                    output: None,
                    checksums: None,
                    error: Some(format!("{error:#}")),
                }
            }
        };
        on_page(&result);
        results.push(result);
    }

    let pages_successful = results
        .iter()
        .filter(|result| result.status == ExtractStatus::Success)
        .count();
    Ok(ExtractionReport {
        extraction: ExtractionScope {
            pages_requested: pages.len(),
            pages_successful,
            output_dir: normalize_path(writer.output_dir()),
        },
        results,
    })
}

pub fn write_extraction_report(report: &ExtractionReport, path: &Path) -> Result<PathBuf> {
    write_json_report(report, path)
}

fn extract_one(
    layout: &SiteLayout,
    page: &str,
    writer: &PageWriter,
) -> Result<(PageSource, PathBuf)> {
    let source = read_page_source(layout, page)?;
    let path = writer.write_page(&source)?;
    Ok((source, path))
}
