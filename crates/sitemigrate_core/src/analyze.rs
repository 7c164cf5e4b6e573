use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use scraper::ElementRef;
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::checksum::sha256_hex;
use crate::document::Document;
use crate::report::{normalize_path, write_json_report};

pub const DEFAULT_MAKEFILE: &str = "Makefile";
pub const DEFAULT_SOURCE_DIR: &str = "src";
pub const DEFAULT_INVENTORY_PATH: &str = "site_inventory.json";

/// Header and footer fragments the Makefile wraps around every page.
pub const TEMPLATE_NAMES: [&str; 9] = [
    "template_head1",
    "template_head2",
    "template_head3",
    "template_head_prod",
    "template_head_dev",
    "template_footer1",
    "template_footer2",
    "template_footer_prod",
    "template_footer_dev",
];

const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Where the legacy build keeps its Makefile and page sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteLayout {
    pub root: PathBuf,
    pub makefile: PathBuf,
    pub source_dir: PathBuf,
}

impl SiteLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            makefile: root.join(DEFAULT_MAKEFILE),
            source_dir: root.join(DEFAULT_SOURCE_DIR),
        }
    }

    pub fn page_file(&self, page: &str) -> PathBuf {
        self.source_dir.join(page)
    }

    pub fn title_file(&self, page: &str) -> PathBuf {
        self.source_dir.join(format!("{page}_title"))
    }

    pub fn js_file(&self, page: &str) -> PathBuf {
        self.source_dir.join(format!("{page}_js"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFacts {
    pub path: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// One source file as found on disk. Missing files serialize as
/// `{"exists": false}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub exists: bool,
    #[serde(flatten)]
    pub facts: Option<FileFacts>,
    /// Trimmed text, kept for the small title and script files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
}

impl SourceFile {
    fn missing() -> Self {
        Self::default()
    }

    fn found(facts: FileFacts) -> Self {
        Self {
            exists: true,
            facts: Some(facts),
            content: None,
            line_count: None,
        }
    }

    fn has_text(&self) -> bool {
        self.content.as_deref().is_some_and(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HtmlMetadata {
    pub root_element: Option<String>,
    pub element_count: usize,
    pub has_images: bool,
    pub has_links: bool,
    pub has_headings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFiles {
    pub content: SourceFile,
    pub title: SourceFile,
    pub js: SourceFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInventory {
    pub name: String,
    pub files: PageFiles,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_metadata: Option<HtmlMetadata>,
}

impl PageInventory {
    pub fn has_content(&self) -> bool {
        self.files.content.exists
    }

    pub fn has_title(&self) -> bool {
        self.files.title.exists
    }

    /// A script include file that exists and is not blank.
    pub fn has_js(&self) -> bool {
        self.files.js.exists && self.files.js.has_text()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MakefileFacts {
    #[serde(flatten)]
    pub facts: FileFacts,
    pub pages: Vec<String>,
    pub page_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySource {
    pub base_dir: String,
    pub src_dir: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub total_pages: usize,
    pub pages_with_content: usize,
    pub pages_with_title: usize,
    pub pages_with_js: usize,
    pub templates_found: usize,
    pub unlisted_sources: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteInventory {
    pub source: InventorySource,
    pub makefile: MakefileFacts,
    pub templates: BTreeMap<String, SourceFile>,
    pub pages: BTreeMap<String, PageInventory>,
    /// Files under the source directory that no page or template claims.
    pub unlisted_sources: Vec<String>,
    pub summary: InventorySummary,
}

/// Page names from the Makefile `SRCS` assignment, following `\` line
/// continuations. A blank line, a comment or an uncontinued line ends it.
pub fn parse_srcs(makefile: &str) -> Vec<String> {
    let mut pages = Vec::new();
    let mut in_srcs = false;
    let mut continued = false;

    for line in makefile.lines() {
        let value = if let Some(rest) = line.strip_prefix("SRCS") {
            in_srcs = true;
            rest.trim_start()
                .trim_start_matches(['+', ':', '?'])
                .trim_start_matches('=')
        } else if in_srcs && continued && !line.trim().is_empty() && !line.starts_with('#') {
            line
        } else if in_srcs {
            break;
        } else {
            continue;
        };

        continued = line.trim_end().ends_with('\\');
        pages.extend(
            value
                .replace('\\', " ")
                .split_whitespace()
                .map(str::to_string),
        );
    }
    pages
}

/// Read the Makefile named by `layout` and return its page list.
pub fn read_page_list(layout: &SiteLayout) -> Result<Vec<String>> {
    if !layout.makefile.exists() {
        bail!("Makefile not found: {}", layout.makefile.display());
    }
    let content = fs::read_to_string(&layout.makefile)
        .with_context(|| format!("failed to read {}", layout.makefile.display()))?;
    Ok(parse_srcs(&content))
}

/// Structural facts about a page body. The parser's synthetic wrapper
/// element is not counted.
pub fn html_metadata(markup: &str) -> HtmlMetadata {
    let document = Document::parse(markup);
    let root_element = document
        .root()
        .children()
        .find_map(ElementRef::wrap)
        .map(|element| element.value().name().to_string());
    let elements: Vec<ElementRef<'_>> = document.elements().skip(1).collect();

    HtmlMetadata {
        root_element,
        element_count: elements.len(),
        has_images: has_any_tag(&elements, &["img"]),
        has_links: has_any_tag(&elements, &["a"]),
        has_headings: has_any_tag(&elements, &HEADING_TAGS),
    }
}

fn has_any_tag(elements: &[ElementRef<'_>], tags: &[&str]) -> bool {
    elements
        .iter()
        .any(|element| tags.contains(&element.value().name()))
}

/// Catalogue the Makefile, templates and every listed page. Read-only.
pub fn analyze_site(
    layout: &SiteLayout,
    mut on_page: impl FnMut(&PageInventory),
) -> Result<SiteInventory> {
    if !layout.makefile.exists() {
        bail!("Makefile not found: {}", layout.makefile.display());
    }
    let (makefile_facts, makefile_bytes) = inspect_file(&layout.makefile)?
        .with_context(|| format!("failed to read {}", layout.makefile.display()))?;
    let makefile_text = String::from_utf8(makefile_bytes)
        .with_context(|| format!("{} is not valid UTF-8", layout.makefile.display()))?;
    let page_names = parse_srcs(&makefile_text);
    debug!(count = page_names.len(), "read Makefile page list");

    let mut summary = InventorySummary {
        total_pages: page_names.len(),
        ..InventorySummary::default()
    };

    let mut templates = BTreeMap::new();
    for name in TEMPLATE_NAMES {
        let template = inspect_template(&layout.source_dir.join(name))?;
        if template.exists {
            summary.templates_found += 1;
        }
        templates.insert(name.to_string(), template);
    }

    let mut pages = BTreeMap::new();
    for name in &page_names {
        let page = inspect_page(layout, name)?;
        summary.pages_with_content += usize::from(page.has_content());
        summary.pages_with_title += usize::from(page.has_title());
        summary.pages_with_js += usize::from(page.has_js());
        on_page(&page);
        pages.insert(name.clone(), page);
    }

    let unlisted_sources = list_unlisted_sources(layout, &page_names)?;
    summary.unlisted_sources = unlisted_sources.len();

    Ok(SiteInventory {
        source: InventorySource {
            base_dir: normalize_path(&layout.root),
            src_dir: normalize_path(&layout.source_dir),
        },
        makefile: MakefileFacts {
            facts: makefile_facts,
            page_count: page_names.len(),
            pages: page_names,
        },
        templates,
        pages,
        unlisted_sources,
        summary,
    })
}

pub fn write_inventory(inventory: &SiteInventory, path: &Path) -> Result<PathBuf> {
    write_json_report(inventory, path)
}

fn inspect_page(layout: &SiteLayout, name: &str) -> Result<PageInventory> {
    let (content, html_metadata) = match inspect_file(&layout.page_file(name))? {
        Some((facts, bytes)) => (
            SourceFile::found(facts),
            Some(html_metadata(&String::from_utf8_lossy(&bytes))),
        ),
        None => (SourceFile::missing(), None),
    };
    Ok(PageInventory {
        name: name.to_string(),
        files: PageFiles {
            content,
            title: inspect_text_file(&layout.title_file(name))?,
            js: inspect_text_file(&layout.js_file(name))?,
        },
        html_metadata,
    })
}

fn inspect_text_file(path: &Path) -> Result<SourceFile> {
    let Some((facts, bytes)) = inspect_file(path)? else {
        return Ok(SourceFile::missing());
    };
    let text = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(SourceFile {
        content: Some(text.trim().to_string()),
        ..SourceFile::found(facts)
    })
}

fn inspect_template(path: &Path) -> Result<SourceFile> {
    let Some((facts, bytes)) = inspect_file(path)? else {
        return Ok(SourceFile::missing());
    };
    let text = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(SourceFile {
        line_count: Some(text.lines().count()),
        ..SourceFile::found(facts)
    })
}

fn inspect_file(path: &Path) -> Result<Option<(FileFacts, Vec<u8>)>> {
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let facts = FileFacts {
        path: normalize_path(path),
        size_bytes: bytes.len() as u64,
        sha256: sha256_hex(&bytes),
    };
    Ok(Some((facts, bytes)))
}

fn list_unlisted_sources(layout: &SiteLayout, page_names: &[String]) -> Result<Vec<String>> {
    if !layout.source_dir.exists() {
        return Ok(Vec::new());
    }
    let mut claimed: BTreeSet<String> = TEMPLATE_NAMES.iter().map(|name| name.to_string()).collect();
    for name in page_names {
        claimed.insert(name.clone());
        claimed.insert(format!("{name}_title"));
        claimed.insert(format!("{name}_js"));
    }

    let mut unlisted = Vec::new();
    for entry in WalkDir::new(&layout.source_dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry
            .with_context(|| format!("failed to walk {}", layout.source_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !claimed.contains(&name) {
            unlisted.push(name);
        }
    }
    unlisted.sort();
    Ok(unlisted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MAKEFILE: &str = "# ffmpeg.org\nSRCS = about index \\\n\tdownload \\\n\tnews\n\nall: $(SRCS)\n";

    fn write_site(root: &Path) -> SiteLayout {
        let layout = SiteLayout::new(root);
        fs::create_dir_all(&layout.source_dir).expect("create src");
        fs::write(&layout.makefile, MAKEFILE).expect("write Makefile");
        let files = [
            ("about", "<h1>About</h1><p>See <a href=\"/x\">x</a>.</p>"),
            ("about_title", "About FFmpeg\n"),
            ("index", "<div><img src=\"logo.png\"></div>"),
            ("index_title", "FFmpeg"),
            ("index_js", "  <script src=\"a.js\"></script>\n"),
            ("download_title", "Download"),
            ("download_js", "\n"),
            ("template_head1", "<html>\n<head>\n"),
            ("template_footer1", "</html>\n"),
            ("README", "notes"),
        ];
        for (name, content) in files {
            fs::write(layout.source_dir.join(name), content).expect("write source");
        }
        layout
    }

    #[test]
    fn srcs_follow_continuation_lines() {
        assert_eq!(
            parse_srcs(MAKEFILE),
            vec!["about", "index", "download", "news"]
        );
    }

    #[test]
    fn srcs_stop_at_uncontinued_line() {
        let makefile = "SRCS = a b\nc d\nSRCS += e\n";
        assert_eq!(parse_srcs(makefile), vec!["a", "b"]);
    }

    #[test]
    fn srcs_accept_compact_assignments() {
        assert_eq!(parse_srcs("SRCS=a\\\n b\n"), vec!["a", "b"]);
        assert_eq!(parse_srcs("SRCS := a b\n"), vec!["a", "b"]);
        assert!(parse_srcs("OTHER = a\n").is_empty());
    }

    #[test]
    fn srcs_stop_at_comment_line() {
        assert_eq!(parse_srcs("SRCS = a \\\n# b\n c\n"), vec!["a"]);
    }

    #[test]
    fn html_metadata_counts_fragment_elements() {
        let metadata = html_metadata("<h1>About</h1><p>See <a href=\"/x\">x</a>.</p>");
        assert_eq!(metadata.root_element.as_deref(), Some("h1"));
        assert_eq!(metadata.element_count, 3);
        assert!(metadata.has_links);
        assert!(metadata.has_headings);
        assert!(!metadata.has_images);
    }

    #[test]
    fn missing_makefile_is_fatal() {
        let temp = tempdir().expect("tempdir");
        let error = analyze_site(&SiteLayout::new(temp.path()), |_| {}).expect_err("must fail");
        assert!(error.to_string().contains("Makefile not found"));
    }

    #[test]
    fn inventory_catalogues_pages_and_templates() {
        let temp = tempdir().expect("tempdir");
        let layout = write_site(temp.path());
        let mut seen = Vec::new();

        let inventory =
            analyze_site(&layout, |page| seen.push(page.name.clone())).expect("analyze site");

        assert_eq!(seen, vec!["about", "index", "download", "news"]);
        assert_eq!(inventory.makefile.page_count, 4);
        assert_eq!(
            inventory.makefile.facts.sha256,
            sha256_hex(MAKEFILE.as_bytes())
        );

        let about = &inventory.pages["about"];
        assert!(about.has_content());
        assert_eq!(about.files.title.content.as_deref(), Some("About FFmpeg"));
        assert!(!about.files.js.exists);
        assert_eq!(
            about.html_metadata.as_ref().map(|metadata| metadata.has_links),
            Some(true)
        );

        let index = &inventory.pages["index"];
        assert!(index.has_js());
        assert_eq!(
            index.files.js.content.as_deref(),
            Some("<script src=\"a.js\"></script>")
        );

        let download = &inventory.pages["download"];
        assert!(!download.has_content());
        assert!(download.html_metadata.is_none());
        assert!(download.files.js.exists);
        assert!(!download.has_js());

        assert_eq!(inventory.templates["template_head1"].line_count, Some(2));
        assert!(!inventory.templates["template_head_dev"].exists);

        assert_eq!(inventory.unlisted_sources, vec!["README"]);
        assert_eq!(
            inventory.summary,
            InventorySummary {
                total_pages: 4,
                pages_with_content: 2,
                pages_with_title: 3,
                pages_with_js: 1,
                templates_found: 2,
                unlisted_sources: 1,
            }
        );
    }

    #[test]
    fn inventory_json_marks_missing_files() {
        let temp = tempdir().expect("tempdir");
        let layout = write_site(temp.path());
        let inventory = analyze_site(&layout, |_| {}).expect("analyze site");
        let path = write_inventory(&inventory, &temp.path().join("site_inventory.json"))
            .expect("write inventory");

        let parsed: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).expect("read inventory"))
                .expect("parse inventory");
        assert_eq!(
            parsed["pages"]["news"]["files"]["content"],
            serde_json::json!({ "exists": false })
        );
        assert_eq!(parsed["pages"]["about"]["files"]["content"]["exists"], true);
        assert!(parsed["pages"]["about"]["files"]["content"]["sha256"].is_string());
        assert_eq!(parsed["makefile"]["pages"][0], "about");
        assert_eq!(parsed["summary"]["templates_found"], 2);
    }

    #[test]
    fn read_page_list_requires_makefile() {
        let temp = tempdir().expect("tempdir");
        let layout = write_site(temp.path());
        assert_eq!(
            read_page_list(&layout).expect("page list"),
            vec!["about", "index", "download", "news"]
        );
        assert!(read_page_list(&SiteLayout::new(&temp.path().join("nowhere"))).is_err());
    }
}
