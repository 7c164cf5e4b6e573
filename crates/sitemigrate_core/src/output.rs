use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::checksum::sha256_hex;
use crate::render::RenderedBody;
use crate::segment::Entry;

pub const DEFAULT_EXTENSION: &str = "md";
pub const DEFAULT_CONTENT_TYPE: &str = "news";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontmatterFormat {
    /// `+++` fenced TOML.
    #[default]
    Toml,
    /// `---` fenced YAML.
    #[serde(alias = "yml")]
    Yaml,
}

impl FrontmatterFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Yaml => "yaml",
        }
    }

    fn fence(self) -> &'static str {
        match self {
            Self::Toml => "+++",
            Self::Yaml => "---",
        }
    }
}

impl fmt::Display for FrontmatterFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrontmatterFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => bail!("unknown frontmatter format `{other}` (expected toml or yaml)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub format: FrontmatterFormat,
    pub extension: String,
    pub content_type: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            format: FrontmatterFormat::default(),
            extension: DEFAULT_EXTENSION.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EntryFrontmatter<'a, D> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<D>,
    slug: &'a str,
    #[serde(rename = "type")]
    content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_display: Option<&'a str>,
    checksums: Checksums,
}

#[derive(Debug, Serialize)]
struct Checksums {
    html: String,
}

/// Writes one content file per entry into a single directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
    options: OutputOptions,
}

impl OutputWriter {
    pub fn new(output_dir: &Path, options: OutputOptions) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            options,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, entry: &Entry<'_>) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", entry.file_stem(), self.options.extension))
    }

    /// Write header, blank line, body. Existing files with the same name are
    /// overwritten.
    pub fn write_entry(&self, entry: &Entry<'_>, rendered: &RenderedBody) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;
        let header = self.compose_header(entry, &rendered.source_html)?;
        let path = self.path_for(entry);
        fs::write(&path, format!("{header}\n{}", rendered.body))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn compose_header(&self, entry: &Entry<'_>, source_html: &str) -> Result<String> {
        let checksums = Checksums {
            html: sha256_hex(source_html.as_bytes()),
        };
        match self.options.format {
            FrontmatterFormat::Toml => {
                let date = entry.date_normalized.map(toml_timestamp).transpose()?;
                fenced_frontmatter(FrontmatterFormat::Toml, &self.frontmatter(entry, date, checksums))
            }
            FrontmatterFormat::Yaml => {
                let date = entry.date_normalized.map(rfc3339_midnight);
                fenced_frontmatter(FrontmatterFormat::Yaml, &self.frontmatter(entry, date, checksums))
            }
        }
    }

    fn frontmatter<'a, D>(
        &'a self,
        entry: &'a Entry<'_>,
        date: Option<D>,
        checksums: Checksums,
    ) -> EntryFrontmatter<'a, D> {
        EntryFrontmatter {
            title: &entry.title_full,
            date,
            slug: &entry.identifier,
            content_type: &self.options.content_type,
            date_display: entry.date_display.as_deref(),
            checksums,
        }
    }
}

/// Serialize `value` between the fences of `format`. The result ends with
/// the closing fence and a newline.
pub fn fenced_frontmatter<T: Serialize>(format: FrontmatterFormat, value: &T) -> Result<String> {
    let body = match format {
        FrontmatterFormat::Toml => {
            toml::to_string(value).context("failed to serialize TOML frontmatter")?
        }
        FrontmatterFormat::Yaml => {
            serde_yaml::to_string(value).context("failed to serialize YAML frontmatter")?
        }
    };
    let fence = format.fence();
    Ok(format!("{fence}\n{body}{fence}\n"))
}

fn rfc3339_midnight(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

fn toml_timestamp(date: NaiveDate) -> Result<toml::value::Datetime> {
    let text = rfc3339_midnight(date);
    text.parse::<toml::value::Datetime>()
        .with_context(|| format!("invalid timestamp {text}"))
}
