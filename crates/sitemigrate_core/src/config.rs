use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analyze::{DEFAULT_INVENTORY_PATH, SiteLayout};
use crate::extract::{DEFAULT_EXTRACT_REPORT_PATH, PageWriter};
use crate::output::{DEFAULT_CONTENT_TYPE, DEFAULT_EXTENSION, FrontmatterFormat, OutputOptions};
use crate::segment::{BoundaryRules, DEFAULT_BOUNDARY_TAG, DEFAULT_SECTION_BREAK_TAG};

pub const DEFAULT_CONFIG_FILENAME: &str = "sitemigrate.toml";
pub const DEFAULT_REPORT_PATH: &str = "verification_results.json";
pub const FRONTMATTER_ENV: &str = "SITEMIGRATE_FRONTMATTER";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MigrateConfig {
    #[serde(default)]
    pub news: NewsSection,
    #[serde(default)]
    pub verify: VerifySection,
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub extract: ExtractSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NewsSection {
    pub boundary_tag: Option<String>,
    pub section_break_tag: Option<String>,
    pub extension: Option<String>,
    pub content_type: Option<String>,
    pub frontmatter: Option<FrontmatterFormat>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct VerifySection {
    pub report_path: Option<PathBuf>,
}

/// Legacy site layout; relative paths are taken from the site root.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SiteSection {
    pub makefile: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub inventory_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ExtractSection {
    pub extension: Option<String>,
    pub frontmatter: Option<FrontmatterFormat>,
    pub report_path: Option<PathBuf>,
}

impl MigrateConfig {
    pub fn boundary_rules(&self) -> BoundaryRules {
        BoundaryRules {
            boundary_tag: non_empty(self.news.boundary_tag.as_deref())
                .unwrap_or(DEFAULT_BOUNDARY_TAG)
                .to_string(),
            section_break_tag: non_empty(self.news.section_break_tag.as_deref())
                .unwrap_or(DEFAULT_SECTION_BREAK_TAG)
                .to_string(),
        }
    }

    /// News frontmatter format. Precedence: CLI flag, then
    /// `SITEMIGRATE_FRONTMATTER`, then `[news]`, then toml. Blank values are skipped.
    pub fn frontmatter(
        &self,
        flag: Option<&str>,
        env_value: Option<&str>,
    ) -> Result<FrontmatterFormat> {
        resolve_frontmatter(flag, env_value, self.news.frontmatter)
    }

    /// Same precedence as [`MigrateConfig::frontmatter`], reading `[extract]`.
    pub fn extract_frontmatter(
        &self,
        flag: Option<&str>,
        env_value: Option<&str>,
    ) -> Result<FrontmatterFormat> {
        resolve_frontmatter(flag, env_value, self.extract.frontmatter)
    }

    pub fn output_options(
        &self,
        flag: Option<&str>,
        env_value: Option<&str>,
    ) -> Result<OutputOptions> {
        Ok(OutputOptions {
            format: self.frontmatter(flag, env_value)?,
            extension: non_empty(self.news.extension.as_deref())
                .map(|ext| ext.trim_start_matches('.'))
                .unwrap_or(DEFAULT_EXTENSION)
                .to_string(),
            content_type: non_empty(self.news.content_type.as_deref())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
        })
    }

    pub fn site_layout(&self, root: &Path) -> SiteLayout {
        let mut layout = SiteLayout::new(root);
        if let Some(makefile) = &self.site.makefile {
            layout.makefile = root.join(makefile);
        }
        if let Some(source_dir) = &self.site.source_dir {
            layout.source_dir = root.join(source_dir);
        }
        layout
    }

    pub fn page_writer(
        &self,
        output_dir: &Path,
        flag: Option<&str>,
        env_value: Option<&str>,
    ) -> Result<PageWriter> {
        let writer = PageWriter::new(output_dir, self.extract_frontmatter(flag, env_value)?);
        Ok(match non_empty(self.extract.extension.as_deref()) {
            Some(extension) => writer.with_extension(extension),
            None => writer,
        })
    }

    pub fn inventory_path(&self) -> PathBuf {
        self.site
            .inventory_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INVENTORY_PATH))
    }

    pub fn extract_report_path(&self) -> PathBuf {
        self.extract
            .report_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXTRACT_REPORT_PATH))
    }

    pub fn report_path(&self) -> PathBuf {
        self.verify
            .report_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_REPORT_PATH))
    }
}

/// Load and parse a MigrateConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MigrateConfig> {
    if !config_path.exists() {
        return Ok(MigrateConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: MigrateConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// An explicit path must exist; the implicit `sitemigrate.toml` is optional.
pub fn resolve_config(explicit: Option<&Path>, cwd: &Path) -> Result<MigrateConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            load_config(path)
        }
        None => load_config(&cwd.join(DEFAULT_CONFIG_FILENAME)),
    }
}

fn resolve_frontmatter(
    flag: Option<&str>,
    env_value: Option<&str>,
    configured: Option<FrontmatterFormat>,
) -> Result<FrontmatterFormat> {
    if let Some(value) = non_empty(flag) {
        return value.parse::<FrontmatterFormat>();
    }
    if let Some(value) = non_empty(env_value) {
        return value
            .parse::<FrontmatterFormat>()
            .with_context(|| format!("invalid {FRONTMATTER_ENV} value"));
    }
    Ok(configured.unwrap_or_default())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_legacy_layout() {
        let config = MigrateConfig::default();
        assert_eq!(config.boundary_rules(), BoundaryRules::default());
        assert_eq!(config.report_path(), PathBuf::from("verification_results.json"));
        assert_eq!(config.news.frontmatter, None);
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/sitemigrate.toml")).expect("load config");
        assert_eq!(config, MigrateConfig::default());
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("sitemigrate.toml");
        fs::write(
            &config_path,
            r#"
[news]
boundary_tag = "h2"
section_break_tag = "hr"
extension = ".markdown"
content_type = "post"
frontmatter = "yaml"

[verify]
report_path = "out/report.json"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        let rules = config.boundary_rules();
        assert_eq!(rules.boundary_tag, "h2");
        assert_eq!(rules.section_break_tag, "hr");
        assert_eq!(config.news.frontmatter, Some(FrontmatterFormat::Yaml));
        assert_eq!(config.news.extension.as_deref(), Some(".markdown"));
        assert_eq!(config.report_path(), PathBuf::from("out/report.json"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = MigrateConfig {
            news: NewsSection {
                boundary_tag: Some("  ".to_string()),
                extension: Some(String::new()),
                ..NewsSection::default()
            },
            ..MigrateConfig::default()
        };
        assert_eq!(config.boundary_rules().boundary_tag, "h3");
        let options = config.output_options(None, None).expect("output options");
        assert_eq!(options.extension, "md");
        assert_eq!(options.content_type, "news");
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("sitemigrate.toml");
        fs::write(&config_path, "[news\nboundary_tag = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_unknown_frontmatter() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("sitemigrate.toml");
        fs::write(&config_path, "[news]\nfrontmatter = \"json\"\n").expect("write config");
        assert!(load_config(&config_path).is_err());
    }

    #[test]
    fn explicit_config_must_exist() {
        let temp = tempdir().expect("tempdir");
        let error = resolve_config(Some(temp.path().join("missing.toml").as_path()), temp.path())
            .expect_err("must fail");
        assert!(error.to_string().contains("missing.toml"));
    }

    #[test]
    fn implicit_config_is_read_from_cwd() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join(DEFAULT_CONFIG_FILENAME),
            "[news]\ncontent_type = \"post\"\n",
        )
        .expect("write config");
        let config = resolve_config(None, temp.path()).expect("resolve config");
        assert_eq!(config.news.content_type.as_deref(), Some("post"));
    }

    fn yaml_config() -> MigrateConfig {
        MigrateConfig {
            news: NewsSection {
                frontmatter: Some(FrontmatterFormat::Yaml),
                ..NewsSection::default()
            },
            ..MigrateConfig::default()
        }
    }

    #[test]
    fn frontmatter_defaults_to_toml() {
        let format = MigrateConfig::default()
            .frontmatter(None, None)
            .expect("frontmatter");
        assert_eq!(format, FrontmatterFormat::Toml);
    }

    #[test]
    fn frontmatter_uses_config_file_value() {
        let format = yaml_config().frontmatter(None, None).expect("frontmatter");
        assert_eq!(format, FrontmatterFormat::Yaml);
    }

    #[test]
    fn frontmatter_env_beats_config_file() {
        let format = yaml_config()
            .frontmatter(None, Some("toml"))
            .expect("frontmatter");
        assert_eq!(format, FrontmatterFormat::Toml);
    }

    #[test]
    fn frontmatter_flag_beats_env_and_config_file() {
        let format = MigrateConfig::default()
            .frontmatter(Some("yml"), Some("toml"))
            .expect("frontmatter");
        assert_eq!(format, FrontmatterFormat::Yaml);
    }

    #[test]
    fn blank_env_frontmatter_is_ignored() {
        let format = yaml_config().frontmatter(None, Some("  ")).expect("frontmatter");
        assert_eq!(format, FrontmatterFormat::Yaml);
    }

    #[test]
    fn invalid_env_frontmatter_names_the_variable() {
        let error = MigrateConfig::default()
            .frontmatter(None, Some("json"))
            .expect_err("must fail");
        assert!(error.to_string().contains(FRONTMATTER_ENV));
    }

    #[test]
    fn invalid_flag_frontmatter_is_rejected() {
        assert!(MigrateConfig::default().frontmatter(Some("json"), None).is_err());
    }

    #[test]
    fn config_file_accepts_yml_alias() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("sitemigrate.toml");
        fs::write(&config_path, "[news]\nfrontmatter = \"yml\"\n").expect("write config");
        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.news.frontmatter, Some(FrontmatterFormat::Yaml));
    }

    #[test]
    fn site_section_resolves_against_root() {
        let config = MigrateConfig {
            site: SiteSection {
                source_dir: Some(PathBuf::from("pages")),
                ..SiteSection::default()
            },
            ..MigrateConfig::default()
        };
        let layout = config.site_layout(Path::new("/srv/ffmpeg-web"));
        assert_eq!(layout.makefile, PathBuf::from("/srv/ffmpeg-web/Makefile"));
        assert_eq!(layout.source_dir, PathBuf::from("/srv/ffmpeg-web/pages"));
        assert_eq!(config.inventory_path(), PathBuf::from("site_inventory.json"));
        assert_eq!(
            config.extract_report_path(),
            PathBuf::from("extraction_report.json")
        );
    }

    #[test]
    fn extract_section_sets_writer_format_and_extension() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("sitemigrate.toml");
        fs::write(
            &config_path,
            "[extract]\nextension = \".html\"\nfrontmatter = \"yaml\"\nreport_path = \"out/extract.json\"\n",
        )
        .expect("write config");
        let config = load_config(&config_path).expect("load config");

        assert_eq!(
            config.extract_frontmatter(None, None).expect("frontmatter"),
            FrontmatterFormat::Yaml
        );
        assert_eq!(
            config.frontmatter(None, None).expect("frontmatter"),
            FrontmatterFormat::Toml
        );
        let writer = config
            .page_writer(Path::new("content"), None, None)
            .expect("page writer");
        assert_eq!(writer.path_for("about"), PathBuf::from("content/about.html"));
        assert_eq!(config.extract_report_path(), PathBuf::from("out/extract.json"));
    }
}
