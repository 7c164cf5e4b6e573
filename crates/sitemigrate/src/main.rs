use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use sitemigrate_core::analyze::{PageInventory, analyze_site, write_inventory};
use sitemigrate_core::config::{FRONTMATTER_ENV, MigrateConfig, resolve_config};
use sitemigrate_core::extract::{
    ExtractStatus, PageExtraction, extract_pages, write_extraction_report,
};
use sitemigrate_core::news::{NewsOptions, NewsReport, extract_news};
use sitemigrate_core::render::{RenderMode, Renderer, available_converter};
use sitemigrate_core::verify::{CompareStatus, PageComparison, verify_pages, write_report};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sitemigrate",
    version,
    about = "Move legacy Makefile-built site content into Hugo content files"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file (default: ./sitemigrate.toml)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Catalogue the legacy Makefile, templates and page sources")]
    Analyze(AnalyzeArgs),
    #[command(about = "Copy page sources into content files with frontmatter")]
    Extract(ExtractArgs),
    #[command(about = "Split the news listing page into one file per entry")]
    News(NewsArgs),
    #[command(about = "Compare original HTML pages with regenerated output")]
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[arg(value_name = "SITE_ROOT", default_value = ".", help = "Directory holding the Makefile")]
    root: PathBuf,
    #[arg(long, value_name = "PATH", help = "Where to write the JSON inventory")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    #[arg(value_name = "PAGE", help = "Page name from Makefile SRCS, or `all`")]
    page: String,
    #[arg(value_name = "OUTPUT_DIR", help = "Directory receiving one file per page")]
    output_dir: PathBuf,
    #[arg(long, value_name = "PATH", default_value = ".", help = "Directory holding the Makefile")]
    root: PathBuf,
    #[arg(long, value_name = "FORMAT", help = "Frontmatter format: toml or yaml")]
    frontmatter: Option<String>,
    #[arg(long, value_name = "PATH", help = "Where to write the JSON report")]
    report: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct NewsArgs {
    #[arg(value_name = "INPUT", help = "Legacy news listing page (e.g. src/index)")]
    input: PathBuf,
    #[arg(value_name = "OUTPUT_DIR", help = "Directory receiving one file per entry")]
    output_dir: PathBuf,
    #[arg(long, help = "Keep entry bodies as HTML instead of converting to Markdown")]
    html: bool,
    #[arg(long, value_name = "FORMAT", help = "Frontmatter format: toml or yaml")]
    frontmatter: Option<String>,
}

#[derive(Debug, Args)]
struct VerifyArgs {
    #[arg(value_name = "ORIGINAL_DIR")]
    original_dir: PathBuf,
    #[arg(value_name = "GENERATED_DIR")]
    generated_dir: PathBuf,
    #[arg(value_name = "PAGE", help = "Compare a single page (name without .html)")]
    page: Option<String>,
    #[arg(long, value_name = "PATH", help = "Where to write the JSON report")]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Commands::Analyze(args) => run_analyze(&runtime, args),
        Commands::Extract(args) => run_extract(&runtime, args),
        Commands::News(args) => run_news(&runtime, args),
        Commands::Verify(args) => run_verify(&runtime, args),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
}

fn run_analyze(runtime: &RuntimeOptions, args: AnalyzeArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let layout = config.site_layout(&args.root);
    let output = args.output.unwrap_or_else(|| config.inventory_path());

    println!("site analyze");
    println!("root: {}", normalize_path(&layout.root));
    println!("makefile: {}", normalize_path(&layout.makefile));
    println!("source_dir: {}", normalize_path(&layout.source_dir));

    let inventory = analyze_site(&layout, print_page_inventory)?;
    let summary = &inventory.summary;
    println!("pages.total: {}", summary.total_pages);
    println!("pages.with_content: {}", summary.pages_with_content);
    println!("pages.with_title: {}", summary.pages_with_title);
    println!("pages.with_js: {}", summary.pages_with_js);
    println!("templates.found: {}", summary.templates_found);
    println!("sources.unlisted: {}", summary.unlisted_sources);

    let written = write_inventory(&inventory, &output)?;
    println!("inventory: {}", normalize_path(&written));
    Ok(())
}

fn print_page_inventory(page: &PageInventory) {
    println!(
        "page.{}: content={} title={} js={}",
        page.name,
        format_flag(page.has_content()),
        format_flag(page.has_title()),
        format_flag(page.has_js())
    );
}

fn run_extract(runtime: &RuntimeOptions, args: ExtractArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let layout = config.site_layout(&args.root);
    let env_frontmatter = env::var(FRONTMATTER_ENV).ok();
    let writer = config.page_writer(
        &args.output_dir,
        args.frontmatter.as_deref(),
        env_frontmatter.as_deref(),
    )?;
    let report_path = args.report.unwrap_or_else(|| config.extract_report_path());

    println!("page extract");
    println!("root: {}", normalize_path(&layout.root));
    println!("output_dir: {}", normalize_path(&args.output_dir));

    let report = extract_pages(&layout, Some(args.page.as_str()), &writer, print_page_extraction)?;
    println!("pages.requested: {}", report.extraction.pages_requested);
    println!("pages.successful: {}", report.extraction.pages_successful);

    let written = write_extraction_report(&report, &report_path)?;
    println!("report: {}", normalize_path(&written));

    if !report.passed() {
        bail!(
            "extraction failed for {} of {} pages (see {})",
            report.extraction.pages_requested - report.extraction.pages_successful,
            report.extraction.pages_requested,
            normalize_path(&written)
        );
    }
    Ok(())
}

fn print_page_extraction(result: &PageExtraction) {
    match result.status {
        ExtractStatus::Success => println!(
            "page.{}: {} -> {}",
            result.page,
            result.status.as_str(),
            result.output.as_deref().unwrap_or("?")
        ),
        ExtractStatus::Error => println!(
            "page.{}: {} {}",
            result.page,
            result.status.as_str(),
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn run_news(runtime: &RuntimeOptions, args: NewsArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let env_frontmatter = env::var(FRONTMATTER_ENV).ok();
    let output = config.output_options(args.frontmatter.as_deref(), env_frontmatter.as_deref())?;
    let options = NewsOptions {
        rules: config.boundary_rules(),
        output,
    };

    let requested = if args.html {
        RenderMode::Literal
    } else {
        RenderMode::Markdown
    };
    let renderer = Renderer::new(requested, available_converter());
    if let Some(notice) = renderer.fallback_notice() {
        println!("warning: {notice}");
    }

    println!("news extract");
    println!("input: {}", normalize_path(&args.input));
    println!("output_dir: {}", normalize_path(&args.output_dir));
    println!("format: {}", renderer.mode().as_str());
    println!("frontmatter: {}", options.output.format);

    let report = extract_news(&args.input, &args.output_dir, &options, &renderer, |entry| {
        let file_name = entry
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        println!("entry: {} -> {file_name}", entry.label());
    })?;

    print_news_summary(&report);
    Ok(())
}

fn print_news_summary(report: &NewsReport) {
    let summary = &report.summary;
    println!("entries.total: {}", summary.total);
    println!("entries.with_dates: {}", summary.with_dates);
    println!("entries.without_dates: {}", summary.without_dates);
    match (summary.earliest, summary.latest) {
        (Some(earliest), Some(latest)) => println!("date_range: {earliest} to {latest}"),
        _ => println!("date_range: <none>"),
    }
    println!("fell_back: {}", format_flag(report.fell_back));
    println!("summary: {summary}");
}

fn run_verify(runtime: &RuntimeOptions, args: VerifyArgs) -> Result<()> {
    let config = load_runtime_config(runtime)?;
    let report_path = args.report.unwrap_or_else(|| config.report_path());

    println!("verify");
    println!("original_dir: {}", normalize_path(&args.original_dir));
    println!("generated_dir: {}", normalize_path(&args.generated_dir));

    let report = verify_pages(
        &args.original_dir,
        &args.generated_dir,
        args.page.as_deref(),
        print_page_result,
    )?;

    println!("pages.total: {}", report.results.len());
    println!("pages.exact: {}", report.count(CompareStatus::ExactMatch));
    println!("pages.normalized: {}", report.count(CompareStatus::NormalizedMatch));
    println!("pages.different: {}", report.count(CompareStatus::Different));
    println!("pages.errors: {}", report.count(CompareStatus::Error));

    let written = write_report(&report, &report_path)?;
    println!("report: {}", normalize_path(&written));

    if !report.passed() {
        bail!(
            "verification failed: {} different, {} errors (see {})",
            report.count(CompareStatus::Different),
            report.count(CompareStatus::Error),
            normalize_path(&written)
        );
    }
    Ok(())
}

fn print_page_result(result: &PageComparison) {
    match result.status {
        CompareStatus::Different => println!(
            "page.{}: {} ({} diff lines)",
            result.page,
            result.status.as_str(),
            result
                .diff_lines
                .map(|lines| lines.to_string())
                .unwrap_or_else(|| "?".to_string())
        ),
        CompareStatus::Error => println!(
            "page.{}: {} {}",
            result.page,
            result.status.as_str(),
            result.error.as_deref().unwrap_or("unknown error")
        ),
        _ => println!("page.{}: {}", result.page, result.status.as_str()),
    }
}

fn load_runtime_config(runtime: &RuntimeOptions) -> Result<MigrateConfig> {
    let cwd = env::current_dir().context("failed to read current directory")?;
    resolve_config(runtime.config.as_deref(), &cwd)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
