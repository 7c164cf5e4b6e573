use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tracing::warn;

use crate::document::SpanNode;

const FALLBACK_NOTICE: &str =
    "Markdown conversion is not available in this build; falling back to HTML output (same as --html)";

static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Source markup, serialized node by node.
    Literal,
    Markdown,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Literal => "HTML",
            Self::Markdown => "Markdown",
        }
    }
}

/// Markup-to-text conversion collaborator.
pub trait TextConverter {
    fn convert(&self, markup: &str) -> Result<String>;
}

#[cfg(feature = "markdown")]
pub struct HtmdConverter {
    inner: htmd::HtmlToMarkdown,
}

#[cfg(feature = "markdown")]
impl HtmdConverter {
    pub fn new() -> Self {
        let options = htmd::options::Options {
            link_style: htmd::options::LinkStyle::Inlined,
            ..Default::default()
        };
        Self {
            inner: htmd::HtmlToMarkdown::builder().options(options).build(),
        }
    }
}

#[cfg(feature = "markdown")]
impl Default for HtmdConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "markdown")]
impl TextConverter for HtmdConverter {
    fn convert(&self, markup: &str) -> Result<String> {
        use anyhow::Context;

        self.inner
            .convert(markup)
            .context("failed to convert HTML to Markdown")
    }
}

/// The converter compiled into this build, if any.
pub fn available_converter() -> Option<Box<dyn TextConverter>> {
    #[cfg(feature = "markdown")]
    {
        Some(Box::new(HtmdConverter::new()))
    }
    #[cfg(not(feature = "markdown"))]
    {
        None
    }
}

/// Serialize each unit, join with newlines, trim the result.
pub fn render_literal(span: &[SpanNode<'_>]) -> String {
    span.iter()
        .map(SpanNode::to_html)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Collapse runs of three or more newlines to one blank line and trim.
pub fn tidy_markdown(text: &str) -> String {
    BLANK_RUN_RE.replace_all(text, "\n\n").trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBody {
    /// Literal serialization of the span; checksums are taken over this.
    pub source_html: String,
    pub body: String,
}

pub struct Renderer {
    requested: RenderMode,
    mode: RenderMode,
    converter: Option<Box<dyn TextConverter>>,
}

impl Renderer {
    /// Markdown without a converter degrades to literal output for the whole run.
    pub fn new(requested: RenderMode, converter: Option<Box<dyn TextConverter>>) -> Self {
        let mode = match (requested, converter.is_some()) {
            (RenderMode::Markdown, false) => RenderMode::Literal,
            _ => requested,
        };
        if requested != mode {
            warn!("{FALLBACK_NOTICE}");
        }
        Self {
            requested,
            mode,
            converter,
        }
    }

    pub fn literal() -> Self {
        Self::new(RenderMode::Literal, None)
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn fell_back(&self) -> bool {
        self.requested != self.mode
    }

    /// The one user-facing warning for a run that fell back to literal output.
    pub fn fallback_notice(&self) -> Option<&'static str> {
        self.fell_back().then_some(FALLBACK_NOTICE)
    }

    pub fn render(&self, span: &[SpanNode<'_>]) -> RenderedBody {
        let source_html = render_literal(span);
        let body = match (self.mode, &self.converter) {
            (RenderMode::Markdown, Some(converter)) => match converter.convert(&source_html) {
                Ok(text) => tidy_markdown(&text),
                Err(error) => {
                    warn!("{error:#}; keeping literal HTML for this entry");
                    source_html.clone()
                }
            },
            _ => source_html.clone(),
        };
        RenderedBody { source_html, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, sibling_units};
    use anyhow::bail;

    struct ShoutingConverter;

    impl TextConverter for ShoutingConverter {
        fn convert(&self, markup: &str) -> Result<String> {
            Ok(format!("\n\n{}\n\n\n\n\nEND\n\n", markup.to_uppercase()))
        }
    }

    struct BrokenConverter;

    impl TextConverter for BrokenConverter {
        fn convert(&self, _markup: &str) -> Result<String> {
            bail!("converter exploded")
        }
    }

    #[test]
    fn literal_joins_units_with_newlines_and_trims() {
        let document = Document::parse("<p>a</p><p>b &amp; c</p>\n\n");
        let units = sibling_units(document.root());
        assert_eq!(render_literal(&units), "<p>a</p>\n<p>b &amp; c</p>");
    }

    #[test]
    fn literal_of_empty_span_is_empty() {
        assert_eq!(render_literal(&[]), "");
    }

    #[test]
    fn literal_rendering_is_byte_stable() {
        let markup = "<p class=\"x\" id=\"y\" data-z=\"1\">one</p><a href=\"/a\" title=\"t\" rel=\"r\">two</a>";
        let first_document = Document::parse(markup);
        let second_document = Document::parse(markup);
        let renderer = Renderer::literal();

        let first = renderer.render(&sibling_units(first_document.root()));
        let again = renderer.render(&sibling_units(first_document.root()));
        let second = renderer.render(&sibling_units(second_document.root()));
        assert_eq!(first, again);
        assert_eq!(first, second);
        assert_eq!(
            first.body,
            "<p class=\"x\" id=\"y\" data-z=\"1\">one</p>\n<a href=\"/a\" title=\"t\" rel=\"r\">two</a>"
        );
    }

    #[test]
    fn tidy_collapses_blank_runs() {
        assert_eq!(tidy_markdown("a\n\n\n\nb\n\n\nc\n\nd"), "a\n\nb\n\nc\n\nd");
        assert_eq!(tidy_markdown("  \n\nx\n\n\n"), "x");
    }

    #[test]
    fn tidy_is_idempotent() {
        for input in [
            "",
            "\n\n\n",
            "a\n\n\n\n\nb",
            " a \n\n\n b \n",
            "x\n \n\n\ny",
            "\r\n\r\n\r\nz",
        ] {
            let once = tidy_markdown(input);
            assert_eq!(tidy_markdown(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn markdown_without_converter_falls_back() {
        let renderer = Renderer::new(RenderMode::Markdown, None);
        assert_eq!(renderer.mode(), RenderMode::Literal);
        assert!(renderer.fell_back());
        let notice = renderer.fallback_notice().expect("fallback notice");
        assert!(notice.contains("falling back to HTML"));

        let document = Document::parse("<p>x</p>");
        let rendered = renderer.render(&sibling_units(document.root()));
        assert_eq!(rendered.body, "<p>x</p>");
    }

    #[test]
    fn literal_request_never_reports_fallback() {
        let renderer = Renderer::new(RenderMode::Literal, Some(Box::new(ShoutingConverter)));
        assert!(!renderer.fell_back());
        assert!(renderer.fallback_notice().is_none());
        let document = Document::parse("<p>x</p>");
        assert_eq!(renderer.render(&sibling_units(document.root())).body, "<p>x</p>");
    }

    #[test]
    fn converter_output_is_tidied() {
        let renderer = Renderer::new(RenderMode::Markdown, Some(Box::new(ShoutingConverter)));
        assert_eq!(renderer.mode(), RenderMode::Markdown);
        let document = Document::parse("<p>x</p>");
        let rendered = renderer.render(&sibling_units(document.root()));
        assert_eq!(rendered.source_html, "<p>x</p>");
        assert_eq!(rendered.body, "<P>X</P>\n\nEND");
    }

    #[test]
    fn converter_error_keeps_literal_entry() {
        let renderer = Renderer::new(RenderMode::Markdown, Some(Box::new(BrokenConverter)));
        let document = Document::parse("<p>x</p>");
        let rendered = renderer.render(&sibling_units(document.root()));
        assert_eq!(rendered.body, "<p>x</p>");
        assert!(!renderer.fell_back());
    }

    #[cfg(feature = "markdown")]
    #[test]
    fn htmd_keeps_links_and_emphasis_inline() {
        let converter = HtmdConverter::new();
        let text = converter
            .convert("<p>Read <a href=\"https://ffmpeg.org/download.html\">the <em>release</em> notes</a> now.</p>")
            .expect("convert");
        let text = tidy_markdown(&text);
        assert!(text.contains("](https://ffmpeg.org/download.html)"), "{text}");
        assert!(text.contains("*release*") || text.contains("_release_"), "{text}");
        assert!(!text.contains('\n'), "{text}");
    }
}
