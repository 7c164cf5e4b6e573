use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use scraper::{ElementRef, Html, Node};

/// A parsed page. Legacy sources are bare body fragments; full documents
/// (doctype or `<html>` prefix) are parsed as such.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        let head = markup.trim_start();
        let html = if starts_with_ignore_case(head, "<!doctype") || starts_with_ignore_case(head, "<html")
        {
            Html::parse_document(markup)
        } else {
            Html::parse_fragment(markup)
        };
        Self { html }
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("input file not found: {}", path.display());
        }
        let markup = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self::parse(&markup))
    }

    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// Every element in document order, root included.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> + '_ {
        self.root().descendants().filter_map(ElementRef::wrap)
    }

    pub fn to_html(&self) -> String {
        self.html.html()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SpanNodeKind<'a> {
    Element(ElementRef<'a>),
    Comment(&'a str),
    /// Loose text lifted off a unit that is not itself part of a span.
    Text,
}

/// One sibling unit at some tree level: an element or comment together with
/// the text nodes that follow it up to the next element or comment.
#[derive(Debug, Clone)]
pub struct SpanNode<'a> {
    pub kind: SpanNodeKind<'a>,
    pub tail: Vec<&'a str>,
}

impl<'a> SpanNode<'a> {
    /// The trailing text of `self` as a standalone unit, if it has any
    /// non-whitespace content.
    pub fn detached_tail(&self) -> Option<SpanNode<'a>> {
        if self.tail.iter().all(|text| text.trim().is_empty()) {
            return None;
        }
        Some(SpanNode {
            kind: SpanNodeKind::Text,
            tail: self.tail.clone(),
        })
    }

    pub fn as_element(&self) -> Option<ElementRef<'a>> {
        match self.kind {
            SpanNodeKind::Element(element) => Some(element),
            SpanNodeKind::Comment(_) | SpanNodeKind::Text => None,
        }
    }

    pub fn to_html(&self) -> String {
        let mut output = match self.kind {
            SpanNodeKind::Element(element) => element.html(),
            SpanNodeKind::Comment(comment) => format!("<!--{comment}-->"),
            SpanNodeKind::Text => String::new(),
        };
        for text in &self.tail {
            escape_text_into(text, &mut output);
        }
        output
    }
}

/// Materialize the children of `parent` as sibling units. Text before the
/// first element or comment belongs to the parent and is not part of any unit.
pub fn sibling_units(parent: ElementRef<'_>) -> Vec<SpanNode<'_>> {
    let mut units: Vec<SpanNode<'_>> = Vec::new();
    for child in parent.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    units.push(SpanNode {
                        kind: SpanNodeKind::Element(element),
                        tail: Vec::new(),
                    });
                }
            }
            Node::Comment(comment) => units.push(SpanNode {
                kind: SpanNodeKind::Comment(&**comment),
                tail: Vec::new(),
            }),
            Node::Text(text) => {
                if let Some(last) = units.last_mut() {
                    last.tail.push(&**text);
                }
            }
            _ => {}
        }
    }
    units
}

// Mirrors the html5ever serializer's text-mode escaping.
fn escape_text_into(text: &str, output: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '\u{a0}' => output.push_str("&nbsp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(ch),
        }
    }
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
