use std::collections::HashMap;

use chrono::NaiveDate;
use scraper::ElementRef;

use crate::dates::split_leading_date;
use crate::document::{Document, SpanNode, sibling_units};

pub const DEFAULT_BOUNDARY_TAG: &str = "h3";
pub const DEFAULT_SECTION_BREAK_TAG: &str = "h1";

/// Which elements open an entry and which close the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryRules {
    pub boundary_tag: String,
    pub section_break_tag: String,
}

impl Default for BoundaryRules {
    fn default() -> Self {
        Self {
            boundary_tag: DEFAULT_BOUNDARY_TAG.to_string(),
            section_break_tag: DEFAULT_SECTION_BREAK_TAG.to_string(),
        }
    }
}

impl BoundaryRules {
    pub fn is_boundary(&self, element: ElementRef<'_>) -> bool {
        element.value().name().eq_ignore_ascii_case(&self.boundary_tag)
            && element.value().attr("id").is_some_and(|id| !id.is_empty())
    }

    pub fn is_section_break(&self, element: ElementRef<'_>) -> bool {
        element
            .value()
            .name()
            .eq_ignore_ascii_case(&self.section_break_tag)
    }

    fn ends_span(&self, unit: &SpanNode<'_>) -> bool {
        unit.as_element()
            .is_some_and(|element| self.is_boundary(element) || self.is_section_break(element))
    }
}

/// One dated or undated news item cut out of a listing page.
#[derive(Debug, Clone)]
pub struct Entry<'a> {
    pub identifier: String,
    pub title_full: String,
    pub title_stripped: String,
    pub date_display: Option<String>,
    pub date_normalized: Option<NaiveDate>,
    pub body_span: Vec<SpanNode<'a>>,
    pub sequence_index: usize,
}

impl Entry<'_> {
    pub fn has_date(&self) -> bool {
        self.date_normalized.is_some()
    }

    /// `YYYY-MM-DD-<id>` when dated, `<index:03>-<id>` otherwise.
    pub fn file_stem(&self) -> String {
        match self.date_normalized {
            Some(date) => format!("{}-{}", date.format("%Y-%m-%d"), self.identifier),
            None => format!("{:03}-{}", self.sequence_index, self.identifier),
        }
    }
}

/// Cut `document` into entries. Each boundary heading owns the siblings that
/// follow it up to the next boundary, the next section break, or the end of
/// its parent. Identifiers are not deduplicated.
pub fn segment<'a>(document: &'a Document, rules: &BoundaryRules) -> Vec<Entry<'a>> {
    let mut levels = HashMap::new();
    let mut entries = Vec::new();

    for heading in document.elements().filter(|element| rules.is_boundary(*element)) {
        let Some(parent) = heading.parent().and_then(ElementRef::wrap) else {
            continue;
        };
        let level = levels
            .entry((*parent).id())
            .or_insert_with(|| sibling_units(parent));
        let body_span = span_after(level, heading, rules);

        let identifier = heading.value().attr("id").unwrap_or_default().to_string();
        let title_full = heading.text().collect::<String>().trim().to_string();
        let split = split_leading_date(&title_full);
        let sequence_index = entries.len();

        entries.push(Entry {
            identifier,
            title_stripped: split.title,
            date_display: split.display,
            date_normalized: split.date,
            title_full,
            body_span,
            sequence_index,
        });
    }

    entries
}

fn span_after<'a>(
    level: &[SpanNode<'a>],
    heading: ElementRef<'a>,
    rules: &BoundaryRules,
) -> Vec<SpanNode<'a>> {
    let Some(start) = level
        .iter()
        .position(|unit| unit.as_element() == Some(heading))
    else {
        return Vec::new();
    };
    // Text right after the heading belongs to this entry, not to the heading.
    level[start]
        .detached_tail()
        .into_iter()
        .chain(
            level[start + 1..]
                .iter()
                .take_while(|unit| !rules.ends_span(unit))
                .cloned(),
        )
        .collect()
}
