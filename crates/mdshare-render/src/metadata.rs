//! Page metadata derived from the document: title and description.

use serde::Serialize;

use crate::ast::{Node, NodeKind};

/// Longest title kept, in characters, including the `...` marker.
pub const TITLE_MAX_CHARS: usize = 60;

/// Longest description kept, in characters, including the `...` marker.
pub const DESCRIPTION_MAX_CHARS: usize = 160;

/// Title and description for link previews and page headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Trim `text` and cap it at `max_chars` characters.
///
/// Over-long text is cut to leave room for `...`, with whitespace before the
/// cut removed.
///
/// ```rust
/// use mdshare_render::truncate;
///
/// assert_eq!(truncate("  short  ", 10), "short");
/// assert_eq!(truncate("a long sentence here", 10), "a long...");
/// ```
pub fn truncate(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

struct Limits {
    title: usize,
    description: usize,
}

/// Derive metadata from a parsed document.
///
/// String `title`/`description` frontmatter fields win; otherwise the first
/// heading and first paragraph with visible text are used. Each field is set
/// once and never overwritten.
pub(crate) fn extract(document: &Node, title_max: usize, description_max: usize) -> Metadata {
    let limits = Limits {
        title: title_max,
        description: description_max,
    };
    let mut metadata = Metadata::default();

    if let Some(NodeKind::Frontmatter {
        data: Some(data), ..
    }) = document.children.first().map(|n| &n.kind)
    {
        set_once(&mut metadata.title, data.get_str("title"), limits.title);
        set_once(
            &mut metadata.description,
            data.get_str("description"),
            limits.description,
        );
    }

    visit(document, &mut metadata, &limits);
    metadata
}

fn visit(node: &Node, metadata: &mut Metadata, limits: &Limits) {
    if metadata.title.is_some() && metadata.description.is_some() {
        return;
    }
    match node.kind {
        NodeKind::Heading(_) => {
            set_once(&mut metadata.title, Some(&flatten(node)), limits.title);
        }
        NodeKind::Paragraph { .. } => {
            set_once(
                &mut metadata.description,
                Some(&flatten(node)),
                limits.description,
            );
        }
        _ => {
            for child in &node.children {
                visit(child, metadata, limits);
            }
        }
    }
}

fn set_once(field: &mut Option<String>, value: Option<&str>, max_chars: usize) {
    if field.is_some() {
        return;
    }
    if let Some(value) = value
        && !value.trim().is_empty()
    {
        *field = Some(truncate(value, max_chars));
    }
}

/// Plain text of a heading or paragraph.
fn flatten(node: &Node) -> String {
    let mut out = String::new();
    flatten_into(node, &mut out);
    out
}

fn flatten_into(node: &Node, out: &mut String) {
    match &node.kind {
        NodeKind::Text(s)
        | NodeKind::Code(s)
        | NodeKind::InlineMath(s)
        | NodeKind::InlineHtml(s)
        | NodeKind::Html(s) => out.push_str(s),
        NodeKind::SoftBreak => out.push('\n'),
        NodeKind::HardBreak | NodeKind::DisplayMath(_) => {}
        _ => {
            for child in &node.children {
                flatten_into(child, out);
            }
        }
    }
}
