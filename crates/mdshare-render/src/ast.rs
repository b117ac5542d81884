//! Markdown syntax tree.
//!
//! pulldown-cmark yields a flat event stream; the later stages want a tree
//! they can walk more than once (metadata extraction, then conversion), so
//! the events are folded into [`Node`]s here.

use std::sync::LazyLock;

use pulldown_cmark::{Alignment, CodeBlockKind, Event, Options, Parser, Tag};
use regex::Regex;

use crate::frontmatter::{Frontmatter, decode_frontmatter};

/// A syntax tree node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    Document,
    /// Leading `---` block: raw text plus its decoded mapping (if well-formed)
    Frontmatter {
        raw: String,
        data: Option<Frontmatter>,
    },
    Heading(u8),
    /// `tight` paragraphs come from tight list items and render without `<p>`
    Paragraph {
        tight: bool,
    },
    BlockQuote,
    CodeBlock {
        info: String,
        code: String,
    },
    List(Option<u64>),
    Item,
    TaskMarker(bool),
    Table(Vec<Alignment>),
    TableHead,
    TableRow,
    TableCell,
    Emphasis,
    Strong,
    Strikethrough,
    Link {
        dest: String,
        title: String,
    },
    Image {
        dest: String,
        title: String,
    },
    Text(String),
    Code(String),
    InlineMath(String),
    DisplayMath(String),
    /// Block-level raw HTML
    Html(String),
    InlineHtml(String),
    SoftBreak,
    HardBreak,
    Rule,
    /// Constructs outside the enabled grammar; children render in place
    Fragment,
}

impl Node {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    fn is_inline(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Text(_)
                | NodeKind::Code(_)
                | NodeKind::InlineMath(_)
                | NodeKind::InlineHtml(_)
                | NodeKind::SoftBreak
                | NodeKind::HardBreak
                | NodeKind::Emphasis
                | NodeKind::Strong
                | NodeKind::Strikethrough
                | NodeKind::Link { .. }
                | NodeKind::Image { .. }
        )
    }

    /// Flattened text of this node and all descendants, formatting stripped.
    pub(crate) fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.kind {
            NodeKind::Text(s)
            | NodeKind::Code(s)
            | NodeKind::InlineMath(s)
            | NodeKind::DisplayMath(s)
            | NodeKind::Html(s)
            | NodeKind::InlineHtml(s) => out.push_str(s),
            NodeKind::CodeBlock { code, .. } => out.push_str(code),
            NodeKind::SoftBreak => out.push('\n'),
            _ => {}
        }
        for child in &self.children {
            child.collect_text(out);
        }
    }

    /// Append a child, merging adjacent text runs.
    fn push(&mut self, child: Node) {
        if let NodeKind::Text(text) = &child.kind
            && let Some(Node {
                kind: NodeKind::Text(last),
                ..
            }) = self.children.last_mut()
        {
            last.push_str(text);
            return;
        }
        self.children.push(child);
    }
}

/// Parser options: CommonMark plus the GFM-ish extensions and math.
pub(crate) fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_MATH
        | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
}

/// Parse markdown into a syntax tree.
///
/// The frontmatter block, when present, is always the document's first child.
pub(crate) fn parse(markdown: &str) -> Node {
    // pulldown-cmark needs content between the fences to see a metadata block
    let Some(fence) = EMPTY_FRONTMATTER_RE.find(markdown) else {
        return parse_with(markdown, parser_options());
    };
    let frontmatter = Node::new(NodeKind::Frontmatter {
        raw: String::new(),
        data: decode_frontmatter(""),
    });
    let mut options = parser_options();
    options.remove(Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);
    let mut document = parse_with(&markdown[fence.end()..], options);
    document.children.insert(0, frontmatter);
    document
}

static EMPTY_FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A---[ \t]*\r?\n(?:[ \t]*\r?\n)*---[ \t]*(?:\r?\n|\z)")
        .expect("valid frontmatter fence regex")
});

fn parse_with(markdown: &str, options: Options) -> Node {
    let parser = Parser::new_ext(markdown, options);
    let mut stack: Vec<Node> = vec![Node::new(NodeKind::Document)];

    for event in parser {
        match event {
            Event::Start(tag) => stack.push(Node::new(open(tag))),
            Event::End(_) => {
                let Some(mut node) = stack.pop() else {
                    continue;
                };
                close(&mut node);
                match stack.last_mut() {
                    Some(parent) => parent.push(node),
                    // Unbalanced end: keep the document on the stack
                    None => stack.push(node),
                }
            }
            Event::Text(text) => {
                let Some(top) = stack.last_mut() else {
                    continue;
                };
                match &mut top.kind {
                    NodeKind::Frontmatter { raw, .. } => raw.push_str(&text),
                    NodeKind::CodeBlock { code, .. } => code.push_str(&text),
                    _ => top.push(Node::new(NodeKind::Text(text.into_string()))),
                }
            }
            Event::Html(html) => {
                let Some(top) = stack.last_mut() else {
                    continue;
                };
                match &mut top.kind {
                    NodeKind::Html(raw) => raw.push_str(&html),
                    _ => top.push(Node::new(NodeKind::Html(html.into_string()))),
                }
            }
            other => {
                let leaf = match other {
                    Event::Code(code) => NodeKind::Code(code.into_string()),
                    Event::InlineMath(tex) => NodeKind::InlineMath(tex.into_string()),
                    Event::DisplayMath(tex) => NodeKind::DisplayMath(tex.into_string()),
                    Event::InlineHtml(html) => NodeKind::InlineHtml(html.into_string()),
                    Event::FootnoteReference(label) => NodeKind::Text(format!("[^{label}]")),
                    Event::SoftBreak => NodeKind::SoftBreak,
                    Event::HardBreak => NodeKind::HardBreak,
                    Event::Rule => NodeKind::Rule,
                    Event::TaskListMarker(checked) => NodeKind::TaskMarker(checked),
                    _ => continue,
                };
                if let Some(top) = stack.last_mut() {
                    top.push(Node::new(leaf));
                }
            }
        }
    }

    // Fold anything left open back into the document
    while stack.len() > 1 {
        if let Some(node) = stack.pop()
            && let Some(parent) = stack.last_mut()
        {
            parent.push(node);
        }
    }
    stack.pop().unwrap_or_else(|| Node::new(NodeKind::Document))
}

fn open(tag: Tag<'_>) -> NodeKind {
    match tag {
        Tag::MetadataBlock(_) => NodeKind::Frontmatter {
            raw: String::new(),
            data: None,
        },
        Tag::Paragraph => NodeKind::Paragraph { tight: false },
        Tag::Heading { level, .. } => NodeKind::Heading(level as u8),
        Tag::BlockQuote(_) => NodeKind::BlockQuote,
        Tag::CodeBlock(kind) => NodeKind::CodeBlock {
            info: match kind {
                CodeBlockKind::Fenced(info) => info.into_string(),
                CodeBlockKind::Indented => String::new(),
            },
            code: String::new(),
        },
        Tag::HtmlBlock => NodeKind::Html(String::new()),
        Tag::List(start) => NodeKind::List(start),
        Tag::Item => NodeKind::Item,
        Tag::Table(alignments) => NodeKind::Table(alignments),
        Tag::TableHead => NodeKind::TableHead,
        Tag::TableRow => NodeKind::TableRow,
        Tag::TableCell => NodeKind::TableCell,
        Tag::Emphasis => NodeKind::Emphasis,
        Tag::Strong => NodeKind::Strong,
        Tag::Strikethrough => NodeKind::Strikethrough,
        Tag::Link {
            dest_url, title, ..
        } => NodeKind::Link {
            dest: dest_url.into_string(),
            title: title.into_string(),
        },
        Tag::Image {
            dest_url, title, ..
        } => NodeKind::Image {
            dest: dest_url.into_string(),
            title: title.into_string(),
        },
        _ => NodeKind::Fragment,
    }
}

/// Finish a node once its end event arrives.
fn close(node: &mut Node) {
    match &mut node.kind {
        NodeKind::Frontmatter { raw, data } => {
            *data = decode_frontmatter(raw);
        }
        NodeKind::Item => group_tight_inlines(node),
        _ => {}
    }
}

/// Wrap runs of inline children of a list item into tight paragraphs, so
/// every item carries paragraphs whether the list is tight or loose.
fn group_tight_inlines(item: &mut Node) {
    if !item.children.iter().any(Node::is_inline) {
        return;
    }
    let children = std::mem::take(&mut item.children);
    let mut run: Option<Node> = None;
    for child in children {
        if child.is_inline() {
            run.get_or_insert_with(|| Node::new(NodeKind::Paragraph { tight: true }))
                .children
                .push(child);
        } else {
            if let Some(paragraph) = run.take() {
                item.children.push(paragraph);
            }
            item.children.push(child);
        }
    }
    if let Some(paragraph) = run {
        item.children.push(paragraph);
    }
}

static AUTOLINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://|www\.)[^\s<]*[^\s<?!.,:;*_~'\x22)\]]")
        .expect("valid autolink regex")
});

/// Turn bare `http(s)://` and `www.` URLs in text into links.
///
/// Text already inside links, images or code is left alone.
pub(crate) fn autolink(node: &mut Node) {
    if matches!(
        node.kind,
        NodeKind::Link { .. } | NodeKind::Image { .. } | NodeKind::Frontmatter { .. }
    ) {
        return;
    }
    let children = std::mem::take(&mut node.children);
    for mut child in children {
        if let NodeKind::Text(text) = &child.kind {
            node.children.extend(linkify(text));
        } else {
            autolink(&mut child);
            node.children.push(child);
        }
    }
}

fn linkify(text: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut cursor = 0;

    for m in AUTOLINK_RE.find_iter(text) {
        // www. links need a boundary before them
        let preceding = text[..m.start()].chars().next_back();
        if preceding.is_some_and(|c| !(c.is_whitespace() || "*_~(".contains(c))) {
            continue;
        }
        let url = m.as_str();
        if url.len() <= "www.".len() || url.ends_with("://") {
            continue;
        }
        if m.start() > cursor {
            nodes.push(Node::new(NodeKind::Text(text[cursor..m.start()].to_string())));
        }
        let dest = if url.to_ascii_lowercase().starts_with("www.") {
            format!("http://{url}")
        } else {
            url.to_string()
        };
        let mut link = Node::new(NodeKind::Link {
            dest,
            title: String::new(),
        });
        link.children.push(Node::new(NodeKind::Text(url.to_string())));
        nodes.push(link);
        cursor = m.end();
    }

    if cursor < text.len() {
        nodes.push(Node::new(NodeKind::Text(text[cursor..].to_string())));
    }
    nodes
}
