//! Rendering tree: the HTML side of the pipeline.
//!
//! The syntax tree is lowered into [`Node`]s here. Raw HTML from the
//! document survives as [`Node::Raw`] until the sanitize stage serializes the
//! whole tree and re-parses it with html5ever, at which point every node is a
//! real element or text again.

use pulldown_cmark::Alignment;

use crate::ast::{self, NodeKind};
use crate::frontmatter::render_frontmatter;
use crate::{Error, Result};

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
    /// Unparsed HTML, emitted verbatim
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Node {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub(crate) fn raw(html: impl Into<String>) -> Self {
        Node::Raw(html.into())
    }

    /// Concatenated text of this node and its descendants.
    pub(crate) fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Raw(_) => {}
            Node::Element(el) => {
                for child in &el.children {
                    child.collect_text(out);
                }
            }
        }
    }
}

impl Element {
    pub(crate) fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub(crate) fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub(crate) fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub(crate) fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub(crate) fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    pub(crate) fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag.as_str())
    }
}

// ============================================================================
// Lowering from the syntax tree
// ============================================================================

/// Lower a syntax tree into rendering nodes.
pub(crate) fn from_syntax(node: &ast::Node) -> Vec<Node> {
    let mut out = Vec::new();
    lower(node, &mut out);
    out
}

fn lower_children(node: &ast::Node) -> Vec<Node> {
    let mut out = Vec::new();
    for child in &node.children {
        lower(child, &mut out);
    }
    out
}

fn element(tag: &str, node: &ast::Node) -> Node {
    Node::Element(Element::new(tag).with_children(lower_children(node)))
}

fn lower(node: &ast::Node, out: &mut Vec<Node>) {
    match &node.kind {
        NodeKind::Document | NodeKind::Fragment => out.extend(lower_children(node)),
        NodeKind::Frontmatter { data, .. } => out.push(render_frontmatter(data.as_ref())),
        NodeKind::Heading(level) => out.push(element(&format!("h{level}"), node)),
        NodeKind::Paragraph { tight } => lower_paragraph(node, *tight, out),
        NodeKind::BlockQuote => out.push(element("blockquote", node)),
        NodeKind::CodeBlock { info, code } => {
            let mut code_el = Element::new("code");
            if let Some(lang) = info.split_whitespace().next() {
                code_el.set_attr("class", format!("language-{lang}"));
            }
            code_el.children.push(Node::text(code.clone()));
            out.push(Node::Element(
                Element::new("pre").with_child(Node::Element(code_el)),
            ));
        }
        NodeKind::List(start) => {
            let mut list = match start {
                Some(start) => {
                    let el = Element::new("ol");
                    if *start != 1 {
                        el.with_attr("start", start.to_string())
                    } else {
                        el
                    }
                }
                None => Element::new("ul"),
            };
            if node.children.iter().any(|item| task_marker(item).is_some()) {
                list.set_attr("class", "contains-task-list");
            }
            list.children = lower_children(node);
            out.push(Node::Element(list));
        }
        NodeKind::Item => {
            let mut item = Element::new("li");
            if task_marker(node).is_some() {
                item.set_attr("class", "task-list-item");
            }
            item.children = lower_children(node);
            out.push(Node::Element(item));
        }
        NodeKind::TaskMarker(checked) => {
            let mut input = Element::new("input")
                .with_attr("type", "checkbox")
                .with_attr("disabled", "");
            if *checked {
                input.set_attr("checked", "");
            }
            out.push(Node::Element(input));
            out.push(Node::text(" "));
        }
        NodeKind::Table(alignments) => out.push(lower_table(node, alignments)),
        // Rows and cells are handled by lower_table
        NodeKind::TableHead | NodeKind::TableRow | NodeKind::TableCell => {
            out.extend(lower_children(node));
        }
        NodeKind::Emphasis => out.push(element("em", node)),
        NodeKind::Strong => out.push(element("strong", node)),
        NodeKind::Strikethrough => out.push(element("del", node)),
        NodeKind::Link { dest, title } => {
            let mut link = Element::new("a").with_attr("href", dest.clone());
            if !title.is_empty() {
                link.set_attr("title", title.clone());
            }
            link.children = lower_children(node);
            out.push(Node::Element(link));
        }
        NodeKind::Image { dest, title } => {
            let mut img = Element::new("img")
                .with_attr("src", dest.clone())
                .with_attr("alt", node.text_content());
            if !title.is_empty() {
                img.set_attr("title", title.clone());
            }
            out.push(Node::Element(img));
        }
        NodeKind::Text(text) => out.push(Node::text(text.clone())),
        NodeKind::Code(code) => out.push(Node::Element(
            Element::new("code").with_child(Node::text(code.clone())),
        )),
        NodeKind::InlineMath(tex) => out.push(math_code(tex)),
        NodeKind::DisplayMath(tex) => out.push(Node::Element(
            Element::new("pre").with_child(math_code(tex)),
        )),
        NodeKind::Html(html) | NodeKind::InlineHtml(html) => out.push(Node::raw(html.clone())),
        NodeKind::SoftBreak => out.push(Node::text("\n")),
        NodeKind::HardBreak => {
            out.push(Node::Element(Element::new("br")));
            out.push(Node::text("\n"));
        }
        NodeKind::Rule => out.push(Node::Element(Element::new("hr"))),
    }
}

fn math_code(tex: &str) -> Node {
    Node::Element(
        Element::new("code")
            .with_attr("class", "language-math")
            .with_child(Node::text(tex)),
    )
}

/// Display math is block-level, so a paragraph holding it is split around
/// the math instead of nesting a `<pre>` inside `<p>`.
fn lower_paragraph(node: &ast::Node, tight: bool, out: &mut Vec<Node>) {
    let mut run: Vec<Node> = Vec::new();
    let flush = |run: &mut Vec<Node>, out: &mut Vec<Node>| {
        let blank = run
            .iter()
            .all(|n| matches!(n, Node::Text(t) if t.trim().is_empty()));
        if blank {
            run.clear();
        } else if tight {
            out.append(run);
        } else {
            out.push(Node::Element(
                Element::new("p").with_children(run.drain(..)),
            ));
        }
    };

    for child in &node.children {
        if matches!(child.kind, NodeKind::DisplayMath(_)) {
            flush(&mut run, out);
            lower(child, out);
        } else {
            lower(child, &mut run);
        }
    }
    flush(&mut run, out);
}

fn task_marker(item: &ast::Node) -> Option<bool> {
    let first = item.children.first()?;
    match &first.kind {
        NodeKind::TaskMarker(checked) => Some(*checked),
        NodeKind::Paragraph { .. } => match first.children.first()?.kind {
            NodeKind::TaskMarker(checked) => Some(checked),
            _ => None,
        },
        _ => None,
    }
}

fn lower_table(node: &ast::Node, alignments: &[Alignment]) -> Node {
    let row = |cells: &[ast::Node], cell_tag: &str| {
        let mut tr = Element::new("tr");
        for (index, cell) in cells.iter().enumerate() {
            let mut td = Element::new(cell_tag);
            match alignments.get(index) {
                Some(Alignment::Left) => td.set_attr("align", "left"),
                Some(Alignment::Center) => td.set_attr("align", "center"),
                Some(Alignment::Right) => td.set_attr("align", "right"),
                _ => {}
            }
            td.children = lower_children(cell);
            tr.children.push(Node::Element(td));
        }
        Node::Element(tr)
    };

    let mut table = Element::new("table");
    let mut body = Element::new("tbody");
    for child in &node.children {
        match child.kind {
            NodeKind::TableHead => {
                table.children.push(Node::Element(
                    Element::new("thead").with_child(row(&child.children, "th")),
                ));
            }
            NodeKind::TableRow => body.children.push(row(&child.children, "td")),
            _ => {}
        }
    }
    if !body.children.is_empty() {
        table.children.push(Node::Element(body));
    }
    Node::Element(table)
}

// ============================================================================
// HTML parsing
// ============================================================================

/// Parse an HTML fragment as the children of a `<body>` element.
///
/// Comments, doctypes and processing instructions are dropped; whitespace
/// text is kept so preformatted content survives.
pub(crate) fn parse_fragment(html: &str) -> Result<Vec<Node>> {
    use html5ever::tendril::TendrilSink;
    use html5ever::{ParseOpts, QualName, ns, parse_fragment};
    use markup5ever_rcdom::RcDom;

    let context = QualName::new(None, ns!(html), "body".into());
    let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context, vec![], false)
        .from_utf8()
        .read_from(&mut html.as_bytes())
        .map_err(|e| Error::Html(e.to_string()))?;

    // The fragment lands under a synthetic <html> element
    let document = dom.document.children.borrow();
    let Some(root) = document
        .iter()
        .find(|handle| matches!(handle.data, markup5ever_rcdom::NodeData::Element { .. }))
    else {
        return Ok(Vec::new());
    };
    let children = root.children.borrow();
    Ok(children.iter().filter_map(convert_rcdom_node).collect())
}

fn convert_rcdom_node(handle: &markup5ever_rcdom::Handle) -> Option<Node> {
    use markup5ever_rcdom::NodeData;

    match &handle.data {
        NodeData::Element { name, attrs, .. } => {
            let mut element = Element::new(name.local.to_string());
            for attr in attrs.borrow().iter() {
                element.set_attr(attr.name.local.to_string(), attr.value.to_string());
            }
            element.children = handle
                .children
                .borrow()
                .iter()
                .filter_map(convert_rcdom_node)
                .collect();
            Some(Node::Element(element))
        }
        NodeData::Text { contents } => Some(Node::Text(contents.borrow().to_string())),
        NodeData::Document
        | NodeData::Comment { .. }
        | NodeData::Doctype { .. }
        | NodeData::ProcessingInstruction { .. } => None,
    }
}

// ============================================================================
// Serialization
// ============================================================================

/// Serialize nodes to an HTML string.
pub(crate) fn to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(node, &mut out);
    }
    out
}

fn write_node(node: &Node, out: &mut String) {
    match node {
        Node::Text(text) => out.push_str(&html_escape::encode_text(text)),
        Node::Raw(html) => out.push_str(html),
        Node::Element(el) => {
            out.push('<');
            out.push_str(&el.tag);
            for (name, value) in &el.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(value));
                out.push('"');
            }
            out.push('>');
            if el.is_void() {
                return;
            }
            // The parser eats one leading newline in these elements
            if matches!(el.tag.as_str(), "pre" | "textarea" | "listing")
                && matches!(el.children.first(), Some(Node::Text(t)) if t.starts_with('\n'))
            {
                out.push('\n');
            }
            for child in &el.children {
                write_node(child, out);
            }
            out.push_str("</");
            out.push_str(&el.tag);
            out.push('>');
        }
    }
}
