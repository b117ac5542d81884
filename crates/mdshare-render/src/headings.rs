//! Heading anchors.

use std::collections::HashMap;

use crate::dom::Node;

/// Turn heading text into an anchor slug, GitHub style.
///
/// Lowercases, drops punctuation and turns each whitespace character into a
/// `-`. Letters and digits from any script are kept. Text with nothing
/// left to keep gives an empty slug; [`Slugger::slug`] turns that into
/// `heading`.
///
/// ```rust
/// use mdshare_render::slugify;
///
/// assert_eq!(slugify("Hello, World!"), "hello-world");
/// assert_eq!(slugify("snake_case and kebab-case"), "snake_case-and-kebab-case");
/// assert_eq!(slugify("?!"), "");
/// ```
pub fn slugify(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

/// Hands out unique slugs, suffixing repeats with `-1`, `-2`, ...
#[derive(Debug, Default, Clone)]
pub struct Slugger {
    occurrences: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slug `text`, unique among everything this slugger has produced.
    ///
    /// An empty slug (punctuation-only or blank text) falls back to
    /// `heading`, deduplicated like any other.
    pub fn slug(&mut self, text: &str) -> String {
        let mut base = slugify(text);
        if base.is_empty() {
            base = "heading".to_string();
        }
        let mut candidate = base.clone();
        while self.occurrences.contains_key(&candidate) {
            let count = self.occurrences.entry(base.clone()).or_default();
            *count += 1;
            candidate = format!("{base}-{count}");
        }
        self.occurrences.insert(candidate.clone(), 0);
        candidate
    }
}

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Give every heading without an `id` a unique slug id, in document order.
pub(crate) fn assign_ids(nodes: &mut [Node]) {
    let mut slugger = Slugger::new();
    walk(nodes, &mut slugger);
}

fn walk(nodes: &mut [Node], slugger: &mut Slugger) {
    for node in nodes {
        let Node::Element(el) = node else {
            continue;
        };
        if HEADING_TAGS.contains(&el.tag.as_str()) {
            if el.attr("id").is_none() {
                let text = el
                    .children
                    .iter()
                    .map(Node::text_content)
                    .collect::<String>();
                el.set_attr("id", slugger.slug(&text));
            }
        } else {
            walk(&mut el.children, slugger);
        }
    }
}
