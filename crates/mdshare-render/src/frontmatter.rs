//! Frontmatter decoding and rendering.
//!
//! A document may open with a YAML block delimited by `---` lines:
//!
//! ```markdown
//! ---
//! title: Release notes
//! date: 2024-01-15
//! tags: [rust, markdown]
//! ---
//!
//! # Content
//! ```
//!
//! The block is decoded into an ordered [`Frontmatter`] mapping and rendered
//! as a `frontmatter-container` div with one labeled row per key. Malformed
//! YAML never fails the conversion: the block simply decodes to nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use regex::Regex;
use yaml_rust2::Yaml;
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::dom::{Element, Node};

/// Class on the element wrapping all frontmatter rows.
pub(crate) const CONTAINER_CLASS: &str = "frontmatter-container";
/// Class on each key/value row.
pub(crate) const ROW_CLASS: &str = "frontmatter-row";
/// Class on the element holding the raw key.
pub(crate) const LABEL_CLASS: &str = "frontmatter-label";
/// Class on the element holding the display value.
pub(crate) const VALUE_CLASS: &str = "frontmatter-value";

/// Decoded frontmatter: keys in first-seen order.
///
/// Duplicate keys keep the position of their first occurrence and the value
/// of their last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    entries: IndexMap<String, FrontmatterValue>,
}

/// A single frontmatter value.
#[derive(Debug, Clone, PartialEq)]
pub enum FrontmatterValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// Plain scalars shaped like YAML timestamps
    Date(NaiveDateTime),
    Sequence(Vec<FrontmatterValue>),
    Mapping(Frontmatter),
}

impl Frontmatter {
    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&FrontmatterValue> {
        self.entries.get(key)
    }

    /// Look up a string-typed value by key.
    ///
    /// Returns `None` for keys holding numbers, dates, etc.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.entries.get(key)? {
            FrontmatterValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Iterate over entries in mapping order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FrontmatterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: String, value: FrontmatterValue) {
        // IndexMap::insert keeps the original slot for an existing key
        self.entries.insert(key, value);
    }
}

impl fmt::Display for FrontmatterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontmatterValue::Null => f.write_str("null"),
            FrontmatterValue::Bool(b) => write!(f, "{b}"),
            FrontmatterValue::Integer(i) => write!(f, "{i}"),
            FrontmatterValue::Float(x) if x.is_nan() => f.write_str("NaN"),
            FrontmatterValue::Float(x) if x.is_infinite() => {
                f.write_str(if *x > 0.0 { "Infinity" } else { "-Infinity" })
            }
            FrontmatterValue::Float(x) => write!(f, "{x}"),
            FrontmatterValue::String(s) => f.write_str(s),
            // Locale date, not ISO
            FrontmatterValue::Date(dt) => write!(f, "{}", dt.format("%-m/%-d/%Y")),
            FrontmatterValue::Sequence(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            FrontmatterValue::Mapping(map) => {
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                Ok(())
            }
        }
    }
}

/// Decode a raw frontmatter block (without delimiters).
///
/// Returns `None` when the YAML is malformed. Failure is all-or-nothing:
/// one bad key discards the whole block.
///
/// # Example
///
/// ```
/// use mdshare_render::decode_frontmatter;
///
/// let fm = decode_frontmatter("title: A\ntitle: B").unwrap();
/// assert_eq!(fm.len(), 1);
/// assert_eq!(fm.get_str("title"), Some("B"));
///
/// assert!(decode_frontmatter(": : :").is_none());
/// ```
pub fn decode_frontmatter(raw: &str) -> Option<Frontmatter> {
    if raw.trim().is_empty() {
        return Some(Frontmatter::default());
    }

    let mut builder = ValueBuilder::default();
    if let Err(e) = Parser::new_from_str(raw).load(&mut builder, false) {
        tracing::debug!(error = %e, "ignoring malformed frontmatter");
        return None;
    }
    if let Some(error) = builder.error {
        tracing::debug!(error, "ignoring malformed frontmatter");
        return None;
    }

    match builder.root {
        Some(FrontmatterValue::Mapping(map)) => Some(map),
        Some(FrontmatterValue::Sequence(items)) => {
            let mut map = Frontmatter::default();
            for (index, item) in items.into_iter().enumerate() {
                map.insert(index.to_string(), item);
            }
            Some(map)
        }
        // A bare scalar decodes fine but carries no keys
        _ => Some(Frontmatter::default()),
    }
}

/// Build the rendering-tree block for a decoded frontmatter mapping.
///
/// An absent or empty mapping still yields an (empty) container, so every
/// frontmatter node maps to exactly one output node.
pub(crate) fn render_frontmatter(frontmatter: Option<&Frontmatter>) -> Node {
    let mut container = Element::new("div").with_attr("class", CONTAINER_CLASS);

    for (key, value) in frontmatter.into_iter().flat_map(Frontmatter::iter) {
        let label = Element::new("div")
            .with_attr("class", LABEL_CLASS)
            .with_child(Node::text(key));
        let display = Element::new("div")
            .with_attr("class", VALUE_CLASS)
            .with_child(Node::text(value.to_string()));
        let row = Element::new("div")
            .with_attr("class", ROW_CLASS)
            .with_child(Node::Element(label))
            .with_child(Node::Element(display));
        container.children.push(Node::Element(row));
    }

    Node::Element(container)
}

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        concat!(
            r"^\d{4}-\d{1,2}-\d{1,2}",
            r"(?:(?:[Tt]|[ \t]+)\d{1,2}:\d{2}:\d{2}(?:\.\d*)?",
            r"(?:[ \t]*(?:Z|[-+]\d{1,2}(?::?\d{2})?))?)?$",
        ),
    )
    .expect("valid timestamp regex")
});

/// Parse a scalar that looks like a YAML timestamp.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if !TIMESTAMP_RE.is_match(s) {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    let normalized = s.replacen(['t', ' ', '\t'], "T", 1);
    let normalized = normalized.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(normalized, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// Scalar resolution for one event.
///
/// Only plain scalars are typed; quoted and block scalars are always strings.
fn resolve_scalar(raw: &str, style: TScalarStyle) -> FrontmatterValue {
    if !matches!(style, TScalarStyle::Plain) {
        return FrontmatterValue::String(raw.to_string());
    }
    if let Some(dt) = parse_timestamp(raw) {
        return FrontmatterValue::Date(dt);
    }
    match Yaml::from_str(raw) {
        Yaml::Integer(i) => FrontmatterValue::Integer(i),
        real @ Yaml::Real(_) => real
            .as_f64()
            .map_or_else(|| FrontmatterValue::String(raw.to_string()), FrontmatterValue::Float),
        Yaml::Boolean(b) => FrontmatterValue::Bool(b),
        Yaml::Null => FrontmatterValue::Null,
        _ => FrontmatterValue::String(raw.to_string()),
    }
}

enum Frame {
    Sequence {
        items: Vec<FrontmatterValue>,
        anchor: usize,
    },
    Mapping {
        map: Frontmatter,
        key: Option<String>,
        anchor: usize,
    },
}

/// Builds a [`FrontmatterValue`] from parser events.
#[derive(Default)]
struct ValueBuilder {
    stack: Vec<Frame>,
    anchors: HashMap<usize, FrontmatterValue>,
    root: Option<FrontmatterValue>,
    error: Option<&'static str>,
}

impl ValueBuilder {
    fn expects_key(&self) -> bool {
        matches!(self.stack.last(), Some(Frame::Mapping { key: None, .. }))
    }

    fn set_key(&mut self, key: String) {
        if let Some(Frame::Mapping { key: slot, .. }) = self.stack.last_mut() {
            *slot = Some(key);
        }
    }

    fn key_from(&mut self, value: &FrontmatterValue, raw: Option<String>) {
        match value {
            FrontmatterValue::Null => self.error = Some("empty mapping key"),
            FrontmatterValue::Sequence(_) | FrontmatterValue::Mapping(_) => {
                self.error = Some("non-scalar mapping key")
            }
            _ => self.set_key(raw.unwrap_or_else(|| value.to_string())),
        }
    }

    fn complete(&mut self, value: FrontmatterValue, anchor: usize) {
        if anchor > 0 {
            self.anchors.insert(anchor, value.clone());
        }
        match self.stack.last_mut() {
            None => self.root = Some(value),
            Some(Frame::Sequence { items, .. }) => items.push(value),
            Some(Frame::Mapping { map, key, .. }) => {
                if let Some(key) = key.take() {
                    map.insert(key, value);
                }
            }
        }
    }

    fn open(&mut self, frame: Frame) {
        if self.expects_key() {
            self.error = Some("non-scalar mapping key");
        } else {
            self.stack.push(frame);
        }
    }
}

impl MarkedEventReceiver for ValueBuilder {
    fn on_event(&mut self, ev: Event, _marker: Marker) {
        if self.error.is_some() {
            return;
        }
        match ev {
            Event::Scalar(raw, style, anchor, _tag) => {
                let value = resolve_scalar(&raw, style);
                if self.expects_key() {
                    if anchor > 0 {
                        self.anchors.insert(anchor, value.clone());
                    }
                    self.key_from(&value, Some(raw));
                } else {
                    self.complete(value, anchor);
                }
            }
            Event::SequenceStart(anchor, _tag) => self.open(Frame::Sequence {
                items: Vec::new(),
                anchor,
            }),
            Event::MappingStart(anchor, _tag) => self.open(Frame::Mapping {
                map: Frontmatter::default(),
                key: None,
                anchor,
            }),
            Event::SequenceEnd | Event::MappingEnd => match self.stack.pop() {
                Some(Frame::Sequence { items, anchor }) => {
                    self.complete(FrontmatterValue::Sequence(items), anchor)
                }
                Some(Frame::Mapping { map, anchor, .. }) => {
                    self.complete(FrontmatterValue::Mapping(map), anchor)
                }
                None => self.error = Some("unbalanced collection"),
            },
            Event::Alias(id) => {
                let target = self.anchors.get(&id).cloned();
                match target {
                    Some(value) if self.expects_key() => self.key_from(&value, None),
                    Some(value) => self.complete(value, 0),
                    None => self.error = Some("unknown alias"),
                }
            }
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}
        }
    }
}
