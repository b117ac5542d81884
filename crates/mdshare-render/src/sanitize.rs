//! HTML sanitization by allow-list.
//!
//! The policy is a [`Schema`]: plain tables of tag names, attribute rules,
//! URL protocols and the like. [`Schema::sanitizer`] compiles it into an
//! [`ammonia::Builder`], which does the actual parsing and filtering.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use ammonia::{Builder, UrlRelative};

use crate::Result;
use crate::dom::{self, Node};
use crate::frontmatter::{CONTAINER_CLASS, LABEL_CLASS, ROW_CLASS, VALUE_CLASS};

/// Class tokens used by the rendered frontmatter block.
pub(crate) const FRONTMATTER_CLASSES: &[&str] =
    &[CONTAINER_CLASS, ROW_CLASS, LABEL_CLASS, VALUE_CLASS];

/// Upper bound on clean passes while waiting for the output to settle.
const MAX_PASSES: usize = 8;

/// What values an allowed attribute may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRule {
    /// Any value
    Any(&'static str),
    /// Exactly this value
    Exact(&'static str, &'static str),
    /// Space-separated tokens, keeping only the listed ones
    Tokens(&'static str, &'static [&'static str]),
    /// Space-separated tokens, keeping only those with this prefix
    Prefix(&'static str, &'static str),
}

impl AttributeRule {
    /// The attribute this rule applies to.
    pub fn name(&self) -> &'static str {
        match self {
            AttributeRule::Any(name)
            | AttributeRule::Exact(name, _)
            | AttributeRule::Tokens(name, _)
            | AttributeRule::Prefix(name, _) => name,
        }
    }

    /// Filter a value through the rule; `None` drops the attribute.
    fn apply(&self, value: &str) -> Option<String> {
        let keep_tokens = |keep: &dyn Fn(&str) -> bool| {
            let kept: Vec<&str> = value.split_ascii_whitespace().filter(|t| keep(t)).collect();
            (!kept.is_empty()).then(|| kept.join(" "))
        };
        match self {
            AttributeRule::Any(_) => Some(value.to_string()),
            AttributeRule::Exact(_, expected) => {
                value.eq_ignore_ascii_case(expected).then(|| expected.to_string())
            }
            AttributeRule::Tokens(_, allowed) => keep_tokens(&|t| allowed.contains(&t)),
            AttributeRule::Prefix(_, prefix) => keep_tokens(&|t| t.starts_with(prefix)),
        }
    }
}

/// A sanitization policy.
///
/// Table parts (`tr`, `td`, ...) need no ancestor rules here: the HTML
/// parser already drops them outside a `<table>`.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Elements kept as-is (subject to attribute filtering)
    pub tag_names: HashSet<&'static str>,
    /// Elements removed together with their content
    pub strip: HashSet<&'static str>,
    /// Attributes allowed on every kept element
    pub global_attributes: Vec<AttributeRule>,
    /// Attributes allowed per element
    pub attributes: HashMap<&'static str, Vec<AttributeRule>>,
    /// Attributes forced to a value on an element
    pub required: HashMap<&'static str, Vec<(&'static str, &'static str)>>,
    /// URL-valued attributes and the schemes they may use
    pub protocols: HashMap<&'static str, &'static [&'static str]>,
    /// Attributes whose values get [`Schema::clobber_prefix`]
    pub clobber: HashSet<&'static str>,
    pub clobber_prefix: &'static str,
}

impl Schema {
    /// The GitHub-flavored safe subset.
    pub fn github() -> Self {
        const TAGS: &[&str] = &[
            "a", "b", "blockquote", "br", "code", "dd", "del", "details", "div", "dl", "dt", "em",
            "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "input", "ins", "kbd", "li",
            "ol", "p", "picture", "pre", "q", "rp", "rt", "ruby", "s", "samp", "section",
            "source", "span", "strike", "strong", "sub", "summary", "sup", "table", "tbody", "td",
            "tfoot", "th", "thead", "tr", "tt", "ul", "var",
        ];
        const GLOBAL: &[&str] = &[
            "abbr", "accept", "accept-charset", "accesskey", "action", "align", "alt", "axis",
            "border", "cellpadding", "cellspacing", "char", "charoff", "charset", "checked",
            "clear", "cols", "colspan", "color", "compact", "coords", "datetime", "dir",
            "enctype", "frame", "headers", "height", "hreflang", "hspace", "ismap", "itemprop",
            "label", "lang", "maxlength", "media", "method", "multiple", "name", "nohref",
            "noshade", "nowrap", "open", "prompt", "readonly", "rev", "rows", "rowspan", "rules",
            "scope", "selected", "shape", "size", "span", "start", "summary", "tabindex", "title",
            "usemap", "valign", "value", "width", "id", "for",
        ];
        const HTTP: &[&str] = &["http", "https"];
        const HREF: &[&str] = &["http", "https", "irc", "ircs", "mailto", "xmpp"];

        let mut attributes: HashMap<&'static str, Vec<AttributeRule>> = HashMap::new();
        attributes.insert(
            "a",
            vec![
                AttributeRule::Any("aria-describedby"),
                AttributeRule::Any("aria-label"),
                AttributeRule::Any("aria-labelledby"),
                AttributeRule::Any("href"),
            ],
        );
        for tag in ["blockquote", "del", "ins", "q"] {
            attributes.insert(tag, vec![AttributeRule::Any("cite")]);
        }
        attributes.insert("code", vec![AttributeRule::Prefix("class", "language-")]);
        attributes.insert(
            "div",
            vec![AttributeRule::Any("itemscope"), AttributeRule::Any("itemtype")],
        );
        attributes.insert("h2", vec![AttributeRule::Tokens("class", &["sr-only"])]);
        attributes.insert(
            "img",
            vec![AttributeRule::Any("longdesc"), AttributeRule::Any("src")],
        );
        attributes.insert(
            "input",
            vec![
                AttributeRule::Any("disabled"),
                AttributeRule::Exact("type", "checkbox"),
            ],
        );
        attributes.insert("li", vec![AttributeRule::Tokens("class", &["task-list-item"])]);
        for tag in ["ol", "ul"] {
            attributes.insert(tag, vec![AttributeRule::Tokens("class", &["contains-task-list"])]);
        }
        attributes.insert("section", vec![AttributeRule::Tokens("class", &["footnotes"])]);

        Self {
            tag_names: TAGS.iter().copied().collect(),
            strip: HashSet::from(["script", "style"]),
            global_attributes: GLOBAL.iter().copied().map(AttributeRule::Any).collect(),
            attributes,
            required: HashMap::from([("input", vec![("disabled", ""), ("type", "checkbox")])]),
            protocols: HashMap::from([
                ("href", HREF),
                ("cite", HTTP),
                ("src", HTTP),
                ("longdesc", HTTP),
            ]),
            clobber: HashSet::from(["id", "name", "aria-describedby", "aria-labelledby"]),
            clobber_prefix: "user-content-",
        }
    }

    /// Allow one more attribute rule on a tag, allowing the tag as well.
    pub fn allow(mut self, tag: &'static str, rule: AttributeRule) -> Self {
        self.tag_names.insert(tag);
        self.attributes.entry(tag).or_default().push(rule);
        self
    }

    /// Compile the schema into an ammonia builder.
    ///
    /// Class token lists map onto ammonia's `allowed_classes`; exact, prefix
    /// and per-attribute protocol rules run in its attribute filter.
    pub fn sanitizer(&self) -> Builder<'static> {
        let mut tag_attributes: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
        let mut allowed_classes: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
        for (&tag, rules) in &self.attributes {
            for rule in rules {
                match rule {
                    AttributeRule::Tokens("class", tokens) => {
                        allowed_classes
                            .entry(tag)
                            .or_default()
                            .extend(tokens.iter().copied());
                    }
                    rule => {
                        tag_attributes.entry(tag).or_default().insert(rule.name());
                    }
                }
            }
        }

        let mut builder = Builder::empty();
        builder
            .tags(self.tag_names.clone())
            .clean_content_tags(self.strip.clone())
            .generic_attributes(self.global_attributes.iter().map(AttributeRule::name).collect())
            .tag_attributes(tag_attributes)
            .allowed_classes(allowed_classes)
            .url_schemes(
                self.protocols
                    .values()
                    .flat_map(|schemes| schemes.iter().copied())
                    .collect(),
            )
            .url_relative(UrlRelative::PassThrough)
            .link_rel(None)
            .strip_comments(true);
        if self.clobber.contains("id") {
            builder.id_prefix(Some(self.clobber_prefix));
        }
        for (&tag, values) in &self.required {
            for &(attr, value) in values {
                builder.set_tag_attribute_value(tag, attr, value);
            }
        }

        let schema = self.clone();
        builder.attribute_filter(move |tag, attr, value| schema.filter_attribute(tag, attr, value));
        builder
    }

    fn rule_for(&self, tag: &str, attr: &str) -> Option<&AttributeRule> {
        self.attributes
            .get(tag)
            .and_then(|rules| rules.iter().find(|rule| rule.name() == attr))
            .or_else(|| self.global_attributes.iter().find(|rule| rule.name() == attr))
    }

    fn filter_attribute<'u>(&self, tag: &str, attr: &str, value: &'u str) -> Option<Cow<'u, str>> {
        let mut value = match self.rule_for(tag, attr) {
            None | Some(AttributeRule::Any(_)) => Cow::Borrowed(value),
            Some(rule) => Cow::Owned(rule.apply(value)?),
        };
        if !self.protocol_allowed(attr, &value) {
            return None;
        }
        // `id` is prefixed by the builder
        if attr != "id" && self.clobber.contains(attr) && !value.starts_with(self.clobber_prefix) {
            value = Cow::Owned(format!("{}{value}", self.clobber_prefix));
        }
        Some(value)
    }

    fn protocol_allowed(&self, attr: &str, url: &str) -> bool {
        let Some(allowed) = self.protocols.get(attr) else {
            return true;
        };
        let url = url.trim();
        let Some(colon) = url.find(':') else {
            return true;
        };
        // A slash, query or fragment before the colon makes it a relative URL
        if url[..colon].contains(['/', '?', '#']) {
            return true;
        }
        let scheme = url[..colon].to_ascii_lowercase();
        allowed.contains(&scheme.as_str())
    }
}

/// The policy applied to rendered previews: the GitHub subset plus the
/// frontmatter block's classes.
pub static PREVIEW_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::github().allow("div", AttributeRule::Tokens("class", FRONTMATTER_CLASSES))
});

/// [`PREVIEW_SCHEMA`], compiled once.
pub(crate) static PREVIEW_SANITIZER: LazyLock<Builder<'static>> =
    LazyLock::new(|| PREVIEW_SCHEMA.sanitizer());

/// Sanitize an HTML fragment with [`PREVIEW_SCHEMA`].
///
/// # Example
///
/// ```rust
/// use mdshare_render::sanitize_html;
///
/// let html = sanitize_html("<p onclick=\"x()\">hi<script>alert(1)</script></p>");
/// assert_eq!(html, "<p>hi</p>");
/// ```
pub fn sanitize_html(html: &str) -> String {
    clean_until_stable(&PREVIEW_SANITIZER, html)
}

/// Serialize a rendering tree, clean it and parse the result back.
///
/// Raw nodes become real elements here, so they go through the same policy
/// as everything else.
pub(crate) fn sanitize_tree(sanitizer: &Builder<'_>, nodes: &[Node]) -> Result<Vec<Node>> {
    let html = clean_until_stable(sanitizer, &dom::to_html(nodes));
    dom::parse_fragment(&html)
}

/// Clean until a pass changes nothing.
///
/// Unwrapping can leave markup the parser rearranges on the next read (a
/// paragraph pulled out of a `<caption>` lands directly in its `<table>`),
/// so a single pass is not always a fixed point.
fn clean_until_stable(sanitizer: &Builder<'_>, html: &str) -> String {
    let mut current = sanitizer.clean(html).to_string();
    for _ in 1..MAX_PASSES {
        let next = sanitizer.clean(&current).to_string();
        if next == current {
            break;
        }
        current = next;
    }
    current
}
