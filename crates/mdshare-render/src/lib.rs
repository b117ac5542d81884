//! # mdshare-render
//!
//! Renders untrusted markdown into sanitized HTML for an isolated preview
//! surface, and derives lightweight page metadata along the way.
//!
//! The pipeline, in order:
//! - **Parse**: CommonMark plus tables, task lists, strikethrough and math
//! - **Frontmatter**: a leading `---` YAML block becomes its own node and is
//!   rendered as a labeled `frontmatter-container` block
//! - **Autolinks**: bare `https://` and `www.` URLs become links
//! - **Metadata**: title and description, frontmatter first, then the first
//!   heading and paragraph
//! - **Sanitize**: raw HTML is re-parsed and filtered through an allow-list
//! - **Annotate**: code highlighting, MathML typesetting, heading anchors
//!
//! ## Example
//!
//! ```text
//! use mdshare_render::{render, RenderOptions};
//!
//! let markdown = "---\ntitle: Hello\n---\n# World\n\nSome text.";
//! let rendered = render(markdown, &RenderOptions::default()).await?;
//!
//! assert_eq!(rendered.metadata.title.as_deref(), Some("Hello"));
//! println!("{}", rendered.html);
//! ```

mod ast;
mod dom;
mod frontmatter;
mod handler;
mod headings;
mod highlight;
mod math;
mod metadata;
mod render;
mod sanitize;

pub use frontmatter::{Frontmatter, FrontmatterValue, decode_frontmatter};
pub use handler::{BoxedHandler, CodeBlockHandler, RawCodeHandler};
pub use headings::{Slugger, slugify};
pub use highlight::{detect_language, normalize_language};
pub use metadata::{DESCRIPTION_MAX_CHARS, Metadata, TITLE_MAX_CHARS, truncate};
pub use render::{RenderOptions, Rendered, convert, render};
pub use sanitize::{AttributeRule, PREVIEW_SCHEMA, Schema, sanitize_html};

#[cfg(feature = "highlight")]
pub use highlight::ArboriumHandler;

/// Error type for rendering operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The markdown parser failed on the input
    #[error("markdown parse error: {0}")]
    Parse(String),

    /// The HTML re-parse step failed
    #[error("html parse error: {0}")]
    Html(String),

    /// Code block handler failed
    #[error("code block handler error for language '{language}': {message}")]
    CodeBlockHandler { language: String, message: String },

    /// Math typesetting failed
    #[error("math error: {0}")]
    Math(String),
}

/// Result type alias for rendering operations.
pub type Result<T> = std::result::Result<T, Error>;
