//! Main rendering pipeline.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::trace;

use crate::handler::{BoxedHandler, CodeBlockHandler};
use crate::metadata::{self, DESCRIPTION_MAX_CHARS, Metadata, TITLE_MAX_CHARS};
use crate::sanitize::{self, PREVIEW_SANITIZER};
use crate::{Error, Result, ast, dom, headings, highlight, math};

/// Options for rendering markdown.
pub struct RenderOptions {
    /// Code block handlers keyed by language
    pub code_handlers: HashMap<String, BoxedHandler>,

    /// Handler for languages without a specific handler
    pub default_handler: Option<BoxedHandler>,

    /// Run code blocks through their handlers
    pub highlight: bool,

    /// Guess the language of unlabeled code blocks
    pub detect_language: bool,

    /// Typeset `$...$` and `$$...$$` as MathML
    pub math: bool,

    /// Link bare URLs
    pub autolinks: bool,

    pub title_max_chars: usize,
    pub description_max_chars: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            code_handlers: HashMap::new(),
            default_handler: None,
            highlight: true,
            detect_language: true,
            math: true,
            autolinks: true,
            title_max_chars: TITLE_MAX_CHARS,
            description_max_chars: DESCRIPTION_MAX_CHARS,
        }
    }
}

impl RenderOptions {
    /// Create new render options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one or more languages.
    pub fn with_handler<H: CodeBlockHandler + 'static>(
        mut self,
        languages: &[&str],
        handler: H,
    ) -> Self {
        let handler: BoxedHandler = Arc::new(handler);
        for language in languages {
            self.code_handlers
                .insert(language.to_string(), Arc::clone(&handler));
        }
        self
    }

    /// Set the default handler for unregistered languages.
    pub fn with_default_handler<H: CodeBlockHandler + 'static>(mut self, handler: H) -> Self {
        self.default_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_highlighting(mut self, enabled: bool) -> Self {
        self.highlight = enabled;
        self
    }

    pub fn with_language_detection(mut self, enabled: bool) -> Self {
        self.detect_language = enabled;
        self
    }

    pub fn with_math(mut self, enabled: bool) -> Self {
        self.math = enabled;
        self
    }

    pub fn with_autolinks(mut self, enabled: bool) -> Self {
        self.autolinks = enabled;
        self
    }

    /// Override the title and description length caps.
    pub fn with_metadata_limits(
        mut self,
        title_max_chars: usize,
        description_max_chars: usize,
    ) -> Self {
        self.title_max_chars = title_max_chars;
        self.description_max_chars = description_max_chars;
        self
    }
}

/// A rendered markdown document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rendered {
    /// Sanitized, annotated HTML
    pub html: String,

    /// Title and description
    pub metadata: Metadata,
}

/// Render markdown to sanitized HTML plus metadata.
///
/// Spans that fail to annotate (bad math, a failing code handler) degrade to
/// their escaped source; only a parser or HTML re-parse failure is an error.
///
/// # Example
///
/// ```rust,ignore
/// use mdshare_render::{render, RenderOptions};
///
/// let markdown = "---\ntitle: Hello\n---\n# World\nSome text.";
/// let rendered = render(markdown, &RenderOptions::default()).await?;
///
/// assert_eq!(rendered.metadata.title.as_deref(), Some("Hello"));
/// assert!(rendered.html.contains("<h1 id=\"world\">World</h1>"));
/// ```
pub async fn render(markdown: &str, options: &RenderOptions) -> Result<Rendered> {
    let started = Instant::now();

    // 1. Parse, frontmatter included
    let mut tree = catch_unwind(AssertUnwindSafe(|| ast::parse(markdown)))
        .map_err(|_| Error::Parse("markdown parser panicked".to_string()))?;

    // 2. Syntax extensions the parser doesn't cover
    if options.autolinks {
        ast::autolink(&mut tree);
    }

    // 3. Metadata, read-only over the syntax tree
    let metadata = metadata::extract(
        &tree,
        options.title_max_chars,
        options.description_max_chars,
    );

    // 4. Lower to HTML nodes and sanitize
    let lowered = dom::from_syntax(&tree);
    let mut nodes = sanitize::sanitize_tree(&PREVIEW_SANITIZER, &lowered)?;
    trace!(elapsed = ?started.elapsed(), "parsed and sanitized");

    // 5. Annotate
    if options.highlight {
        highlight::highlight_code_blocks(&mut nodes, options).await;
    }
    if options.math {
        math::typeset_math(&mut nodes);
    }
    headings::assign_ids(&mut nodes);

    let html = dom::to_html(&nodes);
    trace!(elapsed = ?started.elapsed(), bytes = html.len(), "rendered markdown");

    Ok(Rendered { html, metadata })
}

/// Render with default options.
pub async fn convert(markdown: &str) -> Result<Rendered> {
    render(markdown, &RenderOptions::default()).await
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use super::*;

    struct Tagged;

    impl CodeBlockHandler for Tagged {
        fn render<'a>(
            &'a self,
            language: &'a str,
            code: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
            Box::pin(async move { Ok(format!("<span class=\"hl-{language}\">{code}</span>")) })
        }
    }

    #[tokio::test]
    async fn test_render_simple() {
        let doc = convert("# Hello\n\nWorld.").await.unwrap();

        assert_eq!(doc.html, "<h1 id=\"hello\">Hello</h1><p>World.</p>");
        assert_eq!(doc.metadata.title.as_deref(), Some("Hello"));
        assert_eq!(doc.metadata.description.as_deref(), Some("World."));
    }

    #[tokio::test]
    async fn test_render_with_frontmatter() {
        let doc = convert("---\ntitle: Hello\n---\n# World\nSome text.")
            .await
            .unwrap();

        assert_eq!(
            doc.html,
            "<div class=\"frontmatter-container\"><div class=\"frontmatter-row\">\
             <div class=\"frontmatter-label\">title</div>\
             <div class=\"frontmatter-value\">Hello</div></div></div>\
             <h1 id=\"world\">World</h1><p>Some text.</p>"
        );
        assert_eq!(doc.metadata.title.as_deref(), Some("Hello"));
        assert_eq!(doc.metadata.description.as_deref(), Some("Some text."));
    }

    #[tokio::test]
    async fn test_malformed_frontmatter_renders_empty_container() {
        let doc = convert("---\n: : :\n---\n# Fallback").await.unwrap();

        assert_eq!(
            doc.html,
            "<div class=\"frontmatter-container\"></div><h1 id=\"fallback\">Fallback</h1>"
        );
        assert_eq!(doc.metadata.title.as_deref(), Some("Fallback"));
    }

    #[tokio::test]
    async fn test_render_code_block_with_handler() {
        let options = RenderOptions::new().with_handler(&["rust", "rs"], Tagged);
        let doc = render("```rs\nfn main() {}\n```\n", &options).await.unwrap();

        assert_eq!(
            doc.html,
            "<pre><code class=\"language-rs\"><span class=\"hl-rs\">fn main() {}\n</span></code></pre>"
        );
    }

    #[tokio::test]
    async fn test_highlighting_disabled_keeps_escaped_code() {
        let options = RenderOptions::new()
            .with_default_handler(Tagged)
            .with_highlighting(false);
        let doc = render("```\na < b\n```\n", &options).await.unwrap();

        assert_eq!(doc.html, "<pre><code>a &lt; b\n</code></pre>");
    }

    #[tokio::test]
    async fn test_raw_html_is_sanitized() {
        let doc = convert("<div onclick=\"steal()\">hi <script>alert(1)</script></div>\n\ntext")
            .await
            .unwrap();

        assert!(!doc.html.contains("script"));
        assert!(!doc.html.contains("onclick"));
        assert!(doc.html.contains("<div>hi </div>"));
    }

    #[tokio::test]
    async fn test_inline_raw_html_spans_are_joined() {
        let doc = convert("a <kbd>Ctrl</kbd> b").await.unwrap();
        assert_eq!(doc.html, "<p>a <kbd>Ctrl</kbd> b</p>");
    }

    #[tokio::test]
    async fn test_autolinks_toggle() {
        let on = convert("visit www.example.com today").await.unwrap();
        assert_eq!(
            on.html,
            "<p>visit <a href=\"http://www.example.com\">www.example.com</a> today</p>"
        );

        let options = RenderOptions::new().with_autolinks(false);
        let off = render("visit www.example.com today", &options).await.unwrap();
        assert_eq!(off.html, "<p>visit www.example.com today</p>");
    }

    #[tokio::test]
    async fn test_duplicate_headings_get_unique_ids() {
        let doc = convert("# Intro\n\n## Intro\n\n### Intro").await.unwrap();
        assert_eq!(
            doc.html,
            "<h1 id=\"intro\">Intro</h1><h2 id=\"intro-1\">Intro</h2><h3 id=\"intro-2\">Intro</h3>"
        );
    }

    #[tokio::test]
    async fn test_math_disabled_keeps_source() {
        let options = RenderOptions::new().with_math(false);
        let doc = render("Euler: $e^{i\\pi}$", &options).await.unwrap();
        assert_eq!(
            doc.html,
            "<p>Euler: <code class=\"language-math\">e^{i\\pi}</code></p>"
        );
    }

    #[cfg(feature = "math")]
    #[tokio::test]
    async fn test_math_is_typeset() {
        let doc = convert("Euler: $e^{i\\pi}$").await.unwrap();
        assert!(doc.html.starts_with("<p>Euler: <math"), "{}", doc.html);
    }

    #[tokio::test]
    async fn test_metadata_limits() {
        let options = RenderOptions::new().with_metadata_limits(8, 10);
        let doc = render("# A long title\n\nA long description", &options)
            .await
            .unwrap();
        assert_eq!(doc.metadata.title.as_deref(), Some("A lon..."));
        assert_eq!(doc.metadata.description.as_deref(), Some("A long..."));
    }
}
