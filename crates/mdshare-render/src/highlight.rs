//! Code block highlighting.

use std::sync::Arc;

use tracing::debug;

use crate::dom::{Element, Node};
use crate::handler::BoxedHandler;
#[cfg(not(feature = "highlight"))]
use crate::handler::RawCodeHandler;
use crate::render::RenderOptions;

#[cfg(feature = "highlight")]
pub use arborium_handler::ArboriumHandler;

/// Normalize common language aliases to the names the highlighter knows.
///
/// ```rust
/// use mdshare_render::normalize_language;
///
/// assert_eq!(normalize_language("JS"), "javascript");
/// assert_eq!(normalize_language("rust,ignore"), "rust");
/// ```
pub fn normalize_language(lang: &str) -> String {
    // "rust,ignore" -> "rust"
    let lang = lang.split(',').next().unwrap_or(lang).trim().to_lowercase();
    match lang.as_str() {
        "js" | "jsx" | "mjs" | "node" => "javascript".to_string(),
        "ts" | "tsx" => "typescript".to_string(),
        "py" | "python3" => "python".to_string(),
        "rb" => "ruby".to_string(),
        "rs" => "rust".to_string(),
        "sh" | "zsh" | "shell" | "console" => "bash".to_string(),
        "yml" => "yaml".to_string(),
        "md" => "markdown".to_string(),
        "c++" | "cc" | "cxx" | "hpp" => "cpp".to_string(),
        "kt" => "kotlin".to_string(),
        "hs" => "haskell".to_string(),
        "golang" => "go".to_string(),
        "docker" => "dockerfile".to_string(),
        "htm" | "xhtml" => "html".to_string(),
        "plaintext" | "plain" | "txt" | "" => "text".to_string(),
        _ => lang,
    }
}

/// Marker substrings per language. Order breaks ties.
const SIGNATURES: &[(&str, &[&str])] = &[
    (
        "rust",
        &["fn ", "let mut ", "::", "->", "impl ", "pub fn", "println!", "use std", "&mut "],
    ),
    (
        "python",
        &["def ", "import ", "self.", "elif ", "print(", "None", "__init__", "from "],
    ),
    (
        "typescript",
        &[": string", ": number", "interface ", "export ", "=>", "const ", ": boolean"],
    ),
    (
        "javascript",
        &["function ", "const ", "let ", "=>", "console.log", "===", "require(", "document."],
    ),
    ("go", &["package ", "func ", ":=", "fmt.", "import (", "err != nil"]),
    ("bash", &["echo ", "$ ", "sudo ", "export ", "#!/bin/", "fi\n", "then\n", "${"]),
    (
        "sql",
        &["SELECT ", " FROM ", "WHERE ", "INSERT INTO", "CREATE TABLE", "JOIN "],
    ),
    ("css", &["{\n", ";\n", "px;", "color:", "margin:", "display:"]),
    ("toml", &["[package]", "[dependencies]", " = \"", "[[", "version = "]),
];

/// Guess the language of an unlabeled code block.
///
/// Best effort: returns `None` unless the code carries at least two markers
/// of a single language (or an unambiguous prefix such as a shebang).
///
/// ```rust
/// use mdshare_render::detect_language;
///
/// assert_eq!(detect_language("fn main() {\n    println!(\"hi\");\n}"), Some("rust"));
/// assert_eq!(detect_language("hello there"), None);
/// ```
pub fn detect_language(code: &str) -> Option<&'static str> {
    let trimmed = code.trim_start();
    if let Some(shebang) = trimmed.strip_prefix("#!") {
        let first_line = shebang.lines().next().unwrap_or_default();
        if first_line.contains("python") {
            return Some("python");
        }
        if first_line.contains("node") {
            return Some("javascript");
        }
        if first_line.contains("sh") {
            return Some("bash");
        }
    }
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && trimmed.contains("\":")
        && !trimmed.contains(';')
    {
        return Some("json");
    }
    if trimmed.starts_with("<!DOCTYPE") || (trimmed.starts_with('<') && trimmed.contains("</")) {
        return Some("html");
    }

    let mut best: Option<(&'static str, usize)> = None;
    for &(language, markers) in SIGNATURES {
        let score = markers.iter().filter(|m| code.contains(*m)).count();
        if score >= 2 && best.is_none_or(|(_, top)| score > top) {
            best = Some((language, score));
        }
    }
    best.map(|(language, _)| language)
}

#[cfg(feature = "highlight")]
mod arborium_handler {
    use std::future::Future;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::pin::Pin;

    use tracing::warn;

    use super::normalize_language;
    use crate::handler::CodeBlockHandler;
    use crate::{Error, Result};

    /// Highlights code with arborium (tree-sitter grammars).
    ///
    /// Unknown languages and plain text come back escaped; a grammar that
    /// panics is reported as a handler error.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ArboriumHandler;

    impl CodeBlockHandler for ArboriumHandler {
        fn render<'a>(
            &'a self,
            language: &'a str,
            code: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
            Box::pin(async move { highlight(language, code) })
        }
    }

    fn highlight(language: &str, code: &str) -> Result<String> {
        let lang = normalize_language(language);
        if lang == "text" {
            return Ok(html_escape::encode_text(code).into_owned());
        }

        // tree-sitter grammars have edge-case panics
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut highlighter = arborium::Highlighter::new();
            highlighter.highlight_to_html(&lang, code)
        }));
        match outcome {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(e)) => Err(Error::CodeBlockHandler {
                language: lang,
                message: e.to_string(),
            }),
            Err(_) => {
                warn!(language = %lang, "highlighter panicked, falling back to plain text");
                Err(Error::CodeBlockHandler {
                    language: lang,
                    message: "highlighter panicked".to_string(),
                })
            }
        }
    }
}

fn builtin_handler() -> BoxedHandler {
    #[cfg(feature = "highlight")]
    {
        Arc::new(ArboriumHandler)
    }
    #[cfg(not(feature = "highlight"))]
    {
        Arc::new(RawCodeHandler)
    }
}

struct Job {
    language: String,
    code: String,
}

/// Visit every `pre > code` element in document order.
fn visit_code_blocks(nodes: &mut [Node], f: &mut dyn FnMut(&mut Element)) {
    for node in nodes {
        let Node::Element(el) = node else {
            continue;
        };
        if el.tag == "pre" {
            for child in &mut el.children {
                if let Node::Element(code) = child
                    && code.tag == "code"
                {
                    f(code);
                }
            }
        } else {
            visit_code_blocks(&mut el.children, f);
        }
    }
}

fn declared_language(code: &Element) -> Option<String> {
    code.attr("class")?
        .split_ascii_whitespace()
        .find_map(|class| class.strip_prefix("language-"))
        .map(str::to_string)
}

/// Run each code block through its handler, replacing the block's contents
/// with the handler's HTML.
///
/// A block whose handler fails keeps its escaped text.
pub(crate) async fn highlight_code_blocks(nodes: &mut [Node], options: &RenderOptions) {
    let mut jobs: Vec<Option<Job>> = Vec::new();
    visit_code_blocks(nodes, &mut |code| {
        let declared = declared_language(code);
        if declared.as_deref() == Some("math") {
            jobs.push(None);
            return;
        }
        let text = code.children.iter().map(Node::text_content).collect::<String>();
        let language = match declared {
            Some(language) => language,
            None if options.detect_language => match detect_language(&text) {
                Some(detected) => {
                    code.set_attr("class", format!("language-{detected}"));
                    detected.to_string()
                }
                None => String::new(),
            },
            None => String::new(),
        };
        jobs.push(Some(Job {
            language,
            code: text,
        }));
    });

    let builtin = builtin_handler();
    let mut rendered: Vec<Option<String>> = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let Some(job) = job else {
            rendered.push(None);
            continue;
        };
        let handler = options
            .code_handlers
            .get(job.language.as_str())
            .or_else(|| options.code_handlers.get(normalize_language(&job.language).as_str()))
            .or(options.default_handler.as_ref())
            .unwrap_or(&builtin);
        match handler.render(&job.language, &job.code).await {
            Ok(html) => rendered.push(Some(html)),
            Err(e) => {
                debug!(language = %job.language, error = %e, "code block left as plain text");
                rendered.push(None);
            }
        }
    }

    let mut results = rendered.into_iter();
    visit_code_blocks(nodes, &mut |code| {
        if let Some(Some(html)) = results.next() {
            code.children = vec![Node::raw(html)];
        }
    });
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::pin::Pin;

    use super::*;
    use crate::dom;
    use crate::handler::CodeBlockHandler;
    use crate::{Error, Result};

    struct Upper;

    impl CodeBlockHandler for Upper {
        fn render<'a>(
            &'a self,
            language: &'a str,
            code: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
            Box::pin(async move { Ok(format!("<b>{language}</b>{}", code.to_uppercase())) })
        }
    }

    struct Failing;

    impl CodeBlockHandler for Failing {
        fn render<'a>(
            &'a self,
            language: &'a str,
            _code: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
            Box::pin(async move {
                Err(Error::CodeBlockHandler {
                    language: language.to_string(),
                    message: "nope".to_string(),
                })
            })
        }
    }

    fn code_block(class: Option<&str>, code: &str) -> Node {
        let mut el = Element::new("code").with_child(Node::text(code));
        if let Some(class) = class {
            el.set_attr("class", class);
        }
        Node::Element(Element::new("pre").with_child(Node::Element(el)))
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("ts"), "typescript");
        assert_eq!(normalize_language("Shell"), "bash");
        assert_eq!(normalize_language(""), "text");
        assert_eq!(normalize_language("haskell"), "haskell");
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("def greet(name):\n    print(name)\n"), Some("python"));
        assert_eq!(detect_language("#!/usr/bin/env bash\nls"), Some("bash"));
        assert_eq!(detect_language("{\"a\": 1}"), Some("json"));
        assert_eq!(detect_language("package main\n\nfunc main() {}"), Some("go"));
        assert_eq!(detect_language("just some words"), None);
    }

    #[tokio::test]
    async fn test_registered_handler_runs() {
        let options = RenderOptions::new().with_handler(&["rust"], Upper);
        let mut nodes = vec![code_block(Some("language-rust"), "fn x() {}")];
        highlight_code_blocks(&mut nodes, &options).await;
        assert_eq!(
            dom::to_html(&nodes),
            "<pre><code class=\"language-rust\"><b>rust</b>FN X() {}</code></pre>"
        );
    }

    #[tokio::test]
    async fn test_alias_lookup_uses_normalized_name() {
        let options = RenderOptions::new().with_handler(&["javascript"], Upper);
        let mut nodes = vec![code_block(Some("language-js"), "x")];
        highlight_code_blocks(&mut nodes, &options).await;
        assert!(dom::to_html(&nodes).contains("<b>js</b>X"));
    }

    #[tokio::test]
    async fn test_failing_handler_keeps_text() {
        let options = RenderOptions::new().with_default_handler(Failing);
        let mut nodes = vec![code_block(Some("language-rust"), "a < b")];
        highlight_code_blocks(&mut nodes, &options).await;
        assert_eq!(
            dom::to_html(&nodes),
            "<pre><code class=\"language-rust\">a &lt; b</code></pre>"
        );
    }

    #[tokio::test]
    async fn test_math_blocks_are_skipped() {
        let options = RenderOptions::new().with_default_handler(Upper);
        let mut nodes = vec![code_block(Some("language-math"), "x^2")];
        highlight_code_blocks(&mut nodes, &options).await;
        assert_eq!(
            dom::to_html(&nodes),
            "<pre><code class=\"language-math\">x^2</code></pre>"
        );
    }

    #[tokio::test]
    async fn test_detected_language_is_recorded() {
        let options = RenderOptions::new().with_default_handler(Upper);
        let mut nodes = vec![code_block(None, "import os\ndef main():\n    pass\n")];
        highlight_code_blocks(&mut nodes, &options).await;
        let html = dom::to_html(&nodes);
        assert!(html.contains("class=\"language-python\""));
        assert!(html.contains("<b>python</b>"));
    }

    #[tokio::test]
    async fn test_detection_can_be_disabled() {
        let options = RenderOptions::new()
            .with_default_handler(Upper)
            .with_language_detection(false);
        let mut nodes = vec![code_block(None, "import os\ndef main():\n    pass\n")];
        highlight_code_blocks(&mut nodes, &options).await;
        assert_eq!(
            dom::to_html(&nodes),
            "<pre><code><b></b>IMPORT OS\nDEF MAIN():\n    PASS\n</code></pre>"
        );
    }

    #[tokio::test]
    async fn test_inline_code_is_untouched() {
        let options = RenderOptions::new().with_default_handler(Upper);
        let mut nodes = vec![Node::Element(
            Element::new("p")
                .with_child(Node::Element(Element::new("code").with_child(Node::text("x")))),
        )];
        highlight_code_blocks(&mut nodes, &options).await;
        assert_eq!(dom::to_html(&nodes), "<p><code>x</code></p>");
    }

    #[cfg(feature = "highlight")]
    #[tokio::test]
    async fn test_arborium_plain_text_is_escaped() {
        let html = ArboriumHandler.render("text", "<b>").await.unwrap();
        assert_eq!(html, "&lt;b&gt;");
    }
}
