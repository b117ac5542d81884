//! End-to-end conversion tests: markdown in, sanitized HTML and metadata out.

use mdshare_render::{RenderOptions, Rendered, convert, render, sanitize_html, truncate};
use proptest::prelude::*;
use regex::Regex;

fn block_on_convert(markdown: &str) -> Rendered {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
        .block_on(convert(markdown))
        .expect("convert")
}

fn assert_no_active_content(html: &str) {
    let lower = html.to_lowercase();
    assert!(!lower.contains("<script"), "script survived: {html}");
    let handler = Regex::new(r"<[^>]*\son[a-z]+\s*=").unwrap();
    assert!(!handler.is_match(&lower), "event handler survived: {html}");
    assert!(!lower.contains("javascript:"), "javascript url survived: {html}");
}

#[tokio::test]
async fn frontmatter_title_and_first_paragraph() {
    let doc = convert("---\ntitle: Hello\n---\n# World\nSome text.")
        .await
        .unwrap();

    assert_eq!(doc.metadata.title.as_deref(), Some("Hello"));
    assert_eq!(doc.metadata.description.as_deref(), Some("Some text."));
    assert!(doc.html.contains("<div class=\"frontmatter-container\">"));
    assert!(doc.html.contains("<h1 id=\"world\">World</h1>"));
}

#[tokio::test]
async fn malformed_frontmatter_falls_back_to_heading() {
    let doc = convert("---\n: : :\n---\n# Fallback").await.unwrap();

    assert_eq!(doc.metadata.title.as_deref(), Some("Fallback"));
    assert!(
        doc.html
            .starts_with("<div class=\"frontmatter-container\"></div>")
    );
    assert!(!doc.html.contains("frontmatter-row"));
}

#[tokio::test]
async fn duplicate_frontmatter_keys_render_once() {
    let doc = convert("---\ntitle: First\ntitle: Second\n---\n").await.unwrap();

    assert_eq!(doc.html.matches("frontmatter-row").count(), 1);
    assert!(doc.html.contains("<div class=\"frontmatter-value\">Second</div>"));
    assert!(!doc.html.contains("First"));
    assert_eq!(doc.metadata.title.as_deref(), Some("Second"));
}

#[tokio::test]
async fn frontmatter_values_are_displayed() {
    let doc = convert("---\ndate: 2024-01-15\ntags: [a, b]\ndraft: false\nnothing: null\n---\n")
        .await
        .unwrap();

    for (label, value) in [
        ("date", "1/15/2024"),
        ("tags", "a,b"),
        ("draft", "false"),
        ("nothing", "null"),
    ] {
        let row = format!(
            "<div class=\"frontmatter-label\">{label}</div><div class=\"frontmatter-value\">{value}</div>"
        );
        assert!(doc.html.contains(&row), "missing {label} row in {}", doc.html);
    }
}

#[tokio::test]
async fn frontmatter_markup_is_escaped() {
    let doc = convert("---\ntitle: \"<script>alert(1)</script>\"\n---\n")
        .await
        .unwrap();

    assert!(doc.html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert_no_active_content(&doc.html);
}

#[tokio::test]
async fn no_frontmatter_no_heading_means_no_title() {
    let doc = convert("Just a paragraph.").await.unwrap();

    assert_eq!(doc.metadata.title, None);
    assert_eq!(doc.metadata.description.as_deref(), Some("Just a paragraph."));
    assert!(!doc.html.contains("frontmatter"));
}

#[tokio::test]
async fn user_frontmatter_classes_only_pass_on_divs() {
    let markdown = "<span class=\"frontmatter-row\">x</span>\n\
                    <div class=\"frontmatter-row other\">y</div>";
    let doc = convert(markdown).await.unwrap();

    assert!(doc.html.contains("<span>x</span>"));
    assert!(doc.html.contains("<div class=\"frontmatter-row\">y</div>"));
}

#[tokio::test]
async fn hostile_html_is_neutralized() {
    let markdown = "\
<script>document.cookie</script>

<img src=\"javascript:alert(1)\" onerror=\"alert(1)\">

<a href=\"javascript:alert(1)\" onclick=\"x()\">link</a>

<iframe src=\"https://evil.example\"></iframe>

[md link](javascript:alert(1))
";
    let doc = convert(markdown).await.unwrap();

    assert_no_active_content(&doc.html);
    assert!(!doc.html.contains("iframe"));
    assert!(doc.html.contains(">link</a>"));
    assert!(doc.html.contains(">md link</a>"));
}

#[tokio::test]
async fn user_ids_are_prefixed_and_not_slugged() {
    let doc = convert("<h2 id=\"top\">Top</h2>\n\n# Top").await.unwrap();

    assert!(doc.html.contains("<h2 id=\"user-content-top\">Top</h2>"));
    assert!(doc.html.contains("<h1 id=\"top\">Top</h1>"));
}

#[tokio::test]
async fn gfm_extensions() {
    let doc = convert(
        "- [x] done\n- [ ] todo\n\n| a | b |\n|---|---|\n| 1 | ~~2~~ |\n\nsee https://example.com/x.",
    )
    .await
    .unwrap();

    assert!(doc.html.contains("<ul class=\"contains-task-list\">"));
    assert!(doc.html.contains(
        "<li class=\"task-list-item\"><input type=\"checkbox\" disabled=\"\" checked=\"\"> done</li>"
    ));
    assert!(doc.html.contains("<td><del>2</del></td>"));
    assert!(
        doc.html
            .contains("<a href=\"https://example.com/x\">https://example.com/x</a>.")
    );
}

#[tokio::test]
async fn bad_math_degrades_to_source() {
    let doc = convert("ok $x$ then $\\frac{a}$ end").await.unwrap();

    assert!(doc.html.contains("<code class=\"language-math\">\\frac{a}</code>"));
    assert!(doc.html.ends_with(" end</p>"));
}

#[tokio::test]
async fn unfinished_math_never_leaks_parser_errors() {
    let doc = convert("a $x^$ b $a < b$ c\n\n$$\n\\unknowncmd{x}\n$$\n").await.unwrap();

    assert!(!doc.html.contains("PARSE ERROR"), "{}", doc.html);
    assert!(!doc.html.contains("<<"), "{}", doc.html);
    assert!(doc.html.contains("<code class=\"language-math\">x^</code>"));
}

#[tokio::test]
async fn empty_frontmatter_is_not_two_rules() {
    for markdown in ["---\n---\n# Hi\n", "---\n\n---\n# Hi\n"] {
        let doc = convert(markdown).await.unwrap();

        assert!(
            doc.html
                .starts_with("<div class=\"frontmatter-container\"></div>"),
            "{}",
            doc.html
        );
        assert!(!doc.html.contains("<hr>"));
        assert_eq!(doc.metadata.title.as_deref(), Some("Hi"));
    }
}

#[tokio::test]
async fn quoted_frontmatter_dates_stay_strings() {
    let doc = convert("---\ntitle: \"2024-01-15\"\n---\n# Heading\n").await.unwrap();

    assert_eq!(doc.metadata.title.as_deref(), Some("2024-01-15"));
    assert!(
        doc.html
            .contains("<div class=\"frontmatter-value\">2024-01-15</div>")
    );
}

#[tokio::test]
async fn table_caption_markup_settles() {
    let doc = convert("<table><caption><p>x</p></caption></table>\n").await.unwrap();

    assert!(doc.html.contains('x'));
    assert_eq!(sanitize_html(&doc.html), doc.html);
}

#[tokio::test]
async fn unlabeled_code_is_detected_when_enabled() {
    let markdown = "```\nimport os\ndef main():\n    pass\n```\n";
    let detected = convert(markdown).await.unwrap();
    assert!(detected.html.contains("class=\"language-python\""));

    let options = RenderOptions::new().with_language_detection(false);
    let plain = render(markdown, &options).await.unwrap();
    assert!(plain.html.contains("<pre><code>"));
}

#[tokio::test]
async fn same_input_same_output() {
    let markdown = "---\ntitle: T\n---\n# A\n\n```rust\nfn f() {}\n```\n\n$x^2$";
    let first = convert(markdown).await.unwrap();
    let second = convert(markdown).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn conversions_run_concurrently() {
    let mut set = tokio::task::JoinSet::new();
    for i in 0..8 {
        let markdown = format!("# Doc {i}\n\nBody {i}.");
        set.spawn(async move { (i, convert(&markdown).await) });
    }

    let mut seen = 0;
    while let Some(joined) = set.join_next().await {
        let (i, doc) = joined.unwrap();
        let doc = doc.unwrap();
        assert_eq!(doc.metadata.title, Some(format!("Doc {i}")));
        assert_eq!(doc.metadata.description, Some(format!("Body {i}.")));
        seen += 1;
    }
    assert_eq!(seen, 8);
}

const HTML_SNIPPETS: &[&str] = &[
    "<p>",
    "</p>",
    "<div class=\"frontmatter-row x\">",
    "</div>",
    "<script>alert(1)</script>",
    "<img src=x onerror=alert(1)>",
    "<a href=\"javascript:void(0)\">",
    "<a href=\"https://ok.example\" name=\"n\">",
    "</a>",
    "<em>",
    "</em>",
    "<pre>\n\n",
    "</pre>",
    "<table><tr><td>",
    "</td></tr></table>",
    "<td>",
    "<table><caption><p>x</p></caption></table>",
    "<caption>",
    "<!-- c -->",
    "<input type=text>",
    "<h2 id=\"x\" class=\"sr-only y\">",
    "</h2>",
    "<style>p{}</style>",
    "&amp;",
    "<",
    "text",
    " ",
    "\n",
];

fn html_soup() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(HTML_SNIPPETS), 0..24)
        .prop_map(|parts| parts.concat())
}

const MARKDOWN_SNIPPETS: &[&str] = &[
    "# Heading\n",
    "para text ",
    "\n\n",
    "*em* ",
    "`code` ",
    "$x^2$ ",
    "<span onclick=\"x()\">",
    "</span>",
    "<script>bad()</script>",
    "[l](javascript:alert(1)) ",
    "www.example.com ",
    "- item\n",
    "> quote\n",
    "<img src=\"a.png\" onload=\"x()\">",
];

fn markdown_soup() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(MARKDOWN_SNIPPETS), 0..16)
        .prop_map(|parts| parts.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sanitizing_is_idempotent(html in html_soup()) {
        let once = sanitize_html(&html);
        let twice = sanitize_html(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn sanitized_html_has_no_active_content(html in html_soup()) {
        assert_no_active_content(&sanitize_html(&html));
    }

    #[test]
    fn converted_markdown_has_no_active_content(markdown in markdown_soup()) {
        assert_no_active_content(&block_on_convert(&markdown).html);
    }

    #[test]
    fn title_is_first_heading_truncated(text in "[A-Za-z](?:[A-Za-z0-9 ]{0,99}[A-Za-z0-9])?") {
        let doc = block_on_convert(&format!("Intro.\n\n# {text}\n\n# Second\n"));
        prop_assert_eq!(doc.metadata.title, Some(truncate(&text, 60)));
    }

    #[test]
    fn frontmatter_title_wins_truncated(suffix in "[a-z](?:[a-z ]{0,99}[a-z])?") {
        let title = format!("Title {suffix}");
        let doc = block_on_convert(&format!("---\ntitle: {title}\n---\n# Heading\n"));
        let expected = truncate(&title, 60);
        prop_assert!(expected.chars().count() <= 60);
        prop_assert_eq!(doc.metadata.title, Some(expected));
    }
}
