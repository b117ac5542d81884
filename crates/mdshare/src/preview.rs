//! Preview pages: rendered markdown wrapped for display in an isolated frame.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use mdshare_render::{Metadata, RenderOptions, render};
use tracing::debug;

use crate::Result;
use crate::cache::cache_control;

/// Milliseconds in a day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Paint cycles to wait after the frame loads before showing it.
const PAINT_FRAMES: u8 = 2;

/// Capitalize a theme name for display: `dark` -> `Dark`.
pub fn theme_display_name(theme: &str) -> String {
    let mut chars = theme.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The page title for a preview in `theme`.
pub fn page_title(theme: &str) -> String {
    format!("Preview - {}", theme_display_name(theme))
}

/// Expiry timestamp for a preview created at `now_ms` that lives `days` days.
pub fn expires_at(now_ms: i64, days: u32) -> i64 {
    now_ms.saturating_add(i64::from(days).saturating_mul(DAY_MS))
}

/// Options for preparing a preview.
pub struct PreviewOptions {
    pub theme: String,
    pub expiration_days: u32,
    pub render: RenderOptions,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            expiration_days: 7,
            render: RenderOptions::default(),
        }
    }
}

/// A standalone HTML page around a rendered fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewPage<'a> {
    pub theme: &'a str,
    pub expires_at_ms: i64,
    pub metadata: &'a Metadata,
    /// Sanitized HTML, inserted as-is
    pub body: &'a str,
}

impl PreviewPage<'_> {
    /// Serialize the full document.
    pub fn to_html(&self) -> String {
        let title = page_title(self.theme);
        let og_title = self.metadata.title.as_deref().unwrap_or(&title);
        let theme = attr(self.theme);

        let mut head = String::new();
        head.push_str("<meta charset=\"utf-8\">\n");
        head.push_str(
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
        );
        head.push_str(&format!("<title>{}</title>\n", text(&title)));
        if let Some(description) = &self.metadata.description {
            let description = attr(description);
            head.push_str(&format!(
                "<meta name=\"description\" content=\"{description}\">\n"
            ));
            head.push_str(&format!(
                "<meta property=\"og:description\" content=\"{description}\">\n"
            ));
        }
        head.push_str(&format!(
            "<meta property=\"og:title\" content=\"{}\">\n",
            attr(og_title)
        ));
        head.push_str(&format!(
            "<meta name=\"expires-at\" content=\"{}\">\n",
            self.expires_at_ms
        ));
        head.push_str(&format!(
            "<link rel=\"stylesheet\" href=\"/themes/{theme}.css\">\n"
        ));

        format!(
            "<!DOCTYPE html>\n<html lang=\"en\" data-theme=\"{theme}\">\n<head>\n{head}</head>\n\
             <body>\n<article class=\"markdown-body\">\n{}\n</article>\n</body>\n</html>\n",
            self.body
        )
    }
}

/// Everything the host needs to serve one preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPreview {
    /// The sanitized fragment
    pub html: String,
    /// The standalone page around it
    pub page: String,
    pub metadata: Metadata,
    pub expires_at_ms: i64,
    pub cache_control: String,
}

/// Render `markdown` and wrap it into a preview page.
pub async fn prepare(
    markdown: &str,
    options: &PreviewOptions,
    now_ms: i64,
) -> Result<PreparedPreview> {
    let rendered = render(markdown, &options.render).await?;
    let expires_at_ms = expires_at(now_ms, options.expiration_days);

    let page = PreviewPage {
        theme: &options.theme,
        expires_at_ms,
        metadata: &rendered.metadata,
        body: &rendered.html,
    }
    .to_html();
    debug!(
        theme = %options.theme,
        expires_at_ms,
        bytes = page.len(),
        "prepared preview"
    );

    Ok(PreparedPreview {
        page,
        cache_control: cache_control(now_ms, expires_at_ms),
        html: rendered.html,
        metadata: rendered.metadata,
        expires_at_ms,
    })
}

/// Where a preview is on its way to the screen.
///
/// The frame is ready only once it has loaded and painted at least twice, so
/// the loading indicator never uncovers an unpainted page. Any error ends the
/// loading state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreviewState {
    #[default]
    Loading,
    Painting {
        frames: u8,
    },
    Ready,
    Failed(String),
}

impl PreviewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame finished loading the page.
    pub fn frame_loaded(self) -> Self {
        match self {
            PreviewState::Loading => PreviewState::Painting { frames: 0 },
            other => other,
        }
    }

    /// A paint cycle elapsed.
    pub fn painted(self) -> Self {
        match self {
            PreviewState::Painting { frames } if frames + 1 >= PAINT_FRAMES => PreviewState::Ready,
            PreviewState::Painting { frames } => PreviewState::Painting { frames: frames + 1 },
            other => other,
        }
    }

    /// Rendering or loading failed.
    pub fn fail(self, message: impl Into<String>) -> Self {
        match self {
            PreviewState::Ready => PreviewState::Ready,
            _ => PreviewState::Failed(message.into()),
        }
    }

    /// Whether the loading indicator should still show.
    pub fn is_loading(&self) -> bool {
        matches!(self, PreviewState::Loading | PreviewState::Painting { .. })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PreviewState::Ready)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PreviewState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_display_name() {
        assert_eq!(theme_display_name("dark"), "Dark");
        assert_eq!(theme_display_name("github-light"), "Github-light");
        assert_eq!(theme_display_name("éclair"), "Éclair");
        assert_eq!(theme_display_name(""), "");
    }

    #[test]
    fn test_page_title() {
        assert_eq!(page_title("sepia"), "Preview - Sepia");
    }

    #[test]
    fn test_expires_at() {
        assert_eq!(expires_at(1_000, 0), 1_000);
        assert_eq!(expires_at(1_000, 1), 1_000 + 86_400_000);
        assert_eq!(expires_at(0, 30), 2_592_000_000);
        assert_eq!(expires_at(i64::MAX - 1, 1), i64::MAX);
    }

    #[test]
    fn test_page_escapes_metadata() {
        let metadata = Metadata {
            title: Some("Tom & \"Jerry\"".to_string()),
            description: Some("<b>bold</b>".to_string()),
        };
        let page = PreviewPage {
            theme: "dark",
            expires_at_ms: 42,
            metadata: &metadata,
            body: "<p>hi</p>",
        }
        .to_html();

        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<html lang=\"en\" data-theme=\"dark\">"));
        assert!(page.contains("<title>Preview - Dark</title>"));
        assert!(page.contains("content=\"Tom &amp; &quot;Jerry&quot;\""));
        assert!(page.contains("<meta name=\"description\" content=\"&lt;b&gt;bold&lt;/b&gt;\">"));
        assert!(page.contains("<meta name=\"expires-at\" content=\"42\">"));
        assert!(page.contains("href=\"/themes/dark.css\""));
        assert!(page.contains("<article class=\"markdown-body\">\n<p>hi</p>\n</article>"));
    }

    #[test]
    fn test_page_without_metadata_uses_page_title() {
        let metadata = Metadata::default();
        let page = PreviewPage {
            theme: "light",
            expires_at_ms: 0,
            metadata: &metadata,
            body: "",
        }
        .to_html();

        assert!(page.contains("<meta property=\"og:title\" content=\"Preview - Light\">"));
        assert!(!page.contains("name=\"description\""));
    }

    #[tokio::test]
    async fn test_prepare() {
        let options = PreviewOptions {
            theme: "dark".to_string(),
            expiration_days: 1,
            ..PreviewOptions::default()
        };
        let prepared = prepare("---\ntitle: Hello\n---\n# World\nSome text.", &options, 0)
            .await
            .unwrap();

        assert_eq!(prepared.metadata.title.as_deref(), Some("Hello"));
        assert_eq!(prepared.expires_at_ms, 86_400_000);
        assert_eq!(prepared.cache_control, "public, max-age=86400, immutable");
        assert!(prepared.page.contains(&prepared.html));
        assert!(prepared.page.contains("<meta property=\"og:title\" content=\"Hello\">"));
    }

    #[tokio::test]
    async fn test_prepare_zero_days_is_not_cached() {
        let options = PreviewOptions {
            expiration_days: 0,
            ..PreviewOptions::default()
        };
        let prepared = prepare("# x", &options, 5_000).await.unwrap();
        assert_eq!(prepared.cache_control, "no-cache");
    }

    #[test]
    fn test_ready_after_load_and_two_paints() {
        let state = PreviewState::new();
        assert!(state.is_loading());

        // Paints before the frame loads don't count
        let state = state.painted().painted();
        assert_eq!(state, PreviewState::Loading);

        let state = state.frame_loaded();
        assert_eq!(state, PreviewState::Painting { frames: 0 });
        let state = state.painted();
        assert!(state.is_loading());
        let state = state.painted();
        assert!(state.is_ready());
        assert!(!state.is_loading());
    }

    #[test]
    fn test_failure_leaves_loading() {
        let state = PreviewState::new().fail("boom");
        assert!(!state.is_loading());
        assert_eq!(state.error(), Some("boom"));

        let state = PreviewState::new().frame_loaded().fail("late");
        assert_eq!(state.error(), Some("late"));
    }
}
