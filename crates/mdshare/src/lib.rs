//! # mdshare
//!
//! Turns a markdown document into a standalone preview page: sanitized HTML
//! from [`mdshare_render`], wrapped in a themed page with link-preview
//! metadata, an expiry, and the matching `Cache-Control` header.

use std::path::PathBuf;

use camino::Utf8PathBuf;

pub mod cache;
pub mod config;
pub mod preview;

pub use cache::cache_control;
pub use config::{Config, RenderSection};
pub use preview::{
    PreparedPreview, PreviewOptions, PreviewPage, PreviewState, expires_at, page_title, prepare,
    theme_display_name,
};

/// Errors from configuration loading and preview preparation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The config file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    ConfigRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for [`Config`].
    #[error("failed to parse {path}: {source}")]
    ConfigParse {
        path: Utf8PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A path we need to walk is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    /// I/O error outside of config loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rendering the document failed.
    #[error(transparent)]
    Render(#[from] mdshare_render::Error),
}

/// Result type alias for mdshare operations.
pub type Result<T> = std::result::Result<T, Error>;
