//! Configuration file discovery and parsing
//!
//! Searches for `.config/mdshare.yaml` walking up from the current directory.
//! Every field is optional; missing ones take their defaults.

use std::env;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use mdshare_render::RenderOptions;
use serde::Deserialize;

use crate::preview::PreviewOptions;
use crate::{Error, Result};

const CONFIG_DIR: &str = ".config";
const CONFIG_FILE: &str = "mdshare.yaml";

/// mdshare configuration from `.config/mdshare.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct Config {
    /// Preview theme name
    pub theme: String,

    /// How long a preview stays live
    pub expiration_days: u32,

    /// Rendering toggles
    pub render: RenderSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            expiration_days: 7,
            render: RenderSection::default(),
        }
    }
}

/// The `render:` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSection {
    pub highlight: bool,
    pub detect_language: bool,
    pub math: bool,
    pub autolinks: bool,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            highlight: true,
            detect_language: true,
            math: true,
            autolinks: true,
        }
    }
}

impl Config {
    /// Discover and load configuration from the current directory.
    ///
    /// Returns the defaults when no config file exists.
    pub fn discover() -> Result<Self> {
        let cwd = env::current_dir()?;
        let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| Error::NonUtf8Path(e.into_path_buf()))?;
        Self::discover_from(&cwd)
    }

    /// Discover and load configuration walking up from `start`.
    pub fn discover_from(start: &Utf8Path) -> Result<Self> {
        match find_config_file(start) {
            Some(path) => {
                tracing::debug!(%path, "loading config");
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_owned(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_owned(),
            source,
        })
    }

    /// Render options matching the `render:` toggles.
    pub fn to_render_options(&self) -> RenderOptions {
        RenderOptions::new()
            .with_highlighting(self.render.highlight)
            .with_language_detection(self.render.detect_language)
            .with_math(self.render.math)
            .with_autolinks(self.render.autolinks)
    }

    /// Preview options for this configuration.
    pub fn to_preview_options(&self) -> PreviewOptions {
        PreviewOptions {
            theme: self.theme.clone(),
            expiration_days: self.expiration_days,
            render: self.to_render_options(),
        }
    }
}

/// Search for `.config/mdshare.yaml` walking up from `start`
fn find_config_file(start: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut current = start;
    loop {
        let config_file = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_file.is_file() {
            return Some(config_file);
        }
        current = current.parent()?;
    }
}
