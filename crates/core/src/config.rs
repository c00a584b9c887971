//! Editor configuration.
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file, then
//! `PDF_MARKUP_*` environment variables.

use directories::ProjectDirs;
use doc_model::{Color, FontFamily, TextStyle};
use pdf_markup_cache::{CacheConfig, ConfigError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_FONT_DIR: &str = "PDF_MARKUP_FONT_DIR";
pub const ENV_REMOTE_URL: &str = "PDF_MARKUP_REMOTE_URL";

pub const DEFAULT_HISTORY_LIMIT: usize = 200;
pub const DEFAULT_TEXT_HIT_MARGIN: f32 = 4.0;

/// Locations of the two embeddable font families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontPaths {
    pub serif: PathBuf,
    pub sans: PathBuf,
}

impl Default for FontPaths {
    fn default() -> Self {
        Self::in_dir(&Self::default_dir())
    }
}

impl FontPaths {
    pub const SERIF_FILE: &'static str = "serif.ttf";
    pub const SANS_FILE: &'static str = "sans.ttf";

    pub fn in_dir(dir: &Path) -> Self {
        Self { serif: dir.join(Self::SERIF_FILE), sans: dir.join(Self::SANS_FILE) }
    }

    pub fn default_dir() -> PathBuf {
        ProjectDirs::from("dev", "PdfMarkup", "PdfMarkup")
            .map(|dirs| dirs.data_dir().join("fonts"))
            .unwrap_or_else(|| PathBuf::from("fonts"))
    }

    pub fn get(&self, family: FontFamily) -> &Path {
        match family {
            FontFamily::Serif => &self.serif,
            FontFamily::Sans => &self.sans,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Base URL of the document service
    pub remote_url: Option<String>,
    /// Undo depth; the oldest snapshot is dropped beyond it
    pub history_limit: usize,
    /// Doc units around a text label that still count as hitting it
    pub text_hit_margin: f32,
    pub device_pixel_ratio: f32,
    pub rect_color: Color,
    pub text_style: TextStyle,
    pub cache: CacheConfig,
    pub fonts: FontPaths,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            text_hit_margin: DEFAULT_TEXT_HIT_MARGIN,
            device_pixel_ratio: 1.0,
            rect_color: Color::WHITE,
            text_style: TextStyle::default(),
            cache: CacheConfig::default(),
            fonts: FontPaths::default(),
        }
    }
}

impl EditorConfig {
    /// Defaults, overlaid by `path` when given, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?.validated()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        self.cache = self.cache.apply_env()?;

        if let Ok(dir) = env::var(ENV_FONT_DIR) {
            self.fonts = FontPaths::in_dir(Path::new(&dir));
        }

        if let Ok(url) = env::var(ENV_REMOTE_URL) {
            let url = url.trim();
            self.remote_url = (!url.is_empty()).then(|| url.to_string());
        }

        Ok(self)
    }

    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.history_limit == 0 {
            return Err(ConfigError::InvalidValue("history_limit".to_string()));
        }
        if !(self.text_hit_margin.is_finite() && self.text_hit_margin >= 0.0) {
            return Err(ConfigError::InvalidValue("text_hit_margin".to_string()));
        }
        if !(self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0) {
            return Err(ConfigError::InvalidValue("device_pixel_ratio".to_string()));
        }
        if !(self.text_style.font_size.is_finite() && self.text_style.font_size > 0.0) {
            return Err(ConfigError::InvalidValue("text_style.font_size".to_string()));
        }
        Ok(self)
    }
}
