//! Build configuration module.
//!
//! Handles loading, validating, and merging `mewmoire.toml`. Stock defaults
//! describe the standard site layout; a `mewmoire.toml` in the project root
//! overrides any subset of them, and two environment variables override the
//! font source last.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! source_dir = "src"          # Tree scanned for characters
//! diary_dir = "src/diary"     # Diary entries (markdown)
//!
//! [font]
//! name = "LXGWWenKai-Regular"
//! version = "v1.521"          # Overridden by $LXGW_WENKAI_VERSION
//! url = "https://github.com/lxgw/LxgwWenKai/releases/download/{version}/LXGWWenKai-Regular.ttf"
//!
//! [output]
//! font = "src/assets/fonts/lxgw-wenkai-regular.subset.woff2"
//! metadata = "src/assets/fonts/lxgw-wenkai-regular.subset.meta.json"
//!
//! [cache]
//! fonts_dir = ".cache/fonts"
//! build_dir = ".cache/font-subset"
//!
//! [download]
//! retries = 3
//! retry_delay_secs = 2
//!
//! [subset]
//! python = "python3"
//! flavor = "woff2"
//! ```
//!
//! ## Precedence
//!
//! ```text
//! stock defaults  <  mewmoire.toml  <  $LXGW_WENKAI_VERSION / $LXGW_WENKAI_URL
//! ```
//!
//! The URL is a template: `{version}` expands to the effective version, so
//! overriding only the version also moves the download URL. An explicit
//! `$LXGW_WENKAI_URL` is used verbatim (after the same expansion).
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the optional config file in the project root.
pub const CONFIG_FILENAME: &str = "mewmoire.toml";

/// Environment variable overriding `font.version`.
pub const VERSION_ENV: &str = "LXGW_WENKAI_VERSION";

/// Environment variable overriding `font.url`.
pub const URL_ENV: &str = "LXGW_WENKAI_URL";

/// Placeholder in `font.url` replaced by the effective font version.
const VERSION_PLACEHOLDER: &str = "{version}";

const SUBSET_FLAVORS: &[&str] = &["woff", "woff2"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Build configuration loaded from `mewmoire.toml`.
///
/// All paths are relative to the project root. User config files need only
/// specify the values they want to override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Directory scanned for the characters the site uses.
    pub source_dir: String,
    /// Directory holding diary entries.
    pub diary_dir: String,
    /// Upstream font identity.
    pub font: FontConfig,
    /// Generated artifacts.
    pub output: OutputConfig,
    /// Build cache locations.
    pub cache: CacheConfig,
    /// Download retry policy.
    pub download: DownloadConfig,
    /// External subsetting tool.
    pub subset: SubsetConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            source_dir: "src".to_string(),
            diary_dir: "src/diary".to_string(),
            font: FontConfig::default(),
            output: OutputConfig::default(),
            cache: CacheConfig::default(),
            download: DownloadConfig::default(),
            subset: SubsetConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.font.version.trim().is_empty() {
            return Err(ConfigError::Validation(
                "font.version must not be empty".into(),
            ));
        }
        // The version becomes part of the cached file name.
        if self.font.version.contains(['/', '\\']) {
            return Err(ConfigError::Validation(format!(
                "font.version must not contain path separators: {}",
                self.font.version
            )));
        }
        if self.font.url.trim().is_empty() {
            return Err(ConfigError::Validation("font.url must not be empty".into()));
        }
        if self.font.name.trim().is_empty() {
            return Err(ConfigError::Validation("font.name must not be empty".into()));
        }
        if !SUBSET_FLAVORS.contains(&self.subset.flavor.as_str()) {
            return Err(ConfigError::Validation(format!(
                "subset.flavor must be one of {}",
                SUBSET_FLAVORS.join(", ")
            )));
        }
        if self.subset.python.trim().is_empty() {
            return Err(ConfigError::Validation(
                "subset.python must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Apply `$LXGW_WENKAI_VERSION` / `$LXGW_WENKAI_URL` overrides.
    ///
    /// `lookup` abstracts the environment so callers (and tests) can supply
    /// their own source. Empty values count as unset.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(version) = non_empty(VERSION_ENV) {
            self.font.version = version;
        }
        if let Some(url) = non_empty(URL_ENV) {
            self.font.url = url;
        }
    }

    /// Resolve every configured path against the project root.
    pub fn paths(&self, root: &Path) -> BuildPaths {
        let fonts_dir = root.join(&self.cache.fonts_dir);
        let build_dir = root.join(&self.cache.build_dir);
        BuildPaths {
            root: root.to_path_buf(),
            source_dir: root.join(&self.source_dir),
            diary_dir: root.join(&self.diary_dir),
            output_font: root.join(&self.output.font),
            metadata_file: root.join(&self.output.metadata),
            source_font: fonts_dir.join(self.font.cached_file_name()),
            chars_file: build_dir.join("chars.txt"),
            fonts_dir,
            build_dir,
        }
    }
}

/// Upstream font identity: which file, which release, where from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontConfig {
    /// Base name of the cached source font file.
    pub name: String,
    /// Release tag of the upstream font.
    pub version: String,
    /// Download URL; `{version}` expands to [`FontConfig::version`].
    pub url: String,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            name: "LXGWWenKai-Regular".to_string(),
            version: "v1.521".to_string(),
            url: "https://github.com/lxgw/LxgwWenKai/releases/download/{version}/LXGWWenKai-Regular.ttf"
                .to_string(),
        }
    }
}

impl FontConfig {
    /// The effective download URL with `{version}` expanded.
    pub fn source_url(&self) -> String {
        self.url.replace(VERSION_PLACEHOLDER, &self.version)
    }

    /// File name of the cached full font, keyed by version.
    pub fn cached_file_name(&self) -> String {
        format!("{}-{}.ttf", self.name, self.version)
    }
}

/// Generated artifact locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// The subset font written by the build.
    pub font: String,
    /// JSON record of the last successful build.
    pub metadata: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            font: "src/assets/fonts/lxgw-wenkai-regular.subset.woff2".to_string(),
            metadata: "src/assets/fonts/lxgw-wenkai-regular.subset.meta.json".to_string(),
        }
    }
}

/// Build cache locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Downloaded full fonts, one file per version.
    pub fonts_dir: String,
    /// Intermediate files (the character list).
    pub build_dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fonts_dir: ".cache/fonts".to_string(),
            build_dir: ".cache/font-subset".to_string(),
        }
    }
}

/// Download retry policy for transient network failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Fixed delay between attempts, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay_secs: 2,
        }
    }
}

impl DownloadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// External subsetting tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubsetConfig {
    /// Python interpreter with `fontTools` installed.
    pub python: String,
    /// Output flavor passed to `fontTools.subset --flavor`.
    pub flavor: String,
}

impl Default for SubsetConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            flavor: "woff2".to_string(),
        }
    }
}

/// Absolute locations derived from a [`SiteConfig`] and the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    pub root: PathBuf,
    pub source_dir: PathBuf,
    pub diary_dir: PathBuf,
    pub output_font: PathBuf,
    pub metadata_file: PathBuf,
    pub fonts_dir: PathBuf,
    pub source_font: PathBuf,
    pub build_dir: PathBuf,
    pub chars_file: PathBuf,
}

impl BuildPaths {
    /// Output font path relative to the project root, `/`-separated.
    ///
    /// Falls back to the full path when the output lives outside the root.
    pub fn output_font_relative(&self) -> String {
        match self.output_font.strip_prefix(&self.root) {
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => self.output_font.display().to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// Tables merge key-by-key; any other overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path` (defaults if absent), then apply
/// environment overrides from the process environment.
pub fn load_config_file(path: &Path) -> Result<SiteConfig, ConfigError> {
    let mut config = resolve_config(load_raw_config(path)?)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Load `mewmoire.toml` from the project root.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    load_config_file(&root.join(CONFIG_FILENAME))
}

/// Returns a fully-commented stock `mewmoire.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# mewmoire build configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Paths are relative to this file.
# Unknown keys will cause an error.

# Tree scanned for the characters the site actually uses.
source_dir = "src"

# Diary entries (markdown with `date:` front matter or YYYY-MM-DD names).
diary_dir = "src/diary"

# ---------------------------------------------------------------------------
# Upstream font
# ---------------------------------------------------------------------------
[font]
# Base name of the cached full font (<name>-<version>.ttf).
name = "LXGWWenKai-Regular"

# Release tag. $LXGW_WENKAI_VERSION overrides this.
version = "v1.521"

# Download URL. {version} expands to the effective version.
# $LXGW_WENKAI_URL overrides this.
url = "https://github.com/lxgw/LxgwWenKai/releases/download/{version}/LXGWWenKai-Regular.ttf"

# ---------------------------------------------------------------------------
# Generated artifacts
# ---------------------------------------------------------------------------
[output]
font = "src/assets/fonts/lxgw-wenkai-regular.subset.woff2"
metadata = "src/assets/fonts/lxgw-wenkai-regular.subset.meta.json"

# ---------------------------------------------------------------------------
# Build caches
# ---------------------------------------------------------------------------
[cache]
# Downloaded full fonts, one per version. Never invalidated by content.
fonts_dir = ".cache/fonts"

# Intermediate files (chars.txt).
build_dir = ".cache/font-subset"

# ---------------------------------------------------------------------------
# Download retries (transient network failures only)
# ---------------------------------------------------------------------------
[download]
retries = 3
retry_delay_secs = 2

# ---------------------------------------------------------------------------
# Subsetting tool (python3 -m fontTools.subset)
# ---------------------------------------------------------------------------
[subset]
python = "python3"

# "woff2" (requires brotli) or "woff".
flavor = "woff2"
"##
}
