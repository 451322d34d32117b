//! Subset build cache: fingerprinting, the metadata record, and the gate.
//!
//! Running `fontTools.subset` over a full CJK font takes tens of seconds, so
//! the pipeline skips it whenever the last successful build is still valid.
//!
//! # Design
//!
//! ## Fingerprint
//!
//! The fingerprint is the SHA-256 of the canonical character string (sorted
//! by code point, UTF-8, no trailing newline). It is content-based, so
//! touching files or reordering them never forces a rebuild; only a new or
//! removed character does.
//!
//! ## Gate
//!
//! A rebuild is skipped only when all of these hold:
//! 1. The output font exists on disk
//! 2. A parseable metadata record exists
//! 3. The record's `charsHash`, `fontVersion` and `sourceUrl` match
//!
//! A missing or corrupt record is treated as absent. [`evaluate`] is pure:
//! callers do the reads and pass the results in.
//!
//! ## Storage
//!
//! The record is pretty-printed JSON next to the output font. It is written
//! to a temporary sibling and renamed into place, and only after the subset
//! font has been produced, so a crash mid-build never leaves a record that
//! vouches for a stale font.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::scan::CharacterSet;

/// SHA-256 of a character set's canonical string, lowercase hex.
pub fn fingerprint(chars: &CharacterSet) -> String {
    hash_text(&chars.canonical())
}

/// SHA-256 of a string's UTF-8 bytes, lowercase hex.
pub fn hash_text(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Record of the last successful subset build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    pub font_version: String,
    pub source_url: String,
    pub chars_count: usize,
    pub chars_hash: String,
    /// Output font path relative to the project root.
    pub output_file: String,
    pub output_bytes: u64,
}

impl BuildMetadata {
    /// Load the record at `path`. Returns `None` if the file is missing or
    /// can't be parsed.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!("ignoring malformed metadata {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write the record to `path`, replacing any previous one.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        let tmp = temp_sibling(path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }
}

/// `<dir>/.<name>.tmp` next to `path`.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// The parameters of the build about to run, compared against the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParams {
    pub chars_hash: String,
    pub font_version: String,
    pub source_url: String,
}

/// Why the cached output can't be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    MissingOutput,
    MissingMetadata,
    CharsChanged,
    FontVersionChanged,
    SourceUrlChanged,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StaleReason::MissingOutput => "output font missing",
            StaleReason::MissingMetadata => "no previous build record",
            StaleReason::CharsChanged => "character set changed",
            StaleReason::FontVersionChanged => "font version changed",
            StaleReason::SourceUrlChanged => "source URL changed",
        };
        f.write_str(s)
    }
}

/// Gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    UpToDate,
    Stale(StaleReason),
}

impl Freshness {
    pub fn is_up_to_date(self) -> bool {
        self == Freshness::UpToDate
    }
}

/// Decide whether the previous build can be reused.
///
/// Checks run in a fixed order and the first failing one is reported.
pub fn evaluate(
    current: &BuildParams,
    previous: Option<&BuildMetadata>,
    output_exists: bool,
) -> Freshness {
    if !output_exists {
        return Freshness::Stale(StaleReason::MissingOutput);
    }
    let Some(prev) = previous else {
        return Freshness::Stale(StaleReason::MissingMetadata);
    };
    if prev.chars_hash != current.chars_hash {
        return Freshness::Stale(StaleReason::CharsChanged);
    }
    if prev.font_version != current.font_version {
        return Freshness::Stale(StaleReason::FontVersionChanged);
    }
    if prev.source_url != current.source_url {
        return Freshness::Stale(StaleReason::SourceUrlChanged);
    }
    Freshness::UpToDate
}
