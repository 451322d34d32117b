//! Character collection.
//!
//! Stage 1 of the font pipeline. Walks the site source tree and gathers every
//! character the site can render, so the subset font carries exactly those
//! glyphs and nothing else.
//!
//! ## What gets scanned
//!
//! ```text
//! src/
//! ├── index.njk              # scanned (template)
//! ├── diary/
//! │   └── 2024-05-01.md      # scanned (markdown)
//! ├── assets/
//! │   ├── site.css           # scanned (stylesheet)
//! │   └── fonts/x.woff2      # ignored (not a text extension)
//! └── .drafts/               # ignored, with everything below it
//! ```
//!
//! The filter is two independent checks, see [`is_hidden`] and
//! [`has_text_extension`]. Hidden entries are pruned from the walk entirely;
//! the extension check only applies to files.
//!
//! ## Character rules
//!
//! Control characters (U+0000–U+001F) and the C1 range (U+007F–U+009F) are
//! dropped. Everything else is kept, and the result always includes the
//! [`baseline`] set so punctuation typed later renders before the next build.
//!
//! ## Unreadable files
//!
//! A file that cannot be read or is not valid UTF-8 is skipped with a
//! warning and counted in [`CharacterScan::skipped`]. Only a missing source
//! root aborts the scan.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File extensions read as text (compared lowercased, without the dot).
pub const TEXT_EXTENSIONS: &[&str] = &["md", "njk", "json", "js", "css", "txt", "html"];

/// CJK punctuation always present in the subset.
pub const CJK_PUNCTUATION: &str = "，。！？、；：‘’“”（）《》【】「」『』—…·￥";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Source directory not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A set of Unicode scalar values, ordered by code point.
///
/// The canonical serialization is the characters concatenated in ascending
/// code-point order. Sets built with [`CharacterSet::with_baseline`] are
/// always supersets of [`baseline`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterSet {
    chars: BTreeSet<char>,
}

impl CharacterSet {
    /// An empty set. Mostly useful in tests; the pipeline starts from
    /// [`CharacterSet::with_baseline`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A set seeded with printable ASCII and [`CJK_PUNCTUATION`].
    pub fn with_baseline() -> Self {
        let mut set = Self::new();
        set.extend_text(&baseline());
        set
    }

    /// Add one character, ignoring control characters.
    ///
    /// Returns `true` if the character was newly added.
    pub fn insert(&mut self, c: char) -> bool {
        if is_control(c) {
            return false;
        }
        self.chars.insert(c)
    }

    /// Add every non-control character of `text`.
    pub fn extend_text(&mut self, text: &str) {
        for c in text.chars() {
            self.insert(c);
        }
    }

    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    /// Number of distinct characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.chars.iter().copied()
    }

    /// Characters in ascending code-point order, concatenated.
    pub fn canonical(&self) -> String {
        self.chars.iter().collect()
    }
}

/// The fixed characters every subset includes: U+0020..=U+007E followed by
/// [`CJK_PUNCTUATION`].
pub fn baseline() -> String {
    let mut s: String = (0x20u8..=0x7e).map(char::from).collect();
    s.push_str(CJK_PUNCTUATION);
    s
}

/// C0 controls and DEL through the C1 range.
fn is_control(c: char) -> bool {
    let cp = u32::from(c);
    cp < 0x20 || (0x7f..=0x9f).contains(&cp)
}

/// Name-based exclusion: dotfiles and dot-directories.
///
/// Works on raw names, so a dot-directory whose name is not valid UTF-8 is
/// still hidden.
pub fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().starts_with(b".")
}

/// Extension-based inclusion: only [`TEXT_EXTENSIONS`] are read.
pub fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Result of a character scan.
#[derive(Debug, Clone)]
pub struct CharacterScan {
    pub chars: CharacterSet,
    /// Files whose characters were collected.
    pub files: Vec<PathBuf>,
    /// Files matching the filter that could not be read as UTF-8 text, and
    /// directories below the root that could not be listed.
    pub skipped: Vec<PathBuf>,
}

/// Files under a source root that pass the scan filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextFiles {
    /// Matching files, sorted by path.
    pub files: Vec<PathBuf>,
    /// Entries below the root the walk could not descend into.
    pub unreadable: Vec<PathBuf>,
}

/// List the files under `root` that pass the scan filter.
///
/// Only a missing or unreadable root is an error. Anything below it that
/// cannot be walked is logged and reported in [`TextFiles::unreadable`].
pub fn text_files(root: &Path) -> Result<TextFiles, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::SourceNotFound(root.to_path_buf()));
    }

    let mut found = TextFiles::default();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) if source.depth() == 0 => {
                return Err(ScanError::Walk {
                    path: root.to_path_buf(),
                    source,
                });
            }
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                if let Some(path) = e.path() {
                    found.unreadable.push(path.to_path_buf());
                }
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        if has_text_extension(entry.path()) {
            found.files.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Collect the character set used by all text files under `root`.
pub fn collect_characters(root: &Path) -> Result<CharacterScan, ScanError> {
    let TextFiles {
        files: candidates,
        unreadable: mut skipped,
    } = text_files(root)?;
    let mut chars = CharacterSet::with_baseline();
    let mut files = Vec::with_capacity(candidates.len());

    for path in candidates {
        match fs::read_to_string(&path) {
            Ok(content) => {
                chars.extend_text(&content);
                files.push(path);
            }
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                skipped.push(path);
            }
        }
    }

    debug!(
        files = files.len(),
        skipped = skipped.len(),
        chars = chars.len(),
        "character scan complete"
    );

    Ok(CharacterScan {
        chars,
        files,
        skipped,
    })
}
