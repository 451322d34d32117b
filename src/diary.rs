//! Diary entry dates, ordering, and the archive layout.
//!
//! Entries are markdown files in the diary directory. Each one needs a date,
//! taken from front matter or, failing that, from a `YYYY-MM-DD` file name
//! prefix:
//!
//! ```text
//! src/diary/
//! ├── 2024-05-01-rainy-day.md   # date from file name
//! └── cat.md                    # ---\ndate: 2024-05-03\ntitle: Cat\n---
//! ```
//!
//! All calendar math happens in the site's zone, Asia/Tokyo (UTC+09:00, no
//! DST). A bare `date: 2024-05-01` means midnight UTC, which is 09:00 the same
//! day in Tokyo, while `date: 2024-05-01T20:00:00Z` is already May 2nd there.
//!
//! Permalinks follow `/YYYY/MM/DD/index.html`. Production builds are served
//! under [`PRODUCTION_PATH_PREFIX`].

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

use crate::scan::is_hidden;

/// UTC offset of the site's time zone (Asia/Tokyo).
const SITE_OFFSET_SECS: i32 = 9 * 3600;

/// Path prefix of the published site.
pub const PRODUCTION_PATH_PREFIX: &str = "/mewmoire/";

#[derive(Error, Debug)]
pub enum DiaryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Diary directory not found: {0}")]
    DirNotFound(PathBuf),
}

/// The site's fixed time zone.
pub fn site_zone() -> FixedOffset {
    FixedOffset::east_opt(SITE_OFFSET_SECS).expect("UTC+9 is a valid offset")
}

/// `YYYY-MM-DD` in the site zone.
pub fn date_iso(date: DateTime<Utc>) -> String {
    date.with_timezone(&site_zone()).format("%Y-%m-%d").to_string()
}

/// Human-facing date. Currently the same shape as [`date_iso`].
pub fn date_readable(date: DateTime<Utc>) -> String {
    date.with_timezone(&site_zone()).format("%Y-%m-%d").to_string()
}

/// `/YYYY/MM/DD/index.html` in the site zone.
pub fn permalink(date: DateTime<Utc>) -> String {
    date.with_timezone(&site_zone())
        .format("/%Y/%m/%d/index.html")
        .to_string()
}

/// Path prefix for the target environment.
pub fn path_prefix(production: bool) -> &'static str {
    if production { PRODUCTION_PATH_PREFIX } else { "" }
}

/// Join a path prefix and a root-relative URL.
pub fn prefixed_url(prefix: &str, url: &str) -> String {
    if prefix.is_empty() {
        url.to_string()
    } else {
        format!("{}{}", prefix.trim_end_matches('/'), url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiaryEntry {
    pub title: String,
    pub date: DateTime<Utc>,
    pub source: PathBuf,
}

impl DiaryEntry {
    pub fn permalink(&self) -> String {
        permalink(self.date)
    }

    /// Calendar date in the site zone.
    pub fn local_date(&self) -> NaiveDate {
        self.date.with_timezone(&site_zone()).date_naive()
    }
}

/// Sort newest first. Entries sharing a date keep their relative order.
pub fn sort_newest_first(entries: &mut [DiaryEntry]) {
    entries.sort_by(|a, b| b.date.cmp(&a.date));
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGroup {
    pub month: u32,
    pub entries: Vec<DiaryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearGroup {
    pub year: i32,
    pub months: Vec<MonthGroup>,
}

/// Group by site-zone year and month, newest everything first.
pub fn group_by_year_month(entries: &[DiaryEntry]) -> Vec<YearGroup> {
    let mut sorted = entries.to_vec();
    sort_newest_first(&mut sorted);

    let mut years: BTreeMap<i32, BTreeMap<u32, Vec<DiaryEntry>>> = BTreeMap::new();
    for entry in sorted {
        let local = entry.local_date();
        years
            .entry(local.year())
            .or_default()
            .entry(local.month())
            .or_default()
            .push(entry);
    }

    years
        .into_iter()
        .rev()
        .map(|(year, months)| YearGroup {
            year,
            months: months
                .into_iter()
                .rev()
                .map(|(month, entries)| MonthGroup { month, entries })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    title: Option<String>,
    date: Option<String>,
}

/// Split `---`-fenced YAML front matter from the body.
fn front_matter(content: &str) -> Option<&str> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }
    None
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_entry_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Date from a `YYYY-MM-DD` file stem prefix.
fn date_from_stem(stem: &str) -> Option<DateTime<Utc>> {
    stem.get(..10).and_then(parse_entry_date)
}

/// Read one entry. Returns `None` (with a warning) if it has no usable date.
fn parse_entry(path: &Path, content: &str) -> Option<DiaryEntry> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let yaml = front_matter(content).filter(|fm| !fm.trim().is_empty());
    let meta = match yaml.map(|fm| serde_yaml_ng::from_str::<FrontMatter>(fm)) {
        Some(Ok(meta)) => meta,
        Some(Err(e)) => {
            warn!("skipping {}: bad front matter: {}", path.display(), e);
            return None;
        }
        None => FrontMatter::default(),
    };

    let date = match meta.date.as_deref() {
        Some(value) => parse_entry_date(value),
        None => date_from_stem(&stem),
    };
    let Some(date) = date else {
        warn!("skipping {}: no date", path.display());
        return None;
    };

    Some(DiaryEntry {
        title: meta.title.unwrap_or(stem),
        date,
        source: path.to_path_buf(),
    })
}

/// Load every dated markdown entry in `dir`, newest first.
///
/// Files that cannot be read as UTF-8 are skipped with a warning.
pub fn load_entries(dir: &Path) -> Result<Vec<DiaryEntry>, DiaryError> {
    if !dir.is_dir() {
        return Err(DiaryError::DirNotFound(dir.to_path_buf()));
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| !is_hidden(&e.file_name()))
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|e| e.eq_ignore_ascii_case("md"))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut entries = Vec::new();
    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if let Some(entry) = parse_entry(&path, &content) {
            entries.push(entry);
        }
    }
    sort_newest_first(&mut entries);
    Ok(entries)
}
