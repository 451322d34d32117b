//! CLI output formatting.
//!
//! Each command has a `format_*` function returning lines (pure, tested) and
//! a `print_*` wrapper that writes them to stdout. Diagnostics and progress
//! go through `tracing` on stderr instead; this module is only the final
//! summary a user reads.
//!
//! ```text
//! Characters
//!     1234 unique (42 files, 1 skipped)
//!     sha256 9f86d081884c
//! Rebuilt (character set changed)
//!     Source: .cache/fonts/LXGWWenKai-Regular-v1.521.ttf (cached)
//!     Output: src/assets/fonts/lxgw-wenkai-regular.subset.woff2 (612 KiB)
//! Subset font generated: 612 KiB
//! ```

use std::path::Path;

use crate::cache::{BuildMetadata, Freshness};
use crate::diary::{self, YearGroup};
use crate::fetch::FetchStatus;
use crate::pipeline::{BuildOutcome, BuildReport, StatusReport};
use crate::scan::CharacterScan;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Abbreviate a hex digest for display.
fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

/// Bytes rounded to whole KiB.
fn kib(bytes: u64) -> u64 {
    (bytes + 512) / 1024
}

/// Path relative to `root` when possible.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

// ============================================================================
// Characters
// ============================================================================

pub fn format_scan(scan: &CharacterScan, hash: &str) -> Vec<String> {
    let mut lines = vec!["Characters".to_string()];
    let detail = if scan.skipped.is_empty() {
        format!("{} files", scan.files.len())
    } else {
        format!("{} files, {} skipped", scan.files.len(), scan.skipped.len())
    };
    lines.push(format!("{}{} unique ({})", indent(1), scan.chars.len(), detail));
    lines.push(format!("{}sha256 {}", indent(1), short_hash(hash)));
    lines
}

/// `chars` command: statistics plus every skipped file.
pub fn format_chars(scan: &CharacterScan, hash: &str, root: &Path) -> Vec<String> {
    let mut lines = format_scan(scan, hash);
    for path in &scan.skipped {
        lines.push(format!("{}Skipped: {}", indent(1), display_path(path, root)));
    }
    lines
}

// ============================================================================
// Font build
// ============================================================================

fn metadata_lines(meta: &BuildMetadata, depth: usize) -> Vec<String> {
    vec![
        format!(
            "{}Output: {} ({} KiB)",
            indent(depth),
            meta.output_file,
            kib(meta.output_bytes)
        ),
        format!("{}Font: {} ({})", indent(depth), meta.font_version, meta.source_url),
    ]
}

pub fn format_build(report: &BuildReport, root: &Path) -> Vec<String> {
    let mut lines = format_scan(&report.scan, &report.chars_hash);
    match &report.outcome {
        BuildOutcome::UpToDate => lines.push("Subset font is up to date.".to_string()),
        BuildOutcome::Built {
            reason,
            fetch,
            metadata,
        } => {
            lines.push(format!("Rebuilt ({reason})"));
            let (path, how) = match fetch {
                FetchStatus::Cached(p) => (p, "cached"),
                FetchStatus::Downloaded(p) => (p, "downloaded"),
            };
            lines.push(format!(
                "{}Source: {} ({})",
                indent(1),
                display_path(path, root),
                how
            ));
            lines.extend(metadata_lines(metadata, 1));
            lines.push(format!(
                "Subset font generated: {} KiB",
                kib(metadata.output_bytes)
            ));
        }
    }
    lines
}

pub fn format_status(status: &StatusReport) -> Vec<String> {
    let mut lines = format_scan(&status.scan, &status.params.chars_hash);
    match status.freshness {
        Freshness::UpToDate => lines.push("Up to date".to_string()),
        Freshness::Stale(reason) => lines.push(format!("Stale: {reason}")),
    }
    match &status.previous {
        Some(meta) => {
            lines.push(format!("{}Last build:", indent(1)));
            lines.extend(metadata_lines(meta, 2));
        }
        None => lines.push(format!("{}No previous build", indent(1))),
    }
    lines
}

// ============================================================================
// Diary
// ============================================================================

/// Archive listing, years and months newest first.
///
/// ```text
/// 2024
///     05
///         2024-05-01 rainy day → /mewmoire/2024/05/01/index.html
/// ```
pub fn format_diary(groups: &[YearGroup], prefix: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut total = 0;
    for year in groups {
        lines.push(year.year.to_string());
        for month in &year.months {
            lines.push(format!("{}{:02}", indent(1), month.month));
            for entry in &month.entries {
                total += 1;
                lines.push(format!(
                    "{}{} {} → {}",
                    indent(2),
                    diary::date_readable(entry.date),
                    entry.title,
                    diary::prefixed_url(prefix, &entry.permalink())
                ));
            }
        }
    }
    let noun = if total == 1 { "entry" } else { "entries" };
    lines.push(format!("{total} diary {noun}"));
    lines
}

// ============================================================================
// Print wrappers
// ============================================================================

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

pub fn print_chars(scan: &CharacterScan, hash: &str, root: &Path) {
    print_lines(format_chars(scan, hash, root));
}

pub fn print_build(report: &BuildReport, root: &Path) {
    print_lines(format_build(report, root));
}

pub fn print_status(status: &StatusReport) {
    print_lines(format_status(status));
}

pub fn print_diary(groups: &[YearGroup], prefix: &str) {
    print_lines(format_diary(groups, prefix));
}
