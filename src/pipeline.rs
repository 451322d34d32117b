//! The font subset pipeline.
//!
//! ```text
//! collect chars → fingerprint → gate ─┬─ up to date → done (no side effects)
//!                                     └─ stale → fetch font → subset → write metadata → done
//! ```
//!
//! Stages run strictly in sequence and any failure aborts the rest. The
//! metadata record is written last, so it only ever describes a font that
//! was actually produced. The character list (`chars.txt`) is refreshed on
//! every run, including up-to-date ones, so it can be inspected.
//!
//! [`build_font`] wires in the real downloader and `fontTools`;
//! [`build_font_with`] takes any [`FontFetcher`] / [`Subsetter`] pair.

use std::fmt;
use std::fs;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{self, BuildMetadata, BuildParams, Freshness, StaleReason};
use crate::config::{BuildPaths, SiteConfig};
use crate::fetch::{self, FetchError, FetchStatus, FontFetcher, HttpFetcher, RetryPolicy};
use crate::scan::{self, CharacterScan, ScanError};
use crate::subset::{self, FontToolsSubsetter, SubsetError, Subsetter};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Subset(#[from] SubsetError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Rebuild even when the gate says the output is current.
    pub force: bool,
}

/// Why a rebuild happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildReason {
    Forced,
    Stale(StaleReason),
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::Forced => f.write_str("forced"),
            RebuildReason::Stale(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    UpToDate,
    Built {
        reason: RebuildReason,
        fetch: FetchStatus,
        metadata: BuildMetadata,
    },
}

/// Everything the CLI reports after a run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub scan: CharacterScan,
    pub chars_hash: String,
    pub outcome: BuildOutcome,
}

/// Gate result without building, for `font-status`.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub scan: CharacterScan,
    pub params: BuildParams,
    pub previous: Option<BuildMetadata>,
    pub freshness: Freshness,
}

/// Run the pipeline with the production fetcher and subsetter.
pub fn build_font(
    paths: &BuildPaths,
    config: &SiteConfig,
    options: BuildOptions,
) -> Result<BuildReport, BuildError> {
    let fetcher = HttpFetcher::new(RetryPolicy::from(&config.download));
    let subsetter = FontToolsSubsetter::new(&config.subset);
    build_font_with(&fetcher, &subsetter, paths, config, options)
}

/// Run the pipeline with injected fetcher and subsetter.
pub fn build_font_with(
    fetcher: &dyn FontFetcher,
    subsetter: &dyn Subsetter,
    paths: &BuildPaths,
    config: &SiteConfig,
    options: BuildOptions,
) -> Result<BuildReport, BuildError> {
    fs::create_dir_all(&paths.build_dir)?;

    info!("collecting characters from {}", paths.source_dir.display());
    let scan = scan::collect_characters(&paths.source_dir)?;
    let canonical = scan.chars.canonical();
    fs::write(&paths.chars_file, format!("{canonical}\n"))?;

    let params = current_params(config, cache::hash_text(&canonical));
    let previous = BuildMetadata::load(&paths.metadata_file);
    let freshness = cache::evaluate(&params, previous.as_ref(), paths.output_font.exists());
    debug!(?freshness, force = options.force, "cache gate");

    let reason = match freshness {
        Freshness::UpToDate if !options.force => {
            return Ok(BuildReport {
                scan,
                chars_hash: params.chars_hash,
                outcome: BuildOutcome::UpToDate,
            });
        }
        Freshness::UpToDate => RebuildReason::Forced,
        Freshness::Stale(r) => RebuildReason::Stale(r),
    };
    info!("rebuilding subset font: {reason}");

    let fetch = fetch::ensure_source_font(fetcher, &params.source_url, &paths.source_font)?;
    let output_bytes = subset::produce_subset(
        subsetter,
        &paths.source_font,
        &paths.chars_file,
        &paths.output_font,
    )?;

    let metadata = BuildMetadata {
        font_version: params.font_version,
        source_url: params.source_url,
        chars_count: scan.chars.len(),
        chars_hash: params.chars_hash.clone(),
        output_file: paths.output_font_relative(),
        output_bytes,
    };
    metadata.save(&paths.metadata_file)?;

    Ok(BuildReport {
        scan,
        chars_hash: params.chars_hash,
        outcome: BuildOutcome::Built {
            reason,
            fetch,
            metadata,
        },
    })
}

/// Evaluate the gate without writing anything.
pub fn font_status(paths: &BuildPaths, config: &SiteConfig) -> Result<StatusReport, ScanError> {
    let scan = scan::collect_characters(&paths.source_dir)?;
    let params = current_params(config, cache::fingerprint(&scan.chars));
    let previous = BuildMetadata::load(&paths.metadata_file);
    let freshness = cache::evaluate(&params, previous.as_ref(), paths.output_font.exists());
    Ok(StatusReport {
        scan,
        params,
        previous,
        freshness,
    })
}

fn current_params(config: &SiteConfig, chars_hash: String) -> BuildParams {
    BuildParams {
        chars_hash,
        font_version: config.font.version.clone(),
        source_url: config.font.source_url(),
    }
}
