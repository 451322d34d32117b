//! # mewmoire
//!
//! Build tooling for a personal diary site. The site itself is rendered by a
//! static-site generator; this crate covers the two pieces of logic around
//! it that benefit from being real code:
//!
//! - **A CJK font subset.** The site uses a full CJK typeface whose TTF is
//!   tens of megabytes. Only the characters that actually appear in the
//!   source tree are kept, producing a WOFF2 small enough to ship.
//! - **Diary organization.** Date formatting in the site's zone, newest-first
//!   ordering, year/month archive grouping, and the permalink scheme.
//!
//! # Font Pipeline
//!
//! ```text
//! 1. Scan        src/          →  CharacterSet    (+ .cache/font-subset/chars.txt)
//! 2. Fingerprint CharacterSet  →  sha256
//! 3. Gate        sha256 + font →  up to date? stop here
//! 4. Fetch       font version  →  .cache/fonts/<name>-<version>.ttf
//! 5. Subset      ttf + chars   →  src/assets/fonts/*.subset.woff2
//! 6. Record      result        →  src/assets/fonts/*.subset.meta.json
//! ```
//!
//! The metadata record is the only durable state. It is written last, so a
//! record on disk always describes a font that was actually produced.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Stage 1: walks the source tree and collects the character set |
//! | [`cache`] | Stages 2, 3, 6: fingerprint, gate, and the metadata record |
//! | [`fetch`] | Stage 4: version-keyed source font cache and HTTP download with retries |
//! | [`subset`] | Stage 5: `fontTools.subset` invocation |
//! | [`pipeline`] | Runs the stages in order; the testable entry point |
//! | [`diary`] | Diary dates, ordering, grouping, permalinks |
//! | [`config`] | `mewmoire.toml` loading, defaults, environment overrides |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## External Subsetter
//!
//! Subsetting an OpenType font correctly (GSUB/GPOS closure, name tables,
//! WOFF2 compression) is a large job that `fontTools` already does well. It
//! runs as an opaque subprocess behind the [`subset::Subsetter`] trait. When
//! it is missing or fails, the build fails; no fallback font is produced.
//!
//! ## Injected Boundaries
//!
//! Both external effects, downloading and subsetting, sit behind traits
//! ([`fetch::FontFetcher`], [`subset::Subsetter`]). The pipeline tests run
//! the full stage sequence against fakes, with no network or Python needed.
//!
//! ## Version-Keyed Font Cache
//!
//! The downloaded font is cached per version string, not per content hash.
//! A release tag re-published with new bytes is not noticed. Upstream tags
//! are immutable in practice, and the weaker key avoids hashing a large file
//! on every build.
//!
//! ## No Concurrency
//!
//! Everything runs sequentially on one thread. Two builds against the same
//! cache directories at once are not supported.

pub mod cache;
pub mod config;
pub mod diary;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod scan;
pub mod subset;

#[cfg(test)]
pub(crate) mod test_helpers;
