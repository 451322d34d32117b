//! Source font download and version-keyed caching.
//!
//! The full upstream font is cached at `<fonts_dir>/<name>-<version>.ttf`.
//! If that file exists it is used as-is; otherwise it is downloaded once.
//!
//! The cache is keyed by the version *string*, not by content. Re-publishing
//! different bytes under the same release tag is not detected; delete the
//! cached file (or bump the version) to force a fresh download.
//!
//! Downloads go through the [`FontFetcher`] trait so the pipeline can be
//! exercised without network access. [`HttpFetcher`] is the production
//! implementation: plain GET, redirects followed, error statuses treated as
//! failures, and transient failures retried a fixed number of times with a
//! fixed delay. The body is streamed to `<dest>.part` and renamed into place
//! only once complete.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DownloadConfig;

const USER_AGENT: &str = concat!("mewmoire/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },
    #[error("Request to {url} failed: {message}")]
    Transport {
        url: String,
        message: String,
        transient: bool,
    },
    #[error("Download of {url} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, dropped connections and the HTTP statuses servers use for
    /// temporary trouble (408, 429, 500, 502, 503, 504) qualify. Local I/O
    /// errors and everything else do not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            FetchError::Transport { transient, .. } => *transient,
            FetchError::Io(_) | FetchError::RetriesExhausted { .. } => false,
        }
    }

    fn from_ureq(url: &str, err: ureq::Error) -> Self {
        let url = url.to_string();
        match err {
            ureq::Error::StatusCode(status) => FetchError::Status { url, status },
            e @ (ureq::Error::Io(_) | ureq::Error::Timeout(_) | ureq::Error::ConnectionFailed) => {
                FetchError::Transport {
                    url,
                    message: e.to_string(),
                    transient: true,
                }
            }
            e => FetchError::Transport {
                url,
                message: e.to_string(),
                transient: false,
            },
        }
    }
}

/// Download capability used by the pipeline.
pub trait FontFetcher {
    /// Fetch `url` into `dest`. On error, `dest` must not exist.
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Fixed-count, fixed-delay retry policy for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub delay: Duration,
}

impl From<&DownloadConfig> for RetryPolicy {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            retries: config.retries,
            delay: config.retry_delay(),
        }
    }
}

/// Run `op`, retrying transient failures according to `policy`.
///
/// Non-transient errors are returned immediately. Running out of retries
/// wraps the last error in [`FetchError::RetriesExhausted`].
pub fn with_retries<T>(
    policy: RetryPolicy,
    url: &str,
    mut op: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if attempts > policy.retries => {
                return Err(FetchError::RetriesExhausted {
                    url: url.to_string(),
                    attempts,
                    last: Box::new(e),
                });
            }
            Err(e) => {
                warn!(
                    "attempt {attempts} failed ({e}), retrying in {}s",
                    policy.delay.as_secs()
                );
                thread::sleep(policy.delay);
            }
        }
    }
}

/// Production fetcher backed by `ureq`.
pub struct HttpFetcher {
    agent: ureq::Agent,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            policy,
        }
    }

    /// One GET, streamed into `part`.
    ///
    /// Failures reading the body are transient; failures writing `part` are
    /// local and are not.
    fn attempt(&self, url: &str, part: &Path) -> Result<(), FetchError> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| FetchError::from_ureq(url, e))?;

        let mut reader = response.into_body().into_reader();
        let mut file = fs::File::create(part)?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        message: e.to_string(),
                        transient: true,
                    });
                }
            };
            file.write_all(&buf[..n])?;
        }
        file.sync_all()?;
        Ok(())
    }
}

impl FontFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let part = part_path(dest);
        let result = with_retries(self.policy, url, || self.attempt(url, &part))
            .and_then(|()| fs::rename(&part, dest).map_err(FetchError::from));
        if result.is_err() {
            let _ = fs::remove_file(&part);
        }
        result
    }
}

/// Staging path for an in-progress download: `<dest>.part`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// What [`ensure_source_font`] had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Cached(PathBuf),
    Downloaded(PathBuf),
}

/// Make sure the full font for this version is present at `dest`.
///
/// Idempotent: an existing file is never touched.
pub fn ensure_source_font(
    fetcher: &dyn FontFetcher,
    url: &str,
    dest: &Path,
) -> Result<FetchStatus, FetchError> {
    if dest.exists() {
        return Ok(FetchStatus::Cached(dest.to_path_buf()));
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    info!("downloading source font: {url}");
    fetcher.fetch(url, dest)?;
    Ok(FetchStatus::Downloaded(dest.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeFetcher;
    use std::cell::Cell;
    use std::net::TcpListener;
    use tempfile::TempDir;

    fn no_delay(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::ZERO,
        }
    }

    fn transient() -> FetchError {
        FetchError::Status {
            url: "u".into(),
            status: 503,
        }
    }

    // =========================================================================
    // Error classification
    // =========================================================================

    #[test]
    fn retryable_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            let e = FetchError::Status {
                url: "u".into(),
                status,
            };
            assert!(e.is_transient(), "{status} should be transient");
        }
        for status in [400, 403, 404, 410, 501] {
            let e = FetchError::Status {
                url: "u".into(),
                status,
            };
            assert!(!e.is_transient(), "{status} should be fatal");
        }
    }

    #[test]
    fn local_io_is_not_transient() {
        let e = FetchError::Io(io::Error::other("disk full"));
        assert!(!e.is_transient());
    }

    // =========================================================================
    // with_retries
    // =========================================================================

    #[test]
    fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = with_retries(no_delay(3), "u", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(transient()) } else { Ok(42) }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_retry_budget() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retries(no_delay(3), "u", || {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert_eq!(calls.get(), 4);
        match result {
            Err(FetchError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, FetchError::Status { status: 503, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[test]
    fn fatal_error_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = with_retries(no_delay(3), "u", || {
            calls.set(calls.get() + 1);
            Err(FetchError::Status {
                url: "u".into(),
                status: 404,
            })
        });
        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
    }

    // =========================================================================
    // ensure_source_font
    // =========================================================================

    #[test]
    fn existing_font_is_not_downloaded() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Font-v1.ttf");
        fs::write(&dest, b"cached").unwrap();
        let fetcher = FakeFetcher::new(b"fresh");

        let status = ensure_source_font(&fetcher, "https://x/font.ttf", &dest).unwrap();

        assert_eq!(status, FetchStatus::Cached(dest.clone()));
        assert!(fetcher.requests().is_empty());
        assert_eq!(fs::read(&dest).unwrap(), b"cached");
    }

    #[test]
    fn missing_font_is_downloaded_into_new_dir() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join(".cache/fonts/Font-v1.ttf");
        let fetcher = FakeFetcher::new(b"font bytes");

        let status = ensure_source_font(&fetcher, "https://x/font.ttf", &dest).unwrap();

        assert_eq!(status, FetchStatus::Downloaded(dest.clone()));
        assert_eq!(fetcher.requests(), vec!["https://x/font.ttf".to_string()]);
        assert_eq!(fs::read(&dest).unwrap(), b"font bytes");
    }

    #[test]
    fn download_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Font-v1.ttf");
        let fetcher = FakeFetcher::failing(404);

        let result = ensure_source_font(&fetcher, "https://x/font.ttf", &dest);

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert!(!dest.exists());
    }

    // =========================================================================
    // HttpFetcher against a local server
    // =========================================================================

    fn local_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    /// Answer one connection per response, in order. Joins to the request
    /// lines received.
    fn serve(listener: TcpListener, responses: Vec<String>) -> thread::JoinHandle<Vec<String>> {
        thread::spawn(move || {
            let mut seen = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let text = String::from_utf8_lossy(&request);
                seen.push(text.lines().next().unwrap_or_default().to_string());
                stream.write_all(response.as_bytes()).unwrap();
            }
            seen
        })
    }

    fn response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
            body.len()
        )
    }

    fn http_fetcher(retries: u32) -> HttpFetcher {
        let config = ureq::Agent::config_builder()
            .proxy(None)
            .timeout_global(Some(Duration::from_secs(10)))
            .build();
        HttpFetcher {
            agent: ureq::Agent::new_with_config(config),
            policy: no_delay(retries),
        }
    }

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path(Path::new("/cache/fonts/Font-v1.ttf")),
            PathBuf::from("/cache/fonts/Font-v1.ttf.part")
        );
    }

    #[test]
    fn http_error_status_fails_without_leaving_files() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Font-v1.ttf");
        let (listener, base) = local_server();
        let server = serve(listener, vec![response("404 Not Found", "", "")]);

        let result = http_fetcher(3).fetch(&format!("{base}/font.ttf"), &dest);

        assert!(matches!(result, Err(FetchError::Status { status: 404, .. })));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn http_transient_status_is_retried() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Font-v1.ttf");
        let (listener, base) = local_server();
        let server = serve(
            listener,
            vec![
                response("503 Service Unavailable", "", ""),
                response("200 OK", "", "font bytes"),
            ],
        );

        http_fetcher(3)
            .fetch(&format!("{base}/font.ttf"), &dest)
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"font bytes");
        assert!(!part_path(&dest).exists());
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn http_retries_run_out() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Font-v1.ttf");
        let (listener, base) = local_server();
        let server = serve(
            listener,
            vec![
                response("503 Service Unavailable", "", ""),
                response("502 Bad Gateway", "", ""),
            ],
        );

        let result = http_fetcher(1).fetch(&format!("{base}/font.ttf"), &dest);

        match result {
            Err(FetchError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, FetchError::Status { status: 502, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
        server.join().unwrap();
    }

    #[test]
    fn http_local_write_failure_is_not_retried() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("missing-dir/Font-v1.ttf");
        let (listener, base) = local_server();
        let server = serve(listener, vec![response("200 OK", "", "font bytes")]);

        let result = http_fetcher(3).fetch(&format!("{base}/font.ttf"), &dest);

        assert!(matches!(result, Err(FetchError::Io(_))));
        assert_eq!(server.join().unwrap().len(), 1);
    }

    #[test]
    fn http_redirect_is_followed() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("Font-v1.ttf");
        let (listener, base) = local_server();
        let server = serve(
            listener,
            vec![
                response("302 Found", &format!("Location: {base}/final.ttf\r\n"), ""),
                response("200 OK", "", "moved font"),
            ],
        );

        http_fetcher(0)
            .fetch(&format!("{base}/font.ttf"), &dest)
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"moved font");
        let seen = server.join().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("GET /font.ttf "), "{seen:?}");
        assert!(seen[1].starts_with("GET /final.ttf "), "{seen:?}");
    }
}
