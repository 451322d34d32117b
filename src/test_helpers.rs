//! Shared test utilities: throwaway site trees and fakes for the two
//! external boundaries (download and subsetting).
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = site_with(&[("src/index.md", "hello 世界")]);
//! let fetcher = FakeFetcher::new(b"ttf");
//! let subsetter = FakeSubsetter::new(b"woff2");
//! // ... run the pipeline against site.path() ...
//! assert_eq!(fetcher.requests().len(), 1);
//! ```

use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::Path;
use tempfile::TempDir;

use crate::fetch::{FetchError, FontFetcher};
use crate::subset::{SubsetError, SubsetRequest, Subsetter};

// =========================================================================
// Fixture setup
// =========================================================================

/// Create a temp project root containing `files` (relative path, content).
pub fn site_with(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("src")).unwrap();
    for (rel, content) in files {
        write_file(tmp.path(), rel, content);
    }
    tmp
}

/// Write `content` at `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

// =========================================================================
// Fakes
// =========================================================================

/// Fetcher that writes fixed bytes (or fails) and records every URL.
pub struct FakeFetcher {
    body: Vec<u8>,
    fail_status: Option<u16>,
    requests: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            fail_status: None,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Every fetch fails with this HTTP status.
    pub fn failing(status: u16) -> Self {
        Self {
            body: Vec::new(),
            fail_status: Some(status),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl FontFetcher for FakeFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        self.requests.borrow_mut().push(url.to_string());
        if let Some(status) = self.fail_status {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        fs::write(dest, &self.body)?;
        Ok(())
    }
}

/// Subsetter that writes fixed bytes to the requested output (or fails)
/// and records every request.
pub struct FakeSubsetter {
    output: Vec<u8>,
    fail: bool,
    requests: RefCell<Vec<SubsetRequest>>,
}

impl FakeSubsetter {
    pub fn new(output: &[u8]) -> Self {
        Self {
            output: output.to_vec(),
            fail: false,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Every run fails as if the toolchain were missing.
    pub fn failing() -> Self {
        Self {
            output: Vec::new(),
            fail: true,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SubsetRequest> {
        self.requests.borrow().clone()
    }
}

impl Subsetter for FakeSubsetter {
    fn subset(&self, request: &SubsetRequest) -> Result<(), SubsetError> {
        self.requests.borrow_mut().push(request.clone());
        if self.fail {
            return Err(SubsetError::Spawn {
                program: "python3".into(),
                source: io::Error::new(io::ErrorKind::NotFound, "not installed"),
            });
        }
        fs::write(&request.output, &self.output)?;
        Ok(())
    }
}
