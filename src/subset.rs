//! Font subsetting through an external tool.
//!
//! Subsetting itself is delegated to `fontTools.subset`, run as a plain
//! subprocess. The [`Subsetter`] trait is the seam: [`FontToolsSubsetter`]
//! spawns Python, tests substitute a fake.
//!
//! The tool never writes the real output path directly. [`produce_subset`]
//! points it at a temporary sibling and renames on success, so a failed or
//! interrupted run leaves the previous font untouched. There is no fallback:
//! if the tool is missing or exits non-zero the build fails.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::temp_sibling;
use crate::config::SubsetConfig;

/// Shown whenever the subsetting toolchain is unusable.
pub const INSTALL_HINT: &str =
    "Please install python3 + fonttools + brotli (pip install fonttools brotli).";

#[derive(Error, Debug)]
pub enum SubsetError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Could not run `{program}`: {source}. {hint}", hint = INSTALL_HINT)]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Font subset build failed ({status}). {hint}", hint = INSTALL_HINT)]
    Failed { status: ExitStatus },
    #[error("Subsetter reported success but wrote no output: {0}")]
    MissingOutput(PathBuf),
}

/// Inputs for one subsetting run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetRequest {
    /// The full source font.
    pub source_font: PathBuf,
    /// UTF-8 file listing every character to keep.
    pub chars_file: PathBuf,
    /// Where the subset font goes.
    pub output: PathBuf,
}

/// Subsetting capability used by the pipeline.
pub trait Subsetter {
    /// Produce `request.output` from `request.source_font`.
    fn subset(&self, request: &SubsetRequest) -> Result<(), SubsetError>;
}

/// `python3 -m fontTools.subset` with layout, naming and cmap data preserved.
#[derive(Debug, Clone)]
pub struct FontToolsSubsetter {
    python: String,
    flavor: String,
}

impl FontToolsSubsetter {
    pub fn new(config: &SubsetConfig) -> Self {
        Self {
            python: config.python.clone(),
            flavor: config.flavor.clone(),
        }
    }

    /// Full argument list passed to the interpreter.
    pub fn args(&self, request: &SubsetRequest) -> Vec<OsString> {
        let mut text_file = OsString::from("--text-file=");
        text_file.push(&request.chars_file);
        let mut output_file = OsString::from("--output-file=");
        output_file.push(&request.output);

        let mut args: Vec<OsString> = vec![
            "-m".into(),
            "fontTools.subset".into(),
            request.source_font.clone().into_os_string(),
            text_file,
            output_file,
            format!("--flavor={}", self.flavor).into(),
        ];
        args.extend(
            [
                "--layout-features=*",
                "--name-IDs=*",
                "--name-legacy",
                "--name-languages=*",
                "--glyph-names",
                "--symbol-cmap",
                "--legacy-cmap",
                "--notdef-glyph",
                "--notdef-outline",
                "--recommended-glyphs",
            ]
            .map(OsString::from),
        );
        args
    }
}

impl Subsetter for FontToolsSubsetter {
    fn subset(&self, request: &SubsetRequest) -> Result<(), SubsetError> {
        let args = self.args(request);
        debug!(program = %self.python, ?args, "running subsetter");
        let status = Command::new(&self.python)
            .args(&args)
            .status()
            .map_err(|source| SubsetError::Spawn {
                program: self.python.clone(),
                source,
            })?;
        if !status.success() {
            return Err(SubsetError::Failed { status });
        }
        Ok(())
    }
}

/// Run `subsetter` and move the result onto `output` only if it succeeded.
///
/// Returns the size of the new font in bytes.
pub fn produce_subset(
    subsetter: &dyn Subsetter,
    source_font: &Path,
    chars_file: &Path,
    output: &Path,
) -> Result<u64, SubsetError> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    let staging = temp_sibling(output);
    let request = SubsetRequest {
        source_font: source_font.to_path_buf(),
        chars_file: chars_file.to_path_buf(),
        output: staging.clone(),
    };

    info!("subsetting {}", source_font.display());
    if let Err(e) = subsetter.subset(&request) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    if !staging.exists() {
        return Err(SubsetError::MissingOutput(staging));
    }
    fs::rename(&staging, output)?;
    Ok(fs::metadata(output)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::FakeSubsetter;
    use tempfile::TempDir;

    fn request() -> SubsetRequest {
        SubsetRequest {
            source_font: PathBuf::from("/cache/Font-v1.ttf"),
            chars_file: PathBuf::from("/build/chars.txt"),
            output: PathBuf::from("/out/font.woff2"),
        }
    }

    #[test]
    fn args_carry_paths_and_preservation_flags() {
        let tool = FontToolsSubsetter::new(&SubsetConfig::default());
        let args: Vec<String> = tool
            .args(&request())
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(&args[..3], ["-m", "fontTools.subset", "/cache/Font-v1.ttf"]);
        assert!(args.contains(&"--text-file=/build/chars.txt".to_string()));
        assert!(args.contains(&"--output-file=/out/font.woff2".to_string()));
        assert!(args.contains(&"--flavor=woff2".to_string()));
        for flag in [
            "--layout-features=*",
            "--name-IDs=*",
            "--glyph-names",
            "--symbol-cmap",
            "--legacy-cmap",
            "--notdef-glyph",
        ] {
            assert!(args.contains(&flag.to_string()), "missing {flag}");
        }
    }

    #[test]
    fn flavor_comes_from_config() {
        let tool = FontToolsSubsetter::new(&SubsetConfig {
            python: "python3".into(),
            flavor: "woff".into(),
        });
        let args = tool.args(&request());
        assert!(args.contains(&OsString::from("--flavor=woff")));
    }

    #[test]
    fn missing_interpreter_is_a_spawn_error_with_hint() {
        let tool = FontToolsSubsetter::new(&SubsetConfig {
            python: "/nonexistent/python-for-mewmoire-tests".into(),
            flavor: "woff2".into(),
        });
        let err = tool.subset(&request()).unwrap_err();
        assert!(matches!(err, SubsetError::Spawn { .. }));
        assert!(err.to_string().contains("fonttools"));
    }

    #[test]
    fn produce_subset_moves_output_into_place() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("fonts/out.woff2");
        let fake = FakeSubsetter::new(b"subset!");

        let bytes = produce_subset(
            &fake,
            &tmp.path().join("src.ttf"),
            &tmp.path().join("chars.txt"),
            &output,
        )
        .unwrap();

        assert_eq!(bytes, 7);
        assert_eq!(fs::read(&output).unwrap(), b"subset!");
        assert!(!temp_sibling(&output).exists());
        assert_eq!(fake.requests()[0].output, temp_sibling(&output));
    }

    #[test]
    fn failed_subset_keeps_previous_output() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("out.woff2");
        fs::write(&output, b"previous").unwrap();
        let fake = FakeSubsetter::failing();

        let result = produce_subset(
            &fake,
            &tmp.path().join("src.ttf"),
            &tmp.path().join("chars.txt"),
            &output,
        );

        assert!(result.is_err());
        assert_eq!(fs::read(&output).unwrap(), b"previous");
        assert!(!temp_sibling(&output).exists());
    }
}
