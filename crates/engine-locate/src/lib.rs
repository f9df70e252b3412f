//! # engine-locate
//!
//! Find the executable of an external conversion engine (LibreOffice,
//! Chromium) and vet it before anything is allowed to run it.
//!
//! ## Resolution order
//!
//! [`locate`] walks the candidates in a fixed priority order and returns the
//! first one that both passes [`validate_candidate`] and exists on disk:
//!
//! 1. **Forced bundled**: when [`LocateOptions::force_bundled`] is set, only
//!    the copy shipped next to the application is considered.
//! 2. **Config override**: [`LocateOptions::override_path`].
//! 3. **Environment override**: the engine's environment variable
//!    (e.g. `DOCCONV_SOFFICE_PATH`).
//! 4. **System install directories**: well-known per-platform locations.
//! 5. **Bundled fallback**: the application-relative path, which may be
//!    absent. If it is, the caller gets [`LocateError::NotFound`] listing
//!    every location that was searched.
//!
//! ## Validation
//!
//! A candidate is rejected unless its lexically normalised form
//!
//! - is absolute and does not escape the filesystem root via `..`,
//! - has exactly one of the engine's expected `(parent dir, file name)` pairs
//!   as its last two components, and
//! - sits under one of the allowed base directories: the application's own
//!   directory, the platform's program directories, or roots explicitly
//!   added by the caller.
//!
//! Per-user directories such as `~/.local/bin` are writable by the user and
//! are never trusted implicitly; list them in
//! [`LocateOptions::extra_roots`] to allow an engine installed there.
//!
//! Rejected candidates are logged with `tracing::warn!` and skipped: they are
//! never returned and therefore never executed.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

// ── Specs ────────────────────────────────────────────────────────────────────

/// One acceptable `(parent directory, executable file name)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub parent: &'static str,
    pub file: &'static str,
}

/// Static description of where an engine executable may live.
#[derive(Debug, Clone, Copy)]
pub struct ExecutableSpec {
    /// Short engine name used in logs and errors.
    pub engine: &'static str,
    /// Exact `(parent, file)` pairs a valid path must end with.
    pub candidates: &'static [Candidate],
    /// Absolute install locations tried in order.
    pub system_paths: &'static [&'static str],
    /// Location of the bundled copy, relative to the application directory.
    pub bundled: &'static str,
    /// Environment variable holding an override path.
    pub env_var: &'static str,
}

/// LibreOffice's `soffice` launcher for the current platform.
pub fn libreoffice() -> ExecutableSpec {
    if cfg!(windows) {
        ExecutableSpec {
            engine: "libreoffice",
            candidates: &[Candidate {
                parent: "program",
                file: "soffice.exe",
            }],
            system_paths: &[
                r"C:\Program Files\LibreOffice\program\soffice.exe",
                r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
            ],
            bundled: r"resources\libreoffice\program\soffice.exe",
            env_var: "DOCCONV_SOFFICE_PATH",
        }
    } else if cfg!(target_os = "macos") {
        ExecutableSpec {
            engine: "libreoffice",
            candidates: &[Candidate {
                parent: "MacOS",
                file: "soffice",
            }],
            system_paths: &["/Applications/LibreOffice.app/Contents/MacOS/soffice"],
            bundled: "resources/LibreOffice.app/Contents/MacOS/soffice",
            env_var: "DOCCONV_SOFFICE_PATH",
        }
    } else {
        ExecutableSpec {
            engine: "libreoffice",
            candidates: &[Candidate {
                parent: "program",
                file: "soffice",
            }],
            system_paths: &[
                "/usr/lib/libreoffice/program/soffice",
                "/usr/lib64/libreoffice/program/soffice",
                "/usr/local/lib/libreoffice/program/soffice",
                "/opt/libreoffice/program/soffice",
            ],
            bundled: "resources/libreoffice/program/soffice",
            env_var: "DOCCONV_SOFFICE_PATH",
        }
    }
}

/// A headless-capable Chromium build (Chromium, Chrome, or Edge on Windows).
pub fn chromium() -> ExecutableSpec {
    if cfg!(windows) {
        ExecutableSpec {
            engine: "chromium",
            candidates: &[
                Candidate {
                    parent: "Application",
                    file: "chrome.exe",
                },
                Candidate {
                    parent: "Application",
                    file: "msedge.exe",
                },
            ],
            system_paths: &[
                r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            ],
            bundled: r"resources\chromium\Application\chrome.exe",
            env_var: "DOCCONV_CHROMIUM_PATH",
        }
    } else if cfg!(target_os = "macos") {
        ExecutableSpec {
            engine: "chromium",
            candidates: &[
                Candidate {
                    parent: "MacOS",
                    file: "Chromium",
                },
                Candidate {
                    parent: "MacOS",
                    file: "Google Chrome",
                },
            ],
            system_paths: &[
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ],
            bundled: "resources/Chromium.app/Contents/MacOS/Chromium",
            env_var: "DOCCONV_CHROMIUM_PATH",
        }
    } else {
        ExecutableSpec {
            engine: "chromium",
            candidates: &[
                Candidate {
                    parent: "chromium",
                    file: "chromium",
                },
                Candidate {
                    parent: "chrome",
                    file: "chrome",
                },
                Candidate {
                    parent: "bin",
                    file: "chromium",
                },
                Candidate {
                    parent: "bin",
                    file: "chromium-browser",
                },
                Candidate {
                    parent: "bin",
                    file: "google-chrome",
                },
            ],
            system_paths: &[
                "/usr/lib/chromium/chromium",
                "/opt/google/chrome/chrome",
                "/usr/bin/chromium",
                "/usr/bin/chromium-browser",
                "/usr/bin/google-chrome",
            ],
            bundled: "resources/chromium/chromium",
            env_var: "DOCCONV_CHROMIUM_PATH",
        }
    }
}

/// Platform program directories every engine may live under.
fn system_roots() -> &'static [&'static str] {
    if cfg!(windows) {
        &[r"C:\Program Files", r"C:\Program Files (x86)"]
    } else if cfg!(target_os = "macos") {
        &["/Applications", "/usr/local", "/opt/homebrew"]
    } else {
        &[
            "/usr/lib",
            "/usr/lib64",
            "/usr/local/lib",
            "/usr/bin",
            "/usr/local/bin",
            "/opt",
        ]
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Why a candidate path failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("path is not absolute")]
    NotAbsolute,

    #[error("path escapes the filesystem root")]
    Traversal,

    #[error("unexpected executable name '{found}'")]
    UnexpectedBinary { found: String },

    #[error("executable '{file}' is not inside an expected '{expected}' directory (found '{found}')")]
    UnexpectedParent {
        file: String,
        expected: String,
        found: String,
    },

    #[error("path is outside every allowed base directory")]
    OutsideAllowList,
}

/// Errors returned by [`locate`].
#[derive(Debug, Error)]
pub enum LocateError {
    /// No candidate was both valid and present on disk.
    #[error("{engine} executable not found (searched {} location(s), rejected {})", searched.len(), rejected.len())]
    NotFound {
        engine: &'static str,
        searched: Vec<PathBuf>,
        rejected: Vec<(PathBuf, RejectReason)>,
    },
}

// ── Options / results ────────────────────────────────────────────────────────

/// Caller-controlled knobs for [`locate`].
#[derive(Debug, Clone)]
pub struct LocateOptions {
    /// Only accept the bundled copy.
    pub force_bundled: bool,
    /// Explicit path from configuration; highest priority after `force_bundled`.
    pub override_path: Option<PathBuf>,
    /// Application directory; anchors the bundled path and the allow-list.
    pub app_dir: Option<PathBuf>,
    /// Additional allowed base directories.
    pub extra_roots: Vec<PathBuf>,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            force_bundled: false,
            override_path: None,
            app_dir: current_app_dir(),
            extra_roots: Vec::new(),
        }
    }
}

impl LocateOptions {
    /// Every base directory a valid executable may sit under.
    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        let mut roots: Vec<PathBuf> = system_roots().iter().map(PathBuf::from).collect();
        if let Some(ref app) = self.app_dir {
            roots.push(app.clone());
        }
        roots.extend(self.extra_roots.iter().cloned());
        roots
            .into_iter()
            .filter_map(|r| normalize(&r))
            .collect()
    }
}

/// Where a located executable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Bundled,
    Config,
    Environment,
    System,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Source::Bundled => "bundled",
            Source::Config => "config",
            Source::Environment => "environment",
            Source::System => "system",
        };
        f.write_str(s)
    }
}

/// A validated, existing executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub path: PathBuf,
    pub source: Source,
}

/// Directory containing the running executable.
pub fn current_app_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Resolve `spec` to an existing executable that passes validation.
pub fn locate(spec: &ExecutableSpec, opts: &LocateOptions) -> Result<Located, LocateError> {
    let roots = opts.allowed_roots();
    let bundled = opts.app_dir.as_ref().map(|dir| dir.join(spec.bundled));
    let mut search = Search {
        spec,
        roots: &roots,
        searched: Vec::new(),
        rejected: Vec::new(),
    };

    if opts.force_bundled {
        if let Some(ref path) = bundled {
            if let Some(found) = search.try_path(path, Source::Bundled) {
                return Ok(found);
            }
        }
        return Err(search.not_found());
    }

    if let Some(ref path) = opts.override_path {
        if let Some(found) = search.try_path(path, Source::Config) {
            return Ok(found);
        }
    }

    if let Some(value) = std::env::var_os(spec.env_var) {
        if !value.is_empty() {
            if let Some(found) = search.try_path(Path::new(&value), Source::Environment) {
                return Ok(found);
            }
        }
    }

    for sys in spec.system_paths {
        if let Some(found) = search.try_path(Path::new(sys), Source::System) {
            return Ok(found);
        }
    }

    if let Some(ref path) = bundled {
        if let Some(found) = search.try_path(path, Source::Bundled) {
            return Ok(found);
        }
    }

    Err(search.not_found())
}

/// Validate `path` against `spec` and the allowed `roots`.
///
/// Returns the normalised path on success. Does not touch the filesystem.
pub fn validate_candidate(
    spec: &ExecutableSpec,
    path: &Path,
    roots: &[PathBuf],
) -> Result<PathBuf, RejectReason> {
    if !path.is_absolute() {
        return Err(RejectReason::NotAbsolute);
    }
    let normalized = normalize(path).ok_or(RejectReason::Traversal)?;

    let file = normalized
        .file_name()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default()
        .into_owned();
    let parent = normalized
        .parent()
        .and_then(Path::file_name)
        .map(OsStr::to_string_lossy)
        .unwrap_or_default()
        .into_owned();

    let by_file: Vec<&Candidate> = spec
        .candidates
        .iter()
        .filter(|c| name_eq(c.file, &file))
        .collect();
    if by_file.is_empty() {
        return Err(RejectReason::UnexpectedBinary { found: file });
    }
    if !by_file.iter().any(|c| name_eq(c.parent, &parent)) {
        let expected = by_file
            .iter()
            .map(|c| c.parent)
            .collect::<Vec<_>>()
            .join("|");
        return Err(RejectReason::UnexpectedParent {
            file,
            expected,
            found: parent,
        });
    }

    if !roots.iter().any(|root| normalized.starts_with(root)) {
        return Err(RejectReason::OutsideAllowList);
    }

    Ok(normalized)
}

/// Lexically normalise `path`: drop `.`, resolve `..` against preceding
/// components. Returns `None` when `..` would climb above the root.
pub fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let has_normal = out
                    .components()
                    .next_back()
                    .is_some_and(|c| matches!(c, Component::Normal(_)));
                if !has_normal {
                    return None;
                }
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

struct Search<'a> {
    spec: &'a ExecutableSpec,
    roots: &'a [PathBuf],
    searched: Vec<PathBuf>,
    rejected: Vec<(PathBuf, RejectReason)>,
}

impl Search<'_> {
    fn try_path(&mut self, path: &Path, source: Source) -> Option<Located> {
        self.searched.push(path.to_path_buf());
        match validate_candidate(self.spec, path, self.roots) {
            Err(reason) => {
                warn!(
                    engine = self.spec.engine,
                    path = %path.display(),
                    %source,
                    "rejecting engine candidate: {reason}"
                );
                self.rejected.push((path.to_path_buf(), reason));
                None
            }
            Ok(normalized) if normalized.is_file() => {
                debug!(
                    engine = self.spec.engine,
                    path = %normalized.display(),
                    %source,
                    "engine located"
                );
                Some(Located {
                    path: normalized,
                    source,
                })
            }
            Ok(_) => None,
        }
    }

    fn not_found(self) -> LocateError {
        LocateError::NotFound {
            engine: self.spec.engine,
            searched: self.searched,
            rejected: self.rejected,
        }
    }
}

fn name_eq(expected: &str, found: &str) -> bool {
    if cfg!(windows) {
        expected.eq_ignore_ascii_case(found)
    } else {
        expected == found
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
