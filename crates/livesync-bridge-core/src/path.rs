//! Translation between a peer's local namespace and the hub's global one.
//!
//! A local path is the global path joined under the peer's base directory
//! with POSIX semantics. Two quirks are kept for compatibility with existing
//! vaults:
//!
//! - a join that collapses to `.` is the empty string (the namespace root);
//! - a local path starting with [`RESERVED_PREFIX`] gets a leading `/`, and
//!   the prefix character is stripped again on the way back.
//!
//! The base-dir strip in [`PathTranslator::to_global_path`] is a plain string
//! prefix strip, so base directories should end with `/` (or be empty) for
//! `to_global_path(to_local_path(p)) == p` to hold.

/// Paths beginning with this character are escaped in the local namespace.
pub const RESERVED_PREFIX: char = '_';

/// Maps paths between one peer's local namespace and the global namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTranslator {
    base_dir: String,
}

impl PathTranslator {
    /// Create a translator rooted at `base_dir`.
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The configured base directory.
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Global path to local path.
    pub fn to_local_path(&self, global_path: &str) -> String {
        let joined = join_posix(&self.base_dir, global_path);
        let relative = if joined == "." { String::new() } else { joined };
        if relative.starts_with(RESERVED_PREFIX) {
            format!("/{}", relative)
        } else {
            relative
        }
    }

    /// Local path to global path.
    pub fn to_global_path(&self, local_path: &str) -> String {
        let path = local_path
            .strip_prefix(RESERVED_PREFIX)
            .unwrap_or(local_path);
        path.strip_prefix(self.base_dir.as_str())
            .unwrap_or(path)
            .to_string()
    }
}

/// Join two path segments and normalize the result, POSIX style.
///
/// Empty segments are skipped; an empty join is `.`.
pub fn join_posix(base: &str, path: &str) -> String {
    let joined = match (base.is_empty(), path.is_empty()) {
        (true, true) => return ".".to_string(),
        (false, true) => base.to_string(),
        (true, false) => path.to_string(),
        (false, false) => format!("{}/{}", base, path),
    };
    normalize_posix(&joined)
}

/// Normalize a POSIX path: drop empty and `.` components and resolve `..`.
///
/// A leading `/` and a trailing `/` are preserved. `..` above the root of an
/// absolute path is dropped; in a relative path it is kept.
pub fn normalize_posix(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }

    let is_absolute = path.starts_with('/');
    let trailing_separator = path.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().map_or(false, |last| *last != "..") {
                    segments.pop();
                } else if !is_absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let mut normalized = segments.join("/");
    if normalized.is_empty() && !is_absolute {
        normalized.push('.');
    }
    if !normalized.is_empty() && trailing_separator {
        normalized.push('/');
    }
    if is_absolute {
        normalized.insert(0, '/');
    }
    normalized
}
