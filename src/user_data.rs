//! User-data resolution for new servers.
//!
//! User-data can be provided either inline (for example `#cloud-config`) or
//! via a file path. Configuration and CLI overrides both resolve through
//! here.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while resolving user-data.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum UserDataError {
    /// Raised when both inline and file sources are provided.
    #[error("user-data cannot be provided both inline and via file")]
    BothProvided,
    /// Raised when an inline payload is empty or only whitespace.
    #[error("user-data must not be empty")]
    InlineEmpty,
    /// Raised when a file path is empty or only whitespace.
    #[error("user-data file path must not be empty")]
    FilePathEmpty,
    /// Raised when a file resolves to empty or only whitespace.
    #[error("user-data file must not be empty")]
    FileEmpty,
    /// Raised when reading the file source fails.
    #[error("failed to read user-data file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Resolves user-data from either an inline value or a file.
///
/// The sources are mutually exclusive. Emptiness checks trim whitespace but
/// the returned payload is the original content.
///
/// # Errors
///
/// Returns [`UserDataError`] when the inputs are invalid or the file cannot
/// be read.
pub fn resolve_user_data(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, UserDataError> {
    if inline.is_some() && file.is_some() {
        return Err(UserDataError::BothProvided);
    }

    if let Some(payload) = inline {
        if payload.trim().is_empty() {
            return Err(UserDataError::InlineEmpty);
        }
        return Ok(Some(payload.to_owned()));
    }

    let Some(path) = file else {
        return Ok(None);
    };

    if path.trim().is_empty() {
        return Err(UserDataError::FilePathEmpty);
    }

    let expanded = expand_tilde(path);
    let content = read_to_string_ambient(&expanded).map_err(|message| UserDataError::FileRead {
        path: expanded.clone(),
        message,
    })?;

    if content.trim().is_empty() {
        return Err(UserDataError::FileEmpty);
    }

    Ok(Some(content))
}

/// Expands a leading `~/` to `$HOME`; other paths are returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    #[test]
    fn rejects_both_sources() {
        let result = resolve_user_data(Some("#cloud-config"), Some("/tmp/user-data"));
        assert_eq!(result, Err(UserDataError::BothProvided));
    }

    #[test]
    fn absent_sources_resolve_to_none() {
        assert_eq!(resolve_user_data(None, None), Ok(None));
    }

    #[test]
    fn inline_payload_is_preserved() {
        let payload = "#cloud-config\npackages: [htop]\n";
        assert_eq!(
            resolve_user_data(Some(payload), None),
            Ok(Some(payload.to_owned()))
        );
    }

    #[test]
    fn reads_payload_from_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("user-data.yaml");
        fs::write(&path, "#cloud-config\n").expect("write user-data");
        let path_str = path.to_str().expect("utf8 path");

        assert_eq!(
            resolve_user_data(None, Some(path_str)),
            Ok(Some(String::from("#cloud-config\n")))
        );
    }

    #[test]
    fn blank_file_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("empty");
        fs::write(&path, "  \n").expect("write user-data");
        let path_str = path.to_str().expect("utf8 path");

        assert_eq!(
            resolve_user_data(None, Some(path_str)),
            Err(UserDataError::FileEmpty)
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let result = resolve_user_data(None, Some("/nonexistent/hcloud-imager/user-data"));
        assert!(
            matches!(
                result,
                Err(UserDataError::FileRead { ref path, .. }) if path.ends_with("user-data")
            ),
            "unexpected result: {result:?}"
        );
    }
}
