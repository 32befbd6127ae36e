use std::path::{Path, PathBuf};

use crate::foundation::error::{ReelError, ReelResult};

/// Turns opaque media references into readable local paths.
#[derive(Clone, Debug)]
pub struct MediaResolver {
    root: PathBuf,
}

impl MediaResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `reference` to an existing file.
    ///
    /// Accepts plain paths and `file://` URLs; relative paths are taken from the media root. Remote
    /// schemes are not fetched and report [`ReelError::MediaNotFound`].
    pub fn resolve(&self, reference: &str) -> ReelResult<PathBuf> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ReelError::media_not_found("empty media reference"));
        }

        let raw = match reference.strip_prefix("file://") {
            Some(rest) => rest,
            None if has_remote_scheme(reference) => {
                return Err(ReelError::media_not_found(format!(
                    "remote media is not fetched: {reference}"
                )));
            }
            None => reference,
        };

        let path = Path::new(raw);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !path.is_file() {
            return Err(ReelError::media_not_found(path.display().to_string()));
        }
        Ok(path)
    }
}

fn has_remote_scheme(reference: &str) -> bool {
    match reference.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        }
        None => false,
    }
}
