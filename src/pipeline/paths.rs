//! Fallback path derivation.
//!
//! The fallback for `img/logo.svg` lives next to it as `img/logo.png`. Two
//! derivations exist because older installations simply chopped three
//! characters off the source path; [`PathStrategy::FixedSuffix`] reproduces
//! that byte-for-byte so existing fallbacks are still found, while
//! [`PathStrategy::ReplaceExtension`] handles any extension length.

use crate::config::PathStrategy;
use std::path::{Path, PathBuf};

/// Format name and extension of the vector sources.
pub const VECTOR_FORMAT: &str = "svg";

/// Format name and extension of the generated fallbacks.
pub const RASTER_FORMAT: &str = "png";

/// MIME type sent with uploaded sources.
pub const VECTOR_MIME: &str = "image/svg+xml";

/// Derive the fallback path for `source`.
///
/// With [`PathStrategy::FixedSuffix`] the last three characters are replaced
/// regardless of what they are, so `logo.svgz` becomes `logo.spng`. Paths
/// that are not valid UTF-8 are converted lossily first.
pub fn fallback_path(source: &Path, strategy: PathStrategy) -> PathBuf {
    match strategy {
        PathStrategy::ReplaceExtension => source.with_extension(RASTER_FORMAT),
        PathStrategy::FixedSuffix => {
            let s = source.to_string_lossy();
            let cut = s
                .char_indices()
                .rev()
                .nth(2)
                .map(|(i, _)| i)
                .unwrap_or(0);
            PathBuf::from(format!("{}{}", &s[..cut], RASTER_FORMAT))
        }
    }
}

/// Whether a file already exists at `path`.
///
/// Errors while probing (e.g. permission denied on a parent directory) count
/// as "does not exist".
pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// File name sent along with the upload.
pub(crate) fn upload_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("input.{VECTOR_FORMAT}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_extension() {
        let p = |s: &str| fallback_path(Path::new(s), PathStrategy::ReplaceExtension);
        assert_eq!(p("img/logo.svg"), PathBuf::from("img/logo.png"));
        assert_eq!(p("img/logo.svgz"), PathBuf::from("img/logo.png"));
        assert_eq!(p("img/logo"), PathBuf::from("img/logo.png"));
        assert_eq!(p("img/my.logo.svg"), PathBuf::from("img/my.logo.png"));
    }

    #[test]
    fn fixed_suffix_matches_three_letter_extension() {
        let p = fallback_path(Path::new("img/logo.svg"), PathStrategy::FixedSuffix);
        assert_eq!(p, PathBuf::from("img/logo.png"));
    }

    #[test]
    fn fixed_suffix_is_fragile_for_other_lengths() {
        let p = fallback_path(Path::new("img/logo.svgz"), PathStrategy::FixedSuffix);
        assert_eq!(p, PathBuf::from("img/logo.spng"));
    }

    #[test]
    fn fixed_suffix_short_and_multibyte_paths() {
        assert_eq!(
            fallback_path(Path::new("ab"), PathStrategy::FixedSuffix),
            PathBuf::from("png")
        );
        assert_eq!(
            fallback_path(Path::new("bild-ä.svg"), PathStrategy::FixedSuffix),
            PathBuf::from("bild-ä.png")
        );
        assert_eq!(
            fallback_path(Path::new("äöü"), PathStrategy::FixedSuffix),
            PathBuf::from("png")
        );
    }

    #[test]
    fn upload_name_uses_file_name() {
        assert_eq!(upload_name(Path::new("img/logo.svg")), "logo.svg");
        assert_eq!(upload_name(Path::new("/")), "input.svg");
    }

    #[tokio::test]
    async fn exists_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("logo.png");
        assert!(!exists(&file).await);
        std::fs::write(&file, b"png").unwrap();
        assert!(exists(&file).await);
    }
}
