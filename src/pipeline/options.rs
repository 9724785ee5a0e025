//! Converter options and the per-call conversion request.

use crate::config::{PathStrategy, Settings};
use crate::pipeline::paths::{self, RASTER_FORMAT, VECTOR_FORMAT, VECTOR_MIME};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sizing option passed to the converter. At most one is ever sent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConverterOptions {
    /// No sizing: the PNG inherits the SVG's dimensions. (default)
    #[default]
    None,
    /// `converteroptions[resize]`, e.g. `1000` or `1000x540`.
    Resize(String),
    /// `converteroptions[density]` in PPI, e.g. `150`.
    Density(String),
}

impl ConverterOptions {
    /// Pick the sizing option from settings: a non-empty `resize` wins over
    /// a non-empty `density`.
    pub fn from_settings(settings: &Settings) -> Self {
        if let Some(resize) = settings.resize_spec() {
            ConverterOptions::Resize(resize.to_string())
        } else if let Some(density) = settings.density_spec() {
            ConverterOptions::Density(density.to_string())
        } else {
            ConverterOptions::None
        }
    }

    /// The multipart form fields carrying this option.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            ConverterOptions::None => vec![],
            ConverterOptions::Resize(v) => vec![("converteroptions[resize]", v.clone())],
            ConverterOptions::Density(v) => vec![("converteroptions[density]", v.clone())],
        }
    }
}

/// A conversion to perform, derived fresh on every call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source_path: PathBuf,
    pub output_path: PathBuf,
    pub options: ConverterOptions,
}

impl ConversionRequest {
    pub fn new(source: &Path, settings: &Settings, strategy: PathStrategy) -> Self {
        Self {
            source_path: source.to_path_buf(),
            output_path: paths::fallback_path(source, strategy),
            options: ConverterOptions::from_settings(settings),
        }
    }

    /// Attach the source bytes, producing the upload job sent to the converter.
    pub fn into_job(self, bytes: Vec<u8>) -> ConversionJob {
        ConversionJob {
            input_format: VECTOR_FORMAT,
            output_format: RASTER_FORMAT,
            file_name: paths::upload_name(&self.source_path),
            mime: VECTOR_MIME,
            bytes,
            options: self.options,
            timeout_secs: 0,
        }
    }
}

/// Everything the converter needs for one direct-upload conversion.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub input_format: &'static str,
    pub output_format: &'static str,
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    pub options: ConverterOptions,
    /// Server-side conversion timeout; `0` means none.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for ConversionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionJob")
            .field("input_format", &self.input_format)
            .field("output_format", &self.output_format)
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .field("options", &self.options)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_wins_over_density() {
        let s = Settings::new("k").resize("1000x540").density("150");
        assert_eq!(
            ConverterOptions::from_settings(&s),
            ConverterOptions::Resize("1000x540".into())
        );
    }

    #[test]
    fn density_used_when_resize_blank() {
        let s = Settings::new("k").resize("").density("150");
        assert_eq!(
            ConverterOptions::from_settings(&s),
            ConverterOptions::Density("150".into())
        );
    }

    #[test]
    fn no_sizing_when_both_blank() {
        let s = Settings::new("k");
        assert_eq!(ConverterOptions::from_settings(&s), ConverterOptions::None);
        assert!(ConverterOptions::None.form_fields().is_empty());
    }

    #[test]
    fn form_fields_carry_single_option() {
        let fields = ConverterOptions::Resize("1000".into()).form_fields();
        assert_eq!(fields, vec![("converteroptions[resize]", "1000".to_string())]);
    }

    #[test]
    fn request_into_job() {
        let s = Settings::new("k").density("150");
        let req = ConversionRequest::new(
            Path::new("img/logo.svg"),
            &s,
            PathStrategy::ReplaceExtension,
        );
        assert_eq!(req.output_path, PathBuf::from("img/logo.png"));

        let job = req.into_job(b"<svg/>".to_vec());
        assert_eq!(job.input_format, "svg");
        assert_eq!(job.output_format, "png");
        assert_eq!(job.file_name, "logo.svg");
        assert_eq!(job.timeout_secs, 0);
        assert_eq!(job.options, ConverterOptions::Density("150".into()));
        assert!(format!("{job:?}").contains("bytes: 6"));
    }
}
