use thiserror::Error;

/// Main error type for the meeting grid pipeline.
/// Aggregates errors from the standard library, dependencies and internal modules.
#[derive(Error, Debug)]
pub enum MeetingGridError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    ConfigError(#[from] toml::de::Error),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    // Document module errors
    #[error("{0}")]
    DocumentError(#[from] crate::document::DocumentError),

    // Schedule module errors
    #[error("{0}")]
    GridError(#[from] crate::schedule::grid::GridError),

    // Text service errors
    #[error("{0}")]
    OracleError(#[from] crate::oracle::OracleError),
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, MeetingGridError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| MeetingGridError::WithContextError(format!("{}: {}", message, e)))
    }
}
