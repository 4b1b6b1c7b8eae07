//! Error types for template filling

use std::io;
use thiserror::Error;

/// Errors that can occur while loading a template or generating a document
///
/// Every variant is fatal for the current generation: a failed call never
/// returns a partially filled package.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// ZIP archive error
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Image could not be decoded while sniffing its format or size
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Required part missing, unparseable, or of an unsupported version
    #[error("Invalid template: {0}")]
    TemplateFormatInvalid(String),

    /// A part was read or overwritten that does not exist in the package
    #[error("Part not found: {0}")]
    PartNotFound(String),

    /// A placeholder key has no value in the active scope
    #[error("No value for placeholder '{key}' (instruction: '{instruction}')")]
    PlaceholderMissing {
        /// Upper-cased key that failed to resolve
        key: String,
        /// Raw instruction text the key was extracted from
        instruction: String,
    },

    /// `generate` was called without pages
    #[error("No data pages supplied for generation")]
    NoDataForGeneration,

    /// An interceptor returned null for a placeholder
    #[error("Interceptor returned null for placeholder '{0}'")]
    InterceptorContractViolation(String),

    /// The interception chain kept substituting values past the configured cap
    #[error("Interception chain for '{key}' did not settle after {rounds} rounds")]
    InterceptionLimitExceeded {
        /// Placeholder key being intercepted
        key: String,
        /// Rounds performed before giving up
        rounds: usize,
    },

    /// No structural position accepts a foreign document insertion
    #[error("No legal anchor for document insertion at placeholder '{0}'")]
    NoLegalAnchor(String),

    /// A value contains a control character that cannot be written to the document
    #[error("Unknown formatting character U+{code:04X} in value of '{key}'")]
    UnknownFormattingCharacter {
        /// Placeholder key whose value carried the character
        key: String,
        /// Code point of the offending character
        code: u32,
    },

    /// The data model was built with an invalid or duplicate key
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type for template operations
pub type Result<T> = std::result::Result<T, TemplateError>;

impl From<quick_xml::events::attributes::AttrError> for TemplateError {
    #[inline]
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(quick_xml::Error::InvalidAttr(err))
    }
}

impl From<std::string::FromUtf8Error> for TemplateError {
    #[inline]
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::TemplateFormatInvalid(format!("part is not valid UTF-8: {err}"))
    }
}
