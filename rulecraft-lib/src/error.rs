use thiserror::Error;

/// Result type for rule engine operations.
pub type Result<T> = std::result::Result<T, CssError>;

/// Errors raised while building or loading rules and stylesheets.
#[derive(Error, Debug)]
pub enum CssError {
    /// The selector was rejected by the CSS parser.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// One or more initial style properties are neither known nor custom.
    #[error("invalid style properties: {}", .0.join(", "))]
    InvalidProperties(Vec<String>),

    /// A single style write used an unknown property name.
    #[error("invalid style property: {0}")]
    InvalidProperty(String),

    /// A stylesheet definition or engine config could not be parsed.
    #[error("invalid definition: {0}")]
    Definition(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
