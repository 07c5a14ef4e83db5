use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty delimiter, duplicate strategy, etc.).
    ConfigValidation(String),
    /// JSON input could not be parsed into the expected shape.
    Json { source: String, message: String },
    /// CSV input could not be read.
    Csv(String),
    /// Registry document is structurally unusable.
    InvalidRegistry(String),
}

impl ReconError {
    pub(crate) fn json(source: &str, err: serde_json::Error) -> Self {
        Self::Json {
            source: source.into(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Json { source, message } => write!(f, "{source}: invalid JSON: {message}"),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::InvalidRegistry(msg) => write!(f, "invalid registry: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
