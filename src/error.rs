// Error taxonomy for the simulation core and its file formats

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeniaError {
    #[error("slot {slot} is out of range for capacity {capacity}")]
    SlotOutOfRange { slot: usize, capacity: usize },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("unsupported config format for {0} (expected .yaml, .yml or .json)")]
    UnsupportedConfigFormat(String),

    #[error("failed to load goal image {path}: {message}")]
    ImageLoad { path: String, message: String },
}

impl LeniaError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LeniaError>;
