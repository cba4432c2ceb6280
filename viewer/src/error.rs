use thiserror::Error;

/// Rejections at the `load_data` boundary. Previously loaded state is kept.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset payload must be a JSON object")]
    NotAnObject,
    #[error("dataset payload has no `signals` field")]
    MissingSignals,
    #[error("dataset `signals` field must be an array")]
    SignalsNotArray,
    #[error("signal #{index} is malformed: {source}")]
    InvalidSignal {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("signal #{index} has an empty name")]
    EmptySignalName { index: usize },
    #[error("signal name '{name}' has an empty path segment")]
    EmptyNameSegment { name: String },
    #[error("signal name '{name}' appears more than once")]
    DuplicateSignal { name: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store '{store}' is not configured")]
    UnknownStore { store: String },
    #[error("cache store '{store}' holds a different value type")]
    TypeMismatch { store: String },
    #[error("cache store '{store}' is busy (reentrant write)")]
    StoreBusy { store: String },
    #[error("cache store '{store}' is not guarded and has no shared handle")]
    NotGuarded { store: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse viewer config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported viewer config version '{0}'")]
    UnsupportedVersion(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("preference storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode preferences: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
