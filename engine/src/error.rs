use thiserror::Error;

/// Failures surfaced by the engine.
///
/// None of these halt an encounter mid-frame: lookups fail before any state
/// is touched, and the scheduler logs them before handing them back.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown adversary '{0}'")]
    UnknownAdversary(String),

    #[error("unknown reward table '{0}'")]
    UnknownRewardTable(String),

    #[error("{0} is not available")]
    CollaboratorUnavailable(&'static str),

    #[error("no previous encounter to restart")]
    NoPreviousEncounter,

    #[error("unsupported content format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
