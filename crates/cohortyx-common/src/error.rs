use thiserror::Error;

#[derive(Debug, Error)]
pub enum CohortyxError {
    #[error("Invalid filter shape: {0}")]
    InvalidFilterShape(String),

    #[error("Molecular profile not found: {0}")]
    MolecularProfileNotFound(String),

    #[error("Generic assay not found: {0}")]
    GenericAssayNotFound(String),

    #[error("Case {case_id} in profile {molecular_profile_id} is not declared in any group")]
    UnknownGroup {
        molecular_profile_id: String,
        case_id: String,
    },

    #[error("Every supplied case set is empty; nothing to compare")]
    EmptyCaseSet,

    #[error("Duplicate group name: {0}")]
    DuplicateGroup(String),

    #[error("Invalid projection: {0}")]
    InvalidProjection(String),

    #[error("Computation cancelled")]
    Cancelled,

    #[error("Statistics error: {0}")]
    Statistics(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CohortyxError {
    /// True for errors that the caller should surface as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CohortyxError::MolecularProfileNotFound(_) | CohortyxError::GenericAssayNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CohortyxError>;
