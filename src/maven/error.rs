/// Structural and parse failures of the descriptor model. These are properties of the input data:
///  they are reported to every caller and never memoized by a cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("coordinate has no artifactId")]
    MissingArtifactId,

    #[error("{coordinate} has no groupId and no parent to inherit it from")]
    MissingGroupId { coordinate: String },

    #[error("{coordinate} has no version and no parent to inherit it from")]
    MissingVersion { coordinate: String },

    #[error("invalid scope {0:?}")]
    InvalidScope(String),

    #[error("{coordinate} is its own ancestor")]
    CyclicAncestry { coordinate: String },

    #[error("descriptor handle {0} does not belong to this session")]
    UnknownPom(usize),
}
