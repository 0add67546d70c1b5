use std::fmt;

use thiserror::Error;

/// Kind of scene entity a lookup failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Object,
    Armature,
    Mesh,
    Bone,
    VertexGroup,
    Modifier,
    ShapeKey,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Object => "object",
            EntityKind::Armature => "armature",
            EntityKind::Mesh => "mesh",
            EntityKind::Bone => "bone",
            EntityKind::VertexGroup => "vertex group",
            EntityKind::Modifier => "modifier",
            EntityKind::ShapeKey => "shape key",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    /// A required entity is absent. Optional bones and groups never reach
    /// this variant; they are reported as diagnostics instead.
    #[error("Missing {kind}: '{name}'")]
    MissingEntity { kind: EntityKind, name: String },

    #[error("Topology violation: {0}")]
    TopologyViolation(String),

    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),

    #[error("Shape-key bake cancelled")]
    Cancelled,
}

impl ConvertError {
    pub fn missing(kind: EntityKind, name: impl Into<String>) -> Self {
        ConvertError::MissingEntity {
            kind,
            name: name.into(),
        }
    }
}

/// Callers that surface errors as plain text (CLI, log sinks) get the display form.
impl From<ConvertError> for String {
    fn from(error: ConvertError) -> Self {
        error.to_string()
    }
}
