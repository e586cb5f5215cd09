//! Error types for infrakit synthesis.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing configuration for {resource}: {}", .fields.join(", "))]
    MissingConfiguration {
        resource: String,
        fields: Vec<String>,
    },

    #[error("undeclared artifact '{artifact}' referenced by {referenced_by}")]
    UndeclaredArtifact {
        artifact: String,
        referenced_by: String,
    },

    #[error("artifact '{artifact}' is already declared in stage '{stage}'")]
    DuplicateArtifact { artifact: String, stage: String },

    #[error("duplicate stage: {0}")]
    DuplicateStage(String),

    #[error(
        "stage '{stage}' consumes artifact '{artifact}' produced by stage '{producer}', which does not run before it"
    )]
    ForwardArtifactReference {
        stage: String,
        artifact: String,
        producer: String,
    },

    #[error("cycle detected in dependencies: {0}")]
    CycleDetected(String),

    #[error("construct '{path}' already exists in stack '{stack}'")]
    DuplicateConstruct { stack: String, path: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("{kind} lookup failed for '{name}': {message}")]
    ExternalLookup {
        kind: String,
        name: String,
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn missing(resource: impl Into<String>, fields: Vec<&str>) -> Self {
        Error::MissingConfiguration {
            resource: resource.into(),
            fields: fields.into_iter().map(String::from).collect(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn lookup(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::ExternalLookup {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Names of the required fields that are unset.
///
/// Each entry pairs a field name with whether it is present; the returned list
/// keeps the order given so error messages are stable.
pub fn missing_fields<'a>(checks: &[(&'a str, bool)]) -> Vec<&'a str> {
    checks
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect()
}

pub type Result<T> = std::result::Result<T, Error>;
