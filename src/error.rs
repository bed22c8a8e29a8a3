use std::path::PathBuf;

/// Failure to turn an attribute expression into a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("failed to evaluate expression: {0}")]
    Expression(String),
    #[error("expression depends on unknown values")]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReferenceError {
    #[error("not a reference: no scope traversal in `{0}`")]
    NotATraversal(String),
    #[error("no references in template")]
    EmptyTemplate,
    #[error("empty reference")]
    Empty,
    #[error("no referenced block found in `{0}`")]
    NoMatchingBlock(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("failed to parse {path}: {message}")]
    Syntax { path: PathBuf, message: String },
    #[error("invalid JSON in {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("module `{name}` has no source attribute")]
    MissingSource { name: String },
    #[error("missing module with source '{source_addr}' - try to 'terraform init' first")]
    UnresolvedSource { source_addr: String },
}
