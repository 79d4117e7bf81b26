use std::path::PathBuf;

use thiserror::Error;

use crate::TensorShape;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("invalid shape ({0}): every dimension must be positive")]
    InvalidShape(TensorShape),
    #[error("invalid name: {0}")]
    InvalidName(&'static str),
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed graph: {0}")]
    Graph(String),
    #[error("failed to serialize graph: {0}")]
    Serialize(String),
    #[error("failed to parse IR document: {0}")]
    Parse(String),
}

pub type IrResult<T> = Result<T, IrError>;

pub(crate) fn parse_err(err: impl std::fmt::Display) -> IrError {
    IrError::Parse(err.to_string())
}
