use thiserror::Error;

use super::types::BlockNum;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum SlateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Disk full: no unused block available")]
    DiskFull,

    #[error("Out of bounds: {0}")]
    OutOfBound(i32),

    #[error("Block {0} is not valid for this operation")]
    InvalidBlock(BlockNum),

    #[error("Operation not permitted on a catalog relation")]
    NotPermitted,

    #[error("Attribute has no index")]
    NoIndex,

    #[error("No record satisfies the condition")]
    NotFound,

    #[error("Relation catalog is full")]
    MaxRelations,

    #[error("Relation {0} already exists")]
    RelationExists(String),

    #[error("Relation {0} does not exist")]
    RelationNotFound(String),

    #[error("Relation {0} is open")]
    RelationOpen(String),

    #[error("Relation id {0} is not open")]
    RelationNotOpen(i32),

    #[error("Attribute {0} already exists")]
    AttributeExists(String),

    #[error("Attribute {0} does not exist")]
    AttributeNotFound(String),

    #[error("Open relation table is full")]
    CacheFull,
}

pub type Result<T> = std::result::Result<T, SlateError>;
