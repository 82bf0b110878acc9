use std::path::PathBuf;
use thiserror::Error;

/// 要素レコード単位の取込エラー（要素は収集対象から除外される）
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("header decode failed")]
    HeaderDecode,

    #[error("no coordinate data")]
    NoCoordinateData,

    #[error("unexpected data count: expected {expected}, found {found}")]
    UnexpectedDataCount { expected: i32, found: i32 },

    #[error("unsupported data dimension: {0}")]
    UnsupportedDataDimension(i32),

    #[error("degenerate circle: sample points are collinear")]
    DegenerateCircle,

    #[error("record {index} is missing (element declares {declared} records)")]
    MissingRecord { index: usize, declared: i32 },

    #[error("point data count {0} is not supported (only symbol points with 0 are read)")]
    UnsupportedPointData(i32),

    #[error("direction needs two coordinates, found {0}")]
    DirectionTooShort(usize),

    #[error("element appears before any mesh header")]
    NoMesh,

    #[error("note text is truncated")]
    TextTruncated,
}

#[derive(Debug, Error)]
pub enum DmError {
    #[error("DM directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("no DM files in directory: {path}")]
    NoDmFiles { path: PathBuf },

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid DM source definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid record: {0}")]
    Record(#[from] RecordError),

    #[error("expression error at {position}: {message}")]
    Expression { message: String, position: usize },

    #[error("invalid subset string: {0}")]
    Predicate(String),

    #[error("coordinate transform failed: {0}")]
    Transform(String),

    #[error("invalid data source uri: {0}")]
    InvalidUri(String),
}

impl DmError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DmError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn expression(message: impl Into<String>, position: usize) -> Self {
        DmError::Expression {
            message: message.into(),
            position,
        }
    }
}

pub type Result<T> = std::result::Result<T, DmError>;
