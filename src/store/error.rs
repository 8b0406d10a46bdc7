// Privacy Guard — Store error types

use thiserror::Error;

use crate::error::ResultCode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cannot open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cannot create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned")]
    Poisoned,

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl StoreError {
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Database(_) | Self::Poisoned => ResultCode::DbError,
            Self::Open { .. } | Self::Io(_) => ResultCode::IoError,
            Self::InvalidValue(_) => ResultCode::InvalidParameter,
        }
    }
}
