// ABOUTME: Conversion from sqlx errors into AppError with transient/permanent classification
// ABOUTME: Busy/locked databases, pool timeouts, and I/O failures map to StorageUnavailable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{AppError, ErrorCode};

/// SQLite primary result codes that indicate contention rather than a broken query
const SQLITE_BUSY: u32 = 5;
const SQLITE_LOCKED: u32 = 6;

fn is_contention(error: &dyn sqlx::error::DatabaseError) -> bool {
    error
        .code()
        .and_then(|code| code.parse::<u32>().ok())
        // Extended result codes keep the primary code in the low byte
        .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        let code = match &error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ErrorCode::StorageUnavailable,
            sqlx::Error::Database(db_error) if is_contention(db_error.as_ref()) => {
                ErrorCode::StorageUnavailable
            }
            sqlx::Error::RowNotFound => ErrorCode::ResourceNotFound,
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::Encode(_)
            | sqlx::Error::TypeNotFound { .. } => ErrorCode::SerializationError,
            sqlx::Error::Configuration(_) => ErrorCode::ConfigInvalid,
            _ => ErrorCode::DatabaseError,
        };

        Self::new(code, error.to_string()).with_source(error)
    }
}
