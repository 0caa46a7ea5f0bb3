//! Error types.
//!
//! Reactive reads and writes never fail; a rejected write is logged and
//! absorbed. Only a few convenience APIs report errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReactivityError {
    #[error("cannot write to a computed value without a setter")]
    ReadonlyComputed,

    #[error("value graph contains a cycle")]
    CyclicValue,

    #[error("number {0} has no JSON representation")]
    NonFiniteNumber(f64),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReactivityError>;
