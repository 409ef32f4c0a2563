//! Typed errors raised while loading and validating the billing file.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read billing file: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),

    #[error("row {row}: missing value for `{field}`")]
    MissingValue { row: usize, field: &'static str },

    #[error("row {row}: invalid `{field}` value {value:?}: {reason}")]
    InvalidField {
        row: usize,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("billing file contains no invoices")]
    Empty,
}

impl LoadError {
    pub(crate) fn invalid(
        row: usize,
        field: &'static str,
        value: &str,
        reason: impl Into<String>,
    ) -> Self {
        LoadError::InvalidField {
            row,
            field,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
