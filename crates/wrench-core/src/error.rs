//! Error types for payload processing.

use thiserror::Error;

/// A contract map could not be applied.
///
/// The display text is what the client receives as a `text/plain` body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    /// A date field could not be parsed or reformatted.
    #[error("Failed to format values.")]
    DateFormat {
        /// Path of the field.
        path: String,
        /// Offending value.
        value: String,
    },

    /// A numeric operation hit a non-numeric value.
    #[error("field '{path}' is not numeric")]
    NotNumeric {
        /// Path of the field.
        path: String,
    },

    /// Division by zero.
    #[error("division by zero on field '{path}'")]
    DivisionByZero {
        /// Path of the field.
        path: String,
    },

    /// A numeric operation targeted a missing field.
    #[error("field '{path}' not found")]
    FieldNotFound {
        /// Path of the field.
        path: String,
    },

    /// An entry of the contract map is malformed.
    #[error("invalid contract entry '{entry}': {reason}")]
    InvalidEntry {
        /// The raw entry.
        entry: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The payload is not a JSON object or an array.
    #[error("payload is not a JSON object or array: {0}")]
    InvalidPayload(String),
}

impl ContractError {
    pub(crate) fn invalid_entry(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while reading per-request state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContextError {
    /// `body.use` names an action that preserved nothing.
    #[error("no preserved body for action '{action_id}'")]
    PreservedBodyNotFound {
        /// The referenced action.
        action_id: String,
    },

    /// `body.use` is not a `bodyContext.actions.<id>` reference.
    #[error("invalid body reference '{reference}'")]
    InvalidBodyReference {
        /// The raw reference.
        reference: String,
    },

    /// A cached response could not be decoded.
    #[error("invalid cached response: {0}")]
    InvalidSnapshot(String),
}
