//! Chain compilation errors.

use thiserror::Error;
use wrench_core::ContractError;

/// A manifest could not be compiled into chains.
///
/// All of these are startup failures.
#[derive(Debug, Error)]
pub enum BuildError {
    /// An endpoint references a missing action.
    #[error("endpoint {endpoint} references unknown action '{action_id}'")]
    UnknownAction {
        /// Chain key of the endpoint.
        endpoint: String,
        /// Missing action id.
        action_id: String,
    },

    /// An endpoint references a missing idempotency policy.
    #[error("endpoint {endpoint} references unknown idempotency policy '{policy_id}'")]
    UnknownIdempotency {
        /// Chain key of the endpoint.
        endpoint: String,
        /// Missing policy id.
        policy_id: String,
    },

    /// An endpoint references a missing rate-limit policy.
    #[error("endpoint {endpoint} references unknown rate-limit policy '{policy_id}'")]
    UnknownRateLimit {
        /// Chain key of the endpoint.
        endpoint: String,
        /// Missing policy id.
        policy_id: String,
    },

    /// A rate-limit policy has no usable rate.
    #[error("rate-limit policy '{policy_id}' needs exactly one positive rate")]
    InvalidRateLimit {
        /// Policy id.
        policy_id: String,
    },

    /// An action trigger references a missing contract map.
    #[error("action '{action_id}' references unknown contract map '{contract_map_id}'")]
    UnknownContractMap {
        /// Action id.
        action_id: String,
        /// Missing map id.
        contract_map_id: String,
    },

    /// A contract map failed to compile.
    #[error("contract map '{id}' is invalid: {source}")]
    InvalidContractMap {
        /// Map id.
        id: String,
        /// Cause.
        #[source]
        source: ContractError,
    },

    /// A policy references a store that is not registered.
    #[error("unknown store '{store_id}'")]
    UnknownStore {
        /// Missing store id.
        store_id: String,
    },

    /// A declared store has a kind nothing can create.
    #[error("store '{id}' has unsupported type '{kind}'")]
    UnsupportedStore {
        /// Store id.
        id: String,
        /// Declared kind.
        kind: String,
    },

    /// No executor factory is registered for an action type.
    #[error("no executor registered for action '{action_id}' of type '{kind}'")]
    MissingExecutor {
        /// Action id.
        action_id: String,
        /// Action type.
        kind: String,
    },

    /// A manifest key could not be parsed.
    #[error("key '{key_id}' is invalid: {reason}")]
    InvalidKey {
        /// Key id.
        key_id: String,
        /// What is wrong.
        reason: String,
    },

    /// An action signs with a key the manifest does not declare.
    #[error("action '{action_id}' references unknown key '{key_id}'")]
    UnknownKey {
        /// Action id.
        action_id: String,
        /// Referenced key id.
        key_id: String,
    },

    /// An executor rejected its settings.
    #[error("action '{action_id}' is invalid: {reason}")]
    InvalidAction {
        /// Action id.
        action_id: String,
        /// What is wrong.
        reason: String,
    },
}

impl BuildError {
    /// Creates an invalid action error.
    pub fn invalid_action(action_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            action_id: action_id.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_key(key_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key_id: key_id.into(),
            reason: reason.into(),
        }
    }
}
