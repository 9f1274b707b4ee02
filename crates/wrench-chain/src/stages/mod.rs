//! Built-in chain stages.
//!
//! The builder assembles them per endpoint in this order:
//!
//! | Stage | When |
//! |-------|------|
//! | [`EntryHandler`] | always |
//! | [`AuthValidator`] | the API declares authorization and the endpoint is not anonymous |
//! | [`RateLimitHandler`] | the endpoint has a `rateLimitId` |
//! | [`IdempotencyHandler`] | the endpoint has an `idempId` |
//! | [`ContractMapHandler`] | an action has a `before` trigger |
//! | [`ActionHandler`] | once per action |
//! | [`ContractMapHandler`] | an action has an `after` trigger |
//! | [`Responder`] | always, even when halted |

pub mod action;
pub mod auth;
pub mod contract_map;
pub mod entry;
pub mod idempotency;
pub mod rate_limit;
pub mod responder;

pub use action::ActionHandler;
pub use auth::AuthValidator;
pub use contract_map::ContractMapHandler;
pub use entry::EntryHandler;
pub use idempotency::IdempotencyHandler;
pub use rate_limit::RateLimitHandler;
pub use responder::Responder;

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Hex HMAC-SHA256 of `data`, keyed with the route template.
///
/// Used to derive fixed-length store keys from resolved request values.
pub fn hash_key(route: &str, data: &str) -> Result<String, InvalidLength> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(route.as_bytes())?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
