//! Bearer token validation.
//!
//! Requires `Authorization: Bearer <jwt>`. When the API declares a shared
//! secret the HS256 signature is verified; `exp` and, when configured, `iss`
//! are always checked. The endpoint then narrows access with:
//!
//! - `roles`: the token must hold at least one (claim `roles` or
//!   `realm_access.roles`)
//! - `scopes`: the token must hold all of them (space-delimited `scope`)
//! - `claims`: every `name:value` pair must match

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use http::StatusCode;
use serde_json::{Map, Value};
use sha2::Sha256;
use tracing::debug;
use wrench_config::{AuthorizationSettings, EndpointSettings};
use wrench_core::{decode_claims, resolver, PipelineContext, RouteContext};

use crate::handler::{BoxFuture, Flow, Handler};

/// Body of a 401.
pub const UNAUTHORIZED: &str = "unauthorized";
/// Body of a 403.
pub const FORBIDDEN: &str = "forbidden";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Unauthenticated(&'static str),
    Forbidden(&'static str),
}

/// Validates the caller before anything else runs.
#[derive(Debug, Clone)]
pub struct AuthValidator {
    secret: Option<String>,
    issuer: Option<String>,
    roles: Vec<String>,
    scopes: Vec<String>,
    claims: Vec<(String, String)>,
}

impl AuthValidator {
    /// Creates a validator for one endpoint.
    pub fn new(settings: &AuthorizationSettings, endpoint: &EndpointSettings) -> Self {
        Self {
            secret: settings.secret.clone().filter(|s| !s.is_empty()),
            issuer: settings.issuer.clone().filter(|s| !s.is_empty()),
            roles: endpoint.roles.clone(),
            scopes: endpoint.scopes.clone(),
            claims: endpoint
                .claims
                .iter()
                .filter_map(|c| c.split_once(':'))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn check(&self, token: Option<&str>) -> Result<(), Rejection> {
        let token = token.ok_or(Rejection::Unauthenticated("missing bearer token"))?;

        if let Some(secret) = &self.secret {
            verify_hs256(token, secret)?;
        }

        let claims =
            decode_claims(token).ok_or(Rejection::Unauthenticated("malformed token"))?;

        if let Some(exp) = claims.get("exp") {
            let exp = exp
                .as_i64()
                .ok_or(Rejection::Unauthenticated("malformed exp claim"))?;
            if exp <= chrono::Utc::now().timestamp() {
                return Err(Rejection::Unauthenticated("token expired"));
            }
        }

        if let Some(issuer) = &self.issuer {
            if claims.get("iss").and_then(Value::as_str) != Some(issuer.as_str()) {
                return Err(Rejection::Unauthenticated("unexpected issuer"));
            }
        }

        if !self.roles.is_empty() {
            let held = roles(&claims);
            if !self.roles.iter().any(|r| held.contains(&r.as_str())) {
                return Err(Rejection::Forbidden("missing role"));
            }
        }

        if !self.scopes.is_empty() {
            let held: Vec<&str> = claims
                .get("scope")
                .and_then(Value::as_str)
                .map(|s| s.split_whitespace().collect())
                .unwrap_or_default();
            if !self.scopes.iter().all(|s| held.contains(&s.as_str())) {
                return Err(Rejection::Forbidden("missing scope"));
            }
        }

        for (name, expected) in &self.claims {
            let actual = claims.get(name).map(resolver::render);
            if actual.as_deref() != Some(expected.as_str()) {
                return Err(Rejection::Forbidden("claim mismatch"));
            }
        }

        Ok(())
    }
}

fn verify_hs256(token: &str, secret: &str) -> Result<(), Rejection> {
    let malformed = Rejection::Unauthenticated("malformed token");
    let (signed, signature) = token.rsplit_once('.').ok_or(malformed)?;

    let header = signed
        .split('.')
        .next()
        .and_then(|h| URL_SAFE_NO_PAD.decode(h.trim_end_matches('=')).ok())
        .and_then(|h| serde_json::from_slice::<Value>(&h).ok())
        .ok_or(malformed)?;
    if header.get("alg").and_then(Value::as_str) != Some("HS256") {
        return Err(Rejection::Unauthenticated("unsupported algorithm"));
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature.trim_end_matches('='))
        .map_err(|_| malformed)?;
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| Rejection::Unauthenticated("invalid secret"))?;
    mac.update(signed.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| Rejection::Unauthenticated("invalid signature"))
}

fn roles(claims: &Map<String, Value>) -> Vec<&str> {
    let list = claims
        .get("roles")
        .or_else(|| claims.get("realm_access").and_then(|r| r.get("roles")));
    match list {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(single)) => vec![single.as_str()],
        _ => Vec::new(),
    }
}

impl Handler for AuthValidator {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn handle<'a>(
        &'a self,
        route: &'a RouteContext,
        pipeline: &'a mut PipelineContext,
    ) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            match self.check(route.bearer_token()) {
                Ok(()) => {}
                Err(Rejection::Unauthenticated(reason)) => {
                    debug!(request_id = %route.request_id(), reason, "authentication failed");
                    pipeline.fail(StatusCode::UNAUTHORIZED, UNAUTHORIZED);
                }
                Err(Rejection::Forbidden(reason)) => {
                    debug!(request_id = %route.request_id(), reason, "authorization denied");
                    pipeline.fail(StatusCode::FORBIDDEN, FORBIDDEN);
                }
            }
            Flow::Continue
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::request;
    use serde_json::json;

    const SECRET: &str = "top-secret";

    fn sign(claims: &Value, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let signed = format!("{header}.{payload}");
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(signed.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{signed}.{signature}")
    }

    fn validator(endpoint: EndpointSettings) -> AuthValidator {
        let settings = AuthorizationSettings {
            secret: Some(SECRET.to_string()),
            issuer: Some("https://idp".to_string()),
            ..Default::default()
        };
        AuthValidator::new(&settings, &endpoint)
    }

    async fn status_for(validator: &AuthValidator, token: Option<String>) -> Option<StatusCode> {
        let mut builder = request("GET", "/orders", "/orders");
        if let Some(token) = token {
            builder = builder.header("authorization", &format!("Bearer {token}"));
        }
        let route = builder.build();
        let mut pipeline = PipelineContext::new();
        validator.handle(&route, &mut pipeline).await;
        pipeline.status()
    }

    fn future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_valid_token_passes() {
        let v = validator(EndpointSettings::default());
        let token = sign(&json!({"iss": "https://idp", "exp": future()}), SECRET);
        assert_eq!(status_for(&v, Some(token)).await, None);
    }

    #[tokio::test]
    async fn test_missing_and_tampered_tokens() {
        let v = validator(EndpointSettings::default());
        assert_eq!(status_for(&v, None).await, Some(StatusCode::UNAUTHORIZED));

        let token = sign(&json!({"iss": "https://idp", "exp": future()}), "other-secret");
        assert_eq!(status_for(&v, Some(token)).await, Some(StatusCode::UNAUTHORIZED));

        assert_eq!(
            status_for(&v, Some("garbage".to_string())).await,
            Some(StatusCode::UNAUTHORIZED)
        );
    }

    #[tokio::test]
    async fn test_expired_and_wrong_issuer() {
        let v = validator(EndpointSettings::default());
        let expired = sign(&json!({"iss": "https://idp", "exp": 1}), SECRET);
        assert_eq!(status_for(&v, Some(expired)).await, Some(StatusCode::UNAUTHORIZED));

        let foreign = sign(&json!({"iss": "https://evil", "exp": future()}), SECRET);
        assert_eq!(status_for(&v, Some(foreign)).await, Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_roles_scopes_and_claims() {
        let v = validator(EndpointSettings {
            roles: vec!["admin".to_string(), "ops".to_string()],
            scopes: vec!["orders:write".to_string()],
            claims: vec!["tenant:acme".to_string()],
            ..Default::default()
        });

        let granted = sign(
            &json!({
                "iss": "https://idp",
                "exp": future(),
                "realm_access": {"roles": ["ops"]},
                "scope": "orders:read orders:write",
                "tenant": "acme"
            }),
            SECRET,
        );
        assert_eq!(status_for(&v, Some(granted)).await, None);

        let no_role = sign(
            &json!({"iss": "https://idp", "exp": future(), "roles": ["viewer"],
                    "scope": "orders:write", "tenant": "acme"}),
            SECRET,
        );
        assert_eq!(status_for(&v, Some(no_role)).await, Some(StatusCode::FORBIDDEN));

        let no_scope = sign(
            &json!({"iss": "https://idp", "exp": future(), "roles": ["admin"],
                    "scope": "orders:read", "tenant": "acme"}),
            SECRET,
        );
        assert_eq!(status_for(&v, Some(no_scope)).await, Some(StatusCode::FORBIDDEN));

        let other_tenant = sign(
            &json!({"iss": "https://idp", "exp": future(), "roles": ["admin"],
                    "scope": "orders:write", "tenant": "umbrella"}),
            SECRET,
        );
        assert_eq!(status_for(&v, Some(other_tenant)).await, Some(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_unsigned_tokens_accepted_without_secret() {
        let v = AuthValidator::new(&AuthorizationSettings::default(), &EndpointSettings::default());
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"ana"}"#);
        let token = format!("e30.{payload}.");
        assert_eq!(status_for(&v, Some(token)).await, None);
    }
}
