//! Manifest schema.
//!
//! The manifest is the YAML document that declares what the gateway serves.
//! Keys are camelCase. Every entity is referenced by its `id`; references are
//! checked by [`validate_manifest`](crate::validate_manifest).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root manifest document.
///
/// # Example
///
/// ```
/// use wrench_config::Manifest;
///
/// let manifest = Manifest::from_yaml_str(r#"
/// api:
///   endpoints:
///     - route: /ping
///       method: get
///       actionId: pong
/// actions:
///   - id: pong
///     type: httpRequestMock
///     http:
///       mock:
///         body: '{"pong":true}'
/// "#).unwrap();
///
/// assert_eq!(manifest.api.endpoints[0].chain_key(), "GET_/ping");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    /// Service identity, used as the idempotency key namespace.
    #[serde(default)]
    pub service: Option<ServiceSettings>,

    /// Backing store connections.
    #[serde(default)]
    pub connections: ConnectionSettings,

    /// Public API surface.
    #[serde(default)]
    pub api: ApiSettings,

    /// Action definitions.
    #[serde(default)]
    pub actions: Vec<ActionSettings>,

    /// Contract maps.
    #[serde(default)]
    pub contract: ContractSettings,

    /// Idempotency policies.
    #[serde(default)]
    pub idemps: Vec<IdempotencySettings>,

    /// Rate-limit policies.
    #[serde(default)]
    pub rate_limits: Vec<RateLimitSettings>,

    /// Private keys for `funcSignature` actions.
    #[serde(default)]
    pub keys: Vec<KeySettings>,
}

impl Manifest {
    /// Parse a single manifest document without validating references.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::YamlError` when the document is malformed.
    pub fn from_yaml_str(content: &str) -> Result<Self, crate::ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Service name, defaulting to `wrench`.
    pub fn service_name(&self) -> &str {
        self.service.as_ref().map_or("wrench", |s| s.name.as_str())
    }

    /// Finds an action by id.
    pub fn action(&self, id: &str) -> Option<&ActionSettings> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// Finds a contract map by id.
    pub fn contract_map(&self, id: &str) -> Option<&ContractMapSettings> {
        self.contract.maps.iter().find(|m| m.id == id)
    }

    /// Finds an idempotency policy by id.
    pub fn idempotency(&self, id: &str) -> Option<&IdempotencySettings> {
        self.idemps.iter().find(|i| i.id == id)
    }

    /// Finds a rate-limit policy by id.
    pub fn rate_limit(&self, id: &str) -> Option<&RateLimitSettings> {
        self.rate_limits.iter().find(|r| r.id == id)
    }

    /// Finds a signing key by id.
    pub fn key(&self, id: &str) -> Option<&KeySettings> {
        self.keys.iter().find(|k| k.id == id)
    }

    /// Finds a store connection by id.
    pub fn store(&self, id: &str) -> Option<&StoreSettings> {
        self.connections.stores.iter().find(|s| s.id == id)
    }
}

/// Service identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceSettings {
    /// Service name.
    pub name: String,
    /// Service version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Connections to shared backing stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectionSettings {
    /// Key-value stores used by idempotency and rate-limit policies.
    #[serde(default)]
    pub stores: Vec<StoreSettings>,
}

/// One backing store connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoreSettings {
    /// Store id referenced by policies.
    pub id: String,
    /// Store implementation; `memory` is built in.
    #[serde(rename = "type", default = "default_store_kind")]
    pub kind: String,
    /// Implementation-specific connection address.
    #[serde(default)]
    pub address: Option<String>,
}

fn default_store_kind() -> String {
    "memory".to_string()
}

/// Public API surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiSettings {
    /// API-wide bearer token validation.
    #[serde(default)]
    pub authorization: Option<AuthorizationSettings>,
    /// Endpoint definitions.
    #[serde(default)]
    pub endpoints: Vec<EndpointSettings>,
}

/// Bearer token validation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthorizationSettings {
    /// Token kind; only `jwt` is understood.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Shared HS256 secret. Without it, signatures are not verified.
    #[serde(default)]
    pub secret: Option<String>,
    /// Expected `iss` claim.
    #[serde(default)]
    pub issuer: Option<String>,
}

/// HTTP method of an endpoint or outbound request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// GET
    #[default]
    #[serde(alias = "GET")]
    Get,
    /// POST
    #[serde(alias = "POST")]
    Post,
    /// PUT
    #[serde(alias = "PUT")]
    Put,
    /// PATCH
    #[serde(alias = "PATCH")]
    Patch,
    /// DELETE
    #[serde(alias = "DELETE")]
    Delete,
    /// HEAD
    #[serde(alias = "HEAD")]
    Head,
    /// OPTIONS
    #[serde(alias = "OPTIONS")]
    Options,
}

impl HttpMethod {
    /// Upper-case method name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("unsupported http method: {other}")),
        }
    }
}

/// One public endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EndpointSettings {
    /// Route template, e.g. `/items/{id}`.
    pub route: String,
    /// HTTP method.
    #[serde(default)]
    pub method: HttpMethod,
    /// Single action to run.
    #[serde(default)]
    pub action_id: Option<String>,
    /// Ordered actions to run, when more than one.
    #[serde(default)]
    pub flow_action_id: Vec<String>,
    /// Idempotency policy id.
    #[serde(default)]
    pub idemp_id: Option<String>,
    /// Rate-limit policy id.
    #[serde(default)]
    pub rate_limit_id: Option<String>,
    /// Skip bearer token validation for this endpoint.
    #[serde(default)]
    pub enable_anonymous: bool,
    /// Forward every path below `route` to the action's base URL.
    #[serde(default)]
    pub is_proxy: bool,
    /// Roles the token must carry.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Scopes the token must carry.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// `name:value` claim requirements.
    #[serde(default)]
    pub claims: Vec<String>,
}

impl EndpointSettings {
    /// Registry key of the compiled chain, `METHOD_route`.
    pub fn chain_key(&self) -> String {
        format!("{}_{}", self.method.as_str(), self.route)
    }

    /// Action ids in execution order.
    pub fn action_ids(&self) -> Vec<&str> {
        match &self.action_id {
            Some(id) if !id.is_empty() => vec![id.as_str()],
            _ => self.flow_action_id.iter().map(String::as_str).collect(),
        }
    }
}

/// Action type, selecting the executor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    /// Outbound HTTP request.
    HttpRequest,
    /// Canned HTTP response.
    HttpRequestMock,
    /// SNS publish.
    SnsPublish,
    /// Read a file into the payload.
    FileReader,
    /// NATS publish.
    NatsPublish,
    /// Kafka produce.
    KafkaProducer,
    /// HMAC of the payload.
    FuncHash,
    /// Signature of the payload.
    FuncSignature,
    /// Object built from resolved variables.
    FuncVarContext,
    /// Concatenation of resolved values.
    FuncStringConcatenate,
    /// General built-in functions.
    FuncGeneral,
    /// DynamoDB operation.
    Dynamodb,
}

impl ActionType {
    /// Manifest spelling of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HttpRequest => "httpRequest",
            Self::HttpRequestMock => "httpRequestMock",
            Self::SnsPublish => "snsPublish",
            Self::FileReader => "fileReader",
            Self::NatsPublish => "natsPublish",
            Self::KafkaProducer => "kafkaProducer",
            Self::FuncHash => "funcHash",
            Self::FuncSignature => "funcSignature",
            Self::FuncVarContext => "funcVarContext",
            Self::FuncStringConcatenate => "funcStringConcatenate",
            Self::FuncGeneral => "funcGeneral",
            Self::Dynamodb => "dynamodb",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action definition.
///
/// Sections for connector types without a built-in executor (`kafka`,
/// `nats`, ...) are kept in [`extensions`](Self::extensions) for the
/// executor registered for that type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionSettings {
    /// Action id.
    pub id: String,
    /// Action type.
    #[serde(rename = "type")]
    pub kind: ActionType,
    /// HTTP settings (`httpRequest`, `httpRequestMock`).
    #[serde(default)]
    pub http: Option<HttpSettings>,
    /// Function settings (`func*` types).
    #[serde(default)]
    pub func: Option<FuncSettings>,
    /// Contract maps applied around the action.
    #[serde(default)]
    pub trigger: TriggerSettings,
    /// Input and output payload handling.
    #[serde(default)]
    pub body: BodySettings,
    /// Connector-specific sections.
    #[serde(flatten)]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

/// HTTP action settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpSettings {
    /// Outbound request.
    #[serde(default)]
    pub request: Option<HttpRequestSettings>,
    /// Response header mapping.
    #[serde(default)]
    pub response: HttpResponseSettings,
    /// Canned response.
    #[serde(default)]
    pub mock: Option<HttpMockSettings>,
}

/// Outbound HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpRequestSettings {
    /// Request method. Proxy endpoints use the inbound method instead.
    #[serde(default)]
    pub method: HttpMethod,
    /// URL; `/`-separated segments may be calculated values.
    pub url: String,
    /// Headers; values may be calculated.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Accept invalid TLS certificates.
    #[serde(default)]
    pub insecure: bool,
    /// Per-call timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Response header mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpResponseSettings {
    /// Headers always added to the response.
    #[serde(default)]
    pub map_fixed_headers: BTreeMap<String, String>,
    /// Upstream headers to copy, `src` or `src:dst`.
    #[serde(default)]
    pub map_response_headers: Vec<String>,
}

/// Canned HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpMockSettings {
    /// Response body.
    #[serde(default)]
    pub body: Option<String>,
    /// Response content type.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response status.
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    /// Echo the action input instead of `body`.
    #[serde(default)]
    pub mirror_body: bool,
}

impl Default for HttpMockSettings {
    fn default() -> Self {
        Self {
            body: None,
            content_type: default_content_type(),
            headers: BTreeMap::new(),
            status_code: default_status_code(),
            mirror_body: false,
        }
    }
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_status_code() -> u16 {
    200
}

/// Function action settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FuncSettings {
    /// `funcHash` settings.
    #[serde(default)]
    pub hash: Option<HashSettings>,
    /// `funcVarContext` variables; values may be calculated.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// `funcStringConcatenate` parts; each may be calculated.
    #[serde(default)]
    pub concatenate: Vec<String>,
    /// `funcGeneral` command, e.g. `{{func.timestamp(milli)}}`.
    #[serde(default)]
    pub command: Option<String>,
    /// `funcSignature` settings.
    #[serde(default)]
    pub sign: Option<SignSettings>,
}

/// `funcSignature` settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignSettings {
    /// Id of an entry in the manifest `keys` section.
    pub key_id: String,
    /// Digest signed with RSA PKCS#1 v1.5.
    #[serde(default)]
    pub alg: SignAlgorithm,
}

/// Signature digest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignAlgorithm {
    /// RSA PKCS#1 v1.5 over SHA-256.
    #[default]
    Sha256,
}

/// A private RSA key.
///
/// The key is a base64 encoded, unencrypted PKCS#8 DER document, e.g. the
/// output of `openssl pkcs8 -topk8 -nocrypt -outform DER | base64`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeySettings {
    /// Key id.
    pub id: String,
    /// Base64 PKCS#8 DER.
    #[serde(rename = "privateRsaKeyDERBase64")]
    pub private_rsa_key_der_base64: String,
}

impl std::fmt::Debug for KeySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySettings")
            .field("id", &self.id)
            .field("private_rsa_key_der_base64", &"<redacted>")
            .finish()
    }
}

/// Hash algorithm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// HMAC-SHA1.
    Sha1,
    /// HMAC-SHA256.
    #[default]
    Sha256,
    /// HMAC-SHA512.
    Sha512,
}

/// `funcHash` settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HashSettings {
    /// HMAC key; may be calculated.
    pub key: String,
    /// Algorithm.
    #[serde(default)]
    pub alg: HashAlgorithm,
}

/// Contract maps applied before and after an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TriggerSettings {
    /// Applied to the payload before the action runs.
    #[serde(default)]
    pub before: Option<TriggerTarget>,
    /// Applied to the payload after the action runs.
    #[serde(default)]
    pub after: Option<TriggerTarget>,
}

/// Contract map reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TriggerTarget {
    /// Contract map id.
    pub contract_map_id: String,
}

/// Payload handling for an action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BodySettings {
    /// Keep the current payload and store the output under the action id.
    #[serde(default)]
    pub preserve_current_body: bool,
    /// Input payload, e.g. `{{bodyContext.actions.login}}`.
    #[serde(default, rename = "use")]
    pub use_body: Option<String>,
}

/// Contract section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContractSettings {
    /// Contract maps.
    #[serde(default)]
    pub maps: Vec<ContractMapSettings>,
}

/// A named payload transformation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContractMapSettings {
    /// Map id.
    pub id: String,
    /// `old:new` moves.
    #[serde(default)]
    pub rename: Vec<String>,
    /// `prop:value` inserts; the value may be calculated.
    #[serde(default, rename = "new")]
    pub new_values: Vec<String>,
    /// Paths to delete.
    #[serde(default)]
    pub remove: Vec<String>,
    /// `src:dst` copies.
    #[serde(default)]
    pub duplicate: Vec<String>,
    /// Coercions.
    #[serde(default)]
    pub parse: ParseSettings,
    /// Reformatting.
    #[serde(default)]
    pub format: FormatSettings,
    /// Powers-of-ten shifts.
    #[serde(default)]
    pub scale: ScaleSettings,
    /// `path<op>factor` arithmetic.
    #[serde(default)]
    pub math: Vec<String>,
    /// Explicit operation order; empty means the default order.
    #[serde(default)]
    pub sequence: Vec<String>,
}

impl ContractMapSettings {
    /// Operations with at least one entry, in declaration order.
    pub fn configured_operations(&self) -> Vec<ContractOperation> {
        ContractOperation::ALL
            .into_iter()
            .filter(|op| self.is_configured(*op))
            .collect()
    }

    /// Whether the given operation has at least one entry.
    pub fn is_configured(&self, op: ContractOperation) -> bool {
        match op {
            ContractOperation::Rename => !self.rename.is_empty(),
            ContractOperation::New => !self.new_values.is_empty(),
            ContractOperation::Remove => !self.remove.is_empty(),
            ContractOperation::Duplicate => !self.duplicate.is_empty(),
            ContractOperation::Parse => !self.parse.is_empty(),
            ContractOperation::Format => !self.format.date.is_empty(),
            ContractOperation::Scale => !self.scale.up.is_empty() || !self.scale.down.is_empty(),
            ContractOperation::Math => !self.math.is_empty(),
        }
    }
}

/// Coercions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ParseSettings {
    /// `{{path.compareValue:target}}` conditional replacements.
    #[serde(default)]
    pub when_equals: Vec<String>,
    /// `src[:dst]` wrap in a one-element array.
    #[serde(default)]
    pub to_array: Vec<String>,
    /// `src[:dst]` decode a JSON object string.
    #[serde(default)]
    pub to_map: Vec<String>,
}

impl ParseSettings {
    /// Whether no coercion is configured.
    pub fn is_empty(&self) -> bool {
        self.when_equals.is_empty() && self.to_array.is_empty() && self.to_map.is_empty()
    }
}

/// Reformatting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FormatSettings {
    /// `prop:layout` date reformatting.
    #[serde(default)]
    pub date: Vec<String>,
}

/// Powers-of-ten shifts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScaleSettings {
    /// `prop:n` multiply by `10^n`.
    #[serde(default)]
    pub up: Vec<String>,
    /// `prop:n` divide by `10^n`.
    #[serde(default)]
    pub down: Vec<String>,
}

/// Contract map operation names, as used in `sequence`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContractOperation {
    /// Move values.
    Rename,
    /// Insert values.
    New,
    /// Delete values.
    Remove,
    /// Copy values.
    Duplicate,
    /// Coerce values.
    Parse,
    /// Reformat dates.
    Format,
    /// Shift by powers of ten.
    Scale,
    /// Arithmetic.
    Math,
}

impl ContractOperation {
    /// Every operation.
    pub const ALL: [Self; 8] = [
        Self::Rename,
        Self::New,
        Self::Remove,
        Self::Duplicate,
        Self::Parse,
        Self::Format,
        Self::Scale,
        Self::Math,
    ];

    /// Sequence spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rename => "rename",
            Self::New => "new",
            Self::Remove => "remove",
            Self::Duplicate => "duplicate",
            Self::Parse => "parse",
            Self::Format => "format",
            Self::Scale => "scale",
            Self::Math => "math",
        }
    }
}

impl fmt::Display for ContractOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown contract operation: {s}"))
    }
}

/// Idempotency policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IdempotencySettings {
    /// Policy id.
    pub id: String,
    /// Key expression; usually calculated.
    pub key: String,
    /// Lifetime of a stored response, in seconds.
    #[serde(default = "default_idempotency_ttl")]
    pub ttl: u64,
    /// Backing store id; the default in-memory store when absent.
    #[serde(default)]
    pub store_id: Option<String>,
    /// Lock acquisition attempts.
    #[serde(default = "default_lock_tries")]
    pub lock_tries: u32,
    /// Delay between lock attempts, in milliseconds.
    #[serde(default = "default_lock_retry_delay_ms")]
    pub lock_retry_delay_ms: u64,
    /// Lock lifetime, in seconds.
    #[serde(default = "default_lock_expiry_secs")]
    pub lock_expiry_secs: u64,
}

fn default_idempotency_ttl() -> u64 {
    60
}

fn default_lock_tries() -> u32 {
    5
}

fn default_lock_retry_delay_ms() -> u64 {
    500
}

fn default_lock_expiry_secs() -> u64 {
    20
}

/// Rate-limit policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RateLimitSettings {
    /// Policy id.
    pub id: String,
    /// Include the route in the bucket key.
    #[serde(default)]
    pub route_enabled: bool,
    /// Key fragments; usually calculated.
    #[serde(default)]
    pub keys: Vec<String>,
    /// Sustained rate per second.
    #[serde(default)]
    pub requests_per_second: Option<u32>,
    /// Sustained rate per minute.
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    /// Bucket capacity; defaults to the rate.
    #[serde(default)]
    pub burst_limit: Option<u32>,
    /// Backing store id; the default in-memory store when absent.
    #[serde(default)]
    pub store_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
service:
  name: orders
connections:
  stores:
    - id: local
api:
  endpoints:
    - route: /orders/{id}
      method: post
      flowActionId: [login, create]
      idempId: once
      rateLimitId: per-client
actions:
  - id: login
    type: httpRequest
    http:
      request:
        method: post
        url: http://auth/login
    body:
      preserveCurrentBody: true
  - id: create
    type: kafkaProducer
    kafka:
      topic: orders
    body:
      use: "{{bodyContext.actions.login}}"
contract:
  maps:
    - id: m1
      rename: ["user.name:fullName"]
      new: ["source:gateway"]
      sequence: [rename, new]
idemps:
  - id: once
    key: "{{wrenchContext.request.headers.x-request-id}}"
    storeId: local
rateLimits:
  - id: per-client
    requestsPerSecond: 10
"#;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = Manifest::from_yaml_str(MANIFEST).unwrap();

        assert_eq!(manifest.service_name(), "orders");
        assert_eq!(manifest.connections.stores[0].kind, "memory");

        let endpoint = &manifest.api.endpoints[0];
        assert_eq!(endpoint.method, HttpMethod::Post);
        assert_eq!(endpoint.chain_key(), "POST_/orders/{id}");
        assert_eq!(endpoint.action_ids(), vec!["login", "create"]);

        let login = manifest.action("login").unwrap();
        assert!(login.body.preserve_current_body);
        assert_eq!(
            login.http.as_ref().unwrap().request.as_ref().unwrap().method,
            HttpMethod::Post
        );

        let create = manifest.action("create").unwrap();
        assert_eq!(create.kind, ActionType::KafkaProducer);
        assert_eq!(create.extensions["kafka"]["topic"], "orders");
        assert_eq!(
            create.body.use_body.as_deref(),
            Some("{{bodyContext.actions.login}}")
        );

        let map = manifest.contract_map("m1").unwrap();
        assert_eq!(map.new_values, vec!["source:gateway".to_string()]);

        let idemp = manifest.idempotency("once").unwrap();
        assert_eq!(idemp.ttl, 60);
        assert_eq!(idemp.lock_tries, 5);
        assert_eq!(idemp.lock_retry_delay_ms, 500);
        assert_eq!(idemp.lock_expiry_secs, 20);

        assert_eq!(
            manifest.rate_limit("per-client").unwrap().requests_per_second,
            Some(10)
        );
    }

    #[test]
    fn test_signing_keys() {
        let manifest = Manifest::from_yaml_str(
            r#"
keys:
  - id: partner
    privateRsaKeyDERBase64: TUlJQw==
actions:
  - id: sign
    type: funcSignature
    func:
      sign:
        keyId: partner
"#,
        )
        .unwrap();

        let key = manifest.key("partner").unwrap();
        assert_eq!(key.private_rsa_key_der_base64, "TUlJQw==");
        assert!(!format!("{key:?}").contains("TUlJQw=="));

        let sign = manifest.action("sign").unwrap().func.as_ref().unwrap().sign.as_ref().unwrap();
        assert_eq!(sign.key_id, "partner");
        assert_eq!(sign.alg, SignAlgorithm::Sha256);
    }

    #[test]
    fn test_unknown_root_field_rejected() {
        let result = Manifest::from_yaml_str("routes: []");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_action_type_rejected() {
        let result = Manifest::from_yaml_str(
            r#"
actions:
  - id: a
    type: smtpSend
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_uppercase_method_alias() {
        let manifest = Manifest::from_yaml_str(
            r#"
api:
  endpoints:
    - route: /x
      method: DELETE
      actionId: a
"#,
        )
        .unwrap();
        assert_eq!(manifest.api.endpoints[0].method, HttpMethod::Delete);
    }

    #[test]
    fn test_action_id_takes_precedence_over_flow() {
        let endpoint = EndpointSettings {
            route: "/x".to_string(),
            action_id: Some("single".to_string()),
            flow_action_id: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        assert_eq!(endpoint.action_ids(), vec!["single"]);
    }

    #[test]
    fn test_mock_defaults() {
        let mock: HttpMockSettings = serde_yaml::from_str("body: ok").unwrap();
        assert_eq!(mock.content_type, "application/json");
        assert_eq!(mock.status_code, 200);
        assert!(!mock.mirror_body);
    }

    #[test]
    fn test_configured_operations() {
        let map = ContractMapSettings {
            id: "m".to_string(),
            remove: vec!["a".to_string()],
            math: vec!["b*2".to_string()],
            scale: ScaleSettings {
                up: Vec::new(),
                down: vec!["c:2".to_string()],
            },
            ..Default::default()
        };

        assert_eq!(
            map.configured_operations(),
            vec![
                ContractOperation::Remove,
                ContractOperation::Scale,
                ContractOperation::Math
            ]
        );
    }

    #[test]
    fn test_contract_operation_from_str() {
        assert_eq!("math".parse::<ContractOperation>(), Ok(ContractOperation::Math));
        assert!("rotate".parse::<ContractOperation>().is_err());
    }

    #[test]
    fn test_http_method_from_str() {
        assert_eq!("patch".parse::<HttpMethod>(), Ok(HttpMethod::Patch));
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }
}
