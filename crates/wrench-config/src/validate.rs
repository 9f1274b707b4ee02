//! Manifest cross-reference validation.
//!
//! Validation runs once, at startup, over the merged manifest. Every problem
//! is collected so an operator can fix a manifest in one pass.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::{
    ActionSettings, ActionType, ConfigError, ContractMapSettings, ContractOperation,
    EndpointSettings, Manifest,
};

const BODY_ACTIONS_PREFIX: &str = "bodyContext.actions.";

fn math_pattern() -> Result<&'static Regex, &'static regex::Error> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.\[\]]+[+\-*/]-?[0-9]+(\.[0-9]+)?$"))
        .as_ref()
}

/// Validates every cross reference and entry format of a manifest.
///
/// # Errors
///
/// Returns `ConfigError::ManifestInvalid` listing every problem found.
///
/// # Example
///
/// ```
/// use wrench_config::{validate_manifest, Manifest};
///
/// let manifest = Manifest::from_yaml_str(r#"
/// api:
///   endpoints:
///     - route: /ping
///       actionId: missing
/// "#).unwrap();
///
/// let err = validate_manifest(&manifest).unwrap_err();
/// assert!(err.to_string().contains("missing"));
/// ```
pub fn validate_manifest(manifest: &Manifest) -> Result<(), ConfigError> {
    let mut report = Report::default();

    report.unique_ids("connections.stores", manifest.connections.stores.iter().map(|s| s.id.as_str()));
    report.unique_ids("actions", manifest.actions.iter().map(|a| a.id.as_str()));
    report.unique_ids("contract.maps", manifest.contract.maps.iter().map(|m| m.id.as_str()));
    report.unique_ids("idemps", manifest.idemps.iter().map(|i| i.id.as_str()));
    report.unique_ids("rateLimits", manifest.rate_limits.iter().map(|r| r.id.as_str()));
    report.unique_ids("keys", manifest.keys.iter().map(|k| k.id.as_str()));

    for key in &manifest.keys {
        if key.private_rsa_key_der_base64.trim().is_empty() {
            report.push(format!("keys[{}].privateRsaKeyDERBase64 is required", key.id));
        }
    }

    if let Some(kind) = manifest
        .api
        .authorization
        .as_ref()
        .and_then(|a| a.kind.as_deref())
    {
        if !kind.eq_ignore_ascii_case("jwt") {
            report.push(format!("api.authorization.type {kind} is not supported"));
        }
    }

    for action in &manifest.actions {
        validate_action(manifest, action, &mut report);
    }

    for map in &manifest.contract.maps {
        validate_contract_map(map, &mut report);
    }

    for policy in &manifest.idemps {
        if policy.key.trim().is_empty() {
            report.push(format!("idemps[{}].key is required", policy.id));
        }
        if policy.ttl == 0 {
            report.push(format!("idemps[{}].ttl must be greater than zero", policy.id));
        }
        if policy.lock_tries == 0 {
            report.push(format!("idemps[{}].lockTries must be greater than zero", policy.id));
        }
        report.store_exists(manifest, &format!("idemps[{}]", policy.id), policy.store_id.as_deref());
    }

    for policy in &manifest.rate_limits {
        let label = format!("rateLimits[{}]", policy.id);
        match (policy.requests_per_second, policy.requests_per_minute) {
            (Some(_), Some(_)) => report.push(format!(
                "{label} requestsPerSecond and requestsPerMinute are mutually exclusive"
            )),
            (None, None) => report.push(format!(
                "{label} requires requestsPerSecond or requestsPerMinute"
            )),
            (Some(0), None) | (None, Some(0)) => {
                report.push(format!("{label} rate must be greater than zero"));
            }
            _ => {}
        }
        if policy.burst_limit == Some(0) {
            report.push(format!("{label}.burstLimit must be greater than zero"));
        }
        report.store_exists(manifest, &label, policy.store_id.as_deref());
    }

    let mut routes = HashSet::new();
    for (index, endpoint) in manifest.api.endpoints.iter().enumerate() {
        validate_endpoint(manifest, index, endpoint, &mut report);
        if !routes.insert(endpoint.chain_key()) {
            report.push(format!(
                "api.endpoints[{} {}] is duplicated",
                endpoint.method, endpoint.route
            ));
        }
    }

    report.finish()
}

fn validate_endpoint(
    manifest: &Manifest,
    index: usize,
    endpoint: &EndpointSettings,
    report: &mut Report,
) {
    if endpoint.route.trim().is_empty() {
        report.push(format!("api.endpoints[{index}].route is required"));
        return;
    }
    let label = format!("api.endpoints[{}]", endpoint.route);
    if !endpoint.route.starts_with('/') {
        report.push(format!("{label}.route must start with '/'"));
    }

    let has_single = endpoint.action_id.as_deref().is_some_and(|id| !id.is_empty());
    let has_flow = !endpoint.flow_action_id.is_empty();
    match (has_single, has_flow) {
        (false, false) => report.push(format!("{label} requires actionId or flowActionId")),
        (true, true) => report.push(format!(
            "{label} actionId and flowActionId are mutually exclusive"
        )),
        _ => {}
    }

    for id in endpoint.action_ids() {
        if manifest.action(id).is_none() {
            report.push(format!("{label}.actionId {id} don't exist in actions"));
        }
    }
    if let Some(id) = &endpoint.idemp_id {
        if manifest.idempotency(id).is_none() {
            report.push(format!("{label}.idempId {id} don't exist in idemps"));
        }
    }
    if let Some(id) = &endpoint.rate_limit_id {
        if manifest.rate_limit(id).is_none() {
            report.push(format!("{label}.rateLimitId {id} don't exist in rateLimits"));
        }
    }
    for claim in &endpoint.claims {
        if claim.split_once(':').is_none() {
            report.push(format!("{label}.claims {claim} must be in the format 'name:value'"));
        }
    }
    if endpoint.is_proxy {
        let forwards = endpoint.action_ids().iter().any(|id| {
            manifest
                .action(id)
                .is_some_and(|a| a.kind == ActionType::HttpRequest)
        });
        if !forwards {
            report.push(format!("{label}.isProxy requires an httpRequest action"));
        }
    }
}

fn validate_action(manifest: &Manifest, action: &ActionSettings, report: &mut Report) {
    let label = format!("actions[{}]", action.id);

    match action.kind {
        ActionType::HttpRequest => {
            match action.http.as_ref().and_then(|h| h.request.as_ref()) {
                Some(request) if request.url.trim().is_empty() => {
                    report.push(format!("{label}.http.request.url is required"));
                }
                Some(_) => {}
                None => report.push(format!(
                    "{label}.http.request is required when type is {}",
                    action.kind
                )),
            }
        }
        ActionType::HttpRequestMock => match action.http.as_ref().and_then(|h| h.mock.as_ref()) {
            Some(mock) => {
                if mock.body.is_none() && !mock.mirror_body {
                    report.push(format!(
                        "{label}.http.mock.body is required or mirrorBody must be true"
                    ));
                }
                if !(100..=599).contains(&mock.status_code) {
                    report.push(format!("{label}.http.mock.statusCode is not a valid status"));
                }
            }
            None => report.push(format!(
                "{label}.http.mock is required when type is {}",
                action.kind
            )),
        },
        ActionType::FuncHash => {
            if action.func.as_ref().and_then(|f| f.hash.as_ref()).is_none() {
                report.push(format!("{label}.func.hash is required when type is {}", action.kind));
            }
        }
        ActionType::FuncVarContext => {
            if action.func.as_ref().map_or(true, |f| f.vars.is_empty()) {
                report.push(format!("{label}.func.vars is required when type is {}", action.kind));
            }
        }
        ActionType::FuncStringConcatenate => {
            if action.func.as_ref().map_or(true, |f| f.concatenate.is_empty()) {
                report.push(format!(
                    "{label}.func.concatenate is required when type is {}",
                    action.kind
                ));
            }
        }
        ActionType::FuncGeneral => {
            if action.func.as_ref().and_then(|f| f.command.as_ref()).is_none() {
                report.push(format!(
                    "{label}.func.command is required when type is {}",
                    action.kind
                ));
            }
        }
        ActionType::FuncSignature => {
            match action.func.as_ref().and_then(|f| f.sign.as_ref()) {
                Some(sign) if sign.key_id.trim().is_empty() => {
                    report.push(format!("{label}.func.sign.keyId is required"));
                }
                Some(sign) if manifest.key(&sign.key_id).is_none() => report.push(format!(
                    "{label}.func.sign.keyId {} don't exist in keys",
                    sign.key_id
                )),
                Some(_) => {}
                None => report.push(format!(
                    "{label}.func.sign is required when type is {}",
                    action.kind
                )),
            }
        }
        ActionType::SnsPublish
        | ActionType::FileReader
        | ActionType::NatsPublish
        | ActionType::KafkaProducer
        | ActionType::Dynamodb => {}
    }

    if is_builtin(action.kind) {
        for section in action.extensions.keys() {
            report.push(format!("{label} has unknown section {section}"));
        }
    }

    for (slot, target) in [("before", &action.trigger.before), ("after", &action.trigger.after)] {
        if let Some(target) = target {
            if manifest.contract_map(&target.contract_map_id).is_none() {
                report.push(format!(
                    "{label}.trigger.{slot}.contractMapId {} don't exist in contract.maps",
                    target.contract_map_id
                ));
            }
        }
    }

    if let Some(source) = &action.body.use_body {
        let inner = source
            .trim()
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .map(str::trim);
        match inner.and_then(|s| s.strip_prefix(BODY_ACTIONS_PREFIX)) {
            Some(id) if manifest.action(id).is_some() => {}
            Some(id) => report.push(format!("{label}.body.use {id} don't exist in actions")),
            None => report.push(format!(
                "{label}.body.use must be in the format '{{{{{BODY_ACTIONS_PREFIX}<id>}}}}'"
            )),
        }
    }
}

fn is_builtin(kind: ActionType) -> bool {
    matches!(
        kind,
        ActionType::HttpRequest
            | ActionType::HttpRequestMock
            | ActionType::FuncHash
            | ActionType::FuncVarContext
            | ActionType::FuncStringConcatenate
            | ActionType::FuncGeneral
            | ActionType::FuncSignature
    )
}

fn validate_contract_map(map: &ContractMapSettings, report: &mut Report) {
    let label = format!("contract.maps[{}]", map.id);

    for (field, entries) in [("rename", &map.rename), ("duplicate", &map.duplicate)] {
        for entry in entries {
            if entry.contains(' ') {
                report.push(format!("{label}.{field} {entry} must not contain spaces"));
            }
            let parts: Vec<&str> = entry.split(':').collect();
            if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
                report.push(format!("{label}.{field} {entry} must be in the format 'source:target'"));
            }
        }
    }

    for entry in &map.remove {
        if entry.contains(' ') || entry.is_empty() {
            report.push(format!("{label}.remove '{entry}' must be a path without spaces"));
        }
    }

    for entry in &map.new_values {
        if !entry.split_once(':').is_some_and(|(path, _)| !path.is_empty()) {
            report.push(format!("{label}.new {entry} must be in the format 'property:value'"));
        }
    }

    for entry in map.parse.to_array.iter().chain(&map.parse.to_map) {
        if entry.is_empty() || entry.contains(' ') {
            report.push(format!("{label}.parse '{entry}' must be a path without spaces"));
        }
    }
    for entry in &map.parse.when_equals {
        let inner = entry.trim().trim_start_matches("{{").trim_end_matches("}}");
        let valid = inner
            .split_once(':')
            .is_some_and(|(condition, _)| condition.rsplit_once('.').is_some());
        if !valid {
            report.push(format!(
                "{label}.parse.whenEquals {entry} must be in the format '{{{{path.value:target}}}}'"
            ));
        }
    }

    for entry in &map.format.date {
        if !entry.split_once(':').is_some_and(|(path, layout)| !path.is_empty() && !layout.is_empty()) {
            report.push(format!("{label}.format.date {entry} must be in the format 'property:layout'"));
        }
    }

    for (field, entries) in [("up", &map.scale.up), ("down", &map.scale.down)] {
        for entry in entries {
            let valid = entry
                .split_once(':')
                .is_some_and(|(path, n)| !path.is_empty() && n.parse::<u32>().is_ok());
            if !valid {
                report.push(format!("{label}.scale.{field} {entry} must be in the format 'property:number'"));
            }
        }
    }

    for entry in &map.math {
        match math_pattern() {
            Ok(pattern) if pattern.is_match(entry) => {}
            Ok(_) => report.push(format!(
                "{label}.math {entry} must be in the format 'property<op>number'"
            )),
            Err(e) => report.push(format!("{label}.math {entry} could not be checked: {e}")),
        }
    }

    if !map.sequence.is_empty() {
        let mut listed = Vec::new();
        for name in &map.sequence {
            match name.parse::<ContractOperation>() {
                Ok(op) if listed.contains(&op) => {
                    report.push(format!("{label}.sequence {name} is duplicated"));
                }
                Ok(op) if !map.is_configured(op) => {
                    report.push(format!("{label}.sequence {name} is not configured"));
                }
                Ok(op) => listed.push(op),
                Err(_) => report.push(format!("{label}.sequence {name} is not a valid operation")),
            }
        }
        if listed.len() != map.configured_operations().len() {
            report.push(format!("{label}.sequence must list every configured operation"));
        }
    }
}

#[derive(Default)]
struct Report {
    errors: Vec<String>,
}

impl Report {
    fn push(&mut self, message: String) {
        self.errors.push(message);
    }

    fn unique_ids<'a>(&mut self, section: &str, ids: impl Iterator<Item = &'a str>) {
        let mut seen = HashSet::new();
        for id in ids {
            if id.trim().is_empty() {
                self.push(format!("{section}[].id is required"));
            } else if !seen.insert(id) {
                self.push(format!("{section}[{id}] is duplicated"));
            }
        }
    }

    fn store_exists(&mut self, manifest: &Manifest, label: &str, store_id: Option<&str>) {
        if let Some(id) = store_id {
            if manifest.store(id).is_none() {
                self.push(format!("{label}.storeId {id} don't exist in connections.stores"));
            }
        }
    }

    fn finish(self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ManifestInvalid {
                errors: self.errors,
            })
        }
    }
}
