//! Compiled contract maps.
//!
//! A [`ContractMap`] is built once from its manifest entry and applied to
//! every payload that crosses the action it is attached to.

use bytes::Bytes;
use chrono::DateTime;
use serde_json::{Map, Value};
use tracing::debug;
use wrench_config::{ContractMapSettings, ContractOperation};

use crate::json_path::{self, Document};
use crate::numeric::{self, MathExpr};
use crate::{resolver, ContractError, PipelineContext, RouteContext};

/// Operation order used when a map declares no `sequence`.
pub const DEFAULT_ORDER: [ContractOperation; 8] = [
    ContractOperation::Rename,
    ContractOperation::New,
    ContractOperation::Duplicate,
    ContractOperation::Remove,
    ContractOperation::Parse,
    ContractOperation::Format,
    ContractOperation::Scale,
    ContractOperation::Math,
];

const BODY_PREFIX: &str = "bodyContext.";

#[derive(Debug, Clone, PartialEq)]
struct WhenEquals {
    path: String,
    expected: String,
    target: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Rename(Vec<String>),
    New(Vec<(String, String)>),
    Duplicate(Vec<String>),
    Remove(Vec<String>),
    Parse {
        when_equals: Vec<WhenEquals>,
        to_array: Vec<(String, String)>,
        to_map: Vec<(String, String)>,
    },
    FormatDate(Vec<(String, String)>),
    Scale(Vec<(String, i32)>),
    Math(Vec<MathExpr>),
}

/// A contract map ready to run.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use wrench_config::ContractMapSettings;
/// use wrench_core::ContractMap;
///
/// let settings = ContractMapSettings {
///     id: "m".into(),
///     math: vec!["price*1.1".into()],
///     ..Default::default()
/// };
/// let map = ContractMap::compile(&settings).unwrap();
///
/// let mut doc = json!({"price": 100}).as_object().cloned().unwrap();
/// map.apply_static(&mut doc).unwrap();
/// assert_eq!(doc["price"], json!(110));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ContractMap {
    id: String,
    steps: Vec<Step>,
}

impl ContractMap {
    /// Compiles a manifest entry.
    ///
    /// With a `sequence`, only the listed operations run, in that order.
    /// Otherwise every configured operation runs in [`DEFAULT_ORDER`].
    pub fn compile(settings: &ContractMapSettings) -> Result<Self, ContractError> {
        let order = if settings.sequence.is_empty() {
            DEFAULT_ORDER
                .into_iter()
                .filter(|op| settings.is_configured(*op))
                .collect::<Vec<_>>()
        } else {
            settings
                .sequence
                .iter()
                .map(|name| {
                    name.parse::<ContractOperation>()
                        .map_err(|reason| ContractError::invalid_entry(name.as_str(), reason))
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let steps = order
            .into_iter()
            .filter(|op| settings.is_configured(*op))
            .map(|op| compile_step(op, settings))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: settings.id.clone(),
            steps,
        })
    }

    /// Map id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The operations that will run, in order.
    pub fn operations(&self) -> Vec<ContractOperation> {
        self.steps.iter().map(Step::operation).collect()
    }

    /// Transforms the pipeline payload and returns the new payload.
    ///
    /// An empty payload is treated as `{}`. Arrays are transformed element
    /// by element, stopping at the first failure.
    pub fn apply(
        &self,
        route: &RouteContext,
        pipeline: &PipelineContext,
    ) -> Result<Bytes, ContractError> {
        let payload = pipeline.payload();
        let mut value = if payload.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(payload)
                .map_err(|e| ContractError::InvalidPayload(e.to_string()))?
        };

        match &mut value {
            Value::Object(doc) => self.apply_document(doc, Some((route, pipeline)))?,
            Value::Array(items) => {
                for item in items.iter_mut() {
                    if let Value::Object(doc) = item {
                        self.apply_document(doc, Some((route, pipeline)))?;
                    }
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                return Err(ContractError::InvalidPayload(
                    "expected a JSON object or array".to_string(),
                ));
            }
        }

        debug!(contract_map = %self.id, "contract map applied");
        serde_json::to_vec(&value)
            .map(Bytes::from)
            .map_err(|e| ContractError::InvalidPayload(e.to_string()))
    }

    /// Transforms a single document without request context.
    ///
    /// `new` values are written as literals with their `{{ }}` kept.
    pub fn apply_static(&self, doc: &mut Document) -> Result<(), ContractError> {
        self.apply_document(doc, None)
    }

    fn apply_document(
        &self,
        doc: &mut Document,
        context: Option<(&RouteContext, &PipelineContext)>,
    ) -> Result<(), ContractError> {
        for step in &self.steps {
            match step {
                Step::Rename(entries) => json_path::rename_properties(doc, entries),
                Step::Duplicate(entries) => json_path::duplicate_properties(doc, entries),
                Step::Remove(paths) => json_path::remove_properties(doc, paths),
                Step::New(entries) => {
                    for (path, token) in entries {
                        let value = match context {
                            Some((route, pipeline)) => resolver::resolve(token, route, pipeline),
                            None => Value::String(token.clone()),
                        };
                        json_path::create_property(doc, path, value);
                    }
                }
                Step::Parse {
                    when_equals,
                    to_array,
                    to_map,
                } => parse(doc, when_equals, to_array, to_map),
                Step::FormatDate(entries) => format_dates(doc, entries)?,
                Step::Scale(entries) => {
                    for (path, exponent) in entries {
                        let current = json_path::get(doc, path).ok_or_else(|| {
                            ContractError::FieldNotFound { path: path.clone() }
                        })?;
                        let scaled = numeric::scale(path, current, *exponent)?;
                        json_path::set(doc, path, scaled);
                    }
                }
                Step::Math(exprs) => {
                    for expr in exprs {
                        let current = json_path::get(doc, &expr.path).ok_or_else(|| {
                            ContractError::FieldNotFound {
                                path: expr.path.clone(),
                            }
                        })?;
                        let result = expr.apply(current)?;
                        json_path::set(doc, &expr.path, result);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Step {
    const fn operation(&self) -> ContractOperation {
        match self {
            Self::Rename(_) => ContractOperation::Rename,
            Self::New(_) => ContractOperation::New,
            Self::Duplicate(_) => ContractOperation::Duplicate,
            Self::Remove(_) => ContractOperation::Remove,
            Self::Parse { .. } => ContractOperation::Parse,
            Self::FormatDate(_) => ContractOperation::Format,
            Self::Scale(_) => ContractOperation::Scale,
            Self::Math(_) => ContractOperation::Math,
        }
    }
}

fn compile_step(op: ContractOperation, settings: &ContractMapSettings) -> Result<Step, ContractError> {
    let step = match op {
        ContractOperation::Rename => Step::Rename(settings.rename.clone()),
        ContractOperation::Duplicate => Step::Duplicate(settings.duplicate.clone()),
        ContractOperation::Remove => Step::Remove(settings.remove.clone()),
        ContractOperation::New => Step::New(
            settings
                .new_values
                .iter()
                .map(|entry| pair(entry, "expected 'property:value'"))
                .collect::<Result<_, _>>()?,
        ),
        ContractOperation::Parse => Step::Parse {
            when_equals: settings
                .parse
                .when_equals
                .iter()
                .map(|entry| compile_when_equals(entry))
                .collect::<Result<_, _>>()?,
            to_array: settings.parse.to_array.iter().map(|e| source_target(e)).collect(),
            to_map: settings.parse.to_map.iter().map(|e| source_target(e)).collect(),
        },
        ContractOperation::Format => Step::FormatDate(
            settings
                .format
                .date
                .iter()
                .map(|entry| pair(entry, "expected 'property:layout'"))
                .collect::<Result<_, _>>()?,
        ),
        ContractOperation::Scale => {
            let up = settings.scale.up.iter().map(|e| exponent(e, 1));
            let down = settings.scale.down.iter().map(|e| exponent(e, -1));
            Step::Scale(up.chain(down).collect::<Result<_, _>>()?)
        }
        ContractOperation::Math => Step::Math(
            settings
                .math
                .iter()
                .map(|entry| MathExpr::parse(entry))
                .collect::<Result<_, _>>()?,
        ),
    };
    Ok(step)
}

fn pair(entry: &str, reason: &str) -> Result<(String, String), ContractError> {
    entry
        .split_once(':')
        .filter(|(path, _)| !path.is_empty())
        .map(|(path, rest)| (path.to_string(), rest.to_string()))
        .ok_or_else(|| ContractError::invalid_entry(entry, reason))
}

fn source_target(entry: &str) -> (String, String) {
    match entry.split_once(':') {
        Some((src, dst)) if !dst.is_empty() => (src.to_string(), dst.to_string()),
        Some((src, _)) => (src.to_string(), src.to_string()),
        None => (entry.to_string(), entry.to_string()),
    }
}

fn exponent(entry: &str, sign: i32) -> Result<(String, i32), ContractError> {
    let (path, n) = pair(entry, "expected 'property:n'")?;
    let n = n
        .trim()
        .parse::<i32>()
        .map_err(|_| ContractError::invalid_entry(entry, "exponent is not an integer"))?;
    Ok((path, sign * n))
}

fn compile_when_equals(entry: &str) -> Result<WhenEquals, ContractError> {
    let inner = resolver::unwrap(entry).unwrap_or_else(|| entry.trim());
    let inner = inner.strip_prefix(BODY_PREFIX).unwrap_or(inner);
    let (condition, target) = inner
        .split_once(':')
        .ok_or_else(|| ContractError::invalid_entry(entry, "expected '{{path.value:target}}'"))?;
    let (path, expected) = condition
        .rsplit_once('.')
        .ok_or_else(|| ContractError::invalid_entry(entry, "expected '{{path.value:target}}'"))?;
    Ok(WhenEquals {
        path: path.to_string(),
        expected: expected.to_string(),
        target: target.to_string(),
    })
}

fn parse(
    doc: &mut Document,
    when_equals: &[WhenEquals],
    to_array: &[(String, String)],
    to_map: &[(String, String)],
) {
    for rule in when_equals {
        let matches = json_path::get(doc, &rule.path)
            .filter(|v| !v.is_object() && !v.is_array())
            .is_some_and(|v| resolver::render(v) == rule.expected);
        if matches {
            json_path::set(doc, &rule.path, Value::String(rule.target.clone()));
        }
    }

    for (src, dst) in to_array {
        if let Some(value) = json_path::take(doc, src) {
            json_path::create_property(doc, dst, Value::Array(vec![value]));
        }
    }

    for (src, dst) in to_map {
        let parsed = json_path::get(doc, src)
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .filter(Value::is_object);
        if let Some(map) = parsed {
            json_path::remove(doc, src);
            json_path::create_property(doc, dst, map);
        }
    }
}

fn format_dates(doc: &mut Document, entries: &[(String, String)]) -> Result<(), ContractError> {
    for (path, layout) in entries {
        let Some(raw) = json_path::get(doc, path).and_then(Value::as_str) else {
            continue;
        };
        let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| ContractError::DateFormat {
            path: path.clone(),
            value: raw.to_string(),
        })?;
        let formatted = crate::layout::format(&parsed, layout);
        json_path::set(doc, path, Value::String(formatted));
    }
    Ok(())
}
