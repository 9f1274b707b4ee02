//! End-to-end chain scenarios built from YAML manifests.

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wrench_chain::{
    ActionError, ActionExecutor, ActionOutput, ActionRequest, ChainBuilder, ChainRegistry,
    ExecutorRegistry,
};
use wrench_config::{ActionType, Manifest};
use wrench_core::{PipelineContext, RouteContext};

/// Counts executions and echoes the input after a short pause.
#[derive(Debug)]
struct Counting {
    hits: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl ActionExecutor for Counting {
    async fn execute(&self, request: ActionRequest<'_>) -> Result<ActionOutput, ActionError> {
        let n = self.hits.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        Ok(ActionOutput::body(format!(r#"{{"run":{n}}}"#))
            .with_status(StatusCode::CREATED)
            .with_content_type("application/json"))
    }
}

struct Gateway {
    manifest: Arc<Manifest>,
    chains: ChainRegistry,
    hits: Arc<AtomicUsize>,
}

fn gateway(yaml: &str, delay: Duration) -> Gateway {
    let manifest = Arc::new(Manifest::from_yaml_str(yaml).unwrap());
    wrench_config::validate_manifest(&manifest).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let executors = ExecutorRegistry::with_builtins().register(ActionType::KafkaProducer, move |_| {
        Ok(Arc::new(Counting {
            hits: Arc::clone(&counter),
            delay,
        }) as Arc<dyn ActionExecutor>)
    });

    let chains = ChainBuilder::new(Arc::clone(&manifest))
        .executors(executors)
        .build()
        .unwrap();
    Gateway {
        manifest,
        chains,
        hits,
    }
}

impl Gateway {
    fn route(&self, method: &str, template: &str, uri: &str, headers: &[(&str, &str)], body: &str) -> RouteContext {
        let endpoint = self
            .manifest
            .api
            .endpoints
            .iter()
            .find(|e| e.route == template && e.method.as_str() == method)
            .cloned()
            .unwrap();
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Bytes::copy_from_slice(body.as_bytes())).unwrap();
        RouteContext::from_request(request, Arc::new(endpoint))
    }

    async fn run(
        &self,
        method: &str,
        template: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> PipelineContext {
        let chain = self.chains.find(method, template).unwrap();
        chain.run(&self.route(method, template, uri, headers, body)).await
    }

    async fn call(
        &self,
        method: &str,
        template: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> (StatusCode, http::HeaderMap, Bytes) {
        let chain = self.chains.find(method, template).unwrap();
        let route = self.route(method, template, uri, headers, body);
        let response = chain.respond(&route).await;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }
}

const ORDERS: &str = r#"
service:
  name: orders
api:
  endpoints:
    - route: /orders/{id}
      method: post
      actionId: create
      idempId: once
    - route: /quotes
      method: get
      actionId: quote
      rateLimitId: per-client
    - route: /pipeline
      method: post
      flowActionId: [reject, publish]
    - route: /profiles/{id}
      method: post
      actionId: profile
actions:
  - id: create
    type: kafkaProducer
  - id: publish
    type: kafkaProducer
  - id: quote
    type: httpRequestMock
    http:
      mock:
        body: '{"price":10}'
  - id: reject
    type: httpRequestMock
    http:
      mock:
        body: '{"error":"unavailable"}'
        statusCode: 503
  - id: profile
    type: httpRequestMock
    trigger:
      before:
        contractMapId: inbound
      after:
        contractMapId: outbound
    http:
      mock:
        mirrorBody: true
contract:
  maps:
    - id: inbound
      rename: ["user.name:fullName"]
      new: ["profileId:{{wrenchContext.request.uri.params.id}}"]
    - id: outbound
      remove: [password]
idemps:
  - id: once
    key: "{{wrenchContext.request.headers.idempotency-key}}"
    lockRetryDelayMs: 100
    lockTries: 20
rateLimits:
  - id: per-client
    keys: ["{{wrenchContext.request.headers.x-client}}"]
    requestsPerSecond: 2
    burstLimit: 3
"#;

#[tokio::test(start_paused = true)]
async fn test_idempotent_requests_execute_once() {
    let gw = Arc::new(gateway(ORDERS, Duration::from_millis(250)));

    let calls = (0..5).map(|_| {
        let gw = Arc::clone(&gw);
        tokio::spawn(async move {
            gw.run(
                "POST",
                "/orders/{id}",
                "/orders/7",
                &[("idempotency-key", "abc")],
                r#"{"qty":1}"#,
            )
            .await
        })
    });
    let results: Vec<PipelineContext> = futures_join(calls).await;

    assert_eq!(gw.hits.load(Ordering::SeqCst), 1);
    let executed = results.iter().filter(|p| !p.has_cache()).count();
    let replayed = results.iter().filter(|p| p.has_cache()).count();
    assert_eq!(executed, 1);
    assert_eq!(replayed, 4);
    for pipeline in &results {
        assert!(!pipeline.has_error());
        assert_eq!(pipeline.status(), Some(StatusCode::CREATED));
        assert_eq!(pipeline.payload(), &Bytes::from_static(br#"{"run":1}"#));
    }

    // A different key runs again.
    let (status, _, body) = gw
        .call("POST", "/orders/{id}", "/orders/7", &[("idempotency-key", "def")], "")
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, Bytes::from_static(br#"{"run":2}"#));
}

async fn futures_join<T: Send + 'static>(
    handles: impl Iterator<Item = tokio::task::JoinHandle<T>>,
) -> Vec<T> {
    let handles: Vec<_> = handles.collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(start_paused = true)]
async fn test_burst_plus_one_is_rejected() {
    let gw = gateway(ORDERS, Duration::ZERO);
    let client = [("x-client", "acme")];

    let mut rejected = Vec::new();
    for _ in 0..4 {
        let (status, headers, body) = gw.call("GET", "/quotes", "/quotes", &client, "").await;
        if status == StatusCode::TOO_MANY_REQUESTS {
            rejected.push((headers, body));
        } else {
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, Bytes::from_static(br#"{"price":10}"#));
        }
    }

    assert_eq!(rejected.len(), 1);
    let (headers, body) = &rejected[0];
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after >= 1);
    assert_eq!(body, &Bytes::from_static(b"rate limit exceeded"));

    // Another client has its own bucket.
    let (status, _, _) = gw
        .call("GET", "/quotes", "/quotes", &[("x-client", "globex")], "")
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn test_spread_requests_are_admitted() {
    let gw = gateway(ORDERS, Duration::ZERO);
    let client = [("x-client", "acme")];

    for _ in 0..10 {
        let (status, _, _) = gw.call("GET", "/quotes", "/quotes", &client, "").await;
        assert_eq!(status, StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(600)).await;
    }
}

#[tokio::test]
async fn test_error_short_circuits_later_actions() {
    let gw = gateway(ORDERS, Duration::ZERO);

    let (status, headers, body) = gw.call("POST", "/pipeline", "/pipeline", &[], "{}").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(body, Bytes::from_static(br#"{"error":"unavailable"}"#));
    assert_eq!(gw.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_contract_maps_around_action() {
    let gw = gateway(ORDERS, Duration::ZERO);

    let (status, _, body) = gw
        .call(
            "POST",
            "/profiles/{id}",
            "/profiles/42",
            &[("content-type", "application/json")],
            r#"{"user":{"name":"Ana"},"password":"hunter2"}"#,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        body,
        json!({"user": {}, "fullName": "Ana", "profileId": "42"})
    );
}

const SIGNED: &str = r#"
api:
  endpoints:
    - route: /sign
      method: post
      actionId: sign
keys:
  - id: partner
    privateRsaKeyDERBase64: MIICdwIBADANBgkqhkiG9w0BAQEFAASCAmEwggJdAgEAAoGBAJ9Z8ucGHDwmvAR+AR9siPnxxFRD6rpKXLJZBPNaPwizvC/ptIL4P+EupPPXprVcSN4knYxxc/MFPIKMbRiLkNgjNQ1VxODZpJdr+s7w5WGO6KP88zeCjz1kIG5oHNaFtCYDE0nAbF5cb/wsPLWnuklN23U19zoidmzWXYzeVFMxAgMBAAECgYAskaHoj8Lx5/uKXhu+SEL/dWluEBjkxcurbk5+Ke2bZ3npBLqiLwDe4IbuVJCiBQ+0YhVWpJzDieFkuhYBWXfHKu8PKzRHfWkrQYWXQmE3hucBoecV7yy5KDpEPAGBs31tK8o/klAK8RWWt5BeloSJaC6aJ9pyyJMfRdQENraMAQJBANI6YHf+0RqdplAiGAg5gsyA1OdConqP5U0wxPDLSb3x3rm25KI4gs+JUEZ2T2CKP+NVauwPuHKd2oNKPXyCF2ECQQDCC9MEqcjGQJziEhOd48rCFz6bHNKBt6pA177UncDjXkV7XjELU2Avdb5mjk8qZtAsNNYMgCXjDBvgyULGQV3RAkEApN3rMa/AxSLFfyp9tlWD4mVWklaLnZqjtTl9+Wkz16aLiRGJlD7FN4T0U44NCiThnaMrSx25BQoOh8/9EFvlgQJBAJPD0VMxv3RI666zuUB4oIQgk0onLp4dMIbkQ6tA3gvGU/7YAVzwhsRdUzphkCNn24puSbmHNFKre+c3G6RBTqECQFB5oEyiMJe+OVHC05C38XpmUoHbZyT4uSkjHe8Sxpk3RfypCwNbEzxkr9nRrUUr97pW4AwG5UD9QieeceA5RGc=
actions:
  - id: sign
    type: funcSignature
    func:
      sign:
        keyId: partner
"#;

#[tokio::test]
async fn test_signature_endpoint() {
    let gw = gateway(SIGNED, Duration::ZERO);

    let (status, headers, body) = gw.call("POST", "/sign", "/sign", &[], r#"{"amount":10}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"], "text/plain");
    assert_eq!(
        body,
        Bytes::from_static(b"etdvN8BdQE1psoFZzbASPlh9BPx5uvZiTXBRPkK7L/L4prG+mJq6H+dzANOBAVxL9DcksOfSXw+YcRksulPgZxBDeVUBSqZQqjDPiWp/WS6hoo5p8xd3nDOECj2ZfOZQjToss4YBhA+aXtDUjH4Mt5Yl92HEFJTC3D6bG2pg6j8=")
    );
}
