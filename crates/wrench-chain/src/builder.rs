//! Compiles a manifest into chains.
//!
//! Every endpoint becomes one [`Chain`] whose handlers are, in order:
//!
//! 1. [`EntryHandler`]
//! 2. [`AuthValidator`], unless there is no API authorization or the endpoint
//!    is anonymous
//! 3. [`RateLimitHandler`], when the endpoint names a rate-limit policy
//! 4. [`IdempotencyHandler`], when the endpoint names an idempotency policy
//! 5. per action: the `before` contract map, the [`ActionHandler`], the
//!    `after` contract map
//! 6. [`Responder`]
//!
//! All references are resolved here, so a bad manifest fails at startup and
//! never at request time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use wrench_config::{EndpointSettings, Manifest};
use wrench_core::ContractMap;

use crate::actions::{ExecutorRegistry, KeyRing};
use crate::chain::{BoxedHandler, Chain, ChainRegistry};
use crate::error::BuildError;
use crate::stages::{
    ActionHandler, AuthValidator, ContractMapHandler, EntryHandler, IdempotencyHandler,
    RateLimitHandler, Responder,
};
use crate::store::{RateSpec, StoreRegistry};

/// Builds a [`ChainRegistry`] from a manifest.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wrench_chain::ChainBuilder;
/// use wrench_config::Manifest;
///
/// let manifest = Manifest::from_yaml_str(r#"
/// api:
///   endpoints:
///     - route: /ping
///       actionId: pong
/// actions:
///   - id: pong
///     type: httpRequestMock
///     http:
///       mock:
///         body: '{"pong":true}'
/// "#).unwrap();
///
/// let registry = ChainBuilder::new(Arc::new(manifest)).build().unwrap();
/// assert!(registry.find("GET", "/ping").is_some());
/// ```
#[derive(Debug)]
pub struct ChainBuilder {
    manifest: Arc<Manifest>,
    stores: StoreRegistry,
    executors: ExecutorRegistry,
    deadline: Option<Duration>,
}

impl ChainBuilder {
    /// Creates a builder with the default stores and the built-in executors.
    pub fn new(manifest: Arc<Manifest>) -> Self {
        Self {
            manifest,
            stores: StoreRegistry::new(),
            executors: ExecutorRegistry::with_builtins(),
            deadline: None,
        }
    }

    /// Replaces the store registry.
    pub fn stores(mut self, stores: StoreRegistry) -> Self {
        self.stores = stores;
        self
    }

    /// Replaces the executor registry.
    ///
    /// `funcSignature` is always served from the manifest `keys` section.
    pub fn executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = executors;
        self
    }

    /// Bounds every chain by `deadline`.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline).filter(|d| !d.is_zero());
        self
    }

    /// Compiles every endpoint.
    pub fn build(self) -> Result<ChainRegistry, BuildError> {
        let stores = self.stores.clone().with_manifest(&self.manifest)?;
        let maps = self.compile_maps()?;
        let keys = KeyRing::from_manifest(&self.manifest)?;
        debug!(keys = keys.len(), "signing keys loaded");
        let executors = self.executors.clone().with_keys(keys);

        let mut registry = ChainRegistry::new();
        for endpoint in &self.manifest.api.endpoints {
            let chain = self.build_chain(endpoint, &stores, &executors, &maps)?;
            debug!(chain = %chain.key(), handlers = ?chain.handler_names(), "chain compiled");
            registry.insert(chain);
        }

        info!(
            chains = registry.len(),
            service = %self.manifest.service_name(),
            "chain registry built"
        );
        Ok(registry)
    }

    fn compile_maps(&self) -> Result<HashMap<String, Arc<ContractMap>>, BuildError> {
        self.manifest
            .contract
            .maps
            .iter()
            .map(|settings| {
                ContractMap::compile(settings)
                    .map(|map| (settings.id.clone(), Arc::new(map)))
                    .map_err(|source| BuildError::InvalidContractMap {
                        id: settings.id.clone(),
                        source,
                    })
            })
            .collect()
    }

    fn build_chain(
        &self,
        endpoint: &EndpointSettings,
        stores: &StoreRegistry,
        executors: &ExecutorRegistry,
        maps: &HashMap<String, Arc<ContractMap>>,
    ) -> Result<Chain, BuildError> {
        let key = endpoint.chain_key();
        let mut handlers: Vec<BoxedHandler> = vec![Arc::new(EntryHandler)];

        if let Some(authorization) = &self.manifest.api.authorization {
            if !endpoint.enable_anonymous {
                handlers.push(Arc::new(AuthValidator::new(authorization, endpoint)));
            }
        }

        if let Some(policy_id) = &endpoint.rate_limit_id {
            let settings =
                self.manifest
                    .rate_limit(policy_id)
                    .ok_or_else(|| BuildError::UnknownRateLimit {
                        endpoint: key.clone(),
                        policy_id: policy_id.clone(),
                    })?;
            let rate = RateSpec::from_settings(settings).ok_or_else(|| {
                BuildError::InvalidRateLimit {
                    policy_id: policy_id.clone(),
                }
            })?;
            let store = stores.resolve(settings.store_id.as_deref())?;
            handlers.push(Arc::new(RateLimitHandler::new(settings, rate, store)));
        }

        if let Some(policy_id) = &endpoint.idemp_id {
            let settings =
                self.manifest
                    .idempotency(policy_id)
                    .ok_or_else(|| BuildError::UnknownIdempotency {
                        endpoint: key.clone(),
                        policy_id: policy_id.clone(),
                    })?;
            let store = stores.resolve(settings.store_id.as_deref())?;
            handlers.push(Arc::new(IdempotencyHandler::new(
                settings,
                self.manifest.service_name(),
                store,
            )));
        }

        for action_id in endpoint.action_ids() {
            let settings = self
                .manifest
                .action(action_id)
                .ok_or_else(|| BuildError::UnknownAction {
                    endpoint: key.clone(),
                    action_id: action_id.to_string(),
                })?;

            let trigger_map = |target: &wrench_config::TriggerTarget| {
                maps.get(&target.contract_map_id)
                    .cloned()
                    .ok_or_else(|| BuildError::UnknownContractMap {
                        action_id: action_id.to_string(),
                        contract_map_id: target.contract_map_id.clone(),
                    })
            };

            if let Some(before) = &settings.trigger.before {
                handlers.push(Arc::new(ContractMapHandler::new(trigger_map(before)?)));
            }
            let executor = executors.build(settings)?;
            handlers.push(Arc::new(ActionHandler::new(
                Arc::new(settings.clone()),
                executor,
            )));
            if let Some(after) = &settings.trigger.after {
                handlers.push(Arc::new(ContractMapHandler::new(trigger_map(after)?)));
            }
        }

        handlers.push(Arc::new(Responder));

        let chain = Chain::new(key, handlers);
        Ok(match self.deadline {
            Some(deadline) => chain.with_deadline(deadline),
            None => chain,
        })
    }
}
