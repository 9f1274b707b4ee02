//! Request matching.
//!
//! Every manifest endpoint contributes one [`Route`]. Templates are matched
//! segment by segment, `{name}` matching any single non-empty segment.
//! Proxy endpoints match their template as a prefix, for any method.
//!
//! When several routes match, literal segments win over parameters and
//! exact routes win over proxies.

use std::sync::Arc;

use http::Method;
use wrench_chain::{Chain, ChainRegistry};
use wrench_config::{EndpointSettings, Manifest};

use crate::error::ServerError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// One endpoint bound to its compiled chain.
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    template: Vec<Segment>,
    endpoint: Arc<EndpointSettings>,
    chain: Arc<Chain>,
}

impl Route {
    fn new(endpoint: EndpointSettings, chain: Arc<Chain>) -> Result<Self, ServerError> {
        let method = Method::from_bytes(endpoint.method.as_str().as_bytes()).map_err(|_| {
            ServerError::InvalidRoute {
                route: endpoint.route.clone(),
                reason: format!("unsupported method {}", endpoint.method),
            }
        })?;
        let template = segments(&endpoint.route)
            .map(|s| {
                if s.starts_with('{') && s.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Ok(Self {
            method,
            template,
            endpoint: Arc::new(endpoint),
            chain,
        })
    }

    /// The endpoint settings.
    pub fn endpoint(&self) -> &Arc<EndpointSettings> {
        &self.endpoint
    }

    /// The compiled chain.
    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    /// Whether `path` matches; returns the number of literal segments matched.
    fn score(&self, path: &str) -> Option<usize> {
        let mut parts = segments(path);
        let mut literals = 0;
        for segment in &self.template {
            let part = parts.next()?;
            match segment {
                Segment::Literal(text) if text == part => literals += 1,
                Segment::Literal(_) => return None,
                Segment::Param => {}
            }
        }
        if parts.next().is_some() && !self.endpoint.is_proxy {
            return None;
        }
        Some(literals)
    }
}

/// What the table found for a request.
#[derive(Debug)]
pub enum RouteLookup<'a> {
    /// A route accepts the method and path.
    Found(&'a Route),
    /// The path exists, but not for this method.
    MethodNotAllowed(Vec<Method>),
    /// Nothing matches the path.
    NotFound,
}

/// All endpoints of a manifest, ready for matching.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Binds every endpoint of `manifest` to its chain in `chains`.
    pub fn new(manifest: &Manifest, chains: &ChainRegistry) -> Result<Self, ServerError> {
        let routes = manifest
            .api
            .endpoints
            .iter()
            .map(|endpoint| {
                let key = endpoint.chain_key();
                let chain = chains
                    .get(&key)
                    .ok_or(ServerError::MissingChain { key })?;
                Route::new(endpoint.clone(), chain)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the best route for `method` and `path`.
    pub fn lookup(&self, method: &Method, path: &str) -> RouteLookup<'_> {
        let mut best: Option<(&Route, (bool, usize))> = None;
        let mut allowed = Vec::new();

        for route in &self.routes {
            let Some(literals) = route.score(path) else {
                continue;
            };
            if !route.endpoint.is_proxy && route.method != *method {
                if !allowed.contains(&route.method) {
                    allowed.push(route.method.clone());
                }
                continue;
            }
            let rank = (!route.endpoint.is_proxy, literals);
            if best.as_ref().map_or(true, |(_, current)| rank > *current) {
                best = Some((route, rank));
            }
        }

        match best {
            Some((route, _)) => RouteLookup::Found(route),
            None if allowed.is_empty() => RouteLookup::NotFound,
            None => RouteLookup::MethodNotAllowed(allowed),
        }
    }
}
