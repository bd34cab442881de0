//! Fixtures shared by the router and operator tests

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::liveness::PodLiveness;
use super::memory_store::InMemoryStore;
use crate::crd::{
    Destination, DestinationRule, DestinationRuleSpec, HttpMatchRequest, HttpRoute,
    HttpRouteDestination, Shift, StringMatch, Subset, TrafficSpec, VirtualService,
    VirtualServiceSpec,
};
use crate::error::Result;
use crate::selector::{from_pairs, Selector};

pub const NAMESPACE: &str = "bookinfo";
pub const NAME: &str = "reviews";

pub fn service_selector() -> Selector {
    from_pairs([("app", "reviews")])
}

/// Liveness probe answering from a fixed table keyed by the `version` label
#[derive(Default)]
pub struct FakeLiveness {
    pub live: BTreeMap<String, usize>,
}

impl FakeLiveness {
    pub fn with(versions: &[(&str, usize)]) -> Arc<Self> {
        Arc::new(Self {
            live: versions
                .iter()
                .map(|(v, n)| (v.to_string(), *n))
                .collect(),
        })
    }
}

#[async_trait]
impl PodLiveness for FakeLiveness {
    async fn live_pods(&self, _namespace: &str, labels: &Selector) -> Result<usize> {
        Ok(labels
            .get("version")
            .and_then(|v| self.live.get(v))
            .copied()
            .unwrap_or(0))
    }
}

pub fn master_route() -> HttpRoute {
    HttpRoute {
        matches: vec![HttpMatchRequest {
            uri: Some(StringMatch::prefix("/")),
            ..Default::default()
        }],
        route: vec![HttpRouteDestination {
            destination: Destination {
                host: NAME.to_string(),
                subset: None,
                port: None,
            },
            weight: None,
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn baseline_destination_rule(subsets: Vec<Subset>) -> DestinationRule {
    DestinationRule::new(
        NAME,
        NAMESPACE,
        DestinationRuleSpec {
            host: NAME.to_string(),
            subsets,
            ..Default::default()
        },
    )
    .with_labels(service_selector())
}

pub fn baseline_virtual_service(http: Vec<HttpRoute>) -> VirtualService {
    VirtualService::new(
        NAME,
        NAMESPACE,
        VirtualServiceSpec {
            hosts: vec![NAME.to_string()],
            http,
            ..Default::default()
        },
    )
    .with_labels(service_selector())
}

/// Store holding a DestinationRule without subsets and a VirtualService
/// with only the master rule
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    store.insert(&baseline_destination_rule(Vec::new())).await;
    store
        .insert(&baseline_virtual_service(vec![master_route()]))
        .await;
    store
}

pub fn weighted_shift(version: &str, weight: i32) -> Shift {
    Shift {
        port: 9080,
        hostname: NAME.to_string(),
        selector: service_selector(),
        traffic: TrafficSpec {
            pod_selector: from_pairs([("version", version)]),
            request_headers: Selector::new(),
            weight,
        },
        build: 7,
    }
}

pub fn header_shift(version: &str, headers: &[(&str, &str)]) -> Shift {
    Shift {
        traffic: TrafficSpec {
            pod_selector: from_pairs([("version", version)]),
            request_headers: from_pairs(headers.iter().copied()),
            weight: 0,
        },
        ..weighted_shift(version, 0)
    }
}

pub async fn stored_rule(store: &InMemoryStore) -> DestinationRule {
    store
        .fetch::<DestinationRuleSpec>(NAMESPACE, NAME)
        .await
        .expect("destination rule present")
}

pub async fn stored_service(store: &InMemoryStore) -> VirtualService {
    store
        .fetch::<VirtualServiceSpec>(NAMESPACE, NAME)
        .await
        .expect("virtual service present")
}
