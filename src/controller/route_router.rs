//! HTTP routing rules on `VirtualService` resources
//!
//! Canary rules are appended after the existing rules and named
//! `canary-<subset>`. The master rule, the catch-all with no header
//! constraints, is never touched by an update and always survives a clear.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::router::Router;
use super::store::{list_typed, persist, MeshStore};
use crate::crd::{
    ClearMode, Destination, HttpMatchRequest, HttpRoute, HttpRouteDestination, MeshKind,
    PortSelector, Shift, VirtualService, VirtualServiceSpec, CANARY_ROUTE_PREFIX,
};
use crate::error::{Error, Result};
use crate::selector::{self, Selector};

pub struct RouteRouter {
    store: Arc<dyn MeshStore>,
    namespace: String,
}

/// Header exact-match conditions; a rule without headers has no match block
fn header_matches(headers: &Selector) -> Vec<HttpMatchRequest> {
    if headers.is_empty() {
        Vec::new()
    } else {
        vec![HttpMatchRequest::exact_headers(headers)]
    }
}

/// A new canary rule for `subset` carrying the shift's treatment
pub fn build_canary_route(shift: &Shift, subset: &str) -> HttpRoute {
    let weight = shift.traffic.is_weighted().then_some(shift.traffic.weight);

    HttpRoute {
        name: Some(format!("{}{}", CANARY_ROUTE_PREFIX, subset)),
        matches: header_matches(&shift.traffic.request_headers),
        route: vec![HttpRouteDestination {
            destination: Destination {
                host: shift.hostname.clone(),
                subset: Some(subset.to_string()),
                port: (shift.port != 0).then_some(PortSelector { number: shift.port }),
            },
            weight,
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Apply the shift's treatment to an existing rule targeting `subset`
///
/// Weighted shifts drop header matches, header shifts drop weights, so the
/// rule always reflects exactly one treatment.
pub fn retarget_route(route: &mut HttpRoute, shift: &Shift, subset: &str) {
    if shift.traffic.is_weighted() {
        route.matches.retain(|m| m.headers.is_empty());
    } else {
        route.matches = header_matches(&shift.traffic.request_headers);
    }

    for dest in route
        .route
        .iter_mut()
        .filter(|r| r.destination.subset.as_deref() == Some(subset))
    {
        dest.weight = shift.traffic.is_weighted().then_some(shift.traffic.weight);
    }

    // Without header matches only the name keeps it apart from the master rule
    if route.is_master() {
        route.name = Some(format!("{}{}", CANARY_ROUTE_PREFIX, subset));
    }
}

/// Merge the shift into the ordered rule list of `vs`
///
/// Returns true when a new rule was appended rather than an existing one
/// mutated.
pub fn merge_route(vs: &mut VirtualService, shift: &Shift, subset: &str) -> bool {
    let existing = vs
        .spec
        .http
        .iter_mut()
        .find(|r| !r.is_master() && r.routes_to_subset(subset));

    match existing {
        Some(route) => {
            retarget_route(route, shift, subset);
            false
        }
        None => {
            vs.spec.http.push(build_canary_route(shift, subset));
            true
        }
    }
}

/// Subsets the master rules of `vs` route to
pub fn master_subsets(vs: &VirtualService) -> impl Iterator<Item = &str> {
    vs.spec
        .http
        .iter()
        .filter(|r| r.is_master())
        .flat_map(|r| r.route.iter())
        .filter_map(|d| d.destination.subset.as_deref())
}

/// Drop every non-master rule, keeping the relative order of the rest
///
/// Returns the number of rules removed.
pub fn strip_to_master(vs: &mut VirtualService) -> usize {
    let before = vs.spec.http.len();
    vs.spec.http.retain(HttpRoute::is_master);
    before - vs.spec.http.len()
}

impl RouteRouter {
    pub fn new(store: Arc<dyn MeshStore>, namespace: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl Router for RouteRouter {
    type Resource = VirtualService;

    #[instrument(skip(self))]
    async fn list(&self, selector: &Selector) -> Result<Vec<VirtualService>> {
        let label_selector = selector::stringify(selector)?;
        let services =
            list_typed::<VirtualServiceSpec>(self.store.as_ref(), &self.namespace, &label_selector)
                .await?;

        if services.is_empty() {
            return Err(Error::EmptyResourceSet(MeshKind::VirtualService.to_string()));
        }
        Ok(services)
    }

    fn validate(&self, shift: &Shift) -> Result<()> {
        shift.traffic.validate()
    }

    #[instrument(skip(self, shift), fields(subset = %shift.subset_name()))]
    async fn update(&self, shift: &Shift) -> Result<()> {
        let subset = shift.subset_name();

        for mut vs in self.list(&shift.selector).await? {
            let before = vs.spec.http.clone();
            let appended = merge_route(&mut vs, shift, &subset);
            if vs.spec.http == before {
                debug!("Route to {} already current on {}", subset, vs.name());
                continue;
            }

            persist(self.store.as_ref(), &self.namespace, &vs).await?;
            info!(
                "{} canary route to subset {} on VirtualService {}/{}",
                if appended { "Added" } else { "Updated" },
                subset,
                self.namespace,
                vs.name()
            );
        }
        Ok(())
    }

    #[instrument(skip(self, shift))]
    async fn clear(&self, shift: &Shift, mode: ClearMode) -> Result<()> {
        for mut vs in self.list(&shift.selector).await? {
            let removed = strip_to_master(&mut vs);
            if removed == 0 {
                debug!("VirtualService {} has only master rules", vs.name());
                continue;
            }

            persist(self.store.as_ref(), &self.namespace, &vs).await?;
            info!(
                "Removed {} canary routes from VirtualService {}/{} ({} clear)",
                removed,
                self.namespace,
                vs.name(),
                mode
            );
        }
        Ok(())
    }
}
