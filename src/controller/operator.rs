//! Traffic operator
//!
//! Composes the subset and route routers. Writes are ordered so a routing
//! rule never references a subset that does not exist: subsets are written
//! before the rules that use them and removed after. A clear keeps every
//! subset that a surviving master rule still routes to.
//!
//! There is no rollback. If the route step of an update fails after the
//! subset step succeeded, the DestinationRule is left ahead of the
//! VirtualService and the route error is returned as is.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use super::liveness::{KubePodLiveness, PodLiveness};
use super::route_router::RouteRouter;
use super::router::Router;
use super::store::{KubeStore, MeshStore};
use super::subset_router::SubsetRouter;
use crate::config::MeshContext;
use crate::crd::{ClearMode, DestinationRule, MeshKind, Shift, VirtualService};
use crate::error::{Error, Result};
use crate::selector::Selector;

/// Both resource kinds matched by one selector
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSet {
    pub subset_resources: Vec<DestinationRule>,
    pub route_resources: Vec<VirtualService>,
}

pub struct TrafficOperator {
    subsets: SubsetRouter,
    routes: RouteRouter,
}

impl TrafficOperator {
    pub fn new(
        store: Arc<dyn MeshStore>,
        liveness: Arc<dyn PodLiveness>,
        namespace: &str,
    ) -> Self {
        Self {
            subsets: SubsetRouter::new(store.clone(), liveness, namespace),
            routes: RouteRouter::new(store, namespace),
        }
    }

    /// Operator talking to the cluster behind `ctx`
    pub fn from_context(ctx: &MeshContext) -> Self {
        let store = Arc::new(KubeStore::new(ctx.client.clone(), &ctx.config.field_manager));
        let liveness = Arc::new(KubePodLiveness::new(ctx.client.clone()));
        Self::new(store, liveness, &ctx.config.namespace)
    }

    /// Current routing and subset resources for a target service
    #[instrument(skip(self))]
    pub async fn get(&self, selector: &Selector) -> Result<ResourceSet> {
        let route_resources = self.routes.list(selector).await?;
        let subset_resources = self.subsets.list(selector).await?;
        if subset_resources.is_empty() {
            return Err(Error::EmptyResourceSet(MeshKind::DestinationRule.to_string()));
        }

        Ok(ResourceSet {
            subset_resources,
            route_resources,
        })
    }

    /// Apply a traffic shift: subsets first, then the rules routing to them
    #[instrument(
        skip(self, shift),
        fields(selector = ?shift.selector, subset = %shift.subset_name())
    )]
    pub async fn update(&self, shift: &Shift) -> Result<()> {
        if shift.selector.is_empty() {
            return Err(Error::MissingSelector);
        }
        if shift.traffic.pod_selector.is_empty() {
            return Err(Error::MissingPodSelector);
        }

        self.subsets.validate(shift)?;
        self.routes.validate(shift)?;
        self.subsets.update(shift).await?;
        self.routes.update(shift).await?;

        info!("Shifted traffic to subset {}", shift.subset_name());
        Ok(())
    }

    /// Strip canary rules, then the subsets they referenced
    #[instrument(skip(self, shift), fields(selector = ?shift.selector))]
    pub async fn clear(&self, shift: &Shift, mode: ClearMode) -> Result<()> {
        if shift.selector.is_empty() {
            return Err(Error::MissingSelector);
        }

        self.routes.clear(shift, mode).await?;
        self.subsets.clear(shift, mode).await?;

        info!("Cleared canary traffic ({} mode)", mode);
        Ok(())
    }
}
