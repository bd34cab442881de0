//! Pod liveness probe used by soft clears

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::selector::{self, Selector};

/// Counts the live pods backing a subset
#[async_trait]
pub trait PodLiveness: Send + Sync {
    async fn live_pods(&self, namespace: &str, labels: &Selector) -> Result<usize>;
}

/// [`PodLiveness`] backed by the Kubernetes API: a pod is live when its
/// `Ready` condition is `True`
#[derive(Clone)]
pub struct KubePodLiveness {
    client: Client,
}

impl KubePodLiveness {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Pod list filter for `labels`; `None` when there is nothing to match on
///
/// An unlabelled subset selects no pods rather than the whole namespace.
fn list_params(labels: &Selector) -> Option<ListParams> {
    selector::stringify(labels)
        .ok()
        .map(|label_selector| ListParams::default().labels(&label_selector))
}

#[async_trait]
impl PodLiveness for KubePodLiveness {
    #[instrument(skip(self))]
    async fn live_pods(&self, namespace: &str, labels: &Selector) -> Result<usize> {
        let Some(lp) = list_params(labels) else {
            debug!("Subset has no labels, counting no live pods");
            return Ok(0);
        };

        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let pods = api.list(&lp).await.map_err(Error::RemoteApiError)?;
        let live = pods.items.iter().filter(|p| is_pod_ready(p)).count();
        debug!(
            "{} of {} pods live ({})",
            live,
            pods.items.len(),
            pods.items
                .iter()
                .map(|p| p.name_any())
                .collect::<Vec<_>>()
                .join(",")
        );
        Ok(live)
    }
}
