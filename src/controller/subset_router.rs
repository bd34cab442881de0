//! Subset definitions on `DestinationRule` resources
//!
//! A clear never removes a subset that a master rule of a matching
//! VirtualService still routes to, whatever the mode.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::liveness::PodLiveness;
use super::route_router::master_subsets;
use super::router::Router;
use super::store::{list_typed, persist, MeshStore};
use crate::crd::{
    ClearMode, DestinationRule, DestinationRuleSpec, MeshKind, Shift, Subset, VirtualServiceSpec,
};
use crate::error::{Error, Result};
use crate::selector::{self, Selector};

pub struct SubsetRouter {
    store: Arc<dyn MeshStore>,
    liveness: Arc<dyn PodLiveness>,
    namespace: String,
}

impl SubsetRouter {
    pub fn new(
        store: Arc<dyn MeshStore>,
        liveness: Arc<dyn PodLiveness>,
        namespace: &str,
    ) -> Self {
        Self {
            store,
            liveness,
            namespace: namespace.to_string(),
        }
    }

    /// Point the subset `name` at `labels`, adding it if absent
    ///
    /// Returns true when the resource changed.
    pub fn upsert_subset(rule: &mut DestinationRule, name: &str, labels: &Selector) -> bool {
        match rule.spec.subsets.iter_mut().find(|s| s.name == name) {
            Some(existing) if existing.labels == *labels => false,
            Some(existing) => {
                existing.labels = labels.clone();
                true
            }
            None => {
                rule.spec.subsets.push(Subset::new(name, labels.clone()));
                true
            }
        }
    }

    async fn is_dead(&self, subset: &Subset) -> Result<bool> {
        let live = self
            .liveness
            .live_pods(&self.namespace, &subset.labels)
            .await?;
        Ok(live == 0)
    }

    /// Subsets referenced by the master rules of the VirtualServices
    /// matching `label_selector`
    async fn pinned_subsets(&self, label_selector: &str) -> Result<BTreeSet<String>> {
        let services =
            list_typed::<VirtualServiceSpec>(self.store.as_ref(), &self.namespace, label_selector)
                .await?;
        Ok(services
            .iter()
            .flat_map(master_subsets)
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl Router for SubsetRouter {
    type Resource = DestinationRule;

    #[instrument(skip(self))]
    async fn list(&self, selector: &Selector) -> Result<Vec<DestinationRule>> {
        let label_selector = selector::stringify(selector)?;
        list_typed::<DestinationRuleSpec>(self.store.as_ref(), &self.namespace, &label_selector)
            .await
    }

    fn validate(&self, shift: &Shift) -> Result<()> {
        if shift.selector.is_empty() {
            return Err(Error::MissingSelector);
        }
        if shift.traffic.pod_selector.is_empty() {
            return Err(Error::MissingPodSelector);
        }
        Ok(())
    }

    #[instrument(skip(self, shift), fields(subset = %shift.subset_name()))]
    async fn update(&self, shift: &Shift) -> Result<()> {
        let rules = self.list(&shift.selector).await?;
        if rules.is_empty() {
            return Err(Error::EmptyResourceSet(MeshKind::DestinationRule.to_string()));
        }

        let name = shift.subset_name();
        for mut rule in rules {
            if !Self::upsert_subset(&mut rule, &name, &shift.traffic.pod_selector) {
                debug!("Subset {} already current on {}", name, rule.name());
                continue;
            }
            persist(self.store.as_ref(), &self.namespace, &rule).await?;
            info!(
                "Ensured subset {} on DestinationRule {}/{}",
                name,
                self.namespace,
                rule.name()
            );
        }
        Ok(())
    }

    #[instrument(skip(self, shift))]
    async fn clear(&self, shift: &Shift, mode: ClearMode) -> Result<()> {
        let pinned = self
            .pinned_subsets(&selector::stringify(&shift.selector)?)
            .await?;

        for mut rule in self.list(&shift.selector).await? {
            let before = rule.spec.subsets.len();

            let mut kept = Vec::with_capacity(before);
            for subset in std::mem::take(&mut rule.spec.subsets) {
                if pinned.contains(&subset.name) {
                    debug!("Keeping subset {} used by a master rule", subset.name);
                    kept.push(subset);
                    continue;
                }

                let remove = match mode {
                    ClearMode::Hard => true,
                    ClearMode::Soft => self.is_dead(&subset).await?,
                };
                if remove {
                    debug!("Dropping subset {}", subset.name);
                } else {
                    kept.push(subset);
                }
            }
            rule.spec.subsets = kept;

            let removed = before - rule.spec.subsets.len();
            if removed == 0 {
                continue;
            }
            persist(self.store.as_ref(), &self.namespace, &rule).await?;
            info!(
                "Removed {} subsets from DestinationRule {}/{} ({} clear)",
                removed,
                self.namespace,
                rule.name(),
                mode
            );
        }
        Ok(())
    }
}
