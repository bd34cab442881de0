//! Remote mesh resource store
//!
//! The routers only ever talk to the mesh control plane through the four
//! verbs of [`MeshStore`]. [`KubeStore`] backs them with the Kubernetes API.

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, PostParams};
use kube::Client;
use tracing::{debug, info, instrument};

use crate::crd::{MeshKind, MeshResource, MeshSpec};
use crate::error::{is_not_found, Error, Result};

/// List/Get/Create/Update verbs against named, namespaced mesh resources
#[async_trait]
pub trait MeshStore: Send + Sync {
    async fn list(
        &self,
        kind: MeshKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, kube::Error>;

    async fn get(
        &self,
        kind: MeshKind,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, kube::Error>;

    async fn create(
        &self,
        kind: MeshKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;

    async fn update(
        &self,
        kind: MeshKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error>;
}

/// [`MeshStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: &str) -> Self {
        Self {
            client,
            field_manager: field_manager.to_string(),
        }
    }

    fn api(&self, kind: MeshKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MeshStore for KubeStore {
    async fn list(
        &self,
        kind: MeshKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, kube::Error> {
        let lp = ListParams::default().labels(label_selector);
        Ok(self.api(kind, namespace).list(&lp).await?.items)
    }

    async fn get(
        &self,
        kind: MeshKind,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, kube::Error> {
        self.api(kind, namespace).get(name).await
    }

    async fn create(
        &self,
        kind: MeshKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        self.api(kind, namespace)
            .create(&self.post_params(), obj)
            .await
    }

    async fn update(
        &self,
        kind: MeshKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.api(kind, namespace)
            .replace(&name, &self.post_params(), obj)
            .await
    }
}

/// List the resources of kind `S` matching `label_selector` as typed resources
pub async fn list_typed<S: MeshSpec>(
    store: &dyn MeshStore,
    namespace: &str,
    label_selector: &str,
) -> Result<Vec<MeshResource<S>>> {
    store
        .list(S::KIND, namespace, label_selector)
        .await
        .map_err(Error::RemoteApiError)?
        .into_iter()
        .map(MeshResource::from_dynamic)
        .collect()
}

/// Write a resource back: update if present, create if absent
///
/// A `404` from either the lookup or the update is the only condition that
/// falls back to create; anything else is returned as is.
#[instrument(skip(store, resource), fields(kind = %resource.kind(), name = %resource.name()))]
pub async fn persist<S: MeshSpec>(
    store: &dyn MeshStore,
    namespace: &str,
    resource: &MeshResource<S>,
) -> Result<()> {
    let obj = resource.to_dynamic()?;
    let name = resource.name();

    let found = match store.get(S::KIND, namespace, &name).await {
        Ok(_) => true,
        Err(e) if is_not_found(&e) => false,
        Err(e) => return Err(Error::RemoteApiError(e)),
    };

    if found {
        match store.update(S::KIND, namespace, &obj).await {
            Ok(_) => {
                debug!("Updated {} {}/{}", S::KIND, namespace, name);
                return Ok(());
            }
            Err(e) if is_not_found(&e) => {
                debug!("{} {}/{} vanished before update", S::KIND, namespace, name);
            }
            Err(e) => return Err(Error::RemoteApiError(e)),
        }
    }

    create(store, S::KIND, namespace, obj).await
}

async fn create(
    store: &dyn MeshStore,
    kind: MeshKind,
    namespace: &str,
    mut obj: DynamicObject,
) -> Result<()> {
    // A resourceVersion from an earlier read is rejected on create
    obj.metadata.resource_version = None;
    obj.metadata.uid = None;

    store
        .create(kind, namespace, &obj)
        .await
        .map_err(Error::RemoteApiError)?;
    info!(
        "Created {} {}/{}",
        kind,
        namespace,
        obj.metadata.name.as_deref().unwrap_or_default()
    );
    Ok(())
}
