//! In-memory [`MeshStore`]
//!
//! Mirrors the API server behaviour the routers depend on: label-selector
//! filtering on list, `404` for missing objects, `409` for stale
//! `resourceVersion`s and duplicate creates. Used by `--dry-run` and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::ErrorResponse;
use tokio::sync::RwLock;

use super::store::MeshStore;
use crate::crd::{MeshKind, MeshResource, MeshSpec};
use crate::selector;

type Key = (MeshKind, String, String);

#[derive(Default)]
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<Key, DynamicObject>>,
    failing: RwLock<BTreeMap<MeshKind, u16>>,
    writes: AtomicUsize,
    next_version: AtomicUsize,
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

fn key(kind: MeshKind, namespace: &str, obj: &DynamicObject) -> Key {
    (
        kind,
        namespace.to_string(),
        obj.metadata.name.clone().unwrap_or_default(),
    )
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a typed resource, bypassing write accounting
    pub async fn insert<S: MeshSpec>(&self, resource: &MeshResource<S>) {
        let namespace = resource.metadata.namespace.clone().unwrap_or_default();
        if let Ok(mut obj) = resource.to_dynamic() {
            obj.metadata.resource_version = Some(self.bump().to_string());
            self.objects
                .write()
                .await
                .insert(key(S::KIND, &namespace, &obj), obj);
        }
    }

    /// Typed snapshot of a stored resource
    pub async fn fetch<S: MeshSpec>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<MeshResource<S>> {
        let objects = self.objects.read().await;
        let obj = objects.get(&(S::KIND, namespace.to_string(), name.to_string()))?;
        MeshResource::from_dynamic(obj.clone()).ok()
    }

    /// Make every subsequent create/update of `kind` fail with `code`
    pub async fn fail_writes(&self, kind: MeshKind, code: u16) {
        self.failing.write().await.insert(kind, code);
    }

    /// Number of successful create/update calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn bump(&self) -> usize {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn check_failure(&self, kind: MeshKind) -> Result<(), kube::Error> {
        match self.failing.read().await.get(&kind) {
            Some(code) => Err(api_error(
                *code,
                "InternalError",
                format!("injected failure writing {}", kind),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MeshStore for InMemoryStore {
    async fn list(
        &self,
        kind: MeshKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, kube::Error> {
        let wanted = if label_selector.trim().is_empty() {
            selector::Selector::new()
        } else {
            selector::parse(label_selector)
                .map_err(|e| api_error(400, "BadRequest", e.to_string()))?
        };

        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter(|(_, obj)| {
                let labels = obj.metadata.labels.clone().unwrap_or_default();
                selector::matches(&wanted, &labels)
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn get(
        &self,
        kind: MeshKind,
        namespace: &str,
        name: &str,
    ) -> Result<DynamicObject, kube::Error> {
        self.objects
            .read()
            .await
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                api_error(
                    404,
                    "NotFound",
                    format!("{} \"{}\" not found", kind, name),
                )
            })
    }

    async fn create(
        &self,
        kind: MeshKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        self.check_failure(kind).await?;

        let k = key(kind, namespace, obj);
        let mut objects = self.objects.write().await;
        if objects.contains_key(&k) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", kind, k.2),
            ));
        }

        let mut stored = obj.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(self.bump().to_string());
        objects.insert(k, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update(
        &self,
        kind: MeshKind,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, kube::Error> {
        self.check_failure(kind).await?;

        let k = key(kind, namespace, obj);
        let mut objects = self.objects.write().await;
        let current = objects.get(&k).ok_or_else(|| {
            api_error(404, "NotFound", format!("{} \"{}\" not found", kind, k.2))
        })?;

        if let Some(version) = &obj.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(version) {
                return Err(api_error(
                    409,
                    "Conflict",
                    format!("{} \"{}\" has been modified", kind, k.2),
                ));
            }
        }

        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(self.bump().to_string());
        objects.insert(k, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}
