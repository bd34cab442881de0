//! Istio Traffic Management Types
//!
//! Typed views over the two mesh resource kinds the engine mutates:
//! `DestinationRule` (subset definitions) and `VirtualService` (HTTP routing
//! rules). Only the fields the engine reads or writes are modelled; every
//! other field is carried through `extra` so a read-modify-write cycle never
//! drops configuration owned by someone else.

use std::collections::BTreeMap;

use kube::api::{DynamicObject, ObjectMeta};
use kube::discovery::ApiResource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;
use crate::selector::Selector;

/// Prefix of routing rules synthesized for a canary subset
pub const CANARY_ROUTE_PREFIX: &str = "canary-";

/// The mesh resource kinds managed by the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeshKind {
    DestinationRule,
    VirtualService,
}

impl MeshKind {
    pub fn api_resource(&self) -> ApiResource {
        let (kind, plural) = match self {
            MeshKind::DestinationRule => ("DestinationRule", "destinationrules"),
            MeshKind::VirtualService => ("VirtualService", "virtualservices"),
        };

        ApiResource {
            group: "networking.istio.io".to_string(),
            version: "v1beta1".to_string(),
            api_version: "networking.istio.io/v1beta1".to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }
}

impl std::fmt::Display for MeshKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MeshKind::DestinationRule => write!(f, "DestinationRule"),
            MeshKind::VirtualService => write!(f, "VirtualService"),
        }
    }
}

/// A resource spec tied to its mesh kind
pub trait MeshSpec:
    Clone + std::fmt::Debug + Default + Serialize + DeserializeOwned + Send + Sync
{
    const KIND: MeshKind;
}

/// A mesh resource with a typed spec
///
/// `data` keeps the raw top level of the object (`spec`, `status`, ...) so the
/// write-back only replaces `spec`.
#[derive(Clone, Debug, Serialize)]
pub struct MeshResource<S> {
    pub metadata: ObjectMeta,
    pub spec: S,
    #[serde(skip)]
    data: Value,
}

impl<S: MeshSpec> MeshResource<S> {
    pub fn new(name: &str, namespace: &str, spec: S) -> Self {
        Self {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec,
            data: json!({}),
        }
    }

    pub fn with_labels(mut self, labels: Selector) -> Self {
        self.metadata.labels = Some(labels);
        self
    }

    pub fn name(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    pub fn kind(&self) -> MeshKind {
        S::KIND
    }

    pub fn from_dynamic(obj: DynamicObject) -> Result<Self> {
        let spec = match obj.data.get("spec") {
            Some(spec) if !spec.is_null() => serde_json::from_value(spec.clone())?,
            _ => S::default(),
        };

        Ok(Self {
            metadata: obj.metadata,
            spec,
            data: obj.data,
        })
    }

    pub fn to_dynamic(&self) -> Result<DynamicObject> {
        let ar = S::KIND.api_resource();
        let mut data = match &self.data {
            Value::Object(_) => self.data.clone(),
            _ => json!({}),
        };
        data["spec"] = serde_json::to_value(&self.spec)?;

        let mut obj = DynamicObject::new(&self.name(), &ar).data(data);
        obj.metadata = self.metadata.clone();
        Ok(obj)
    }
}

// ---------------------------------------------------------------------------
// DestinationRule
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationRuleSpec {
    #[serde(default)]
    pub host: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<Subset>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MeshSpec for DestinationRuleSpec {
    const KIND: MeshKind = MeshKind::DestinationRule;
}

/// A named, label-selected group of backend pods
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subset {
    pub name: String,

    #[serde(default)]
    pub labels: Selector,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Subset {
    pub fn new(name: &str, labels: Selector) -> Self {
        Self {
            name: name.to_string(),
            labels,
            extra: BTreeMap::new(),
        }
    }
}

pub type DestinationRule = MeshResource<DestinationRuleSpec>;

impl DestinationRule {
    pub fn subset(&self, name: &str) -> Option<&Subset> {
        self.spec.subsets.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// VirtualService
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,

    #[serde(default)]
    pub http: Vec<HttpRoute>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MeshSpec for VirtualServiceSpec {
    const KIND: MeshKind = MeshKind::VirtualService;
}

/// One ordered match-and-route entry of a VirtualService
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpMatchRequest>,

    #[serde(default)]
    pub route: Vec<HttpRouteDestination>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HttpRoute {
    /// True if any match condition constrains request headers
    pub fn has_header_match(&self) -> bool {
        self.matches.iter().any(|m| !m.headers.is_empty())
    }

    pub fn is_canary_named(&self) -> bool {
        self.name
            .as_deref()
            .is_some_and(|n| n.starts_with(CANARY_ROUTE_PREFIX))
    }

    /// The baseline catch-all rule: no header constraints and not a
    /// synthesized canary route
    pub fn is_master(&self) -> bool {
        !self.has_header_match() && !self.is_canary_named()
    }

    pub fn routes_to_subset(&self, subset: &str) -> bool {
        self.route
            .iter()
            .any(|r| r.destination.subset.as_deref() == Some(subset))
    }
}

/// Match conditions of a rule; all set fields must match
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<StringMatch>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, StringMatch>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl HttpMatchRequest {
    /// Exact-match on every header of `headers`
    pub fn exact_headers(headers: &Selector) -> Self {
        Self {
            headers: headers
                .iter()
                .map(|(k, v)| (k.clone(), StringMatch::exact(v)))
                .collect(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

impl StringMatch {
    pub fn exact(value: &str) -> Self {
        Self {
            exact: Some(value.to_string()),
            ..Default::default()
        }
    }

    pub fn prefix(value: &str) -> Self {
        Self {
            prefix: Some(value.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRouteDestination {
    pub destination: Destination,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PortSelector {
    pub number: u32,
}

pub type VirtualService = MeshResource<VirtualServiceSpec>;
