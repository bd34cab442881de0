//! Configuration and client context
//!
//! A [`MeshConfig`] is built once by the caller (from a TOML file, CLI flags
//! or both) and turned into a [`MeshContext`] holding the Kubernetes client
//! shared by both routers.

use std::path::Path;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

fn default_namespace() -> String {
    "default".to_string()
}

fn default_field_manager() -> String {
    "canary-shift".to_string()
}

fn default_service() -> String {
    "canary-shift".to_string()
}

/// Where the mesh resources live and how writes are attributed
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshConfig {
    /// Namespace of the DestinationRule and VirtualService resources
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Kubeconfig context; the inferred configuration is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Field manager recorded on every write
    #[serde(default = "default_field_manager")]
    pub field_manager: String,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            context: None,
            field_manager: default_field_manager(),
        }
    }
}

impl MeshConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::ConfigError(format!("invalid config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }
}

/// Tags attached to every log line, passed to the logging setup explicitly
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    #[serde(default = "default_service")]
    pub service: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            environment: None,
            json: false,
        }
    }
}

/// Connected client plus the configuration it was built from
#[derive(Clone)]
pub struct MeshContext {
    pub client: Client,
    pub config: MeshConfig,
}

impl MeshContext {
    /// Build the Kubernetes client for `config`
    pub async fn connect(config: &MeshConfig) -> Result<Self> {
        let kube_config = match &config.context {
            Some(context) => {
                let kubeconfig = Kubeconfig::read()
                    .map_err(|e| Error::ConfigError(format!("failed to read kubeconfig: {}", e)))?;
                let options = KubeConfigOptions {
                    context: Some(context.clone()),
                    ..Default::default()
                };
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| {
                        Error::ConfigError(format!("failed to load context {}: {}", context, e))
                    })?
            }
            None => Config::infer()
                .await
                .map_err(|e| Error::ConfigError(format!("failed to infer kube config: {}", e)))?,
        };

        let client = Client::try_from(kube_config)
            .map_err(|e| Error::ConfigError(format!("failed to build client: {}", e)))?;

        info!(
            namespace = %config.namespace,
            context = config.context.as_deref().unwrap_or("<inferred>"),
            "Connected to Kubernetes cluster"
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }
}
