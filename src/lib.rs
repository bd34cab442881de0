//! canary-shift: canary traffic shifting for Istio-meshed services
//!
//! This crate mutates the `DestinationRule` and `VirtualService` resources
//! of a service to divert a weighted or header-matched slice of traffic to
//! a canary subset, and strips those canary rules again.

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod selector;
pub mod telemetry;

pub use crate::config::{LogConfig, MeshConfig, MeshContext};
pub use crate::controller::{ResourceSet, TrafficOperator};
pub use crate::crd::{ClearMode, Shift, TrafficSpec};
pub use crate::error::{Error, Result};
pub use crate::selector::Selector;
