//! Resource and request types
//!
//! This module defines the typed Istio resources the engine mutates and the
//! `Shift` records that describe the desired traffic state.

pub mod service_mesh;
mod shift;


pub use service_mesh::{
    Destination, DestinationRule, DestinationRuleSpec, HttpMatchRequest, HttpRoute,
    HttpRouteDestination, MeshKind, MeshResource, MeshSpec, PortSelector, StringMatch, Subset,
    VirtualService, VirtualServiceSpec, CANARY_ROUTE_PREFIX,
};
pub use shift::{ClearMode, Shift, TrafficSpec, VERSION_LABEL};
