//! Traffic reconciliation engine
//!
//! This module contains the mesh store abstraction, the subset and route
//! routers, and the operator that sequences them.

pub mod liveness;
mod memory_store;
mod operator;
mod route_router;
#[cfg(test)]
mod route_router_test;
mod router;
pub mod store;
mod subset_name;
mod subset_router;
#[cfg(test)]
mod test_support;

pub use liveness::{KubePodLiveness, PodLiveness};
pub use memory_store::InMemoryStore;
pub use operator::{ResourceSet, TrafficOperator};
pub use route_router::{
    build_canary_route, master_subsets, merge_route, retarget_route, strip_to_master, RouteRouter,
};
pub use router::Router;
pub use store::{KubeStore, MeshStore};
pub use subset_name::resolve_subset_name;
pub use subset_router::SubsetRouter;
