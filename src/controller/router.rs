//! The capability set shared by the subset and route routers

use async_trait::async_trait;

use crate::crd::{ClearMode, Shift};
use crate::error::Result;
use crate::selector::Selector;

/// One mesh resource kind's view of a traffic shift
#[async_trait]
pub trait Router: Send + Sync {
    type Resource: Send;

    /// Every resource of this kind matched by `selector`
    async fn list(&self, selector: &Selector) -> Result<Vec<Self::Resource>>;

    /// Reject shifts this router cannot apply, before anything is written
    fn validate(&self, shift: &Shift) -> Result<()>;

    /// Apply the shift to every matched resource
    async fn update(&self, shift: &Shift) -> Result<()>;

    /// Strip canary state from every matched resource
    async fn clear(&self, shift: &Shift, mode: ClearMode) -> Result<()>;
}
