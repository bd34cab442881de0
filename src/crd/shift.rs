//! Desired traffic state handed to the traffic operator

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, TrafficSpecProblem};
use crate::selector::Selector;

/// Label on the pod selector that carries the service version
pub const VERSION_LABEL: &str = "version";

/// How a slice of traffic is diverted to the canary pods
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficSpec {
    /// Labels of the pods that make up the canary subset
    #[serde(default)]
    pub pod_selector: Selector,

    /// Header name to exact value; routes matching requests to the canary
    #[serde(default)]
    pub request_headers: Selector,

    /// Percentage of traffic routed to the canary
    #[serde(default)]
    pub weight: i32,
}

impl TrafficSpec {
    /// Exactly one of weight or request headers must be set
    pub fn validate(&self) -> Result<()> {
        let weighted = self.weight != 0;
        let headed = !self.request_headers.is_empty();

        match (weighted, headed) {
            (false, false) => Err(Error::InvalidTrafficSpec(TrafficSpecProblem::Missing)),
            (true, true) => Err(Error::InvalidTrafficSpec(TrafficSpecProblem::Both)),
            (true, false) if !(0..=100).contains(&self.weight) => Err(Error::InvalidTrafficSpec(
                TrafficSpecProblem::WeightOutOfRange(self.weight),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_weighted(&self) -> bool {
        self.weight > 0
    }

    /// Version label of the pod selector, empty when absent
    pub fn version(&self) -> &str {
        self.pod_selector
            .get(VERSION_LABEL)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

/// A single desired traffic treatment for one target service
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    /// Destination port of the canary route
    #[serde(default)]
    pub port: u32,

    /// Destination host of the canary route
    #[serde(default)]
    pub hostname: String,

    /// Selects the DestinationRule and VirtualService resources to mutate
    #[serde(default)]
    pub selector: Selector,

    pub traffic: TrafficSpec,

    /// Build number folded into the subset name
    #[serde(default)]
    pub build: u64,
}

impl Shift {
    /// Subset name the shift targets in both resource kinds
    pub fn subset_name(&self) -> String {
        crate::controller::resolve_subset_name(self.traffic.version(), self.build)
    }
}

/// How `clear` treats subset definitions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearMode {
    /// Remove every subset
    #[default]
    Hard,
    /// Remove only subsets without live pods
    Soft,
}

impl std::fmt::Display for ClearMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClearMode::Hard => write!(f, "hard"),
            ClearMode::Soft => write!(f, "soft"),
        }
    }
}

impl std::str::FromStr for ClearMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hard" => Ok(ClearMode::Hard),
            "soft" => Ok(ClearMode::Soft),
            other => Err(Error::ConfigError(format!(
                "unknown clear mode {:?}, expected hard or soft",
                other
            ))),
        }
    }
}
