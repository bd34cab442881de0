//! Error types for the traffic reconciliation engine

use thiserror::Error;

/// Why a traffic treatment was rejected
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrafficSpecProblem {
    /// Neither a weight nor request headers were given
    Missing,
    /// Both a weight and request headers were given
    Both,
    /// Weight outside of 0..=100
    WeightOutOfRange(i32),
}

impl std::fmt::Display for TrafficSpecProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficSpecProblem::Missing => write!(f, "missing"),
            TrafficSpecProblem::Both => write!(f, "both"),
            TrafficSpecProblem::WeightOutOfRange(w) => {
                write!(f, "weight {} out of range 0..=100", w)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// A selector with no pairs was used where a resource set is targeted
    #[error("label selector is empty")]
    EmptySelector,

    /// A selector pair without `=`
    #[error("malformed label selector pair: {0:?}")]
    MalformedSelector(String),

    #[error("shift has no resource selector")]
    MissingSelector,

    #[error("shift has no pod selector")]
    MissingPodSelector,

    /// Weight and request headers are mutually exclusive, and one is required
    #[error("invalid traffic spec: {0}")]
    InvalidTrafficSpec(TrafficSpecProblem),

    /// No resource of the given kind matched the selector
    #[error("no {0} resources matched the selector")]
    EmptyResourceSet(String),

    /// Any failure reported by the mesh API other than a handled not-found
    #[error("mesh API error: {0}")]
    RemoteApiError(#[source] kube::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// True when the API server answered `404 Not Found`
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
