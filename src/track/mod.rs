//! track - engine-agnostic curve helpers (guide points -> sampled race line)

pub mod curve;
pub mod query;

pub use curve::TrackCurve;
pub use query::{TrackSampler, query_track};
