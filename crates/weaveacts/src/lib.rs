//! Standard activity library
//!
//! Built-in activities for the weave runtime: the simulated compute/fetch
//! set used by the demo workflows, and a real HTTP fetch.

mod http;
mod sim;

pub use http::HttpFetch;
pub use sim::{AutoApprove, JoinC, SimFetch, TagA, TagB};

use std::sync::Arc;
use weaveruntime::ActivityRegistry;

/// Register every built-in activity with a registry.
pub fn register_all(registry: &mut ActivityRegistry) {
    registry.register(Arc::new(sim::TagA));
    registry.register(Arc::new(sim::TagB));
    registry.register(Arc::new(sim::JoinC));
    registry.register(Arc::new(sim::SimFetch));
    registry.register(Arc::new(sim::AutoApprove));
    registry.register(Arc::new(http::HttpFetch::new()));
}
