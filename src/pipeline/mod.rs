//! Fetch and save pipelines.
//!
//! Pipelines orchestrate the remote gateway and the two cache tiers; the
//! store facade owns one of each and routes requests through them.

mod fetch;
mod save;

pub use fetch::FetchPipeline;
pub use save::SavePipeline;
