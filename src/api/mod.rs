pub mod client;
pub mod error;

pub use client::{ClusterApi, HttpClusterApi};
pub use error::{ApiError, Envelope};
