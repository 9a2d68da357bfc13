//! Framesift Registry crate - worker registration and lease management.
//!
//! `Registry` owns the lease-state transitions over the worker record store.
//! `RegistryClient` is the seam the dispatcher and workers use to reach it,
//! either in-process (`Registry` itself) or over HTTP (`HttpRegistryClient`).

pub mod client;
pub mod protocol;
pub mod service;

pub use client::{HttpRegistryClient, RegistryClient};
pub use protocol::{LeaseResponse, MessageResponse, RegisterRequest, ReleaseRequest};
pub use service::Registry;
