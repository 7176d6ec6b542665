//! Request/response service exposing the assignment table to query-routing
//! clients.
//!
//! This crate provides:
//! - The wire protocol (length-prefixed CBOR frames)
//! - The TCP server backed by `AssignmentStore` reads
//! - A client for query routers and tests
//! - The endpoint-discovery seam
#![warn(missing_docs)]
#![warn(clippy::all)]

mod client;
mod discovery;
mod error;
mod server;
mod wire;

pub use client::AssignmentClient;
pub use discovery::{EndpointRegistry, FsEndpointRegistry};
pub use error::ServiceError;
pub use server::AssignmentServer;
pub use wire::{ApiRequest, ApiResponse, AssignmentRecord};
