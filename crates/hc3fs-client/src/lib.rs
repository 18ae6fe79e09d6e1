//! HTTP transport for hc3fs.
//!
//! [`HubClient`] implements the kernel's [`HubApi`](hc3fs_kernel::HubApi)
//! over the hub's JSON REST API under `{url}/api`.

pub mod client;

pub use client::{HubClient, basic_auth};
