//! Remote store client for the authenticated per-user data API.

pub mod api_types;
mod client;
mod traits;

pub use client::RemoteClient;
pub use traits::RemoteStore;
