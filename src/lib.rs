//! Local-first data sync for the study tracker.
//!
//! Feature modules store one JSON blob per [`keys::DataKey`] through a
//! [`sync::SyncLayer`], which keeps a local cache and a remote store in step:
//! reads prefer the remote and fall back to the cache, writes land in the
//! cache first and report whether the remote accepted them.

pub mod cache;
pub mod config;
pub mod keys;
pub mod remote;
pub mod sync;
