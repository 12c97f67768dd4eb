//! # causette-store
//!
//! The shared-store boundary for Causette.
//!
//! Conversations, messages, invites, membership indexes and per-user
//! preference documents live in an untrusted, eventually-consistent store
//! shared by all participants. This crate defines that boundary as the
//! [`SharedStore`] trait -- document models, multi-path [`WriteBatch`]
//! writes, and watch-based subscriptions -- together with [`MemoryStore`],
//! an in-process backend that enforces the same authorization contract a
//! production deployment delegates to the store's security layer.

pub mod memory;
pub mod models;
pub mod store;

mod error;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use models::*;
pub use store::{
    InviteSubscription, MembershipSubscription, MessageSubscription, SharedStore, WriteBatch,
    WriteOp,
};
