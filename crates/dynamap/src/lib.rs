//! # dynamap
//!
//! Object mapper for DynamoDB-style item stores:
//! - **Models** - attribute declarations, key schema and per-attribute marshalers
//! - **Dirty tracking** - per-item clean snapshots, so saves only send changes
//! - **Conditional saves** - new items are never silently overwritten
//! - **Transactions** - puts, updates, deletes, saves and condition checks in
//!   one atomic request
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Mapper                              │
//! │     persistence (save/find/delete)  │  transaction           │
//! ├─────────────────────────────────────────────────────────────┤
//! │   Item + DirtyTracker  │  key  │  expression builder         │
//! ├─────────────────────────────────────────────────────────────┤
//! │        ModelDescriptor / Marshalers  │  wire codec           │
//! ├─────────────────────────────────────────────────────────────┤
//! │      NetworkClient  (BlockingClient over an async client)    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod dirty;
pub mod expression;
pub mod item;
pub mod key;
pub mod mapper;
pub mod marshal;
pub mod model;
pub mod persistence;
pub mod transaction;
pub mod wire;

// Re-export common types
pub use dynamap_common::{CancellationReason, Config, Error, Result, TransportError, Value};

pub use client::blocking::{AsyncNetworkClient, BlockingClient};
pub use client::{NetworkClient, Operation};
pub use expression::{ExpressionFragment, TokenSequence};
pub use item::Item;
pub use key::KeyTuple;
pub use mapper::Mapper;
pub use marshal::Marshaler;
pub use model::{Attribute, ModelDescriptor, NoValidation, Validator};
pub use persistence::{FindOptions, RequestOptions, SaveOptions};
pub use transaction::{ConditionCheck, IntentOptions, TransactGet, TransactWrite};
pub use wire::WireItem;
