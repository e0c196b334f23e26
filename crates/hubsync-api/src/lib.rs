//! Hub client surface for `hubsync`.
//!
//! The hub (its session, transport and object model) is an external
//! collaborator of the synchronization engine. This crate defines how the
//! engine sees it:
//!
//! - **[`HubClient`]**: async trait for init/finalize, authorization,
//!   link resolution and capability writes.
//! - **[`HubEvent`]** / **[`HubSubscription`]**: the broadcast event
//!   stream (`open`, `close`, `stateChanged`, `initializationComplete`, ...).
//! - **Model** ([`model`]): `Device`, `Capability`, `State`, `Location`
//!   and the `Link` references between them.
//! - **[`ReplayHub`](replay::ReplayHub)**: an in-process client driven from
//!   a recorded snapshot, used by tests and the CLI.

pub mod client;
pub mod error;
pub mod event;
pub mod model;
pub mod replay;

pub use client::{AuthorizationPending, HubClient, Resolved};
pub use error::Error;
pub use event::{HubEvent, HubMessage, HubSubscription, MessageKind};
pub use model::{Capability, Device, Link, Location, State};
pub use replay::{ReplayEvent, ReplayHub, ReplaySnapshot};
