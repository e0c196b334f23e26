// hubsync-core: Device state synchronization between a hub and the object tree.

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod path;
pub mod pending;
pub mod reconcile;
pub mod rooms;
pub mod store;
pub mod watchdog;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{AuthStart, CommandResult, EngineCommand, EngineStatus, SyncSummary};
pub use config::{EngineConfig, HubSettings, WatchdogConfig};
pub use engine::{DispatchOutcome, Engine, EngineHandle, INFO_CONNECTION, INFO_LAST_EVENT};
pub use error::{CoreError, StoreError};
pub use metadata::{MetadataContext, MetadataResolver, NodeMetadata, StaticMetadata, ValueType};
pub use pending::PendingBuffer;
pub use reconcile::{SyncReport, TreeReconciler};
pub use rooms::{RoomIndex, room_enum_id};
pub use store::{MemoryStore, ObjectKind, ObjectStore, StateValue, TreeObject, TreeSnapshot};
pub use watchdog::{ReconnectRequest, Watchdog, WatchdogPhase};
