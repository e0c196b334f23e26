// ── Engine commands ──
//
// Host → engine requests travel through an mpsc channel as envelopes
// carrying a oneshot reply, so the engine loop stays the only owner of
// its state.

use serde::Serialize;

use crate::error::CoreError;
use crate::watchdog::WatchdogPhase;

/// A command envelope sent through the command channel.
pub(crate) struct CommandEnvelope {
    pub command: EngineCommand,
    pub response_tx: tokio::sync::oneshot::Sender<Result<CommandResult, CoreError>>,
}

/// Requests the host can make of a running engine.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Begin the out-of-band authorization flow.
    StartAuth,
    /// Run a full synchronization pass over the hub's current devices.
    Resync,
    /// Report engine state.
    Status,
}

#[derive(Debug, Clone)]
pub enum CommandResult {
    AuthStarted(AuthStart),
    Synced(SyncSummary),
    Status(EngineStatus),
}

/// Reply to `startAuth`: where the user has to go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStart {
    pub uri: String,
}

/// Totals for one full synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub devices: usize,
    pub skipped: usize,
    pub nodes: usize,
    pub values: usize,
    pub failed: usize,
    pub rooms_created: usize,
    pub rooms_extended: usize,
    /// Buffered live values written when the pass finished.
    pub drained: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub connected: bool,
    pub initialized: bool,
    pub pending: usize,
    pub known_paths: usize,
    pub watchdog: WatchdogPhase,
}
