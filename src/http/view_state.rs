//! View-state provider seam for `GET /view_state` (spec §6).
//!
//! The core contract has no concept of a "renderer view" — this is a
//! thin extension point so a concrete deployment can plug in whatever
//! produces a view snapshot for a session, without the HTTP shim needing
//! to know about it. Absence of a provider maps to 503 per spec.

/// A snapshot of whatever the editor-facing view renders for a session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ViewStateSnapshot {
    pub session_id: String,
    pub view: serde_json::Value,
}

/// Supplies view-state snapshots for `GET /view_state`. `None` return
/// means the session id is unknown (maps to 404). Synchronous by
/// contract: a provider backed by anything that needs to suspend should
/// keep its own cache and serve this call from memory.
pub trait ViewStateProvider: Send + Sync {
    fn snapshot(&self, session_id: &str) -> Option<ViewStateSnapshot>;
}
