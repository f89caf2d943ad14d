//! Lifecycle & Link Manager (spec §4.3).
//!
//! Enforces the `uninitialized -> initializing -> ready -> shuttingDown ->
//! exited` state graph and owns the outbound coordinator link. Guarded by
//! a reader/writer lock per spec §5: operations take a read lock to
//! snapshot the link and lifecycle state before issuing upstream calls;
//! transitions take the write lock. The lock is never held across an
//! upstream call.

use tokio::sync::RwLock;
use tonic::transport::Channel;

use crate::error::BridgeError;
use crate::model::LifecycleState;
use crate::proto::coordinator::v1::coordinator_client::CoordinatorClient;

/// A cheap-to-clone handle to the outbound coordinator link. `tonic`
/// channels are backed by a multiplexed, reference-counted connection, so
/// cloning a handle does not open a new socket.
#[derive(Clone)]
pub struct LinkHandle {
    pub client: CoordinatorClient<Channel>,
}

/// Information captured from the `initialize` request params, forwarded
/// opaquely as part of [`crate::model::EditorContext`] where useful.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub process_id: Option<i64>,
    pub root_uri: Option<String>,
}

/// Owns the lifecycle state and the outbound link handle.
pub struct LifecycleManager {
    state: RwLock<LifecycleState>,
    link: RwLock<Option<LinkHandle>>,
    client_info: RwLock<ClientInfo>,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Uninitialized),
            link: RwLock::new(None),
            client_info: RwLock::new(ClientInfo::default()),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// `initialize` request: uninitialized -> initializing. Connects the
    /// outbound link to `endpoint` as a side effect, since no operation
    /// can proceed without one. A second `initialize` in any other state
    /// fails.
    pub async fn initialize(
        &self,
        endpoint: String,
        client_info: ClientInfo,
    ) -> Result<(), BridgeError> {
        // Claim the transition under the write lock *before* connecting, and
        // release the lock immediately — the write lock must never be held
        // across an upstream await (spec §5), since that would stall every
        // `snapshot_link` reader for as long as the coordinator takes to
        // answer. Claiming Initializing up front also makes a concurrent
        // `initialize()` fail fast against the claim instead of racing the
        // connect; on failure below, the claim is rolled back.
        {
            let mut state = self.state.write().await;
            if *state != LifecycleState::Uninitialized {
                return Err(BridgeError::lifecycle(format!(
                    "initialize is only legal from uninitialized, current state is {state}"
                )));
            }
            *state = LifecycleState::Initializing;
        }

        let endpoint = match Channel::from_shared(endpoint.clone()) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                *self.state.write().await = LifecycleState::Uninitialized;
                return Err(BridgeError::upstream(format!(
                    "invalid coordinator endpoint: {e}"
                )));
            }
        };

        let channel = match endpoint.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                *self.state.write().await = LifecycleState::Uninitialized;
                return Err(BridgeError::upstream(format!(
                    "failed to connect coordinator: {e}"
                )));
            }
        };

        let handle = LinkHandle {
            client: CoordinatorClient::new(channel),
        };

        *self.link.write().await = Some(handle);
        *self.client_info.write().await = client_info;
        Ok(())
    }

    /// `initialized` notification: initializing -> ready. Legal only from
    /// `initializing`.
    pub async fn initialized(&self) -> Result<(), BridgeError> {
        let mut state = self.state.write().await;
        if *state != LifecycleState::Initializing {
            return Err(BridgeError::lifecycle(format!(
                "initialized is only legal from initializing, current state is {state}"
            )));
        }
        *state = LifecycleState::Ready;
        Ok(())
    }

    /// `shutdown` request: ready -> shuttingDown. Legal only from `ready`.
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        let mut state = self.state.write().await;
        if *state != LifecycleState::Ready {
            return Err(BridgeError::lifecycle(format!(
                "shutdown is only legal from ready, current state is {state}"
            )));
        }
        *state = LifecycleState::ShuttingDown;
        Ok(())
    }

    /// `exit` notification: legal from any state, always succeeds.
    /// Releases the link handle.
    pub async fn exit(&self) {
        *self.state.write().await = LifecycleState::Exited;
        *self.link.write().await = None;
    }

    /// Snapshot the link handle under a read lock, for issuing an upstream
    /// call. Fails if the lifecycle is not `ready`, or no link has been
    /// established.
    pub async fn snapshot_link(&self) -> Result<LinkHandle, BridgeError> {
        let state = self.state.read().await;
        if *state != LifecycleState::Ready {
            return Err(BridgeError::lifecycle(format!(
                "operation requires ready state, current state is {state}"
            )));
        }
        drop(state);

        self.link
            .read()
            .await
            .clone()
            .ok_or_else(|| BridgeError::not_connected("no coordinator link established"))
    }

    pub async fn client_info(&self) -> ClientInfo {
        self.client_info.read().await.clone()
    }
}
