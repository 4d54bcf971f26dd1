use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

const CHANNEL_CAPACITY: usize = 256;

/// Cross-instance cache-coherence signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// The design object changed; reload the cached snapshot.
    Design,
    /// A username or users list changed; drop cached auth state.
    AuthChange,
    /// Script modules changed; drop compiled scripts.
    ScriptCacheClear,
}

/// A signal together with the member that sent it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalMessage {
    pub sender: String,
    pub signal: Signal,
}

/// Roster change delivered to membership subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MembershipChange {
    Joined(String),
    Left(String),
}

/// Membership roster, leadership, and the signal channel.
pub trait ClusterCoordinator: Send + Sync {
    /// Id of the member this handle represents.
    fn member_id(&self) -> &str;

    /// Ids of every live member, including this one.
    fn members(&self) -> Vec<String>;

    fn is_leader(&self) -> bool;

    /// Deliver `signal` to every member, including the sender.
    fn send_signal(&self, signal: Signal) -> SyncResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<SignalMessage>;

    fn subscribe_membership(&self) -> broadcast::Receiver<MembershipChange>;
}

struct ClusterState {
    members: RwLock<BTreeSet<String>>,
    signals: broadcast::Sender<SignalMessage>,
    membership: broadcast::Sender<MembershipChange>,
}

/// In-process cluster: every handle sharing the same state is a member.
///
/// The lowest member id is the leader.
#[derive(Clone)]
pub struct LocalCluster {
    member_id: String,
    state: Arc<ClusterState>,
}

impl LocalCluster {
    /// Start a one-member cluster.
    pub fn new(member_id: impl Into<String>) -> Self {
        let member_id = member_id.into();
        let (signals, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (membership, _) = broadcast::channel(CHANNEL_CAPACITY);
        let state = Arc::new(ClusterState {
            members: RwLock::new(BTreeSet::from([member_id.clone()])),
            signals,
            membership,
        });
        info!(member_id = %member_id, "cluster started");
        Self { member_id, state }
    }

    /// Start a one-member cluster with a generated member id.
    pub fn standalone() -> Self {
        Self::new(Uuid::now_v7().to_string())
    }

    /// Add `member_id` to the roster and return its handle.
    pub fn join(&self, member_id: impl Into<String>) -> Self {
        let member_id = member_id.into();
        self.state
            .members
            .write()
            .expect("lock poisoned")
            .insert(member_id.clone());
        // No subscribers is fine.
        let _ = self.state.membership.send(MembershipChange::Joined(member_id.clone()));
        info!(member_id = %member_id, "member joined");
        Self {
            member_id,
            state: Arc::clone(&self.state),
        }
    }

    /// Remove `member_id` from the roster, as when its process dies.
    pub fn leave(&self, member_id: &str) {
        let removed = self.state.members.write().expect("lock poisoned").remove(member_id);
        if removed {
            let _ = self.state.membership.send(MembershipChange::Left(member_id.to_string()));
            info!(member_id, "member left");
        }
    }
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("member_id", &self.member_id)
            .field("members", &self.members())
            .finish()
    }
}

impl ClusterCoordinator for LocalCluster {
    fn member_id(&self) -> &str {
        &self.member_id
    }

    fn members(&self) -> Vec<String> {
        self.state.members.read().expect("lock poisoned").iter().cloned().collect()
    }

    fn is_leader(&self) -> bool {
        self.state
            .members
            .read()
            .expect("lock poisoned")
            .first()
            .is_some_and(|leader| *leader == self.member_id)
    }

    fn send_signal(&self, signal: Signal) -> SyncResult<()> {
        let message = SignalMessage {
            sender: self.member_id.clone(),
            signal,
        };
        match self.state.signals.send(message) {
            Ok(receivers) => {
                debug!(?signal, receivers, "signal sent");
                Ok(())
            }
            // Nobody listening yet; signals are fire-and-forget.
            Err(_) if self.state.signals.receiver_count() == 0 => Ok(()),
            Err(_) => Err(SyncError::ChannelClosed),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SignalMessage> {
        self.state.signals.subscribe()
    }

    fn subscribe_membership(&self) -> broadcast::Receiver<MembershipChange> {
        self.state.membership.subscribe()
    }
}
