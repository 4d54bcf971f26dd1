//! Cluster listener and reprocessing timer.
//!
//! One thread runs a current-thread tokio runtime that reacts to cluster
//! signals from other members, replays departed members' work when the
//! roster shrinks, and drains the reprocessing queue on an interval. The
//! thread holds only a weak reference, so dropping the last repository
//! handle lets it wind down.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tessera_sync::{MembershipChange, Signal, SignalMessage};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::Repository;
use crate::error::{RepoError, RepoResult};

/// Handle on the background thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct BackgroundTasks {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Stop the thread and wait for it to finish its current unit of work.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("background thread panicked");
            }
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Repository {
    /// Start listening to the cluster and draining the reprocessing queue.
    pub fn start_background(self: &Arc<Self>) -> RepoResult<BackgroundTasks> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| RepoError::Internal(format!("background runtime: {e}")))?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Subscribe before returning so nothing sent afterwards is missed.
        let signals = self.cluster.subscribe();
        let membership = self.cluster.subscribe_membership();
        let period = self.config.reprocessing_interval.max(Duration::from_millis(1));
        let weak = Arc::downgrade(self);

        let handle = thread::Builder::new()
            .name("tessera-background".into())
            .spawn(move || runtime.block_on(run(weak, signals, membership, period, shutdown_rx)))
            .map_err(|e| RepoError::Internal(format!("background thread: {e}")))?;
        info!(member = %self.member_id(), ?period, "background tasks started");
        Ok(BackgroundTasks {
            shutdown_tx,
            handle: Some(handle),
        })
    }

    fn on_signal(&self, message: SignalMessage) {
        if message.sender == self.member_id() {
            return;
        }
        debug!(sender = %message.sender, signal = ?message.signal, "cluster signal");
        match message.signal {
            Signal::Design => {
                if let Err(e) = self.reload_design() {
                    warn!(error = %e, "design reload after signal failed");
                }
            }
            Signal::AuthChange => self.note_auth_change(),
            Signal::ScriptCacheClear => self.hooks.clear_script_cache(),
        }
    }

    /// Missed signals: assume everything changed.
    fn on_signals_lagged(&self, missed: u64) {
        warn!(missed, "cluster signals lagged, refreshing caches");
        if let Err(e) = self.reload_design() {
            warn!(error = %e, "design reload after lag failed");
        }
        self.note_auth_change();
        self.hooks.clear_script_cache();
    }

    fn on_drain_tick(&self) {
        match self.drain_reprocessing_queue() {
            Ok(0) => {}
            Ok(drained) => info!(drained, "drained reprocessing queue"),
            Err(e) => warn!(error = %e, "reprocessing queue drain stopped"),
        }
    }
}

async fn run(
    repo: Weak<Repository>,
    mut signals: broadcast::Receiver<SignalMessage>,
    mut membership: broadcast::Receiver<MembershipChange>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut signals_open = true;
    let mut membership_open = true;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            received = signals.recv(), if signals_open => {
                let Some(repo) = repo.upgrade() else { break };
                match received {
                    Ok(message) => repo.on_signal(message),
                    Err(RecvError::Lagged(missed)) => repo.on_signals_lagged(missed),
                    Err(RecvError::Closed) => signals_open = false,
                }
            }
            change = membership.recv(), if membership_open => {
                let Some(repo) = repo.upgrade() else { break };
                match change {
                    Ok(MembershipChange::Left(member)) => {
                        info!(member = %member, "member left, recovering its transactions");
                        repo.process_pending_transactions();
                    }
                    Ok(MembershipChange::Joined(member)) => debug!(member = %member, "member joined"),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "membership changes lagged");
                        repo.process_pending_transactions();
                    }
                    Err(RecvError::Closed) => membership_open = false,
                }
            }
            _ = ticker.tick() => {
                let Some(repo) = repo.upgrade() else { break };
                repo.on_drain_tick();
            }
        }
    }
    debug!("background tasks stopped");
}
