use crate::reconcile;
use crate::router::EventRouter;
use crate::transport::{Credential, JoinRequest, Signal, Transport};
use cache::{CacheEvent, QueryCache, QueryData, QueryFilter, QueryKey};
use events::Id;
use log::*;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

/// Unique identifier for a connection (client-generated, for log correlation)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Observable state of the push connection, e.g. for a live/offline indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// The signed-in user as the lifecycle manager sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Id,
    /// `None` once the credential has been invalidated.
    pub credential: Option<Credential>,
}

impl Identity {
    pub fn new(user_id: impl Into<Id>, credential: Credential) -> Self {
        Self {
            user_id: user_id.into(),
            credential: Some(credential),
        }
    }
}

struct ActiveConnection {
    id: ConnectionId,
    user_id: Id,
    credential: Credential,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ManagerState {
    active: Option<ActiveConnection>,
    /// User the cache contents belong to. Survives logout so that the next
    /// login can tell whether the cache must be dropped.
    cache_owner: Option<Id>,
}

/// Owns at most one push connection, keyed to the current identity.
///
/// The identity is an explicit input: call [`ConnectionManager::set_identity`]
/// on login, logout and user switch. A different user or credential always
/// tears the old connection down completely (its in-flight event finishes,
/// nothing after it is delivered) before the new one is opened. When the user
/// itself changes, the cache is cleared in between; callers load the new
/// user's data with their own credential afterwards.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn QueryCache>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    state: Mutex<ManagerState>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn QueryCache>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            transport,
            cache,
            status: Arc::new(status),
            state: Mutex::new(ManagerState::default()),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// User the live connection belongs to, if any.
    pub async fn current_user(&self) -> Option<Id> {
        self.state
            .lock()
            .await
            .active
            .as_ref()
            .map(|a| a.user_id.clone())
    }

    /// Reconciles the connection with the observed identity.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        let mut state = self.state.lock().await;

        let wanted = identity.and_then(|i| i.credential.map(|c| (i.user_id, c)));

        if let (Some(current), Some((user_id, credential))) =
            (state.active.as_ref(), wanted.as_ref())
        {
            if current.user_id == *user_id
                && current.credential == *credential
                && !current.task.is_finished()
            {
                debug!("Identity unchanged, keeping connection {}", current.id.as_str());
                return;
            }
        }

        if let Some(current) = state.active.take() {
            self.close(current).await;
        }

        if let Some((user_id, credential)) = wanted {
            if state
                .cache_owner
                .as_ref()
                .is_some_and(|owner| *owner != user_id)
            {
                info!("User changed to {}, clearing cached data", user_id);
                self.cache.clear();
            }
            state.cache_owner = Some(user_id.clone());
            state.active = Some(self.open(user_id, credential));
        }
    }

    /// Closes the live connection, if any. Same as `set_identity(None)`.
    pub async fn disconnect(&self) {
        self.set_identity(None).await;
    }

    fn open(&self, user_id: Id, credential: Credential) -> ActiveConnection {
        let id = ConnectionId::new();
        info!("Opening push connection {} for user {}", id.as_str(), user_id);

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = ConnectionTask {
            id: id.clone(),
            user_id: user_id.clone(),
            credential: credential.clone(),
            transport: self.transport.clone(),
            cache: self.cache.clone(),
            router: reconcile::router_for(self.cache.clone(), &user_id),
            status: self.status.clone(),
        };

        ActiveConnection {
            id,
            user_id,
            credential,
            shutdown,
            task: tokio::spawn(task.run(shutdown_rx)),
        }
    }

    async fn close(&self, connection: ActiveConnection) {
        info!(
            "Closing push connection {} for user {}",
            connection.id.as_str(),
            connection.user_id
        );

        // The task may already have ended on its own.
        let _ = connection.shutdown.send(());
        if let Err(e) = connection.task.await {
            warn!("Push connection {} task failed: {e}", connection.id.as_str());
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
    }
}

/// Everything the background task of one connection needs.
struct ConnectionTask {
    id: ConnectionId,
    user_id: Id,
    credential: Credential,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn QueryCache>,
    router: EventRouter,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl ConnectionTask {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        self.status.send_replace(ConnectionStatus::Connecting);
        let mut changes = self.cache.events();
        let mut follow_changes = true;

        let opened = tokio::select! {
            biased;
            _ = &mut shutdown => return,
            opened = self.transport.open(&self.credential) => opened,
        };
        let mut channel = match opened {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Failed to open push connection {}: {e}", self.id.as_str());
                self.status.send_replace(ConnectionStatus::Disconnected);
                return;
            }
        };

        // A drop only loses events once the stream has been live.
        let mut connected_once = false;
        let mut dropped = false;
        // Conversation ids announced on the live stream, sorted; `None` while down.
        let mut joined: Option<Vec<Id>> = None;
        loop {
            let signal = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                signal = channel.recv() => signal,
                change = changes.recv(), if follow_changes => {
                    let list_changed = match change {
                        Ok(CacheEvent::Updated(QueryKey::Conversations)) => true,
                        Ok(_) => false,
                        Err(RecvError::Lagged(_)) => true,
                        Err(RecvError::Closed) => {
                            follow_changes = false;
                            false
                        }
                    };
                    if list_changed && joined.is_some() {
                        let conversation_ids = self.conversation_ids();
                        if joined.as_deref() != Some(sorted(&conversation_ids).as_slice()) {
                            tokio::select! {
                                biased;
                                _ = &mut shutdown => break,
                                ids = self.join(conversation_ids) => joined = Some(ids),
                            }
                        }
                    }
                    continue;
                }
            };

            match signal {
                Some(Signal::Connected) => {
                    info!("Push connection {} established", self.id.as_str());
                    self.status.send_replace(ConnectionStatus::Connected);
                    connected_once = true;
                    if dropped {
                        self.resync();
                        dropped = false;
                    }
                    let conversation_ids = self.conversation_ids();
                    tokio::select! {
                        biased;
                        _ = &mut shutdown => break,
                        ids = self.join(conversation_ids) => joined = Some(ids),
                    }
                }
                Some(Signal::Disconnected) => {
                    info!("Push connection {} lost", self.id.as_str());
                    dropped = connected_once;
                    joined = None;
                    self.status.send_replace(ConnectionStatus::Disconnected);
                }
                Some(Signal::ConnectError(reason)) => {
                    warn!("Push connection {} error: {reason}", self.id.as_str());
                    dropped = connected_once;
                    joined = None;
                    self.status.send_replace(ConnectionStatus::Disconnected);
                }
                Some(Signal::Event(event)) => {
                    self.router.dispatch(&event);
                }
                None => {
                    info!("Push connection {} closed by transport", self.id.as_str());
                    self.status.send_replace(ConnectionStatus::Disconnected);
                    break;
                }
            }
        }

        debug!("Push connection {} stopped", self.id.as_str());
    }

    fn conversation_ids(&self) -> Vec<Id> {
        match self.cache.get(&QueryKey::Conversations) {
            Some(QueryData::Conversations(list)) => list.into_iter().map(|c| c.id).collect(),
            _ => Vec::new(),
        }
    }

    /// Declares the conversation set on the live stream. Returns the set as
    /// announced, sorted, so later list changes can be compared against it.
    async fn join(&self, conversation_ids: Vec<Id>) -> Vec<Id> {
        let announced = sorted(&conversation_ids);
        let request = JoinRequest {
            user_id: self.user_id.clone(),
            conversation_ids,
        };

        debug!(
            "Joining {} conversation(s) on connection {}",
            request.conversation_ids.len(),
            self.id.as_str()
        );
        if let Err(e) = self.transport.join(&self.credential, &request).await {
            warn!("Join failed on connection {}: {e}", self.id.as_str());
        }
        announced
    }

    /// Events pushed while the stream was down are gone; refetch what is cached.
    fn resync(&self) {
        let keys = self.cache.keys(&QueryFilter::All);
        info!(
            "Connection {} resumed, invalidating {} cached entr(ies)",
            self.id.as_str(),
            keys.len()
        );
        for key in keys {
            self.cache.invalidate(&key);
        }
    }
}

fn sorted(ids: &[Id]) -> Vec<Id> {
    let mut ids = ids.to_vec();
    ids.sort();
    ids
}
