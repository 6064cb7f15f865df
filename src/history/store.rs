use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use super::{HistoryBackend, Solve, StoreError, UserId};
use crate::session::SolveSink;

type AppendReply = Box<dyn FnOnce(Result<Solve, StoreError>) + Send>;
type ClearReply = Box<dyn FnOnce(Result<usize, StoreError>) + Send>;
type SnapshotReply = Box<dyn FnOnce(Result<Vec<Solve>, StoreError>) + Send>;
type OnUpdate = Box<dyn FnMut(Vec<Solve>) + Send>;
type OnError = Box<dyn FnMut(StoreError) + Send>;

enum Command {
    SetIdentity(Option<UserId>),
    Append {
        elapsed_ms: u64,
        reply: AppendReply,
    },
    Subscribe {
        id: u64,
        user: UserId,
        on_update: OnUpdate,
        on_error: OnError,
    },
    Unsubscribe(u64),
    ClearAll {
        reply: ClearReply,
    },
    Snapshot {
        reply: SnapshotReply,
    },
}

struct Subscriber {
    id: u64,
    user: UserId,
    on_update: OnUpdate,
    on_error: OnError,
}

/// Client handle to the solve history.
///
/// All work happens on one background thread that owns the backend, so calls
/// never block the timer. Results come back through the callbacks passed in,
/// which run on that thread; callers usually forward them into their own
/// event channel.
#[derive(Clone)]
pub struct HistoryStore {
    tx: Sender<Command>,
    next_subscription: Arc<AtomicU64>,
}

impl HistoryStore {
    pub fn spawn<B: HistoryBackend + 'static>(backend: B) -> Self {
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("history-store".to_string())
            .spawn(move || Worker::new(Box::new(backend)).run(rx));
        if let Err(e) = spawned {
            tracing::error!("failed to start history store: {e}");
        }

        Self {
            tx,
            next_subscription: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Scope future writes and clears to `user`, or to nobody
    pub fn set_identity(&self, user: Option<UserId>) {
        let _ = self.tx.send(Command::SetIdentity(user));
    }

    /// Write a new solve for the current identity.
    ///
    /// Not retried on failure; `on_done` gets the error instead.
    pub fn append<F>(&self, elapsed_ms: u64, on_done: F)
    where
        F: FnOnce(Result<Solve, StoreError>) + Send + 'static,
    {
        if let Err(mpsc::SendError(cmd)) = self.tx.send(Command::Append {
            elapsed_ms,
            reply: Box::new(on_done),
        }) {
            if let Command::Append { reply, .. } = cmd {
                reply(Err(StoreError::Unavailable));
            }
        }
    }

    /// Live view of every record `user` owns.
    ///
    /// `on_update` receives the full collection, unordered, right away and
    /// after each change. Dropping or detaching the handle stops delivery.
    pub fn subscribe<U, E>(&self, user: &UserId, on_update: U, on_error: E) -> Subscription
    where
        U: FnMut(Vec<Solve>) + Send + 'static,
        E: FnMut(StoreError) + Send + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let sent = self.tx.send(Command::Subscribe {
            id,
            user: user.clone(),
            on_update: Box::new(on_update),
            on_error: Box::new(on_error),
        });
        if let Err(mpsc::SendError(Command::Subscribe { mut on_error, .. })) = sent {
            on_error(StoreError::Unavailable);
        }

        Subscription {
            id,
            tx: self.tx.clone(),
            detached: false,
        }
    }

    /// Delete every record of the current identity. Destructive; confirm first.
    pub fn clear_all<F>(&self, on_done: F)
    where
        F: FnOnce(Result<usize, StoreError>) + Send + 'static,
    {
        if let Err(mpsc::SendError(Command::ClearAll { reply })) = self.tx.send(Command::ClearAll {
            reply: Box::new(on_done),
        }) {
            reply(Err(StoreError::Unavailable));
        }
    }

    /// One-off read of the current identity's records, waiting for the answer
    pub fn snapshot_blocking(&self) -> Result<Vec<Solve>, StoreError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Snapshot {
                reply: Box::new(move |r| {
                    let _ = reply_tx.send(r);
                }),
            })
            .map_err(|_| StoreError::Unavailable)?;
        reply_rx.recv().map_err(|_| StoreError::Unavailable)?
    }

    /// Adapter that lets a session hand finished solves straight to this store
    pub fn sink<F>(&self, on_done: F) -> StoreSink
    where
        F: Fn(Result<Solve, StoreError>) + Send + Sync + 'static,
    {
        StoreSink {
            store: self.clone(),
            on_done: Arc::new(on_done),
        }
    }
}

/// Handle for a live subscription. Detaching is idempotent.
pub struct Subscription {
    id: u64,
    tx: Sender<Command>,
    detached: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn detach(&mut self) {
        if !self.detached {
            self.detached = true;
            let _ = self.tx.send(Command::Unsubscribe(self.id));
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// [`SolveSink`] that appends to a [`HistoryStore`]
pub struct StoreSink {
    store: HistoryStore,
    on_done: Arc<dyn Fn(Result<Solve, StoreError>) + Send + Sync>,
}

impl SolveSink for StoreSink {
    fn submit(&mut self, elapsed_ms: u64) {
        let on_done = Arc::clone(&self.on_done);
        self.store.append(elapsed_ms, move |result| on_done(result));
    }
}

struct Worker {
    backend: Box<dyn HistoryBackend>,
    identity: Option<UserId>,
    subscribers: Vec<Subscriber>,
    in_flight: Vec<(UserId, Solve)>,
}

impl Worker {
    fn new(backend: Box<dyn HistoryBackend>) -> Self {
        Self {
            backend,
            identity: None,
            subscribers: Vec::new(),
            in_flight: Vec::new(),
        }
    }

    fn run(mut self, rx: Receiver<Command>) {
        while let Ok(cmd) = rx.recv() {
            self.handle(cmd);
        }
        tracing::debug!("history store stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::SetIdentity(user) => {
                tracing::debug!(user = ?user, "store identity changed");
                self.identity = user;
            }
            Command::Append { elapsed_ms, reply } => reply(self.append(elapsed_ms)),
            Command::Subscribe {
                id,
                user,
                on_update,
                on_error,
            } => {
                self.subscribers.push(Subscriber {
                    id,
                    user,
                    on_update,
                    on_error,
                });
                let index = self.subscribers.len() - 1;
                self.deliver(index);
            }
            Command::Unsubscribe(id) => self.subscribers.retain(|s| s.id != id),
            Command::ClearAll { reply } => reply(self.clear_all()),
            Command::Snapshot { reply } => match &self.identity {
                Some(user) => reply(self.backend.list(user)),
                None => reply(Err(StoreError::NoIdentity)),
            },
        }
    }

    fn append(&mut self, elapsed_ms: u64) -> Result<Solve, StoreError> {
        let user = self.identity.clone().ok_or(StoreError::NoIdentity)?;

        // latency compensation: listeners see the record before the server stamps it
        self.in_flight.push((user.clone(), Solve::pending(elapsed_ms)));
        self.notify(&user);

        let recorded_at = Utc::now();
        let result = self.backend.insert(&user, elapsed_ms, recorded_at);
        self.in_flight.pop();
        self.notify(&user);

        let id = result.map_err(|e| {
            tracing::warn!(elapsed_ms, "failed to persist solve: {e}");
            e
        })?;
        tracing::info!(elapsed_ms, id = id.0, "solve persisted");
        Ok(Solve {
            id: Some(id),
            elapsed_ms,
            recorded_at: Some(recorded_at),
        })
    }

    fn clear_all(&mut self) -> Result<usize, StoreError> {
        let user = self.identity.clone().ok_or(StoreError::NoIdentity)?;
        let solves = self.backend.list(&user)?;

        let mut deleted = 0;
        let mut failed = 0;
        for id in solves.iter().filter_map(|s| s.id) {
            match self.backend.delete(&user, id) {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(id = id.0, "failed to delete solve: {e}");
                    failed += 1;
                }
            }
        }
        self.notify(&user);

        if failed > 0 {
            Err(StoreError::PartialClear { deleted, failed })
        } else {
            tracing::info!(deleted, "history cleared");
            Ok(deleted)
        }
    }

    fn notify(&mut self, user: &UserId) {
        for index in 0..self.subscribers.len() {
            if &self.subscribers[index].user == user {
                self.deliver(index);
            }
        }
    }

    fn deliver(&mut self, index: usize) {
        let user = self.subscribers[index].user.clone();
        let snapshot = self.backend.list(&user).map(|mut solves| {
            solves.extend(
                self.in_flight
                    .iter()
                    .filter(|(owner, _)| owner == &user)
                    .map(|(_, s)| s.clone()),
            );
            solves
        });

        let subscriber = &mut self.subscribers[index];
        match snapshot {
            Ok(solves) => (subscriber.on_update)(solves),
            Err(e) => {
                tracing::warn!(user = %user, "history read failed: {e}");
                (subscriber.on_error)(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{MemoryBackend, SolveId};
    use assert_matches::assert_matches;
    use std::sync::mpsc::RecvTimeoutError;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn signed_in(backend: MemoryBackend) -> (HistoryStore, UserId) {
        let store = HistoryStore::spawn(backend);
        let user = UserId::new("tester");
        store.set_identity(Some(user.clone()));
        (store, user)
    }

    #[test]
    fn append_without_identity_fails() {
        let store = HistoryStore::spawn(MemoryBackend::new());
        let (tx, rx) = mpsc::channel();
        store.append(1000, move |r| {
            let _ = tx.send(r);
        });

        assert_matches!(rx.recv_timeout(WAIT).unwrap(), Err(StoreError::NoIdentity));
    }

    #[test]
    fn append_returns_stamped_solve() {
        let (store, _) = signed_in(MemoryBackend::new());
        let (tx, rx) = mpsc::channel();
        store.append(1234, move |r| {
            let _ = tx.send(r);
        });

        let solve = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert_eq!(solve.elapsed_ms, 1234);
        assert!(solve.id.is_some());
        assert!(solve.recorded_at.is_some());
    }

    #[test]
    fn subscriber_sees_pending_then_confirmed() {
        let (store, user) = signed_in(MemoryBackend::new());
        let (tx, rx) = mpsc::channel();
        let _sub = store.subscribe(
            &user,
            move |s| {
                let _ = tx.send(s);
            },
            |_| {},
        );

        assert!(rx.recv_timeout(WAIT).unwrap().is_empty());

        store.append(800, |_| {});
        let pending = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(pending, vec![Solve::pending(800)]);

        let confirmed = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(confirmed.len(), 1);
        assert!(!confirmed[0].is_pending());
    }

    #[test]
    fn detached_subscription_gets_nothing_more() {
        let (store, user) = signed_in(MemoryBackend::new());
        let (tx, rx) = mpsc::channel();
        let mut sub = store.subscribe(
            &user,
            move |s| {
                let _ = tx.send(s);
            },
            |_| {},
        );
        rx.recv_timeout(WAIT).unwrap();

        sub.detach();
        sub.detach();
        assert!(sub.is_detached());

        store.append(500, |_| {});
        store.snapshot_blocking().unwrap();
        assert_matches!(
            rx.recv_timeout(Duration::from_millis(100)),
            Err(RecvTimeoutError::Disconnected) | Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn read_failure_goes_to_error_callback() {
        let backend = MemoryBackend::new();
        backend.fail_lists(true);
        let (store, user) = signed_in(backend);
        let (tx, rx) = mpsc::channel();
        let _sub = store.subscribe(&user, |_| {}, move |e| {
            let _ = tx.send(e);
        });

        assert_matches!(rx.recv_timeout(WAIT).unwrap(), StoreError::Rejected(_));
    }

    #[test]
    fn clear_all_then_update_is_empty() {
        let (store, user) = signed_in(MemoryBackend::new());
        for ms in [100, 200, 300] {
            store.append(ms, |_| {});
        }

        let (tx, rx) = mpsc::channel();
        let _sub = store.subscribe(
            &user,
            move |s| {
                let _ = tx.send(s);
            },
            |_| {},
        );
        assert_eq!(rx.recv_timeout(WAIT).unwrap().len(), 3);

        let (done_tx, done_rx) = mpsc::channel();
        store.clear_all(move |r| {
            let _ = done_tx.send(r);
        });
        assert_matches!(done_rx.recv_timeout(WAIT).unwrap(), Ok(3));
        assert!(rx.recv_timeout(WAIT).unwrap().is_empty());
    }

    #[test]
    fn partial_clear_reports_error() {
        let backend = MemoryBackend::new();
        let (store, _) = signed_in(backend.clone());
        for ms in [100, 200, 300] {
            store.append(ms, |_| {});
        }
        store.snapshot_blocking().unwrap();
        backend.fail_delete_of(SolveId(2));

        let (tx, rx) = mpsc::channel();
        store.clear_all(move |r| {
            let _ = tx.send(r);
        });

        assert_matches!(
            rx.recv_timeout(WAIT).unwrap(),
            Err(StoreError::PartialClear {
                deleted: 2,
                failed: 1
            })
        );
        assert_eq!(backend.len(), 1);
    }

    #[test]
    fn sink_appends_through_store() {
        let backend = MemoryBackend::new();
        let (store, _) = signed_in(backend.clone());
        let (tx, rx) = mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        let mut sink = store.sink(move |r| {
            let _ = tx.lock().unwrap().send(r.map(|s| s.elapsed_ms));
        });

        sink.submit(4321);
        assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), 4321);
        assert_eq!(backend.len(), 1);
    }
}
