use std::sync::mpsc;
use std::time::Duration;

use assert_matches::assert_matches;
use lightsout::history::{
    HistoryBackend, HistoryStore, HistoryView, SqliteBackend, Solve, StoreError, UserId,
};

const WAIT: Duration = Duration::from_secs(5);

fn append(store: &HistoryStore, ms: u64) -> Result<Solve, StoreError> {
    let (tx, rx) = mpsc::channel();
    store.append(ms, move |r| {
        let _ = tx.send(r);
    });
    rx.recv_timeout(WAIT).unwrap()
}

#[test]
fn solves_survive_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("history.db");
    let user = UserId::new("racer");

    {
        let store = HistoryStore::spawn(SqliteBackend::open(&db).unwrap());
        store.set_identity(Some(user.clone()));
        for ms in [1237, 2000, 3000] {
            let solve = append(&store, ms).unwrap();
            assert!(solve.id.is_some());
            assert!(solve.recorded_at.is_some());
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    let reopened = SqliteBackend::open(&db).unwrap();
    let solves = reopened.list(&user).unwrap();
    assert_eq!(solves.len(), 3);

    let view = HistoryView::from_snapshot(&solves, 10, 20);
    let newest: Vec<u64> = view.list.iter().map(|s| s.elapsed_ms).collect();
    assert_eq!(newest, vec![3000, 2000, 1237]);
}

#[test]
fn subscriber_sees_pending_then_stamped_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::spawn(SqliteBackend::open(dir.path().join("h.db")).unwrap());
    let user = UserId::new("racer");
    store.set_identity(Some(user.clone()));

    let (tx, rx) = mpsc::channel();
    let _subscription = store.subscribe(
        &user,
        move |snapshot| {
            let _ = tx.send(snapshot);
        },
        |_| {},
    );
    assert!(rx.recv_timeout(WAIT).unwrap().is_empty());

    append(&store, 4_321).unwrap();

    let pending = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_pending());

    let confirmed = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(confirmed.len(), 1);
    assert!(!confirmed[0].is_pending());
    assert_eq!(confirmed[0].elapsed_ms, 4_321);
}

#[test]
fn users_do_not_see_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::spawn(SqliteBackend::open(dir.path().join("h.db")).unwrap());

    store.set_identity(Some(UserId::new("alice")));
    append(&store, 1_000).unwrap();
    store.set_identity(Some(UserId::new("bob")));
    append(&store, 2_000).unwrap();

    let bobs = store.snapshot_blocking().unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].elapsed_ms, 2_000);

    let (tx, rx) = mpsc::channel();
    store.clear_all(move |r| {
        let _ = tx.send(r);
    });
    assert_matches!(rx.recv_timeout(WAIT).unwrap(), Ok(1));
    assert!(store.snapshot_blocking().unwrap().is_empty());

    store.set_identity(Some(UserId::new("alice")));
    assert_eq!(store.snapshot_blocking().unwrap().len(), 1);
}

#[test]
fn append_without_identity_is_refused() {
    let store = HistoryStore::spawn(SqliteBackend::open_in_memory().unwrap());
    assert_matches!(append(&store, 1_000), Err(StoreError::NoIdentity));
    assert_matches!(store.snapshot_blocking(), Err(StoreError::NoIdentity));
}
