//! End-to-end behaviour of the conversation store as a request handler
//! would drive it.

use convo_store::history::{ChatThread, ConversationStore, ManualClock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn store_at_ttl(ttl: Duration) -> (ConversationStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let store = ConversationStore::builder()
        .ttl(ttl)
        .clock(clock.clone())
        .build();
    (store, clock)
}

#[test]
fn alice_timeline_expires_after_ttl_since_last_update() {
    let (store, clock) = store_at_ttl(Duration::from_secs(60));

    // t=0: first lookup mints an empty thread; the handler writes one turn back.
    let thread_a = store.get_or_create("alice", "d1");
    assert!(thread_a.is_empty());
    let with_turn = thread_a.deep_copy();
    with_turn.add_user_message("What is the capital of France?");
    assert!(store.update("alice", "d1", with_turn.clone()));

    // t=30s: the one-turn thread comes back unchanged.
    clock.advance(Duration::from_secs(30));
    let at_30 = store.get_or_create("alice", "d1");
    assert!(at_30.ptr_eq(&with_turn));
    assert_eq!(at_30.turn_count(), 1);

    // t=95s (65s after the last update): stale, so a new empty thread.
    clock.advance(Duration::from_secs(65));
    let at_95 = store.get_or_create("alice", "d1");
    assert!(at_95.is_empty());
    assert_ne!(at_95.id(), with_turn.id());
    assert_eq!(store.len(), 1);
}

#[test]
fn stale_write_back_after_sweep_is_dropped() {
    let (store, clock) = store_at_ttl(Duration::from_secs(60));
    let thread = store.get_or_create("bob", "d1");

    clock.advance(Duration::from_secs(61));
    assert_eq!(store.sweep_expired(), 1);

    thread.add_user_message("late reply");
    assert!(!store.update("bob", "d1", thread));
    assert_eq!(store.stats().total_histories, 0);

    // Caller starts over with a fresh thread.
    let retry = store.get_or_create("bob", "d1");
    assert!(retry.is_empty());
}

#[test]
fn concurrent_first_lookups_create_exactly_one_thread() {
    const CALLERS: usize = 32;

    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let store = ConversationStore::builder()
        .ttl(Duration::from_secs(60))
        .factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ChatThread::new()
        })
        .build();

    let barrier = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.get_or_create("alice", "d1")
            })
        })
        .collect();

    let threads: Vec<ChatThread> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(threads.iter().all(|t| t.ptr_eq(&threads[0])));
    assert_eq!(store.len(), 1);
}

#[test]
fn concurrent_updates_last_writer_wins() {
    const CALLERS: usize = 8;

    let store = ConversationStore::new(Duration::from_secs(60));
    store.get_or_create("alice", "d1");

    // Every caller reads before any caller writes back.
    let read_done = Arc::new(Barrier::new(CALLERS));
    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let store = store.clone();
            let read_done = Arc::clone(&read_done);
            thread::spawn(move || {
                let working = store.get_or_create("alice", "d1").deep_copy();
                read_done.wait();
                working.add_user_message(format!("from caller {i}"));
                store.update("alice", "d1", working)
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }

    // Each caller wrote a private copy; exactly one survives.
    let survivor = store.get_or_create("alice", "d1");
    assert_eq!(survivor.turn_count(), 1);
    assert!(survivor.last_turn().unwrap().content.starts_with("from caller "));
}

#[test]
fn many_conversations_are_isolated() {
    let store = ConversationStore::new(Duration::from_secs(60));
    for user in ["alice", "bob", "carol"] {
        for discussion in ["d1", "d2"] {
            let thread = store.get_or_create(user, discussion);
            thread.add_user_message(format!("{user}/{discussion}"));
            assert!(store.update(user, discussion, thread));
        }
    }

    assert_eq!(store.list_keys().len(), 6);
    let bob = store.get_or_create("bob", "d2");
    assert_eq!(bob.turns()[0].content, "bob/d2");

    assert!(store.clear("bob", "d2"));
    assert_eq!(store.stats().total_histories, 5);
    assert!(store.peek("bob", "d1").is_some());
}

#[test]
fn detailed_info_tracks_pending_expirations() {
    let (store, clock) = store_at_ttl(Duration::from_secs(60));
    store.get_or_create("a", "1");
    store.get_or_create("b", "2");
    clock.advance(Duration::from_secs(90));
    store.get_or_create("c", "3");

    let info = store.detailed_info();
    assert_eq!(info.total_histories, 3);
    assert_eq!(info.expired_entries, 2);

    store.sweep_expired();
    let info = store.detailed_info();
    assert_eq!(info.total_histories, 1);
    assert_eq!(info.expired_entries, 0);
    assert_eq!(info.oldest_entry, info.newest_entry);
}
