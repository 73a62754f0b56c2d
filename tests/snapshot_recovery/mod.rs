use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use diskkv::read_pointer;
use diskkv::Error;
use diskkv::Query;
use diskkv::QueryResult;
use diskkv::StateMachine;
use diskkv::StorageError;
use tokio_util::sync::CancellationToken;

use crate::common::enable_logger;
use crate::common::get;
use crate::common::insert_entries;
use crate::common::subdirs;
use crate::common::Node;

/// # Case: snapshot shipped through a file
///
/// ## Setup:
/// 1. leader applies 1..=100, prepares a snapshot, then applies 101..=120
/// 2. the snapshot is saved to a file and installed on a lagging follower
///
/// ## Criterias:
/// 1. follower state equals the leader's at index 100
/// 2. follower hash equals the leader's hash at that point
/// 3. follower survives restart with applied index 100
#[test]
fn test_snapshot_through_file() {
    enable_logger();
    let leader_node = Node::new();
    let leader = leader_node.state_machine();
    leader.open().unwrap();
    leader.update(insert_entries(1, 100, "v1")).unwrap();
    let hash_at_100 = leader.get_hash().unwrap();

    let ctx = leader.prepare_snapshot().unwrap();
    leader.update(insert_entries(101, 120, "v2")).unwrap();

    let file_path = leader_node.dir.path().join("snapshot.bin");
    {
        let mut w = BufWriter::new(File::create(&file_path).unwrap());
        leader
            .save_snapshot(ctx, &mut w, &CancellationToken::new())
            .unwrap();
    }

    let follower_node = Node::new();
    let follower = follower_node.state_machine();
    follower.open().unwrap();
    follower.update(insert_entries(1, 10, "stale")).unwrap();

    let mut r = BufReader::new(File::open(&file_path).unwrap());
    follower
        .recover_from_snapshot(&mut r, &CancellationToken::new())
        .unwrap();

    assert_eq!(follower.last_applied(), 100);
    assert_eq!(get(&follower, "key-5").as_deref(), Some("v1-5"));
    assert_eq!(get(&follower, "key-110"), None);
    assert_eq!(follower.get_hash().unwrap(), hash_at_100);
    follower.close().unwrap();

    let restarted = follower_node.state_machine();
    assert_eq!(restarted.open().unwrap(), 100);
    assert_eq!(
        restarted.lookup(Query::AppliedIndex).unwrap(),
        QueryResult::AppliedIndex(100)
    );
    let current = read_pointer(&follower_node.root()).unwrap();
    assert_eq!(subdirs(&follower_node.root()), vec![current]);
}

/// # Case: lookups keep working while a snapshot is installed
///
/// ## Criterias:
/// 1. every lookup returns the old value, the new value, or reports the
///    retired engine as closed
#[test]
fn test_lookups_during_recovery() {
    enable_logger();
    let source_node = Node::new();
    let source = source_node.state_machine();
    source.open().unwrap();
    source.update(insert_entries(1, 50, "new")).unwrap();
    let mut data = Vec::new();
    source
        .save_snapshot(
            source.prepare_snapshot().unwrap(),
            &mut data,
            &CancellationToken::new(),
        )
        .unwrap();

    let target_node = Node::new();
    let target = Arc::new(target_node.state_machine());
    target.open().unwrap();
    target.update(insert_entries(1, 10, "old")).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let target = target.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    match target.lookup(Query::get("key-3")) {
                        Ok(QueryResult::Value(v)) => assert!(v == "old-3" || v == "new-3", "{v}"),
                        Ok(other) => panic!("unexpected result {:?}", other),
                        // the reader may hold the retired handle while it closes
                        Err(Error::Storage(StorageError::EngineClosed)) => {}
                        Err(e) => panic!("unexpected error {:?}", e),
                    }
                }
            })
        })
        .collect();

    target
        .recover_from_snapshot(&mut data.as_slice(), &CancellationToken::new())
        .unwrap();
    done.store(true, Ordering::SeqCst);
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(get(&target, "key-3").as_deref(), Some("new-3"));
}

/// # Case: lookups racing with state machine close
///
/// ## Criterias:
/// 1. every lookup returns the applied value or reports the engine closed
/// 2. once close returns, every reader observes the engine closed
#[test]
fn test_lookups_during_close() {
    enable_logger();
    let node = Node::new();
    let sm = Arc::new(node.state_machine());
    sm.open().unwrap();
    sm.update(insert_entries(1, 10, "v")).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let sm = sm.clone();
            thread::spawn(move || loop {
                match sm.lookup(Query::get("key-3")) {
                    Ok(QueryResult::Value(v)) => assert_eq!(v, "v-3"),
                    Ok(other) => panic!("unexpected result {:?}", other),
                    Err(Error::Storage(StorageError::EngineClosed)) => return,
                    Err(e) => panic!("unexpected error {:?}", e),
                }
            })
        })
        .collect();

    sm.close().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert!(matches!(
        sm.lookup(Query::get("key-3")),
        Err(Error::Storage(StorageError::EngineClosed))
    ));
}
