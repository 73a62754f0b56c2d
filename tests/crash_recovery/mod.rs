//! Restart after a crash at each step of a snapshot install.
//!
//! The install sequence is: create a new engine directory, fill it, rewrite
//! the pointer, delete the old directory. Each case leaves the node root as a
//! crash at one of these points would and checks what the next open sees.

use std::fs;

use diskkv::constants::CURRENT_POINTER_FILENAME;
use diskkv::constants::UPDATING_POINTER_FILENAME;
use diskkv::read_pointer;
use diskkv::write_pointer;
use diskkv::Error;
use diskkv::FatalError;
use diskkv::StateMachine;

use crate::common::enable_logger;
use crate::common::get;
use crate::common::insert_entries;
use crate::common::populate_engine_dir;
use crate::common::subdirs;
use crate::common::Node;

/// Opens a node, applies 1..=5 tagged `old`, and closes it.
fn prepared_node() -> (Node, String) {
    let node = Node::new();
    let sm = node.state_machine();
    sm.open().unwrap();
    sm.update(insert_entries(1, 5, "old")).unwrap();
    sm.close().unwrap();
    let current = read_pointer(&node.root()).unwrap();
    (node, current)
}

#[test]
fn test_crash_before_pointer_swap_keeps_old_state() {
    enable_logger();
    let (node, old) = prepared_node();
    let root = node.root();
    populate_engine_dir(&root.join("12_34"), &[("key-1", "new-1")], 9);

    let sm = node.state_machine();
    assert_eq!(sm.open().unwrap(), 5);
    assert_eq!(get(&sm, "key-1").as_deref(), Some("old-1"));
    assert_eq!(subdirs(&root), vec![old]);
}

#[test]
fn test_crash_while_staging_pointer_keeps_old_state() {
    enable_logger();
    let (node, old) = prepared_node();
    let root = node.root();
    populate_engine_dir(&root.join("12_34"), &[("key-1", "new-1")], 9);
    fs::write(root.join(UPDATING_POINTER_FILENAME), b"partial").unwrap();

    let sm = node.state_machine();
    assert_eq!(sm.open().unwrap(), 5);
    assert_eq!(get(&sm, "key-1").as_deref(), Some("old-1"));
    assert_eq!(subdirs(&root), vec![old]);
    assert!(!root.join(UPDATING_POINTER_FILENAME).exists());
}

#[test]
fn test_crash_after_pointer_swap_adopts_new_state() {
    enable_logger();
    let (node, _old) = prepared_node();
    let root = node.root();
    populate_engine_dir(&root.join("12_34"), &[("key-1", "new-1")], 9);
    write_pointer(&root, "12_34").unwrap();

    let sm = node.state_machine();
    assert_eq!(sm.open().unwrap(), 9);
    assert_eq!(get(&sm, "key-1").as_deref(), Some("new-1"));
    assert_eq!(get(&sm, "key-2"), None);
    assert_eq!(subdirs(&root), vec!["12_34".to_string()]);
}

#[test]
fn test_crash_during_first_run_starts_clean() {
    enable_logger();
    let node = Node::new();
    let root = node.root();
    // engine directory created but the pointer never written
    fs::create_dir_all(root.join("orphan")).unwrap();

    let sm = node.state_machine();
    assert_eq!(sm.open().unwrap(), 0);
    let current = read_pointer(&root).unwrap();
    assert_ne!(current, "orphan");
    assert_eq!(subdirs(&root), vec![current]);
}

#[test]
fn test_corrupted_pointer_refuses_to_open() {
    enable_logger();
    let (node, old) = prepared_node();
    let root = node.root();
    let path = root.join(CURRENT_POINTER_FILENAME);
    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0x20;
    fs::write(&path, data).unwrap();

    let sm = node.state_machine();
    let err = sm.open().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, Error::Fatal(FatalError::PointerCorrupted { .. })));
    // nothing is deleted on a corrupted pointer
    assert_eq!(subdirs(&root), vec![old]);
}
