//! # comprehensive storage tests
//!
//! why: verify the persistence option keeps what a restarted node needs
//! relations: tests raft-storage against raft-core types
//! what: term/vote, log tail rewrites, restart recovery, atomic files, trait polymorphism

use raft_core::{LogEntry, LogIndex, RaftNode};
use raft_storage::{FileStorage, InMemoryStorage, Storage};
use std::fs;
use tempfile::tempdir;

fn entry(term: u64, index: LogIndex, command: &[u8]) -> LogEntry {
    LogEntry::new(term, index, command.to_vec())
}

// =============================================================================
// SECTION 1: IN-MEMORY STORAGE TESTS
// =============================================================================

mod in_memory {
    use super::*;

    #[test]
    fn new_storage_has_default_values() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.load_term_and_vote().unwrap(), (0, None));
        assert!(storage.load_log().unwrap().is_empty());
    }

    #[test]
    fn overwrite_term_and_vote() {
        let mut storage = InMemoryStorage::new();

        storage.save_term_and_vote(1, Some(1)).unwrap();
        storage.save_term_and_vote(5, None).unwrap();

        assert_eq!(storage.load_term_and_vote().unwrap(), (5, None));
    }

    #[test]
    fn append_in_batches_keeps_order() {
        let mut storage = InMemoryStorage::new();

        storage.append_entries(&[entry(1, 0, b"a")]).unwrap();
        storage.append_entries(&[entry(1, 1, b"b"), entry(2, 2, b"c")]).unwrap();

        let log = storage.load_log().unwrap();
        assert_eq!(log.iter().map(|e| e.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn truncate_from_zero_empties_log() {
        let mut storage = InMemoryStorage::new();
        storage.append_entries(&[entry(1, 0, b"a"), entry(1, 1, b"b")]).unwrap();

        storage.truncate_log_from(0).unwrap();

        assert!(storage.load_log().unwrap().is_empty());
    }

    #[test]
    fn clear_resets_all_state() {
        let mut storage = InMemoryStorage::new();
        storage.save_term_and_vote(9, Some(2)).unwrap();
        storage.append_entries(&[entry(9, 0, b"a")]).unwrap();

        storage.clear().unwrap();

        assert_eq!(storage.load_term_and_vote().unwrap(), (0, None));
        assert!(storage.load_log().unwrap().is_empty());
    }
}

// =============================================================================
// SECTION 2: FILE STORAGE TESTS
// =============================================================================

mod file_storage {
    use super::*;

    #[test]
    fn create_storage_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("node-1").join("raft");

        let storage = FileStorage::new(&nested).unwrap();

        assert!(nested.is_dir());
        assert_eq!(storage.dir(), nested.as_path());
    }

    #[test]
    fn save_creates_meta_file() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage.save_term_and_vote(3, Some(1)).unwrap();

        assert!(dir.path().join("meta.json").exists());
    }

    #[test]
    fn conflicting_tail_is_replaced() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage
            .append_entries(&[entry(1, 0, b"a"), entry(1, 1, b"b"), entry(1, 2, b"stale")])
            .unwrap();

        storage.replace_log_from(2, &[entry(2, 2, b"fresh")]).unwrap();

        let log = storage.load_log().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].command, b"fresh".to_vec());
    }

    #[test]
    fn clear_removes_all_files() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.save_term_and_vote(5, Some(3)).unwrap();
        storage.append_entries(&[entry(1, 0, b"cmd")]).unwrap();

        storage.clear().unwrap();
        storage.clear().unwrap();

        assert!(!dir.path().join("meta.json").exists());
        assert!(!dir.path().join("log.json").exists());
    }

    #[test]
    fn corrupt_meta_is_reported() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("meta.json"), "{ not json").unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        let err = storage.load_term_and_vote().unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}

// =============================================================================
// SECTION 3: CRASH RECOVERY
// =============================================================================

mod crash_recovery {
    use super::*;

    #[test]
    fn multiple_restarts_preserve_state() {
        let dir = tempdir().unwrap();

        {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            storage.save_term_and_vote(1, Some(1)).unwrap();
            storage.append_entries(&[entry(1, 0, b"a")]).unwrap();
        }
        {
            let mut storage = FileStorage::new(dir.path()).unwrap();
            storage.save_term_and_vote(2, Some(2)).unwrap();
            storage.append_entries(&[entry(2, 1, b"b")]).unwrap();
        }

        let storage = FileStorage::new(dir.path()).unwrap();
        assert_eq!(storage.load_term_and_vote().unwrap(), (2, Some(2)));
        assert_eq!(storage.load_log().unwrap().len(), 2);
    }

    #[test]
    fn restarted_node_keeps_its_vote() {
        let dir = tempdir().unwrap();

        // first process: vote for node 2 in term 4, accept one entry
        {
            let mut node = RaftNode::new(1, vec![1, 2, 3]);
            node.current_term = 3;
            node.handle_request_vote(&raft_core::RequestVoteRequest {
                term: 4,
                candidate_id: 2,
                last_log_index: -1,
                last_log_term: 0,
            });
            node.handle_append_entries(raft_core::AppendEntriesRequest {
                term: 4,
                leader_id: 2,
                prev_log_index: -1,
                prev_log_term: 0,
                entries: vec![entry(4, 0, b"x")],
                leader_commit: -1,
            });

            let mut storage = FileStorage::new(dir.path()).unwrap();
            let (term, vote) = node.hard_state();
            storage.save_term_and_vote(term, vote).unwrap();
            let from = node.take_unpersisted_from().unwrap();
            storage
                .replace_log_from(from, &node.log.entries_from(from))
                .unwrap();
        }

        // second process: same vote, so a rival in term 4 is refused
        let storage = FileStorage::new(dir.path()).unwrap();
        let (term, vote) = storage.load_term_and_vote().unwrap();
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.restore(term, vote, storage.load_log().unwrap());

        let (resp, _) = node.handle_request_vote(&raft_core::RequestVoteRequest {
            term: 4,
            candidate_id: 3,
            last_log_index: 0,
            last_log_term: 4,
        });
        assert!(!resp.vote_granted);
        assert_eq!(node.last_log_index(), 0);
    }
}

// =============================================================================
// SECTION 4: ATOMIC WRITE TESTS
// =============================================================================

mod atomic_writes {
    use super::*;

    #[test]
    fn files_are_valid_json() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage.save_term_and_vote(5, Some(2)).unwrap();
        storage.append_entries(&[entry(1, 0, b"cmd")]).unwrap();

        for name in ["meta.json", "log.json"] {
            let contents = fs::read_to_string(dir.path().join(name)).unwrap();
            let _: serde_json::Value = serde_json::from_str(&contents).expect("valid JSON");
        }
    }

    #[test]
    fn no_temp_files_remain() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();

        storage.save_term_and_vote(5, Some(2)).unwrap();
        storage.append_entries(&[entry(1, 0, b"cmd")]).unwrap();

        assert!(!dir.path().join("meta.tmp").exists());
        assert!(!dir.path().join("log.tmp").exists());
    }
}

// =============================================================================
// SECTION 5: STORAGE TRAIT POLYMORPHISM
// =============================================================================

mod trait_polymorphism {
    use super::*;

    fn exercise(storage: &mut dyn Storage) {
        storage.save_term_and_vote(5, Some(2)).unwrap();
        assert_eq!(storage.load_term_and_vote().unwrap(), (5, Some(2)));

        storage
            .append_entries(&[entry(1, 0, &[0x00, 0xFF]), entry(1, 1, "键 值".as_bytes())])
            .unwrap();
        storage.truncate_log_from(1).unwrap();
        let log = storage.load_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].command, vec![0x00, 0xFF]);

        storage.clear().unwrap();
        assert_eq!(storage.load_term_and_vote().unwrap(), (0, None));
    }

    #[test]
    fn in_memory_implements_trait() {
        exercise(&mut InMemoryStorage::new());
    }

    #[test]
    fn file_storage_implements_trait() {
        let dir = tempdir().unwrap();
        exercise(&mut FileStorage::new(dir.path()).unwrap());
    }
}
