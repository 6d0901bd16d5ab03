//! Refresh mutual-exclusion behavior: a refresher arriving while the lock is
//! held waits, then proceeds without re-fetching if the holder left a fresh
//! snapshot behind.

use fs2::FileExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use threatgalaxy::config::Config;
use threatgalaxy::error::{GalaxyError, Result};
use threatgalaxy::store::{ArchiveSource, RefreshOutcome, Refresher};

/// Source that must never be asked for bytes
struct NoFetchSource;

impl ArchiveSource for NoFetchSource {
    fn fetch(&self) -> Result<Vec<u8>> {
        Err(GalaxyError::Config(
            "fetch attempted while snapshot was fresh".to_string(),
        ))
    }
}

#[test]
fn test_waiter_blocks_then_skips_fetch() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.cache.dir = dir.path().to_path_buf();
    std::fs::create_dir_all(&config.cache.dir).unwrap();

    // hold the snapshot lock, as a concurrent refresher would
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(config.cache.lock_path())
        .unwrap();
    lock_file.lock_exclusive().unwrap();

    let finished = Arc::new(AtomicBool::new(false));
    let finished_flag = Arc::clone(&finished);
    let refresher = Refresher::new(&config);
    let waiter = std::thread::spawn(move || {
        // snapshot is absent, so this goes for the lock and blocks
        let outcome = refresher.refresh(&NoFetchSource, false);
        finished_flag.store(true, Ordering::SeqCst);
        outcome
    });

    // the waiter must still be parked on the lock
    std::thread::sleep(Duration::from_millis(200));
    assert!(!finished.load(Ordering::SeqCst));

    // write a fresh snapshot while holding the lock, then release it
    std::fs::write(config.cache.snapshot_path(), b"{}").unwrap();
    FileExt::unlock(&lock_file).unwrap();

    let outcome = waiter.join().unwrap().unwrap();
    assert_eq!(outcome, RefreshOutcome::Fresh);
}
