// ABOUTME: Integration tests for the run lock.
// ABOUTME: Exclusivity under contention, stale detection, force breaking, and release.

use chrono::{Duration, Utc};
use deckhand::deploy::{DeployErrorKind, LockInfo, RunLock};
use deckhand::diagnostics::{Diagnostics, WarningKind};
use deckhand::types::ComponentName;
use std::sync::{Arc, Barrier};

fn project() -> ComponentName {
    ComponentName::new("shop").unwrap()
}

fn write_lock(dir: &std::path::Path, info: &LockInfo) {
    std::fs::create_dir_all(dir).unwrap();
    let path = LockInfo::lock_path(dir, &project());
    std::fs::write(path, serde_json::to_string(info).unwrap()).unwrap();
}

#[test]
fn exactly_one_of_many_concurrent_runs_gets_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));

    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let state_dir = dir.path().to_path_buf();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let mut diag = Diagnostics::default();
                barrier.wait();
                RunLock::acquire(&state_dir, &project(), "deploy", false, &mut diag)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let held = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(held, 1);

    for result in &results {
        if let Err(e) = result {
            assert_eq!(e.kind(), DeployErrorKind::ConcurrentRun);
        }
    }
}

#[test]
fn concurrent_runs_breaking_one_stale_lock_leave_a_single_holder() {
    let dir = tempfile::tempdir().unwrap();
    let stale = LockInfo {
        holder: "web-1".to_string(),
        pid: 4242,
        started_at: Utc::now() - Duration::hours(3),
        command: "deploy".to_string(),
        token: 0,
    };
    write_lock(dir.path(), &stale);

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let state_dir = dir.path().to_path_buf();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let mut diag = Diagnostics::default();
                barrier.wait();
                RunLock::acquire(&state_dir, &project(), "deploy", false, &mut diag)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners: Vec<&RunLock> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);

    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(e.kind(), DeployErrorKind::ConcurrentRun | DeployErrorKind::Lock),
                "{e}"
            );
        }
    }

    // the file on disk belongs to the winner, not to a run that lost the break
    let path = LockInfo::lock_path(dir.path(), &project());
    let on_disk: LockInfo = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(&on_disk, winners[0].info());
    assert!(!path.with_extension("lock.break").exists());
}

#[test]
fn live_lock_reports_its_holder() {
    let dir = tempfile::tempdir().unwrap();
    let info = LockInfo {
        holder: "web-1".to_string(),
        pid: 4242,
        started_at: Utc::now() - Duration::minutes(5),
        command: "deploy".to_string(),
        token: 0,
    };
    write_lock(dir.path(), &info);

    let mut diag = Diagnostics::default();
    let err = RunLock::acquire(dir.path(), &project(), "deploy", false, &mut diag).unwrap_err();

    let message = err.to_string();
    assert!(message.contains("web-1"), "{message}");
    assert!(message.contains("4242"), "{message}");
    assert!(!diag.has_warnings());
}

#[test]
fn stale_lock_is_broken_with_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let info = LockInfo {
        holder: "web-1".to_string(),
        pid: 4242,
        started_at: Utc::now() - Duration::hours(2),
        command: "deploy".to_string(),
        token: 0,
    };
    write_lock(dir.path(), &info);

    let mut diag = Diagnostics::default();
    let lock = RunLock::acquire(dir.path(), &project(), "deploy", false, &mut diag).unwrap();

    assert_eq!(diag.warnings().len(), 1);
    assert_eq!(diag.warnings()[0].kind, WarningKind::LockBroken);
    lock.release().unwrap();
}

#[test]
fn force_breaks_a_live_lock() {
    let dir = tempfile::tempdir().unwrap();
    write_lock(dir.path(), &LockInfo::new("deploy"));

    let mut diag = Diagnostics::default();
    let lock = RunLock::acquire(dir.path(), &project(), "rollback", true, &mut diag).unwrap();

    assert!(diag.has_warnings());
    let content = std::fs::read_to_string(lock.path()).unwrap();
    let info: LockInfo = serde_json::from_str(&content).unwrap();
    assert_eq!(info.command, "rollback");
}

#[test]
fn unreadable_lock_is_broken() {
    let dir = tempfile::tempdir().unwrap();
    let path = LockInfo::lock_path(dir.path(), &project());
    std::fs::write(&path, "not json").unwrap();

    let mut diag = Diagnostics::default();
    let lock = RunLock::acquire(dir.path(), &project(), "deploy", false, &mut diag);

    assert!(lock.is_ok());
    assert_eq!(diag.warnings()[0].kind, WarningKind::LockBroken);
}

#[test]
fn released_or_dropped_lock_can_be_taken_again() {
    let dir = tempfile::tempdir().unwrap();
    let mut diag = Diagnostics::default();

    let lock = RunLock::acquire(dir.path(), &project(), "deploy", false, &mut diag).unwrap();
    let path = lock.path().to_path_buf();
    lock.release().unwrap();
    assert!(!path.exists());

    {
        let _lock = RunLock::acquire(dir.path(), &project(), "deploy", false, &mut diag).unwrap();
        assert!(path.exists());
    }
    assert!(!path.exists());

    RunLock::acquire(dir.path(), &project(), "deploy", false, &mut diag).unwrap();
    assert!(!diag.has_warnings());
}
