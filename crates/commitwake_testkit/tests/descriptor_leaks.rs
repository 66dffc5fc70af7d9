//! Descriptor accounting tests.
//!
//! Descriptor counts are process-wide, so every test here runs serially.

#![cfg(any(target_os = "linux", target_os = "android"))]

use commitwake_core::ScopedDescriptor;
use commitwake_testkit::prelude::*;
use nix::unistd::pipe;
use parking_lot::Mutex;
use serial_test::serial;
use std::fs::{self, File};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

#[test]
#[serial]
fn reassign_closes_previous_descriptor() {
    let fds = DescriptorBaseline::new();
    {
        let (r, w) = pipe().unwrap();
        let mut slot = ScopedDescriptor::from(r);
        assert_eq!(fds.delta(), 2);

        slot.assign(w);
        assert_eq!(fds.delta(), 1);

        assert_eq!(slot.as_raw_fd(), slot.raw());

        slot.assign(None);
        assert!(!slot.is_set());
        assert_eq!(fds.delta(), 0);
    }
    fds.assert_no_leaks("reassign");
}

#[test]
#[serial]
fn dropping_scoped_descriptor_closes_it() {
    let fds = DescriptorBaseline::new();
    {
        let (r, w) = pipe().unwrap();
        let _read = ScopedDescriptor::from(r);
        let _write = ScopedDescriptor::from(w);
        assert_eq!(fds.delta(), 2);
    }
    fds.assert_no_leaks("drop");
}

#[test]
#[serial]
fn failed_initialization_leaks_nothing() {
    let db = TempDatabase::new();
    let fds = DescriptorBaseline::new();

    let missing = ChannelIdentity::at(db.sibling("absent").join("db.note"));
    assert!(CommitNotifier::new(&missing, || Ok(())).is_err());
    fds.assert_no_leaks("missing parent directory");

    File::create(db.identity().primary()).unwrap();
    assert!(CommitNotifier::new(&db.identity(), || Ok(())).is_err());
    fds.assert_no_leaks("regular file at channel path");
}

#[test]
#[serial]
fn create_destroy_cycles_leak_nothing() {
    let db = TempDatabase::new();
    let identity = db.identity();
    let fds = DescriptorBaseline::new();

    for _ in 0..50 {
        let counter = WakeCounter::new();
        let notifier = CommitNotifier::new(&identity, counter.callback()).unwrap();
        notifier.notify_others();
        assert!(counter.wait_for(1, WAIT));
        drop(notifier);
    }

    fds.assert_no_leaks("create/destroy cycles");
    assert!(fs::metadata(identity.primary()).is_ok());
}

#[test]
#[serial]
fn drop_with_pending_tokens_leaks_nothing() {
    let db = TempDatabase::new();
    let identity = db.identity();
    let fds = DescriptorBaseline::new();

    {
        let (writer, _writer_wakes) = {
            let counter = WakeCounter::new();
            (CommitNotifier::new(&identity, counter.callback()).unwrap(), counter)
        };
        let gate = Gate::new();
        let parked = gate.clone();
        let reader = CommitNotifier::new(&identity, move || {
            if !parked.is_open() {
                parked.pass();
            }
            Ok(())
        })
        .unwrap();

        writer.notify_others();
        assert!(gate.wait_entered(WAIT));
        for _ in 0..100 {
            writer.notify_others();
        }

        gate.open();
        drop(reader);
        drop(writer);
    }

    fds.assert_no_leaks("drop with pending tokens");
}

#[test]
#[serial]
fn dropping_inside_callback_releases_descriptors() {
    let db = TempDatabase::new();
    let fds = DescriptorBaseline::new();

    {
        let owner: Arc<Mutex<Option<CommitNotifier>>> = Arc::default();
        let released = WakeCounter::new();
        let (slot, inner) = (Arc::clone(&owner), released.clone());
        let notifier = CommitNotifier::new(&db.identity(), move || {
            if let Some(notifier) = slot.lock().take() {
                drop(notifier);
                inner.record();
            }
            Ok(())
        })
        .unwrap();
        *owner.lock() = Some(notifier);

        let (writer, _writer_wakes) = {
            let counter = WakeCounter::new();
            (CommitNotifier::new(&db.identity(), counter.callback()).unwrap(), counter)
        };
        writer.notify_others();
        assert!(released.wait_for(1, WAIT));
    }

    assert!(fds.wait_for_release(WAIT), "{} descriptor(s) still open", fds.delta());
    fds.assert_no_leaks("drop inside callback");
}

#[test]
#[serial]
fn explicit_shutdown_releases_descriptors_before_drop() {
    let db = TempDatabase::new();
    let fds = DescriptorBaseline::new();

    let mut notifier = CommitNotifier::new(&db.identity(), || Ok(())).unwrap();
    assert!(fds.delta() > 0);

    notifier.shutdown();
    fds.assert_no_leaks("after shutdown");
    drop(notifier);
    fds.assert_no_leaks("after drop");
}
