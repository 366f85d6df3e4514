//! Record lifetime tests against the process-wide ledger
//!
//! The ledger is shared by every test in this binary, so each test takes
//! `SERIAL` and only looks at counter growth since it started.

use hostview_bridge::{
    api, dispatch, BridgeError, HeadlessRuntime, NativeError, NativeRuntime, RecordStats,
    RuntimeConfig, Window,
};
use hostview_vm::{Value, VmHandle, VmOptions};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

static SERIAL: Mutex<()> = parking_lot::const_mutex(());

fn setup(capacity: usize) -> (VmHandle, Arc<HeadlessRuntime>, Arc<Window>) {
    let vm = VmHandle::new(VmOptions::default());
    let runtime = Arc::new(HeadlessRuntime::new(RuntimeConfig {
        queue_capacity: capacity,
        ..RuntimeConfig::default()
    }));
    let window = Window::new(&vm, runtime.clone());
    api::install(&vm, &window);
    (vm, runtime, window)
}

fn counter(vm: &VmHandle, name: &str) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    vm.register_native(name, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Null)
    });
    count
}

#[test]
fn test_failing_fragment_runs_once_and_is_freed() {
    let _serial = SERIAL.lock();
    let (vm, _rt, window) = setup(8);
    let ticks = counter(&vm, "tick");
    let start = RecordStats::current();

    let owner = window.spawn("lifecycle-error").unwrap();
    window.dispatch("tick() y = 1 / 0").unwrap();
    window.terminate();
    owner.join().unwrap();

    let delta = RecordStats::current().since(&start);
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
    assert_eq!(delta.dispatches_created, 1);
    assert_eq!(delta.dispatches_dropped, 1);
    assert_eq!(vm.enter().sp(), 0);
}

#[test]
fn test_dispatch_from_foreign_thread_runs_on_owner() {
    let _serial = SERIAL.lock();
    let (vm, _rt, window) = setup(8);
    let ran_on: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));
    {
        let ran_on = Arc::clone(&ran_on);
        vm.register_native("where", move |_| {
            *ran_on.lock() = Some(thread::current().id());
            Ok(Value::Null)
        });
    }
    let start = RecordStats::current();

    let owner = window.spawn("lifecycle-owner").unwrap();
    let owner_id = owner.thread().id();

    let poster = {
        let window = Arc::clone(&window);
        thread::spawn(move || window.dispatch("x = 1 + 1 where()"))
    };
    let poster_id = poster.thread().id();
    poster.join().unwrap().unwrap();

    window.terminate();
    owner.join().unwrap();

    assert_eq!(vm.enter().global("x"), Some(&Value::Number(2.0)));
    assert_eq!(*ran_on.lock(), Some(owner_id));
    assert_ne!(owner_id, poster_id);

    let delta = RecordStats::current().since(&start);
    assert_eq!(delta.dispatches_created, 1);
    assert_eq!(delta.dispatches_dropped, 1);
}

#[test]
fn test_rejected_post_is_never_run() {
    let _serial = SERIAL.lock();
    let (vm, rt, window) = setup(1);
    let ticks = counter(&vm, "tick");
    let start = RecordStats::current();

    window.dispatch("tick()").unwrap();
    let full = window.dispatch("tick()").unwrap_err();
    assert!(matches!(full, BridgeError::Native(NativeError::Canceled)));

    rt.terminate();
    let late = window.dispatch("tick()").unwrap_err();
    assert!(matches!(late, BridgeError::Native(NativeError::InvalidState)));

    let delta = RecordStats::current().since(&start);
    assert_eq!(delta.dispatches_created, 3);
    assert_eq!(delta.dispatches_dropped, 2);

    // the one accepted fragment still runs when the loop drains
    window.run();
    let delta = RecordStats::current().since(&start);
    assert_eq!(ticks.load(Ordering::SeqCst), 1);
    assert_eq!(delta.dispatches_dropped, 3);
}

#[test]
fn test_posts_racing_terminate_run_iff_accepted() {
    const POSTERS: usize = 4;
    const POSTS: usize = 50;

    let _serial = SERIAL.lock();
    for _ in 0..20 {
        let (vm, rt, window) = setup(POSTERS * POSTS);
        let ticks = counter(&vm, "tick");
        let accepted = AtomicUsize::new(0);
        let start = RecordStats::current();

        let owner = window.spawn("lifecycle-race").unwrap();
        crossbeam::scope(|s| {
            for _ in 0..POSTERS {
                s.spawn(|_| {
                    for _ in 0..POSTS {
                        if window.dispatch("tick()").is_ok() {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
            s.spawn(|_| {
                thread::yield_now();
                window.terminate();
            });
        })
        .unwrap();
        owner.join().unwrap();

        assert_eq!(ticks.load(Ordering::SeqCst), accepted.load(Ordering::SeqCst));
        assert_eq!(rt.queued(), 0);
        let delta = RecordStats::current().since(&start);
        assert_eq!(delta.dispatches_created, (POSTERS * POSTS) as u64);
        assert_eq!(delta.dispatches_dropped, (POSTERS * POSTS) as u64);
    }
}

#[test]
fn test_unbind_releases_binding_record() {
    let _serial = SERIAL.lock();
    let (vm, rt, window) = setup(1);
    let hits = counter(&vm, "hit");
    vm.run_code_from_thread("func Target(id, p) { hit() }").unwrap();
    let start = RecordStats::current();

    window.bind("f", "Target").unwrap();
    let in_flight = window.binding("f").unwrap();

    window.unbind("f").unwrap();
    assert!(!rt.is_bound("f"));
    assert_eq!(window.binding_count(), 0);
    assert_eq!(RecordStats::current().since(&start).bindings_dropped, 0);

    // a callback that grabbed the record before unbind still completes
    hostview_bridge::callback::on_foreign_call(Some(&in_flight), Some("1"), Some("p"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    drop(in_flight);
    let delta = RecordStats::current().since(&start);
    assert_eq!(delta.bindings_created, 1);
    assert_eq!(delta.bindings_dropped, 1);
}

#[test]
fn test_callback_may_unbind_itself() {
    let _serial = SERIAL.lock();
    let (vm, rt, _window) = setup(1);
    let hits = counter(&vm, "hit");
    vm.run_code_from_thread(
        r#"
        func Once(id, p) { hit() webview_unbind("once") }
        webview_bind("once", "Once")
        "#,
    )
    .unwrap();
    let start = RecordStats::current();

    rt.call_binding("once", "1", "p").unwrap();
    assert_eq!(rt.call_binding("once", "2", "p"), Err(NativeError::NotFound));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(RecordStats::current().since(&start).bindings_dropped, 1);
}

#[test]
fn test_failed_bind_releases_record() {
    let _serial = SERIAL.lock();
    let (_vm, _rt, window) = setup(1);
    window.bind("dup", "a").unwrap();
    let start = RecordStats::current();

    assert!(window.bind("dup", "b").is_err());

    let delta = RecordStats::current().since(&start);
    assert_eq!(delta.bindings_created, 1);
    assert_eq!(delta.bindings_dropped, 1);
}

#[test]
fn test_trampoline_drops_record_for_dead_vm() {
    let _serial = SERIAL.lock();
    let (vm, rt, _window) = setup(1);
    let start = RecordStats::current();

    let record = hostview_bridge::DispatchRecord::new(&vm, "x = 1").unwrap();
    drop(vm);
    dispatch::run(record);

    let delta = RecordStats::current().since(&start);
    assert_eq!(delta.dispatches_dropped, 1);
    assert_eq!(rt.queued(), 0);
}
