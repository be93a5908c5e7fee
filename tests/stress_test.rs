//! Stress coverage for the rooting layer: large tracked sets, deep nesting,
//! and slot churn must all return the stack to its baseline.

mod common;

use std::sync::Arc;

use common::FakeRuntime;
use rootscope::{Runtime, RuntimeConfig, Value};

fn setup() -> (Arc<FakeRuntime>, Runtime) {
    let fake = FakeRuntime::new();
    let rt = Runtime::init(fake.clone(), RuntimeConfig::default());
    (fake, rt)
}

#[test]
fn test_track_n_then_dispose_restores_baseline() {
    let (fake, rt) = setup();

    for n in [0usize, 1, 7, 100, 5000] {
        let baseline = rt.roots().stack().size();
        let ctx = rt.new_scope();

        let values: Vec<Value> = (0..n).map(|i| fake.array(vec![i as f64])).collect();
        for v in &values {
            ctx.track(v).unwrap();
        }
        assert_eq!(ctx.size(), n);

        ctx.scope().dispose().unwrap();
        assert_eq!(ctx.size(), 0);
        assert_eq!(rt.roots().stack().size(), baseline);
        assert_eq!(rt.protected_count(), 0);
    }
}

#[test]
fn test_deeply_nested_scopes() {
    let (fake, rt) = setup();
    const DEPTH: usize = 100;

    let mut scopes = Vec::with_capacity(DEPTH);
    for i in 0..DEPTH {
        let ctx = rt.new_scope();
        ctx.track(&fake.array(vec![i as f64])).unwrap();
        scopes.push(ctx);
    }
    assert_eq!(rt.protected_count(), DEPTH);

    for ctx in scopes.iter().rev() {
        ctx.scope().dispose().unwrap();
    }
    assert_eq!(rt.protected_count(), 0);
    assert_eq!(rt.roots().stack().size(), 0);
}

#[test]
fn test_repeated_scopes_reuse_slots() {
    let (fake, rt) = setup();

    for round in 0..1000 {
        let ctx = rt.new_scope();
        for i in 0..3 {
            ctx.track(&fake.array(vec![(round + i) as f64])).unwrap();
        }
        ctx.scope().dispose().unwrap();

        // Slot churn never grows the stack.
        assert_eq!(rt.roots().stack().size(), 0);
    }
}

#[test]
fn test_escape_churn_settles_to_baseline() {
    let (fake, rt) = setup();

    let mut kept = Vec::new();
    for i in 0..100 {
        let escaped = rt
            .scope(|ctx| {
                // A handful of temporaries around each kept value.
                ctx.track(&fake.array(vec![0.0]))?;
                ctx.track(&fake.array(vec![1.0]))?;
                let keeper = fake.array(vec![i as f64]);
                ctx.track(&keeper)?;
                ctx.escape(&keeper)
            })
            .unwrap();
        kept.push(escaped);
    }
    assert_eq!(rt.protected_count(), 100);

    // All kept values survive a collection cycle.
    let swept = fake.collect(&rt.roots().protected_handles());
    assert_eq!(swept, 200);
    for (i, v) in kept.iter().enumerate() {
        assert_eq!(fake.array_sum(v.native_handle()), Some(i as f64));
    }

    // Dropping the wrappers hands every slot back.
    kept.clear();
    rt.roots().run_pending_clears();
    assert_eq!(rt.protected_count(), 0);
    assert_eq!(rt.roots().stack().size(), 0);
}

#[test]
fn test_interleaved_escape_and_reuse() {
    let (fake, rt) = setup();

    for _ in 0..50 {
        let escaped = rt
            .scope(|ctx| {
                for i in 0..10 {
                    ctx.track(&fake.array(vec![i as f64]))?;
                }
                let keeper = fake.array(vec![99.0]);
                ctx.track(&keeper)?;
                ctx.escape(&keeper)
            })
            .unwrap();

        assert_eq!(fake.array_sum(escaped.native_handle()), Some(99.0));
        drop(escaped);
        rt.roots().run_pending_clears();
        assert_eq!(rt.protected_count(), 0);
        assert_eq!(rt.roots().stack().size(), 0);
    }
}
