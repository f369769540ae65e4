use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;
use stencil::{Context, ErrorKind};

proptest! {
    #[test]
    fn prop_set_then_get(key in "[A-Za-z0-9_]{1,16}", value in any::<i64>()) {
        let ctx = Context::new();
        ctx.try_set(key.clone(), value).unwrap();
        let got = ctx.get(&key).map(|v| v.to_text());
        prop_assert_eq!(got, Some(value.to_string()));
    }

    #[test]
    fn prop_non_identifiers_are_rejected(key in "[A-Za-z0-9_]{0,4}[^A-Za-z0-9_][A-Za-z0-9_]{0,4}") {
        let ctx = Context::new();
        let rejected = matches!(ctx.try_set(key.clone(), 1), Err(ErrorKind::InvalidIdentifier(k)) if k == key);
        prop_assert!(rejected);
        prop_assert!(ctx.is_empty());
    }
}

#[test]
fn test_bidirectional_update_does_not_deadlock() {
    let a = Arc::new(Context::new());
    let b = Arc::new(Context::new());

    let mut handles = Vec::new();
    for t in 0..8 {
        let (a, b) = (Arc::clone(&a), Arc::clone(&b));
        handles.push(thread::spawn(move || {
            for i in 0..200 {
                if t % 2 == 0 {
                    a.set(format!("a_{t}_{i}"), i);
                    a.update(&b);
                } else {
                    b.set(format!("b_{t}_{i}"), i);
                    b.update(&a);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // Settle: after one more merge each way both sides hold every key.
    a.update(&b);
    b.update(&a);
    assert_eq!(a.len(), 8 * 200);
    assert_eq!(b.len(), 8 * 200);
    let mut a_keys = a.keys();
    let mut b_keys = b.keys();
    a_keys.sort();
    b_keys.sort();
    assert_eq!(a_keys, b_keys);
}

#[test]
fn test_concurrent_readers_and_writer() {
    let ctx = Arc::new(Context::new());
    ctx.set("fixed", "value");

    let writer = {
        let ctx = Arc::clone(&ctx);
        thread::spawn(move || {
            for i in 0..500 {
                ctx.set(format!("k{i}"), i);
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                for _ in 0..500 {
                    assert_eq!(ctx.get("fixed").map(|v| v.to_text()).as_deref(), Some("value"));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(ctx.len(), 501);
}
