//! Mediation state is per thread; the store's optimistic check arbitrates
//! between threads writing the same root.

use std::sync::{Arc, Barrier};
use std::thread;

use keystone_tests::prelude::*;
use pretty_assertions::assert_eq;

struct Report {
    mediator: usize,
    thread: thread::ThreadId,
    stale: bool,
}

#[test]
fn test_each_thread_mediates_its_own_handle() -> FixtureResult<()> {
    // GIVEN
    let types = traceable_types()?;
    let db = Database::new();
    let id = {
        let h = Harness::new(&db, &types);
        Traceable::seed(&h.ctx, &h.conn, "Foo")?.id().expect("seeded")
    };
    let barrier = Arc::new(Barrier::new(2));

    // WHEN
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let (db, types, barrier) = (Arc::clone(&db), Arc::clone(&types), Arc::clone(&barrier));
            thread::spawn(move || {
                let h = Harness::new(&db, &types);
                let traceable = Traceable::find(&h.conn, id).expect("row exists");
                let mut mediator = 0;
                let result = traceable.mediated_transaction(&h.ctx, || {
                    let current = h.ctx.current_mediator(&traceable).expect("mediating");
                    mediator = std::rc::Rc::as_ptr(&current) as usize;
                    // Both threads are inside their transaction at once.
                    barrier.wait();
                    Ok(())
                });
                Report {
                    mediator,
                    thread: thread::current().id(),
                    stale: result.is_err_and(|err| err.is_stale()),
                }
            })
        })
        .collect();
    let outcomes: Vec<Report> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread panicked"))
        .collect();

    // THEN
    assert_ne!(outcomes[0].mediator, outcomes[1].mediator);
    assert_ne!(outcomes[0].thread, outcomes[1].thread);
    assert_eq!(outcomes.iter().filter(|outcome| outcome.stale).count(), 1);
    assert_eq!(db.find(&"traceable".into(), id)?.lock_version, 1);
    Ok(())
}

#[test]
fn test_contexts_on_different_threads_share_type_registry() -> FixtureResult<()> {
    // GIVEN
    let types = traceable_types()?;
    let db = Database::new();

    // WHEN
    let ids: Vec<EntityId> = (0..4)
        .map(|n| {
            let (db, types) = (Arc::clone(&db), Arc::clone(&types));
            thread::spawn(move || {
                let h = Harness::new(&db, &types);
                let traceable = Traceable::new(&h.conn, Some(&format!("t{n}")));
                traceable.save(&h.ctx).expect("saved");
                assert!(h.ctx.registry().is_empty());
                traceable.id().expect("inserted")
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().expect("thread panicked"))
        .collect();

    // THEN
    assert_eq!(ids.len(), 4);
    assert_eq!(db.count(&"traceable".into()), 4);
    for id in ids {
        assert_eq!(db.find(&"traceable".into(), id)?.lock_version, 1);
    }
    Ok(())
}
