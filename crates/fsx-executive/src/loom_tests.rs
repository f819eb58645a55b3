//! Loom tests for the executive locks
//!
//! ```bash
//! cargo test --package fsx-executive --features loom -- --test-threads=1 loom
//! ```

#[cfg(all(test, feature = "loom"))]
mod tests {
    use loom::thread;

    use crate::sync::{Arc, SharedLock};
    use fsx_resource::{ResourceId, ResourceKind, SlotRecord, SlotTable};

    #[derive(Default)]
    struct Record {
        id: ResourceId,
    }

    impl SlotRecord for Record {
        fn id(&self) -> ResourceId {
            self.id
        }

        fn set_id(&mut self, id: ResourceId) {
            self.id = id;
        }
    }

    /// Concurrent allocations under the table lock never share a handle.
    #[test]
    fn loom_concurrent_allocate_unique() {
        loom::model(|| {
            let table = Arc::new(SharedLock::new(
                "table",
                SlotTable::<Record>::new(ResourceKind::Counter, 4),
            ));

            let t1 = {
                let table = table.clone();
                thread::spawn(move || table.with(|t| t.allocate().map(|(id, _)| id)))
            };
            let t2 = {
                let table = table.clone();
                thread::spawn(move || table.with(|t| t.allocate().map(|(id, _)| id)))
            };

            let a = t1.join().unwrap().unwrap();
            let b = t2.join().unwrap().unwrap();
            assert_ne!(a, b);
            assert_eq!(table.with(|t| t.count_used()), 2);
        });
    }

    /// A release racing an allocation leaves the table consistent.
    #[test]
    fn loom_release_and_allocate() {
        loom::model(|| {
            let table = Arc::new(SharedLock::new(
                "table",
                SlotTable::<Record>::new(ResourceKind::Counter, 1),
            ));
            let first = table.with(|t| t.allocate().map(|(id, _)| id)).unwrap();

            let releaser = {
                let table = table.clone();
                thread::spawn(move || table.with(|t| t.release(first).is_ok()))
            };
            let allocator = {
                let table = table.clone();
                thread::spawn(move || table.with(|t| t.allocate().map(|(id, _)| id).ok()))
            };

            assert!(releaser.join().unwrap());
            match allocator.join().unwrap() {
                // Allocation won only after the release
                Some(id) => {
                    assert_ne!(id, first);
                    assert_eq!(table.with(|t| t.count_used()), 1);
                }
                None => assert_eq!(table.with(|t| t.count_used()), 0),
            }
        });
    }
}
