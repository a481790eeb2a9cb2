//! Queue accounting tests for sensorhub-queue

use std::cell::Cell;

use proptest::prelude::*;
use sensorhub_mem::BlockPool;
use sensorhub_queue::{Queue, QueueEvent, QueueListener};

#[derive(Default)]
struct Counter {
    high: Cell<usize>,
    empty: Cell<usize>,
}

impl QueueListener for Counter {
    fn on_queue_event(&self, event: QueueEvent, _tag: u32) {
        match event {
            QueueEvent::HighThreshold => self.high.set(self.high.get() + 1),
            QueueEvent::Empty => self.empty.set(self.empty.get() + 1),
            _ => {}
        }
    }
}

#[test]
fn test_listener_may_reenter_queue() {
    struct Peeker<'q> {
        queue: Cell<Option<&'q Queue<'q, 4>>>,
        seen: Cell<usize>,
    }

    impl QueueListener for Peeker<'_> {
        fn on_queue_event(&self, _event: QueueEvent, _tag: u32) {
            if let Some(queue) = self.queue.get() {
                self.seen.set(queue.len());
            }
        }
    }

    let pool: BlockPool<64> = BlockPool::new();
    pool.init(8).unwrap();
    let peeker = Peeker {
        queue: Cell::new(None),
        seen: Cell::new(0),
    };
    let mut queue: Queue<'_, 4> = Queue::create(4, 0, 2).unwrap();
    queue.register_listener(QueueEvent::HighThreshold, &peeker, 0);
    peeker.queue.set(Some(&queue));

    queue.enqueue(pool.alloc_buffer(&[1]).unwrap()).unwrap();
    queue.enqueue(pool.alloc_buffer(&[2]).unwrap()).unwrap();
    assert_eq!(peeker.seen.get(), 2);
}

proptest! {
    #[test]
    fn prop_size_tracks_operations(ops in proptest::collection::vec(any::<bool>(), 0..300)) {
        const CAP: usize = 16;
        let pool: BlockPool<1024> = BlockPool::new();
        pool.init(8).unwrap();
        let counter = Counter::default();
        let mut queue: Queue<'_, CAP> = Queue::create(CAP, 0, 5).unwrap();
        queue.register_listener(QueueEvent::HighThreshold, &counter, 1);
        queue.register_listener(QueueEvent::Empty, &counter, 1);

        let mut expected = 0usize;
        let mut high_crossings = 0usize;
        let mut empty_crossings = 0usize;

        for enqueue in ops {
            if enqueue {
                let buffer = pool.alloc_buffer(&[0]).unwrap();
                match queue.enqueue(buffer) {
                    Ok(_) => {
                        expected += 1;
                        if expected == 5 {
                            high_crossings += 1;
                        }
                    }
                    Err(buffer) => {
                        prop_assert_eq!(expected, CAP);
                        pool.free_buffer(buffer).unwrap();
                    }
                }
            } else {
                match queue.dequeue() {
                    Ok((buffer, _)) => {
                        expected -= 1;
                        if expected == 0 {
                            empty_crossings += 1;
                        }
                        pool.free_buffer(buffer).unwrap();
                    }
                    Err(_) => prop_assert_eq!(expected, 0),
                }
            }

            prop_assert_eq!(queue.len(), expected);
            prop_assert!(queue.len() <= queue.capacity());
        }

        prop_assert_eq!(counter.high.get(), high_crossings);
        prop_assert_eq!(counter.empty.get(), empty_crossings);
        prop_assert_eq!(pool.stats().used_blocks, expected);
    }
}
