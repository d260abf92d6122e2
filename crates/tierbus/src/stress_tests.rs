//! Concurrent register/unregister/post stress tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crate::{impl_event, Bus, Flow, Methods, Subscriber, ThreadAffinity};

#[derive(Clone)]
struct Pulse;

struct Beat {
    pulse: Pulse,
}

impl_event!(Pulse);
impl_event!(Beat => pulse);

struct Counter {
    pulses: AtomicUsize,
    beats: AtomicUsize,
}

impl Counter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pulses: AtomicUsize::new(0),
            beats: AtomicUsize::new(0),
        })
    }
}

impl Subscriber for Counter {
    fn subscriptions(methods: &mut Methods<Self>) {
        methods
            .on::<Pulse, _>(ThreadAffinity::Posting, |s, _| {
                s.pulses.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_cancellable::<Beat, _>(ThreadAffinity::Posting, |s, _| {
                s.beats.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Continue)
            });
    }
}

const THREADS: usize = 8;
const ROUNDS: usize = 300;

#[test]
fn stable_subscriber_sees_every_post_exactly_once_under_churn() {
    let bus = Bus::new();
    let stable = Counter::new();
    bus.register_with_priority(&stable, 0).unwrap();

    let posts = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let bus = bus.clone();
            let posts = Arc::clone(&posts);
            thread::spawn(move || {
                let mine = Counter::new();
                let mut registered = false;
                for _ in 0..ROUNDS {
                    match fastrand::u8(0..3) {
                        0 if !registered => {
                            bus.register_with_priority(&mine, fastrand::i32(-50..50))
                                .unwrap();
                            registered = true;
                        }
                        1 if registered => {
                            bus.unregister(mine.as_ref()).unwrap();
                            registered = false;
                        }
                        _ => {
                            bus.post(Beat { pulse: Pulse });
                            posts.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
                if registered {
                    bus.unregister(mine.as_ref()).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    let posts = posts.load(Ordering::SeqCst);
    assert_eq!(stable.pulses.load(Ordering::SeqCst), posts);
    assert_eq!(stable.beats.load(Ordering::SeqCst), posts);
    assert_eq!(bus.subscription_count(), 2);
}

#[test]
fn registry_is_empty_after_concurrent_churn() {
    let bus = Bus::new();
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let bus = bus.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS / 3 {
                    let counter = Counter::new();
                    bus.register(&counter).unwrap();
                    bus.post(Pulse);
                    assert!(counter.pulses.load(Ordering::SeqCst) >= 1);
                    bus.unregister(counter.as_ref()).unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(bus.subscription_count(), 0);
    assert!(!bus.has_subscribers_for::<Pulse>());
    assert!(!bus.has_subscribers_for::<Beat>());
}

#[test]
fn concurrent_sticky_posts_leave_one_whole_value() {
    let bus = Bus::new();
    bus.post_sticky(Pulse);
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let bus = bus.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    if fastrand::bool() {
                        bus.post_sticky(Pulse);
                    } else {
                        let late = Counter::new();
                        bus.register_sticky(&late).unwrap();
                        assert!(late.pulses.load(Ordering::SeqCst) >= 1);
                        bus.unregister(late.as_ref()).unwrap();
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    assert!(bus.sticky_event::<Pulse>().is_some());
}
