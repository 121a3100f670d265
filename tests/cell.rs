#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use core::time::Duration;
use dae::cell::ResultCell;
use std::{sync::Barrier, thread};

#[test]
fn empty_cell_has_no_outcome() {
    let cell = ResultCell::<u32, String>::new();
    assert!(!cell.is_set());
    assert_eq!(cell.get(), None);
    assert_eq!(cell.wait_timeout(Duration::from_millis(10)), None);
}

#[test]
fn only_the_first_write_wins() {
    let cell = ResultCell::<u32, String>::default();
    assert_eq!(cell.set(Ok(1)), Ok(()));
    assert_eq!(cell.set(Err("late".to_owned())), Err(Err("late".to_owned())));
    assert!(cell.is_set());
    assert_eq!(cell.get(), Some(&Ok(1)));
    assert_eq!(cell.wait(), &Ok(1));
}

#[test]
fn failures_are_stored_like_values() {
    let cell = ResultCell::<u32, &str>::new();
    assert_eq!(cell.set(Err("boom")), Ok(()));
    assert_eq!(cell.wait_timeout(Duration::ZERO), Some(&Err("boom")));
}

#[test]
fn waiters_wake_on_write() {
    let cell = ResultCell::<u32, String>::new();
    let start = Barrier::new(9);

    let seen = thread::scope(|scope| {
        let readers = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    start.wait();
                    cell.wait().clone()
                })
            })
            .collect::<Vec<_>>();
        start.wait();
        thread::sleep(Duration::from_millis(10));
        cell.set(Ok(42)).unwrap();
        readers
            .into_iter()
            .map(|reader| reader.join().unwrap())
            .collect::<Vec<_>>()
    });
    assert_eq!(seen, vec![Ok(42); 8]);
}

#[test]
fn wait_timeout_sees_write_before_deadline() {
    for timeout in [Duration::from_secs(10), Duration::MAX] {
        let cell = ResultCell::<u32, String>::new();
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(10));
                cell.set(Ok(5)).unwrap();
            });
            assert_eq!(cell.wait_timeout(timeout), Some(&Ok(5)));
        });
    }
}
