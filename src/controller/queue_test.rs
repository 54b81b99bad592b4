//! Tests for the work queue

use super::*;
use crate::controller::rate_limiter::ItemExponentialBackoff;
use std::time::Duration;

fn new_queue() -> WorkQueue<String> {
    WorkQueue::new(
        "test",
        ItemExponentialBackoff::new(Duration::from_millis(5), Duration::from_secs(1)),
    )
}

fn key(s: &str) -> String {
    s.to_string()
}

#[tokio::test]
async fn test_duplicate_adds_collapse_into_one_item() {
    let queue = new_queue();

    queue.add(key("default/foo"));
    queue.add(key("default/foo"));

    assert_eq!(queue.len(), 1);
    assert_eq!(queue.get().await, Some(key("default/foo")));
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_items_come_out_in_arrival_order() {
    let queue = new_queue();

    queue.add(key("default/a"));
    queue.add(key("default/b"));
    queue.add(key("default/a"));
    queue.add(key("default/c"));

    assert_eq!(queue.get().await, Some(key("default/a")));
    assert_eq!(queue.get().await, Some(key("default/b")));
    assert_eq!(queue.get().await, Some(key("default/c")));
}

#[tokio::test]
async fn test_add_while_in_flight_requeues_once_after_done() {
    let queue = new_queue();
    let item = key("default/foo");

    queue.add(item.clone());
    let in_flight = queue.get().await.unwrap();

    // Re-added twice while a worker holds it: not handed out concurrently
    queue.add(item.clone());
    queue.add(item.clone());
    assert!(queue.is_empty(), "in-flight key must not be queued again yet");

    queue.done(&in_flight);
    assert_eq!(queue.len(), 1, "exactly one retry after done");
    assert_eq!(queue.get().await, Some(item.clone()));

    queue.done(&item);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_done_without_readd_does_not_requeue() {
    let queue = new_queue();

    queue.add(key("default/foo"));
    let item = queue.get().await.unwrap();
    queue.done(&item);

    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_key_can_be_added_again_after_done() {
    let queue = new_queue();

    queue.add(key("default/foo"));
    let item = queue.get().await.unwrap();
    queue.done(&item);
    queue.add(key("default/foo"));

    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_get_blocks_until_an_item_arrives() {
    let queue = new_queue();
    let producer = queue.clone();

    let waiter = tokio::spawn(async move { queue.get().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished(), "get should wait for work");

    producer.add(key("default/late"));
    let got = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("get should wake after add")
        .unwrap();
    assert_eq!(got, Some(key("default/late")));
}

#[tokio::test]
async fn test_shutdown_drains_then_reports_shutdown() {
    let queue = new_queue();

    queue.add(key("default/a"));
    queue.shut_down();
    queue.add(key("default/b"));

    assert_eq!(queue.get().await, Some(key("default/a")));
    assert_eq!(queue.get().await, None);
}

#[tokio::test]
async fn test_shutdown_wakes_every_idle_worker() {
    let queue = new_queue();

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let q = queue.clone();
            tokio::spawn(async move { q.get().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.shut_down();

    for worker in workers {
        let got = tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("idle worker should be released by shutdown")
            .unwrap();
        assert_eq!(got, None);
    }
}

#[tokio::test(start_paused = true)]
async fn test_add_rate_limited_waits_for_backoff() {
    let queue = new_queue();
    let item = key("default/foo");

    queue.add_rate_limited(item.clone());
    assert!(queue.is_empty(), "first retry waits the base delay");

    tokio::time::sleep(Duration::from_millis(6)).await;
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.num_requeues(&item), 1);

    queue.forget(&item);
    assert_eq!(queue.num_requeues(&item), 0);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_with_consecutive_failures() {
    let queue = new_queue();
    let item = key("default/foo");

    queue.add_rate_limited(item.clone()); // 5ms
    queue.add_rate_limited(item.clone()); // 10ms
    queue.add_rate_limited(item.clone()); // 20ms

    assert_eq!(queue.num_requeues(&item), 3);

    tokio::time::sleep(Duration::from_millis(25)).await;
    // All three delayed adds landed on the same key
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_add_after_is_dropped_once_shut_down() {
    let queue = new_queue();

    queue.add_after(key("default/foo"), Duration::from_millis(10));
    queue.shut_down();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(queue.get().await, None);
}
