//! Integration tests for the runtime facade.
//!
//! These cover the primitives the reconciliation engine leans on: bounded
//! channels with `try_send`, semaphores, timeouts and cancellation tokens.

use core_async::{sync, task, time};
use std::sync::Arc;

#[core_async::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    assert_eq!(handle.await.unwrap(), 42);
}

#[core_async::test]
async fn test_timeout_elapses() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(200)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[core_async::test]
async fn test_timeout_success() {
    let result = time::timeout(time::Duration::from_millis(200), async { 7 }).await;
    assert_eq!(result.unwrap(), 7);
}

#[core_async::test]
async fn test_bounded_channel_rejects_when_full() {
    let (tx, mut rx) = sync::mpsc::channel::<u32>(1);

    tx.try_send(1).unwrap();
    let rejected = tx.try_send(2);
    assert!(matches!(
        rejected,
        Err(sync::mpsc::error::TrySendError::Full(2))
    ));

    assert_eq!(rx.recv().await, Some(1));
    tx.try_send(2).unwrap();
    assert_eq!(rx.recv().await, Some(2));
}

#[core_async::test]
async fn test_semaphore_limits_permits() {
    let semaphore = Arc::new(sync::Semaphore::new(2));
    let first = semaphore.clone().acquire_owned().await.unwrap();
    let _second = semaphore.clone().acquire_owned().await.unwrap();

    assert!(semaphore.clone().try_acquire_owned().is_err());
    drop(first);
    assert!(semaphore.try_acquire_owned().is_ok());
}

#[core_async::test]
async fn test_cancellation_token_propagates_to_children() {
    let token = sync::CancellationToken::new();
    let child = token.child_token();

    let waiter = task::spawn(async move {
        child.cancelled().await;
        true
    });

    token.cancel();
    assert!(waiter.await.unwrap());
    assert!(token.is_cancelled());
}

#[core_async::test]
async fn test_cancellation_interrupts_sleep() {
    let token = sync::CancellationToken::new();
    let trigger = token.clone();

    task::spawn(async move {
        time::sleep(time::Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let start = time::Instant::now();
    wait_for_cancel(&token, time::Duration::from_secs(5)).await;
    assert!(start.elapsed() < time::Duration::from_secs(1));
}

async fn wait_for_cancel(token: &sync::CancellationToken, duration: time::Duration) {
    let _ = time::timeout(duration, token.cancelled()).await;
}

#[core_async::test]
async fn test_broadcast_channel() {
    let (tx, mut rx1) = sync::broadcast::channel(4);
    let mut rx2 = tx.subscribe();

    tx.send("ping").unwrap();

    assert_eq!(rx1.recv().await.unwrap(), "ping");
    assert_eq!(rx2.recv().await.unwrap(), "ping");
}
