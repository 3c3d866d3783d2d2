//! Running subscriptions
//!
//! Each subscription owns a dispatch task that reads its connection, drops
//! control echoes, decodes messages and runs the callback on the actor's
//! worker pool:
//!
//! ```text
//! driver.receive() ─► control echo? ─► decode ─► topic filter ─► worker permit ─► callback
//!                        └─ skip         └─ skip     └─ skip
//! ```
//!
//! Stopping cancels the task and waits for in-flight callbacks, so no
//! callback runs after [`Subscription::stop`] returns.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::connection::{ConnectionDriver, ConnectionPool};
use crate::message::Message;
use crate::proxy::control::is_control;
use crate::stats::SubscriptionStats;
use crate::topic::Topic;

use super::callback::Callback;

type SharedStats = Arc<Mutex<SubscriptionStats>>;

fn lock(stats: &SharedStats) -> MutexGuard<'_, SubscriptionStats> {
    match stats.lock() {
        Ok(stats) => stats,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle to a live subscription
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    pool: Arc<ConnectionPool>,
    stats: SharedStats,
    cancel: CancellationToken,
    task: Option<JoinHandle<ConnectionDriver>>,
}

impl Subscription {
    pub(crate) fn spawn<C: Callback>(
        driver: ConnectionDriver,
        topic: Topic,
        callback: Arc<C>,
        workers: Arc<Semaphore>,
        pool: Arc<ConnectionPool>,
        cancel: CancellationToken,
    ) -> Self {
        let stats = SharedStats::default();
        let task = tokio::spawn(dispatch(
            driver,
            topic.clone(),
            callback,
            workers,
            Arc::clone(&stats),
            cancel.clone(),
        ));

        tracing::info!(topic = %topic, "Subscription started");
        Self {
            topic,
            pool,
            stats,
            cancel,
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn stats(&self) -> SubscriptionStats {
        lock(&self.stats).clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop dispatching, wait for running callbacks and close the connection
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return;
        };

        match task.await {
            Ok(mut driver) => {
                if let Err(e) = driver.unsubscribe(&self.topic) {
                    tracing::debug!(topic = %self.topic, error = %e, "Unsubscribe failed");
                }
                self.pool.destroy(driver).await;
            }
            Err(e) => tracing::warn!(topic = %self.topic, error = %e, "Dispatch task failed"),
        }

        let stats = self.stats();
        tracing::info!(
            topic = %self.topic,
            received = stats.received,
            dispatched = stats.dispatched,
            "Subscription stopped"
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn dispatch<C: Callback>(
    mut driver: ConnectionDriver,
    topic: Topic,
    callback: Arc<C>,
    workers: Arc<Semaphore>,
    stats: SharedStats,
    cancel: CancellationToken,
) -> ConnectionDriver {
    let mut in_flight = JoinSet::new();

    loop {
        let frames = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                reap(&stats, &topic, done);
                continue;
            }

            frames = driver.receive() => match frames {
                Some(frames) => frames,
                None => break,
            },
        };

        lock(&stats).received += 1;
        if is_control(&frames) {
            lock(&stats).control_skipped += 1;
            continue;
        }

        let message = match Message::from_frames(frames) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Dropping undecodable message");
                lock(&stats).decode_failures += 1;
                continue;
            }
        };
        // The wire prefix may select topics the subscription does not cover
        if !topic.is_parent(message.topic()) {
            continue;
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        lock(&stats).dispatched += 1;
        let callback = Arc::clone(&callback);
        in_flight.spawn(async move {
            let _permit = permit;
            callback.on_message(message).await;
        });
    }

    while let Some(done) = in_flight.join_next().await {
        reap(&stats, &topic, done);
    }
    driver
}

fn reap(stats: &SharedStats, topic: &Topic, done: Result<(), JoinError>) {
    if let Err(e) = done {
        tracing::error!(topic = %topic, error = %e, "Callback failed");
        lock(stats).callback_failures += 1;
    }
}
