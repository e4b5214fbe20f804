//
// Copyright (c) The Romam Project Developers
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio::{task, time};
use tracing::{Instrument, error};

/// A handle which can be used to manipulate the task created by the
/// [`Task::spawn`] function.
///
/// Dropping this handle cancels the task.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
}

/// A handle for a one-shot timer created by [`TimeoutTask::new`].
///
/// The timer can be reset before it fires; dropping the handle cancels it.
#[derive(Debug)]
pub struct TimeoutTask {
    _task: Task<()>,
    control: UnboundedSender<TimerReset>,
    next: Arc<Mutex<Instant>>,
}

/// A handle for a periodic timer created by [`IntervalTask::new`].
///
/// Dropping the handle cancels the timer.
#[derive(Debug)]
pub struct IntervalTask {
    _task: Task<()>,
    next: Arc<Mutex<Instant>>,
}

#[derive(Debug)]
struct TimerReset(Option<Duration>);

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
        }
    }

    /// Spawns a supervised task that automatically restarts if it panics.
    ///
    /// Long-running network receive loops are exposed to arbitrary input, and
    /// discarding the offending packet and restarting the loop beats taking
    /// down the whole daemon.
    pub fn spawn_supervised<F, Fut>(spawn_fn: F) -> Task<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let join_handle = tokio::spawn(
            async move {
                loop {
                    let worker = Task::spawn(spawn_fn());
                    match worker.await {
                        Ok(_) => break,
                        Err(error) if error.is_panic() => {
                            error!("task panicked, restarting...");
                            continue;
                        }
                        Err(error) => {
                            error!(%error, "task failed");
                            break;
                        }
                    }
                }
            }
            .in_current_span(),
        );
        Task { join_handle }
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, task::JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Spawns a task that calls the provided async closure once the timeout
    /// expires.
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        let next = Arc::new(Mutex::new(Instant::now() + timeout));
        let next_child = next.clone();

        let task = Task::spawn(
            async move {
                let sleep = time::sleep(timeout);
                tokio::pin!(sleep);

                loop {
                    tokio::select! {
                        _ = &mut sleep => {
                            (cb)().await;
                            break;
                        }
                        message = control_rx.recv() => {
                            match message {
                                Some(TimerReset(new_timeout)) => {
                                    let timeout =
                                        new_timeout.unwrap_or(timeout);
                                    let next = Instant::now() + timeout;
                                    sleep.as_mut().reset(next);
                                    *next_child.lock().unwrap() = next;
                                }
                                // Timeout has been aborted.
                                None => break,
                            }
                        }
                    }
                }
            }
            .in_current_span(),
        );

        TimeoutTask {
            _task: task,
            control: control_tx,
            next,
        }
    }

    /// Resets the timeout, regardless of whether it has already expired.
    ///
    /// If a new timeout value isn't specified, the last value is reused.
    pub fn reset(&mut self, timeout: Option<Duration>) {
        if self.control.send(TimerReset(timeout)).is_err() {
            error!("failed to reset timeout");
        }
    }

    /// Returns the remaining time before the timeout expires.
    pub fn remaining(&self) -> Duration {
        let next = self.next.lock().unwrap();
        next.saturating_duration_since(Instant::now())
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a task that calls the provided async closure on every tick of
    /// the interval timer.
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let next = Arc::new(Mutex::new(Instant::now() + interval));
        let next_child = next.clone();

        let task = Task::spawn(
            async move {
                let mut ticker = if tick_on_start {
                    time::interval(interval)
                } else {
                    time::interval_at(Instant::now() + interval, interval)
                };

                loop {
                    ticker.tick().await;
                    let next = Instant::now() + interval;
                    (cb)().await;
                    *next_child.lock().unwrap() = next;
                }
            }
            .in_current_span(),
        );

        IntervalTask {
            _task: task,
            next,
        }
    }

    /// Returns the remaining time before the next interval tick.
    pub fn remaining(&self) -> Duration {
        let next = self.next.lock().unwrap();
        next.saturating_duration_since(Instant::now())
    }
}
