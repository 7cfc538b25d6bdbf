// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use std::time::Duration;

use tokio::signal::unix::{Signal, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// How long a soft shutdown may take before it turns into a hard one
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Drives the graceful shutdown of the server.
///
/// The first SIGTERM or SIGINT cancels the soft shutdown token: listeners
/// stop accepting and connections finish their in-flight requests. A second
/// signal, or the timeout, cancels the hard shutdown token, which drops
/// whatever is left.
pub struct ShutdownManager {
    hard_shutdown_token: CancellationToken,
    soft_shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
    sigterm: Signal,
    sigint: Signal,
    timeout: Duration,
}

impl ShutdownManager {
    /// Create a new shutdown manager, installing the signal handlers
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handler could not be installed
    pub fn new(timeout: Duration) -> Result<Self, std::io::Error> {
        let hard_shutdown_token = CancellationToken::new();
        let soft_shutdown_token = hard_shutdown_token.child_token();
        let sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
        let sigint = tokio::signal::unix::signal(SignalKind::interrupt())?;

        Ok(Self {
            hard_shutdown_token,
            soft_shutdown_token,
            task_tracker: TaskTracker::new(),
            sigterm,
            sigint,
            timeout,
        })
    }

    #[must_use]
    pub fn task_tracker(&self) -> &TaskTracker {
        &self.task_tracker
    }

    #[must_use]
    pub fn hard_shutdown_token(&self) -> CancellationToken {
        self.hard_shutdown_token.clone()
    }

    #[must_use]
    pub fn soft_shutdown_token(&self) -> CancellationToken {
        self.soft_shutdown_token.clone()
    }

    /// Run until every tracked task is done.
    ///
    /// Also returns early, through a soft shutdown, if the soft shutdown
    /// token gets cancelled by something else than a signal, like a crashed
    /// server task.
    pub async fn run(mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Shutdown signal received (SIGTERM), shutting down");
            },
            _ = self.sigint.recv() => {
                tracing::info!("Shutdown signal received (SIGINT), shutting down");
            },
            () = self.soft_shutdown_token.cancelled() => {
                tracing::warn!("A task exited unexpectedly, shutting down");
            },
        };

        self.soft_shutdown_token.cancel();
        self.task_tracker.close();

        let timeout = tokio::time::sleep(self.timeout);
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::warn!("Second shutdown signal received (SIGTERM), abort");
            },
            _ = self.sigint.recv() => {
                tracing::warn!("Second shutdown signal received (SIGINT), abort");
            },
            () = timeout => {
                tracing::warn!(timeout = ?self.timeout, "Shutdown timeout reached, abort");
            },
            () = self.task_tracker.wait() => {},
        }

        self.hard_shutdown_token.cancel();
        self.task_tracker.wait().await;

        tracing::info!("All tasks are done, exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crashed_task_triggers_shutdown() {
        let manager = ShutdownManager::new(Duration::from_secs(5)).unwrap();
        let soft = manager.soft_shutdown_token();
        let hard = manager.hard_shutdown_token();

        manager.task_tracker().spawn({
            let soft = soft.clone();
            async move { soft.cancelled().await }
        });

        // What a server task does when it crashes
        drop(soft.clone().drop_guard());
        manager.run().await;

        assert!(soft.is_cancelled());
        assert!(hard.is_cancelled());
    }

    #[tokio::test]
    async fn test_stuck_task_hits_the_timeout() {
        let manager = ShutdownManager::new(Duration::from_millis(50)).unwrap();
        let soft = manager.soft_shutdown_token();
        let hard = manager.hard_shutdown_token();

        manager.task_tracker().spawn({
            let hard = hard.clone();
            async move { hard.cancelled().await }
        });

        soft.cancel();
        manager.run().await;

        assert!(hard.is_cancelled());
    }
}
