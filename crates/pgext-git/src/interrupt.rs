//! Stop conditions for blocking libgit2 work.
//!
//! libgit2 runs on the blocking pool, where a dropped future cannot reach it.
//! An [`Interrupt`] travels into the closure instead and is polled from the
//! transfer callbacks and between network steps. Sockets that go silent
//! without ever reaching a callback are bounded by [`NetworkTimeouts`].

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use git2::RemoteCallbacks;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{Error, Result};

/// Cancellation token plus an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Interrupt {
    pub fn new(cancel: CancellationToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    /// Interrupt that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    /// Child of `cancel` expiring `timeout` from now.
    pub fn within(cancel: &CancellationToken, timeout: Duration) -> Self {
        Self::new(cancel.child_token(), Instant::now().checked_add(timeout))
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The error this interrupt stands for, if it has fired.
    pub fn reason(&self) -> Option<Error> {
        if self.cancel.is_cancelled() {
            Some(Error::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Error::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    pub fn check(&self) -> Result<()> {
        self.reason().map_or(Ok(()), Err)
    }

    /// Replace a libgit2 failure with the interrupt reason when one fired.
    pub fn explain(&self, err: Error) -> Error {
        self.reason().unwrap_or(err)
    }

    /// A copy for a blocking closure, cancelled when the guard drops.
    ///
    /// Hold the guard in the future awaiting the blocking task: if that
    /// future is dropped by an outer timeout, the closure sees cancellation.
    pub fn detach(&self) -> (Self, DropGuard) {
        let child = self.cancel.child_token();
        let guard = child.clone().drop_guard();
        (Self::new(child, self.deadline), guard)
    }

    /// Wait until the interrupt fires and return its reason.
    pub async fn fired(&self) -> Error {
        let expiry = async {
            match self.deadline {
                Some(deadline) => {
                    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Error::Cancelled,
            _ = expiry => Error::DeadlineExceeded,
        }
    }

    /// Callbacks that abort the transfer once the interrupt fires.
    pub fn callbacks<'a>(&self) -> RemoteCallbacks<'a> {
        let mut callbacks = RemoteCallbacks::new();
        let transfer = self.clone();
        callbacks.transfer_progress(move |_| !transfer.is_triggered());
        let sideband = self.clone();
        callbacks.sideband_progress(move |_| !sideband.is_triggered());
        callbacks
    }
}

/// Run `op` on the blocking pool, returning as soon as `interrupt` fires.
///
/// `op` receives a detached copy of the interrupt and should poll it; when
/// this future returns early or is dropped, that copy reports cancellation.
pub(crate) async fn run_blocking<T, F>(interrupt: &Interrupt, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Interrupt) -> Result<T> + Send + 'static,
{
    let (detached, _guard) = interrupt.detach();
    let watched = detached.clone();
    let task = tokio::task::spawn_blocking(move || op(watched));

    tokio::select! {
        biased;
        joined = task => joined
            .map_err(|e| Error::Task(e.to_string()))?
            .map_err(|e| detached.explain(e)),
        reason = detached.fired() => Err(reason),
    }
}

/// Process-wide libgit2 socket timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkTimeouts {
    /// Bound on establishing a TCP connection.
    pub connect: Duration,
    /// Bound on any single socket read or write.
    pub io: Duration,
}

impl Default for NetworkTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            io: Duration::from_secs(60),
        }
    }
}

static CONFIGURED: Mutex<bool> = Mutex::new(false);

fn millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX).max(1)
}

impl NetworkTimeouts {
    /// Install these timeouts for every later libgit2 connection.
    pub fn apply(self) -> Result<()> {
        let mut configured = CONFIGURED.lock().unwrap_or_else(PoisonError::into_inner);
        self.install()?;
        *configured = true;
        Ok(())
    }

    /// Apply the defaults unless timeouts were configured already.
    pub fn ensure_configured() -> Result<()> {
        let mut configured = CONFIGURED.lock().unwrap_or_else(PoisonError::into_inner);
        if !*configured {
            Self::default().install()?;
            *configured = true;
        }
        Ok(())
    }

    fn install(self) -> Result<()> {
        // SAFETY: libgit2 option setters only write global integers, and
        // CONFIGURED serializes every caller.
        unsafe {
            git2::opts::set_server_connect_timeout_in_milliseconds(millis(self.connect))?;
            git2::opts::set_server_timeout_in_milliseconds(millis(self.io))?;
        }
        tracing::debug!(
            connect_ms = millis(self.connect),
            io_ms = millis(self.io),
            "configured git network timeouts"
        );
        Ok(())
    }
}
