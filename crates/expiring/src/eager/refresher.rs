//! Background refresh loop.
//!
//! The loop asks its [`RefreshTarget`] to produce and publish a value, then
//! sleeps until shortly before that value expires. Cancellation is explicit:
//! [`BackgroundRefresher::stop`] cancels the token, which the loop observes at
//! its next sleep. A provider call that is already running is never
//! interrupted.
//!
//! [`BackgroundRefresher::wake`] only reaches a parked loop. A wake that
//! arrives while a refresh is in flight is dropped: the value being produced
//! already satisfies it. If the target was emptied between publishing and
//! parking, [`RefreshTarget::needs_refresh`] catches it before the loop sleeps.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ExpiringCacheOptions;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Smallest sleep the loop ever takes, even with a zero configured floor.
const HARD_MIN_DELAY: Duration = Duration::from_millis(1);

/// What the background loop refreshes.
#[async_trait]
pub trait RefreshTarget: Send + Sync + 'static {
    /// Produce and publish one value.
    ///
    /// Returns the remaining lifetime of the published value, or `None` when
    /// the refresh failed. Failures are reported by the target itself; the
    /// loop only stops.
    async fn refresh(&self) -> Option<chrono::Duration>;

    /// Returns `true` if the published value was discarded and the loop
    /// should refresh again without sleeping.
    fn needs_refresh(&self) -> bool {
        false
    }
}

/// Lifecycle of a [`BackgroundRefresher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefresherState {
    /// Created, loop not started yet
    Idle,
    /// Loop has been started
    Running,
    /// Stopped; the loop never starts again
    Stopped,
}

impl RefresherState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            IDLE => Self::Idle,
            RUNNING => Self::Running,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for RefresherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// When to wake up for the next refresh.
#[derive(Debug, Clone, Copy)]
struct RefreshSchedule {
    lead: chrono::Duration,
    floor: Duration,
}

impl RefreshSchedule {
    fn from_options(options: &ExpiringCacheOptions) -> Self {
        Self {
            lead: options.minimum_remaining(),
            floor: options.min_refresh_delay.max(HARD_MIN_DELAY),
        }
    }

    /// Delay before the next refresh of a value with `remaining` lifetime.
    fn next_delay(&self, remaining: chrono::Duration) -> Duration {
        let until_refresh =
            remaining.checked_sub(&self.lead).unwrap_or_else(chrono::Duration::zero);
        match until_refresh.to_std() {
            Ok(delay) if !delay.is_zero() => delay,
            _ => self.floor,
        }
    }
}

/// Long-lived task that keeps one value fresh.
///
/// Starts at most once ([`start_if_not_running`](Self::start_if_not_running)
/// is a compare-and-swap) and stops at most once.
pub struct BackgroundRefresher {
    state: AtomicU8,
    cancellation: CancellationToken,
    wake: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
    schedule: RefreshSchedule,
}

impl BackgroundRefresher {
    /// Create an idle refresher.
    pub fn new(options: &ExpiringCacheOptions) -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            cancellation: CancellationToken::new(),
            wake: Arc::new(Notify::new()),
            handle: Mutex::new(None),
            schedule: RefreshSchedule::from_options(options),
        }
    }

    /// Spawn the refresh loop unless it was started (or stopped) before.
    ///
    /// The loop only holds a weak reference to `target` and ends once the
    /// target is dropped. Must be called from within a Tokio runtime.
    /// Returns `true` if this call started the loop.
    pub fn start_if_not_running(&self, target: Weak<dyn RefreshTarget>) -> bool {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let cancel = self.cancellation.clone();
        let wake = Arc::clone(&self.wake);
        let schedule = self.schedule;
        let handle = tokio::spawn(async move {
            Self::run(target, cancel, wake, schedule).await;
        });
        *self.handle.lock() = Some(handle);

        info!(refresher = "background", event = "start", "Background refresher started");
        true
    }

    /// Stop the loop. Idempotent; a stopped refresher never starts again.
    pub fn stop(&self) {
        let previous = self.state.swap(STOPPED, Ordering::AcqRel);
        if previous == STOPPED {
            return;
        }

        self.cancellation.cancel();
        info!(
            refresher = "background",
            event = "stop",
            previous_state = %RefresherState::from_u8(previous),
            "Background refresher stopped"
        );
    }

    /// Cut the current sleep short so the next refresh happens now.
    ///
    /// Has no effect while a refresh is in flight.
    pub fn wake(&self) {
        if self.is_running() {
            self.wake.notify_waiters();
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RefresherState {
        RefresherState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` once the loop has been started and not stopped.
    pub fn is_running(&self) -> bool {
        self.state() == RefresherState::Running
    }

    /// Returns `true` once the refresher has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.state() == RefresherState::Stopped
    }

    /// Returns `true` if the loop task has exited (or was never spawned).
    pub fn is_finished(&self) -> bool {
        self.handle.lock().as_ref().map_or(true, JoinHandle::is_finished)
    }

    async fn run(
        target: Weak<dyn RefreshTarget>,
        cancel: CancellationToken,
        wake: Arc<Notify>,
        schedule: RefreshSchedule,
    ) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let Some(strong) = target.upgrade() else {
                debug!(
                    refresher = "background",
                    event = "target_dropped",
                    "Refresh target dropped"
                );
                break;
            };
            let remaining = strong.refresh().await;

            let Some(remaining) = remaining else {
                debug!(
                    refresher = "background",
                    event = "refresh_failed",
                    "Refresh failed; background loop exiting"
                );
                break;
            };

            // Registered before the check below so a wake in between is kept.
            let woken = wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();

            let refresh_again = strong.needs_refresh();
            drop(strong);
            if refresh_again {
                debug!(
                    refresher = "background",
                    event = "value_discarded",
                    "Published value was invalidated; refreshing again"
                );
                continue;
            }

            let delay = schedule.next_delay(remaining);
            debug!(
                refresher = "background",
                event = "sleep",
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Sleeping until next refresh"
            );

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
                () = woken.as_mut() => {
                    debug!(refresher = "background", event = "woken", "Refresh requested early");
                }
            }
        }

        debug!(refresher = "background", event = "exit", "Background refresher loop exited");
    }
}

impl fmt::Debug for BackgroundRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundRefresher")
            .field("state", &self.state())
            .field("loop_finished", &self.is_finished())
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl Drop for BackgroundRefresher {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
