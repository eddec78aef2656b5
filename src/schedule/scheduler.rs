use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{BoxError, Error};
use crate::telemetry::{CycleTelemetry, LogCode};

use super::options::{AutoRefreshOptions, ValidatedOptions};
use super::refresh::{RefreshFuture, Refreshed};

/// Where a refresh cycle currently stands.
#[derive(Clone, Debug)]
pub enum CycleStatus {
    Running,
    Cancelled,
    /// The cycle stopped on an error; nothing further is scheduled.
    Halted(Arc<Error>),
}

impl CycleStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, CycleStatus::Running)
    }
}

/// Keeps a token fresh by refreshing it shortly before it expires.
///
/// Each call to [`AutoRefresh::start`] begins a cycle: compute the delay from
/// the token's claims, wait (or refresh right away when the delay is not
/// positive), call the refresh operation, and repeat with the token it
/// returns. A new `start` replaces the previous cycle of the same instance.
///
/// Arming timers and awaiting asynchronous refreshes require a tokio runtime.
pub struct AutoRefresh {
    options: Arc<ValidatedOptions>,
    telemetry: CycleTelemetry,
    current: Mutex<Option<Arc<Cycle>>>,
}

impl AutoRefresh {
    pub fn new(options: AutoRefreshOptions) -> Result<Self, Error> {
        let options = options.validate()?;
        let telemetry = CycleTelemetry::new(options.logger.clone());
        Ok(Self {
            options: Arc::new(options),
            telemetry,
            current: Mutex::new(None),
        })
    }

    pub fn scheduler_id(&self) -> Uuid {
        self.telemetry.scheduler_id()
    }

    /// Milliseconds until `token` should be refreshed, as `start` would compute it.
    pub fn calculate_delay(&self, token: &str) -> Result<f64, Error> {
        self.options.calculator.calculate(token, &self.telemetry)
    }

    /// Begins the refresh cycle from `token`.
    ///
    /// When the token is already inside its lead window the refresh operation
    /// runs before this returns. Errors from the first cycle are returned
    /// here; later ones are reported through [`CancelHandle::status`].
    pub fn start(&self, token: impl Into<String>) -> Result<CancelHandle, Error> {
        let token: String = token.into();
        // A token that cannot be scheduled leaves the running cycle alone.
        let delay_ms = self.calculate_delay(&token)?;

        let (cycle, status) = Cycle::new(self.options.clone(), self.telemetry.clone());
        if let Some(previous) = lock(&self.current).replace(cycle.clone()) {
            previous.stop();
        }

        self.telemetry.emit_start();
        match cycle.proceed(delay_ms) {
            Ok(None) => {}
            Ok(Some(pending)) => {
                let runtime = match Handle::try_current() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        cycle.freeze();
                        return Err(err.into());
                    }
                };
                runtime.spawn(cycle.clone().drive(pending));
            }
            Err(err) => {
                cycle.freeze();
                return Err(err);
            }
        }
        Ok(CancelHandle { cycle, status })
    }
}

/// Returned by [`AutoRefresh::start`]; stops the cycle it belongs to.
///
/// Dropping the handle does not cancel the cycle.
#[derive(Clone)]
pub struct CancelHandle {
    cycle: Arc<Cycle>,
    status: watch::Receiver<CycleStatus>,
}

impl CancelHandle {
    /// Clears the pending timer and prevents any further cycle. A refresh
    /// already in flight still completes, but its token is not scheduled.
    /// Safe to call any number of times.
    pub fn cancel(&self) {
        self.cycle.stop();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cycle.is_stopped()
    }

    /// Whether a timer is currently armed for the next refresh.
    pub fn timer_armed(&self) -> bool {
        self.cycle.timer_armed()
    }

    pub fn status(&self) -> CycleStatus {
        self.status.borrow().clone()
    }

    /// Resolves once the cycle is no longer running.
    pub async fn wait(&self) -> CycleStatus {
        let mut status = self.status.clone();
        // The sender lives inside the cycle this handle keeps alive.
        let _ = status.wait_for(|s| !s.is_running()).await;
        status.borrow().clone()
    }
}

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct Cycle {
    options: Arc<ValidatedOptions>,
    telemetry: CycleTelemetry,
    timer: Mutex<TimerSlot>,
    stopped: AtomicBool,
    status: watch::Sender<CycleStatus>,
}

impl Cycle {
    fn new(
        options: Arc<ValidatedOptions>,
        telemetry: CycleTelemetry,
    ) -> (Arc<Self>, watch::Receiver<CycleStatus>) {
        let (status, receiver) = watch::channel(CycleStatus::Running);
        let cycle = Arc::new(Self {
            options,
            telemetry,
            timer: Mutex::new(TimerSlot::default()),
            stopped: AtomicBool::new(false),
            status,
        });
        (cycle, receiver)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn timer_armed(&self) -> bool {
        lock(&self.timer)
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn advance(self: &Arc<Self>, token: String) -> Result<Option<RefreshFuture>, Error> {
        if self.is_stopped() {
            return Ok(None);
        }
        let delay_ms = self.options.calculator.calculate(&token, &self.telemetry)?;
        self.proceed(delay_ms)
    }

    /// Runs cycles synchronously until a timer is armed, a refresh goes
    /// asynchronous (returned to the caller to await), or something fails.
    fn proceed(self: &Arc<Self>, delay_ms: f64) -> Result<Option<RefreshFuture>, Error> {
        let mut delay_ms = delay_ms;
        loop {
            if delay_ms > 0.0 {
                self.schedule(delay_ms)?;
                return Ok(None);
            }
            let token = match self.execute() {
                Refreshed::Ready(next) => next,
                Refreshed::Pending(pending) => return Ok(Some(pending)),
                Refreshed::Failed(source) => return Err(self.refresh_failed(source)),
            };
            if self.is_stopped() {
                return Ok(None);
            }
            delay_ms = self.options.calculator.calculate(&token, &self.telemetry)?;
        }
    }

    fn execute(&self) -> Refreshed {
        self.clear_timer();
        self.telemetry.emit_execute();
        (self.options.refresh)()
    }

    fn schedule(self: &Arc<Self>, delay_ms: f64) -> Result<(), Error> {
        let runtime = Handle::try_current()?;
        let wait = Duration::from_secs_f64(delay_ms / 1000.0);

        let mut slot = lock(&self.timer);
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }
        // `stop` raises the flag before it clears this slot.
        if self.is_stopped() {
            return Ok(());
        }
        slot.generation = slot.generation.wrapping_add(1);
        let generation = slot.generation;
        self.telemetry.emit_schedule(delay_ms);

        let cycle = Arc::clone(self);
        slot.handle = Some(runtime.spawn(async move {
            tokio::time::sleep(wait).await;
            cycle.fire(generation).await;
        }));
        Ok(())
    }

    async fn fire(self: Arc<Self>, generation: u64) {
        // Only the timer that is still current may run the refresh.
        {
            let mut slot = lock(&self.timer);
            if slot.generation != generation {
                return;
            }
            slot.handle = None;
        }
        if self.is_stopped() {
            return;
        }

        let next = match self.execute() {
            Refreshed::Ready(token) => self.advance(token),
            Refreshed::Pending(pending) => Ok(Some(pending)),
            Refreshed::Failed(source) => Err(self.refresh_failed(source)),
        };
        match next {
            Ok(Some(pending)) => self.drive(pending).await,
            Ok(None) => {}
            Err(err) => self.halt(err),
        }
    }

    /// Awaits asynchronous refreshes and keeps the cycle going with their tokens.
    async fn drive(self: Arc<Self>, pending: RefreshFuture) {
        let mut pending = pending;
        loop {
            let token = match pending.await {
                Ok(token) => token,
                Err(source) => {
                    let err = self.refresh_failed(source);
                    self.halt(err);
                    return;
                }
            };
            if self.is_stopped() {
                debug!(
                    scheduler_id = %self.telemetry.scheduler_id(),
                    "refresh completed after cancellation; not rescheduling"
                );
                return;
            }
            match self.advance(token) {
                Ok(Some(next)) => pending = next,
                Ok(None) => return,
                Err(err) => {
                    self.halt(err);
                    return;
                }
            }
        }
    }

    fn refresh_failed(&self, source: BoxError) -> Error {
        let err = Error::Refresh(source);
        self.telemetry
            .error(LogCode::InvalidRefresh, &err, "refresh rejected with an error");
        err
    }

    fn clear_timer(&self) {
        if let Some(handle) = lock(&self.timer).handle.take() {
            handle.abort();
        }
    }

    fn halt(&self, err: Error) {
        self.clear_timer();
        let err = Arc::new(err);
        self.status.send_if_modified(|status| {
            if status.is_running() {
                *status = CycleStatus::Halted(err);
                true
            } else {
                false
            }
        });
    }

    /// Stops the cycle without logging a cancellation.
    fn freeze(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.clear_timer();
    }

    fn stop(&self) {
        self.freeze();
        self.telemetry.emit_cancel();
        self.status.send_if_modified(|status| {
            if status.is_running() {
                *status = CycleStatus::Cancelled;
                true
            } else {
                false
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::Notify;

    use super::*;
    use crate::errors::TokenError;
    use crate::tests::test_support::{RecordingLogger, token_expiring_in};

    struct Harness {
        logger: Arc<RecordingLogger>,
        refreshes: Arc<AtomicUsize>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                logger: Arc::new(RecordingLogger::default()),
                refreshes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn refreshes(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }

        /// Options whose refresh hands back a token valid for `ttl_secs`.
        fn options(&self, ttl_secs: i64) -> AutoRefreshOptions {
            let refreshes = self.refreshes.clone();
            AutoRefreshOptions::new()
                .refresh(move || {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    token_expiring_in(ttl_secs)
                })
                .lead_seconds(10.0)
                .logger(self.logger.clone())
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn fresh_token_arms_a_timer() {
        let harness = Harness::new();
        let autorefresh = AutoRefresh::new(harness.options(100)).expect("valid options");

        let delay = autorefresh
            .calculate_delay(&token_expiring_in(100))
            .expect("delay");
        assert!((delay - 90_000.0).abs() < 2_000.0, "delay {delay}");

        let handle = autorefresh.start(token_expiring_in(100)).expect("start");
        assert!(handle.timer_armed());
        assert_eq!(harness.refreshes(), 0);
        assert!(!harness.logger.has_code(LogCode::Execute));
        assert!(harness.logger.has_code(LogCode::Start));
        assert!(harness.logger.has_code(LogCode::Schedule));
        assert!(handle.status().is_running());
        handle.cancel();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn expiring_token_refreshes_inside_start() {
        let harness = Harness::new();
        let autorefresh = AutoRefresh::new(harness.options(100)).expect("valid options");

        let delay = autorefresh
            .calculate_delay(&token_expiring_in(5))
            .expect("delay");
        assert!((delay + 5_000.0).abs() < 2_000.0, "delay {delay}");

        let handle = autorefresh.start(token_expiring_in(5)).expect("start");
        assert_eq!(harness.refreshes(), 1);
        assert!(handle.timer_armed(), "fresh token from refresh is scheduled");
        assert_eq!(harness.logger.count(LogCode::Execute), 1);
        handle.cancel();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn ready_tokens_chain_without_suspension() {
        let harness = Harness::new();
        let calls = harness.refreshes.clone();
        let options = AutoRefreshOptions::new()
            .refresh(move || {
                // First refresh still lands inside the lead window.
                let ttl = if calls.fetch_add(1, Ordering::SeqCst) == 0 { 3 } else { 100 };
                token_expiring_in(ttl)
            })
            .lead_seconds(10.0)
            .logger(harness.logger.clone());
        let autorefresh = AutoRefresh::new(options).expect("valid options");

        let handle = autorefresh.start(token_expiring_in(1)).expect("start");
        assert_eq!(harness.refreshes(), 2);
        assert!(handle.timer_armed());
        handle.cancel();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn timer_fires_refresh_and_reschedules() {
        let harness = Harness::new();
        let autorefresh = AutoRefresh::new(harness.options(100)).expect("valid options");

        let handle = autorefresh.start(token_expiring_in(100)).expect("start");
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(harness.refreshes(), 1);
        assert!(handle.timer_armed());
        assert_eq!(harness.logger.count(LogCode::Schedule), 2);
        handle.cancel();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn rejected_async_refresh_halts_the_cycle() {
        let harness = Harness::new();
        let options = AutoRefreshOptions::new()
            .refresh_async(|| async { Err::<String, _>(std::io::Error::other("boom")) })
            .lead_seconds(10.0)
            .logger(harness.logger.clone());
        let autorefresh = AutoRefresh::new(options).expect("valid options");

        let handle = autorefresh.start(token_expiring_in(5)).expect("start");
        let status = handle.wait().await;

        match status {
            CycleStatus::Halted(err) => {
                assert!(matches!(*err, Error::Refresh(_)));
                assert!(err.to_string().contains("boom"));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert!(!handle.timer_armed());
        let errors = harness.logger.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, LogCode::InvalidRefresh);
        assert!(errors[0].1.contains("boom"));
        assert!(!harness.logger.has_code(LogCode::Schedule));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn synchronous_refresh_failure_is_returned_from_start() {
        let harness = Harness::new();
        let options = AutoRefreshOptions::new()
            .refresh(|| Refreshed::failed("BAD REFRESH"))
            .lead_seconds(10.0)
            .logger(harness.logger.clone());
        let autorefresh = AutoRefresh::new(options).expect("valid options");

        let err = autorefresh.start(token_expiring_in(5)).err().expect("fails");
        assert!(matches!(err, Error::Refresh(_)));
        assert!(harness.logger.has_code(LogCode::InvalidRefresh));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn malformed_token_fails_start_without_refreshing() {
        let harness = Harness::new();
        let autorefresh = AutoRefresh::new(harness.options(100)).expect("valid options");

        let err = autorefresh.start("not-a-jwt").err().expect("fails");
        assert!(matches!(err, Error::InvalidToken(TokenError::Malformed(_))));
        assert_eq!(harness.refreshes(), 0);
        assert!(!harness.logger.has_code(LogCode::Schedule));
        assert!(harness.logger.has_code(LogCode::InvalidJwt));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn async_token_errors_halt_the_cycle() {
        let harness = Harness::new();
        let options = AutoRefreshOptions::new()
            .refresh_async(|| async { Ok::<_, std::io::Error>("garbage".to_string()) })
            .lead_seconds(10.0)
            .logger(harness.logger.clone());
        let autorefresh = AutoRefresh::new(options).expect("valid options");

        let handle = autorefresh.start(token_expiring_in(5)).expect("start");
        match handle.wait().await {
            CycleStatus::Halted(err) => assert!(matches!(*err, Error::InvalidToken(_))),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn cancel_is_idempotent() {
        let harness = Harness::new();
        let autorefresh = AutoRefresh::new(harness.options(100)).expect("valid options");

        let handle = autorefresh.start(token_expiring_in(100)).expect("start");
        handle.cancel();
        handle.cancel();

        assert!(handle.is_cancelled());
        assert!(!handle.timer_armed());
        assert!(matches!(handle.status(), CycleStatus::Cancelled));
        assert_eq!(harness.logger.count(LogCode::Cancel), 2);

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(harness.refreshes(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn in_flight_refresh_is_not_rescheduled_after_cancel() {
        let harness = Harness::new();
        let gate = Arc::new(Notify::new());
        let refreshes = harness.refreshes.clone();
        let options = AutoRefreshOptions::new()
            .refresh_async({
                let gate = gate.clone();
                move || {
                    let gate = gate.clone();
                    let refreshes = refreshes.clone();
                    async move {
                        gate.notified().await;
                        refreshes.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, std::io::Error>(token_expiring_in(100))
                    }
                }
            })
            .lead_seconds(10.0)
            .logger(harness.logger.clone());
        let autorefresh = AutoRefresh::new(options).expect("valid options");

        let handle = autorefresh.start(token_expiring_in(5)).expect("start");
        handle.cancel();
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(harness.refreshes(), 1, "in-flight refresh still completes");
        assert!(!handle.timer_armed());
        assert!(!harness.logger.has_code(LogCode::Schedule));
        assert!(matches!(handle.wait().await, CycleStatus::Cancelled));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn restarting_replaces_the_previous_cycle() {
        let harness = Harness::new();
        let autorefresh = AutoRefresh::new(harness.options(100)).expect("valid options");

        let first = autorefresh.start(token_expiring_in(100)).expect("start");
        let second = autorefresh.start(token_expiring_in(200)).expect("restart");

        assert!(first.is_cancelled());
        assert!(!first.timer_armed());
        assert!(second.timer_armed());
        second.cancel();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn rejected_restart_keeps_the_running_cycle() {
        let harness = Harness::new();
        let autorefresh = AutoRefresh::new(harness.options(100)).expect("valid options");

        let first = autorefresh.start(token_expiring_in(100)).expect("start");
        let err = autorefresh.start("garbage").err().expect("rejected");
        assert!(matches!(err, Error::InvalidToken(TokenError::Malformed(_))));

        assert!(!first.is_cancelled());
        assert!(first.timer_armed());
        assert_eq!(harness.logger.count(LogCode::Cancel), 0);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(harness.refreshes(), 1);
        first.cancel();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn dynamic_lead_is_evaluated_every_cycle() {
        let harness = Harness::new();
        let evaluations = Arc::new(AtomicUsize::new(0));
        let options = harness.options(100).lead_seconds_with({
            let evaluations = evaluations.clone();
            move || {
                evaluations.fetch_add(1, Ordering::SeqCst);
                10.0
            }
        });
        let autorefresh = AutoRefresh::new(options).expect("valid options");

        let handle = autorefresh.start(token_expiring_in(100)).expect("start");
        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(evaluations.load(Ordering::SeqCst), 2);
        handle.cancel();
    }

    #[test]
    fn arming_a_timer_needs_a_runtime() {
        let harness = Harness::new();
        let autorefresh = AutoRefresh::new(harness.options(100)).expect("valid options");
        let err = autorefresh.start(token_expiring_in(100)).err().expect("fails");
        assert!(matches!(err, Error::Runtime(_)));
    }
}
