//! The poll loop.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::PollState;
use crate::booking::{AvailabilityCheck, AvailabilityResult};
use crate::error::PassabotError;
use crate::notify::{ChatId, Notifier};
use crate::session::{IdentityBackend, SessionManager};
use crate::Result;

/// Default time between availability checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default wait before retrying a failed login.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(300);

/// Cadence and alerting settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// Sleep between cycles.
    pub interval: Duration,
    /// Sleep after a transient login failure.
    pub retry_backoff: Duration,
    /// After this many consecutive notifying cycles, notify silently.
    /// Zero disables quiet mode.
    pub quiet_after: u32,
    /// Alert the control chat after this many consecutive parse failures.
    /// Zero disables the alert.
    pub parse_alert_threshold: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            quiet_after: 20,
            parse_alert_threshold: 3,
        }
    }
}

/// Counters kept across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    pub logins: u64,
    pub checks: u64,
    pub notifications: u64,
    pub consecutive_hits: u32,
    pub consecutive_parse_errors: u32,
}

/// Drives login, availability checks and notifications.
///
/// The scheduler is the only component that knows the cadence and the
/// only one that decides when to log in again.
pub struct PollScheduler<B, C, N> {
    sessions: SessionManager<B>,
    checker: C,
    notifier: N,
    destination: ChatId,
    control: Option<ChatId>,
    settings: PollSettings,
    state: PollState,
    stats: PollStats,
}

impl<B, C, N> PollScheduler<B, C, N>
where
    B: IdentityBackend,
    C: AvailabilityCheck,
    N: Notifier,
{
    pub fn new(sessions: SessionManager<B>, checker: C, notifier: N, destination: ChatId) -> Self {
        Self {
            sessions,
            checker,
            notifier,
            destination,
            control: None,
            settings: PollSettings::default(),
            state: PollState::default(),
            stats: PollStats::default(),
        }
    }

    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Send operator alerts to `control`.
    pub fn with_control_chat(mut self, control: Option<ChatId>) -> Self {
        self.control = control;
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    pub fn sessions(&self) -> &SessionManager<B> {
        &self.sessions
    }

    /// Run until shutdown is signalled or a fatal error occurs.
    ///
    /// Returns `Ok(())` after a shutdown and the fatal error otherwise.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            "Starting availability polling"
        );
        self.alert(&format!("passabot v{} started", env!("CARGO_PKG_VERSION")))
            .await;

        loop {
            if *shutdown.borrow() && !self.state.is_terminal() {
                info!("Shutdown requested");
                self.transition(PollState::Terminated)?;
            }
            if self.state.is_terminal() {
                self.sessions.close();
                info!(
                    checks = self.stats.checks,
                    notifications = self.stats.notifications,
                    "Polling stopped"
                );
                return Ok(());
            }
            self.step(&mut shutdown).await?;
        }
    }

    /// Perform the action of the current state and move to the next one.
    ///
    /// Returns an error only for fatal failures, after moving to
    /// [`PollState::Terminated`].
    pub async fn step(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<PollState> {
        let next = match self.state {
            PollState::NoSession => self.login_step(shutdown).await?,
            PollState::Checking => self.check_step().await,
            PollState::Idle => {
                if sleep_or_shutdown(self.settings.interval, shutdown).await {
                    PollState::Terminated
                } else {
                    PollState::Checking
                }
            }
            PollState::Terminated => PollState::Terminated,
        };
        self.transition(next)?;
        Ok(self.state)
    }

    async fn login_step(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<PollState> {
        let fresh = !self.sessions.has_session();
        let outcome = self.sessions.ensure_session().await.map(|_| ());
        match outcome {
            Ok(()) => {
                if fresh {
                    self.stats.logins += 1;
                }
                Ok(PollState::Checking)
            }
            Err(e) if e.is_fatal() => {
                error!("Login failed permanently: {}", e);
                self.alert(&format!("Login failed, stopping: {}", e)).await;
                self.transition(PollState::Terminated)?;
                Err(e)
            }
            Err(e) => {
                let retry_secs = self.settings.retry_backoff.as_secs();
                warn!("Login failed: {}, retrying in {}s", e, retry_secs);
                self.alert(&format!(
                    "Could not log in ({}), retrying in {}s",
                    e, retry_secs
                ))
                .await;
                if sleep_or_shutdown(self.settings.retry_backoff, shutdown).await {
                    Ok(PollState::Terminated)
                } else {
                    Ok(PollState::NoSession)
                }
            }
        }
    }

    async fn check_step(&mut self) -> PollState {
        let Some(session) = self.sessions.current() else {
            return PollState::NoSession;
        };

        self.stats.checks += 1;
        match self.checker.check(session).await {
            Ok(result) => {
                self.stats.consecutive_parse_errors = 0;
                self.dispatch(&result).await;
                PollState::Idle
            }
            Err(PassabotError::SessionInvalid) => {
                info!("Booking site dropped the session, logging in again");
                self.sessions.invalidate();
                PollState::NoSession
            }
            Err(PassabotError::Parse(detail)) => {
                self.stats.consecutive_parse_errors += 1;
                error!(
                    consecutive = self.stats.consecutive_parse_errors,
                    "Could not parse booking site response: {}", detail
                );
                if self.stats.consecutive_parse_errors == self.settings.parse_alert_threshold {
                    self.alert(&format!(
                        "Booking site responses unreadable for {} consecutive checks, \
                         the site format may have changed: {}",
                        self.stats.consecutive_parse_errors, detail
                    ))
                    .await;
                }
                PollState::Idle
            }
            Err(e) => {
                warn!("Availability check failed: {}", e);
                PollState::Idle
            }
        }
    }

    async fn dispatch(&mut self, result: &AvailabilityResult) {
        if !result.has_slots() {
            debug!(offices = result.offices().len(), "No slots available");
            self.stats.consecutive_hits = 0;
            return;
        }

        self.stats.consecutive_hits += 1;
        let silent = self.settings.quiet_after > 0
            && self.stats.consecutive_hits >= self.settings.quiet_after;

        match self.notifier.notify(&self.destination, result, silent).await {
            Ok(()) => self.stats.notifications += 1,
            Err(e) => error!("Failed to deliver availability notification: {}", e),
        }
    }

    async fn alert(&self, text: &str) {
        if let Some(ref control) = self.control {
            if let Err(e) = self.notifier.alert(control, text).await {
                warn!("Failed to deliver operator alert: {}", e);
            }
        }
    }

    fn transition(&mut self, next: PollState) -> Result<()> {
        if next != self.state {
            debug!(from = %self.state, to = %next, "Poll state change");
            self.state.transition_to(next)?;
        }
        Ok(())
    }
}

/// Sleep for `duration`; returns `true` if shutdown was signalled first.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // sender gone, nobody can ask for shutdown anymore
                    (&mut sleep).await;
                    return false;
                }
                if *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{Office, OfficeAvailability, SlotOffer};
    use crate::notify::format_availability;
    use crate::session::test_support::{credentials, FakeBackend};
    use crate::session::Session;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};
    use std::collections::VecDeque;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Default)]
    struct FakeChecker {
        responses: Mutex<VecDeque<Result<AvailabilityResult>>>,
        seen_sessions: Mutex<Vec<String>>,
    }

    impl FakeChecker {
        fn with(responses: Vec<Result<AvailabilityResult>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen_sessions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AvailabilityCheck for FakeChecker {
        async fn check(&self, session: &Session) -> Result<AvailabilityResult> {
            self.seen_sessions
                .lock()
                .unwrap()
                .push(session.session_id().to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(AvailabilityResult::empty()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        fail: bool,
        sent: Mutex<Vec<(ChatId, AvailabilityResult, bool)>>,
        alerts: Mutex<Vec<(ChatId, String)>>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(ChatId, AvailabilityResult, bool)> {
            self.sent.lock().unwrap().clone()
        }

        fn alerts(&self) -> Vec<(ChatId, String)> {
            self.alerts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            destination: &ChatId,
            result: &AvailabilityResult,
            silent: bool,
        ) -> Result<()> {
            if self.fail {
                return Err(PassabotError::Delivery("bot was blocked".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.clone(), result.clone(), silent));
            Ok(())
        }

        async fn alert(&self, destination: &ChatId, text: &str) -> Result<()> {
            self.alerts
                .lock()
                .unwrap()
                .push((destination.clone(), text.to_string()));
            Ok(())
        }
    }

    type TestScheduler =
        PollScheduler<Arc<FakeBackend>, Arc<FakeChecker>, Arc<RecordingNotifier>>;

    struct Harness {
        scheduler: TestScheduler,
        backend: Arc<FakeBackend>,
        checker: Arc<FakeChecker>,
        notifier: Arc<RecordingNotifier>,
        shutdown_tx: watch::Sender<bool>,
        shutdown: watch::Receiver<bool>,
    }

    fn harness_with(
        backend: FakeBackend,
        responses: Vec<Result<AvailabilityResult>>,
        notifier: RecordingNotifier,
    ) -> Harness {
        let backend = Arc::new(backend);
        let checker = FakeChecker::with(responses);
        let notifier = Arc::new(notifier);
        let scheduler = PollScheduler::new(
            SessionManager::new(backend.clone(), credentials()),
            checker.clone(),
            notifier.clone(),
            ChatId::new("data"),
        )
        .with_control_chat(Some(ChatId::new("control")));
        let (shutdown_tx, shutdown) = watch::channel(false);

        Harness {
            scheduler,
            backend,
            checker,
            notifier,
            shutdown_tx,
            shutdown,
        }
    }

    fn harness(responses: Vec<Result<AvailabilityResult>>) -> Harness {
        harness_with(
            FakeBackend::approving(),
            responses,
            RecordingNotifier::default(),
        )
    }

    fn office(name: &str, address: &str, slots: Vec<SlotOffer>) -> OfficeAvailability {
        OfficeAvailability::new(Office::new(1, name, address), slots)
    }

    fn slot(date: &str, time: &str, seats: u32) -> SlotOffer {
        SlotOffer::new(
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            seats,
        )
    }

    fn with_slots() -> AvailabilityResult {
        AvailabilityResult::new(vec![office(
            "Office Y",
            "Via Roma 1",
            vec![slot("2024-05-01", "10:00", 2)],
        )])
    }

    #[tokio::test(start_paused = true)]
    async fn test_office_without_slots_sends_nothing() {
        let mut h = harness(vec![Ok(AvailabilityResult::new(vec![office(
            "Office X",
            "Via Po 3",
            vec![],
        )]))]);

        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::Checking
        );
        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::Idle
        );
        assert!(h.notifier.sent().is_empty());
        assert_eq!(h.scheduler.stats().checks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_sends_nothing() {
        let mut h = harness(vec![Ok(AvailabilityResult::empty())]);

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        h.scheduler.step(&mut h.shutdown).await.unwrap();
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_send_one_notification() {
        let mut h = harness(vec![Ok(with_slots())]);

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        h.scheduler.step(&mut h.shutdown).await.unwrap();

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChatId::new("data"));
        assert!(!sent[0].2);

        let text = format_availability(&sent[0].1).unwrap();
        for expected in ["Office Y", "Via Roma 1", "2024-05-01", "10:00", "2"] {
            assert!(text.contains(expected), "missing {:?} in {}", expected, text);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_notification_per_cycle() {
        let mixed = AvailabilityResult::new(vec![
            office("Empty", "a", vec![]),
            office("Open", "b", vec![slot("2024-06-01", "09:00", 1)]),
        ]);
        let mut h = harness(vec![Ok(mixed.clone()), Ok(mixed.clone()), Ok(mixed)]);

        // login, then three check/idle rounds
        h.scheduler.step(&mut h.shutdown).await.unwrap();
        for _ in 0..3 {
            assert_eq!(
                h.scheduler.step(&mut h.shutdown).await.unwrap(),
                PollState::Idle
            );
            assert_eq!(
                h.scheduler.step(&mut h.shutdown).await.unwrap(),
                PollState::Checking
            );
        }

        // the same slots are reported again every cycle
        assert_eq!(h.notifier.sent().len(), 3);
        assert_eq!(h.scheduler.stats().notifications, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_invalid_relogs_without_sleeping() {
        let mut h = harness(vec![Err(PassabotError::SessionInvalid), Ok(with_slots())]);

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        let before = Instant::now();

        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::NoSession
        );
        assert!(!h.scheduler.sessions().has_session());
        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::Checking
        );
        assert_eq!(Instant::now(), before);
        assert_eq!(h.backend.submits.load(Ordering::SeqCst), 2);

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        assert_eq!(
            h.checker.seen(),
            vec!["challenge-1-1".to_string(), "challenge-1-2".to_string()]
        );
        assert_eq!(h.scheduler.stats().logins, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_approval_timeout_retries_after_backoff() {
        let mut h = harness_with(
            FakeBackend::default(),
            vec![],
            RecordingNotifier::default(),
        );
        let before = Instant::now();

        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::NoSession
        );
        assert_eq!(
            before.elapsed(),
            DEFAULT_APPROVAL_WAIT + DEFAULT_RETRY_BACKOFF
        );
        assert!(h.checker.seen().is_empty());

        let alerts = h.notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0.as_str(), "control");
        assert!(alerts[0].1.contains("retrying in 300s"));
        assert!(h.notifier.sent().is_empty());

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        assert_eq!(h.backend.submits.load(Ordering::SeqCst), 2);
    }

    const DEFAULT_APPROVAL_WAIT: Duration = crate::session::DEFAULT_APPROVAL_TIMEOUT;

    #[tokio::test(start_paused = true)]
    async fn test_authentication_error_terminates() {
        let mut h = harness_with(
            FakeBackend {
                reject: true,
                ..FakeBackend::default()
            },
            vec![Ok(with_slots())],
            RecordingNotifier::default(),
        );

        let err = h.scheduler.run(h.shutdown.clone()).await.unwrap_err();

        assert!(matches!(err, PassabotError::Authentication(_)));
        assert_eq!(h.scheduler.state(), PollState::Terminated);
        assert!(h.checker.seen().is_empty());
        assert_eq!(h.backend.submits.load(Ordering::SeqCst), 1);

        let alerts = h.notifier.alerts();
        assert!(alerts.iter().all(|(chat, _)| chat.as_str() == "control"));
        assert!(alerts.iter().any(|(_, text)| text.contains("Login failed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_errors_keep_polling_and_alert_once() {
        let parse = || Err(PassabotError::Parse("unexpected token".into()));
        let mut h = harness(vec![parse(), parse(), parse(), parse()]);

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        for _ in 0..4 {
            assert_eq!(
                h.scheduler.step(&mut h.shutdown).await.unwrap(),
                PollState::Idle
            );
            h.scheduler.step(&mut h.shutdown).await.unwrap();
        }

        let alerts = h.notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].1.contains("3 consecutive"));
        assert_eq!(h.scheduler.stats().consecutive_parse_errors, 4);
        assert_eq!(h.backend.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_during_check_goes_idle() {
        let mut h = harness(vec![Err(PassabotError::Network("reset".into()))]);

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::Idle
        );
        assert!(h.scheduler.sessions().has_session());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_does_not_stop_loop() {
        let mut h = harness_with(
            FakeBackend::approving(),
            vec![Ok(with_slots()), Ok(with_slots())],
            RecordingNotifier {
                fail: true,
                ..RecordingNotifier::default()
            },
        );

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::Idle
        );
        h.scheduler.step(&mut h.shutdown).await.unwrap();
        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::Idle
        );
        assert_eq!(h.scheduler.stats().notifications, 0);
        assert_eq!(h.scheduler.stats().checks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_mode_after_consecutive_hits() {
        let responses = vec![
            Ok(with_slots()),
            Ok(with_slots()),
            Ok(with_slots()),
            Ok(AvailabilityResult::empty()),
            Ok(with_slots()),
        ];
        let mut h = harness(responses);
        h.scheduler = h.scheduler.with_settings(PollSettings {
            quiet_after: 2,
            ..PollSettings::default()
        });

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        for _ in 0..5 {
            h.scheduler.step(&mut h.shutdown).await.unwrap();
            h.scheduler.step(&mut h.shutdown).await.unwrap();
        }

        let silent: Vec<bool> = h.notifier.sent().iter().map(|s| s.2).collect();
        assert_eq!(silent, vec![false, true, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_waits_for_interval() {
        let mut h = harness(vec![]);

        h.scheduler.step(&mut h.shutdown).await.unwrap();
        h.scheduler.step(&mut h.shutdown).await.unwrap();
        let before = Instant::now();
        assert_eq!(
            h.scheduler.step(&mut h.shutdown).await.unwrap(),
            PollState::Checking
        );
        assert_eq!(before.elapsed(), DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_start() {
        let mut h = harness(vec![]);
        h.shutdown_tx.send(true).unwrap();

        h.scheduler.run(h.shutdown.clone()).await.unwrap();
        assert_eq!(h.scheduler.state(), PollState::Terminated);
        assert!(h.checker.seen().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_idle_sleep() {
        let h = harness(vec![]);
        let Harness {
            mut scheduler,
            checker,
            notifier,
            shutdown_tx,
            shutdown,
            ..
        } = h;

        let task = tokio::spawn(async move {
            let result = scheduler.run(shutdown).await;
            (result, scheduler)
        });

        // checks run at t=0 and t=60; shutdown lands during the second sleep
        tokio::time::sleep(Duration::from_secs(90)).await;
        shutdown_tx.send(true).unwrap();

        let (result, scheduler) = task.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(scheduler.state(), PollState::Terminated);
        assert!(!scheduler.sessions().has_session());
        assert_eq!(checker.seen().len(), 2);
        assert!(notifier.alerts()[0].1.contains("started"));
    }
}
