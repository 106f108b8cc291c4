//! Fixed-interval polling sync for one view.
//!
//! A [`SyncPoller`] re-fetches its view every [`DEFAULT_POLL_INTERVAL`] while
//! the view is visible, plus once immediately when it becomes visible. At
//! most one fetch is in flight; ticks that land while a fetch is outstanding
//! are dropped. Results are run through a [`Detect`] implementation and only
//! published to subscribers when something changed.
//!
//! Hiding the view stops the timer. A fetch already in flight is left to
//! finish and its result still applies.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::detect::{Detect, Notification};
use crate::error::ClientError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Source of snapshots for one view.
pub trait Fetch: Send + Sync + 'static {
    type Snapshot: Send + Sync + 'static;

    fn fetch(&self) -> impl Future<Output = Result<Self::Snapshot, ClientError>> + Send;
}

/// Side effect for messages from other users (sound, badge, log line).
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notification: &Notification);
}

impl<F> Notifier for F
where
    F: Fn(&Notification) + Send + Sync + 'static,
{
    fn notify(&self, notification: &Notification) {
        self(notification)
    }
}

/// Writes notifications to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: &Notification) {
        info!(
            conversation = %n.conversation_id,
            from = %n.sender_email,
            "New message: {}",
            n.content
        );
    }
}

/// What a view currently displays.
#[derive(Debug, Clone)]
pub struct ViewState<T> {
    pub data: Option<T>,
    /// Last fetch error, cleared by the next successful fetch.
    pub error: Option<String>,
    /// Bumped every time `data` is replaced.
    pub revision: u64,
}

impl<T> Default for ViewState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            revision: 0,
        }
    }
}

pub struct SyncPoller<F: Fetch, D> {
    inner: Arc<PollerInner<F, D>>,
    timer: Option<CancellationToken>,
}

struct PollerInner<F: Fetch, D> {
    source: F,
    detector: Mutex<D>,
    notifier: Arc<dyn Notifier>,
    in_flight: AtomicBool,
    state: watch::Sender<ViewState<F::Snapshot>>,
    period: Duration,
}

/// Clears the in-flight flag when the fetch finishes or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<F, D> SyncPoller<F, D>
where
    F: Fetch,
    D: Detect<F::Snapshot>,
{
    pub fn new(source: F, detector: D, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_period(source, detector, notifier, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_period(source: F, detector: D, notifier: Arc<dyn Notifier>, period: Duration) -> Self {
        let (state, _) = watch::channel(ViewState::default());
        Self {
            inner: Arc::new(PollerInner {
                source,
                detector: Mutex::new(detector),
                notifier,
                in_flight: AtomicBool::new(false),
                state,
                period,
            }),
            timer: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState<F::Snapshot>> {
        self.inner.state.subscribe()
    }

    pub fn is_visible(&self) -> bool {
        self.timer.is_some()
    }

    /// View became visible: fetch now, then every period until hidden.
    /// Must be called from within a tokio runtime.
    pub fn show(&mut self) {
        if self.timer.is_some() {
            return;
        }

        let token = CancellationToken::new();
        tokio::spawn(run_timer(self.inner.clone(), token.clone()));
        self.timer = Some(token);
        debug!("Poller shown, every {:?}", self.inner.period);
    }

    /// View hidden or unmounted: stop the timer.
    pub fn hide(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
            debug!("Poller hidden");
        }
    }

    /// Fetch once, unless a fetch is already in flight. Returns whether a
    /// fetch actually ran.
    pub async fn poll_once(&self) -> bool {
        self.inner.poll_once().await
    }

    /// Run `f` against the detector's remembered state.
    pub fn with_detector<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.inner.lock_detector())
    }
}

impl<F: Fetch, D> Drop for SyncPoller<F, D> {
    fn drop(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

impl<F, D> PollerInner<F, D>
where
    F: Fetch,
    D: Detect<F::Snapshot>,
{
    fn lock_detector(&self) -> MutexGuard<'_, D> {
        self.detector.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_once(&self) -> bool {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("Fetch already in flight, skipping tick");
            return false;
        }
        let _guard = InFlight(&self.in_flight);

        let result = self.source.fetch().await;
        self.apply(result);
        true
    }

    fn apply(&self, result: Result<F::Snapshot, ClientError>) {
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Next tick is the retry.
                warn!("Sync fetch failed: {}", e);
                let message = e.to_string();
                self.state.send_modify(|s| s.error = Some(message));
                return;
            }
        };

        let observation = self.lock_detector().observe(&snapshot);

        for n in &observation.notifications {
            self.notifier.notify(n);
        }

        if observation.changed {
            self.state.send_modify(|s| {
                s.data = Some(snapshot);
                s.error = None;
                s.revision += 1;
            });
        } else {
            self.state.send_if_modified(|s| s.error.take().is_some());
        }
    }
}

async fn run_timer<F, D>(inner: Arc<PollerInner<F, D>>, token: CancellationToken)
where
    F: Fetch,
    D: Detect<F::Snapshot>,
{
    // First tick completes immediately.
    let mut ticker = tokio::time::interval(inner.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                // Spawned so that hiding never cuts a fetch short.
                let inner = inner.clone();
                tokio::spawn(async move {
                    inner.poll_once().await;
                });
            }
        }
    }

    trace!("Poll timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use chrono::Utc;
    use reqwest::StatusCode;
    use tokio::sync::Notify;
    use uuid::Uuid;

    use nextext_types::models::Message;

    use crate::detect::LastMessageDetector;

    const ME: &str = "me@x.com";
    const THEM: &str = "them@x.com";

    #[derive(Default)]
    struct Shared {
        messages: Mutex<Vec<Message>>,
        calls: AtomicUsize,
        fail: AtomicBool,
        gated: AtomicBool,
        gate: Notify,
    }

    struct FakeFetch(Arc<Shared>);

    impl Fetch for FakeFetch {
        type Snapshot = Vec<Message>;

        fn fetch(&self) -> impl Future<Output = Result<Vec<Message>, ClientError>> + Send {
            let shared = self.0.clone();
            async move {
                shared.calls.fetch_add(1, Ordering::SeqCst);
                if shared.gated.load(Ordering::SeqCst) {
                    shared.gate.notified().await;
                }
                if shared.fail.load(Ordering::SeqCst) {
                    return Err(ClientError::Status {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        message: "Failed to fetch messages".into(),
                    });
                }
                Ok(shared.messages.lock().unwrap().clone())
            }
        }
    }

    fn push(shared: &Shared, sender: &str, content: &str) {
        shared.messages.lock().unwrap().push(Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            sender_email: sender.into(),
            content: content.into(),
            created_at: Utc::now(),
        });
    }

    type Poller = SyncPoller<FakeFetch, LastMessageDetector>;

    fn poller(period: Duration) -> (Poller, Arc<Shared>, Arc<Mutex<Vec<Notification>>>) {
        let shared = Arc::new(Shared::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let notifier: Arc<dyn Notifier> =
            Arc::new(move |n: &Notification| sink.lock().unwrap().push(n.clone()));
        let poller = SyncPoller::with_period(
            FakeFetch(shared.clone()),
            LastMessageDetector::new(ME),
            notifier,
            period,
        );
        (poller, shared, seen)
    }

    #[tokio::test]
    async fn overlapping_poll_is_skipped() {
        let (poller, shared, _) = poller(DEFAULT_POLL_INTERVAL);
        shared.gated.store(true, Ordering::SeqCst);

        let (first, second, _) = tokio::join!(
            poller.poll_once(),
            async {
                tokio::task::yield_now().await;
                poller.poll_once().await
            },
            async {
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                shared.gate.notify_one();
            }
        );

        assert!(first);
        assert!(!second);
        assert_eq!(shared.calls.load(Ordering::SeqCst), 1);

        // Guard released afterwards
        shared.gated.store(false, Ordering::SeqCst);
        assert!(poller.poll_once().await);
    }

    #[tokio::test]
    async fn unchanged_snapshot_is_not_republished() {
        let (poller, shared, seen) = poller(DEFAULT_POLL_INTERVAL);
        let state = poller.subscribe();
        push(&shared, THEM, "hi");

        poller.poll_once().await;
        assert_eq!(state.borrow().revision, 1);
        poller.poll_once().await;
        assert_eq!(state.borrow().revision, 1);
        assert!(seen.lock().unwrap().is_empty());

        push(&shared, THEM, "are you there?");
        poller.poll_once().await;
        assert_eq!(state.borrow().revision, 2);
        assert_eq!(state.borrow().data.as_ref().unwrap().len(), 2);

        push(&shared, ME, "yes");
        poller.poll_once().await;
        assert_eq!(state.borrow().revision, 3);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].content, "are you there?");
    }

    #[tokio::test]
    async fn failed_fetch_keeps_data_and_reports_error() {
        let (poller, shared, _) = poller(DEFAULT_POLL_INTERVAL);
        let state = poller.subscribe();
        push(&shared, THEM, "hi");
        poller.poll_once().await;

        shared.fail.store(true, Ordering::SeqCst);
        poller.poll_once().await;
        {
            let s = state.borrow();
            assert!(s.error.as_ref().unwrap().contains("Failed to fetch messages"));
            assert_eq!(s.data.as_ref().unwrap().len(), 1);
        }

        shared.fail.store(false, Ordering::SeqCst);
        poller.poll_once().await;
        let s = state.borrow();
        assert!(s.error.is_none());
        assert_eq!(s.revision, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_runs_only_while_visible() {
        let (mut poller, shared, _) = poller(Duration::from_secs(2));
        let calls = || shared.calls.load(Ordering::SeqCst);

        poller.show();
        assert!(poller.is_visible());
        tokio::time::sleep(Duration::from_millis(4_100)).await;
        // Immediate fetch plus ticks at 2s and 4s
        assert_eq!(calls(), 3);

        poller.hide();
        assert!(!poller.is_visible());
        let after_hide = calls();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls(), after_hide);

        poller.show();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls(), after_hide + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hiding_lets_in_flight_fetch_apply() {
        let (mut poller, shared, _) = poller(Duration::from_secs(2));
        let state = poller.subscribe();
        shared.gated.store(true, Ordering::SeqCst);
        push(&shared, THEM, "late");

        poller.show();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(shared.calls.load(Ordering::SeqCst), 1);

        poller.hide();
        shared.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(state.borrow().revision, 1);
        assert_eq!(shared.calls.load(Ordering::SeqCst), 1);
    }
}
