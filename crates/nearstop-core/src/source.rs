//! Location sources: live positioning and the simulated countdown feed.
//!
//! A [`LocationSource`] delivers samples into a [`SampleSink`] from a
//! background task and hands back a [`Subscription`]. The subscription is the
//! cancellation token: once cancelled (explicitly or by dropping it) the sink
//! refuses every further delivery, and the task is aborted.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{debug, info, warn};

use crate::types::{LocationSample, PositionFix};

/// Buffer size for position fixes queued between a provider and its watcher.
const FIX_BUFFER: usize = 64;

// =============================================================================
// ERRORS
// =============================================================================

/// A location source could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Positioning is not available on this system.
    #[error("Location source unavailable: {message}")]
    Unavailable {
        /// Why the source could not start.
        message: String,
    },
}

impl SourceError {
    fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// A single position acquisition failed. The watch keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    /// The user or platform refused access to positioning.
    #[error("Location permission denied")]
    PermissionDenied,

    /// A fix could not be determined.
    #[error("Position unavailable: {message}")]
    PositionUnavailable {
        /// Provider-specific detail.
        message: String,
    },

    /// No fix arrived within the acquisition timeout.
    #[error("No position fix within {timeout_ms} ms")]
    Timeout {
        /// The configured timeout.
        timeout_ms: u64,
    },
}

// =============================================================================
// DELIVERY
// =============================================================================

/// Everything a source can deliver to its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// A new observation.
    Sample(LocationSample),
    /// An acquisition failure.
    Error(AcquisitionError),
    /// The source will produce nothing further.
    Finished,
}

/// Receiving half of a subscription's delivery channel.
pub type SampleReceiver = mpsc::UnboundedReceiver<SourceEvent>;

/// Sending half handed to a [`LocationSource`].
///
/// Every delivery checks the subscription's cancellation flag first, so a
/// cancelled subscription never delivers again even if its task is still
/// winding down.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: mpsc::UnboundedSender<SourceEvent>,
    cancelled: Arc<AtomicBool>,
}

impl SampleSink {
    /// Create a sink and the receiver its events arrive on.
    #[must_use]
    pub fn channel() -> (Self, SampleReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            tx,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        (sink, rx)
    }

    /// Deliver a sample. Returns `false` once the subscription is gone.
    pub fn sample(&self, sample: LocationSample) -> bool {
        self.deliver(SourceEvent::Sample(sample))
    }

    /// Deliver an acquisition error. Returns `false` once the subscription is gone.
    pub fn error(&self, error: AcquisitionError) -> bool {
        self.deliver(SourceEvent::Error(error))
    }

    /// Signal that the source has stopped on its own.
    pub fn finished(&self) {
        self.deliver(SourceEvent::Finished);
    }

    /// Whether the subscription has been cancelled or its receiver dropped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.tx.is_closed()
    }

    fn deliver(&self, event: SourceEvent) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(event).is_ok()
    }
}

/// Cancellation token for an active source.
///
/// Cancelling is idempotent and also happens on drop.
#[derive(Debug)]
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Bind a spawned source task to the sink it delivers into.
    #[must_use]
    pub fn new(sink: &SampleSink, task: JoinHandle<()>) -> Self {
        Self {
            cancelled: Arc::clone(&sink.cancelled),
            task: Some(task),
        }
    }

    /// Stop all further deliveries and abort the source task.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Location subscription cancelled");
        }
    }

    /// Whether [`cancel`](Self::cancel) has run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A producer of location samples.
pub trait LocationSource: Send {
    /// Short name for logs.
    fn kind(&self) -> &'static str;

    /// Start producing samples into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if the source cannot start.
    fn subscribe(&mut self, sink: SampleSink) -> Result<Subscription, SourceError>;
}

fn runtime() -> Result<tokio::runtime::Handle, SourceError> {
    tokio::runtime::Handle::try_current()
        .map_err(|_| SourceError::unavailable("no async runtime to drive the source"))
}

// =============================================================================
// SIMULATED SOURCE
// =============================================================================

/// Parameters of the simulated countdown feed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Distance reported before the first tick, in meters.
    pub start_distance_m: f64,
    /// Decrease per tick, in meters.
    pub step_m: f64,
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            start_distance_m: 600.0,
            step_m: 10.0,
            interval: Duration::from_secs(1),
        }
    }
}

/// Synthetic feed counting the distance down until it crosses the threshold.
///
/// Emits one [`LocationSample::Distance`] per tick, the first one interval
/// after subscribing. After the first sample below the threshold it reports
/// [`SourceEvent::Finished`] and stops.
#[derive(Debug, Clone)]
pub struct SimulatedSource {
    settings: SimulationSettings,
    threshold_m: f64,
}

impl SimulatedSource {
    /// Create a simulated feed that stops once below `threshold_m`.
    #[must_use]
    pub const fn new(settings: SimulationSettings, threshold_m: f64) -> Self {
        Self {
            settings,
            threshold_m,
        }
    }
}

impl LocationSource for SimulatedSource {
    fn kind(&self) -> &'static str {
        "simulated"
    }

    fn subscribe(&mut self, sink: SampleSink) -> Result<Subscription, SourceError> {
        let handle = runtime()?;
        let SimulationSettings {
            start_distance_m,
            step_m,
            interval,
        } = self.settings.clone();
        let threshold_m = self.threshold_m;

        let task_sink = sink.clone();
        let task = handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            let mut distance = start_distance_m;
            loop {
                ticker.tick().await;
                distance -= step_m;
                if !task_sink.sample(LocationSample::Distance(distance)) {
                    break;
                }
                if distance < threshold_m {
                    debug!(distance, "Simulated feed crossed the threshold");
                    task_sink.finished();
                    break;
                }
            }
        });

        info!(
            start_distance_m,
            step_m,
            interval_ms = interval.as_millis(),
            "Simulated location feed started"
        );
        Ok(Subscription::new(&sink, task))
    }
}

// =============================================================================
// LIVE SOURCE
// =============================================================================

/// Watch options passed to the positioning provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionOptions {
    /// Ask the provider for its most accurate mode.
    pub high_accuracy: bool,
    /// Report [`AcquisitionError::Timeout`] when no fix arrives for this long.
    pub timeout: Duration,
    /// Oldest acceptable fix, measured from the start of the watch.
    pub maximum_age: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(5),
            maximum_age: Duration::ZERO,
        }
    }
}

impl PositionOptions {
    /// Whether `fix` predates the watch by more than `maximum_age`.
    #[must_use]
    pub fn is_stale(&self, fix: &PositionFix, watch_started: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(self.maximum_age)
            .is_ok_and(|max_age| fix.timestamp < watch_started - max_age)
    }
}

/// Items a provider delivers while watching.
pub type FixResult = Result<PositionFix, AcquisitionError>;

/// Platform continuous-positioning capability.
pub trait PositionProvider: Send + Sync {
    /// Begin watching. Fixes arrive on the returned receiver until the
    /// provider ends the watch (closing the channel) or the receiver is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Unavailable`] if positioning cannot start.
    fn watch(&self, options: &PositionOptions) -> Result<mpsc::Receiver<FixResult>, SourceError>;
}

/// Live positioning feed.
///
/// Forwards every fresh fix as a [`LocationSample::Position`]. Provider
/// errors and acquisition timeouts go to the sink's error channel without
/// retry; the watch continues either way.
pub struct LiveSource {
    provider: Arc<dyn PositionProvider>,
    options: PositionOptions,
}

impl LiveSource {
    /// Wrap a provider with the given watch options.
    #[must_use]
    pub fn new(provider: Arc<dyn PositionProvider>, options: PositionOptions) -> Self {
        Self { provider, options }
    }
}

impl LocationSource for LiveSource {
    fn kind(&self) -> &'static str {
        "live"
    }

    fn subscribe(&mut self, sink: SampleSink) -> Result<Subscription, SourceError> {
        let handle = runtime()?;
        let mut fixes = self.provider.watch(&self.options)?;
        let options = self.options.clone();
        let watch_started = Utc::now();
        let timeout_ms = u64::try_from(options.timeout.as_millis()).unwrap_or(u64::MAX);

        let task_sink = sink.clone();
        let task = handle.spawn(async move {
            let mut stale_reported = false;
            loop {
                let delivered = match timeout(options.timeout, fixes.recv()).await {
                    Ok(Some(Ok(fix))) => {
                        if options.is_stale(&fix, watch_started) {
                            if stale_reported {
                                debug!(timestamp = %fix.timestamp, "Discarding cached position fix");
                            } else {
                                warn!(
                                    timestamp = %fix.timestamp,
                                    %watch_started,
                                    "Discarding position fixes older than the watch"
                                );
                                stale_reported = true;
                            }
                            continue;
                        }
                        if fix.latitude.is_finite() && fix.longitude.is_finite() {
                            task_sink.sample(LocationSample::Position(fix))
                        } else {
                            task_sink.error(AcquisitionError::PositionUnavailable {
                                message: "fix has non-finite coordinates".to_string(),
                            })
                        }
                    }
                    Ok(Some(Err(error))) => task_sink.error(error),
                    Ok(None) => {
                        task_sink.finished();
                        break;
                    }
                    Err(_) => task_sink.error(AcquisitionError::Timeout { timeout_ms }),
                };
                if !delivered {
                    break;
                }
            }
        });

        info!(
            high_accuracy = self.options.high_accuracy,
            timeout_ms, "Live location watch started"
        );
        Ok(Subscription::new(&sink, task))
    }
}

// =============================================================================
// PROVIDERS
// =============================================================================

/// In-process positioning feed.
///
/// Host code pushes fixes; whichever watch is current receives them. Starting
/// a new watch replaces the previous one.
#[derive(Clone, Default)]
pub struct ChannelPositionProvider {
    watcher: Arc<Mutex<Option<mpsc::Sender<FixResult>>>>,
}

impl ChannelPositionProvider {
    /// Create a provider with no active watch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a fix to the current watch.
    ///
    /// Returns `false` if nobody is watching, or if the watch already has
    /// 64 fixes queued; the fix is dropped in that case.
    pub fn push(&self, fix: PositionFix) -> bool {
        self.send(Ok(fix))
    }

    /// Push an acquisition failure to the current watch.
    pub fn push_error(&self, error: AcquisitionError) -> bool {
        self.send(Err(error))
    }

    /// End the current watch.
    pub fn close(&self) {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether a watch is currently receiving fixes.
    #[must_use]
    pub fn is_watched(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, item: FixResult) -> bool {
        let guard = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(capacity = FIX_BUFFER, "Position watch is full; dropping fix");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

impl PositionProvider for ChannelPositionProvider {
    fn watch(&self, _options: &PositionOptions) -> Result<mpsc::Receiver<FixResult>, SourceError> {
        let (tx, rx) = mpsc::channel(FIX_BUFFER);
        *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(rx)
    }
}

/// Positioning from newline-delimited JSON [`PositionFix`] records.
///
/// Suits piping a GPS daemon's output into the process. Lines that fail to
/// parse surface as [`AcquisitionError::PositionUnavailable`]; end of input
/// ends the watch. The input can be watched only once.
pub struct JsonLinesPositionProvider {
    input: Mutex<Option<Box<dyn AsyncRead + Send + Unpin>>>,
}

impl JsonLinesPositionProvider {
    /// Read fixes from `input`.
    pub fn new(input: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(input))),
        }
    }

    /// Read fixes from the process's standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }

    /// Read fixes from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(file))
    }
}

impl PositionProvider for JsonLinesPositionProvider {
    fn watch(&self, _options: &PositionOptions) -> Result<mpsc::Receiver<FixResult>, SourceError> {
        let handle = runtime()?;
        let input = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| SourceError::unavailable("position input already consumed"))?;

        let (tx, rx) = mpsc::channel(FIX_BUFFER);
        handle.spawn(async move {
            let mut lines = BufReader::new(input).lines();
            loop {
                let item = match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => serde_json::from_str::<PositionFix>(&line).map_err(|e| {
                        AcquisitionError::PositionUnavailable {
                            message: format!("malformed fix: {e}"),
                        }
                    }),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Position input failed");
                        break;
                    }
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            debug!("Position input exhausted");
        });

        Ok(rx)
    }
}
