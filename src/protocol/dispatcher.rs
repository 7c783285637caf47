use crate::config::{PoolConfig, RedeliveryConfig};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::channel::Channel;
use crate::protocol::message::{Alert, Severity};
use crate::service::delivery;
use crate::utils::metrics::Metrics;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// What happened to a submitted alert.
///
/// Submissions never fail from the caller's point of view; this only reports
/// whether the alert made it into the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Accepted; a worker will attempt delivery
    Queued,
    /// Queue full; held for a later redelivery attempt
    Buffered,
    /// Queue full; dropped
    Rejected,
    /// Empty message; nothing to send
    Ignored,
    /// Dispatcher already shut down; dropped
    Closed,
}

impl Submission {
    pub fn is_queued(self) -> bool {
        matches!(self, Submission::Queued)
    }
}

/// One pending send
struct DeliveryJob {
    channel: Arc<Channel>,
    alert: Alert,
}

enum Enqueue {
    Queued,
    Full(DeliveryJob),
    Closed(DeliveryJob),
}

/// Shared by every worker. Holds no sender, so the queue closes once the
/// dispatcher is gone.
struct WorkerContext {
    receiver: tokio::sync::Mutex<mpsc::Receiver<DeliveryJob>>,
    metrics: Arc<Metrics>,
    workers: AtomicUsize,
}

struct Inner {
    sender: RwLock<Option<mpsc::Sender<DeliveryJob>>>,
    context: Arc<WorkerContext>,
    handle: Handle,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    config: PoolConfig,
    redelivery: Option<RedeliveryBuffer>,
}

/// Bounded worker pool delivering alerts in the background.
///
/// Cheap to clone; clones share one queue and one set of workers, so a single
/// dispatcher can serve any number of channels. Must be created inside a Tokio
/// runtime.
///
/// Delivery is best effort and at most once: no acknowledgment, no retry of
/// failed sends, and no ordering between alerts.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Start `core_workers` workers draining a queue of `queue_capacity`.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ProtocolError::InvalidConfiguration(errors.join("; ")));
        }
        let handle = Handle::try_current().map_err(|_| ProtocolError::RuntimeUnavailable)?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let context = Arc::new(WorkerContext {
            receiver: tokio::sync::Mutex::new(rx),
            metrics: Arc::new(Metrics::new()),
            workers: AtomicUsize::new(0),
        });
        let redelivery = config
            .redelivery
            .enabled
            .then(|| RedeliveryBuffer::new(config.redelivery.clone()));

        let inner = Arc::new(Inner {
            sender: RwLock::new(Some(tx)),
            context,
            handle,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config,
            redelivery,
        });

        for _ in 0..inner.config.core_workers {
            inner.context.workers.fetch_add(1, Ordering::SeqCst);
            inner.spawn_worker(None, None);
        }

        info!(
            core_workers = inner.config.core_workers,
            max_workers = inner.config.max_workers,
            queue_capacity = inner.config.queue_capacity,
            redelivery = inner.redelivery.is_some(),
            "Dispatcher started"
        );

        Ok(Self { inner })
    }

    /// Queue an alert for `channel`. Never waits and never errors.
    ///
    /// Empty messages are ignored. When the queue is full an extra worker is
    /// started if the pool is below `max_workers`; otherwise the alert is
    /// buffered for redelivery (when enabled) or dropped.
    pub fn submit(
        &self,
        channel: &Arc<Channel>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Submission {
        let message = message.into();
        if message.is_empty() {
            debug!("Ignoring empty alert message");
            return Submission::Ignored;
        }
        self.submit_alert(channel, Alert::new(severity, message))
    }

    /// Queue a prepared alert. See [`Dispatcher::submit`].
    pub fn submit_alert(&self, channel: &Arc<Channel>, alert: Alert) -> Submission {
        let metrics = &self.inner.context.metrics;
        metrics.alert_submitted();

        let job = DeliveryJob {
            channel: Arc::clone(channel),
            alert,
        };

        let job = match self.inner.enqueue(job) {
            Enqueue::Queued => return Submission::Queued,
            Enqueue::Closed(_) => return self.inner.closed(),
            Enqueue::Full(job) => job,
        };

        match self.inner.try_spawn_extra_worker(job) {
            Ok(()) => {
                metrics.alert_queued();
                Submission::Queued
            }
            Err(job) => self.inner.reject(job),
        }
    }

    /// Stop accepting alerts, let queued ones finish and wait for the workers.
    ///
    /// Buffered alerts get one last chance to enter the queue; those that do
    /// not fit are counted as rejected.
    pub async fn shutdown(&self) {
        self.inner.flush_redelivery();
        match self.inner.sender.write() {
            Ok(mut sender) => {
                sender.take();
            }
            Err(_) => warn!("{}", constants::ERR_DISPATCHER_WRITE_LOCK),
        }
        if let Some(buffer) = &self.inner.redelivery {
            self.inner.abandon(buffer.drain());
        }
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("Dispatcher stopped");
    }

    /// Delivery counters for this dispatcher
    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.inner.context.metrics)
    }

    /// Workers currently running
    pub fn worker_count(&self) -> usize {
        self.inner.context.workers.load(Ordering::SeqCst)
    }

    /// Alerts waiting in the queue
    pub fn pending(&self) -> usize {
        match self.inner.sender.read() {
            Ok(guard) => guard
                .as_ref()
                .map(|tx| tx.max_capacity() - tx.capacity())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Alerts held for redelivery
    pub fn buffered(&self) -> usize {
        self.inner
            .redelivery
            .as_ref()
            .map(RedeliveryBuffer::len)
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.worker_count())
            .field("pending", &self.pending())
            .field("buffered", &self.buffered())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Inner {
    fn enqueue(&self, job: DeliveryJob) -> Enqueue {
        let guard = match self.sender.read() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("{}", constants::ERR_DISPATCHER_READ_LOCK);
                return Enqueue::Closed(job);
            }
        };
        let Some(tx) = guard.as_ref() else {
            return Enqueue::Closed(job);
        };

        match tx.try_send(job) {
            Ok(()) => {
                self.context.metrics.alert_queued();
                Enqueue::Queued
            }
            Err(TrySendError::Full(job)) => Enqueue::Full(job),
            Err(TrySendError::Closed(job)) => Enqueue::Closed(job),
        }
    }

    /// Start an extra worker that runs `job` first, if the pool has room.
    fn try_spawn_extra_worker(&self, job: DeliveryJob) -> std::result::Result<(), DeliveryJob> {
        let workers = &self.context.workers;
        let mut current = workers.load(Ordering::SeqCst);
        loop {
            if current >= self.config.max_workers {
                return Err(job);
            }
            match workers.compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        debug!(workers = current + 1, "Queue full; starting extra worker");
        self.spawn_worker(Some(job), Some(self.config.worker_keep_alive));
        Ok(())
    }

    /// Caller must already have counted the worker in `context.workers`.
    fn spawn_worker(&self, first: Option<DeliveryJob>, keep_alive: Option<Duration>) {
        let context = Arc::clone(&self.context);
        self.tracker
            .spawn_on(run_worker(context, first, keep_alive), &self.handle);
    }

    fn reject(self: &Arc<Self>, job: DeliveryJob) -> Submission {
        if let Some(buffer) = &self.redelivery {
            match buffer.push(job) {
                Ok(()) => {
                    self.context.metrics.alert_buffered();
                    if self.is_closed() {
                        // shutdown drained the buffer between enqueue and push
                        self.abandon(buffer.drain());
                        return Submission::Closed;
                    }
                    debug!(buffered = buffer.len(), "Queue full; alert held for redelivery");
                    self.ensure_reaper();
                    return Submission::Buffered;
                }
                Err(job) => {
                    self.context.metrics.alert_rejected();
                    warn!(
                        address = %job.channel.address(),
                        severity = %job.alert.severity,
                        "Queue and redelivery buffer full; abandoning alert"
                    );
                    return Submission::Rejected;
                }
            }
        }

        self.context.metrics.alert_rejected();
        warn!(
            address = %job.channel.address(),
            severity = %job.alert.severity,
            error = %ProtocolError::QueueRejected,
            "Abandoning alert"
        );
        Submission::Rejected
    }

    fn is_closed(&self) -> bool {
        match self.sender.read() {
            Ok(guard) => guard.is_none(),
            Err(_) => true,
        }
    }

    /// Count alerts that will never be sent as rejected.
    fn abandon(&self, jobs: impl IntoIterator<Item = DeliveryJob>) {
        let mut count = 0u64;
        for _job in jobs {
            self.context.metrics.alert_rejected();
            count += 1;
        }
        if count > 0 {
            warn!(
                abandoned = count,
                error = %ProtocolError::DispatcherClosed,
                "Dropping buffered alerts"
            );
        }
    }

    fn closed(&self) -> Submission {
        warn!(error = %ProtocolError::DispatcherClosed, "Alert dropped");
        Submission::Closed
    }

    fn ensure_reaper(self: &Arc<Self>) {
        let Some(buffer) = &self.redelivery else {
            return;
        };
        if buffer.reaper_running.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Starting redelivery reaper");
        self.tracker.spawn_on(
            run_reaper(Arc::downgrade(self), self.shutdown.clone()),
            &self.handle,
        );
    }

    /// Move buffered alerts back into the queue; those that still do not fit
    /// stay buffered.
    fn flush_redelivery(&self) {
        let Some(buffer) = &self.redelivery else {
            return;
        };

        let mut jobs = buffer.drain().into_iter();
        while let Some(job) = jobs.next() {
            match self.enqueue(job) {
                Enqueue::Queued => self.context.metrics.alert_redelivered(),
                Enqueue::Full(job) => {
                    if buffer.push(job).is_err() {
                        self.context.metrics.alert_rejected();
                    }
                }
                Enqueue::Closed(job) => {
                    self.abandon(std::iter::once(job).chain(jobs.by_ref()));
                    return;
                }
            }
        }
    }
}

async fn run_worker(
    context: Arc<WorkerContext>,
    first: Option<DeliveryJob>,
    keep_alive: Option<Duration>,
) {
    if let Some(job) = first {
        execute(&context.metrics, job).await;
    }

    loop {
        let recv = async { context.receiver.lock().await.recv().await };
        let next = match keep_alive {
            // idle time spent waiting for the lock counts too
            Some(idle) => tokio::time::timeout(idle, recv).await.unwrap_or(None),
            None => recv.await,
        };

        match next {
            Some(job) => execute(&context.metrics, job).await,
            None => break,
        }
    }

    let remaining = context.workers.fetch_sub(1, Ordering::SeqCst) - 1;
    debug!(remaining, "Worker exiting");
}

async fn execute(metrics: &Arc<Metrics>, job: DeliveryJob) {
    match delivery::deliver(&job.channel, &job.alert, Some(Arc::clone(metrics))).await {
        Ok(bytes) => metrics.alert_delivered(bytes as u64),
        Err(e) => {
            let kind = e.kind();
            metrics.delivery_failed(kind);
            warn!(
                kind = %kind,
                error = %e,
                address = %job.channel.address(),
                service = %job.channel.service_name(),
                "Alert abandoned"
            );
        }
    }
}

/// Bounded FIFO of alerts the queue turned away.
struct RedeliveryBuffer {
    entries: Mutex<VecDeque<DeliveryJob>>,
    config: RedeliveryConfig,
    reaper_running: AtomicBool,
}

impl RedeliveryBuffer {
    fn new(config: RedeliveryConfig) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(config.capacity)),
            config,
            reaper_running: AtomicBool::new(false),
        }
    }

    fn push(&self, job: DeliveryJob) -> std::result::Result<(), DeliveryJob> {
        match self.entries.lock() {
            Ok(mut entries) if entries.len() < self.config.capacity => {
                entries.push_back(job);
                Ok(())
            }
            _ => Err(job),
        }
    }

    fn drain(&self) -> Vec<DeliveryJob> {
        match self.entries.lock() {
            Ok(mut entries) => entries.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Flush buffered alerts while there are any; exit after enough idle checks.
async fn run_reaper(inner: Weak<Inner>, shutdown: CancellationToken) {
    let mut idle_passes = 0u32;

    loop {
        let Some(strong) = inner.upgrade() else {
            return;
        };
        let Some(buffer) = &strong.redelivery else {
            return;
        };

        let pending = buffer.len();
        let pause = if pending > 0 {
            idle_passes = 0;
            buffer.config.flush_interval
        } else {
            idle_passes += 1;
            if idle_passes > buffer.config.max_idle_passes {
                buffer.reaper_running.store(false, Ordering::SeqCst);
                debug!("Redelivery reaper idle; exiting");
                // an alert may have been buffered after the length check
                if buffer.len() > 0 {
                    strong.ensure_reaper();
                }
                return;
            }
            buffer.config.idle_interval
        };
        drop(strong);

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(pause) => {}
        }

        if pending > 0 {
            match inner.upgrade() {
                Some(strong) => {
                    strong.flush_redelivery();
                    debug!(remaining = strong.redelivery.as_ref().map(RedeliveryBuffer::len), "Redelivery flush");
                }
                None => return,
            }
        }
    }
}
