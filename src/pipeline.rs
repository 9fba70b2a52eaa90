//! The scrape publishing pipeline.
//!
//! Job pollers enqueue records onto the bounded outbox; a single dispatcher
//! task dequeues them, serializes them and publishes to the stream. The
//! dispatcher is the only task that ever touches the transport session, so
//! publishes and reconnects never overlap. Disconnect notifications from the
//! transport client coalesce into at most one pending reconnect.
//!
//! Delivery is at most once: a record that fails to encode or publish is
//! dropped, counted and logged, never retried. Cancellation stops the
//! dispatcher immediately without draining the queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::metrics::PipelineMetrics;
use crate::outbox::{Outbox, RestartSignal};
use crate::poller::JobPoller;
use crate::record::Scrape;
use crate::transport::{Connector, DisconnectHandler, Session, TransportError};

/// Errors that terminate the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Session establishment failed, initially or on reconnect. The
    /// pipeline stops; recovery is the process supervisor's job.
    #[error("stream connection failed: {0}")]
    Connect(#[from] TransportError),
}

/// Flags shared between the dispatcher, the pollers and the management
/// surface. Plain atomics: a flip must be visible to readers on other tasks
/// without taking a lock.
#[derive(Debug, Default)]
struct SharedState {
    running: AtomicBool,
    paused: AtomicBool,
}

/// Clone-able view of a pipeline, safe to use from any task at any time,
/// including before the pipeline starts.
#[derive(Clone, Debug)]
pub struct PipelineHandle {
    state: Arc<SharedState>,
    metrics: Arc<PipelineMetrics>,
    outbox: Outbox,
}

impl PipelineHandle {
    /// Whether the pipeline has started. Never reset in normal operation;
    /// a best-effort liveness indicator for external queries.
    pub fn running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Current circuit breaker state.
    pub fn paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    /// Toggle the circuit breaker and return the new state.
    ///
    /// Only the pause gauge changes with it. The dispatcher keeps draining
    /// the outbox either way; it is the job pollers that stop producing
    /// while paused.
    pub fn flip_circuit_breaker(&self) -> bool {
        let paused = !self.state.paused.fetch_xor(true, Ordering::SeqCst);
        self.metrics.paused.set(i64::from(paused));

        if self.running() {
            tracing::warn!(paused, "Switching the circuit breaker");
        }

        paused
    }

    /// Queue used by producers to hand records to the dispatcher.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Pipeline instrumentation.
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}

/// The scrape publishing pipeline. Constructed once from a validated
/// configuration and run until the cancellation token fires; there is no
/// restart-after-stop path.
pub struct Pipeline<C: Connector> {
    config: AppConfig,
    connector: C,
    state: Arc<SharedState>,
    metrics: Arc<PipelineMetrics>,
    outbox: Outbox,
    outbox_rx: mpsc::Receiver<Scrape>,
    restart: RestartSignal,
    restart_rx: mpsc::Receiver<()>,
}

impl<C: Connector> Pipeline<C> {
    /// Build a pipeline from its collaborators. Nothing runs until
    /// [`Pipeline::run`] is called.
    pub fn new(config: AppConfig, connector: C, metrics: Arc<PipelineMetrics>) -> Self {
        let (outbox, outbox_rx) = Outbox::bounded(config.outbox_capacity);
        let (restart, restart_rx) = RestartSignal::new();

        Self {
            config,
            connector,
            state: Arc::new(SharedState::default()),
            metrics,
            outbox,
            outbox_rx,
            restart,
            restart_rx,
        }
    }

    /// Handle for producers and the management surface.
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
            outbox: self.outbox.clone(),
        }
    }

    /// Run the pipeline until cancellation or a fatal connection failure.
    ///
    /// Spawns one poller task per configured job, then enters the dispatcher
    /// loop. On cancellation the loop returns immediately without draining
    /// the queue; queued and in-flight records are lost.
    pub async fn run(self, token: CancellationToken) -> Result<(), PipelineError> {
        let handle = self.handle();
        let Pipeline {
            config,
            connector,
            state,
            metrics,
            outbox: _outbox,
            mut outbox_rx,
            restart,
            mut restart_rx,
        } = self;

        tracing::info!(
            jobs = config.jobs.len(),
            topic = %config.stream.topic,
            publisher = %config.publisher,
            "Scrape pipeline starting"
        );
        state.running.store(true, Ordering::SeqCst);

        let mut session = establish_session(&connector, &metrics, &restart).await?;

        metrics.jobs.set(config.jobs.len() as i64);
        metrics.paused.set(0);

        for (name, job) in &config.jobs {
            match JobPoller::new(
                name.as_str(),
                job.clone(),
                config.publisher.as_str(),
                handle.clone(),
            ) {
                Ok(poller) => {
                    tokio::spawn(poller.run(token.clone()));
                }
                Err(e) => {
                    tracing::error!(job = %name, error = %e, "Could not start job poller");
                    metrics.errors.inc();
                }
            }
        }

        loop {
            tokio::select! {
                Some(()) = restart_rx.recv() => {
                    session = establish_session(&connector, &metrics, &restart).await?;
                }

                Some(scrape) = outbox_rx.recv() => {
                    publish_record(&mut session, &config.stream.topic, &metrics, scrape).await;
                }

                () = token.cancelled() => {
                    tracing::info!("Scrape pipeline stopped");
                    return Ok(());
                }
            }
        }
    }
}

/// Open a transport session with the disconnect callback installed.
///
/// The callback runs on the transport client's own task: it counts the
/// error, logs the reason and requests a reconnect, nothing more. A failed
/// connect is fatal and ends the pipeline.
async fn establish_session<C: Connector>(
    connector: &C,
    metrics: &Arc<PipelineMetrics>,
    restart: &RestartSignal,
) -> Result<C::Session, PipelineError> {
    let metrics = Arc::clone(metrics);
    let restart = restart.clone();
    let on_disconnect: DisconnectHandler = Arc::new(move |reason| {
        metrics.errors.inc();
        tracing::error!(error = %reason, "Stream connection lost, requesting reconnect");
        restart.notify();
    });

    match connector.connect(on_disconnect).await {
        Ok(session) => Ok(session),
        Err(e) => {
            tracing::error!(error = %e, "Could not establish stream connection");
            Err(PipelineError::Connect(e))
        }
    }
}

/// Publish one record. Failures drop the record: delivery is at most once
/// and the pollers will produce a fresh batch next interval.
async fn publish_record<S: Session>(
    session: &mut S,
    topic: &str,
    metrics: &PipelineMetrics,
    scrape: Scrape,
) {
    let _timer = metrics.publish_duration.start_timer();

    let payload = match serde_json::to_vec(&scrape) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(job = %scrape.job, error = %e, "Could not encode scrape record");
            metrics.errors.inc();
            return;
        }
    };

    if let Err(e) = session.publish(topic, &payload).await {
        tracing::error!(job = %scrape.job, error = %e, "Could not publish scrape record");
        metrics.errors.inc();
        return;
    }

    metrics.published.inc();
    tracing::debug!(
        job = %scrape.job,
        topic,
        bytes = payload.len(),
        "Published scrape record"
    );
}
