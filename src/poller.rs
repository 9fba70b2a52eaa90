//! Job pollers: the producer side of the pipeline.
//!
//! One poller task runs per configured collection job. Every interval tick
//! it fetches each target's measurement batch over HTTP, wraps the body in a
//! [`Scrape`] record and enqueues it. Enqueueing blocks while the outbox is
//! full, so a slow or down transport throttles polling instead of growing
//! memory.
//!
//! The poller honors the circuit breaker: while the pipeline is paused a
//! tick fetches nothing. A target that fails to fetch is logged and skipped;
//! the next interval tries again.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{JobConfig, TargetConfig};
use crate::pipeline::PipelineHandle;
use crate::record::Scrape;

/// Scrapes one collection job's targets on a fixed interval.
pub struct JobPoller {
    job: String,
    interval: Duration,
    targets: Vec<TargetConfig>,
    publisher: String,
    client: reqwest::Client,
    pipeline: PipelineHandle,
}

impl JobPoller {
    /// Build a poller for one job.
    ///
    /// # Errors
    /// Returns the underlying error if the HTTP client cannot be built.
    pub fn new(
        job: impl Into<String>,
        config: JobConfig,
        publisher: impl Into<String>,
        pipeline: PipelineHandle,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            job: job.into(),
            interval: config.interval,
            targets: config.targets,
            publisher: publisher.into(),
            client,
            pipeline,
        })
    }

    /// Poll until the token is cancelled.
    pub async fn run(self, token: CancellationToken) {
        tracing::info!(
            job = %self.job,
            targets = self.targets.len(),
            interval = ?self.interval,
            "Job poller started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        // A full outbox can stall a cycle past the interval; don't burst
        // to catch up afterwards.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.pipeline.paused() {
                        tracing::debug!(job = %self.job, "Circuit breaker engaged, skipping scrape");
                        continue;
                    }
                    if self.poll_targets().await.is_err() {
                        // Outbox gone: the pipeline has terminated.
                        tracing::warn!(job = %self.job, "Pipeline stopped, ending job poller");
                        return;
                    }
                }

                () = token.cancelled() => {
                    tracing::debug!(job = %self.job, "Job poller stopped");
                    return;
                }
            }
        }
    }

    /// Fetch every target once and enqueue the results.
    ///
    /// Returns `Err` only when the outbox has closed; fetch failures are
    /// logged and skipped.
    async fn poll_targets(&self) -> Result<(), crate::outbox::EnqueueError> {
        for target in &self.targets {
            let body = match self.fetch(target).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(
                        job = %self.job,
                        instance = %target.name,
                        url = %target.url,
                        error = %e,
                        "Scrape failed"
                    );
                    self.pipeline.metrics().errors.inc();
                    continue;
                }
            };

            let record = Scrape::new(&self.job, &target.name, &self.publisher, body);
            self.pipeline.outbox().enqueue(record).await?;

            tracing::debug!(
                job = %self.job,
                instance = %target.name,
                "Scrape queued for publishing"
            );
        }

        Ok(())
    }

    async fn fetch(&self, target: &TargetConfig) -> Result<Vec<u8>, reqwest::Error> {
        let response = self
            .client
            .get(&target.url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

impl std::fmt::Debug for JobPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPoller")
            .field("job", &self.job)
            .field("targets", &self.targets.len())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ManagementConfig, StreamConfig};
    use crate::metrics::PipelineMetrics;
    use crate::pipeline::Pipeline;
    use crate::transport::{Connector, DisconnectHandler, Session, TransportError};
    use async_trait::async_trait;
    use axum::{Router, routing::get};
    use std::sync::Arc;

    struct IdleConnector;

    struct IdleSession;

    #[async_trait]
    impl Session for IdleSession {
        async fn publish(&mut self, _topic: &str, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for IdleConnector {
        type Session = IdleSession;

        async fn connect(
            &self,
            _on_disconnect: DisconnectHandler,
        ) -> Result<Self::Session, TransportError> {
            Ok(IdleSession)
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            management: ManagementConfig::default(),
            stream: StreamConfig {
                url: "127.0.0.1:4222".to_string(),
                topic: "scrapes".to_string(),
                connect_timeout: Duration::from_secs(1),
            },
            publisher: "relay-test".to_string(),
            outbox_capacity: 16,
            jobs: Default::default(),
        }
    }

    /// Serve a fixed metrics body on a random port.
    async fn serve_fixture(body: &'static str) -> String {
        let router = Router::new().route("/metrics", get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/metrics")
    }

    fn poller_for(url: String, pipeline: PipelineHandle) -> JobPoller {
        JobPoller::new(
            "node_exporter",
            JobConfig {
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(2),
                targets: vec![TargetConfig {
                    name: "h1:9100".to_string(),
                    url,
                }],
            },
            "relay-test",
            pipeline,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_poll_fetches_and_enqueues() {
        let url = serve_fixture("up 1\n").await;

        let mut config = test_config();
        config.outbox_capacity = 1;
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let pipeline = Pipeline::new(config, IdleConnector, metrics);
        let handle = pipeline.handle();

        let poller = poller_for(url, handle.clone());
        poller.poll_targets().await.unwrap();

        // The single queue slot is taken by the scraped record: a further
        // enqueue blocks.
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            handle
                .outbox()
                .enqueue(Scrape::new("filler", "f", "p", Vec::new())),
        )
        .await;
        assert!(blocked.is_err());
        assert_eq!(handle.metrics().errors.get(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_counts_error() {
        // Nothing listens on this port.
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let pipeline = Pipeline::new(test_config(), IdleConnector, metrics);
        let handle = pipeline.handle();

        let poller = poller_for("http://127.0.0.1:1/metrics".to_string(), handle.clone());
        poller.poll_targets().await.unwrap();

        assert_eq!(handle.metrics().errors.get(), 1);
    }

    #[tokio::test]
    async fn test_paused_tick_produces_nothing() {
        let url = serve_fixture("up 1\n").await;

        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let pipeline = Pipeline::new(test_config(), IdleConnector, metrics);
        let handle = pipeline.handle();
        handle.flip_circuit_breaker();

        let poller = poller_for(url, handle.clone());
        let token = CancellationToken::new();
        let task = tokio::spawn(poller.run(token.clone()));

        // Let at least the first tick fire while paused.
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
        task.await.unwrap();

        // Queue still has full capacity: nothing was produced.
        for i in 0..16 {
            assert!(
                handle
                    .outbox()
                    .enqueue(Scrape::new("filler", format!("f{i}"), "p", Vec::new()))
                    .await
                    .is_ok()
            );
        }
        assert_eq!(handle.metrics().errors.get(), 0);
    }
}
