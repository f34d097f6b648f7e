//! Bounded-concurrency batch scheduler
//!
//! Partitions the proxy list into fixed-size windows. Windows run
//! strictly in order; inside a window every evaluation runs
//! concurrently and the window drains completely before the next one
//! starts, which caps the number of probes in flight.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::checker::evaluator::Evaluator;
use crate::checker::probe::Prober;
use crate::models::{CheckConfig, CheckEvent, ProxyAddress, RunSummary};

/// Drives a full verification run and aggregates the summary
pub struct Scheduler {
    config: Arc<CheckConfig>,
    window_size: usize,
    events: mpsc::Sender<CheckEvent>,
}

impl Scheduler {
    pub fn new(
        config: Arc<CheckConfig>,
        window_size: usize,
        events: mpsc::Sender<CheckEvent>,
    ) -> Self {
        Scheduler {
            config,
            window_size: window_size.max(1),
            events,
        }
    }

    /// Process every proxy and return the final summary
    ///
    /// The summary and running counters are only touched by this task,
    /// as each evaluation future resolves.
    #[instrument(skip(self, prober, proxies), fields(total = proxies.len()))]
    pub async fn run(&self, prober: Arc<Prober>, proxies: Vec<ProxyAddress>) -> RunSummary {
        let total = proxies.len();

        let _ = self
            .events
            .send(CheckEvent::Start {
                total,
                check_times: self.config.round_count,
                interval: self.config.round_interval.as_millis() as f64 / 1000.0,
                min_success: self.config.min_success_threshold,
                target_url: self.config.target_url.clone(),
            })
            .await;

        info!(
            total,
            window_size = self.window_size,
            target = %self.config.target_url,
            "Starting check run"
        );

        let mut summary = RunSummary::default();
        let mut completed = 0usize;

        for window in proxies.chunks(self.window_size) {
            let mut evaluations = futures::stream::iter(window.iter().cloned().map(|address| {
                let evaluator = Evaluator::new(
                    self.config.clone(),
                    prober.clone(),
                    self.events.clone(),
                );
                async move { evaluator.evaluate(address).await }
            }))
            .buffer_unordered(window.len());

            while let Some(evaluation) = evaluations.next().await {
                completed += 1;

                let proxy_str = evaluation.address.to_string();
                let is_live = evaluation.is_live(self.config.min_success_threshold);
                summary.record(proxy_str.clone(), evaluation.last_known_ip.clone(), is_live);

                let _ = self
                    .events
                    .send(CheckEvent::Result {
                        proxy: proxy_str,
                        live: is_live,
                        success_count: evaluation.success_count(),
                        results: evaluation.markers(),
                        ip: evaluation.last_known_ip.clone(),
                        completed,
                        total,
                        live_count: summary.live_count(),
                        die_count: summary.die_count(),
                    })
                    .await;
            }
        }

        info!(
            live = summary.live_count(),
            dead = summary.die_count(),
            "Check run complete"
        );

        let _ = self
            .events
            .send(CheckEvent::Complete {
                results: summary.clone(),
            })
            .await;

        summary
    }
}
