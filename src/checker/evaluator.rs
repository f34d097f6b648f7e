//! Multi-round liveness evaluation for a single proxy
//!
//! Runs the prober a fixed number of rounds against one address and
//! streams a progress event after each round.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, instrument};

use crate::checker::probe::Prober;
use crate::models::{CheckConfig, CheckEvent, ProxyAddress, ProxyEvaluation};

/// Evaluates one proxy over `round_count` sequential rounds
pub struct Evaluator {
    config: Arc<CheckConfig>,
    prober: Arc<Prober>,
    events: mpsc::Sender<CheckEvent>,
}

impl Evaluator {
    pub fn new(
        config: Arc<CheckConfig>,
        prober: Arc<Prober>,
        events: mpsc::Sender<CheckEvent>,
    ) -> Self {
        Evaluator {
            config,
            prober,
            events,
        }
    }

    /// Run all rounds against the address and return the finished evaluation
    ///
    /// Rounds are strictly sequential; the inter-round delay is skipped
    /// after the last round.
    #[instrument(skip(self, address), fields(proxy = %address))]
    pub async fn evaluate(&self, address: ProxyAddress) -> ProxyEvaluation {
        let proxy_str = address.to_string();
        let mut evaluation = ProxyEvaluation::new(address);

        for round in 1..=self.config.round_count {
            let result = self.prober.probe_once(&evaluation.address).await;
            let succeeded = result.succeeded;
            evaluation.record(result);

            // A dropped consumer must not stop the run.
            let _ = self
                .events
                .send(CheckEvent::Check {
                    proxy: proxy_str.clone(),
                    round,
                    total_rounds: self.config.round_count,
                    success: succeeded,
                    success_count: evaluation.success_count(),
                    results: evaluation.markers_joined(),
                    ip: evaluation.last_known_ip.clone(),
                })
                .await;

            if round < self.config.round_count {
                sleep(self.config.round_interval).await;
            }
        }

        debug!(
            success_count = evaluation.success_count(),
            live = evaluation.is_live(self.config.min_success_threshold),
            "Evaluation finished"
        );

        evaluation
    }
}
