use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::CheckerConfig;
use crate::models::ProxyAddress;

/// Immutable configuration for one verification run
///
/// Built once per request and shared read-only (via `Arc`) across all
/// concurrent evaluations.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// URL fetched through each proxy
    pub target_url: String,
    /// Number of probe rounds per proxy (≥ 1)
    pub round_count: u32,
    /// Delay between consecutive rounds
    pub round_interval: Duration,
    /// A proxy is live only with strictly more successes than this
    pub min_success_threshold: u32,
    /// Hard deadline for a single round
    pub probe_timeout: Duration,
}

/// Outcome of a single probe round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundResult {
    pub succeeded: bool,
    pub discovered_ip: Option<String>,
}

impl RoundResult {
    pub fn success(discovered_ip: Option<String>) -> Self {
        RoundResult {
            succeeded: true,
            discovered_ip,
        }
    }

    pub fn failure() -> Self {
        RoundResult {
            succeeded: false,
            discovered_ip: None,
        }
    }
}

/// Accumulated result of all rounds against one proxy
#[derive(Debug, Clone)]
pub struct ProxyEvaluation {
    pub address: ProxyAddress,
    pub rounds: Vec<RoundResult>,
    pub last_known_ip: Option<String>,
}

impl ProxyEvaluation {
    pub fn new(address: ProxyAddress) -> Self {
        ProxyEvaluation {
            address,
            rounds: Vec::new(),
            last_known_ip: None,
        }
    }

    /// Record one completed round; later discovered IPs overwrite earlier ones
    pub fn record(&mut self, round: RoundResult) {
        if let Some(ip) = &round.discovered_ip {
            self.last_known_ip = Some(ip.clone());
        }
        self.rounds.push(round);
    }

    /// Number of successful rounds so far
    pub fn success_count(&self) -> u32 {
        self.rounds.iter().filter(|r| r.succeeded).count() as u32
    }

    /// Liveness verdict: strictly more successes than the threshold
    pub fn is_live(&self, min_success_threshold: u32) -> bool {
        self.success_count() > min_success_threshold
    }

    /// One marker per round, in order
    pub fn markers(&self) -> Vec<String> {
        self.rounds
            .iter()
            .map(|r| if r.succeeded { "✓" } else { "✗" }.to_string())
            .collect()
    }

    /// Markers joined for display, e.g. `✓ ✗ ✓`
    pub fn markers_joined(&self) -> String {
        self.markers().join(" ")
    }
}

/// Final live/dead entry in the run summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyOutcome {
    pub proxy: String,
    pub ip: Option<String>,
}

/// Aggregated outcome of a full run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub live: Vec<ProxyOutcome>,
    pub die: Vec<ProxyOutcome>,
}

impl RunSummary {
    /// File an outcome on exactly one side of the summary
    pub fn record(&mut self, proxy: String, ip: Option<String>, is_live: bool) {
        let outcome = ProxyOutcome { proxy, ip };
        if is_live {
            self.live.push(outcome);
        } else {
            self.die.push(outcome);
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn die_count(&self) -> usize {
        self.die.len()
    }
}

/// Progress events streamed to the client, tagged on `type`
///
/// Field names follow the wire format the front-end consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckEvent {
    Start {
        total: usize,
        #[serde(rename = "checkTimes")]
        check_times: u32,
        /// Round interval in seconds
        interval: f64,
        #[serde(rename = "minSuccess")]
        min_success: u32,
        #[serde(rename = "targetUrl")]
        target_url: String,
    },
    Check {
        proxy: String,
        /// 1-based round index
        round: u32,
        #[serde(rename = "totalRounds")]
        total_rounds: u32,
        success: bool,
        #[serde(rename = "successCount")]
        success_count: u32,
        results: String,
        ip: Option<String>,
    },
    Result {
        proxy: String,
        live: bool,
        #[serde(rename = "successCount")]
        success_count: u32,
        results: Vec<String>,
        ip: Option<String>,
        completed: usize,
        total: usize,
        #[serde(rename = "liveCount")]
        live_count: usize,
        #[serde(rename = "dieCount")]
        die_count: usize,
    },
    Complete {
        results: RunSummary,
    },
}

/// Body of `POST /api/check`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub proxies: Vec<String>,
    #[serde(default)]
    pub use_custom_domain: bool,
    #[serde(default)]
    pub custom_domain: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub check_times: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub check_interval: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub min_success: Option<u64>,
}

impl CheckRequest {
    /// Resolve the request into an immutable `CheckConfig`, applying
    /// service defaults for absent or non-numeric overrides
    pub fn resolve(&self, defaults: &CheckerConfig) -> CheckConfig {
        let target_url = if self.use_custom_domain && !self.custom_domain.trim().is_empty() {
            let domain = self.custom_domain.trim();
            if domain.starts_with("http") {
                domain.to_string()
            } else {
                format!("https://{}", domain)
            }
        } else {
            defaults.ip_echo_url.clone()
        };

        CheckConfig {
            target_url,
            round_count: self
                .check_times
                .map(|n| n as u32)
                .filter(|&n| n >= 1)
                .unwrap_or(defaults.default_rounds),
            round_interval: Duration::from_millis(
                self.check_interval.unwrap_or(defaults.default_interval_ms),
            ),
            min_success_threshold: self
                .min_success
                .map(|n| n as u32)
                .unwrap_or(defaults.default_min_success),
            probe_timeout: defaults.probe_timeout(),
        }
    }
}

/// Accept numbers, numeric strings, or anything else as absent
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}
