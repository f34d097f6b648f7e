use crate::error::{PulseError, Result};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Checker engine configuration
    pub checker: CheckerConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Hard deadline for a single probe round, in seconds
    pub probe_timeout: u64,
    /// Maximum number of proxies evaluated concurrently
    pub window_size: usize,
    /// Default number of rounds per proxy
    pub default_rounds: u32,
    /// Default delay between rounds, in milliseconds
    pub default_interval_ms: u64,
    /// Default minimum success threshold (live requires strictly more successes)
    pub default_min_success: u32,
    /// IP-echo endpoint used when no custom domain is given
    pub ip_echo_url: String,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "3000").parse().map_err(|_| {
                    PulseError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            checker: CheckerConfig {
                probe_timeout: get_env_or("CHECK_TIMEOUT", "10").parse().map_err(|_| {
                    PulseError::InvalidConfig("CHECK_TIMEOUT must be a number of seconds".into())
                })?,
                window_size: get_env_or("CHECK_WINDOW_SIZE", "50")
                    .parse()
                    .ok()
                    .filter(|&n| n > 0)
                    .ok_or_else(|| {
                        PulseError::InvalidConfig(
                            "CHECK_WINDOW_SIZE must be a positive number".into(),
                        )
                    })?,
                default_rounds: get_env_or("CHECK_DEFAULT_ROUNDS", "5").parse().unwrap_or(5),
                default_interval_ms: get_env_or("CHECK_DEFAULT_INTERVAL_MS", "5000")
                    .parse()
                    .unwrap_or(5000),
                default_min_success: get_env_or("CHECK_DEFAULT_MIN_SUCCESS", "3")
                    .parse()
                    .unwrap_or(3),
                ip_echo_url: get_env_or("CHECK_IP_ECHO_URL", "https://ipconfig.io/json"),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl CheckerConfig {
    /// Probe deadline as a `Duration`
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout.max(1))
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "API_PORT",
        "API_HOST",
        "CORS_ORIGINS",
        "CHECK_TIMEOUT",
        "CHECK_WINDOW_SIZE",
        "CHECK_DEFAULT_ROUNDS",
        "CHECK_DEFAULT_INTERVAL_MS",
        "CHECK_DEFAULT_MIN_SUCCESS",
        "CHECK_IP_ECHO_URL",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.api.port, 3000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert!(config.api.cors_origins.is_empty());

        assert_eq!(config.checker.probe_timeout, 10);
        assert_eq!(config.checker.window_size, 50);
        assert_eq!(config.checker.default_rounds, 5);
        assert_eq!(config.checker.default_interval_ms, 5000);
        assert_eq!(config.checker.default_min_success, 3);
        assert_eq!(config.checker.ip_echo_url, "https://ipconfig.io/json");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("API_PORT", "9000");
        env::set_var("API_HOST", "127.0.0.1");
        env::set_var("CORS_ORIGINS", "https://a.example, https://b.example");
        env::set_var("CHECK_TIMEOUT", "5");
        env::set_var("CHECK_WINDOW_SIZE", "10");
        env::set_var("CHECK_DEFAULT_ROUNDS", "3");
        env::set_var("CHECK_IP_ECHO_URL", "https://echo.example/json");

        let config = Config::from_env().unwrap();

        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(
            config.api.cors_origins,
            vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ]
        );
        assert_eq!(config.checker.probe_timeout, 5);
        assert_eq!(config.checker.window_size, 10);
        assert_eq!(config.checker.default_rounds, 3);
        assert_eq!(config.checker.ip_echo_url, "https://echo.example/json");
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("API_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, PulseError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_zero_window_size_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("CHECK_WINDOW_SIZE", "0");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, PulseError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_api_addr() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();
        assert_eq!(config.api_addr(), "0.0.0.0:3000");
    }
}
