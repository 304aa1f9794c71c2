//! Kafka connection settings.
//!
//! One `KafkaSettings` value carries everything needed to build both the
//! read-committed consumer and the transactional producer.

use rdkafka::config::ClientConfig;
use std::env;
use std::str::FromStr;

use crate::errors::ClientError;

pub const DEFAULT_BROKER: &str = "localhost:9092";
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 45_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 300_000;
pub const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
pub const DEFAULT_AUTO_OFFSET_RESET: &str = "earliest";
pub const DEFAULT_SASL_MECHANISM: &str = "PLAIN";
pub const DEFAULT_SASL_SECURITY_PROTOCOL: &str = "SASL_PLAINTEXT";

/// Idempotent producers allow at most 5 in-flight requests per connection.
pub const MAX_IN_FLIGHT_REQUESTS: u32 = 5;
pub const MAX_MESSAGE_BYTES: u32 = 10 * 1024 * 1024;

/// Configuration shared by the consumer and the transactional producer.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    /// Kafka broker address (e.g., "localhost:9092")
    pub broker: String,
    /// SASL username (enables SASL if set together with the password)
    pub username: Option<String>,
    pub password: Option<String>,
    pub sasl_mechanism: String,
    pub security_protocol: String,
    /// Custom CA certificate in PEM format
    pub ssl_ca_pem: Option<String>,
    pub session_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub socket_timeout_ms: u64,
    pub transaction_timeout_ms: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub auto_offset_reset: String,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER)
    }
}

impl KafkaSettings {
    /// Settings for `broker` with every other value at its default.
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            username: None,
            password: None,
            sasl_mechanism: DEFAULT_SASL_MECHANISM.to_string(),
            security_protocol: DEFAULT_SASL_SECURITY_PROTOCOL.to_string(),
            ssl_ca_pem: None,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            max_poll_interval_ms: DEFAULT_MAX_POLL_INTERVAL_MS,
            socket_timeout_ms: DEFAULT_SOCKET_TIMEOUT_MS,
            transaction_timeout_ms: DEFAULT_TRANSACTION_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            auto_offset_reset: DEFAULT_AUTO_OFFSET_RESET.to_string(),
        }
    }

    /// Create settings from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKER` - Broker address
    /// - `KAFKA_USERNAME` / `KAFKA_PASSWORD` - SASL credentials (optional)
    /// - `KAFKA_SASL_MECHANISM` / `KAFKA_SECURITY_PROTOCOL` - SASL setup
    /// - `KAFKA_SSL_CA_PEM` - Custom CA cert in PEM format (optional)
    /// - `KAFKA_SESSION_TIMEOUT_MS`, `KAFKA_HEARTBEAT_INTERVAL_MS`,
    ///   `KAFKA_MAX_POLL_INTERVAL_MS`, `KAFKA_SOCKET_TIMEOUT_MS`
    /// - `KAFKA_TRANSACTION_TIMEOUT_MS`
    /// - `KAFKA_RETRIES`, `KAFKA_RETRY_BACKOFF_MS`
    /// - `KAFKA_AUTO_OFFSET_RESET`
    pub fn from_env() -> Result<Self, ClientError> {
        Ok(Self {
            broker: env::var("KAFKA_BROKER").unwrap_or_else(|_| DEFAULT_BROKER.to_string()),
            username: env::var("KAFKA_USERNAME").ok().filter(|v| !v.is_empty()),
            password: env::var("KAFKA_PASSWORD").ok().filter(|v| !v.is_empty()),
            sasl_mechanism: env::var("KAFKA_SASL_MECHANISM")
                .unwrap_or_else(|_| DEFAULT_SASL_MECHANISM.to_string()),
            security_protocol: env::var("KAFKA_SECURITY_PROTOCOL")
                .unwrap_or_else(|_| DEFAULT_SASL_SECURITY_PROTOCOL.to_string()),
            ssl_ca_pem: env::var("KAFKA_SSL_CA_PEM").ok(),
            session_timeout_ms: env_or("KAFKA_SESSION_TIMEOUT_MS", DEFAULT_SESSION_TIMEOUT_MS)?,
            heartbeat_interval_ms: env_or(
                "KAFKA_HEARTBEAT_INTERVAL_MS",
                DEFAULT_HEARTBEAT_INTERVAL_MS,
            )?,
            max_poll_interval_ms: env_or("KAFKA_MAX_POLL_INTERVAL_MS", DEFAULT_MAX_POLL_INTERVAL_MS)?,
            socket_timeout_ms: env_or("KAFKA_SOCKET_TIMEOUT_MS", DEFAULT_SOCKET_TIMEOUT_MS)?,
            transaction_timeout_ms: env_or(
                "KAFKA_TRANSACTION_TIMEOUT_MS",
                DEFAULT_TRANSACTION_TIMEOUT_MS,
            )?,
            retries: env_or("KAFKA_RETRIES", DEFAULT_RETRIES)?,
            retry_backoff_ms: env_or("KAFKA_RETRY_BACKOFF_MS", DEFAULT_RETRY_BACKOFF_MS)?,
            auto_offset_reset: env::var("KAFKA_AUTO_OFFSET_RESET")
                .unwrap_or_else(|_| DEFAULT_AUTO_OFFSET_RESET.to_string()),
        })
    }

    /// Set SASL credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Client configuration for the read-committed, manually committed
    /// consumer of `group_id`.
    pub fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.broker)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "true")
            .set("isolation.level", "read_committed")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("allow.auto.create.topics", "false")
            .set("session.timeout.ms", self.session_timeout_ms.to_string())
            .set("heartbeat.interval.ms", self.heartbeat_interval_ms.to_string())
            .set("max.poll.interval.ms", self.max_poll_interval_ms.to_string())
            .set("socket.timeout.ms", self.socket_timeout_ms.to_string());
        self.apply_security(&mut config);
        config
    }

    /// Client configuration for the transactional producer.
    ///
    /// `transactional_id` doubles as `client.id`; it must stay stable across
    /// restarts of the same logical worker so the broker can fence zombies
    /// and recover its open transaction.
    pub fn producer_config(&self, transactional_id: &str) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.broker)
            .set("client.id", transactional_id)
            .set("transactional.id", transactional_id)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("retries", self.retries.to_string())
            .set("retry.backoff.ms", self.retry_backoff_ms.to_string())
            .set(
                "max.in.flight.requests.per.connection",
                MAX_IN_FLIGHT_REQUESTS.to_string(),
            )
            .set("message.max.bytes", MAX_MESSAGE_BYTES.to_string())
            .set("transaction.timeout.ms", self.transaction_timeout_ms.to_string())
            .set("socket.timeout.ms", self.socket_timeout_ms.to_string());
        self.apply_security(&mut config);
        config
    }

    // If SASL credentials are provided, enable SASL.
    // Otherwise, use plaintext (for local development).
    fn apply_security(&self, config: &mut ClientConfig) {
        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            config
                .set("security.protocol", &self.security_protocol)
                .set("sasl.mechanisms", &self.sasl_mechanism)
                .set("sasl.username", username)
                .set("sasl.password", password);

            if let Some(ca_pem) = &self.ssl_ca_pem {
                config.set("ssl.ca.pem", ca_pem);
            }
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ClientError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ClientError::config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_config_is_read_committed_and_manual() {
        let config = KafkaSettings::new("broker:9092").consumer_config("acme.sdp.p1");

        assert_eq!(config.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(config.get("group.id"), Some("acme.sdp.p1"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("isolation.level"), Some("read_committed"));
        assert_eq!(config.get("allow.auto.create.topics"), Some("false"));
        assert_eq!(config.get("session.timeout.ms"), Some("45000"));
        assert_eq!(config.get("security.protocol"), None);
    }

    #[test]
    fn test_producer_config_is_transactional() {
        let config = KafkaSettings::new("broker:9092").producer_config("p1_input");

        assert_eq!(config.get("transactional.id"), Some("p1_input"));
        assert_eq!(config.get("client.id"), Some("p1_input"));
        assert_eq!(config.get("enable.idempotence"), Some("true"));
        assert_eq!(config.get("acks"), Some("all"));
        assert_eq!(config.get("max.in.flight.requests.per.connection"), Some("5"));
        assert_eq!(config.get("message.max.bytes"), Some("10485760"));
        assert_eq!(config.get("transaction.timeout.ms"), Some("60000"));
    }

    #[test]
    fn test_credentials_enable_sasl() {
        let settings = KafkaSettings::new("broker:9092")
            .with_credentials("user".to_string(), "secret".to_string());
        let config = settings.producer_config("p1_input");

        assert_eq!(config.get("security.protocol"), Some("SASL_PLAINTEXT"));
        assert_eq!(config.get("sasl.mechanisms"), Some("PLAIN"));
        assert_eq!(config.get("sasl.username"), Some("user"));
    }
}
