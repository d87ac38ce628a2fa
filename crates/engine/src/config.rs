//! Transfer and probe configuration.

use std::time::Duration;

use protocol::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};

/// Rates this build can run, highest preference first.
pub const SUPPORTED_BAUDRATES: &[u32] = &[
    6_000_000, 4_000_000, 3_000_000, 2_000_000, 1_728_000, 921_600, 460_800, 230_400, 115_200,
];

/// Invalid configuration values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Chunk size outside the protocol bounds.
    #[error("chunk size {0} outside [{MIN_CHUNK_SIZE}, {MAX_CHUNK_SIZE}]")]
    ChunkSize(u32),
    /// A timeout was zero.
    #[error("{0} must be non-zero")]
    ZeroTimeout(&'static str),
    /// The supported-rate list was empty.
    #[error("supported baudrate list is empty")]
    NoBaudrates,
}

/// Knobs of the file-transfer phase.
#[derive(Clone, Debug)]
pub struct TransferConfig {
    /// Chunk size before negotiation overrides it.
    pub chunk_size: u32,
    /// How long a serving side waits for the peer's next request.
    pub request_timeout: Duration,
    /// How long a requesting side waits for the matching reply.
    pub response_timeout: Duration,
    /// Write-and-wait retransmissions per chunk on the sending side.
    pub retry_count: u32,
    /// Request retries per chunk on the receiving side.
    pub max_retries: u32,
    /// Base of the exponential backoff between retries.
    pub backoff_base: Duration,
    /// Files at most this large are buffered whole; larger ones stream.
    pub max_cache_size: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            request_timeout: Duration::from_secs(300),
            response_timeout: Duration::from_secs(5),
            retry_count: 3,
            max_retries: 5,
            backoff_base: Duration::from_millis(100),
            max_cache_size: 4 * 1024 * 1024,
        }
    }
}

impl TransferConfig {
    /// Rejects values the protocol cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::ChunkSize(self.chunk_size));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("request_timeout"));
        }
        if self.response_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("response_timeout"));
        }
        Ok(())
    }

    /// Copy of this config with the negotiated chunk size applied.
    #[must_use]
    pub fn with_chunk_size(&self, chunk_size: u32) -> Self {
        Self {
            chunk_size,
            ..self.clone()
        }
    }
}

/// Knobs of the discovery-and-negotiation phase.
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Rates offered or accepted, highest preference first.
    pub supported_baudrates: Vec<u32>,
    /// Interval between PROBE_REQUEST attempts.
    pub probe_period: Duration,
    /// Total time the active side keeps probing (and the passive side listens).
    pub probe_total: Duration,
    /// Active-side wait for CAPABILITY_ACK.
    pub capability_timeout: Duration,
    /// Passive-side wait for CAPABILITY_NEGO.
    pub capability_wait: Duration,
    /// Active-side wait for SWITCH_ACK.
    pub switch_timeout: Duration,
    /// Passive-side wait for SWITCH_BAUDRATE.
    pub switch_wait: Duration,
    /// Settle delay announced in the switch order.
    pub switch_delay_ms: u16,
    /// Largest chunk the passive side will accept during negotiation.
    pub receiver_max_chunk: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            supported_baudrates: SUPPORTED_BAUDRATES.to_vec(),
            probe_period: Duration::from_secs(3),
            probe_total: Duration::from_secs(180),
            capability_timeout: Duration::from_secs(5),
            capability_wait: Duration::from_secs(10),
            switch_timeout: Duration::from_secs(2),
            switch_wait: Duration::from_secs(5),
            switch_delay_ms: 100,
            receiver_max_chunk: MAX_CHUNK_SIZE,
        }
    }
}

impl ProbeConfig {
    /// Rejects values the handshake cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_baudrates.is_empty() {
            return Err(ConfigError::NoBaudrates);
        }
        if self.probe_period.is_zero() {
            return Err(ConfigError::ZeroTimeout("probe_period"));
        }
        if self.probe_total.is_zero() {
            return Err(ConfigError::ZeroTimeout("probe_total"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        TransferConfig::default().validate().expect("transfer defaults");
        ProbeConfig::default().validate().expect("probe defaults");
    }

    #[test]
    fn chunk_size_bounds_are_enforced() {
        let mut config = TransferConfig::default();
        config.chunk_size = 256;
        assert_eq!(config.validate(), Err(ConfigError::ChunkSize(256)));
        config.chunk_size = 32_768;
        assert_eq!(config.validate(), Err(ConfigError::ChunkSize(32_768)));
    }

    #[test]
    fn empty_rate_list_is_rejected() {
        let mut config = ProbeConfig::default();
        config.supported_baudrates.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoBaudrates));
    }

    #[test]
    fn priority_list_is_descending() {
        let rates = SUPPORTED_BAUDRATES;
        assert!(rates.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(*rates.last().expect("non-empty"), 115_200);
    }
}
