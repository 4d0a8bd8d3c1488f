//! Link configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, Tf1Error};
use crate::protocol::frame::HEADER_LEN;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the TF1 link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Advertised local-name prefix of the target peripheral
    pub name_prefix: String,
    /// Largest outbound frame, header included
    pub request_buffer_capacity: usize,
    /// Inbound reassembly buffer capacity
    pub reassembly_capacity: usize,
    /// Maximum number of service ranges kept per connection
    pub max_services: usize,
    /// Bytes per characteristic write
    pub write_slice_size: usize,
    /// Pause between write slices of the same frame
    #[serde(with = "duration_ms")]
    pub write_slice_delay: Duration,
    /// Resends allowed for one chunk before the transfer gives up
    pub max_chunk_retries: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name_prefix: "NF-F2".to_string(),
            request_buffer_capacity: 600,
            reassembly_capacity: 1024,
            max_services: 16,
            write_slice_size: 100,
            write_slice_delay: Duration::from_millis(20),
            max_chunk_retries: 3,
        }
    }
}

impl LinkConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised name prefix to match
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Set the outbound frame capacity
    pub fn with_request_buffer_capacity(mut self, capacity: usize) -> Self {
        self.request_buffer_capacity = capacity;
        self
    }

    /// Set the inbound reassembly capacity
    pub fn with_reassembly_capacity(mut self, capacity: usize) -> Self {
        self.reassembly_capacity = capacity;
        self
    }

    /// Set the service list capacity
    pub fn with_max_services(mut self, max: usize) -> Self {
        self.max_services = max;
        self
    }

    /// Set the write slice size
    pub fn with_write_slice_size(mut self, size: usize) -> Self {
        self.write_slice_size = size;
        self
    }

    /// Set the pause between write slices
    pub fn with_write_slice_delay(mut self, delay: Duration) -> Self {
        self.write_slice_delay = delay;
        self
    }

    /// Set the per-chunk resend budget
    pub fn with_max_chunk_retries(mut self, retries: u32) -> Self {
        self.max_chunk_retries = retries;
        self
    }

    /// Check the configuration for values the link cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.name_prefix.is_empty() {
            return Err(Tf1Error::InvalidConfig("name_prefix must not be empty".into()));
        }
        if self.request_buffer_capacity <= HEADER_LEN {
            return Err(Tf1Error::InvalidConfig(format!(
                "request_buffer_capacity must exceed the {}-byte header",
                HEADER_LEN
            )));
        }
        if self.reassembly_capacity == 0 {
            return Err(Tf1Error::InvalidConfig("reassembly_capacity must be non-zero".into()));
        }
        if self.max_services == 0 {
            return Err(Tf1Error::InvalidConfig("max_services must be non-zero".into()));
        }
        if self.write_slice_size == 0 {
            return Err(Tf1Error::InvalidConfig("write_slice_size must be non-zero".into()));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
