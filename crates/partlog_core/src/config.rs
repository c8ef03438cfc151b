//! Log and counter configuration.

use crate::wal::CURRENT_FORMAT_VERSION;

/// Configuration for the write-ahead log.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Size at which the active segment is rotated.
    pub segment_size: u64,

    /// Whether to zero-fill the active segment up to `segment_size` when it
    /// is created.
    pub preallocate: bool,

    /// Whether to flush after every append (safer but slower).
    pub sync_on_write: bool,

    /// Initial read buffer for segment readers; grows for larger records.
    pub read_buffer_size: usize,

    /// Record format version written into headers of new segments.
    pub format_version: u16,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            segment_size: 64 * 1024 * 1024, // 64 MB
            preallocate: false,
            sync_on_write: false,
            read_buffer_size: 64 * 1024,
            format_version: CURRENT_FORMAT_VERSION,
        }
    }
}

impl WalConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment rotation size.
    #[must_use]
    pub const fn segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    /// Sets whether new segments are zero-filled up front.
    #[must_use]
    pub const fn preallocate(mut self, value: bool) -> Self {
        self.preallocate = value;
        self
    }

    /// Sets whether to flush after every append.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the initial reader buffer size.
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the record format version for new segments.
    #[must_use]
    pub const fn format_version(mut self, version: u16) -> Self {
        self.format_version = version;
        self
    }
}

/// Configuration for partition update counters.
#[derive(Debug, Clone)]
pub struct CounterConfig {
    /// Hard limit on recorded gaps; recording one more is an error.
    pub max_gaps: usize,

    /// Gap count at which a warning is logged.
    pub warn_gaps: usize,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            max_gaps: 10_000,
            warn_gaps: 1_000,
        }
    }
}

impl CounterConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hard gap limit.
    #[must_use]
    pub const fn max_gaps(mut self, value: usize) -> Self {
        self.max_gaps = value;
        self
    }

    /// Sets the warning threshold.
    #[must_use]
    pub const fn warn_gaps(mut self, value: usize) -> Self {
        self.warn_gaps = value;
        self
    }
}
