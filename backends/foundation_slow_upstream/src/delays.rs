use std::time::Duration;

pub const SLOW_PROCESS_PATH: &str = "/slow-process";
pub const SLOW_API_PATH: &str = "/slow-api";

/// Simulated processing time, chosen by exact match on the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingDelay {
    /// `/slow-process`, 5 seconds
    SlowProcess,
    /// `/slow-api`, 3 seconds
    SlowApi,
    /// Every other path, 1 second
    Standard,
}

impl ProcessingDelay {
    #[must_use]
    pub fn for_path(path: &str) -> Self {
        match path {
            SLOW_PROCESS_PATH => Self::SlowProcess,
            SLOW_API_PATH => Self::SlowApi,
            _ => Self::Standard,
        }
    }

    #[must_use]
    pub fn seconds(self) -> u64 {
        match self {
            Self::SlowProcess => 5,
            Self::SlowApi => 3,
            Self::Standard => 1,
        }
    }

    #[must_use]
    pub fn duration(self) -> Duration {
        Duration::from_secs(self.seconds())
    }
}
