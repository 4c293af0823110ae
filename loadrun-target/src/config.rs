use std::time::Duration;

/// Maximum time to wait when acquiring the catalogue's read or write lock.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Address the demo target listens on unless told otherwise.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";
