//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// EDStS API
// ============================================================================

/// Base URL of the EDStS service.
pub const API_BASE_URL: &str = "https://edsts.7thseraph.org";

/// Path of the key verification endpoint (GET, `?key=`).
pub const VERIFY_PATH: &str = "/api/auth/verify";

/// Path of the journal submission endpoint (POST, JSON body).
pub const JOURNAL_PATH: &str = "/api/journal/event";

/// Path of the user registration page (Discord OAuth).
pub const REGISTER_PATH: &str = "/api/auth/register";

/// Namespace tag that prefixes every permission header.
pub const PERMISSION_NAMESPACE: &str = "EDStS";

/// Timeout for a single key verification request (seconds).
pub const VERIFY_TIMEOUT_SECS: u64 = 5;

/// Timeout for a single journal submission (seconds).
pub const SUBMIT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Scheduling
// ============================================================================

/// Interval between scheduled key verifications (seconds). 600 = 10 minutes.
pub const VERIFY_INTERVAL_SECS: u64 = 600;

/// Random jitter added to each verification rearm (seconds). 0 = fixed interval.
pub const VERIFY_JITTER_SECS: u64 = 0;

/// Maximum time a worker waits on its queue before re-polling (seconds).
pub const QUEUE_POLL_INTERVAL_SECS: u64 = 5;

/// Pause after a failed or unauthorized submission (seconds).
pub const FAILURE_BACKOFF_SECS: u64 = 5;

/// How long `stop()` waits for each worker to finish (seconds).
pub const SHUTDOWN_JOIN_TIMEOUT_SECS: u64 = 2;

// ============================================================================
// Configuration discovery
// ============================================================================

/// Environment variable holding the config file path.
pub const CONFIG_ENV_VAR: &str = "EDSTS_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "edsts_relay.toml";

/// Environment override for the API key.
pub const API_KEY_ENV_VAR: &str = "EDSTS_API_KEY";

/// Environment override for the comma-separated permission list.
pub const PERMISSIONS_ENV_VAR: &str = "EDSTS_PERMISSIONS";
