//! Protocol timing constants.

use std::time::Duration;

/// Request/response wait on the indication stream.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Await-notification wait on the notification bus.
pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Server hello must arrive this soon after the client hello is sent.
pub const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded scan window when `keep_connection` is off.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Settle delay before asking the platform for connection priority.
pub const HIGH_PRIORITY_DELAY: Duration = Duration::from_millis(1);

/// Outer bound on the (best-effort) connection priority request.
pub const HIGH_PRIORITY_TIMEOUT: Duration = Duration::from_secs(2);

/// ATT header overhead subtracted from the MTU when chunking.
pub const ATT_HEADER_LEN: usize = 3;
