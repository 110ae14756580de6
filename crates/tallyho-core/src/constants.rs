//! Timing and sizing constants shared by the runtime components.

use embassy_time::Duration;

/// Highest camera number a tally can be assigned to.
pub const MAX_CAMERAS: u8 = 99;

/// Camera assigned on first run when nothing is stored.
pub const DEFAULT_CAMERA: u8 = 1;

/// Boot attempts allowed without reaching steady state before recovery.
pub const MAX_UNSUCCESSFUL_BOOTS: i32 = 3;

/// Socket read timeout; bounds how long one loop iteration can block.
pub const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Time allowed between server pings before the link is considered dead.
pub const PING_PERIOD: Duration = Duration::from_secs(10);

/// Pause after a ping expiry before reconnecting.
pub const PING_BACKOFF: Duration = Duration::from_secs(1);

/// Pause after a transport error before reconnecting.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// How long the identify screen stays up.
pub const IDENTIFY_DURATION: Duration = Duration::from_secs(4);

/// How long informational notices (link up, camera defaulted) stay up.
pub const INFO_NOTICE_DURATION: Duration = Duration::from_secs(2);

/// Hardware watchdog timeout. Every loop path feeds well inside this.
pub const WATCHDOG_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest single sleep between watchdog feeds.
pub const WATCHDOG_FEED_SLICE: Duration = Duration::from_secs(1);

/// Hold-off before resetting when the network link cannot be configured.
pub const LINK_FAILURE_HOLDOFF: Duration = Duration::from_secs(20);

/// Upper bound on waiting for the network link to come up.
pub const LINK_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting for the network link.
pub const LINK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest accepted protocol line, excluding the newline.
pub const MAX_LINE_LEN: usize = 1024;

/// Bytes pulled from the transport per read.
pub const READ_CHUNK_LEN: usize = 256;

/// Default switcher-feed server.
pub const DEFAULT_SERVER_HOST: &str = "192.168.2.6";
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default backlight level in percent.
pub const DEFAULT_BACKLIGHT_PCT: u8 = 100;

/// Share of the indicator filled while in preview, in percent.
pub const PREVIEW_FILL_PCT: u8 = 80;
