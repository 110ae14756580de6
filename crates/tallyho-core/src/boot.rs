//! Boot-loop watchdog.
//!
//! Runs once at power-on, before any networking or display setup. A counter
//! persisted under [`keys::BOOT_COUNTER`] records how many boots in a row
//! failed to reach a healthy loop iteration:
//!
//! | stored | meaning                          | written on boot |
//! |--------|----------------------------------|-----------------|
//! | `-2`   | never booted / reset by recovery | `0`             |
//! | `-1`   | previous boot reached the loop   | `0`             |
//! | `n≥0`  | `n` failed boots so far          | `n + 1`         |
//!
//! Once the incremented count exceeds [`MAX_UNSUCCESSFUL_BOOTS`] the counter
//! is reset to `-2` and the device drops into recovery mode instead of
//! launching the tally program. The new value is always written before the
//! program starts, so a crash during launch is visible on the next boot.

use log::{error, info, warn};

use crate::config::{ConfigStore, KeyValueStorage, StorageError, keys};
use crate::constants::MAX_UNSUCCESSFUL_BOOTS;

/// Stored when the device never booted or was reset by recovery.
pub const NEVER_BOOTED: i32 = -2;

/// Stored once a boot reached a healthy loop iteration.
pub const BOOT_SUCCEEDED: i32 = -1;

/// Outcome of the boot check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootDecision {
    /// Launch the tally program; `attempt` is the counter value just written.
    Proceed { attempt: i32 },
    /// Too many failed boots; hand over to the interactive fallback.
    Recovery,
}

/// Pure transition from the stored counter to (decision, value to write).
pub fn next_boot(stored: i32) -> (BootDecision, i32) {
    if stored <= NEVER_BOOTED || stored == BOOT_SUCCEEDED {
        return (BootDecision::Proceed { attempt: 0 }, 0);
    }

    let attempt = stored.saturating_add(1);
    if attempt > MAX_UNSUCCESSFUL_BOOTS {
        (BootDecision::Recovery, NEVER_BOOTED)
    } else {
        (BootDecision::Proceed { attempt }, attempt)
    }
}

/// Run the boot check against the persisted counter.
///
/// An unreadable or corrupt counter is treated as [`NEVER_BOOTED`]. A failed
/// write is logged and never stops the boot.
pub fn check_boot<S: KeyValueStorage>(config: &mut ConfigStore<S>) -> BootDecision {
    let stored = config.get(keys::BOOT_COUNTER, NEVER_BOOTED);
    let (decision, next) = next_boot(stored);

    match (stored, decision) {
        (s, _) if s <= NEVER_BOOTED => info!("First boot!"),
        (BOOT_SUCCEEDED, _) => info!("Last boot seemed successful"),
        (_, BootDecision::Proceed { attempt }) => {
            warn!("Failed start detected, unsuccessful attempts: {}", attempt)
        }
        (_, BootDecision::Recovery) => {
            error!("Failed to start several times, entering recovery mode")
        }
    }

    if let Err(e) = config.set(keys::BOOT_COUNTER, &next) {
        error!("Could not persist boot counter: {}", e);
    }

    decision
}

/// One-shot "this boot reached steady state" marker.
///
/// Owned by the runtime loop; only the first call per boot touches storage.
#[derive(Debug, Default)]
pub struct BootSuccess {
    recorded: bool,
}

impl BootSuccess {
    pub const fn new() -> Self {
        Self { recorded: false }
    }

    pub fn is_recorded(&self) -> bool {
        self.recorded
    }

    /// Persist [`BOOT_SUCCEEDED`] once. A failed write is reported but not
    /// retried, so a broken store cannot flood the loop with errors.
    pub fn record<S: KeyValueStorage>(
        &mut self,
        config: &mut ConfigStore<S>,
    ) -> Result<(), StorageError> {
        if self.recorded {
            return Ok(());
        }
        self.recorded = true;
        info!("Boot reached steady state");
        config.set(keys::BOOT_COUNTER, &BOOT_SUCCEEDED)
    }
}
