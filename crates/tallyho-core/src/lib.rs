//! Hardware-independent core library for the TallyHo tally light.
//!
//! This crate contains all platform-agnostic logic for the tally client:
//! the boot-loop watchdog, the file-per-key configuration store, tally
//! resolution, the network session with its ping deadline, the JSON
//! protocol interpreter, the runtime loop and the indicator layouts.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the host runner and tests).

#![no_std]

extern crate alloc;

pub mod boot;
pub mod config;
pub mod constants;
pub mod display;
pub mod error;
pub mod identity;
pub mod net;
pub mod platform;
pub mod protocol;
pub mod runtime;
pub mod tally;
