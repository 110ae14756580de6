//! Desktop platform for the TallyHo tally client.
//!
//! Runs the same runtime as the device against the host's TCP stack, with
//! configuration kept as one file per key and the screen rendered off-screen
//! (optionally written out as a PNG snapshot).

pub mod panel;
pub mod platform;
pub mod settings;
pub mod storage;
pub mod transport;
