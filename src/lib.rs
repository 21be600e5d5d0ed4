#![deny(missing_docs)]

//! This crate emulates a laser distance sensor on a pseudo-terminal.
//!
//! A client opens the slave side of the pseudo-terminal as if it were the
//! instrument's serial port, and talks a small line protocol:
//!
//! - `DX` starts distance tracking, a reading is sent every period.
//! - `LO` and `LF` stop tracking and are echoed back.
//! - Anything else stops tracking and is answered with `E404`.
//!
//! Everything runs on one thread, driven by a reactor which waits for the
//! device to become readable or for the nearest timer to expire.

/// The command line interface.
pub mod cli;

/// A raw client for talking to the emulator.
pub mod client;

/// Configuration of the emulator.
pub mod config;

/// The pseudo-terminal device.
pub mod device;

/// Wiring the device, session and reactor together.
pub mod emulator;

/// Possible errors in this library.
pub mod error;

/// Setting up tracing.
pub mod logging;

/// The instrument's commands and replies, and how they are framed.
pub mod protocol;

/// Dispatching readiness and timer expiry.
pub mod reactor;

/// The per-device protocol state.
pub mod session;

/// Millisecond timers ordered by expiry.
pub mod timer;
