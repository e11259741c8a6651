//! The incremental synthesis driver and its watch mode.
//!
//! [`run`] performs one synthesis invocation: elaborate, fingerprint,
//! split the design into cached and dirty halves, restore hits through
//! the module codec, synthesize the rest, and persist new artifacts.
//! [`Watcher`] layers a polling reload loop on top.
//!
//! All shared state lives in an explicit [`Context`] value threaded
//! through calls; there are no process globals.

#![warn(missing_docs)]

pub mod driver;
pub mod error;
pub mod watcher;

pub use driver::{run, Context, RunReport, SynthOptions, TRANSFORM_TAG};
pub use error::DriverError;
pub use watcher::{WatchOptions, WatchReport, Watcher, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL};
