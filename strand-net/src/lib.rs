//! This library provides transports and launchers for `strand` workers.
//!
//! `strand-core` only defines what a transport needs to be capable of, with
//! the `Comm` trait. Here we provide an in-process implementation based on
//! channels, optionally forcing every message through one of the supported
//! encodings, along with a launcher running a complete cluster of workers on
//! multiple threads of the current process.
//!
//! ```ignore
//! let config = LaunchConfig {
//!     workers: 4,
//!     ..LaunchConfig::default()
//! };
//! let stats = strand_net::launch_local(config, |worker| {
//!     worker.submit(Loc::Anywhere, Closure::new(MyTask, 42u64))
//! })?;
//! ```

#![allow(unused)]

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;

pub use encoding::Encoding;
pub use error::{Error, Result};
pub use launcher::{launch_local, LaunchConfig};
pub use local::{LocalComm, LocalQueues};

pub mod encoding;
pub mod error;
pub mod launcher;
pub mod local;
