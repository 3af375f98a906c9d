//! This library implements the core of the `strand` task runtime.
//!
//! Work is expressed as [`Closure`]s: a serializable callable paired with its
//! captured arguments. A closure can run on the worker that created it, or be
//! moved to any other worker in the cluster and run there. Results are
//! exposed through single-assignment distributed futures, [`IVar`]s, which
//! are reclaimed using distributed reference counting.
//!
//! The library is split into the following building blocks:
//!
//! - [`Value`], a type-erased box that knows how to serialize its content,
//!   backed by a process-wide type [`registry`]
//! - [`Closure`], the unit of work
//! - [`TaskCollection`], the per-worker work-stealing scheduler
//! - [`RefCount`], the reference counting algebra used for reclaiming ivars
//! - [`IVarTracker`], per-worker bookkeeping for the ivars it owns
//! - [`Worker`], tying all of the above together with a [`Comm`] transport
//!   and driving the run loop
//!
//!
//! # Networking
//!
//! By itself, this library does not provide any concrete transport. Only the
//! [`Comm`] trait is defined here, together with the message framing used by
//! the worker protocol. For an in-process transport and a launcher that runs
//! multiple workers on multiple threads see `strand-net`.
//!
//! # Identical program image
//!
//! Values and closures are reconstructed on the receiving side using ids
//! from the type registry. Those ids are only meaningful within a single
//! build of a program. All the workers in a cluster must run the exact same
//! binary. See the [`registry`] module for details.
//!
//! [`IVar`]: ivar/struct.IVarRef.html

#![allow(unused)]

#[macro_use]
extern crate serde;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

// reexports
pub use closure::{Callable, Closure};
pub use comm::{Address, Comm, Message, MessageKind};
pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use ivar::{IVarId, IVarRef, IVarTracker};
pub use refcount::{RefCount, RefToken};
pub use registry::{register, register_closure, TypeKey};
pub use task::{Loc, Stats, TaskCollection};
pub use value::{Data, Value};
pub use worker::{Handler, Worker};

pub mod closure;
pub mod comm;
pub mod config;
pub mod error;
pub mod ivar;
pub mod refcount;
pub mod registry;
pub mod task;
pub mod value;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
