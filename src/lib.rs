// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! strand is a single-threaded, non-preemptive fiber scheduler. It lets
//! a program run many functions, each on its own stack, and interleave them
//! cooperatively on one OS thread, without relying on kernel services.
//!
//! It provides the following safe abstractions:
//!
//!   * a fixed-capacity scheduler with priority bands,
//!     [Scheduler](struct.Scheduler.html), configured through
//!     [Config](struct.Config.html).
//!
//! It also provides the necessary low-level building blocks:
//!
//!   * a trait that can be implemented by stack allocators,
//!     [Stack](trait.Stack.html), and one for sources of stacks,
//!     [StackSource](trait.StackSource.html);
//!   * a stack allocator based on anonymous memory mappings with guard pages,
//!     [OsStack](struct.OsStack.html), and an unguarded heap one,
//!     [OwnedStack](struct.OwnedStack.html);
//!   * a trait for context switch back-ends,
//!     [Switch](context/trait.Switch.html), with a native implementation for
//!     x86_64 and aarch64.
//!
//! The scheduler logs through the [`log`](https://docs.rs/log) facade and
//! never installs a logger itself.

pub use arch::STACK_ALIGNMENT;

pub use config::{Config, Policy, FIBER_STACK, MAX_FIBERS};
pub use error::{Error, Result};
pub use fiber::{FiberId, FiberInfo, Priority, State, Target};
pub use scheduler::{Scheduler, Yield};

pub use stack::{GuardedStack, HeapStackSource, OsStack, OsStackSource, OwnedStack, Stack, StackSource};

mod arch;
pub mod context;
mod config;
mod error;
mod fiber;
mod scheduler;
mod stack;
mod table;
