// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Fiber identities, priorities and control blocks.
use std::fmt;
use std::num::NonZeroU64;

use crate::arch::StackPointer;
use crate::error::Error;

/// Stable identity of a fiber.
///
/// Assigned at spawn time and never reused by the scheduler that issued it.
/// Unlike a fiber's position in the table, the id survives re-sorting and the
/// removal of other fibers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiberId(NonZeroU64);

impl FiberId {
  pub(crate) fn first() -> FiberId {
    FiberId(NonZeroU64::MIN)
  }

  pub(crate) fn next(self) -> FiberId {
    // One id per spawn; a u64 counter cannot be exhausted in practice.
    FiberId(self.0.saturating_add(1))
  }

  /// Returns the id as a plain integer.
  pub fn get(self) -> u64 {
    self.0.get()
  }
}

impl fmt::Display for FiberId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Scheduling priority in `1..=100`. Lower values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
  pub const HIGHEST: Priority = Priority(1);
  pub const DEFAULT: Priority = Priority(50);
  pub const LOWEST:  Priority = Priority(100);

  /// Returns `Err(Error::InvalidPriority)` unless `1 <= value <= 100`.
  pub fn new(value: u8) -> Result<Priority, Error> {
    if (Priority::HIGHEST.0..=Priority::LOWEST.0).contains(&value) {
      Ok(Priority(value))
    } else {
      Err(Error::InvalidPriority(value))
    }
  }

  pub fn get(self) -> u8 {
    self.0
  }
}

impl Default for Priority {
  fn default() -> Priority {
    Priority::DEFAULT
  }
}

impl TryFrom<u8> for Priority {
  type Error = Error;

  fn try_from(value: u8) -> Result<Priority, Error> {
    Priority::new(value)
  }
}

impl fmt::Display for Priority {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// The fiber an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
  /// Whichever fiber is running when the operation is issued. Nothing
  /// matches when it is issued from the host.
  Current,
  Fiber(FiberId),
}

impl From<FiberId> for Target {
  fn from(id: FiberId) -> Target {
    Target::Fiber(id)
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Target::Current => f.write_str("the current fiber"),
      Target::Fiber(id) => write!(f, "fiber {}", id),
    }
  }
}

/// Lifecycle of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  /// Spawned, never dispatched.
  Ready,
  /// The body has started and has not returned. The fiber is either running
  /// or suspended in a yield.
  Active,
  /// The body has returned or panicked. A finished fiber is removed before
  /// control leaves the dispatcher, so it is only ever observed by the
  /// dispatcher itself.
  Finished,
}

/// A snapshot of one table entry, see
/// [`Scheduler::fibers`](struct.Scheduler.html#method.fibers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiberInfo {
  pub id:       FiberId,
  pub priority: Priority,
  pub state:    State,
}

/// The control block of one fiber.
///
/// `Body` is the closure type held until the first dispatch; `Stack` owns the
/// memory the fiber runs on, which is released when the block is dropped.
pub(crate) struct Fiber<Body, Stack> {
  pub id:       FiberId,
  pub priority: Priority,
  pub state:    State,
  pub context:  StackPointer,
  pub body:     Option<Body>,
  pub stack:    Stack,
}

impl<Body, Stack> Fiber<Body, Stack> {
  pub fn info(&self) -> FiberInfo {
    FiberInfo { id: self.id, priority: self.priority, state: self.state }
  }
}

impl<Body, Stack> fmt::Debug for Fiber<Body, Stack> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("Fiber")
      .field("id", &self.id)
      .field("priority", &self.priority)
      .field("state", &self.state)
      .field("context", &self.context)
      .finish_non_exhaustive()
  }
}
