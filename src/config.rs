// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
use crate::fiber::Priority;

/// Number of fibers a default scheduler can hold.
pub const MAX_FIBERS: usize = 10;

/// Size of the stack a default scheduler gives each fiber.
pub const FIBER_STACK: usize = 1 << 20;

/// How the dispatcher picks the next fiber on a host-side yield.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
  /// Round-robin within the highest occupied priority band. Whenever the
  /// rotation would step into a different band, it restarts at the front of
  /// the table, so lower-priority fibers only run once every fiber ahead of
  /// them has finished.
  #[default]
  Priority,
  /// Plain round-robin over the whole table, ignoring priorities.
  RoundRobin,
}

/// Scheduler configuration, fixed at construction.
///
/// ```
/// use strand::{Config, Policy, Priority};
///
/// let config = Config::default()
///   .with_capacity(64)
///   .with_stack_size(256 << 10)
///   .with_policy(Policy::RoundRobin)
///   .with_default_priority(Priority::new(10).unwrap());
/// assert_eq!(config.capacity, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Fixed size of the fiber table.
  pub capacity: usize,
  /// Bytes requested from the stack source for every fiber.
  pub stack_size: usize,
  /// Dispatch policy.
  pub policy: Policy,
  /// Priority assigned to newly spawned fibers.
  pub default_priority: Priority,
}

impl Default for Config {
  fn default() -> Config {
    Config {
      capacity:         MAX_FIBERS,
      stack_size:       FIBER_STACK,
      policy:           Policy::default(),
      default_priority: Priority::default(),
    }
  }
}

impl Config {
  pub fn with_capacity(mut self, capacity: usize) -> Config {
    self.capacity = capacity;
    self
  }

  pub fn with_stack_size(mut self, stack_size: usize) -> Config {
    self.stack_size = stack_size;
    self
  }

  pub fn with_policy(mut self, policy: Policy) -> Config {
    self.policy = policy;
    self
  }

  pub fn with_default_priority(mut self, priority: Priority) -> Config {
    self.default_priority = priority;
    self
  }
}
