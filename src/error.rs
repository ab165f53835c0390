// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
use std::io;

use thiserror::Error;

use crate::fiber::{Priority, Target};

/// Errors reported by scheduler operations.
///
/// None of them is fatal: when an operation fails, the scheduler is left
/// exactly as it was before the call.
#[derive(Debug, Error)]
pub enum Error {
  /// Every slot of the fiber table is taken.
  #[error("fiber table is full ({capacity} fibers)")]
  TooManyFibers { capacity: usize },

  /// The stack source could not provide a stack.
  #[error("cannot allocate a {size}-byte fiber stack")]
  OutOfMemory {
    size: usize,
    #[source]
    source: io::Error,
  },

  /// The addressed fiber is not live.
  #[error("no live fiber matches {0}")]
  NotFound(Target),

  /// A priority outside of `1..=100`.
  #[error("priority {0} is out of range {min}..={max}", min = Priority::HIGHEST, max = Priority::LOWEST)]
  InvalidPriority(u8),
}

pub type Result<T> = std::result::Result<T, Error>;
