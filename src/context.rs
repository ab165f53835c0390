// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Context switch back-ends.
use crate::arch;
use crate::stack::Stack;

pub use crate::arch::{Entry, StackPointer};

/// Switch is the capability to suspend one thread of execution and resume
/// another on a different stack.
///
/// The scheduler never switches contexts by itself; it goes through the
/// back-end it was constructed with. The contract mirrors a transfer-style
/// primitive: every switch carries one `usize` across, and the context being
/// suspended is handed to the one being resumed.
///
/// # Safety
///
/// Implementations must preserve every register the platform C ABI declares
/// callee-saved across `swap`, and must leave the stack aligned as the ABI
/// requires when `entry` is called.
pub unsafe trait Switch {
  /// Lays out an initial frame on `stack`, so that the first `swap` into the
  /// returned context calls `entry(arg, from)`, where `arg` is the argument of
  /// that swap and `from` the context that performed it.
  ///
  /// `entry` must never return.
  unsafe fn init<S: Stack + ?Sized>(&self, stack: &S, entry: Entry) -> StackPointer;

  /// Saves the running context and resumes `to`, passing `arg`.
  ///
  /// Returns when some context switches back, with the argument it passed
  /// and the context it left.
  unsafe fn swap(&self, arg: usize, to: StackPointer) -> (usize, StackPointer);
}

/// The native back-end, implemented in assembly for the target architecture.
#[derive(Debug, Default, Clone, Copy)]
pub struct Native;

unsafe impl Switch for Native {
  #[inline]
  unsafe fn init<S: Stack + ?Sized>(&self, stack: &S, entry: Entry) -> StackPointer {
    arch::init(stack, entry)
  }

  #[inline(always)]
  unsafe fn swap(&self, arg: usize, to: StackPointer) -> (usize, StackPointer) {
    arch::swap(arg, to)
  }
}
