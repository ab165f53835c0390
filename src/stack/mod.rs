// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Traits for stacks, and the stacks fibers run on.
use std::io;

pub use self::owned_stack::{HeapStackSource, OwnedStack};
pub use self::os::{OsStack, OsStackSource};

mod owned_stack;
mod os;

/// A trait for objects that hold ownership of a stack.
///
/// To preserve memory safety, an implementation of this trait must fulfill
/// the following contract:
///
///   * The base address of the stack must be aligned to
///     a [`STACK_ALIGNMENT`](../constant.STACK_ALIGNMENT.html)-byte boundary.
///   * Every address between the base and the limit must be readable and writable.
///   * The stack must stay at the same address for as long as the object exists.
pub unsafe trait Stack {
  /// Returns the base address of the stack.
  /// On all modern architectures, the stack grows downwards,
  /// so this is the highest address.
  fn base(&self) -> *mut u8;
  /// Returns the limit address of the stack.
  /// On all modern architectures, the stack grows downwards,
  /// so this is the lowest address.
  fn limit(&self) -> *mut u8;
}

/// A marker trait for `Stack` objects with a guard page.
///
/// To preserve memory safety, an implementation of this trait must fulfill
/// the following contract, in addition to the [contract](trait.Stack.html)
/// of `Stack`:
///
///   * Any access of data at addresses `limit()` to `limit().offset(4096)` must
///     abnormally terminate, at least, the thread that performs the access.
pub unsafe trait GuardedStack {}

/// A trait for objects that hand out stacks of a requested size.
///
/// The scheduler asks its source for one stack per spawned fiber, and drops
/// the stack once the fiber has finished.
pub trait StackSource {
  type Output: Stack;

  /// Allocates a stack with at least `size` usable bytes.
  fn get_stack(&mut self, size: usize) -> io::Result<Self::Output>;
}

impl<'a, S: StackSource + ?Sized> StackSource for &'a mut S {
  type Output = S::Output;

  fn get_stack(&mut self, size: usize) -> io::Result<Self::Output> {
    (**self).get_stack(size)
  }
}
