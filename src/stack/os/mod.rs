// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
use std::io;
use std::ptr::NonNull;

use log::warn;

use super::{GuardedStack, Stack, StackSource};

mod sys;

// Unwinding through a fiber needs this much room.
const MIN_STACK_SIZE: usize = 16 << 10;

/// OsStack holds a guarded stack allocated using the operating system's
/// anonymous memory mapping facility.
///
/// The lowest page of the mapping is the guard page; it is not counted in
/// `len()` and lies below `limit()`.
#[derive(Debug)]
pub struct OsStack {
  mapping: NonNull<u8>,
  mapped:  usize
}

impl OsStack {
  /// Allocates a new stack with at least `size` accessible bytes.
  ///
  /// `size` is raised to 16 KiB and rounded up to whole pages, so
  /// `OsStack::new(0)` is legal and allocates the smallest usable stack.
  pub fn new(size: usize) -> io::Result<OsStack> {
    let page_size = sys::page_size();
    let usable = size.max(MIN_STACK_SIZE)
      .checked_add(page_size - 1)
      .map(|len| len & !(page_size - 1))
      .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))?;
    let mapped = usable + page_size;

    // From here on `stack` owns the mapping, so a failure to install the
    // guard page unmaps it on the way out.
    let stack = OsStack { mapping: sys::map(mapped)?, mapped: mapped };
    unsafe { sys::guard(stack.mapping)? };
    Ok(stack)
  }

  /// Returns the number of accessible bytes.
  pub fn len(&self) -> usize {
    self.mapped - sys::page_size()
  }
}

unsafe impl Stack for OsStack {
  #[inline(always)]
  fn base(&self) -> *mut u8 {
    unsafe { self.mapping.as_ptr().add(self.mapped) }
  }

  #[inline(always)]
  fn limit(&self) -> *mut u8 {
    unsafe { self.mapping.as_ptr().add(sys::page_size()) }
  }
}

unsafe impl GuardedStack for OsStack {}

impl Drop for OsStack {
  fn drop(&mut self) {
    if let Err(err) = unsafe { sys::unmap(self.mapping, self.mapped) } {
      warn!("cannot unmap stack at {:p} ({} bytes): {}", self.mapping, self.mapped, err)
    }
  }
}

/// Hands out [`OsStack`](struct.OsStack.html)s.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsStackSource;

impl StackSource for OsStackSource {
  type Output = OsStack;

  fn get_stack(&mut self, size: usize) -> io::Result<OsStack> {
    OsStack::new(size)
  }
}
