// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
use std::alloc::{self, Layout};
use std::io;

use super::{Stack, StackSource};
use crate::STACK_ALIGNMENT;

/// OwnedStack holds a non-guarded, heap-allocated stack.
#[derive(Debug)]
pub struct OwnedStack {
  ptr:    *mut u8,
  layout: Layout
}

impl OwnedStack {
  /// Allocates a new stack with exactly `size` accessible bytes, rounded down
  /// to the platform stack alignment, using the global allocator.
  ///
  /// Fails with `ErrorKind::OutOfMemory` if the allocator refuses, and with
  /// `ErrorKind::InvalidInput` if `size` is smaller than the alignment.
  pub fn new(size: usize) -> io::Result<OwnedStack> {
    let aligned_size = size & !(STACK_ALIGNMENT - 1);
    if aligned_size == 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                format!("stack of {} bytes is too small", size)))
    }

    let layout = Layout::from_size_align(aligned_size, STACK_ALIGNMENT)
      .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let ptr = unsafe { alloc::alloc(layout) };
    if ptr.is_null() {
      return Err(io::ErrorKind::OutOfMemory.into())
    }

    Ok(OwnedStack { ptr: ptr, layout: layout })
  }

  /// Returns the number of accessible bytes.
  pub fn len(&self) -> usize {
    self.layout.size()
  }
}

unsafe impl Stack for OwnedStack {
  #[inline(always)]
  fn base(&self) -> *mut u8 {
    // The allocation cannot wrap around the address space.
    unsafe { self.ptr.add(self.layout.size()) }
  }

  #[inline(always)]
  fn limit(&self) -> *mut u8 {
    self.ptr
  }
}

impl Drop for OwnedStack {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.ptr, self.layout) }
  }
}

/// Hands out [`OwnedStack`](struct.OwnedStack.html)s.
///
/// These stacks have no guard page, so an overflowing fiber silently corrupts
/// the heap. Use [`OsStackSource`](struct.OsStackSource.html) where an MMU is
/// available.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapStackSource;

impl StackSource for HeapStackSource {
  type Output = OwnedStack;

  fn get_stack(&mut self, size: usize) -> io::Result<OwnedStack> {
    OwnedStack::new(size)
  }
}
