// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

// The switch primitive is transfer-style: `swap(arg, new_sp)` spills the
// callee-saved state of the running context onto its own stack, loads
// `new_sp`, restores the state found there and returns `(arg, old_sp)` on the
// other side. A fresh stack is laid out by `init` so that its first restore
// "returns" into a trampoline which calls the entry function as
// `entry(arg, old_sp)`. Nothing is kept outside the two stacks.

pub use self::imp::*;

#[cfg(not(all(any(target_arch = "x86_64", target_arch = "aarch64"),
              not(target_vendor = "apple"),
              not(windows))))]
compile_error!("strand only supports x86_64 and aarch64 ELF targets");

#[allow(unused_attributes)]
#[cfg_attr(target_arch = "x86_64",  path = "x86_64.rs")]
#[cfg_attr(target_arch = "aarch64", path = "aarch64.rs")]
mod imp;

/// Entry point of a freshly initialized context.
///
/// Receives the argument of the first `swap` into the context, and the stack
/// pointer of the context that performed it.
pub type Entry = unsafe extern "C" fn(usize, StackPointer) -> !;

/// The saved state of a suspended context: the stack pointer below which its
/// callee-saved registers were spilled.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackPointer(*mut usize);

impl StackPointer {
  #[inline(always)]
  unsafe fn new(base: *mut u8) -> StackPointer {
    StackPointer((base as usize & !(STACK_ALIGNMENT - 1)) as *mut usize)
  }

  #[inline(always)]
  unsafe fn push(&mut self, val: usize) {
    self.0 = self.0.offset(-1);
    *self.0 = val
  }
}

#[repr(C)]
struct Transfer {
  arg: usize,
  sp:  StackPointer
}

extern "C" {
  fn strand_swap(arg: usize, new_sp: StackPointer) -> Transfer;
  fn strand_trampoline();
}

/// Suspends the running context and resumes the one saved at `new_sp`.
///
/// Returns once some context switches back, yielding the argument it passed
/// and its own saved stack pointer.
#[inline(always)]
pub unsafe fn swap(arg: usize, new_sp: StackPointer) -> (usize, StackPointer) {
  let transfer = strand_swap(arg, new_sp);
  (transfer.arg, transfer.sp)
}
