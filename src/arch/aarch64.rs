// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

// To understand the code in this file, keep in mind these facts:
// * AAPCS64 requires sp to be 16-byte aligned at all times, not just at
//   calls, so the spill area is a multiple of 16 bytes.
// * x19-x28, the frame pointer x29, the link register x30 and the low halves
//   of v8-v15 (d8-d15) are callee-saved.
// * The `(arg, old_sp)` pair travels in x0:x1 both as the return value of
//   `strand_swap` and as the two arguments of the entry function, so the
//   trampoline does not need to shuffle anything.
use core::arch::global_asm;

use super::{Entry, StackPointer, strand_trampoline};
use crate::stack::Stack;

pub const STACK_ALIGNMENT: usize = 16;

global_asm!(include_str!("aarch64/switch.s"));

pub unsafe fn init<S: Stack + ?Sized>(stack: &S, f: Entry) -> StackPointer {
  let mut sp = StackPointer::new(stack.base());
  sp.push(strand_trampoline as usize); // x30
  sp.push(0);                          // x29
  for _ in 20..=28 {
    sp.push(0);                        // x20-x28
  }
  sp.push(f as usize);                 // x19, called by the trampoline
  for _ in 8..=15 {
    sp.push(0);                        // d8-d15
  }
  sp
}
