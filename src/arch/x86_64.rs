// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

// To understand the code in this file, keep in mind these facts:
// * x86_64 SysV C ABI requires the stack to be aligned at function entry,
//   so that (%rsp+8) is a multiple of 16. `strand_swap` is always entered
//   through a call, so its spill area starts on a 16-byte boundary, and
//   `init` lays out a fresh stack to look exactly the same.
// * Besides %rbx, %rbp and %r12-%r15, the control bits of MXCSR and the x87
//   control word are callee-saved and must travel with the context.
// * A 16-byte struct of two integers is returned in %rax:%rdx, which is how
//   the `(arg, old_sp)` pair comes back out of `strand_swap`.
use core::arch::global_asm;

use super::{Entry, StackPointer, strand_trampoline};
use crate::stack::Stack;

pub const STACK_ALIGNMENT: usize = 16;

// MXCSR with all exceptions masked (low half) and the default x87 control
// word (bytes 4..6), as found in a fresh process.
const INITIAL_CSR: usize = 0x0000_037f_0000_1f80;

global_asm!(include_str!("x86_64/switch.s"), options(att_syntax));

pub unsafe fn init<S: Stack + ?Sized>(stack: &S, f: Entry) -> StackPointer {
  let mut sp = StackPointer::new(stack.base());
  sp.push(strand_trampoline as usize); // return address
  sp.push(0);                          // %rbp
  sp.push(0);                          // %rbx
  sp.push(0);                          // %r15
  sp.push(0);                          // %r14
  sp.push(0);                          // %r13
  sp.push(f as usize);                 // %r12, called by the trampoline
  sp.push(INITIAL_CSR);
  sp
}
