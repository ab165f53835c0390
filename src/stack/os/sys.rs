// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! Memory mapping calls backing `OsStack`.
use std::io;
use std::ptr::{self, NonNull};
use std::sync::OnceLock;

use libc::{c_int, c_void};

const STACK_PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;

// Fiber stacks are mostly untouched, so do not charge them against the commit
// limit up front.
#[cfg(any(target_os = "linux", target_os = "android"))]
const STACK_FLAGS: c_int = libc::MAP_PRIVATE
                         | libc::MAP_ANONYMOUS
                         | libc::MAP_STACK
                         | libc::MAP_NORESERVE;
// FreeBSD and DragonFly reject MAP_STACK mappings that are later mprotect'ed.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const STACK_FLAGS: c_int = libc::MAP_PRIVATE
                         | libc::MAP_ANON;

fn check(ret: c_int) -> io::Result<()> {
  if ret == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
}

/// Maps `len` bytes of fresh, zeroed, read-write memory.
pub fn map(len: usize) -> io::Result<NonNull<u8>> {
  let ptr = unsafe { libc::mmap(ptr::null_mut(), len, STACK_PROT, STACK_FLAGS, -1, 0) };
  if ptr == libc::MAP_FAILED {
    return Err(io::Error::last_os_error())
  }
  NonNull::new(ptr as *mut u8).ok_or_else(|| io::ErrorKind::OutOfMemory.into())
}

/// Revokes all access to the page starting at `ptr`.
pub unsafe fn guard(ptr: NonNull<u8>) -> io::Result<()> {
  check(libc::mprotect(ptr.as_ptr() as *mut c_void, page_size(), libc::PROT_NONE))
}

/// Returns a mapping created by `map` to the system.
pub unsafe fn unmap(ptr: NonNull<u8>, len: usize) -> io::Result<()> {
  check(libc::munmap(ptr.as_ptr() as *mut c_void, len))
}

pub fn page_size() -> usize {
  static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
  *PAGE_SIZE.get_or_init(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize })
}
