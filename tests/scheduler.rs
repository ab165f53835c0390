// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
extern crate env_logger;
extern crate strand;

use std::cell::{Cell, RefCell};
use std::io;
use std::pin::Pin;
use std::rc::Rc;

use strand::context::Native;
use strand::{Config, Error, OwnedStack, Scheduler, Stack, StackSource, State, Yield, MAX_FIBERS};

fn init() {
  let _ = env_logger::builder().is_test(true).try_init();
}

/// A heap stack that counts how often it is released.
struct CountedStack {
  stack: OwnedStack,
  freed: Rc<Cell<usize>>,
}

unsafe impl Stack for CountedStack {
  fn base(&self) -> *mut u8 { self.stack.base() }
  fn limit(&self) -> *mut u8 { self.stack.limit() }
}

impl Drop for CountedStack {
  fn drop(&mut self) {
    self.freed.set(self.freed.get() + 1);
  }
}

#[derive(Default)]
struct Counting {
  allocated: Rc<Cell<usize>>,
  freed:     Rc<Cell<usize>>,
  exhausted: bool,
}

impl StackSource for Counting {
  type Output = CountedStack;

  fn get_stack(&mut self, size: usize) -> io::Result<CountedStack> {
    if self.exhausted {
      return Err(io::ErrorKind::OutOfMemory.into())
    }
    let stack = OwnedStack::new(size)?;
    self.allocated.set(self.allocated.get() + 1);
    Ok(CountedStack { stack: stack, freed: self.freed.clone() })
  }
}

struct Counted {
  sched:     Pin<Box<Scheduler<Counting>>>,
  allocated: Rc<Cell<usize>>,
  freed:     Rc<Cell<usize>>,
}

fn counted(config: Config, exhausted: bool) -> Counted {
  let source = Counting { exhausted: exhausted, ..Counting::default() };
  let allocated = source.allocated.clone();
  let freed = source.freed.clone();
  let sched = unsafe { Scheduler::with_parts(config.with_stack_size(256 << 10), source, Native) };
  Counted { sched: sched, allocated: allocated, freed: freed }
}

#[test]
fn spawn_and_join() {
  init();
  let sched = Scheduler::new();
  let sum = Rc::new(Cell::new(0));
  for i in 1..=3 {
    let sum = sum.clone();
    sched.spawn(move |sched| {
      sum.set(sum.get() + i);
      sched.yield_now();
      sum.set(sum.get() + i * 10);
    }).unwrap();
  }
  assert_eq!(sched.len(), 3);
  sched.wait_for_all();
  assert_eq!(sum.get(), 66);
  assert!(sched.is_empty());
}

#[test]
fn capacity() {
  init();
  let Counted { sched, allocated, .. } = counted(Config::default().with_capacity(3), false);
  for _ in 0..3 {
    sched.spawn(|_| {}).unwrap();
  }
  match sched.spawn(|_| {}) {
    Err(Error::TooManyFibers { capacity }) => assert_eq!(capacity, 3),
    other => panic!("unexpected {:?}", other),
  }
  assert_eq!(sched.len(), 3);
  // Capacity is checked before a stack is requested.
  assert_eq!(allocated.get(), 3);

  sched.wait_for_all();
  assert!(sched.spawn(|_| {}).is_ok());
}

#[test]
fn default_capacity() {
  init();
  let sched = Scheduler::new();
  assert_eq!(sched.capacity(), MAX_FIBERS);
  for _ in 0..MAX_FIBERS {
    sched.spawn(|_| {}).unwrap();
  }
  assert!(matches!(sched.spawn(|_| {}), Err(Error::TooManyFibers { .. })));
  assert_eq!(sched.len(), MAX_FIBERS);
  sched.wait_for_all();
}

#[test]
fn out_of_memory() {
  init();
  let Counted { sched, allocated, .. } = counted(Config::default(), true);
  match sched.spawn(|_| {}) {
    Err(Error::OutOfMemory { size, source }) => {
      assert_eq!(size, 256 << 10);
      assert_eq!(source.kind(), io::ErrorKind::OutOfMemory);
    }
    other => panic!("unexpected {:?}", other),
  }
  assert_eq!(sched.len(), 0);
  assert_eq!(allocated.get(), 0);
  assert_eq!(sched.yield_now(), Yield::Idle);
}

#[test]
fn yield_once_and_return() {
  init();
  let Counted { sched, allocated, freed } = counted(Config::default(), false);
  let trace = Rc::new(RefCell::new(Vec::new()));

  let t = trace.clone();
  sched.spawn(move |sched| {
    t.borrow_mut().push("a1");
    sched.yield_now();
    t.borrow_mut().push("a2");
  }).unwrap();
  let t = trace.clone();
  sched.spawn(move |_| t.borrow_mut().push("b")).unwrap();

  sched.wait_for_all();
  assert_eq!(*trace.borrow(), ["a1", "b", "a2"]);
  assert_eq!(sched.len(), 0);
  assert_eq!(allocated.get(), 2);
  assert_eq!(freed.get(), 2);
}

#[test]
fn termination_reclaims_resources() {
  init();
  let Counted { sched, freed, .. } = counted(Config::default(), false);
  let quick = sched.spawn(|_| {}).unwrap();
  let slow = sched.spawn(|sched| for _ in 0..3 { sched.yield_now(); }).unwrap();

  assert_eq!(sched.yield_now(), Yield::Next(slow));
  assert_eq!(sched.len(), 1);
  assert_eq!(freed.get(), 1);
  assert!(matches!(sched.priority(quick), Err(Error::NotFound(_))));
  assert!(sched.priority(slow).is_ok());

  sched.wait_for_all();
  assert_eq!(freed.get(), 2);
}

#[test]
fn yield_outcomes() {
  init();
  let sched = Scheduler::new();
  assert_eq!(sched.yield_now(), Yield::Idle);

  let lonely = sched.spawn(|sched| for _ in 0..2 { sched.yield_now(); }).unwrap();
  assert_eq!(sched.fibers()[0].id, lonely);
  assert_eq!(sched.yield_now(), Yield::Unchanged);
  assert_eq!(sched.yield_now(), Yield::Unchanged);
  assert_eq!(sched.yield_now(), Yield::Idle);
  assert_eq!(sched.yield_now(), Yield::Idle);

  let a = sched.spawn(|sched| loop { sched.yield_now(); }).unwrap();
  let b = sched.spawn(|sched| loop { sched.yield_now(); }).unwrap();
  assert_eq!(sched.yield_now(), Yield::Next(b));
  assert_eq!(sched.yield_now(), Yield::Next(a));
  assert_eq!(sched.yield_now(), Yield::Next(b));
}

#[test]
fn fiber_side_yield_reports_resumed() {
  init();
  let sched = Scheduler::new();
  let seen = Rc::new(RefCell::new(Vec::new()));
  let s = seen.clone();
  sched.spawn(move |sched| {
    s.borrow_mut().push(sched.yield_now());
    s.borrow_mut().push(sched.yield_now());
  }).unwrap();
  sched.wait_for_all();
  assert_eq!(*seen.borrow(), [Yield::Resumed, Yield::Resumed]);
}

#[test]
fn current_and_in_fiber() {
  init();
  let sched = Scheduler::new();
  assert!(!sched.in_fiber());
  assert_eq!(sched.current(), None);

  let seen = Rc::new(Cell::new(None));
  let s = seen.clone();
  let id = sched.spawn(move |sched| {
    assert!(sched.in_fiber());
    s.set(sched.current());
  }).unwrap();
  sched.wait_for_all();
  assert_eq!(seen.get(), Some(id));
  assert!(!sched.in_fiber());
}

#[test]
fn states() {
  init();
  let sched = Scheduler::new();
  let id = sched.spawn(|sched| { sched.yield_now(); }).unwrap();
  assert_eq!(sched.fibers()[0].state, State::Ready);
  sched.yield_now();
  assert_eq!(sched.fibers()[0].state, State::Active);
  assert_eq!(sched.fibers()[0].id, id);
  sched.yield_now();
  assert!(sched.fibers().is_empty());
}

#[test]
fn ids_are_not_reused() {
  init();
  let sched = Scheduler::new();
  let first = sched.spawn(|_| {}).unwrap();
  sched.wait_for_all();
  let second = sched.spawn(|_| {}).unwrap();
  assert_ne!(first, second);
  assert!(first < second);
  sched.wait_for_all();
}

#[test]
fn wait_inside_fiber() {
  init();
  let sched = Scheduler::new();
  let trace = Rc::new(RefCell::new(Vec::new()));

  let t = trace.clone();
  sched.spawn(move |sched| {
    sched.wait_for_all();
    t.borrow_mut().push(format!("waiter sees {}", sched.len()));
  }).unwrap();
  for name in ["x", "y"] {
    let t = trace.clone();
    sched.spawn(move |sched| {
      for i in 0..3 {
        t.borrow_mut().push(format!("{}{}", name, i));
        sched.yield_now();
      }
    }).unwrap();
  }

  sched.wait_for_all();
  let trace = trace.borrow();
  assert_eq!(trace.len(), 7);
  assert_eq!(trace.last().map(String::as_str), Some("waiter sees 1"));
}

#[test]
fn spawn_from_fiber() {
  init();
  let sched = Scheduler::new();
  let trace = Rc::new(RefCell::new(Vec::new()));

  let t = trace.clone();
  sched.spawn(move |sched| {
    let child = t.clone();
    sched.spawn(move |_| child.borrow_mut().push("child")).unwrap();
    t.borrow_mut().push("parent");
    sched.wait_for_all();
    t.borrow_mut().push("parent done");
  }).unwrap();

  sched.wait_for_all();
  assert_eq!(*trace.borrow(), ["parent", "child", "parent done"]);
}

#[test]
fn drop_with_suspended_fibers() {
  init();
  let Counted { sched, allocated, freed } = counted(Config::default(), false);
  let token = Rc::new(());

  sched.spawn(|sched| loop { sched.yield_now(); }).unwrap();
  let unstarted = token.clone();
  sched.spawn(move |_| drop(unstarted)).unwrap();
  sched.spawn(|sched| loop { sched.yield_now(); }).unwrap();

  // Only the first fiber gets to run.
  sched.yield_now();
  assert_eq!(Rc::strong_count(&token), 2);

  drop(sched);
  assert_eq!(allocated.get(), 3);
  assert_eq!(freed.get(), 3);
  // The body that never started was dropped along with its fiber.
  assert_eq!(Rc::strong_count(&token), 1);
}

#[test]
fn independent_schedulers() {
  init();
  let outer = Scheduler::new();
  let inner = Rc::new(Scheduler::new());
  let trace = Rc::new(RefCell::new(Vec::new()));

  for name in ["i1", "i2"] {
    let t = trace.clone();
    inner.spawn(move |sched| {
      t.borrow_mut().push(name);
      sched.yield_now();
      t.borrow_mut().push(name);
    }).unwrap();
  }

  // A fiber of one scheduler acts as the host of the other.
  let t = trace.clone();
  let nested = inner.clone();
  outer.spawn(move |sched| {
    t.borrow_mut().push("o");
    nested.wait_for_all();
    sched.yield_now();
    t.borrow_mut().push("o");
  }).unwrap();

  outer.wait_for_all();
  assert_eq!(*trace.borrow(), ["o", "i1", "i2", "i1", "i2", "o"]);
  assert!(inner.is_empty());
}
