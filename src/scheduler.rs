// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The fiber table and dispatcher.
//!
//! A scheduler multiplexes fibers onto the thread that owns it. Exactly one
//! of {the host, one fiber} runs at any time, and control only moves at
//! explicit yields: the host dispatches a fiber, the fiber runs until it
//! yields or returns, and control comes back to the host.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomPinned;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;

use log::{debug, trace, warn};

use crate::arch::StackPointer;
use crate::config::Config;
use crate::context::{Native, Switch};
use crate::error::{Error, Result};
use crate::fiber::{Fiber, FiberId, FiberInfo, Priority, State, Target};
use crate::stack::{GuardedStack, OsStackSource, StackSource};
use crate::table::Table;

type Body<Src, W> = Box<dyn FnOnce(&Scheduler<Src, W>)>;

/// What a call to [`yield_now`](struct.Scheduler.html#method.yield_now)
/// accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Yield {
  /// Called from a fiber: the fiber was suspended and has now been resumed.
  Resumed,
  /// Called from the host with no live fibers, or the last fiber finished.
  Idle,
  /// A fiber ran, and the next dispatch will pick the same fiber again.
  Unchanged,
  /// A fiber ran, and the next dispatch will pick this one.
  Next(FiberId),
}

/// Scheduler owns a fixed-capacity table of fibers and dispatches them.
///
/// A scheduler lives pinned on the heap, since fibers hold on to it across
/// suspensions; every operation takes `&self`. Each fiber body receives a
/// reference to the scheduler that runs it, through which it can yield, spawn
/// more fibers, change priorities or wait for its siblings.
///
/// Most operations behave differently depending on whether they are issued
/// by the host (the code that owns the scheduler) or by a running fiber:
/// `yield_now` from the host dispatches the next fiber, while from a fiber it
/// suspends that fiber and returns control to the host.
///
/// If a fiber body panics, the panic is caught on the fiber's stack, the
/// fiber is cleaned up as if it had returned, and the panic then resumes out
/// of the host call that dispatched it.
///
/// Dropping a scheduler with suspended fibers releases their stacks without
/// unwinding them; values living on those stacks are leaked.
///
/// # Example
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use strand::Scheduler;
///
/// let sched = Scheduler::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
/// for name in ["a", "b"] {
///   let log = log.clone();
///   sched.spawn(move |sched| {
///     for i in 0..2 {
///       log.borrow_mut().push(format!("{}{}", name, i));
///       sched.yield_now();
///     }
///   }).unwrap();
/// }
/// sched.wait_for_all();
/// assert_eq!(*log.borrow(), ["a0", "b0", "a1", "b1"]);
/// ```
pub struct Scheduler<Src: StackSource = OsStackSource, W: Switch = Native> {
  config:  Config,
  switch:  W,
  source:  RefCell<Src>,
  table:   RefCell<Table<Body<Src, W>, Src::Output>>,
  next_id: Cell<FiberId>,
  /// The fiber dispatched last; rotation continues after it.
  cursor:  Cell<Option<FiberId>>,
  /// The running fiber. `None` while the host runs.
  current: Cell<Option<FiberId>>,
  /// Where the running fiber returns to when it yields.
  host:    Cell<Option<StackPointer>>,
  /// Directed yield requested by the fiber that ran last.
  handoff: Cell<Option<FiberId>>,
  panic:   Cell<Option<Box<dyn Any + Send>>>,
  _pinned: PhantomPinned,
}

impl Scheduler {
  /// Creates a scheduler with the default configuration and guarded stacks.
  pub fn new() -> Pin<Box<Scheduler>> {
    Scheduler::with_config(Config::default())
  }

  /// Creates a scheduler with guarded stacks.
  pub fn with_config(config: Config) -> Pin<Box<Scheduler>> {
    Scheduler::with_source(config, OsStackSource)
  }
}

impl<Src: StackSource> Scheduler<Src, Native> {
  /// Creates a scheduler that takes fiber stacks from `source`.
  pub fn with_source(config: Config, source: Src) -> Pin<Box<Scheduler<Src, Native>>>
      where Src::Output: GuardedStack {
    Scheduler::with_switch(config, source, Native)
  }
}

impl<Src: StackSource, W: Switch> Scheduler<Src, W> {
  /// Creates a scheduler that switches contexts through `switch`.
  pub fn with_switch(config: Config, source: Src, switch: W) -> Pin<Box<Scheduler<Src, W>>>
      where Src::Output: GuardedStack {
    unsafe { Scheduler::with_parts(config, source, switch) }
  }

  /// Same as `with_switch`, but does not require the stacks to have a guard
  /// page.
  ///
  /// This function is unsafe because a fiber can easily violate memory safety
  /// by overflowing its stack. It is useful where guarded stacks do not
  /// exist, e.g. in absence of an MMU.
  pub unsafe fn with_parts(config: Config, source: Src, switch: W) -> Pin<Box<Scheduler<Src, W>>> {
    debug!("scheduler created: {:?}", config);
    Box::pin(Scheduler {
      config:  config,
      switch:  switch,
      source:  RefCell::new(source),
      table:   RefCell::new(Table::new(config.capacity)),
      next_id: Cell::new(FiberId::first()),
      cursor:  Cell::new(None),
      current: Cell::new(None),
      host:    Cell::new(None),
      handoff: Cell::new(None),
      panic:   Cell::new(None),
      _pinned: PhantomPinned,
    })
  }

  /// The configuration this scheduler was created with.
  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Number of live fibers.
  pub fn len(&self) -> usize {
    self.table.borrow().len()
  }

  /// Whether no fibers are live.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of fibers the table can hold.
  pub fn capacity(&self) -> usize {
    self.table.borrow().capacity()
  }

  /// Whether the caller is running inside a fiber of this scheduler.
  pub fn in_fiber(&self) -> bool {
    self.current.get().is_some()
  }

  /// Id of the running fiber, or `None` when called from the host.
  pub fn current(&self) -> Option<FiberId> {
    self.current.get()
  }

  /// Snapshot of the live fibers, in table order.
  pub fn fibers(&self) -> Vec<FiberInfo> {
    self.table.borrow().iter().map(Fiber::info).collect()
  }

  /// Registers a fiber that will run `body` on a fresh stack.
  ///
  /// The fiber gets the configured default priority and does not run until
  /// it is dispatched. Fails with `TooManyFibers` if the table is full, or
  /// `OutOfMemory` if no stack could be allocated; nothing is registered in
  /// either case.
  pub fn spawn<F>(&self, body: F) -> Result<FiberId>
      where F: FnOnce(&Scheduler<Src, W>) + 'static {
    let capacity = self.capacity();
    if self.table.borrow().is_full() {
      debug!("cannot spawn: all {} slots are taken", capacity);
      return Err(Error::TooManyFibers { capacity: capacity })
    }

    let size = self.config.stack_size;
    let stack = self.source.borrow_mut().get_stack(size).map_err(|source| {
      debug!("cannot allocate a {}-byte stack: {}", size, source);
      Error::OutOfMemory { size: size, source: source }
    })?;
    let context = unsafe { self.switch.init(&stack, fiber_entry::<Src, W>) };

    let id = self.next_id.get();
    self.next_id.set(id.next());
    self.table.borrow_mut().insert(Fiber {
      id:       id,
      priority: self.config.default_priority,
      state:    State::Ready,
      context:  context,
      body:     Some(Box::new(body)),
      stack:    stack,
    });
    debug!("spawned fiber {} with priority {}", id, self.config.default_priority);
    Ok(id)
  }

  /// Gives up the processor.
  ///
  /// From a fiber, suspends it and returns `Yield::Resumed` once the
  /// dispatcher resumes it.
  ///
  /// From the host, dispatches one fiber according to the configured policy,
  /// lets it run until it yields or finishes, cleans it up if it finished, and
  /// reports which fiber the next call will dispatch. Returns `Yield::Idle`
  /// without doing anything if there are no fibers.
  pub fn yield_now(&self) -> Yield {
    if self.in_fiber() {
      self.suspend();
      return Yield::Resumed
    }

    let next = self.next();
    match next {
      None => Yield::Idle,
      Some(id) => {
        self.dispatch(id);
        self.outlook(id)
      }
    }
  }

  /// Reads or changes the priority of `target`.
  ///
  /// With `priority == None`, returns the current priority and changes
  /// nothing. Otherwise sets it, restores the table order and returns the
  /// previous priority. Fails with `NotFound` if `target` is not live;
  /// `Target::Current` matches nothing when issued from the host.
  pub fn nice(&self, target: impl Into<Target>, priority: Option<Priority>) -> Result<Priority> {
    let target = target.into();
    let id = self.resolve(target).ok_or(Error::NotFound(target))?;

    let mut table = self.table.borrow_mut();
    let fiber = table.get_mut(id).ok_or(Error::NotFound(target))?;
    let previous = fiber.priority;
    if let Some(priority) = priority {
      fiber.priority = priority;
      table.sort();
      debug!("fiber {} priority {} -> {}", id, previous, priority);
    }
    Ok(previous)
  }

  /// Returns the priority of `target`.
  pub fn priority(&self, target: impl Into<Target>) -> Result<Priority> {
    self.nice(target, None)
  }

  /// Runs fiber `id` next, bypassing rotation and priority bands.
  ///
  /// From the host, switches straight into the fiber and returns once it
  /// yields or finishes; the fiber then becomes the point rotation continues
  /// from. From a fiber, suspends the caller and has the host's next dispatch
  /// run `id` instead of the rotation candidate. Fails with `NotFound` if `id`
  /// is not live.
  pub fn handoff(&self, id: FiberId) -> Result<()> {
    if self.table.borrow().position(id).is_none() {
      return Err(Error::NotFound(Target::Fiber(id)))
    }

    if self.in_fiber() {
      trace!("fiber {:?} hands off to fiber {}", self.current.get(), id);
      self.handoff.set(Some(id));
      self.suspend();
    } else {
      self.dispatch(id);
    }
    Ok(())
  }

  /// Dispatches fibers until every other fiber has finished.
  ///
  /// From the host, returns once no fibers are left; from a fiber, once the
  /// caller is the only one left. A fiber that never finishes keeps this
  /// from returning.
  pub fn wait_for_all(&self) {
    let remaining = if self.in_fiber() { 1 } else { 0 };
    debug!("waiting until {} fibers remain", remaining);
    while self.len() > remaining {
      self.yield_now();
    }
  }

  fn resolve(&self, target: Target) -> Option<FiberId> {
    match target {
      Target::Current => self.current.get(),
      Target::Fiber(id) => Some(id),
    }
  }

  /// The fiber the next host-side dispatch runs: a pending directed yield if
  /// its target is still live, otherwise the rotation candidate.
  fn next(&self) -> Option<FiberId> {
    let table = self.table.borrow();
    self.handoff.take()
      .filter(|&id| table.position(id).is_some())
      .or_else(|| table.pick(self.cursor.get(), self.config.policy))
  }

  fn outlook(&self, ran: FiberId) -> Yield {
    let table = self.table.borrow();
    let next = self.handoff.get()
      .or_else(|| table.pick(self.cursor.get(), self.config.policy));
    match next {
      None => Yield::Idle,
      Some(id) if id == ran => Yield::Unchanged,
      Some(id) => Yield::Next(id),
    }
  }

  /// Switches from the host into fiber `id` and back, then reaps the fiber
  /// if it finished.
  fn dispatch(&self, id: FiberId) {
    let context = match self.table.borrow().get(id) {
      Some(fiber) => fiber.context,
      None => return,
    };

    self.cursor.set(Some(id));
    self.current.set(Some(id));
    debug!("switching to fiber {}", id);
    let (_, context) = unsafe { self.switch.swap(self as *const Self as usize, context) };
    self.current.set(None);
    debug!("fiber {} switched to the host", id);

    // The fiber may have reordered the table while it ran, so look it up again.
    let finished = match self.table.borrow_mut().get_mut(id) {
      Some(fiber) => {
        fiber.context = context;
        fiber.state == State::Finished
      }
      None => false,
    };
    if finished {
      self.reap(id);
    }

    if let Some(payload) = self.panic.take() {
      panic::resume_unwind(payload)
    }
  }

  fn reap(&self, id: FiberId) {
    debug!("fiber {} is finished, cleaning up", id);
    let removed = self.table.borrow_mut().remove(id);
    let moved = removed.as_ref().and_then(|&(_, moved)| moved);
    // Rotation continues from whichever fiber took over the vacated slot.
    if self.cursor.get() == Some(id) {
      self.cursor.set(moved);
    }
    if self.handoff.get() == Some(id) {
      self.handoff.set(None);
    }
    // Releases the stack.
    drop(removed);
  }

  /// Switches from the running fiber back to the host.
  fn suspend(&self) {
    let host = match self.host.take() {
      Some(host) => host,
      None => return,
    };
    trace!("fiber {:?} yielding the processor", self.current.get());
    let (_, host) = unsafe { self.switch.swap(self as *const Self as usize, host) };
    self.host.set(Some(host));
  }

  /// Runs the body of the current fiber, on that fiber's stack.
  fn run_current(&self) {
    let id = match self.current.get() {
      Some(id) => id,
      None => return,
    };

    let body = self.table.borrow_mut().get_mut(id).and_then(|fiber| {
      fiber.state = State::Active;
      fiber.body.take()
    });
    if let Some(body) = body {
      if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body(self))) {
        warn!("fiber {} panicked", id);
        self.panic.set(Some(payload));
      }
    }

    if let Some(fiber) = self.table.borrow_mut().get_mut(id) {
      fiber.state = State::Finished;
    }
  }
}

unsafe extern "C" fn fiber_entry<Src: StackSource, W: Switch>(arg: usize, host: StackPointer) -> ! {
  // The dispatcher passes its own address with every switch; the scheduler
  // is pinned, so the address stays valid for as long as this stack exists.
  let sched = &*(arg as *const Scheduler<Src, W>);
  sched.host.set(Some(host));
  sched.run_current();
  // The host reaps a finished fiber and never switches back into it.
  sched.suspend();
  std::process::abort()
}

impl<Src: StackSource, W: Switch> fmt::Debug for Scheduler<Src, W> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("Scheduler")
      .field("config", &self.config)
      .field("fibers", &self.fibers())
      .field("current", &self.current.get())
      .finish_non_exhaustive()
  }
}

impl<Src: StackSource, W: Switch> Drop for Scheduler<Src, W> {
  fn drop(&mut self) {
    let live = self.table.get_mut().len();
    if live > 0 {
      warn!("scheduler dropped with {} live fibers, releasing their stacks without unwinding", live);
    }
  }
}
