// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//! The fiber table.
//!
//! Live fibers occupy slots `0..len()` and are kept sorted by ascending
//! priority, so every priority band is a contiguous run of slots. Slots are
//! not identities: sorting and swap-removal move entries around, and callers
//! only ever hold on to `FiberId`s.
use log::trace;

use crate::config::Policy;
use crate::fiber::{Fiber, FiberId};

pub(crate) struct Table<Body, Stack> {
  fibers:   Vec<Fiber<Body, Stack>>,
  capacity: usize,
}

impl<Body, Stack> Table<Body, Stack> {
  pub fn new(capacity: usize) -> Table<Body, Stack> {
    Table { fibers: Vec::with_capacity(capacity), capacity: capacity }
  }

  pub fn len(&self) -> usize {
    self.fibers.len()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn is_full(&self) -> bool {
    self.fibers.len() >= self.capacity
  }

  pub fn iter(&self) -> impl Iterator<Item = &Fiber<Body, Stack>> {
    self.fibers.iter()
  }

  /// Returns the slot currently holding `id`.
  pub fn position(&self, id: FiberId) -> Option<usize> {
    self.fibers.iter().position(|fiber| fiber.id == id)
  }

  pub fn get(&self, id: FiberId) -> Option<&Fiber<Body, Stack>> {
    self.fibers.iter().find(|fiber| fiber.id == id)
  }

  pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber<Body, Stack>> {
    self.fibers.iter_mut().find(|fiber| fiber.id == id)
  }

  /// Appends `fiber` and restores the ordering. The caller checks capacity.
  pub fn insert(&mut self, fiber: Fiber<Body, Stack>) {
    debug_assert!(!self.is_full());
    self.fibers.push(fiber);
    self.sort();
  }

  /// Removes `id`, moving the last live entry into its slot, and restores
  /// the ordering if that entry moved.
  ///
  /// Also returns the id of the entry that was moved into the vacated slot,
  /// or `None` if `id` occupied the last slot.
  pub fn remove(&mut self, id: FiberId) -> Option<(Fiber<Body, Stack>, Option<FiberId>)> {
    let slot = self.position(id)?;
    let fiber = self.fibers.swap_remove(slot);
    let moved = self.fibers.get(slot).map(|fiber| fiber.id);
    if moved.is_some() {
      self.sort();
    }
    Some((fiber, moved))
  }

  /// Bubble sort on ascending priority.
  ///
  /// Stable, so fibers sharing a priority keep their rotation order. Only
  /// runs after structural changes, never per dispatch.
  pub fn sort(&mut self) {
    let n = self.fibers.len();
    for pass in 1..n {
      let mut swapped = false;
      for slot in 0..n - pass {
        if self.fibers[slot].priority > self.fibers[slot + 1].priority {
          self.fibers.swap(slot, slot + 1);
          swapped = true;
        }
      }
      if !swapped { break }
    }
    trace!("fiber table sorted: {:?}",
           self.fibers.iter().map(|fiber| (fiber.id.get(), fiber.priority.get())).collect::<Vec<_>>());
  }

  /// Picks the fiber a host-side yield dispatches next, given the fiber that
  /// was dispatched last.
  ///
  /// Rotation starts at slot 0 when there is no previous fiber, or the
  /// previous fiber is gone. Under `Policy::Priority` it also restarts at
  /// slot 0 whenever the next slot belongs to another priority band.
  pub fn pick(&self, previous: Option<FiberId>, policy: Policy) -> Option<FiberId> {
    if self.fibers.is_empty() {
      return None
    }

    let slot = match previous.and_then(|id| self.position(id)) {
      None => 0,
      Some(previous) => {
        let candidate = (previous + 1) % self.fibers.len();
        match policy {
          Policy::Priority if self.fibers[candidate].priority != self.fibers[previous].priority => {
            trace!("rotation leaves band {}, restarting at the front", self.fibers[previous].priority);
            0
          }
          _ => candidate
        }
      }
    };
    Some(self.fibers[slot].id)
  }
}

#[cfg(test)]
mod tests {
  use super::Table;
  use crate::arch::StackPointer;
  use crate::config::Policy;
  use crate::fiber::{Fiber, FiberId, Priority, State};

  // Entries without stacks or bodies are enough to exercise ordering.
  type TestTable = Table<(), ()>;

  fn table(priorities: &[u8]) -> (TestTable, Vec<FiberId>) {
    let mut table = Table::new(16);
    let mut ids = Vec::new();
    let mut id = FiberId::first();
    for &priority in priorities {
      table.insert(Fiber {
        id:       id,
        priority: Priority::new(priority).unwrap(),
        state:    State::Ready,
        context:  unsafe { std::mem::zeroed::<StackPointer>() },
        body:     None,
        stack:    (),
      });
      ids.push(id);
      id = id.next();
    }
    (table, ids)
  }

  fn priorities(table: &TestTable) -> Vec<u8> {
    table.iter().map(|fiber| fiber.priority.get()).collect()
  }

  fn order(table: &TestTable) -> Vec<FiberId> {
    table.iter().map(|fiber| fiber.id).collect()
  }

  #[test]
  fn insert_keeps_order() {
    let (table, ids) = table(&[50, 10, 50, 20]);
    assert_eq!(priorities(&table), [10, 20, 50, 50]);
    assert_eq!(order(&table), [ids[1], ids[3], ids[0], ids[2]]);
  }

  #[test]
  fn sort_is_stable() {
    let (mut table, ids) = table(&[30, 30, 30]);
    table.get_mut(ids[0]).unwrap().priority = Priority::new(40).unwrap();
    table.sort();
    assert_eq!(order(&table), [ids[1], ids[2], ids[0]]);
  }

  #[test]
  fn remove_swaps_last_in_and_resorts() {
    let (mut table, ids) = table(&[10, 20, 30, 40]);
    let (removed, moved) = table.remove(ids[0]).unwrap();
    assert_eq!(removed.id, ids[0]);
    assert_eq!(moved, Some(ids[3]));
    assert_eq!(priorities(&table), [20, 30, 40]);
    assert!(table.remove(ids[0]).is_none());
    assert_eq!(table.len(), 3);
  }

  #[test]
  fn remove_last_slot() {
    let (mut table, ids) = table(&[10, 20]);
    let (_, moved) = table.remove(ids[1]).unwrap();
    assert_eq!(moved, None);
    assert_eq!(order(&table), [ids[0]]);
  }

  #[test]
  fn pick_rotates_within_band() {
    let (table, ids) = table(&[10, 10, 20]);
    assert_eq!(table.pick(None, Policy::Priority), Some(ids[0]));
    assert_eq!(table.pick(Some(ids[0]), Policy::Priority), Some(ids[1]));
    assert_eq!(table.pick(Some(ids[1]), Policy::Priority), Some(ids[0]));
  }

  #[test]
  fn pick_round_robin_crosses_bands() {
    let (table, ids) = table(&[10, 10, 20]);
    assert_eq!(table.pick(Some(ids[1]), Policy::RoundRobin), Some(ids[2]));
    assert_eq!(table.pick(Some(ids[2]), Policy::RoundRobin), Some(ids[0]));
  }

  #[test]
  fn pick_after_previous_is_gone() {
    let (mut table, ids) = table(&[10, 10, 10]);
    table.remove(ids[1]).unwrap();
    assert_eq!(table.pick(Some(ids[1]), Policy::Priority), Some(ids[0]));
  }

  #[test]
  fn pick_continues_from_moved_entry() {
    let (mut table, ids) = table(&[30, 30, 30]);
    let (_, moved) = table.remove(ids[0]).unwrap();
    assert_eq!(moved, Some(ids[2]));
    assert_eq!(order(&table), [ids[2], ids[1]]);
    assert_eq!(table.pick(moved, Policy::Priority), Some(ids[1]));
  }

  #[test]
  fn pick_empty() {
    let (table, _) = table(&[]);
    assert_eq!(table.pick(None, Policy::Priority), None);
  }

  #[test]
  fn capacity() {
    let (table, _) = table(&[1, 2, 3]);
    assert_eq!(table.capacity(), 16);
    assert!(!table.is_full());
  }
}
