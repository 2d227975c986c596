//! The interpreter's memory: a row of cells and a cursor into it.
//!
//! The tape starts small and doubles whenever the cursor moves past the
//! cells allocated so far. It never shrinks, and the cursor can never
//! go below cell zero.

use crate::diagnostics::Error;
use std::num::Wrapping;
use tracing::trace;

#[cfg(test)]
use pretty_assertions::assert_eq;

/// Tape cells are 32-bit signed integers with wrapping arithmetic.
pub type Cell = Wrapping<i32>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape {
    cells: Vec<Cell>,
    cursor: usize,
}

impl Default for Tape {
    fn default() -> Self {
        Tape::with_capacity(1)
    }
}

impl Tape {
    /// A tape of one zeroed cell.
    pub fn new() -> Self {
        Tape::default()
    }

    /// A tape with `capacity` zeroed cells allocated up front. A
    /// capacity of zero is rounded up to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Tape {
            cells: vec![Wrapping(0); capacity.max(1)],
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of cells allocated so far.
    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// The cell at `index`. Cells past the allocated extent read as zero.
    pub fn get(&self, index: usize) -> Cell {
        self.cells.get(index).copied().unwrap_or(Wrapping(0))
    }

    pub fn current(&self) -> Cell {
        self.cells[self.cursor]
    }

    pub fn set_current(&mut self, value: Cell) {
        self.cells[self.cursor] = value;
    }

    pub fn add(&mut self, amount: Cell) {
        self.cells[self.cursor] += amount;
    }

    pub fn sub(&mut self, amount: Cell) {
        self.cells[self.cursor] -= amount;
    }

    pub fn move_forward(&mut self, amount: usize) {
        self.cursor += amount;
        if self.cursor >= self.cells.len() {
            self.grow();
        }
    }

    pub fn move_backward(&mut self, amount: usize) -> Result<(), Error> {
        match self.cursor.checked_sub(amount) {
            Some(cursor) => {
                self.cursor = cursor;
                Ok(())
            }
            None => Err(Error::TapeUnderflow {
                cursor: self.cursor,
                amount,
            }),
        }
    }

    /// Double the allocation until it covers the cursor, zero-filling
    /// the new cells.
    fn grow(&mut self) {
        let mut capacity = self.cells.len();
        while self.cursor >= capacity {
            capacity *= 2;
        }
        trace!(from = self.cells.len(), to = capacity, "growing tape");
        self.cells.resize(capacity, Wrapping(0));
    }
}

#[test]
fn starts_with_one_zero_cell() {
    let tape = Tape::new();
    assert_eq!(tape.capacity(), 1);
    assert_eq!(tape.cursor(), 0);
    assert_eq!(tape.current(), Wrapping(0));
}

#[test]
fn grows_by_doubling() {
    let mut tape = Tape::new();
    tape.move_forward(1);
    assert_eq!(tape.capacity(), 2);
    tape.move_forward(1);
    assert_eq!(tape.capacity(), 4);
    tape.move_forward(5);
    assert_eq!(tape.cursor(), 7);
    assert_eq!(tape.capacity(), 8);
    tape.move_forward(1);
    assert_eq!(tape.capacity(), 16);
}

#[test]
fn growth_keeps_existing_cells() {
    let mut tape = Tape::new();
    tape.add(Wrapping(42));
    tape.move_forward(1000);
    tape.add(Wrapping(7));
    tape.move_backward(1000).unwrap();
    assert_eq!(tape.current(), Wrapping(42));
    assert_eq!(tape.get(1000), Wrapping(7));
    assert!(tape.cells()[1..1000].iter().all(|&c| c == Wrapping(0)));
}

#[test]
fn arithmetic_wraps() {
    let mut tape = Tape::new();
    tape.set_current(Wrapping(i32::MAX));
    tape.add(Wrapping(1));
    assert_eq!(tape.current(), Wrapping(i32::MIN));
    tape.sub(Wrapping(1));
    assert_eq!(tape.current(), Wrapping(i32::MAX));
}

#[test]
fn moving_below_zero_fails() {
    let mut tape = Tape::new();
    tape.move_forward(2);
    match tape.move_backward(3) {
        Err(Error::TapeUnderflow { cursor, amount }) => {
            assert_eq!((cursor, amount), (2, 3));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    // A failed move leaves the cursor where it was.
    assert_eq!(tape.cursor(), 2);
}

#[test]
fn zero_capacity_is_rounded_up() {
    assert_eq!(Tape::with_capacity(0).capacity(), 1);
}
