//! Forward-only, restartable row iterators.

use super::structure::Structure;
use super::value::Row;
use crate::error::Result;
use std::fmt;
use std::rc::Rc;

/// Iterator over the rows of one table for one parent context.
pub trait RowIterator: Iterator<Item = Result<Row>> {
    /// Record number of the row most recently returned.
    fn current_recno(&self) -> Option<usize>;

    /// Restart from the first row.
    fn reset(&mut self);
}

/// Boxed row iterator, as returned by the table variants.
pub type BoxRowIter = Box<dyn RowIterator>;

/// An iterator that yields nothing.
pub fn empty() -> BoxRowIter {
    Box::new(RowsIter::new(Rc::from(Vec::new())))
}

/// Sequential scan of a whole structure.
#[derive(Debug)]
pub struct StructureIter {
    structure: Structure,
    next: usize,
    current: Option<usize>,
}

impl StructureIter {
    /// Scan `structure` from the first row.
    pub fn new(structure: Structure) -> Self {
        Self {
            structure,
            next: 0,
            current: None,
        }
    }
}

impl Iterator for StructureIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.structure.num_rows() {
            return None;
        }
        let recno = self.next;
        self.next += 1;
        self.current = Some(recno);
        Some(self.structure.read_row(recno))
    }
}

impl RowIterator for StructureIter {
    fn current_recno(&self) -> Option<usize> {
        self.current
    }

    fn reset(&mut self) {
        self.next = 0;
        self.current = None;
    }
}

/// Rows `[start, end)` of a structure.
#[derive(Debug)]
pub struct RangeIter {
    structure: Structure,
    start: usize,
    end: usize,
    next: usize,
    current: Option<usize>,
}

impl RangeIter {
    /// Iterate `count` rows starting at `start`, clipped to the structure length.
    pub fn new(structure: Structure, start: usize, count: usize) -> Self {
        let end = start.saturating_add(count).min(structure.num_rows());
        Self {
            structure,
            start,
            end,
            next: start,
            current: None,
        }
    }
}

impl Iterator for RangeIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let recno = self.next;
        self.next += 1;
        self.current = Some(recno);
        Some(self.structure.read_row(recno))
    }
}

impl RowIterator for RangeIter {
    fn current_recno(&self) -> Option<usize> {
        self.current
    }

    fn reset(&mut self) {
        self.next = self.start;
        self.current = None;
    }
}

/// Rows of a structure at an explicit list of record numbers.
#[derive(Debug)]
pub struct IndexedIter {
    structure: Structure,
    indices: Rc<[usize]>,
    pos: usize,
    current: Option<usize>,
}

impl IndexedIter {
    /// Iterate the rows at `indices`, in the order given.
    pub fn new(structure: Structure, indices: Rc<[usize]>) -> Self {
        Self {
            structure,
            indices,
            pos: 0,
            current: None,
        }
    }
}

impl Iterator for IndexedIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let recno = *self.indices.get(self.pos)?;
        self.pos += 1;
        self.current = Some(recno);
        Some(self.structure.read_row(recno))
    }
}

impl RowIterator for IndexedIter {
    fn current_recno(&self) -> Option<usize> {
        self.current
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.current = None;
    }
}

/// Chase of a next-pointer chain through a structure.
///
/// The chain ends at a negative or out-of-range pointer, and never takes more steps
/// than the structure has rows, so a cyclic chain terminates.
#[derive(Debug)]
pub struct LinkedIter {
    structure: Structure,
    first: Option<usize>,
    next_member: String,
    next: Option<usize>,
    steps: usize,
    current: Option<usize>,
}

impl LinkedIter {
    /// Start at `first`; `next_member` holds each row's successor.
    pub fn new(structure: Structure, first: Option<usize>, next_member: impl Into<String>) -> Self {
        Self {
            structure,
            first,
            next_member: next_member.into(),
            next: first,
            steps: 0,
            current: None,
        }
    }
}

impl Iterator for LinkedIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let recno = self.next?;
        if recno >= self.structure.num_rows() || self.steps >= self.structure.num_rows() {
            self.next = None;
            return None;
        }
        self.steps += 1;
        self.current = Some(recno);
        match self.structure.read_row(recno) {
            Ok(row) => {
                self.next = row
                    .scalar_i64(&self.next_member)
                    .filter(|&n| n >= 0)
                    .map(|n| n as usize);
                Some(Ok(row))
            },
            Err(e) => {
                self.next = None;
                Some(Err(e))
            },
        }
    }
}

impl RowIterator for LinkedIter {
    fn current_recno(&self) -> Option<usize> {
        self.current
    }

    fn reset(&mut self) {
        self.next = self.first;
        self.steps = 0;
        self.current = None;
    }
}

/// Iterator over rows already in memory. The record number is the position.
#[derive(Debug)]
pub struct RowsIter {
    rows: Rc<[Row]>,
    pos: usize,
    current: Option<usize>,
}

impl RowsIter {
    /// Iterate over `rows`.
    pub fn new(rows: Rc<[Row]>) -> Self {
        Self {
            rows,
            pos: 0,
            current: None,
        }
    }
}

impl Iterator for RowsIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.get(self.pos)?.clone();
        self.current = Some(self.pos);
        self.pos += 1;
        Some(Ok(row))
    }
}

impl RowIterator for RowsIter {
    fn current_recno(&self) -> Option<usize> {
        self.current
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.current = None;
    }
}

/// A single row with record number 0.
#[derive(Debug)]
pub struct SingletonIter {
    row: Row,
    done: bool,
}

impl SingletonIter {
    /// Yield `row` once.
    pub fn new(row: Row) -> Self {
        Self { row, done: false }
    }
}

impl Iterator for SingletonIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(Ok(self.row.clone()))
    }
}

impl RowIterator for SingletonIter {
    fn current_recno(&self) -> Option<usize> {
        self.done.then_some(0)
    }

    fn reset(&mut self) {
        self.done = false;
    }
}

/// Caps another iterator at a maximum number of rows.
pub struct LimitedIter {
    inner: BoxRowIter,
    limit: usize,
    count: usize,
}

impl LimitedIter {
    /// Yield at most `limit` rows of `inner`.
    pub fn new(inner: BoxRowIter, limit: usize) -> Self {
        Self {
            inner,
            limit,
            count: 0,
        }
    }
}

impl fmt::Debug for LimitedIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimitedIter")
            .field("limit", &self.limit)
            .field("count", &self.count)
            .field("recno", &self.inner.current_recno())
            .finish()
    }
}

impl Iterator for LimitedIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.count >= self.limit {
            return None;
        }
        self.count += 1;
        self.inner.next()
    }
}

impl RowIterator for LimitedIter {
    fn current_recno(&self) -> Option<usize> {
        self.inner.current_recno()
    }

    fn reset(&mut self) {
        self.count = 0;
        self.inner.reset();
    }
}

/// Wrap `iter` in a [`LimitedIter`] when a limit is given.
pub fn limited(iter: BoxRowIter, limit: Option<usize>) -> BoxRowIter {
    match limit {
        Some(n) => Box::new(LimitedIter::new(iter, n)),
        None => iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataType, Dataset, MemoryDataset};

    fn obs() -> Structure {
        let mut ds = MemoryDataset::new("mem");
        ds.add_dimension("obs", 5);
        ds.add_numeric("temp", &["obs"], DataType::Float, vec![0.0, 1.0, 2.0, 3.0, 4.0])
            .unwrap();
        ds.add_numeric("next", &["obs"], DataType::Int, vec![2.0, 1.0, 4.0, -1.0, -1.0])
            .unwrap();
        let ds: Rc<dyn Dataset> = Rc::new(ds);
        Structure::pseudo(&ds, "obs", "obs", None).unwrap()
    }

    fn temps(iter: impl Iterator<Item = Result<Row>>) -> Vec<f64> {
        iter.map(|r| r.unwrap().scalar_f64("temp").unwrap()).collect()
    }

    #[test]
    fn linked_chain_follows_next() {
        let mut iter = LinkedIter::new(obs(), Some(0), "next");
        assert_eq!(temps(&mut iter), vec![0.0, 2.0, 4.0]);
        iter.reset();
        assert_eq!(temps(iter), vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn linked_cycle_terminates() {
        // row 1 points to itself
        let iter = LinkedIter::new(obs(), Some(1), "next");
        assert_eq!(temps(iter).len(), 5);
    }

    #[test]
    fn range_is_clipped() {
        let iter = RangeIter::new(obs(), 3, 10);
        assert_eq!(temps(iter), vec![3.0, 4.0]);
    }

    #[test]
    fn limit_and_recno() {
        let mut iter = LimitedIter::new(Box::new(IndexedIter::new(obs(), Rc::from(vec![4, 1, 0]))), 2);
        assert!(iter.next().is_some());
        assert_eq!(iter.current_recno(), Some(4));
        assert!(iter.next().is_some());
        assert_eq!(iter.current_recno(), Some(1));
        assert!(iter.next().is_none());
    }

    #[test]
    fn limited_debug_shows_progress() {
        let mut iter = LimitedIter::new(Box::new(RangeIter::new(obs(), 0, 5)), 3);
        iter.next();
        let text = format!("{:?}", iter);
        assert!(text.starts_with("LimitedIter"));
        assert!(text.contains("limit: 3"));
        assert!(text.contains("count: 1"));
    }
}
