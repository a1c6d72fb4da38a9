//! Iteration state threaded through the levels of a nested table.

use crate::data::Row;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Per-level position of an iteration over a nested table.
///
/// Level 0 is the leaf and level `levels() - 1` the root. The driving iterator mutates
/// a cursor in place; anything that must outlive the next step takes a [`Cursor::copy`].
pub struct Cursor {
    rows: Vec<Option<Row>>,
    recnum: Vec<usize>,
    current: usize,
    what: Option<Rc<dyn Any>>,
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("recnum", &self.recnum)
            .field("current", &self.current)
            .field("rows", &self.rows.iter().map(Option::is_some).collect::<Vec<_>>())
            .finish()
    }
}

impl Cursor {
    /// A cursor over `levels` levels, positioned at the leaf.
    pub fn new(levels: usize) -> Self {
        Self {
            rows: vec![None; levels],
            recnum: vec![0; levels],
            current: 0,
            what: None,
        }
    }

    /// Number of levels.
    pub fn levels(&self) -> usize {
        self.rows.len()
    }

    /// Current level.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Move to another level.
    pub fn set_current_index(&mut self, level: usize) {
        debug_assert!(level < self.levels());
        self.current = level;
    }

    /// Store the row and record number of a level.
    pub fn set_row(&mut self, level: usize, row: Row, recnum: usize) {
        self.rows[level] = Some(row);
        self.recnum[level] = recnum;
    }

    /// Replace the row of a level, keeping its record number.
    pub fn replace_row(&mut self, level: usize, row: Row) {
        self.rows[level] = Some(row);
    }

    /// Row of a level, if set.
    pub fn row(&self, level: usize) -> Option<&Row> {
        self.rows.get(level).and_then(Option::as_ref)
    }

    /// Record number of a level.
    pub fn recnum(&self, level: usize) -> usize {
        self.recnum[level]
    }

    /// Row of the level above the current one.
    pub fn parent_row(&self) -> Option<&Row> {
        self.row(self.current + 1)
    }

    /// Record number of the level above the current one.
    pub fn parent_recnum(&self) -> usize {
        self.recnum[self.current + 1]
    }

    /// All rows, leaf first.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().flatten()
    }

    /// Independent snapshot. Rows and record numbers are copied; the
    /// back-reference set with [`Cursor::set_what`] is shared.
    pub fn copy(&self) -> Cursor {
        Cursor {
            rows: self.rows.clone(),
            recnum: self.recnum.clone(),
            current: self.current,
            what: self.what.clone(),
        }
    }

    /// Opaque back-reference carried along with the cursor.
    ///
    /// Station collections set the owning `StationFeature`, section collections the section
    /// name. Downcast with [`Rc::downcast`] or `downcast_ref`.
    pub fn what(&self) -> Option<&Rc<dyn Any>> {
        self.what.as_ref()
    }

    /// Set the opaque back-reference.
    pub fn set_what(&mut self, what: Rc<dyn Any>) {
        self.what = Some(what);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataType, Member, Value};

    fn row(v: f64) -> Row {
        Row::from_fields("obs", vec![(Member::new("temp", DataType::Double), Value::Double(v))])
    }

    #[test]
    fn copy_is_independent_of_later_mutation() {
        let mut cursor = Cursor::new(2);
        cursor.set_row(1, row(100.0), 7);
        cursor.set_row(0, row(1.0), 0);
        let snapshot = cursor.copy();

        cursor.set_row(0, row(2.0), 1);
        cursor.set_row(1, row(200.0), 8);
        cursor.set_current_index(1);

        assert_eq!(snapshot.row(0).unwrap().scalar_f64("temp"), Some(1.0));
        assert_eq!(snapshot.row(1).unwrap().scalar_f64("temp"), Some(100.0));
        assert_eq!(snapshot.recnum(1), 7);
        assert_eq!(snapshot.current_index(), 0);
    }

    #[test]
    fn copy_shares_back_reference() {
        let mut cursor = Cursor::new(1);
        cursor.set_what(Rc::new(String::from("station 3")));
        let snapshot = cursor.copy();
        assert!(Rc::ptr_eq(snapshot.what().unwrap(), cursor.what().unwrap()));
    }

    #[test]
    fn parent_accessors_read_level_above() {
        let mut cursor = Cursor::new(3);
        cursor.set_row(2, row(3.0), 2);
        cursor.set_row(1, row(2.0), 5);
        cursor.set_current_index(1);
        assert_eq!(cursor.parent_recnum(), 2);
        assert_eq!(cursor.parent_row().unwrap().scalar_f64("temp"), Some(3.0));
    }
}
