//! Row-major matrix storage for posterior draws.

use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}
impl<T> Matrix<T> {
    pub fn allocate(rows: usize, cols: usize) -> Self
    where
        T: Default + Clone,
    {
        let (len, overflow) = rows.overflowing_mul(cols);
        assert!(!overflow, "allocation of a {rows}x{cols} matrix failed due to overflow");
        let data = vec![T::default(); len];
        Self { data, rows, cols }
    }

    /// An empty matrix with a fixed number of columns, to be grown with [`Matrix::push_row`].
    pub fn with_cols(cols: usize) -> Self {
        Self {
            data: vec![],
            rows: 0,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row_slice(&self, row: usize) -> &[T] {
        debug_assert!(self.validate_row_index(row));
        let row_start = row * self.cols;
        &self.data[row_start..(row_start + self.cols)]
    }

    pub fn row_slice_mut(&mut self, row: usize) -> &mut [T] {
        debug_assert!(self.validate_row_index(row));
        let row_start = row * self.cols;
        &mut self.data[row_start..(row_start + self.cols)]
    }

    pub fn push_row(&mut self, row: &[T])
    where
        T: Clone,
    {
        assert_eq!(
            self.cols,
            row.len(),
            "row of length {} pushed into a matrix with {} columns",
            row.len(),
            self.cols
        );
        self.data.extend_from_slice(row);
        self.rows += 1;
    }

    /// Appends the rows of `other` below the rows of `self`.
    pub fn append(&mut self, other: Matrix<T>) {
        assert_eq!(
            self.cols, other.cols,
            "cannot append a {}x{} matrix to a {}x{} matrix",
            other.rows, other.cols, self.rows, self.cols
        );
        self.data.extend(other.data);
        self.rows += other.rows;
    }

    pub fn col_iter(&self, col: usize) -> impl Iterator<Item = &T> {
        debug_assert!(self.validate_col_index(col));
        self.data.iter().skip(col).step_by(self.cols.max(1)).take(self.rows)
    }

    pub fn col_to_vec(&self, col: usize) -> Vec<T>
    where
        T: Clone,
    {
        self.col_iter(col).cloned().collect()
    }

    fn validate_row_index(&self, row: usize) -> bool {
        assert!(row < self.rows, "invalid row index {row} for a {}x{} matrix", self.rows, self.cols);
        true
    }

    fn validate_col_index(&self, col: usize) -> bool {
        assert!(col < self.cols, "invalid column index {col} for a {}x{} matrix", self.rows, self.cols);
        true
    }
}

impl<T> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: (usize, usize)) -> &Self::Output {
        let (row, col) = index;
        debug_assert!(self.validate_row_index(row));
        debug_assert!(self.validate_col_index(col));
        &self.data[row * self.cols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for Matrix<T> {
    #[inline]
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        let (row, col) = index;
        debug_assert!(self.validate_row_index(row));
        debug_assert!(self.validate_col_index(col));
        &mut self.data[row * self.cols + col]
    }
}
