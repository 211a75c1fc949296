//! Compressed sparse row storage for term-weight vectors.
//!
//! Column indices within a row are always sorted ascending, which lets a
//! row be multiplied with a query vector by a linear merge.

use serde::{Deserialize, Serialize};

/// A sparse vector with sorted, unique column indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl SparseVector {
    /// Builds a vector from `(column, value)` pairs.
    ///
    /// Pairs are sorted by column; zero values are dropped. Duplicate
    /// columns are summed.
    #[must_use]
    pub fn from_pairs(mut pairs: Vec<(u32, f32)>) -> Self {
        pairs.sort_unstable_by_key(|(col, _)| *col);

        let mut indices: Vec<u32> = Vec::with_capacity(pairs.len());
        let mut values: Vec<f32> = Vec::with_capacity(pairs.len());

        for (col, value) in pairs {
            if indices.last() == Some(&col) {
                if let Some(last) = values.last_mut() {
                    *last += value;
                }
            } else {
                indices.push(col);
                values.push(value);
            }
        }

        let (indices, values) = indices
            .into_iter()
            .zip(values)
            .filter(|(_, v)| *v != 0.0)
            .unzip();

        Self { indices, values }
    }

    /// Column indices, ascending.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Values parallel to [`Self::indices`].
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of stored entries.
    #[must_use]
    pub const fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if the vector has no stored entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Euclidean norm.
    #[must_use]
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Scales the vector to unit length. Zero vectors are left unchanged.
    pub fn l2_normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
    }
}

/// Dot product of two sorted sparse slices.
fn sparse_dot(a_idx: &[u32], a_val: &[f32], b_idx: &[u32], b_val: &[f32]) -> f32 {
    let mut i = 0;
    let mut j = 0;
    let mut sum = 0.0f32;

    while i < a_idx.len() && j < b_idx.len() {
        match a_idx[i].cmp(&b_idx[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a_val[i] * b_val[j];
                i += 1;
                j += 1;
            }
        }
    }

    sum
}

/// A row-major sparse matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f32>,
}

impl SparseMatrix {
    /// Creates an empty matrix with `n_cols` columns and no rows.
    #[must_use]
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Builds a matrix from sparse rows.
    #[must_use]
    pub fn from_rows(n_cols: usize, rows: impl IntoIterator<Item = SparseVector>) -> Self {
        let mut matrix = Self::new(n_cols);
        for row in rows {
            matrix.push_row(&row);
        }
        matrix
    }

    /// Appends a row.
    ///
    /// # Panics
    ///
    /// Panics if the row references a column outside the matrix.
    pub fn push_row(&mut self, row: &SparseVector) {
        if let Some(&last) = row.indices().last() {
            assert!(
                (last as usize) < self.n_cols,
                "column {last} out of range for {} columns",
                self.n_cols
            );
        }
        self.indices.extend_from_slice(row.indices());
        self.data.extend_from_slice(row.values());
        self.indptr.push(self.indices.len());
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    /// Number of columns.
    #[must_use]
    pub const fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored entries.
    #[must_use]
    pub const fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Column indices and values of row `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of range.
    #[must_use]
    pub fn row(&self, row: usize) -> (&[u32], &[f32]) {
        let start = self.indptr[row];
        let end = self.indptr[row + 1];
        (&self.indices[start..end], &self.data[start..end])
    }

    /// Dot product of row `row` with `vector`.
    #[must_use]
    pub fn row_dot(&self, row: usize, vector: &SparseVector) -> f32 {
        let (idx, val) = self.row(row);
        sparse_dot(idx, val, vector.indices(), vector.values())
    }

    /// Dot product of every row with `vector`, in row order.
    #[must_use]
    pub fn dot_all(&self, vector: &SparseVector) -> Vec<f32> {
        if vector.is_empty() {
            return vec![0.0; self.n_rows()];
        }
        (0..self.n_rows()).map(|r| self.row_dot(r, vector)).collect()
    }

    /// Checks internal consistency after deserialization.
    ///
    /// Returns a description of the first problem found.
    #[must_use]
    pub fn validate(&self) -> Option<String> {
        if self.indptr.first() != Some(&0) {
            return Some("indptr must start at 0".to_string());
        }
        if self.indptr.last() != Some(&self.indices.len()) {
            return Some("indptr must end at nnz".to_string());
        }
        if self.indices.len() != self.data.len() {
            return Some("indices and data lengths differ".to_string());
        }
        if let Some(r) = self.indptr.windows(2).position(|w| w[0] > w[1]) {
            return Some(format!("indptr decreases at row {r}"));
        }
        for r in 0..self.n_rows() {
            let (idx, _) = self.row(r);
            if idx.windows(2).any(|w| w[0] >= w[1]) {
                return Some(format!("row {r} has unsorted column indices"));
            }
            if idx.last().is_some_and(|&c| c as usize >= self.n_cols) {
                return Some(format!("row {r} has a column out of range"));
            }
        }
        None
    }
}
