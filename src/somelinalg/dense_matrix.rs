//! Dense matrix used to store Jacobians. Same copy-on-write scheme as `NVector`.
use crate::somelinalg::nvector::NVector;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

#[derive(Clone, PartialEq)]
pub struct DenseMatrix {
    data: Arc<DMatrix<f64>>,
}

impl DenseMatrix {
    pub fn zeros(nrows: usize, ncols: usize) -> DenseMatrix {
        DenseMatrix::from_dmatrix(DMatrix::zeros(nrows, ncols))
    }

    pub fn identity(n: usize) -> DenseMatrix {
        DenseMatrix::from_dmatrix(DMatrix::identity(n, n))
    }

    pub fn from_row_slice(nrows: usize, ncols: usize, data: &[f64]) -> DenseMatrix {
        DenseMatrix::from_dmatrix(DMatrix::from_row_slice(nrows, ncols, data))
    }

    pub fn from_dmatrix(data: DMatrix<f64>) -> DenseMatrix {
        DenseMatrix {
            data: Arc::new(data),
        }
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    pub fn as_dmatrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn as_dmatrix_mut(&mut self) -> &mut DMatrix<f64> {
        Arc::make_mut(&mut self.data)
    }

    pub fn column(&self, j: usize) -> NVector {
        NVector::from_dvector(self.data.column(j).into_owned())
    }

    pub fn set_column(&mut self, j: usize, col: &NVector) {
        assert_eq!(col.len(), self.nrows(), "column length must match number of rows");
        self.as_dmatrix_mut().set_column(j, col.as_dvector());
    }

    pub fn zero(&mut self) {
        self.as_dmatrix_mut().fill(0.0);
    }

    /// A = c*A + I
    pub fn scale_add_identity(&mut self, c: f64) {
        let m = self.as_dmatrix_mut();
        *m *= c;
        let n = m.nrows().min(m.ncols());
        for i in 0..n {
            m[(i, i)] += 1.0;
        }
    }

    /// A = c*A + B
    pub fn scale_add(&mut self, c: f64, B: &DenseMatrix) {
        assert_eq!(self.shape(), B.shape(), "matrix shapes must match");
        let m = self.as_dmatrix_mut();
        *m *= c;
        *m += B.as_dmatrix();
    }

    pub fn matvec(&self, x: &NVector) -> NVector {
        assert_eq!(x.len(), self.ncols(), "vector length must match number of columns");
        let y: DVector<f64> = self.as_dmatrix() * x.as_dvector();
        NVector::from_dvector(y)
    }
}

impl Index<(usize, usize)> for DenseMatrix {
    type Output = f64;
    fn index(&self, ij: (usize, usize)) -> &f64 {
        &self.data[ij]
    }
}

impl IndexMut<(usize, usize)> for DenseMatrix {
    fn index_mut(&mut self, ij: (usize, usize)) -> &mut f64 {
        &mut self.as_dmatrix_mut()[ij]
    }
}

impl fmt::Debug for DenseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

impl From<DMatrix<f64>> for DenseMatrix {
    fn from(data: DMatrix<f64>) -> DenseMatrix {
        DenseMatrix::from_dmatrix(data)
    }
}
