//! Numeric vector used by the nonlinear solvers.
//!
//! `NVector` has value semantics: cloning is cheap because the backing
//! `DVector<f64>` is shared, and the storage is copied only when a shared
//! vector is mutated (copy-on-write through `Arc::make_mut`).
use nalgebra::DVector;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

#[derive(Clone)]
pub struct NVector {
    data: Arc<DVector<f64>>,
}

impl NVector {
    pub fn zeros(n: usize) -> NVector {
        NVector::from_dvector(DVector::zeros(n))
    }

    pub fn from_element(n: usize, value: f64) -> NVector {
        NVector::from_dvector(DVector::from_element(n, value))
    }

    pub fn from_vec(data: Vec<f64>) -> NVector {
        NVector::from_dvector(DVector::from_vec(data))
    }

    pub fn from_slice(data: &[f64]) -> NVector {
        NVector::from_dvector(DVector::from_column_slice(data))
    }

    pub fn from_dvector(data: DVector<f64>) -> NVector {
        NVector {
            data: Arc::new(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// true while another clone still shares the same storage
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    pub fn as_dvector(&self) -> &DVector<f64> {
        &self.data
    }

    /// Mutable access to the storage. Detaches from other clones first.
    pub fn as_dvector_mut(&mut self) -> &mut DVector<f64> {
        Arc::make_mut(&mut self.data)
    }

    pub fn into_dvector(self) -> DVector<f64> {
        Arc::try_unwrap(self.data).unwrap_or_else(|shared| (*shared).clone())
    }

    pub fn as_slice(&self) -> &[f64] {
        self.data.as_slice()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }

    pub fn get(&self, i: usize) -> f64 {
        self.data[i]
    }

    pub fn set(&mut self, i: usize, value: f64) {
        self.as_dvector_mut()[i] = value;
    }

    pub fn fill(&mut self, value: f64) {
        self.as_dvector_mut().fill(value);
    }

    /////////////////////////////////////////////////////////////////////////
    //                  ARITHMETIC
    /////////////////////////////////////////////////////////////////////////
    /// z = a*x + b*y
    pub fn linear_sum(a: f64, x: &NVector, b: f64, y: &NVector) -> NVector {
        assert_eq!(x.len(), y.len(), "vectors must have the same length");
        NVector::from_dvector(x.as_dvector() * a + y.as_dvector() * b)
    }

    /// self = self + a*x
    pub fn axpy(&mut self, a: f64, x: &NVector) {
        assert_eq!(self.len(), x.len(), "vectors must have the same length");
        self.as_dvector_mut().axpy(a, x.as_dvector(), 1.0);
    }

    pub fn scale(&self, c: f64) -> NVector {
        NVector::from_dvector(self.as_dvector() * c)
    }

    pub fn scale_mut(&mut self, c: f64) {
        *self.as_dvector_mut() *= c;
    }

    pub fn add(&self, other: &NVector) -> NVector {
        NVector::linear_sum(1.0, self, 1.0, other)
    }

    pub fn sub(&self, other: &NVector) -> NVector {
        NVector::linear_sum(1.0, self, -1.0, other)
    }

    pub fn component_mul(&self, other: &NVector) -> NVector {
        NVector::from_dvector(self.as_dvector().component_mul(other.as_dvector()))
    }

    pub fn component_div(&self, other: &NVector) -> NVector {
        NVector::from_dvector(self.as_dvector().component_div(other.as_dvector()))
    }

    pub fn abs(&self) -> NVector {
        NVector::from_dvector(self.as_dvector().abs())
    }

    /// elementwise 1/x
    pub fn inv(&self) -> NVector {
        NVector::from_dvector(self.as_dvector().map(|x| 1.0 / x))
    }

    /////////////////////////////////////////////////////////////////////////
    //                  REDUCTIONS
    /////////////////////////////////////////////////////////////////////////
    pub fn dot(&self, other: &NVector) -> f64 {
        self.as_dvector().dot(other.as_dvector())
    }

    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_norm(&self) -> f64 {
        self.data.iter().fold(0.0, |acc, x| acc.max(x.abs()))
    }

    pub fn l1_norm(&self) -> f64 {
        self.data.iter().map(|x| x.abs()).sum()
    }

    pub fn l2_norm(&self) -> f64 {
        self.as_dvector().norm()
    }

    /// sqrt( sum (x_i*w_i)^2 / n )
    pub fn wrms_norm(&self, weights: &NVector) -> f64 {
        let n = self.len();
        if n == 0 {
            return 0.0;
        }
        (self.component_mul(weights).as_dvector().norm_squared() / n as f64).sqrt()
    }

    /// sqrt( sum (x_i*w_i)^2 )
    pub fn wl2_norm(&self, weights: &NVector) -> f64 {
        self.component_mul(weights).l2_norm()
    }

    /// max |x_i*w_i|
    pub fn wmax_norm(&self, weights: &NVector) -> f64 {
        self.data
            .iter()
            .zip(weights.iter())
            .fold(0.0, |acc, (x, w)| acc.max((x * w).abs()))
    }

    /// min over i with denom_i != 0 of num_i / denom_i; f64::MAX if there is no such i
    pub fn min_quotient(num: &NVector, denom: &NVector) -> f64 {
        num.iter()
            .zip(denom.iter())
            .filter(|(_, d)| **d != 0.0)
            .map(|(n, d)| n / d)
            .fold(f64::MAX, f64::min)
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|x| x.is_finite())
    }
}

impl Index<usize> for NVector {
    type Output = f64;
    fn index(&self, i: usize) -> &f64 {
        &self.data[i]
    }
}

impl IndexMut<usize> for NVector {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.as_dvector_mut()[i]
    }
}

impl PartialEq for NVector {
    fn eq(&self, other: &NVector) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || self.data == other.data
    }
}

impl fmt::Debug for NVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.data.iter()).finish()
    }
}

impl fmt::Display for NVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, x) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", x)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<f64>> for NVector {
    fn from(data: Vec<f64>) -> NVector {
        NVector::from_vec(data)
    }
}

impl From<DVector<f64>> for NVector {
    fn from(data: DVector<f64>) -> NVector {
        NVector::from_dvector(data)
    }
}
