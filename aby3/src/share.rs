//! Secret-shared and mirrored values handed to the primitive layer.
//!
//! A party holds two of the three replicated shares. Fixed-point shares borrow
//! the two slices of a share-packed tensor; boolean shares own a fresh pair of
//! buffers for the lifetime of a single comparison.

use crate::error::{PrimitiveError, PrimitiveResult};
use ndarray::prelude::*;

/// Fixed-point value held as two borrowed share slices.
#[derive(Clone, Debug)]
pub struct FixedShare<'a> {
    pub(crate) shares: [ArrayViewD<'a, i64>; 2],
    pub(crate) fractional_precision: u32,
}

impl<'a> FixedShare<'a> {
    pub fn shares(&self) -> &[ArrayViewD<'a, i64>; 2] {
        &self.shares
    }

    pub fn shape(&self) -> &[usize] {
        self.shares[0].shape()
    }

    pub fn fractional_precision(&self) -> u32 {
        self.fractional_precision
    }
}

/// Writable fixed-point destination, aliasing the two slices of a caller-owned output.
#[derive(Debug)]
pub struct FixedShareMut<'a> {
    pub(crate) shares: [ArrayViewMutD<'a, i64>; 2],
    pub(crate) fractional_precision: u32,
}

impl<'a> FixedShareMut<'a> {
    pub fn shares_mut(&mut self) -> &mut [ArrayViewMutD<'a, i64>; 2] {
        &mut self.shares
    }

    pub fn shape(&self) -> &[usize] {
        self.shares[0].shape()
    }

    pub fn fractional_precision(&self) -> u32 {
        self.fractional_precision
    }
}

/// Boolean value held as two raw int64 buffers, one bit per element.
#[derive(Clone, Debug, PartialEq)]
pub struct BoolShare {
    shares: [ArrayD<i64>; 2],
}

impl BoolShare {
    /// Builds a boolean share over two raw buffers of identical shape.
    pub fn new(share0: ArrayD<i64>, share1: ArrayD<i64>) -> PrimitiveResult<Self> {
        if share0.shape() != share1.shape() {
            return Err(PrimitiveError::ShapeMismatch {
                lhs: share0.shape().to_vec(),
                rhs: share1.shape().to_vec(),
            });
        }
        Ok(BoolShare {
            shares: [share0, share1],
        })
    }

    pub fn shares(&self) -> &[ArrayD<i64>; 2] {
        &self.shares
    }

    pub fn shares_mut(&mut self) -> &mut [ArrayD<i64>; 2] {
        &mut self.shares
    }

    pub fn shape(&self) -> &[usize] {
        self.shares[0].shape()
    }
}

/// Public fixed-point tensor, encoded identically by every party.
#[derive(Clone, Debug, PartialEq)]
pub struct MirroredFixedTensor {
    pub tensor: ArrayD<i64>,
    pub fractional_precision: u32,
}

impl MirroredFixedTensor {
    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_share_requires_matching_buffers() {
        let ok = BoolShare::new(ArrayD::zeros(IxDyn(&[3])), ArrayD::zeros(IxDyn(&[3])));
        assert_eq!(ok.unwrap().shape(), &[3]);

        let err = BoolShare::new(ArrayD::zeros(IxDyn(&[3])), ArrayD::zeros(IxDyn(&[2, 2])));
        assert_eq!(
            err,
            Err(PrimitiveError::ShapeMismatch {
                lhs: vec![3],
                rhs: vec![2, 2]
            })
        );
    }
}
