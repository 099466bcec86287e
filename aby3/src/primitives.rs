//! Capabilities consumed from the replicated secret-sharing engine.
//!
//! The dispatch layer depends only on these traits. Every method performs one
//! protocol step and writes its result into a destination supplied by the caller;
//! implementations may block on communication with the other two parties.

use crate::error::PrimitiveResult;
use crate::share::{BoolShare, FixedShare, FixedShareMut, MirroredFixedTensor};
use ndarray::prelude::*;

/// Arithmetic, activations and comparisons over fixed-point shares.
pub trait FixedPointPrimitives {
    fn add(&self, x: &FixedShare, y: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    fn sub(&self, x: &FixedShare, y: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    fn neg(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    /// Reduces all elements into a single-element destination.
    fn sum(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    fn mul(&self, x: &FixedShare, y: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    /// Multiplication by a public fixed-point tensor of the same shape.
    fn mul_public(
        &self,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut FixedShareMut,
    ) -> PrimitiveResult<()>;

    fn matmul(&self, x: &FixedShare, y: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    fn relu(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    fn sigmoid(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    fn softmax(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()>;

    fn greater_than(
        &self,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut BoolShare,
    ) -> PrimitiveResult<()>;

    fn less_than(
        &self,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut BoolShare,
    ) -> PrimitiveResult<()>;

    fn equal(
        &self,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut BoolShare,
    ) -> PrimitiveResult<()>;
}

/// Operations on boolean shares produced by comparisons.
pub trait BooleanPrimitives {
    /// Selects `x` where the bit is set and zero elsewhere.
    fn mul_fixed(
        &self,
        b: &BoolShare,
        x: &FixedShare,
        z: &mut FixedShareMut,
    ) -> PrimitiveResult<()>;

    /// Opens the boolean share into a plaintext tensor of 0/1 values.
    fn reveal(&self, b: &BoolShare, out: &mut ArrayViewMutD<i64>) -> PrimitiveResult<()>;
}

/// Allocation of raw int64 buffers by the host runtime.
pub trait TensorFactory {
    /// Returns a fresh, zero-initialised buffer that aliases no other tensor.
    fn create_int64(&self, shape: &[usize]) -> ArrayD<i64>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostTensorFactory;

impl TensorFactory for HostTensorFactory {
    fn create_int64(&self, shape: &[usize]) -> ArrayD<i64> {
        ArrayD::zeros(IxDyn(shape))
    }
}
