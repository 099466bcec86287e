//! Tensor operators lowered onto ABY3 fixed-point replicated sharing.
//!
//! Every share-packed operand carries this party's two shares stacked along a
//! leading axis of size 2. Operands are unpacked, handed to exactly one primitive
//! call (or a comparison followed by a reveal), and written into the caller's
//! pre-allocated output. All three parties run the same sequence of primitive
//! calls for the same operation, which keeps the protocol in lockstep.

use crate::comparison::{Comparison, Predicate};
use crate::config::ProtocolConfig;
use crate::error::{Error, PrimitiveError, PrimitiveResult, Result};
use crate::fixedpoint::FixedPointCodec;
use crate::primitives::{
    BooleanPrimitives, FixedPointPrimitives, HostTensorFactory, TensorFactory,
};
use crate::share::{BoolShare, FixedShare, FixedShareMut};
use itertools::Itertools;
use ndarray::prelude::*;

/// Operation table exposed to the host runtime.
pub trait MpcOperators {
    fn add(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()>;

    fn sub(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()>;

    fn neg(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()>;

    fn sum(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()>;

    fn mul(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()>;

    fn matmul(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()>;

    fn scale(&self, lhs: ArrayViewD<i64>, factor: f64, out: ArrayViewMutD<i64>) -> Result<()>;

    fn relu(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()>;

    fn sigmoid(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()>;

    fn softmax(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()>;

    /// Compares a shared `lhs` against a public `rhs`, writing plaintext 0/1 into `out`.
    fn compare(
        &self,
        predicate: Predicate,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<f64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()>;

    /// `dx = (y > point) * dy`, without revealing the mask.
    fn relu_grad(
        &self,
        y: ArrayViewD<i64>,
        dy: ArrayViewD<i64>,
        dx: ArrayViewMutD<i64>,
        point: f64,
    ) -> Result<()>;

    fn gt(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<f64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.compare(Predicate::GT, lhs, rhs, out)
    }

    fn geq(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<f64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.compare(Predicate::GEQ, lhs, rhs, out)
    }

    fn lt(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<f64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.compare(Predicate::LT, lhs, rhs, out)
    }

    fn leq(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<f64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.compare(Predicate::LEQ, lhs, rhs, out)
    }

    fn eq(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<f64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.compare(Predicate::EQ, lhs, rhs, out)
    }

    fn neq(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<f64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.compare(Predicate::NEQ, lhs, rhs, out)
    }
}

fn describe(shapes: &[&[usize]]) -> String {
    shapes.iter().map(|s| format!("{:?}", s)).join(", ")
}

fn primitive_failure(op: &'static str, shapes: String) -> impl FnOnce(PrimitiveError) -> Error {
    move |source| {
        tracing::error!("Primitive failure in '{}' on {}: {}", op, shapes, source);
        Error::PrimitiveFailure { op, shapes, source }
    }
}

/// Dispatch layer over an engine implementing the ABY3 primitives.
pub struct Aby3Operators<P, T = HostTensorFactory> {
    codec: FixedPointCodec,
    engine: P,
    factory: T,
}

impl<P> Aby3Operators<P, HostTensorFactory>
where
    P: FixedPointPrimitives + BooleanPrimitives,
{
    pub fn new(config: &ProtocolConfig, engine: P) -> Result<Self> {
        Self::with_factory(config, engine, HostTensorFactory)
    }
}

impl<P, T> Aby3Operators<P, T>
where
    P: FixedPointPrimitives + BooleanPrimitives,
    T: TensorFactory,
{
    pub fn with_factory(config: &ProtocolConfig, engine: P, factory: T) -> Result<Self> {
        Ok(Aby3Operators {
            codec: FixedPointCodec::new(config)?,
            engine,
            factory,
        })
    }

    pub fn codec(&self) -> &FixedPointCodec {
        &self.codec
    }

    pub fn engine(&self) -> &P {
        &self.engine
    }

    fn unary<F>(
        &self,
        op: &'static str,
        x: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
        kernel: F,
    ) -> Result<()>
    where
        F: FnOnce(&P, &FixedShare, &mut FixedShareMut) -> PrimitiveResult<()>,
    {
        let shapes = describe(&[x.shape(), out.shape()]);
        tracing::debug!("Dispatching '{}' on {}", op, shapes);
        let x = self.codec.unpack(op, x)?;
        let mut z = self.codec.unpack_mut(op, out)?;
        kernel(&self.engine, &x, &mut z).map_err(primitive_failure(op, shapes))
    }

    fn binary<F>(
        &self,
        op: &'static str,
        x: ArrayViewD<i64>,
        y: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
        kernel: F,
    ) -> Result<()>
    where
        F: FnOnce(&P, &FixedShare, &FixedShare, &mut FixedShareMut) -> PrimitiveResult<()>,
    {
        let shapes = describe(&[x.shape(), y.shape(), out.shape()]);
        tracing::debug!("Dispatching '{}' on {}", op, shapes);
        let x = self.codec.unpack(op, x)?;
        let y = self.codec.unpack(op, y)?;
        let mut z = self.codec.unpack_mut(op, out)?;
        kernel(&self.engine, &x, &y, &mut z).map_err(primitive_failure(op, shapes))
    }

    /// A fresh pair of raw buffers for a single boolean result.
    fn fresh_bool_share(&self, shape: &[usize]) -> PrimitiveResult<BoolShare> {
        BoolShare::new(
            self.factory.create_int64(shape),
            self.factory.create_int64(shape),
        )
    }
}

impl<P, T> MpcOperators for Aby3Operators<P, T>
where
    P: FixedPointPrimitives + BooleanPrimitives,
    T: TensorFactory,
{
    fn add(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.binary("add", lhs, rhs, out, P::add)
    }

    fn sub(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.binary("sub", lhs, rhs, out, P::sub)
    }

    fn neg(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()> {
        self.unary("neg", op, out, P::neg)
    }

    fn sum(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()> {
        self.unary("sum", op, out, P::sum)
    }

    fn mul(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.binary("mul", lhs, rhs, out, P::mul)
    }

    fn matmul(
        &self,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<i64>,
        out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        self.binary("matmul", lhs, rhs, out, P::matmul)
    }

    fn scale(&self, lhs: ArrayViewD<i64>, factor: f64, out: ArrayViewMutD<i64>) -> Result<()> {
        let op = "scale";
        let shapes = describe(&[lhs.shape(), out.shape()]);
        tracing::debug!("Dispatching '{}' by {} on {}", op, factor, shapes);
        let x = self.codec.unpack(op, lhs)?;
        let mut z = self.codec.unpack_mut(op, out)?;
        let factor = self.codec.encode_constant(op, factor, x.shape())?;
        self.engine
            .mul_public(&x, &factor, &mut z)
            .map_err(primitive_failure(op, shapes))
    }

    fn relu(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()> {
        self.unary("relu", op, out, P::relu)
    }

    fn sigmoid(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()> {
        self.unary("sigmoid", op, out, P::sigmoid)
    }

    fn softmax(&self, op: ArrayViewD<i64>, out: ArrayViewMutD<i64>) -> Result<()> {
        self.unary("softmax", op, out, P::softmax)
    }

    fn compare(
        &self,
        predicate: Predicate,
        lhs: ArrayViewD<i64>,
        rhs: ArrayViewD<f64>,
        mut out: ArrayViewMutD<i64>,
    ) -> Result<()> {
        let op = predicate.name();
        let shapes = describe(&[lhs.shape(), rhs.shape(), out.shape()]);
        tracing::debug!("Dispatching '{}' on {}", op, shapes);
        let x = self.codec.unpack(op, lhs)?;
        let y = self.codec.decode_comparand(op, rhs)?;

        let revealed = self.fresh_bool_share(y.shape()).and_then(|mut b| {
            match predicate.comparison() {
                Comparison::Greater => self.engine.greater_than(&x, &y, &mut b)?,
                Comparison::Less => self.engine.less_than(&x, &y, &mut b)?,
                Comparison::Equal => self.engine.equal(&x, &y, &mut b)?,
            }
            self.engine.reveal(&b, &mut out)
        });
        revealed.map_err(primitive_failure(op, shapes))?;

        predicate.finish(&mut out)
    }

    fn relu_grad(
        &self,
        y: ArrayViewD<i64>,
        dy: ArrayViewD<i64>,
        dx: ArrayViewMutD<i64>,
        point: f64,
    ) -> Result<()> {
        let op = "relu_grad";
        let shapes = describe(&[y.shape(), dy.shape(), dx.shape()]);
        tracing::debug!("Dispatching '{}' at {} on {}", op, point, shapes);
        let y = self.codec.unpack(op, y)?;
        let dy = self.codec.unpack(op, dy)?;
        let mut dx = self.codec.unpack_mut(op, dx)?;
        let point = self.codec.encode_constant(op, point, y.shape())?;

        self.fresh_bool_share(y.shape())
            .and_then(|mut mask| {
                self.engine.greater_than(&y, &point, &mut mask)?;
                self.engine.mul_fixed(&mask, &dy, &mut dx)
            })
            .map_err(primitive_failure(op, shapes))
    }
}
