//! Single-process stand-in for the replicated secret-sharing engine.
//!
//! `LocalEngine` treats the two shares held by a party as an additive sharing of
//! the full value and evaluates every primitive by reconstructing, computing in
//! the clear and re-sharing with fresh randomness. It offers no security and
//! exists to exercise the dispatch layer in tests and local runs. Every primitive
//! invocation is recorded so callers can check which protocol steps were issued.

use crate::error::{PrimitiveError, PrimitiveResult, Result};
use crate::fixedpoint::check_layout;
use crate::primitives::{BooleanPrimitives, FixedPointPrimitives};
use crate::share::{BoolShare, FixedShare, FixedShareMut, MirroredFixedTensor};
use ndarray::prelude::*;
use ndarray::Zip;
use parking_lot::Mutex;
use rand::prelude::*;

pub struct LocalEngine {
    rng: Mutex<StdRng>,
    calls: Mutex<Vec<&'static str>>,
    failure: Option<(&'static str, PrimitiveError)>,
}

impl Default for LocalEngine {
    fn default() -> Self {
        LocalEngine::from_rng(StdRng::from_entropy())
    }
}

impl LocalEngine {
    pub fn seeded(seed: u64) -> Self {
        LocalEngine::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        LocalEngine {
            rng: Mutex::new(rng),
            calls: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    /// Makes every invocation of `primitive` fail with `error`.
    pub fn failing_on(mut self, primitive: &'static str, error: PrimitiveError) -> Self {
        self.failure = Some((primitive, error));
        self
    }

    /// Names of the primitives invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Secret-shares a public fixed-point tensor into the share-packed layout.
    pub fn share(&self, x: &MirroredFixedTensor) -> ArrayD<i64> {
        let packed_shape: Vec<usize> = std::iter::once(2)
            .chain(x.shape().iter().cloned())
            .collect();
        let mut packed = ArrayD::zeros(IxDyn(&packed_shape));
        {
            let (share0, share1) = packed.view_mut().split_at(Axis(0), 1);
            let mut z = FixedShareMut {
                shares: [
                    share0.index_axis_move(Axis(0), 0),
                    share1.index_axis_move(Axis(0), 0),
                ],
                fractional_precision: x.fractional_precision,
            };
            self.reshare(&x.tensor, &mut z);
        }
        packed
    }

    /// Recombines a share-packed tensor into its fixed-point plaintext.
    pub fn reconstruct(&self, packed: ArrayViewD<i64>) -> Result<ArrayD<i64>> {
        check_layout("reconstruct", packed.shape())?;
        let share0 = packed.index_axis(Axis(0), 0);
        let share1 = packed.index_axis(Axis(0), 1);
        Ok(Zip::from(&share0)
            .and(&share1)
            .map_collect(|a, b| a.wrapping_add(*b)))
    }

    fn record(&self, primitive: &'static str) -> PrimitiveResult<()> {
        self.calls.lock().push(primitive);
        match &self.failure {
            Some((name, error)) if *name == primitive => Err(error.clone()),
            _ => Ok(()),
        }
    }

    fn open(x: &FixedShare) -> ArrayD<i64> {
        Zip::from(&x.shares[0])
            .and(&x.shares[1])
            .map_collect(|a, b| a.wrapping_add(*b))
    }

    fn open_bits(b: &BoolShare) -> ArrayD<i64> {
        Zip::from(&b.shares()[0])
            .and(&b.shares()[1])
            .map_collect(|a, b| a ^ b)
    }

    fn reshare(&self, values: &ArrayD<i64>, z: &mut FixedShareMut) {
        let mut rng = self.rng.lock();
        let [share0, share1] = z.shares_mut();
        Zip::from(share0)
            .and(share1)
            .and(values)
            .for_each(|s0, s1, v| {
                let r: i64 = rng.gen();
                *s0 = v.wrapping_sub(r);
                *s1 = r;
            });
    }

    fn reshare_checked(&self, values: ArrayD<i64>, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        same_shape(values.shape(), z.shape())?;
        self.reshare(&values, z);
        Ok(())
    }

    fn share_bits(&self, bits: ArrayD<i64>, z: &mut BoolShare) -> PrimitiveResult<()> {
        same_shape(bits.shape(), z.shape())?;
        let mut rng = self.rng.lock();
        let [share0, share1] = z.shares_mut();
        Zip::from(share0)
            .and(share1)
            .and(&bits)
            .for_each(|s0, s1, b| {
                let r = rng.gen::<bool>() as i64;
                *s0 = b ^ r;
                *s1 = r;
            });
        Ok(())
    }

    fn compare<F>(
        &self,
        primitive: &'static str,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut BoolShare,
        predicate: F,
    ) -> PrimitiveResult<()>
    where
        F: Fn(i64, i64) -> bool,
    {
        self.record(primitive)?;
        same_shape(x.shape(), y.shape())?;
        let bits = Zip::from(&Self::open(x))
            .and(&y.tensor)
            .map_collect(|a, b| predicate(*a, *b) as i64);
        self.share_bits(bits, z)
    }

    fn activation<F>(&self, x: &FixedShare, z: &mut FixedShareMut, f: F) -> PrimitiveResult<()>
    where
        F: FnOnce(ArrayD<f64>) -> ArrayD<f64>,
    {
        let precision = x.fractional_precision;
        let decoded = Self::open(x).mapv(|v| to_float(v, precision));
        let activated = f(decoded).mapv(|v| from_float(v, precision));
        self.reshare_checked(activated, z)
    }
}

fn same_shape(lhs: &[usize], rhs: &[usize]) -> PrimitiveResult<()> {
    if lhs != rhs {
        return Err(PrimitiveError::ShapeMismatch {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
        });
    }
    Ok(())
}

fn truncate(product: i128, precision: u32) -> i64 {
    (product >> precision) as i64
}

fn to_float(v: i64, precision: u32) -> f64 {
    v as f64 / (1u64 << precision) as f64
}

fn from_float(v: f64, precision: u32) -> i64 {
    (v * (1u64 << precision) as f64).round() as i64
}

impl FixedPointPrimitives for LocalEngine {
    fn add(&self, x: &FixedShare, y: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        self.record("add")?;
        same_shape(x.shape(), y.shape())?;
        let sum = Zip::from(&Self::open(x))
            .and(&Self::open(y))
            .map_collect(|a, b| a.wrapping_add(*b));
        self.reshare_checked(sum, z)
    }

    fn sub(&self, x: &FixedShare, y: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        self.record("sub")?;
        same_shape(x.shape(), y.shape())?;
        let diff = Zip::from(&Self::open(x))
            .and(&Self::open(y))
            .map_collect(|a, b| a.wrapping_sub(*b));
        self.reshare_checked(diff, z)
    }

    fn neg(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        self.record("neg")?;
        self.reshare_checked(Self::open(x).mapv(i64::wrapping_neg), z)
    }

    fn sum(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        self.record("sum")?;
        if z.shares[0].len() != 1 {
            return Err(PrimitiveError::ShapeMismatch {
                lhs: vec![1],
                rhs: z.shape().to_vec(),
            });
        }
        let total = Self::open(x).iter().fold(0i64, |acc, v| acc.wrapping_add(*v));
        self.reshare_checked(ArrayD::from_elem(z.shares[0].raw_dim(), total), z)
    }

    fn mul(&self, x: &FixedShare, y: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        self.record("mul")?;
        same_shape(x.shape(), y.shape())?;
        let precision = x.fractional_precision;
        let product = Zip::from(&Self::open(x))
            .and(&Self::open(y))
            .map_collect(|a, b| truncate(*a as i128 * *b as i128, precision));
        self.reshare_checked(product, z)
    }

    fn mul_public(
        &self,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut FixedShareMut,
    ) -> PrimitiveResult<()> {
        self.record("mul_public")?;
        same_shape(x.shape(), y.shape())?;
        let precision = x.fractional_precision;
        let product = Zip::from(&Self::open(x))
            .and(&y.tensor)
            .map_collect(|a, b| truncate(*a as i128 * *b as i128, precision));
        self.reshare_checked(product, z)
    }

    fn matmul(
        &self,
        x: &FixedShare,
        y: &FixedShare,
        z: &mut FixedShareMut,
    ) -> PrimitiveResult<()> {
        self.record("matmul")?;
        let as_matrix = |v: ArrayD<i64>| {
            v.mapv(|e| e as i128)
                .into_dimensionality::<Ix2>()
                .map_err(|_| {
                    PrimitiveError::Unsupported(
                        "matmul expects two-dimensional operands".to_string(),
                    )
                })
        };
        let a = as_matrix(Self::open(x))?;
        let b = as_matrix(Self::open(y))?;
        if a.ncols() != b.nrows() {
            return Err(PrimitiveError::ShapeMismatch {
                lhs: x.shape().to_vec(),
                rhs: y.shape().to_vec(),
            });
        }
        let precision = x.fractional_precision;
        let product = a.dot(&b).mapv(|v| truncate(v, precision)).into_dyn();
        self.reshare_checked(product, z)
    }

    fn relu(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        self.record("relu")?;
        self.reshare_checked(Self::open(x).mapv(|v| v.max(0)), z)
    }

    fn sigmoid(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        self.record("sigmoid")?;
        self.activation(x, z, |v| v.mapv(|e| 1.0 / (1.0 + (-e).exp())))
    }

    fn softmax(&self, x: &FixedShare, z: &mut FixedShareMut) -> PrimitiveResult<()> {
        self.record("softmax")?;
        self.activation(x, z, |mut v| {
            if v.ndim() == 0 {
                v.fill(1.0);
                return v;
            }
            let last = Axis(v.ndim() - 1);
            for mut lane in v.lanes_mut(last) {
                let max = lane.fold(f64::NEG_INFINITY, |m, e| m.max(*e));
                lane.mapv_inplace(|e| (e - max).exp());
                let total = lane.sum();
                lane.mapv_inplace(|e| e / total);
            }
            v
        })
    }

    fn greater_than(
        &self,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut BoolShare,
    ) -> PrimitiveResult<()> {
        self.compare("greater_than", x, y, z, |a, b| a > b)
    }

    fn less_than(
        &self,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut BoolShare,
    ) -> PrimitiveResult<()> {
        self.compare("less_than", x, y, z, |a, b| a < b)
    }

    fn equal(
        &self,
        x: &FixedShare,
        y: &MirroredFixedTensor,
        z: &mut BoolShare,
    ) -> PrimitiveResult<()> {
        self.compare("equal", x, y, z, |a, b| a == b)
    }
}

impl BooleanPrimitives for LocalEngine {
    fn mul_fixed(
        &self,
        b: &BoolShare,
        x: &FixedShare,
        z: &mut FixedShareMut,
    ) -> PrimitiveResult<()> {
        self.record("mul_fixed")?;
        same_shape(b.shape(), x.shape())?;
        let selected = Zip::from(&Self::open_bits(b))
            .and(&Self::open(x))
            .map_collect(|bit, v| if *bit == 1 { *v } else { 0 });
        self.reshare_checked(selected, z)
    }

    fn reveal(&self, b: &BoolShare, out: &mut ArrayViewMutD<i64>) -> PrimitiveResult<()> {
        self.record("reveal")?;
        same_shape(b.shape(), out.shape())?;
        out.assign(&Self::open_bits(b));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::fixedpoint::FixedPointCodec;

    fn codec() -> FixedPointCodec {
        FixedPointCodec::new(&ProtocolConfig::default()).unwrap()
    }

    #[test]
    fn share_then_reconstruct() {
        let engine = LocalEngine::seeded(3);
        let x = codec().encode_constant("test", 1.25, &[2, 2]).unwrap();
        let packed = engine.share(&x);
        assert_eq!(packed.shape(), &[2, 2, 2]);
        assert_ne!(packed.index_axis(Axis(0), 1), x.tensor.view());
        assert_eq!(engine.reconstruct(packed.view()).unwrap(), x.tensor);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn reconstruct_checks_layout() {
        let engine = LocalEngine::seeded(3);
        let packed = ArrayD::<i64>::zeros(IxDyn(&[3, 1]));
        assert!(engine.reconstruct(packed.view()).is_err());
    }

    #[test]
    fn bits_are_xor_shared() {
        let engine = LocalEngine::seeded(5);
        let codec = codec();
        let x = array![1.0, -1.0, 0.0].into_dyn();
        let x = engine.share(&codec.decode_comparand("test", x.view()).unwrap());
        let x = codec.unpack("test", x.view()).unwrap();
        let y = codec.encode_constant("test", 0.0, &[3]).unwrap();
        let mut b = BoolShare::new(ArrayD::zeros(IxDyn(&[3])), ArrayD::zeros(IxDyn(&[3]))).unwrap();
        engine.greater_than(&x, &y, &mut b).unwrap();
        for share in b.shares() {
            assert!(share.iter().all(|v| *v == 0 || *v == 1));
        }
        let mut out = ArrayD::<i64>::zeros(IxDyn(&[3]));
        engine.reveal(&b, &mut out.view_mut()).unwrap();
        assert_eq!(out, array![1, 0, 0].into_dyn());
    }

    #[test]
    fn reveal_checks_shape() {
        let engine = LocalEngine::seeded(5);
        let b = BoolShare::new(ArrayD::zeros(IxDyn(&[3])), ArrayD::zeros(IxDyn(&[3]))).unwrap();
        let mut out = ArrayD::<i64>::zeros(IxDyn(&[2]));
        let res = engine.reveal(&b, &mut out.view_mut());
        assert!(matches!(res, Err(PrimitiveError::ShapeMismatch { .. })));
    }

    #[test]
    fn matmul_rejects_vectors() {
        let engine = LocalEngine::seeded(5);
        let codec = codec();
        let packed = engine.share(&codec.encode_constant("test", 1.0, &[3]).unwrap());
        let x = codec.unpack("test", packed.view()).unwrap();
        let mut out = ArrayD::<i64>::zeros(IxDyn(&[2, 3]));
        let mut z = codec.unpack_mut("test", out.view_mut()).unwrap();
        let res = engine.matmul(&x, &x, &mut z);
        assert!(matches!(res, Err(PrimitiveError::Unsupported(_))));
    }

    #[test]
    fn injected_failure() {
        let engine = LocalEngine::seeded(5)
            .failing_on("neg", PrimitiveError::KernelError("boom".into()));
        let codec = codec();
        let packed = engine.share(&codec.encode_constant("test", 1.0, &[1]).unwrap());
        let x = codec.unpack("test", packed.view()).unwrap();
        let mut out = ArrayD::<i64>::zeros(IxDyn(&[2, 1]));
        let mut z = codec.unpack_mut("test", out.view_mut()).unwrap();
        assert!(engine.relu(&x, &mut z).is_ok());
        assert_eq!(
            engine.neg(&x, &mut z),
            Err(PrimitiveError::KernelError("boom".into()))
        );
        assert_eq!(engine.calls(), vec!["relu", "neg"]);
    }
}
