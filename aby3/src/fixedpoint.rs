//! Fixed-point codec between host tensors and the share layout.

use crate::config::ProtocolConfig;
use crate::error::{Error, Result};
use crate::share::{FixedShare, FixedShareMut, MirroredFixedTensor};
use ndarray::prelude::*;
use num_traits::ToPrimitive;

/// Fails unless `shape` has a leading dimension of exactly 2.
pub fn check_layout(op: &'static str, shape: &[usize]) -> Result<()> {
    match shape.first() {
        Some(2) => Ok(()),
        _ => {
            tracing::error!("Rejecting operand of shape {:?} for '{}'", shape, op);
            Err(Error::LayoutViolation {
                op,
                shape: shape.to_vec(),
            })
        }
    }
}

/// Converts between plaintext values and fixed-point integers at a single precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedPointCodec {
    fractional_precision: u32,
}

impl FixedPointCodec {
    pub fn new(config: &ProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(FixedPointCodec {
            fractional_precision: config.fractional_precision,
        })
    }

    pub fn fractional_precision(&self) -> u32 {
        self.fractional_precision
    }

    /// The scaling factor `2^F`.
    pub fn scaling_factor(&self) -> f64 {
        (1u64 << self.fractional_precision) as f64
    }

    /// Splits a share-packed tensor into this party's two share slices.
    pub fn unpack<'a>(
        &self,
        op: &'static str,
        tensor: ArrayViewD<'a, i64>,
    ) -> Result<FixedShare<'a>> {
        check_layout(op, tensor.shape())?;
        let share0 = tensor.clone().index_axis_move(Axis(0), 0);
        let share1 = tensor.index_axis_move(Axis(0), 1);
        Ok(FixedShare {
            shares: [share0, share1],
            fractional_precision: self.fractional_precision,
        })
    }

    /// Splits a caller-owned output into two writable share slices.
    pub fn unpack_mut<'a>(
        &self,
        op: &'static str,
        tensor: ArrayViewMutD<'a, i64>,
    ) -> Result<FixedShareMut<'a>> {
        check_layout(op, tensor.shape())?;
        let (share0, share1) = tensor.split_at(Axis(0), 1);
        Ok(FixedShareMut {
            shares: [
                share0.index_axis_move(Axis(0), 0),
                share1.index_axis_move(Axis(0), 0),
            ],
            fractional_precision: self.fractional_precision,
        })
    }

    /// Computes `round(value * 2^F)`, rejecting values outside the `i64` range.
    pub fn encode_scalar(&self, op: &'static str, value: f64) -> Result<i64> {
        let scaled = (value * self.scaling_factor()).round();
        // i64::MIN is exactly -2^63 while i64::MAX rounds up to 2^63 as f64
        if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled >= i64::MAX as f64 {
            tracing::error!("Cannot encode {} for '{}'", value, op);
            return Err(Error::EncodingOverflow {
                op,
                value,
                precision: self.fractional_precision,
            });
        }
        Ok(scaled as i64)
    }

    pub fn decode_scalar(&self, encoded: i64) -> f64 {
        encoded as f64 / self.scaling_factor()
    }

    /// Broadcasts the encoding of a public scalar to `shape`.
    pub fn encode_constant(
        &self,
        op: &'static str,
        value: f64,
        shape: &[usize],
    ) -> Result<MirroredFixedTensor> {
        let encoded = self.encode_scalar(op, value)?;
        Ok(MirroredFixedTensor {
            tensor: ArrayD::from_elem(IxDyn(shape), encoded),
            fractional_precision: self.fractional_precision,
        })
    }

    /// Encodes a public operand given in floating form.
    ///
    /// This is also how plaintext inputs are encoded before being shared.
    pub fn decode_comparand<T>(
        &self,
        op: &'static str,
        tensor: ArrayViewD<T>,
    ) -> Result<MirroredFixedTensor>
    where
        T: ToPrimitive + Copy,
    {
        let mut encoded = ArrayD::<i64>::zeros(tensor.raw_dim());
        for (z, x) in encoded.iter_mut().zip(tensor.iter()) {
            *z = self.encode_scalar(op, x.to_f64().unwrap_or(f64::NAN))?;
        }
        Ok(MirroredFixedTensor {
            tensor: encoded,
            fractional_precision: self.fractional_precision,
        })
    }

    pub fn decode(&self, tensor: ArrayViewD<i64>) -> ArrayD<f64> {
        tensor.mapv(|x| self.decode_scalar(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn codec(precision: u32) -> FixedPointCodec {
        FixedPointCodec::new(&ProtocolConfig::with_precision(precision).unwrap()).unwrap()
    }

    #[rstest]
    #[case(16, 1.0, 65536)]
    #[case(16, -1.5, -98304)]
    #[case(16, 0.0, 0)]
    #[case(8, 0.5, 128)]
    #[case(8, 0.001, 0)]
    #[case(8, 0.0025, 1)]
    #[case(0, 2.6, 3)]
    fn encode_rounds(#[case] precision: u32, #[case] value: f64, #[case] expected: i64) {
        assert_eq!(codec(precision).encode_scalar("test", value).unwrap(), expected);
    }

    #[rstest]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    #[case(f64::NEG_INFINITY)]
    #[case(1e15)]
    #[case(-1e15)]
    fn encode_overflow(#[case] value: f64) {
        let res = codec(16).encode_scalar("scale", value);
        assert!(matches!(
            res,
            Err(Error::EncodingOverflow {
                op: "scale",
                precision: 16,
                ..
            })
        ));
    }

    #[test]
    fn encode_constant_broadcasts() {
        let c = codec(16).encode_constant("test", 2.0, &[2, 3]).unwrap();
        assert_eq!(c.tensor, ArrayD::from_elem(IxDyn(&[2, 3]), 131072));
        assert_eq!(c.fractional_precision, 16);

        let scalar = codec(16).encode_constant("test", -0.25, &[]).unwrap();
        assert_eq!(scalar.tensor, arr0(-16384).into_dyn());
    }

    #[test]
    fn encode_comparand_elementwise() {
        let x = array![[1.0f32, -2.0], [0.5, 0.0]].into_dyn();
        let c = codec(4).decode_comparand("test", x.view()).unwrap();
        assert_eq!(c.tensor, array![[16, -32], [8, 0]].into_dyn());
    }

    #[test]
    fn encode_comparand_reports_bad_element() {
        let x = array![1.0, f64::NAN].into_dyn();
        let res = codec(16).decode_comparand("lt", x.view());
        assert!(matches!(
            res,
            Err(Error::EncodingOverflow { op: "lt", .. })
        ));
    }

    #[test]
    fn unpack_splits_leading_axis() {
        let packed = array![[[1i64, 2], [3, 4]], [[5, 6], [7, 8]]].into_dyn();
        let x = codec(16).unpack("test", packed.view()).unwrap();
        assert_eq!(x.shape(), &[2, 2]);
        assert_eq!(x.shares()[0], array![[1i64, 2], [3, 4]].into_dyn());
        assert_eq!(x.shares()[1], array![[5i64, 6], [7, 8]].into_dyn());
        assert_eq!(x.fractional_precision(), 16);
    }

    #[test]
    fn unpack_mut_aliases_output() {
        let mut packed = ArrayD::<i64>::zeros(IxDyn(&[2, 3]));
        {
            let mut z = codec(16).unpack_mut("test", packed.view_mut()).unwrap();
            assert_eq!(z.shape(), &[3]);
            z.shares_mut()[0].fill(1);
            z.shares_mut()[1].fill(2);
        }
        assert_eq!(packed, array![[1i64, 1, 1], [2, 2, 2]].into_dyn());
    }

    #[rstest]
    #[case(vec![3, 2])]
    #[case(vec![1])]
    #[case(vec![])]
    fn unpack_rejects_bad_layout(#[case] shape: Vec<usize>) {
        let packed = ArrayD::<i64>::zeros(IxDyn(&shape));
        let res = codec(16).unpack("neg", packed.view());
        assert_eq!(
            res.err(),
            Some(Error::LayoutViolation {
                op: "neg",
                shape: shape.clone()
            })
        );

        let mut packed = packed;
        let res = codec(16).unpack_mut("neg", packed.view_mut());
        assert!(matches!(res, Err(Error::LayoutViolation { op: "neg", .. })));
    }

    proptest! {
        #[test]
        fn encode_decode_within_ulp(v in -1.0e6f64..1.0e6f64, precision in 0u32..=24) {
            let codec = codec(precision);
            let scale = codec.scaling_factor();
            let decoded = codec.decode_scalar(codec.encode_scalar("test", v).unwrap());
            let expected = (v * scale).round() / scale;
            prop_assert!((decoded - expected).abs() <= 1.0 / scale);
            prop_assert!((decoded - v).abs() <= 1.0 / scale);
        }
    }
}
