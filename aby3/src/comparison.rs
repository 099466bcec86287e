//! Relational predicates built from three primitive comparisons.
//!
//! `geq`, `leq` and `neq` never run a circuit of their own. They are the
//! complement of a revealed `lt`, `gt` or `eq` respectively, computed locally
//! on the plaintext 0/1 output.

use crate::error::{Error, Result};
use ndarray::prelude::*;
use std::fmt;

/// Comparisons evaluated in the secret domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    Greater,
    Less,
    Equal,
}

impl Comparison {
    pub fn name(&self) -> &'static str {
        match self {
            Comparison::Greater => "gt",
            Comparison::Less => "lt",
            Comparison::Equal => "eq",
        }
    }
}

/// A relational predicate: either a primitive comparison or the complement of one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Predicate {
    Primitive(Comparison),
    Complement(Comparison),
}

impl Predicate {
    pub const GT: Predicate = Predicate::Primitive(Comparison::Greater);
    pub const LT: Predicate = Predicate::Primitive(Comparison::Less);
    pub const EQ: Predicate = Predicate::Primitive(Comparison::Equal);
    pub const GEQ: Predicate = Predicate::Complement(Comparison::Less);
    pub const LEQ: Predicate = Predicate::Complement(Comparison::Greater);
    pub const NEQ: Predicate = Predicate::Complement(Comparison::Equal);

    pub const ALL: [Predicate; 6] = [
        Predicate::GT,
        Predicate::GEQ,
        Predicate::LT,
        Predicate::LEQ,
        Predicate::EQ,
        Predicate::NEQ,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Predicate::Primitive(c) => c.name(),
            Predicate::Complement(Comparison::Greater) => "leq",
            Predicate::Complement(Comparison::Less) => "geq",
            Predicate::Complement(Comparison::Equal) => "neq",
        }
    }

    /// The comparison that is actually evaluated and revealed.
    pub fn comparison(&self) -> Comparison {
        match self {
            Predicate::Primitive(c) | Predicate::Complement(c) => *c,
        }
    }

    pub fn negate(&self) -> Predicate {
        match self {
            Predicate::Primitive(c) => Predicate::Complement(*c),
            Predicate::Complement(c) => Predicate::Primitive(*c),
        }
    }

    /// Post-processes the revealed output of [`Predicate::comparison`].
    pub fn finish(&self, revealed: &mut ArrayViewMutD<i64>) -> Result<()> {
        match self {
            Predicate::Primitive(_) => Ok(()),
            Predicate::Complement(_) => complement(self.name(), revealed),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Replaces every revealed bit `b` by `1 - b`.
///
/// All values are checked before any is modified, so a rejected input is left untouched.
pub fn complement(op: &'static str, revealed: &mut ArrayViewMutD<i64>) -> Result<()> {
    if let Some(value) = revealed.iter().find(|b| **b != 0 && **b != 1) {
        tracing::error!("Revealed non-boolean value {} in '{}'", value, op);
        return Err(Error::NonBooleanReveal { op, value: *value });
    }
    revealed.mapv_inplace(|b| 1 - b);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Predicate::GT, "gt", Comparison::Greater)]
    #[case(Predicate::GEQ, "geq", Comparison::Less)]
    #[case(Predicate::LT, "lt", Comparison::Less)]
    #[case(Predicate::LEQ, "leq", Comparison::Greater)]
    #[case(Predicate::EQ, "eq", Comparison::Equal)]
    #[case(Predicate::NEQ, "neq", Comparison::Equal)]
    fn predicate_table(#[case] p: Predicate, #[case] name: &str, #[case] c: Comparison) {
        assert_eq!(p.name(), name);
        assert_eq!(p.to_string(), name);
        assert_eq!(p.comparison(), c);
        assert_eq!(p.negate().negate(), p);
        assert_eq!(p.negate().comparison(), c);
    }

    #[test]
    fn three_circuits_cover_all_predicates() {
        for p in Predicate::ALL.iter() {
            assert!(Predicate::ALL.contains(&p.negate()));
            assert_ne!(p.negate(), *p);
        }
        let primitives = Predicate::ALL
            .iter()
            .filter(|p| matches!(p, Predicate::Primitive(_)))
            .count();
        assert_eq!(primitives, 3);
    }

    #[test]
    fn complement_flips_bits() {
        let mut x = array![[0i64, 1], [1, 0]].into_dyn();
        Predicate::NEQ.finish(&mut x.view_mut()).unwrap();
        assert_eq!(x, array![[1i64, 0], [0, 1]].into_dyn());

        Predicate::EQ.finish(&mut x.view_mut()).unwrap();
        assert_eq!(x, array![[1i64, 0], [0, 1]].into_dyn());
    }

    #[test]
    fn complement_rejects_non_boolean() {
        let mut x = array![0i64, 1, 2, 1].into_dyn();
        let res = Predicate::GEQ.finish(&mut x.view_mut());
        assert_eq!(
            res,
            Err(Error::NonBooleanReveal {
                op: "geq",
                value: 2
            })
        );
        assert_eq!(x, array![0i64, 1, 2, 1].into_dyn());
    }
}
