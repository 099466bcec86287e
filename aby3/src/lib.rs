//! Operator bridge from plaintext tensor operations to the ABY3 protocol.
//!
//! Tensors crossing this boundary are either share-packed, holding one party's
//! two replicated shares of a fixed-point value along a leading axis of size 2,
//! or plaintext. [`operators::Aby3Operators`] unpacks the former, encodes the
//! latter at the configured fractional precision and hands both to an engine
//! implementing the traits in [`primitives`]. Predicates are revealed to every
//! party as plaintext 0/1 tensors.

pub mod comparison;
pub mod config;
pub mod error;
pub mod fixedpoint;
pub mod local;
pub mod operators;
pub mod prelude;
pub mod primitives;
pub mod share;
