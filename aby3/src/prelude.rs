pub use crate::{
    comparison::{Comparison, Predicate},
    config::ProtocolConfig,
    error::{Error, PrimitiveError, PrimitiveResult, Result},
    fixedpoint::FixedPointCodec,
    local::LocalEngine,
    operators::{Aby3Operators, MpcOperators},
    primitives::{BooleanPrimitives, FixedPointPrimitives, HostTensorFactory, TensorFactory},
    share::{BoolShare, FixedShare, FixedShareMut, MirroredFixedTensor},
};
