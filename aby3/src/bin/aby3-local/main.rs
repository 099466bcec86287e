//! Runs a single operator against the in-process engine and prints the revealed result.

use aby3::prelude::*;
use anyhow::anyhow;
use clap::{Parser, ValueEnum};
use ndarray::prelude::*;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Op {
    Add,
    Sub,
    Mul,
    Matmul,
    Neg,
    Sum,
    Scale,
    Relu,
    Sigmoid,
    Softmax,
    Gt,
    Geq,
    Lt,
    Leq,
    Eq,
    Neq,
    ReluGrad,
}

#[derive(Debug, Parser, Clone)]
#[command(version, about)]
struct Opt {
    #[arg(env, long)]
    /// TOML file holding the protocol configuration
    config: Option<PathBuf>,

    #[arg(long)]
    /// Fractional precision, overriding the configuration file
    precision: Option<u32>,

    #[arg(long)]
    /// Seed for the share randomness
    seed: Option<u64>,

    #[arg(long, value_enum)]
    /// Operator to evaluate
    op: Op,

    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    /// Secret left-hand operand (or `y` for relu-grad)
    lhs: Vec<f64>,

    #[arg(long, value_delimiter = ',')]
    /// Shape of the left-hand operand, defaults to a vector
    lhs_shape: Option<Vec<usize>>,

    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    /// Right-hand operand; public for comparisons, secret otherwise (`dy` for relu-grad)
    rhs: Vec<f64>,

    #[arg(long, value_delimiter = ',')]
    /// Shape of the right-hand operand, defaults to a vector
    rhs_shape: Option<Vec<usize>>,

    #[arg(long, default_value = "1.0", allow_hyphen_values = true)]
    /// Public factor used by scale
    factor: f64,

    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    /// Public threshold used by relu-grad
    point: f64,
}

fn load_config(opt: &Opt) -> aby3::error::Result<ProtocolConfig> {
    let config = match &opt.config {
        Some(path) => ProtocolConfig::from_file(path)?,
        None => ProtocolConfig::default(),
    };
    match opt.precision {
        Some(precision) => ProtocolConfig::with_precision(precision),
        None => Ok(config),
    }
}

fn tensor(values: &[f64], shape: &Option<Vec<usize>>) -> anyhow::Result<ArrayD<f64>> {
    let shape = shape.clone().unwrap_or_else(|| vec![values.len()]);
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values.to_vec())?)
}

fn packed_zeros(shape: &[usize]) -> ArrayD<i64> {
    let packed: Vec<usize> = std::iter::once(2).chain(shape.iter().cloned()).collect();
    ArrayD::zeros(IxDyn(&packed))
}

fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = load_config(&opt)?;
    let engine = match opt.seed {
        Some(seed) => LocalEngine::seeded(seed),
        None => LocalEngine::default(),
    };
    let ops = Aby3Operators::new(&config, engine)?;
    tracing::info!(
        "Evaluating {:?} at {} fractional bits",
        opt.op,
        config.fractional_precision
    );

    let lhs = tensor(&opt.lhs, &opt.lhs_shape)?;
    let rhs = tensor(&opt.rhs, &opt.rhs_shape)?;
    let x = ops
        .engine()
        .share(&ops.codec().decode_comparand("lhs", lhs.view())?);
    let share_rhs = || -> anyhow::Result<ArrayD<i64>> {
        let encoded = ops.codec().decode_comparand("rhs", rhs.view())?;
        Ok(ops.engine().share(&encoded))
    };

    let predicate = match opt.op {
        Op::Gt => Some(Predicate::GT),
        Op::Geq => Some(Predicate::GEQ),
        Op::Lt => Some(Predicate::LT),
        Op::Leq => Some(Predicate::LEQ),
        Op::Eq => Some(Predicate::EQ),
        Op::Neq => Some(Predicate::NEQ),
        _ => None,
    };
    if let Some(predicate) = predicate {
        let mut out = ArrayD::<i64>::zeros(rhs.raw_dim());
        ops.compare(predicate, x.view(), rhs.view(), out.view_mut())?;
        println!("{}", out);
        return Ok(());
    }

    let out_shape = match opt.op {
        Op::Sum => vec![],
        Op::Matmul => match (lhs.shape(), rhs.shape()) {
            (&[rows, _], &[_, cols]) => vec![rows, cols],
            _ => return Err(anyhow!("matmul expects two matrices")),
        },
        _ => lhs.shape().to_vec(),
    };
    let mut out = packed_zeros(&out_shape);
    match opt.op {
        Op::Add => ops.add(x.view(), share_rhs()?.view(), out.view_mut())?,
        Op::Sub => ops.sub(x.view(), share_rhs()?.view(), out.view_mut())?,
        Op::Mul => ops.mul(x.view(), share_rhs()?.view(), out.view_mut())?,
        Op::Matmul => ops.matmul(x.view(), share_rhs()?.view(), out.view_mut())?,
        Op::Neg => ops.neg(x.view(), out.view_mut())?,
        Op::Sum => ops.sum(x.view(), out.view_mut())?,
        Op::Scale => ops.scale(x.view(), opt.factor, out.view_mut())?,
        Op::Relu => ops.relu(x.view(), out.view_mut())?,
        Op::Sigmoid => ops.sigmoid(x.view(), out.view_mut())?,
        Op::Softmax => ops.softmax(x.view(), out.view_mut())?,
        Op::ReluGrad => {
            ops.relu_grad(x.view(), share_rhs()?.view(), out.view_mut(), opt.point)?
        }
        Op::Gt | Op::Geq | Op::Lt | Op::Leq | Op::Eq | Op::Neq => unreachable!(),
    }

    let revealed = ops.engine().reconstruct(out.view())?;
    println!("{}", ops.codec().decode(revealed.view()));
    Ok(())
}
