use std::{process::ExitCode, time::Instant};

use butterfly_factor::{
    DType, FactorResult, Scalar, butterfly_factor_multiply, butterfly_factor_multiply_backward,
    butterfly_factor_multiply_fast,
    gradcheck::{FactorGradCheck, check_butterfly, check_even_odd, check_reverse},
    permutation_factor_even_odd_multiply, permutation_factor_reverse_multiply,
    utils::random_array,
};
use clap::Parser;
use ndarray::{Array1, Ix1, Ix2};
use rand::{SeedableRng, rngs::StdRng};
use tracing::{info, instrument, warn};
use tracing_forest::{ForestLayer, util::LevelFilter};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short = 'b', long, default_value = "16")]
    batch: usize,

    #[arg(short = 'n', long, default_value = "64")]
    n: usize,

    #[arg(short = 't', long, default_value = "f32")]
    dtype: DType,

    /// Run the butterfly on complex coefficients and inputs.
    #[arg(short = 'c', long)]
    complex: bool,

    #[arg(short = 's', long, default_value = "0")]
    seed: u64,

    /// Finite-difference step. Defaults to 1e-2 for f32 and 1e-6 for f64.
    #[arg(short = 'e', long)]
    eps: Option<f64>,

    /// Mixing weight of both permutation factors. Sampled when absent.
    #[arg(short = 'p', long)]
    p: Option<f64>,
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    Registry::default()
        .with(env_filter)
        .with(ForestLayer::default())
        .init();

    let args = Args::parse();

    let result = match args.dtype {
        DType::F32 => run::<f32>(&args, 1e-2, 1e-3),
        DType::F64 => run::<f64>(&args, 1e-6, 1e-6),
        dtype => {
            println!("Element type {dtype} is not supported, use f32 or f64.");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            println!("Gradient check failed.");
            ExitCode::FAILURE
        }
        Err(err) => {
            println!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

/// Run every operation once on random data and validate the gradients.
#[instrument(skip_all, fields(dtype = %T::DTYPE, batch = args.batch, n = args.n))]
fn run<T: Scalar>(args: &Args, default_eps: f64, tol: f64) -> FactorResult<bool> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let eps = args.eps.unwrap_or(default_eps);
    let (batch, n) = (args.batch, args.n);

    let (coefficient_shape, input_shape) = if args.complex {
        (vec![2, 2, n, 2], vec![batch, 2, n, 2])
    } else {
        (vec![2, 2, n], vec![batch, 2, n])
    };
    let coefficients = random_array::<T, _>(&mut rng, &coefficient_shape);
    let input = random_array::<T, _>(&mut rng, &input_shape);
    let grad = random_array::<T, _>(&mut rng, &input_shape);

    let time = Instant::now();
    let output = butterfly_factor_multiply(coefficients.view(), input.view())?;
    info!(elapsed = ?time.elapsed(), "butterfly forward");

    let time = Instant::now();
    butterfly_factor_multiply_backward(grad.view(), coefficients.view(), input.view())?;
    info!(elapsed = ?time.elapsed(), "butterfly backward");

    if !args.complex {
        let time = Instant::now();
        let fast = butterfly_factor_multiply_fast(coefficients.view(), input.view())?;
        info!(elapsed = ?time.elapsed(), "butterfly fast path");
        if fast != output {
            warn!("fast path disagrees with the scalar kernel");
            return Ok(false);
        }
    }

    let mut checks = vec![(
        "butterfly",
        check_butterfly(grad.view(), coefficients.view(), input.view(), eps)?,
    )];

    let rows = random_array::<T, _>(&mut rng, &[batch, n]).into_dimensionality::<Ix2>()?;
    let row_grad = random_array::<T, _>(&mut rng, &[batch, n]).into_dimensionality::<Ix2>()?;
    let weights = |rng: &mut StdRng, len: usize| -> FactorResult<Array1<T>> {
        Ok(match args.p {
            Some(p) => Array1::from_elem(len, T::from_f64(p)),
            None => random_array::<T, _>(rng, &[len]).into_dimensionality::<Ix1>()?,
        })
    };

    let p = weights(&mut rng, 1)?;
    let time = Instant::now();
    permutation_factor_even_odd_multiply(p.view(), rows.view())?;
    info!(elapsed = ?time.elapsed(), "even/odd permutation forward");
    checks.push((
        "even/odd permutation",
        check_even_odd(row_grad.view(), p.view(), rows.view(), eps)?,
    ));

    let p = weights(&mut rng, 2)?;
    let time = Instant::now();
    permutation_factor_reverse_multiply(p.view(), rows.view())?;
    info!(elapsed = ?time.elapsed(), "reverse permutation forward");
    checks.push((
        "reverse permutation",
        check_reverse(row_grad.view(), p.view(), rows.view(), eps)?,
    ));

    Ok(checks
        .into_iter()
        .map(|(name, check): (&str, FactorGradCheck)| {
            let passed = check.passes(tol);
            info!(
                name,
                passed,
                parameters = ?check.parameters,
                input = ?check.input,
                "gradient check"
            );
            passed
        })
        .fold(true, |all, passed| all && passed))
}
