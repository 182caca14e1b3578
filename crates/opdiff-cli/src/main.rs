use std::process::ExitCode;

use clap::{Parser, Subcommand};
use opdiff_core::{AttributeSet, DataFormat, OpKind, PoolAttrs, PoolType, Shape};
use opdiff_interp::Interpreter;
use opdiff_parity::cases::{op_nn_cases, rejected_cases};
use opdiff_parity::{HarnessConfig, OpTester};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opdiff")]
#[command(about = "Differential testing of tensor-compiler operators against a reference oracle")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the built-in op cases against the kernel interpreter.
    Smoke {
        /// Base seed for input generation (overrides OPDIFF_SEED).
        #[arg(long)]
        seed: Option<u64>,
        /// Absolute tolerance (overrides OPDIFF_ATOL).
        #[arg(long)]
        atol: Option<f32>,
        /// Relative tolerance (overrides OPDIFF_RTOL).
        #[arg(long)]
        rtol: Option<f32>,
        /// Only run cases whose name contains this string.
        #[arg(long)]
        filter: Option<String>,
        /// Print outcomes as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the output shape of a pooling op.
    InferShape {
        #[arg(long)]
        op: OpKind,
        /// Input shape, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        input: Vec<usize>,
        #[arg(long, value_delimiter = ',', required = true)]
        kernel: Vec<usize>,
        #[arg(long, value_delimiter = ',', required = true)]
        stride: Vec<usize>,
        /// All leading pads, then all trailing pads.
        #[arg(long, value_delimiter = ',', required = true)]
        padding: Vec<usize>,
        #[arg(long, default_value = "max")]
        pool_type: PoolType,
        #[arg(long)]
        data_format: DataFormat,
        #[arg(long)]
        ceil_mode: bool,
        /// Count padding in the average divisor.
        #[arg(long)]
        inclusive: bool,
        /// Print the attribute bag and result as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let result = match args.cmd {
        Cmd::Smoke {
            seed,
            atol,
            rtol,
            filter,
            json,
        } => smoke(seed, atol, rtol, filter.as_deref(), json),
        Cmd::InferShape {
            op,
            input,
            kernel,
            stride,
            padding,
            pool_type,
            data_format,
            ceil_mode,
            inclusive,
            json,
        } => PoolAttrs::new(pool_type, &kernel, &stride, &padding, data_format)
            .map(|p| p.with_ceil_mode(ceil_mode).with_exclusive(!inclusive))
            .and_then(|p| infer_shape(op, p.into(), Shape::new(input), json)),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn smoke(
    seed: Option<u64>,
    atol: Option<f32>,
    rtol: Option<f32>,
    filter: Option<&str>,
    json: bool,
) -> opdiff_core::Result<ExitCode> {
    let mut config = HarnessConfig::from_env()?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    if let Some(atol) = atol {
        config.tolerance.atol = atol;
    }
    if let Some(rtol) = rtol {
        config.tolerance.rtol = rtol;
    }
    config.validate()?;
    debug!(?config, "smoke");

    let selected = |name: &str| filter.is_none_or(|f| name.contains(f));
    let tester = OpTester::with_config(Interpreter, config);
    let mut failures = 0usize;
    let mut outcomes = Vec::new();

    if !json {
        println!(
            "Backend: interp vs reference (seed={}, atol={}, rtol={})\n",
            config.seed, config.tolerance.atol, config.tolerance.rtol
        );
    }
    for case in op_nn_cases()?.into_iter().filter(|c| selected(&c.name)) {
        match tester.run(&case) {
            Ok(outcome) => {
                if !json {
                    let max_abs = outcome.outputs[0]
                        .max_abs
                        .as_ref()
                        .map_or(0.0, |d| d.abs_diff);
                    println!("  PASS     {:<22} max_abs={max_abs:.3e}", case.name);
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                failures += 1;
                println!("  FAIL     {:<22} {e}", case.name);
            }
        }
    }
    for case in rejected_cases()?.into_iter().filter(|c| selected(&c.name)) {
        match tester.run(&case) {
            Err(e) if e.is_configuration() => {
                if !json {
                    println!("  REJECTED {:<22} {e}", case.name);
                }
            }
            Err(e) => {
                failures += 1;
                println!("  FAIL     {:<22} expected a configuration error, got {e}", case.name);
            }
            Ok(_) => {
                failures += 1;
                println!("  FAIL     {:<22} expected a configuration error", case.name);
            }
        }
    }

    if json {
        let text = serde_json::to_string_pretty(&outcomes)
            .map_err(|e| opdiff_core::OpdiffError::InvalidArgument(e.to_string()))?;
        println!("{text}");
    } else if failures == 0 {
        println!("\nAll cases passed.");
    } else {
        println!("\n{failures} case(s) failed.");
    }
    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn infer_shape(
    op: OpKind,
    attrs: AttributeSet,
    input: Shape,
    json: bool,
) -> opdiff_core::Result<ExitCode> {
    let outputs = opdiff_ops::infer_shape(op, &attrs, &[&input])?;
    if json {
        let value = serde_json::json!({
            "op": op,
            "attrs": attrs.to_bag(),
            "input": input,
            "outputs": outputs,
        });
        println!("{value:#}");
    } else {
        for out in &outputs {
            println!("{op} {input} -> {out}");
        }
    }
    Ok(ExitCode::SUCCESS)
}
