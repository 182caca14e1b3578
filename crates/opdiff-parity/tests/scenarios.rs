//! End-to-end scenarios checked against hand-computed expectations, not just
//! against the oracle.

use opdiff_core::{AttributeSet, DataFormat, NormAttrs, OpKind, PoolAttrs, PoolType, Shape, Tensor};
use opdiff_cpu::reference;
use opdiff_interp::Interpreter;
use opdiff_parity::*;

// ── Scenario A: 1-D max pooling, NCW ────────────────────────────────────────

#[test]
fn scenario_a_max_pool1d_ncw() {
    let attrs = PoolAttrs::new(PoolType::Max, &[2], &[2], &[1, 1], DataFormat::Ncw).unwrap();
    let case = OpCase::new("a", OpKind::Pool1d, attrs.clone(), vec![Shape::new(vec![1, 3, 8])])
        .with_outputs(vec![Shape::new(vec![1, 3, 5])]);
    let tester = OpTester::with_config(Interpreter, HarnessConfig::default().with_seed(11));
    tester.run(&case).unwrap();

    // Direct sliding-window max over the -inf padded rows.
    let x = tester.materialize(&case).unwrap().remove(0);
    let y = reference(OpKind::Pool1d, &attrs.into(), &[x.clone()]).unwrap();
    for c in 0..3 {
        let row = &x.data()[c * 8..(c + 1) * 8];
        let mut padded = vec![f32::NEG_INFINITY];
        padded.extend_from_slice(row);
        padded.push(f32::NEG_INFINITY);
        let expected: Vec<f32> = padded
            .chunks(2)
            .map(|w| w.iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .collect();
        assert_eq!(&y.data()[c * 5..(c + 1) * 5], expected.as_slice());
    }
}

// ── Scenario B: 1-D inclusive average, ceil mode, NWC ───────────────────────

#[test]
fn scenario_b_inclusive_avg_pool1d_nwc() {
    let attrs = PoolAttrs::new(PoolType::Avg, &[2], &[3], &[4, 5], DataFormat::Nwc)
        .unwrap()
        .with_ceil_mode(true)
        .with_exclusive(false);
    let case = OpCase::new("b", OpKind::Pool1d, attrs.clone(), vec![Shape::new(vec![1, 8, 3])]);
    let tester = OpTester::new(Interpreter);
    let outcome = tester.run(&case).unwrap();
    // ceil((8 + 4 + 5 - 2) / 3) + 1 = 6
    assert_eq!(outcome.outputs[0].shape, Shape::new(vec![1, 6, 3]));

    // Every denominator is the kernel extent: a constant input of 1 gives
    // (real elements in window) / 2.
    let ones = Tensor::full(&Shape::new(vec![1, 8, 3]), 1.0);
    let y = reference(OpKind::Pool1d, &attrs.into(), &[ones]).unwrap();
    let per_window = [0.0, 0.5, 1.0, 1.0, 0.0, 0.0];
    for (o, &v) in per_window.iter().enumerate() {
        assert_eq!(&y.data()[o * 3..(o + 1) * 3], &[v, v, v], "window {o}");
    }
}

// ── Scenario C: batch normalization with stacked statistics ─────────────────

#[test]
fn scenario_c_batchnorm() {
    let case = OpCase::new(
        "c",
        OpKind::BatchNorm,
        NormAttrs::default(),
        vec![Shape::new(vec![1, 3, 2, 2]), Shape::new(vec![4, 3])],
    )
    .with_input_gen(vec![InputGen::Uniform, InputGen::Positive]);
    let tester = OpTester::new(Interpreter);
    tester.run(&case).unwrap();

    let inputs = tester.materialize(&case).unwrap();
    let (x, stats) = (&inputs[0], inputs[1].data());
    let y = reference(OpKind::BatchNorm, &case.attrs, &inputs).unwrap();
    let mut expected = Vec::new();
    for c in 0..3 {
        let (mean, var, scale, bias) = (stats[c], stats[3 + c], stats[6 + c], stats[9 + c]);
        for i in 0..4 {
            let v = x.data()[c * 4 + i];
            expected.push((v - mean) / (var + 1e-5).sqrt() * scale + bias);
        }
    }
    assert_allclose(y.data(), &expected, 1e-5, 0.0);
}

#[test]
fn batchnorm_epsilon_override_reaches_both_sides() {
    let attrs: AttributeSet = NormAttrs::new(1e-2).unwrap().into();
    let case = OpCase::new(
        "eps",
        OpKind::BatchNorm,
        attrs,
        vec![Shape::new(vec![2, 4, 3]), Shape::new(vec![4, 4])],
    )
    .with_input_gen(vec![InputGen::Uniform, InputGen::Positive]);
    OpTester::new(Interpreter).run(&case).unwrap();
}

#[test]
fn scaled_data_range() {
    let config = HarnessConfig {
        data: DataRange { lo: -50.0, hi: 50.0 },
        tolerance: Tolerance::new(1e-4, 1e-5),
        ..HarnessConfig::default()
    };
    let tester = OpTester::with_config(Interpreter, config);
    for case in opdiff_parity::cases::op_nn_cases().unwrap() {
        if case.op != OpKind::BatchNorm {
            tester.run(&case).unwrap();
        }
    }
}
