use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use irport_core::{BackendModel, DType, ModelSpec, Tensor};
use tracing::{info, warn};

use crate::{compare, random_inputs, Comparison};

#[derive(Clone, Debug)]
pub struct VerifyPolicy {
    pub seed: u64,
    pub tolerance: f32,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            seed: 42,
            tolerance: 1e-3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerifyReport {
    pub comparison: Comparison,
    pub infer_time: Duration,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.comparison.passed()
    }
}

/// Checks a loaded `CustomAddMul` network against `(in0 + in1) * in2`
/// computed on the host.
pub struct Verifier {
    policy: VerifyPolicy,
}

impl Verifier {
    pub fn new(policy: VerifyPolicy) -> Self {
        Self { policy }
    }

    /// Validates the model signature and draws its random inputs.
    pub fn prepare(&self, spec: &ModelSpec) -> Result<Vec<Tensor>> {
        ensure!(
            spec.inputs.len() == 3,
            "model {} has {} inputs, expected 3",
            spec.name,
            spec.inputs.len()
        );
        ensure!(
            spec.outputs.len() == 1,
            "model {} has {} outputs, expected 1",
            spec.name,
            spec.outputs.len()
        );
        let first = &spec.inputs[0];
        for input in &spec.inputs {
            ensure!(
                input.dtype == DType::F32 && input.dims == first.dims,
                "input {} must be f32 with dims {:?}",
                input.name.0,
                first.dims
            );
        }
        random_inputs(spec, self.policy.seed)
    }

    pub fn check(&self, model: &mut dyn BackendModel, inputs: &[Tensor]) -> Result<VerifyReport> {
        let operands = inputs
            .iter()
            .map(Tensor::to_f32_vec)
            .collect::<Result<Vec<_>>>()?;
        let [a, b, c] = operands.as_slice() else {
            anyhow::bail!("expected 3 inputs, got {}", operands.len());
        };
        let expected = expected_add_mul(a, b, c);

        let t0 = Instant::now();
        let outputs = model.infer(inputs.to_vec())?;
        let infer_time = t0.elapsed();

        let out = outputs.first().context("model returned no outputs")?;
        let comparison = compare(&out.to_f32_vec()?, &expected, self.policy.tolerance)?;

        for m in &comparison.first {
            warn!(index = m.index, got = m.actual, expected = m.expected, "mismatch");
        }
        if comparison.passed() {
            info!(
                elements = comparison.compared,
                max_diff = comparison.max_diff,
                infer_ms = infer_time.as_secs_f64() * 1e3,
                "result matches expected output"
            );
        } else {
            warn!(
                mismatches = comparison.mismatches,
                max_diff = comparison.max_diff,
                "result does not match expected output"
            );
        }

        Ok(VerifyReport {
            comparison,
            infer_time,
        })
    }

    pub fn run(&self, model: &mut dyn BackendModel) -> Result<VerifyReport> {
        let inputs = self.prepare(model.spec())?;
        self.check(model, &inputs)
    }
}

pub fn expected_add_mul(a: &[f32], b: &[f32], c: &[f32]) -> Vec<f32> {
    a.iter()
        .zip(b)
        .zip(c)
        .map(|((a, b), c)| (a + b) * c)
        .collect()
}
