use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use irport_backend_host::{AddMul, HostBackend, HostModel};
use irport_core::{Backend, BackendModel, Device, ModelSpec, RuntimeConfig, Tensor};
use irport_ir::{emit, TensorShape};
use irport_runtime::{share, stress, StressPolicy, Verifier, VerifyPolicy, MAX_REPORTED_MISMATCHES};
use tempfile::TempDir;

fn load_model(shape: TensorShape) -> Result<(TempDir, HostModel)> {
    let dir = tempfile::tempdir()?;
    let artifact = emit(dir.path().join("model"), "CustomAddMul_Net", shape)?;
    let model = HostBackend::new()
        .with_extension(AddMul)
        .load(&artifact, Device::Cpu, &RuntimeConfig::default())?;
    Ok((dir, model))
}

/// Computes `in0 + in1`, dropping the multiply.
struct AddOnly {
    inner: HostModel,
}

impl BackendModel for AddOnly {
    fn spec(&self) -> &ModelSpec {
        self.inner.spec()
    }

    fn infer(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        let a = inputs[0].to_f32_vec()?;
        let b = inputs[1].to_f32_vec()?;
        let sum: Vec<f32> = a.iter().zip(&b).map(|(a, b)| a + b).collect();
        Ok(vec![Tensor::from_f32(inputs[0].desc.shape.clone(), &sum)])
    }
}

#[test]
fn host_model_passes_verification() -> Result<()> {
    let (_dir, mut model) = load_model(TensorShape::new(1, 3, 16, 16))?;
    let report = Verifier::new(VerifyPolicy::default()).run(&mut model)?;

    assert!(report.passed());
    assert_eq!(report.comparison.compared, 3 * 16 * 16);
    assert!(report.comparison.max_diff <= 1e-3);
    Ok(())
}

#[test]
fn wrong_model_fails_verification() -> Result<()> {
    let (_dir, inner) = load_model(TensorShape::new(1, 3, 8, 8))?;
    let mut model = AddOnly { inner };
    let report = Verifier::new(VerifyPolicy::default()).run(&mut model)?;

    assert!(!report.passed());
    assert!(report.comparison.mismatches > MAX_REPORTED_MISMATCHES);
    assert_eq!(report.comparison.first.len(), MAX_REPORTED_MISMATCHES);
    Ok(())
}

#[test]
fn oversized_model_is_rejected_not_panicking() -> Result<()> {
    let (_dir, mut model) = load_model(TensorShape::new(1, 3, 1 << 40, 1 << 40))?;
    let err = Verifier::new(VerifyPolicy::default())
        .run(&mut model)
        .expect_err("element count overflows");
    assert!(format!("{err:#}").contains("overflows"), "{err:#}");
    Ok(())
}

#[test]
fn same_seed_gives_same_inputs() -> Result<()> {
    let (_dir, model) = load_model(TensorShape::new(1, 1, 4, 4))?;
    let verifier = Verifier::new(VerifyPolicy {
        seed: 7,
        tolerance: 1e-5,
    });
    let a = verifier.prepare(model.spec())?;
    let b = verifier.prepare(model.spec())?;
    assert_eq!(a.len(), 3);
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.to_f32_vec()?, y.to_f32_vec()?);
    }
    Ok(())
}

#[tokio::test]
async fn stress_runs_until_duration() -> Result<()> {
    let (_dir, model) = load_model(TensorShape::new(1, 3, 4, 4))?;
    let inputs = Verifier::new(VerifyPolicy::default()).prepare(model.spec())?;
    let policy = StressPolicy {
        duration: Duration::from_millis(50),
        report_every: 10,
    };

    let report = stress(share(model), inputs, policy, Arc::new(AtomicBool::new(false))).await?;
    assert!(!report.cancelled);
    assert!(report.iterations >= 1);
    assert!(report.elapsed >= Duration::from_millis(50));
    Ok(())
}

#[tokio::test]
async fn stress_stops_when_cancelled() -> Result<()> {
    let (_dir, model) = load_model(TensorShape::new(1, 3, 4, 4))?;
    let inputs = Verifier::new(VerifyPolicy::default()).prepare(model.spec())?;
    let policy = StressPolicy {
        duration: Duration::from_secs(3600),
        report_every: 0,
    };

    let report = stress(share(model), inputs, policy, Arc::new(AtomicBool::new(true))).await?;
    assert!(report.cancelled);
    assert_eq!(report.iterations, 0);
    Ok(())
}
