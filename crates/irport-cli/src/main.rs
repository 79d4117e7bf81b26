mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use irport_backend_host::{AddMul, HostBackend};
use irport_core::{
    Backend, BackendCapabilities, BackendModel, DType, Device, ModelArtifact, RuntimeConfig,
};
use irport_ir::{GraphDocument, NodeKind};
use irport_runtime::{share, stress, StressPolicy, Verifier, VerifyPolicy};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log)),
        )
        .init();

    match cli.command {
        Command::Emit { stem, name, shape } => {
            let artifact = irport_ir::emit(&stem, &name, shape)
                .with_context(|| format!("failed to emit model {}", stem.display()))?;
            println!("{}", artifact.xml.display());
            println!("{}", artifact.weights.display());
            Ok(())
        }
        Command::Verify {
            model,
            device,
            custom_config,
            precision,
            properties,
            seed,
            tolerance,
            stress_secs,
            report_every,
        } => {
            let device = parse_device(&device)?;
            let config = runtime_config(custom_config, precision.as_deref(), &properties)?;
            let policy = VerifyPolicy { seed, tolerance };
            let stress_policy = (stress_secs > 0).then(|| StressPolicy {
                duration: Duration::from_secs(stress_secs),
                report_every,
            });
            verify(model, device, config, policy, stress_policy).await
        }
    }
}

async fn verify(
    stem: PathBuf,
    device: Device,
    config: RuntimeConfig,
    policy: VerifyPolicy,
    stress_policy: Option<StressPolicy>,
) -> Result<()> {
    let backend = HostBackend::new().with_extension(AddMul);
    let artifact = ModelArtifact::from_stem(&stem);
    let doc = irport_ir::read(&artifact.xml)
        .with_context(|| format!("failed to read {}", artifact.xml.display()))?;
    check_capabilities(backend.name(), backend.capabilities(), device, &doc)?;

    tracing::info!(xml = %artifact.xml.display(), %device, "loading model");
    let verifier = Verifier::new(policy);
    let (model, inputs, report) = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut model = backend
            .load(&artifact, device, &config)
            .with_context(|| format!("failed to load {}", artifact.xml.display()))?;
        let inputs = verifier.prepare(model.spec())?;
        let report = verifier.check(&mut model, &inputs)?;
        Ok((model, inputs, report))
    })
    .await
    .context("verification task failed")??;
    if !report.passed() {
        anyhow::bail!(
            "verification failed: {} of {} elements differ, max difference {}",
            report.comparison.mismatches,
            report.comparison.compared,
            report.comparison.max_diff
        );
    }

    if let Some(stress_policy) = stress_policy {
        let cancel = Arc::new(AtomicBool::new(false));
        let watcher = tokio::spawn({
            let cancel = Arc::clone(&cancel);
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, stopping stress test");
                    cancel.store(true, Ordering::Relaxed);
                }
            }
        });
        let result = stress(share(model), inputs, stress_policy, cancel).await;
        watcher.abort();
        result?;
    }
    Ok(())
}

/// Fails when the model needs custom layers the backend cannot run. A GPU
/// request on a CPU-only backend is left for `load` to reject.
fn check_capabilities(
    backend: &str,
    caps: BackendCapabilities,
    device: Device,
    doc: &GraphDocument,
) -> Result<()> {
    if let Device::Gpu { .. } = device {
        if !caps.supports_gpu {
            tracing::warn!(%device, backend, "backend has no GPU support");
        }
    }
    let custom_layers = doc
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::CustomCompute(_)))
        .count();
    ensure!(
        custom_layers == 0 || caps.supports_custom_ops,
        "backend {backend} cannot run custom layers, model {} has {custom_layers}",
        doc.name
    );
    Ok(())
}

fn runtime_config(
    custom_layer_config: Option<PathBuf>,
    precision: Option<&str>,
    properties: &[String],
) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig {
        custom_layer_config,
        inference_precision: precision.map(DType::parse).transpose()?,
        ..RuntimeConfig::default()
    };
    for raw in properties {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid property {raw:?} (expected KEY=VALUE)"))?;
        config = config.with_property(key.trim(), value.trim());
    }
    Ok(config)
}

fn parse_device(raw: &str) -> Result<Device> {
    let lower = raw.to_ascii_lowercase();
    if lower == "cpu" {
        return Ok(Device::Cpu);
    }
    if lower == "gpu" {
        return Ok(Device::Gpu { device_id: 0 });
    }
    if let Some(rest) = lower.strip_prefix("gpu.") {
        let device_id: u32 = rest.parse().context("invalid gpu device id")?;
        return Ok(Device::Gpu { device_id });
    }

    anyhow::bail!("unsupported device: {raw} (expected cpu, gpu or gpu.N)");
}
