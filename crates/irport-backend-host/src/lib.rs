//! CPU reference backend for IR models. It evaluates `Parameter`, `Result`
//! and registered extension layers only, which is enough to exercise the
//! load/configure/infer/compare pipeline without a device.

mod extension;

pub use extension::*;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use irport_core::{
    Backend, BackendCapabilities, BackendModel, DType, Device, IOName, ModelArtifact, ModelSpec,
    RuntimeConfig, Tensor, TensorSpec,
};
use irport_ir::{CustomOp, GraphDocument, Node, NodeKind, PortRef};
use tracing::{debug, info};

#[derive(Default)]
pub struct HostBackend {
    extensions: HashMap<CustomOp, Arc<dyn OpExtension>>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom op implementation, replacing any earlier one with
    /// the same type and version.
    pub fn with_extension(mut self, extension: impl OpExtension) -> Self {
        let op = extension.op();
        debug!(op = %op.op_type, version = %op.version, "registered extension");
        self.extensions.insert(op, Arc::new(extension));
        self
    }
}

pub struct HostModel {
    spec: ModelSpec,
    doc: GraphDocument,
    kernels: HashMap<u32, Arc<dyn OpExtension>>,
}

impl Backend for HostBackend {
    type Model = HostModel;

    fn name(&self) -> &'static str {
        "host"
    }

    fn load(
        &self,
        artifact: &ModelArtifact,
        device: Device,
        config: &RuntimeConfig,
    ) -> Result<Self::Model> {
        if let Device::Gpu { .. } = device {
            bail!("host backend cannot run on {device}");
        }
        if let Some(precision) = config.inference_precision {
            ensure!(
                precision == DType::F32,
                "host backend only executes f32, got inference precision {precision:?}"
            );
        }
        if let Some(path) = &config.custom_layer_config {
            debug!(path = %path.display(), "custom layer config unused; kernels come from registered extensions");
        }
        for (key, value) in &config.properties {
            debug!(%key, %value, "ignoring runtime property");
        }

        let doc = irport_ir::read(&artifact.xml)
            .with_context(|| format!("failed to read IR model {}", artifact.xml.display()))?;
        let weights = std::fs::read(&artifact.weights)
            .with_context(|| format!("failed to read weights {}", artifact.weights.display()))?;

        let mut kernels = HashMap::new();
        for node in &doc.nodes {
            check_precision(node)?;
            let NodeKind::CustomCompute(op) = &node.kind else {
                continue;
            };
            let extension = self.extensions.get(op).with_context(|| {
                format!(
                    "layer {:?}: no extension registered for {} ({})",
                    node.name, op.op_type, op.version
                )
            })?;
            ensure!(
                node.inputs.len() == extension.arity() && node.outputs.len() == 1,
                "layer {:?}: {} takes {} inputs and 1 output, graph declares {} and {}",
                node.name,
                op.op_type,
                extension.arity(),
                node.inputs.len(),
                node.outputs.len()
            );
            kernels.insert(node.id, Arc::clone(extension));
        }

        let spec = build_model_spec(&doc)?;
        info!(
            model = %doc.name,
            backend = self.name(),
            %device,
            weights_bytes = weights.len(),
            custom_layers = kernels.len(),
            "loaded IR model"
        );

        Ok(HostModel { spec, doc, kernels })
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            supports_gpu: false,
            supports_custom_ops: true,
        }
    }
}

impl BackendModel for HostModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn infer(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>> {
        ensure!(
            inputs.len() == self.spec.inputs.len(),
            "expected {} inputs, got {}",
            self.spec.inputs.len(),
            inputs.len()
        );

        let mut bound: HashMap<u32, Tensor> = self.doc.inputs().map(|n| n.id).zip(inputs).collect();
        let mut values: HashMap<PortRef, Vec<f32>> = HashMap::new();
        let mut results: HashMap<u32, Tensor> = HashMap::new();

        for node in self.doc.topological_order()? {
            match &node.kind {
                NodeKind::Input => {
                    let port = single(&node.outputs, node)?;
                    let tensor = bound
                        .remove(&node.id)
                        .with_context(|| format!("no tensor bound to input {:?}", node.name))?;
                    ensure!(
                        tensor.desc.shape == port.shape.to_shape()?,
                        "input {:?}: shape {:?} does not match {}",
                        node.name,
                        tensor.desc.shape.0.as_slice(),
                        port.shape
                    );
                    values.insert(PortRef::new(node.id, port.id), tensor.to_f32_vec()?);
                }
                NodeKind::CustomCompute(_) => {
                    let kernel = self
                        .kernels
                        .get(&node.id)
                        .with_context(|| format!("layer {:?} has no kernel", node.name))?;
                    let port = single(&node.outputs, node)?;
                    let mut out = vec![0.0f32; port.shape.to_shape()?.numel()?];
                    {
                        let args = node
                            .inputs
                            .iter()
                            .map(|p| operand(&self.doc, &values, node, p.id))
                            .collect::<Result<Vec<_>>>()?;
                        kernel.evaluate(&args, &mut out)?;
                    }
                    values.insert(PortRef::new(node.id, port.id), out);
                }
                NodeKind::Output => {
                    let port = single(&node.inputs, node)?;
                    let data = operand(&self.doc, &values, node, port.id)?;
                    results.insert(node.id, Tensor::from_f32(port.shape.to_shape()?, data));
                }
            }
        }

        self.doc
            .outputs()
            .map(|n| {
                results
                    .remove(&n.id)
                    .with_context(|| format!("result {:?} was not computed", n.name))
            })
            .collect()
    }
}

fn operand<'a>(
    doc: &GraphDocument,
    values: &'a HashMap<PortRef, Vec<f32>>,
    node: &Node,
    port: u32,
) -> Result<&'a [f32]> {
    let src = doc
        .producer(PortRef::new(node.id, port))
        .with_context(|| format!("layer {:?} port {port} is not connected", node.name))?;
    values
        .get(&src)
        .map(Vec::as_slice)
        .with_context(|| format!("layer {:?} port {port} read before it was produced", node.name))
}

fn single<'a>(ports: &'a [irport_ir::Port], node: &Node) -> Result<&'a irport_ir::Port> {
    match ports {
        [port] => Ok(port),
        _ => bail!("layer {:?} must have exactly one port here, has {}", node.name, ports.len()),
    }
}

fn check_precision(node: &Node) -> Result<()> {
    ensure!(
        node.element_type == DType::F32,
        "layer {:?}: host backend only executes f32, got {:?}",
        node.name,
        node.element_type
    );
    for port in node.inputs.iter().chain(&node.outputs) {
        ensure!(
            port.precision == DType::F32,
            "layer {:?} port {}: unsupported precision {}",
            node.name,
            port.id,
            port.precision.ir_precision()
        );
    }
    Ok(())
}

fn build_model_spec(doc: &GraphDocument) -> Result<ModelSpec> {
    let tensor_spec = |name: &str, node: &Node, port: &irport_ir::Port| -> Result<TensorSpec> {
        let dims = port.shape.to_shape()?;
        Ok(TensorSpec {
            name: IOName(name.to_string()),
            dtype: node.element_type,
            rank: dims.rank(),
            dims: dims.0.iter().map(|d| Some(*d)).collect(),
        })
    };

    let inputs = doc
        .inputs()
        .map(|node| -> Result<TensorSpec> {
            let port = single(&node.outputs, node)?;
            tensor_spec(port.names.as_deref().unwrap_or(&node.name), node, port)
        })
        .collect::<Result<Vec<_>>>()?;
    let outputs = doc
        .outputs()
        .map(|node| -> Result<TensorSpec> {
            tensor_spec(&node.name, node, single(&node.inputs, node)?)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ModelSpec {
        name: doc.name.clone(),
        inputs,
        outputs,
    })
}
