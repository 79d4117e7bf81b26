use anyhow::Result;

use crate::{Device, ModelArtifact, ModelSpec, RuntimeConfig, Tensor};

#[derive(Clone, Copy, Debug)]
pub struct BackendCapabilities {
    pub supports_gpu: bool,
    pub supports_custom_ops: bool,
}

pub trait Backend: Send + Sync + 'static {
    type Model: BackendModel;

    fn name(&self) -> &'static str;
    fn load(
        &self,
        artifact: &ModelArtifact,
        device: Device,
        config: &RuntimeConfig,
    ) -> Result<Self::Model>;
    fn capabilities(&self) -> BackendCapabilities;
}

pub trait BackendModel: Send + 'static {
    fn spec(&self) -> &ModelSpec;

    /// Inputs are positional, in the order of `spec().inputs`.
    fn infer(&mut self, inputs: Vec<Tensor>) -> Result<Vec<Tensor>>;
}
