use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::DType;

/// Load-time settings handed to a backend.
///
/// Property keys are backend specific and travel untouched; only the two
/// settings every runtime understands get typed fields.
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// Kernel/layer description for custom ops (e.g. an OpenCL layer xml).
    pub custom_layer_config: Option<PathBuf>,
    pub inference_precision: Option<DType>,
    pub properties: BTreeMap<String, String>,
}

impl RuntimeConfig {
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
