use std::path::Path;

use irport_core::ModelArtifact;
use tracing::{debug, info};

use crate::{to_xml, CustomOp, GraphDocument, IrError, IrResult, TensorShape};

/// Writes the `CustomAddMul` network to `<stem>.xml` and `<stem>.bin`.
///
/// The shape is checked before anything touches the filesystem. If the xml
/// write succeeds and the weights write fails, the xml is left in place;
/// re-running overwrites both.
pub fn emit(stem: impl AsRef<Path>, graph_name: &str, shape: TensorShape) -> IrResult<ModelArtifact> {
    shape.validate()?;
    let doc = GraphDocument::custom_ternary(graph_name, shape, CustomOp::add_mul())?;
    emit_graph(stem, &doc)
}

/// Serializes any constant-free document next to an empty weights file.
pub fn emit_graph(stem: impl AsRef<Path>, doc: &GraphDocument) -> IrResult<ModelArtifact> {
    let stem = stem.as_ref();
    if stem.as_os_str().is_empty() {
        return Err(IrError::InvalidName("output path stem is empty"));
    }

    let xml = to_xml(doc)?;
    let artifact = ModelArtifact::from_stem(stem);
    debug!(graph = %doc.name, bytes = xml.len(), "serialized graph");

    write_file(&artifact.xml, &xml)?;
    // No constant layers, so the weights blob is empty.
    write_file(&artifact.weights, &[])?;

    info!(
        xml = %artifact.xml.display(),
        weights = %artifact.weights.display(),
        nodes = doc.nodes.len(),
        edges = doc.edges.len(),
        "wrote IR model"
    );
    Ok(artifact)
}

fn write_file(path: &Path, bytes: &[u8]) -> IrResult<()> {
    std::fs::write(path, bytes).map_err(|source| IrError::Io {
        path: path.to_path_buf(),
        source,
    })
}
