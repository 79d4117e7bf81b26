use std::collections::HashMap;
use std::path::Path;

use irport_core::DType;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::{
    parse_err, CustomOp, Edge, GraphDocument, IrError, IrResult, Node, NodeKind, Port, PortRef,
    TensorShape, BUILTIN_OPSET,
};

/// Reads and validates an IR xml file.
pub fn read(path: impl AsRef<Path>) -> IrResult<GraphDocument> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| IrError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

/// Parses IR xml into a validated [`GraphDocument`]. Elements this crate does
/// not model (e.g. `rt_info`) are skipped.
pub fn parse(text: &str) -> IrResult<GraphDocument> {
    let mut reader = Reader::from_str(text);
    let mut state = ParseState::default();

    loop {
        match reader.read_event().map_err(parse_err)? {
            Event::Start(e) => state.open(&e)?,
            Event::Empty(e) => {
                state.open(&e)?;
                state.close(e.name().as_ref())?;
            }
            Event::End(e) => state.close(e.name().as_ref())?,
            Event::Text(t) => {
                let raw: &[u8] = &t;
                state.text(std::str::from_utf8(raw).map_err(parse_err)?)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let doc = state.finish()?;
    doc.validate()?;
    Ok(doc)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Input,
    Output,
}

struct PendingLayer {
    id: u32,
    name: String,
    op_type: String,
    version: String,
    data: Option<(TensorShape, Option<DType>)>,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
}

struct PendingPort {
    id: u32,
    precision: DType,
    names: Option<String>,
    dims: Vec<i64>,
}

#[derive(Default)]
struct ParseState {
    net: Option<(String, u32)>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    layer: Option<PendingLayer>,
    section: Option<Section>,
    port: Option<PendingPort>,
    in_dim: bool,
}

impl ParseState {
    fn open(&mut self, e: &BytesStart<'_>) -> IrResult<()> {
        match e.name().as_ref() {
            b"net" => {
                let mut attrs = attributes(e)?;
                let name = attrs.remove("name").unwrap_or_default();
                let version = number(&take(&mut attrs, "version", "net")?)?;
                self.net = Some((name, version));
            }
            b"layer" => {
                let mut attrs = attributes(e)?;
                self.layer = Some(PendingLayer {
                    id: number(&take(&mut attrs, "id", "layer")?)?,
                    name: take(&mut attrs, "name", "layer")?,
                    op_type: take(&mut attrs, "type", "layer")?,
                    version: take(&mut attrs, "version", "layer")?,
                    data: None,
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                });
            }
            b"data" => {
                if let Some(layer) = self.layer.as_mut() {
                    let attrs = attributes(e)?;
                    if let Some(shape) = attrs.get("shape").filter(|s| !s.is_empty()) {
                        let element_type = attrs
                            .get("element_type")
                            .map(|raw| {
                                DType::from_ir_element_type(raw).ok_or_else(|| {
                                    IrError::Parse(format!("unknown element_type {raw:?}"))
                                })
                            })
                            .transpose()?;
                        layer.data = Some((shape.parse::<TensorShape>()?, element_type));
                    }
                }
            }
            b"input" if self.layer.is_some() => self.section = Some(Section::Input),
            b"output" if self.layer.is_some() => self.section = Some(Section::Output),
            b"port" if self.section.is_some() => {
                let mut attrs = attributes(e)?;
                let precision = take(&mut attrs, "precision", "port")?;
                self.port = Some(PendingPort {
                    id: number(&take(&mut attrs, "id", "port")?)?,
                    precision: DType::from_ir_precision(&precision)
                        .ok_or_else(|| IrError::Parse(format!("unknown precision {precision:?}")))?,
                    names: attrs.remove("names"),
                    dims: Vec::new(),
                });
            }
            b"dim" if self.port.is_some() => self.in_dim = true,
            b"edge" => {
                let mut attrs = attributes(e)?;
                let mut end = |key: &str| -> IrResult<u32> { number(&take(&mut attrs, key, "edge")?) };
                let edge = Edge {
                    from: PortRef::new(end("from-layer")?, end("from-port")?),
                    to: PortRef::new(end("to-layer")?, end("to-port")?),
                };
                self.edges.push(edge);
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, raw: &str) -> IrResult<()> {
        let raw = raw.trim();
        if raw.is_empty() || !self.in_dim {
            return Ok(());
        }
        if let Some(port) = self.port.as_mut() {
            let dim = raw
                .parse::<i64>()
                .map_err(|_| IrError::Parse(format!("dimension {raw:?} is not an integer")))?;
            port.dims.push(dim);
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) -> IrResult<()> {
        match name {
            b"dim" => self.in_dim = false,
            b"port" => {
                if let Some(port) = self.port.take() {
                    self.finish_port(port)?;
                }
            }
            b"input" | b"output" => self.section = None,
            b"layer" => {
                if let Some(layer) = self.layer.take() {
                    self.nodes.push(finish_layer(layer)?);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_port(&mut self, port: PendingPort) -> IrResult<()> {
        let shape = match port.dims.as_slice() {
            [n, c, h, w] => TensorShape::new(*n, *c, *h, *w),
            dims => {
                return Err(IrError::Parse(format!(
                    "port {} has rank {}, only rank 4 is supported",
                    port.id,
                    dims.len()
                )))
            }
        };
        let port_out = Port {
            id: port.id,
            precision: port.precision,
            shape,
            names: port.names,
        };
        let Some(layer) = self.layer.as_mut() else {
            return Ok(());
        };
        match self.section {
            Some(Section::Input) => layer.inputs.push(port_out),
            Some(Section::Output) => layer.outputs.push(port_out),
            None => {}
        }
        Ok(())
    }

    fn finish(self) -> IrResult<GraphDocument> {
        let (name, version) = self
            .net
            .ok_or_else(|| IrError::Parse("missing <net> element".to_string()))?;
        Ok(GraphDocument {
            name,
            version,
            nodes: self.nodes,
            edges: self.edges,
        })
    }
}

fn finish_layer(layer: PendingLayer) -> IrResult<Node> {
    let kind = match (layer.op_type.as_str(), layer.version.as_str()) {
        ("Parameter", BUILTIN_OPSET) => NodeKind::Input,
        ("Result", BUILTIN_OPSET) => NodeKind::Output,
        (op, version) if version.starts_with("opset") => {
            return Err(IrError::Parse(format!(
                "layer {:?}: built-in operation {op} ({version}) is not supported",
                layer.name
            )))
        }
        (op, version) => NodeKind::CustomCompute(CustomOp::new(op, version)),
    };

    let first_precision = layer.outputs.first().or(layer.inputs.first()).map(|p| p.precision);
    let element_type = match layer.data {
        Some((shape, element_type)) => {
            if let Some(port) = layer.outputs.first().filter(|p| p.shape != shape) {
                return Err(IrError::Graph(format!(
                    "layer {:?}: data shape {shape} disagrees with port {} shape {}",
                    layer.name, port.id, port.shape
                )));
            }
            element_type.or(first_precision)
        }
        None => first_precision,
    };

    Ok(Node {
        id: layer.id,
        name: layer.name,
        kind,
        element_type: element_type.unwrap_or(DType::F32),
        inputs: layer.inputs,
        outputs: layer.outputs,
    })
}

fn attributes(e: &BytesStart<'_>) -> IrResult<HashMap<String, String>> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(parse_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(parse_err)?.into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

fn take(attrs: &mut HashMap<String, String>, key: &str, element: &str) -> IrResult<String> {
    attrs
        .remove(key)
        .ok_or_else(|| IrError::Parse(format!("<{element}> is missing attribute {key:?}")))
}

fn number(raw: &str) -> IrResult<u32> {
    raw.parse()
        .map_err(|_| IrError::Parse(format!("{raw:?} is not a non-negative integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::to_xml;

    fn emitted(shape: TensorShape) -> String {
        let doc = GraphDocument::custom_ternary("CustomAddMul_Net", shape, CustomOp::add_mul())
            .unwrap();
        String::from_utf8(to_xml(&doc).unwrap()).unwrap()
    }

    #[test]
    fn reads_back_emitted_document() {
        let shape = TensorShape::new(2, 5, 7, 11);
        let expected =
            GraphDocument::custom_ternary("CustomAddMul_Net", shape, CustomOp::add_mul()).unwrap();
        let doc = parse(&emitted(shape)).unwrap();
        assert_eq!(doc, expected);
    }

    #[test]
    fn tolerates_unknown_elements_and_spacing() {
        let xml = emitted(TensorShape::default()).replace(
            "</layers>",
            "</layers>\n<rt_info><attribute name=\"x\" value=\"y\"/></rt_info>",
        );
        let doc = parse(&xml).unwrap();
        assert_eq!(doc.nodes.len(), 5);
    }

    #[test]
    fn rejects_builtin_ops() {
        let xml = emitted(TensorShape::default())
            .replace("type=\"CustomAddMul\" version=\"extension\"", "type=\"Add\" version=\"opset1\"");
        let err = parse(&xml).unwrap_err().to_string();
        assert!(err.contains("built-in operation Add"), "{err}");
    }

    #[test]
    fn rejects_bad_dimension() {
        let xml = emitted(TensorShape::default()).replacen("<dim>224</dim>", "<dim>2.24e2</dim>", 1);
        assert!(matches!(parse(&xml), Err(IrError::Parse(_))));
    }

    #[test]
    fn rejects_missing_edge() {
        let xml = emitted(TensorShape::default()).replace(
            "<edge from-layer=\"1\" from-port=\"0\" to-layer=\"3\" to-port=\"1\"/>",
            "",
        );
        assert!(matches!(parse(&xml), Err(IrError::Graph(_))));
    }

    #[test]
    fn rejects_missing_net() {
        assert!(matches!(parse("<layers/>"), Err(IrError::Parse(_))));
    }
}
