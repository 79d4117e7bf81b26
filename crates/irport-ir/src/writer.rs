use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::{GraphDocument, IrError, IrResult, Node, NodeKind, Port};

/// Serializes a validated document to IR xml. Output is deterministic:
/// layers and edges keep document order and dims render as plain integers.
pub fn to_xml(doc: &GraphDocument) -> IrResult<Vec<u8>> {
    doc.validate()?;

    let mut out = XmlOut::new();
    out.event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
    let version = doc.version.to_string();
    out.start("net", &[("name", doc.name.as_str()), ("version", version.as_str())])?;

    out.start("layers", &[])?;
    for node in &doc.nodes {
        write_layer(&mut out, node)?;
    }
    out.end("layers")?;

    out.start("edges", &[])?;
    for edge in &doc.edges {
        let ends = [edge.from.node, edge.from.port, edge.to.node, edge.to.port].map(|v| v.to_string());
        out.empty(
            "edge",
            &[
                ("from-layer", ends[0].as_str()),
                ("from-port", ends[1].as_str()),
                ("to-layer", ends[2].as_str()),
                ("to-port", ends[3].as_str()),
            ],
        )?;
    }
    out.end("edges")?;
    out.end("net")?;

    let mut bytes = out.finish();
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_layer(out: &mut XmlOut, node: &Node) -> IrResult<()> {
    let id = node.id.to_string();
    out.start(
        "layer",
        &[
            ("id", id.as_str()),
            ("name", node.name.as_str()),
            ("type", node.kind.type_token()),
            ("version", node.kind.version_token()),
        ],
    )?;

    if let (NodeKind::Input, Some(port)) = (&node.kind, node.outputs.first()) {
        let shape = port.shape.to_string();
        out.empty(
            "data",
            &[
                ("shape", shape.as_str()),
                ("element_type", node.element_type.ir_element_type()),
            ],
        )?;
    }
    write_ports(out, "input", &node.inputs)?;
    write_ports(out, "output", &node.outputs)?;

    out.end("layer")
}

fn write_ports(out: &mut XmlOut, section: &str, ports: &[Port]) -> IrResult<()> {
    if ports.is_empty() {
        return Ok(());
    }
    out.start(section, &[])?;
    for port in ports {
        let id = port.id.to_string();
        let mut attrs = vec![("id", id.as_str()), ("precision", port.precision.ir_precision())];
        if let Some(names) = &port.names {
            attrs.push(("names", names.as_str()));
        }
        out.start("port", &attrs)?;
        for dim in port.shape.dims() {
            out.start("dim", &[])?;
            out.event(Event::Text(BytesText::new(&dim.to_string())))?;
            out.end("dim")?;
        }
        out.end("port")?;
    }
    out.end(section)
}

/// Tab-indented writer; attribute values and text are escaped by quick-xml.
struct XmlOut {
    inner: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Vec::new(), b'\t', 1),
        }
    }

    fn event(&mut self, event: Event<'_>) -> IrResult<()> {
        self.inner
            .write_event(event)
            .map_err(|e| IrError::Serialize(e.to_string()))
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> IrResult<()> {
        self.event(Event::Start(element(name, attrs)))
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> IrResult<()> {
        self.event(Event::Empty(element(name, attrs)))
    }

    fn end(&mut self, name: &str) -> IrResult<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn finish(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

fn element<'a>(name: &'a str, attrs: &[(&'a str, &'a str)]) -> BytesStart<'a> {
    let mut elem = BytesStart::new(name);
    for attr in attrs {
        elem.push_attribute(*attr);
    }
    elem
}
