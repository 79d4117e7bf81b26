use std::collections::{HashMap, HashSet};

use irport_core::DType;

use crate::{IrError, IrResult, TensorShape};

/// Format version written on the `net` element.
pub const IR_VERSION: u32 = 10;

/// Version token of the built-in operations this crate emits.
pub const BUILTIN_OPSET: &str = "opset1";

/// A non built-in operation. Its version must not be an `opsetN` token so the
/// loader knows to look the type up among registered extensions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CustomOp {
    pub op_type: String,
    pub version: String,
}

impl CustomOp {
    pub fn new(op_type: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            op_type: op_type.into(),
            version: version.into(),
        }
    }

    /// `(in0 + in1) * in2`, element-wise.
    pub fn add_mul() -> Self {
        Self::new("CustomAddMul", "extension")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Input,
    CustomCompute(CustomOp),
    Output,
}

impl NodeKind {
    pub fn type_token(&self) -> &str {
        match self {
            NodeKind::Input => "Parameter",
            NodeKind::CustomCompute(op) => &op.op_type,
            NodeKind::Output => "Result",
        }
    }

    pub fn version_token(&self) -> &str {
        match self {
            NodeKind::Input | NodeKind::Output => BUILTIN_OPSET,
            NodeKind::CustomCompute(op) => &op.version,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
    pub id: u32,
    pub precision: DType,
    pub shape: TensorShape,
    /// Tensor name exposed to the runtime (`names` attribute).
    pub names: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: u32,
    pub name: String,
    pub kind: NodeKind,
    pub element_type: DType,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Node {
    pub fn input_port(&self, id: u32) -> Option<&Port> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_port(&self, id: u32) -> Option<&Port> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub node: u32,
    pub port: u32,
}

impl PortRef {
    pub const fn new(node: u32, port: u32) -> Self {
        Self { node, port }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub from: PortRef,
    pub to: PortRef,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphDocument {
    pub name: String,
    pub version: u32,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphDocument {
    /// Three parameters `in0..in2` feeding one ternary custom op `custom_op`,
    /// whose single output feeds the result node `out`.
    pub fn custom_ternary(name: &str, shape: TensorShape, op: CustomOp) -> IrResult<Self> {
        shape.validate()?;
        let port = |id: u32, names: Option<&str>| Port {
            id,
            precision: DType::F32,
            shape,
            names: names.map(str::to_owned),
        };

        const ARITY: u32 = 3;
        let custom_id = ARITY;
        let result_id = ARITY + 1;
        // Output port ids continue after the input ports on the same layer.
        let custom_out = ARITY;

        let mut nodes = Vec::with_capacity(ARITY as usize + 2);
        let mut edges = Vec::with_capacity(ARITY as usize + 1);
        for k in 0..ARITY {
            let input_name = format!("in{k}");
            nodes.push(Node {
                id: k,
                name: input_name.clone(),
                kind: NodeKind::Input,
                element_type: DType::F32,
                inputs: Vec::new(),
                outputs: vec![port(0, Some(&input_name))],
            });
            edges.push(Edge {
                from: PortRef::new(k, 0),
                to: PortRef::new(custom_id, k),
            });
        }
        nodes.push(Node {
            id: custom_id,
            name: "custom_op".to_string(),
            kind: NodeKind::CustomCompute(op),
            element_type: DType::F32,
            inputs: (0..ARITY).map(|k| port(k, None)).collect(),
            outputs: vec![port(custom_out, Some("out"))],
        });
        nodes.push(Node {
            id: result_id,
            name: "out".to_string(),
            kind: NodeKind::Output,
            element_type: DType::F32,
            inputs: vec![port(0, None)],
            outputs: Vec::new(),
        });
        edges.push(Edge {
            from: PortRef::new(custom_id, custom_out),
            to: PortRef::new(result_id, 0),
        });

        let doc = Self {
            name: name.to_string(),
            version: IR_VERSION,
            nodes,
            edges,
        };
        doc.validate()?;
        Ok(doc)
    }

    pub fn node(&self, id: u32) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Output)
    }

    /// The output port wired into `to`, if any.
    pub fn producer(&self, to: PortRef) -> Option<PortRef> {
        self.edges.iter().find(|e| e.to == to).map(|e| e.from)
    }

    pub fn validate(&self) -> IrResult<()> {
        if self.name.is_empty() {
            return Err(IrError::InvalidName("graph name is empty"));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(graph_err(format!("duplicate node id {}", node.id)));
            }
            if node.name.is_empty() {
                return Err(IrError::InvalidName("node name is empty"));
            }
            if !names.insert(node.name.as_str()) {
                return Err(graph_err(format!("duplicate node name {:?}", node.name)));
            }
            validate_node(node)?;
        }

        let mut fan_in: HashMap<PortRef, usize> = HashMap::new();
        for edge in &self.edges {
            let src = self
                .node(edge.from.node)
                .and_then(|n| n.output_port(edge.from.port))
                .ok_or_else(|| {
                    graph_err(format!(
                        "edge source {}:{} is not an output port",
                        edge.from.node, edge.from.port
                    ))
                })?;
            let dst = self
                .node(edge.to.node)
                .and_then(|n| n.input_port(edge.to.port))
                .ok_or_else(|| {
                    graph_err(format!(
                        "edge destination {}:{} is not an input port",
                        edge.to.node, edge.to.port
                    ))
                })?;
            if src.shape != dst.shape {
                return Err(graph_err(format!(
                    "edge {}:{} -> {}:{} joins shapes {} and {}",
                    edge.from.node, edge.from.port, edge.to.node, edge.to.port, src.shape, dst.shape
                )));
            }
            *fan_in.entry(edge.to).or_default() += 1;
        }

        for node in &self.nodes {
            for port in &node.inputs {
                match fan_in.get(&PortRef::new(node.id, port.id)) {
                    Some(1) => {}
                    Some(n) => {
                        return Err(graph_err(format!(
                            "input port {}:{} has {n} producers",
                            node.id, port.id
                        )))
                    }
                    None => {
                        return Err(graph_err(format!(
                            "input port {}:{} is not connected",
                            node.id, port.id
                        )))
                    }
                }
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Nodes ordered so every producer precedes its consumers. Ties keep
    /// document order.
    pub fn topological_order(&self) -> IrResult<Vec<&Node>> {
        let mut pending: HashMap<u32, usize> = self.nodes.iter().map(|n| (n.id, 0)).collect();
        for edge in &self.edges {
            *pending.entry(edge.to.node).or_default() += 1;
        }

        let mut placed = HashSet::new();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = self
            .nodes
            .iter()
            .find(|n| !placed.contains(&n.id) && pending.get(&n.id) == Some(&0))
        {
            placed.insert(node.id);
            order.push(node);
            for edge in self.edges.iter().filter(|e| e.from.node == node.id) {
                if let Some(count) = pending.get_mut(&edge.to.node) {
                    *count -= 1;
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(graph_err("graph contains a cycle"));
        }
        Ok(order)
    }
}

fn validate_node(node: &Node) -> IrResult<()> {
    let mut port_ids = HashSet::new();
    for port in node.inputs.iter().chain(&node.outputs) {
        port.shape.validate()?;
        if !port_ids.insert(port.id) {
            return Err(graph_err(format!(
                "node {:?} declares port {} twice",
                node.name, port.id
            )));
        }
    }

    let shape_ok = match node.kind {
        NodeKind::Input => node.inputs.is_empty() && node.outputs.len() == 1,
        NodeKind::CustomCompute(_) => !node.inputs.is_empty() && !node.outputs.is_empty(),
        NodeKind::Output => node.inputs.len() == 1 && node.outputs.is_empty(),
    };
    if !shape_ok {
        return Err(graph_err(format!(
            "node {:?} of type {} has {} inputs and {} outputs",
            node.name,
            node.kind.type_token(),
            node.inputs.len(),
            node.outputs.len()
        )));
    }

    if let NodeKind::CustomCompute(op) = &node.kind {
        if op.op_type.is_empty() {
            return Err(IrError::InvalidName("custom op type is empty"));
        }
        if op.version.is_empty() || op.version.starts_with("opset") {
            return Err(graph_err(format!(
                "custom op {} needs an extension version, got {:?}",
                op.op_type, op.version
            )));
        }
    }
    Ok(())
}

fn graph_err(msg: impl Into<String>) -> IrError {
    IrError::Graph(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ternary() -> GraphDocument {
        GraphDocument::custom_ternary("CustomAddMul_Net", TensorShape::default(), CustomOp::add_mul())
            .unwrap()
    }

    #[test]
    fn ternary_topology() {
        let doc = ternary();
        assert_eq!(doc.nodes.len(), 5);
        assert_eq!(doc.edges.len(), 4);
        assert_eq!(
            doc.nodes.iter().map(|n| n.name.as_str()).collect::<Vec<_>>(),
            ["in0", "in1", "in2", "custom_op", "out"]
        );

        let custom = doc.node(3).unwrap();
        assert_eq!(custom.kind, NodeKind::CustomCompute(CustomOp::add_mul()));
        assert_eq!(custom.inputs.len(), 3);
        assert_eq!(custom.outputs.len(), 1);
        for k in 0..3 {
            assert_eq!(doc.producer(PortRef::new(3, k)), Some(PortRef::new(k, 0)));
        }
        assert_eq!(doc.producer(PortRef::new(4, 0)), Some(PortRef::new(3, 3)));
    }

    #[test]
    fn topological_order_keeps_document_order() {
        let doc = ternary();
        let order: Vec<u32> = doc.topological_order().unwrap().iter().map(|n| n.id).collect();
        assert_eq!(order, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn rejects_invalid_shape_and_name() {
        let err = GraphDocument::custom_ternary("net", TensorShape::new(1, 0, 2, 2), CustomOp::add_mul());
        assert!(matches!(err, Err(IrError::InvalidShape(_))));

        let err = GraphDocument::custom_ternary("", TensorShape::default(), CustomOp::add_mul());
        assert!(matches!(err, Err(IrError::InvalidName(_))));
    }

    #[test]
    fn rejects_builtin_version_on_custom_op() {
        let err = GraphDocument::custom_ternary(
            "net",
            TensorShape::default(),
            CustomOp::new("CustomAddMul", "opset8"),
        );
        assert!(matches!(err, Err(IrError::Graph(_))));
    }

    #[test]
    fn rejects_unconnected_input() {
        let mut doc = ternary();
        doc.edges.remove(1);
        let err = doc.validate().unwrap_err().to_string();
        assert!(err.contains("3:1 is not connected"), "{err}");
    }

    #[test]
    fn rejects_double_connected_input() {
        let mut doc = ternary();
        doc.edges[1].to = PortRef::new(3, 0);
        let err = doc.validate().unwrap_err().to_string();
        assert!(err.contains("2 producers"), "{err}");
    }

    #[test]
    fn rejects_edge_from_input_port() {
        let mut doc = ternary();
        doc.edges[3].from = PortRef::new(3, 0);
        assert!(matches!(doc.validate(), Err(IrError::Graph(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut doc = ternary();
        doc.nodes[1].name = "in0".to_string();
        assert!(matches!(doc.validate(), Err(IrError::Graph(_))));
    }

    #[test]
    fn rejects_cycle() {
        let shape = TensorShape::new(1, 1, 2, 2);
        let node = |id: u32, name: &str| Node {
            id,
            name: name.to_string(),
            kind: NodeKind::CustomCompute(CustomOp::add_mul()),
            element_type: DType::F32,
            inputs: vec![Port {
                id: 0,
                precision: DType::F32,
                shape,
                names: None,
            }],
            outputs: vec![Port {
                id: 1,
                precision: DType::F32,
                shape,
                names: None,
            }],
        };
        let doc = GraphDocument {
            name: "loop".to_string(),
            version: IR_VERSION,
            nodes: vec![node(0, "a"), node(1, "b")],
            edges: vec![
                Edge {
                    from: PortRef::new(0, 1),
                    to: PortRef::new(1, 0),
                },
                Edge {
                    from: PortRef::new(1, 1),
                    to: PortRef::new(0, 0),
                },
            ],
        };
        let err = doc.validate().unwrap_err().to_string();
        assert!(err.contains("cycle"), "{err}");
    }
}
