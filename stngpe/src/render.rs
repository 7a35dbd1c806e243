use crate::constants::Constants;

use graphviz_rust::{
    cmd::{CommandArg, Format},
    dot_structures::{
        Attribute, Edge, EdgeTy, Graph, GraphAttributes, Id, Node, NodeId, Stmt, Vertex,
    },
    exec, print,
    printer::PrinterContext,
};

fn attr(key: &str, value: &str) -> Attribute {
    Attribute(Id::Plain(key.into()), Id::Escaped(format!("\"{value}\"")))
}

fn node_id(name: &str) -> NodeId {
    NodeId(Id::Plain(name.to_string()), None)
}

fn edge(from: &str, to: &str, label: String, weight: f64) -> Stmt {
    // Excitatory solid, inhibitory with a flat head
    let head = if weight < 0.0 { "tee" } else { "normal" };
    Stmt::Edge(Edge {
        ty: EdgeTy::Pair(Vertex::N(node_id(from)), Vertex::N(node_id(to))),
        attributes: vec![attr("label", &label), attr("arrowhead", head)],
    })
}

/// Build the connectivity graph of the loop: afferents into STN and GPe and
/// the delayed STN/GPe couplings. Zero weights are left out.
pub fn to_graph(constants: &Constants) -> Graph {
    let mut g = Graph::DiGraph {
        id: Id::Plain("stn_gpe".to_string()),
        strict: false,
        stmts: Vec::new(),
    };

    g.add_stmt(Stmt::GAttribute(GraphAttributes::Graph(vec![
        Attribute(Id::Plain("layout".into()), Id::Plain("dot".into())),
        Attribute(Id::Plain("rankdir".into()), Id::Plain("LR".into())),
    ])));

    for (name, label) in [
        ("CTX", format!("CTX\n{} spk/s", constants.ctx_level)),
        ("STR", format!("STR\n{} spk/s", constants.str_level)),
        ("STN", format!("STN\ntau {} ms", constants.tau1)),
        ("GPe", format!("GPe\ntau {} ms", constants.tau2)),
    ] {
        g.add_stmt(Stmt::Node(Node::new(
            node_id(name),
            vec![attr("shape", "box"), attr("label", &label)],
        )));
    }

    g.add_stmt(edge("CTX", "STN", format!("{}", constants.cctx), constants.cctx));
    g.add_stmt(edge("STR", "GPe", format!("{}", constants.cstr), constants.cstr));

    let couplings = [
        ("STN", "STN", constants.c11, constants.d11),
        ("GPe", "STN", constants.c12, constants.d12),
        ("STN", "GPe", constants.c21, constants.d21),
        ("GPe", "GPe", constants.c22, constants.d22),
    ];
    for (from, to, weight, delay) in couplings {
        if weight != 0.0 {
            g.add_stmt(edge(from, to, format!("{weight} / {delay} ms"), weight));
        }
    }

    g
}

/// DOT source of [`to_graph`].
pub fn to_dot(constants: &Constants) -> String {
    let mut ctx = PrinterContext::default();
    print(to_graph(constants), &mut ctx)
}

/// Render the loop with Graphviz and return a PNG in-memory.
/// Requires a `dot` installation.
pub fn to_png(constants: &Constants) -> std::io::Result<Vec<u8>> {
    let mut ctx = PrinterContext::default();
    exec(
        to_graph(constants),
        &mut ctx,
        vec![CommandArg::Format(Format::Png)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_lists_nonzero_couplings() {
        let dot = to_dot(&Constants::healthy());
        assert!(dot.contains("digraph stn_gpe"));
        assert!(dot.contains("-1.12 / 6 ms"));
        assert!(dot.contains("19 / 6 ms"));
        assert!(dot.contains("-6.6 / 4 ms"));
        // c11 = 0 in the healthy set
        assert!(!dot.contains("0 / 0 ms"));
    }
}
