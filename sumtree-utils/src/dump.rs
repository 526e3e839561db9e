use std::{borrow::Cow, io};
use sumtree::{keys::display_key, store::KvStore, Node, Tree};

type GraphNode<'a> = &'a NodeDescriptor;
type Edge = (usize, usize);

struct TreeGraph {
    nodes: Vec<NodeDescriptor>,
    edges: Vec<Edge>,
}

enum NodeDescriptor {
    Branch {
        id: usize,
        level: u16,
        key: String,
        accumulation: String,
        children: usize,
    },
    Leaf {
        id: usize,
        key: String,
        weight: String,
    },
}

impl NodeDescriptor {
    fn id(&self) -> usize {
        match self {
            NodeDescriptor::Branch { id, .. } => *id,
            NodeDescriptor::Leaf { id, .. } => *id,
        }
    }
}

impl<'a> dot::Labeller<'a, GraphNode<'a>, Edge> for TreeGraph {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot::Id::new("sumtree").unwrap()
    }

    fn node_id(&'a self, n: &GraphNode<'a>) -> dot::Id<'a> {
        dot::Id::new(format!("N{}", n.id())).unwrap()
    }

    fn node_label(&'a self, n: &GraphNode<'a>) -> dot::LabelText<'a> {
        let text = match n {
            NodeDescriptor::Branch {
                level,
                key,
                accumulation,
                children,
                ..
            } => format!("L{} {}\n{} in {}", level, key, accumulation, children),
            NodeDescriptor::Leaf { key, weight, .. } => format!("{}={}", key, weight),
        };
        dot::LabelText::label(text)
    }

    fn node_shape(&'a self, n: &GraphNode<'a>) -> Option<dot::LabelText<'a>> {
        let shape = match n {
            NodeDescriptor::Branch { .. } => "box",
            NodeDescriptor::Leaf { .. } => "ellipse",
        };
        Some(dot::LabelText::label(shape))
    }

    fn edge_label(&'a self, e: &Edge) -> dot::LabelText<'a> {
        match &self.nodes[e.1] {
            NodeDescriptor::Branch { accumulation, .. } => {
                dot::LabelText::label(Cow::from(accumulation.as_str()))
            }
            NodeDescriptor::Leaf { .. } => dot::LabelText::label(""),
        }
    }
}

impl<'a> dot::GraphWalk<'a, GraphNode<'a>, Edge> for TreeGraph {
    fn nodes(&'a self) -> dot::Nodes<'a, GraphNode<'a>> {
        self.nodes.iter().collect()
    }

    fn edges(&'a self) -> dot::Edges<'a, Edge> {
        self.edges.iter().cloned().collect()
    }

    fn source(&'a self, edge: &Edge) -> GraphNode<'a> {
        &self.nodes[edge.0]
    }

    fn target(&'a self, edge: &Edge) -> GraphNode<'a> {
        &self.nodes[edge.1]
    }
}

fn tree_graph<S: KvStore>(tree: &Tree<S>) -> anyhow::Result<TreeGraph> {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    // (level, id) of the ancestors of the current node
    let mut stack: Vec<(u16, usize)> = Vec::new();
    tree.visit(|level, node| {
        let id = nodes.len();
        while stack.last().map(|(l, _)| *l <= level).unwrap_or_default() {
            stack.pop();
        }
        if let Some((_, parent)) = stack.last() {
            edges.push((*parent, id));
        }
        nodes.push(match node {
            Node::Branch(branch) => NodeDescriptor::Branch {
                id,
                level,
                key: display_key(branch.min_key().unwrap_or_default()),
                accumulation: branch.accumulation().to_string(),
                children: branch.children.len(),
            },
            Node::Leaf(leaf) => NodeDescriptor::Leaf {
                id,
                key: display_key(&leaf.key),
                weight: leaf.weight.to_string(),
            },
        });
        stack.push((level, id));
    })?;
    Ok(TreeGraph { nodes, edges })
}

/// Writes the structure of `tree` as a graphviz dot graph to `out`.
///
/// Branches are depicted as boxes labelled with level, minimum key, accumulation and number of
/// children, leaves as ellipses labelled with key and weight.
pub fn graph<S: KvStore>(tree: &Tree<S>, mut out: impl io::Write) -> anyhow::Result<()> {
    let graph = tree_graph(tree)?;
    dot::render(&graph, &mut out)?;
    Ok(())
}
