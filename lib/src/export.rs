//! Graph dumps for inspection: Graphviz dot and GraphML.

use std::{borrow::Cow, fs::File, io, io::Write, path::Path};

use petgraph::dot::{Config, Dot};
use petgraph_graphml::GraphMl;

use crate::{graph::Dependency, node::ArrayNode, Graph};

/// Dot source, one node per array labeled with its kind and shape, edges
/// labeled with the input position.
pub fn to_dot(graph: &Graph) -> String {
  let dot = Dot::with_attr_getters(
    graph.inner(),
    &[Config::NodeNoLabel, Config::EdgeNoLabel],
    &|_, e| format!("label = \"{}\"", e.weight().input_order),
    &|_, (id, node)| format!("label = \"#{} {} {}\"", id.index(), node.name(), node.shape()),
  );
  format!("{:?}", dot)
}

pub fn to_graphml(graph: &Graph) -> io::Result<String> {
  let ml = GraphMl::new(graph.inner())
    .pretty_print(true)
    .export_node_weights(Box::new(|node: &Box<dyn ArrayNode>| {
      vec![
        (Cow::Borrowed("kind"), Cow::Borrowed(node.name())),
        (Cow::Borrowed("shape"), Cow::Owned(node.shape().to_string())),
      ]
    }))
    .export_edge_weights(Box::new(|dep: &Dependency| {
      vec![(Cow::Borrowed("input_order"), Cow::Owned(dep.input_order.to_string()))]
    }));
  let mut buf: Vec<u8> = vec![];
  ml.to_writer(&mut buf)?;
  String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn save_graphviz(path: impl AsRef<Path>, graph: &Graph) -> io::Result<()> {
  let mut file = File::create(path)?;
  write!(file, "{}", to_dot(graph))?;
  Ok(())
}
