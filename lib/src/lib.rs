//! Incremental evaluation of a DAG of array-valued nodes.
//!
//! A [`Graph`] owns the nodes. A [`State`] holds one buffer and one pending
//! diff per node. A search loop mutates decision variables, calls
//! [`Graph::propagate`] to push the changes through the reachable nodes, then
//! keeps the result with [`Graph::commit`] or drops it with [`Graph::revert`].

pub mod array;
pub mod error;
pub mod export;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod shape;
pub mod state;
pub mod utils;

pub use array::{ArrayState, Update};
pub use error::{DataError, GraphError, Result, StructuralError};
pub use graph::Graph;
pub use node::{ArrayNode, NodeId, Variable};
pub use shape::Shape;
pub use state::{NodeState, State};
