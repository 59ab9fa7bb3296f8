//! Working graph and pod transport for the podchat engine.
//!
//! The [`Store`] handle bundles an in-memory statement graph with a
//! [`Transport`] implementation and is passed by reference through every
//! engine operation; there is no ambient global graph.

pub mod graph;
pub mod store;
pub mod transport;
pub mod turtle;

pub use graph::{st, Graph, Node, Statement};
pub use store::Store;
pub use transport::{HttpTransport, MemTransport, Transport, WebResponse};
