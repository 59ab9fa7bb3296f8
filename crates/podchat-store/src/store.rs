//! The store handle threaded through every engine operation: a working
//! graph plus the transport that keeps it in sync with the remote pods.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use podchat_shared::error::TransportError;

use crate::graph::{Graph, Statement};
use crate::transport::{Transport, WebResponse};
use crate::turtle;

pub struct Store {
    graph: Mutex<Graph>,
    loaded: Mutex<HashSet<String>>,
    transport: Arc<dyn Transport>,
}

impl Store {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            graph: Mutex::new(Graph::new()),
            loaded: Mutex::new(HashSet::new()),
            transport,
        }
    }

    /// Fetches a document into the working graph. `force` bypasses the
    /// local copy and replaces the document's statements wholesale.
    pub async fn load(&self, uri: &str, force: bool) -> Result<(), TransportError> {
        if !force && self.loaded.lock().unwrap().contains(uri) {
            return Ok(());
        }
        let body = self.transport.get(uri).await?;
        let statements = turtle::parse(uri, &body)?;
        debug!(uri = %uri, statements = statements.len(), "loaded document");
        let mut graph = self.graph.lock().unwrap();
        graph.remove_document(uri);
        graph.insert_all(statements);
        self.loaded.lock().unwrap().insert(uri.to_string());
        Ok(())
    }

    /// Applies a patch remotely, then mirrors it into the working graph.
    /// Statements are grouped by their document; either set may be empty.
    pub async fn update(
        &self,
        delete: Vec<Statement>,
        insert: Vec<Statement>,
    ) -> Result<(), TransportError> {
        let mut docs: Vec<String> = Vec::new();
        for statement in delete.iter().chain(insert.iter()) {
            if !docs.contains(&statement.doc) {
                docs.push(statement.doc.clone());
            }
        }
        for doc in &docs {
            let doc_delete: Vec<Statement> =
                delete.iter().filter(|s| &s.doc == doc).cloned().collect();
            let doc_insert: Vec<Statement> =
                insert.iter().filter(|s| &s.doc == doc).cloned().collect();
            self.transport.update(doc, &doc_delete, &doc_insert).await?;
        }
        let mut graph = self.graph.lock().unwrap();
        for statement in &delete {
            graph.remove(statement);
        }
        graph.insert_all(insert);
        Ok(())
    }

    /// Low-level verb against the pod. Does not touch the working graph.
    pub async fn web_operation(
        &self,
        method: &str,
        uri: &str,
        body: Option<String>,
    ) -> Result<WebResponse, TransportError> {
        self.transport.request(method, uri, body).await
    }

    /// Evicts a document from the working graph. The next non-forced load
    /// will fetch it again.
    pub fn remove_document(&self, uri: &str) {
        self.graph.lock().unwrap().remove_document(uri);
        self.loaded.lock().unwrap().remove(uri);
    }

    /// Creates an empty document when the pod does not have one yet.
    pub async fn create_if_not_exists(&self, uri: &str) -> Result<(), TransportError> {
        match self.load(uri, false).await {
            Ok(()) => Ok(()),
            Err(TransportError::Http { status: 404, .. }) => {
                let response = self.web_operation("PUT", uri, None).await?;
                if !response.ok {
                    return Err(TransportError::Http {
                        url: uri.to_string(),
                        status: response.status,
                    });
                }
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Runs a closure over the working graph. The guard never crosses an
    /// await point.
    pub fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        let graph = self.graph.lock().unwrap();
        f(&graph)
    }

    #[doc(hidden)]
    pub fn graph_mut(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock().unwrap()
    }
}
