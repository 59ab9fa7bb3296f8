//! Transport against remote pods. The engine is written against the
//! [`Transport`] trait; production uses [`HttpTransport`], tests the
//! in-memory [`MemTransport`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use podchat_shared::error::TransportError;
use podchat_shared::vocab::{iana, ldp, rdf};

use crate::graph::{st, Node, Statement};
use crate::turtle;

/// Outcome of a low-level web operation.
#[derive(Debug, Clone, Copy)]
pub struct WebResponse {
    pub ok: bool,
    pub status: u16,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches the turtle body of a document. Missing documents are a
    /// transport error, the caller decides whether that is fatal.
    async fn get(&self, uri: &str) -> Result<String, TransportError>;

    /// Applies a patch of deletions and insertions to one document.
    /// Either set may be empty.
    async fn update(
        &self,
        uri: &str,
        delete: &[Statement],
        insert: &[Statement],
    ) -> Result<(), TransportError>;

    /// Low-level verb. Used for resource deletion, posting notification
    /// documents and creating empty documents.
    async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<String>,
    ) -> Result<WebResponse, TransportError>;
}

/// HTTPS transport on reqwest. Authentication headers are the identity
/// provider's concern and arrive via the prepared client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, uri: &str) -> Result<String, TransportError> {
        debug!(uri = %uri, "GET");
        let response = self
            .client
            .get(uri)
            .header("Accept", "text/turtle")
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(TransportError::Http {
                url: uri.to_string(),
                status,
            });
        }
        response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn update(
        &self,
        uri: &str,
        delete: &[Statement],
        insert: &[Statement],
    ) -> Result<(), TransportError> {
        let mut patch = String::new();
        if !delete.is_empty() {
            patch.push_str("DELETE DATA {\n");
            patch.push_str(&turtle::serialize(delete));
            patch.push_str("};\n");
        }
        if !insert.is_empty() {
            patch.push_str("INSERT DATA {\n");
            patch.push_str(&turtle::serialize(insert));
            patch.push_str("};\n");
        }
        if patch.is_empty() {
            return Ok(());
        }
        debug!(uri = %uri, delete = delete.len(), insert = insert.len(), "PATCH");
        let response = self
            .client
            .patch(uri)
            .header("Content-Type", "application/sparql-update")
            .body(patch)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(TransportError::Http {
                url: uri.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<String>,
    ) -> Result<WebResponse, TransportError> {
        debug!(method = %method, uri = %uri, "web operation");
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| TransportError::Request(format!("invalid method '{method}'")))?;
        let mut request = self.client.request(method, uri);
        if let Some(body) = body {
            request = request
                .header("Content-Type", "text/turtle")
                .body(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(WebResponse {
            ok: response.status().is_success(),
            status: response.status().as_u16(),
        })
    }
}

/// In-memory pod for tests: documents keyed by URL, containment triples
/// maintained on POST and DELETE the way pods list their containers.
#[derive(Default)]
pub struct MemTransport {
    docs: Mutex<HashMap<String, Vec<Statement>>>,
    get_count: AtomicUsize,
    requests: Mutex<Vec<(String, String)>>,
    /// URIs whose DELETE should fail, for partial-failure tests.
    failing_deletes: Mutex<Vec<String>>,
}

impl MemTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document, wiring a containment triple into the parent
    /// container document when it already exists.
    pub fn put_doc(&self, uri: &str, statements: Vec<Statement>) {
        let mut docs = self.docs.lock().unwrap();
        docs.insert(uri.to_string(), statements);
    }

    /// Seeds a container listing: the container document plus one
    /// containment triple per child, typed as container or leaf.
    pub fn put_container(&self, uri: &str, subcontainers: &[&str], leaves: &[&str]) {
        let mut statements = Vec::new();
        for child in subcontainers {
            statements.push(st(uri, ldp::CONTAINS, Node::iri(*child), uri));
            statements.push(st(*child, rdf::TYPE, Node::iri(ldp::CONTAINER), uri));
        }
        for child in leaves {
            statements.push(st(uri, ldp::CONTAINS, Node::iri(*child), uri));
            statements.push(st(*child, rdf::TYPE, Node::iri(iana::TURTLE_RESOURCE), uri));
        }
        self.put_doc(uri, statements);
    }

    pub fn doc(&self, uri: &str) -> Vec<Statement> {
        self.docs
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_doc(&self, uri: &str) -> bool {
        self.docs.lock().unwrap().contains_key(uri)
    }

    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn fail_delete_of(&self, uri: &str) {
        self.failing_deletes.lock().unwrap().push(uri.to_string());
    }

    fn container_of(uri: &str) -> String {
        let trimmed = uri.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => trimmed[..=idx].to_string(),
            None => trimmed.to_string(),
        }
    }
}

#[async_trait]
impl Transport for MemTransport {
    async fn get(&self, uri: &str) -> Result<String, TransportError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        let docs = self.docs.lock().unwrap();
        match docs.get(uri) {
            Some(statements) => Ok(turtle::serialize(statements)),
            None => Err(TransportError::Http {
                url: uri.to_string(),
                status: 404,
            }),
        }
    }

    async fn update(
        &self,
        uri: &str,
        delete: &[Statement],
        insert: &[Statement],
    ) -> Result<(), TransportError> {
        let mut docs = self.docs.lock().unwrap();
        let doc = docs.entry(uri.to_string()).or_default();
        for statement in delete {
            doc.retain(|s| {
                !(s.subject == statement.subject
                    && s.predicate == statement.predicate
                    && s.object == statement.object)
            });
        }
        for statement in insert {
            let mut stored = statement.clone();
            stored.doc = uri.to_string();
            if !doc.contains(&stored) {
                doc.push(stored);
            }
        }
        Ok(())
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<String>,
    ) -> Result<WebResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), uri.to_string()));
        match method {
            "DELETE" => {
                if self.failing_deletes.lock().unwrap().iter().any(|u| u == uri) {
                    return Ok(WebResponse {
                        ok: false,
                        status: 500,
                    });
                }
                let mut docs = self.docs.lock().unwrap();
                let existed = docs.remove(uri).is_some();
                // drop the containment triple from the parent listing
                let parent = Self::container_of(uri);
                if let Some(listing) = docs.get_mut(&parent) {
                    listing.retain(|s| {
                        !(s.object == Node::iri(uri) || s.subject == uri)
                    });
                }
                Ok(WebResponse {
                    ok: existed,
                    status: if existed { 200 } else { 404 },
                })
            }
            "POST" => {
                let Some(body) = body else {
                    return Ok(WebResponse {
                        ok: false,
                        status: 400,
                    });
                };
                let statements = turtle::parse(uri, &body)?;
                let Some(subject) = statements.first().map(|s| s.subject.clone()) else {
                    return Ok(WebResponse {
                        ok: false,
                        status: 400,
                    });
                };
                let doc_uri = subject.split('#').next().unwrap_or(&subject).to_string();
                let mut docs = self.docs.lock().unwrap();
                let stored: Vec<Statement> = statements
                    .into_iter()
                    .map(|mut s| {
                        s.doc = doc_uri.clone();
                        s
                    })
                    .collect();
                docs.insert(doc_uri.clone(), stored);
                // pods list the new resource in the posted-to container
                let listing = docs.entry(uri.to_string()).or_default();
                listing.push(st(uri, ldp::CONTAINS, Node::iri(doc_uri.clone()), uri));
                listing.push(st(
                    &doc_uri,
                    rdf::TYPE,
                    Node::iri(iana::TURTLE_RESOURCE),
                    uri,
                ));
                Ok(WebResponse {
                    ok: true,
                    status: 201,
                })
            }
            "PUT" => {
                let mut docs = self.docs.lock().unwrap();
                docs.entry(uri.to_string()).or_default();
                Ok(WebResponse {
                    ok: true,
                    status: 201,
                })
            }
            _ => Ok(WebResponse {
                ok: false,
                status: 405,
            }),
        }
    }
}
