//! In-memory working graph of the documents fetched so far.
//!
//! Statements are grouped per document, and every document keeps an index
//! keyed by (subject, predicate) so the typed accessors the engine uses are
//! lookups, not repeated scans over the whole statement list.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};

use podchat_shared::vocab::xsd;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Iri(String),
    Literal {
        value: String,
        datatype: Option<String>,
    },
}

impl Node {
    pub fn iri(value: impl Into<String>) -> Self {
        Node::Iri(value.into())
    }

    pub fn lit(value: impl Into<String>) -> Self {
        Node::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    pub fn typed_lit(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Node::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
        }
    }

    /// xsd:dateTime literal with whole-second precision, the way pods
    /// round-trip timestamps.
    pub fn date(value: DateTime<Utc>) -> Self {
        Node::typed_lit(
            value.to_rfc3339_opts(SecondsFormat::Millis, true),
            xsd::DATE_TIME,
        )
    }

    pub fn value(&self) -> &str {
        match self {
            Node::Iri(v) => v,
            Node::Literal { value, .. } => value,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Node::Iri(v) => Some(v),
            Node::Literal { .. } => None,
        }
    }

    /// Parses the node as a datetime. Only typed xsd:dateTime literals
    /// qualify; everything else is not a datetime, not an error.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Node::Literal {
                value,
                datatype: Some(dt),
            } if dt == xsd::DATE_TIME => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|d| d.with_timezone(&Utc)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: Node,
    /// Document the statement belongs to.
    pub doc: String,
}

/// Shorthand constructor used all over the engine.
pub fn st(
    subject: impl Into<String>,
    predicate: impl Into<String>,
    object: Node,
    doc: impl Into<String>,
) -> Statement {
    Statement {
        subject: subject.into(),
        predicate: predicate.into(),
        object,
        doc: doc.into(),
    }
}

#[derive(Debug, Default)]
struct DocGraph {
    statements: Vec<Statement>,
    by_subject_predicate: HashMap<(String, String), Vec<usize>>,
}

impl DocGraph {
    fn rebuild_index(&mut self) {
        self.by_subject_predicate.clear();
        for (idx, statement) in self.statements.iter().enumerate() {
            self.by_subject_predicate
                .entry((statement.subject.clone(), statement.predicate.clone()))
                .or_default()
                .push(idx);
        }
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    docs: HashMap<String, DocGraph>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, statement: Statement) {
        let doc = self.docs.entry(statement.doc.clone()).or_default();
        if !doc.statements.contains(&statement) {
            doc.statements.push(statement);
            doc.rebuild_index();
        }
    }

    pub fn insert_all(&mut self, statements: impl IntoIterator<Item = Statement>) {
        let mut touched: Vec<String> = Vec::new();
        for statement in statements {
            let doc = self.docs.entry(statement.doc.clone()).or_default();
            if !doc.statements.contains(&statement) {
                if !touched.contains(&statement.doc) {
                    touched.push(statement.doc.clone());
                }
                doc.statements.push(statement);
            }
        }
        for doc_uri in touched {
            if let Some(doc) = self.docs.get_mut(&doc_uri) {
                doc.rebuild_index();
            }
        }
    }

    pub fn remove(&mut self, statement: &Statement) {
        if let Some(doc) = self.docs.get_mut(&statement.doc) {
            let before = doc.statements.len();
            doc.statements.retain(|s| s != statement);
            if doc.statements.len() != before {
                doc.rebuild_index();
            }
        }
    }

    pub fn remove_document(&mut self, doc_uri: &str) {
        self.docs.remove(doc_uri);
    }

    /// All objects of (subject, predicate) within one document.
    pub fn objects(&self, subject: &str, predicate: &str, doc_uri: &str) -> Vec<Node> {
        let Some(doc) = self.docs.get(doc_uri) else {
            return Vec::new();
        };
        doc.by_subject_predicate
            .get(&(subject.to_string(), predicate.to_string()))
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| doc.statements[i].object.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Last object of (subject, predicate), matching the "last value wins"
    /// read the engine applies to single-valued predicates.
    pub fn object_last(&self, subject: &str, predicate: &str, doc_uri: &str) -> Option<Node> {
        self.objects(subject, predicate, doc_uri).pop()
    }

    pub fn holds(&self, subject: &str, predicate: &str, object: &Node, doc_uri: &str) -> bool {
        self.objects(subject, predicate, doc_uri)
            .iter()
            .any(|o| o == object)
    }

    /// Subjects carrying (predicate, object) within one document.
    pub fn subjects_with(&self, predicate: &str, object: &Node, doc_uri: &str) -> Vec<String> {
        let Some(doc) = self.docs.get(doc_uri) else {
            return Vec::new();
        };
        let mut subjects = Vec::new();
        for statement in &doc.statements {
            if statement.predicate == predicate
                && &statement.object == object
                && !subjects.contains(&statement.subject)
            {
                subjects.push(statement.subject.clone());
            }
        }
        subjects
    }

    /// Subjects carrying (predicate, object) in any loaded document,
    /// together with the document they were found in. Used for reverse
    /// lookups spanning every participant copy fetched so far.
    pub fn subjects_with_any(&self, predicate: &str, object: &Node) -> Vec<(String, String)> {
        let mut found = Vec::new();
        for (doc_uri, doc) in &self.docs {
            for statement in &doc.statements {
                if statement.predicate == predicate && &statement.object == object {
                    let pair = (statement.subject.clone(), doc_uri.clone());
                    if !found.contains(&pair) {
                        found.push(pair);
                    }
                }
            }
        }
        found.sort();
        found
    }

    /// All statements about one subject within a document.
    pub fn statements_about(&self, subject: &str, doc_uri: &str) -> Vec<Statement> {
        let Some(doc) = self.docs.get(doc_uri) else {
            return Vec::new();
        };
        doc.statements
            .iter()
            .filter(|s| s.subject == subject)
            .cloned()
            .collect()
    }

    /// All statements of one predicate within a document.
    pub fn statements_with_predicate(&self, predicate: &str, doc_uri: &str) -> Vec<Statement> {
        let Some(doc) = self.docs.get(doc_uri) else {
            return Vec::new();
        };
        doc.statements
            .iter()
            .filter(|s| s.predicate == predicate)
            .cloned()
            .collect()
    }

    pub fn statements_of_doc(&self, doc_uri: &str) -> Vec<Statement> {
        self.docs
            .get(doc_uri)
            .map(|d| d.statements.clone())
            .unwrap_or_default()
    }
}
