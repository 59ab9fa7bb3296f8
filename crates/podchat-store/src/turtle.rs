//! Turtle codec for pod documents.
//!
//! The parser covers the subset pods actually serve for the documents this
//! engine touches: prefix/base directives, IRIs (absolute and relative),
//! prefixed names, `a`, blank node labels and anonymous blank nodes,
//! string literals with optional language tag or datatype, and
//! `;` / `,` predicate-object lists. The serializer always writes absolute
//! IRIs, which every pod accepts back.

use std::collections::HashMap;

use url::Url;

use podchat_shared::error::TransportError;
use podchat_shared::vocab::rdf;

use crate::graph::{Node, Statement};

/// Serializes statements into turtle, grouped by subject. The `doc` field
/// of the statements is not written; a document only ever serializes its
/// own statements.
pub fn serialize(statements: &[Statement]) -> String {
    let mut out = String::new();
    let mut subjects: Vec<&str> = Vec::new();
    for statement in statements {
        if !subjects.contains(&statement.subject.as_str()) {
            subjects.push(&statement.subject);
        }
    }
    for subject in subjects {
        let grouped: Vec<&Statement> =
            statements.iter().filter(|s| s.subject == subject).collect();
        out.push_str(&term(subject));
        for (idx, statement) in grouped.iter().enumerate() {
            if idx == 0 {
                out.push(' ');
            } else {
                out.push_str(" ;\n    ");
            }
            out.push_str(&term(&statement.predicate));
            out.push(' ');
            out.push_str(&object_term(&statement.object));
        }
        out.push_str(" .\n");
    }
    out
}

fn term(iri: &str) -> String {
    if iri.starts_with("_:") {
        iri.to_string()
    } else {
        format!("<{iri}>")
    }
}

fn object_term(node: &Node) -> String {
    match node {
        Node::Iri(iri) => term(iri),
        Node::Literal { value, datatype } => {
            let escaped = value
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n")
                .replace('\r', "\\r")
                .replace('\t', "\\t");
            match datatype {
                Some(dt) => format!("\"{escaped}\"^^<{dt}>"),
                None => format!("\"{escaped}\""),
            }
        }
    }
}

/// Parses a turtle document into statements tagged with `doc_uri`.
/// Relative IRIs resolve against `doc_uri`.
pub fn parse(doc_uri: &str, input: &str) -> Result<Vec<Statement>, TransportError> {
    Parser::new(doc_uri, input)?.parse_document()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Iri(String),
    Pname(String),
    Blank(String),
    Literal { value: String, datatype: Option<String> },
    A,
    Semicolon,
    Comma,
    Dot,
    OpenBracket,
    CloseBracket,
    PrefixDirective,
    BaseDirective,
    Eof,
}

struct Parser {
    doc_uri: String,
    base: Url,
    tokens: Vec<Token>,
    pos: usize,
    prefixes: HashMap<String, String>,
    blank_counter: usize,
}

impl Parser {
    fn new(doc_uri: &str, input: &str) -> Result<Self, TransportError> {
        let base = Url::parse(doc_uri)
            .map_err(|_| TransportError::InvalidUrl(doc_uri.to_string()))?;
        let tokens = tokenize(doc_uri, input)?;
        Ok(Self {
            doc_uri: doc_uri.to_string(),
            base,
            tokens,
            pos: 0,
            prefixes: HashMap::new(),
            blank_counter: 0,
        })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        token
    }

    fn error(&self, reason: impl Into<String>) -> TransportError {
        TransportError::Parse {
            url: self.doc_uri.clone(),
            reason: reason.into(),
        }
    }

    fn parse_document(&mut self) -> Result<Vec<Statement>, TransportError> {
        let mut statements = Vec::new();
        loop {
            match self.peek().clone() {
                Token::Eof => break,
                Token::PrefixDirective => self.parse_prefix()?,
                Token::BaseDirective => self.parse_base()?,
                _ => self.parse_triples(&mut statements)?,
            }
        }
        Ok(statements)
    }

    fn parse_prefix(&mut self) -> Result<(), TransportError> {
        self.next();
        let label = match self.next() {
            // tokenizer emits the prefix label as a pname ending in ':'
            Token::Pname(p) => p.trim_end_matches(':').to_string(),
            other => return Err(self.error(format!("expected prefix label, got {other:?}"))),
        };
        let iri = match self.next() {
            Token::Iri(iri) => self.resolve(&iri)?,
            other => return Err(self.error(format!("expected prefix iri, got {other:?}"))),
        };
        self.prefixes.insert(label, iri);
        if self.peek() == &Token::Dot {
            self.next();
        }
        Ok(())
    }

    fn parse_base(&mut self) -> Result<(), TransportError> {
        self.next();
        match self.next() {
            Token::Iri(iri) => {
                let resolved = self.resolve(&iri)?;
                self.base = Url::parse(&resolved)
                    .map_err(|_| self.error("base directive is not a valid iri"))?;
            }
            other => return Err(self.error(format!("expected base iri, got {other:?}"))),
        }
        if self.peek() == &Token::Dot {
            self.next();
        }
        Ok(())
    }

    fn parse_triples(&mut self, out: &mut Vec<Statement>) -> Result<(), TransportError> {
        let subject = self.parse_subject(out)?;
        self.parse_predicate_object_list(&subject, out)?;
        match self.next() {
            Token::Dot | Token::Eof => Ok(()),
            other => Err(self.error(format!("expected '.', got {other:?}"))),
        }
    }

    fn parse_subject(&mut self, out: &mut Vec<Statement>) -> Result<String, TransportError> {
        match self.next() {
            Token::Iri(iri) => self.resolve(&iri),
            Token::Pname(p) => self.expand(&p),
            Token::Blank(label) => Ok(label),
            Token::OpenBracket => self.parse_anon(out),
            other => Err(self.error(format!("expected subject, got {other:?}"))),
        }
    }

    fn parse_predicate_object_list(
        &mut self,
        subject: &str,
        out: &mut Vec<Statement>,
    ) -> Result<(), TransportError> {
        loop {
            let predicate = match self.next() {
                Token::A => rdf::TYPE.to_string(),
                Token::Iri(iri) => self.resolve(&iri)?,
                Token::Pname(p) => self.expand(&p)?,
                other => return Err(self.error(format!("expected predicate, got {other:?}"))),
            };
            loop {
                let object = self.parse_object(out)?;
                out.push(Statement {
                    subject: subject.to_string(),
                    predicate: predicate.clone(),
                    object,
                    doc: self.doc_uri.clone(),
                });
                if self.peek() == &Token::Comma {
                    self.next();
                } else {
                    break;
                }
            }
            if self.peek() == &Token::Semicolon {
                self.next();
                // trailing ';' before '.'
                if matches!(self.peek(), Token::Dot | Token::CloseBracket | Token::Eof) {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    fn parse_object(&mut self, out: &mut Vec<Statement>) -> Result<Node, TransportError> {
        match self.next() {
            Token::Iri(iri) => Ok(Node::Iri(self.resolve(&iri)?)),
            Token::Pname(p) => Ok(Node::Iri(self.expand(&p)?)),
            Token::Blank(label) => Ok(Node::Iri(label)),
            Token::OpenBracket => Ok(Node::Iri(self.parse_anon(out)?)),
            Token::Literal { value, datatype } => {
                let datatype = match datatype {
                    Some(raw) if raw.starts_with('<') => {
                        Some(self.resolve(raw.trim_start_matches('<').trim_end_matches('>'))?)
                    }
                    Some(raw) => Some(self.expand(&raw)?),
                    None => None,
                };
                Ok(Node::Literal { value, datatype })
            }
            other => Err(self.error(format!("expected object, got {other:?}"))),
        }
    }

    /// Anonymous blank node `[ ... ]`, materialized under a fresh label.
    fn parse_anon(&mut self, out: &mut Vec<Statement>) -> Result<String, TransportError> {
        self.blank_counter += 1;
        let label = format!("_:anon{}", self.blank_counter);
        if self.peek() != &Token::CloseBracket {
            self.parse_predicate_object_list(&label, out)?;
        }
        match self.next() {
            Token::CloseBracket => Ok(label),
            other => Err(self.error(format!("expected ']', got {other:?}"))),
        }
    }

    fn resolve(&self, iri: &str) -> Result<String, TransportError> {
        if iri.is_empty() {
            return Ok(self.base.to_string());
        }
        self.base
            .join(iri)
            .map(|u| u.to_string())
            .map_err(|_| TransportError::Parse {
                url: self.doc_uri.clone(),
                reason: format!("cannot resolve iri <{iri}>"),
            })
    }

    fn expand(&self, pname: &str) -> Result<String, TransportError> {
        let (prefix, local) = pname
            .split_once(':')
            .ok_or_else(|| self.error(format!("malformed prefixed name '{pname}'")))?;
        let ns = self
            .prefixes
            .get(prefix)
            .ok_or_else(|| self.error(format!("unknown prefix '{prefix}:'")))?;
        Ok(format!("{ns}{local}"))
    }
}

fn tokenize(doc_uri: &str, input: &str) -> Result<Vec<Token>, TransportError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    let err = |reason: String| TransportError::Parse {
        url: doc_uri.to_string(),
        reason,
    };

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '<' => {
                chars.next();
                let mut iri = String::new();
                loop {
                    match chars.next() {
                        Some('>') => break,
                        Some(c) => iri.push(c),
                        None => return Err(err("unterminated iri".into())),
                    }
                }
                tokens.push(Token::Iri(iri));
            }
            '"' => {
                let value = read_string(&mut chars).map_err(&err)?;
                // optional language tag or datatype
                let datatype = match chars.peek() {
                    Some('@') => {
                        chars.next();
                        while matches!(chars.peek(), Some(c) if c.is_alphanumeric() || *c == '-') {
                            chars.next();
                        }
                        None
                    }
                    Some('^') => {
                        chars.next();
                        if chars.next() != Some('^') {
                            return Err(err("malformed datatype marker".into()));
                        }
                        if chars.peek() == Some(&'<') {
                            chars.next();
                            let mut iri = String::from("<");
                            loop {
                                match chars.next() {
                                    Some('>') => break,
                                    Some(c) => iri.push(c),
                                    None => return Err(err("unterminated datatype iri".into())),
                                }
                            }
                            iri.push('>');
                            Some(iri)
                        } else {
                            Some(read_word(&mut chars))
                        }
                    }
                    _ => None,
                };
                tokens.push(Token::Literal { value, datatype });
            }
            '_' => {
                let word = read_word(&mut chars);
                tokens.push(Token::Blank(word));
            }
            ';' => {
                chars.next();
                tokens.push(Token::Semicolon);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '[' => {
                chars.next();
                tokens.push(Token::OpenBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::CloseBracket);
            }
            '@' => {
                chars.next();
                let word = read_word(&mut chars);
                match word.as_str() {
                    "prefix" => tokens.push(Token::PrefixDirective),
                    "base" => tokens.push(Token::BaseDirective),
                    other => return Err(err(format!("unsupported directive '@{other}'"))),
                }
            }
            _ => {
                let word = read_word(&mut chars);
                match word.as_str() {
                    "a" => tokens.push(Token::A),
                    "PREFIX" => tokens.push(Token::PrefixDirective),
                    "BASE" => tokens.push(Token::BaseDirective),
                    w if w.contains(':') => tokens.push(Token::Pname(w.to_string())),
                    // bare numbers occur as abbreviated integer literals
                    w if w.chars().all(|c| c.is_ascii_digit()) && !w.is_empty() => {
                        tokens.push(Token::Literal {
                            value: w.to_string(),
                            datatype: None,
                        })
                    }
                    other => return Err(err(format!("unexpected token '{other}'"))),
                }
            }
        }
    }
    Ok(tokens)
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<String, String> {
    chars.next(); // opening quote
    let mut value = String::new();
    loop {
        match chars.next() {
            Some('"') => {
                // long-form """ ... """
                if value.is_empty() && chars.peek() == Some(&'"') {
                    chars.next();
                    return read_long_string(chars);
                }
                return Ok(value);
            }
            Some('\\') => match chars.next() {
                Some('"') => value.push('"'),
                Some('\\') => value.push('\\'),
                Some('n') => value.push('\n'),
                Some('r') => value.push('\r'),
                Some('t') => value.push('\t'),
                Some(other) => {
                    value.push('\\');
                    value.push(other);
                }
                None => return Err("unterminated string escape".into()),
            },
            Some(c) => value.push(c),
            None => return Err("unterminated string literal".into()),
        }
    }
}

fn read_long_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
) -> Result<String, String> {
    let mut value = String::new();
    let mut quotes = 0;
    loop {
        match chars.next() {
            Some('"') => {
                quotes += 1;
                if quotes == 3 {
                    return Ok(value);
                }
            }
            Some(c) => {
                for _ in 0..quotes {
                    value.push('"');
                }
                quotes = 0;
                value.push(c);
            }
            None => return Err("unterminated long string literal".into()),
        }
    }
}

fn read_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() || matches!(c, ';' | ',' | '[' | ']' | '<' | '"') {
            break;
        }
        // a '.' ends a word unless it is inside a pname or number
        if c == '.' {
            let mut lookahead = chars.clone();
            lookahead.next();
            match lookahead.peek() {
                Some(n) if !n.is_whitespace() && *n != '<' && *n != '"' => {}
                _ => break,
            }
        }
        word.push(c);
        chars.next();
    }
    word
}
