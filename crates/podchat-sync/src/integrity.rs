//! Message integrity: Ed25519 key provisioning on the pod, signing of
//! outgoing messages and verification of incoming ones.
//!
//! Verification never fails the caller; every failure mode collapses
//! into a [`VerificationStatus`] so a bad signature renders as exactly
//! that instead of breaking the history view.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use tracing::warn;

use podchat_shared::error::{KeyError, Result};
use podchat_shared::types::{ChatMessage, VerificationStatus};
use podchat_shared::urls::{acl_url, remove_hash, signing_key_url};
use podchat_shared::vocab::{acl, podchat, rdf, security, sioc};

use podchat_store::{st, Node, Store};

/// Which canonical form a proof was produced over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Signs id, second-truncated timestamp, content and maker.
    Ed25519V1,
    /// Older proofs without the maker binding. Verified but no longer
    /// produced.
    Legacy,
}

impl SignatureScheme {
    pub fn proof_predicate(&self) -> &'static str {
        match self {
            SignatureScheme::Ed25519V1 => security::PROOF,
            SignatureScheme::Legacy => podchat::SIGNATURE,
        }
    }
}

/// Canonical byte string a message proof covers. The timestamp is
/// truncated to whole seconds in milliseconds, matching how pods
/// round-trip datetime literals.
pub fn verification_string(message: &ChatMessage, scheme: SignatureScheme) -> String {
    let truncated_millis = message.created.timestamp() * 1000;
    match scheme {
        SignatureScheme::Ed25519V1 => format!(
            "{}{}{}{}",
            message.id, truncated_millis, message.content, message.maker
        ),
        SignatureScheme::Legacy => {
            format!("{}{}{}", message.id, truncated_millis, message.content)
        }
    }
}

/// Reads the private key from the storage's key document. `None` when no
/// key has been provisioned yet.
pub async fn load_signing_key(store: &Store, storage: &str) -> Result<Option<SigningKey>> {
    let key_url = signing_key_url(storage);
    store.create_if_not_exists(&key_url).await?;
    let encoded = store.with_graph(|g| {
        g.object_last(podchat::PRIVATE_KEY, sioc::CONTENT_ENCODED, &key_url)
            .map(|n| n.value().to_string())
    });
    match encoded {
        Some(encoded) => Ok(Some(decode_signing_key(&encoded)?)),
        None => Ok(None),
    }
}

/// Makes sure a key pair exists: the private key in a control-protected
/// document under the storage, the public key published on the profile.
/// Idempotent; an existing pair is returned untouched.
pub async fn ensure_key_pair(
    store: &Store,
    profile_id: &str,
    storage: &str,
) -> Result<SigningKey> {
    let profile_doc = remove_hash(profile_id).to_string();
    store.load(&profile_doc, false).await?;
    let published = store.with_graph(|g| {
        g.object_last(podchat::PUBLIC_KEY, sioc::CONTENT_ENCODED, &profile_doc)
            .is_some()
    });
    if published {
        if let Some(key) = load_signing_key(store, storage).await? {
            return Ok(key);
        }
    }

    let key = SigningKey::generate(&mut OsRng);
    let key_url = signing_key_url(storage);
    store.create_if_not_exists(&key_url).await?;

    let rule = format!("{}#ControlReadWrite", acl_url(&key_url));
    let acl_doc = acl_url(&key_url);
    let ins = vec![
        st(
            podchat::PRIVATE_KEY,
            sioc::CONTENT_ENCODED,
            Node::lit(BASE64.encode(key.to_bytes())),
            &key_url,
        ),
        st(
            podchat::PUBLIC_KEY,
            sioc::CONTENT_ENCODED,
            Node::lit(BASE64.encode(key.verifying_key().to_bytes())),
            &profile_doc,
        ),
        st(&rule, rdf::TYPE, Node::iri(acl::AUTHORIZATION), &acl_doc),
        st(&rule, acl::ACCESS_TO, Node::iri(&key_url), &acl_doc),
        st(&rule, acl::MODE, Node::iri(acl::CONTROL), &acl_doc),
        st(&rule, acl::MODE, Node::iri(acl::WRITE), &acl_doc),
        st(&rule, acl::MODE, Node::iri(acl::READ), &acl_doc),
        st(&rule, acl::AGENT, Node::iri(profile_id), &acl_doc),
    ];
    store.update(Vec::new(), ins).await?;

    match load_signing_key(store, storage).await? {
        Some(key) => Ok(key),
        None => Err(KeyError::ProvisionFailed.into()),
    }
}

/// Signs a message for sending. Proofs are always produced with the
/// current scheme.
pub fn sign_message(key: &SigningKey, message: &ChatMessage) -> String {
    let canonical = verification_string(message, SignatureScheme::Ed25519V1);
    BASE64.encode(key.sign(canonical.as_bytes()).to_bytes())
}

/// Result of verifying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    /// Scheme the stored proof was found under, when one was found.
    pub scheme: Option<SignatureScheme>,
}

impl VerificationOutcome {
    fn of(status: VerificationStatus, scheme: Option<SignatureScheme>) -> Self {
        Self { status, scheme }
    }
}

/// Verifies a message against its maker's published public key. Infallible
/// by construction: trouble reading the proof, the key or the signature
/// shows up as a status, never as an error.
pub async fn verify_chat_message(store: &Store, message: &ChatMessage) -> VerificationOutcome {
    let doc = remove_hash(&message.id).to_string();
    if let Err(error) = store.load(&doc, false).await {
        warn!(uri = %doc, error = %error, "cannot load message shard for verification");
        return VerificationOutcome::of(VerificationStatus::Error, None);
    }
    let proof = store.with_graph(|g| {
        for scheme in [SignatureScheme::Ed25519V1, SignatureScheme::Legacy] {
            if let Some(node) = g.object_last(&message.id, scheme.proof_predicate(), &doc) {
                return Some((scheme, node.value().to_string()));
            }
        }
        None
    });
    let Some((scheme, proof)) = proof else {
        return VerificationOutcome::of(VerificationStatus::NoSignature, None);
    };

    let profile_doc = remove_hash(&message.maker).to_string();
    if let Err(error) = store.load(&profile_doc, false).await {
        warn!(uri = %profile_doc, error = %error, "cannot load maker profile for verification");
        return VerificationOutcome::of(VerificationStatus::Error, Some(scheme));
    }
    let published = store.with_graph(|g| {
        g.object_last(podchat::PUBLIC_KEY, sioc::CONTENT_ENCODED, &profile_doc)
            .map(|n| n.value().to_string())
    });
    let Some(published) = published else {
        return VerificationOutcome::of(VerificationStatus::InvalidSignature, Some(scheme));
    };

    let (key, signature) = match (decode_verifying_key(&published), decode_signature(&proof)) {
        (Ok(key), Ok(signature)) => (key, signature),
        _ => return VerificationOutcome::of(VerificationStatus::Error, Some(scheme)),
    };
    let canonical = verification_string(message, scheme);
    match key.verify(canonical.as_bytes(), &signature) {
        Ok(()) => VerificationOutcome::of(VerificationStatus::Trusted, Some(scheme)),
        Err(_) => {
            VerificationOutcome::of(VerificationStatus::InvalidSignature, Some(scheme))
        }
    }
}

fn decode_signing_key(encoded: &str) -> Result<SigningKey> {
    let bytes: [u8; 32] = BASE64
        .decode(encoded)
        .map_err(|_| KeyError::MalformedKey)?
        .try_into()
        .map_err(|_| KeyError::MalformedKey)?;
    Ok(SigningKey::from_bytes(&bytes))
}

fn decode_verifying_key(encoded: &str) -> std::result::Result<VerifyingKey, KeyError> {
    let bytes: [u8; 32] = BASE64
        .decode(encoded)
        .map_err(|_| KeyError::MalformedKey)?
        .try_into()
        .map_err(|_| KeyError::MalformedKey)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::MalformedKey)
}

fn decode_signature(encoded: &str) -> std::result::Result<Signature, KeyError> {
    let bytes = BASE64.decode(encoded).map_err(|_| KeyError::MalformedKey)?;
    Signature::from_slice(&bytes).map_err(|_| KeyError::MalformedKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use podchat_store::MemTransport;

    const ALICE: &str = "https://alice.pod/profile/card#me";
    const STORAGE: &str = "https://alice.pod/";
    const PROFILE_DOC: &str = "https://alice.pod/profile/card";

    fn setup() -> (Arc<MemTransport>, Store) {
        let transport = Arc::new(MemTransport::new());
        transport.put_doc(PROFILE_DOC, Vec::new());
        let store = Store::new(transport.clone());
        (transport, store)
    }

    fn at(date: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(date)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn message(content: &str) -> ChatMessage {
        ChatMessage {
            id: "https://alice.pod/pod-chat.com/1/2023/04/07/chat.ttl#msg-1".to_string(),
            created: at("2023-04-07T10:11:12Z"),
            content: content.to_string(),
            maker: ALICE.to_string(),
            verification_status: VerificationStatus::NotVerified,
        }
    }

    fn seed_message_with_proof(
        transport: &MemTransport,
        message: &ChatMessage,
        predicate: &str,
        proof: &str,
    ) {
        let doc = remove_hash(&message.id).to_string();
        transport.put_doc(
            &doc,
            vec![st(&message.id, predicate, Node::lit(proof), &doc)],
        );
    }

    #[test]
    fn test_verification_string_truncates_to_seconds() {
        let mut msg = message("hi");
        msg.created = at("2023-04-07T10:11:12.987Z");
        let canonical = verification_string(&msg, SignatureScheme::Ed25519V1);
        let truncated = at("2023-04-07T10:11:12Z").timestamp() * 1000;
        assert!(canonical.contains(&truncated.to_string()));
        assert!(!canonical.contains("987"));
        assert!(canonical.ends_with(ALICE));
    }

    #[test]
    fn test_legacy_verification_string_omits_the_maker() {
        let msg = message("hi");
        let canonical = verification_string(&msg, SignatureScheme::Legacy);
        assert!(!canonical.contains(ALICE));
        assert!(canonical.starts_with(&msg.id));
        assert!(canonical.ends_with("hi"));
    }

    #[tokio::test]
    async fn test_ensure_key_pair_is_idempotent() {
        let (transport, store) = setup();
        let first = ensure_key_pair(&store, ALICE, STORAGE).await.unwrap();
        let second = ensure_key_pair(&store, ALICE, STORAGE).await.unwrap();
        assert_eq!(first.to_bytes(), second.to_bytes());

        // the public key sits on the profile, the private key elsewhere
        let profile = transport.doc(PROFILE_DOC);
        let published = profile
            .iter()
            .find(|s| s.subject == podchat::PUBLIC_KEY)
            .unwrap();
        assert_eq!(
            published.object,
            Node::lit(BASE64.encode(first.verifying_key().to_bytes()))
        );
        assert!(!profile.iter().any(|s| s.subject == podchat::PRIVATE_KEY));
        let key_doc = transport.doc(&signing_key_url(STORAGE));
        assert!(key_doc.iter().any(|s| s.subject == podchat::PRIVATE_KEY));

        // the key document is locked down to its owner
        let acl_doc = transport.doc(&acl_url(&signing_key_url(STORAGE)));
        assert!(acl_doc
            .iter()
            .any(|s| s.predicate == acl::AGENT && s.object == Node::iri(ALICE)));
        assert!(acl_doc
            .iter()
            .any(|s| s.predicate == acl::MODE && s.object == Node::iri(acl::CONTROL)));
    }

    #[tokio::test]
    async fn test_load_signing_key_before_provisioning() {
        let (_, store) = setup();
        assert!(load_signing_key(&store, STORAGE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_verify_round_trip() {
        let (transport, store) = setup();
        let key = ensure_key_pair(&store, ALICE, STORAGE).await.unwrap();
        let msg = message("signed message");
        let proof = sign_message(&key, &msg);
        seed_message_with_proof(&transport, &msg, security::PROOF, &proof);

        let outcome = verify_chat_message(&store, &msg).await;
        assert_eq!(outcome.status, VerificationStatus::Trusted);
        assert_eq!(outcome.scheme, Some(SignatureScheme::Ed25519V1));
    }

    #[tokio::test]
    async fn test_tampered_content_is_invalid() {
        let (transport, store) = setup();
        let key = ensure_key_pair(&store, ALICE, STORAGE).await.unwrap();
        let msg = message("original");
        let proof = sign_message(&key, &msg);
        let mut tampered = msg.clone();
        tampered.content = "altered".to_string();
        seed_message_with_proof(&transport, &tampered, security::PROOF, &proof);

        let outcome = verify_chat_message(&store, &tampered).await;
        assert_eq!(outcome.status, VerificationStatus::InvalidSignature);
    }

    #[tokio::test]
    async fn test_legacy_proofs_still_verify() {
        let (transport, store) = setup();
        let key = ensure_key_pair(&store, ALICE, STORAGE).await.unwrap();
        let msg = message("old message");
        let canonical = verification_string(&msg, SignatureScheme::Legacy);
        let proof = BASE64.encode(key.sign(canonical.as_bytes()).to_bytes());
        seed_message_with_proof(&transport, &msg, podchat::SIGNATURE, &proof);

        let outcome = verify_chat_message(&store, &msg).await;
        assert_eq!(outcome.status, VerificationStatus::Trusted);
        assert_eq!(outcome.scheme, Some(SignatureScheme::Legacy));
    }

    #[tokio::test]
    async fn test_legacy_proof_over_maker_bound_string_is_invalid() {
        let (transport, store) = setup();
        let key = ensure_key_pair(&store, ALICE, STORAGE).await.unwrap();
        let msg = message("old message");
        // signed over the maker-bound form but stored under the legacy
        // predicate, so it verifies against the legacy form and fails
        let canonical = verification_string(&msg, SignatureScheme::Ed25519V1);
        let proof = BASE64.encode(key.sign(canonical.as_bytes()).to_bytes());
        seed_message_with_proof(&transport, &msg, podchat::SIGNATURE, &proof);

        let outcome = verify_chat_message(&store, &msg).await;
        assert_eq!(outcome.status, VerificationStatus::InvalidSignature);
        assert_eq!(outcome.scheme, Some(SignatureScheme::Legacy));
    }

    #[tokio::test]
    async fn test_unsigned_message_has_no_signature() {
        let (transport, store) = setup();
        let msg = message("plain");
        let doc = remove_hash(&msg.id).to_string();
        transport.put_doc(&doc, Vec::new());

        let outcome = verify_chat_message(&store, &msg).await;
        assert_eq!(outcome.status, VerificationStatus::NoSignature);
        assert_eq!(outcome.scheme, None);
    }

    #[tokio::test]
    async fn test_missing_public_key_is_invalid() {
        let (transport, store) = setup();
        let msg = message("signed by nobody");
        seed_message_with_proof(&transport, &msg, security::PROOF, "c2lnbmF0dXJl");

        let outcome = verify_chat_message(&store, &msg).await;
        assert_eq!(outcome.status, VerificationStatus::InvalidSignature);
    }

    #[tokio::test]
    async fn test_garbage_proof_is_an_error() {
        let (transport, store) = setup();
        ensure_key_pair(&store, ALICE, STORAGE).await.unwrap();
        let msg = message("broken proof");
        seed_message_with_proof(&transport, &msg, security::PROOF, "%%% not base64 %%%");

        let outcome = verify_chat_message(&store, &msg).await;
        assert_eq!(outcome.status, VerificationStatus::Error);
    }

    #[tokio::test]
    async fn test_unreachable_maker_profile_is_an_error() {
        let transport = Arc::new(MemTransport::new());
        let store = Store::new(transport.clone());
        let msg = message("nobody home");
        seed_message_with_proof(&transport, &msg, security::PROOF, "c2lnbmF0dXJl");

        let outcome = verify_chat_message(&store, &msg).await;
        assert_eq!(outcome.status, VerificationStatus::Error);
    }
}
