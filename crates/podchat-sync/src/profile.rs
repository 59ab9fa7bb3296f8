//! Profile loading: the WebID document is the root of everything else
//! the engine touches on a pod.

use url::Url;

use podchat_shared::error::{ProfileDataError, Result};
use podchat_shared::types::Profile;
use podchat_shared::urls::remove_hash;
use podchat_shared::vocab::{acl, foaf, ldp, pim, solid, vcard};

use podchat_store::{Graph, Node, Store};

/// Loads and validates a profile. `app_origin` is the origin this client
/// is registered under; access flags read `false` when none is given.
pub async fn load_profile(
    store: &Store,
    profile_id: &str,
    app_origin: Option<&str>,
) -> Result<Profile> {
    let doc = remove_hash(profile_id).to_string();
    store.load(&doc, false).await?;
    store.with_graph(|g| {
        let iri_of = |predicate: &str| {
            g.object_last(profile_id, predicate, &doc)
                .and_then(|n| n.as_iri().map(str::to_string))
        };
        let storage_id = iri_of(pim::STORAGE).ok_or(ProfileDataError::NoStorage)?;
        let inbox_id = iri_of(ldp::INBOX).ok_or(ProfileDataError::NoInbox)?;
        let private_type_index_id =
            iri_of(solid::PRIVATE_TYPE_INDEX).ok_or(ProfileDataError::NoPrivateTypeIndex)?;
        let public_type_index_id =
            iri_of(solid::PUBLIC_TYPE_INDEX).ok_or(ProfileDataError::NoPublicTypeIndex)?;

        let name = g
            .object_last(profile_id, vcard::FN, &doc)
            .or_else(|| g.object_last(profile_id, foaf::NAME, &doc))
            .map(|n| n.value().to_string())
            .unwrap_or_else(|| host_label(profile_id));
        let image = g
            .object_last(profile_id, vcard::HAS_PHOTO, &doc)
            .or_else(|| g.object_last(profile_id, foaf::IMG, &doc))
            .and_then(|n| n.as_iri().map(str::to_string));

        let (read_access_permitted, control_access_permitted) = match app_origin {
            Some(origin) => app_grants(g, profile_id, &doc, origin),
            None => (false, false),
        };

        Ok(Profile {
            id: profile_id.to_string(),
            name,
            inbox_id,
            storage_id,
            private_type_index_id,
            public_type_index_id,
            read_access_permitted,
            control_access_permitted,
            image,
        })
    })
}

/// Access modes the profile grants this app origin through its trusted
/// app records.
fn app_grants(g: &Graph, profile_id: &str, doc: &str, origin: &str) -> (bool, bool) {
    let mut read = false;
    let mut control = false;
    for grant in g.objects(profile_id, acl::TRUSTED_APP, doc) {
        let Some(grant) = grant.as_iri() else { continue };
        if !g.holds(grant, acl::ORIGIN, &Node::iri(origin), doc) {
            continue;
        }
        read |= g.holds(grant, acl::MODE, &Node::iri(acl::READ), doc);
        control |= g.holds(grant, acl::MODE, &Node::iri(acl::CONTROL), doc);
    }
    (read, control)
}

/// First label of the identity host, the display name of last resort.
fn host_label(profile_id: &str) -> String {
    Url::parse(profile_id)
        .ok()
        .and_then(|url| {
            url.host_str()
                .and_then(|host| host.split('.').next())
                .map(str::to_string)
        })
        .unwrap_or_else(|| profile_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use podchat_shared::error::PodchatError;
    use podchat_store::{st, MemTransport};

    const ALICE: &str = "https://alice.solidcommunity.net/profile/card#me";
    const DOC: &str = "https://alice.solidcommunity.net/profile/card";
    const ORIGIN: &str = "https://www.pod-chat.com";

    fn setup() -> (Arc<MemTransport>, Store) {
        let transport = Arc::new(MemTransport::new());
        let store = Store::new(transport.clone());
        (transport, store)
    }

    fn base_doc() -> Vec<podchat_store::Statement> {
        vec![
            st(
                ALICE,
                pim::STORAGE,
                Node::iri("https://alice.solidcommunity.net/"),
                DOC,
            ),
            st(
                ALICE,
                ldp::INBOX,
                Node::iri("https://alice.solidcommunity.net/inbox/"),
                DOC,
            ),
            st(
                ALICE,
                solid::PRIVATE_TYPE_INDEX,
                Node::iri("https://alice.solidcommunity.net/settings/privateTypeIndex.ttl"),
                DOC,
            ),
            st(
                ALICE,
                solid::PUBLIC_TYPE_INDEX,
                Node::iri("https://alice.solidcommunity.net/settings/publicTypeIndex.ttl"),
                DOC,
            ),
        ]
    }

    #[tokio::test]
    async fn test_load_full_profile() {
        let (transport, store) = setup();
        let mut statements = base_doc();
        statements.push(st(ALICE, vcard::FN, Node::lit("Alice Cooper"), DOC));
        statements.push(st(
            ALICE,
            vcard::HAS_PHOTO,
            Node::iri("https://alice.solidcommunity.net/photo.png"),
            DOC,
        ));
        statements.push(st(ALICE, acl::TRUSTED_APP, Node::iri("_:app"), DOC));
        statements.push(st("_:app", acl::ORIGIN, Node::iri(ORIGIN), DOC));
        statements.push(st("_:app", acl::MODE, Node::iri(acl::READ), DOC));
        statements.push(st("_:app", acl::MODE, Node::iri(acl::WRITE), DOC));
        statements.push(st("_:app", acl::MODE, Node::iri(acl::CONTROL), DOC));
        transport.put_doc(DOC, statements);

        let profile = load_profile(&store, ALICE, Some(ORIGIN)).await.unwrap();
        assert_eq!(profile.name, "Alice Cooper");
        assert_eq!(profile.storage_id, "https://alice.solidcommunity.net/");
        assert_eq!(profile.inbox_id, "https://alice.solidcommunity.net/inbox/");
        assert_eq!(
            profile.image,
            Some("https://alice.solidcommunity.net/photo.png".to_string())
        );
        assert!(profile.read_access_permitted);
        assert!(profile.control_access_permitted);
    }

    #[tokio::test]
    async fn test_name_falls_back_to_foaf_then_host() {
        let (transport, store) = setup();
        let mut statements = base_doc();
        statements.push(st(ALICE, foaf::NAME, Node::lit("alice f"), DOC));
        transport.put_doc(DOC, statements);
        let profile = load_profile(&store, ALICE, None).await.unwrap();
        assert_eq!(profile.name, "alice f");

        let (transport, store) = setup();
        transport.put_doc(DOC, base_doc());
        let profile = load_profile(&store, ALICE, None).await.unwrap();
        assert_eq!(profile.name, "alice");
    }

    #[tokio::test]
    async fn test_missing_pointers_are_distinct_errors() {
        for (predicate, expected) in [
            (pim::STORAGE, ProfileDataError::NoStorage),
            (ldp::INBOX, ProfileDataError::NoInbox),
            (
                solid::PRIVATE_TYPE_INDEX,
                ProfileDataError::NoPrivateTypeIndex,
            ),
            (
                solid::PUBLIC_TYPE_INDEX,
                ProfileDataError::NoPublicTypeIndex,
            ),
        ] {
            let (transport, store) = setup();
            let mut statements = base_doc();
            statements.retain(|s| s.predicate != predicate);
            transport.put_doc(DOC, statements);
            let error = load_profile(&store, ALICE, None).await.unwrap_err();
            assert!(
                matches!(&error, PodchatError::ProfileData(e) if *e == expected),
                "dropping {predicate} produced {error}"
            );
        }
    }

    #[tokio::test]
    async fn test_foreign_origin_grants_nothing() {
        let (transport, store) = setup();
        let mut statements = base_doc();
        statements.push(st(ALICE, acl::TRUSTED_APP, Node::iri("_:app"), DOC));
        statements.push(st("_:app", acl::ORIGIN, Node::iri("https://evil.example"), DOC));
        statements.push(st("_:app", acl::MODE, Node::iri(acl::READ), DOC));
        transport.put_doc(DOC, statements);

        let profile = load_profile(&store, ALICE, Some(ORIGIN)).await.unwrap();
        assert!(!profile.read_access_permitted);
        assert!(!profile.control_access_permitted);
    }

    #[tokio::test]
    async fn test_read_only_grant() {
        let (transport, store) = setup();
        let mut statements = base_doc();
        statements.push(st(ALICE, acl::TRUSTED_APP, Node::iri("_:app"), DOC));
        statements.push(st("_:app", acl::ORIGIN, Node::iri(ORIGIN), DOC));
        statements.push(st("_:app", acl::MODE, Node::iri(acl::READ), DOC));
        transport.put_doc(DOC, statements);

        let profile = load_profile(&store, ALICE, Some(ORIGIN)).await.unwrap();
        assert!(profile.read_access_permitted);
        assert!(!profile.control_access_permitted);
    }
}
