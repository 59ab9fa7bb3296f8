//! Chat lifecycle: creation, joining, loading, access rules, deletion and
//! the owner's type-index registration.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::warn;
use uuid::Uuid;

use podchat_shared::constants::{CHAT_RESOURCE_FRAGMENT, CHAT_TITLE};
use podchat_shared::error::{AccessError, ChatDataError, Result, TransportError};
use podchat_shared::types::{Chat, Participant};
use podchat_shared::urls::{acl_url, container_of_doc, new_chat_resource_url, remove_hash};
use podchat_shared::vocab::{acl, dc, dcterms, flow, ical, ldp, meeting, rdf, solid};

use podchat_store::{st, Node, Statement, Store};

/// Back-reference of one participant to their own copy of the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantReference {
    pub participant_id: String,
    pub participant_chat_id: String,
}

/// Creates a fresh chat under the author's storage root: metadata, one
/// participation record per member, container access rules and a type
/// index registration. Returns the chat with the non-author members only.
pub async fn create_chat(
    store: &Store,
    author_id: &str,
    other_ids: &[String],
    now: DateTime<Utc>,
    storage: &str,
    type_index: &str,
) -> Result<Chat> {
    let participants: Vec<Participant> =
        other_ids.iter().map(Participant::new).collect();
    write_chat(store, author_id, &participants, now, storage, type_index).await
}

/// Same graph shape as [`create_chat`], but the participants may already
/// carry a peer-held chat id which is recorded as a back-reference. Used
/// when accepting an invitation where the remote chat is already known.
pub async fn join_chat(
    store: &Store,
    author_id: &str,
    participants: &[Participant],
    now: DateTime<Utc>,
    storage: &str,
    type_index: &str,
) -> Result<Chat> {
    write_chat(store, author_id, participants, now, storage, type_index).await
}

async fn write_chat(
    store: &Store,
    author_id: &str,
    participants: &[Participant],
    now: DateTime<Utc>,
    storage: &str,
    type_index: &str,
) -> Result<Chat> {
    let chat_resource_url = new_chat_resource_url(storage);
    let chat_id = format!("{chat_resource_url}#{CHAT_RESOURCE_FRAGMENT}");
    let doc = chat_resource_url.as_str();

    let mut ins = vec![
        st(&chat_id, rdf::TYPE, Node::iri(meeting::LONG_CHAT), doc),
        st(&chat_id, dc::AUTHOR, Node::iri(author_id), doc),
        st(&chat_id, dc::CREATED, Node::date(now), doc),
        st(&chat_id, dc::TITLE, Node::lit(CHAT_TITLE), doc),
    ];
    let author = Participant::new(author_id);
    for participant in std::iter::once(&author).chain(participants.iter()) {
        let participation_id = format!("{chat_resource_url}#{}", Uuid::new_v4());
        ins.push(st(&participation_id, ical::DTSTART, Node::date(now), doc));
        ins.push(st(
            &participation_id,
            flow::PARTICIPANT,
            Node::iri(&participant.id),
            doc,
        ));
        if let Some(peer_chat_id) = &participant.chat_id {
            ins.push(st(
                &participation_id,
                dcterms::REFERENCES,
                Node::iri(peer_chat_id),
                doc,
            ));
        }
        ins.push(st(
            &chat_id,
            flow::PARTICIPATION,
            Node::iri(&participation_id),
            doc,
        ));
    }

    store.update(Vec::new(), ins).await?;
    create_chat_container_acl(store, &chat_resource_url, author_id, participants).await?;
    register_in_type_index(store, &chat_id, type_index).await?;

    Ok(Chat {
        id: chat_id,
        title: CHAT_TITLE.to_string(),
        participants: participants.to_vec(),
        created: now,
    })
}

/// Access rules for a chat container: the author gets control, write and
/// read; every other member a single read-only rule.
async fn create_chat_container_acl(
    store: &Store,
    chat_resource_url: &str,
    author_id: &str,
    participants: &[Participant],
) -> Result<()> {
    let container = container_of_doc(chat_resource_url).to_string();
    let acl_doc = acl_url(&container);
    let mut ins = Vec::new();

    let owner_ids = [author_id.to_string()];
    let member_ids: Vec<String> = participants.iter().map(|p| p.id.clone()).collect();
    acl_rule(
        &mut ins,
        "ControlReadWrite",
        &container,
        &acl_doc,
        &owner_ids,
        &[acl::CONTROL, acl::WRITE, acl::READ],
    );
    acl_rule(&mut ins, "Read", &container, &acl_doc, &member_ids, &[acl::READ]);

    store.update(Vec::new(), ins).await?;
    Ok(())
}

fn acl_rule(
    ins: &mut Vec<Statement>,
    rule_name: &str,
    container_url: &str,
    acl_doc: &str,
    agents: &[String],
    modes: &[&str],
) {
    let rule_id = format!("{acl_doc}#{rule_name}");
    ins.push(st(&rule_id, rdf::TYPE, Node::iri(acl::AUTHORIZATION), acl_doc));
    ins.push(st(&rule_id, acl::ACCESS_TO, Node::iri(container_url), acl_doc));
    ins.push(st(&rule_id, acl::DEFAULT, Node::iri(container_url), acl_doc));
    for mode in modes {
        ins.push(st(&rule_id, acl::MODE, Node::iri(*mode), acl_doc));
    }
    for agent in agents {
        ins.push(st(&rule_id, acl::AGENT, Node::iri(agent), acl_doc));
    }
}

/// Registers a chat in the owner's type index, reusing an existing
/// registration row for the chat class when one exists.
async fn register_in_type_index(
    store: &Store,
    chat_id: &str,
    type_index: &str,
) -> Result<()> {
    store.load(type_index, false).await?;
    let existing_row = store.with_graph(|g| {
        g.subjects_with(solid::FOR_CLASS, &Node::iri(meeting::LONG_CHAT), type_index)
            .pop()
    });

    let mut ins = Vec::new();
    let row_id = match existing_row {
        Some(row) => row,
        None => {
            let row = format!("{type_index}#{}", Uuid::new_v4());
            ins.push(st(
                &row,
                solid::FOR_CLASS,
                Node::iri(meeting::LONG_CHAT),
                type_index,
            ));
            row
        }
    };
    ins.push(st(&row_id, solid::INSTANCE, Node::iri(chat_id), type_index));
    store.update(Vec::new(), ins).await?;
    Ok(())
}

/// Removes every registration of the chat from the type index.
pub async fn remove_from_type_index(
    store: &Store,
    chat_id: &str,
    type_index: &str,
) -> Result<()> {
    store.load(type_index, false).await?;
    let del = store.with_graph(|g| {
        g.subjects_with(solid::FOR_CLASS, &Node::iri(meeting::LONG_CHAT), type_index)
            .into_iter()
            .filter(|row| g.holds(row, solid::INSTANCE, &Node::iri(chat_id), type_index))
            .map(|row| st(row, solid::INSTANCE, Node::iri(chat_id), type_index))
            .collect::<Vec<_>>()
    });
    store.update(del, Vec::new()).await?;
    Ok(())
}

/// Loads a chat from its owner's pod and validates it. The participants
/// exclude the owner and are sorted by id for stable cross-client order.
pub async fn load_chat(
    store: &Store,
    owner_id: &str,
    chat_id: &str,
    force: bool,
) -> Result<Chat> {
    let doc = remove_hash(chat_id);
    store.load(doc, force).await?;
    store.with_graph(|g| {
        let mut participants: Vec<Participant> = g
            .objects(chat_id, flow::PARTICIPATION, doc)
            .iter()
            .filter_map(|participation| {
                let participation_id = participation.as_iri()?;
                let id = g
                    .object_last(participation_id, flow::PARTICIPANT, doc)?
                    .as_iri()?
                    .to_string();
                if id == owner_id {
                    return None;
                }
                let peer_chat_id = g
                    .object_last(participation_id, dcterms::REFERENCES, doc)
                    .and_then(|n| n.as_iri().map(str::to_string));
                Some(Participant {
                    id,
                    chat_id: peer_chat_id,
                })
            })
            .collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));

        if participants.is_empty() {
            return Err(ChatDataError::NoOtherParticipants.into());
        }
        let title = g
            .object_last(chat_id, dc::TITLE, doc)
            .map(|n| n.value().to_string())
            .ok_or(ChatDataError::NoTitle)?;
        let created_node = g
            .object_last(chat_id, dc::CREATED, doc)
            .ok_or(ChatDataError::NoCreated)?;
        let created = created_node
            .as_datetime()
            .ok_or(ChatDataError::CreatedNotDatetime)?;

        Ok(Chat {
            id: chat_id.to_string(),
            title,
            participants,
            created,
        })
    })
}

/// Discovers the owner's chats through the type index. Invalid chats are
/// skipped with a warning, never fatal to discovery.
pub async fn chats_from_type_index(
    store: &Store,
    owner_id: &str,
    type_index: &str,
) -> Result<Vec<Chat>> {
    store.load(type_index, false).await?;
    let chat_ids = store.with_graph(|g| {
        g.subjects_with(solid::FOR_CLASS, &Node::iri(meeting::LONG_CHAT), type_index)
            .into_iter()
            .flat_map(|row| g.objects(&row, solid::INSTANCE, type_index))
            .filter_map(|n| n.as_iri().map(str::to_string))
            .collect::<Vec<_>>()
    });

    let loads = chat_ids
        .iter()
        .map(|chat_id| load_chat(store, owner_id, chat_id, false));
    let mut chats = Vec::new();
    for (chat_id, result) in chat_ids.iter().zip(join_all(loads).await) {
        match result {
            Ok(chat) => chats.push(chat),
            Err(error) => {
                warn!(chat_id = %chat_id, error = %error, "skipping invalid chat");
            }
        }
    }
    Ok(chats)
}

/// Agents granted read mode by any rule of the chat container's access
/// document.
pub async fn load_participants_having_read_access(
    store: &Store,
    chat_id: &str,
) -> Result<Vec<String>> {
    let acl_doc = acl_url(container_of_doc(remove_hash(chat_id)));
    store.load(&acl_doc, false).await?;
    Ok(store.with_graph(|g| read_access_agents(g, &acl_doc)))
}

fn read_access_agents(g: &podchat_store::Graph, acl_doc: &str) -> Vec<String> {
    g.subjects_with(acl::MODE, &Node::iri(acl::READ), acl_doc)
        .into_iter()
        .flat_map(|rule| g.objects(&rule, acl::AGENT, acl_doc))
        .filter_map(|n| n.as_iri().map(str::to_string))
        .collect()
}

/// Toggles a participant's read access on the chat container. Returns the
/// resulting state: `false` when access was revoked, `true` when granted.
/// Fails when the access document has no read-only rule to extend.
pub async fn toggle_participant_has_read_access(
    store: &Store,
    chat_id: &str,
    participant_id: &str,
) -> Result<bool> {
    let acl_doc = acl_url(container_of_doc(remove_hash(chat_id)));
    store.load(&acl_doc, true).await?;

    let (has_read_access, read_only_rules) = store.with_graph(|g| {
        let has = read_access_agents(g, &acl_doc)
            .iter()
            .any(|agent| agent == participant_id);
        // rules granting read and nothing else
        let rules: Vec<String> = g
            .subjects_with(acl::MODE, &Node::iri(acl::READ), &acl_doc)
            .into_iter()
            .filter(|rule| g.objects(rule, acl::MODE, &acl_doc).len() == 1)
            .collect();
        (has, rules)
    });

    if has_read_access {
        let del: Vec<Statement> = read_only_rules
            .iter()
            .map(|rule| st(rule, acl::AGENT, Node::iri(participant_id), &acl_doc))
            .collect();
        store.update(del, Vec::new()).await?;
        return Ok(false);
    }

    let rule = read_only_rules
        .into_iter()
        .last()
        .ok_or(AccessError::NoReadOnlyRule)?;
    store
        .update(
            Vec::new(),
            vec![st(rule, acl::AGENT, Node::iri(participant_id), &acl_doc)],
        )
        .await?;
    Ok(true)
}

/// Replaces the back-reference recorded on each participant's
/// participation record, at most one per participant.
pub async fn set_participant_references(
    store: &Store,
    chat_id: &str,
    references: &[ParticipantReference],
) -> Result<()> {
    let doc = remove_hash(chat_id).to_string();
    let (del, ins) = store.with_graph(|g| {
        let mut del = Vec::new();
        let mut ins = Vec::new();
        for reference in references {
            for participation in
                g.subjects_with(flow::PARTICIPANT, &Node::iri(&reference.participant_id), &doc)
            {
                for old in g.objects(&participation, dcterms::REFERENCES, &doc) {
                    del.push(st(&participation, dcterms::REFERENCES, old, &doc));
                }
                ins.push(st(
                    &participation,
                    dcterms::REFERENCES,
                    Node::iri(&reference.participant_chat_id),
                    &doc,
                ));
            }
        }
        (del, ins)
    });
    store.update(del, ins).await?;
    Ok(())
}

enum Frame {
    Visit(String),
    Finish { uri: String, leaves: Vec<String> },
}

/// Depth-first container deletion with an explicit worklist: children of a
/// container go before the container itself, leaf resources of one
/// container are deleted concurrently. The first failed delete aborts the
/// remaining traversal.
pub async fn delete_recursive(store: &Store, container_url: &str) -> Result<()> {
    let mut stack = vec![Frame::Visit(container_url.to_string())];
    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Visit(uri) => {
                store.load(&uri, true).await?;
                let (subcontainers, leaves) = store.with_graph(|g| {
                    let children: Vec<String> = g
                        .objects(&uri, ldp::CONTAINS, &uri)
                        .iter()
                        .filter_map(|n| n.as_iri().map(str::to_string))
                        .collect();
                    let (subs, leaves): (Vec<String>, Vec<String>) =
                        children.into_iter().partition(|child| {
                            g.holds(child, rdf::TYPE, &Node::iri(ldp::CONTAINER), &uri)
                        });
                    (subs, leaves)
                });
                stack.push(Frame::Finish { uri, leaves });
                for sub in subcontainers {
                    stack.push(Frame::Visit(sub));
                }
            }
            Frame::Finish { uri, leaves } => {
                let deletes = leaves.iter().map(|leaf| delete_resource(store, leaf));
                futures::future::try_join_all(deletes).await?;
                delete_resource(store, &uri).await?;
            }
        }
    }
    Ok(())
}

async fn delete_resource(store: &Store, uri: &str) -> Result<()> {
    let response = store.web_operation("DELETE", uri, None).await?;
    if !response.ok {
        return Err(TransportError::Http {
            url: uri.to_string(),
            status: response.status,
        }
        .into());
    }
    store.remove_document(uri);
    Ok(())
}
