//! Notification convergence: posting activity documents into peer
//! inboxes, polling the own inbox against the processed ledger, and the
//! periodic cleanup of consumed notifications.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{error, warn};
use uuid::Uuid;

use podchat_shared::constants::NOTIFICATIONS_CLEANUP_BATCH_SIZE;
use podchat_shared::error::{Result, TransportError};
use podchat_shared::types::{NotificationType, Profile, SolidNotification};
use podchat_shared::urls::{processed_ledger_url, remove_hash};
use podchat_shared::vocab::{activity, dc, dcterms, flow, iana, ldp, meeting, podchat, rdf};

use podchat_store::{st, turtle, Graph, Node, Store};

/// Tells a peer that a message was added to the sender's copy of a chat.
pub async fn send_add_message_notification(
    store: &Store,
    inbox: &str,
    actor_id: &str,
    message_id: &str,
    chat_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    send_notification(
        store,
        inbox,
        activity::ADD,
        podchat::LONG_CHAT_MESSAGE,
        actor_id,
        message_id,
        chat_id,
        now,
    )
    .await
}

pub async fn send_add_reply_notification(
    store: &Store,
    inbox: &str,
    actor_id: &str,
    reply_id: &str,
    chat_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    send_notification(
        store,
        inbox,
        activity::ADD,
        podchat::LONG_CHAT_MESSAGE_REPLY,
        actor_id,
        reply_id,
        chat_id,
        now,
    )
    .await
}

pub async fn send_remove_reply_notification(
    store: &Store,
    inbox: &str,
    actor_id: &str,
    reply_id: &str,
    chat_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    send_notification(
        store,
        inbox,
        activity::REMOVE,
        podchat::LONG_CHAT_MESSAGE_REPLY,
        actor_id,
        reply_id,
        chat_id,
        now,
    )
    .await
}

/// Posts one activity document into an inbox. The document carries its
/// own fresh id so concurrent senders never collide.
#[allow(clippy::too_many_arguments)]
async fn send_notification(
    store: &Store,
    inbox: &str,
    activity_type: &str,
    context: &str,
    actor_id: &str,
    object_id: &str,
    target_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let id = format!("{inbox}{}.ttl", Uuid::new_v4());
    let statements = vec![
        st(&id, rdf::TYPE, Node::iri(activity_type), &id),
        st(&id, activity::CONTEXT, Node::iri(context), &id),
        st(&id, activity::ACTOR, Node::iri(actor_id), &id),
        st(&id, activity::OBJECT, Node::iri(object_id), &id),
        st(&id, activity::TARGET, Node::iri(target_id), &id),
        st(&id, activity::UPDATED, Node::date(now), &id),
    ];
    let body = turtle::serialize(&statements);
    let response = store.web_operation("POST", inbox, Some(body)).await?;
    if !response.ok {
        return Err(TransportError::PostFailed(inbox.to_string()).into());
    }
    Ok(())
}

/// Polls the inbox and resolves every notification not yet recorded in
/// the processed ledger. Individually broken notifications are skipped,
/// never fatal to the poll.
pub async fn poll_inbox(store: &Store, profile: &Profile) -> Result<Vec<SolidNotification>> {
    let ledger = processed_ledger_url(&profile.storage_id);
    let (inbox_result, ledger_result) =
        tokio::join!(store.load(&profile.inbox_id, true), store.load(&ledger, false));
    inbox_result?;
    if let Err(e) = ledger_result {
        // a profile that never processed anything has no ledger yet
        warn!(uri = %ledger, error = %e, "processed ledger not loadable");
    }

    let unprocessed = store.with_graph(|g| {
        g.objects(&profile.inbox_id, ldp::CONTAINS, &profile.inbox_id)
            .iter()
            .filter_map(|n| n.as_iri().map(str::to_string))
            .filter(|child| {
                g.holds(
                    child,
                    rdf::TYPE,
                    &Node::iri(iana::TURTLE_RESOURCE),
                    &profile.inbox_id,
                ) && g.objects(child, dcterms::MODIFIED, &ledger).is_empty()
            })
            .collect::<Vec<String>>()
    });

    let loads = unprocessed
        .iter()
        .map(|id| load_notification(store, profile, id));
    let mut notifications: Vec<SolidNotification> =
        join_all(loads).await.into_iter().flatten().collect();
    notifications.sort_by(|a, b| a.updated.cmp(&b.updated).then_with(|| a.id.cmp(&b.id)));
    Ok(notifications)
}

/// Loads one notification document and resolves it to a local chat.
/// Any shape problem reads as "not a notification" and is skipped.
async fn load_notification(
    store: &Store,
    profile: &Profile,
    id: &str,
) -> Option<SolidNotification> {
    if let Err(error) = store.load(id, false).await {
        warn!(uri = %id, error = %error, "cannot load notification");
        return None;
    }
    let parsed = store.with_graph(|g| {
        let kind = notification_kind(g, id);
        let target_id = g.object_last(id, activity::TARGET, id)?.as_iri()?.to_string();
        let object_id = g.object_last(id, activity::OBJECT, id)?.as_iri()?.to_string();
        let actor_id = g.object_last(id, activity::ACTOR, id)?.as_iri()?.to_string();
        let updated = g.object_last(id, activity::UPDATED, id)?.as_datetime()?;
        Some(SolidNotification {
            id: id.to_string(),
            target_id,
            object_id,
            actor_id,
            kind,
            updated,
            reference_id: None,
        })
    });
    let Some(mut notification) = parsed else {
        warn!(uri = %id, "notification document is malformed, skipping");
        return None;
    };

    notification.reference_id =
        match resolve_chat(store, profile, &notification.target_id, &notification.actor_id)
            .await
        {
            Ok(reference) => reference,
            Err(error) => {
                // an unreachable sender chat can never resolve; record the
                // notification as processed so cleanup removes it
                warn!(uri = %id, error = %error, "notification target unreachable");
                accept_notifications(
                    store,
                    std::slice::from_ref(&notification),
                    &profile.storage_id,
                    Utc::now(),
                )
                .await;
                return None;
            }
        };
    Some(notification)
}

fn notification_kind(g: &Graph, id: &str) -> NotificationType {
    let is_type = |t: &str| g.holds(id, rdf::TYPE, &Node::iri(t), id);
    let has_context = |c: &str| g.holds(id, activity::CONTEXT, &Node::iri(c), id);
    if is_type(activity::ADD) && has_context(podchat::LONG_CHAT_MESSAGE) {
        NotificationType::ChatMessageAdd
    } else if is_type(activity::ADD) && has_context(podchat::LONG_CHAT_MESSAGE_REPLY) {
        NotificationType::ChatMessageReplyAdd
    } else if is_type(activity::REMOVE) && has_context(podchat::LONG_CHAT_MESSAGE_REPLY) {
        NotificationType::ChatMessageReplyRemove
    } else {
        NotificationType::Unknown
    }
}

/// Maps the sender's chat to the local copy: first by comparing the
/// member sets of the sender's chat and the locally loaded chats, then by
/// a participation record referencing the sender's chat. `None` means
/// first contact.
async fn resolve_chat(
    store: &Store,
    profile: &Profile,
    target_id: &str,
    actor_id: &str,
) -> std::result::Result<Option<String>, TransportError> {
    store.load(remove_hash(target_id), false).await?;
    Ok(store.with_graph(|g| {
        let remote_members = chat_members(g, target_id);
        let by_members = if remote_members.is_empty() {
            None
        } else {
            g.subjects_with_any(dc::AUTHOR, &Node::iri(&profile.id))
                .into_iter()
                .filter(|(chat, doc)| {
                    g.holds(chat, rdf::TYPE, &Node::iri(meeting::LONG_CHAT), doc)
                })
                .find(|(chat, _)| chat_members(g, chat) == remote_members)
                .map(|(chat, _)| chat)
        };
        by_members.or_else(|| find_chat_by_participant_reference(g, target_id, actor_id))
    }))
}

fn find_chat_by_participant_reference(
    g: &Graph,
    target_id: &str,
    actor_id: &str,
) -> Option<String> {
    g.subjects_with_any(dcterms::REFERENCES, &Node::iri(target_id))
        .into_iter()
        .find(|(participation, doc)| {
            g.holds(participation, flow::PARTICIPANT, &Node::iri(actor_id), doc)
        })
        .and_then(|(participation, doc)| {
            g.subjects_with(flow::PARTICIPATION, &Node::iri(&participation), &doc)
                .pop()
        })
}

/// Everyone participating in a chat, owner included.
fn chat_members(g: &Graph, chat_id: &str) -> BTreeSet<String> {
    let doc = remove_hash(chat_id);
    g.objects(chat_id, flow::PARTICIPATION, doc)
        .iter()
        .filter_map(|n| n.as_iri())
        .flat_map(|participation| g.objects(participation, flow::PARTICIPANT, doc))
        .filter_map(|n| n.as_iri().map(str::to_string))
        .collect()
}

/// Records notifications as processed in the ledger, replacing any older
/// entry. Failure is logged and swallowed; a missed accept only means a
/// redundant re-delivery on the next poll.
pub async fn accept_notifications(
    store: &Store,
    notifications: &[SolidNotification],
    storage: &str,
    now: DateTime<Utc>,
) {
    if let Err(error) = try_accept(store, notifications, storage, now).await {
        warn!(error = %error, "cannot record processed notifications");
    }
}

async fn try_accept(
    store: &Store,
    notifications: &[SolidNotification],
    storage: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let ledger = processed_ledger_url(storage);
    store.create_if_not_exists(&ledger).await?;
    store.load(&ledger, true).await?;
    let (del, ins) = store.with_graph(|g| {
        let mut del = Vec::new();
        let mut ins = Vec::new();
        for notification in notifications {
            for old in g.objects(&notification.id, dcterms::MODIFIED, &ledger) {
                del.push(st(&notification.id, dcterms::MODIFIED, old, &ledger));
            }
            ins.push(st(&notification.id, dcterms::MODIFIED, Node::date(now), &ledger));
        }
        (del, ins)
    });
    store.update(del, ins).await?;
    Ok(())
}

/// Deletes a bounded batch of the oldest processed notifications and
/// their ledger entries. Runs in the background; every failure is logged
/// and the pass carries on.
pub async fn cleanup_notifications(store: &Store, storage: &str) {
    if let Err(error) = try_cleanup(store, storage).await {
        error!(error = %error, "notification cleanup pass failed");
    }
}

async fn try_cleanup(store: &Store, storage: &str) -> Result<()> {
    let ledger = processed_ledger_url(storage);
    store.load(&ledger, true).await?;
    let batch = store.with_graph(|g| {
        let mut entries = g.statements_with_predicate(dcterms::MODIFIED, &ledger);
        // oldest first; entries without a parsable timestamp go first so
        // they cannot linger forever
        entries.sort_by_key(|s| s.object.as_datetime());
        let mut seen = BTreeSet::new();
        entries.retain(|s| seen.insert(s.subject.clone()));
        entries.truncate(NOTIFICATIONS_CLEANUP_BATCH_SIZE);
        entries
    });

    let mut del = Vec::new();
    for entry in batch {
        match store.web_operation("DELETE", &entry.subject, None).await {
            Ok(response) if response.ok => store.remove_document(&entry.subject),
            Ok(response) => {
                error!(uri = %entry.subject, status = response.status, "cannot delete notification");
            }
            Err(error) => {
                error!(uri = %entry.subject, error = %error, "cannot delete notification");
            }
        }
        // the ledger entry goes regardless, a leaked resource must not
        // block the ledger from draining
        del.push(entry);
    }
    store.update(del, Vec::new()).await?;
    Ok(())
}
