//! Messages and replies: writing into date-sharded resources and the
//! descending history search across the container tree.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::warn;
use uuid::Uuid;

use podchat_shared::constants::CHAT_RESOURCE_NAME;
use podchat_shared::error::Result;
use podchat_shared::location::{parse_padded, Location};
use podchat_shared::types::{
    ChatMessage, ChatMessageReply, ChatMessageResource, ChatMessageSearchResult,
    VerificationStatus,
};
use podchat_shared::urls::{
    container_of_doc, message_resource_url, remove_hash, todays_message_resource_url,
};
use podchat_shared::vocab::{dcterms, flow, foaf, ldp, rdf, schema, security, sioc};

use podchat_store::{st, Node, Store};

/// Builds a message addressed at today's shard of the chat. Nothing is
/// written yet; the caller signs and then sends.
pub fn create_message(
    chat_id: &str,
    content: &str,
    maker: &str,
    now: DateTime<Utc>,
) -> ChatMessage {
    let id = format!(
        "{}#msg-{}",
        todays_message_resource_url(chat_id),
        Uuid::new_v4()
    );
    ChatMessage {
        id,
        created: now,
        content: content.to_string(),
        maker: maker.to_string(),
        verification_status: VerificationStatus::NotVerified,
    }
}

/// Writes a message into its shard and links it from the chat subject.
/// The shard is refreshed first so the patch lands on current data; a
/// missing shard is not an error, the patch creates it.
pub async fn send_message(
    store: &Store,
    chat_id: &str,
    message: &ChatMessage,
    signature: Option<&str>,
) -> Result<()> {
    let doc = remove_hash(&message.id).to_string();
    if let Err(error) = store.load(&doc, true).await {
        warn!(uri = %doc, error = %error, "message shard not loadable before send");
    }
    let mut ins = vec![
        st(&message.id, dcterms::CREATED, Node::date(message.created), &doc),
        st(&message.id, sioc::CONTENT, Node::lit(&message.content), &doc),
        st(&message.id, foaf::MAKER, Node::iri(&message.maker), &doc),
        st(chat_id, flow::MESSAGE, Node::iri(&message.id), &doc),
    ];
    if let Some(signature) = signature {
        ins.push(st(&message.id, security::PROOF, Node::lit(signature), &doc));
    }
    store.update(Vec::new(), ins).await?;
    Ok(())
}

/// What [`send_message_reply`] did to the shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOutcome {
    /// Shard the reply lives in.
    pub location: Option<Location>,
    pub reply_id: String,
    /// `true` when the reply was added, `false` when an identical reply
    /// existed and was removed instead.
    pub added: bool,
}

/// Toggles a reaction on a message. A reply is keyed by (name, agent,
/// message): sending the same key again removes the existing reaction.
pub async fn send_message_reply(
    store: &Store,
    message_id: &str,
    name: &str,
    agent: &str,
) -> Result<ReplyOutcome> {
    let doc = remove_hash(message_id).to_string();
    if let Err(error) = store.load(&doc, true).await {
        warn!(uri = %doc, error = %error, "message shard not loadable before reply");
    }
    let location = Location::from_resource_url(&doc);

    let existing = store.with_graph(|g| {
        g.subjects_with(rdf::TYPE, &Node::iri(schema::REACT_ACTION), &doc)
            .into_iter()
            .find(|reply| {
                g.holds(reply, schema::NAME, &Node::lit(name), &doc)
                    && g.holds(reply, schema::AGENT, &Node::iri(agent), &doc)
                    && g.holds(reply, schema::TARGET, &Node::iri(message_id), &doc)
            })
    });

    if let Some(reply_id) = existing {
        let del = store.with_graph(|g| g.statements_about(&reply_id, &doc));
        store.update(del, Vec::new()).await?;
        return Ok(ReplyOutcome {
            location,
            reply_id,
            added: false,
        });
    }

    let reply_id = format!("{doc}#rpl-{}", Uuid::new_v4());
    let ins = vec![
        st(&reply_id, rdf::TYPE, Node::iri(schema::REACT_ACTION), &doc),
        st(&reply_id, schema::NAME, Node::lit(name), &doc),
        st(&reply_id, schema::AGENT, Node::iri(agent), &doc),
        st(&reply_id, schema::TARGET, Node::iri(message_id), &doc),
    ];
    store.update(Vec::new(), ins).await?;
    Ok(ReplyOutcome {
        location,
        reply_id,
        added: true,
    })
}

/// Reads one shard's messages and replies. A shard that cannot be loaded
/// reads as empty; partial remote state never fails a history view.
pub async fn load_chat_message_resource(
    store: &Store,
    chat_id: &str,
    resource_url: &str,
    force: bool,
) -> (Vec<ChatMessage>, Vec<ChatMessageReply>) {
    if force {
        store.remove_document(resource_url);
    }
    if let Err(error) = store.load(resource_url, false).await {
        warn!(uri = %resource_url, error = %error, "cannot load message resource");
        return (Vec::new(), Vec::new());
    }
    store.with_graph(|g| {
        let mut messages: Vec<ChatMessage> = g
            .objects(chat_id, flow::MESSAGE, resource_url)
            .iter()
            .filter_map(|n| {
                let id = n.as_iri()?;
                let content = g
                    .object_last(id, sioc::CONTENT, resource_url)?
                    .value()
                    .to_string();
                let created = g
                    .object_last(id, dcterms::CREATED, resource_url)?
                    .as_datetime()?;
                let maker = g
                    .object_last(id, foaf::MAKER, resource_url)?
                    .as_iri()?
                    .to_string();
                Some(ChatMessage {
                    id: id.to_string(),
                    created,
                    content,
                    maker,
                    verification_status: VerificationStatus::NotVerified,
                })
            })
            .collect();
        messages.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));

        let mut replies: Vec<ChatMessageReply> = g
            .subjects_with(rdf::TYPE, &Node::iri(schema::REACT_ACTION), resource_url)
            .into_iter()
            .filter_map(|id| {
                let name = g
                    .object_last(&id, schema::NAME, resource_url)?
                    .value()
                    .to_string();
                let agent = g
                    .object_last(&id, schema::AGENT, resource_url)?
                    .as_iri()?
                    .to_string();
                let message_id = g
                    .object_last(&id, schema::TARGET, resource_url)?
                    .as_iri()?
                    .to_string();
                Some(ChatMessageReply {
                    id,
                    name,
                    agent,
                    message_id,
                })
            })
            .collect();
        replies.sort_by(|a, b| a.id.cmp(&b.id));

        (messages, replies)
    })
}

/// Searches the history of several chats at once, one result per chat.
/// Each search finds the newest shard at or before `start` or reports
/// that no older data exists.
pub async fn load_messages_for_chats(
    store: &Store,
    chat_ids: &[String],
    start: Location,
) -> Vec<ChatMessageSearchResult> {
    let searches = chat_ids
        .iter()
        .map(|chat_id| search_chat(store, chat_id, start));
    join_all(searches).await
}

async fn search_chat(
    store: &Store,
    chat_id: &str,
    start: Location,
) -> ChatMessageSearchResult {
    // foreign chat ids are not sharded by this scheme
    if !chat_id.contains(CHAT_RESOURCE_NAME) || start.is_end() {
        return ChatMessageSearchResult::end(chat_id);
    }
    match find_newest_shard(store, chat_id, start).await {
        Some(resource) => ChatMessageSearchResult {
            chat_id: chat_id.to_string(),
            resources: vec![resource],
        },
        None => ChatMessageSearchResult::end(chat_id),
    }
}

/// Descending bounded walk of the container tree. Children newer than
/// `start` are pruned without loading them; the first shard with messages
/// or replies short-circuits the rest.
async fn find_newest_shard(
    store: &Store,
    chat_id: &str,
    start: Location,
) -> Option<ChatMessageResource> {
    let chat_container = container_of_doc(remove_hash(chat_id)).to_string();

    let mut years = list_children(store, &chat_container, true).await;
    years.retain(|(_, segment)| {
        segment
            .parse::<i32>()
            .is_ok_and(|year| year <= start.year)
    });
    years.sort_by(|a, b| b.1.cmp(&a.1));

    for (year_url, year_segment) in years {
        let year: i32 = match year_segment.parse() {
            Ok(y) => y,
            Err(_) => continue,
        };
        let mut months = list_children(store, &year_url, true).await;
        months.retain(|(_, segment)| match parse_padded(segment) {
            Some(month) => year < start.year || month <= start.month,
            None => false,
        });
        months.sort_by_key(|(_, segment)| std::cmp::Reverse(parse_padded(segment)));

        for (month_url, month_segment) in months {
            let Some(month) = parse_padded(&month_segment) else {
                continue;
            };
            let mut days = list_children(store, &month_url, true).await;
            // days are only bounded inside the starting month itself
            days.retain(|(_, segment)| match parse_padded(segment) {
                Some(day) => {
                    year < start.year || month < start.month || day <= start.day
                }
                None => false,
            });
            days.sort_by_key(|(_, segment)| std::cmp::Reverse(parse_padded(segment)));

            for (day_url, day_segment) in days {
                let Some(day) = parse_padded(&day_segment) else {
                    continue;
                };
                let location = Location::new(year, month, day);
                let resource_url = message_resource_url(chat_id, location);
                let (messages, replies) =
                    load_chat_message_resource(store, chat_id, &resource_url, true).await;
                if !messages.is_empty() || !replies.is_empty() {
                    return Some(ChatMessageResource {
                        location,
                        messages,
                        replies,
                    });
                }
            }
        }
    }
    None
}

/// Subcontainers of a container, paired with their trailing path segment.
/// An unloadable container reads as empty.
async fn list_children(
    store: &Store,
    container_url: &str,
    force: bool,
) -> Vec<(String, String)> {
    if let Err(error) = store.load(container_url, force).await {
        warn!(uri = %container_url, error = %error, "cannot list container");
        return Vec::new();
    }
    store.with_graph(|g| {
        g.objects(container_url, ldp::CONTAINS, container_url)
            .iter()
            .filter_map(|n| {
                let child = n.as_iri()?;
                if !g.holds(child, rdf::TYPE, &Node::iri(ldp::CONTAINER), container_url) {
                    return None;
                }
                let segment = child.trim_end_matches('/').rsplit('/').next()?;
                Some((child.to_string(), segment.to_string()))
            })
            .collect()
    })
}

/// Merged history of every copy of a chat. The cursor holds the newest
/// shard location of the last page and steps one day backward per page.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    pub location: Location,
    pub results: Vec<ChatMessageSearchResult>,
}

impl ChatHistory {
    pub fn new(start: Location) -> Self {
        Self {
            location: start,
            results: Vec::new(),
        }
    }

    /// Folds fresh search results in. A result replaces the stored shard
    /// of the same chat and location; other shards are kept. The cursor
    /// snaps to the newest fresh shard, so intermediate shards of other
    /// chats are still visited on later pages. It reaches the end marker
    /// only once every chat reported the end of its history.
    pub fn merge(&mut self, fresh: Vec<ChatMessageSearchResult>) {
        let recent = fresh
            .iter()
            .flat_map(|r| r.resources.iter())
            .map(|r| r.location)
            .max();
        for result in fresh {
            match self.results.iter_mut().find(|r| r.chat_id == result.chat_id) {
                Some(existing) => {
                    for resource in result.resources {
                        match existing
                            .resources
                            .iter_mut()
                            .find(|r| r.location == resource.location)
                        {
                            Some(slot) => *slot = resource,
                            None => existing.resources.push(resource),
                        }
                    }
                }
                None => self.results.push(result),
            }
        }
        if let Some(recent) = recent {
            self.location = recent;
        }
    }

    /// Moves the cursor one day before the newest shard of the last page.
    /// Returns `false` once no chat has older data.
    pub fn advance(&mut self) -> bool {
        if self.location.is_end() {
            return false;
        }
        match self.location.add_days(-1) {
            Some(location) => {
                self.location = location;
                true
            }
            None => {
                self.location = Location::END;
                false
            }
        }
    }

    /// True once a merged page reported the end of history for every chat.
    pub fn all_ended(&self) -> bool {
        self.location.is_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use podchat_store::MemTransport;

    const ALICE: &str = "https://alice.pod/profile/card#me";
    const BOB: &str = "https://bob.pod/profile/card#me";
    const CHAT: &str = "https://alice.pod/pod-chat.com/1234/index.ttl#this";

    fn setup() -> (Arc<MemTransport>, Store) {
        let transport = Arc::new(MemTransport::new());
        let store = Store::new(transport.clone());
        (transport, store)
    }

    fn at(date: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(date)
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Seeds the container tree and shard document for one location.
    fn seed_shard(
        transport: &MemTransport,
        location: Location,
        messages: &[(&str, &str, DateTime<Utc>)],
    ) -> String {
        seed_shard_for(transport, CHAT, location, messages)
    }

    fn seed_shard_for(
        transport: &MemTransport,
        chat_id: &str,
        location: Location,
        messages: &[(&str, &str, DateTime<Utc>)],
    ) -> String {
        let index_url = remove_hash(chat_id);
        let base = container_of_doc(index_url).to_string();
        let year_url = format!("{base}{}/", location.year);
        let month_url = format!("{year_url}{:02}/", location.month);
        let day_url = format!("{month_url}{:02}/", location.day);
        let resource_url = format!("{day_url}chat.ttl");

        // containers merge with already seeded siblings
        let mut years: Vec<String> = transport
            .doc(&base)
            .iter()
            .filter(|s| s.predicate == ldp::CONTAINS)
            .filter_map(|s| s.object.as_iri().map(str::to_string))
            .collect();
        if !years.contains(&year_url) {
            years.push(year_url.clone());
        }
        let year_refs: Vec<&str> = years.iter().map(String::as_str).collect();
        transport.put_container(&base, &year_refs, &[index_url]);

        let mut months: Vec<String> = transport
            .doc(&year_url)
            .iter()
            .filter(|s| s.predicate == ldp::CONTAINS)
            .filter_map(|s| s.object.as_iri().map(str::to_string))
            .collect();
        if !months.contains(&month_url) {
            months.push(month_url.clone());
        }
        let month_refs: Vec<&str> = months.iter().map(String::as_str).collect();
        transport.put_container(&year_url, &month_refs, &[]);

        let mut days: Vec<String> = transport
            .doc(&month_url)
            .iter()
            .filter(|s| s.predicate == ldp::CONTAINS)
            .filter_map(|s| s.object.as_iri().map(str::to_string))
            .collect();
        if !days.contains(&day_url) {
            days.push(day_url.clone());
        }
        let day_refs: Vec<&str> = days.iter().map(String::as_str).collect();
        transport.put_container(&month_url, &day_refs, &[]);
        transport.put_container(&day_url, &[], &[&resource_url]);

        let mut statements = Vec::new();
        for (index, (content, maker, created)) in messages.iter().enumerate() {
            let id = format!("{resource_url}#msg-{index}");
            statements.push(st(&id, dcterms::CREATED, Node::date(*created), &resource_url));
            statements.push(st(&id, sioc::CONTENT, Node::lit(*content), &resource_url));
            statements.push(st(&id, foaf::MAKER, Node::iri(*maker), &resource_url));
            statements.push(st(chat_id, flow::MESSAGE, Node::iri(&id), &resource_url));
        }
        transport.put_doc(&resource_url, statements);
        resource_url
    }

    #[tokio::test]
    async fn test_send_and_load_message_round_trip() {
        let (transport, store) = setup();
        let message = create_message(CHAT, "hello bob", ALICE, at("2023-04-07T10:00:00Z"));
        let resource_url = remove_hash(&message.id).to_string();
        transport.put_doc(&resource_url, Vec::new());

        send_message(&store, CHAT, &message, None).await.unwrap();
        let (messages, replies) =
            load_chat_message_resource(&store, CHAT, &resource_url, true).await;
        assert_eq!(replies, Vec::new());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello bob");
        assert_eq!(messages[0].maker, ALICE);
        assert_eq!(messages[0].created, at("2023-04-07T10:00:00Z"));
        assert_eq!(messages[0].verification_status, VerificationStatus::NotVerified);
    }

    #[tokio::test]
    async fn test_send_message_stores_signature() {
        let (transport, store) = setup();
        let message = create_message(CHAT, "signed", ALICE, at("2023-04-07T10:00:00Z"));
        let resource_url = remove_hash(&message.id).to_string();
        transport.put_doc(&resource_url, Vec::new());

        send_message(&store, CHAT, &message, Some("c2lnbmF0dXJl"))
            .await
            .unwrap();
        let stored = transport.doc(&resource_url);
        assert!(stored.iter().any(|s| s.subject == message.id
            && s.predicate == security::PROOF
            && s.object == Node::lit("c2lnbmF0dXJl")));
    }

    #[tokio::test]
    async fn test_send_message_survives_missing_shard() {
        let (transport, store) = setup();
        let message = create_message(CHAT, "first of the day", ALICE, Utc::now());
        // no shard document exists yet
        send_message(&store, CHAT, &message, None).await.unwrap();
        assert!(transport.has_doc(remove_hash(&message.id)));
    }

    #[tokio::test]
    async fn test_reply_toggles_on_repeat() {
        let (transport, store) = setup();
        let resource_url =
            seed_shard(&transport, Location::new(2023, 4, 7), &[("hi", ALICE, at("2023-04-07T09:00:00Z"))]);
        let message_id = format!("{resource_url}#msg-0");

        let first = send_message_reply(&store, &message_id, "👍", BOB).await.unwrap();
        assert!(first.added);
        assert_eq!(first.location, Some(Location::new(2023, 4, 7)));
        let (_, replies) =
            load_chat_message_resource(&store, CHAT, &resource_url, true).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].name, "👍");
        assert_eq!(replies[0].agent, BOB);
        assert_eq!(replies[0].message_id, message_id);

        let second = send_message_reply(&store, &message_id, "👍", BOB).await.unwrap();
        assert!(!second.added);
        assert_eq!(second.reply_id, first.reply_id);
        let (_, replies) =
            load_chat_message_resource(&store, CHAT, &resource_url, true).await;
        assert_eq!(replies, Vec::new());
    }

    #[tokio::test]
    async fn test_distinct_replies_coexist() {
        let (transport, store) = setup();
        let resource_url =
            seed_shard(&transport, Location::new(2023, 4, 7), &[("hi", ALICE, at("2023-04-07T09:00:00Z"))]);
        let message_id = format!("{resource_url}#msg-0");

        send_message_reply(&store, &message_id, "👍", BOB).await.unwrap();
        send_message_reply(&store, &message_id, "❤", BOB).await.unwrap();
        send_message_reply(&store, &message_id, "👍", ALICE).await.unwrap();
        let (_, replies) =
            load_chat_message_resource(&store, CHAT, &resource_url, true).await;
        assert_eq!(replies.len(), 3);
    }

    #[tokio::test]
    async fn test_messages_sorted_and_partial_skipped() {
        let (transport, store) = setup();
        let resource_url = seed_shard(
            &transport,
            Location::new(2023, 4, 7),
            &[
                ("second", ALICE, at("2023-04-07T10:00:00Z")),
                ("first", BOB, at("2023-04-07T09:00:00Z")),
            ],
        );
        // a linked message without content is dropped
        let broken = format!("{resource_url}#msg-broken");
        let mut statements = transport.doc(&resource_url);
        statements.push(st(
            &broken,
            dcterms::CREATED,
            Node::date(at("2023-04-07T11:00:00Z")),
            &resource_url,
        ));
        statements.push(st(&broken, foaf::MAKER, Node::iri(ALICE), &resource_url));
        statements.push(st(CHAT, flow::MESSAGE, Node::iri(&broken), &resource_url));
        transport.put_doc(&resource_url, statements);

        let (messages, _) =
            load_chat_message_resource(&store, CHAT, &resource_url, true).await;
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_unloadable_resource_reads_as_empty() {
        let (_, store) = setup();
        let (messages, replies) = load_chat_message_resource(
            &store,
            CHAT,
            "https://alice.pod/pod-chat.com/1234/2023/04/07/chat.ttl",
            true,
        )
        .await;
        assert_eq!(messages, Vec::new());
        assert_eq!(replies, Vec::new());
    }

    #[tokio::test]
    async fn test_search_finds_newest_shard_at_or_before_start() {
        let (transport, store) = setup();
        seed_shard(&transport, Location::new(2023, 4, 1), &[("older", ALICE, at("2023-04-01T08:00:00Z"))]);
        seed_shard(&transport, Location::new(2023, 4, 7), &[("newest", ALICE, at("2023-04-07T08:00:00Z"))]);

        let results =
            load_messages_for_chats(&store, &[CHAT.to_string()], Location::new(2023, 4, 30)).await;
        assert_eq!(results.len(), 1);
        let resource = &results[0].resources[0];
        assert_eq!(resource.location, Location::new(2023, 4, 7));
        assert_eq!(resource.messages[0].content, "newest");
    }

    #[tokio::test]
    async fn test_search_skips_shards_newer_than_start() {
        let (transport, store) = setup();
        seed_shard(&transport, Location::new(2023, 4, 1), &[("older", ALICE, at("2023-04-01T08:00:00Z"))]);
        seed_shard(&transport, Location::new(2023, 4, 7), &[("newer", ALICE, at("2023-04-07T08:00:00Z"))]);

        let results =
            load_messages_for_chats(&store, &[CHAT.to_string()], Location::new(2023, 4, 6)).await;
        let resource = &results[0].resources[0];
        assert_eq!(resource.location, Location::new(2023, 4, 1));
        assert_eq!(resource.messages[0].content, "older");
    }

    #[tokio::test]
    async fn test_search_crosses_month_and_year_boundaries() {
        let (transport, store) = setup();
        // a december shard of the previous year must be found from an
        // april start: its month number is larger but its year is older
        seed_shard(&transport, Location::new(2022, 12, 31), &[("december", ALICE, at("2022-12-31T23:00:00Z"))]);

        let results =
            load_messages_for_chats(&store, &[CHAT.to_string()], Location::new(2023, 4, 7)).await;
        let resource = &results[0].resources[0];
        assert_eq!(resource.location, Location::new(2022, 12, 31));
    }

    #[tokio::test]
    async fn test_search_does_not_false_prune_days_in_older_months() {
        let (transport, store) = setup();
        // day 20 > start day 7, but the month is older than the start
        seed_shard(&transport, Location::new(2023, 3, 20), &[("march", ALICE, at("2023-03-20T08:00:00Z"))]);

        let results =
            load_messages_for_chats(&store, &[CHAT.to_string()], Location::new(2023, 4, 7)).await;
        assert_eq!(results[0].resources[0].location, Location::new(2023, 3, 20));
    }

    #[tokio::test]
    async fn test_search_prunes_newer_years_without_loading_them() {
        let (transport, store) = setup();
        seed_shard(&transport, Location::new(2023, 4, 7), &[("hit", ALICE, at("2023-04-07T08:00:00Z"))]);
        seed_shard(&transport, Location::new(2024, 1, 1), &[("future", ALICE, at("2024-01-01T08:00:00Z"))]);

        load_messages_for_chats(&store, &[CHAT.to_string()], Location::new(2023, 12, 31)).await;
        // chat container, year, month, day and the shard itself; the 2024
        // subtree is pruned without a single fetch
        assert_eq!(transport.get_count(), 5);
    }

    #[tokio::test]
    async fn test_search_skips_empty_shards() {
        let (transport, store) = setup();
        seed_shard(&transport, Location::new(2023, 4, 3), &[("content", ALICE, at("2023-04-03T08:00:00Z"))]);
        seed_shard(&transport, Location::new(2023, 4, 7), &[]);

        let results =
            load_messages_for_chats(&store, &[CHAT.to_string()], Location::new(2023, 4, 30)).await;
        assert_eq!(results[0].resources[0].location, Location::new(2023, 4, 3));
    }

    #[tokio::test]
    async fn test_search_stops_at_shard_holding_only_replies() {
        let (transport, store) = setup();
        seed_shard(&transport, Location::new(2023, 4, 1), &[("text", ALICE, at("2023-04-01T08:00:00Z"))]);
        // a newer shard holding a reaction but no message of its own
        let reply_resource = seed_shard(&transport, Location::new(2023, 4, 7), &[]);
        let reply_id = format!("{reply_resource}#rpl-0");
        let message_id = "https://alice.pod/pod-chat.com/1234/2023/04/01/chat.ttl#msg-0";
        let mut statements = transport.doc(&reply_resource);
        statements.push(st(&reply_id, rdf::TYPE, Node::iri(schema::REACT_ACTION), &reply_resource));
        statements.push(st(&reply_id, schema::NAME, Node::lit("👍"), &reply_resource));
        statements.push(st(&reply_id, schema::AGENT, Node::iri(BOB), &reply_resource));
        statements.push(st(&reply_id, schema::TARGET, Node::iri(message_id), &reply_resource));
        transport.put_doc(&reply_resource, statements);

        let results =
            load_messages_for_chats(&store, &[CHAT.to_string()], Location::new(2023, 4, 30)).await;
        let resource = &results[0].resources[0];
        assert_eq!(resource.location, Location::new(2023, 4, 7));
        assert_eq!(resource.messages, Vec::new());
        assert_eq!(resource.replies.len(), 1);
        assert_eq!(resource.replies[0].message_id, message_id);
    }

    #[tokio::test]
    async fn test_search_reports_end_when_nothing_older_exists() {
        let (transport, store) = setup();
        seed_shard(&transport, Location::new(2023, 4, 7), &[("too new", ALICE, at("2023-04-07T08:00:00Z"))]);

        let results =
            load_messages_for_chats(&store, &[CHAT.to_string()], Location::new(2023, 4, 1)).await;
        assert_eq!(results[0].resources.len(), 1);
        assert!(results[0].resources[0].location.is_end());
        assert_eq!(results[0].resources[0].messages, Vec::new());
    }

    #[tokio::test]
    async fn test_search_treats_foreign_chat_ids_as_ended() {
        let (_, store) = setup();
        let results = load_messages_for_chats(
            &store,
            &["https://other.app/chats/9#this".to_string()],
            Location::new(2023, 4, 7),
        )
        .await;
        assert!(results[0].resources[0].location.is_end());
    }

    #[test]
    fn test_history_merge_replaces_same_shard() {
        let mut history = ChatHistory::new(Location::new(2023, 4, 7));
        let shard = |content: &str| ChatMessageResource {
            location: Location::new(2023, 4, 7),
            messages: vec![ChatMessage {
                id: "m".into(),
                created: at("2023-04-07T08:00:00Z"),
                content: content.into(),
                maker: ALICE.into(),
                verification_status: VerificationStatus::NotVerified,
            }],
            replies: Vec::new(),
        };
        history.merge(vec![ChatMessageSearchResult {
            chat_id: CHAT.into(),
            resources: vec![shard("stale")],
        }]);
        history.merge(vec![ChatMessageSearchResult {
            chat_id: CHAT.into(),
            resources: vec![shard("fresh")],
        }]);
        assert_eq!(history.results.len(), 1);
        assert_eq!(history.results[0].resources.len(), 1);
        assert_eq!(history.results[0].resources[0].messages[0].content, "fresh");
    }

    #[test]
    fn test_history_cursor_snaps_to_newest_shard_of_page() {
        let shard_at = |location: Location| ChatMessageResource {
            location,
            messages: Vec::new(),
            replies: Vec::new(),
        };
        let mut history = ChatHistory::new(Location::new(2023, 4, 27));
        history.merge(vec![
            ChatMessageSearchResult {
                chat_id: CHAT.into(),
                resources: vec![shard_at(Location::new(2023, 4, 26))],
            },
            ChatMessageSearchResult {
                chat_id: "https://bob.pod/pod-chat.com/9/index.ttl#this".into(),
                resources: vec![shard_at(Location::new(2023, 4, 23))],
            },
        ]);
        // the cursor follows the newest copy, not the oldest
        assert_eq!(history.location, Location::new(2023, 4, 26));
        assert!(!history.all_ended());
        assert!(history.advance());
        assert_eq!(history.location, Location::new(2023, 4, 25));
    }

    #[test]
    fn test_history_cursor_stays_with_live_copies_past_an_ended_one() {
        let mut history = ChatHistory::new(Location::new(2023, 4, 25));
        history.merge(vec![
            ChatMessageSearchResult::end(CHAT),
            ChatMessageSearchResult {
                chat_id: "https://bob.pod/pod-chat.com/9/index.ttl#this".into(),
                resources: vec![ChatMessageResource {
                    location: Location::new(2023, 4, 25),
                    messages: Vec::new(),
                    replies: Vec::new(),
                }],
            },
        ]);
        assert_eq!(history.location, Location::new(2023, 4, 25));
        assert!(!history.all_ended());
        assert!(history.advance());
    }

    #[tokio::test]
    async fn test_history_pages_through_interleaved_copies() {
        let (transport, store) = setup();
        let bob_chat = "https://bob.pod/pod-chat.com/9/index.ttl#this";
        seed_shard_for(&transport, CHAT, Location::new(2023, 4, 28), &[("a-28", ALICE, at("2023-04-28T08:00:00Z"))]);
        seed_shard_for(&transport, CHAT, Location::new(2023, 4, 26), &[("a-26", ALICE, at("2023-04-26T08:00:00Z"))]);
        seed_shard_for(&transport, bob_chat, Location::new(2023, 4, 25), &[("b-25", BOB, at("2023-04-25T08:00:00Z"))]);

        let ids = vec![CHAT.to_string(), bob_chat.to_string()];
        let mut history = ChatHistory::new(Location::new(2023, 4, 30));
        loop {
            let fresh = load_messages_for_chats(&store, &ids, history.location).await;
            history.merge(fresh);
            if !history.advance() {
                break;
            }
        }

        // every shard of the newer copy is visited even though the other
        // copy's shard sits below them
        let locations_of = |chat_id: &str| -> Vec<Location> {
            history
                .results
                .iter()
                .find(|r| r.chat_id == chat_id)
                .map(|r| {
                    r.resources
                        .iter()
                        .map(|resource| resource.location)
                        .filter(|l| !l.is_end())
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut alice_locations = locations_of(CHAT);
        alice_locations.sort();
        assert_eq!(
            alice_locations,
            vec![Location::new(2023, 4, 26), Location::new(2023, 4, 28)]
        );
        assert_eq!(locations_of(bob_chat), vec![Location::new(2023, 4, 25)]);
        assert!(history.all_ended());
        assert!(history.location.is_end());
    }

    #[test]
    fn test_history_ends_when_every_chat_ended() {
        let mut history = ChatHistory::new(Location::new(2023, 4, 7));
        history.merge(vec![
            ChatMessageSearchResult::end(CHAT),
            ChatMessageSearchResult::end("https://bob.pod/pod-chat.com/9/index.ttl#this"),
        ]);
        assert!(history.all_ended());
        assert!(!history.advance());
        assert!(history.location.is_end());
    }
}
