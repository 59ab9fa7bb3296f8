//! Pod resource addressing. The URL shapes here are interoperable with
//! existing stores and must stay bit-compatible.

use url::Url;
use uuid::Uuid;

use crate::constants::{
    CHAT_RESOURCE_FRAGMENT, CHAT_RESOURCE_NAME, MESSAGE_RESOURCE_NAME,
    STORAGE_APP_BASE, STORAGE_NOTIFICATIONS_PROCESSED, STORAGE_SIGNING_KEY,
};
use crate::error::TransportError;
use crate::location::Location;

/// Strips the fragment, turning a subject WebID into its document URL.
pub fn remove_hash(url: &str) -> &str {
    url.split('#').next().unwrap_or(url)
}

/// Container holding the given document, with trailing slash.
pub fn container_of_doc(doc_url: &str) -> &str {
    match doc_url.rfind('/') {
        Some(idx) => &doc_url[..=idx],
        None => doc_url,
    }
}

/// Extracts the id value from a chat WebID:
/// `https://me.pod/pod-chat.com/1234/index.ttl#this` yields `1234`.
pub fn id_value_from_chat_id(chat_id: &str) -> String {
    let container = container_of_doc(remove_hash(chat_id)).trim_end_matches('/');
    match container.rfind('/') {
        Some(idx) => container[idx + 1..].to_string(),
        None => container.to_string(),
    }
}

/// Inverse of [`id_value_from_chat_id`], prefixed with the given storage.
pub fn chat_id_from_id_value(storage: &str, id_value: &str) -> String {
    format!(
        "{storage}{STORAGE_APP_BASE}{id_value}/{CHAT_RESOURCE_NAME}#{CHAT_RESOURCE_FRAGMENT}"
    )
}

/// Allocates a fresh chat document URL under the given storage root.
pub fn new_chat_resource_url(storage: &str) -> String {
    format!(
        "{storage}{STORAGE_APP_BASE}{}/{CHAT_RESOURCE_NAME}",
        Uuid::new_v4()
    )
}

/// Message shard URL for a location: `<container>/<y>/<MM>/<DD>/chat.ttl`.
pub fn message_resource_url(chat_id: &str, location: Location) -> String {
    format!(
        "{}{}/{:02}/{:02}/{MESSAGE_RESOURCE_NAME}",
        container_of_doc(remove_hash(chat_id)),
        location.year,
        location.month,
        location.day
    )
}

pub fn todays_message_resource_url(chat_id: &str) -> String {
    message_resource_url(chat_id, Location::today())
}

pub fn processed_ledger_url(storage: &str) -> String {
    format!("{storage}{STORAGE_APP_BASE}{STORAGE_NOTIFICATIONS_PROCESSED}")
}

pub fn signing_key_url(storage: &str) -> String {
    format!("{storage}{STORAGE_APP_BASE}{STORAGE_SIGNING_KEY}")
}

pub fn acl_url(container_url: &str) -> String {
    format!("{container_url}.acl")
}

/// Push channel endpoint derived from the identity host.
pub fn push_channel_url(webid: &str) -> Result<String, TransportError> {
    let parsed =
        Url::parse(webid).map_err(|_| TransportError::InvalidUrl(webid.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TransportError::InvalidUrl(webid.to_string()))?;
    Ok(format!("wss://{host}"))
}
