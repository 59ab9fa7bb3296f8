//! A signed-in user's session: the store handle, the loaded profile and
//! signing key, and the background loops that keep the inbox converged.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ed25519_dalek::SigningKey;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use podchat_shared::constants::NOTIFICATIONS_CLEANUP_INTERVAL_SECS;
use podchat_shared::error::Result;
use podchat_shared::types::{Chat, ChatMessage, Profile, SolidNotification, VerificationStatus};
use podchat_store::Store;
use podchat_sync::chat;
use podchat_sync::integrity;
use podchat_sync::message::{self, ReplyOutcome};
use podchat_sync::notification;
use podchat_sync::profile as profile_loader;

use crate::poller::{CleanupGuard, PollAction, PollCoalescer, PollEvent};

/// One signed-in user. Cheap to share behind an [`Arc`]; every method
/// takes `&self`.
pub struct Session {
    store: Arc<Store>,
    profile: Profile,
    signing_key: Option<SigningKey>,
    cleanup_guard: CleanupGuard,
}

impl Session {
    /// Loads the profile and provisions the signing key pair. A key that
    /// cannot be provisioned degrades to unsigned sending, it never
    /// blocks sign-in.
    pub async fn establish(
        store: Arc<Store>,
        webid: &str,
        app_origin: Option<&str>,
    ) -> Result<Session> {
        let profile = profile_loader::load_profile(&store, webid, app_origin).await?;
        let signing_key =
            match integrity::ensure_key_pair(&store, &profile.id, &profile.storage_id).await {
                Ok(key) => Some(key),
                Err(error) => {
                    warn!(error = %error, "no signing key, messages go out unsigned");
                    None
                }
            };
        info!(webid = %profile.id, "session established");
        Ok(Session {
            store,
            profile,
            signing_key,
            cleanup_guard: CleanupGuard::new(),
        })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn create_chat_with(&self, other_ids: &[String]) -> Result<Chat> {
        chat::create_chat(
            &self.store,
            &self.profile.id,
            other_ids,
            Utc::now(),
            &self.profile.storage_id,
            &self.profile.private_type_index_id,
        )
        .await
    }

    /// Writes a message into the own copy of the chat, signed when a key
    /// is available, then notifies every participant. A peer whose inbox
    /// cannot be reached is skipped; the message itself already counts as
    /// sent.
    pub async fn send_chat_message(&self, chat: &Chat, content: &str) -> Result<ChatMessage> {
        let msg = message::create_message(&chat.id, content, &self.profile.id, Utc::now());
        let signature = self
            .signing_key
            .as_ref()
            .map(|key| integrity::sign_message(key, &msg));
        message::send_message(&self.store, &chat.id, &msg, signature.as_deref()).await?;

        for participant in &chat.participants {
            if let Err(error) = self.notify_participant(&participant.id, &msg.id, chat).await {
                warn!(participant = %participant.id, error = %error, "cannot notify participant");
            }
        }
        Ok(msg)
    }

    async fn notify_participant(
        &self,
        participant_id: &str,
        object_id: &str,
        chat: &Chat,
    ) -> Result<()> {
        let peer = profile_loader::load_profile(&self.store, participant_id, None).await?;
        notification::send_add_message_notification(
            &self.store,
            &peer.inbox_id,
            &self.profile.id,
            object_id,
            &chat.id,
            Utc::now(),
        )
        .await
    }

    /// Toggles a reaction and tells the participants which way it went.
    pub async fn toggle_reply(
        &self,
        chat: &Chat,
        message_id: &str,
        name: &str,
    ) -> Result<ReplyOutcome> {
        let outcome =
            message::send_message_reply(&self.store, message_id, name, &self.profile.id).await?;
        for participant in &chat.participants {
            let result = async {
                let peer =
                    profile_loader::load_profile(&self.store, &participant.id, None).await?;
                if outcome.added {
                    notification::send_add_reply_notification(
                        &self.store,
                        &peer.inbox_id,
                        &self.profile.id,
                        &outcome.reply_id,
                        &chat.id,
                        Utc::now(),
                    )
                    .await
                } else {
                    notification::send_remove_reply_notification(
                        &self.store,
                        &peer.inbox_id,
                        &self.profile.id,
                        &outcome.reply_id,
                        &chat.id,
                        Utc::now(),
                    )
                    .await
                }
            }
            .await;
            if let Err(error) = result {
                warn!(participant = %participant.id, error = %error, "cannot notify participant");
            }
        }
        Ok(outcome)
    }

    pub async fn poll_once(&self) -> Result<Vec<SolidNotification>> {
        notification::poll_inbox(&self.store, &self.profile).await
    }

    /// Marks notifications as consumed so the cleanup worker can delete
    /// them.
    pub async fn accept(&self, notifications: &[SolidNotification]) {
        notification::accept_notifications(
            &self.store,
            notifications,
            &self.profile.storage_id,
            Utc::now(),
        )
        .await;
    }

    pub async fn verify(&self, message: &ChatMessage) -> VerificationStatus {
        integrity::verify_chat_message(&self.store, message).await.status
    }

    /// Drives the inbox from change signals until the signal channel
    /// closes. Bursts of signals coalesce: one poll runs, one follow-up
    /// poll covers everything that arrived in between, nothing is lost.
    /// Every poll's result is sent to `delivery`, a failed poll is logged
    /// and the loop keeps listening.
    pub async fn run_notification_loop(
        &self,
        mut signals: mpsc::Receiver<()>,
        delivery: mpsc::Sender<Vec<SolidNotification>>,
    ) {
        let mut coalescer = PollCoalescer::new();
        while signals.recv().await.is_some() {
            if coalescer.on_event(PollEvent::Signal) != Some(PollAction::StartPoll) {
                continue;
            }
            loop {
                // signals that piled up so far are covered by this poll
                while signals.try_recv().is_ok() {
                    coalescer.on_event(PollEvent::Signal);
                }
                match self.poll_once().await {
                    Ok(notifications) => {
                        if delivery.send(notifications).await.is_err() {
                            return;
                        }
                    }
                    Err(error) => warn!(error = %error, "inbox poll failed"),
                }
                match coalescer.on_event(PollEvent::PollFinished) {
                    Some(PollAction::RunExtraPoll) => continue,
                    _ => break,
                }
            }
        }
    }

    /// One bounded cleanup pass, skipped when another is still running.
    pub async fn cleanup(&self) {
        let Some(_token) = self.cleanup_guard.try_begin() else {
            debug!("cleanup pass already running, skipping");
            return;
        };
        notification::cleanup_notifications(&self.store, &self.profile.storage_id).await;
    }
}

/// Periodic deletion of consumed notifications. Runs until aborted.
pub fn spawn_cleanup_worker(session: Arc<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(NOTIFICATIONS_CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            session.cleanup().await;
        }
    })
}
