/// Application container under a profile's storage root.
pub const STORAGE_APP_BASE: &str = "pod-chat.com/";

/// Ledger of processed notification ids, one document per storage root.
pub const STORAGE_NOTIFICATIONS_PROCESSED: &str = "notificationsProcessed.ttl";

/// Private signing key document under the application container.
pub const STORAGE_SIGNING_KEY: &str = "signingKey.ttl";

/// Chat metadata document inside its container.
pub const CHAT_RESOURCE_NAME: &str = "index.ttl";

/// Fragment of the chat subject inside the chat document.
pub const CHAT_RESOURCE_FRAGMENT: &str = "this";

/// Leaf resource holding one day's messages.
pub const MESSAGE_RESOURCE_NAME: &str = "chat.ttl";

/// Default title written on newly created chats.
pub const CHAT_TITLE: &str = "Chat Channel";

/// Upper bound of ledger entries cleaned up per pass.
pub const NOTIFICATIONS_CLEANUP_BATCH_SIZE: usize = 100;

/// Interval between cleanup passes.
pub const NOTIFICATIONS_CLEANUP_INTERVAL_SECS: u64 = 60;
