use thiserror::Error;

pub type Result<T> = std::result::Result<T, PodchatError>;

#[derive(Error, Debug)]
pub enum PodchatError {
    #[error("{0}")]
    ChatData(#[from] ChatDataError),

    #[error("{0}")]
    ProfileData(#[from] ProfileDataError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// Malformed chat data. Always fatal to the loading operation, never
/// silently defaulted. The wordings are stable and user-visible.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChatDataError {
    #[error("invalid chat data: no other participants found.")]
    NoOtherParticipants,

    #[error("invalid chat data: no title found.")]
    NoTitle,

    #[error("invalid chat data: no created found.")]
    NoCreated,

    #[error("invalid chat data: created is not a datetime literal.")]
    CreatedNotDatetime,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileDataError {
    #[error("invalid profile data: no value found for storage.")]
    NoStorage,

    #[error("invalid profile data: no value found for privateTypeIndex.")]
    NoPrivateTypeIndex,

    #[error("invalid profile data: no value found for publicTypeIndex.")]
    NoPublicTypeIndex,

    #[error("invalid profile data: no value found for inbox.")]
    NoInbox,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AccessError {
    #[error("cannot add read access: no readonly rule exists in acl")]
    NoReadOnlyRule,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request to {url} failed with status {status}")]
    Http { url: String, status: u16 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("cannot parse document at {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("cannot post data to {0}")]
    PostFailed(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("unable to provision signing key pair")]
    ProvisionFailed,

    #[error("no public key published for {0}")]
    MissingPublicKey(String),

    #[error("stored key material is malformed")]
    MalformedKey,
}
