//! IRIs of the vocabularies used in pod documents. The exact values are
//! part of the interoperable on-pod format and must not change.

pub mod rdf {
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
}

pub mod xsd {
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
}

pub mod ldp {
    pub const CONTAINS: &str = "http://www.w3.org/ns/ldp#contains";
    pub const CONTAINER: &str = "http://www.w3.org/ns/ldp#Container";
    pub const INBOX: &str = "http://www.w3.org/ns/ldp#inbox";
}

pub mod iana {
    /// Type given by pods to contained turtle leaf resources.
    pub const TURTLE_RESOURCE: &str =
        "http://www.w3.org/ns/iana/media-types/text/turtle#Resource";
}

pub mod acl {
    pub const AUTHORIZATION: &str = "http://www.w3.org/ns/auth/acl#Authorization";
    pub const ACCESS_TO: &str = "http://www.w3.org/ns/auth/acl#accessTo";
    pub const DEFAULT: &str = "http://www.w3.org/ns/auth/acl#default";
    pub const MODE: &str = "http://www.w3.org/ns/auth/acl#mode";
    pub const AGENT: &str = "http://www.w3.org/ns/auth/acl#agent";
    pub const ORIGIN: &str = "http://www.w3.org/ns/auth/acl#origin";
    pub const TRUSTED_APP: &str = "http://www.w3.org/ns/auth/acl#trustedApp";
    pub const READ: &str = "http://www.w3.org/ns/auth/acl#Read";
    pub const WRITE: &str = "http://www.w3.org/ns/auth/acl#Write";
    pub const CONTROL: &str = "http://www.w3.org/ns/auth/acl#Control";
}

pub mod dc {
    pub const AUTHOR: &str = "http://purl.org/dc/elements/1.1/author";
    pub const CREATED: &str = "http://purl.org/dc/elements/1.1/created";
    pub const TITLE: &str = "http://purl.org/dc/elements/1.1/title";
}

pub mod dcterms {
    pub const REFERENCES: &str = "http://purl.org/dc/terms/references";
    pub const MODIFIED: &str = "http://purl.org/dc/terms/modified";
    pub const CREATED: &str = "http://purl.org/dc/terms/created";
}

pub mod flow {
    pub const MESSAGE: &str = "http://www.w3.org/2005/01/wf/flow#message";
    pub const PARTICIPATION: &str = "http://www.w3.org/2005/01/wf/flow#participation";
    pub const PARTICIPANT: &str = "http://www.w3.org/2005/01/wf/flow#participant";
}

pub mod ical {
    pub const DTSTART: &str = "http://www.w3.org/2002/12/cal/ical#dtstart";
}

pub mod meeting {
    pub const LONG_CHAT: &str = "http://www.w3.org/ns/pim/meeting#LongChat";
}

pub mod pim {
    pub const STORAGE: &str = "http://www.w3.org/ns/pim/space#storage";
}

pub mod solid {
    pub const FOR_CLASS: &str = "http://www.w3.org/ns/solid/terms#forClass";
    pub const INSTANCE: &str = "http://www.w3.org/ns/solid/terms#instance";
    pub const PRIVATE_TYPE_INDEX: &str =
        "http://www.w3.org/ns/solid/terms#privateTypeIndex";
    pub const PUBLIC_TYPE_INDEX: &str =
        "http://www.w3.org/ns/solid/terms#publicTypeIndex";
}

pub mod sioc {
    pub const CONTENT: &str = "http://rdfs.org/sioc/ns#content";
    pub const CONTENT_ENCODED: &str = "http://rdfs.org/sioc/ns#content_encoded";
}

pub mod foaf {
    pub const MAKER: &str = "http://xmlns.com/foaf/0.1/maker";
    pub const NAME: &str = "http://xmlns.com/foaf/0.1/name";
    pub const IMG: &str = "http://xmlns.com/foaf/0.1/img";
}

pub mod vcard {
    pub const FN: &str = "http://www.w3.org/2006/vcard/ns#fn";
    pub const HAS_PHOTO: &str = "http://www.w3.org/2006/vcard/ns#hasPhoto";
}

pub mod schema {
    pub const REACT_ACTION: &str = "http://schema.org/ReactAction";
    pub const AGENT: &str = "http://schema.org/agent";
    pub const TARGET: &str = "http://schema.org/target";
    pub const NAME: &str = "http://schema.org/name";
}

pub mod activity {
    pub const ADD: &str = "https://www.w3.org/ns/activitystreams#Add";
    pub const REMOVE: &str = "https://www.w3.org/ns/activitystreams#Remove";
    pub const CONTEXT: &str = "https://www.w3.org/ns/activitystreams#context";
    pub const ACTOR: &str = "https://www.w3.org/ns/activitystreams#actor";
    pub const OBJECT: &str = "https://www.w3.org/ns/activitystreams#object";
    pub const TARGET: &str = "https://www.w3.org/ns/activitystreams#target";
    pub const UPDATED: &str = "https://www.w3.org/ns/activitystreams#updated";
}

pub mod security {
    pub const PROOF: &str = "https://w3id.org/security#proof";
}

pub mod podchat {
    pub const LONG_CHAT_MESSAGE: &str = "https://www.pod-chat.com/LongChatMessage";
    pub const LONG_CHAT_MESSAGE_REPLY: &str =
        "https://www.pod-chat.com/LongChatMessageReply";
    pub const PUBLIC_KEY: &str = "https://www.pod-chat.com/Ed25519PublicKey";
    pub const PRIVATE_KEY: &str = "https://www.pod-chat.com/Ed25519PrivateKey";
    /// Deprecated signature predicate, kept for verification of old data.
    pub const SIGNATURE: &str = "https://www.pod-chat.com/signature";
}
