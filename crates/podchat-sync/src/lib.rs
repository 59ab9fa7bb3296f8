//! The podchat synchronization engine: chat lifecycle, message pagination
//! across date-sharded containers, notification convergence and message
//! integrity, all written against the store handle from `podchat-store`.

pub mod chat;
pub mod integrity;
pub mod message;
pub mod notification;
pub mod profile;
