//! Generic Attribute Profile ([Vol 3] Part G) server core.
//!
//! [`AttributeTable`] holds the registered services, [`PendingRequestStore`]
//! joins client requests with deferred application responses,
//! [`SubscriptionTracker`] records CCCD state per client, and [`GattServer`]
//! drives them from platform stack callbacks.

pub use {consts::*, io::*, pending::*, schema::*, server::*, subscription::*, table::*};

use crate::Uuid;

mod consts;
mod io;
mod pending;
mod schema;
mod server;
mod subscription;
mod table;

/// Error type returned by the GATT layer.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid service: {0}")]
    InvalidService(String),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("no services registered")]
    NoServicesRegistered,
    #[error("invalid request {0}")]
    InvalidRequest(RequestId),
    #[error("the underlying transmit queue is full")]
    TransmitQueueFull,
}

/// Common GATT result type.
pub type Result<T> = std::result::Result<T, Error>;
