//! Bluetooth LE peripheral GATT server core.
//!
//! Tracks client requests received by a platform GATT server, matches deferred
//! application responses to them, maintains the service registry and client
//! subscriptions, and drives advertising. The platform Bluetooth stack is
//! reached through the [`Stack`] trait, and the application through
//! [`Peripheral`] commands and [`Event`]s.

pub use gatt_peripheral_const::{uuid16, Descriptor, ParseUuidError, Uuid, Uuid16};
pub use {event::*, peripheral::*, platform::*};

pub mod att;
pub mod gap;
pub mod gatt;

mod event;
mod peripheral;
mod platform;

/// Error type returned by [`Peripheral`] commands.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Gatt(#[from] gatt::Error),
    #[error(transparent)]
    Gap(#[from] gap::Error),
    #[error("invalid Base64 value: {0}")]
    InvalidValue(#[from] base64::DecodeError),
    #[error("invalid service descriptor: {0}")]
    InvalidDescriptor(#[from] serde_json::Error),
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] ParseUuidError),
}

impl Error {
    /// Returns the rejection code reported to the application runtime.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        use {gap::Error as Gap, gatt::Error as Gatt};
        match *self {
            Self::Gatt(Gatt::InvalidService(_)) | Self::InvalidDescriptor(_) => "invalid_service",
            Self::Gatt(Gatt::CharacteristicNotFound(_)) => "characteristic_not_found",
            Self::Gatt(Gatt::NoServicesRegistered) => "service_not_found",
            Self::Gatt(Gatt::InvalidRequest(_)) => "invalid_request",
            Self::Gatt(Gatt::TransmitQueueFull) => "transmit_queue_full",
            Self::Gap(Gap::UnknownService(_)) => "unknown_service",
            Self::Gap(Gap::AdvertisingAlreadyInProgress) => "advertising_in_progress",
            Self::Gap(Gap::AdvertisingUnsupported) => "advertising_unsupported",
            Self::Gap(Gap::AdvertisingStartFailure { .. }) => "advertising_failed",
            Self::Gap(Gap::InvalidAdvertisement) => "invalid_advertisement",
            Self::InvalidValue(_) => "invalid_value",
            Self::InvalidUuid(_) => "invalid_uuid",
        }
    }
}

/// Common result type.
pub type Result<T> = std::result::Result<T, Error>;
