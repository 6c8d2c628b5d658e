//! Generic Access Profile ([Vol 3] Part C) advertising.

pub use {adv::*, consts::*, response_data::*};

use crate::Uuid;

mod adv;
mod consts;
mod response_data;

/// Error type returned by the GAP layer.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("service {0} is not registered")]
    UnknownService(Uuid),
    #[error("advertising is already in progress")]
    AdvertisingAlreadyInProgress,
    #[error("adapter does not support multiple advertisement")]
    AdvertisingUnsupported,
    #[error("advertising failed to start: {reason}")]
    AdvertisingStartFailure { reason: String },
    #[error("invalid advertisement")]
    InvalidAdvertisement,
}

impl Error {
    /// Creates an [`Error::AdvertisingStartFailure`].
    #[inline]
    pub(crate) fn start_failure(reason: impl ToString) -> Self {
        Self::AdvertisingStartFailure {
            reason: reason.to_string(),
        }
    }
}

/// Common GAP result type.
pub type Result<T> = std::result::Result<T, Error>;
