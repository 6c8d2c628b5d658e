use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use crate::att::Status;
use crate::{DeviceHandle, Uuid};

/// Request identifier assigned by the platform stack. Identifiers are unique
/// only among outstanding requests and may be reused after a response.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct RequestId(pub u32);

impl Debug for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl Display for RequestId {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = std::num::ParseIntError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<u32> for RequestId {
    #[inline(always)]
    fn from(v: u32) -> Self {
        Self(v)
    }
}

// The application runtime receives identifiers as strings.
impl serde::Serialize for RequestId {
    #[inline]
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Characteristic reference. This is a key that is re-resolved through the
/// [`AttributeTable`](super::AttributeTable) on every use, so it never
/// dangles when its service is removed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CharRef {
    pub service: Uuid,
    pub characteristic: Uuid,
}

impl CharRef {
    /// Creates a characteristic reference.
    #[inline(always)]
    #[must_use]
    pub const fn new(service: Uuid, characteristic: Uuid) -> Self {
        Self {
            service,
            characteristic,
        }
    }

    /// Returns a reference to one of the characteristic descriptors.
    #[inline(always)]
    #[must_use]
    pub const fn descriptor(self, uuid: Uuid) -> DescRef {
        DescRef {
            characteristic: self,
            descriptor: uuid,
        }
    }
}

impl Display for CharRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}", self.service, self.characteristic)
    }
}

/// Descriptor reference.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DescRef {
    pub characteristic: CharRef,
    pub descriptor: Uuid,
}

impl Display for DescRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{:?}", self.characteristic, self.descriptor)
    }
}

/// Inbound read request for a characteristic ([`CharRef`]) or descriptor
/// ([`DescRef`]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadReq<T = CharRef> {
    pub dev: DeviceHandle,
    pub id: RequestId,
    pub offset: u16,
    pub target: T,
}

/// Inbound write request for a characteristic ([`CharRef`]) or descriptor
/// ([`DescRef`]).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteReq<T = CharRef> {
    pub dev: DeviceHandle,
    pub id: RequestId,
    pub target: T,
    /// Part of a prepared (queued) write.
    pub prepared: bool,
    /// The client expects a response.
    pub response_needed: bool,
    pub offset: u16,
    pub value: Vec<u8>,
}

/// Outbound response to a read or write request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub dev: DeviceHandle,
    pub id: RequestId,
    pub status: Status,
    pub offset: u16,
    pub value: Option<Vec<u8>>,
}

impl Response {
    /// Creates a response without a value.
    #[inline]
    #[must_use]
    pub const fn status(dev: DeviceHandle, id: RequestId, status: Status) -> Self {
        Self {
            dev,
            id,
            status,
            offset: 0,
            value: None,
        }
    }
}

/// Connection state reported by the platform stack.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Serialize,
)]
#[non_exhaustive]
#[repr(u8)]
#[serde(rename_all = "camelCase")]
pub enum ConnState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}
