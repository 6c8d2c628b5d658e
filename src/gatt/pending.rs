use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::att::ErrorCode;
use crate::{DeviceHandle, Uuid};

use super::*;

/// Pending request kind.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RequestKind {
    Read,
    Write { response_needed: bool },
}

impl RequestKind {
    /// Returns whether the client expects a response.
    #[inline]
    #[must_use]
    pub const fn response_needed(self) -> bool {
        match self {
            Self::Read => true,
            Self::Write { response_needed } => response_needed,
        }
    }
}

/// Client request awaiting an application response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PendingRequest {
    pub id: RequestId,
    pub offset: u16,
    pub dev: DeviceHandle,
    pub target: CharRef,
    pub kind: RequestKind,
}

impl PendingRequest {
    /// Returns the part of `v` requested by a read or `InvalidOffset` if the
    /// offset is past the end of the value.
    #[inline]
    pub fn slice<'a>(&self, v: &'a [u8]) -> std::result::Result<&'a [u8], ErrorCode> {
        v.get(usize::from(self.offset)..)
            .ok_or(ErrorCode::InvalidOffset)
    }
}

impl From<&ReadReq> for PendingRequest {
    #[inline]
    fn from(r: &ReadReq) -> Self {
        Self {
            id: r.id,
            offset: r.offset,
            dev: r.dev,
            target: r.target,
            kind: RequestKind::Read,
        }
    }
}

impl From<&WriteReq> for PendingRequest {
    #[inline]
    fn from(r: &WriteReq) -> Self {
        Self {
            id: r.id,
            offset: r.offset,
            dev: r.dev,
            target: r.target,
            kind: RequestKind::Write {
                response_needed: r.response_needed,
            },
        }
    }
}

/// Outstanding requests keyed by request ID. Every operation is atomic with
/// respect to the others, so each request can be taken at most once.
#[derive(Debug, Default)]
pub struct PendingRequestStore(Mutex<HashMap<RequestId, PendingRequest>>);

impl PendingRequestStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request, replacing any stale entry with the same ID.
    pub fn record(&self, r: PendingRequest) {
        if let Some(old) = self.0.lock().insert(r.id, r) {
            warn!("Replaced stale {:?} from {}", old.id, old.dev);
        }
    }

    /// Removes and returns the specified request.
    pub fn take(&self, id: RequestId) -> Option<PendingRequest> {
        self.0.lock().remove(&id)
    }

    /// Removes all requests from the specified device. Returns the number of
    /// removed requests.
    pub fn evict_device(&self, dev: DeviceHandle) -> usize {
        let mut m = self.0.lock();
        let n = m.len();
        m.retain(|_, r| r.dev != dev);
        let n = n - m.len();
        if n > 0 {
            debug!("Evicted {n} pending request(s) from {dev}");
        }
        n
    }

    /// Removes all requests targeting characteristics of the specified
    /// service.
    pub fn evict_service(&self, svc: Uuid) -> Vec<PendingRequest> {
        let mut m = self.0.lock();
        let ids: Vec<RequestId> = (m.values())
            .filter(|r| r.target.service == svc)
            .map(|r| r.id)
            .collect();
        let v: Vec<PendingRequest> = ids.iter().filter_map(|id| m.remove(id)).collect();
        if !v.is_empty() {
            debug!("Evicted {} pending request(s) for service {svc}", v.len());
        }
        v
    }

    /// Returns whether the request is outstanding.
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.0.lock().contains_key(&id)
    }

    /// Returns the number of outstanding requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Returns whether there are no outstanding requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}
