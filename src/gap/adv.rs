use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::gatt::GattServer;
use crate::{Stack, Uuid};

use super::*;

/// Advertising mode, using the platform values.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Deserialize,
    serde::Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "camelCase")]
pub enum AdvertiseMode {
    LowPower = 0,
    Balanced = 1,
    LowLatency = 2,
}

impl Default for AdvertiseMode {
    #[inline]
    fn default() -> Self {
        Self::Balanced
    }
}

/// Advertising TX power level, using the platform values.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Deserialize,
    serde::Serialize,
)]
#[repr(u8)]
#[serde(rename_all = "camelCase")]
pub enum TxPowerLevel {
    UltraLow = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl TxPowerLevel {
    /// Returns the nominal transmit power in dBm that is included in the
    /// advertising data.
    #[must_use]
    pub const fn dbm(self) -> i8 {
        match self {
            Self::UltraLow => -21,
            Self::Low => -15,
            Self::Medium => -7,
            Self::High => 1,
        }
    }
}

impl Default for TxPowerLevel {
    #[inline]
    fn default() -> Self {
        Self::Medium
    }
}

/// Advertising parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvertiseSettings {
    pub mode: AdvertiseMode,
    pub tx_power: TxPowerLevel,
    pub connectable: bool,
    /// Advertising duration limit in milliseconds, or 0 for no limit.
    pub timeout_millis: u32,
}

impl Default for AdvertiseSettings {
    fn default() -> Self {
        Self {
            mode: AdvertiseMode::Balanced,
            tx_power: TxPowerLevel::Medium,
            connectable: true,
            timeout_millis: 0,
        }
    }
}

/// Application advertising request.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvertiseConfig {
    /// Adapter name, sent in the scan response.
    pub name: String,
    /// Advertised services. Every service must be registered.
    pub service_uuids: Vec<Uuid>,
    pub settings: AdvertiseSettings,
    pub include_tx_power: bool,
    pub include_device_name: bool,
}

impl AdvertiseConfig {
    /// Creates a config with default settings.
    pub fn new(name: impl Into<String>, service_uuids: Vec<Uuid>) -> Self {
        Self {
            name: name.into(),
            service_uuids,
            ..Self::default()
        }
    }
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            service_uuids: Vec::new(),
            settings: AdvertiseSettings::default(),
            include_tx_power: true,
            include_device_name: true,
        }
    }
}

/// Advertising start failure reported by the platform stack.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum AdvertiseFailure {
    #[error("advertising data too large")]
    DataTooLarge = 1,
    #[error("too many advertisers")]
    TooManyAdvertisers = 2,
    #[error("advertising already started")]
    AlreadyStarted = 3,
    #[error("internal error")]
    InternalError = 4,
    #[error("feature unsupported")]
    FeatureUnsupported = 5,
}

/// Advertising or scan response data contents.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AdvertiseData {
    pub flags: AdvFlag,
    pub tx_power: Option<i8>,
    pub service_uuids: Vec<Uuid>,
    pub local_name: Option<String>,
}

impl AdvertiseData {
    /// Returns the legacy LTV encoding of the data.
    pub fn encode(&self) -> std::result::Result<Vec<u8>, AdvertiseFailure> {
        if self.max_len() > ResponseDataMut::MAX_LEN {
            return Err(AdvertiseFailure::DataTooLarge);
        }
        let mut b = ResponseDataMut::new();
        if !self.flags.is_empty() {
            b.flags(self.flags);
        }
        if let Some(dbm) = self.tx_power {
            b.tx_power(dbm);
        }
        b.service_class(true, &self.service_uuids);
        if let Some(name) = self.local_name.as_deref() {
            b.local_name(true, name);
        }
        if b.len() > ResponseDataMut::LEGACY_MAX_LEN {
            return Err(AdvertiseFailure::DataTooLarge);
        }
        Ok(b.to_vec())
    }

    /// Returns the encoded length upper bound.
    fn max_len(&self) -> usize {
        let name = self.local_name.as_ref().map_or(0, |s| 2 + s.len());
        3 + 3 + 3 * 2 + self.service_uuids.len() * Uuid::BYTES + name
    }
}

/// Advertising request issued to the platform stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Advertisement {
    pub settings: AdvertiseSettings,
    pub data: AdvertiseData,
    pub scan_response: AdvertiseData,
}

impl Advertisement {
    /// Builds the advertisement for `cfg`. Connectable advertisements use LE
    /// General Discoverable Mode.
    #[must_use]
    pub fn new(cfg: &AdvertiseConfig) -> Self {
        let s = cfg.settings;
        let flags = if s.connectable {
            AdvFlag::LE_GENERAL | AdvFlag::NO_BREDR
        } else {
            AdvFlag::NO_BREDR
        };
        Self {
            settings: s,
            data: AdvertiseData {
                flags,
                tx_power: cfg.include_tx_power.then(|| s.tx_power.dbm()),
                service_uuids: cfg.service_uuids.clone(),
                local_name: None,
            },
            scan_response: AdvertiseData {
                local_name: (cfg.include_device_name && !cfg.name.is_empty())
                    .then(|| cfg.name.clone()),
                ..AdvertiseData::default()
            },
        }
    }

    /// Verifies that the advertising and scan response data fit in legacy
    /// advertising PDUs.
    pub fn validate(&self) -> std::result::Result<(), AdvertiseFailure> {
        self.data.encode()?;
        self.scan_response.encode().map(|_| ())
    }
}

type StartResult = std::result::Result<(), AdvertiseFailure>;

struct Shared {
    tx: Mutex<Option<oneshot::Sender<StartResult>>>,
    session: Weak<Mutex<Inner>>,
}

/// Single-use handle for reporting the outcome of an advertising start. Only
/// the first completion is delivered.
#[derive(Clone)]
pub struct AdvCompletion(Arc<Shared>);

impl AdvCompletion {
    fn new(session: &Arc<Mutex<Inner>>) -> (Self, oneshot::Receiver<StartResult>) {
        let (tx, rx) = oneshot::channel();
        let s = Shared {
            tx: Mutex::new(Some(tx)),
            session: Arc::downgrade(session),
        };
        (Self(Arc::new(s)), rx)
    }

    /// Reports the advertising start outcome. The session state is updated
    /// even if nobody is waiting for the start anymore. Returns `false` if
    /// the start was already completed or abandoned.
    pub fn complete(&self, r: StartResult) -> bool {
        let Some(tx) = self.0.tx.lock().take() else {
            debug!("Ignored duplicate advertising completion: {r:?}");
            return false;
        };
        let state = match r {
            Ok(()) | Err(AdvertiseFailure::AlreadyStarted) => AdvState::Advertising,
            Err(_) => AdvState::Idle,
        };
        let current = (self.0.session.upgrade()).map_or(false, |s| s.lock().finish(self, state));
        if !current {
            debug!("Advertising completion {r:?} for a stale start");
        }
        if let Err(r) = tx.send(r) {
            debug!("Advertising completion {r:?} has no waiter");
        }
        true
    }

    /// Returns whether the completion is still outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.tx.lock().is_some()
    }

    /// Abandons the start without delivering a result.
    fn cancel(&self) {
        self.0.tx.lock().take();
    }

    #[inline]
    fn is(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for AdvCompletion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple("AdvCompletion"))
            .field(&if self.is_pending() { "pending" } else { "done" })
            .finish()
    }
}

/// Advertising session state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AdvState {
    #[default]
    Idle,
    Starting,
    Advertising,
    Stopping,
}

#[derive(Debug, Default)]
struct Inner {
    state: AdvState,
    done: Option<AdvCompletion>,
}

impl Inner {
    /// Resolves the start identified by `done` if it is still current.
    fn finish(&mut self, done: &AdvCompletion, state: AdvState) -> bool {
        if !self.done.as_ref().map_or(false, |d| d.is(done)) {
            return false;
        }
        self.state = state;
        self.done = None;
        true
    }
}

/// Advertising lifecycle manager. At most one start is outstanding at any
/// time.
#[derive(Debug)]
pub struct AdvertisingSession<S> {
    stack: Arc<S>,
    inner: Arc<Mutex<Inner>>,
}

impl<S: Stack> AdvertisingSession<S> {
    /// Creates an idle session.
    #[must_use]
    pub fn new(stack: Arc<S>) -> Self {
        Self {
            stack,
            inner: Arc::default(),
        }
    }

    /// Returns the session state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> AdvState {
        self.inner.lock().state
    }

    /// Returns whether the advertiser is running.
    #[inline]
    #[must_use]
    pub fn is_advertising(&self) -> bool {
        self.state() == AdvState::Advertising
    }

    /// Starts advertising the services in `cfg`, publishing them on the GATT
    /// server first. Resolves when the platform reports the outcome. The
    /// session state follows the platform outcome even if the returned
    /// future is dropped early.
    pub async fn start(&self, cfg: &AdvertiseConfig, srv: &GattServer<S>) -> Result<()> {
        let (done, rx) = AdvCompletion::new(&self.inner);
        {
            let mut inner = self.inner.lock();
            if inner.state != AdvState::Idle {
                return Err(Error::AdvertisingAlreadyInProgress);
            }
            inner.state = AdvState::Starting;
            inner.done = Some(done.clone());
        }
        if let Err(e) = self.issue(cfg, srv, &done) {
            warn!("Advertising not started: {e}");
            self.inner.lock().finish(&done, AdvState::Idle);
            return Err(e);
        }
        match rx.await {
            Ok(Ok(()) | Err(AdvertiseFailure::AlreadyStarted)) => {
                info!("Advertising {:?} as {:?}", cfg.service_uuids, cfg.name);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("Advertising start failed: {e}");
                Err(Error::start_failure(e))
            }
            Err(_) => Err(Error::start_failure("stopped")),
        }
    }

    /// Validates the request and issues the platform start.
    fn issue(&self, cfg: &AdvertiseConfig, srv: &GattServer<S>, done: &AdvCompletion) -> Result<()> {
        if cfg.service_uuids.is_empty() {
            return Err(Error::InvalidAdvertisement);
        }
        if !self.stack.is_multiple_advertisement_supported() {
            return Err(Error::AdvertisingUnsupported);
        }
        if let Some(&u) = (cfg.service_uuids.iter()).find(|&&u| !srv.table().contains(u)) {
            return Err(Error::UnknownService(u));
        }
        let adv = Advertisement::new(cfg);
        adv.validate().map_err(Error::start_failure)?;
        if !cfg.name.is_empty() {
            self.stack.set_name(&cfg.name).map_err(Error::start_failure)?;
        }
        (srv.publish(&cfg.service_uuids)).map_err(Error::start_failure)?;
        debug!("Starting advertiser: {adv:?}");
        (self.stack.start_advertising(&adv, done.clone())).map_err(Error::start_failure)
    }

    /// Stops the advertiser. Any outstanding start fails. This is safe to call
    /// in any state. Starts are rejected until the platform advertiser is
    /// stopped.
    pub fn stop(&self) {
        let done = {
            let mut inner = self.inner.lock();
            inner.state = AdvState::Stopping;
            inner.done.take()
        };
        if let Some(d) = done {
            debug!("Abandoning advertising start");
            d.cancel();
        }
        self.stack.stop_advertising();
        let mut inner = self.inner.lock();
        if inner.state == AdvState::Stopping {
            inner.state = AdvState::Idle;
        }
        debug!("Advertising stopped");
    }
}
