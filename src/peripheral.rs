//! Application command surface.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use crate::att::parse_status;
use crate::event::{EventReceiver, EventSender};
use crate::gap::{AdvertiseConfig, AdvertisingSession};
use crate::gatt::{GattServer, RequestId, ServiceDescriptor};
use crate::{Result, Stack, Uuid};

/// Adapter state reported to the application.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AdapterState {
    PoweredOn,
    Unsupported,
}

/// BLE peripheral. Combines the GATT server with the advertiser and exposes
/// the commands available to the application runtime. Values cross this
/// boundary Base64-encoded.
#[derive(Debug)]
pub struct Peripheral<S> {
    server: GattServer<S>,
    adv: AdvertisingSession<S>,
}

impl<S: Stack> Peripheral<S> {
    /// Creates a peripheral on top of the platform stack. Application events
    /// are delivered to the returned receiver.
    #[must_use]
    pub fn new(stack: Arc<S>) -> (Self, EventReceiver) {
        let (tx, rx) = EventSender::channel();
        let p = Self {
            adv: AdvertisingSession::new(Arc::clone(&stack)),
            server: GattServer::new(stack, tx),
        };
        (p, rx)
    }

    /// Returns the GATT server, which receives platform stack callbacks.
    #[inline(always)]
    #[must_use]
    pub const fn server(&self) -> &GattServer<S> {
        &self.server
    }

    /// Returns whether the advertiser is running.
    #[inline]
    #[must_use]
    pub fn is_advertising(&self) -> bool {
        self.adv.is_advertising()
    }

    /// Returns the adapter state.
    #[must_use]
    pub fn state(&self) -> AdapterState {
        if self.server.stack().is_multiple_advertisement_supported() {
            AdapterState::PoweredOn
        } else {
            AdapterState::Unsupported
        }
    }

    /// Registers a service.
    #[inline]
    pub fn add_service(&self, d: &ServiceDescriptor) -> Result<()> {
        Ok(self.server.add_service(d)?)
    }

    /// Registers a service from its JSON descriptor.
    pub fn add_service_json(&self, json: &str) -> Result<()> {
        let d: ServiceDescriptor = serde_json::from_str(json)?;
        self.add_service(&d)
    }

    /// Removes a service. Returns `false` if the service was not registered.
    pub fn remove_service(&self, uuid: &str) -> Result<bool> {
        Ok(self.server.remove_service(uuid.parse()?))
    }

    /// Removes all services.
    #[inline]
    pub fn remove_all_services(&self) {
        self.server.remove_all_services();
    }

    /// Starts advertising. Resolves when the platform reports the outcome.
    pub async fn start_advertising(&self, cfg: &AdvertiseConfig) -> Result<()> {
        Ok(self.adv.start(cfg, &self.server).await?)
    }

    /// Closes the GATT server and stops the advertiser. An outstanding
    /// [`start_advertising`](Self::start_advertising) call fails.
    pub fn stop_advertising(&self) {
        self.server.close();
        self.adv.stop();
    }

    /// Completes a read or write request. The status is `"success"` or an ATT
    /// error name. If `value` is provided, it replaces the characteristic
    /// value before the response is sent.
    pub fn respond(&self, id: RequestId, status: &str, value: Option<&str>) -> Result<()> {
        let value = value.map(|v| BASE64.decode(v)).transpose()?;
        let status = parse_status(status);
        debug!("Responding to {id:?} with {status:?}");
        Ok(self.server.respond(id, status, value)?)
    }

    /// Updates a characteristic value and notifies subscribed centrals.
    pub fn notify(&self, characteristic: &str, value: &str) -> Result<()> {
        let uuid: Uuid = characteristic.parse()?;
        let value = BASE64.decode(value)?;
        self.server.notify(uuid, value)?;
        Ok(())
    }
}
