//! Interface to the platform Bluetooth stack.
//!
//! The core never talks to a radio. It decides what to advertise and how to
//! answer each request, and hands those decisions to a [`Stack`]
//! implementation that owns the actual GATT server and advertiser objects of
//! the operating system.

use std::fmt::{Debug, Display, Formatter};

use crate::gap::{AdvCompletion, Advertisement};
use crate::gatt::{CharRef, Response, ServiceDef};
use crate::Uuid;

/// Opaque identity of a connected central, assigned by the platform stack.
#[derive(
    Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct DeviceHandle(pub u64);

impl Debug for DeviceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Device({:#X})", self.0)
    }
}

impl Display for DeviceHandle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Error returned by the platform stack.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum StackError {
    #[error("transmit queue is full")]
    QueueFull,
    #[error("{0} is not connected")]
    NotConnected(DeviceHandle),
    #[error("GATT server is not open")]
    ServerClosed,
    #[error("{0}")]
    Other(String),
}

/// Platform stack result type.
pub type StackResult<T = ()> = std::result::Result<T, StackError>;

/// Outbound operations on the platform Bluetooth stack. Implementations are
/// called without any internal locks held and may re-enter the core from the
/// same thread.
pub trait Stack: Send + Sync + 'static {
    /// Sends a response to a read or write request.
    fn send_response(&self, rsp: &Response) -> StackResult;

    /// Sends a characteristic value notification, or an indication if
    /// `confirm` is set.
    fn notify_characteristic_changed(
        &self,
        dev: DeviceHandle,
        ch: CharRef,
        value: &[u8],
        confirm: bool,
    ) -> StackResult;

    /// Opens the GATT server. Called only when [`Self::is_server_open`]
    /// returns `false`.
    fn open_server(&self) -> StackResult;

    /// Returns whether the GATT server is open.
    fn is_server_open(&self) -> bool;

    /// Publishes a service on the open GATT server.
    fn add_service(&self, svc: &ServiceDef) -> StackResult;

    /// Returns whether the service is published on the GATT server.
    fn has_service(&self, uuid: Uuid) -> bool;

    /// Removes a published service.
    fn remove_service(&self, uuid: Uuid);

    /// Removes all published services.
    fn clear_services(&self);

    /// Closes the GATT server.
    fn close(&self);

    /// Sets the adapter name.
    fn set_name(&self, name: &str) -> StackResult;

    /// Returns whether the adapter supports multiple advertisement.
    fn is_multiple_advertisement_supported(&self) -> bool;

    /// Starts advertising. The stack must eventually call
    /// [`AdvCompletion::complete`] once with the outcome, unless this method
    /// returns an error.
    fn start_advertising(&self, adv: &Advertisement, done: AdvCompletion) -> StackResult;

    /// Stops advertising. Must be safe to call when not advertising.
    fn stop_advertising(&self);
}

#[cfg(test)]
pub(crate) mod mock {
    //! Recording stack used by unit tests.

    use std::collections::BTreeSet;

    use parking_lot::Mutex;

    use super::*;

    /// Recorded outbound call.
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub enum Call {
        Response(Response),
        Notify {
            dev: DeviceHandle,
            ch: CharRef,
            value: Vec<u8>,
            confirm: bool,
        },
        OpenServer,
        AddService(Uuid),
        RemoveService(Uuid),
        ClearServices,
        Close,
        SetName(String),
        StartAdvertising(Advertisement),
        StopAdvertising,
    }

    #[derive(Debug, Default)]
    struct State {
        calls: Vec<Call>,
        open: bool,
        services: BTreeSet<Uuid>,
        done: Option<AdvCompletion>,
    }

    /// Stack that records every call.
    #[derive(Debug)]
    pub struct MockStack {
        st: Mutex<State>,
        pub multi_adv: bool,
        pub fail_notify: Mutex<BTreeSet<DeviceHandle>>,
    }

    impl Default for MockStack {
        fn default() -> Self {
            Self {
                st: Mutex::default(),
                multi_adv: true,
                fail_notify: Mutex::default(),
            }
        }
    }

    impl MockStack {
        /// Creates a stack that does not support multiple advertisement.
        pub fn without_multi_adv() -> Self {
            Self {
                multi_adv: false,
                ..Self::default()
            }
        }

        /// Yields until an advertising start is issued.
        pub async fn wait_for_completion(&self) {
            while self.completion().is_none() {
                tokio::task::yield_now().await;
            }
        }

        /// Returns and clears all recorded calls.
        pub fn take(&self) -> Vec<Call> {
            std::mem::take(&mut self.st.lock().calls)
        }

        /// Returns recorded responses, clearing all calls.
        pub fn responses(&self) -> Vec<Response> {
            (self.take().into_iter())
                .filter_map(|c| match c {
                    Call::Response(r) => Some(r),
                    _ => None,
                })
                .collect()
        }

        /// Returns the completion handle of the last advertising start.
        pub fn completion(&self) -> Option<AdvCompletion> {
            self.st.lock().done.clone()
        }

        /// Returns whether the server is open.
        pub fn open(&self) -> bool {
            self.st.lock().open
        }

        fn record(&self, c: Call) {
            self.st.lock().calls.push(c);
        }
    }

    impl Stack for MockStack {
        fn send_response(&self, rsp: &Response) -> StackResult {
            self.record(Call::Response(rsp.clone()));
            Ok(())
        }

        fn notify_characteristic_changed(
            &self,
            dev: DeviceHandle,
            ch: CharRef,
            value: &[u8],
            confirm: bool,
        ) -> StackResult {
            if self.fail_notify.lock().contains(&dev) {
                return Err(StackError::QueueFull);
            }
            self.record(Call::Notify {
                dev,
                ch,
                value: value.to_vec(),
                confirm,
            });
            Ok(())
        }

        fn open_server(&self) -> StackResult {
            let mut st = self.st.lock();
            st.open = true;
            st.calls.push(Call::OpenServer);
            Ok(())
        }

        fn is_server_open(&self) -> bool {
            self.st.lock().open
        }

        fn add_service(&self, svc: &ServiceDef) -> StackResult {
            let mut st = self.st.lock();
            st.services.insert(svc.uuid());
            st.calls.push(Call::AddService(svc.uuid()));
            Ok(())
        }

        fn has_service(&self, uuid: Uuid) -> bool {
            self.st.lock().services.contains(&uuid)
        }

        fn remove_service(&self, uuid: Uuid) {
            let mut st = self.st.lock();
            st.services.remove(&uuid);
            st.calls.push(Call::RemoveService(uuid));
        }

        fn clear_services(&self) {
            let mut st = self.st.lock();
            st.services.clear();
            st.calls.push(Call::ClearServices);
        }

        fn close(&self) {
            let mut st = self.st.lock();
            st.open = false;
            st.calls.push(Call::Close);
        }

        fn set_name(&self, name: &str) -> StackResult {
            self.record(Call::SetName(name.to_owned()));
            Ok(())
        }

        fn is_multiple_advertisement_supported(&self) -> bool {
            self.multi_adv
        }

        fn start_advertising(&self, adv: &Advertisement, done: AdvCompletion) -> StackResult {
            let mut st = self.st.lock();
            st.done = Some(done);
            st.calls.push(Call::StartAdvertising(adv.clone()));
            Ok(())
        }

        fn stop_advertising(&self) {
            self.record(Call::StopAdvertising);
        }
    }
}
