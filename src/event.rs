//! Events delivered to the application runtime.

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::gatt::RequestId;
use crate::{DeviceHandle, Uuid};

/// Application event. Serialized with the event name in the `type` field and
/// all other fields in camel case.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum Event {
    /// Characteristic read awaiting [`respond`](crate::Peripheral::respond).
    #[serde(rename_all = "camelCase")]
    ReadRequest {
        request_id: RequestId,
        offset: u16,
        characteristic_uuid: Uuid,
        service_uuid: Uuid,
    },
    /// Characteristic write. The value is Base64-encoded.
    #[serde(rename_all = "camelCase")]
    WriteRequest {
        request_id: RequestId,
        offset: u16,
        value: String,
        characteristic_uuid: Uuid,
        service_uuid: Uuid,
    },
    /// Central connection state change.
    #[serde(rename_all = "camelCase")]
    StateChanged {
        device: DeviceHandle,
        connected: bool,
        status: u8,
    },
    /// Central enabled notifications or indications.
    #[serde(rename_all = "camelCase")]
    Subscribed {
        device: DeviceHandle,
        characteristic_uuid: Uuid,
        service_uuid: Uuid,
        indicate: bool,
    },
    /// Central disabled notifications and indications or disconnected.
    #[serde(rename_all = "camelCase")]
    Unsubscribed {
        device: DeviceHandle,
        characteristic_uuid: Uuid,
        service_uuid: Uuid,
    },
}

impl Event {
    pub const READ_REQUEST: &'static str = "READ_REQUEST";
    pub const WRITE_REQUEST: &'static str = "WRITE_REQUEST";
    pub const STATE_CHANGED: &'static str = "STATE_CHANGED";
    pub const SUBSCRIBED: &'static str = "SUBSCRIBED";
    pub const UNSUBSCRIBED: &'static str = "UNSUBSCRIBED";

    /// Returns the event name used by the application runtime.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match *self {
            Self::ReadRequest { .. } => Self::READ_REQUEST,
            Self::WriteRequest { .. } => Self::WRITE_REQUEST,
            Self::StateChanged { .. } => Self::STATE_CHANGED,
            Self::Subscribed { .. } => Self::SUBSCRIBED,
            Self::Unsubscribed { .. } => Self::UNSUBSCRIBED,
        }
    }
}

/// Receiving half of the event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Sending half of the event channel.
#[derive(Clone, Debug)]
pub struct EventSender(mpsc::UnboundedSender<Event>);

impl EventSender {
    /// Creates a new event channel.
    #[must_use]
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Delivers an event. Events are dropped once the receiver is closed.
    pub fn emit(&self, e: Event) {
        trace!("{e:?}");
        if let Err(mpsc::error::SendError(e)) = self.0.send(e) {
            debug!("Dropped {} event (receiver closed)", e.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::uuid16;

    use super::*;

    #[test]
    fn serialize() {
        let e = Event::ReadRequest {
            request_id: RequestId(3),
            offset: 0,
            characteristic_uuid: uuid16(0x5678).as_uuid(),
            service_uuid: uuid16(0x1234).as_uuid(),
        };
        assert_eq!(e.name(), Event::READ_REQUEST);
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({
                "type": "READ_REQUEST",
                "requestId": "3",
                "offset": 0,
                "characteristicUuid": "00005678-0000-1000-8000-00805f9b34fb",
                "serviceUuid": "00001234-0000-1000-8000-00805f9b34fb",
            })
        );

        let e = Event::StateChanged {
            device: DeviceHandle(7),
            connected: true,
            status: 0,
        };
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"type": "STATE_CHANGED", "device": 7, "connected": true, "status": 0})
        );
    }

    #[test]
    fn closed_receiver() {
        let (tx, rx) = EventSender::channel();
        drop(rx);
        tx.emit(Event::StateChanged {
            device: DeviceHandle(1),
            connected: false,
            status: 0,
        });
    }
}
