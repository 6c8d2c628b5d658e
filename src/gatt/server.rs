use std::collections::BTreeSet;
use std::sync::Arc;

use base64::Engine;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::att::{ErrorCode, Status};
use crate::event::{Event, EventSender};
use crate::{DeviceHandle, Stack, Uuid};

use super::*;

/// GATT server request/response controller.
///
/// Platform stack callbacks enter through the `*_request` and
/// [`connection_state_changed`](Self::connection_state_changed) methods.
/// Characteristic reads and writes are recorded in the
/// [`PendingRequestStore`] and forwarded to the application as events. The
/// application completes them with [`respond`](Self::respond). Descriptor
/// requests are answered immediately.
#[derive(Debug)]
pub struct GattServer<S> {
    stack: Arc<S>,
    table: AttributeTable,
    pending: PendingRequestStore,
    subs: SubscriptionTracker,
    conns: Mutex<BTreeSet<DeviceHandle>>,
    events: EventSender,
}

impl<S: Stack> GattServer<S> {
    /// Creates a server with an empty attribute table.
    #[must_use]
    pub fn new(stack: Arc<S>, events: EventSender) -> Self {
        Self {
            stack,
            table: AttributeTable::new(),
            pending: PendingRequestStore::new(),
            subs: SubscriptionTracker::new(),
            conns: Mutex::default(),
            events,
        }
    }

    /// Returns the platform stack.
    #[inline(always)]
    #[must_use]
    pub fn stack(&self) -> &Arc<S> {
        &self.stack
    }

    /// Returns the attribute table.
    #[inline(always)]
    #[must_use]
    pub const fn table(&self) -> &AttributeTable {
        &self.table
    }

    /// Returns outstanding application requests.
    #[inline(always)]
    #[must_use]
    pub const fn pending(&self) -> &PendingRequestStore {
        &self.pending
    }

    /// Returns client subscriptions.
    #[inline(always)]
    #[must_use]
    pub const fn subscriptions(&self) -> &SubscriptionTracker {
        &self.subs
    }

    /// Returns the connected devices.
    #[must_use]
    pub fn connected_devices(&self) -> Vec<DeviceHandle> {
        self.conns.lock().iter().copied().collect()
    }

    /// Handles a connection state change. Disconnecting a device abandons all
    /// of its outstanding requests and subscriptions.
    pub fn connection_state_changed(&self, dev: DeviceHandle, status: u8, state: ConnState) {
        if status != 0 {
            warn!("Connection error {status:#04X} for {dev} ({state:?})");
        }
        let connected = match state {
            ConnState::Connected => {
                if !self.conns.lock().insert(dev) {
                    return;
                }
                info!("Connected: {dev}");
                true
            }
            ConnState::Disconnected => {
                let was_connected = self.conns.lock().remove(&dev);
                let n = self.pending.evict_device(dev);
                for (ch, _) in self.subs.remove_device(dev) {
                    self.unsubscribed(dev, ch, None);
                }
                if !was_connected && n == 0 {
                    debug!("Disconnected unknown {dev}");
                }
                info!("Disconnected: {dev}");
                false
            }
            _ => {
                debug!("{dev} is {state:?}");
                return;
            }
        };
        self.events.emit(Event::StateChanged {
            device: dev,
            connected,
            status,
        });
    }

    /// Handles a characteristic read request.
    pub fn characteristic_read_request(&self, req: ReadReq) {
        let Some(n) = self.table.update(req.target, |c| c.value.len()) else {
            warn!("Denied read of unknown {} from {}", req.target, req.dev);
            return self.send(Response::status(req.dev, req.id, Err(ErrorCode::InvalidHandle)));
        };
        if usize::from(req.offset) > n {
            warn!(
                "Denied read of {} at offset {} past length {n}",
                req.target, req.offset
            );
            return self.send(Response::status(req.dev, req.id, Err(ErrorCode::InvalidOffset)));
        }
        self.pending.record(PendingRequest::from(&req));
        self.events.emit(Event::ReadRequest {
            request_id: req.id,
            offset: req.offset,
            characteristic_uuid: req.target.characteristic,
            service_uuid: req.target.service,
        });
    }

    /// Handles a characteristic write request. The request is recorded even
    /// if the client does not expect a response, so that the application can
    /// still [`respond`](Self::respond) to update the stored value.
    pub fn characteristic_write_request(&self, req: WriteReq) {
        if self.table.update(req.target, |_| ()).is_none() {
            warn!("Denied write to unknown {} from {}", req.target, req.dev);
            if req.response_needed {
                self.send(Response::status(req.dev, req.id, Err(ErrorCode::InvalidHandle)));
            }
            return;
        }
        if req.prepared {
            trace!("Prepared write to {} at offset {}", req.target, req.offset);
        }
        self.pending.record(PendingRequest::from(&req));
        self.events.emit(Event::WriteRequest {
            request_id: req.id,
            offset: req.offset,
            value: base64::engine::general_purpose::STANDARD.encode(&req.value),
            characteristic_uuid: req.target.characteristic,
            service_uuid: req.target.service,
        });
    }

    /// Answers a descriptor read request. CCCD reads return the configuration
    /// of the requesting client.
    pub fn descriptor_read_request(&self, req: ReadReq<DescRef>) {
        let rsp = if req.offset != 0 {
            warn!("Denied read of {} at offset {}", req.target, req.offset);
            Response::status(req.dev, req.id, Err(ErrorCode::InvalidOffset))
        } else if let Some(d) = self.table.descriptor(req.target) {
            let value = if d.is_cccd() {
                let ch = req.target.characteristic.characteristic;
                self.subs.get(req.dev, ch).value().to_vec()
            } else {
                d.value
            };
            Response {
                value: Some(value),
                ..Response::status(req.dev, req.id, Ok(()))
            }
        } else {
            warn!("Denied read of unknown {} from {}", req.target, req.dev);
            Response::status(req.dev, req.id, Err(ErrorCode::InvalidHandle))
        };
        self.send(rsp);
    }

    /// Answers a descriptor write request. CCCD writes update the client
    /// subscription state.
    pub fn descriptor_write_request(&self, req: WriteReq<DescRef>) {
        let status = match self.table.descriptor(req.target) {
            None => {
                warn!("Denied write to unknown {} from {}", req.target, req.dev);
                Err(ErrorCode::InvalidHandle)
            }
            Some(d) if d.is_cccd() => self.cccd_write(&req),
            Some(_) => {
                self.table.set_descriptor_value(req.target, req.value.clone());
                Ok(())
            }
        };
        if req.response_needed {
            self.send(Response::status(req.dev, req.id, status));
        }
    }

    /// Validates and applies a Client Characteristic Configuration descriptor
    /// write ([Vol 3] Part G, Section 3.3.3.3).
    fn cccd_write(&self, req: &WriteReq<DescRef>) -> Status {
        let r = req.target.characteristic;
        let Some(props) = self.table.update(r, |c| c.props) else {
            return Err(ErrorCode::InvalidHandle);
        };
        if !props.can_subscribe() {
            warn!("Denied CCCD write to {r} without notify or indicate property");
            return Err(ErrorCode::RequestNotSupported);
        }
        let Ok(v) = <[u8; Cccd::LEN]>::try_from(req.value.as_slice()) else {
            warn!("Denied CCCD write to {r} with length {}", req.value.len());
            return Err(ErrorCode::InvalidAttributeValueLength);
        };
        let Some(cfg) = Cccd::from_value(v).filter(|c| c.is_supported_by(props)) else {
            warn!("Denied CCCD write of {v:02X?} to {r} with {props:?}");
            return Err(ErrorCode::RequestNotSupported);
        };
        self.table.set_descriptor_value(req.target, v.to_vec());
        let prev = self.subs.set(req.dev, r.characteristic, cfg);
        if cfg == prev {
            return Ok(());
        }
        debug!("{} CCCD for {r}: {prev:?} -> {cfg:?}", req.dev);
        if cfg.is_enabled() {
            self.events.emit(Event::Subscribed {
                device: req.dev,
                characteristic_uuid: r.characteristic,
                service_uuid: r.service,
                indicate: cfg == Cccd::Indicate,
            });
        } else {
            self.unsubscribed(req.dev, r.characteristic, Some(r.service));
        }
        Ok(())
    }

    /// Completes an outstanding request. If `value` is provided, it replaces
    /// the characteristic value. The response, if the client expects one,
    /// carries the stored value.
    pub fn respond(&self, id: RequestId, status: Status, value: Option<Vec<u8>>) -> Result<()> {
        let Some(req) = self.pending.take(id) else {
            warn!("Response to unknown {id:?}");
            return Err(Error::InvalidRequest(id));
        };
        let stored = self.table.update(req.target, |c| {
            if let Some(v) = value {
                c.value = v;
            }
            c.value.clone()
        });
        let Some(stored) = stored else {
            warn!("Dropped {id:?} for removed {}", req.target);
            self.abandon([req]);
            return Err(Error::InvalidRequest(id));
        };
        if !req.kind.response_needed() {
            trace!("{id:?} needs no response");
            return Ok(());
        }
        let mut rsp = Response {
            offset: req.offset,
            ..Response::status(req.dev, id, status)
        };
        match req.kind {
            RequestKind::Read => match req.slice(&stored) {
                Ok(v) => rsp.value = Some(v.to_vec()),
                Err(e) => {
                    warn!("Value of {} shrank below offset {}", req.target, req.offset);
                    rsp.status = Err(e);
                }
            },
            RequestKind::Write { .. } => rsp.value = Some(stored),
        }
        self.send(rsp);
        Ok(())
    }

    /// Updates a characteristic value and sends it to all connected
    /// subscribers. Returns the number of devices that the value was
    /// delivered to. Delivery failures are reported once as
    /// [`Error::TransmitQueueFull`] after all subscribers have been tried.
    pub fn notify(&self, ch: Uuid, value: Vec<u8>) -> Result<usize> {
        if self.table.is_empty() {
            return Err(Error::NoServicesRegistered);
        }
        let Some(r) = self.table.lookup_characteristic(ch) else {
            return Err(Error::CharacteristicNotFound(ch));
        };
        if !self.table.set_value(r, value.clone()) {
            return Err(Error::CharacteristicNotFound(ch));
        }
        let conns = self.conns.lock().clone();
        let (mut sent, mut failed) = (0, false);
        for (dev, cfg) in self.subs.subscribers(ch) {
            if !conns.contains(&dev) {
                continue;
            }
            let confirm = cfg == Cccd::Indicate;
            match (self.stack).notify_characteristic_changed(dev, r, &value, confirm) {
                Ok(()) => sent += 1,
                Err(e) => {
                    debug!("Notify error for {dev}: {e}");
                    failed = true;
                }
            }
        }
        if failed {
            return Err(Error::TransmitQueueFull);
        }
        trace!("Notified {sent} subscriber(s) of {r}");
        Ok(sent)
    }

    /// Validates and registers a service.
    #[inline]
    pub fn add_service(&self, d: &ServiceDescriptor) -> Result<()> {
        self.table.add_service(d)
    }

    /// Removes a service together with its subscriptions. Outstanding
    /// requests for its characteristics are answered with `InvalidHandle`.
    /// The service is also removed from the platform stack if it was
    /// published.
    pub fn remove_service(&self, uuid: Uuid) -> bool {
        let Some(svc) = self.table.remove_service(uuid) else {
            return false;
        };
        self.drop_subscriptions(&svc);
        self.abandon(self.pending.evict_service(uuid));
        if self.stack.has_service(uuid) {
            self.stack.remove_service(uuid);
        }
        true
    }

    /// Removes all services.
    pub fn remove_all_services(&self) {
        for svc in self.table.remove_all_services() {
            self.drop_subscriptions(&svc);
            self.abandon(self.pending.evict_service(svc.uuid));
        }
        if self.stack.is_server_open() {
            self.stack.clear_services();
        }
    }

    /// Publishes all registered services that the platform stack does not
    /// have yet, opening the server if necessary.
    pub(crate) fn publish(&self, uuids: &[Uuid]) -> crate::platform::StackResult {
        if !self.stack.is_server_open() {
            debug!("Opening GATT server");
            self.stack.open_server()?;
        }
        for uuid in uuids {
            if self.stack.has_service(*uuid) {
                continue;
            }
            if let Some(svc) = self.table.service(*uuid) {
                debug!("Publishing service {uuid}");
                self.stack.add_service(&svc)?;
            }
        }
        Ok(())
    }

    /// Abandons all requests, subscriptions, and connections, then clears and
    /// closes the platform server. Registered services are kept.
    pub fn close(&self) {
        let conns = std::mem::take(&mut *self.conns.lock());
        for dev in conns {
            self.pending.evict_device(dev);
            for (ch, _) in self.subs.remove_device(dev) {
                self.unsubscribed(dev, ch, None);
            }
        }
        self.subs.clear();
        self.stack.clear_services();
        self.stack.close();
        debug!("GATT server closed");
    }

    fn drop_subscriptions(&self, svc: &ServiceDef) {
        let chars: Vec<Uuid> = svc.characteristics.iter().map(|c| c.uuid).collect();
        for (dev, ch) in self.subs.remove_characteristics(&chars) {
            self.unsubscribed(dev, ch, Some(svc.uuid));
        }
    }

    /// Emits an unsubscribed event. The service is resolved through the table
    /// if not known.
    fn unsubscribed(&self, dev: DeviceHandle, ch: Uuid, svc: Option<Uuid>) {
        let Some(svc) = svc.or_else(|| self.table.lookup_characteristic(ch).map(|r| r.service))
        else {
            debug!("Subscription of {dev} to removed {ch:?} dropped");
            return;
        };
        self.events.emit(Event::Unsubscribed {
            device: dev,
            characteristic_uuid: ch,
            service_uuid: svc,
        });
    }

    /// Answers requests whose characteristic no longer exists.
    fn abandon(&self, reqs: impl IntoIterator<Item = PendingRequest>) {
        for r in reqs {
            if r.kind.response_needed() {
                debug!("Abandoning {:?} for removed {}", r.id, r.target);
                self.send(Response::status(r.dev, r.id, Err(ErrorCode::InvalidHandle)));
            }
        }
    }

    /// Sends a response. The request is retired even if the stack fails.
    fn send(&self, rsp: Response) {
        if let Err(e) = self.stack.send_response(&rsp) {
            warn!("Failed to send response to {:?} from {}: {e}", rsp.id, rsp.dev);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::event::EventReceiver;
    use crate::platform::mock::{Call, MockStack};
    use crate::{uuid16, Descriptor};

    use super::*;

    const DEV: DeviceHandle = DeviceHandle(1);

    struct Fixture {
        stack: Arc<MockStack>,
        srv: GattServer<MockStack>,
        rx: EventReceiver,
        ch: CharRef,
    }

    impl Fixture {
        fn new(props: &[&str]) -> Self {
            let stack = Arc::new(MockStack::default());
            let (tx, rx) = EventSender::channel();
            let srv = GattServer::new(Arc::clone(&stack), tx);
            srv.add_service(&ServiceDescriptor::new("1234").characteristic(
                CharacteristicDescriptor::new("5678", props, &["readable", "writeable"])
                    .value("aGk="),
            ))
            .unwrap();
            let ch = CharRef::new(uuid16(0x1234).as_uuid(), uuid16(0x5678).as_uuid());
            let mut f = Self { stack, srv, rx, ch };
            f.srv.connection_state_changed(DEV, 0, ConnState::Connected);
            f.events();
            f
        }

        fn events(&mut self) -> Vec<Event> {
            let mut v = Vec::new();
            while let Ok(e) = self.rx.try_recv() {
                v.push(e);
            }
            v
        }

        fn cccd(&self) -> DescRef {
            (self.ch).descriptor(Descriptor::ClientCharacteristicConfiguration.uuid())
        }

        fn read(&self, id: u32, offset: u16) {
            self.srv.characteristic_read_request(ReadReq {
                dev: DEV,
                id: RequestId(id),
                offset,
                target: self.ch,
            });
        }

        fn write_cccd(&self, id: u32, value: &[u8]) -> Status {
            self.srv.descriptor_write_request(WriteReq {
                dev: DEV,
                id: RequestId(id),
                target: self.cccd(),
                prepared: false,
                response_needed: true,
                offset: 0,
                value: value.to_vec(),
            });
            let rsp = self.stack.responses();
            assert_eq!(rsp.len(), 1);
            rsp[0].status
        }
    }

    #[test]
    fn read_respond() {
        let mut f = Fixture::new(&["read", "notify"]);
        f.read(1, 0);
        assert_eq!(
            f.events(),
            [Event::ReadRequest {
                request_id: RequestId(1),
                offset: 0,
                characteristic_uuid: f.ch.characteristic,
                service_uuid: f.ch.service,
            }]
        );
        assert!(f.stack.take().is_empty());
        f.srv.respond(RequestId(1), Ok(()), Some(b"hi".to_vec())).unwrap();
        assert_eq!(
            f.stack.responses(),
            [Response {
                dev: DEV,
                id: RequestId(1),
                status: Ok(()),
                offset: 0,
                value: Some(b"hi".to_vec()),
            }]
        );
        assert_eq!(
            f.srv.respond(RequestId(1), Ok(()), None),
            Err(Error::InvalidRequest(RequestId(1)))
        );
        assert!(f.stack.take().is_empty());
    }

    #[test]
    fn read_offset() {
        let mut f = Fixture::new(&["read"]);
        f.read(1, 3);
        assert!(f.events().is_empty());
        assert_eq!(
            f.stack.responses(),
            [Response::status(DEV, RequestId(1), Err(ErrorCode::InvalidOffset))]
        );
        assert!(f.srv.pending().is_empty());

        f.read(2, 1);
        assert_eq!(f.events().len(), 1);
        f.srv.respond(RequestId(2), Ok(()), None).unwrap();
        let rsp = f.stack.responses();
        assert_eq!(rsp[0].offset, 1);
        assert_eq!(rsp[0].value.as_deref(), Some(&b"i"[..]));
    }

    #[test]
    fn read_unknown() {
        let mut f = Fixture::new(&["read"]);
        f.srv.characteristic_read_request(ReadReq {
            dev: DEV,
            id: RequestId(9),
            offset: 0,
            target: CharRef::new(f.ch.service, uuid16(0x9999).as_uuid()),
        });
        assert!(f.events().is_empty());
        assert_eq!(
            f.stack.responses(),
            [Response::status(DEV, RequestId(9), Err(ErrorCode::InvalidHandle))]
        );
    }

    #[test]
    fn respond_failure_status() {
        let mut f = Fixture::new(&["read"]);
        f.read(1, 0);
        f.events();
        f.srv
            .respond(RequestId(1), Err(ErrorCode::UnlikelyError), None)
            .unwrap();
        let rsp = f.stack.responses();
        assert_eq!(rsp[0].status, Err(ErrorCode::UnlikelyError));
    }

    #[test]
    fn write_without_response() {
        let mut f = Fixture::new(&["writeWithoutResponse"]);
        f.srv.characteristic_write_request(WriteReq {
            dev: DEV,
            id: RequestId(4),
            target: f.ch,
            prepared: false,
            response_needed: false,
            offset: 0,
            value: b"42".to_vec(),
        });
        assert_eq!(
            f.events(),
            [Event::WriteRequest {
                request_id: RequestId(4),
                offset: 0,
                value: "NDI=".to_owned(),
                characteristic_uuid: f.ch.characteristic,
                service_uuid: f.ch.service,
            }]
        );
        assert!(f.srv.pending().contains(RequestId(4)));
        f.srv.respond(RequestId(4), Ok(()), Some(b"42".to_vec())).unwrap();
        assert!(f.stack.take().is_empty());
        assert_eq!(f.srv.table().value(f.ch).as_deref(), Some(&b"42"[..]));
    }

    #[test]
    fn write_with_response() {
        let f = Fixture::new(&["write"]);
        f.srv.characteristic_write_request(WriteReq {
            dev: DEV,
            id: RequestId(5),
            target: f.ch,
            prepared: false,
            response_needed: true,
            offset: 0,
            value: b"ok".to_vec(),
        });
        f.srv.respond(RequestId(5), Ok(()), Some(b"ok".to_vec())).unwrap();
        let rsp = f.stack.responses();
        assert_eq!(rsp[0].status, Ok(()));
        assert_eq!(rsp[0].value.as_deref(), Some(&b"ok"[..]));
    }

    #[test]
    fn descriptor_read() {
        let f = Fixture::new(&["read", "indicate"]);
        let req = |dev, id, offset| ReadReq {
            dev,
            id: RequestId(id),
            offset,
            target: f.cccd(),
        };
        f.srv.descriptor_read_request(req(DEV, 1, 0));
        f.srv.descriptor_read_request(req(DEV, 2, 1));
        let rsp = f.stack.responses();
        assert_eq!(rsp[0].status, Ok(()));
        assert_eq!(rsp[0].value.as_deref(), Some(&[0, 0][..]));
        assert_eq!(rsp[1].status, Err(ErrorCode::InvalidOffset));

        f.write_cccd(3, &[2, 0]).unwrap();
        f.srv.descriptor_read_request(req(DEV, 4, 0));
        f.srv.descriptor_read_request(req(DeviceHandle(2), 5, 0));
        let rsp = f.stack.responses();
        assert_eq!(rsp[0].value.as_deref(), Some(&[2, 0][..]));
        assert_eq!(rsp[1].value.as_deref(), Some(&[0, 0][..]));
        assert!(f.srv.pending().is_empty());
    }

    #[test]
    fn descriptor_write() {
        let mut f = Fixture::new(&["read"]);
        f.srv.add_service(&ServiceDescriptor::new("4321").characteristic(
            CharacteristicDescriptor::new("8765", &["read"], &["readable"]).description("x"),
        ))
        .unwrap();
        let d = CharRef::new(uuid16(0x4321).as_uuid(), uuid16(0x8765).as_uuid())
            .descriptor(Descriptor::CharacteristicUserDescription.uuid());
        f.srv.descriptor_write_request(WriteReq {
            dev: DEV,
            id: RequestId(1),
            target: d,
            prepared: false,
            response_needed: true,
            offset: 0,
            value: b"Name".to_vec(),
        });
        assert_eq!(
            f.stack.responses(),
            [Response::status(DEV, RequestId(1), Ok(()))]
        );
        assert_eq!(f.srv.table().descriptor(d).unwrap().value, b"Name");
        f.srv.descriptor_write_request(WriteReq {
            dev: DEV,
            id: RequestId(2),
            target: d,
            prepared: true,
            response_needed: true,
            offset: 2,
            value: b"me".to_vec(),
        });
        assert_eq!(
            f.stack.responses(),
            [Response::status(DEV, RequestId(2), Ok(()))]
        );
        assert!(f.events().is_empty());
    }

    #[test]
    fn cccd_requires_property() {
        let mut f = Fixture::new(&["read"]);
        assert_eq!(f.write_cccd(1, &[1, 0]), Err(ErrorCode::RequestNotSupported));
        assert_eq!(f.srv.subscriptions().get(DEV, f.ch.characteristic), Cccd::Disabled);
        assert!(f.events().is_empty());
    }

    #[test]
    fn cccd_length() {
        let f = Fixture::new(&["notify", "indicate"]);
        assert_eq!(f.write_cccd(1, &[1]), Err(ErrorCode::InvalidAttributeValueLength));
        assert_eq!(
            f.write_cccd(2, &[1, 0, 0]),
            Err(ErrorCode::InvalidAttributeValueLength)
        );
        let f = Fixture::new(&["read"]);
        assert_eq!(f.write_cccd(3, &[1]), Err(ErrorCode::RequestNotSupported));
    }

    #[test]
    fn cccd_subscribe() {
        let mut f = Fixture::new(&["read", "notify"]);
        let ch = f.ch.characteristic;
        assert_eq!(f.write_cccd(1, &[2, 0]), Err(ErrorCode::RequestNotSupported));
        assert_eq!(f.write_cccd(2, &[3, 0]), Err(ErrorCode::RequestNotSupported));
        assert_eq!(f.srv.subscriptions().get(DEV, ch), Cccd::Disabled);
        assert!(f.events().is_empty());

        assert_eq!(f.write_cccd(3, &[1, 0]), Ok(()));
        assert_eq!(f.srv.subscriptions().get(DEV, ch), Cccd::Notify);
        assert_eq!(f.srv.table().descriptor(f.cccd()).unwrap().value, [1, 0]);
        assert_eq!(
            f.events(),
            [Event::Subscribed {
                device: DEV,
                characteristic_uuid: ch,
                service_uuid: f.ch.service,
                indicate: false,
            }]
        );
        assert_eq!(f.write_cccd(4, &[1, 0]), Ok(()));
        assert!(f.events().is_empty());

        assert_eq!(f.write_cccd(5, &[0, 0]), Ok(()));
        assert_eq!(f.srv.subscriptions().get(DEV, ch), Cccd::Disabled);
        assert_eq!(
            f.events(),
            [Event::Unsubscribed {
                device: DEV,
                characteristic_uuid: ch,
                service_uuid: f.ch.service,
            }]
        );
        assert!(f.srv.pending().is_empty());
    }

    #[test]
    fn disconnect_evicts() {
        let mut f = Fixture::new(&["read", "notify"]);
        let other = DeviceHandle(2);
        f.srv.connection_state_changed(other, 0, ConnState::Connected);
        f.write_cccd(1, &[1, 0]).unwrap();
        f.read(2, 0);
        f.srv.characteristic_read_request(ReadReq {
            dev: other,
            id: RequestId(3),
            offset: 0,
            target: f.ch,
        });
        f.events();

        f.srv.connection_state_changed(DEV, 0x13, ConnState::Disconnected);
        assert_eq!(
            f.events(),
            [
                Event::Unsubscribed {
                    device: DEV,
                    characteristic_uuid: f.ch.characteristic,
                    service_uuid: f.ch.service,
                },
                Event::StateChanged {
                    device: DEV,
                    connected: false,
                    status: 0x13,
                },
            ]
        );
        assert_eq!(f.srv.connected_devices(), [other]);
        assert_eq!(
            f.srv.respond(RequestId(2), Ok(()), None),
            Err(Error::InvalidRequest(RequestId(2)))
        );
        assert!(f.srv.pending().contains(RequestId(3)));
        assert_eq!(f.srv.subscriptions().get(DEV, f.ch.characteristic), Cccd::Disabled);
    }

    #[test]
    fn notify() {
        let mut f = Fixture::new(&["read", "notify", "indicate"]);
        let ch = f.ch.characteristic;
        assert_eq!(f.srv.notify(ch, b"42".to_vec()), Ok(0));
        assert_eq!(f.srv.table().value(f.ch).as_deref(), Some(&b"42"[..]));

        f.write_cccd(1, &[2, 0]).unwrap();
        let other = DeviceHandle(2);
        f.srv.connection_state_changed(other, 0, ConnState::Connected);
        f.srv.subscriptions().set(other, ch, Cccd::Notify);
        f.srv.subscriptions().set(DeviceHandle(3), ch, Cccd::Notify);
        f.events();
        assert_eq!(f.srv.notify(ch, b"7".to_vec()), Ok(2));
        assert_eq!(
            f.stack.take(),
            [
                Call::Notify {
                    dev: DEV,
                    ch: f.ch,
                    value: b"7".to_vec(),
                    confirm: true,
                },
                Call::Notify {
                    dev: other,
                    ch: f.ch,
                    value: b"7".to_vec(),
                    confirm: false,
                },
            ]
        );

        f.stack.fail_notify.lock().insert(DEV);
        assert_eq!(f.srv.notify(ch, b"8".to_vec()), Err(Error::TransmitQueueFull));
        assert_eq!(f.stack.take().len(), 1);

        assert_eq!(
            f.srv.notify(uuid16(0x9999).as_uuid(), vec![]),
            Err(Error::CharacteristicNotFound(uuid16(0x9999).as_uuid()))
        );
        f.srv.remove_all_services();
        assert_eq!(f.srv.notify(ch, vec![]), Err(Error::NoServicesRegistered));
    }

    #[test]
    fn remove_service_stale_request() {
        let mut f = Fixture::new(&["read", "notify"]);
        f.write_cccd(1, &[1, 0]).unwrap();
        f.read(2, 0);
        f.events();
        assert!(f.srv.remove_service(f.ch.service));
        assert!(!f.srv.remove_service(f.ch.service));
        assert_eq!(
            f.events(),
            [Event::Unsubscribed {
                device: DEV,
                characteristic_uuid: f.ch.characteristic,
                service_uuid: f.ch.service,
            }]
        );
        assert_eq!(
            f.stack.responses(),
            [Response::status(DEV, RequestId(2), Err(ErrorCode::InvalidHandle))]
        );
        assert!(f.srv.pending().is_empty());
        assert_eq!(
            f.srv.respond(RequestId(2), Ok(()), None),
            Err(Error::InvalidRequest(RequestId(2)))
        );
        assert!(f.stack.take().is_empty());
    }

    #[test]
    fn remove_all_services_answers_requests() {
        let mut f = Fixture::new(&["read", "write", "writeWithoutResponse"]);
        f.read(1, 0);
        for (id, response_needed) in [(2, true), (3, false)] {
            f.srv.characteristic_write_request(WriteReq {
                dev: DEV,
                id: RequestId(id),
                target: f.ch,
                prepared: false,
                response_needed,
                offset: 0,
                value: b"x".to_vec(),
            });
        }
        f.events();
        f.srv.remove_all_services();
        let mut rsp = f.stack.responses();
        rsp.sort_by_key(|r| r.id.0);
        assert_eq!(
            rsp,
            [
                Response::status(DEV, RequestId(1), Err(ErrorCode::InvalidHandle)),
                Response::status(DEV, RequestId(2), Err(ErrorCode::InvalidHandle)),
            ]
        );
        assert!(f.srv.pending().is_empty());
    }

    #[test]
    fn respond_after_table_change() {
        let mut f = Fixture::new(&["read"]);
        f.read(1, 0);
        f.events();
        assert!(f.srv.table().remove_service(f.ch.service).is_some());
        assert_eq!(
            f.srv.respond(RequestId(1), Ok(()), None),
            Err(Error::InvalidRequest(RequestId(1)))
        );
        assert_eq!(
            f.stack.responses(),
            [Response::status(DEV, RequestId(1), Err(ErrorCode::InvalidHandle))]
        );
    }

    #[test]
    fn respond_races_disconnect() {
        let mut f = Fixture::new(&["read"]);
        for round in 0..100 {
            f.read(round, 0);
            let (ok, evicted) = std::thread::scope(|sc| {
                let srv = &f.srv;
                let responders: Vec<_> = (0..4)
                    .map(|_| sc.spawn(move || srv.respond(RequestId(round), Ok(()), None).is_ok()))
                    .collect();
                let evict = sc.spawn(move || srv.pending().evict_device(DEV));
                let ok = (responders.into_iter())
                    .map(|h| h.join())
                    .filter(|r| matches!(r, Ok(true)))
                    .count();
                (ok, evict.join().unwrap())
            });
            assert_eq!(ok + evicted, 1, "round {round}");
            assert_eq!(f.stack.responses().len(), ok);
        }
        assert!(f.srv.pending().is_empty());
        f.events();
    }

    #[test]
    fn publish_and_close() {
        let f = Fixture::new(&["read"]);
        f.srv.publish(&[f.ch.service]).unwrap();
        f.srv.publish(&[f.ch.service]).unwrap();
        assert_eq!(
            f.stack.take(),
            [Call::OpenServer, Call::AddService(f.ch.service)]
        );
        f.srv.close();
        assert!(!f.stack.open());
        assert!(f.srv.connected_devices().is_empty());
        assert!(f.srv.table().contains(f.ch.service));
    }
}
