//! Runs the peripheral against a loopback stack that logs every outbound call
//! and plays the role of a single central.

#![allow(unused_crate_dependencies)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::Parser;
use tracing::{info, warn};

use gatt_peripheral::gap::{AdvCompletion, AdvertiseConfig, Advertisement};
use gatt_peripheral::gatt::{
    CharRef, CharacteristicDescriptor, ConnState, ReadReq, RequestId, Response, ServiceDef,
    ServiceDescriptor, WriteReq,
};
use gatt_peripheral::*;

#[derive(Clone, Debug, clap::Parser)]
struct Args {
    /// Advertised device name.
    #[arg(short, long, default_value = "Loopback")]
    name: String,

    /// Service UUID.
    #[arg(short, long, default_value = "180F")]
    service: Uuid,

    /// Characteristic UUID.
    #[arg(short, long, default_value = "2A19")]
    characteristic: Uuid,

    /// Number of notifications to send.
    #[arg(long, default_value_t = 3)]
    count: u8,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let (p, mut events) = Peripheral::new(Arc::new(LoopbackStack));
    let p = Arc::new(p);
    info!("Adapter state: {:?}", p.state());

    p.add_service(&ServiceDescriptor::new(args.service.to_string()).characteristic(
        CharacteristicDescriptor::new(
            args.characteristic.to_string(),
            &["read", "write", "notify"],
            &["readable", "writeable"],
        )
        .value(BASE64.encode([100]))
        .description("Battery Level"),
    ))?;
    (p.start_advertising(&AdvertiseConfig::new(&args.name, vec![args.service]))).await?;

    // Application side: answer requests as they arrive.
    let app = {
        let p = Arc::clone(&p);
        tokio::spawn(async move {
            while let Some(e) = events.recv().await {
                info!("Event: {}", serde_json::to_string(&e).unwrap_or_default());
                let r = match e {
                    Event::ReadRequest { request_id, .. } => {
                        p.respond(request_id, "success", None)
                    }
                    Event::WriteRequest {
                        request_id, value, ..
                    } => p.respond(request_id, "success", Some(&value)),
                    _ => Ok(()),
                };
                if let Err(e) = r {
                    warn!("Respond failed: {e} ({})", e.code());
                }
            }
        })
    };

    // Central side.
    let dev = DeviceHandle(1);
    let srv = p.server();
    let ch = CharRef::new(args.service, args.characteristic);
    srv.connection_state_changed(dev, 0, ConnState::Connected);
    srv.descriptor_write_request(WriteReq {
        dev,
        id: RequestId(1),
        target: ch.descriptor(Descriptor::ClientCharacteristicConfiguration.uuid()),
        prepared: false,
        response_needed: true,
        offset: 0,
        value: vec![0x01, 0x00],
    });
    srv.characteristic_read_request(ReadReq {
        dev,
        id: RequestId(2),
        offset: 0,
        target: ch,
    });
    srv.characteristic_write_request(WriteReq {
        dev,
        id: RequestId(3),
        target: ch,
        prepared: false,
        response_needed: true,
        offset: 0,
        value: vec![90],
    });

    let mut level = 90_u8;
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    for _ in 0..args.count {
        tokio::select! {
            _ = tick.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        level = level.saturating_sub(5);
        p.notify(&args.characteristic.to_string(), &BASE64.encode([level]))?;
    }

    srv.connection_state_changed(dev, 0x13, ConnState::Disconnected);
    p.stop_advertising();
    tokio::task::yield_now().await;
    app.abort();
    Ok(())
}

/// Stack that logs outbound calls and completes advertising immediately.
#[derive(Debug)]
struct LoopbackStack;

impl Stack for LoopbackStack {
    fn send_response(&self, rsp: &Response) -> StackResult {
        info!(
            "Response to {:?}: status={:#04X} offset={} value={:02X?}",
            rsp.id,
            att::status_code(rsp.status),
            rsp.offset,
            rsp.value
        );
        Ok(())
    }

    fn notify_characteristic_changed(
        &self,
        dev: DeviceHandle,
        ch: CharRef,
        value: &[u8],
        confirm: bool,
    ) -> StackResult {
        let op = if confirm { "Indicate" } else { "Notify" };
        info!("{op} {dev} {ch}: {value:02X?}");
        Ok(())
    }

    fn open_server(&self) -> StackResult {
        info!("Open GATT server");
        Ok(())
    }

    fn is_server_open(&self) -> bool {
        false
    }

    fn add_service(&self, svc: &ServiceDef) -> StackResult {
        info!(
            "Add service {} with {} characteristic(s)",
            svc.uuid,
            svc.characteristics.len()
        );
        Ok(())
    }

    fn has_service(&self, _: Uuid) -> bool {
        false
    }

    fn remove_service(&self, uuid: Uuid) {
        info!("Remove service {uuid}");
    }

    fn clear_services(&self) {
        info!("Clear services");
    }

    fn close(&self) {
        info!("Close GATT server");
    }

    fn set_name(&self, name: &str) -> StackResult {
        info!("Adapter name: {name:?}");
        Ok(())
    }

    fn is_multiple_advertisement_supported(&self) -> bool {
        true
    }

    fn start_advertising(&self, adv: &Advertisement, done: AdvCompletion) -> StackResult {
        let data = adv.data.encode().unwrap_or_default();
        let scan = adv.scan_response.encode().unwrap_or_default();
        info!("Advertising data: {data:02X?}, scan response: {scan:02X?}");
        done.complete(Ok(()));
        Ok(())
    }

    fn stop_advertising(&self) {
        info!("Stop advertising");
    }
}
