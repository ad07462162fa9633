//! Demo wiring of the reconciliation core
//!
//! Builds the service against the in-memory adapters and the dry-run
//! southbound driver, replays a small provisioning scenario and prints the
//! resulting state. Pass a config file path as the first argument to
//! override the defaults.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use olt_control::adapters::{
    DryRunProgrammer, LocalSubscriberRegistry, NoHosts, SingleNodeCluster, StaticInventory,
};
use olt_control::config::OltConfig;
use olt_control::domain::value_objects::{
    BandwidthProfileInformation, ConnectPoint, DeviceId, PortNumber,
    SubscriberAndDeviceInformation, UniTagInformation, VlanId,
};
use olt_control::listener::DeviceEvent;
use olt_control::service::AccessDeviceService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => OltConfig::load(Some(Path::new(&path)))?,
        None => OltConfig::default(),
    };

    let device = DeviceId::from("of:00000a0a0a0a0a0a");
    let inventory = Arc::new(StaticInventory::new());
    inventory.add_device(device.clone(), "OLT-001");
    inventory.add_port(&device, PortNumber::new(2), "nni-2", true);
    inventory.add_port(&device, PortNumber::new(16), "BBSM0001-1", true);

    let sadis = Arc::new(LocalSubscriberRegistry::new());
    sadis.add_subscriber(SubscriberAndDeviceInformation {
        id: "OLT-001".to_string(),
        uplink_port: Some(2),
        uni_tag_list: Vec::new(),
    });
    sadis.add_subscriber(SubscriberAndDeviceInformation {
        id: "BBSM0001-1".to_string(),
        uplink_port: None,
        uni_tag_list: vec![UniTagInformation {
            pon_c_tag: VlanId::new(101),
            pon_s_tag: VlanId::new(7),
            uni_tag_match: VlanId::ANY,
            technology_profile_id: 64,
            is_dhcp_required: true,
            upstream_bandwidth_profile: Some("HSIA-US".to_string()),
            downstream_bandwidth_profile: Some("HSIA-DS".to_string()),
            service_name: "HSIA".to_string(),
            ..UniTagInformation::default()
        }],
    });
    for (id, rate) in [("Default", 1_000_000), ("HSIA-US", 100_000), ("HSIA-DS", 500_000)] {
        sadis.add_bandwidth_profile(BandwidthProfileInformation {
            id: id.to_string(),
            committed_information_rate: rate,
            committed_burst_size: 30,
            exceeded_information_rate: rate * 2,
            exceeded_burst_size: 30,
            assured_information_rate: 0,
        });
    }

    let service = AccessDeviceService::builder()
        .config(config)
        .programmer(Arc::new(DryRunProgrammer::new()))
        .subscribers(sadis)
        .hosts(Arc::new(NoHosts))
        .inventory(inventory)
        .cluster(Arc::new(SingleNodeCluster::new("local")))
        .build()?;

    let mut events = service.subscribe_events();
    let device_events = service.device_event_sender();
    device_events.send(DeviceEvent::DeviceAdded {
        device: device.clone(),
    })?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let uni = ConnectPoint::new(device.clone(), PortNumber::new(16));
    service.provision_subscriber(uni.clone()).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    info!("programmed subscribers:");
    for key in service.programmed_subscribers() {
        info!("  {key}");
    }
    info!("connect-point status:");
    for (key, status) in service.connect_point_status() {
        info!(
            "  {key}: eapol={} subscriber={} dhcp={}",
            status.default_eapol_status, status.subscriber_flows_status, status.dhcp_status
        );
    }
    while let Ok(event) = events.try_recv() {
        info!(kind = event.event.event_type(), time = %event.time, "event");
    }

    service.remove_subscriber(uni).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("subscriber removed; demo complete");
    Ok(())
}
