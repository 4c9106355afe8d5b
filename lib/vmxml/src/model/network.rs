// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vmxml_types::DeviceAddress;

/// A virtual NIC of a VM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmNetworkInterface {
    pub id: Uuid,
    pub vm_id: Uuid,
    #[serde(default)]
    pub name: String,
    pub mac_address: String,
    #[serde(default = "yes")]
    pub linked: bool,
    #[serde(default = "yes")]
    pub plugged: bool,
    #[serde(default)]
    pub vnic_profile_id: Option<Uuid>,
    /// Name of the logical network behind the profile.
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub iface_type: Option<VmInterfaceType>,
}

fn yes() -> bool {
    true
}

/// The emulated NIC model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmInterfaceType {
    Rtl8139,
    E1000,
    Pv,
    SpaprVlan,
    PciPassthrough,
}

impl VmInterfaceType {
    /// The libvirt model name.
    pub fn model(&self) -> &'static str {
        match self {
            VmInterfaceType::Rtl8139 => "rtl8139",
            VmInterfaceType::E1000 => "e1000",
            VmInterfaceType::Pv => "virtio",
            VmInterfaceType::SpaprVlan => "spapr-vlan",
            VmInterfaceType::PciPassthrough => "pci-passthrough",
        }
    }
}

/// A vNIC profile: the network a NIC attaches to and the policies applied
/// on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnicProfile {
    pub id: Uuid,
    pub network_id: Uuid,
    #[serde(default)]
    pub network_filter_id: Option<Uuid>,
    #[serde(default)]
    pub qos: Option<NetworkQos>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: Uuid,
    pub name: String,
    /// The bridge name used on hosts.
    pub vdsm_name: String,
    #[serde(default)]
    pub vlan_id: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkFilter {
    pub id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterParameter {
    pub name: String,
    pub value: String,
}

/// Bandwidth shaping for a vNIC profile, already in libvirt units
/// (average and peak in KiB/s, burst in KiB).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkQos {
    #[serde(default)]
    pub inbound: Option<BandwidthLimit>,
    #[serde(default)]
    pub outbound: Option<BandwidthLimit>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandwidthLimit {
    pub average: u64,
    pub burst: u64,
    pub peak: u64,
}

/// A physical device on a host, keyed by its name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDevice {
    pub device_name: String,
    #[serde(flatten)]
    pub capability: HostDeviceCapability,
}

/// A host device's capability class, carrying the address fields that
/// class requires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum HostDeviceCapability {
    Pci { domain: String, bus: String, slot: String, function: String },
    #[serde(alias = "usb_device")]
    Usb { bus: String, device: String },
    Scsi { host: String, bus: String, target: String, lun: String },
    #[serde(other)]
    Unsupported,
}

impl HostDeviceCapability {
    /// The `source` address of the device in a `hostdev` element.
    pub fn source_address(&self) -> Option<DeviceAddress> {
        match self {
            HostDeviceCapability::Pci { domain, bus, slot, function } => Some(
                DeviceAddress::new()
                    .with("domain", domain)
                    .with("bus", bus)
                    .with("slot", slot)
                    .with("function", function),
            ),
            HostDeviceCapability::Usb { bus, device } => Some(
                DeviceAddress::new().with("bus", bus).with("device", device),
            ),
            HostDeviceCapability::Scsi { bus, target, lun, .. } => Some(
                DeviceAddress::new()
                    .with("bus", bus)
                    .with("target", target)
                    .with("unit", lun),
            ),
            HostDeviceCapability::Unsupported => None,
        }
    }
}
