// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Network interfaces.

use slog::{warn, Logger};

use super::{write_address, write_boot_order, Result};
use crate::classify::InterfaceKind;
use crate::document::DocumentWriter;
use crate::model::{
    BandwidthLimit, Device, FilterParameter, Network, NetworkFilter,
    VirtualMachine, VmInterfaceType, VmNetworkInterface, VnicProfile,
};

/// Profile-derived data of a NIC, resolved by the builder.
#[derive(Clone, Debug)]
pub(crate) struct NicBacking {
    pub profile: VnicProfile,
    pub network: Option<Network>,
    pub filter: Option<NetworkFilter>,
    pub filter_parameters: Vec<FilterParameter>,
}

/// The vhost setting for `network` from the VM `vhost` custom property,
/// written as `net1:true,net2:false`. `true` selects the in-kernel
/// `vhost` backend and `false` the userspace `qemu` one.
pub(crate) fn driver_name(
    log: &Logger,
    vm: &VirtualMachine,
    network: &str,
) -> Option<&'static str> {
    let setting = vm.custom_property("vhost")?;
    let (_, status) = setting
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.splitn(2, ':');
            Some((parts.next()?.trim(), parts.next().unwrap_or("").trim()))
        })
        .find(|(name, _)| *name == network)?;

    if status.eq_ignore_ascii_case("true") {
        Some("vhost")
    } else if status.eq_ignore_ascii_case("false") {
        Some("qemu")
    } else {
        warn!(log, "invalid vhost setting";
            "network" => network, "value" => status);
        None
    }
}

fn write_bandwidth_limit(
    w: &mut DocumentWriter,
    name: &str,
    limit: &BandwidthLimit,
) -> Result {
    w.element_with_attrs(
        name,
        [
            ("average", limit.average),
            ("burst", limit.burst),
            ("peak", limit.peak),
        ],
    )
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn write_interface(
    w: &mut DocumentWriter,
    log: &Logger,
    vm: &VirtualMachine,
    device: &Device,
    kind: InterfaceKind,
    nic: &VmNetworkInterface,
    backing: Option<&NicBacking>,
    boot_order: u32,
) -> Result {
    let network = backing.and_then(|b| b.network.as_ref());

    w.start_element("interface")?;
    match kind {
        InterfaceKind::Bridge => {
            w.attribute("type", "bridge")?;
            let model = nic.iface_type.unwrap_or(VmInterfaceType::Rtl8139);
            w.element_with_attrs("model", [("type", model.model())])?;
            let state = if nic.linked { "up" } else { "down" };
            w.element_with_attrs("link", [("state", state)])?;
            if let Some(network) = network {
                w.element_with_attrs(
                    "source",
                    [("bridge", network.vdsm_name.as_str())],
                )?;
            }

            let queues = backing
                .and_then(|b| b.profile.custom_properties.get("queues"));
            let mut name = nic
                .network_name
                .as_deref()
                .and_then(|net| driver_name(log, vm, net));
            if queues.is_some() || name.is_some() {
                w.start_element("driver")?;
                if let Some(queues) = queues {
                    w.attribute("queues", queues)?;
                    name = name.or(Some("vhost"));
                }
                if let Some(name) = name {
                    w.attribute("name", name)?;
                }
                w.end_element()?;
            }
        }
        InterfaceKind::HostDev => {
            w.attribute("type", "hostdev")?;
            w.attribute("managed", "no")?;
            w.element_with_attrs("driver", [("name", "vfio")])?;
            if let Some(vlan) = network.and_then(|n| n.vlan_id) {
                w.start_element("vlan")?;
                w.element_with_attrs("tag", [("id", vlan)])?;
                w.end_element()?;
            }
        }
    }

    write_address(w, &device.address)?;
    write_boot_order(w, boot_order)?;
    w.element_with_attrs("mac", [("address", nic.mac_address.as_str())])?;

    if let Some(b) = backing {
        if let Some(filter) = &b.filter {
            w.start_element("filterref")?;
            w.attribute("filter", &filter.name)?;
            for param in &b.filter_parameters {
                w.element_with_attrs(
                    "parameter",
                    [("name", &param.name), ("value", &param.value)],
                )?;
            }
            w.end_element()?;
        }
    }

    if let Some(sndbuf) = vm.custom_property("sndbuf") {
        w.start_element("tune")?;
        w.element("sndbuf", sndbuf)?;
        w.end_element()?;
    }

    w.start_element("bandwidth")?;
    if let Some(qos) = backing.and_then(|b| b.profile.qos.as_ref()) {
        if let Some(inbound) = &qos.inbound {
            write_bandwidth_limit(w, "inbound", inbound)?;
        }
        if let Some(outbound) = &qos.outbound {
            write_bandwidth_limit(w, "outbound", outbound)?;
        }
    }
    w.end_element()?;

    w.end_element()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::test_util::render;
    use crate::model::{DeviceGeneralType, DeviceId, NetworkQos};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    const VM_ID: Uuid = Uuid::from_u128(0x100);
    const NIC_ID: Uuid = Uuid::from_u128(0x200);

    fn logger() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn vm(props: &[(&str, &str)]) -> VirtualMachine {
        let mut vm: VirtualMachine = serde_json::from_value(serde_json::json!({
            "id": VM_ID,
            "name": "vm0",
            "cluster_id": "00000000-0000-0000-0000-0000000000c1",
            "mem_size_mb": 1024,
            "max_memory_size_mb": 1024,
            "num_of_sockets": 1,
            "cpu_per_socket": 1,
            "threads_per_cpu": 1,
            "arch": "x86_64",
            "compatibility_version": "4.1",
            "os_id": 0,
        }))
        .unwrap();
        vm.custom_properties = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vm
    }

    fn nic() -> VmNetworkInterface {
        VmNetworkInterface {
            id: NIC_ID,
            vm_id: VM_ID,
            name: "nic1".into(),
            mac_address: "00:1a:4a:16:01:51".into(),
            linked: true,
            plugged: true,
            vnic_profile_id: Some(Uuid::from_u128(0x300)),
            network_name: Some("ovirtmgmt".into()),
            iface_type: Some(VmInterfaceType::Pv),
        }
    }

    fn backing(queues: Option<&str>) -> NicBacking {
        let mut custom_properties = BTreeMap::new();
        if let Some(q) = queues {
            custom_properties.insert("queues".to_string(), q.to_string());
        }
        NicBacking {
            profile: VnicProfile {
                id: Uuid::from_u128(0x300),
                network_id: Uuid::from_u128(0x400),
                network_filter_id: None,
                qos: None,
                custom_properties,
            },
            network: Some(Network {
                id: Uuid::from_u128(0x400),
                name: "ovirtmgmt".into(),
                vdsm_name: "ovirtmgmt".into(),
                vlan_id: Some(100),
            }),
            filter: None,
            filter_parameters: vec![],
        }
    }

    fn device(name: &str) -> Device {
        let id = DeviceId::new(NIC_ID, VM_ID);
        Device::new(id, DeviceGeneralType::Interface, name)
    }

    #[test]
    fn vhost_property_parsing() {
        let log = logger();
        let vm = vm(&[("vhost", "ovirtmgmt:true,display:false,bad:maybe")]);
        assert_eq!(driver_name(&log, &vm, "ovirtmgmt"), Some("vhost"));
        assert_eq!(driver_name(&log, &vm, "display"), Some("qemu"));
        assert_eq!(driver_name(&log, &vm, "bad"), None);
        assert_eq!(driver_name(&log, &vm, "other"), None);
        assert_eq!(driver_name(&log, &self::vm(&[]), "ovirtmgmt"), None);
    }

    #[test]
    fn bridge_interface() {
        let vm = vm(&[("sndbuf", "0")]);
        let mut backing = backing(Some("4"));
        backing.profile.qos = Some(NetworkQos {
            inbound: Some(BandwidthLimit { average: 10, burst: 20, peak: 30 }),
            outbound: None,
        });
        backing.filter = Some(NetworkFilter {
            id: Uuid::from_u128(0x500),
            name: "vdsm-no-mac-spoofing".into(),
        });
        backing.filter_parameters = vec![FilterParameter {
            name: "IP".into(),
            value: "10.0.0.1".into(),
        }];
        let dev = device("bridge");
        let out = render(|w| {
            write_interface(
                w,
                &logger(),
                &vm,
                &dev,
                InterfaceKind::Bridge,
                &nic(),
                Some(&backing),
                2,
            )
        });
        assert_eq!(
            out,
            "<interface type=\"bridge\"><model type=\"virtio\"/>\
             <link state=\"up\"/><source bridge=\"ovirtmgmt\"/>\
             <driver queues=\"4\" name=\"vhost\"/><boot order=\"2\"/>\
             <mac address=\"00:1a:4a:16:01:51\"/>\
             <filterref filter=\"vdsm-no-mac-spoofing\">\
             <parameter name=\"IP\" value=\"10.0.0.1\"/></filterref>\
             <tune><sndbuf>0</sndbuf></tune><bandwidth>\
             <inbound average=\"10\" burst=\"20\" peak=\"30\"/></bandwidth>\
             </interface>"
        );
    }

    #[test]
    fn hostdev_interface_with_vlan() {
        let vm = vm(&[]);
        let dev = device("hostdev");
        let out = render(|w| {
            write_interface(
                w,
                &logger(),
                &vm,
                &dev,
                InterfaceKind::HostDev,
                &nic(),
                Some(&backing(None)),
                0,
            )
        });
        assert_eq!(
            out,
            "<interface type=\"hostdev\" managed=\"no\">\
             <driver name=\"vfio\"/><vlan><tag id=\"100\"/></vlan>\
             <mac address=\"00:1a:4a:16:01:51\"/><bandwidth/></interface>"
        );
    }

    #[test]
    fn missing_profile_skips_profile_parts() {
        let vm = vm(&[]);
        let mut nic = nic();
        nic.iface_type = None;
        nic.linked = false;
        let dev = device("bridge");
        let out = render(|w| {
            write_interface(
                w,
                &logger(),
                &vm,
                &dev,
                InterfaceKind::Bridge,
                &nic,
                None,
                0,
            )
        });
        assert_eq!(
            out,
            "<interface type=\"bridge\"><model type=\"rtl8139\"/>\
             <link state=\"down\"/><mac address=\"00:1a:4a:16:01:51\"/>\
             <bandwidth/></interface>"
        );
    }
}
