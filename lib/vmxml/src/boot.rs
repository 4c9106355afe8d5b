// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot order computation.

use std::collections::BTreeMap;

use crate::model::{
    BootDevice, BootSequence, Device, DeviceId, Disk, VmNetworkInterface,
};

/// Boot positions recomputed for one build. The stored device records are
/// left untouched.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BootOrder {
    orders: BTreeMap<DeviceId, u32>,
}

impl BootOrder {
    /// Assigns boot positions, starting at 1, to managed devices following
    /// the VM boot sequence: `C` assigns every disk marked bootable in device
    /// order, `D` the first CD-ROM, and `N` each plugged NIC in VM interface
    /// order. Every other managed device is reset to 0 (no boot element).
    pub fn compute(
        sequence: &BootSequence,
        disks: &[Device],
        cdroms: &[Device],
        interfaces: &[Device],
        vm_disks: &[Disk],
        vm_nics: &[VmNetworkInterface],
    ) -> Self {
        let managed = |devs: &[Device]| -> Vec<DeviceId> {
            devs.iter().filter(|d| d.managed).map(|d| d.id).collect()
        };
        let disks = managed(disks);
        let cdroms = managed(cdroms);
        let interfaces = managed(interfaces);

        let mut orders: BTreeMap<DeviceId, u32> = disks
            .iter()
            .chain(cdroms.iter())
            .chain(interfaces.iter())
            .map(|id| (*id, 0))
            .collect();

        let mut next = 0;
        let mut assign = |id: DeviceId| {
            next += 1;
            orders.insert(id, next);
        };

        for class in sequence.iter() {
            match class {
                BootDevice::Disk => {
                    for id in &disks {
                        let bootable = vm_disks.iter().any(|disk| {
                            disk.id == id.device_id && disk.vm_element.boot
                        });
                        if bootable {
                            assign(*id);
                        }
                    }
                }
                BootDevice::Cdrom => {
                    if let Some(id) = cdroms.first() {
                        assign(*id);
                    }
                }
                BootDevice::Network => {
                    for nic in vm_nics.iter().filter(|nic| nic.plugged) {
                        let id = DeviceId::new(nic.id, nic.vm_id);
                        if interfaces.contains(&id) {
                            assign(id);
                        }
                    }
                }
            }
        }

        Self { orders }
    }

    /// The boot position to emit for a device; unmanaged devices keep their
    /// stored order.
    pub fn for_device(&self, device: &Device) -> u32 {
        self.orders.get(&device.id).copied().unwrap_or(device.boot_order)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{DeviceGeneralType, DiskBackend, DiskVmElement, LunDisk};
    use uuid::Uuid;
    use vmxml_types::DiskInterface;

    const VM: Uuid = Uuid::from_u128(0x100);

    fn dev(n: u128, ty: DeviceGeneralType, name: &str) -> Device {
        let mut d =
            Device::new(DeviceId::new(Uuid::from_u128(n), VM), ty, name);
        d.boot_order = 9;
        d
    }

    fn disk(n: u128, boot: bool) -> Disk {
        Disk {
            id: Uuid::from_u128(n),
            alias: format!("disk{n}"),
            shareable: false,
            propagate_errors: false,
            scsi_passthrough: false,
            sgio: None,
            vm_element: DiskVmElement {
                interface: DiskInterface::VirtIO,
                boot,
                pass_discard: false,
            },
            backend: DiskBackend::Lun(LunDisk { lun_id: format!("lun{n}") }),
        }
    }

    fn nic(n: u128, plugged: bool) -> VmNetworkInterface {
        VmNetworkInterface {
            id: Uuid::from_u128(n),
            vm_id: VM,
            name: format!("nic{n}"),
            mac_address: "00:1a:4a:16:01:51".to_string(),
            linked: true,
            plugged,
            vnic_profile_id: None,
            network_name: None,
            iface_type: None,
        }
    }

    #[test]
    fn network_then_disk_then_cdrom() {
        let disk_dev = |n| dev(n, DeviceGeneralType::Disk, "disk");
        let cd_dev = |n| dev(n, DeviceGeneralType::Disk, "cdrom");
        let nic_dev = |n| dev(n, DeviceGeneralType::Interface, "bridge");
        let disks = [disk_dev(1), disk_dev(2)];
        let cdroms = [cd_dev(3), cd_dev(4)];
        let ifaces = [nic_dev(5), nic_dev(6)];
        let vm_disks = [disk(1, false), disk(2, true)];
        // VM interface order differs from device order; nic 7 has no device.
        let vm_nics = [nic(6, true), nic(7, true), nic(5, true)];

        let order = BootOrder::compute(
            &"NCD".parse().unwrap(),
            &disks,
            &cdroms,
            &ifaces,
            &vm_disks,
            &vm_nics,
        );
        assert_eq!(order.for_device(&ifaces[1]), 1);
        assert_eq!(order.for_device(&ifaces[0]), 2);
        assert_eq!(order.for_device(&disks[0]), 0);
        assert_eq!(order.for_device(&disks[1]), 3);
        assert_eq!(order.for_device(&cdroms[0]), 4);
        assert_eq!(order.for_device(&cdroms[1]), 0);
    }

    #[test]
    fn unmanaged_devices_keep_stored_order() {
        let mut unmanaged = dev(1, DeviceGeneralType::Disk, "disk");
        unmanaged.managed = false;
        let order = BootOrder::compute(
            &BootSequence::default(),
            std::slice::from_ref(&unmanaged),
            &[],
            &[],
            &[disk(1, true)],
            &[],
        );
        assert_eq!(order.for_device(&unmanaged), 9);
    }

    #[test]
    fn unplugged_nics_are_not_bootable() {
        let ifaces = [dev(5, DeviceGeneralType::Interface, "bridge")];
        let order = BootOrder::compute(
            &"N".parse().unwrap(),
            &[],
            &[],
            &ifaces,
            &[],
            &[nic(5, false)],
        );
        assert_eq!(order.for_device(&ifaces[0]), 0);
    }
}
