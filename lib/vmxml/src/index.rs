// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-bus index allocation for disks and controllers.

use vmxml_types::{ArchFamily, ArchitectureType, CdInterface, DiskInterface};

/// The bus named in a disk's `target` element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetBus {
    Ide,
    Virtio,
    Scsi,
    Sata,
    Fdc,
}

impl TargetBus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetBus::Ide => "ide",
            TargetBus::Virtio => "virtio",
            TargetBus::Scsi => "scsi",
            TargetBus::Sata => "sata",
            TargetBus::Fdc => "fdc",
        }
    }

    fn name_prefix(&self) -> &'static str {
        match self {
            TargetBus::Ide => "hd",
            TargetBus::Virtio => "vd",
            TargetBus::Scsi | TargetBus::Sata => "sd",
            TargetBus::Fdc => "fd",
        }
    }

    /// The target bus of a disk interface. sPAPR VSCSI disks carry no target
    /// bus.
    pub fn for_disk(iface: DiskInterface) -> Option<TargetBus> {
        match iface {
            DiskInterface::Ide => Some(TargetBus::Ide),
            DiskInterface::VirtIO => Some(TargetBus::Virtio),
            DiskInterface::VirtioScsi => Some(TargetBus::Scsi),
            DiskInterface::SpaprVscsi => None,
        }
    }

    pub fn for_cd(iface: CdInterface) -> TargetBus {
        match iface {
            CdInterface::Ide => TargetBus::Ide,
            CdInterface::Scsi => TargetBus::Scsi,
            CdInterface::Sata => TargetBus::Sata,
        }
    }
}

/// Builds a guest device name such as `hda`, `vdb`, or `sdaa` from a bus
/// and a zero-based index.
pub fn make_disk_name(bus: TargetBus, index: u32) -> String {
    let mut name = bus.name_prefix().to_string();
    name.push_str(&disk_letters(index));
    name
}

fn disk_letters(index: u32) -> String {
    let letter = char::from(b'a' + (index % 26) as u8);
    if index < 26 {
        letter.to_string()
    } else {
        let mut prefix = disk_letters(index / 26 - 1);
        prefix.push(letter);
        prefix
    }
}

/// Index of the user-media CD-ROM on a CD bus.
pub fn cdrom_index(iface: CdInterface) -> u32 {
    match iface {
        CdInterface::Ide | CdInterface::Scsi => 2,
        CdInterface::Sata => 0,
    }
}

/// Index of the payload CD-ROM on a CD bus.
pub fn cd_payload_index(_iface: CdInterface) -> u32 {
    1
}

/// Controller index bases for an architecture.
pub fn controller_base(
    arch: ArchitectureType,
    iface: DiskInterface,
) -> Option<u32> {
    match (arch.family(), iface) {
        (ArchFamily::X86, DiskInterface::Ide) => Some(0),
        (ArchFamily::X86, DiskInterface::VirtioScsi) => Some(0),
        (ArchFamily::Ppc, DiskInterface::SpaprVscsi) => Some(0),
        (ArchFamily::Ppc, DiskInterface::VirtioScsi) => Some(1),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BusFamily {
    Ide,
    Virtio,
    Scsi,
}

impl From<DiskInterface> for BusFamily {
    fn from(iface: DiskInterface) -> Self {
        match iface {
            DiskInterface::Ide => BusFamily::Ide,
            DiskInterface::VirtIO => BusFamily::Virtio,
            DiskInterface::VirtioScsi | DiskInterface::SpaprVscsi => {
                BusFamily::Scsi
            }
        }
    }
}

/// Hands out disk indices for one build.
///
/// Each bus family counts from zero independently. On the disk interface
/// that shares its bus with the CD-ROMs, indices already reserved for the
/// payload or the user-media CD-ROM are skipped; both reservations must be
/// made before the first disk index on that bus is requested.
#[derive(Debug)]
pub struct DeviceIndexAllocator {
    cd_interface: CdInterface,
    payload_index: Option<u32>,
    cdrom_index: Option<u32>,
    ide: Option<u32>,
    virtio: Option<u32>,
    scsi: Option<u32>,
    next_virtio_scsi_controller: u32,
}

impl DeviceIndexAllocator {
    pub fn new(arch: ArchitectureType, cd_interface: CdInterface) -> Self {
        Self {
            cd_interface,
            payload_index: None,
            cdrom_index: None,
            ide: None,
            virtio: None,
            scsi: None,
            next_virtio_scsi_controller: controller_base(
                arch,
                DiskInterface::VirtioScsi,
            )
            .unwrap_or(0),
        }
    }

    pub fn cd_interface(&self) -> CdInterface {
        self.cd_interface
    }

    /// Returns the next virtio-scsi controller index.
    pub fn next_virtio_scsi_controller(&mut self) -> u32 {
        let index = self.next_virtio_scsi_controller;
        self.next_virtio_scsi_controller += 1;
        index
    }

    /// Reserves and returns the payload CD-ROM index.
    pub fn reserve_payload(&mut self) -> u32 {
        let index = cd_payload_index(self.cd_interface);
        self.payload_index = Some(index);
        index
    }

    /// Reserves and returns the user-media CD-ROM index.
    pub fn reserve_cdrom(&mut self) -> u32 {
        let index = cdrom_index(self.cd_interface);
        self.cdrom_index = Some(index);
        index
    }

    fn is_reserved(&self, index: u32) -> bool {
        self.payload_index == Some(index) || self.cdrom_index == Some(index)
    }

    /// Returns the next free index for a disk on `iface`.
    pub fn next(&mut self, iface: DiskInterface) -> u32 {
        let shares_cd_bus = self.cd_interface.disk_interface() == Some(iface);
        let counter = match BusFamily::from(iface) {
            BusFamily::Ide => self.ide,
            BusFamily::Virtio => self.virtio,
            BusFamily::Scsi => self.scsi,
        };

        let mut index = counter.map_or(0, |c| c + 1);
        if shares_cd_bus {
            while self.is_reserved(index) {
                index += 1;
            }
        }

        let slot = match BusFamily::from(iface) {
            BusFamily::Ide => &mut self.ide,
            BusFamily::Virtio => &mut self.virtio,
            BusFamily::Scsi => &mut self.scsi,
        };
        *slot = Some(index);
        index
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;
    use vmxml_types::ArchitectureType::{Ppc64, X86_64};

    #[test]
    fn disk_names() {
        assert_eq!(make_disk_name(TargetBus::Ide, 0), "hda");
        assert_eq!(make_disk_name(TargetBus::Virtio, 3), "vdd");
        assert_eq!(make_disk_name(TargetBus::Scsi, 25), "sdz");
        assert_eq!(make_disk_name(TargetBus::Scsi, 26), "sdaa");
        assert_eq!(make_disk_name(TargetBus::Sata, 27), "sdab");
        assert_eq!(make_disk_name(TargetBus::Fdc, 0), "fda");
        assert_eq!(make_disk_name(TargetBus::Virtio, 701), "vdzz");
        assert_eq!(make_disk_name(TargetBus::Virtio, 702), "vdaaa");
    }

    #[test]
    fn cd_indices_are_distinct() {
        for iface in [CdInterface::Ide, CdInterface::Scsi, CdInterface::Sata] {
            assert_ne!(cdrom_index(iface), cd_payload_index(iface));
        }
    }

    #[test]
    fn ide_disks_skip_reserved_cd_indices() {
        let mut alloc = DeviceIndexAllocator::new(X86_64, CdInterface::Ide);
        assert_eq!(alloc.reserve_payload(), 1);
        assert_eq!(alloc.reserve_cdrom(), 2);
        let got: Vec<_> =
            (0..3).map(|_| alloc.next(DiskInterface::Ide)).collect();
        assert_eq!(got, [0, 3, 4]);
        // Other buses are unaffected.
        assert_eq!(alloc.next(DiskInterface::VirtIO), 0);
        assert_eq!(alloc.next(DiskInterface::VirtIO), 1);
        assert_eq!(alloc.next(DiskInterface::VirtioScsi), 0);
    }

    #[test]
    fn scsi_cd_bus_only_affects_virtio_scsi() {
        let mut alloc = DeviceIndexAllocator::new(
            ArchitectureType::Ppc64le,
            CdInterface::Scsi,
        );
        alloc.reserve_cdrom();
        // sPAPR VSCSI shares the counter but not the reservation.
        assert_eq!(alloc.next(DiskInterface::SpaprVscsi), 0);
        assert_eq!(alloc.next(DiskInterface::SpaprVscsi), 1);
        assert_eq!(alloc.next(DiskInterface::SpaprVscsi), 2);
        assert_eq!(alloc.next(DiskInterface::VirtioScsi), 3);

        let mut alloc = DeviceIndexAllocator::new(
            ArchitectureType::Ppc64le,
            CdInterface::Scsi,
        );
        alloc.reserve_cdrom();
        let got: Vec<_> =
            (0..4).map(|_| alloc.next(DiskInterface::VirtioScsi)).collect();
        assert_eq!(got, [0, 1, 3, 4]);
    }

    #[test]
    fn controller_indices_start_at_arch_base() {
        let mut x86 = DeviceIndexAllocator::new(X86_64, CdInterface::Ide);
        assert_eq!(x86.next_virtio_scsi_controller(), 0);
        assert_eq!(x86.next_virtio_scsi_controller(), 1);

        let mut ppc = DeviceIndexAllocator::new(Ppc64, CdInterface::Scsi);
        assert_eq!(ppc.next_virtio_scsi_controller(), 1);
        assert_eq!(
            controller_base(Ppc64, DiskInterface::SpaprVscsi),
            Some(0)
        );
    }

    proptest! {
        #[test]
        fn indices_never_hit_reservations(
            reserve_payload: bool,
            reserve_cdrom: bool,
            count in 0usize..40,
        ) {
            let mut alloc = DeviceIndexAllocator::new(
                ArchitectureType::X86_64,
                CdInterface::Ide,
            );
            let mut reserved = Vec::new();
            if reserve_payload {
                reserved.push(alloc.reserve_payload());
            }
            if reserve_cdrom {
                reserved.push(alloc.reserve_cdrom());
            }

            let got: Vec<u32> =
                (0..count).map(|_| alloc.next(DiskInterface::Ide)).collect();
            for pair in got.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
            for index in &got {
                prop_assert!(!reserved.contains(index));
            }
            // No gaps apart from the reserved indices.
            let expected: Vec<u32> = (0..)
                .filter(|i| !reserved.contains(i))
                .take(count)
                .collect();
            prop_assert_eq!(got, expected);
        }
    }
}
