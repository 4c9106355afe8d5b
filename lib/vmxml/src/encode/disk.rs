// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Disks, CD-ROMs and floppies.

use slog::{warn, Logger};
use vmxml_types::{CdInterface, DeviceAddress, DiskInterface};

use super::{write_address, write_boot_order, Result};
use crate::capability::BuildConfig;
use crate::document::DocumentWriter;
use crate::index::{make_disk_name, TargetBus};
use crate::model::{
    Device, Disk, DiskBackend, StorageQos, VirtualMachine, VolumeFormat,
};

/// Source file of payload media; the host substitutes the generated image.
const PAYLOAD_SOURCE: &str = "PAYLOAD:";

/// A managed disk with everything needed to encode it.
pub(crate) struct PlacedDisk<'a> {
    pub device: &'a Device,
    pub disk: &'a Disk,
    pub index: u32,
    pub boot_order: u32,
    /// Whether an image disk lives on a block storage domain.
    pub block_domain: bool,
    pub qos: Option<&'a StorageQos>,
}

fn image_path(disk: &Disk, block_domain: bool) -> Option<String> {
    let DiskBackend::Image(image) = &disk.backend else {
        return None;
    };
    let domain = image.storage_ids.first()?;
    Some(if block_domain {
        format!(
            "/rhev/data-center/mnt/blockSD/{domain}/images/{}/{}",
            disk.id, image.image_id
        )
    } else {
        format!(
            "/rhev/data-center/{}/{domain}/images/{}/{}",
            image.storage_pool_id, disk.id, image.image_id
        )
    })
}

fn error_policy(disk: &Disk) -> &'static str {
    if disk.propagate_errors {
        "enospace"
    } else {
        "stop"
    }
}

fn write_general_attributes(w: &mut DocumentWriter, d: &PlacedDisk) -> Result {
    let disk = d.disk;
    w.attribute("snapshot", "no")?;
    let disk_type = match &disk.backend {
        DiskBackend::Image(_) if d.block_domain => "block",
        DiskBackend::Image(_) => "file",
        DiskBackend::Lun(_) => "block",
        DiskBackend::Network(_) => "network",
    };
    w.attribute("type", disk_type)?;

    match disk.vm_element.interface {
        DiskInterface::VirtIO | DiskInterface::Ide => {
            w.attribute("device", &d.device.device)?;
        }
        DiskInterface::VirtioScsi => {
            let passthrough_lun = matches!(disk.backend, DiskBackend::Lun(_))
                && disk.scsi_passthrough;
            if passthrough_lun {
                w.attribute("device", "lun")?;
                if let Some(sgio) = disk.sgio {
                    w.attribute("sgio", sgio.as_str())?;
                }
            } else {
                w.attribute("device", &d.device.device)?;
            }
        }
        DiskInterface::SpaprVscsi => {}
    }
    Ok(())
}

fn write_target(
    w: &mut DocumentWriter,
    iface: DiskInterface,
    index: u32,
) -> Result {
    match TargetBus::for_disk(iface) {
        Some(bus) => w.element_with_attrs(
            "target",
            [("dev", make_disk_name(bus, index)), ("bus", bus.as_str().into())],
        ),
        None => w.empty_element("target"),
    }
}

fn write_source(w: &mut DocumentWriter, d: &PlacedDisk) -> Result {
    w.start_element("source")?;
    match &d.disk.backend {
        DiskBackend::Image(_) => {
            if let Some(path) = image_path(d.disk, d.block_domain) {
                let key = if d.block_domain { "dev" } else { "file" };
                w.attribute(key, path)?;
            }
        }
        DiskBackend::Lun(lun) => {
            w.attribute("dev", format!("/dev/mapper/{}", lun.lun_id))?;
        }
        DiskBackend::Network(volume) => {
            w.attribute("protocol", &volume.protocol)?;
            w.attribute("name", &volume.name)?;
            for host in &volume.hosts {
                w.element_with_attrs(
                    "host",
                    [("name", &host.address), ("port", &host.port)],
                )?;
            }
        }
    }
    w.end_element()
}

fn write_driver(
    w: &mut DocumentWriter,
    log: &Logger,
    cfg: &BuildConfig,
    d: &PlacedDisk,
) -> Result {
    let disk = d.disk;
    w.start_element("driver")?;
    w.attribute("name", "qemu")?;
    if cfg.pass_discard && disk.vm_element.pass_discard {
        w.attribute("discard", "unmap")?;
    }
    match d.device.params().opt_string("pinToIoThread") {
        Ok(Some(iothread)) => w.attribute("iothread", iothread)?,
        Ok(None) => {}
        Err(e) => {
            warn!(log, "ignoring iothread pinning"; "disk" => %disk.id,
                "error" => %e);
        }
    }

    match &disk.backend {
        DiskBackend::Image(image) => {
            let io = if d.block_domain { "native" } else { "threads" };
            w.attribute("io", io)?;
            let format = match image.volume_format {
                VolumeFormat::Cow => "qcow2",
                VolumeFormat::Raw => "raw",
            };
            w.attribute("type", format)?;
            w.attribute("error_policy", error_policy(disk))?;
        }
        DiskBackend::Lun(_) => {
            w.attribute("io", "native")?;
            w.attribute("type", "raw")?;
            w.attribute("error_policy", error_policy(disk))?;
        }
        DiskBackend::Network(_) => {
            w.attribute("type", "raw")?;
            w.attribute("error_policy", "stop")?;
            w.attribute("io", "threads")?;
        }
    }

    // Transient disks live on storage that may not support O_DIRECT.
    let cache = if d.device.snapshot_id.is_some() {
        "writethrough"
    } else {
        "none"
    };
    w.attribute("cache", cache)?;
    w.end_element()
}

pub(crate) fn write_disk(
    w: &mut DocumentWriter,
    log: &Logger,
    cfg: &BuildConfig,
    d: &PlacedDisk,
) -> Result {
    let disk = d.disk;
    w.start_element("disk")?;
    write_general_attributes(w, d)?;
    write_target(w, disk.vm_element.interface, d.index)?;
    write_source(w, d)?;
    write_driver(w, log, cfg, d)?;
    write_address(w, &d.device.address)?;
    write_boot_order(w, d.boot_order)?;

    if !matches!(disk.backend, DiskBackend::Lun(_)) {
        w.element("serial", disk.id)?;
    }
    if d.device.read_only {
        w.empty_element("readonly")?;
    }
    if d.device.snapshot_id.is_none() && disk.shareable {
        w.empty_element("shareable")?;
    }

    match &disk.backend {
        DiskBackend::Image(_) => {
            if let Some(qos) = d.qos {
                w.element_with_attrs("iotune", qos.io_tune())?;
            }
        }
        DiskBackend::Network(volume) => {
            if let Some(auth) = &volume.auth {
                w.start_element("auth")?;
                w.attribute("username", &auth.username)?;
                w.element_with_attrs(
                    "secret",
                    [
                        ("type", auth.secret_type.clone()),
                        ("uuid", auth.secret_uuid.to_string()),
                    ],
                )?;
                w.end_element()?;
            }
        }
        DiskBackend::Lun(_) => {}
    }

    w.end_element()
}

fn start_removable(
    w: &mut DocumentWriter,
    device: &str,
    source: &str,
) -> Result {
    w.start_element("disk")?;
    w.attribute("type", "file")?;
    w.attribute("device", device)?;
    w.attribute("snapshot", "no")?;
    w.element_with_attrs(
        "source",
        [("file", source), ("startupPolicy", "optional")],
    )
}

fn write_cd_target(
    w: &mut DocumentWriter,
    cd: CdInterface,
    index: u32,
) -> Result {
    let bus = TargetBus::for_cd(cd);
    w.element_with_attrs(
        "target",
        [("dev", make_disk_name(bus, index)), ("bus", bus.as_str().into())],
    )
}

/// A payload CD-ROM at the reserved payload index.
pub(crate) fn write_payload_cdrom(
    w: &mut DocumentWriter,
    cd: CdInterface,
    index: u32,
) -> Result {
    start_removable(w, "cdrom", PAYLOAD_SOURCE)?;
    write_cd_target(w, cd, index)?;
    w.empty_element("readonly")?;
    if cd == CdInterface::Scsi {
        write_address(w, &DeviceAddress::drive(0, index))?;
    }
    w.end_element()
}

/// The user-media CD-ROM, loaded with the VM CD path. `device` is the stored
/// CD-ROM device, if there is one.
pub(crate) fn write_cdrom(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
    cd: CdInterface,
    index: u32,
    device: Option<&Device>,
    boot_order: u32,
) -> Result {
    start_removable(w, "cdrom", vm.cd_path.as_deref().unwrap_or(""))?;
    write_cd_target(w, cd, index)?;
    w.empty_element("readonly")?;
    if let Some(device) = device {
        write_address(w, &device.address)?;
        write_boot_order(w, boot_order)?;
    }
    w.end_element()
}

pub(crate) fn write_floppy(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
    device: &Device,
) -> Result {
    let source = if device.is_payload() {
        PAYLOAD_SOURCE
    } else {
        vm.floppy_path.as_deref().unwrap_or("")
    };
    start_removable(w, "floppy", source)?;
    w.element_with_attrs(
        "target",
        [("dev", make_disk_name(TargetBus::Fdc, 0)), ("bus", "fdc".into())],
    )?;
    w.empty_element("readonly")?;
    write_address(w, &device.address)?;
    w.end_element()
}
