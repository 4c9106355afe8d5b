// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simple emulated devices and the VM lease.

use uuid::Uuid;
use vmxml_types::DeviceAddress;

use super::{write_address, Result};
use crate::classify::{ControllerParams, RngParams, VideoParams};
use crate::document::DocumentWriter;
use crate::model::VmLease;

const DEFAULT_VRAM: u64 = 32768;
const DEFAULT_HEADS: u64 = 1;

pub(crate) fn write_balloon(
    w: &mut DocumentWriter,
    model: &str,
    address: &DeviceAddress,
) -> Result {
    w.start_element("memballoon")?;
    w.attribute("model", model)?;
    write_address(w, address)?;
    w.end_element()
}

/// Disables the balloon when no balloon device is plugged.
pub(crate) fn write_default_balloon(w: &mut DocumentWriter) -> Result {
    w.element_with_attrs("memballoon", [("model", "none")])
}

pub(crate) fn write_smartcard(
    w: &mut DocumentWriter,
    mode: &str,
    smartcard_type: &str,
    address: &DeviceAddress,
) -> Result {
    w.start_element("smartcard")?;
    w.attribute("mode", mode)?;
    w.attribute("type", smartcard_type)?;
    write_address(w, address)?;
    w.end_element()
}

pub(crate) fn write_watchdog(
    w: &mut DocumentWriter,
    model: &str,
    action: &str,
    address: &DeviceAddress,
) -> Result {
    w.start_element("watchdog")?;
    w.attribute("model", model)?;
    w.attribute("action", action)?;
    write_address(w, address)?;
    w.end_element()
}

pub(crate) fn write_video(
    w: &mut DocumentWriter,
    video: &VideoParams,
    address: &DeviceAddress,
) -> Result {
    w.start_element("video")?;

    w.start_element("model")?;
    w.attribute("type", &video.model)?;
    w.attribute("vram", video.vram.unwrap_or(DEFAULT_VRAM))?;
    w.attribute("heads", video.heads.unwrap_or(DEFAULT_HEADS))?;
    if let Some(ram) = video.ram {
        w.attribute("ram", ram)?;
    }
    if let Some(vgamem) = video.vgamem {
        w.attribute("vgamem", vgamem)?;
    }
    w.end_element()?;

    write_address(w, address)?;
    w.end_element()
}

pub(crate) fn write_controller(
    w: &mut DocumentWriter,
    controller: &ControllerParams,
    address: &DeviceAddress,
) -> Result {
    w.start_element("controller")?;
    w.attribute("type", &controller.controller_type)?;
    if let Some(model) = &controller.model {
        w.attribute("model", model)?;
    }
    if let Some(index) = controller.index {
        w.attribute("index", index)?;
    }
    if let Some(ports) = controller.ports {
        w.attribute("ports", ports)?;
    }
    write_address(w, address)?;
    w.end_element()
}

pub(crate) fn write_sound(
    w: &mut DocumentWriter,
    model: &str,
    address: &DeviceAddress,
) -> Result {
    w.start_element("sound")?;
    w.attribute("model", model)?;
    write_address(w, address)?;
    w.end_element()
}

pub(crate) fn write_rng(w: &mut DocumentWriter, rng: &RngParams) -> Result {
    w.start_element("rng")?;
    w.attribute("model", "virtio")?;

    if let Some(bytes) = rng.bytes {
        w.start_element("rate")?;
        w.attribute("bytes", bytes)?;
        if let Some(period) = rng.period {
            w.attribute("period", period)?;
        }
        w.end_element()?;
    }

    w.start_element("backend")?;
    w.attribute("model", "random")?;
    w.text(rng.source.path())?;
    w.end_element()?;

    w.end_element()
}

pub(crate) fn write_redir(
    w: &mut DocumentWriter,
    address: &DeviceAddress,
) -> Result {
    w.start_element("redirdev")?;
    w.attribute("type", "spicevmc")?;
    w.attribute("bus", "usb")?;
    write_address(w, address)?;
    w.end_element()
}

pub(crate) fn write_lease(
    w: &mut DocumentWriter,
    vm_id: Uuid,
    lease: &VmLease,
) -> Result {
    w.start_element("lease")?;
    w.element("key", vm_id)?;
    w.element("lockspace", lease.storage_domain_id)?;

    w.start_element("target")?;
    if let Some(offset) = lease.offset {
        w.attribute("offset", offset)?;
    }
    if let Some(path) = &lease.path {
        w.attribute("path", path)?;
    }
    w.end_element()?;

    w.end_element()
}
