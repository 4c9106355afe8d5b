// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host device passthrough.

use slog::{debug, warn, Logger};
use vmxml_types::DeviceAddress;

use super::{write_address, Result};
use crate::classify::HostDevParams;
use crate::document::DocumentWriter;
use crate::model::{HostDevice, HostDeviceCapability};

/// Writes a `hostdev` element for a device passed through from the host.
/// Devices that cannot be passed through this way are logged and skipped.
pub(crate) fn write_host_device(
    w: &mut DocumentWriter,
    log: &Logger,
    params: &HostDevParams,
    host_device: Option<&HostDevice>,
    address: &DeviceAddress,
) -> Result {
    let Some(host_device) = host_device else {
        warn!(log, "skipping host device missing from host";
            "device" => &params.name);
        return Ok(());
    };

    let (dev_type, adapter) = match &host_device.capability {
        HostDeviceCapability::Pci { .. } => {
            // Placeholders only hold an IOMMU group together.
            if params.iommu_placeholder {
                debug!(log, "skipping IOMMU placeholder";
                    "device" => &params.name);
                return Ok(());
            }
            ("pci", None)
        }
        HostDeviceCapability::Usb { .. } => ("usb", None),
        HostDeviceCapability::Scsi { host, .. } => {
            ("scsi", Some(format!("scsi_host{host}")))
        }
        HostDeviceCapability::Unsupported => {
            warn!(log, "skipping host device with unsupported capability";
                "device" => &params.name);
            return Ok(());
        }
    };
    let Some(source) = host_device.capability.source_address() else {
        return Ok(());
    };

    w.start_element("hostdev")?;
    w.attribute("managed", "no")?;
    w.attribute("mode", "subsystem")?;
    if adapter.is_some() {
        w.attribute("rawio", "yes")?;
    }
    w.attribute("type", dev_type)?;

    w.start_element("source")?;
    if let Some(adapter) = adapter {
        w.element_with_attrs("adapter", [("name", adapter)])?;
    }
    w.element_with_attrs("address", source.iter())?;
    w.end_element()?;

    write_address(w, address)?;
    w.end_element()
}
