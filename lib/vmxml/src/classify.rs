// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device classification.
//!
//! The stored device list of a VM is (optionally) rewritten for a run-once
//! start, filtered to plugged devices, and split into buckets. Devices that
//! are encoded in a single pass have their parameters parsed into typed
//! records here, so encoders never look at the loose parameter bag.

use slog::{debug, error, warn, Logger};
use uuid::Uuid;

use vmxml_types::{DeviceAddress, DisplayType, GraphicsType};

use crate::index::DeviceIndexAllocator;
use crate::model::{
    Device, DeviceGeneralType, DeviceId, ParamError, VirtualMachine,
};

const FLOPPY: &str = "floppy";

/// A controller kind, as far as parameter injection is concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerKind {
    VirtioSerial,
    VirtioScsi,
    Other,
}

impl ControllerKind {
    fn from_name(name: &str) -> Self {
        match name {
            "virtio-serial" => ControllerKind::VirtioSerial,
            "virtio-scsi" => ControllerKind::VirtioScsi,
            _ => ControllerKind::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerParams {
    /// Value of the `type` attribute.
    pub controller_type: String,
    pub model: Option<String>,
    pub index: Option<u64>,
    pub ports: Option<u64>,
}

impl ControllerParams {
    /// Applies the fixed parameters of virtio controllers; a virtio-scsi
    /// controller takes the next index from `alloc`.
    pub fn augment(
        kind: &ControllerKind,
        stored: ControllerParams,
        alloc: &mut DeviceIndexAllocator,
    ) -> ControllerParams {
        match kind {
            ControllerKind::VirtioSerial => ControllerParams {
                index: Some(0),
                ports: Some(16),
                ..stored
            },
            ControllerKind::VirtioScsi => ControllerParams {
                controller_type: "scsi".to_string(),
                index: Some(u64::from(alloc.next_virtio_scsi_controller())),
                model: Some("virtio-scsi".to_string()),
                ..stored
            },
            ControllerKind::Other => stored,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoParams {
    pub model: String,
    pub vram: Option<u64>,
    pub heads: Option<u64>,
    pub ram: Option<u64>,
    pub vgamem: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphicsParams {
    pub graphics_type: GraphicsType,
    pub display_ip: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RngSource {
    Random,
    Urandom,
    Hwrng,
}

impl RngSource {
    pub fn path(&self) -> &'static str {
        match self {
            RngSource::Random => "/dev/random",
            RngSource::Urandom => "/dev/urandom",
            RngSource::Hwrng => "/dev/hwrng",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RngParams {
    pub source: RngSource,
    pub bytes: Option<u64>,
    pub period: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsoleParams {
    /// Value of the target `type` attribute; `virtio` unless stored.
    pub console_type: String,
    pub enable_socket: bool,
}

impl ConsoleParams {
    pub fn is_serial(&self) -> bool {
        self.console_type == "serial"
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostDevParams {
    /// Name of the host device to pass through.
    pub name: String,
    pub iommu_placeholder: bool,
}

/// A device encoded during the single in-order pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InlineKind {
    Balloon { model: String },
    Smartcard { mode: String, smartcard_type: String },
    Watchdog { model: String, action: String },
    Video(VideoParams),
    Controller(ControllerParams),
    Graphics(GraphicsParams),
    Sound { model: String },
    Rng(RngParams),
    Console(ConsoleParams),
    Redir,
    HostDev(HostDevParams),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineDevice {
    pub id: DeviceId,
    pub address: DeviceAddress,
    pub kind: InlineKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterfaceKind {
    Bridge,
    HostDev,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceDevice {
    pub device: Device,
    pub kind: InterfaceKind,
}

/// Classifier output. `inline` keeps the order of the device list.
#[derive(Debug, Default)]
pub struct DeviceBuckets {
    pub inline: Vec<InlineDevice>,
    pub interfaces: Vec<InterfaceDevice>,
    pub disks: Vec<Device>,
    pub cdroms: Vec<Device>,
    pub floppy: Option<Device>,
    pub balloon_present: bool,
    pub spice_present: bool,
}

fn synthesized(
    vm: &VirtualMachine,
    ty: DeviceGeneralType,
    name: &str,
) -> Device {
    Device::new(DeviceId::new(Uuid::new_v4(), vm.id), ty, name)
}

/// The video model synthesized for a display type, if any.
fn video_model(display: DisplayType) -> Option<&'static str> {
    match display {
        DisplayType::None => None,
        DisplayType::Qxl => Some("qxl"),
        DisplayType::Vga => Some("vga"),
        DisplayType::Cirrus => Some("cirrus"),
    }
}

/// Rewrites the stored device list for a run-once start. Outside of
/// run-once starts the list is returned unchanged.
pub fn apply_run_once(
    mut devices: Vec<Device>,
    vm: &VirtualMachine,
    payload: Option<Device>,
) -> Vec<Device> {
    if !vm.run_once {
        return devices;
    }

    let display = vm.default_display_type;
    if let Some(display) = display {
        devices.retain(|d| d.general_type != DeviceGeneralType::Video);
        if let Some(model) = video_model(display) {
            devices.push(synthesized(vm, DeviceGeneralType::Video, model));
        }
    }

    if display == Some(DisplayType::None) || !vm.graphics_infos.is_empty() {
        devices.retain(|d| d.general_type != DeviceGeneralType::Graphics);
        if display != Some(DisplayType::None) {
            for ty in vm.graphics_infos.keys() {
                devices.push(synthesized(
                    vm,
                    DeviceGeneralType::Graphics,
                    ty.as_str(),
                ));
            }
        }
    }

    if let Some(payload) = payload {
        devices.retain(|d| !d.is_payload());
        devices.push(payload);
    }

    // A floppy path may be given without a stored floppy device.
    let has_floppy_path =
        vm.floppy_path.as_deref().is_some_and(|p| !p.is_empty());
    if has_floppy_path && !devices.iter().any(|d| d.device != FLOPPY) {
        let mut floppy = synthesized(vm, DeviceGeneralType::Disk, FLOPPY);
        floppy.read_only = true;
        devices.push(floppy);
    }

    devices
}

fn parse_inline(
    device: &Device,
    alloc: &mut DeviceIndexAllocator,
) -> Result<Option<InlineKind>, ParamError> {
    let p = device.params();
    let kind = match device.general_type {
        DeviceGeneralType::Balloon => {
            InlineKind::Balloon { model: p.string("model")? }
        }
        DeviceGeneralType::Smartcard => InlineKind::Smartcard {
            mode: p.string("mode")?,
            smartcard_type: p.string("type")?,
        },
        DeviceGeneralType::Watchdog => InlineKind::Watchdog {
            model: p.opt_string("model")?.unwrap_or_else(|| "i6300esb".into()),
            action: p.opt_string("action")?.unwrap_or_else(|| "none".into()),
        },
        DeviceGeneralType::Video => InlineKind::Video(VideoParams {
            model: device.device.clone(),
            vram: p.opt_u64("vram")?,
            heads: p.opt_u64("heads")?,
            ram: p.opt_u64("ram")?,
            vgamem: p.opt_u64("vgamem")?,
        }),
        DeviceGeneralType::Controller => {
            let kind = ControllerKind::from_name(&device.device);
            let stored = ControllerParams {
                controller_type: device.device.clone(),
                model: p.opt_string("model")?,
                index: p.opt_u64("index")?,
                ports: p.opt_u64("ports")?,
            };
            InlineKind::Controller(ControllerParams::augment(
                &kind, stored, alloc,
            ))
        }
        DeviceGeneralType::Graphics => {
            let Ok(graphics_type) = device.device.parse() else {
                return Err(ParamError::Invalid {
                    key: "device",
                    value: device.device.clone(),
                });
            };
            InlineKind::Graphics(GraphicsParams {
                graphics_type,
                display_ip: p.opt_string("displayIp")?,
            })
        }
        DeviceGeneralType::Sound => {
            InlineKind::Sound { model: device.device.clone() }
        }
        DeviceGeneralType::Rng => {
            let source = match p.string("source")?.as_str() {
                "random" => RngSource::Random,
                "urandom" => RngSource::Urandom,
                "hwrng" => RngSource::Hwrng,
                other => {
                    return Err(ParamError::Invalid {
                        key: "source",
                        value: other.to_string(),
                    })
                }
            };
            InlineKind::Rng(RngParams {
                source,
                bytes: p.opt_u64("bytes")?,
                period: p.opt_u64("period")?,
            })
        }
        DeviceGeneralType::Console => InlineKind::Console(ConsoleParams {
            console_type: p
                .opt_string("consoleType")?
                .unwrap_or_else(|| "virtio".into()),
            enable_socket: p.opt_bool("enableSocket")?.unwrap_or(false),
        }),
        DeviceGeneralType::Redir => InlineKind::Redir,
        DeviceGeneralType::Hostdev => InlineKind::HostDev(HostDevParams {
            name: device.device.clone(),
            iommu_placeholder: p
                .opt_bool("iommuPlaceholder")?
                .unwrap_or(false),
        }),
        _ => return Ok(None),
    };
    Ok(Some(kind))
}

/// Splits the (possibly run-once rewritten) device list into buckets.
/// Unplugged devices are dropped; devices of unknown kinds or with unusable
/// parameters are logged and skipped.
pub fn classify(
    log: &Logger,
    devices: Vec<Device>,
    alloc: &mut DeviceIndexAllocator,
) -> DeviceBuckets {
    let mut buckets = DeviceBuckets::default();

    for device in devices.into_iter().filter(|d| d.plugged) {
        match device.general_type {
            DeviceGeneralType::Disk => match device.device.as_str() {
                "cdrom" => buckets.cdroms.push(device),
                "disk" => buckets.disks.push(device),
                FLOPPY => {
                    let keep_current =
                        buckets.floppy.as_ref().is_some_and(Device::is_payload);
                    if !keep_current {
                        buckets.floppy = Some(device);
                    }
                }
                other => {
                    warn!(log, "skipping disk device of unknown kind";
                        "device" => other);
                }
            },
            DeviceGeneralType::Interface => {
                let kind = match device.device.as_str() {
                    "bridge" => InterfaceKind::Bridge,
                    "hostdev" => InterfaceKind::HostDev,
                    other => {
                        warn!(log, "skipping interface of unknown kind";
                            "device" => other);
                        continue;
                    }
                };
                buckets.interfaces.push(InterfaceDevice { device, kind });
            }
            DeviceGeneralType::Memory => {
                debug!(log, "memory devices are only used for hot-plug");
            }
            DeviceGeneralType::Channel
            | DeviceGeneralType::Redirdev
            | DeviceGeneralType::Unknown => {}
            _ => match parse_inline(&device, alloc) {
                Ok(Some(kind)) => {
                    match &kind {
                        InlineKind::Balloon { .. } => {
                            buckets.balloon_present = true
                        }
                        InlineKind::Graphics(g) => {
                            buckets.spice_present |=
                                g.graphics_type == GraphicsType::Spice;
                        }
                        _ => {}
                    }
                    buckets.inline.push(InlineDevice {
                        id: device.id,
                        address: device.address,
                        kind,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(log, "skipping device with unusable parameters";
                        "device" => &device.device,
                        "error" => %e);
                }
            },
        }
    }

    buckets
}
