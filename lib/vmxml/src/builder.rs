// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The domain descriptor builder.
//!
//! A [`DomainXmlBuilder`] is created for one VM start and consumed by
//! [`DomainXmlBuilder::build`]. Sections are written in a fixed order; the
//! `<os>` section comes last since it depends on whether the device pass
//! found a serial console.

use std::collections::BTreeMap;

use slog::{debug, info, warn, Logger};
use thiserror::Error;
use uuid::Uuid;

use crate::boot::BootOrder;
use crate::capability::{BuildConfig, CapabilityResolver};
use crate::classify::{self, DeviceBuckets, InlineDevice, InlineKind};
use crate::document::{DocumentError, DocumentWriter};
use crate::encode::disk::PlacedDisk;
use crate::encode::interface::NicBacking;
use crate::encode::{
    chardev, disk, domain, graphics, hostdev, interface, misc,
};
use crate::index::DeviceIndexAllocator;
use crate::inventory::{Inventory, LookupError};
use crate::model::{
    CreateParams, Device, DeviceId, Disk, DiskBackend, HostDevice, Network,
    StorageQos, VirtualMachine, VmNetworkInterface,
};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("failed to write descriptor: {0}")]
    Document(#[from] DocumentError),

    #[error("storage domain {domain} of disk {disk} not found")]
    MissingStorageDomain { disk: Uuid, domain: Uuid },

    #[error("image disk {0} is not on any storage domain")]
    NoStorageForImage(Uuid),
}

/// The inputs of one build.
#[derive(Clone, Debug)]
pub struct BuildRequest<'a> {
    pub vm: &'a VirtualMachine,
    /// The host the VM is about to start on.
    pub host_id: Uuid,
    /// Parameters negotiated with that host.
    pub params: &'a CreateParams,
    /// Payload device replacing the stored one for a run-once start.
    pub run_once_payload: Option<Device>,
    /// A volatile run is destroyed rather than rebooted.
    pub volatile: bool,
}

pub struct DomainXmlBuilder<'a> {
    log: Logger,
    vm: &'a VirtualMachine,
    host_id: Uuid,
    params: &'a CreateParams,
    run_once_payload: Option<Device>,
    volatile: bool,
    inventory: Inventory<'a>,
    config: BuildConfig,

    host_devices: Option<BTreeMap<String, HostDevice>>,
    display_network: Option<Option<Network>>,
    qos_cache: BTreeMap<Uuid, Option<StorageQos>>,
}

impl<'a> DomainXmlBuilder<'a> {
    pub fn new(
        log: &Logger,
        request: BuildRequest<'a>,
        inventory: Inventory<'a>,
        resolver: &dyn CapabilityResolver,
    ) -> Self {
        let vm = request.vm;
        let log = log.new(slog::o!("vm_id" => vm.id.to_string()));
        let config = BuildConfig::resolve(resolver, vm);
        debug!(log, "resolved build configuration";
            "hot_plug_memory" => config.hot_plug_memory,
            "hot_plug_cpu" => config.hot_plug_cpu,
            "hyperv" => config.hyperv_enabled,
            "cd_interface" => %config.cd_interface,
            "machine" => &config.emulated_machine);

        Self {
            log,
            vm,
            host_id: request.host_id,
            params: request.params,
            run_once_payload: request.run_once_payload,
            volatile: request.volatile,
            inventory,
            config,
            host_devices: None,
            display_network: None,
            qos_cache: BTreeMap::new(),
        }
    }

    /// Produces the complete descriptor, or an error if any lookup fails.
    pub fn build(mut self) -> Result<String, BuildError> {
        let vm = self.vm;
        let mut w = DocumentWriter::new();

        domain::start_domain(&mut w)?;
        domain::write_sizing(&mut w, vm, &self.config)?;
        domain::write_metadata(&mut w, vm)?;
        domain::write_sysinfo(&mut w, vm)?;
        domain::write_clock(&mut w, vm, &self.config)?;
        domain::write_power_events(&mut w, self.volatile)?;
        domain::write_features(&mut w, vm, &self.config)?;
        domain::write_cpu(&mut w, vm, &self.config, self.params)?;
        domain::write_cputune(&mut w, self.params)?;
        domain::write_numatune(&mut w, self.params)?;
        let serial_console = self.write_devices(&mut w)?;
        domain::write_os(&mut w, vm, &self.config, serial_console.is_some())?;
        w.end_element()?;

        let xml = w.finish()?;
        info!(self.log, "built domain descriptor"; "bytes" => xml.len());
        Ok(xml)
    }

    fn host_device(
        &mut self,
        name: &str,
    ) -> Result<Option<HostDevice>, LookupError> {
        if self.host_devices.is_none() {
            let devices =
                self.inventory.host_devices.host_devices(self.host_id)?;
            self.host_devices = Some(
                devices
                    .into_iter()
                    .map(|d| (d.device_name.clone(), d))
                    .collect(),
            );
        }
        Ok(self.host_devices.as_ref().and_then(|m| m.get(name)).cloned())
    }

    fn display_network(&mut self) -> Result<Option<Network>, LookupError> {
        if let Some(network) = &self.display_network {
            return Ok(network.clone());
        }
        let network =
            self.inventory.networks.display_network(self.vm.cluster_id)?;
        self.display_network = Some(network.clone());
        Ok(network)
    }

    fn storage_qos(
        &mut self,
        disk_profile_id: Uuid,
    ) -> Result<Option<StorageQos>, LookupError> {
        if let Some(qos) = self.qos_cache.get(&disk_profile_id) {
            return Ok(qos.clone());
        }
        let qos = self.inventory.storage.storage_qos(disk_profile_id)?;
        self.qos_cache.insert(disk_profile_id, qos.clone());
        Ok(qos)
    }

    /// Writes `<devices>`. Returns the serial console path if a serial
    /// console was found; an empty path means a pty.
    fn write_devices(
        &mut self,
        w: &mut DocumentWriter,
    ) -> Result<Option<String>, BuildError> {
        let vm = self.vm;
        let devices = self.inventory.devices.devices_for_vm(vm.id)?;
        let devices = classify::apply_run_once(
            devices,
            vm,
            self.run_once_payload.take(),
        );
        let mut alloc =
            DeviceIndexAllocator::new(vm.arch, self.config.cd_interface);
        let DeviceBuckets {
            inline,
            interfaces,
            disks,
            cdroms,
            floppy,
            balloon_present,
            spice_present,
        } = classify::classify(&self.log, devices, &mut alloc);

        w.start_element("devices")?;
        chardev::write_input(w, vm)?;
        chardev::write_guest_agent_channels(w, vm.id)?;
        chardev::write_emulator(w, vm)?;

        let mut serial_console = None;
        for device in &inline {
            if let Some(path) = self.write_inline(w, device)? {
                serial_console = Some(path);
            }
        }

        if !balloon_present {
            misc::write_default_balloon(w)?;
        }
        if let Some(path) = &serial_console {
            chardev::write_serial(w, path)?;
        }
        if let Some(lease) = &vm.lease {
            misc::write_lease(w, vm.id, lease)?;
        }
        if spice_present {
            chardev::write_spice_vmc_channel(w)?;
        }

        let nic_devices: Vec<Device> =
            interfaces.iter().map(|i| i.device.clone()).collect();
        let boot = BootOrder::compute(
            &vm.boot_sequence,
            &disks,
            &cdroms,
            &nic_devices,
            &vm.disks,
            &vm.interfaces,
        );

        for iface in &interfaces {
            let Some(nic) = find_nic(vm, &iface.device.id) else {
                warn!(self.log, "skipping interface device without a NIC";
                    "device" => %iface.device.id.device_id);
                continue;
            };
            let backing = self.nic_backing(nic)?;
            interface::write_interface(
                w,
                &self.log,
                vm,
                &iface.device,
                iface.kind,
                nic,
                backing.as_ref(),
                boot.for_device(&iface.device),
            )?;
        }

        // CD-ROM indices must be reserved before any disk index is handed
        // out on the same bus.
        self.write_cdroms(w, &cdroms, &mut alloc, &boot)?;
        if let Some(floppy) = &floppy {
            disk::write_floppy(w, vm, floppy)?;
        }
        self.write_disks(w, &disks, &mut alloc, &boot)?;

        w.end_element()?;
        Ok(serial_console)
    }

    /// Writes one device of the in-order pass. Returns the serial console
    /// path when the device is a serial console.
    fn write_inline(
        &mut self,
        w: &mut DocumentWriter,
        device: &InlineDevice,
    ) -> Result<Option<String>, BuildError> {
        let vm = self.vm;
        let address = &device.address;
        match &device.kind {
            InlineKind::Balloon { model } => {
                misc::write_balloon(w, model, address)?
            }
            InlineKind::Smartcard { mode, smartcard_type } => {
                misc::write_smartcard(w, mode, smartcard_type, address)?
            }
            InlineKind::Watchdog { model, action } => {
                misc::write_watchdog(w, model, action, address)?
            }
            InlineKind::Video(video) => misc::write_video(w, video, address)?,
            InlineKind::Controller(controller) => {
                misc::write_controller(w, controller, address)?
            }
            InlineKind::Graphics(params) => {
                let network = self.display_network()?;
                graphics::write_graphics(
                    w,
                    &self.log,
                    vm,
                    &self.config,
                    params,
                    network.as_ref(),
                )?
            }
            InlineKind::Sound { model } => {
                misc::write_sound(w, model, address)?
            }
            InlineKind::Rng(rng) => misc::write_rng(w, rng)?,
            InlineKind::Console(console) => {
                chardev::write_console(w, vm.id, console)?;
                if console.is_serial() {
                    return Ok(Some(chardev::console_socket_path(
                        vm.id, console,
                    )));
                }
            }
            InlineKind::Redir => misc::write_redir(w, address)?,
            InlineKind::HostDev(params) => {
                let host_device = self.host_device(&params.name)?;
                hostdev::write_host_device(
                    w,
                    &self.log,
                    params,
                    host_device.as_ref(),
                    address,
                )?
            }
        }
        Ok(None)
    }

    fn nic_backing(
        &self,
        nic: &VmNetworkInterface,
    ) -> Result<Option<NicBacking>, LookupError> {
        let networks = self.inventory.networks;
        let Some(profile_id) = nic.vnic_profile_id else {
            return Ok(None);
        };
        let Some(profile) = networks.vnic_profile(profile_id)? else {
            warn!(self.log, "vNIC profile not found";
                "nic" => %nic.id, "profile" => %profile_id);
            return Ok(None);
        };

        let network = networks.network(profile.network_id)?;
        if network.is_none() {
            warn!(self.log, "network of vNIC profile not found";
                "nic" => %nic.id, "network" => %profile.network_id);
        }

        let (filter, filter_parameters) = match profile.network_filter_id {
            Some(filter_id) => match networks.network_filter(filter_id)? {
                Some(filter) => {
                    (Some(filter), networks.filter_parameters(nic.id)?)
                }
                None => (None, Vec::new()),
            },
            None => (None, Vec::new()),
        };

        Ok(Some(NicBacking { profile, network, filter, filter_parameters }))
    }

    fn write_cdroms(
        &self,
        w: &mut DocumentWriter,
        cdroms: &[Device],
        alloc: &mut DeviceIndexAllocator,
        boot: &BootOrder,
    ) -> Result<(), BuildError> {
        let vm = self.vm;
        let cd = alloc.cd_interface();

        for _ in cdroms.iter().filter(|d| d.is_payload()) {
            let index = alloc.reserve_payload();
            disk::write_payload_cdrom(w, cd, index)?;
        }

        let user_media = cdroms.iter().find(|d| !d.is_payload());
        let run_once_media =
            vm.run_once && vm.cd_path.as_deref().is_some_and(|p| !p.is_empty());
        if user_media.is_some() || run_once_media {
            let index = alloc.reserve_cdrom();
            let boot_order = user_media.map_or(0, |d| boot.for_device(d));
            disk::write_cdrom(w, vm, cd, index, user_media, boot_order)?;
        }
        Ok(())
    }

    fn write_disks(
        &mut self,
        w: &mut DocumentWriter,
        devices: &[Device],
        alloc: &mut DeviceIndexAllocator,
        boot: &BootOrder,
    ) -> Result<(), BuildError> {
        let vm = self.vm;
        let by_id: BTreeMap<DeviceId, &Device> =
            devices.iter().map(|d| (d.id, d)).collect();

        for disk in sorted_disks(vm) {
            let Some(&device) = by_id.get(&DeviceId::new(disk.id, vm.id)) else {
                // Memory volumes have no device.
                debug!(self.log, "disk has no plugged device";
                    "disk" => %disk.id);
                continue;
            };
            let index = alloc.next(disk.vm_element.interface);
            if !device.managed {
                continue;
            }

            let (block_domain, qos) = self.disk_storage(disk)?;
            let placed = PlacedDisk {
                device,
                disk,
                index,
                boot_order: boot.for_device(device),
                block_domain,
                qos: qos.as_ref(),
            };
            disk::write_disk(w, &self.log, &self.config, &placed)?;
        }
        Ok(())
    }

    /// Whether an image disk is on a block domain, and the QoS of its disk
    /// profile.
    fn disk_storage(
        &mut self,
        disk: &Disk,
    ) -> Result<(bool, Option<StorageQos>), BuildError> {
        let DiskBackend::Image(image) = &disk.backend else {
            return Ok((false, None));
        };
        let domain_id = *image
            .storage_ids
            .first()
            .ok_or(BuildError::NoStorageForImage(disk.id))?;
        let domain = self
            .inventory
            .storage
            .storage_domain(domain_id)?
            .ok_or(BuildError::MissingStorageDomain {
                disk: disk.id,
                domain: domain_id,
            })?;
        let qos = match image.disk_profile_id {
            Some(profile_id) => self.storage_qos(profile_id)?,
            None => None,
        };
        Ok((domain.storage_type.is_block_domain(), qos))
    }
}

fn find_nic<'v>(
    vm: &'v VirtualMachine,
    id: &DeviceId,
) -> Option<&'v VmNetworkInterface> {
    vm.interfaces
        .iter()
        .find(|nic| DeviceId::new(nic.id, nic.vm_id) == *id)
}

/// VM disks by alias, with boot disks first.
fn sorted_disks(vm: &VirtualMachine) -> Vec<&Disk> {
    let mut disks: Vec<&Disk> = vm.disks.iter().collect();
    disks.sort_by(|a, b| a.alias.cmp(&b.alias));
    disks.sort_by_key(|d| !d.vm_element.boot);
    disks
}
