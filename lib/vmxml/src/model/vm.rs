// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use vmxml_types::{ArchitectureType, DisplayType, GraphicsType, Version};

use super::{Disk, VmNetworkInterface};

/// A virtual machine as stored by the engine, together with the dynamic
/// state relevant to starting it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: Uuid,
    pub name: String,
    pub cluster_id: Uuid,

    pub mem_size_mb: u32,
    pub max_memory_size_mb: u32,
    #[serde(default)]
    pub min_allocated_mem_mb: u32,
    #[serde(default)]
    pub num_of_io_threads: u32,

    pub num_of_sockets: u32,
    pub cpu_per_socket: u32,
    pub threads_per_cpu: u32,

    pub arch: ArchitectureType,
    #[serde(default)]
    pub emulated_machine: Option<String>,
    pub compatibility_version: Version,
    pub os_id: u32,
    #[serde(default)]
    pub boot_sequence: BootSequence,

    #[serde(default)]
    pub default_display_type: Option<DisplayType>,
    #[serde(default)]
    pub graphics_infos: BTreeMap<GraphicsType, GraphicsInfo>,
    #[serde(default = "enabled")]
    pub spice_file_transfer_enabled: bool,
    #[serde(default = "enabled")]
    pub spice_copy_paste_enabled: bool,
    /// Keyboard layout chosen for this particular run.
    #[serde(default)]
    pub vnc_keyboard_layout: Option<String>,
    #[serde(default)]
    pub default_vnc_keyboard_layout: Option<String>,

    #[serde(default)]
    pub lease: Option<VmLease>,
    #[serde(default)]
    pub custom_properties: BTreeMap<String, String>,
    /// Guest clock offset from UTC.
    #[serde(default)]
    pub time_zone_offset_secs: Option<i32>,
    #[serde(default)]
    pub acpi_enabled: bool,
    #[serde(default)]
    pub boot_menu_enabled: bool,

    #[serde(default)]
    pub kernel_url: Option<String>,
    #[serde(default)]
    pub kernel_params: Option<String>,
    #[serde(default)]
    pub initrd_url: Option<String>,
    #[serde(default)]
    pub cd_path: Option<String>,
    #[serde(default)]
    pub floppy_path: Option<String>,
    #[serde(default)]
    pub run_once: bool,

    #[serde(default)]
    pub interfaces: Vec<VmNetworkInterface>,
    #[serde(default)]
    pub disks: Vec<Disk>,
}

fn enabled() -> bool {
    true
}

impl VirtualMachine {
    pub fn num_of_cpus(&self) -> u32 {
        self.num_of_sockets * self.cpu_per_socket * self.threads_per_cpu
    }

    /// The largest vCPU count reachable by hot-plugging whole sockets, given
    /// the engine's socket and vCPU limits.
    pub fn max_vcpus(&self, max_sockets: u32, max_cpus: u32) -> u32 {
        let per_socket = self.cpu_per_socket * self.threads_per_cpu;
        if per_socket == 0 {
            return self.num_of_cpus();
        }
        per_socket * max_sockets.min(max_cpus / per_socket)
    }

    pub fn custom_property(&self, name: &str) -> Option<&str> {
        self.custom_properties.get(name).map(String::as_str)
    }
}

/// Connection details of one remote display protocol.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsInfo {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<i32>,
    #[serde(default)]
    pub tls_port: Option<i32>,
}

/// A VM lease held on a storage domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmLease {
    pub storage_domain_id: Uuid,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Device classes that may take part in boot ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootDevice {
    Disk,
    Cdrom,
    Network,
}

impl BootDevice {
    fn letter(&self) -> char {
        match self {
            BootDevice::Disk => 'C',
            BootDevice::Cdrom => 'D',
            BootDevice::Network => 'N',
        }
    }
}

/// Ordered boot device classes, written as letters: `C` disk, `D` CD-ROM,
/// `N` network. The default is `C`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootSequence(Vec<BootDevice>);

impl BootSequence {
    pub fn new(devices: Vec<BootDevice>) -> Self {
        Self(devices)
    }

    pub fn iter(&self) -> impl Iterator<Item = BootDevice> + '_ {
        self.0.iter().copied()
    }
}

impl Default for BootSequence {
    fn default() -> Self {
        Self(vec![BootDevice::Disk])
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid boot sequence {0:?}")]
pub struct BootSequenceError(String);

impl FromStr for BootSequence {
    type Err = BootSequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut devices = Vec::new();
        for c in s.chars() {
            let dev = match c.to_ascii_uppercase() {
                'C' => BootDevice::Disk,
                'D' => BootDevice::Cdrom,
                'N' => BootDevice::Network,
                _ => return Err(BootSequenceError(s.to_owned())),
            };
            if devices.contains(&dev) {
                return Err(BootSequenceError(s.to_owned()));
            }
            devices.push(dev);
        }
        if devices.is_empty() {
            return Err(BootSequenceError(s.to_owned()));
        }
        Ok(Self(devices))
    }
}

impl fmt::Display for BootSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|dev| write!(f, "{}", dev.letter()))
    }
}

impl Serialize for BootSequence {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'d> Deserialize<'d> for BootSequence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The parameter bag negotiated with the destination host before a start.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateParams {
    /// CPU model name, or one of `hostPassthrough` / `hostModel`.
    pub cpu_type: String,
    /// vCPU number to host cpuset.
    #[serde(default)]
    pub cpu_pinning: Option<BTreeMap<u32, String>>,
    #[serde(default)]
    pub numa_nodes: Option<Vec<NumaNode>>,
    #[serde(default)]
    pub numa_tune: Option<NumaTune>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumaNode {
    pub cpus: String,
    pub memory_mb: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumaTune {
    pub mode: String,
    #[serde(default)]
    pub nodeset: Option<String>,
    #[serde(default)]
    pub memnodes: Option<Vec<MemNode>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemNode {
    pub cell_id: u32,
    pub nodeset: String,
}
