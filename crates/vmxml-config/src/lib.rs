// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use vmxml_types::{ArchitectureType, CdInterface, ChipsetType, Version};

/// Engine configuration consulted while building domain descriptors.
///
/// Every table is optional; an empty document is a valid configuration that
/// enables no version-gated features.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub engine: Engine,

    #[serde(default, rename = "feature")]
    pub features: Vec<FeatureSupport>,

    #[serde(default, rename = "os")]
    pub os_info: Vec<OsInfo>,

    /// Default machine type per architecture name, used when a VM does not
    /// name one itself.
    #[serde(default)]
    pub emulated_machine: BTreeMap<String, String>,

    /// SPICE channels to secure, keyed by compatibility version. Versions not
    /// listed fall back to `engine.spice_secure_channels`.
    #[serde(default)]
    pub spice_secure_channels: BTreeMap<String, Vec<String>>,
}

/// Scalar engine settings.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Engine {
    pub max_memory_slots: u32,
    pub send_smp_on_run_vm: bool,
    pub ssl_enabled: bool,
    pub vnc_keyboard_layout: String,
    pub max_num_of_vm_sockets: u32,
    pub max_num_of_vm_cpus: u32,
    pub spice_secure_channels: Vec<String>,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            max_memory_slots: 16,
            send_smp_on_run_vm: true,
            ssl_enabled: true,
            vnc_keyboard_layout: "en-us".to_string(),
            max_num_of_vm_sockets: 16,
            max_num_of_vm_cpus: 240,
            spice_secure_channels: [
                "smain",
                "sinputs",
                "scursor",
                "splayback",
                "srecord",
                "sdisplay",
                "ssmartcard",
                "susbredir",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Version-gated engine features.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    HotPlugMemory,
    HotPlugCpu,
    PassDiscard,
}

/// One row of the feature table. Empty `versions` or `arches` lists match
/// every version or architecture respectively.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FeatureSupport {
    pub name: Feature,

    #[serde(default)]
    pub versions: Vec<Version>,

    #[serde(default)]
    pub arches: Vec<ArchitectureType>,
}

impl FeatureSupport {
    fn matches(&self, version: Version, arch: ArchitectureType) -> bool {
        (self.versions.is_empty() || self.versions.contains(&version))
            && (self.arches.is_empty() || self.arches.contains(&arch))
    }
}

/// Guest operating system metadata.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct OsInfo {
    pub id: u32,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub hyperv: bool,

    /// Hyper-V enlightenments are only enabled from this version on.
    #[serde(default)]
    pub hyperv_min_version: Option<Version>,

    #[serde(default = "default_cd_interface")]
    pub cd_interface: CdInterface,

    #[serde(default = "default_cd_interface_q35")]
    pub cd_interface_q35: CdInterface,
}

fn default_cd_interface() -> CdInterface {
    CdInterface::Ide
}

fn default_cd_interface_q35() -> CdInterface {
    CdInterface::Sata
}

impl Config {
    pub fn is_supported(
        &self,
        feature: Feature,
        version: Version,
        arch: ArchitectureType,
    ) -> bool {
        self.features
            .iter()
            .any(|row| row.name == feature && row.matches(version, arch))
    }

    pub fn os(&self, os_id: u32) -> Option<&OsInfo> {
        self.os_info.iter().find(|os| os.id == os_id)
    }

    pub fn is_hyperv_enabled(&self, os_id: u32, version: Version) -> bool {
        self.os(os_id).is_some_and(|os| {
            os.hyperv
                && os.hyperv_min_version.map_or(true, |min| version >= min)
        })
    }

    /// The CD-ROM bus for a guest OS on the given chipset. Unknown operating
    /// systems get IDE on i440fx and SATA on q35.
    pub fn cd_interface(
        &self,
        os_id: u32,
        chipset: ChipsetType,
    ) -> CdInterface {
        match (self.os(os_id), chipset) {
            (Some(os), ChipsetType::I440Fx) => os.cd_interface,
            (Some(os), ChipsetType::Q35) => os.cd_interface_q35,
            (None, ChipsetType::I440Fx) => default_cd_interface(),
            (None, ChipsetType::Q35) => default_cd_interface_q35(),
        }
    }

    pub fn default_emulated_machine(&self, arch: ArchitectureType) -> String {
        if let Some(machine) = self.emulated_machine.get(arch.as_str()) {
            return machine.clone();
        }
        match arch {
            ArchitectureType::X86_64 => "pc-i440fx-rhel7.3.0",
            ArchitectureType::Ppc64 | ArchitectureType::Ppc64le => {
                "pseries-rhel7.3.0"
            }
        }
        .to_string()
    }

    pub fn spice_secure_channels(&self, version: Version) -> &[String] {
        self.spice_secure_channels
            .get(&version.to_string())
            .unwrap_or(&self.engine.spice_secure_channels)
    }
}

impl FromStr for Config {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str::<Config>(s)?)
    }
}

/// Errors which may be returned when parsing the engine configuration.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot parse toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses a TOML file into a configuration object.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Config, ParseError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    contents.parse()
}
