// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine capabilities and settings, resolved once per build.

use vmxml_types::{ArchitectureType, CdInterface, ChipsetType, Version};

pub use vmxml_config::Feature;

use crate::model::VirtualMachine;

/// Engine settings that do not depend on the VM beyond its version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConstants {
    pub max_memory_slots: u32,
    pub send_smp_on_run_vm: bool,
    pub ssl_enabled: bool,
    pub vnc_keyboard_layout: String,
    pub max_num_of_vm_sockets: u32,
    pub max_num_of_vm_cpus: u32,
    pub spice_secure_channels: Vec<String>,
}

/// Answers capability and metadata questions about VM configurations.
#[cfg_attr(test, mockall::automock)]
pub trait CapabilityResolver {
    fn is_supported(
        &self,
        feature: Feature,
        version: Version,
        arch: ArchitectureType,
    ) -> bool;

    fn is_hyperv_enabled(&self, os_id: u32, version: Version) -> bool;

    fn cd_interface(
        &self,
        os_id: u32,
        version: Version,
        chipset: ChipsetType,
    ) -> CdInterface;

    fn default_emulated_machine(&self, arch: ArchitectureType) -> String;

    fn constants(&self, version: Version) -> EngineConstants;
}

impl CapabilityResolver for vmxml_config::Config {
    fn is_supported(
        &self,
        feature: Feature,
        version: Version,
        arch: ArchitectureType,
    ) -> bool {
        vmxml_config::Config::is_supported(self, feature, version, arch)
    }

    fn is_hyperv_enabled(&self, os_id: u32, version: Version) -> bool {
        vmxml_config::Config::is_hyperv_enabled(self, os_id, version)
    }

    fn cd_interface(
        &self,
        os_id: u32,
        _version: Version,
        chipset: ChipsetType,
    ) -> CdInterface {
        vmxml_config::Config::cd_interface(self, os_id, chipset)
    }

    fn default_emulated_machine(&self, arch: ArchitectureType) -> String {
        vmxml_config::Config::default_emulated_machine(self, arch)
    }

    fn constants(&self, version: Version) -> EngineConstants {
        let engine = &self.engine;
        EngineConstants {
            max_memory_slots: engine.max_memory_slots,
            send_smp_on_run_vm: engine.send_smp_on_run_vm,
            ssl_enabled: engine.ssl_enabled,
            vnc_keyboard_layout: engine.vnc_keyboard_layout.clone(),
            max_num_of_vm_sockets: engine.max_num_of_vm_sockets,
            max_num_of_vm_cpus: engine.max_num_of_vm_cpus,
            spice_secure_channels: self
                .spice_secure_channels(version)
                .to_vec(),
        }
    }
}

/// Everything a build needs to know about the engine, resolved for one VM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildConfig {
    pub hot_plug_memory: bool,
    pub hot_plug_cpu: bool,
    pub pass_discard: bool,
    pub hyperv_enabled: bool,
    pub chipset: ChipsetType,
    pub cd_interface: CdInterface,
    pub emulated_machine: String,
    pub constants: EngineConstants,
}

impl BuildConfig {
    pub fn resolve(
        resolver: &dyn CapabilityResolver,
        vm: &VirtualMachine,
    ) -> Self {
        let version = vm.compatibility_version;
        let arch = vm.arch;
        let chipset =
            ChipsetType::from_machine_type(vm.emulated_machine.as_deref());
        BuildConfig {
            hot_plug_memory: resolver.is_supported(
                Feature::HotPlugMemory,
                version,
                arch,
            ),
            hot_plug_cpu: resolver.is_supported(
                Feature::HotPlugCpu,
                version,
                arch,
            ),
            pass_discard: resolver.is_supported(
                Feature::PassDiscard,
                version,
                arch,
            ),
            hyperv_enabled: resolver.is_hyperv_enabled(vm.os_id, version),
            chipset,
            cd_interface: resolver.cd_interface(vm.os_id, version, chipset),
            emulated_machine: vm
                .emulated_machine
                .clone()
                .unwrap_or_else(|| resolver.default_emulated_machine(arch)),
            constants: resolver.constants(version),
        }
    }

    /// The vCPU count the VM may grow to.
    pub fn max_vcpus(&self, vm: &VirtualMachine) -> u32 {
        if self.hot_plug_cpu {
            vm.max_vcpus(
                self.constants.max_num_of_vm_sockets,
                self.constants.max_num_of_vm_cpus,
            )
        } else {
            vm.num_of_cpus()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mockall::predicate::*;

    #[test]
    fn resolve_queries_each_feature_once() {
        let vm: VirtualMachine = serde_json::from_value(serde_json::json!({
            "id": "00000000-0000-0000-0000-000000000001",
            "name": "vm",
            "cluster_id": "00000000-0000-0000-0000-000000000002",
            "mem_size_mb": 512,
            "max_memory_size_mb": 512,
            "num_of_sockets": 1,
            "cpu_per_socket": 1,
            "threads_per_cpu": 1,
            "arch": "ppc64le",
            "emulated_machine": "pseries-rhel7.5.0",
            "compatibility_version": "4.2",
            "os_id": 33,
        }))
        .unwrap();

        let mut resolver = MockCapabilityResolver::new();
        resolver
            .expect_is_supported()
            .with(
                eq(Feature::HotPlugMemory),
                eq(Version::new(4, 2)),
                eq(ArchitectureType::Ppc64le),
            )
            .times(1)
            .return_const(true);
        resolver
            .expect_is_supported()
            .withf(|feature, _, _| *feature != Feature::HotPlugMemory)
            .times(2)
            .return_const(false);
        resolver
            .expect_is_hyperv_enabled()
            .with(eq(33), always())
            .return_const(false);
        resolver
            .expect_cd_interface()
            .with(eq(33), always(), eq(ChipsetType::I440Fx))
            .return_const(CdInterface::Scsi);
        resolver.expect_default_emulated_machine().never();
        resolver.expect_constants().return_const(EngineConstants {
            max_memory_slots: 16,
            send_smp_on_run_vm: true,
            ssl_enabled: false,
            vnc_keyboard_layout: "en-us".to_string(),
            max_num_of_vm_sockets: 16,
            max_num_of_vm_cpus: 240,
            spice_secure_channels: vec![],
        });

        let cfg = BuildConfig::resolve(&resolver, &vm);
        assert!(cfg.hot_plug_memory);
        assert!(!cfg.hot_plug_cpu);
        assert_eq!(cfg.cd_interface, CdInterface::Scsi);
        assert_eq!(cfg.emulated_machine, "pseries-rhel7.5.0");
        assert_eq!(cfg.max_vcpus(&vm), 1);
    }

    #[test]
    fn config_file_resolution() {
        let cfg: vmxml_config::Config = r#"
[[feature]]
name = "hot_plug_cpu"
versions = ["4.1"]
"#
        .parse()
        .unwrap();
        assert!(CapabilityResolver::is_supported(
            &cfg,
            Feature::HotPlugCpu,
            Version::new(4, 1),
            ArchitectureType::X86_64,
        ));
        assert_eq!(
            CapabilityResolver::constants(&cfg, Version::new(4, 1))
                .spice_secure_channels
                .len(),
            8
        );
    }
}
