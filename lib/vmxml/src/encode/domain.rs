// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Domain-level sections: everything outside of `<devices>`.

use vmxml_types::ArchFamily;

use super::Result;
use crate::capability::BuildConfig;
use crate::document::DocumentWriter;
use crate::model::{CreateParams, VirtualMachine};

pub(crate) const TUNE_PREFIX: &str = "ovirt-tune";
pub(crate) const TUNE_URI: &str = "http://ovirt.org/vm/tune/1.0";
pub(crate) const VM_PREFIX: &str = "ovirt-vm";
pub(crate) const VM_URI: &str = "http://ovirt.org/vm/1.0";

const BOOT_MENU_TIMEOUT_MS: u32 = 10000;

/// Opens the `<domain>` root. The caller closes it.
pub(crate) fn start_domain(w: &mut DocumentWriter) -> Result {
    w.start_document()?;
    w.start_element("domain")?;
    w.attribute("type", "kvm")?;
    w.namespace(TUNE_PREFIX, TUNE_URI)?;
    w.namespace(VM_PREFIX, VM_URI)
}

/// `name`, `uuid`, `memory`, `currentMemory`, `iothreads`, `maxMemory` and
/// `vcpu`.
pub(crate) fn write_sizing(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
    cfg: &BuildConfig,
) -> Result {
    w.element("name", &vm.name)?;
    w.element("uuid", vm.id)?;

    let mem_kib = u64::from(vm.mem_size_mb) * 1024;
    w.element("memory", mem_kib)?;
    w.element("currentMemory", mem_kib)?;

    if vm.num_of_io_threads > 0 {
        w.element("iothreads", vm.num_of_io_threads)?;
    }

    // QEMU refuses a maxMemory equal to the current size.
    if cfg.hot_plug_memory && vm.mem_size_mb != vm.max_memory_size_mb {
        w.start_element("maxMemory")?;
        w.attribute("slots", cfg.constants.max_memory_slots)?;
        w.text(u64::from(vm.max_memory_size_mb) * 1024)?;
        w.end_element()?;
    }

    w.start_element("vcpu")?;
    w.attribute("current", vm.num_of_cpus())?;
    w.text(cfg.max_vcpus(vm))?;
    w.end_element()
}

pub(crate) fn write_metadata(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
) -> Result {
    w.start_element("metadata")?;

    w.start_ns_element(TUNE_PREFIX, "qos")?;
    w.end_element()?;

    w.start_ns_element(VM_PREFIX, "vm")?;
    w.start_element("minGuaranteedMemoryMb")?;
    w.attribute("type", "int")?;
    w.text(vm.min_allocated_mem_mb)?;
    w.end_element()?;
    w.element("clusterVersion", vm.compatibility_version)?;
    w.start_ns_element(VM_PREFIX, "custom")?;
    for (key, value) in &vm.custom_properties {
        w.ns_element(VM_PREFIX, key, value)?;
    }
    w.end_element()?;
    w.end_element()?;

    w.end_element()
}

/// SMBIOS system information. The `OS-*` and `HOST-SERIAL` values are
/// placeholders substituted on the host.
pub(crate) fn write_sysinfo(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
) -> Result {
    if vm.arch.family() != ArchFamily::X86 {
        return Ok(());
    }

    w.start_element("sysinfo")?;
    w.attribute("type", "smbios")?;
    w.start_element("system")?;
    let id = vm.id.to_string();
    for (name, value) in [
        ("manufacturer", "oVirt"),
        ("product", "OS-NAME:"),
        ("version", "OS-VERSION:"),
        ("serial", "HOST-SERIAL:"),
        ("uuid", id.as_str()),
    ] {
        w.start_element("entry")?;
        w.attribute("name", name)?;
        w.text(value)?;
        w.end_element()?;
    }
    w.end_element()?;
    w.end_element()
}

pub(crate) fn write_clock(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
    cfg: &BuildConfig,
) -> Result {
    w.start_element("clock")?;
    w.attribute("offset", "variable")?;
    w.attribute("adjustment", vm.time_zone_offset_secs.unwrap_or(0))?;

    if cfg.hyperv_enabled {
        w.element_with_attrs(
            "timer",
            [("name", "hypervclock"), ("present", "yes")],
        )?;
    }
    w.element_with_attrs(
        "timer",
        [("name", "rtc"), ("tickpolicy", "catchup")],
    )?;
    w.element_with_attrs("timer", [("name", "pit"), ("tickpolicy", "delay")])?;
    if vm.arch.family() == ArchFamily::X86 {
        w.element_with_attrs("timer", [("name", "hpet"), ("present", "no")])?;
    }

    w.end_element()
}

/// `on_reboot` for volatile runs, which must not survive a guest reboot.
pub(crate) fn write_power_events(
    w: &mut DocumentWriter,
    volatile: bool,
) -> Result {
    if volatile {
        w.element("on_reboot", "destroy")?;
    }
    Ok(())
}

pub(crate) fn write_features(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
    cfg: &BuildConfig,
) -> Result {
    if vm.arch.family() != ArchFamily::X86
        || !(vm.acpi_enabled || cfg.hyperv_enabled)
    {
        return Ok(());
    }

    w.start_element("features")?;
    if vm.acpi_enabled {
        w.empty_element("acpi")?;
    }
    if cfg.hyperv_enabled {
        w.start_element("hyperv")?;
        w.element_with_attrs("relaxed", [("state", "on")])?;
        w.element_with_attrs("vapic", [("state", "on")])?;
        w.element_with_attrs(
            "spinlocks",
            [("state", "on"), ("retries", "8191")],
        )?;
        w.end_element()?;
    }
    w.end_element()
}

pub(crate) fn write_cpu(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
    cfg: &BuildConfig,
    params: &CreateParams,
) -> Result {
    w.start_element("cpu")?;

    match vm.arch.family() {
        ArchFamily::X86 => {
            w.attribute("match", "exact")?;
            match params.cpu_type.as_str() {
                "hostPassthrough" => w.attribute("mode", "host-passthrough")?,
                "hostModel" => w.attribute("mode", "host-model")?,
                model => w.element("model", model)?,
            }
        }
        ArchFamily::Ppc => w.element("model", &params.cpu_type)?,
    }

    if cfg.constants.send_smp_on_run_vm {
        let cores = vm.cpu_per_socket.max(1);
        let threads = vm.threads_per_cpu.max(1);
        w.element_with_attrs(
            "topology",
            [
                ("cores", vm.cpu_per_socket),
                ("threads", vm.threads_per_cpu),
                ("sockets", cfg.max_vcpus(vm) / cores / threads),
            ],
        )?;
    }

    if let Some(nodes) = &params.numa_nodes {
        w.start_element("numa")?;
        for node in nodes {
            w.start_element("cell")?;
            w.attribute("cpus", &node.cpus)?;
            w.attribute("memory", node.memory_mb * 1024)?;
            w.end_element()?;
        }
        w.end_element()?;
    }

    w.end_element()
}

pub(crate) fn write_cputune(
    w: &mut DocumentWriter,
    params: &CreateParams,
) -> Result {
    let Some(pinning) = &params.cpu_pinning else {
        return Ok(());
    };

    w.start_element("cputune")?;
    for (vcpu, cpuset) in pinning {
        w.start_element("vcpupin")?;
        w.attribute("vcpu", vcpu)?;
        w.attribute("cpuset", cpuset)?;
        w.end_element()?;
    }
    w.end_element()
}

pub(crate) fn write_numatune(
    w: &mut DocumentWriter,
    params: &CreateParams,
) -> Result {
    let Some(tune) = &params.numa_tune else {
        return Ok(());
    };
    if tune.nodeset.is_none() && tune.memnodes.is_none() {
        return Ok(());
    }

    w.start_element("numatune")?;
    if let Some(nodeset) = &tune.nodeset {
        w.element_with_attrs(
            "memory",
            [("mode", tune.mode.as_str()), ("nodeset", nodeset.as_str())],
        )?;
    }
    for memnode in tune.memnodes.iter().flatten() {
        w.start_element("memnode")?;
        w.attribute("mode", &tune.mode)?;
        w.attribute("cellid", memnode.cell_id)?;
        w.attribute("nodeset", &memnode.nodeset)?;
        w.end_element()?;
    }
    w.end_element()
}

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

/// The `<os>` section. `serial_console` tells whether the device pass found
/// a serial console.
pub(crate) fn write_os(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
    cfg: &BuildConfig,
    serial_console: bool,
) -> Result {
    let x86 = vm.arch.family() == ArchFamily::X86;

    w.start_element("os")?;

    w.start_element("type")?;
    w.attribute("arch", vm.arch)?;
    w.attribute("machine", &cfg.emulated_machine)?;
    w.text("hvm")?;
    w.end_element()?;

    if let Some(initrd) = non_empty(&vm.initrd_url) {
        w.element("initrd", initrd)?;
    }
    if let Some(kernel) = non_empty(&vm.kernel_url) {
        w.element("kernel", kernel)?;
        if let Some(cmdline) = non_empty(&vm.kernel_params) {
            w.element("cmdline", cmdline)?;
        }
    }

    if x86 {
        w.element_with_attrs("smbios", [("mode", "sysinfo")])?;
    }

    if vm.boot_menu_enabled {
        w.start_element("bootmenu")?;
        w.attribute("enable", "yes")?;
        w.attribute("timeout", BOOT_MENU_TIMEOUT_MS)?;
        w.end_element()?;
    }

    if serial_console && x86 {
        w.element_with_attrs("bios", [("useserial", "yes")])?;
    }

    w.end_element()
}
