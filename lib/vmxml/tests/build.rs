// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use proptest::prelude::*;
use serde_json::{json, Value};
use slog::Logger;
use uuid::Uuid;

use vmxml::index::{make_disk_name, TargetBus};
use vmxml::model::{
    CreateParams, Device, DeviceGeneralType, DeviceId, StorageDomain,
    StorageType, VirtualMachine, PAYLOAD_KEY,
};
use vmxml::{BuildRequest, DomainXmlBuilder, Inventory, MemoryInventory};

const VM_ID: Uuid = Uuid::from_u128(0x1000);
const NFS_DOMAIN: Uuid = Uuid::from_u128(0x2000);
const ISCSI_DOMAIN: Uuid = Uuid::from_u128(0x2001);

fn logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

fn base_vm() -> Value {
    json!({
        "id": VM_ID,
        "name": "test-vm",
        "cluster_id": "00000000-0000-0000-0000-00000000c100",
        "mem_size_mb": 1024,
        "max_memory_size_mb": 1024,
        "num_of_sockets": 2,
        "cpu_per_socket": 1,
        "threads_per_cpu": 1,
        "arch": "x86_64",
        "compatibility_version": "4.1",
        "os_id": 0,
        "acpi_enabled": true,
    })
}

fn vm_from(value: Value) -> VirtualMachine {
    serde_json::from_value(value).unwrap()
}

fn image_disk(n: u128, iface: &str, domain: Uuid) -> Value {
    json!({
        "id": Uuid::from_u128(n),
        "alias": format!("disk{n:03}"),
        "vm_element": { "interface": iface },
        "backend": {
            "storage_type": "image",
            "image_id": Uuid::from_u128(n + 0x10000),
            "storage_ids": [domain],
            "storage_pool_id": Uuid::from_u128(0x3000),
            "volume_format": "cow",
        },
    })
}

fn device(n: u128, ty: DeviceGeneralType, name: &str) -> Device {
    Device::new(DeviceId::new(Uuid::from_u128(n), VM_ID), ty, name)
}

fn payload_cdrom(n: u128) -> Device {
    let mut cd = device(n, DeviceGeneralType::Disk, "cdrom");
    cd.spec_params
        .insert(PAYLOAD_KEY.to_string(), json!({ "volId": "config-2" }));
    cd
}

fn inventory(devices: Vec<Device>) -> MemoryInventory {
    MemoryInventory {
        devices,
        storage_domains: vec![
            StorageDomain { id: NFS_DOMAIN, storage_type: StorageType::Nfs },
            StorageDomain {
                id: ISCSI_DOMAIN,
                storage_type: StorageType::Iscsi,
            },
        ],
        ..Default::default()
    }
}

fn build_with(
    vm: &VirtualMachine,
    inventory: &MemoryInventory,
    config: &vmxml_config::Config,
) -> String {
    let params = CreateParams {
        cpu_type: "Haswell-noTSX".to_string(),
        ..Default::default()
    };
    let request = BuildRequest {
        vm,
        host_id: Uuid::from_u128(0x4000),
        params: &params,
        run_once_payload: None,
        volatile: false,
    };
    DomainXmlBuilder::new(
        &logger(),
        request,
        Inventory::from_store(inventory),
        config,
    )
    .build()
    .unwrap()
}

fn build(vm: &VirtualMachine, inventory: &MemoryInventory) -> String {
    build_with(vm, inventory, &vmxml_config::Config::default())
}

#[test]
fn vm_without_devices() {
    let vm = vm_from(base_vm());
    let xml = build(&vm, &inventory(vec![]));

    assert!(xml.starts_with(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><domain type=\"kvm\" \
         xmlns:ovirt-tune=\"http://ovirt.org/vm/tune/1.0\" \
         xmlns:ovirt-vm=\"http://ovirt.org/vm/1.0\">\
         <name>test-vm</name>"
    ));
    assert!(xml.contains(
        "<memory>1048576</memory><currentMemory>1048576</currentMemory>"
    ));
    assert!(!xml.contains("<maxMemory"));
    assert!(xml.contains("<vcpu current=\"2\">2</vcpu>"));
    assert!(xml.contains("<features><acpi/></features>"));
    assert!(
        xml.contains("<topology cores=\"1\" threads=\"1\" sockets=\"2\"/>")
    );
    assert!(xml.contains("<input type=\"mouse\" bus=\"ps2\"/>"));
    assert!(xml.contains("<memballoon model=\"none\"/>"));
    assert!(xml.contains(
        "<os><type arch=\"x86_64\" machine=\"pc-i440fx-rhel7.3.0\">hvm</type>\
         <smbios mode=\"sysinfo\"/></os></domain>"
    ));
    assert!(!xml.contains("<disk"));
    assert!(!xml.contains("<interface"));
}

#[test]
fn features_are_omitted_without_acpi_or_hyperv() {
    let mut value = base_vm();
    value["acpi_enabled"] = json!(false);
    let xml = build(&vm_from(value), &inventory(vec![]));
    assert!(!xml.contains("<features"));

    let xml = build(&vm_from(base_vm()), &inventory(vec![]));
    assert_eq!(xml.matches("<acpi/>").count(), 1);
}

#[test]
fn hot_pluggable_memory_sets_max_memory() {
    let config: vmxml_config::Config =
        "[[feature]]\nname = \"hot_plug_memory\"\n".parse().unwrap();
    let mut value = base_vm();
    value["max_memory_size_mb"] = json!(4096);
    let xml = build_with(&vm_from(value), &inventory(vec![]), &config);
    assert!(xml.contains("<maxMemory slots=\"16\">4194304</maxMemory>"));

    // Equal sizes never produce maxMemory.
    let xml = build_with(&vm_from(base_vm()), &inventory(vec![]), &config);
    assert!(!xml.contains("<maxMemory"));
}

#[test]
fn qcow2_disk_on_block_domain() {
    let mut value = base_vm();
    value["disks"] = json!([image_disk(1, "virtio", ISCSI_DOMAIN)]);
    let vm = vm_from(value);
    let xml = build(
        &vm,
        &inventory(vec![device(1, DeviceGeneralType::Disk, "disk")]),
    );
    assert!(xml.contains(
        "<disk snapshot=\"no\" type=\"block\" device=\"disk\">\
         <target dev=\"vda\" bus=\"virtio\"/>"
    ));
    assert!(xml.contains(
        "<driver name=\"qemu\" io=\"native\" type=\"qcow2\" \
         error_policy=\"stop\" cache=\"none\"/>"
    ));
    let serial = format!("<serial>{}</serial>", Uuid::from_u128(1));
    assert!(xml.contains(&serial));
}

#[test]
fn cdrom_indices_do_not_collide_with_disks() {
    let mut value = base_vm();
    value["cd_path"] = json!("/iso/install.iso");
    value["disks"] = json!([
        image_disk(1, "ide", NFS_DOMAIN),
        image_disk(2, "ide", NFS_DOMAIN),
        image_disk(3, "ide", NFS_DOMAIN),
    ]);
    let vm = vm_from(value);
    let devices = vec![
        device(1, DeviceGeneralType::Disk, "disk"),
        device(2, DeviceGeneralType::Disk, "disk"),
        device(3, DeviceGeneralType::Disk, "disk"),
        device(10, DeviceGeneralType::Disk, "cdrom"),
        payload_cdrom(11),
    ];
    let xml = build(&vm, &inventory(devices));

    assert!(xml.contains(
        "<source file=\"PAYLOAD:\" startupPolicy=\"optional\"/>\
         <target dev=\"hdb\" bus=\"ide\"/>"
    ));
    assert!(xml.contains(
        "<source file=\"/iso/install.iso\" startupPolicy=\"optional\"/>\
         <target dev=\"hdc\" bus=\"ide\"/>"
    ));
    for dev in ["hda", "hdd", "hde"] {
        assert_eq!(
            xml.matches(&format!("<target dev=\"{dev}\"")).count(),
            1,
            "{dev}"
        );
    }
    assert_eq!(xml.matches("<target dev=\"hd").count(), 5);
}

#[test]
fn run_once_without_display() {
    let mut value = base_vm();
    value["run_once"] = json!(true);
    value["default_display_type"] = json!("none");
    value["graphics_infos"] = json!({ "spice": {} });
    let devices = vec![
        device(1, DeviceGeneralType::Video, "qxl"),
        device(2, DeviceGeneralType::Graphics, "spice"),
    ];

    let stored = build(&vm_from(base_vm()), &inventory(devices.clone()));
    assert!(stored.contains("<video>"));
    assert!(stored.contains("<graphics type=\"spice\""));

    let xml = build(&vm_from(value), &inventory(devices));
    assert!(!xml.contains("<video"));
    assert!(!xml.contains("<graphics"));
    assert!(!xml.contains("spicevmc"));
}

#[test]
fn builds_are_deterministic() {
    let mut value = base_vm();
    value["disks"] = json!([
        image_disk(2, "virtio", NFS_DOMAIN),
        image_disk(1, "virtio_scsi", ISCSI_DOMAIN),
    ]);
    let vm = vm_from(value);
    let devices = vec![
        device(1, DeviceGeneralType::Disk, "disk"),
        device(2, DeviceGeneralType::Disk, "disk"),
        device(3, DeviceGeneralType::Controller, "virtio-scsi"),
        device(4, DeviceGeneralType::Video, "qxl"),
        device(5, DeviceGeneralType::Graphics, "spice"),
        payload_cdrom(6),
    ];
    let inventory = inventory(devices);
    assert_eq!(build(&vm, &inventory), build(&vm, &inventory));
}

#[test]
fn volatile_runs_destroy_on_reboot() {
    let vm = vm_from(base_vm());
    let inventory = inventory(vec![]);
    let params = CreateParams::default();
    let request = BuildRequest {
        vm: &vm,
        host_id: Uuid::from_u128(0x4000),
        params: &params,
        run_once_payload: None,
        volatile: true,
    };
    let config = vmxml_config::Config::default();
    let xml = DomainXmlBuilder::new(
        &logger(),
        request,
        Inventory::from_store(&inventory),
        &config,
    )
    .build()
    .unwrap();
    assert!(xml.contains("<on_reboot>destroy</on_reboot>"));
}

proptest! {
    #[test]
    fn disk_names_are_contiguous(count in 1u128..40) {
        let disks: Vec<Value> = (1..=count)
            .map(|n| image_disk(n, "virtio", NFS_DOMAIN))
            .collect();
        let mut value = base_vm();
        value["disks"] = Value::Array(disks);
        let vm = vm_from(value);
        let devices = (1..=count)
            .map(|n| device(n, DeviceGeneralType::Disk, "disk"))
            .collect();

        let xml = build(&vm, &inventory(devices));
        prop_assert_eq!(xml.matches("<disk ").count() as u128, count);
        for index in 0..count as u32 {
            let name = make_disk_name(TargetBus::Virtio, index);
            let target = format!("<target dev=\"{name}\" bus=\"virtio\"/>");
            prop_assert_eq!(xml.matches(&target).count(), 1);
        }
    }
}
