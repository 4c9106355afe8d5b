// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vmxml_types::DiskInterface;

/// A disk attached to a VM.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Disk {
    pub id: Uuid,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub shareable: bool,
    #[serde(default)]
    pub propagate_errors: bool,
    #[serde(default)]
    pub scsi_passthrough: bool,
    #[serde(default)]
    pub sgio: Option<ScsiGenericIo>,
    pub vm_element: DiskVmElement,
    pub backend: DiskBackend,
}

/// The per-VM attachment properties of a disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskVmElement {
    pub interface: DiskInterface,
    #[serde(default)]
    pub boot: bool,
    #[serde(default)]
    pub pass_discard: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScsiGenericIo {
    Filtered,
    Unfiltered,
}

impl ScsiGenericIo {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScsiGenericIo::Filtered => "filtered",
            ScsiGenericIo::Unfiltered => "unfiltered",
        }
    }
}

/// Where a disk's data lives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "storage_type", rename_all = "snake_case")]
pub enum DiskBackend {
    Image(ImageDisk),
    Lun(LunDisk),
    Network(NetworkVolume),
}

/// A volume inside a storage domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDisk {
    pub image_id: Uuid,
    pub storage_ids: Vec<Uuid>,
    pub storage_pool_id: Uuid,
    pub volume_format: VolumeFormat,
    #[serde(default)]
    pub disk_profile_id: Option<Uuid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeFormat {
    Cow,
    Raw,
}

/// A multipath LUN passed directly to the guest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunDisk {
    pub lun_id: String,
}

/// A volume served over the network by an external block service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkVolume {
    pub protocol: String,
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<VolumeHost>,
    #[serde(default)]
    pub auth: Option<VolumeAuth>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeHost {
    pub address: String,
    pub port: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAuth {
    pub username: String,
    pub secret_type: String,
    pub secret_uuid: Uuid,
}

/// Storage domain types; only the block-ness of the domain matters when
/// encoding disks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Nfs,
    Fcp,
    Iscsi,
    Localfs,
    Posixfs,
    Glusterfs,
}

impl StorageType {
    pub fn is_block_domain(&self) -> bool {
        matches!(self, StorageType::Fcp | StorageType::Iscsi)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDomain {
    pub id: Uuid,
    pub storage_type: StorageType,
}

/// Disk I/O limits attached to a disk profile. Throughput values are in MiB
/// per second.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageQos {
    pub max_throughput: Option<u64>,
    pub max_read_throughput: Option<u64>,
    pub max_write_throughput: Option<u64>,
    pub max_iops: Option<u64>,
    pub max_read_iops: Option<u64>,
    pub max_write_iops: Option<u64>,
}

impl StorageQos {
    /// The limits as libvirt `iotune` attributes, in emission order.
    pub fn io_tune(&self) -> Vec<(&'static str, u64)> {
        const MIB: u64 = 1024 * 1024;
        [
            ("total_bytes_sec", self.max_throughput.map(|v| v * MIB)),
            ("read_bytes_sec", self.max_read_throughput.map(|v| v * MIB)),
            ("write_bytes_sec", self.max_write_throughput.map(|v| v * MIB)),
            ("total_iops_sec", self.max_iops),
            ("read_iops_sec", self.max_read_iops),
            ("write_iops_sec", self.max_write_iops),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn backend_is_tagged_by_storage_type() {
        let disk: Disk = serde_json::from_value(json!({
            "id": "2d2b3f4e-0000-4000-8000-000000000001",
            "alias": "vm0_Disk1",
            "vm_element": { "interface": "virtio", "boot": true },
            "backend": {
                "storage_type": "lun",
                "lun_id": "3600a0b80005b10ca00008e254c7726da",
            },
        }))
        .unwrap();
        assert_eq!(
            disk.backend,
            DiskBackend::Lun(LunDisk {
                lun_id: "3600a0b80005b10ca00008e254c7726da".to_string()
            })
        );
        assert!(disk.vm_element.boot);
        assert!(!disk.shareable);
    }

    #[test]
    fn io_tune_skips_unset_limits() {
        let qos = StorageQos {
            max_throughput: Some(10),
            max_write_iops: Some(500),
            ..Default::default()
        };
        assert_eq!(
            qos.io_tune(),
            [("total_bytes_sec", 10 * 1024 * 1024), ("write_iops_sec", 500)]
        );
    }
}
