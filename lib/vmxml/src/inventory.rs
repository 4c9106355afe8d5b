// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only access to the entities a build consults besides the VM itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{
    Device, FilterParameter, HostDevice, Network, NetworkFilter, StorageDomain,
    StorageQos, VnicProfile,
};

/// Failure of a collaborator lookup. Any such failure aborts the build.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("{store} store unavailable: {reason}")]
    Unavailable { store: &'static str, reason: String },

    #[error("{store} store returned inconsistent data for {id}: {reason}")]
    Inconsistent { store: &'static str, id: String, reason: String },
}

#[cfg_attr(test, mockall::automock)]
pub trait DeviceStore {
    fn devices_for_vm(&self, vm_id: Uuid) -> Result<Vec<Device>, LookupError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait HostDeviceStore {
    fn host_devices(
        &self,
        host_id: Uuid,
    ) -> Result<Vec<HostDevice>, LookupError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait NetworkStore {
    fn vnic_profile(
        &self,
        id: Uuid,
    ) -> Result<Option<VnicProfile>, LookupError>;

    fn network(&self, id: Uuid) -> Result<Option<Network>, LookupError>;

    fn network_filter(
        &self,
        id: Uuid,
    ) -> Result<Option<NetworkFilter>, LookupError>;

    fn filter_parameters(
        &self,
        nic_id: Uuid,
    ) -> Result<Vec<FilterParameter>, LookupError>;

    /// The network carrying display traffic in a cluster, if one is set.
    fn display_network(
        &self,
        cluster_id: Uuid,
    ) -> Result<Option<Network>, LookupError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait StorageStore {
    fn storage_domain(
        &self,
        id: Uuid,
    ) -> Result<Option<StorageDomain>, LookupError>;

    fn storage_qos(
        &self,
        disk_profile_id: Uuid,
    ) -> Result<Option<StorageQos>, LookupError>;
}

/// The set of stores a build reads from.
#[derive(Clone, Copy)]
pub struct Inventory<'a> {
    pub devices: &'a dyn DeviceStore,
    pub host_devices: &'a dyn HostDeviceStore,
    pub networks: &'a dyn NetworkStore,
    pub storage: &'a dyn StorageStore,
}

impl<'a> Inventory<'a> {
    /// Uses one object for every store.
    pub fn from_store<S>(store: &'a S) -> Self
    where
        S: DeviceStore + HostDeviceStore + NetworkStore + StorageStore,
    {
        Self {
            devices: store,
            host_devices: store,
            networks: store,
            storage: store,
        }
    }
}

/// An inventory held entirely in memory, loadable from JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryInventory {
    pub devices: Vec<Device>,
    /// Host devices keyed by host id.
    pub host_devices: BTreeMap<Uuid, Vec<HostDevice>>,
    pub vnic_profiles: Vec<VnicProfile>,
    pub networks: Vec<Network>,
    pub network_filters: Vec<NetworkFilter>,
    /// Filter parameters keyed by NIC id.
    pub filter_parameters: BTreeMap<Uuid, Vec<FilterParameter>>,
    /// Display network id keyed by cluster id.
    pub display_networks: BTreeMap<Uuid, Uuid>,
    pub storage_domains: Vec<StorageDomain>,
    /// Storage QoS keyed by disk profile id.
    pub storage_qos: BTreeMap<Uuid, StorageQos>,
}

impl MemoryInventory {
    fn find_network(&self, id: Uuid) -> Option<Network> {
        self.networks.iter().find(|n| n.id == id).cloned()
    }
}

impl DeviceStore for MemoryInventory {
    fn devices_for_vm(&self, vm_id: Uuid) -> Result<Vec<Device>, LookupError> {
        Ok(self
            .devices
            .iter()
            .filter(|d| d.id.vm_id == vm_id)
            .cloned()
            .collect())
    }
}

impl HostDeviceStore for MemoryInventory {
    fn host_devices(
        &self,
        host_id: Uuid,
    ) -> Result<Vec<HostDevice>, LookupError> {
        Ok(self.host_devices.get(&host_id).cloned().unwrap_or_default())
    }
}

impl NetworkStore for MemoryInventory {
    fn vnic_profile(
        &self,
        id: Uuid,
    ) -> Result<Option<VnicProfile>, LookupError> {
        Ok(self.vnic_profiles.iter().find(|p| p.id == id).cloned())
    }

    fn network(&self, id: Uuid) -> Result<Option<Network>, LookupError> {
        Ok(self.find_network(id))
    }

    fn network_filter(
        &self,
        id: Uuid,
    ) -> Result<Option<NetworkFilter>, LookupError> {
        Ok(self.network_filters.iter().find(|f| f.id == id).cloned())
    }

    fn filter_parameters(
        &self,
        nic_id: Uuid,
    ) -> Result<Vec<FilterParameter>, LookupError> {
        Ok(self.filter_parameters.get(&nic_id).cloned().unwrap_or_default())
    }

    fn display_network(
        &self,
        cluster_id: Uuid,
    ) -> Result<Option<Network>, LookupError> {
        let Some(&network_id) = self.display_networks.get(&cluster_id) else {
            return Ok(None);
        };
        match self.find_network(network_id) {
            Some(network) => Ok(Some(network)),
            None => Err(LookupError::Inconsistent {
                store: "network",
                id: cluster_id.to_string(),
                reason: format!(
                    "display network {network_id} is not a known network"
                ),
            }),
        }
    }
}

impl StorageStore for MemoryInventory {
    fn storage_domain(
        &self,
        id: Uuid,
    ) -> Result<Option<StorageDomain>, LookupError> {
        Ok(self.storage_domains.iter().find(|d| d.id == id).cloned())
    }

    fn storage_qos(
        &self,
        disk_profile_id: Uuid,
    ) -> Result<Option<StorageQos>, LookupError> {
        Ok(self.storage_qos.get(&disk_profile_id).cloned())
    }
}
