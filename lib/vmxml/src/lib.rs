// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Builds libvirt domain descriptors for oVirt virtual machines.
//!
//! A build takes a [`VirtualMachine`](model::VirtualMachine), the
//! parameters negotiated with the host it will start on, and an
//! [`Inventory`] of the stored entities it references, and produces the
//! domain XML handed to the host agent.

#![allow(clippy::style)]

pub mod boot;
pub mod capability;
pub mod document;
pub mod index;
pub mod inventory;
pub mod model;

mod builder;
mod classify;
mod encode;

pub use builder::{BuildError, BuildRequest, DomainXmlBuilder};
pub use capability::{BuildConfig, CapabilityResolver, EngineConstants};
pub use inventory::{
    DeviceStore, HostDeviceStore, Inventory, LookupError, MemoryInventory,
    NetworkStore, StorageStore,
};
