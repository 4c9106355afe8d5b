// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The inputs of a descriptor build: the VM entity, its stored devices, the
//! disks and network interfaces attached to it, and the parameters
//! negotiated with the host that will run it.
//!
//! Everything here derives serde so that callers (and the standalone
//! harness) can load these records from JSON.

mod device;
mod disk;
mod network;
mod vm;

pub use device::*;
pub use disk::*;
pub use network::*;
pub use vm::*;
