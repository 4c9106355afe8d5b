// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Element encoders.
//!
//! Each encoder writes one element (or one domain section) into a
//! [`DocumentWriter`]. Encoders do not perform lookups: everything they need
//! is resolved by the builder and passed in.

use vmxml_types::DeviceAddress;

use crate::document::{DocumentError, DocumentWriter};

pub(crate) mod chardev;
pub(crate) mod disk;
pub(crate) mod domain;
pub(crate) mod graphics;
pub(crate) mod hostdev;
pub(crate) mod interface;
pub(crate) mod misc;

type Result = std::result::Result<(), DocumentError>;

/// Writes `<address .../>` unless the address is empty.
pub(crate) fn write_address(
    w: &mut DocumentWriter,
    address: &DeviceAddress,
) -> Result {
    if address.is_empty() {
        return Ok(());
    }
    w.element_with_attrs("address", address.iter())
}

/// Writes `<boot order="n"/>` for positive orders.
pub(crate) fn write_boot_order(w: &mut DocumentWriter, order: u32) -> Result {
    if order == 0 {
        return Ok(());
    }
    w.element_with_attrs("boot", [("order", order)])
}
