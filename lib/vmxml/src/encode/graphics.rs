// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote display (`graphics`) devices.

use slog::{warn, Logger};
use vmxml_types::GraphicsType;

use super::Result;
use crate::capability::BuildConfig;
use crate::classify::GraphicsParams;
use crate::document::DocumentWriter;
use crate::model::{Network, VirtualMachine};

/// Lets libvirt pick the port.
const PORT_AUTOSELECT: i32 = -1;

/// Ticket fields the host replaces when the display is connected.
const PASSWORD_PLACEHOLDER: &str = "*****";
const PASSWORD_VALID_TO: &str = "1970-01-01T00:00:01";

const SPICE_CHANNEL_NAMES: [&str; 8] = [
    "main", "display", "inputs", "cursor", "playback", "record", "smartcard",
    "usbredir",
];

/// Maps configured SPICE channel names to libvirt names. Legacy names carry
/// an `s` prefix (`smain`, `sdisplay`, ...). Unknown names are dropped.
pub(crate) fn secure_channel_names<'a>(
    log: &Logger,
    configured: &'a [String],
) -> Vec<&'a str> {
    configured
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .filter_map(|channel| {
            if SPICE_CHANNEL_NAMES.contains(&channel) {
                return Some(channel);
            }
            match channel.strip_prefix('s') {
                Some(legacy) if SPICE_CHANNEL_NAMES.contains(&legacy) => {
                    Some(legacy)
                }
                _ => {
                    warn!(log, "ignoring unsupported spice channel";
                        "channel" => channel);
                    None
                }
            }
        })
        .collect()
}

pub(crate) fn write_graphics(
    w: &mut DocumentWriter,
    log: &Logger,
    vm: &VirtualMachine,
    cfg: &BuildConfig,
    graphics: &GraphicsParams,
    display_network: Option<&Network>,
) -> Result {
    w.start_element("graphics")?;
    w.attribute("type", graphics.graphics_type)?;
    w.attribute("port", PORT_AUTOSELECT)?;
    w.attribute("autoport", "yes")?;
    w.attribute("passwd", PASSWORD_PLACEHOLDER)?;
    w.attribute("passwdValidTo", PASSWORD_VALID_TO)?;
    if display_network.is_none() {
        w.attribute("listen", "0")?;
    }

    match graphics.graphics_type {
        GraphicsType::Spice => {
            w.attribute("tlsPort", PORT_AUTOSELECT)?;

            if !vm.spice_file_transfer_enabled {
                w.element_with_attrs("filetransfer", [("enable", "no")])?;
            }
            if !vm.spice_copy_paste_enabled {
                w.element_with_attrs("clipboard", [("copypaste", "no")])?;
            }
            if cfg.constants.ssl_enabled {
                let channels = secure_channel_names(
                    log,
                    &cfg.constants.spice_secure_channels,
                );
                for name in channels {
                    w.element_with_attrs(
                        "channel",
                        [("name", name), ("mode", "secure")],
                    )?;
                }
            }
        }
        GraphicsType::Vnc => {
            let keymap = vm
                .vnc_keyboard_layout
                .as_deref()
                .or(vm.default_vnc_keyboard_layout.as_deref())
                .unwrap_or(&cfg.constants.vnc_keyboard_layout);
            w.attribute("keymap", keymap)?;
        }
    }

    if let Some(network) = display_network {
        w.start_element("listen")?;
        match &graphics.display_ip {
            Some(ip) => {
                w.attribute("type", "address")?;
                w.attribute("address", ip)?;
            }
            None => {
                w.attribute("type", "network")?;
                w.attribute("network", format!("vdsm-{}", network.name))?;
            }
        }
        w.end_element()?;
    }

    w.end_element()
}
