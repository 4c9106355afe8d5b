// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Input, channel, console and serial devices.

use uuid::Uuid;
use vmxml_types::{ArchFamily, GraphicsType};

use super::Result;
use crate::classify::ConsoleParams;
use crate::document::DocumentWriter;
use crate::model::VirtualMachine;

const GUEST_AGENT_CHANNELS: [&str; 2] =
    ["ovirt-guest-agent.0", "org.qemu.guest_agent.0"];

/// Path of the host socket backing a console, or the empty string when the
/// console is a pty.
pub(crate) fn console_socket_path(
    vm_id: Uuid,
    params: &ConsoleParams,
) -> String {
    if params.enable_socket {
        format!("/var/run/ovirt-vmconsole-console/{vm_id}.sock")
    } else {
        String::new()
    }
}

/// A tablet when VNC is the only display, otherwise a mouse on the bus the
/// architecture provides.
pub(crate) fn write_input(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
) -> Result {
    let tablet = vm.graphics_infos.len() == 1
        && vm.graphics_infos.contains_key(&GraphicsType::Vnc);
    let (kind, bus) = if tablet {
        ("tablet", "usb")
    } else if vm.arch.family() == ArchFamily::X86 {
        ("mouse", "ps2")
    } else {
        ("mouse", "usb")
    };
    w.element_with_attrs("input", [("type", kind), ("bus", bus)])
}

pub(crate) fn write_guest_agent_channels(
    w: &mut DocumentWriter,
    vm_id: Uuid,
) -> Result {
    for name in GUEST_AGENT_CHANNELS {
        w.start_element("channel")?;
        w.attribute("type", "unix")?;
        w.element_with_attrs("target", [("type", "virtio"), ("name", name)])?;
        w.start_element("source")?;
        w.attribute("mode", "bind")?;
        w.attribute(
            "path",
            format!("/var/lib/libvirt/qemu/channels/{vm_id}.{name}"),
        )?;
        w.end_element()?;
        w.end_element()?;
    }
    Ok(())
}

pub(crate) fn write_emulator(
    w: &mut DocumentWriter,
    vm: &VirtualMachine,
) -> Result {
    if vm.arch.family() != ArchFamily::Ppc {
        return Ok(());
    }
    w.element_with_attrs(
        "emulator",
        [("text", format!("/usr/bin/qemu-system-{}", vm.arch))],
    )
}

/// Writes the type attribute and, for a socket, the `source` element.
fn write_backend(w: &mut DocumentWriter, path: &str) -> Result {
    if path.is_empty() {
        return w.attribute("type", "pty");
    }
    w.attribute("type", "unix")?;
    w.element_with_attrs("source", [("path", path), ("mode", "bind")])
}

pub(crate) fn write_console(
    w: &mut DocumentWriter,
    vm_id: Uuid,
    params: &ConsoleParams,
) -> Result {
    w.start_element("console")?;
    write_backend(w, &console_socket_path(vm_id, params))?;
    w.element_with_attrs(
        "target",
        [("type", params.console_type.as_str()), ("port", "0")],
    )?;
    w.end_element()
}

pub(crate) fn write_serial(w: &mut DocumentWriter, path: &str) -> Result {
    w.start_element("serial")?;
    write_backend(w, path)?;
    w.element_with_attrs("target", [("port", "0")])?;
    w.end_element()
}

pub(crate) fn write_spice_vmc_channel(w: &mut DocumentWriter) -> Result {
    w.start_element("channel")?;
    w.attribute("type", "spicevmc")?;
    w.element_with_attrs(
        "target",
        [("type", "virtio"), ("name", "com.redhat.spice.0")],
    )?;
    w.end_element()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encode::test_util::render;
    use crate::model::GraphicsInfo;

    const VM_ID: Uuid = Uuid::from_u128(0x8b5f);

    fn vm(arch: &str) -> VirtualMachine {
        serde_json::from_value(serde_json::json!({
            "id": VM_ID,
            "name": "vm0",
            "cluster_id": "00000000-0000-0000-0000-0000000000c1",
            "mem_size_mb": 1024,
            "max_memory_size_mb": 1024,
            "num_of_sockets": 1,
            "cpu_per_socket": 1,
            "threads_per_cpu": 1,
            "arch": arch,
            "compatibility_version": "4.1",
            "os_id": 0,
        }))
        .unwrap()
    }

    #[test]
    fn input_device_choice() {
        let mut x86 = vm("x86_64");
        assert_eq!(
            render(|w| write_input(w, &x86)),
            "<input type=\"mouse\" bus=\"ps2\"/>"
        );
        let ppc = vm("ppc64le");
        assert_eq!(
            render(|w| write_input(w, &ppc)),
            "<input type=\"mouse\" bus=\"usb\"/>"
        );

        x86.graphics_infos.insert(GraphicsType::Vnc, GraphicsInfo::default());
        assert_eq!(
            render(|w| write_input(w, &x86)),
            "<input type=\"tablet\" bus=\"usb\"/>"
        );
        x86.graphics_infos.insert(GraphicsType::Spice, GraphicsInfo::default());
        assert!(render(|w| write_input(w, &x86)).contains("mouse"));
    }

    #[test]
    fn guest_agent_channels_use_vm_id() {
        let out = render(|w| write_guest_agent_channels(w, VM_ID));
        assert_eq!(out.matches("<channel type=\"unix\">").count(), 2);
        assert!(out.contains(&format!(
            "path=\"/var/lib/libvirt/qemu/channels/\
             {VM_ID}.org.qemu.guest_agent.0\""
        )));
    }

    #[test]
    fn console_backends() {
        let pty = ConsoleParams {
            console_type: "virtio".into(),
            enable_socket: false,
        };
        assert_eq!(
            render(|w| write_console(w, VM_ID, &pty)),
            "<console type=\"pty\"><target type=\"virtio\" port=\"0\"/>\
             </console>"
        );

        let socket = ConsoleParams {
            console_type: "serial".into(),
            enable_socket: true,
        };
        let path = console_socket_path(VM_ID, &socket);
        assert_eq!(
            render(|w| write_console(w, VM_ID, &socket)),
            format!(
                "<console type=\"unix\"><source path=\"{path}\" mode=\"bind\"/>\
                 <target type=\"serial\" port=\"0\"/></console>"
            )
        );
        assert_eq!(
            render(|w| write_serial(w, &path)),
            format!(
                "<serial type=\"unix\"><source path=\"{path}\" mode=\"bind\"/>\
                 <target port=\"0\"/></serial>"
            )
        );
        assert_eq!(
            render(|w| write_serial(w, "")),
            "<serial type=\"pty\"><target port=\"0\"/></serial>"
        );
    }

    #[test]
    fn emulator_only_on_ppc() {
        assert_eq!(render(|w| write_emulator(w, &vm("x86_64"))), "");
        assert_eq!(
            render(|w| write_emulator(w, &vm("ppc64le"))),
            "<emulator text=\"/usr/bin/qemu-system-ppc64le\"/>"
        );
    }
}
