// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vmxml::model::{CreateParams, Device, VirtualMachine};
use vmxml::{BuildRequest, MemoryInventory};

/// Everything needed for one build, as loaded from a JSON file.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Fixture {
    pub vm: VirtualMachine,
    pub host_id: Uuid,

    #[serde(default)]
    pub params: CreateParams,

    /// Replaces the stored payload device when the VM is run once.
    #[serde(default)]
    pub run_once_payload: Option<Device>,

    #[serde(default)]
    pub volatile: bool,

    #[serde(default)]
    pub inventory: MemoryInventory,
}

impl Fixture {
    pub fn request(&self) -> BuildRequest<'_> {
        BuildRequest {
            vm: &self.vm,
            host_id: self.host_id,
            params: &self.params,
            run_once_payload: self.run_once_payload.clone(),
            volatile: self.volatile,
        }
    }
}

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Fixture> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parsing fixture {}", path.display()))
}
