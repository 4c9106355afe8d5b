// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use slog::{info, o, Drain};

use vmxml::{DomainXmlBuilder, Inventory};

mod fixture;

#[derive(clap::Parser)]
/// Builds a libvirt domain descriptor from a JSON fixture.
struct Args {
    /// VM, host parameters and inventory to build from.
    #[clap(value_name = "FIXTURE", action)]
    fixture: PathBuf,

    /// Engine configuration (TOML). Defaults apply when omitted.
    #[clap(short, long, action)]
    config: Option<PathBuf>,

    /// Build for a volatile run regardless of the fixture.
    #[clap(long, action)]
    volatile: bool,

    /// Write the descriptor here instead of stdout.
    #[clap(short, long, action)]
    output: Option<PathBuf>,
}

fn build_log() -> (slog::Logger, slog_async::AsyncGuard) {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let (drain, guard) = slog_async::Async::new(drain).build_with_guard();
    (slog::Logger::root(drain.fuse(), o!()), guard)
}

fn main() -> anyhow::Result<()> {
    let Args { fixture: fixture_path, config, volatile, output } =
        Args::parse();

    let (log, _log_async_guard) = build_log();

    let config = match &config {
        Some(path) => vmxml_config::parse(path).with_context(|| {
            format!("loading engine config {}", path.display())
        })?,
        None => vmxml_config::Config::default(),
    };
    let mut fixture = fixture::load(&fixture_path)?;
    fixture.volatile |= volatile;

    info!(log, "building domain descriptor";
        "vm" => &fixture.vm.name, "host" => %fixture.host_id);
    let xml = DomainXmlBuilder::new(
        &log,
        fixture.request(),
        Inventory::from_store(&fixture.inventory),
        &config,
    )
    .build()
    .context("building domain descriptor")?;

    match output {
        Some(path) => std::fs::write(&path, &xml)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{xml}"),
    }
    Ok(())
}
