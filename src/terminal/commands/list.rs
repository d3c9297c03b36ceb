//! `water-devices list` command implementation.

use std::collections::BTreeMap;

use clap::Args as ClapArgs;
use color_eyre::eyre::Result;
use console::style;
use waterui_device::{
    AnyDevice, Platform,
    output::{DeviceSummary, emit_json, global_output_format},
};

use super::{Session, print_device};

/// Arguments for the list command.
#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Only list devices of this platform.
    #[arg(short, long)]
    platform: Option<Platform>,
}

/// Run the list command.
pub async fn run(session: &Session, args: Args) -> Result<()> {
    let devices: Vec<AnyDevice> = session
        .registry
        .devices()
        .await
        .into_iter()
        .filter(|device| args.platform.is_none_or(|platform| device.platform() == platform))
        .collect();

    if global_output_format().is_json() {
        let summaries: Vec<DeviceSummary> = devices.iter().map(DeviceSummary::from).collect();
        return emit_json(&summaries);
    }

    if devices.is_empty() {
        match session.registry.specified_device_id() {
            Some(id) => println!("No connected device matches `{id}`."),
            None => println!("No devices found."),
        }
        return Ok(());
    }

    print_table(&devices);
    Ok(())
}

fn print_table(devices: &[AnyDevice]) {
    let mut grouped: BTreeMap<Platform, Vec<&AnyDevice>> = BTreeMap::new();
    for device in devices {
        grouped.entry(device.platform()).or_default().push(device);
    }

    for (idx, (platform, mut list)) in grouped.into_iter().enumerate() {
        if idx > 0 {
            println!();
        }
        println!("{}", style(platform.display_name()).bold().underlined());

        list.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        for device in list {
            print_device(device);
        }
    }
}
