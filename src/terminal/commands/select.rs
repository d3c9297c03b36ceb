//! `water-devices select` command implementation.

use clap::Args as ClapArgs;
use color_eyre::eyre::{self, Result};
use console::style;
use serde::Serialize;
use waterui_device::{
    BuildConfiguration, DeviceSelector, Platform, Selection, SelectionResult,
    output::{DeviceSummary, emit_json, global_output_format},
};

use super::{Session, print_device};

/// Arguments for the select command.
#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Platforms to select for, instead of the `[[targets]]` in `Water.toml`.
    #[arg(short, long = "platform")]
    platforms: Vec<Platform>,
}

#[derive(Serialize)]
struct SelectionReport {
    platform: Platform,
    device: Option<DeviceSummary>,
    candidates: Vec<DeviceSummary>,
    advisory: Option<String>,
}

impl From<&Selection> for SelectionReport {
    fn from(selection: &Selection) -> Self {
        let candidates = match &selection.result {
            SelectionResult::Ambiguous { candidates } => {
                candidates.iter().map(DeviceSummary::from).collect()
            }
            SelectionResult::Selected(_) | SelectionResult::Unselected => Vec::new(),
        };
        Self {
            platform: selection.configuration.target_platform,
            device: selection.result.device().map(DeviceSummary::from),
            candidates,
            advisory: selection.advisory().map(|advisory| advisory.to_string()),
        }
    }
}

/// Run the select command.
pub async fn run(session: &Session, args: Args) -> Result<()> {
    let targets: Vec<BuildConfiguration> = if args.platforms.is_empty() {
        session.config.targets.clone()
    } else {
        args.platforms
            .into_iter()
            .map(BuildConfiguration::new)
            .collect()
    };
    if targets.is_empty() {
        eyre::bail!("No targets configured. Add [[targets]] to Water.toml or pass --platform.");
    }

    let devices = session.registry.devices().await;
    let selections = DeviceSelector::new().select(&targets, &devices)?;

    if global_output_format().is_json() {
        let reports: Vec<SelectionReport> =
            selections.iter().map(SelectionReport::from).collect();
        return emit_json(&reports);
    }

    for selection in &selections {
        println!(
            "{}",
            style(selection.configuration.target_platform.display_name())
                .bold()
                .underlined()
        );
        match &selection.result {
            SelectionResult::Selected(device) => print_device(device),
            SelectionResult::Unselected => println!("  {}", style("No matching device").dim()),
            SelectionResult::Ambiguous { candidates } => {
                if let Some(advisory) = selection.advisory() {
                    for line in advisory.lines() {
                        println!("  {}", style(line).yellow());
                    }
                }
                for device in candidates {
                    print_device(device);
                }
            }
        }
    }
    Ok(())
}
