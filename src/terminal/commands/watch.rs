//! `water-devices watch` command implementation.

use clap::Args as ClapArgs;
use color_eyre::eyre::{Context, Result};
use console::style;
use futures::StreamExt;
use serde::Serialize;
use smol::{channel, future};
use waterui_device::{
    DeviceChange,
    output::{DeviceSummary, emit_json, global_output_format},
};

use super::Session;

/// Arguments for the watch command.
#[derive(ClapArgs, Debug)]
pub struct Args {
    /// Stop after this many changes.
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ChangeEvent {
    event: &'static str,
    device: DeviceSummary,
}

/// Run the watch command.
pub async fn run(session: &Session, args: Args) -> Result<()> {
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("failed to set Ctrl+C handler")?;

    let registry = &session.registry;
    let mut changes = registry.targeted_changes();
    registry.start_polling();

    if !global_output_format().is_json() {
        println!(
            "{}",
            style("Watching for devices, press Ctrl+C to stop.").dim()
        );
    }

    let mut seen = 0;
    while args.limit.is_none_or(|limit| seen < limit) {
        let next = future::or(changes.next(), async {
            let _ = stop_rx.recv().await;
            None
        })
        .await;
        let Some(change) = next else {
            break;
        };
        print_change(&change)?;
        seen += 1;
    }

    registry.dispose();
    Ok(())
}

fn print_change(change: &DeviceChange) -> Result<()> {
    let (event, marker) = match change {
        DeviceChange::Added(_) => ("added", style("+").green().bold()),
        DeviceChange::Removed(_) => ("removed", style("-").red().bold()),
    };
    let device = change.device();

    if global_output_format().is_json() {
        return emit_json(&ChangeEvent {
            event,
            device: DeviceSummary::from(device),
        });
    }

    println!(
        "{marker} {} {} {}",
        style(device.name()).bold(),
        style(format!("({})", device.platform().display_name())).dim(),
        style(device.id()).dim()
    );
    Ok(())
}
