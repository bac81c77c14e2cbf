//! Operator command line
//!
//! Each invocation refreshes from the device first, the same way a view
//! refreshes when it is mounted, then runs one command.

use crate::app::App;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dispensekit_core::{SlotId, SlotRecord, SyncEvent};
use dispensekit_profiles::OperatorProfile;
use dispensekit_settings::SettingsManager;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Parser)]
#[command(name = "dispensekit", version, about = "Operator console for networked pill dispensers")]
pub struct Cli {
    /// Config file (.toml or .json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the device HTTP base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Override the push channel URL
    #[arg(long, global = true)]
    pub push_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print every slot
    Slots,
    /// Dispense one item from a slot
    Dispense {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        slot: u32,
    },
    /// Correct the label and/or count of a slot
    Edit {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        slot: u32,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        count: Option<u32>,
    },
    /// Manage operator profiles
    #[command(subcommand)]
    Profiles(ProfilesCommand),
    /// Follow the push channel until Ctrl-C
    Watch,
    /// Show or write the configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ProfilesCommand {
    /// List profiles in stored order
    List,
    /// Add a profile, or overwrite the one with the same name
    Add {
        name: String,
        /// Comma-separated slot ids, e.g. 1,3
        #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u32).range(1..))]
        slots: Vec<u32>,
    },
    /// Change the profile at an index
    Edit {
        index: usize,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u32).range(1..))]
        slots: Option<Vec<u32>>,
    },
    /// Delete the profile at an index
    Remove { index: usize },
    /// Dispense every slot selected by the profile at an index
    Dispense { index: usize },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Load settings and apply command line overrides
pub fn load_settings(cli: &Cli) -> anyhow::Result<SettingsManager> {
    let mut settings = match &cli.config {
        Some(path) => SettingsManager::load_from(path)?,
        None => SettingsManager::load_default()?,
    };

    let config = settings.config_mut();
    if let Some(url) = &cli.base_url {
        config.device.base_url = url.clone();
    }
    if let Some(url) = &cli.push_url {
        config.device.push_url = url.clone();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    config.validate()?;

    Ok(settings)
}

/// Run one command
pub async fn run(cli: Cli, settings: SettingsManager) -> anyhow::Result<()> {
    let command = match cli.command {
        Command::Config(command) => return run_config(command, &settings),
        command => command,
    };

    let app = App::new(settings.config().clone(), settings.data_dir()?).await?;
    if let Err(e) = app.engine.on_mount().await {
        tracing::warn!("Showing last known slots: {}", e);
    }

    match command {
        Command::Slots => print_slots(&app),
        Command::Dispense { slot } => {
            let outcome = app
                .engine
                .dispense(SlotId(slot))
                .await
                .with_context(|| format!("Dispense from slot {} failed", slot))?;
            println!("{}", outcome.message);
            if let Some(count) = outcome.count {
                println!("Slot {} now holds {}", slot, count);
            }
        }
        Command::Edit { slot, label, count } => {
            if label.is_none() && count.is_none() {
                bail!("Nothing to change: pass --label and/or --count");
            }
            let current = app
                .engine
                .slot(SlotId(slot))
                .with_context(|| format!("Slot {} does not exist", slot))?;
            let label = label.unwrap_or(current.label);
            let count = count.unwrap_or(current.count);

            let outcome = app
                .engine
                .update_slot(SlotId(slot), label, count)
                .await
                .with_context(|| format!("Update of slot {} failed", slot))?;
            println!("{}", outcome.message);
            print_slots(&app);
        }
        Command::Profiles(command) => run_profiles(command, &app).await?,
        Command::Watch => watch(&app).await?,
        Command::Config(_) => {}
    }

    Ok(())
}

async fn run_profiles(command: ProfilesCommand, app: &App) -> anyhow::Result<()> {
    match command {
        ProfilesCommand::List => {
            let profiles = app.profiles.list().await;
            if profiles.is_empty() {
                println!("No profiles");
            }
            for (index, profile) in profiles.iter().enumerate() {
                println!("{:>3}  {}", index, profile);
            }
        }
        ProfilesCommand::Add { name, slots } => {
            let profile = OperatorProfile::new(name, slots.into_iter().map(SlotId));
            let index = app.profiles.upsert(profile).await?;
            println!("Saved profile at index {}", index);
        }
        ProfilesCommand::Edit { index, name, slots } => {
            let mut profile = app
                .profiles
                .get(index)
                .await
                .with_context(|| format!("No profile at index {}", index))?;
            if let Some(name) = name {
                profile.name = name;
            }
            if let Some(slots) = slots {
                profile.selected_slots = slots.into_iter().map(SlotId).collect();
            }
            app.profiles.replace(index, profile).await?;
            println!("Updated profile {}", index);
        }
        ProfilesCommand::Remove { index } => {
            let removed = app.profiles.remove(index).await?;
            println!("Removed {}", removed.name);
        }
        ProfilesCommand::Dispense { index } => {
            let report = app
                .profiles
                .dispense_group(index, app.engine.as_ref())
                .await?;
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(receipt) => println!("  slot {}: {}", outcome.slot, receipt.message),
                    Err(e) => println!("  slot {}: {}", outcome.slot, e.user_message()),
                }
            }
            println!("{}", report.summary());
        }
    }
    Ok(())
}

async fn watch(app: &App) -> anyhow::Result<()> {
    let mut events = app.engine.subscribe();
    let channel = app.connect_push().await?;
    println!("Watching {} (Ctrl-C to stop)", channel.url());
    print_slots(app);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(SyncEvent::SlotsChanged { .. }) => print_slots(app),
                Ok(SyncEvent::TagScanned(tag)) => println!("Tag scanned: {}", tag),
                Ok(SyncEvent::ChannelClosed) => {
                    println!("Push channel closed by the device");
                    break;
                }
                Ok(other) => println!("{}", other),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    channel.close().await;
    app.engine.detach();
    Ok(())
}

fn run_config(command: ConfigCommand, settings: &SettingsManager) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => {
            println!("# {}", settings.path().display());
            println!("{}", serde_json::to_string_pretty(settings.config())?);
        }
        ConfigCommand::Init { force } => {
            if settings.path().exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    settings.path().display()
                );
            }
            settings.save()?;
            println!("Wrote {}", settings.path().display());
        }
    }
    Ok(())
}

fn print_slots(app: &App) {
    println!("{}", format_slots(&app.engine.records()));
    if let Some(banner) = app.engine.banner() {
        println!("Message: {}", banner);
    }
}

/// Render slots as a fixed-width table
pub fn format_slots(records: &[SlotRecord]) -> String {
    let mut out = format!("{:>4}  {:<24} {:>7}", "SLOT", "LABEL", "COUNT");
    for record in records {
        out.push_str(&format!(
            "\n{:>4}  {:<24} {:>7}",
            record.id.get(),
            record.label,
            record.count
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_profile_slots() {
        let cli =
            Cli::try_parse_from(["dispensekit", "profiles", "add", "Alice", "--slots", "1,3"])
                .unwrap();
        match cli.command {
            Command::Profiles(ProfilesCommand::Add { name, slots }) => {
                assert_eq!(name, "Alice");
                assert_eq!(slots, vec![1, 3]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_slot_zero_is_rejected() {
        assert!(Cli::try_parse_from(["dispensekit", "dispense", "0"]).is_err());
        assert!(
            Cli::try_parse_from(["dispensekit", "profiles", "add", "A", "--slots", "0,2"]).is_err()
        );
    }

    #[test]
    fn test_global_overrides() {
        let cli = Cli::try_parse_from([
            "dispensekit",
            "slots",
            "--base-url",
            "http://10.0.0.2",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://10.0.0.2"));
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::Slots));
    }

    #[test]
    fn test_format_slots() {
        let table = format_slots(&[SlotRecord::new(SlotId(1), "Aspirin", 10)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("Aspirin"));
        assert!(lines[1].trim_end().ends_with("10"));
    }

    #[test]
    fn test_command_line_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
