//! RMap CLI - administer an event-sourced RMap store.

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use rmap::{Agent, Iri, RequestAgent, Status, Store, Value};
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::{Cli, Command};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rmap")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("rmap.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn get_store_dir(cli: &Cli) -> PathBuf {
    cli.dir
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn format_status(status: Status) -> ColoredString {
    match status {
        Status::Active => "active".green(),
        Status::Inactive => "inactive".yellow(),
        Status::Tombstoned => "tombstoned".red(),
        Status::Deleted => "deleted".red().bold(),
    }
}

fn show(store: &Store, id: &Iri) -> Result<()> {
    if store.is_event_id(id)? {
        let event = store.read_event(id)?;
        println!("{}: {}", "Event".bold(), event.id.to_string().cyan());
        println!("{}: {}", "Type".bold(), event.event_type());
        println!("{}: {}", "Agent".bold(), event.associated_agent);
        println!("{}: {} .. {}", "Time".bold(), event.start_time, event.end_time);
        if let Some(progenitor) = &event.lineage_progenitor {
            println!("{}: {}", "Lineage".bold(), progenitor);
        }
        if let Some(desc) = &event.description {
            println!("{}: {}", "Description".bold(), desc);
        }
        for object in event.affected_objects() {
            println!("  {} {}", "→".blue(), object);
        }
    } else if store.is_agent_id(id)? {
        let agent = store.read_agent(id)?;
        println!("{}: {}", "Agent".bold(), agent.id.to_string().cyan());
        println!("{}: {}", "Status".bold(), format_status(store.agent_status(id)?));
        println!("{}: {}", "Name".bold(), agent.name.lexical());
        println!("{}: {}", "Identity Provider".bold(), agent.identity_provider);
        println!("{}: {}", "Auth Id".bold(), agent.auth_id);
    } else {
        let status = store.disco_status(id)?;
        let disco = match status {
            Status::Tombstoned => store.read_tombstoned_disco(id)?,
            _ => store.read_disco(id)?,
        };
        println!("{}: {}", "DiSCO".bold(), disco.id.to_string().cyan());
        println!("{}: {}", "Status".bold(), format_status(status));
        if let Some(creator) = &disco.creator {
            println!("{}: {}", "Creator".bold(), creator);
        }
        if let Some(desc) = disco.description.as_ref().map(Value::lexical) {
            println!("{}: {}", "Description".bold(), desc);
        }
        for resource in &disco.aggregated_resources {
            println!("  {} {}", "aggregates".dimmed(), resource);
        }
        for stmt in &disco.related_statements {
            println!(
                "  {} <{}> {}",
                stmt.subject.to_term(),
                stmt.predicate,
                stmt.object.to_term()
            );
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let store_dir = get_store_dir(&cli);

    match cli.command {
        Command::Init => {
            Store::init(&store_dir).context("Failed to initialize rmap store")?;
            println!("{} Initialized rmap store in {}", "✓".green(), store_dir.display());
        }

        Command::CreateAgent { name, idp, auth_id, id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let id = match id {
                Some(id) => Iri::new(id),
                None => store.mint_id()?,
            };
            let agent = Agent::new(id, name, idp, auth_id);
            let event = store
                .create_agent(&agent, &RequestAgent::new(agent.id.clone()))
                .context("Failed to create agent")?;

            println!(
                "{} Created agent: {} (event {})",
                "✓".green(),
                agent.id.to_string().cyan(),
                event.id
            );
        }

        Command::Status { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let id = Iri::new(id);
            let status = if store.is_agent_id(&id)? {
                store.agent_status(&id)?
            } else {
                store.disco_status(&id)?
            };
            println!("{} {}", id.to_string().cyan(), format_status(status));
        }

        Command::Show { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            show(&store, &Iri::new(id))?;
        }

        Command::Versions { id, derivatives } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let id = Iri::new(id);
            let versions = if derivatives {
                store.versions_and_derivatives(&id)?
            } else {
                store.all_versions(&id)?
            };
            for version in versions {
                let marker = if version == id { "*".bold() } else { " ".normal() };
                println!(
                    "{} {} {}",
                    marker,
                    version.to_string().cyan(),
                    format_status(store.disco_status(&version)?)
                );
            }
        }

        Command::Events { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let id = Iri::new(id);
            let events = if store.is_agent_id(&id)? {
                store.agent_related_events(&id)?
            } else {
                store.disco_events(&id)?
            };
            if events.is_empty() {
                println!("{}", "No events found".dimmed());
            }
            for (ended, event) in events
                .iter()
                .map(|e| store.event_end_time(e).map(|t| (t, e)))
                .collect::<Result<Vec<_>>>()?
            {
                println!(
                    "  {} {} {}",
                    ended.to_rfc3339().dimmed(),
                    event.to_string().cyan(),
                    store.event_type(event)?
                );
            }
        }

        Command::Verify { id } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let report = store.check_lineage(&Iri::new(id))?;
            if report.consistent {
                println!(
                    "{} Lineage {} is consistent ({} version(s))",
                    "✓".green(),
                    report.progenitor.to_string().cyan(),
                    report.forward.len()
                );
            } else {
                println!("{} Lineage {} diverges", "✗".red(), report.progenitor.to_string().cyan());
                println!("{}", serde_json::to_string_pretty(&report)?);
                std::process::exit(1);
            }
        }

        Command::Tombstone { id, agent } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let event = store
                .tombstone_disco(&Iri::new(id.clone()), &RequestAgent::new(agent))
                .context("Failed to tombstone DiSCO")?;
            println!("{} Tombstoned: {} (event {})", "✓".green(), id.cyan(), event.id);
        }

        Command::Delete { id, agent } => {
            let store = Store::open(&store_dir).context("Failed to open store")?;
            let event = store
                .delete_disco(&Iri::new(id.clone()), &RequestAgent::new(agent))
                .context("Failed to delete DiSCO")?;
            println!("{} Deleted: {} (event {})", "✓".green(), id.cyan(), event.id);
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    info!("Command: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
