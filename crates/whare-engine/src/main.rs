//! `whare`: run the registry engine against the in-memory ledger

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use whare_engine::{
    ActorContext, Command, CommandOutcome, EngineConfig, MemoryLedger, RegistryEngine,
};
use whare_registry::{builtin_catalog, Property, PropertyId};

#[derive(Parser)]
#[command(name = "whare")]
#[command(about = "WhareChain housing registry engine")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Offer a property to the next eligible applicant and record a response
    Simulate {
        /// Property to offer
        #[arg(long, default_value = "#H1235")]
        property: String,

        /// Accept instead of declining
        #[arg(long)]
        accept: bool,

        /// Decline reason
        #[arg(long, default_value = "too far from work")]
        reason: String,
    },
    /// Print the fallback catalog
    Catalog {
        /// Only show properties matching this term
        term: Option<String>,

        /// Print JSON records instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("whare=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Cmd::Simulate {
            property,
            accept,
            reason,
        } => simulate(config, &property, accept, &reason).await,
        Cmd::Catalog { term, json } => catalog(config, term.as_deref().unwrap_or(""), json),
    }
}

async fn simulate(
    config: EngineConfig,
    property: &str,
    accept: bool,
    reason: &str,
) -> anyhow::Result<()> {
    let property_id = PropertyId::new(property)?;
    let ledger = Arc::new(MemoryLedger::with_properties(builtin_catalog()));
    let engine = Arc::new(RegistryEngine::new(config, ledger)?);
    let session = engine.open_view();
    session.refresh().await?;

    let applicant = engine
        .next_eligible()
        .context("waitlist has no eligible applicant")?
        .did;
    info!(property = %property_id, %applicant, "simulating offer");

    let chp = ActorContext::chp("[0x...CHP1]");
    session
        .dispatch(
            chp,
            Command::CreateOffer {
                property_id: property_id.clone(),
                applicant: applicant.clone(),
                notes: Some("Viewing available on weekdays".into()),
            },
        )
        .await?;
    print_property(&engine, &property_id);

    let response = if accept {
        Command::AcceptOffer {
            property_id: property_id.clone(),
        }
    } else {
        Command::DeclineOffer {
            property_id: property_id.clone(),
            reason: reason.to_owned(),
        }
    };
    if let CommandOutcome::Confirmed(receipt) = session
        .dispatch(ActorContext::applicant(applicant.clone()), response)
        .await?
    {
        println!("tx {}", receipt.tx_hash);
    }
    session.refresh().await?;
    print_property(&engine, &property_id);

    println!();
    println!("Offers:");
    for offer in engine.offers() {
        println!(
            "  {} -> {}  {:?}  deadline {}{}",
            offer.property_id.display_with(&engine.config().id_prefix),
            offer.applicant_did,
            offer.status,
            offer.response_deadline.format("%Y-%m-%d"),
            offer
                .decline_reason
                .as_deref()
                .map(|r| format!("  \"{r}\""))
                .unwrap_or_default(),
        );
    }

    println!();
    println!("Audit log:");
    for entry in engine.audit_log().entries() {
        println!(
            "  {}  {}  {}  by {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.tx_hash,
            entry.action,
            entry.performed_by
        );
    }
    engine.audit_log().verify_integrity()?;
    println!("  chain verified ({} entries)", engine.audit_log().len());

    session.close().await;
    Ok(())
}

fn catalog(config: EngineConfig, term: &str, json: bool) -> anyhow::Result<()> {
    let engine = RegistryEngine::new(config, Arc::new(MemoryLedger::new()))?;
    let matches = engine.search(term);

    if json {
        let records: Vec<_> = matches.iter().map(Property::to_record).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    for property in &matches {
        println!("{}", row(property, &engine.config().id_prefix));
    }
    println!("{} properties", matches.len());
    Ok(())
}

fn print_property(engine: &RegistryEngine, id: &PropertyId) {
    if let Some(property) = engine.property(id) {
        println!("{}", row(&property, &engine.config().id_prefix));
    }
}

fn row(property: &Property, prefix: &str) -> String {
    let holder = property
        .offered_to()
        .or(property.occupant())
        .map(|d| format!(" ({d})"))
        .unwrap_or_default();
    format!(
        "{:<8} {:<26} {}bd/{}ba  {}{}  {}",
        property.display_id(prefix),
        property.address,
        property.bedrooms,
        property.bathrooms,
        property.status_kind(),
        holder,
        property.features.join(", ")
    )
}
