use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use form_replay::browser::ChromeDriverFactory;
use form_replay::core::{Config, DriverFactory};
use form_replay::replay::BatchJob;
use form_replay::{
    BatchRunner, ExtensionRegistry, MappingStore, Profile, Recording, ReplayEngine, ReplayStats, Trainer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "form-replay", version, about = "Learn web forms from recordings and fill them from profiles")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Learn a site's field mappings from a recorder export
    Train {
        recording: PathBuf,
        /// Also inspect the live page to pick fill strategies
        #[arg(long)]
        enhance: bool,
    },
    /// Fill a learned form with a profile
    Replay {
        domain: String,
        #[arg(long)]
        profile: PathBuf,
        #[arg(long)]
        no_submit: bool,
        /// Leave the browser open afterwards
        #[arg(long)]
        keep_open: bool,
    },
    /// Fill several learned forms with one profile
    Batch {
        #[arg(long)]
        profile: PathBuf,
        #[arg(required = true)]
        domains: Vec<String>,
    },
    List,
    Get { domain: String },
    Stats,
    /// Domains that map a semantic field
    Search { field: String },
    Delete { domain: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_replay(stats: &ReplayStats) {
    println!(
        "{}: {}/{} fields ({:.0}%), submitted: {}",
        stats.domain,
        stats.successful_fields,
        stats.total_fields,
        stats.success_rate(),
        stats.submission.success
    );
    for result in stats.field_results.iter().filter(|r| !r.success) {
        println!("  {} failed: {}", result.field_name, result.error.as_deref().unwrap_or("unknown"));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    let store = Arc::new(MappingStore::from_config(&config.store)?);
    let drivers: Arc<dyn DriverFactory> = Arc::new(ChromeDriverFactory);

    match cli.command {
        Command::Train { recording, enhance } => {
            let raw = std::fs::read_to_string(&recording)
                .with_context(|| format!("reading {}", recording.display()))?;
            let recording = Recording::from_json(&raw)?;
            let trainer = Trainer::new(store.clone());
            let outcome = trainer.train(&recording).await?;
            for warning in &outcome.warnings {
                warn!("{}", warning);
            }
            info!(domain = %outcome.domain, fields = outcome.fields_learned, "trained");

            if enhance {
                let driver = drivers.acquire(&config.browser).await?;
                let enhanced = trainer.enhance(&outcome.domain, driver.as_ref()).await;
                driver.close().await?;
                let record = enhanced?;
                info!(domain = %record.domain, "enhanced");
            }
            print_json(&outcome)?;
        }
        Command::Replay {
            domain,
            profile,
            no_submit,
            keep_open,
        } => {
            let profile = Profile::load(&profile)?;
            if no_submit {
                config.replay.submit = false;
            }
            let engine = ReplayEngine::new(store, drivers, ExtensionRegistry::with_builtin(), config);
            if keep_open {
                let (stats, driver) = engine.replay_debug(&domain, profile).await?;
                print_replay(&stats);
                println!("browser left open, press Ctrl+C to close it");
                tokio::signal::ctrl_c().await?;
                driver.close().await?;
            } else {
                let stats = engine.replay(&domain, profile).await?;
                print_replay(&stats);
            }
        }
        Command::Batch { profile, domains } => {
            let profile = Profile::load(&profile)?;
            let engine = ReplayEngine::new(store, drivers, ExtensionRegistry::with_builtin(), config);
            let jobs = domains
                .iter()
                .map(|domain| BatchJob::new(domain, profile.clone()))
                .collect();
            let summaries = BatchRunner::new(Arc::new(engine)).run(jobs).await;
            print_json(&summaries)?;
        }
        Command::List => print_json(&store.list().await?)?,
        Command::Get { domain } => match store.get_full(&domain).await? {
            Some(record) => print_json(&record)?,
            None => bail!("no mappings stored for {}", domain),
        },
        Command::Stats => print_json(&store.stats().await?)?,
        Command::Search { field } => print_json(&store.search_by_field(&field).await?)?,
        Command::Delete { domain } => {
            if !store.delete(&domain).await? {
                bail!("no mappings stored for {}", domain);
            }
            println!("deleted {}", domain);
        }
    }

    Ok(())
}
