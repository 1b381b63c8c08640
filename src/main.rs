use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::io::{BufRead, Write};

use inventory_standardizer::catalog::memory::MemoryCatalogStore;
use inventory_standardizer::catalog::sql_store::SqlCatalogStore;
use inventory_standardizer::catalog::{CatalogEditor, CatalogStore, MergeScope};
use inventory_standardizer::cli::{parse_field, AdminAction, AdminArgs, Cli, Command, RunArgs};
use inventory_standardizer::config::{admin_gate_ok, AppConfig};
use inventory_standardizer::export;
use inventory_standardizer::import;
use inventory_standardizer::matching::{find_matches, LOW_CONFIDENCE_MAX};
use inventory_standardizer::models::{MatchCandidate, MatchField, ReviewItem};
use inventory_standardizer::review::{build_review_queue, ReviewSession};
use inventory_standardizer::standardize::standardize;
use inventory_standardizer::util::envfile::{load_dotenv_if_present, write_env_template};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let _ = load_dotenv_if_present();

    match Cli::parse().command {
        Command::EnvTemplate { path } => {
            write_env_template(&path)?;
            println!("Wrote {path}");
            Ok(())
        }
        Command::Run(args) => run(args).await,
        Command::Admin(args) => admin(args).await,
    }
}

async fn admin(args: AdminArgs) -> Result<()> {
    if !admin_gate_ok(&args.secret) {
        bail!("admin gate rejected the provided secret");
    }
    let cfg = AppConfig {
        database: if args.offline {
            None
        } else {
            args.db.to_database_config()
        },
        ..Default::default()
    };
    cfg.validate()?;
    let store = open_store(&cfg).await?;
    store.seed_default_data().await?;

    match args.action {
        AdminAction::ListSystems => {
            let catalog = store.load_catalog().await?;
            for system in &catalog.nomenclature_systems {
                println!(
                    "{}  {} ({} terms, updated {})",
                    system.id,
                    system.name,
                    system.device_type_terms.len(),
                    system.last_updated.format("%Y-%m-%d %H:%M")
                );
            }
            println!(
                "reference: {} manufacturers, {} models",
                catalog.reference_db.manufacturer.len(),
                catalog.reference_db.model.len()
            );
        }
        AdminAction::CreateSystem { name, description } => {
            let system = store.create_system(&name, &description).await?;
            println!("Created system {} ({})", system.name, system.id);
        }
        AdminAction::DeleteSystem { id } => {
            store.delete_system(&id).await?;
            println!("Deleted system {id}");
        }
        AdminAction::MergeTerms {
            field,
            system,
            survivor,
            absorbed,
        } => {
            let field = parse_field(&field)?;
            let catalog = store.load_catalog().await?;
            let (scope, terms) = match field {
                MatchField::DeviceType => {
                    let system_id = match system {
                        Some(id) => id,
                        None => match catalog.nomenclature_systems.first() {
                            Some(s) => s.id.clone(),
                            None => bail!("catalog has no nomenclature systems"),
                        },
                    };
                    let system = catalog
                        .system(&system_id)
                        .with_context(|| format!("unknown nomenclature system '{system_id}'"))?;
                    (MergeScope::DeviceType, system.device_type_terms.as_slice())
                }
                MatchField::Reference(r) => {
                    (MergeScope::Reference(r), catalog.reference_db.terms(r))
                }
            };
            let survivor_term = terms
                .iter()
                .find(|t| t.standard == survivor)
                .with_context(|| format!("no term with standard '{survivor}'"))?;
            let absorbed_term = terms
                .iter()
                .find(|t| t.standard == absorbed)
                .with_context(|| format!("no term with standard '{absorbed}'"))?;

            let mut editor = CatalogEditor::new(store.as_ref());
            let merged = editor
                .merge_terms(scope, survivor_term, Some(absorbed_term))
                .await?;
            println!(
                "Merged '{}' into '{}' ({} variations)",
                absorbed,
                merged.standard,
                merged.variations.len()
            );
        }
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let cfg = args.to_app_config()?;
    let raw = read_input(&args.input)?;
    let (rows, mut mapping) = import::parse(&raw)?;
    args.apply_map_overrides(&mut mapping)?;
    info!("parsed {} rows, {} columns", rows.len(), mapping.entries.len());

    let store = open_store(&cfg).await?;
    store
        .seed_default_data()
        .await
        .context("seeding default catalog data")?;
    let probe = store.can_write().await;
    if !probe.can_write {
        warn!(
            "catalog store is not writable: {}; review decisions will not persist",
            probe.error.unwrap_or_default()
        );
    }
    let catalog = store.load_catalog().await.context("loading catalog")?;

    let active_system = match cfg.active_system.clone() {
        Some(id) => {
            if catalog.system(&id).is_none() {
                bail!("unknown nomenclature system '{id}'");
            }
            id
        }
        None => match catalog.nomenclature_systems.first() {
            Some(s) => s.id.clone(),
            None => bail!("catalog has no nomenclature systems"),
        },
    };
    info!("active nomenclature system: {active_system}");

    let queue = build_review_queue(&rows, &mapping, &catalog, &active_system)?;
    let mut session = ReviewSession::new(queue, catalog, &active_system);

    if args.yes {
        while !session.is_complete() {
            session.skip()?;
        }
    } else {
        review_loop(&mut session, store.as_ref()).await?;
    }

    session.finish(store.as_ref()).await;
    let items: Vec<ReviewItem> = session.queue().to_vec();
    let output = standardize(&rows, &mapping, session.catalog(), &active_system, &items);

    match &cfg.export.out_path {
        Some(path) => {
            export::export_to_file(path, &mapping, &output)?;
            info!("wrote {} rows to {path}", output.len());
        }
        None => {
            let text = export::render(&mapping, &output)?;
            print!("{text}");
        }
    }

    let (processed, total) = session.progress();
    info!("review complete: {processed}/{total} items resolved");
    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)
            .context("reading stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {input}"))
    }
}

async fn open_store(cfg: &AppConfig) -> Result<Box<dyn CatalogStore>> {
    match &cfg.database {
        Some(db) => {
            let store = SqlCatalogStore::connect(db)
                .await
                .with_context(|| format!("connecting to {}:{}", db.host, db.port))?;
            store.create_schema().await?;
            Ok(Box::new(store))
        }
        None => {
            warn!("no database configured; running in local-memory mode, nothing will persist");
            Ok(Box::new(MemoryCatalogStore::new()))
        }
    }
}

/// Interactive review over stdin. Commands:
///   <n>        accept suggestion n ("<n>!" to force a low-confidence accept)
///   n <name>   add the value as a new term named <name>
///   f <query>  search the catalog and show matches for <query>
///   s          skip this item
///   S          skip this and all remaining items
async fn review_loop(session: &mut ReviewSession, store: &dyn CatalogStore) -> Result<()> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    while let Some(item) = session.current().cloned() {
        let (done, total) = session.progress();
        println!();
        println!(
            "[{}/{}] row {} | {} | \"{}\"",
            done + 1,
            total,
            item.row_index + 1,
            item.field,
            item.original_value
        );
        let mut shown = item.potential_matches.clone();
        print_candidates(&shown);
        print!("> ");
        std::io::stdout().flush()?;

        let line = match lines.next() {
            Some(line) => line.context("reading stdin")?,
            None => {
                // Input exhausted; leave the rest unresolved.
                while !session.is_complete() {
                    session.skip()?;
                }
                break;
            }
        };
        let cmd = line.trim();

        if cmd == "s" {
            session.skip()?;
            continue;
        }
        if cmd == "S" {
            while !session.is_complete() {
                session.skip()?;
            }
            break;
        }
        if let Some(query) = cmd.strip_prefix("f ") {
            let active = session.active_system().to_string();
            let terms = session.catalog().field_terms(item.field, &active).to_vec();
            shown = find_matches(query, &terms);
            if shown.is_empty() {
                println!("no matches for \"{query}\"");
            } else {
                print_candidates(&shown);
            }
            accept_from(session, store, &shown, &mut lines).await?;
            continue;
        }
        if let Some(name) = cmd.strip_prefix("n ") {
            match session.create_new(store, name).await {
                Ok(()) => info!("added new term '{}'", name.trim()),
                Err(e) => eprintln!("could not add term: {e}"),
            }
            continue;
        }
        match parse_accept(cmd) {
            Some((index, forced)) => {
                accept_candidate(session, store, &shown, index, forced).await;
            }
            None => eprintln!("unrecognized command '{cmd}' (number, n <name>, f <query>, s, S)"),
        }
    }
    Ok(())
}

/// One selection round against an explicit candidate list (search results).
async fn accept_from(
    session: &mut ReviewSession,
    store: &dyn CatalogStore,
    candidates: &[MatchCandidate],
    lines: &mut std::io::Lines<std::io::StdinLock<'_>>,
) -> Result<()> {
    if candidates.is_empty() {
        return Ok(());
    }
    print!("select> ");
    std::io::stdout().flush()?;
    let line = match lines.next() {
        Some(line) => line.context("reading stdin")?,
        None => return Ok(()),
    };
    if let Some((index, forced)) = parse_accept(line.trim()) {
        accept_candidate(session, store, candidates, index, forced).await;
    }
    Ok(())
}

async fn accept_candidate(
    session: &mut ReviewSession,
    store: &dyn CatalogStore,
    candidates: &[MatchCandidate],
    index: usize,
    forced: bool,
) {
    let Some(candidate) = index.checked_sub(1).and_then(|i| candidates.get(i)) else {
        eprintln!("no suggestion #{index}");
        return;
    };
    if candidate.score <= LOW_CONFIDENCE_MAX && !forced {
        eprintln!(
            "\"{}\" is a low-confidence suggestion ({:.2}); type {index}! to accept it anyway",
            candidate.standard, candidate.score
        );
        return;
    }
    if let Err(e) = session
        .accept(store, &candidate.term_id, &candidate.standard)
        .await
    {
        eprintln!("could not record decision: {e}");
    }
}

fn parse_accept(cmd: &str) -> Option<(usize, bool)> {
    let (num, forced) = match cmd.strip_suffix('!') {
        Some(n) => (n, true),
        None => (cmd, false),
    };
    num.parse::<usize>().ok().map(|n| (n, forced))
}

fn print_candidates(candidates: &[MatchCandidate]) {
    if candidates.is_empty() {
        println!("  no suggestions; n <name> to add, s to skip");
        return;
    }
    for (i, c) in candidates.iter().enumerate() {
        let low = if c.score <= LOW_CONFIDENCE_MAX {
            " [low confidence]"
        } else {
            ""
        };
        println!(
            "  {}. {} ({:.2}, {}){}",
            i + 1,
            c.standard,
            c.score,
            c.reason,
            low
        );
    }
}
