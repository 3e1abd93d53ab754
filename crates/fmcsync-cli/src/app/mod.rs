//! cli commands for fmcsync.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use fmcsync_adapter_fmc::{FmcConfig, FmcStore};
use fmcsync_core::{Collection, ImportId, ItemSchema, RuleList, SchemaRegistry};
use fmcsync_engine::{
    builtin_registry, carry_ids, diff, load_config, rules_match, ApplyOptions, ApplyReport,
    Desired, DesiredConfig, DesiredResource, Outcome, RecordedItems, Reconciler, ResourceState,
    Scope, StateStore,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(test)]
mod test_support;

/// top-level cli definition.
#[derive(Parser)]
#[command(name = "fmcsync")]
#[command(about = "Bulk reconciliation of Cisco FMC objects and NAT rules")]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Command,
    /// state file recording remote ids.
    #[arg(long, global = true, default_value = ".fmcsync/state.json")]
    state: PathBuf,
    /// raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
}

/// connection flags; each falls back to an `FMC_*` environment variable.
#[derive(Args, Clone, Default)]
struct Connection {
    #[arg(long)]
    fmc_url: Option<String>,
    #[arg(long)]
    fmc_username: Option<String>,
    #[arg(long)]
    fmc_password: Option<String>,
    /// accept self-signed certificates.
    #[arg(long, default_value_t = false)]
    insecure: bool,
}

/// cli subcommands.
#[derive(Subcommand)]
enum Command {
    /// check a config file without contacting the server.
    Validate {
        #[arg(short = 'f', long)]
        file: PathBuf,
    },
    /// show what apply would change.
    Plan {
        #[arg(short = 'f', long)]
        file: PathBuf,
        #[command(flatten)]
        connection: Connection,
    },
    /// reconcile the server with a config file.
    Apply {
        #[arg(short = 'f', long)]
        file: PathBuf,
        #[command(flatten)]
        connection: Connection,
        #[arg(long, default_value_t = false)]
        allow_delete: bool,
    },
    /// delete every recorded object.
    Destroy {
        /// config providing custom schemas, if any.
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
        /// limit to these resources.
        #[arg(long)]
        resource: Vec<String>,
        #[command(flatten)]
        connection: Connection,
    },
    /// adopt existing remote objects into state.
    Import {
        #[arg(long)]
        resource: String,
        #[arg(long = "type")]
        type_name: String,
        /// `<domain>,[<name>,...]`, `<domain>,<id>`, or the parent id for rule lists.
        #[arg(long)]
        id: String,
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        connection: Connection,
    },
}

pub(crate) fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Validate { file } => {
            let config = load_config(&file)?;
            println!("ok ({} resources)", config.resources.len());
        }
        Command::Plan { file, connection } => {
            let config = load_config(&file)?;
            let state = StateStore::load(&cli.state)?;
            let store = connect(connection).await?;
            plan(&store, &config, &state).await?;
        }
        Command::Apply {
            file,
            connection,
            allow_delete,
        } => {
            let config = load_config(&file)?;
            let mut state = StateStore::load(&cli.state)?;
            let store = connect(connection).await?;
            apply(&store, &config, &mut state, ApplyOptions { allow_delete }).await?;
        }
        Command::Destroy {
            file,
            resource,
            connection,
        } => {
            let schemas = schemas_for(file.as_deref())?;
            let mut state = StateStore::load(&cli.state)?;
            let names: Vec<String> = if resource.is_empty() {
                state.resources().keys().cloned().collect()
            } else {
                resource
            };
            let store = connect(connection).await?;
            for name in names {
                destroy(&store, &schemas, &mut state, &name).await?;
            }
        }
        Command::Import {
            resource,
            type_name,
            id,
            file,
            connection,
        } => {
            let schemas = schemas_for(file.as_deref())?;
            let mut state = StateStore::load(&cli.state)?;
            if state.resource(&resource).is_some() {
                return Err(anyhow!("{resource} is already managed"));
            }
            let import: ImportId = id.parse()?;
            let store = connect(connection).await?;
            let recorded = import_resource(&store, &schemas, &resource, &type_name, &import).await?;
            println!("{resource}: imported {} item(s)", recorded.items.len());
            state.set_resource(resource, recorded);
            state.save()?;
        }
    }

    Ok(())
}

/// resolve fmc credentials from flags or environment.
fn fmc_credentials(connection: &Connection) -> Result<(String, String, String)> {
    let url = connection
        .fmc_url
        .clone()
        .or_else(|| std::env::var("FMC_URL").ok())
        .ok_or_else(|| anyhow!("missing --fmc-url or FMC_URL"))?;
    let username = connection
        .fmc_username
        .clone()
        .or_else(|| std::env::var("FMC_USERNAME").ok())
        .ok_or_else(|| anyhow!("missing --fmc-username or FMC_USERNAME"))?;
    let password = connection
        .fmc_password
        .clone()
        .or_else(|| std::env::var("FMC_PASSWORD").ok())
        .ok_or_else(|| anyhow!("missing --fmc-password or FMC_PASSWORD"))?;
    Ok((url, username, password))
}

fn insecure_requested(connection: &Connection) -> bool {
    connection.insecure
        || std::env::var("FMC_INSECURE")
            .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
}

async fn connect(connection: Connection) -> Result<FmcStore> {
    let (url, username, password) = fmc_credentials(&connection)?;
    let config = FmcConfig::new(url.clone(), username, password)
        .insecure(insecure_requested(&connection));
    FmcStore::connect(config)
        .await
        .with_context(|| format!("connect to {url}"))
}

/// schemas from a config file, or the built-in set.
fn schemas_for(file: Option<&Path>) -> Result<SchemaRegistry> {
    match file {
        Some(path) => Ok(load_config(path)?.schemas),
        None => Ok(builtin_registry()),
    }
}

fn scope_for<'a>(
    name: &'a str,
    type_name: &'a str,
    schema: &'a ItemSchema,
    domain: Option<&'a str>,
    parent: Option<&'a str>,
) -> Scope<'a> {
    Scope {
        resource: name,
        type_name,
        schema,
        domain,
        parent,
    }
}

/// recorded state for a desired resource; fails when it moved.
fn recorded_for(
    state: &StateStore,
    name: &str,
    desired: &DesiredResource,
) -> Result<Option<RecordedItems>> {
    let Some(recorded) = state.resource(name) else {
        return Ok(None);
    };
    if recorded.type_name != desired.type_name
        || recorded.domain != desired.domain
        || recorded.parent != desired.parent
    {
        return Err(anyhow!(
            "{name}: type, domain or parent changed since the last apply; destroy it first"
        ));
    }
    Ok(Some(recorded.items.clone()))
}

async fn plan(store: &FmcStore, config: &DesiredConfig, state: &StateStore) -> Result<()> {
    let reconciler = Reconciler::new(store);
    for (name, desired) in &config.resources {
        let schema = config.schema(&desired.type_name)?;
        let scope = scope_for(
            name,
            &desired.type_name,
            schema,
            desired.domain.as_deref(),
            desired.parent.as_deref(),
        );
        match (&desired.desired, recorded_for(state, name, desired)?) {
            (Desired::Named(items), recorded) => {
                let mut recorded = match recorded {
                    Some(RecordedItems::Named(recorded)) => recorded,
                    Some(RecordedItems::Rules(_)) => {
                        return Err(anyhow!("{name}: recorded state is a rule list"))
                    }
                    None => Collection::new(),
                };
                if !recorded.is_empty() {
                    reconciler.read(scope, &mut recorded).await?;
                }
                let mut items = items.clone();
                carry_ids(&mut items, &recorded);
                let changes = diff(&items, &recorded, schema);
                if changes.is_empty() {
                    println!("{name}: no changes");
                    continue;
                }
                println!("{name}:");
                for item in &changes.create {
                    println!("  + {}", item.name);
                }
                for update in &changes.update {
                    let fields: Vec<&str> =
                        update.changes.iter().map(|c| c.field.as_str()).collect();
                    println!("  ~ {} ({})", update.desired.name, fields.join(", "));
                }
                for item in &changes.delete {
                    println!("  - {}", item.name);
                }
            }
            (Desired::Rules(rules), recorded) => {
                let mut recorded = match recorded {
                    Some(RecordedItems::Rules(recorded)) => recorded,
                    Some(RecordedItems::Named(_)) => {
                        return Err(anyhow!("{name}: recorded state is a named collection"))
                    }
                    None => RuleList::new(),
                };
                if !recorded.is_empty() {
                    reconciler.read_rules(scope, &mut recorded).await?;
                }
                if rules_match(rules, &recorded, schema) {
                    println!("{name}: no changes");
                } else {
                    println!(
                        "{name}: rewrite rule list (delete {}, create {})",
                        recorded.len(),
                        rules.len()
                    );
                }
            }
        }
    }
    Ok(())
}

async fn apply(
    store: &FmcStore,
    config: &DesiredConfig,
    state: &mut StateStore,
    options: ApplyOptions,
) -> Result<()> {
    let orphans: Vec<String> = state
        .resources()
        .keys()
        .filter(|name| !config.resources.contains_key(*name))
        .cloned()
        .collect();
    if !orphans.is_empty() && !options.allow_delete {
        return Err(anyhow!(
            "resources removed from config: {}; re-run with --allow-delete",
            orphans.join(", ")
        ));
    }

    let reconciler = Reconciler::new(store);
    for (name, desired) in &config.resources {
        let schema = config.schema(&desired.type_name)?;
        let scope = scope_for(
            name,
            &desired.type_name,
            schema,
            desired.domain.as_deref(),
            desired.parent.as_deref(),
        );
        let recorded = recorded_for(state, name, desired)?;
        let (items, result) = match &desired.desired {
            Desired::Named(plan) => {
                let mut recorded = match recorded {
                    Some(RecordedItems::Named(recorded)) => recorded,
                    Some(RecordedItems::Rules(_)) => {
                        return Err(anyhow!("{name}: recorded state is a rule list"))
                    }
                    None => Collection::new(),
                };
                let refreshed = if recorded.is_empty() {
                    Ok(Vec::new())
                } else {
                    reconciler.read(scope, &mut recorded).await
                };
                let result = match refreshed {
                    Ok(_) => reconciler.apply(scope, plan, &mut recorded, options).await,
                    Err(err) => Err(err),
                };
                (RecordedItems::Named(recorded), result)
            }
            Desired::Rules(plan) => {
                let mut recorded = match recorded {
                    Some(RecordedItems::Rules(recorded)) => recorded,
                    Some(RecordedItems::Named(_)) => {
                        return Err(anyhow!("{name}: recorded state is a named collection"))
                    }
                    None => RuleList::new(),
                };
                let refreshed = if recorded.is_empty() {
                    Ok(Vec::new())
                } else {
                    reconciler.read_rules(scope, &mut recorded).await
                };
                let result = match refreshed {
                    Ok(_) => {
                        reconciler
                            .apply_rules(scope, plan, &mut recorded, options)
                            .await
                    }
                    Err(err) => Err(err),
                };
                (RecordedItems::Rules(recorded), result)
            }
        };

        state.set_resource(
            name.clone(),
            ResourceState {
                type_name: desired.type_name.clone(),
                domain: desired.domain.clone(),
                parent: desired.parent.clone(),
                items,
            },
        );
        state.save()?;
        let report = result?;
        print_report(name, &report);
    }

    let schemas = &config.schemas;
    for name in orphans {
        destroy(store, schemas, state, &name).await?;
    }
    Ok(())
}

async fn destroy(
    store: &FmcStore,
    schemas: &SchemaRegistry,
    state: &mut StateStore,
    name: &str,
) -> Result<()> {
    let recorded = state
        .resource(name)
        .cloned()
        .ok_or_else(|| anyhow!("{name} is not in state"))?;
    let schema = schemas
        .get(&recorded.type_name)
        .ok_or_else(|| anyhow!("{name}: unknown type {}", recorded.type_name))?;
    let scope = scope_for(
        name,
        &recorded.type_name,
        schema,
        recorded.domain.as_deref(),
        recorded.parent.as_deref(),
    );
    let reconciler = Reconciler::new(store);
    let (items, result) = match recorded.items.clone() {
        RecordedItems::Named(mut items) => {
            let result = reconciler.destroy(scope, &mut items).await;
            (RecordedItems::Named(items), result)
        }
        RecordedItems::Rules(mut rules) => {
            let result = reconciler.destroy_rules(scope, &mut rules).await;
            (RecordedItems::Rules(rules), result)
        }
    };

    if items.is_empty() {
        state.remove_resource(name);
    } else {
        state.set_resource(name, ResourceState { items, ..recorded });
    }
    state.save()?;
    let report = result?;
    print_report(name, &report);
    Ok(())
}

async fn import_resource(
    store: &FmcStore,
    schemas: &SchemaRegistry,
    name: &str,
    type_name: &str,
    import: &ImportId,
) -> Result<ResourceState> {
    let schema = schemas
        .get(type_name)
        .ok_or_else(|| anyhow!("unknown type {type_name}"))?;
    let reconciler = Reconciler::new(store);
    let domain = import.domain().map(str::to_string);

    if schema.ordered {
        let ImportId::Id { id: parent, .. } = import else {
            return Err(anyhow!("{name}: rule lists are imported by parent id"));
        };
        let scope = scope_for(name, type_name, schema, domain.as_deref(), Some(parent.as_str()));
        let rules = reconciler.import_rules(scope).await?;
        info!(resource = name, count = rules.len(), "imported rule list");
        return Ok(ResourceState {
            type_name: type_name.to_string(),
            domain,
            parent: Some(parent.clone()),
            items: RecordedItems::Rules(rules),
        });
    }

    if schema.needs_parent() {
        return Err(anyhow!("{name}: importing nested collections is not supported"));
    }
    let scope = scope_for(name, type_name, schema, domain.as_deref(), None);
    let items = reconciler.import(scope, import).await?;
    Ok(ResourceState {
        type_name: type_name.to_string(),
        domain,
        parent: None,
        items: RecordedItems::Named(items),
    })
}

fn print_report(name: &str, report: &ApplyReport) {
    if report.is_noop() {
        println!("{name}: no changes");
        return;
    }
    println!(
        "{name}: {} created, {} updated, {} deleted, {} unchanged",
        report.count(Outcome::Created),
        report.count(Outcome::Updated),
        report.count(Outcome::Deleted),
        report.count(Outcome::Unchanged)
    );
}
