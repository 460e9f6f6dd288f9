use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use nyuki_config::{CacheSetting, ServiceConfig};
use nyuki_store::{SqliteStore, Store, TemplateQuery};
use nyuki_workflow::{WorkflowRef, WorkflowUri};

/// Nyuki - operator tools for the workflow service
#[derive(Parser)]
#[command(name = "nyuki")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the service configuration (default: ~/.nyuki/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Log level; overrides NYUKI_LOG
  #[arg(long, global = true, value_enum)]
  log_level: Option<LogLevel>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevel {
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

impl LogLevel {
  fn as_str(self) -> &'static str {
    match self {
      LogLevel::Error => "error",
      LogLevel::Warn => "warn",
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
      LogLevel::Trace => "trace",
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Work with nyuki:// addresses
  Uri {
    #[command(subcommand)]
    action: UriAction,
  },

  /// Inspect the service configuration
  Config {
    #[command(subcommand)]
    action: ConfigAction,
  },

  /// List stored workflow templates
  Templates {
    /// Include drafts next to published versions
    #[arg(long)]
    all: bool,

    /// Print whole documents instead of summaries
    #[arg(long)]
    full: bool,
  },

  /// List recorded workflow instances, newest first
  History {
    #[arg(long, default_value_t = 20)]
    limit: u32,
  },
}

#[derive(Subcommand)]
enum UriAction {
  /// Split an address into its parts
  Parse { uri: String },

  /// Build an address from its parts
  Format {
    /// Template identifier
    template: String,

    /// Instance identifier, to address a running instance
    #[arg(long)]
    instance: Option<String>,

    /// Bus name of the owning service (default: the configured holder)
    #[arg(long)]
    holder: Option<String>,
  },
}

#[derive(Subcommand)]
enum ConfigAction {
  /// Validate the configuration and print what it enables
  Check,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.log_level);

  let config_path = match cli.config {
    Some(path) => path,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".nyuki")
      .join("config.json"),
  };
  debug!(path = %config_path.display(), "configuration path");

  match cli.command {
    Some(Commands::Uri { action }) => match action {
      UriAction::Parse { uri } => parse_uri(&uri)?,
      UriAction::Format {
        template,
        instance,
        holder,
      } => format_uri(template, instance, holder, &config_path)?,
    },
    Some(Commands::Config {
      action: ConfigAction::Check,
    }) => check_config(&config_path)?,
    Some(Commands::Templates { all, full }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(list_templates(&config_path, all, full))?;
    }
    Some(Commands::History { limit }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(list_history(&config_path, limit))?;
    }
    None => {
      println!("nyuki - use --help to see available commands");
    }
  }

  Ok(())
}

/// Logs go to stderr so stdout only carries command output.
///
/// Level priority: `--log-level`, then `NYUKI_LOG`, then `info`.
fn init_logging(level: Option<LogLevel>) {
  let filter = match level {
    Some(level) => EnvFilter::new(level.as_str()),
    None => EnvFilter::try_from_env("NYUKI_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
  };

  fmt()
    .with_env_filter(filter)
    .with_target(true)
    .with_writer(std::io::stderr)
    .init();
}

fn load_config(path: &Path) -> Result<ServiceConfig> {
  ServiceConfig::load(path)
    .with_context(|| format!("failed to load configuration: {}", path.display()))
}

fn parse_uri(uri: &str) -> Result<()> {
  let parsed = WorkflowUri::parse(uri)?;
  let output = serde_json::json!({
    "template_id": parsed.template_id,
    "holder": parsed.holder,
    "instance_id": parsed.instance_id,
  });
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

fn format_uri(
  template: String,
  instance: Option<String>,
  holder: Option<String>,
  config_path: &Path,
) -> Result<()> {
  let holder = match holder {
    Some(holder) => holder,
    None => load_config(config_path)?.holder,
  };
  let reference = match instance {
    Some(instance) => WorkflowRef::instance(template, instance),
    None => WorkflowRef::template(template),
  };
  println!("{}", WorkflowUri::new(reference, holder));
  Ok(())
}

fn check_config(path: &Path) -> Result<()> {
  let config = load_config(path)?;

  println!("holder:   {}", config.holder);
  println!("storage:  {}", config.storage.url);
  if config.topics.is_empty() {
    println!("topics:   (none)");
  } else {
    println!("topics:   {}", config.topics.join(", "));
  }
  match config.cache_setting() {
    CacheSetting::Enabled { namespace, .. } => println!("cache:    enabled ({namespace})"),
    CacheSetting::MissingNamespace => println!("cache:    disabled (no service name)"),
    CacheSetting::Disabled => println!("cache:    disabled"),
  }
  println!("capacity: {}", config.channel_capacity);
  Ok(())
}

async fn open_store(config_path: &Path) -> Result<SqliteStore> {
  let config = load_config(config_path)?;
  let store = SqliteStore::connect(&config.storage.url)
    .await
    .with_context(|| format!("failed to open storage: {}", config.storage.url))?;
  store.migrate().await.context("failed to migrate storage")?;
  Ok(store)
}

async fn list_templates(config_path: &Path, all: bool, full: bool) -> Result<()> {
  let store = open_store(config_path).await?;
  let query = TemplateQuery {
    full,
    latest: !all,
    with_metadata: true,
  };
  let templates = store
    .list_templates(query)
    .await
    .context("failed to list templates")?;

  println!("{}", serde_json::to_string_pretty(&templates)?);
  Ok(())
}

async fn list_history(config_path: &Path, limit: u32) -> Result<()> {
  let store = open_store(config_path).await?;
  let records = store
    .list_instances(limit)
    .await
    .context("failed to list workflow history")?;

  if records.is_empty() {
    eprintln!("No recorded instances");
    return Ok(());
  }
  for record in records {
    println!(
      "{}  {}  {}  {}",
      record.recorded_at.to_rfc3339(),
      record.template_id,
      record.exec_id,
      record.requester.as_deref().unwrap_or("-"),
    );
  }
  Ok(())
}
