use threatgalaxy::cli::{Cli, Commands, ConfigAction};
use threatgalaxy::cluster::NormalizedCluster;
use threatgalaxy::config::Config;
use threatgalaxy::error::{GalaxyError, Result};
use threatgalaxy::sink::{emit_cluster, emit_lookup_miss, GraphSink};
use threatgalaxy::store::{ClusterSelector, GalaxyStore, HttpArchiveSource, Refresher};

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Lookup {
            selector,
            related,
            json,
        } => {
            cmd_lookup(cli.config, &selector, related, json)?;
        }
        Commands::Search {
            keyword,
            limit,
            json,
        } => {
            cmd_search(cli.config, &keyword, limit, json)?;
        }
        Commands::Related { uuid, json } => {
            cmd_related(cli.config, &uuid, json)?;
        }
        Commands::Refresh { force } => {
            cmd_refresh(cli.config, force)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("threatgalaxy=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Text sink printing entities the way the host application would render them
struct TextSink;

impl GraphSink for TextSink {
    fn add_entity(&mut self, kind: &str, display_value: &str) {
        println!("[{}] {}", kind, display_value.replace('\n', " / "));
    }
    fn add_property(&mut self, name: &str, _display_name: &str, value: &str) {
        if !value.is_empty() {
            println!("    {}: {}", name, value);
        }
    }
    fn set_note(&mut self, note: &str) {
        println!("    note: {}", note);
    }
    fn set_icon_url(&mut self, url: &str) {
        println!("    icon: {}", url);
    }
    fn set_bookmark(&mut self, color: i32) {
        println!("    bookmark: {}", color);
    }
    fn message(&mut self, text: &str) {
        println!("{}", text);
    }
}

fn parse_selector(raw: &str) -> ClusterSelector {
    if let Ok(uuid) = raw.parse::<uuid::Uuid>() {
        return ClusterSelector {
            uuid: Some(uuid),
            ..Default::default()
        };
    }
    if raw.starts_with("misp-galaxy:") {
        return ClusterSelector {
            tag_name: Some(raw.to_string()),
            ..Default::default()
        };
    }
    ClusterSelector {
        name: Some(raw.to_string()),
        ..Default::default()
    }
}

fn cmd_lookup(
    config_path: Option<std::path::PathBuf>,
    selector: &str,
    related: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = GalaxyStore::open(&config)?;

    let Some(cluster) = store.resolve(&parse_selector(selector)) else {
        if json {
            println!("null");
        } else {
            emit_lookup_miss(&mut TextSink);
        }
        return Ok(());
    };

    if json {
        let mut records = vec![cluster.normalize()];
        if related {
            records.extend(store.neighbors(cluster).iter().map(|c| c.normalize()));
        }
        println!("{}", to_json(&records)?);
        return Ok(());
    }

    let mut sink = TextSink;
    emit_cluster(&cluster.normalize(), &mut sink);
    if related {
        for neighbor in store.neighbors(cluster) {
            emit_cluster(&neighbor.normalize(), &mut sink);
        }
    }
    Ok(())
}

fn cmd_search(
    config_path: Option<std::path::PathBuf>,
    keyword: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = GalaxyStore::open(&config)?;

    // the matcher yields one hit per matching synonym; dedup here
    let mut seen = std::collections::HashSet::new();
    let records: Vec<NormalizedCluster> = store
        .search(keyword)
        .filter(|c| seen.insert(c.uuid))
        .take(limit)
        .map(|c| c.normalize())
        .collect();

    if json {
        println!("{}", to_json(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No clusters matched '{}'", keyword);
        return Ok(());
    }

    let mut sink = TextSink;
    for record in &records {
        emit_cluster(record, &mut sink);
    }
    println!("\n{} cluster(s)", records.len());
    Ok(())
}

fn cmd_related(config_path: Option<std::path::PathBuf>, uuid: &str, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let uuid: uuid::Uuid = uuid
        .parse()
        .map_err(|_| GalaxyError::Config(format!("Not a valid uuid: {}", uuid)))?;
    let store = GalaxyStore::open(&config)?;

    let records: Vec<NormalizedCluster> =
        store.relating_to(&uuid).map(|c| c.normalize()).collect();

    if json {
        println!("{}", to_json(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No clusters relate to {}", uuid);
        return Ok(());
    }

    let mut sink = TextSink;
    for record in &records {
        emit_cluster(record, &mut sink);
    }
    Ok(())
}

fn cmd_refresh(config_path: Option<std::path::PathBuf>, force: bool) -> Result<()> {
    use threatgalaxy::store::RefreshOutcome;

    let config = load_config(config_path)?;
    let refresher = Refresher::new(&config);
    let source = HttpArchiveSource::new(&config.upstream);

    let outcome = refresher.refresh(&source, force)?;
    match outcome {
        RefreshOutcome::Fresh => {
            println!("✓ Snapshot is fresh, nothing to do");
        }
        RefreshOutcome::Rebuilt(count) => {
            println!("✓ Snapshot rebuilt with {} clusters", count);
        }
        RefreshOutcome::KeptPrevious => {
            println!("⚠ Rebuild failed, previous snapshot kept");
        }
    }

    let snapshot = config.cache.snapshot_path();
    if let Ok(metadata) = std::fs::metadata(&snapshot) {
        if let Ok(modified) = metadata.modified() {
            let stamp: chrono::DateTime<chrono::Local> = modified.into();
            println!("  Snapshot: {}", snapshot.display());
            println!("  Modified: {}", stamp.format("%Y-%m-%d %H:%M:%S"));
        }
    }
    Ok(())
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| GalaxyError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = Config::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| GalaxyError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::debug!(
            "Config file not found, using defaults. Run 'threatgalaxy config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| GalaxyError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}
