use anyhow::Result;
use clap::{Parser, Subcommand};
use http::HeaderMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use tenant_hydrator::api::{AppState, Reloadables, create_router};
use tenant_hydrator::config::resolve_config_path;
use tenant_hydrator::jwks::{DiscoveryKeyFetcher, KeySetCache, KeySource, PerKeyCache, TokenVerifier};
use tenant_hydrator::runtime_mapping::RuntimeMapper;
use tenant_hydrator::{Dispatcher, HydratorConfig, RequestData, load_components};

#[derive(Parser)]
#[command(name = "tenant-hydrator")]
#[command(about = "Resolves caller identity, tenant and scopes for gateway requests")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, env = "HYDRATOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Overrides the bind address from the config file
        #[arg(long)]
        bind: Option<String>,
    },
    /// Resolve a single request body and print the hydrated result
    Resolve {
        /// File holding a `{subject, extra, header}` JSON body
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Load the configuration and every table it references, then exit
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("tenant_hydrator=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config)?;
    info!("Using configuration {}", config_path.display());
    let config = HydratorConfig::load(&config_path)?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await?,
        Commands::Resolve { input } => {
            let loaded = load_components(&config)?;
            let dispatcher = Dispatcher::from_components(&loaded.components);

            let raw = std::fs::read(&input)?;
            let data = RequestData::from_slice(&raw, HeaderMap::new())?;
            let body = dispatcher.hydrate(data).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Commands::ValidateConfig => {
            let loaded = load_components(&config)?;
            if let Some(admin) = &config.admin_auth {
                KeySource::parse(&admin.jwks_url)?;
            }
            println!("Configuration is valid");
            println!("  Static users:   {}", loaded.components.static_users.len());
            println!("  Static groups:  {}", loaded.components.static_groups.len());
            println!("  Runtimes:       {}", loaded.runtimes.len());
            println!("  Authenticators: {}", config.authenticators.len());
        }
    }

    Ok(())
}

async fn serve(config: HydratorConfig, bind: Option<String>) -> Result<()> {
    let loaded = load_components(&config)?;
    let components = loaded.components;

    loaded
        .scopes
        .clone()
        .spawn_reloader(Duration::from_secs(config.scopes_reload_seconds));

    let key_cache = Arc::new(PerKeyCache::new(
        DiscoveryKeyFetcher::new()?,
        Duration::from_secs(config.authn_jwks.key_ttl_seconds),
    ));
    key_cache
        .clone()
        .spawn_cleanup(Duration::from_secs(config.authn_jwks.cleanup_seconds));
    let authn_verifier = Arc::new(TokenVerifier::new(
        key_cache,
        config.authn_jwks.verifier.clone(),
    ));

    let admin_verifier = match &config.admin_auth {
        Some(admin) => {
            let key_set = Arc::new(KeySetCache::new(KeySource::parse(&admin.jwks_url)?)?);
            let count = key_set.refresh().await?;
            info!("Loaded {} admin keys from {}", count, admin.jwks_url);
            key_set
                .clone()
                .spawn_refresher(Duration::from_secs(admin.refresh_seconds));
            Some(Arc::new(TokenVerifier::new(key_set, admin.verifier.clone())))
        }
        None => None,
    };

    let runtime_mapper = Arc::new(RuntimeMapper::new(
        authn_verifier.clone(),
        loaded.runtimes,
        components.tenants.clone(),
    ));

    let state = AppState {
        dispatcher: Arc::new(Dispatcher::from_components(&components)),
        authenticators: components.authenticators.clone(),
        authn_verifier,
        runtime_mapper,
        reloadables: Arc::new(Reloadables {
            scopes: loaded.scopes,
            static_users: components.static_users.clone(),
            static_groups: components.static_groups.clone(),
        }),
    };

    let app = create_router(state, admin_verifier);
    let bind = bind.unwrap_or(config.bind);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Tenant hydrator listening on http://{}", bind);

    axum::serve(listener, app).await?;
    Ok(())
}
