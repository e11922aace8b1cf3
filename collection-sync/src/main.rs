use anyhow::{anyhow, Context, Result};
use artsync::auth::AuthManager;
use artsync::config::AppConfig;
use artsync::credentials::{Credential, CredentialStore, SqliteCredentialStore};
use clap::{Parser, Subcommand};
use collection_sync::{
    GalleryFolderOptions, GalleryRepository, PlatformClient, SqliteRepository, SyncService,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "artsync", about = "Sync platform user data and galleries into a local database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(long, global = true, env = "ARTSYNC_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Make sure a working credential is stored, authorizing in the browser if needed
    Login,
    /// Describe the stored credential
    Token,
    /// Sync the authenticated user
    User {
        /// Skip the extended profile request
        #[arg(long)]
        basic: bool,
    },
    /// Sync gallery folders
    Galleries {
        /// List another user's galleries
        #[arg(long)]
        username: Option<String>,
        /// Leave out empty folders
        #[arg(long)]
        filter_empty: bool,
        /// Do not ask the platform to count folder contents
        #[arg(long)]
        no_size: bool,
    },
    /// Print galleries stored locally
    ListGalleries,
    /// Include a stored gallery in future syncs
    EnableGallery {
        /// Platform folder id
        folderid: String,
    },
    /// Exclude a stored gallery from future syncs. Re-syncing keeps the choice.
    DisableGallery {
        /// Platform folder id
        folderid: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artsync=info,collection_sync=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let db_path = &config.storage.database_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    info!(database = %db_path.display(), "Configuration loaded");

    let store = Arc::new(
        SqliteCredentialStore::new(db_path).context("Failed to initialize credential store")?,
    );
    let repository =
        Arc::new(SqliteRepository::new(db_path).context("Failed to initialize repositories")?);

    match cli.command {
        Commands::Token => {
            match store.get()? {
                Some(credential) => print_credential(&credential),
                None => println!("No credential stored. Run `artsync login`."),
            }
            Ok(())
        }
        Commands::ListGalleries => {
            let galleries = repository.list_galleries()?;
            if galleries.is_empty() {
                println!("No galleries stored. Run `artsync galleries`.");
            }
            for gallery in galleries {
                println!(
                    "{:<40} {:<38} size={:<5} sync={}",
                    gallery.name,
                    gallery.folderid,
                    gallery
                        .size
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    if gallery.sync_enabled { "on" } else { "off" },
                );
            }
            Ok(())
        }
        Commands::EnableGallery { folderid } => {
            set_gallery_sync(repository.as_ref(), &folderid, true)
        }
        Commands::DisableGallery { folderid } => {
            set_gallery_sync(repository.as_ref(), &folderid, false)
        }
        command => {
            config.validate()?;
            let manager = AuthManager::new(config.oauth.clone(), store);

            if !manager.ensure_authenticated().await {
                return Err(anyhow!("Authentication failed"));
            }
            if matches!(command, Commands::Login) {
                println!("Authenticated.");
                return Ok(());
            }

            let credential = manager
                .get_valid_token()
                .await
                .ok_or_else(|| anyhow!("No valid access token after authentication"))?;
            let sync = SyncService::new(
                PlatformClient::new(&config.api),
                repository.clone(),
                repository,
            );

            match command {
                Commands::User { basic } => {
                    let user = sync.sync_user(&credential.access_token, !basic).await?;
                    println!(
                        "Synced {} ({}), id {}",
                        user.username,
                        user.userid,
                        user.id.unwrap_or_default()
                    );
                }
                Commands::Galleries {
                    username,
                    filter_empty,
                    no_size,
                } => {
                    let options = GalleryFolderOptions {
                        username,
                        calculate_size: !no_size,
                        filter_empty,
                    };
                    let count = sync.sync_galleries(&credential.access_token, &options).await?;
                    println!("Synced {} galleries", count);
                }
                _ => {}
            }
            Ok(())
        }
    }
}

fn set_gallery_sync(
    galleries: &dyn GalleryRepository,
    folderid: &str,
    enabled: bool,
) -> Result<()> {
    if !galleries.set_sync_enabled(folderid, enabled)? {
        return Err(anyhow!(
            "No stored gallery with folder id {}. Run `artsync galleries` first.",
            folderid
        ));
    }
    info!(folderid, enabled, "Gallery sync flag updated");
    println!(
        "Gallery {} sync {}",
        folderid,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn print_credential(credential: &Credential) {
    let state = if credential.is_expired() {
        "expired"
    } else {
        "valid"
    };
    println!("Token type: {}", credential.token_type);
    println!("Scope:      {}", credential.scope.as_deref().unwrap_or("-"));
    println!("Expires at: {} ({})", credential.expires_at, state);
    println!(
        "Refreshable: {}",
        if credential.has_refresh_token() { "yes" } else { "no" }
    );
}
