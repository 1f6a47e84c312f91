//! kvwarden CLI - user, role and permission management for etcd
//!
//! Run `kvwarden --help` for usage information. Without a subcommand the
//! scoped-user walkthrough runs.

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use kvwarden::auth::{AuthManager, Permission, PermissionMode};
use kvwarden::config::{Config, LogFormat, LoggingConfig, DEFAULT_CONFIG};
use kvwarden::kv::KvClient;
use kvwarden::store::{Connector, Credentials, EtcdConnector, MemoryStore, StoreClient};
use kvwarden::walkthrough::{self, ForeignRead};
use kvwarden::KvWardenError;

#[derive(Parser)]
#[command(
    name = "kvwarden",
    about = "Idempotent user, role and permission management for etcd",
    version
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use an in-process store instead of dialing the cluster
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision a prefix-scoped user, check its access, then clean up
    Walkthrough {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a key
    Put {
        key: String,
        value: String,
    },

    /// Read a key
    Get {
        key: String,

        /// Read every key under KEY
        #[arg(short, long)]
        prefix: bool,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage roles
    Role {
        #[command(subcommand)]
        command: RoleCommands,
    },

    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user (no-op if it exists)
    Add {
        name: String,

        /// Password (prompted if not provided)
        #[arg(long)]
        password: Option<String>,
    },

    /// Delete a user
    Delete { name: String },

    /// Bind a user to a role (no-op if already bound)
    GrantRole { name: String, role: String },

    /// Show a user's roles
    Info { name: String },

    /// List users
    List,
}

#[derive(Subcommand)]
enum RoleCommands {
    /// Create a role (no-op if it exists)
    Add { name: String },

    /// Delete a role
    Delete { name: String },

    /// Grant a role access to a key, range or prefix
    Grant {
        role: String,

        key: String,

        /// Exclusive end of the key range
        #[arg(long, conflicts_with = "prefix")]
        range_end: Option<String>,

        /// Grant every key starting with KEY
        #[arg(long)]
        prefix: bool,

        /// Access mode (read, write, readwrite)
        #[arg(short, long, default_value = "readwrite")]
        mode: PermissionMode,
    },

    /// Show a role's grants
    Info { name: String },

    /// List roles
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Walkthrough { json: false });

    // Init must work without a readable configuration or a password
    if let Commands::Init { force } = command {
        return init_config(cli.config, force).await;
    }

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path).await?
    } else {
        let default_path = Config::default_path();
        if default_path.exists() {
            Config::load(&default_path).await?
        } else {
            Config::default()
        }
    };

    init_logging(&config.logging, cli.verbose);

    let admin = config.store.admin_credentials(get_admin_password(&config)?);
    let connector = init_connector(&config, &admin, cli.in_memory);

    // Execute command
    match command {
        Commands::Walkthrough { json } => {
            run_walkthrough(&config, connector.as_ref(), &admin, json).await?;
        }
        Commands::Put { key, value } => {
            let store = open_admin(connector.as_ref(), &admin).await?;
            let kv = KvClient::new(store).with_request_timeout(config.store.request_timeout);
            let revision = kv.put(&key, &value).await.map_err(KvWardenError::from)?;
            println!("current revision: {}", revision);
        }
        Commands::Get { key, prefix } => {
            let store = open_admin(connector.as_ref(), &admin).await?;
            let kv = KvClient::new(store).with_request_timeout(config.store.request_timeout);
            let entries = if prefix {
                kv.get_prefix(&key).await
            } else {
                kv.get(&key).await
            }
            .map_err(KvWardenError::from)?;
            for entry in entries {
                println!("{} : {}", entry.key_str(), entry.value_str());
            }
        }
        Commands::User { command } => {
            let store = open_admin(connector.as_ref(), &admin).await?;
            let auth = AuthManager::new(store).with_request_timeout(config.store.request_timeout);
            run_user_command(&auth, command).await?;
        }
        Commands::Role { command } => {
            let store = open_admin(connector.as_ref(), &admin).await?;
            let auth = AuthManager::new(store).with_request_timeout(config.store.request_timeout);
            run_role_command(&auth, command).await?;
        }
        Commands::Init { .. } => {}
    }

    Ok(())
}

/// Install the tracing subscriber
fn init_logging(logging: &LoggingConfig, verbose: u8) {
    let level = match verbose {
        0 => logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

/// Get the admin password from config, environment or prompt
fn get_admin_password(config: &Config) -> Result<SecretString, Box<dyn std::error::Error>> {
    if let Some(password) = &config.store.password {
        return Ok(password.clone());
    }

    // Check environment variable next
    if let Ok(password) = std::env::var("KVWARDEN_PASSWORD") {
        return Ok(SecretString::from(password));
    }

    prompt_password(&format!("Enter password for {}: ", config.store.username))
}

fn prompt_password(prompt: &str) -> Result<SecretString, Box<dyn std::error::Error>> {
    eprint!("{}", prompt);
    io::stderr().flush()?;

    let password = rpassword::read_password()?;
    Ok(SecretString::from(password))
}

/// Pick the store the CLI talks to
fn init_connector(config: &Config, admin: &Credentials, in_memory: bool) -> Arc<dyn Connector> {
    if in_memory {
        debug!("Using in-process store");
        Arc::new(MemoryStore::new(admin.password.clone()))
    } else {
        Arc::new(EtcdConnector::new(
            config.store.endpoints.clone(),
            config.store.dial_timeout,
        ))
    }
}

async fn open_admin(
    connector: &dyn Connector,
    admin: &Credentials,
) -> Result<Arc<dyn StoreClient>, KvWardenError> {
    Ok(connector.connect(Some(admin)).await?)
}

/// Run the scoped-user walkthrough and print its report
async fn run_walkthrough(
    config: &Config,
    connector: &dyn Connector,
    admin: &Credentials,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(user = %config.walkthrough.user, role = %config.walkthrough.role, "Starting walkthrough");

    let report = walkthrough::run(
        connector,
        admin,
        &config.walkthrough,
        config.store.request_timeout,
    )
    .await
    .map_err(KvWardenError::from)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("current revision: {}", report.sample_revision);
    for entry in &report.sample_entries {
        println!("{} : {}", entry.key, entry.value);
    }
    println!("Granted {} to role {}", report.grant, report.removed_role);
    println!(
        "{} wrote {} at revision {}",
        report.removed_user, config.walkthrough.scoped_key, report.scoped_revision
    );
    match &report.foreign_read {
        ForeignRead::Denied { reason } => {
            println!("Read of {} denied: {}", config.walkthrough.foreign_key, reason);
        }
        ForeignRead::Allowed { entries } => {
            println!(
                "Read of {} was allowed ({} entries)",
                config.walkthrough.foreign_key,
                entries.len()
            );
        }
    }
    println!("Role {} was deleted.", report.removed_role);
    println!("User {} was deleted.", report.removed_user);

    Ok(())
}

async fn run_user_command(
    auth: &AuthManager,
    command: UserCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        UserCommands::Add { name, password } => {
            let password = match password {
                Some(p) => SecretString::from(p),
                None => prompt_password(&format!("Enter password for {}: ", name))?,
            };
            auth.create_user(&name, &password)
                .await
                .map_err(KvWardenError::from)?;
            println!("User '{}' ready", name);
        }
        UserCommands::Delete { name } => {
            auth.delete_user(&name).await.map_err(KvWardenError::from)?;
            println!("User {} was deleted.", name);
        }
        UserCommands::GrantRole { name, role } => {
            auth.bind_user_role(&name, &role)
                .await
                .map_err(KvWardenError::from)?;
            println!("User '{}' bound to role '{}'", name, role);
        }
        UserCommands::Info { name } => {
            let info = auth.user_info(&name).await.map_err(KvWardenError::from)?;
            println!("Name:  {}", info.name);
            if info.roles.is_empty() {
                println!("Roles: (none)");
            } else {
                println!("Roles: {}", info.roles.join(", "));
            }
        }
        UserCommands::List => {
            let users = auth.list_users().await.map_err(KvWardenError::from)?;
            if users.is_empty() {
                println!("No users found");
            }
            for user in users {
                println!("{}", user);
            }
        }
    }
    Ok(())
}

async fn run_role_command(
    auth: &AuthManager,
    command: RoleCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        RoleCommands::Add { name } => {
            auth.create_role(&name).await.map_err(KvWardenError::from)?;
            println!("Role '{}' ready", name);
        }
        RoleCommands::Delete { name } => {
            auth.delete_role(&name).await.map_err(KvWardenError::from)?;
            println!("Role {} was deleted.", name);
        }
        RoleCommands::Grant {
            role,
            key,
            range_end,
            prefix,
            mode,
        } => {
            let permission = if prefix {
                Permission::prefix(mode, key)
            } else {
                let permission = Permission::new(mode, key);
                match range_end {
                    Some(end) => permission.with_range_end(end),
                    None => permission,
                }
            };
            auth.grant(&role, &permission)
                .await
                .map_err(KvWardenError::from)?;
            println!("Granted {} to role '{}'", permission, role);
        }
        RoleCommands::Info { name } => {
            let info = auth.role_info(&name).await.map_err(KvWardenError::from)?;
            println!("Name:        {}", info.name);
            if info.permissions.is_empty() {
                println!("Permissions: (none)");
            }
            for permission in &info.permissions {
                println!("Permission:  {}", permission);
            }
        }
        RoleCommands::List => {
            let roles = auth.list_roles().await.map_err(KvWardenError::from)?;
            if roles.is_empty() {
                println!("No roles found");
            }
            for role in roles {
                println!("{}", role);
            }
        }
    }
    Ok(())
}

/// Write the default configuration file
async fn init_config(path: Option<PathBuf>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path.unwrap_or_else(Config::default_path);

    if config_path.exists() && !force {
        return Err(format!(
            "Configuration already exists at {}. Use --force to overwrite.",
            config_path.display()
        )
        .into());
    }

    // Create config directory
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    tokio::fs::write(&config_path, DEFAULT_CONFIG).await?;
    println!("Configuration written to {}", config_path.display());

    Ok(())
}
