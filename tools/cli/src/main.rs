//! Strongroom CLI - administrative interface for the secret vault.
//!
//! Every secret operation authenticates through the same sign-in path the
//! interactive front ends use, so lockout and history accounting cannot be
//! bypassed from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use strongroom_common::{SensitiveString, UserId};
use strongroom_crypto::KdfParams;
use strongroom_storage::{
    ClientInfo, JsonFileStore, SecretRepository, SignInHistoryRepository, UserRepository,
};
use strongroom_vault::{
    PasswordDataProtector, SecretManager, SecurityService, SignInHandler, SignInPolicy,
    SignInRequest,
};

/// Tool identifier recorded in sign-in history.
const CLIENT_NAME: &str = "strongroom-cli";

#[derive(Parser)]
#[command(name = "strongroom")]
#[command(about = "Strongroom - multi-user secret vault administration")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the store file (defaults to the platform data directory).
    #[arg(long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User account management.
    #[command(subcommand)]
    User(UserCommands),

    /// Secret management (authenticates as the given user).
    #[command(subcommand)]
    Secret(SecretCommands),
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user account.
    Create {
        /// Sign-in name.
        #[arg(short, long)]
        username: String,

        /// Display name (defaults to the username).
        #[arg(short, long)]
        display_name: Option<String>,
    },

    /// Unlock a locked account.
    Unlock {
        /// Sign-in name.
        #[arg(short, long)]
        username: String,
    },

    /// Change a user's password, re-wrapping their master key.
    ChangePassword {
        /// Sign-in name.
        #[arg(short, long)]
        username: String,
    },
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Add a new named secret.
    Add {
        /// Sign-in name.
        #[arg(short, long)]
        username: String,

        /// Secret name.
        #[arg(short, long)]
        name: String,

        /// Secret value (prompted interactively when omitted).
        #[arg(long)]
        value: Option<String>,
    },

    /// Show a secret's value.
    Show {
        /// Sign-in name.
        #[arg(short, long)]
        username: String,

        /// Secret name.
        #[arg(short, long)]
        name: String,
    },

    /// List secret names.
    List {
        /// Sign-in name.
        #[arg(short, long)]
        username: String,
    },

    /// Replace a secret's value.
    Set {
        /// Sign-in name.
        #[arg(short, long)]
        username: String,

        /// Secret name.
        #[arg(short, long)]
        name: String,

        /// New value (prompted interactively when omitted).
        #[arg(long)]
        value: Option<String>,
    },

    /// Remove a secret.
    Remove {
        /// Sign-in name.
        #[arg(short, long)]
        username: String,

        /// Secret name.
        #[arg(short, long)]
        name: String,
    },
}

/// Wired-up core services over one store file.
struct App {
    users: Arc<dyn UserRepository>,
    security: Arc<SecurityService>,
    handler: SignInHandler,
    secrets: SecretManager,
}

impl App {
    fn open(store_path: &PathBuf) -> Result<Self> {
        let store = Arc::new(
            JsonFileStore::open(store_path)
                .with_context(|| format!("Failed to open store at {}", store_path.display()))?,
        );
        let users: Arc<dyn UserRepository> = store.clone();
        let history: Arc<dyn SignInHistoryRepository> = store.clone();
        let secrets: Arc<dyn SecretRepository> = store.clone();

        let security = Arc::new(SecurityService::new(users.clone(), KdfParams::interactive()));
        let handler = SignInHandler::new(
            users.clone(),
            history,
            security.clone(),
            SignInPolicy::default(),
        );

        Ok(Self {
            users,
            security,
            handler,
            secrets: SecretManager::new(secrets),
        })
    }

    /// Authenticate through the sign-in path and build a password-scoped
    /// protector for this invocation.
    async fn authenticate(&self, username: &str) -> Result<(UserId, PasswordDataProtector)> {
        let password = rpassword::prompt_password(format!("Password for {}: ", username))
            .context("Failed to read password")?;

        let request = SignInRequest::new(username, password.clone());
        let success = match self
            .handler
            .handle_sign_in(&request, &ClientInfo::local_tool(CLIENT_NAME))
            .await
        {
            Ok(success) => success,
            Err(e) => {
                error!(error = %e, "Sign-in failed");
                bail!("{}", e.user_message());
            }
        };

        // The uncovered key is dropped here; the protector re-derives it
        // from the password on every call.
        let user_id = success.user.id.clone();
        let protector = PasswordDataProtector::new(
            user_id.clone(),
            SensitiveString::new(password),
            self.users.clone(),
            self.security.clone(),
        );
        Ok((user_id, protector))
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("strongroom").join("store.json"))
        .unwrap_or_else(|| PathBuf::from("strongroom-store.json"))
}

fn prompt_new_password() -> Result<String> {
    let password = rpassword::prompt_password("New password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

fn value_or_prompt(value: Option<String>) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => Ok(rpassword::prompt_password("Secret value: ")?),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let store_path = cli.store.unwrap_or_else(default_store_path);
    let app = App::open(&store_path)?;

    match cli.command {
        Commands::User(command) => run_user_command(&app, command).await,
        Commands::Secret(command) => run_secret_command(&app, command).await,
    }
}

async fn run_user_command(app: &App, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Create {
            username,
            display_name,
        } => {
            let password = prompt_new_password()?;
            let display_name = display_name.unwrap_or_else(|| username.clone());
            let user = app
                .security
                .create_user(&username, &display_name, &password)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Created user '{}' ({})", user.username, user.id);
            Ok(())
        }

        UserCommands::Unlock { username } => {
            let Some(mut user) = app.users.find_by_username(&username).await? else {
                bail!("No such user: {}", username);
            };
            if app.security.unlock_user(&mut user).await? {
                println!("Unlocked '{}'", username);
            } else {
                println!("'{}' was not locked", username);
            }
            Ok(())
        }

        UserCommands::ChangePassword { username } => {
            let old_password =
                rpassword::prompt_password(format!("Current password for {}: ", username))?;

            // Authenticate through the handler so lockout applies.
            let request = SignInRequest::new(username.as_str(), old_password.clone());
            let success = match app
                .handler
                .handle_sign_in(&request, &ClientInfo::local_tool(CLIENT_NAME))
                .await
            {
                Ok(success) => success,
                Err(e) => {
                    error!(error = %e, "Sign-in failed");
                    bail!("{}", e.user_message());
                }
            };

            let new_password = prompt_new_password()?;
            let mut user = success.user;
            app.security
                .change_password(&mut user, &old_password, &new_password)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Password changed for '{}'", username);
            Ok(())
        }
    }
}

async fn run_secret_command(app: &App, command: SecretCommands) -> Result<()> {
    match command {
        SecretCommands::Add {
            username,
            name,
            value,
        } => {
            let (user_id, protector) = app.authenticate(&username).await?;
            let value = value_or_prompt(value)?;
            app.secrets
                .create(&protector, &user_id, &name, &value)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Stored secret '{}'", name);
            Ok(())
        }

        SecretCommands::Show { username, name } => {
            let (user_id, protector) = app.authenticate(&username).await?;
            match app
                .secrets
                .get(&protector, &user_id, &name)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?
            {
                Some(value) => {
                    println!("{}", value);
                    Ok(())
                }
                None => bail!("No secret named '{}'", name),
            }
        }

        SecretCommands::List { username } => {
            let (user_id, protector) = app.authenticate(&username).await?;
            let entries = app
                .secrets
                .list(&protector, &user_id)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            if entries.is_empty() {
                println!("No secrets stored");
            } else {
                for entry in entries {
                    println!("{}", entry.name);
                }
            }
            Ok(())
        }

        SecretCommands::Set {
            username,
            name,
            value,
        } => {
            let (user_id, protector) = app.authenticate(&username).await?;
            let value = value_or_prompt(value)?;
            app.secrets
                .update(&protector, &user_id, &name, &value)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Updated secret '{}'", name);
            Ok(())
        }

        SecretCommands::Remove { username, name } => {
            let (user_id, protector) = app.authenticate(&username).await?;
            app.secrets
                .delete(&protector, &user_id, &name)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e.user_message()))?;
            println!("Removed secret '{}'", name);
            Ok(())
        }
    }
}
