//! Command line front-end for the Lockgate password gate
//!
//! Manages the unlock password kept in the encrypted preferences under the
//! configured data directory. Passwords are prompted for on the terminal,
//! or read from one line of stdin with `--stdin`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Password};
use lockgate_core::{
    ConsentSlot, CredentialStore, GateController, LaunchOutcome, PromptOutcome,
    ProtectionSettings, UnlockPrompt,
};
use lockgate_params::GateConfig;
use lockgate_storage_sqlite::{PlatformKeystore, SoftwareKeystore};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "lockgate")]
#[command(about = "Local password gate", long_about = None)]
struct Cli {
    /// Config file (JSON); defaults apply when it does not exist
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read passwords from stdin instead of prompting
    #[arg(long, global = true)]
    stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether protection is enabled and which KDF is stored
    Status,

    /// Set or replace the password (empty input disables protection)
    SetPassword,

    /// Remove the password
    ClearPassword {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Check a password; exit status 1 on mismatch
    Check,

    /// Run the lock screen until the correct password is entered
    Unlock {
        /// Give up after this many rejected attempts
        #[arg(short, long, default_value = "3")]
        attempts: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let keystore = SoftwareKeystore::open(config.device_key_path(), config.seal_algorithm.into())
        .context("Failed to open device keystore")?;
    let store = Arc::new(open_store(&config, &keystore)?);
    let input = PasswordInput { stdin: cli.stdin };

    match cli.command {
        Commands::Status => run_status(&store, &keystore, &config),
        Commands::SetPassword => run_set_password(store, &input),
        Commands::ClearPassword { yes } => run_clear_password(store, yes).await,
        Commands::Check => run_check(&store, &input),
        Commands::Unlock { attempts } => run_unlock(store, &input, attempts),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<GateConfig> {
    let mut config = match &cli.config {
        Some(path) => GateConfig::load_or_default(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => GateConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_store(
    config: &GateConfig,
    keystore: &dyn PlatformKeystore,
) -> anyhow::Result<CredentialStore> {
    CredentialStore::open(config, keystore).with_context(|| {
        format!(
            "Failed to open secure preferences in {}",
            config.data_dir.display()
        )
    })
}

struct PasswordInput {
    stdin: bool,
}

impl PasswordInput {
    fn read(&self, prompt: &str, confirm: bool) -> anyhow::Result<Zeroizing<String>> {
        if self.stdin {
            let mut line = Zeroizing::new(String::new());
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            let trimmed = line.trim_end_matches(['\r', '\n']).len();
            line.truncate(trimmed);
            return Ok(line);
        }

        let mut password = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true);
        if confirm {
            password = password.with_confirmation("Repeat password", "Passwords do not match");
        }
        Ok(Zeroizing::new(password.interact()?))
    }
}

fn run_status(
    store: &CredentialStore,
    keystore: &SoftwareKeystore,
    config: &GateConfig,
) -> anyhow::Result<ExitCode> {
    let enabled = store.has_credential()?;
    println!("data dir:   {}", config.data_dir.display());
    println!(
        "keystore:   {} ({})",
        if keystore.hardware_backed() { "hardware" } else { "software" },
        keystore.key_path().display()
    );
    println!(
        "protection: {}",
        if enabled { "enabled" } else { "disabled" }
    );
    if let Some(kdf) = store.stored_kdf()? {
        let note = if store.kdf().is_stronger_than(&kdf) {
            " (upgraded on next successful check)"
        } else {
            ""
        };
        println!("kdf:        {}{}", kdf, note);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_set_password(store: Arc<CredentialStore>, input: &PasswordInput) -> anyhow::Result<ExitCode> {
    let password = input.read("New password (empty to disable)", true)?;
    let settings = ProtectionSettings::new(store);
    if settings.change_password(&password)? {
        info!("Password protection enabled");
    } else {
        info!("Password protection disabled");
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_clear_password(store: Arc<CredentialStore>, yes: bool) -> anyhow::Result<ExitCode> {
    let settings = ProtectionSettings::new(store);
    if !settings.is_enabled()? {
        info!("No password configured");
        return Ok(ExitCode::SUCCESS);
    }

    let slot = Arc::new(ConsentSlot::new());
    let dialog_slot = Arc::clone(&slot);
    let launcher = move || {
        if yes {
            return LaunchOutcome::AlreadyGranted;
        }
        match Confirm::new()
            .with_prompt("Remove the password?")
            .default(false)
            .interact()
        {
            Ok(granted) => {
                dialog_slot.deliver(granted);
                LaunchOutcome::Launched
            }
            Err(e) => {
                tracing::warn!("Confirmation prompt failed: {}", e);
                LaunchOutcome::Unavailable
            }
        }
    };

    if !slot.request(&launcher).await? {
        info!("Password kept");
        return Ok(ExitCode::FAILURE);
    }
    settings.disable()?;
    Ok(ExitCode::SUCCESS)
}

fn run_check(store: &CredentialStore, input: &PasswordInput) -> anyhow::Result<ExitCode> {
    let password = input.read("Password", false)?;
    let accepted = report_check(store, &password, &mut std::io::stdout())?;
    Ok(if accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print the check verdict. An unprotected store reads like a match.
fn report_check(
    store: &CredentialStore,
    password: &str,
    out: &mut dyn Write,
) -> anyhow::Result<bool> {
    let accepted = store.check_password(password)?;
    writeln!(out, "{}", if accepted { "ok" } else { "incorrect" })?;
    Ok(accepted)
}

fn run_unlock(
    store: Arc<CredentialStore>,
    input: &PasswordInput,
    attempts: u32,
) -> anyhow::Result<ExitCode> {
    let gate = Arc::new(GateController::new(store)?);
    let unlocked = unlock_loop(
        gate,
        attempts,
        || input.read("Password", false),
        &mut std::io::stdout(),
    )?;
    Ok(if unlocked {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn unlock_loop(
    gate: Arc<GateController>,
    attempts: u32,
    mut next_password: impl FnMut() -> anyhow::Result<Zeroizing<String>>,
    out: &mut dyn Write,
) -> anyhow::Result<bool> {
    if !gate.is_locked()? {
        writeln!(out, "unlocked")?;
        return Ok(true);
    }

    let mut prompt = UnlockPrompt::new(Arc::clone(&gate));
    while gate.failed_attempts() < attempts {
        let password = next_password()?;
        prompt.set_input(&password);
        match prompt.submit()? {
            PromptOutcome::Unlocked => {
                writeln!(out, "unlocked")?;
                return Ok(true);
            }
            PromptOutcome::Rejected { message } => eprintln!("{}", message),
        }
    }

    writeln!(out, "still locked after {} attempts", gate.failed_attempts())?;
    Ok(false)
}
