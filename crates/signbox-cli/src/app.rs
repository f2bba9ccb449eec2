//! Command handlers for the signbox CLI.
//!
//! `App` owns the configuration, the persisted credential store and the API
//! client, and watches the session flag so it can tell the user when a
//! command ended their session.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use signbox_core::auth::{access_time_left, Keychain};
use signbox_core::utils::{format_date, truncate_string};
use signbox_core::{ApiClient, Config, CredentialStore, SessionNotifier, SessionState, Verdict};

/// Width of the file name column in `list`
const NAME_COLUMN_WIDTH: usize = 40;

const ENV_EMAIL: &str = "SIGNBOX_EMAIL";
const ENV_PASSWORD: &str = "SIGNBOX_PASSWORD";

pub struct App {
    config: Config,
    client: ApiClient,
    session_rx: watch::Receiver<SessionState>,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        debug!(api = %config.api_base_url, threshold_secs = config.refresh_threshold_secs, "Config loaded");

        let cache_dir = Config::cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
        let store = match CredentialStore::persistent(&cache_dir) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Failed to load saved session, starting logged out");
                CredentialStore::in_memory()
            }
        };

        let initial = SessionState::from_stored(store.get().as_ref());
        debug!(?initial, "Session state derived from saved credentials");
        let session = SessionNotifier::new(initial);
        let session_rx = session.subscribe();
        let client = ApiClient::new(&config, Arc::new(store), session)?;

        Ok(Self {
            config,
            client,
            session_rx,
        })
    }

    /// Tell the user if the last command ended the session
    pub fn report_session_change(&mut self) {
        if self.session_rx.has_changed().unwrap_or(false)
            && *self.session_rx.borrow_and_update() == SessionState::NotLoggedIn
        {
            eprintln!("Your session has ended. Run `signbox login` to sign in again.");
        }
    }

    fn require_credentials(&self) -> Result<()> {
        if self.client.store().get().is_none() {
            bail!("Not logged in. Run `signbox login` first.");
        }
        Ok(())
    }

    // ===== Session commands =====

    pub async fn login(&mut self, email: Option<String>, remember: bool) -> Result<()> {
        let email = self.resolve_email(email)?;

        let password = if let Ok(password) = std::env::var(ENV_PASSWORD) {
            password
        } else if Keychain::has_password(&email) && confirm("Use stored password? [Y/n]: ")? {
            Keychain::get_password(&email)?
        } else {
            prompt_password()?
        };

        self.client.login(&email, &password).await?;

        if remember {
            if let Err(e) = Keychain::store(&email, &password) {
                warn!(error = %e, "Failed to store password in keychain");
            }
        }
        self.remember_email(email);

        // the transition to logged in is expected here
        self.session_rx.borrow_and_update();
        println!("Login successful!");
        Ok(())
    }

    pub async fn register(&mut self, email: Option<String>, name: Option<String>) -> Result<()> {
        let email = self.resolve_email(email)?;
        let password = prompt_password()?;
        let confirmation = rpassword::prompt_password("Confirm password: ")?;
        if password != confirmation {
            bail!("Passwords do not match");
        }

        self.client.register(&email, &password, name.as_deref()).await?;
        self.remember_email(email);
        self.session_rx.borrow_and_update();
        println!("Account created, you are now logged in.");
        Ok(())
    }

    pub async fn logout(&mut self, forget: bool) {
        self.client.logout().await;
        self.session_rx.borrow_and_update();

        if forget {
            if let Some(ref email) = self.config.last_email {
                if let Err(e) = Keychain::delete(email) {
                    debug!(error = %e, "No stored password to forget");
                }
            }
        }
        println!("Logged out.");
    }

    pub fn status(&self) {
        match self.client.store().get() {
            Some(pair) if self.client.session().current().is_logged_in() => {
                let left = access_time_left(&pair, Utc::now());
                println!("Logged in{}", self.account_suffix());
                println!(
                    "Access token expires in {}m (refreshed when under {}m)",
                    left.num_minutes().max(0),
                    self.config.refresh_threshold().num_minutes()
                );
                println!("Session valid until {}", pair.refresh_expires_at.format("%b %d, %Y %H:%M UTC"));
            }
            Some(pair) if pair.is_refresh_usable(Utc::now()) => {
                println!("Access token expired; it will be renewed on the next request.");
            }
            _ => println!("Not logged in."),
        }
    }

    // ===== File commands =====

    pub async fn list(&self) -> Result<()> {
        self.require_credentials()?;
        let files = self.client.list_files().await?;
        if files.is_empty() {
            println!("No files uploaded yet.");
            return Ok(());
        }

        println!(
            "{:<26} {:<width$} {:>10} {:<9} CREATED",
            "ID",
            "NAME",
            "SIZE",
            "STATUS",
            width = NAME_COLUMN_WIDTH
        );
        for file in &files {
            println!(
                "{:<26} {:<width$} {:>10} {:<9} {}",
                file.id,
                truncate_string(file.display_name(), NAME_COLUMN_WIDTH),
                file.display_size(),
                file.signed_label(),
                file.created_at.as_deref().map(format_date).unwrap_or_default(),
                width = NAME_COLUMN_WIDTH
            );
        }
        Ok(())
    }

    pub async fn info(&self, id: &str) -> Result<()> {
        self.require_credentials()?;
        let file = self.client.file_info(id).await?;
        println!("ID:       {}", file.id);
        println!("Name:     {}", file.display_name());
        println!("Size:     {}", file.display_size());
        if let Some(ref mime) = file.mime_type {
            println!("Type:     {}", mime);
        }
        println!("Status:   {}", file.signed_label());
        if let Some(ref created) = file.created_at {
            println!("Uploaded: {}", format_date(created));
        }
        Ok(())
    }

    pub async fn upload(&self, path: &Path, sign: bool) -> Result<()> {
        self.require_credentials()?;
        let (filename, bytes) = read_local_file(path)?;
        let uploaded = self.client.upload_file(&filename, bytes, sign).await?;

        let id = uploaded.id.as_deref().unwrap_or("-");
        println!("Uploaded {} (id {}){}", uploaded.filename, id, if uploaded.is_signed { ", signed" } else { "" });
        if let Some(ref url) = uploaded.url {
            println!("{}", url);
        }
        Ok(())
    }

    pub async fn download(&self, id: &str, output: Option<PathBuf>) -> Result<()> {
        self.require_credentials()?;
        let file = self.client.download_file(id).await?;
        let target = output.unwrap_or_else(|| PathBuf::from(&file.filename));
        std::fs::write(&target, &file.bytes)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        println!("Saved {} ({} bytes)", target.display(), file.bytes.len());
        Ok(())
    }

    /// Verify several files concurrently. Returns whether all were verified.
    pub async fn verify(&self, paths: &[PathBuf], json: bool) -> Result<bool> {
        self.require_credentials()?;
        let mut inputs = Vec::with_capacity(paths.len());
        for path in paths {
            inputs.push(read_local_file(path)?);
        }

        let verdicts = futures::future::join_all(
            inputs
                .into_iter()
                .map(|(filename, bytes)| async move {
                    let verdict = self.client.verify_file(&filename, bytes).await;
                    (filename, verdict)
                }),
        )
        .await;
        info!(count = verdicts.len(), "Verification batch finished");

        if json {
            let report: Vec<_> = verdicts
                .iter()
                .map(|(filename, verdict)| serde_json::json!({ "file": filename, "verdict": verdict }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            for (filename, verdict) in &verdicts {
                print_verdict(filename, verdict);
            }
        }
        Ok(verdicts.iter().all(|(_, v)| v.is_verified))
    }

    // ===== Helpers =====

    fn resolve_email(&self, email: Option<String>) -> Result<String> {
        if let Some(email) = email.or_else(|| std::env::var(ENV_EMAIL).ok()) {
            return Ok(email);
        }
        let email = match self.config.last_email {
            Some(ref last) => prompt(&format!("Email [{}]: ", last))?.unwrap_or_else(|| last.clone()),
            None => prompt("Email: ")?.unwrap_or_default(),
        };
        if email.is_empty() {
            bail!("Email is required");
        }
        Ok(email)
    }

    fn remember_email(&mut self, email: String) {
        self.config.last_email = Some(email);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    fn account_suffix(&self) -> String {
        self.config
            .last_email
            .as_ref()
            .map(|e| format!(" as {}", e))
            .unwrap_or_default()
    }
}

fn print_verdict(filename: &str, verdict: &Verdict) {
    let mark = if verdict.is_verified {
        "✓"
    } else if verdict.is_presumed_unsigned() {
        "?"
    } else {
        "✗"
    };
    println!("{} {}: {}", mark, filename, verdict.message);
}

fn read_local_file(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("{} is not a file", path.display()))?;
    Ok((filename, bytes))
}

/// Read a line from stdin; `None` if the user just pressed enter
fn prompt(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();
    Ok((!input.is_empty()).then(|| input.to_string()))
}

fn confirm(label: &str) -> Result<bool> {
    Ok(prompt(label)?.map(|a| a.to_lowercase() != "n").unwrap_or(true))
}

fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;
    Ok(password)
}
