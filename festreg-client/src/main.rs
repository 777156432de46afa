//! festreg - festival registration upload client
//!
//! Drives one staged upload session per invocation. The session record is
//! kept in the local SQLite database between runs, so a flow can be
//! started, uploaded file by file and finalized across several commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use festreg_client::flows::FlowForm;
use festreg_client::{
    AccompanistRegistration, FeePayment, HttpBackend, ManagerProfile, NoExtras, SelectedFile,
    SessionContext, SessionView, SlotPolicy, SqliteSessionStore, StagedSession,
    StudentCredentials, StudentRegistration,
};
use festreg_common::config::{CliOverrides, ConfigResolver};
use festreg_common::events::{FlowKind, SessionEvent, SessionState};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for festreg
#[derive(Parser, Debug)]
#[command(name = "festreg")]
#[command(about = "Festival registration upload client")]
#[command(version)]
struct Args {
    /// Backend base URL
    #[arg(long)]
    api_url: Option<String>,

    /// Bearer token for backend calls
    #[arg(long)]
    token: Option<String>,

    /// Folder holding the session database
    #[arg(long)]
    data_folder: Option<PathBuf>,

    /// Config file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current session
    Status {
        #[arg(long, value_parser = parse_flow)]
        flow: FlowKind,
    },

    /// Submit details from a JSON file and start a session
    Start {
        #[arg(long, value_parser = parse_flow)]
        flow: FlowKind,

        #[arg(long, value_name = "FILE")]
        form: PathBuf,
    },

    /// Select and upload a file for one slot
    Upload {
        #[arg(long, value_parser = parse_flow)]
        flow: FlowKind,

        #[arg(long)]
        slot: String,

        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },

    /// Discard a slot's file
    Discard {
        #[arg(long, value_parser = parse_flow)]
        flow: FlowKind,

        #[arg(long)]
        slot: String,
    },

    /// Submit the uploaded session
    Finalize {
        #[arg(long, value_parser = parse_flow)]
        flow: FlowKind,

        /// Account password (student registration)
        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        confirm_password: Option<String>,
    },

    /// Abandon the session
    Cancel {
        #[arg(long, value_parser = parse_flow)]
        flow: FlowKind,
    },

    /// Start a new session with the stored details
    Restart {
        #[arg(long, value_parser = parse_flow)]
        flow: FlowKind,
    },

    /// Follow the countdown until the session ends
    Watch {
        #[arg(long, value_parser = parse_flow)]
        flow: FlowKind,
    },
}

impl Command {
    fn flow(&self) -> FlowKind {
        match self {
            Command::Status { flow }
            | Command::Start { flow, .. }
            | Command::Upload { flow, .. }
            | Command::Discard { flow, .. }
            | Command::Finalize { flow, .. }
            | Command::Cancel { flow }
            | Command::Restart { flow }
            | Command::Watch { flow } => *flow,
        }
    }
}

fn parse_flow(value: &str) -> Result<FlowKind, String> {
    FlowKind::from_key(value).ok_or_else(|| {
        let keys: Vec<&str> = FlowKind::ALL.iter().map(|k| k.key()).collect();
        format!("unknown flow '{}' (expected one of: {})", value, keys.join(", "))
    })
}

/// Finalize-step fields taken from the command line
trait FinalizeArgs: Sized {
    fn from_args(password: Option<String>, confirm_password: Option<String>) -> Result<Self>;
}

impl FinalizeArgs for NoExtras {
    fn from_args(_: Option<String>, _: Option<String>) -> Result<Self> {
        Ok(NoExtras {})
    }
}

impl FinalizeArgs for StudentCredentials {
    fn from_args(password: Option<String>, confirm_password: Option<String>) -> Result<Self> {
        let password = password.context("--password is required for student registration")?;
        let confirm = confirm_password.unwrap_or_else(|| password.clone());
        Ok(StudentCredentials::new(password, confirm))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new(CliOverrides {
        api_url: args.api_url.clone(),
        token: args.token.clone(),
        data_folder: args.data_folder.clone(),
        config_path: args.config.clone(),
    })
    .resolve()?;

    // Logs go to stderr; stdout carries the session view
    let default_filter = format!(
        "festreg={0},festreg_client={0},festreg_common={0}",
        config.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("festreg {}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}", config.api_base_url);

    config.ensure_data_folder()?;
    let store = SqliteSessionStore::open(&config.database_path())
        .await
        .context("Failed to open session database")?;
    let backend = HttpBackend::new(config.api_base_url.clone(), config.auth_token.clone())?;

    let ctx = SessionContext::new(Arc::new(backend), Arc::new(store))
        .with_policy(SlotPolicy::from(&config.uploads));

    match args.command.flow() {
        FlowKind::StudentRegistration => run::<StudentRegistration>(ctx, args.command).await,
        FlowKind::AccompanistRegistration => {
            run::<AccompanistRegistration>(ctx, args.command).await
        }
        FlowKind::ManagerProfile => run::<ManagerProfile>(ctx, args.command).await,
        FlowKind::FeePayment => run::<FeePayment>(ctx, args.command).await,
    }
}

async fn run<F>(ctx: SessionContext, command: Command) -> Result<()>
where
    F: FlowForm,
    F::Finalize: FinalizeArgs,
{
    let mut session = StagedSession::<F>::new(ctx);
    session.mount().await?;

    match command {
        Command::Status { .. } => {}
        Command::Start { form, .. } => {
            let form = read_form::<F>(&form).await?;
            session.submit_details(form).await?;
        }
        Command::Upload { slot, file, .. } => {
            let selected = SelectedFile::from_path(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            session.select_file(&slot, selected).await?;

            let mut events = session.events().subscribe();
            let printer = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let SessionEvent::UploadProgress { slot, percent, .. } = event {
                        eprint!("\r{}: {:>3}%", slot, percent);
                    }
                }
            });
            let result = session.upload_slot(&slot).await;
            printer.abort();
            eprintln!();
            result?;
        }
        Command::Discard { slot, .. } => {
            session.discard_file(&slot).await?;
        }
        Command::Finalize {
            password,
            confirm_password,
            ..
        } => {
            let extras = F::Finalize::from_args(password, confirm_password)?;
            session.finalize(extras).await?;
        }
        Command::Cancel { .. } => {
            session.cancel().await?;
        }
        Command::Restart { .. } => match (session.state(), session.form().cloned()) {
            // An expired record was cleared on mount; start again from its details
            (SessionState::NotStarted, Some(form)) => session.submit_details(form).await?,
            (SessionState::NotStarted, None) => bail!("No stored details to restart from"),
            _ => session.restart().await?,
        },
        Command::Watch { .. } => {
            while let Some(remaining) = session.next_tick().await {
                eprint!("\r{}  ", festreg_common::human_time::format_countdown(remaining));
                if session.state() != SessionState::Active {
                    break;
                }
            }
            eprintln!();
        }
    }

    print_view(&session.view());
    Ok(())
}

async fn read_form<F: FlowForm>(path: &Path) -> Result<F> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid form file {}", path.display()))
}

fn print_view(view: &SessionView) {
    println!("{} [{}]", view.title, view.state);
    if let Some(id) = &view.session_id {
        println!("  session:   {}", id);
    }
    println!("  remaining: {}", view.countdown);
    if view.locked {
        println!("  locked:    {}", view.lock_message.as_deref().unwrap_or("yes"));
    }
    for slot in &view.slots {
        let mut line = format!("  - {:<16} {:<10}", slot.name, slot.status.to_string());
        if slot.failures > 0 {
            line.push_str(&format!(" failures={}", slot.failures));
        }
        if slot.exhausted {
            line.push_str(" (restart required)");
        }
        println!("{}", line);
    }
    for (field, message) in view.field_errors.iter() {
        println!("  ! {}: {}", field, message);
    }
    if let Some(message) = &view.message {
        println!("  {}", message);
    }
    if view.can_finalize {
        println!("  ready to finalize");
    }
}
