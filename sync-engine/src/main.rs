use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use shared_types::{CriticId, DocumentKey, DocumentType, DocumentVersion, VersionId};
use std::sync::Arc;
use std::time::Duration;
use sync_engine::{
    Boundary, EngineConfig, GraphqlBackend, JsonFileStorage, NoteSource, ProjectSession,
    ScreenSelection, WriterBackend,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "screenplay-sync", about = "Drive screenplay version chains from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DocArg {
    Story,
    Scene,
    Script,
    BeatSheet,
}

impl From<DocArg> for DocumentType {
    fn from(value: DocArg) -> Self {
        match value {
            DocArg::Story => DocumentType::Story,
            DocArg::Scene => DocumentType::Scene,
            DocArg::Script => DocumentType::Script,
            DocArg::BeatSheet => DocumentType::BeatSheet,
        }
    }
}

#[derive(Debug, Args)]
struct KeyArgs {
    #[arg(long)]
    project: String,
    #[arg(long, value_enum, default_value = "story")]
    doc: DocArg,
    #[arg(long)]
    scene: Option<String>,
    /// Scene version a Script chain belongs to
    #[arg(long)]
    scene_text: Option<String>,
}

impl KeyArgs {
    fn key(&self) -> anyhow::Result<DocumentKey> {
        let key = DocumentKey {
            document_type: self.doc.into(),
            project_id: self.project.as_str().into(),
            scene_key: self.scene.as_deref().map(Into::into),
            scene_text_id: self.scene_text.as_deref().map(Into::into),
        };
        key.validate()?;
        Ok(key)
    }
}

#[derive(Debug, Args)]
struct WaitArgs {
    /// Keep polling until the new version appears
    #[arg(long)]
    wait: bool,
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the version chain and mark the selected version
    Versions {
        #[command(flatten)]
        key: KeyArgs,
    },
    /// Point the document at another version
    Select {
        #[command(flatten)]
        key: KeyArgs,
        version: String,
    },
    /// Request notes on the whole document or on a character range
    Notes {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long)]
        text: Option<String>,
        #[arg(long = "critic")]
        critics: Vec<String>,
        #[arg(long, requires = "end")]
        start: Option<usize>,
        #[arg(long, requires = "start")]
        end: Option<usize>,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Generate a document from a seed
    Seed {
        #[command(flatten)]
        key: KeyArgs,
        seed: String,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// Submit edited content read from a file
    Edit {
        #[command(flatten)]
        key: KeyArgs,
        #[arg(long)]
        file: std::path::PathBuf,
        #[command(flatten)]
        wait: WaitArgs,
    },
    /// List the critic presets of a project
    Critics {
        #[arg(long)]
        project: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Usage errors and --help must not depend on a readable environment.
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    sync_engine::config::load_env_file();
    let config = EngineConfig::from_env()?;

    let backend: Arc<dyn WriterBackend> = Arc::new(GraphqlBackend::new(
        &config.api_url,
        config.api_token.clone(),
        config.request_timeout,
    )?);
    let storage = Arc::new(
        JsonFileStorage::open(&config.selection_store_path).with_context(|| {
            format!(
                "opening selection store {}",
                config.selection_store_path.display()
            )
        })?,
    );

    tracing::info!(api_url = %config.api_url, "Starting screenplay-sync");

    let mut session =
        ProjectSession::spawn(backend.clone(), storage, config.poll_interval).await?;
    let result = run(&mut session, backend, cli.command).await;
    session.shutdown().await?;
    result
}

async fn run(
    session: &mut ProjectSession,
    backend: Arc<dyn WriterBackend>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Versions { key } => {
            let key = key.key()?;
            session.open(&key).await?;
            let selected = session.store().get_selected(&key);
            for version in session.store().versions(&key) {
                let marker = if Some(&version.id) == selected.as_ref() {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}", describe(&version));
            }
        }
        Command::Select { key, version } => {
            let key = key.key()?;
            session.open(&key).await?;
            let shown = session.show_version(&key, &VersionId::from(version))?;
            if let Some(version) = shown {
                println!("{}", describe(&version));
            }
        }
        Command::Notes {
            key,
            text,
            critics,
            start,
            end,
            wait,
        } => {
            let key = key.key()?;
            let source =
                NoteSource::from_parts(text, critics.into_iter().map(CriticId::from).collect())?;
            session.open(&key).await?;

            let receipt = match (start, end) {
                (Some(start), Some(end)) => {
                    let region = key.region();
                    let selection = ScreenSelection::within(
                        region,
                        Boundary::new(0, start),
                        Boundary::new(0, end),
                    );
                    if session.capture_selection(region, &selection).is_none() {
                        anyhow::bail!("range {start}..{end} is empty or outside the document");
                    }
                    session.request_notes_on_selection(&key, source).await?
                }
                _ => session.request_notes(&key, source).await?,
            };
            println!("queued task {}", receipt.ack.task_id);
            wait_for_settlement(session, &key, &wait).await?;
        }
        Command::Seed { key, seed, wait } => {
            let key = key.key()?;
            session.open(&key).await?;
            let receipt = session.submit_seed(&key, &seed).await?;
            println!("queued task {}", receipt.ack.task_id);
            wait_for_settlement(session, &key, &wait).await?;
        }
        Command::Edit { key, file, wait } => {
            let key = key.key()?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            session.open(&key).await?;
            let receipt = session.submit_edit(&key, &content).await?;
            println!("queued task {}", receipt.ack.task_id);
            wait_for_settlement(session, &key, &wait).await?;
        }
        Command::Critics { project } => {
            for critic in backend.list_critics(&project.as_str().into()).await? {
                match critic.description {
                    Some(description) => println!("{}\t{}\t{}", critic.id, critic.name, description),
                    None => println!("{}\t{}", critic.id, critic.name),
                }
            }
        }
    }
    Ok(())
}

async fn wait_for_settlement(
    session: &mut ProjectSession,
    key: &DocumentKey,
    wait: &WaitArgs,
) -> anyhow::Result<()> {
    if !wait.wait {
        return Ok(());
    }
    let mut events = session.subscribe();
    // Settlement may already have happened before we subscribed.
    if let shared_types::PollState::Settled { version_id } = session.poll_state(key).await? {
        println!("settled on {version_id}");
        return Ok(());
    }

    let deadline = Duration::from_secs(wait.timeout_secs);
    let settled = tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(event) if &event.key == key => return Ok(event),
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => return Err(anyhow::anyhow!("settlement channel closed: {e}")),
            }
        }
    })
    .await
    .context("timed out waiting for the new version")??;

    if let Some(version) = session.apply_settlement(&settled) {
        println!("{}", describe(&version));
        if let Some(text) = version.text_content {
            println!("\n{text}");
        }
    }
    Ok(())
}

fn describe(version: &DocumentVersion) -> String {
    let source = version
        .source_version_number
        .map(|n| format!(" from v{n}"))
        .unwrap_or_default();
    let status = if version.is_pending() { " (pending)" } else { "" };
    format!(
        "v{} {} [{}]{}{}",
        version.version_number,
        version.id,
        version.version_type.as_str(),
        source,
        status
    )
}
