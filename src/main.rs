mod client;
mod compose;
mod config;
mod error;
mod logging;
mod selection;
mod session;
mod store;
mod transcript;
mod tree;
mod tui;

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser};
use config::{ConfigFile, ResolvedConfig};
use session::{LoadOutcome, SessionController, StatsView};
use store::{FileStore, HistoryStore, KeyValueStore, ModelPreference};

#[derive(Parser, Debug)]
#[command(
    name = "repochat",
    about = "Chat with an assistant about an indexed GitHub repository",
    long_about = None,
)]
struct Args {
    /// Question to ask directly (requires --repo; omit to enter the TUI)
    question: Option<String>,

    /// Repository to open, e.g. octocat/hello-world or a GitHub URL
    #[arg(short, long, env = "REPOCHAT_REPO")]
    repo: Option<String>,

    /// Override model id
    #[arg(short, long, env = "REPOCHAT_MODEL")]
    model: Option<String>,

    /// Override service endpoint URL
    #[arg(long, env = "REPOCHAT_ENDPOINT")]
    endpoint: Option<String>,

    /// Force a fresh re-index before asking (one-shot mode)
    #[arg(long)]
    refresh: bool,

    /// Debug-level logging to the log file
    #[arg(short, long)]
    verbose: bool,

    /// Write a default config file to ~/.config/repochat/config.toml and exit
    #[arg(long)]
    init: bool,

    /// List previously opened repositories and exit
    #[arg(long)]
    history: bool,

    /// Delete all saved repository history and exit
    #[arg(long)]
    clear_history: bool,

    /// Generate shell completions and print to stdout (bash, zsh, fish, elvish)
    #[arg(long, value_name = "SHELL")]
    completions: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: repochat");
        return Ok(());
    }

    // ── --completions ─────────────────────────────────────────────────────────
    if let Some(shell_name) = &args.completions {
        return generate_completions(shell_name);
    }

    let file = ConfigFile::load()?;
    let data_dir = file.storage_dir();
    let _log_guard = logging::init(&data_dir, args.verbose)?;

    let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(data_dir));
    let history = HistoryStore::new(kv.clone());
    let prefs = ModelPreference::new(kv);

    // ── --history / --clear-history ───────────────────────────────────────────
    if args.history {
        print_history(&history);
        return Ok(());
    }
    if args.clear_history {
        history.clear()?;
        println!("  History cleared.");
        return Ok(());
    }

    let saved_model = prefs.load();
    let resolved = ResolvedConfig::resolve(
        &file,
        args.endpoint.as_deref(),
        args.model.as_deref(),
        saved_model.as_deref(),
    );
    tracing::info!(endpoint = %resolved.endpoint, model = %resolved.model, "starting");

    let service = Arc::new(client::Client::new(resolved.endpoint.clone()));
    let controller = SessionController::new(service, history);

    // ── Single-shot mode (non-TUI) ────────────────────────────────────────────
    if let Some(question) = args.question {
        let Some(repo) = args.repo else {
            bail!("A question needs a repository: repochat --repo <owner/name> \"{question}\"");
        };
        return run_single_shot(controller, &repo, &question, &resolved, args.refresh).await;
    }

    // ── Interactive TUI mode ──────────────────────────────────────────────────
    tui::run(controller, prefs, resolved, args.repo).await
}

// ── Single-shot mode (plain stdout, no TUI) ───────────────────────────────────

async fn run_single_shot(
    mut controller: SessionController,
    repo: &str,
    question: &str,
    resolved: &ResolvedConfig,
    refresh: bool,
) -> Result<()> {
    println!();
    println!("  ▲ repochat  {repo}  ·  {}", resolved.model_name(&resolved.model));
    println!();

    match controller.load(repo, refresh).await {
        Some(LoadOutcome::Failed(e)) => bail!("Failed to load {repo}: {e}"),
        Some(LoadOutcome::Loaded { .. }) => {
            if let Some(stats) = controller.session().stats.as_ref().and_then(StatsView::confirmed) {
                println!("  {} files · {} chunks", stats.files_count, stats.chunks_count);
                println!();
            }
        }
        Some(LoadOutcome::Superseded) | None => {}
    }

    controller.pending_query_mut().push_str(question);
    controller.send(&resolved.model).await;
    if let Some(answer) = controller.session().transcript.last() {
        println!("{}", answer.text);
    }
    Ok(())
}

fn print_history(history: &HistoryStore) {
    let records = history.read_all();
    println!();
    if records.is_empty() {
        println!("  No repositories yet.");
        return;
    }
    println!("  History");
    for r in &records {
        println!("  {}", r.display_name());
        println!(
            "    {} files · {} messages · {}",
            r.file_count,
            r.transcript.len(),
            r.last_accessed.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
        );
    }
    println!();
}

// ── Shell completions ─────────────────────────────────────────────────────────

fn generate_completions(shell_name: &str) -> Result<()> {
    use clap_complete::{Shell, generate};

    let shell: Shell = match shell_name.to_lowercase().as_str() {
        "bash"    => Shell::Bash,
        "zsh"     => Shell::Zsh,
        "fish"    => Shell::Fish,
        "elvish"  => Shell::Elvish,
        _ => bail!("Unknown shell: {shell_name} (supported: bash, zsh, fish, elvish)"),
    };

    let mut cmd = Args::command();
    generate(shell, &mut cmd, "repochat", &mut std::io::stdout());
    Ok(())
}
