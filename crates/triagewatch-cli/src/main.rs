//! `triagewatch`: run extraction, lookup, listing reconciliation and
//! submission against saved portal pages.

mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use triagewatch_core::schema::portal;
use triagewatch_core::{Document, ResponsibleParty, TriageAnnotation, extract};
use triagewatch_host::{
    AnnotationPanel, HostConfig, Indicator, ListObserver, LiveDocument, Page, PanelOutcome,
};
use triagewatch_sync::{HttpRemoteStore, RemoteStore};
use url::Url;

#[derive(Parser)]
#[command(name = "triagewatch", version, about = "Condominium occurrence triage")]
struct Cli {
    /// Backend base URL (overrides the config file).
    #[arg(long, global = true, env = "TRIAGEWATCH_BACKEND")]
    backend: Option<String>,

    /// JSON file with host settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the occurrence record from a saved detail page.
    Extract {
        html: PathBuf,
        /// URL the page was saved from. Defaults to the file's URL.
        #[arg(long)]
        page_url: Option<Url>,
        /// Print JSON instead of a card.
        #[arg(long)]
        json: bool,
    },
    /// Show the backend's triage state for a protocol.
    Check { protocol: u64 },
    /// Reconcile a saved listing page against the backend.
    Scan { html: PathBuf },
    /// Submit a triage annotation for a saved detail page.
    Submit {
        html: PathBuf,
        #[arg(long)]
        page_url: Option<Url>,
        #[command(flatten)]
        triage: TriageArgs,
    },
}

#[derive(Args)]
struct TriageArgs {
    /// The deputy manager interacted.
    #[arg(long)]
    deputy: bool,
    /// The manager interacted.
    #[arg(long)]
    manager: bool,
    /// The administration interacted.
    #[arg(long)]
    admin: bool,
    #[arg(long)]
    resolved: bool,
    #[arg(long, value_enum, default_value_t = Responsible::Unassigned)]
    responsible: Responsible,
}

#[derive(Clone, Copy, ValueEnum)]
enum Responsible {
    #[value(name = "none")]
    Unassigned,
    Deputy,
    Manager,
}

impl TriageArgs {
    fn annotation(&self) -> TriageAnnotation {
        TriageAnnotation {
            deputy_involved: self.deputy,
            manager_involved: self.manager,
            admin_involved: self.admin,
            resolved: self.resolved,
            responsible: match self.responsible {
                Responsible::Unassigned => ResponsibleParty::Unassigned,
                Responsible::Deputy => ResponsibleParty::Deputy,
                Responsible::Manager => ResponsibleParty::Manager,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.backend)?;
    info!(backend = %config.backend_url, "triagewatch v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Extract {
            html,
            page_url,
            json,
        } => {
            let page = load_page(&html, page_url)?;
            let detail_url = page.detail_url();
            let record = page.top().read(|doc| extract(doc, &detail_url));
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                display::print_record(&record);
            }
        }
        Command::Check { protocol } => {
            let store = HttpRemoteStore::new(config.backend_url.clone());
            let remote = store
                .lookup(protocol)
                .await
                .with_context(|| format!("looking up protocol {protocol}"))?;
            display::print_remote(protocol, remote.as_ref());
        }
        Command::Scan { html } => {
            let doc = LiveDocument::new(read_document(&html)?);
            let store: Arc<dyn RemoteStore> =
                Arc::new(HttpRemoteStore::new(config.backend_url.clone()));
            let observer = ListObserver::new(store, config.debounce());
            let report = observer.rescan(&doc).await;
            let rows = doc.read(|d| {
                d.query_selector_all(d.root(), &portal::LISTING_ENTRY)
                    .into_iter()
                    .map(|entry| {
                        let info = d
                            .query_selector(entry, &portal::ENTRY_INFO)
                            .unwrap_or(entry);
                        (
                            d.text_content(info).trim().to_string(),
                            Indicator::painted_on(d, entry),
                        )
                    })
                    .collect::<Vec<_>>()
            });
            display::print_scan(&rows, &report);
        }
        Command::Submit {
            html,
            page_url,
            triage,
        } => {
            let page = load_page(&html, page_url)?;
            let store: Arc<dyn RemoteStore> =
                Arc::new(HttpRemoteStore::new(config.backend_url.clone()));
            let panel = AnnotationPanel::new(page.clone(), store, None, config.feedback_ttl());

            match panel.present(page.top()).await {
                PanelOutcome::Shown { protocol, known } => {
                    info!(protocol, known, "current state loaded");
                }
                PanelOutcome::Removed => bail!("{} has no valid protocol", html.display()),
                PanelOutcome::Closed => bail!("panel closed before submission"),
            }
            let annotation = triage.annotation();
            panel.set_annotation(&annotation);
            display::print_annotation(&annotation);

            let outcome = panel.submit().await.context("panel is not open")?;
            display::print_outcome(&outcome);
            if !outcome.is_success() {
                bail!("submission rejected");
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>, backend: Option<String>) -> anyhow::Result<HostConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => HostConfig::default(),
    };
    if let Some(backend) = backend {
        config.backend_url = backend;
    }
    Ok(config)
}

fn read_document(path: &Path) -> anyhow::Result<Document> {
    let html =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(Document::parse_html(&html))
}

fn load_page(path: &Path, page_url: Option<Url>) -> anyhow::Result<Page> {
    let url = match page_url {
        Some(url) => url,
        None => {
            let absolute = std::fs::canonicalize(path)
                .with_context(|| format!("resolving {}", path.display()))?;
            Url::from_file_path(&absolute)
                .map_err(|()| anyhow!("{} is not a valid file URL", absolute.display()))?
        }
    };
    Ok(Page::new(url, read_document(path)?))
}
