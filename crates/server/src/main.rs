//! kcache server entry point.
//!
//! Loads configuration, wires the main and team knowledge bases, runs the
//! startup index, keeps both fresh with background refresh loops and serves
//! the read-only MCP tools on stdio. Logging goes to stderr to avoid
//! interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use kcache_client::{ChatEnricher, UrlLinksConfig, UrlLinksProvider, WebFetcher};
use kcache_core::{AppConfig, Enricher, Error, FileFolderProvider, Indexer, RefreshLoop, SourceProvider};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        sources_dir = %config.sources_dir.display(),
        links_file = %config.links_file.display(),
        team_enabled = config.team_topics_dir.is_some(),
        render_enabled = config.render_enabled,
        "Starting kcache server on stdio transport"
    );

    let enricher: Arc<dyn Enricher> = Arc::new(ChatEnricher::from_config(&config)?);
    let main_kb = Arc::new(main_indexer(&config, enricher.clone())?);
    let team_kb = team_indexer(&config, enricher).map(Arc::new);

    let mut loops = vec![RefreshLoop::new(main_kb.clone(), config.refresh_tick())];
    if let Some(team) = &team_kb {
        loops.push(RefreshLoop::new(team.clone(), config.refresh_tick()));
    }
    let loops = Arc::new(loops);

    let startup = {
        let indexers: Vec<Arc<Indexer>> = std::iter::once(main_kb.clone()).chain(team_kb.clone()).collect();
        let loops = loops.clone();
        tokio::spawn(async move {
            for indexer in &indexers {
                match indexer.run_once().await {
                    Ok(report) => tracing::info!(
                        prefix = %indexer.config().index_prefix,
                        discovered = report.discovered,
                        added = report.added,
                        summarized = report.summarized,
                        summary_failed = report.summary_failed,
                        "startup index finished"
                    ),
                    Err(e) => tracing::error!(prefix = %indexer.config().index_prefix, error = %e, "startup index failed"),
                }
            }
            for refresh in loops.iter() {
                refresh.start().await;
            }
        })
    };

    let handler = handler::KcacheServer::new(tools::KnowledgeBases::new(main_kb, team_kb));
    let server = serve_server(handler, stdio()).await?;
    let served = server.waiting().await;

    startup.abort();
    for refresh in loops.iter() {
        refresh.stop().await;
    }
    tracing::info!("kcache server stopped");

    served?;
    Ok(())
}

fn main_indexer(config: &AppConfig, enricher: Arc<dyn Enricher>) -> Result<Indexer, Error> {
    let fetcher = WebFetcher::from_config(config)?;
    let fetcher = if config.render_enabled { fetcher.with_renderer(renderer()?) } else { fetcher };

    let files: Arc<dyn SourceProvider> = Arc::new(FileFolderProvider::new("files", &config.sources_dir));
    let links: Arc<dyn SourceProvider> =
        Arc::new(UrlLinksProvider::new("links", UrlLinksConfig::from(config), Arc::new(fetcher)));

    Ok(Indexer::new(config.kb_indexer(), vec![files, links], enricher))
}

fn team_indexer(config: &AppConfig, enricher: Arc<dyn Enricher>) -> Option<Indexer> {
    let topics_dir = config.team_topics_dir.as_ref()?;
    let indexer_config = config.team_indexer()?;
    let topics: Arc<dyn SourceProvider> = Arc::new(FileFolderProvider::new("team_topics", topics_dir));
    Some(Indexer::new(indexer_config, vec![topics], enricher))
}

#[cfg(feature = "render")]
fn renderer() -> Result<Arc<dyn kcache_client::Renderer>, Error> {
    Ok(Arc::new(kcache_client::HeadlessRenderer::new()))
}

#[cfg(not(feature = "render"))]
fn renderer() -> Result<Arc<dyn kcache_client::Renderer>, Error> {
    Err(Error::RenderDisabled)
}
