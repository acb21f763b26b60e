// Watch mode: initial index, then live re-indexing on file changes.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::reindex::Reindexer;
use crate::watcher::FileWatcher;

use super::ProjectContext;

pub async fn watch_project(project: String) -> Result<()> {
    // One context for the initial index and the watch loop: the table
    // built in the parse phase must stay live for later resolutions.
    let ctx = ProjectContext::open(&project, false)?;
    super::index::run_index(&ctx, &project).await?;

    println!("Watching {} for changes. Press Ctrl+C to stop.", project);
    run_watch_loop(ctx).await
}

/// Wire the watcher into the re-indexer and run both until interrupted.
pub async fn run_watch_loop(ctx: ProjectContext) -> Result<()> {
    let (tx, rx) = mpsc::channel(100);

    let reindexer = Arc::new(Reindexer::new(
        Arc::clone(&ctx.orchestrator),
        ctx.project_root.clone(),
        ctx.config.reindex_interval(),
        ctx.config.debounce(),
    ));

    let watcher = FileWatcher::new(ctx.project_root.clone());

    let reindex_task = {
        let reindexer = Arc::clone(&reindexer);
        tokio::spawn(async move { reindexer.run(rx).await })
    };

    tokio::select! {
        result = watcher.watch(tx) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down watcher");
        }
    }

    reindex_task.abort();
    ctx.orchestrator.drain_deep_passes().await;
    Ok(())
}
