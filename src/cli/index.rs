// Full project indexing: parse everything, then resolve call targets.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::graph::CallSite;
use crate::reindex::supported_files;

use super::ProjectContext;

pub async fn index_project(project: String, rebuild: bool, watch: bool) -> Result<()> {
    let ctx = ProjectContext::open(&project, rebuild)?;
    run_index(&ctx, &project).await?;

    if watch {
        println!("\nWatching for changes. Press Ctrl+C to stop.");
        super::watch::run_watch_loop(ctx).await?;
    }

    Ok(())
}

/// Index one project into an already-open context. Watch mode reuses the
/// same context afterwards so the table built here stays live.
pub(super) async fn run_index(ctx: &ProjectContext, project: &str) -> Result<()> {
    info!("Indexing project: {}", project);

    println!("symgraph v{}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", project);
    println!(
        "Config: {}",
        if ctx.config.project.name != "unnamed-project" {
            "loaded"
        } else {
            "default"
        }
    );
    println!("Languages: {}", ctx.config.languages.enabled.join(", "));
    println!("Database: {}", ctx.orchestrator.store().db_path().display());

    let files: Vec<PathBuf> = supported_files(&ctx.project_root)
        .into_iter()
        .filter(|p| ctx.config.should_index_file(&p.to_string_lossy()))
        .collect();
    println!("\nFound {} source files", files.len());

    // Phase 1: parse everything into the symbol table.
    println!("\nPhase 1: parsing...");
    let bar = progress_bar(files.len() as u64);
    let semaphore = Arc::new(Semaphore::new(ctx.config.reindex.workers));
    let mut handles = Vec::with_capacity(files.len());

    for path in &files {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let orchestrator = Arc::clone(&ctx.orchestrator);
        let path = path.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = orchestrator.parse_path(&path);
            (path, result)
        }));
    }

    let mut call_sites: Vec<(String, Vec<CallSite>)> = Vec::new();
    let mut parsed = 0usize;
    let mut failed = 0usize;
    for handle in handles {
        let (path, result) = handle.await?;
        bar.inc(1);
        match result {
            Ok(summary) => {
                parsed += 1;
                call_sites.push((
                    path.to_string_lossy().to_string(),
                    summary.result.call_sites,
                ));
            }
            Err(e) => {
                failed += 1;
                warn!(file = %path.display(), error = %e, "Parse failed");
            }
        }
    }
    bar.finish_and_clear();
    ctx.orchestrator.drain_deep_passes().await;
    println!("Parsed {} files ({} failed)", parsed, failed);

    // Phase 2: resolve call sites against the complete table.
    println!("\nPhase 2: resolving call targets...");
    let total_sites: usize = call_sites.iter().map(|(_, s)| s.len()).sum();
    let bar = progress_bar(call_sites.len() as u64);
    let mut resolved = 0usize;
    for (path, sites) in &call_sites {
        let batch = ctx.orchestrator.resolve_and_publish(path, sites)?;
        resolved += batch.relationships.len();
        bar.inc(1);
    }
    bar.finish_and_clear();

    let pattern_hits: usize = ctx
        .sink
        .batches()
        .iter()
        .map(|b| b.patterns.len())
        .sum();

    println!("\nIndexing complete!");
    println!("Symbols: {}", ctx.orchestrator.table().symbol_count());
    println!("Call sites: {} ({} resolved)", total_sites, resolved);
    println!(
        "Relationships: {}",
        ctx.orchestrator.table().relationship_count()
    );
    println!("Pattern detections: {}", pattern_hits);

    Ok(())
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
