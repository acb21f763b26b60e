// One-off call-target resolution against a freshly built table.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::graph::CallSite;
use crate::reindex::supported_files;
use crate::resolve::ResolutionPipeline;

use super::ProjectContext;

/// Parse the project, then resolve a single `from -> to` call site and
/// report which strategy matched.
pub async fn resolve_target(project: String, from: String, to: String) -> Result<()> {
    let ctx = ProjectContext::open(&project, false)?;

    let files = supported_files(&ctx.project_root);
    let semaphore = Arc::new(Semaphore::new(ctx.config.reindex.workers));
    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let orchestrator = Arc::clone(&ctx.orchestrator);
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            if let Err(e) = orchestrator.parse_path(&path) {
                warn!(file = %path.display(), error = %e, "Parse failed");
            }
        }));
    }
    for handle in handles {
        handle.await?;
    }
    ctx.orchestrator.drain_deep_passes().await;

    let pipeline = ResolutionPipeline::with_builtins();
    let site = CallSite::call(&from, &to, 0);
    match pipeline.resolve(&site, ctx.orchestrator.table()) {
        Some(resolution) => {
            println!("Resolved '{}' -> '{}'", from, to);
            println!("  strategy:   {}", resolution.strategy);
            println!("  confidence: {:.2}", resolution.confidence);
            println!("  reason:     {}", resolution.reason);
            match ctx.orchestrator.table().get(&resolution.symbol_id) {
                Some(symbol) => println!(
                    "  target:     {} ({}:{})",
                    symbol.qualified_name, symbol.file_path, symbol.line
                ),
                None => println!("  target:     {}", resolution.symbol_id),
            }
        }
        None => {
            println!("No resolution for '{}' -> '{}'", from, to);
        }
    }
    Ok(())
}
