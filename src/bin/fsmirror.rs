use anyhow::{Result, anyhow};
use fsmirror::cli::Args;
use fsmirror::config;
use fsmirror::dir_watcher::{self, DirWatcher};
use fsmirror::log::init_tracing;
use fsmirror::models::config::SyncContext;
use fsmirror::uploader::HttpPoster;
use fsmirror::walker;
use std::sync::Arc;
use tracing::info;

fn main() -> Result<()> {
    let args = Args::parse_with_legacy_flags();
    init_tracing();

    let profile = config::load_profile(&args.conf, &args.app)?;
    let ctx = Arc::new(SyncContext::new(profile)?);
    info!("Start watching path {}", ctx.base_path.display());

    let mut watcher = DirWatcher::new()?;
    walker::register_tree(&ctx.base_path, |path| watcher.add(path))?;

    let poster = HttpPoster::new(ctx.profile.receiver.clone());
    info!("Uploading to {}", poster.receiver());
    walker::initial_sync(&ctx, &ctx.base_path, |req| poster.post(req))?;

    let event_loop =
        dir_watcher::spawn_event_loop(watcher, Arc::clone(&ctx), move |req| poster.post(req))?;

    event_loop
        .join()
        .map_err(|_| anyhow!("event loop thread panicked"))
}
