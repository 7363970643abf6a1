use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use stitch_core::{MachineView, Phase};
use stitch_engine::{
    Clock, Collaborators, CommandMenu, DirectorySaveTarget, EventSink, FileStore, LightMinifier,
    MemoryStore, MenuRegistry, ReplayScript, ReqwestAssetFetcher, ScrapeSession, ScriptedHost,
};
use stitch_logging::{stitch_debug, stitch_info};

use crate::config::AppConfig;

pub fn load_script(path: &Path) -> Result<ReplayScript> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read replay script {}", path.display()))?;
    let script: ReplayScript = ron::from_str(&text)
        .with_context(|| format!("invalid replay script {}", path.display()))?;
    if script.pages.is_empty() {
        bail!("replay script {} has no pages", path.display());
    }
    Ok(script)
}

fn utc_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().to_rfc3339())
}

/// Play a recorded book through a full scrape session and save the result.
///
/// A stalled replay is stopped and saved with whatever was collected. The
/// returned view is the machine as the page loop left it.
pub async fn run_replay(
    config: &AppConfig,
    script: ReplayScript,
    events: Arc<dyn EventSink>,
) -> Result<MachineView> {
    let host = ScriptedHost::new(script, config.site.selectors.clone());
    let menu = Arc::new(MenuRegistry::new());
    let durable = FileStore::open(config.preferences_path())
        .context("cannot open the preferences store")?;

    let collab = Collaborators {
        host: Arc::new(host.clone()),
        interceptor: Arc::new(host.clone()),
        dom: Arc::new(host),
        fetcher: Arc::new(ReqwestAssetFetcher::new(config.fetch.to_settings())),
        saver: Arc::new(DirectorySaveTarget::new(config.output_dir.clone())),
        minifier: Arc::new(LightMinifier),
        session_store: Arc::new(MemoryStore::new()),
        durable_store: Arc::new(durable),
        events,
        menu: Some(menu.clone() as Arc<dyn CommandMenu>),
        clock: utc_clock(),
    };
    let (mut session, handle) = ScrapeSession::new(config.site.clone(), collab)?;
    for (id, label) in menu.entries() {
        stitch_debug!("menu {:?}: {}", id, label);
    }

    handle.start();
    session.run_until(|s| s.controller().is_scraping()).await;
    session
        .run_until(|s| !s.controller().is_scraping() || s.view().phase == Phase::Stalled)
        .await;

    let view = session.view();
    if view.phase == Phase::Stalled {
        stitch_info!("replay stalled, saving what was collected");
        handle.stop_and_save();
        session.run_until(|s| !s.controller().is_scraping()).await;
    }

    handle.shutdown();
    session.run().await;
    Ok(view)
}
