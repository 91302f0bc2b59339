use anyhow::Result;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use lookout::camera::FrameSource;
use lookout::notify::{Dispatcher, SlackNotifier, SmtpMailer};
use lookout::store::DiskFrameStore;
use lookout::watch::{watch_loop, PhashDetector, Watcher};
use lookout::WatchConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("lookout starting up...");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("lookout.json"));
    let config = WatchConfig::load(&config_path)?;
    config.log_endpoints();

    let source = open_camera(&config)?;
    let store = DiskFrameStore::new(config.output_dir.clone())?;
    let detector = PhashDetector::new(config.hash_threshold);
    let dispatcher = Dispatcher::new(
        Box::new(SmtpMailer::new(config.email.clone())),
        Box::new(SlackNotifier::new(config.slack.clone())),
    );

    let watcher = Watcher::new(
        config,
        source,
        Box::new(detector),
        Box::new(store),
        dispatcher,
    );

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("ctrl-c received, stopping after the current cycle");
            signal_token.cancel();
        }
    });

    watch_loop(watcher, cancel_token).await;
    Ok(())
}

#[cfg(feature = "camera")]
fn open_camera(config: &WatchConfig) -> Result<Box<dyn FrameSource>> {
    let camera = lookout::camera::OpenCvCamera::open(config.camera_index)?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_config: &WatchConfig) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("built without camera support; rebuild with `--features camera`")
}
