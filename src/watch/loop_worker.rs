use anyhow::Result;
use chrono::Local;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::camera::FrameSource;
use crate::config::WatchConfig;
use crate::notify::Dispatcher;
use crate::store::{FrameKey, FrameStore};

use super::detector::ChangeDetector;
use super::episode::{EpisodeTracker, QuietOutcome};
use super::evidence;

/// What one poll cycle did. The loop only logs these; tests assert on them.
#[derive(Debug)]
pub enum CycleReport {
    /// No frame this cycle; the source was reinitialized.
    SourceMiss,
    /// Quiet frame, no episode in flight.
    Quiet,
    /// Quiet frame while an episode is open.
    Holding { remaining: u32 },
    /// Changed frame saved and the countdown re-armed.
    Recorded,
    /// Episode settled but was below the reporting bar.
    Discarded,
    /// Episode settled and the composite went out to the sinks.
    Dispatched {
        artifact: PathBuf,
        email_ok: bool,
        chat_ok: bool,
    },
}

/// All loop state in one place: the frame source, the detection baseline,
/// the open episode, and the delivery fan-out. Exactly one writer.
pub struct Watcher {
    config: WatchConfig,
    source: Box<dyn FrameSource>,
    detector: Box<dyn ChangeDetector>,
    store: Box<dyn FrameStore>,
    tracker: EpisodeTracker,
    dispatcher: Dispatcher,
}

impl Watcher {
    pub fn new(
        config: WatchConfig,
        source: Box<dyn FrameSource>,
        detector: Box<dyn ChangeDetector>,
        store: Box<dyn FrameStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        let tracker = EpisodeTracker::new(config.retention_ticks);
        Self {
            config,
            source,
            detector,
            store,
            tracker,
            dispatcher,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.config.interval_secs)
    }

    /// One poll → decide → (maybe) aggregate → (maybe) dispatch pass.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let frame = match self.source.grab() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!("no frame this cycle, reinitializing the source");
                return self.recover_source();
            }
            Err(err) => {
                warn!("frame read failed ({err:#}), reinitializing the source");
                return self.recover_source();
            }
        };

        let stamp = timestamp_key();

        if self.detector.observe(&frame) {
            let key = self.store.store_frame(&frame, &stamp)?;
            info!("Detect something change!!....{stamp}");
            self.tracker.record_change(key);
            return Ok(CycleReport::Recorded);
        }

        match self.tracker.record_quiet() {
            QuietOutcome::Idle => Ok(CycleReport::Quiet),
            QuietOutcome::Held { remaining } => {
                info!("counter: {remaining}");
                Ok(CycleReport::Holding { remaining })
            }
            QuietOutcome::Settled { frames } => self.finalize(frames, &stamp),
        }
    }

    fn recover_source(&mut self) -> Result<CycleReport> {
        if let Err(err) = self.source.reinit() {
            warn!("source reinit failed, will retry next cycle: {err:#}");
        }
        Ok(CycleReport::SourceMiss)
    }

    fn finalize(&mut self, frames: Vec<FrameKey>, stamp: &str) -> Result<CycleReport> {
        let artifact = evidence::assemble(
            self.store.as_mut(),
            frames,
            self.config.tailcut_ticks,
            self.config.frame_width,
            self.config.frame_height,
            stamp,
        )?;

        let Some(artifact) = artifact else {
            return Ok(CycleReport::Discarded);
        };

        let outcome = self.dispatcher.dispatch(&artifact, stamp);
        info!("send message");
        Ok(CycleReport::Dispatched {
            artifact,
            email_ok: outcome.email.is_ok(),
            chat_ok: outcome.chat.is_ok(),
        })
    }
}

fn timestamp_key() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Polls at the configured interval until cancelled. Each cycle runs on the
/// blocking pool (camera reads, JPEG encodes and SMTP are all synchronous);
/// cancellation is only observed between cycles, so a dispatch in progress
/// always runs to completion.
pub async fn watch_loop(mut watcher: Watcher, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(watcher.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let joined = tokio::task::spawn_blocking(move || {
                    let report = watcher.run_cycle();
                    (watcher, report)
                })
                .await;

                match joined {
                    Ok((returned, report)) => {
                        watcher = returned;
                        match report {
                            Ok(report) => debug!("cycle: {report:?}"),
                            // A bad cycle never kills the loop.
                            Err(err) => error!("cycle failed: {err:#}"),
                        }
                    }
                    Err(join_err) => {
                        error!("cycle worker panicked, stopping: {join_err}");
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("watch loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmailSettings, SlackSettings};
    use crate::notify::{ChatSink, EmailSink, Notification, NotifyError};
    use crate::store::MemoryFrameStore;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const W: u32 = 8;
    const H: u32 = 6;

    fn test_config(retention_ticks: u32, tailcut_ticks: u32) -> WatchConfig {
        WatchConfig {
            interval_secs: 0.01,
            hash_threshold: 5,
            retention_ticks,
            tailcut_ticks,
            camera_index: 0,
            frame_width: W,
            frame_height: H,
            output_dir: PathBuf::from("."),
            email: EmailSettings {
                from_addr: "sender@example.com".to_string(),
                to_addr: "recipient@example.com".to_string(),
                smtp_host: "smtp.example.com".to_string(),
                smtp_port: 587,
                smtp_user: "sender@example.com".to_string(),
                smtp_pass: "hunter2".to_string(),
            },
            slack: SlackSettings {
                token: "xoxb-test".to_string(),
                channel: "home".to_string(),
            },
        }
    }

    /// Yields frames from a script; `None` entries simulate read failures.
    struct ScriptedSource {
        frames: VecDeque<Option<DynamicImage>>,
    }

    impl FrameSource for ScriptedSource {
        fn grab(&mut self) -> Result<Option<DynamicImage>> {
            Ok(self.frames.pop_front().flatten())
        }

        fn reinit(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Replays a scripted distance sequence through the real threshold rule:
    /// first observation always triggers, after that `distance > threshold`.
    struct ScriptedDetector {
        distances: VecDeque<u32>,
        threshold: u32,
        primed: bool,
    }

    impl ChangeDetector for ScriptedDetector {
        fn observe(&mut self, _frame: &DynamicImage) -> bool {
            let distance = self.distances.pop_front().unwrap_or(0);
            if !self.primed {
                self.primed = true;
                return true;
            }
            distance > self.threshold
        }
    }

    /// Hands the watcher a store the test keeps a view into.
    #[derive(Clone)]
    struct SharedStore(Arc<Mutex<MemoryFrameStore>>);

    impl FrameStore for SharedStore {
        fn store_frame(&mut self, frame: &DynamicImage, stamp: &str) -> Result<FrameKey> {
            self.0.lock().unwrap().store_frame(frame, stamp)
        }

        fn load_frame(&self, key: &FrameKey) -> Result<DynamicImage> {
            self.0.lock().unwrap().load_frame(key)
        }

        fn store_composite(&mut self, canvas: &RgbImage, stamp: &str) -> Result<PathBuf> {
            self.0.lock().unwrap().store_composite(canvas, stamp)
        }
    }

    #[derive(Clone)]
    struct RecordingEmail {
        sent: Arc<Mutex<Vec<Notification>>>,
    }

    impl EmailSink for RecordingEmail {
        fn send(&self, note: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(note.clone());
            Ok(())
        }
    }

    #[derive(Clone)]
    struct RecordingChat {
        posts: Arc<Mutex<Vec<String>>>,
    }

    impl ChatSink for RecordingChat {
        fn post(&self, text: &str) -> Result<(), NotifyError> {
            self.posts.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct Harness {
        watcher: Watcher,
        store: Arc<Mutex<MemoryFrameStore>>,
        emails: Arc<Mutex<Vec<Notification>>>,
        posts: Arc<Mutex<Vec<String>>>,
    }

    fn harness(
        retention_ticks: u32,
        tailcut_ticks: u32,
        distances: Vec<u32>,
        frames: Vec<Option<DynamicImage>>,
    ) -> Harness {
        let config = test_config(retention_ticks, tailcut_ticks);
        let store = Arc::new(Mutex::new(MemoryFrameStore::new()));
        let emails = Arc::new(Mutex::new(Vec::new()));
        let posts = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::new(
            Box::new(RecordingEmail {
                sent: Arc::clone(&emails),
            }),
            Box::new(RecordingChat {
                posts: Arc::clone(&posts),
            }),
        );
        let threshold = config.hash_threshold;
        let watcher = Watcher::new(
            config,
            Box::new(ScriptedSource {
                frames: frames.into(),
            }),
            Box::new(ScriptedDetector {
                distances: distances.into(),
                threshold,
                primed: false,
            }),
            Box::new(SharedStore(Arc::clone(&store))),
            dispatcher,
        );
        Harness {
            watcher,
            store,
            emails,
            posts,
        }
    }

    fn solid(value: u8) -> Option<DynamicImage> {
        Some(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            W,
            H,
            Rgb([value, value, value]),
        )))
    }

    #[test]
    fn single_trigger_episode_is_below_the_reporting_bar() {
        // threshold 5, retention 2, distances [10, 1, 1]: the episode opens
        // at frame 1, ticks 2 -> 1 -> 0 over frames 2 and 3, and settles with
        // only one saved frame, so nothing goes out.
        let mut h = harness(2, 0, vec![10, 1, 1], vec![solid(10), solid(20), solid(30)]);

        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Recorded
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Holding { remaining: 1 }
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Discarded
        ));

        assert!(h.emails.lock().unwrap().is_empty());
        assert!(h.posts.lock().unwrap().is_empty());
        assert!(h.store.lock().unwrap().composites.is_empty());
    }

    #[test]
    fn sustained_change_dispatches_one_composite() {
        // threshold 5, retention 1, tailcut 0, distances [10, 10, 1]: frames
        // 1 and 2 both trigger, frame 3 settles the episode with two saved
        // frames; one notification goes out with a 2H-tall composite.
        let mut h = harness(1, 0, vec![10, 10, 1], vec![solid(10), solid(200), solid(10)]);

        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Recorded
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Recorded
        ));
        match h.watcher.run_cycle().unwrap() {
            CycleReport::Dispatched {
                email_ok, chat_ok, ..
            } => {
                assert!(email_ok);
                assert!(chat_ok);
            }
            other => panic!("expected dispatch, got {other:?}"),
        }

        let store = h.store.lock().unwrap();
        assert_eq!(store.composites.len(), 1);
        assert_eq!(store.composites[0].width(), W);
        assert_eq!(store.composites[0].height(), H * 2);

        let emails = h.emails.lock().unwrap();
        assert_eq!(emails.len(), 1);
        assert!(emails[0]
            .subject
            .starts_with("Detect something change!!...."));
        assert_eq!(h.posts.lock().unwrap().len(), 1);
    }

    #[test]
    fn source_miss_reinitializes_and_keeps_the_episode_open() {
        // A read failure mid-episode must not tick the countdown.
        let mut h = harness(2, 0, vec![10, 1], vec![solid(10), None, solid(20)]);

        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Recorded
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::SourceMiss
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Holding { remaining: 1 }
        ));
    }

    #[test]
    fn retrigger_mid_episode_extends_the_countdown() {
        // retention 2: trigger, quiet, trigger, then two quiets to settle.
        let mut h = harness(
            2,
            0,
            vec![10, 1, 10, 1, 1],
            vec![solid(10), solid(10), solid(200), solid(200), solid(200)],
        );

        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Recorded
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Holding { remaining: 1 }
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Recorded
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Holding { remaining: 1 }
        ));
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Dispatched { .. }
        ));

        // Both triggering frames made it into the one dispatched composite.
        let store = h.store.lock().unwrap();
        assert_eq!(store.composites.len(), 1);
        assert_eq!(store.composites[0].height(), H * 2);
        assert_eq!(h.emails.lock().unwrap().len(), 1);
    }

    #[test]
    fn tailcut_can_suppress_a_whole_episode() {
        // Two captured frames, tailcut 2: everything is trimmed away and the
        // settle produces nothing, without erroring.
        let mut h = harness(1, 2, vec![10, 10, 1], vec![solid(10), solid(200), solid(10)]);

        h.watcher.run_cycle().unwrap();
        h.watcher.run_cycle().unwrap();
        assert!(matches!(
            h.watcher.run_cycle().unwrap(),
            CycleReport::Discarded
        ));
        assert!(h.emails.lock().unwrap().is_empty());
        assert!(h.store.lock().unwrap().composites.is_empty());
    }

    #[test]
    fn quiet_frames_outside_an_episode_do_nothing() {
        let mut h = harness(
            2,
            0,
            vec![10, 1, 1, 1],
            vec![solid(10), solid(10), solid(10), solid(10)],
        );

        // Burn the seeded first-frame trigger and settle the episode.
        h.watcher.run_cycle().unwrap();
        h.watcher.run_cycle().unwrap();
        h.watcher.run_cycle().unwrap();

        assert!(matches!(h.watcher.run_cycle().unwrap(), CycleReport::Quiet));
    }
}
