pub mod detector;
pub mod episode;
pub mod evidence;
pub mod loop_worker;
pub mod phash;

pub use detector::{ChangeDetector, PhashDetector};
pub use episode::EpisodeTracker;
pub use loop_worker::{watch_loop, CycleReport, Watcher};
