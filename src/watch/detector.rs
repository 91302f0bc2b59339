use image::DynamicImage;

use super::phash::{frame_hash, hash_distance, FrameHash};

/// Per-frame change verdict. Implementations own whatever baseline they
/// compare against.
pub trait ChangeDetector: Send {
    fn observe(&mut self, frame: &DynamicImage) -> bool;
}

/// Compares each frame's perceptual hash against the immediately previous
/// frame's. The baseline advances on every observed frame, whether or not it
/// counted as a change; the very first frame always does.
pub struct PhashDetector {
    threshold: u32,
    previous: Option<FrameHash>,
}

impl PhashDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            previous: None,
        }
    }

    // Strictly greater: borderline distances count as noise.
    fn is_change(&self, distance: u32) -> bool {
        distance > self.threshold
    }
}

impl ChangeDetector for PhashDetector {
    fn observe(&mut self, frame: &DynamicImage) -> bool {
        let hash = frame_hash(frame);
        let changed = match &self.previous {
            None => true,
            Some(previous) => self.is_change(hash_distance(previous, &hash)),
        };
        self.previous = Some(hash);
        changed
    }
}
