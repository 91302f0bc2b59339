use anyhow::Result;
use image::{imageops, RgbImage};
use log::{debug, info};
use std::path::PathBuf;

use crate::store::{FrameKey, FrameStore};

/// Assemble a settled episode's frames into one vertically stacked composite
/// and persist it. Returns `None` when the episode is not worth reporting: a
/// single captured frame is noise by policy, and the tail-cut may remove
/// everything that was left.
pub fn assemble(
    store: &mut dyn FrameStore,
    mut frames: Vec<FrameKey>,
    tailcut_ticks: u32,
    frame_width: u32,
    frame_height: u32,
    stamp: &str,
) -> Result<Option<PathBuf>> {
    if frames.len() <= 1 {
        debug!("episode settled with {} frame(s), not reporting", frames.len());
        return Ok(None);
    }

    if tailcut_ticks > 0 {
        // The trailing frames were captured while motion was settling and
        // rarely show anything.
        let keep = frames.len().saturating_sub(tailcut_ticks as usize);
        frames.truncate(keep);
    }

    if frames.is_empty() {
        info!("tail-cut removed every captured frame, nothing to report");
        return Ok(None);
    }

    let mut canvas = RgbImage::new(frame_width, frame_height * frames.len() as u32);
    for (i, key) in frames.iter().enumerate() {
        let frame = store.load_frame(key)?;
        imageops::replace(
            &mut canvas,
            &frame.to_rgb8(),
            0,
            (frame_height as usize * i) as i64,
        );
        // `frame` drops here; only the canvas stays resident across frames
    }

    let path = store.store_composite(&canvas, stamp)?;
    info!("composed {} frames into {}", frames.len(), path.display());
    Ok(Some(path))
}
