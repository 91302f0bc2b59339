use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use std::path::PathBuf;

/// Opaque reference to one saved frame. The store that issued the key is the
/// only thing that knows how to resolve it back to pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameKey(String);

impl FrameKey {
    pub fn new(stamp: impl Into<String>) -> Self {
        Self(stamp.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub trait FrameStore: Send {
    fn store_frame(&mut self, frame: &DynamicImage, stamp: &str) -> Result<FrameKey>;
    fn load_frame(&self, key: &FrameKey) -> Result<DynamicImage>;
    fn store_composite(&mut self, canvas: &RgbImage, stamp: &str) -> Result<PathBuf>;
}

/// Writes frames and composites as JPEGs under a single output directory,
/// named by their capture timestamp.
pub struct DiskFrameStore {
    dir: PathBuf,
}

impl DiskFrameStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn frame_path(&self, key: &FrameKey) -> PathBuf {
        self.dir.join(format!("{}-frame.jpg", key.as_str()))
    }
}

impl FrameStore for DiskFrameStore {
    fn store_frame(&mut self, frame: &DynamicImage, stamp: &str) -> Result<FrameKey> {
        let key = FrameKey::new(stamp);
        let path = self.frame_path(&key);
        frame
            .save(&path)
            .with_context(|| format!("Failed to save frame to {}", path.display()))?;
        Ok(key)
    }

    fn load_frame(&self, key: &FrameKey) -> Result<DynamicImage> {
        let path = self.frame_path(key);
        image::open(&path).with_context(|| format!("Failed to reopen frame {}", path.display()))
    }

    fn store_composite(&mut self, canvas: &RgbImage, stamp: &str) -> Result<PathBuf> {
        let path = self.dir.join(format!("{stamp}-episode.jpg"));
        canvas
            .save(&path)
            .with_context(|| format!("Failed to save composite to {}", path.display()))?;
        Ok(path)
    }
}

/// Store backed by a plain map, for exercising the aggregation and loop logic
/// without touching the filesystem.
#[cfg(test)]
pub struct MemoryFrameStore {
    frames: std::collections::HashMap<String, DynamicImage>,
    pub composites: Vec<RgbImage>,
}

#[cfg(test)]
impl MemoryFrameStore {
    pub fn new() -> Self {
        Self {
            frames: std::collections::HashMap::new(),
            composites: Vec::new(),
        }
    }
}

#[cfg(test)]
impl FrameStore for MemoryFrameStore {
    fn store_frame(&mut self, frame: &DynamicImage, stamp: &str) -> Result<FrameKey> {
        let key = format!("{stamp}-{}", self.frames.len());
        self.frames.insert(key.clone(), frame.clone());
        Ok(FrameKey::new(key))
    }

    fn load_frame(&self, key: &FrameKey) -> Result<DynamicImage> {
        self.frames
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no frame stored under {}", key.as_str()))
    }

    fn store_composite(&mut self, canvas: &RgbImage, stamp: &str) -> Result<PathBuf> {
        self.composites.push(canvas.clone());
        Ok(PathBuf::from(format!("{stamp}-episode.jpg")))
    }
}
