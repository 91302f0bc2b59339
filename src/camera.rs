use anyhow::Result;
use image::DynamicImage;

/// Producer of raw frames. `Ok(None)` is a transient miss; the caller is
/// expected to call `reinit` and keep polling.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<Option<DynamicImage>>;
    fn reinit(&mut self) -> Result<()>;
}

#[cfg(feature = "camera")]
pub use opencv_camera::OpenCvCamera;

#[cfg(feature = "camera")]
mod opencv_camera {
    use super::FrameSource;
    use anyhow::{bail, Context, Result};
    use image::{DynamicImage, RgbImage};
    use log::info;
    use opencv::core::Mat;
    use opencv::imgproc;
    use opencv::prelude::*;
    use opencv::videoio::{self, VideoCapture};
    use std::time::Duration;

    // The sensor needs a moment to settle before the first read returns a
    // usable exposure.
    const WARMUP: Duration = Duration::from_secs(5);

    pub struct OpenCvCamera {
        index: i32,
        capture: VideoCapture,
    }

    impl OpenCvCamera {
        pub fn open(index: i32) -> Result<Self> {
            let capture = VideoCapture::new(index, videoio::CAP_ANY)
                .with_context(|| format!("Failed to open camera {index}"))?;
            if !capture.is_opened()? {
                bail!("camera {index} is not available");
            }
            info!("camera {index} opened, warming up");
            std::thread::sleep(WARMUP);
            Ok(Self { index, capture })
        }
    }

    impl FrameSource for OpenCvCamera {
        fn grab(&mut self) -> Result<Option<DynamicImage>> {
            let mut raw = Mat::default();
            if !self.capture.read(&mut raw)? || raw.empty() {
                return Ok(None);
            }
            mat_to_image(&raw).map(Some)
        }

        fn reinit(&mut self) -> Result<()> {
            self.capture.release()?;
            self.capture = VideoCapture::new(self.index, videoio::CAP_ANY)
                .with_context(|| format!("Failed to reopen camera {}", self.index))?;
            Ok(())
        }
    }

    fn mat_to_image(raw: &Mat) -> Result<DynamicImage> {
        let mut rgb = Mat::default();
        imgproc::cvt_color(raw, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb.data_bytes()?.to_vec();
        let buffer = RgbImage::from_raw(width, height, data)
            .context("camera frame has an unexpected pixel layout")?;
        Ok(DynamicImage::ImageRgb8(buffer))
    }
}
