//! Video container backends used by the clip recorder.
//!
//! A [`ClipSink`] creates one [`ClipWriter`] per clip file. [`OpencvSink`]
//! (the `opencv` feature, on by default) writes mp4v encoded `.mp4` files
//! through `cv::VideoWriter`. [`Y4mSink`] writes uncompressed YUV4MPEG2
//! streams and is what builds without native libraries fall back to.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Axis;

use crate::frame::Image;

/// Error reported by a sink or writer; the recorder maps it onto
/// `ResourceExhausted` or `WriteError` depending on where it happened.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

pub trait ClipWriter: Send {
    fn write(&mut self, image: &Image) -> Result<(), SinkError>;

    /// Flushes and releases the underlying resource. Called once.
    fn finish(&mut self) -> Result<(), SinkError>;
}

pub trait ClipSink: Send + Sync {
    /// File extension (without the dot) of the clips this sink produces.
    fn extension(&self) -> &str;

    fn create(
        &self,
        path: &Path,
        dims: (u32, u32),
        fps: f64,
    ) -> Result<Box<dyn ClipWriter>, SinkError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Y4mSink;

impl ClipSink for Y4mSink {
    fn extension(&self) -> &str {
        "y4m"
    }

    fn create(
        &self,
        path: &Path,
        dims: (u32, u32),
        fps: f64,
    ) -> Result<Box<dyn ClipWriter>, SinkError> {
        let file = File::create(path)?;

        Ok(Box::new(Y4mWriter::new(BufWriter::new(file), dims, fps)?))
    }
}

pub struct Y4mWriter<W: Write + Send> {
    out: Option<W>,
    dims: (u32, u32),
    planes: Vec<u8>,
}

impl<W: Write + Send> Y4mWriter<W> {
    pub fn new(mut out: W, dims: (u32, u32), fps: f64) -> Result<Self, SinkError> {
        let (w, h) = dims;
        if w == 0 || h == 0 {
            return Err(format!("invalid frame size {}x{}", w, h).into());
        }

        let (num, den) = fps_ratio(fps);
        writeln!(out, "YUV4MPEG2 W{} H{} F{}:{} Ip A1:1 C444", w, h, num, den)?;

        Ok(Self {
            out: Some(out),
            dims,
            planes: vec![0; (w * h * 3) as usize],
        })
    }

    /// Converts BGR pixels into planar full-range BT.601 YCbCr.
    fn fill_planes(&mut self, image: &Image) {
        let (w, h) = self.dims;
        let n = (w * h) as usize;
        let (ys, rest) = self.planes.split_at_mut(n);
        let (us, vs) = rest.split_at_mut(n);

        for (i, px) in image.lanes(Axis(2)).into_iter().enumerate() {
            let b = px[0] as f32;
            let g = px[1] as f32;
            let r = px[2] as f32;

            ys[i] = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
            us[i] = (128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b)
                .round()
                .clamp(0.0, 255.0) as u8;
            vs[i] = (128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
    }

    /// Returns the underlying writer, if the stream was not finished yet.
    pub fn into_inner(mut self) -> Option<W> {
        self.out.take()
    }
}

impl<W: Write + Send> ClipWriter for Y4mWriter<W> {
    fn write(&mut self, image: &Image) -> Result<(), SinkError> {
        let (w, h) = self.dims;
        let (rows, cols, channels) = image.dim();
        if (cols as u32, rows as u32, channels) != (w, h, 3) {
            return Err(format!(
                "frame {}x{}x{} does not match clip {}x{}x3",
                cols, rows, channels, w, h
            )
            .into());
        }

        self.fill_planes(image);

        let out = self.out.as_mut().ok_or("clip already finished")?;
        out.write_all(b"FRAME\n")?;
        out.write_all(&self.planes)?;

        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }

        Ok(())
    }
}

fn fps_ratio(fps: f64) -> (u32, u32) {
    if !fps.is_finite() || fps <= 0.0 {
        return (30, 1);
    }

    if (fps - fps.round()).abs() < 1e-6 {
        (fps.round() as u32, 1)
    } else {
        ((fps * 1000.0).round() as u32, 1000)
    }
}

#[cfg(feature = "opencv")]
pub use self::cv::OpencvSink;

#[cfg(feature = "opencv")]
mod cv {
    use std::path::Path;

    use opencv::{
        core::{self, Mat},
        prelude::*,
        videoio,
    };

    use super::{ClipSink, ClipWriter, SinkError};
    use crate::frame::Image;

    /// mp4v encoded `.mp4` clips written through OpenCV.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct OpencvSink;

    impl ClipSink for OpencvSink {
        fn extension(&self) -> &str {
            "mp4"
        }

        fn create(
            &self,
            path: &Path,
            dims: (u32, u32),
            fps: f64,
        ) -> Result<Box<dyn ClipWriter>, SinkError> {
            let path = path.to_str().ok_or("clip path is not valid utf-8")?;
            let fourcc = videoio::VideoWriter::fourcc(b'm' as _, b'p' as _, b'4' as _, b'v' as _)?;
            let writer = videoio::VideoWriter::new(
                path,
                fourcc,
                fps,
                core::Size::new(dims.0 as i32, dims.1 as i32),
                true,
            )?;

            if !writer.is_opened()? {
                return Err(format!("VideoWriter refused to open {}", path).into());
            }

            Ok(Box::new(OpencvWriter {
                writer: Some(writer),
                dims,
            }))
        }
    }

    struct OpencvWriter {
        writer: Option<videoio::VideoWriter>,
        dims: (u32, u32),
    }

    impl ClipWriter for OpencvWriter {
        fn write(&mut self, image: &Image) -> Result<(), SinkError> {
            let (rows, cols, _) = image.dim();
            let (w, h) = self.dims;
            if (cols as u32, rows as u32) != (w, h) {
                return Err(format!("frame {}x{} does not match clip {}x{}", cols, rows, w, h).into());
            }

            let mut mat = Mat::new_rows_cols_with_default(
                rows as i32,
                cols as i32,
                core::CV_8UC3,
                core::Scalar::all(0.0),
            )?;

            let bytes = image.as_slice().ok_or("frame is not contiguous")?;
            mat.data_bytes_mut()?.copy_from_slice(bytes);

            let writer = self.writer.as_mut().ok_or("clip already finished")?;
            writer.write(&mat)?;

            Ok(())
        }

        fn finish(&mut self) -> Result<(), SinkError> {
            if let Some(mut w) = self.writer.take() {
                w.release()?;
            }

            Ok(())
        }
    }

}
