use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use crossbeam::channel::{self, Sender, TrySendError};
use parking_lot::Mutex;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::frame::Image;
use crate::sink::{ClipSink, ClipWriter};
use crate::TrackId;

static SEQ_HANDLE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipHandle(pub(crate) u64);

/// How frames reach the video writer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum WriteMode {
    /// Encode on the caller's thread.
    Inline,
    /// One writer thread per clip fed through a bounded queue of `depth`
    /// frames. A full queue drops the frame; closing waits for at most
    /// `depth` pending frames to be encoded.
    Queued { depth: usize },
}

impl Default for WriteMode {
    fn default() -> Self {
        WriteMode::Queued { depth: 64 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Written,
    Dropped,
}

enum Backend {
    Inline(Box<dyn ClipWriter>),
    Queued {
        tx: Sender<Image>,
        worker: JoinHandle<()>,
        failure: Arc<Mutex<Option<String>>>,
    },
}

pub struct ActiveClip {
    pub track_id: TrackId,
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    pub frames: u64,
    backend: Backend,
}

impl ActiveClip {
    fn finish(self) -> std::result::Result<(), String> {
        match self.backend {
            Backend::Inline(mut writer) => writer.finish().map_err(|e| e.to_string()),
            Backend::Queued {
                tx,
                worker,
                failure,
            } => {
                drop(tx);

                if worker.join().is_err() {
                    return Err("writer thread panicked".to_string());
                }

                let failure = failure.lock().take();
                match failure {
                    Some(reason) => Err(reason),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Owns every open clip writer. One clip per track is expected from the
/// caller; a second `open` for the same track is reported as an
/// invariant violation after the stale clip is closed.
pub struct ClipRecorder {
    output_dir: PathBuf,
    sink: Box<dyn ClipSink>,
    mode: WriteMode,
    clips: HashMap<ClipHandle, ActiveClip>,
    by_track: HashMap<TrackId, ClipHandle>,
}

impl ClipRecorder {
    pub fn new<P: Into<PathBuf>>(output_dir: P, sink: Box<dyn ClipSink>, mode: WriteMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            sink,
            mode,
            clips: HashMap::new(),
            by_track: HashMap::new(),
        }
    }

    #[inline]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn open(&mut self, track_id: TrackId, dims: (u32, u32), fps: f64) -> Result<ClipHandle> {
        if let Some(stale) = self.by_track.get(&track_id).copied() {
            error!(%track_id, "second clip requested while one is open, closing the stale one");
            // the stale writer is released either way
            let _ = self.close(stale);

            return Err(Error::InvariantViolation(format!(
                "clip already open for track {}",
                track_id
            )));
        }

        let created_at = Local::now();
        let path = self.clip_path(track_id, &created_at);

        let exhausted = |reason: String| Error::ResourceExhausted {
            track_id,
            path: path.clone(),
            reason,
        };

        fs::create_dir_all(&self.output_dir).map_err(|e| exhausted(e.to_string()))?;

        let writer = self
            .sink
            .create(&path, dims, fps)
            .map_err(|e| exhausted(e.to_string()))?;

        let backend = match self.mode {
            WriteMode::Inline => Backend::Inline(writer),
            WriteMode::Queued { depth } => {
                spawn_writer(track_id, writer, depth).map_err(|e| exhausted(e.to_string()))?
            }
        };

        let handle = ClipHandle(SEQ_HANDLE.fetch_add(1, Ordering::SeqCst));
        info!(%track_id, path = %path.display(), "clip opened");

        self.clips.insert(
            handle,
            ActiveClip {
                track_id,
                path,
                created_at,
                frames: 0,
                backend,
            },
        );
        self.by_track.insert(track_id, handle);

        Ok(handle)
    }

    /// Writes one frame into the clip. Unknown or closed handles are ignored.
    pub fn write(&mut self, handle: ClipHandle, image: &Image) -> Result<WriteStatus> {
        let clip = match self.clips.get_mut(&handle) {
            Some(clip) => clip,
            None => return Ok(WriteStatus::Dropped),
        };

        let track_id = clip.track_id;
        let status = match &mut clip.backend {
            Backend::Inline(writer) => {
                writer.write(image).map_err(|e| Error::WriteError {
                    track_id,
                    reason: e.to_string(),
                })?;

                WriteStatus::Written
            }
            Backend::Queued { tx, failure, .. } => {
                if let Some(reason) = failure.lock().clone() {
                    return Err(Error::WriteError { track_id, reason });
                }

                match tx.try_send(image.clone()) {
                    Ok(()) => WriteStatus::Written,
                    Err(TrySendError::Full(_)) => {
                        debug!(%track_id, "clip queue full, frame dropped");
                        WriteStatus::Dropped
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        let reason = failure
                            .lock()
                            .clone()
                            .unwrap_or_else(|| "writer thread exited".to_string());

                        return Err(Error::WriteError { track_id, reason });
                    }
                }
            }
        };

        if status == WriteStatus::Written {
            clip.frames += 1;
        }

        Ok(status)
    }

    /// Finalizes and releases the clip. Closing an unknown or already closed
    /// handle is a no-op and yields `Ok(None)`.
    pub fn close(&mut self, handle: ClipHandle) -> Result<Option<PathBuf>> {
        let clip = match self.clips.remove(&handle) {
            Some(clip) => clip,
            None => return Ok(None),
        };

        if self.by_track.get(&clip.track_id) == Some(&handle) {
            self.by_track.remove(&clip.track_id);
        }

        let track_id = clip.track_id;
        let path = clip.path.clone();
        let frames = clip.frames;

        clip.finish().map_err(|reason| Error::WriteError { track_id, reason })?;
        info!(%track_id, frames, path = %path.display(), "clip closed");

        Ok(Some(path))
    }

    pub fn close_all(&mut self) {
        let handles: Vec<ClipHandle> = self.clips.keys().copied().collect();

        for handle in handles {
            if let Err(err) = self.close(handle) {
                warn!("clip finalization failed: {}", err);
            }
        }
    }

    #[inline]
    pub fn handle_for(&self, track_id: TrackId) -> Option<ClipHandle> {
        self.by_track.get(&track_id).copied()
    }

    #[inline]
    pub fn clip(&self, handle: ClipHandle) -> Option<&ActiveClip> {
        self.clips.get(&handle)
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.clips.len()
    }

    /// File names of the clips persisted in the output directory, sorted.
    pub fn clip_files(&self) -> Result<Vec<String>> {
        if !self.output_dir.exists() {
            return Ok(Vec::new());
        }

        let ext = self.sink.extension();
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }

            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }

        names.sort();

        Ok(names)
    }

    fn clip_path(&self, track_id: TrackId, created_at: &DateTime<Local>) -> PathBuf {
        let stem = format!(
            "suspicious_{}_{}",
            track_id,
            created_at.format("%Y%m%d_%H%M%S_%3f")
        );
        let ext = self.sink.extension();

        let mut path = self.output_dir.join(format!("{}.{}", stem, ext));
        let mut n = 1;
        while path.exists() {
            path = self.output_dir.join(format!("{}_{}.{}", stem, n, ext));
            n += 1;
        }

        path
    }
}

impl Drop for ClipRecorder {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn spawn_writer(
    track_id: TrackId,
    mut writer: Box<dyn ClipWriter>,
    depth: usize,
) -> std::io::Result<Backend> {
    let (tx, rx) = channel::bounded::<Image>(depth.max(1));
    let failure = Arc::new(Mutex::new(None));
    let slot = failure.clone();

    let worker = thread::Builder::new()
        .name(format!("clip-{}", track_id))
        .spawn(move || {
            for image in rx {
                if let Err(e) = writer.write(&image) {
                    *slot.lock() = Some(e.to_string());
                    break;
                }
            }

            if let Err(e) = writer.finish() {
                slot.lock().get_or_insert(e.to_string());
            }
        })?;

    Ok(Backend::Queued {
        tx,
        worker,
        failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::mock::MockSink;
    use ndarray::Array3;

    fn recorder(dir: &Path, mode: WriteMode, sink: &MockSink) -> ClipRecorder {
        ClipRecorder::new(dir, Box::new(sink.clone()), mode)
    }

    fn image() -> Image {
        Array3::zeros((4, 4, 3))
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::default();
        let mut rec = recorder(dir.path(), WriteMode::Inline, &sink);

        let h = rec.open(TrackId(1), (4, 4), 30.0).unwrap();
        rec.write(h, &image()).unwrap();

        assert!(rec.close(h).unwrap().is_some());
        assert!(rec.close(h).unwrap().is_none());
        assert_eq!(sink.calls().finished, 1);
        assert_eq!(rec.active_count(), 0);
    }

    #[test]
    fn clip_name_carries_track_and_time() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::default();
        let mut rec = recorder(dir.path(), WriteMode::Inline, &sink);

        let h = rec.open(TrackId(12), (4, 4), 30.0).unwrap();
        let path = rec.close(h).unwrap().unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();

        assert!(name.starts_with("suspicious_12_"));
        assert!(name.ends_with(".mock"));
        assert_eq!(rec.clip_files().unwrap(), vec![name]);
    }

    #[test]
    fn second_open_for_track_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::default();
        let mut rec = recorder(dir.path(), WriteMode::Inline, &sink);

        rec.open(TrackId(1), (4, 4), 30.0).unwrap();
        let err = rec.open(TrackId(1), (4, 4), 30.0).unwrap_err();

        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(rec.active_count(), 0);
        assert_eq!(sink.calls().finished, 1);
    }

    #[test]
    fn failed_create_is_resource_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::failing_create();
        let mut rec = recorder(dir.path(), WriteMode::Inline, &sink);

        let err = rec.open(TrackId(3), (4, 4), 30.0).unwrap_err();

        assert!(matches!(err, Error::ResourceExhausted { track_id: TrackId(3), .. }));
        assert!(rec.handle_for(TrackId(3)).is_none());
    }

    #[test]
    fn inline_write_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::failing_writes(1);
        let mut rec = recorder(dir.path(), WriteMode::Inline, &sink);

        let h = rec.open(TrackId(2), (4, 4), 30.0).unwrap();
        assert_eq!(rec.write(h, &image()).unwrap(), WriteStatus::Written);

        let err = rec.write(h, &image()).unwrap_err();
        assert!(matches!(err, Error::WriteError { .. }));
    }

    #[test]
    fn queued_frames_are_flushed_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::default();
        let mut rec = recorder(dir.path(), WriteMode::Queued { depth: 16 }, &sink);

        let h = rec.open(TrackId(5), (4, 4), 30.0).unwrap();
        for _ in 0..10 {
            assert_eq!(rec.write(h, &image()).unwrap(), WriteStatus::Written);
        }

        rec.close(h).unwrap();

        let calls = sink.calls();
        assert_eq!(calls.frames, 10);
        assert_eq!(calls.finished, 1);
    }

    #[test]
    fn queued_write_error_reported_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::failing_writes(0);
        let mut rec = recorder(dir.path(), WriteMode::Queued { depth: 4 }, &sink);

        let h = rec.open(TrackId(6), (4, 4), 30.0).unwrap();
        let _ = rec.write(h, &image());

        let err = rec.close(h).unwrap_err();
        assert!(matches!(err, Error::WriteError { .. }));
        // the writer is still released
        assert_eq!(sink.calls().finished, 1);
        assert_eq!(rec.active_count(), 0);
    }

    #[test]
    fn drop_releases_open_clips() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::default();
        let mut rec = recorder(dir.path(), WriteMode::Queued { depth: 4 }, &sink);

        rec.open(TrackId(1), (4, 4), 30.0).unwrap();
        rec.open(TrackId(2), (4, 4), 30.0).unwrap();
        drop(rec);

        assert_eq!(sink.calls().finished, 2);
    }

    #[test]
    fn missing_output_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MockSink::default();
        let rec = recorder(&dir.path().join("nope"), WriteMode::Inline, &sink);

        assert!(rec.clip_files().unwrap().is_empty());
    }
}
