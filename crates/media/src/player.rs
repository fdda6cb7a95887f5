//! SmartPlayer (spec §4.4) — a FIFO playback queue with barge-in and
//! EOF chaining. Grounded on the teacher's `transport/src/webrtc.rs`
//! media-state shape (single `parking_lot`-guarded struct, start/stop
//! calls kept synchronous so they're callable from the event-loop
//! thread), generalized here to the spec's queue/interrupt state machine;
//! there is no teacher counterpart for the queue itself since the teacher
//! never played audio back into a call leg.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::MediaError;
use crate::sip::{MediaSink, PlaybackHandle, Recorder};

/// One queued (or currently playing) audio file.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: PathBuf,
    /// Delete the file from disk once playback finishes or is interrupted.
    pub discard: bool,
}

impl AudioFile {
    pub fn new(path: impl Into<PathBuf>, discard: bool) -> Self {
        Self {
            path: path.into(),
            discard,
        }
    }
}

fn unlink_best_effort(file: &AudioFile) {
    if file.discard {
        match std::fs::remove_file(&file.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %file.path.display(), error = %e, "failed to unlink audio file"),
        }
    }
}

struct Current {
    file: AudioFile,
    handle: Box<dyn PlaybackHandle>,
}

struct Inner {
    queue: VecDeque<AudioFile>,
    current: Option<Current>,
    tearing_down: bool,
}

/// FIFO playback queue with a single active player (spec §4.4).
pub struct SmartPlayer {
    sink: Arc<dyn MediaSink>,
    recorder: Option<Arc<dyn Recorder>>,
    on_stop: Option<Arc<dyn Fn() + Send + Sync>>,
    inner: Mutex<Inner>,
}

impl SmartPlayer {
    pub fn new(sink: Arc<dyn MediaSink>, recorder: Option<Arc<dyn Recorder>>) -> Self {
        Self {
            sink,
            recorder,
            on_stop: None,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                current: None,
                tearing_down: false,
            }),
        }
    }

    pub fn with_stop_callback(mut self, on_stop: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.on_stop = Some(on_stop);
        self
    }

    /// Enqueue a file at the tail of the queue.
    pub fn put(&self, file: AudioFile) {
        self.inner.lock().queue.push_back(file);
    }

    /// Start the next queued item if nothing is currently playing.
    pub fn play(&self) -> Result<(), MediaError> {
        let mut inner = self.inner.lock();
        if inner.current.is_some() {
            return Ok(());
        }
        let Some(file) = inner.queue.pop_front() else {
            return Ok(());
        };
        let handle = self.sink.start_transmit(&file.path)?;
        if let Some(recorder) = &self.recorder {
            recorder.start(&file.path)?;
        }
        inner.current = Some(Current { file, handle });
        Ok(())
    }

    /// Barge-in: tear down the current item and drain the queue.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.tearing_down = true;

        if let Some(current) = inner.current.take() {
            current.handle.stop();
            if let Some(recorder) = &self.recorder {
                recorder.stop();
            }
            unlink_best_effort(&current.file);
        }

        while let Some(file) = inner.queue.pop_front() {
            unlink_best_effort(&file);
        }

        inner.tearing_down = false;
    }

    /// Called by the media binding when the current file finishes playing
    /// naturally (not via `interrupt`).
    pub fn on_eof(&self) {
        let (should_chain, tearing_down) = {
            let mut inner = self.inner.lock();
            if let Some(current) = inner.current.take() {
                if let Some(recorder) = &self.recorder {
                    recorder.stop();
                }
                unlink_best_effort(&current.file);
            }
            (!inner.queue.is_empty(), inner.tearing_down)
        };

        if should_chain && !tearing_down {
            if let Err(e) = self.play() {
                tracing::warn!(error = %e, "failed to start next queued item after eof");
            }
        } else if !tearing_down {
            if let Some(on_stop) = self.on_stop.clone() {
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move { on_stop() });
                    }
                    Err(_) => on_stop(),
                }
            }
        }
    }

    /// `current` exists OR the queue is non-empty.
    pub fn is_active(&self) -> bool {
        let inner = self.inner.lock();
        inner.current.is_some() || !inner.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopHandle;
    impl PlaybackHandle for NoopHandle {
        fn stop(&self) {}
    }

    struct CountingSink {
        starts: AtomicUsize,
    }
    impl MediaSink for CountingSink {
        fn start_transmit(&self, _file: &std::path::Path) -> Result<Box<dyn PlaybackHandle>, MediaError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(NoopHandle))
        }
    }

    fn player() -> (Arc<CountingSink>, SmartPlayer) {
        let sink = Arc::new(CountingSink {
            starts: AtomicUsize::new(0),
        });
        let player = SmartPlayer::new(sink.clone(), None);
        (sink, player)
    }

    #[test]
    fn play_starts_only_when_idle() {
        let (sink, player) = player();
        player.put(AudioFile::new("/tmp/a.wav", false));
        player.put(AudioFile::new("/tmp/b.wav", false));
        player.play().unwrap();
        assert_eq!(sink.starts.load(Ordering::SeqCst), 1);
        player.play().unwrap();
        assert_eq!(sink.starts.load(Ordering::SeqCst), 1, "no second player while one is current");
        assert!(player.is_active());
    }

    #[test]
    fn on_eof_chains_to_next_item() {
        let (sink, player) = player();
        player.put(AudioFile::new("/tmp/a.wav", false));
        player.put(AudioFile::new("/tmp/b.wav", false));
        player.play().unwrap();
        player.on_eof();
        assert_eq!(sink.starts.load(Ordering::SeqCst), 2);
        player.on_eof();
        assert!(!player.is_active());
    }

    #[test]
    fn interrupt_clears_queue_and_current() {
        let (_sink, player) = player();
        player.put(AudioFile::new("/tmp/a.wav", false));
        player.put(AudioFile::new("/tmp/b.wav", false));
        player.play().unwrap();
        player.interrupt();
        assert!(!player.is_active());
    }
}
