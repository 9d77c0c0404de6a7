use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::{FrameStreamer, StreamStats};
use crate::{timeline::SessionClock, Mode, OscSender, Result, StreamerError};

#[derive(Debug, Clone, Copy)]
enum Command {
    Mode(Mode),
    Stop,
}

/// Thread-safe handle to a [`FrameStreamer`] ticking on its own worker.
///
/// Commands travel one way over a queue and are applied only at tick
/// boundaries, so ramp state is never touched outside the worker. Clones
/// share the same worker; dropping every clone stops it.
#[derive(Clone)]
pub struct StreamerHandle {
    commands: Sender<Command>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    stats: Arc<Mutex<StreamStats>>,
}

impl StreamerHandle {
    /// Starts `streamer` on a new thread ticking every `interval`.
    pub fn spawn<S>(streamer: FrameStreamer<S>, interval: Duration) -> Result<Self>
    where
        S: OscSender + 'static,
    {
        if interval.is_zero() {
            return Err(StreamerError::config("tick interval must be positive"));
        }

        let (commands, queue) = crossbeam_channel::unbounded();
        let stats = Arc::new(Mutex::new(StreamStats::default()));
        let published = stats.clone();
        let worker = thread::Builder::new()
            .name("frame-streamer".to_string())
            .spawn(move || run_worker(streamer, queue, interval, published))?;

        Ok(Self {
            commands,
            worker: Arc::new(Mutex::new(Some(worker))),
            stats,
        })
    }

    /// Queues a mode change for the next tick.
    pub fn request_mode(&self, mode: Mode) -> Result<()> {
        self.commands
            .send(Command::Mode(mode))
            .map_err(|_| StreamerError::state("streamer is not running"))
    }

    /// Stops the worker and waits for it. No tick fires after this returns.
    /// Safe to call from any thread and more than once.
    pub fn stop(&self) -> Result<StreamStats> {
        let mut slot = self.lock_worker()?;
        if let Some(worker) = slot.take() {
            // the worker may already have exited; joining is enough then
            let _ = self.commands.send(Command::Stop);
            worker
                .join()
                .map_err(|_| StreamerError::state("streamer worker panicked"))?;
        }
        drop(slot);
        self.stats()
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .map(|slot| slot.as_ref().is_some_and(|worker| !worker.is_finished()))
            .unwrap_or(false)
    }

    /// Totals as of the last completed tick.
    pub fn stats(&self) -> Result<StreamStats> {
        let stats = self
            .stats
            .lock()
            .map_err(|_| StreamerError::state("stream stats have been poisoned"))?;
        Ok(*stats)
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<JoinHandle<()>>>> {
        self.worker
            .lock()
            .map_err(|_| StreamerError::state("streamer worker slot has been poisoned"))
    }
}

impl std::fmt::Debug for StreamerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamerHandle").finish()
    }
}

fn run_worker<S: OscSender>(
    mut streamer: FrameStreamer<S>,
    queue: Receiver<Command>,
    interval: Duration,
    published: Arc<Mutex<StreamStats>>,
) {
    let clock = SessionClock::start();
    if let Err(err) = streamer.start(clock.elapsed()) {
        tracing::error!(%err, "streamer failed to start");
        return;
    }

    let ticker = crossbeam_channel::tick(interval);
    loop {
        if drain_commands(&mut streamer, &queue, clock.elapsed()) {
            streamer.stop();
            publish(&published, streamer.stats());
            return;
        }

        if let Err(err) = streamer.tick(clock.elapsed()) {
            tracing::warn!(%err, "tick failed");
        }
        publish(&published, streamer.stats());

        if ticker.recv().is_err() {
            streamer.stop();
            publish(&published, streamer.stats());
            return;
        }
    }
}

/// Applies queued commands. Returns `true` once the session should end.
fn drain_commands<S: OscSender>(
    streamer: &mut FrameStreamer<S>,
    queue: &Receiver<Command>,
    now: Duration,
) -> bool {
    loop {
        match queue.try_recv() {
            Ok(Command::Mode(mode)) => {
                if let Err(err) = streamer.request_mode(mode, now) {
                    tracing::warn!(%err, "mode request ignored");
                }
            }
            Ok(Command::Stop) => return true,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => {
                tracing::debug!("all streamer handles dropped");
                return true;
            }
        }
    }
}

fn publish(published: &Mutex<StreamStats>, stats: StreamStats) {
    if let Ok(mut slot) = published.lock() {
        *slot = stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ChannelConfig, ChannelSpec, FrameSource, MemorySender, MotionLibrary, OscArg,
        StreamerOptions, Transform, FRAME_ADDRESS,
    };

    fn spawn(recorder: &MemorySender) -> StreamerHandle {
        let channels = ChannelConfig::from_specs(vec![
            ChannelSpec::single("a", "/a", Transform::new(1.0, 3.0)),
            ChannelSpec::single("b", "/b", Transform::default()),
        ])
        .unwrap();
        let mut library = MotionLibrary::empty(vec!["a".into(), "b".into()]);
        library
            .insert(Mode::Baseline, FrameSource::Pose(vec![1.0, 2.0]))
            .unwrap();
        library
            .insert(Mode::TurnLeft, FrameSource::Pose(vec![5.0, 6.0]))
            .unwrap();
        let streamer = FrameStreamer::new(
            channels,
            library,
            recorder.clone(),
            StreamerOptions {
                ramp_duration: Duration::ZERO,
                hold: Duration::ZERO,
                mock: false,
            },
        );
        StreamerHandle::spawn(streamer, Duration::from_millis(5)).unwrap()
    }

    #[test]
    fn streams_until_stopped_then_goes_quiet() {
        let recorder = MemorySender::new();
        let handle = spawn(&recorder);
        thread::sleep(Duration::from_millis(40));
        assert!(handle.is_running());

        let stats = handle.stop().unwrap();
        assert!(stats.frames > 0);
        assert!(!handle.is_running());

        let messages = recorder.messages();
        let last_two = &messages[messages.len() - 2..];
        assert!(last_two.iter().all(|m| m.args == vec![OscArg::Float(0.0)]));
        assert!(messages.iter().any(|m| m.address == FRAME_ADDRESS));

        let count = messages.len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(recorder.messages().len(), count);
    }

    #[test]
    fn mode_requests_reach_the_worker() {
        let recorder = MemorySender::new();
        let handle = spawn(&recorder);
        handle.request_mode(Mode::TurnLeft).unwrap();
        thread::sleep(Duration::from_millis(40));
        handle.stop().unwrap();

        let saw_left = recorder
            .messages()
            .iter()
            .any(|m| m.address == "/a" && m.args == vec![OscArg::Float(8.0)]);
        assert!(saw_left);
    }

    #[test]
    fn requests_after_stop_are_rejected() {
        let recorder = MemorySender::new();
        let handle = spawn(&recorder);
        handle.stop().unwrap();
        let err = handle.request_mode(Mode::Sitting).unwrap_err();
        assert!(matches!(err, StreamerError::State(_)));
        assert!(handle.stop().is_ok());
    }

    #[test]
    fn stop_from_another_thread() {
        let recorder = MemorySender::new();
        let handle = spawn(&recorder);
        let remote = handle.clone();
        let stats = thread::spawn(move || remote.stop())
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(handle.stop().unwrap(), stats);
    }
}
