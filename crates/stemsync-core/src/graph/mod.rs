//! In-process audio graph for one track
//!
//! A graph is split in two halves joined by a lock-free command queue:
//!
//! - [`StemGraph`]: the control side, implementing [`RenderBackend`]. It turns
//!   engine-time instructions into frame-accurate [`GraphCommand`]s.
//! - [`GraphRenderer`]: the audio side, rendering stems with varispeed, gain
//!   and a shared pitch stage. Driven by a cpal stream or offline.
//!
//! The graph's clock is the number of frames its renderer has produced, so a
//! graph that is not being rendered does not advance.

mod command;
pub mod gc;
mod pitch;
mod renderer;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use basedrop::Shared;

pub use command::{command_channel, GraphCommand, COMMAND_QUEUE_CAPACITY};
pub use pitch::{PitchQuality, PitchStage, MAX_PITCH_SEMITONES};
pub use renderer::{db_to_linear, GainRamp, GraphAtomics, GraphRenderer, MAX_BLOCK_SIZE};

use crate::audio::{OutputConfig, OutputStream, ResolvedOutput, SharedRenderer};
use crate::backend::{BackendError, BackendResult, GraphFactory, RenderBackend, StemLevel};
use crate::loader::DecodedStems;
use crate::types::{StereoBuffer, StereoSample};

/// Where a graph's audio goes
enum GraphOutput {
    /// Rendered on demand through [`StemGraph::render`]
    Offline,
    /// A device stream, opened by the first `resume()`
    Device {
        output: ResolvedOutput,
        stream: Option<OutputStream>,
    },
}

/// Control side of a track's audio graph
pub struct StemGraph {
    command_tx: rtrb::Producer<GraphCommand>,
    renderer: SharedRenderer,
    atomics: Arc<GraphAtomics>,
    output: GraphOutput,
    stem_count: usize,
    disposed: bool,
}

impl StemGraph {
    fn new(stems: Vec<Shared<StereoBuffer>>, sample_rate: u32, quality: PitchQuality, output: GraphOutput) -> Self {
        let (command_tx, command_rx) = command_channel();
        let atomics = Arc::new(GraphAtomics::new(sample_rate));
        let stem_count = stems.len();
        let renderer = GraphRenderer::new(stems, 0.0, quality, command_rx, Arc::clone(&atomics));

        Self {
            command_tx,
            renderer: Arc::new(Mutex::new(renderer)),
            atomics,
            output,
            stem_count,
            disposed: false,
        }
    }

    /// A graph with no device output; audio is pulled with [`render`](Self::render)
    pub fn offline(stems: Vec<Shared<StereoBuffer>>, sample_rate: u32, quality: PitchQuality) -> Self {
        Self::new(stems, sample_rate, quality, GraphOutput::Offline)
    }

    /// A graph that plays through `output` once resumed
    pub fn with_device(stems: Vec<Shared<StereoBuffer>>, output: ResolvedOutput, quality: PitchQuality) -> Self {
        let sample_rate = output.sample_rate();
        Self::new(
            stems,
            sample_rate,
            quality,
            GraphOutput::Device {
                output,
                stream: None,
            },
        )
    }

    /// The shared renderer, for output streams and inspection
    pub fn renderer(&self) -> SharedRenderer {
        Arc::clone(&self.renderer)
    }

    /// The graph's lock-free state
    pub fn atomics(&self) -> Arc<GraphAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn sample_rate(&self) -> u32 {
        self.atomics.sample_rate()
    }

    pub fn stem_count(&self) -> usize {
        self.stem_count
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Render the next `output.len()` frames in the calling thread
    ///
    /// Used for offline graphs (bounces, tests). On a device graph this
    /// competes with the stream callback, which renders silence while the
    /// renderer is held here.
    pub fn render(&self, output: &mut [StereoSample]) {
        match self.renderer.lock() {
            Ok(mut renderer) => renderer.render(output),
            Err(_) => {
                log::error!("Graph renderer poisoned; rendering silence");
                output.fill(StereoSample::silence());
            }
        }
    }

    fn seconds_to_frames(&self, seconds: f64) -> f64 {
        seconds * self.atomics.sample_rate() as f64
    }

    fn check_stem(&self, stem: usize) -> BackendResult<()> {
        if stem < self.stem_count {
            Ok(())
        } else {
            Err(BackendError::UnknownStem(stem))
        }
    }

    fn ramp_frames(&self, ramp: Duration) -> u32 {
        self.seconds_to_frames(ramp.as_secs_f64()).round() as u32
    }

    /// Queue one command
    ///
    /// When the queue is full and no callback holds the renderer (an offline
    /// graph, or a device graph not yet resumed), the pending commands are
    /// applied here and the push is retried.
    fn send(&mut self, cmd: GraphCommand) -> BackendResult<()> {
        if self.disposed {
            return Err(BackendError::Disposed);
        }
        let cmd = match self.command_tx.push(cmd) {
            Ok(()) => return Ok(()),
            Err(rtrb::PushError::Full(cmd)) => cmd,
        };
        match self.renderer.try_lock() {
            Ok(mut renderer) => {
                renderer.apply_pending();
                drop(renderer);
                self.command_tx.push(cmd).map_err(|_| BackendError::QueueFull)
            }
            Err(_) => {
                log::warn!("Graph command queue full while rendering, rejecting command");
                Err(BackendError::QueueFull)
            }
        }
    }
}

impl RenderBackend for StemGraph {
    fn now(&self) -> f64 {
        self.atomics.now()
    }

    fn resume(&mut self) -> BackendResult<()> {
        if self.disposed {
            return Err(BackendError::Disposed);
        }
        if let GraphOutput::Device { output, stream } = &mut self.output {
            if stream.is_none() {
                *stream = Some(output.open(Arc::clone(&self.renderer))?);
                log::info!("Graph output resumed ({} stems)", self.stem_count);
            }
        }
        Ok(())
    }

    fn start_all(&mut self, when: f64, offset: f64) -> BackendResult<()> {
        let at_frame = self.seconds_to_frames(when).max(0.0).round() as u64;
        let offset_frames = self.seconds_to_frames(offset).max(0.0);
        self.send(GraphCommand::StartAll {
            at_frame,
            offset_frames,
        })
    }

    fn stop_all(&mut self) -> BackendResult<()> {
        self.send(GraphCommand::StopAll)
    }

    fn set_stem_level(&mut self, stem: usize, level: StemLevel, ramp: Duration) -> BackendResult<()> {
        self.check_stem(stem)?;
        let ramp_frames = self.ramp_frames(ramp);
        self.send(GraphCommand::SetLevel {
            stem: Some(stem),
            level,
            ramp_frames,
        })
    }

    fn set_all_levels(&mut self, level: StemLevel, ramp: Duration) -> BackendResult<()> {
        let ramp_frames = self.ramp_frames(ramp);
        self.send(GraphCommand::SetLevel {
            stem: None,
            level,
            ramp_frames,
        })
    }

    fn set_playback_rate(&mut self, rate: f64) -> BackendResult<()> {
        self.send(GraphCommand::SetRate(rate))
    }

    fn set_pitch_shift(&mut self, semitones: f64) -> BackendResult<()> {
        self.send(GraphCommand::SetPitch(semitones))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let _ = self.send(GraphCommand::StopAll);
        if let GraphOutput::Device { stream, .. } = &mut self.output {
            // Dropping the stream stops the callback
            stream.take();
        }
        self.disposed = true;
        log::debug!("Graph disposed ({} stems)", self.stem_count);
    }
}

impl Drop for StemGraph {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Builds offline graphs at a fixed sample rate
#[derive(Debug, Clone, Copy)]
pub struct OfflineGraphFactory {
    sample_rate: u32,
    quality: PitchQuality,
}

impl OfflineGraphFactory {
    pub fn new(sample_rate: u32, quality: PitchQuality) -> Self {
        Self {
            sample_rate,
            quality,
        }
    }
}

impl GraphFactory for OfflineGraphFactory {
    type Graph = StemGraph;

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn build(&mut self, stems: DecodedStems) -> BackendResult<StemGraph> {
        Ok(StemGraph::offline(stems.into_buffers(), self.sample_rate, self.quality))
    }
}

/// Builds graphs that each open their own stream on one output device
pub struct DeviceGraphFactory {
    output: ResolvedOutput,
    quality: PitchQuality,
}

impl DeviceGraphFactory {
    /// Resolve the output device once; every graph reuses its configuration
    pub fn new(config: &OutputConfig, quality: PitchQuality) -> BackendResult<Self> {
        Ok(Self {
            output: ResolvedOutput::resolve(config)?,
            quality,
        })
    }
}

impl GraphFactory for DeviceGraphFactory {
    type Graph = StemGraph;

    fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    fn build(&mut self, stems: DecodedStems) -> BackendResult<StemGraph> {
        Ok(StemGraph::with_device(stems.into_buffers(), self.output.clone(), self.quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::gc::gc_handle;

    const SR: u32 = 1000;

    fn graph_with_stems(count: usize, len: usize) -> StemGraph {
        let stems = (0..count)
            .map(|_| Shared::new(&gc_handle(), StereoBuffer::from_channels(&vec![0.5; len], &vec![0.5; len])))
            .collect();
        StemGraph::offline(stems, SR, PitchQuality::Cheaper)
    }

    #[test]
    fn test_clock_follows_rendered_frames() {
        let graph = graph_with_stems(1, 100);
        assert_eq!(graph.now(), 0.0);
        let mut out = vec![StereoSample::silence(); 250];
        graph.render(&mut out);
        assert!((graph.now() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_start_all_converts_seconds_to_frames() {
        let mut graph = graph_with_stems(2, 10_000);
        graph.resume().unwrap();
        graph.start_all(0.0, 2.5).unwrap();
        graph.render(&mut vec![StereoSample::silence(); 10]);

        let renderer = graph.renderer();
        let renderer = renderer.lock().unwrap();
        assert_eq!(renderer.read_position(0), Some(2510.0));
        assert_eq!(renderer.read_position(1), Some(2510.0));
    }

    #[test]
    fn test_unknown_stem_is_rejected() {
        let mut graph = graph_with_stems(1, 10);
        assert!(matches!(
            graph.set_stem_level(1, StemLevel::Muted, Duration::ZERO),
            Err(BackendError::UnknownStem(1))
        ));
    }

    #[test]
    fn test_rate_and_pitch_reach_renderer() {
        let mut graph = graph_with_stems(1, 10);
        graph.set_playback_rate(1.2).unwrap();
        graph.set_pitch_shift(-1.5).unwrap();
        graph.render(&mut vec![StereoSample::silence(); 4]);

        let renderer = graph.renderer();
        let renderer = renderer.lock().unwrap();
        assert_eq!(renderer.rate(), 1.2);
        assert_eq!(renderer.pitch_semitones(), -1.5);
    }

    #[test]
    fn test_disposed_graph_rejects_commands() {
        let mut graph = graph_with_stems(1, 10);
        graph.dispose();
        assert!(graph.is_disposed());
        assert!(matches!(graph.stop_all(), Err(BackendError::Disposed)));
        assert!(matches!(graph.resume(), Err(BackendError::Disposed)));
        // A second dispose is harmless
        graph.dispose();
    }

    #[test]
    fn test_level_ramp_uses_sample_rate() {
        let mut graph = graph_with_stems(1, 10);
        graph
            .set_stem_level(0, StemLevel::Db(-6.0), Duration::from_millis(100))
            .unwrap();
        graph.render(&mut vec![StereoSample::silence(); 99]);
        {
            let renderer = graph.renderer();
            let renderer = renderer.lock().unwrap();
            let (db, _) = renderer.stem_gain(0).unwrap();
            assert!(db > -6.0);
        }
        graph.render(&mut vec![StereoSample::silence(); 1]);
        let renderer = graph.renderer();
        let renderer = renderer.lock().unwrap();
        assert_eq!(renderer.stem_gain(0), Some((-6.0, false)));
    }

    #[test]
    fn test_full_queue_drains_when_nothing_renders() {
        let mut graph = graph_with_stems(2, 10);
        for i in 0..COMMAND_QUEUE_CAPACITY * 4 {
            let level = if i % 2 == 0 { StemLevel::Muted } else { StemLevel::Db(-(i as f32) / 100.0) };
            graph.set_stem_level(i % 2, level, Duration::ZERO).unwrap();
        }
        graph.render(&mut vec![StereoSample::silence(); 1]);

        let renderer = graph.renderer();
        let renderer = renderer.lock().unwrap();
        assert_eq!(renderer.stem_gain(0), Some((0.0, true)));
        let last = -((COMMAND_QUEUE_CAPACITY * 4 - 1) as f32) / 100.0;
        assert_eq!(renderer.stem_gain(1), Some((last, false)));
    }

    #[test]
    fn test_full_queue_rejects_while_renderer_is_held() {
        let mut graph = graph_with_stems(1, 10);
        let shared = graph.renderer();
        let held = shared.lock().unwrap();
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            graph.set_playback_rate(1.5).unwrap();
        }
        assert!(matches!(graph.set_playback_rate(2.0), Err(BackendError::QueueFull)));
        drop(held);

        // Once the renderer is free again the backlog is applied in order
        graph.set_playback_rate(1.25).unwrap();
        graph.render(&mut vec![StereoSample::silence(); 1]);
        assert_eq!(shared.lock().unwrap().rate(), 1.25);
    }

    #[test]
    fn test_offline_factory_builds_graph_per_stem_set() {
        let mut factory = OfflineGraphFactory::new(SR, PitchQuality::Cheaper);
        let stems = DecodedStems::new(
            vec!["vocals".to_string(), "drums".to_string()],
            vec![StereoBuffer::silence(100), StereoBuffer::silence(80)],
            SR,
        );
        let graph = factory.build(stems).unwrap();
        assert_eq!(graph.stem_count(), 2);
        assert_eq!(graph.sample_rate(), SR);
    }
}
