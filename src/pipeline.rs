use std::collections::HashMap;

use rayon::prelude::*;

use crate::compose::{FrameRgba, composite_frame};
use crate::core::{Canvas, FrameIndex, FrameRange, Fps};
use crate::encode::{FrameSink, SinkConfig};
use crate::error::{LipwaveError, LipwaveResult};
use crate::mapping::{MappingTable, PreparedImage};
use crate::timeline::{Label, Timeline};

/// Immutable description of one render: frame rate, covered duration, and
/// the two state timelines. Owned by the pipeline for the render's lifetime.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Output frame rate.
    pub fps: Fps,
    /// Output duration in seconds.
    pub duration: f64,
    /// Mouth-shape timeline from the phoneme recognizer.
    pub lip_timeline: Timeline,
    /// Eyelid timeline from the blink scheduler, absent when no blink
    /// mapping was supplied.
    pub blink_timeline: Option<Timeline>,
}

/// Shared read-only image resources for a render: loaded and validated once
/// up front, then only read from worker threads.
#[derive(Clone, Debug)]
pub struct RenderAssets {
    /// Mouth-shape mapping table.
    pub mouth: MappingTable,
    /// Blink mapping table, present iff a blink timeline will be used.
    pub blink: Option<MappingTable>,
    /// Optional background; composited below all overlays.
    pub background: Option<PreparedImage>,
    /// Output canvas dimensions.
    pub canvas: Canvas,
}

impl RenderAssets {
    /// Assemble render assets and validate overlay dimensions.
    ///
    /// The canvas is taken from the background image, or inferred from the
    /// first mouth image when no background is supplied. Every overlay in
    /// both tables must match the canvas exactly; a mismatch fails here,
    /// before any frame is produced.
    pub fn prepare(
        mouth: MappingTable,
        blink: Option<MappingTable>,
        background: Option<PreparedImage>,
    ) -> LipwaveResult<Self> {
        let canvas = match &background {
            Some(bg) => bg.canvas(),
            None => mouth
                .first_canvas()
                .ok_or_else(|| LipwaveError::validation("mouth mapping table contains no images"))?,
        };

        mouth.validate_dimensions(canvas)?;
        if let Some(blink) = &blink {
            blink.validate_dimensions(canvas)?;
        }

        Ok(Self {
            mouth,
            blink,
            background,
            canvas,
        })
    }
}

impl RenderConfig {
    /// Validate the config against its assets.
    ///
    /// Checks mapping completeness for both timelines so an unmapped label
    /// fails the render before the first frame, never at frame N.
    pub fn validate(&self, assets: &RenderAssets) -> LipwaveResult<()> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(LipwaveError::validation(format!(
                "render duration must be finite and >= 0, got {}",
                self.duration
            )));
        }

        assets.mouth.validate_covers(&self.lip_timeline, "lip")?;
        match (&self.blink_timeline, &assets.blink) {
            (Some(tl), Some(table)) => table.validate_covers(tl, "blink")?,
            (Some(_), None) => {
                return Err(LipwaveError::validation(
                    "blink timeline present but no blink mapping table loaded",
                ));
            }
            (None, _) => {}
        }
        Ok(())
    }

    /// Total output frame count: `ceil(duration * fps)`.
    pub fn frame_count(&self) -> u64 {
        self.fps.frame_count_for_secs(self.duration)
    }
}

/// Resolved overlay state for one frame. Frames with equal fingerprints are
/// pixel-identical, which is what static-frame elision keys on.
type FrameFingerprint = (Option<Label>, Option<Label>);

fn fingerprint_frame(config: &RenderConfig, idx: FrameIndex) -> FrameFingerprint {
    let t = config.fps.frame_time_secs(idx);
    (
        config.lip_timeline.label_at(t),
        config.blink_timeline.as_ref().and_then(|tl| tl.label_at(t)),
    )
}

/// Render one output frame.
///
/// A pure function of `(idx, config, assets)`: resolves both timelines at
/// the frame's timestamp and composites background, mouth, and eyelid
/// layers. Safe to call from any thread in any order.
#[tracing::instrument(skip(config, assets))]
pub fn render_frame(
    config: &RenderConfig,
    assets: &RenderAssets,
    idx: FrameIndex,
) -> LipwaveResult<FrameRgba> {
    let t = config.fps.frame_time_secs(idx);

    let mut layers: Vec<&PreparedImage> = Vec::with_capacity(2);
    if let Some(label) = config.lip_timeline.label_at(t) {
        layers.push(assets.mouth.resolve(label)?);
    }
    if let (Some(tl), Some(table)) = (&config.blink_timeline, &assets.blink)
        && let Some(label) = tl.label_at(t)
    {
        layers.push(table.resolve(label)?);
    }

    composite_frame(assets.canvas, assets.background.as_ref(), &layers)
}

/// Threading and chunking controls for multi-frame rendering.
#[derive(Clone, Debug)]
pub struct RenderThreading {
    /// Enable parallel rendering when `true`.
    pub parallel: bool,
    /// Chunk size in frames for batched scheduling.
    pub chunk_size: usize,
    /// Optional explicit worker thread count.
    pub threads: Option<usize>,
    /// Render identical-state frames once per chunk and reuse the pixels.
    pub static_frame_elision: bool,
}

impl Default for RenderThreading {
    fn default() -> Self {
        Self {
            parallel: false,
            chunk_size: 64,
            threads: None,
            static_frame_elision: false,
        }
    }
}

/// Aggregated rendering counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Total requested frames.
    pub frames_total: u64,
    /// Frames that were actually rendered.
    pub frames_rendered: u64,
    /// Frames reused via static-frame elision.
    pub frames_elided: u64,
}

/// Render the whole configured duration into `sink`, in frame-index order.
///
/// Validation (mapping completeness, dimension compatibility) runs before
/// the first frame is pushed. Frames may be computed across rayon workers,
/// but they are resequenced and handed to the sink strictly in order, and
/// the output is byte-identical regardless of worker count. The first
/// failing frame aborts the remaining work at chunk granularity.
pub fn render_to_sink(
    config: &RenderConfig,
    assets: &RenderAssets,
    threading: &RenderThreading,
    sink: &mut dyn FrameSink,
) -> LipwaveResult<RenderStats> {
    config.validate(assets)?;

    let total = config.frame_count();
    let chunk_size = normalized_chunk_size(threading.chunk_size);

    let pool = if threading.parallel {
        Some(build_thread_pool(threading.threads)?)
    } else {
        None
    };

    sink.begin(SinkConfig {
        width: assets.canvas.width,
        height: assets.canvas.height,
        fps: config.fps,
    })?;

    let mut stats = RenderStats::default();
    let mut chunk_start = 0u64;
    while chunk_start < total {
        let chunk_end = (chunk_start + chunk_size).min(total);
        let chunk = FrameRange::new(FrameIndex(chunk_start), FrameIndex(chunk_end))?;

        let chunk_out = match &pool {
            Some(pool) => render_chunk_parallel(config, assets, chunk, threading, pool)?,
            None => render_chunk_sequential(config, assets, chunk, threading)?,
        };

        for (offset, &u) in chunk_out.frame_to_unique.iter().enumerate() {
            let frame = chunk_out.unique_frames.get(u).ok_or_else(|| {
                LipwaveError::validation(
                    "internal error: unique frame index out of range during sink push",
                )
            })?;
            sink.push_frame(FrameIndex(chunk.start.0 + offset as u64), frame)?;
        }

        stats.frames_total += chunk_out.stats.frames_total;
        stats.frames_rendered += chunk_out.stats.frames_rendered;
        stats.frames_elided += chunk_out.stats.frames_elided;
        chunk_start = chunk_end;
    }

    sink.end()?;
    Ok(stats)
}

struct ChunkOut {
    unique_frames: Vec<FrameRgba>,
    frame_to_unique: Vec<usize>,
    stats: RenderStats,
}

/// Map each frame of `chunk` to a unique work item, deduplicating frames
/// with equal fingerprints when elision is enabled.
fn plan_chunk(
    config: &RenderConfig,
    chunk: FrameRange,
    elide: bool,
) -> (Vec<FrameIndex>, Vec<usize>) {
    let len = chunk.len_frames() as usize;
    let mut unique_indices = Vec::<FrameIndex>::with_capacity(len);
    let mut frame_to_unique = Vec::<usize>::with_capacity(len);

    if elide {
        let mut first = HashMap::<FrameFingerprint, usize>::new();
        for f in chunk.start.0..chunk.end.0 {
            let idx = FrameIndex(f);
            let fingerprint = fingerprint_frame(config, idx);
            if let Some(existing) = first.get(&fingerprint).copied() {
                frame_to_unique.push(existing);
            } else {
                let slot = unique_indices.len();
                unique_indices.push(idx);
                first.insert(fingerprint, slot);
                frame_to_unique.push(slot);
            }
        }
    } else {
        for (slot, f) in (chunk.start.0..chunk.end.0).enumerate() {
            unique_indices.push(FrameIndex(f));
            frame_to_unique.push(slot);
        }
    }

    (unique_indices, frame_to_unique)
}

fn render_chunk_sequential(
    config: &RenderConfig,
    assets: &RenderAssets,
    chunk: FrameRange,
    threading: &RenderThreading,
) -> LipwaveResult<ChunkOut> {
    let (unique_indices, frame_to_unique) =
        plan_chunk(config, chunk, threading.static_frame_elision);

    let mut unique_frames = Vec::with_capacity(unique_indices.len());
    for &idx in &unique_indices {
        unique_frames.push(render_frame(config, assets, idx)?);
    }

    Ok(ChunkOut {
        stats: chunk_stats(chunk.len_frames(), unique_indices.len() as u64),
        unique_frames,
        frame_to_unique,
    })
}

fn render_chunk_parallel(
    config: &RenderConfig,
    assets: &RenderAssets,
    chunk: FrameRange,
    threading: &RenderThreading,
    pool: &rayon::ThreadPool,
) -> LipwaveResult<ChunkOut> {
    let (unique_indices, frame_to_unique) =
        plan_chunk(config, chunk, threading.static_frame_elision);

    let rendered = pool.install(|| {
        unique_indices
            .par_iter()
            .map(|&idx| render_frame(config, assets, idx))
            .collect::<Vec<_>>()
    });

    let mut unique_frames = Vec::with_capacity(rendered.len());
    for item in rendered {
        unique_frames.push(item?);
    }

    Ok(ChunkOut {
        stats: chunk_stats(chunk.len_frames(), unique_indices.len() as u64),
        unique_frames,
        frame_to_unique,
    })
}

fn chunk_stats(total: u64, rendered: u64) -> RenderStats {
    RenderStats {
        frames_total: total,
        frames_rendered: rendered,
        frames_elided: total.saturating_sub(rendered),
    }
}

fn build_thread_pool(threads: Option<usize>) -> LipwaveResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(LipwaveError::validation(
            "render threading 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| LipwaveError::validation(format!("failed to build rayon thread pool: {e}")))
}

fn normalized_chunk_size(chunk_size: usize) -> u64 {
    if chunk_size == 0 { 1 } else { chunk_size as u64 }
}
