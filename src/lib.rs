//! Lipwave turns a speech audio track into a lip-sync video.
//!
//! Recognized phoneme timings are mapped to static mouth-shape images,
//! optionally layered with a procedurally scheduled blink animation,
//! composited over a background, and muxed with the original audio:
//!
//! - Load a [`MappingTable`] per overlay kind and prepare [`RenderAssets`]
//! - Normalize recognizer output into a [`Timeline`]
//! - Optionally [`schedule_blinks`] for an eyelid [`Timeline`]
//! - Stream composited frames into a [`FrameSink`] via [`render_to_sink`]
#![forbid(unsafe_code)]

pub mod blink;
pub mod compose;
pub mod core;
pub mod encode;
pub mod error;
pub mod mapping;
pub mod pipeline;
pub mod recognizer;
pub mod timeline;

pub use blink::{BlinkConfig, BlinkState, schedule_blinks};
pub use compose::FrameRgba;
pub use core::{Canvas, Fps, FrameIndex, FrameRange};
pub use encode::{FfmpegSink, FfmpegSinkOpts, FrameSink, InMemorySink, SinkConfig};
pub use error::{LipwaveError, LipwaveResult};
pub use mapping::{MappingTable, PreparedImage, load_image};
pub use pipeline::{
    RenderAssets, RenderConfig, RenderStats, RenderThreading, render_frame, render_to_sink,
};
pub use timeline::{Label, TimedEvent, Timeline};
