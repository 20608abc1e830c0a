//! Contract with the external decoder engine that parses loop containers
//! and renders their slices.
//!
//! Lifetimes carry the engine's resource discipline: an engine value is an
//! initialised engine session and shuts the engine down when dropped, and a
//! [`DecoderEngine::Loop`] borrows its engine and closes the loop object when
//! dropped. Neither can outlive the other or be released twice.

pub mod rex;
pub mod synthetic;

use std::fmt;

use thiserror::Error;
use tracing::warn;

use crate::{
    model::{LoopInfo, SliceInfo},
    pcm::PlanarBuffer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStage {
    Start,
    Render,
    Stop,
}

impl fmt::Display for PreviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Start => "start",
            Self::Render => "render",
            Self::Stop => "stop",
        };
        f.write_str(stage)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("decoder engine unavailable: {0}")]
    Unavailable(String),
    #[error("decoder engine initialisation failed: {0}")]
    Init(String),
    #[error("loop container rejected: {0}")]
    Open(String),
    #[error("loop info query failed: {0}")]
    LoopInfo(String),
    #[error("slice {index} info query failed: {reason}")]
    SliceInfo { index: u32, reason: String },
    #[error("slice {index} render failed: {reason}")]
    RenderSlice { index: u32, reason: String },
    #[error("preview {stage} failed: {reason}")]
    Preview { stage: PreviewStage, reason: String },
}

pub trait DecoderEngine {
    type Loop<'e>: LoopDecoder
    where
        Self: 'e;

    fn name(&self) -> &'static str;

    /// Parses a loop container that is fully resident in memory.
    fn open<'e>(&'e self, container: &[u8]) -> Result<Self::Loop<'e>, EngineError>;
}

/// One opened loop. Calls must not overlap; the engine is not reentrant.
pub trait LoopDecoder {
    fn loop_info(&self) -> Result<LoopInfo, EngineError>;

    fn slice_info(&self, index: u32) -> Result<SliceInfo, EngineError>;

    /// Renders `output.frames()` frames of slice `index` into `output`.
    fn render_slice(&mut self, index: u32, output: &mut PlanarBuffer) -> Result<(), EngineError>;

    fn start_preview(&mut self) -> Result<(), EngineError>;

    /// Renders the next `output.frames()` frames of the running preview.
    fn render_preview_chunk(&mut self, output: &mut PlanarBuffer) -> Result<(), EngineError>;

    fn stop_preview(&mut self) -> Result<(), EngineError>;
}

/// A running preview. Stops the preview when dropped unless
/// [`PreviewSession::finish`] already did.
pub struct PreviewSession<'a, D: LoopDecoder + ?Sized> {
    decoder: &'a mut D,
    active: bool,
}

impl<'a, D: LoopDecoder + ?Sized> PreviewSession<'a, D> {
    pub fn start(decoder: &'a mut D) -> Result<Self, EngineError> {
        decoder.start_preview()?;
        Ok(Self {
            decoder,
            active: true,
        })
    }

    pub fn render_chunk(&mut self, output: &mut PlanarBuffer) -> Result<(), EngineError> {
        self.decoder.render_preview_chunk(output)
    }

    pub fn finish(mut self) -> Result<(), EngineError> {
        self.active = false;
        self.decoder.stop_preview()
    }
}

impl<D: LoopDecoder + ?Sized> Drop for PreviewSession<'_, D> {
    fn drop(&mut self) {
        if self.active {
            if let Err(error) = self.decoder.stop_preview() {
                warn!(%error, "failed to stop preview during unwind");
            }
        }
    }
}
