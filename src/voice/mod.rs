//! Voice-command search pipeline.
//!
//! Microphone toggle -> transcript capture -> command interpretation ->
//! query embedding -> vector similarity search -> outcome. The stages
//! run strictly sequentially; each network step is bounded by the AI
//! client timeout, and cancellation is checked between steps.
//!
//! - `capture`: cancellable transcript state machine
//! - `interpreter`: fixed-prompt chat call, strictly parsed
//! - `pipeline`: orchestration and outcome types

pub mod capture;
pub mod interpreter;
pub mod pipeline;

pub use capture::{CaptureError, CaptureState, TranscriptCapture};
pub use interpreter::{
    CommandInterpreter, Interpret, InterpretedCommand, SearchType,
};
pub use pipeline::{
    CancelToken, EmbedQuery, Interpreted, PipelineOpts, SearchSimilar, VoiceError,
    VoicePipeline, VoiceSearchOutcome,
};
