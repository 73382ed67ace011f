//! Local proctoring pipeline: raw signal capture, heuristic classification,
//! and the monotone integrity score that drives escalation.
//!
//! Everything here is advisory. The server computes the authoritative
//! penalty from the same reported events; the local pipeline exists for
//! immediate UI feedback and to force a submission or elimination ahead of
//! server confirmation.

pub mod classifier;
pub mod sampler;
pub mod score;

pub use sampler::{EventSampler, RawSignal, SamplerSnapshot};
pub use score::{ScoreAccumulator, ScoreUpdate};
