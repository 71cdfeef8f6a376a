//! Phase signaling between a running pipeline and its observers.
//!
//! A pipeline publishes its current [`PipelinePhase`] on a watch channel. Observers only ever see
//! the latest phase, which is all a progress display or a health check needs.

use tokio::sync::watch;

use crate::pipeline::PipelinePhase;

/// Transmitter side of a pipeline phase channel.
pub type PhaseTx = watch::Sender<PipelinePhase>;

/// Receiver side of a pipeline phase channel.
pub type PhaseRx = watch::Receiver<PipelinePhase>;

/// Creates a phase channel starting in [`PipelinePhase::Idle`].
pub fn create_phase_signal() -> (PhaseTx, PhaseRx) {
    watch::channel(PipelinePhase::Idle)
}
