//! Motion channel: the link that turns synthesized speech into head motion.
//!
//! The wobble feed talks to the robot through the `MotionSink` trait only;
//! the concrete link (TCP daemon or simulation) is picked from config.

pub mod bridge;
pub mod sim;

pub use bridge::MotionBridge;
pub use sim::SimMotionSink;

use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A connection to the robot's motion synthesizer (real or simulated).
///
/// All operations are best-effort: a dead or absent robot must never be able
/// to stall or crash the speech pipeline this channel is attached to.
/// Callers check `connected()` per event and swallow errors at the call site.
#[async_trait]
pub trait MotionSink: Send + Sync {
    /// Current link state. Cheap, readable at any time.
    fn connected(&self) -> bool;

    /// Attempt to (re)connect. Idempotent; failures are silent apart from
    /// the returned state.
    async fn connect(&self) -> bool;

    /// Feed one base64-encoded chunk of speech audio to the synthesizer.
    async fn feed_audio(&self, audio_b64: String) -> Result<()>;

    /// Put the robot into its listening pose.
    async fn set_listening_pose(&self) -> Result<()>;

    /// Clear any sink-side motion state for a new session.
    async fn reset(&self) -> Result<()>;
}

/// Factory function: create a sink based on the configured motion mode.
pub fn create_sink(config: &Config) -> Result<Arc<dyn MotionSink>> {
    match config.motion_mode {
        "tcp" => Ok(Arc::new(MotionBridge::new(
            config.motion_address.to_string(),
            config.motion_client_id.clone(),
            config.motion_queue_size,
        ))),
        "sim" => Ok(Arc::new(SimMotionSink::new())),
        other => anyhow::bail!("Unsupported motion mode: {}", other),
    }
}
