//! Simulated motion sink: accepts the full command set, drives nothing.
//!
//! Lets the whole stack run on a machine without a robot or motion daemon;
//! feed activity shows up in the debug log instead of as head motion.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::MotionSink;

#[derive(Debug, Default)]
pub struct SimMotionSink {
    connected: AtomicBool,
    feeds: AtomicU64,
}

impl SimMotionSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MotionSink for SimMotionSink {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> bool {
        self.connected.store(true, Ordering::Relaxed);
        true
    }

    async fn feed_audio(&self, audio_b64: String) -> Result<()> {
        let n = self.feeds.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("sim: feed_audio #{} ({} base64 bytes)", n, audio_b64.len());
        Ok(())
    }

    async fn set_listening_pose(&self) -> Result<()> {
        log::debug!("sim: listening pose");
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        log::debug!("sim: reset after {} feeds", self.feeds.swap(0, Ordering::Relaxed));
        Ok(())
    }
}
