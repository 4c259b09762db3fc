//! TCP link to the local motion daemon, JSON lines on the wire.
//!
//! Commands go onto a bounded queue consumed by a writer task that owns the
//! stream, so enqueueing never blocks the frame loop: a full queue or a dead
//! link drops the command with a log line instead of backpressuring audio.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use super::MotionSink;

#[derive(Debug)]
enum MotionCommand {
    Connect(oneshot::Sender<bool>),
    FeedAudio(String),
    SetPose(&'static str),
    Reset,
}

#[derive(Serialize)]
struct HelloMessage<'a> {
    #[serde(rename = "type")]
    msg_type: &'a str,
    client_id: &'a str,
}

pub struct MotionBridge {
    cmd_tx: mpsc::Sender<MotionCommand>,
    connected: Arc<AtomicBool>,
}

impl MotionBridge {
    pub fn new(address: String, client_id: String, queue_size: usize) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(queue_size);
        let connected = Arc::new(AtomicBool::new(false));

        let writer = WriterTask {
            address,
            client_id,
            connected: connected.clone(),
            stream: None,
        };
        tokio::spawn(writer.run(cmd_rx));

        Self { cmd_tx, connected }
    }

    fn enqueue(&self, cmd: MotionCommand) -> Result<()> {
        self.cmd_tx
            .try_send(cmd)
            .map_err(|e| anyhow::anyhow!("motion command queue: {}", e))
    }
}

#[async_trait]
impl MotionSink for MotionBridge {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> bool {
        if self.connected() {
            return true;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.enqueue(MotionCommand::Connect(reply_tx)).is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    async fn feed_audio(&self, audio_b64: String) -> Result<()> {
        self.enqueue(MotionCommand::FeedAudio(audio_b64))
    }

    async fn set_listening_pose(&self) -> Result<()> {
        self.enqueue(MotionCommand::SetPose("listening"))
    }

    async fn reset(&self) -> Result<()> {
        self.enqueue(MotionCommand::Reset)
    }
}

struct WriterTask {
    address: String,
    client_id: String,
    connected: Arc<AtomicBool>,
    stream: Option<TcpStream>,
}

impl WriterTask {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<MotionCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                MotionCommand::Connect(reply) => {
                    let ok = self.connect().await;
                    let _ = reply.send(ok);
                }
                MotionCommand::FeedAudio(audio_b64) => {
                    self.write_line(json!({"type": "feed_audio", "audio": audio_b64}))
                        .await;
                }
                MotionCommand::SetPose(pose) => {
                    self.write_line(json!({"type": "pose", "pose": pose})).await;
                }
                MotionCommand::Reset => {
                    self.write_line(json!({"type": "reset"})).await;
                }
            }
        }
    }

    async fn connect(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        match TcpStream::connect(&self.address).await {
            Ok(stream) => {
                log::info!("Motion daemon connected at {}", self.address);
                self.stream = Some(stream);
                self.connected.store(true, Ordering::Relaxed);
                let hello = serde_json::to_value(HelloMessage {
                    msg_type: "hello",
                    client_id: &self.client_id,
                })
                .unwrap_or_default();
                self.write_line(hello).await;
                self.stream.is_some()
            }
            Err(e) => {
                log::warn!("Failed to connect motion daemon at {}: {}", self.address, e);
                false
            }
        }
    }

    /// Write one newline-terminated JSON command. A write error tears the
    /// link down; the next explicit connect() brings it back.
    async fn write_line(&mut self, value: serde_json::Value) {
        let Some(stream) = self.stream.as_mut() else {
            log::debug!("Motion link down, dropping command");
            return;
        };
        let mut payload = value.to_string().into_bytes();
        payload.push(b'\n');
        if let Err(e) = stream.write_all(&payload).await {
            log::warn!("Motion daemon write failed: {}", e);
            self.stream = None;
            self.connected.store(false, Ordering::Relaxed);
        }
    }
}
