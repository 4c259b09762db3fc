//! The wobble feed: taps the pipeline stream and drives head motion.
//!
//! Sits between the synthesis stage and the transport stage. Every datagram
//! that comes in goes out again unchanged and in order; along the way,
//! outbound speech audio observed during a speaking turn is deduplicated and
//! fed to the motion sink so the head moves in sync with the voice. A dead
//! robot degrades to a motionless one, never to a dropped call.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::dedup::{SeenChunks, chunk_digest};
use crate::frames::{AudioDirection, PipelineFrame};
use crate::motion::MotionSink;
use crate::state_machine::SpeakingState;

/// Per-turn feed diagnostics. Reset at every turn start and session reset.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedCounters {
    /// Outbound chunks seen while the feed gate was open
    pub observed: u64,
    /// Chunks that passed dedup and were handed to the sink
    pub forwarded: u64,
}

pub struct Wobbler {
    sink: Arc<dyn MotionSink>,
    state: SpeakingState,
    seen: SeenChunks,
    counters: FeedCounters,
    current_session_id: Option<String>,
    out_tx: mpsc::Sender<Vec<u8>>,
}

impl Wobbler {
    /// Build the feed around an existing sink reference. If the sink is not
    /// yet connected, one connection attempt is made here; either way the
    /// feed is usable, since connectivity is re-checked on every event.
    pub async fn new(sink: Arc<dyn MotionSink>, out_tx: mpsc::Sender<Vec<u8>>) -> Self {
        if sink.connected() {
            log::info!("Motion sink already connected");
        } else if sink.connect().await {
            log::info!("Motion sink connected");
        } else {
            log::warn!("Motion sink unavailable, wobble feed idle until reconnect");
        }

        Self {
            sink,
            state: SpeakingState::Idle,
            seen: SeenChunks::new(),
            counters: FeedCounters::default(),
            current_session_id: None,
            out_tx,
        }
    }

    pub fn state(&self) -> SpeakingState {
        self.state
    }

    pub fn counters(&self) -> FeedCounters {
        self.counters
    }

    /// Observe one datagram from the pipeline and forward it downstream
    /// unchanged. Decoding only drives side effects on the motion channel;
    /// the bytes that go out are the bytes that came in.
    pub async fn handle_datagram(&mut self, raw: Vec<u8>) {
        let frame = PipelineFrame::decode(&raw);
        self.handle_frame(&frame).await;
        if let Err(e) = self.out_tx.send(raw).await {
            log::error!("Failed to forward frame downstream: {}", e);
        }
    }

    async fn handle_frame(&mut self, frame: &PipelineFrame) {
        match frame {
            PipelineFrame::BotStartedSpeaking => self.on_bot_started_speaking(),
            PipelineFrame::BotStoppedSpeaking => self.on_bot_stopped_speaking().await,
            PipelineFrame::UserStartedSpeaking => self.on_user_started_speaking().await,
            PipelineFrame::SessionStart { session_id } => {
                self.on_session_start(session_id.clone()).await;
            }
            PipelineFrame::Audio {
                direction: AudioDirection::Outbound,
                data,
            } => self.on_outbound_audio(data).await,
            // inbound audio and opaque frames carry no state for the feed
            PipelineFrame::Audio { .. } | PipelineFrame::Opaque => {}
        }
    }

    fn on_bot_started_speaking(&mut self) {
        self.state = SpeakingState::BotSpeaking;
        self.seen.clear();
        self.counters = FeedCounters::default();
        log::info!("Bot started speaking, wobble feed armed");
    }

    async fn on_bot_stopped_speaking(&mut self) {
        self.state = SpeakingState::Idle;
        log::info!(
            "Bot stopped speaking, fed {}/{} audio chunks",
            self.counters.forwarded,
            self.counters.observed,
        );
        self.assume_listening_pose().await;
        self.seen.clear();
    }

    async fn on_user_started_speaking(&mut self) {
        if self.state == SpeakingState::BotSpeaking {
            log::info!("User started speaking, wobble feed interrupted");
        }
        self.state = SpeakingState::Idle;
        self.assume_listening_pose().await;
        self.seen.clear();
    }

    async fn on_session_start(&mut self, session_id: Option<String>) {
        if let Some(sid) = &session_id {
            if self.current_session_id.as_deref() != Some(sid) {
                log::info!("New session: {}", sid);
            }
        }
        self.current_session_id = session_id;
        self.reset_session().await;
        // one reconnect attempt per new session
        if !self.sink.connected() && self.sink.connect().await {
            log::info!("Motion sink reconnected for new session");
        }
    }

    /// Session lifecycle hook: clear all per-session state and ask the sink
    /// to do the same. Also invoked by the owning loop on teardown.
    pub async fn reset_session(&mut self) {
        self.state = SpeakingState::Idle;
        self.seen.reset();
        self.counters = FeedCounters::default();
        if let Err(e) = self.sink.reset().await {
            log::warn!("Failed to reset motion sink: {}", e);
        }
    }

    async fn on_outbound_audio(&mut self, data: &Bytes) {
        if self.state != SpeakingState::BotSpeaking || !self.sink.connected() {
            return;
        }
        self.counters.observed += 1;

        if !self.seen.insert(chunk_digest(data)) {
            // duplicate delivery, already driving the wobble
            return;
        }

        let audio_b64 = BASE64.encode(data);
        if let Err(e) = self.sink.feed_audio(audio_b64).await {
            log::warn!("Failed to feed motion sink: {}", e);
            return;
        }
        self.counters.forwarded += 1;
        if self.counters.forwarded <= 3 {
            log::debug!(
                "Fed audio chunk #{} ({} bytes)",
                self.counters.forwarded,
                data.len(),
            );
        }
    }

    async fn assume_listening_pose(&self) {
        if !self.sink.connected() {
            return;
        }
        if let Err(e) = self.sink.set_listening_pose().await {
            log::warn!("Failed to set listening pose: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{DIR_INBOUND, DIR_OUTBOUND, FRAME_KIND_AUDIO, FRAME_KIND_CONTROL};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, PartialEq)]
    enum SinkCall {
        Feed(String),
        ListeningPose,
        Reset,
    }

    /// Records every call; connectivity is switchable from the test.
    #[derive(Default)]
    struct RecordingSink {
        connected: AtomicBool,
        calls: Mutex<Vec<SinkCall>>,
        fail_calls: AtomicBool,
    }

    impl RecordingSink {
        fn connected_sink() -> Arc<Self> {
            let sink = Self::default();
            sink.connected.store(true, Ordering::Relaxed);
            Arc::new(sink)
        }

        fn disconnected_sink() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn failing_sink() -> Arc<Self> {
            let sink = Self::default();
            sink.connected.store(true, Ordering::Relaxed);
            sink.fail_calls.store(true, Ordering::Relaxed);
            Arc::new(sink)
        }

        fn calls(&self) -> Vec<SinkCall> {
            std::mem::take(&mut self.calls.lock().unwrap())
        }

        fn feeds(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    SinkCall::Feed(b64) => Some(b64.clone()),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: SinkCall) -> Result<()> {
            if self.fail_calls.load(Ordering::Relaxed) {
                anyhow::bail!("sink unhappy");
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl MotionSink for RecordingSink {
        fn connected(&self) -> bool {
            self.connected.load(Ordering::Relaxed)
        }

        async fn connect(&self) -> bool {
            // stays in whatever state the test configured
            self.connected()
        }

        async fn feed_audio(&self, audio_b64: String) -> Result<()> {
            self.record(SinkCall::Feed(audio_b64))
        }

        async fn set_listening_pose(&self) -> Result<()> {
            self.record(SinkCall::ListeningPose)
        }

        async fn reset(&self) -> Result<()> {
            self.record(SinkCall::Reset)
        }
    }

    fn control(json: &str) -> Vec<u8> {
        let mut d = vec![FRAME_KIND_CONTROL];
        d.extend_from_slice(json.as_bytes());
        d
    }

    fn outbound(payload: &[u8]) -> Vec<u8> {
        let mut d = vec![FRAME_KIND_AUDIO, DIR_OUTBOUND];
        d.extend_from_slice(payload);
        d
    }

    fn inbound(payload: &[u8]) -> Vec<u8> {
        let mut d = vec![FRAME_KIND_AUDIO, DIR_INBOUND];
        d.extend_from_slice(payload);
        d
    }

    fn tts_start() -> Vec<u8> {
        control(r#"{"type":"tts","state":"start"}"#)
    }

    fn tts_stop() -> Vec<u8> {
        control(r#"{"type":"tts","state":"stop"}"#)
    }

    fn vad_start() -> Vec<u8> {
        control(r#"{"type":"vad","state":"start"}"#)
    }

    fn session_start(sid: &str) -> Vec<u8> {
        control(&format!(
            r#"{{"type":"session","state":"start","session_id":"{}"}}"#,
            sid
        ))
    }

    async fn wobbler_with(
        sink: Arc<RecordingSink>,
    ) -> (Wobbler, mpsc::Receiver<Vec<u8>>, Arc<RecordingSink>) {
        let (out_tx, out_rx) = mpsc::channel(256);
        let wobbler = Wobbler::new(sink.clone(), out_tx).await;
        (wobbler, out_rx, sink)
    }

    async fn feed_all(wobbler: &mut Wobbler, datagrams: &[Vec<u8>]) {
        for d in datagrams {
            wobbler.handle_datagram(d.clone()).await;
        }
    }

    #[tokio::test]
    async fn duplicate_chunks_feed_once_per_turn() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::connected_sink()).await;

        // [start, A, A, B, stop, A] => exactly one feed each for A and B
        feed_all(
            &mut wobbler,
            &[
                tts_start(),
                outbound(b"AAAA"),
                outbound(b"AAAA"),
                outbound(b"BBBB"),
                tts_stop(),
                outbound(b"AAAA"),
            ],
        )
        .await;

        let calls = sink.calls();
        assert_eq!(
            calls,
            vec![
                SinkCall::Feed(BASE64.encode(b"AAAA")),
                SinkCall::Feed(BASE64.encode(b"BBBB")),
                SinkCall::ListeningPose,
            ]
        );
        assert_eq!(wobbler.counters().forwarded, 2);
        assert_eq!(wobbler.counters().observed, 3);
    }

    #[tokio::test]
    async fn turn_boundary_makes_chunks_eligible_again() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::connected_sink()).await;

        feed_all(
            &mut wobbler,
            &[
                tts_start(),
                outbound(b"AAAA"),
                tts_stop(),
                tts_start(),
                outbound(b"AAAA"),
            ],
        )
        .await;

        assert_eq!(sink.feeds().len(), 2);
    }

    #[tokio::test]
    async fn idle_suppression() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::connected_sink()).await;

        // novel chunks, but nobody is speaking
        feed_all(&mut wobbler, &[outbound(b"AAAA"), outbound(b"BBBB")]).await;
        assert!(sink.feeds().is_empty());
        assert_eq!(wobbler.state(), SpeakingState::Idle);
        assert_eq!(wobbler.counters().observed, 0);
    }

    #[tokio::test]
    async fn barge_in_interrupts_the_feed() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::connected_sink()).await;

        feed_all(
            &mut wobbler,
            &[
                tts_start(),
                outbound(b"AAAA"),
                vad_start(),
                outbound(b"BBBB"),
            ],
        )
        .await;

        assert_eq!(wobbler.state(), SpeakingState::Idle);
        let calls = sink.calls();
        assert_eq!(
            calls,
            vec![
                SinkCall::Feed(BASE64.encode(b"AAAA")),
                SinkCall::ListeningPose,
            ]
        );
    }

    #[tokio::test]
    async fn inbound_audio_never_feeds() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::connected_sink()).await;

        feed_all(&mut wobbler, &[tts_start(), inbound(b"mic"), tts_stop()]).await;
        assert!(sink.feeds().is_empty());
    }

    #[tokio::test]
    async fn empty_chunk_is_fed_once() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::connected_sink()).await;

        feed_all(
            &mut wobbler,
            &[tts_start(), outbound(b""), outbound(b"")],
        )
        .await;
        assert_eq!(sink.feeds(), vec![String::new()]);
    }

    #[tokio::test]
    async fn disconnected_sink_disables_feeding_and_posing() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::disconnected_sink()).await;

        feed_all(
            &mut wobbler,
            &[tts_start(), outbound(b"AAAA"), tts_stop(), vad_start()],
        )
        .await;

        // state machine still runs; the sink is simply left alone
        assert_eq!(wobbler.state(), SpeakingState::Idle);
        assert!(sink.calls().is_empty());
        assert_eq!(wobbler.counters().observed, 0);
    }

    #[tokio::test]
    async fn failing_sink_never_aborts_the_stream() {
        let (mut wobbler, mut out, sink) = wobbler_with(RecordingSink::failing_sink()).await;

        let datagrams = vec![
            tts_start(),
            outbound(b"AAAA"),
            outbound(b"BBBB"),
            tts_stop(),
            tts_start(),
            outbound(b"CCCC"),
            vad_start(),
        ];
        feed_all(&mut wobbler, &datagrams).await;

        // every call failed, nothing was recorded, nothing panicked
        assert!(sink.calls().is_empty());
        assert_eq!(wobbler.state(), SpeakingState::Idle);
        assert_eq!(wobbler.counters().forwarded, 0);

        // and the stream itself went through untouched
        for expected in &datagrams {
            assert_eq!(&out.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn every_datagram_passes_through_in_order() {
        let (mut wobbler, mut out, _sink) = wobbler_with(RecordingSink::connected_sink()).await;

        let datagrams = vec![
            session_start("s-1"),
            tts_start(),
            outbound(b"AAAA"),
            b"not a frame at all".to_vec(),
            inbound(b"mic"),
            control(r#"{"type":"stt","text":"hello"}"#),
            vec![FRAME_KIND_AUDIO], // truncated
            tts_stop(),
        ];
        feed_all(&mut wobbler, &datagrams).await;

        for expected in &datagrams {
            assert_eq!(&out.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn session_start_resets_everything() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::connected_sink()).await;

        feed_all(&mut wobbler, &[tts_start(), outbound(b"AAAA")]).await;
        assert_eq!(wobbler.state(), SpeakingState::BotSpeaking);
        assert_eq!(wobbler.counters().forwarded, 1);

        feed_all(&mut wobbler, &[session_start("s-2")]).await;
        assert_eq!(wobbler.state(), SpeakingState::Idle);
        assert_eq!(wobbler.counters().forwarded, 0);
        assert!(sink.calls().contains(&SinkCall::Reset));

        // same bytes are fresh in the new session
        feed_all(&mut wobbler, &[tts_start(), outbound(b"AAAA")]).await;
        assert_eq!(wobbler.counters().forwarded, 1);
    }

    #[tokio::test]
    async fn explicit_reset_hook_clears_state() {
        let (mut wobbler, _out, sink) = wobbler_with(RecordingSink::connected_sink()).await;

        feed_all(&mut wobbler, &[tts_start(), outbound(b"AAAA")]).await;
        wobbler.reset_session().await;

        assert_eq!(wobbler.state(), SpeakingState::Idle);
        assert_eq!(wobbler.counters().observed, 0);
        assert!(sink.calls().contains(&SinkCall::Reset));
    }
}
