/// 说话状态，由 Wobbler 独占维护
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingState {
    /// 待机：不向动作通道喂音频
    Idle,
    /// 机器人正在播报合成语音
    BotSpeaking,
}
