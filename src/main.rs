mod config;
mod dedup;
mod frames;
mod motion;
mod pipe_bridge;
mod state_machine;
mod wobbler;

use config::Config;
use pipe_bridge::PipeBridge;
use tokio::signal;
use tokio::sync::mpsc;
use uuid::Uuid;
use wobbler::Wobbler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let mut config = Config::new().unwrap_or_default();

    // 客户端id的处理：auto 则在启动时生成
    if config.motion_client_id == "auto" {
        config.motion_client_id = Uuid::new_v4().to_string();
        log::info!("Generated motion client id: {}", config.motion_client_id);
    }

    log::info!("{} v{} starting", env!("APP_NAME"), env!("APP_VERSION"));

    // 创建通道，用于组件间通信
    // 上游帧通道：管道桥 -> 主循环
    let (tx_frame, mut rx_frame) = mpsc::channel::<Vec<u8>>(100);

    // 下游转发通道：Wobbler -> 管道桥
    let (tx_out, rx_out) = mpsc::channel::<Vec<u8>>(100);

    // 创建动作通道（TCP守护进程或仿真），Wobbler构造时尝试连接一次
    let sink = motion::create_sink(&config)?;
    let mut wobbler = Wobbler::new(sink, tx_out).await;

    // 启动管道桥，与上下游管道进程通信
    let bridge = PipeBridge::new(
        &format!("0.0.0.0:{}", config.pipe_local_port),
        format!("{}:{}", config.pipe_remote_ip, config.pipe_remote_port),
        config.pipe_buffer_size,
        tx_frame,
    )
    .await?;
    tokio::spawn(async move {
        if let Err(e) = bridge.run(rx_out).await {
            log::error!("PipeBridge error: {}", e);
        }
    });

    log::info!(
        "Wobble core started, tapping pipeline frames on udp port {}",
        config.pipe_local_port
    );

    // 主事件循环：按到达顺序逐帧处理，Wobbler观察后原样转发
    loop {
        tokio::select! {
            // 监听 Ctrl+C 信号
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                wobbler.reset_session().await;
                break;
            }

            frame = rx_frame.recv() => {
                match frame {
                    Some(raw) => wobbler.handle_datagram(raw).await,
                    None => break,
                }
            }
        }
    }
    Ok(())
}
