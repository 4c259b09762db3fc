use anyhow::Result;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

// 管道桥：上游合成进程通过本地UDP发帧进来，处理后原样转发给下游传输进程
pub struct PipeBridge {
    socket: Arc<UdpSocket>,
    target_addr: String,
    tx: mpsc::Sender<Vec<u8>>,
    buffer_size: usize,
}

impl PipeBridge {
    pub async fn new(
        local_addr: &str,
        target_addr: String,
        buffer_size: usize,
        tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<Self> {
        // 绑定本地UDP端口
        let socket = UdpSocket::bind(local_addr).await?;

        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            tx,
            buffer_size,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn run(&self, mut rx_out: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            tokio::select! {
                // 接收上游管道帧
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, _) = recv?;
                    if len > 0 {
                        if let Err(e) = self.tx.send(buf[..len].to_vec()).await {
                            log::error!("Failed to queue pipeline frame: {}", e);
                            break;
                        }
                    }
                }
                // 转发队列按序发往下游
                out = rx_out.recv() => {
                    match out {
                        Some(raw) => {
                            self.socket.send_to(&raw, &self.target_addr).await?;
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }
}
