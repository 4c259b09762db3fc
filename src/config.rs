#[derive(Debug, Clone)]
pub struct Config {
    // 管道桥配置
    pub pipe_local_port: u16,
    pub pipe_remote_ip: &'static str,
    pub pipe_remote_port: u16,
    pub pipe_buffer_size: usize,

    // 动作通道配置（静态部分）
    pub motion_mode: &'static str,
    pub motion_address: &'static str,
    pub motion_queue_size: usize,

    // 客户端标识（动态部分，可在运行时修改）
    pub motion_client_id: String,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取
    pub fn new() -> Result<Self, &'static str> {
        Ok(Self {
            // 管道桥配置
            pipe_local_port: env!("PIPE_LOCAL_PORT")
                .parse()
                .map_err(|_| "Failed to parse PIPE_LOCAL_PORT")?,
            pipe_remote_ip: env!("PIPE_REMOTE_IP"),
            pipe_remote_port: env!("PIPE_REMOTE_PORT")
                .parse()
                .map_err(|_| "Failed to parse PIPE_REMOTE_PORT")?,
            pipe_buffer_size: env!("PIPE_BUFFER_SIZE")
                .parse()
                .map_err(|_| "Failed to parse PIPE_BUFFER_SIZE")?,

            // 动作通道配置
            motion_mode: env!("MOTION_MODE"),
            motion_address: env!("MOTION_ADDRESS"),
            motion_queue_size: env!("MOTION_QUEUE_SIZE")
                .parse()
                .map_err(|_| "Failed to parse MOTION_QUEUE_SIZE")?,

            // 客户端标识初始化为config.toml中的值
            motion_client_id: env!("MOTION_CLIENT_ID").to_string(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new().expect("Failed to create default Config from build-time environment variables")
    }
}
