use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize)]
struct Config {
    application: Application,
    pipeline: Pipeline,
    motion: Motion,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Pipeline {
    local_port: u16,
    remote_ip: String,
    remote_port: u16,
    buffer_size: usize,
}

#[derive(Deserialize)]
struct Motion {
    mode: String,
    address: String,
    client_id: String,
    queue_size: usize,
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    // 应用信息
    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 管道桥配置
    println!("cargo:rustc-env=PIPE_LOCAL_PORT={}", config.pipeline.local_port);
    println!("cargo:rustc-env=PIPE_REMOTE_IP={}", config.pipeline.remote_ip);
    println!("cargo:rustc-env=PIPE_REMOTE_PORT={}", config.pipeline.remote_port);
    println!("cargo:rustc-env=PIPE_BUFFER_SIZE={}", config.pipeline.buffer_size);

    // 动作通道配置
    println!("cargo:rustc-env=MOTION_MODE={}", config.motion.mode);
    println!("cargo:rustc-env=MOTION_ADDRESS={}", config.motion.address);
    println!("cargo:rustc-env=MOTION_CLIENT_ID={}", config.motion.client_id);
    println!("cargo:rustc-env=MOTION_QUEUE_SIZE={}", config.motion.queue_size);
}
