use clap::Parser;
use flexi_logger::Logger;
use log::info;
use sparrow_mqtt::{Broker, Config};

/// 单节点 mqtt broker
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// 配置文件路径
    #[clap(short, long, default_value = "./standalone.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 日志级别由 RUST_LOG 指定，默认 info
    let _logger = Logger::try_with_env_or_str("info")?.start()?;

    // 获取配置
    let cfg = Config::from_path(&args.config).await?;
    info!("broker listen on {}", cfg.broker.client_addr);

    // 启动 broker
    Broker::new(cfg).start().await?;
    Ok(())
}
