//! smith-tap 命令行入口
//!
//! 命令：
//! - `init`     写出配置文件（缺省字段补全为默认值）
//! - `serve`    启动转发服务（已安装拦截器）
//! - `set-key`  校验并保存凭据
//! - `show-key` 查看当前凭据（脱敏）
//! - `check`    发送测试 trace 验证收集端

use std::sync::Arc;

use clap::{Parser, Subcommand};

use smith_tap::credential::store_credential;
use smith_tap::intercept::{self, credential_provider};
use smith_tap::model::config::Config;
use smith_tap::server;
use smith_tap::trace::TraceDispatcher;

#[derive(Parser)]
#[command(name = "smith-tap", about = "chat-completion 调用追踪垫片", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long, global = true, default_value = Config::default_config_path())]
    config: String,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 写出配置文件，缺省字段补全为默认值
    Init {
        /// 覆盖已存在的配置文件
        #[arg(long)]
        force: bool,
    },

    /// 启动转发服务
    Serve {
        /// 覆盖监听端口
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 保存凭据（需要 lsv2_ 前缀）
    SetKey {
        key: String,
    },

    /// 查看当前凭据（脱敏）
    ShowKey,

    /// 发送测试 trace
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = Config::load(&cli.config)?;
    let credentials = credential_provider(&config);

    match cli.command {
        Commands::Init { force } => {
            if config.config_path().is_some_and(|path| path.exists()) && !force {
                anyhow::bail!("配置文件已存在: {}（使用 --force 覆盖）", cli.config);
            }
            config.save()?;
            println!("✓ 配置文件已写入 {}", cli.config);
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let call = intercept::install(&config, credentials)?;
            server::serve(&config.host, port, config.upstream_base_url.clone(), Arc::new(call))
                .await?;
        }
        Commands::SetKey { key } => {
            store_credential(credentials.as_ref(), key.trim())?;
            println!("✓ 凭据已保存");
        }
        Commands::ShowKey => {
            let credential = credentials.get();
            if credential.is_empty() {
                println!("未配置凭据");
            } else {
                println!("{} (指纹 {})", credential.masked(), credential.fingerprint());
            }
        }
        Commands::Check => {
            let dispatcher = TraceDispatcher::new(
                config.collector_url.clone(),
                config.proxy_url.as_deref(),
                config.collector_timeout_secs,
                config.tls_backend,
            )?;
            dispatcher.send_test(&credentials.get()).await?;
            println!("✓ 测试 trace 已发送到 {}", dispatcher.endpoint());
        }
    }

    Ok(())
}
