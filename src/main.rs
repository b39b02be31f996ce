use clap::{Parser, Subcommand};
use enum_rank::query::{EnumRanker, QueryServer};
use enum_rank::storage::EnumerationSource;
use enum_rank::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "enum-rank")]
#[command(about = "Hot-reloadable enumeration ordering for document ranking")]
struct Cli {
    /// 配置文件路径（默认 ~/.config/enum-rank/config.toml）
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// 启动 HTTP 打分服务（默认）
    Serve {
        /// 覆盖配置中的监听地址
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// 加载一次数据源并打印报告
    Check,
    /// 对若干字段值求值
    Eval {
        field: String,
        /// 0 = EVALUATE, 1 = RELOAD_THEN_EVALUATE, 2 = RELOAD_ONLY
        #[arg(long, default_value_t = 0)]
        op: i64,
        values: Vec<String>,
    },
}

fn open_ranker(config: &Config) -> anyhow::Result<EnumRanker> {
    let source: Arc<dyn EnumerationSource> = Arc::new(config.source.clone());
    let ranker = EnumRanker::open(source, config.policy())?
        .with_absent_mode(config.absent_mode)
        .with_reload_prefix(config.reload_prefix.clone());
    Ok(ranker)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(Config::default_path)
        .ok_or_else(|| anyhow::anyhow!("no config path given and no config directory found"))?;
    let config = Config::load(&config_path)?;

    // 初始加载可能走网络（阻塞客户端），不在 async 上下文里直接调用
    let ranker = {
        let config = config.clone();
        Arc::new(tokio::task::spawn_blocking(move || open_ranker(&config)).await??)
    };

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            info!("{}", ranker.report());
            let addr = bind.unwrap_or(config.server.bind);
            let server = QueryServer::new(ranker.clone());
            let handle = tokio::spawn(server.run(addr));

            info!("enum-rank ready. Score via: POST http://{}/score", addr);

            tokio::select! {
                res = handle => res??,
                _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
            }
        }
        Command::Check => {
            println!("{}", ranker.report());
        }
        Command::Eval { field, op, values } => {
            let evaluator = tokio::task::spawn_blocking({
                let ranker = ranker.clone();
                move || ranker.parse(&field, Some(&op.to_string()))
            })
            .await??;
            println!("{}", evaluator.description());
            for v in &values {
                println!("{}\t{}", v, evaluator.value_for(Some(v)));
            }
        }
    }

    Ok(())
}
