//! 对话图终端宿主入口
//!
//! ```text
//! host-cli run [--config PATH] [--graph PATH] [--load SLOT]
//! host-cli check <GRAPH>...
//! host-cli saves list
//! host-cli saves clear <SLOT>
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use dialogue_runtime::{
    DiagnosticLevel, DiagnosticResult, DialogueDriver, DialogueGraph, GlobalStore,
    SessionPersistence,
};
use host_cli::config::DEFAULT_CONFIG_PATH;
use host_cli::{
    Console, ConfigOverrides, FileStorage, HostConfig, check_graph_file, load_graph, slot_key,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "host-cli", version, about = "对话图终端宿主")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 运行对话
    Run {
        /// 配置文件路径
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// 入口对话图（覆盖配置文件）
        #[arg(long)]
        graph: Option<PathBuf>,
        /// 从存档槽位继续
        #[arg(long)]
        load: Option<u32>,
        /// 存档目录（覆盖配置文件）
        #[arg(long)]
        saves_dir: Option<PathBuf>,
        /// 日志级别（覆盖配置文件）
        #[arg(long)]
        log_level: Option<String>,
    },
    /// 检查对话图
    Check {
        #[arg(required = true)]
        graphs: Vec<PathBuf>,
    },
    /// 存档管理
    Saves {
        /// 配置文件路径
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        #[command(subcommand)]
        action: SavesAction,
    },
}

#[derive(Subcommand)]
enum SavesAction {
    /// 列出存档
    List,
    /// 删除存档
    Clear { slot: u32 },
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("host-cli error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            config,
            graph,
            load,
            saves_dir,
            log_level,
        } => run(
            config,
            ConfigOverrides {
                graph_path: graph,
                saves_dir,
                log_level,
            },
            load,
        ),
        Command::Check { graphs } => {
            init_logging("info");
            check(&graphs)
        }
        Command::Saves { config, action } => {
            let config = load_config(&config, ConfigOverrides::default());
            saves(&config, action)
        }
    }
}

/// 初始化日志，`RUST_LOG` 优先于配置的默认级别
fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// 加载配置并初始化日志
///
/// 配置读取失败的警告要等日志初始化之后才能输出。
fn load_config(path: &Path, overrides: ConfigOverrides) -> HostConfig {
    let loaded = HostConfig::try_load(path);
    let mut config = loaded.clone().unwrap_or_default();
    config.apply_overrides(overrides);
    init_logging(&config.log_level);

    match loaded {
        Ok(_) => info!(path = ?path, "配置文件加载成功"),
        Err(e) => warn!(path = ?path, error = %e, "使用默认配置"),
    }
    config
}

fn run(config_path: PathBuf, overrides: ConfigOverrides, load: Option<u32>) -> anyhow::Result<()> {
    let config = load_config(&config_path, overrides);
    config.validate()?;

    if config.debug.graph_check {
        let result = check_graph_file(&config.graph_path)?;
        for diagnostic in result.filter_by_level(DiagnosticLevel::Warn) {
            warn!("{}", diagnostic);
        }
    }

    let graph: Rc<dyn DialogueGraph> = Rc::new(load_graph(&config.graph_path)?);
    let global = GlobalStore::new();
    let driver = DialogueDriver::new(Some(global.clone()));
    let persistence = SessionPersistence::new(FileStorage::new(&config.saves_dir));

    let mut console = Console::new(
        driver,
        graph,
        persistence,
        &config.effects,
        io::stdin().lock(),
        io::stdout(),
    );
    match load {
        Some(slot) => console.resume(slot)?,
        None => console.start()?,
    };
    console.run()?;

    debug!(globals = ?global.snapshot(), "退出");
    Ok(())
}

fn check(paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut total = DiagnosticResult::new();
    for path in paths {
        let result = check_graph_file(path)?;
        if result.is_empty() {
            println!("{}: 没有发现问题", path.display());
            continue;
        }
        for diagnostic in &result.diagnostics {
            println!("{}", diagnostic);
        }
        println!(
            "{}: {} 个错误，{} 个警告",
            path.display(),
            result.error_count(),
            result.warn_count()
        );
        total.merge(result);
    }

    if total.has_errors() {
        bail!(
            "检查未通过：共 {} 个错误，{} 个警告",
            total.error_count(),
            total.warn_count()
        );
    }
    Ok(())
}

fn saves(config: &HostConfig, action: SavesAction) -> anyhow::Result<()> {
    let mut persistence = SessionPersistence::new(FileStorage::new(&config.saves_dir));
    match action {
        SavesAction::List => {
            let slots = persistence.storage().list_slots();
            if slots.is_empty() {
                println!("没有存档");
            }
            for slot in slots {
                match persistence.load(&slot_key(slot)) {
                    Ok(session) => {
                        println!("[{:03}] {}#{}", slot, session.graph_id, session.node_id)
                    }
                    Err(e) => println!("[{:03}] 不可用: {}", slot, e),
                }
            }
        }
        SavesAction::Clear { slot } => {
            persistence.clear(&slot_key(slot))?;
            println!("已删除槽位 {}", slot);
        }
    }
    Ok(())
}
