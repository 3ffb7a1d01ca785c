//! # Host CLI
//!
//! 对话运行时的终端宿主。
//!
//! ## 架构说明
//!
//! Host 层负责：
//! - 配置加载与日志初始化
//! - 对话图文件读取与启动检查
//! - 基于文件的存档存储
//! - 效果模拟（记录日志并回报完成）
//! - 终端输入输出
//!
//! Host 层不包含对话逻辑，只负责呈现 Runtime 发出的事件并把玩家输入转交给驱动器。

pub mod config;
pub mod console;
pub mod effects;
pub mod save_storage;

use std::fs;
use std::path::Path;

use anyhow::Context;
use dialogue_runtime::{DiagnosticResult, Graph, GraphData, analyze_graph};

pub use config::{ConfigError, ConfigOverrides, DebugConfig, EffectsConfig, HostConfig};
pub use console::{Console, ConsoleCommand, Flow};
pub use effects::EffectSimulator;
pub use save_storage::{FileStorage, slot_key};

/// 读取对话图文件
pub fn read_graph_data(path: impl AsRef<Path>) -> anyhow::Result<GraphData> {
    let path = path.as_ref();
    let text =
        fs::read_to_string(path).with_context(|| format!("无法读取对话图文件: {:?}", path))?;
    GraphData::from_json(&text).with_context(|| format!("对话图解析失败: {:?}", path))
}

/// 读取并检查对话图文件
pub fn check_graph_file(path: impl AsRef<Path>) -> anyhow::Result<DiagnosticResult> {
    Ok(analyze_graph(&read_graph_data(path)?))
}

/// 读取并构建可执行的对话图
pub fn load_graph(path: impl AsRef<Path>) -> anyhow::Result<Graph> {
    let path = path.as_ref();
    Graph::from_data(read_graph_data(path)?)
        .with_context(|| format!("对话图无效: {:?}", path))
}
