//! # Config 模块
//!
//! 宿主配置管理，集中管理所有配置项。
//!
//! ## 配置优先级
//!
//! 1. 命令行参数（最高）
//! 2. 配置文件 (config.json)
//! 3. 默认值（最低）

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// 模拟效果时长的上限（秒）
pub const MAX_SIMULATED_SECS_LIMIT: f32 = 60.0;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// 宿主配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// **入口对话图文件**
    ///
    /// 必须配置（配置文件或 `--graph`），否则 `validate` 失败。
    #[serde(default)]
    pub graph_path: PathBuf,

    /// 存档目录
    #[serde(default = "default_saves_dir")]
    pub saves_dir: PathBuf,

    /// 默认日志级别，`RUST_LOG` 优先
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 效果模拟配置
    #[serde(default)]
    pub effects: EffectsConfig,

    /// 调试配置
    #[serde(default)]
    pub debug: DebugConfig,
}

/// 效果模拟配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectsConfig {
    /// 是否按效果时长实际等待
    #[serde(default)]
    pub simulate_durations: bool,

    /// 单个效果最长等待秒数
    #[serde(default = "default_max_simulated_secs")]
    pub max_simulated_secs: f32,
}

/// 调试配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugConfig {
    /// 启动时是否检查对话图
    ///
    /// - debug build 默认开启（见 `default_graph_check()`）
    /// - release build 默认关闭，可在 `config.json` 显式设置
    /// - 检查结果只输出诊断，不阻塞启动
    #[serde(default = "default_graph_check")]
    pub graph_check: bool,
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub graph_path: Option<PathBuf>,
    pub saves_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

// 默认值函数
fn default_saves_dir() -> PathBuf {
    PathBuf::from("saves")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_simulated_secs() -> f32 {
    2.0
}

fn default_graph_check() -> bool {
    cfg!(debug_assertions)
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            graph_path: PathBuf::new(),
            saves_dir: default_saves_dir(),
            log_level: default_log_level(),
            effects: EffectsConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            simulate_durations: false,
            max_simulated_secs: default_max_simulated_secs(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            graph_check: default_graph_check(),
        }
    }
}

impl HostConfig {
    /// 读取配置文件
    ///
    /// 失败时返回错误而不是回退到默认配置，调用方在日志初始化之后再报告。
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 应用命令行覆盖项
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(graph_path) = overrides.graph_path {
            self.graph_path = graph_path;
        }
        if let Some(saves_dir) = overrides.saves_dir {
            self.saves_dir = saves_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        // **必须配置入口对话图**
        if self.graph_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "必须配置 graph_path（入口对话图路径）".to_string(),
            ));
        }

        if !self.graph_path.exists() {
            return Err(ConfigError::ValidationFailed(format!(
                "入口对话图不存在: {:?}",
                self.graph_path
            )));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "未知的日志级别: {}",
                self.log_level
            )));
        }

        let secs = self.effects.max_simulated_secs;
        if !secs.is_finite() || !(0.0..=MAX_SIMULATED_SECS_LIMIT).contains(&secs) {
            return Err(ConfigError::ValidationFailed(format!(
                "max_simulated_secs 必须在 0 - {} 之间",
                MAX_SIMULATED_SECS_LIMIT
            )));
        }

        Ok(())
    }
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 配置文件不存在
    #[error("配置文件不存在: {0:?}")]
    NotFound(PathBuf),
    /// 解析失败
    #[error("配置文件解析失败: {0}")]
    Parse(String),
    /// IO 错误
    #[error("配置 IO 错误: {0}")]
    Io(String),
    /// 验证失败
    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
}
