//! # Save 模块
//!
//! 会话存档记录的数据模型。
//!
//! ## 设计原则
//!
//! - 存档数据必须可序列化（JSON）
//! - 必须有版本号，支持向后兼容检测
//! - 只包含恢复会话所需的信息：图 ID、节点 ID、局部变量
//!
//! ## 兼容性
//!
//! 字符串变量**不**写入存档。已有的存档槽位格式依赖这一点，
//! 需要持久化字符串时应升级 MAJOR 版本。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::variables::VariableStore;

/// 存档格式版本
///
/// 版本号含义：
/// - MAJOR: 不兼容的格式变更
/// - MINOR: 向后兼容的新字段
pub const SAVE_VERSION_MAJOR: u32 = 1;
pub const SAVE_VERSION_MINOR: u32 = 0;

/// 存档版本信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveVersion {
    pub major: u32,
    pub minor: u32,
}

impl SaveVersion {
    /// 当前版本
    pub fn current() -> Self {
        Self {
            major: SAVE_VERSION_MAJOR,
            minor: SAVE_VERSION_MINOR,
        }
    }

    /// 检查是否兼容
    ///
    /// 兼容规则：
    /// - major 必须相同
    /// - minor 可以不同（向后兼容）
    pub fn is_compatible(&self) -> bool {
        self.major == SAVE_VERSION_MAJOR
    }
}

impl Default for SaveVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Display for SaveVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// 存档记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRecord {
    /// 存档格式版本
    pub version: SaveVersion,
    pub graph_id: String,
    pub node_id: String,
    /// 整数局部变量（按名称排序）
    #[serde(default)]
    pub int_vars: Vec<(String, i64)>,
    /// 布尔局部变量（按名称排序）
    #[serde(default)]
    pub bool_vars: Vec<(String, bool)>,
}

impl SaveRecord {
    /// 从局部变量捕获存档
    pub fn capture(
        graph_id: impl Into<String>,
        node_id: impl Into<String>,
        local: &VariableStore,
    ) -> Self {
        Self {
            version: SaveVersion::current(),
            graph_id: graph_id.into(),
            node_id: node_id.into(),
            int_vars: local.export_int(),
            bool_vars: local.export_bool(),
        }
    }

    /// 重建一份全新的局部变量
    pub fn restore_local(&self) -> VariableStore {
        let mut store = VariableStore::new();
        store.import_int(self.int_vars.iter().cloned());
        store.import_bool(self.bool_vars.iter().cloned());
        store
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String, SaveError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SaveError::SerializationFailed(e.to_string()))
    }

    /// 从 JSON 字符串反序列化
    pub fn from_json(json: &str) -> Result<Self, SaveError> {
        let record: SaveRecord = serde_json::from_str(json)
            .map_err(|e| SaveError::DeserializationFailed(e.to_string()))?;

        // 检查版本兼容性
        if !record.version.is_compatible() {
            return Err(SaveError::IncompatibleVersion {
                save_version: record.version.to_string(),
                current_version: SaveVersion::current().to_string(),
            });
        }

        Ok(record)
    }
}

/// 存档编解码错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaveError {
    /// 序列化失败
    #[error("序列化失败: {0}")]
    SerializationFailed(String),
    /// 反序列化失败
    #[error("反序列化失败: {0}")]
    DeserializationFailed(String),
    /// 版本不兼容
    #[error("存档版本不兼容: 存档版本 {save_version} vs 当前版本 {current_version}")]
    IncompatibleVersion {
        save_version: String,
        current_version: String,
    },
}
