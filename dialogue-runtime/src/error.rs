//! # Error 模块
//!
//! 定义 dialogue-runtime 中使用的错误类型。
//!
//! 条件求值与变量存储从不返回错误（未定义变量读取为零值）；
//! 只有节点查找失败、状态误用与持久化/存储失败会作为显式错误返回。

use thiserror::Error;

/// 对话驱动错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DialogueError {
    /// 跳转目标节点不存在（致命，会结束会话）
    #[error("节点 '{node_id}' 未找到")]
    NodeNotFound { node_id: String },

    /// 状态不匹配
    #[error("当前状态不允许此操作：期望 {expected}，实际 {actual}")]
    StateMismatch { expected: String, actual: String },
}

/// 底层存储错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// 读写失败
    #[error("存储键 '{key}' 读写失败: {message}")]
    Io { key: String, message: String },
}

/// 会话持久化错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// 槽位没有可用的存档（包括存档损坏或版本不兼容）
    #[error("存档槽位 '{slot}' 不存在")]
    NotFound { slot: String },

    /// 存储层失败
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// 序列化失败
    #[error("存档序列化失败: {0}")]
    Serialize(String),
}

/// 对话图加载错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// JSON 解析失败
    #[error("对话图解析失败: {message}")]
    Parse { message: String },

    /// 节点 ID 重复
    #[error("对话图 '{graph_id}' 中节点 '{node_id}' 重复定义")]
    DuplicateNode { graph_id: String, node_id: String },

    /// 入口节点不存在
    #[error("对话图 '{graph_id}' 的入口节点 '{entry}' 不存在")]
    MissingEntry { graph_id: String, entry: String },
}

/// dialogue-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// 对话驱动错误
    #[error("对话错误: {0}")]
    Dialogue(#[from] DialogueError),

    /// 持久化错误
    #[error("持久化错误: {0}")]
    Persistence(#[from] PersistenceError),

    /// 对话图错误
    #[error("对话图错误: {0}")]
    Graph(#[from] GraphError),
}

/// Result 类型别名
pub type RuntimeResult<T> = Result<T, RuntimeError>;
