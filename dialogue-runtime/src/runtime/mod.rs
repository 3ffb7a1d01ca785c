//! # Runtime 模块
//!
//! 对话执行核心，负责拉取节点指令和管理会话状态。
//!
//! ## 模块结构
//!
//! - [`driver`]：会话状态机与指令拉取循环
//! - [`context`]：节点每次被拉取时看到的执行上下文

pub mod context;
pub mod driver;

pub use context::{NodeContext, NodeContextParts};
pub use driver::DialogueDriver;
