//! # Dialogue Runtime
//!
//! 对话图解释器的核心运行时库。
//!
//! ## 架构概述
//!
//! `dialogue-runtime` 是纯逻辑核心，不依赖任何文件 IO 或渲染引擎。
//! 它通过 **指令 + 事件** 与宿主层（Host）通信：
//!
//! ```text
//! Host                                 Runtime
//!   │                                     │
//!   │──── start_dialogue / submit ──────►│  拉取节点指令
//!   │                                     │
//!   │◄─── Event（台词、选项、效果）───────│  EventBus
//!   │                                     │
//!   │──── complete_effect(id) ──────────►│  并行等待完成后继续
//!   │                                     │
//! ```
//!
//! ## 核心类型
//!
//! - [`DialogueDriver`]：会话状态机与指令拉取循环
//! - [`Instruction`]：节点向驱动器传达的控制流意图
//! - [`VariableStore`] / [`GlobalStore`]：局部与全局变量
//! - [`Condition`]：声明式条件
//! - [`ParallelWait`]：可强制完成的并行等待
//! - [`SessionPersistence`]：存档读写
//!
//! ## 使用示例
//!
//! ```ignore
//! use dialogue_runtime::{DialogueDriver, DriverState, GlobalStore, Graph};
//!
//! let global = GlobalStore::new();
//! let mut driver = DialogueDriver::new(Some(global.clone()));
//! let _sub = driver.events().subscribe_all(|event| host.present(event));
//!
//! driver.start_dialogue(Rc::new(Graph::from_json(text)?))?;
//! loop {
//!     match driver.state() {
//!         DriverState::AwaitingInput => driver.submit(read_input())?,
//!         DriverState::Running => driver.complete_effect(next_finished_effect())?,
//!         DriverState::Ended | DriverState::Idle => break,
//!     };
//! }
//! ```
//!
//! ## 模块结构
//!
//! - [`variables`]：变量存储
//! - [`condition`]：条件求值
//! - [`instruction`]：指令协议
//! - [`node`] / [`graph`]：节点与对话图
//! - [`event`]：事件与事件总线
//! - [`parallel`] / [`effect`]：并行等待与效果任务
//! - [`runtime`]：驱动器
//! - [`history`]：回看记录
//! - [`save`] / [`persistence`]：存档格式与读写
//! - [`diagnostic`]：对话图静态检查
//! - [`error`]：错误类型定义

pub mod condition;
pub mod diagnostic;
pub mod effect;
pub mod error;
pub mod event;
pub mod graph;
pub mod history;
pub mod input;
pub mod instruction;
pub mod node;
pub mod parallel;
pub mod persistence;
pub mod runtime;
pub mod save;
pub mod state;
pub mod variables;

// 重导出核心类型
pub use condition::{BoolCheck, ComparisonOp, Condition, IntCheck, Scopes, VariableLookup};
pub use diagnostic::{Diagnostic, DiagnosticLevel, DiagnosticResult, analyze_graph};
pub use effect::{EffectRegistry, EffectTask};
pub use error::{
    DialogueError, GraphError, PersistenceError, RuntimeError, RuntimeResult, StorageError,
};
pub use event::{
    AudioChannel, CharacterAction, ChoiceView, EffectId, EffectRequest, EndReason, Event,
    EventBus, EventKind, Position, Subscription,
};
pub use graph::{DialogueGraph, Graph, GraphData};
pub use history::{History, HistoryEvent};
pub use input::DialogueInput;
pub use instruction::{Instruction, InstructionStream, IterStream, Step};
pub use node::{Assignment, ChoiceOption, Node, NodeData, NodeKind, ScriptedNode, VarScope};
pub use parallel::{Completion, ParallelWait, WaitTask};
pub use persistence::{LoadedSession, MemoryStorage, SaveStorage, SessionPersistence};
pub use runtime::{DialogueDriver, NodeContext, NodeContextParts};
pub use save::{SaveError, SaveRecord, SaveVersion};
pub use state::DriverState;
pub use variables::{GlobalStore, VarType, VarValue, VariableStore};
