//! # State 模块
//!
//! 定义对话驱动器的状态机。
//!
//! ## 设计原则
//!
//! - 所有状态必须**显式建模**
//! - 所有状态必须**可序列化**
//! - 不允许隐式全局状态
//!
//! ## 状态转换
//!
//! ```text
//! Idle / Ended   --start_dialogue-->  Running
//! Running        --AdvanceToNode-->   Running（同一 tick 进入下一节点）
//! Running        --WaitForUserInput-> AwaitingInput
//! AwaitingInput  --continue/submit--> Running
//! Running        --EndDialogue-->     Ended（清空局部变量）
//! Running        --NodeNotFound-->    Ended（保留局部变量）
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// 驱动器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DriverState {
    /// 没有活动的对话图
    #[default]
    Idle,
    /// 正在拉取指令（或等待并行任务完成）
    Running,
    /// 挂起，等待外部 continue 信号
    AwaitingInput,
    /// 终态，图状态已丢弃
    Ended,
}

impl DriverState {
    /// 是否存在活动会话
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::AwaitingInput)
    }

    /// 是否可以开始新会话
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Ended)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::AwaitingInput => "AwaitingInput",
            Self::Ended => "Ended",
        }
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(DriverState::Idle.can_start());
        assert!(DriverState::Ended.can_start());
        assert!(!DriverState::Running.can_start());
        assert!(!DriverState::AwaitingInput.can_start());

        assert!(DriverState::Running.is_active());
        assert!(DriverState::AwaitingInput.is_active());
        assert!(!DriverState::Idle.is_active());
        assert_eq!(DriverState::default(), DriverState::Idle);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DriverState::AwaitingInput.to_string(), "AwaitingInput");
    }
}
