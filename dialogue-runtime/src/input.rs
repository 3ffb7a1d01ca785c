//! # Input 模块
//!
//! 定义 Host 向 Runtime 传递的输入事件。
//!
//! ## 设计说明
//!
//! - `DialogueInput` 是 Host 采集用户操作后传递给驱动器的抽象输入
//! - Runtime 不直接处理鼠标/键盘事件，只处理语义化的输入
//! - 只有在 `AwaitingInput` 状态下输入才会被消费；恢复执行的节点可以通过
//!   [`NodeContext::take_input`](crate::runtime::NodeContext::take_input) 读取它

use serde::{Deserialize, Serialize};

/// Host 向 Runtime 传递的输入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogueInput {
    /// 单纯的"继续"信号
    Continue,

    /// 玩家选择了某个选项
    ///
    /// `index` 是可见选项中的序号（从 0 开始）
    ChoiceSelected { index: usize },
}

impl DialogueInput {
    /// 创建选择输入
    pub fn choice(index: usize) -> Self {
        Self::ChoiceSelected { index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_creation() {
        assert_eq!(
            DialogueInput::choice(2),
            DialogueInput::ChoiceSelected { index: 2 }
        );
    }

    #[test]
    fn test_input_serialization() {
        let input = DialogueInput::ChoiceSelected { index: 1 };
        let json = serde_json::to_string(&input).unwrap();
        let deserialized: DialogueInput = serde_json::from_str(&json).unwrap();
        assert_eq!(input, deserialized);
    }
}
