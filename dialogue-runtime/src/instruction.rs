//! # Instruction 模块
//!
//! 节点向驱动器传达控制流意图的指令协议。
//!
//! ## 执行模型
//!
//! 节点每次被进入时产生一个 [`InstructionStream`]（拉取式生成器）。
//! 驱动器一次拉取一步，只有拉取之间才可能挂起：
//!
//! ```text
//! resume(ctx) -> Yield(AdvanceToNode)   立即切换节点（同一 tick）
//!             -> Yield(WaitForUserInput) 挂起，等待 continue
//!             -> Yield(EndDialogue)      结束会话
//!             -> Pending                 等待并行任务，驱动器保持 Running
//!             -> Done                    生成器耗尽，视为 EndDialogue
//! ```
//!
//! 同一个 stream 在整个节点调用期间存活，恢复时从上次停下的位置继续，不会重新开始。

use serde::{Deserialize, Serialize};

use crate::runtime::NodeContext;

/// 控制指令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// 跳转到指定节点
    AdvanceToNode { next_node_id: String },
    /// 挂起，等待外部 continue 信号
    WaitForUserInput,
    /// 结束对话
    EndDialogue,
}

impl Instruction {
    /// 创建跳转指令
    pub fn advance(next_node_id: impl Into<String>) -> Self {
        Self::AdvanceToNode {
            next_node_id: next_node_id.into(),
        }
    }

    /// 创建等待输入指令
    pub fn wait() -> Self {
        Self::WaitForUserInput
    }

    /// 创建结束指令
    pub fn end() -> Self {
        Self::EndDialogue
    }
}

/// 单步拉取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// 产出一条指令
    Yield(Instruction),
    /// 暂无指令（例如并行等待尚未完成），稍后再拉取
    Pending,
    /// 生成器已耗尽
    Done,
}

/// 节点调用的指令生成器
///
/// 每种节点实现自己的显式状态机；简单情况可以用 [`IterStream`]。
pub trait InstructionStream {
    /// 推进一步
    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Step;

    /// 强制完成当前持有的所有并行等待
    ///
    /// 玩家跳过或会话被拆除时调用。默认无操作。
    fn force_complete_waits(&mut self) {}
}

/// 把任意指令迭代器适配为 [`InstructionStream`]
///
/// 迭代器耗尽时返回 [`Step::Done`]。
pub struct IterStream<I> {
    iter: I,
}

impl<I> IterStream<I>
where
    I: Iterator<Item = Instruction>,
{
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
        }
    }
}

impl<I> InstructionStream for IterStream<I>
where
    I: Iterator<Item = Instruction>,
{
    fn resume(&mut self, _ctx: &mut NodeContext<'_>) -> Step {
        match self.iter.next() {
            Some(instruction) => Step::Yield(instruction),
            None => Step::Done,
        }
    }
}

/// 从指令列表创建 stream
pub fn from_instructions(instructions: Vec<Instruction>) -> Box<dyn InstructionStream> {
    Box::new(IterStream::new(instructions))
}
