//! # Driver 模块
//!
//! 对话驱动器：拉取节点指令并维护会话状态机。
//!
//! ## 执行模型
//!
//! ```text
//! start_dialogue(graph) -> 进入入口节点，拉取到第一个挂起点
//! submit(input)         -> AwaitingInput -> Running，继续拉取同一个 stream
//! tick()                -> Running 时重新拉取（等待并行任务时使用）
//! complete_effect(id)   -> 回报效果完成，然后重新拉取
//! ```
//!
//! 每次调用都会一直拉取，直到进入 `AwaitingInput`、`Ended`，
//! 或者当前 stream 报告 `Pending`。

use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::error::DialogueError;
use crate::event::{EffectId, EndReason, Event, EventBus};
use crate::graph::DialogueGraph;
use crate::history::{History, HistoryEvent};
use crate::input::DialogueInput;
use crate::instruction::{Instruction, InstructionStream, Step};
use crate::runtime::context::NodeContextParts;
use crate::state::DriverState;
use crate::variables::{GlobalStore, VariableStore};

/// 对话驱动器
///
/// 一个驱动器同一时刻只运行一个会话；会话结束后可以用同一实例开始下一个。
///
/// # 使用示例
///
/// ```ignore
/// let global = GlobalStore::new();
/// let mut driver = DialogueDriver::new(Some(global.clone()));
/// let _sub = driver.events().subscribe_all(|event| println!("{event:?}"));
///
/// driver.start_dialogue(Rc::new(Graph::from_json(text)?))?;
/// while driver.state() == DriverState::AwaitingInput {
///     driver.continue_dialogue()?;
/// }
/// ```
pub struct DialogueDriver {
    state: DriverState,
    graph: Option<Rc<dyn DialogueGraph>>,
    stream: Option<Box<dyn InstructionStream>>,
    parts: NodeContextParts,
    last_error: Option<DialogueError>,
}

impl std::fmt::Debug for DialogueDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueDriver")
            .field("state", &self.state)
            .field("graph_id", &self.graph_id())
            .field("node_id", &self.current_node_id())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl DialogueDriver {
    /// 创建驱动器
    ///
    /// `global` 为 `None` 时条件只查 local。
    pub fn new(global: Option<GlobalStore>) -> Self {
        Self {
            state: DriverState::Idle,
            graph: None,
            stream: None,
            parts: NodeContextParts {
                global,
                ..Default::default()
            },
            last_error: None,
        }
    }

    //=========================================================================
    // 会话控制
    //=========================================================================

    /// 从入口节点开始新会话
    ///
    /// 局部变量在开始前清空。
    pub fn start_dialogue(
        &mut self,
        graph: Rc<dyn DialogueGraph>,
    ) -> Result<DriverState, DialogueError> {
        self.ensure_can_start()?;
        self.parts.local.clear();
        let entry = graph.entry_node_id().to_string();
        self.begin(graph, &entry)
    }

    /// 在指定节点开始会话，保留当前局部变量
    ///
    /// 用于读档：先 [`restore_local`](Self::restore_local)，再进入存档中的节点。
    pub fn enter_node(
        &mut self,
        graph: Rc<dyn DialogueGraph>,
        node_id: &str,
    ) -> Result<DriverState, DialogueError> {
        self.ensure_can_start()?;
        self.begin(graph, node_id)
    }

    /// 用读档得到的局部变量替换当前局部变量
    pub fn restore_local(&mut self, store: VariableStore) {
        debug!("恢复局部变量");
        self.parts.local = store;
    }

    /// 外部 continue 信号
    pub fn continue_dialogue(&mut self) -> Result<DriverState, DialogueError> {
        self.submit(DialogueInput::Continue)
    }

    /// 提交输入
    ///
    /// - `AwaitingInput`：恢复拉取，输入转交给当前节点
    /// - `Running`：忽略（例如正在等待效果）
    /// - `Idle` / `Ended`：状态不匹配
    pub fn submit(&mut self, input: DialogueInput) -> Result<DriverState, DialogueError> {
        match self.state {
            DriverState::AwaitingInput => {
                self.parts.input = Some(input);
                self.state = DriverState::Running;
                self.pump()?;
                Ok(self.state)
            }
            DriverState::Running => {
                debug!(input = ?input, "正在执行中，忽略输入");
                Ok(self.state)
            }
            state @ (DriverState::Idle | DriverState::Ended) => {
                Err(DialogueError::StateMismatch {
                    expected: DriverState::AwaitingInput.to_string(),
                    actual: state.to_string(),
                })
            }
        }
    }

    /// 重新拉取当前节点
    ///
    /// 只在 `Running` 下有效，其他状态为空操作。
    pub fn tick(&mut self) -> Result<DriverState, DialogueError> {
        if self.state == DriverState::Running {
            self.pump()?;
        }
        Ok(self.state)
    }

    /// Host 回报被跟踪的效果已完成
    ///
    /// 未知 ID（已取消、重复回报）被忽略。
    pub fn complete_effect(&mut self, id: EffectId) -> Result<DriverState, DialogueError> {
        if !self.parts.effects.finish(id) {
            debug!(effect_id = id, "忽略未知的效果回报");
            return Ok(self.state);
        }
        self.tick()
    }

    /// 玩家跳过：强制完成当前节点的并行等待
    pub fn skip(&mut self) -> Result<DriverState, DialogueError> {
        if let Some(stream) = self.stream.as_mut() {
            debug!(node_id = %self.parts.node_id, "跳过当前等待");
            stream.force_complete_waits();
        }
        self.tick()
    }

    /// 外部拆除会话
    ///
    /// 强制完成所有等待，清空局部变量。没有活动会话时为空操作。
    pub fn abort(&mut self) {
        if self.state.is_active() {
            info!(node_id = %self.parts.node_id, "中止对话");
            self.finish(EndReason::Aborted);
        }
    }

    //=========================================================================
    // 查询
    //=========================================================================

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// 当前节点 ID
    ///
    /// 正常结束后为 `None`；因错误结束时保留出错前所在的节点。
    pub fn current_node_id(&self) -> Option<&str> {
        if self.parts.node_id.is_empty() {
            None
        } else {
            Some(&self.parts.node_id)
        }
    }

    /// 当前图 ID（会话结束后为 `None`）
    pub fn graph_id(&self) -> Option<&str> {
        self.graph.as_ref().map(|g| g.graph_id())
    }

    pub fn local(&self) -> &VariableStore {
        &self.parts.local
    }

    pub fn global(&self) -> Option<&GlobalStore> {
        self.parts.global.as_ref()
    }

    /// 事件总线（订阅表现层事件）
    pub fn events(&self) -> &EventBus {
        &self.parts.events
    }

    pub fn history(&self) -> &History {
        &self.parts.history
    }

    /// 使会话失败结束的错误
    pub fn last_error(&self) -> Option<&DialogueError> {
        self.last_error.as_ref()
    }

    /// 等待 Host 回报的效果 ID
    pub fn pending_effects(&self) -> Vec<EffectId> {
        self.parts.effects.pending_ids()
    }

    //=========================================================================
    // 内部实现
    //=========================================================================

    fn ensure_can_start(&self) -> Result<(), DialogueError> {
        if self.state.can_start() {
            Ok(())
        } else {
            Err(DialogueError::StateMismatch {
                expected: format!("{} 或 {}", DriverState::Idle, DriverState::Ended),
                actual: self.state.to_string(),
            })
        }
    }

    fn begin(
        &mut self,
        graph: Rc<dyn DialogueGraph>,
        node_id: &str,
    ) -> Result<DriverState, DialogueError> {
        info!(graph_id = %graph.graph_id(), node_id = %node_id, "开始对话");
        self.last_error = None;
        self.parts.input = None;
        self.parts.node_id.clear();
        self.parts.events.publish(Event::SessionStarted {
            graph_id: graph.graph_id().to_string(),
            node_id: node_id.to_string(),
        });
        self.graph = Some(graph);
        self.state = DriverState::Running;

        if let Err(e) = self.enter(node_id) {
            self.fail(e.clone());
            return Err(e);
        }
        self.pump()?;
        Ok(self.state)
    }

    /// 切换到指定节点，开始新的节点调用
    fn enter(&mut self, node_id: &str) -> Result<(), DialogueError> {
        let graph = self.graph.clone().ok_or_else(|| DialogueError::StateMismatch {
            expected: DriverState::Running.to_string(),
            actual: self.state.to_string(),
        })?;
        let node = graph
            .node(node_id)
            .ok_or_else(|| DialogueError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;

        if let Some(mut previous) = self.stream.take() {
            previous.force_complete_waits();
        }

        debug!(node_id = %node_id, "进入节点");
        self.stream = Some(node.process());
        self.parts.node_id = node_id.to_string();
        self.parts.history.push(HistoryEvent::node_entered(node_id));
        Ok(())
    }

    /// 拉取指令直到挂起或结束
    fn pump(&mut self) -> Result<(), DialogueError> {
        while self.state == DriverState::Running {
            let Some(stream) = self.stream.as_mut() else {
                self.finish(EndReason::Finished);
                break;
            };

            let step = stream.resume(&mut self.parts.context());
            // 输入只对紧随其后的一次拉取可见
            self.parts.input = None;

            match step {
                Step::Yield(Instruction::AdvanceToNode { next_node_id }) => {
                    if let Err(e) = self.enter(&next_node_id) {
                        self.fail(e.clone());
                        return Err(e);
                    }
                }
                Step::Yield(Instruction::WaitForUserInput) => {
                    debug!(node_id = %self.parts.node_id, "等待输入");
                    self.state = DriverState::AwaitingInput;
                }
                Step::Yield(Instruction::EndDialogue) | Step::Done => {
                    self.finish(EndReason::Finished);
                }
                Step::Pending => break,
            }
        }
        Ok(())
    }

    /// 拆除当前节点调用
    fn teardown(&mut self) -> String {
        if let Some(mut stream) = self.stream.take() {
            stream.force_complete_waits();
        }
        self.state = DriverState::Ended;
        self.graph
            .take()
            .map(|g| g.graph_id().to_string())
            .unwrap_or_default()
    }

    /// 正常结束或中止：清空局部变量
    fn finish(&mut self, reason: EndReason) {
        let graph_id = self.teardown();
        self.parts.local.clear();
        self.parts.node_id.clear();
        info!(graph_id = %graph_id, reason = ?reason, "对话结束");
        self.announce_end(graph_id, reason);
    }

    /// 致命错误：保留局部变量和出错前的节点
    fn fail(&mut self, err: DialogueError) {
        let graph_id = self.teardown();
        error!(graph_id = %graph_id, node_id = %self.parts.node_id, error = %err, "对话因错误结束");
        self.last_error = Some(err);
        self.announce_end(graph_id, EndReason::Failed);
    }

    fn announce_end(&mut self, graph_id: String, reason: EndReason) {
        if !self.parts.effects.is_empty() {
            warn!(pending = ?self.parts.effects.pending_ids(), "会话结束时仍有未完成的效果");
        }
        self.parts.history.push(HistoryEvent::SessionEnded {
            graph_id: graph_id.clone(),
            reason,
        });
        self.parts
            .events
            .publish(Event::SessionEnded { graph_id, reason });
    }
}
