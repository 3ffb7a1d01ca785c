//! # Node 模块
//!
//! 节点接口与内置节点类型。
//!
//! ## 设计原则
//!
//! - 驱动器只认识 [`Node`] 这一个能力：每次进入节点时产生一个新的 [`InstructionStream`]
//! - 新增节点类型只需实现 [`Node`]，不需要修改驱动器
//! - 内置节点由数据（[`NodeData`]）描述，每种节点的生成器是一个显式状态机
//!
//! ## 内置节点
//!
//! | type | 行为 |
//! |------|------|
//! | `line` | 显示台词，等待 continue，然后跳转到 `next`（缺省则结束） |
//! | `choice` | 按条件过滤选项并呈现，等待选择，跳转到选中项的 `target` |
//! | `branch` | 条件成立跳转 `then`，否则跳转 `else`（缺省则结束） |
//! | `set` | 修改 local/global 变量后跳转 |
//! | `effects` | 发出效果请求；`wait` 为真时用并行等待等全部完成 |
//! | `end` | 结束对话 |

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::condition::Condition;
use crate::event::{ChoiceView, EffectRequest, Event};
use crate::history::HistoryEvent;
use crate::input::DialogueInput;
use crate::instruction::{Instruction, InstructionStream, Step, from_instructions};
use crate::parallel::{ParallelWait, WaitTask};
use crate::runtime::NodeContext;
use crate::variables::{VarValue, VariableStore};

/// 对话图中的节点
pub trait Node {
    /// 节点 ID（图内唯一）
    fn id(&self) -> &str;

    /// 开始一次节点调用
    ///
    /// 每次进入节点都会调用一次，返回的 stream 在整个调用期间存活。
    fn process(&self) -> Box<dyn InstructionStream>;
}

/// 按固定指令序列执行的节点
///
/// 适合测试和程序化构造的图。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedNode {
    id: String,
    instructions: Vec<Instruction>,
}

impl ScriptedNode {
    pub fn new(id: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        Self {
            id: id.into(),
            instructions,
        }
    }
}

impl Node for ScriptedNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self) -> Box<dyn InstructionStream> {
        from_instructions(self.instructions.clone())
    }
}

//=============================================================================
// 节点数据
//=============================================================================

/// 变量作用域
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarScope {
    #[default]
    Local,
    Global,
}

/// `set` 节点中的一条赋值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Assignment {
    /// 直接赋值
    Set {
        name: String,
        value: VarValue,
        #[serde(default)]
        scope: VarScope,
    },
    /// 整数加减
    Add {
        name: String,
        delta: i64,
        #[serde(default)]
        scope: VarScope,
    },
    /// 布尔取反
    Toggle {
        name: String,
        #[serde(default)]
        scope: VarScope,
    },
}

impl Assignment {
    pub fn scope(&self) -> VarScope {
        match self {
            Self::Set { scope, .. } | Self::Add { scope, .. } | Self::Toggle { scope, .. } => {
                *scope
            }
        }
    }

    /// 应用到指定存储
    pub fn apply(&self, store: &mut VariableStore) {
        match self {
            Self::Set { name, value, .. } => store.set_value(name.clone(), value.clone()),
            Self::Add { name, delta, .. } => store.add_int(name, *delta),
            Self::Toggle { name, .. } => store.toggle_bool(name),
        }
    }
}

/// 选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub text: String,
    /// 选中后跳转的节点
    pub target: String,
    /// 显示条件（缺省恒为真）
    #[serde(default, skip_serializing_if = "Condition::is_empty")]
    pub condition: Condition,
}

/// 内置节点类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Line {
        #[serde(default)]
        speaker: Option<String>,
        text: String,
        #[serde(default)]
        next: Option<String>,
    },
    Choice {
        #[serde(default)]
        prompt: Option<String>,
        options: Vec<ChoiceOption>,
    },
    Branch {
        condition: Condition,
        then: String,
        #[serde(default, rename = "else")]
        otherwise: Option<String>,
    },
    Set {
        assignments: Vec<Assignment>,
        #[serde(default)]
        next: Option<String>,
    },
    Effects {
        effects: Vec<EffectRequest>,
        /// 是否等待全部效果完成
        #[serde(default)]
        wait: bool,
        #[serde(default)]
        next: Option<String>,
    },
    End,
}

impl NodeKind {
    /// 该节点可能跳转到的全部节点
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Line { next, .. } | Self::Set { next, .. } | Self::Effects { next, .. } => {
                next.iter().map(String::as_str).collect()
            }
            Self::Choice { options, .. } => options.iter().map(|o| o.target.as_str()).collect(),
            Self::Branch {
                then, otherwise, ..
            } => std::iter::once(then.as_str())
                .chain(otherwise.as_deref())
                .collect(),
            Self::End => Vec::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Line { .. } => "line",
            Self::Choice { .. } => "choice",
            Self::Branch { .. } => "branch",
            Self::Set { .. } => "set",
            Self::Effects { .. } => "effects",
            Self::End => "end",
        }
    }
}

/// 数据描述的节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl NodeData {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

impl Node for NodeData {
    fn id(&self) -> &str {
        &self.id
    }

    fn process(&self) -> Box<dyn InstructionStream> {
        match &self.kind {
            NodeKind::Line {
                speaker,
                text,
                next,
            } => Box::new(LineStream {
                speaker: speaker.clone(),
                text: text.clone(),
                next: next.clone(),
                stage: LineStage::Show,
            }),
            NodeKind::Choice { prompt, options } => Box::new(ChoiceStream {
                prompt: prompt.clone(),
                options: options.clone(),
                stage: ChoiceStage::Present,
            }),
            NodeKind::Branch {
                condition,
                then,
                otherwise,
            } => Box::new(BranchStream {
                condition: condition.clone(),
                then: then.clone(),
                otherwise: otherwise.clone(),
                done: false,
            }),
            NodeKind::Set { assignments, next } => Box::new(SetStream {
                assignments: assignments.clone(),
                next: next.clone(),
                done: false,
            }),
            NodeKind::Effects {
                effects,
                wait,
                next,
            } => Box::new(EffectsStream {
                effects: effects.clone(),
                wait: *wait,
                next: next.clone(),
                stage: EffectsStage::Start,
            }),
            NodeKind::End => from_instructions(vec![Instruction::end()]),
        }
    }
}

/// 跳转到 `next`，没有后继时结束
fn exit_to(next: &Option<String>) -> Instruction {
    match next {
        Some(id) => Instruction::advance(id.clone()),
        None => Instruction::end(),
    }
}

//=============================================================================
// 内置节点生成器
//=============================================================================

enum LineStage {
    Show,
    Waiting,
    Finished,
}

struct LineStream {
    speaker: Option<String>,
    text: String,
    next: Option<String>,
    stage: LineStage,
}

impl InstructionStream for LineStream {
    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Step {
        match self.stage {
            LineStage::Show => {
                ctx.emit(Event::ShowLine {
                    node_id: ctx.node_id().to_string(),
                    speaker: self.speaker.clone(),
                    text: self.text.clone(),
                });
                self.stage = LineStage::Waiting;
                Step::Yield(Instruction::wait())
            }
            LineStage::Waiting => {
                self.stage = LineStage::Finished;
                Step::Yield(exit_to(&self.next))
            }
            LineStage::Finished => Step::Done,
        }
    }
}

enum ChoiceStage {
    Present,
    /// 记录可见选项在原列表中的下标
    Awaiting {
        visible: Vec<usize>,
    },
    Finished,
}

struct ChoiceStream {
    prompt: Option<String>,
    options: Vec<ChoiceOption>,
    stage: ChoiceStage,
}

impl ChoiceStream {
    fn present(&mut self, ctx: &mut NodeContext<'_>) -> Step {
        let visible: Vec<usize> = self
            .options
            .iter()
            .enumerate()
            .filter(|(_, option)| ctx.evaluate(&option.condition))
            .map(|(i, _)| i)
            .collect();

        if visible.is_empty() {
            warn!(node_id = %ctx.node_id(), "没有可见选项，结束对话");
            self.stage = ChoiceStage::Finished;
            return Step::Yield(Instruction::end());
        }

        let choices = visible
            .iter()
            .enumerate()
            .map(|(index, &i)| ChoiceView {
                index,
                text: self.options[i].text.clone(),
            })
            .collect();
        ctx.emit(Event::PresentChoices {
            node_id: ctx.node_id().to_string(),
            prompt: self.prompt.clone(),
            choices,
        });

        self.stage = ChoiceStage::Awaiting { visible };
        Step::Yield(Instruction::wait())
    }
}

impl InstructionStream for ChoiceStream {
    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Step {
        let visible = match &self.stage {
            ChoiceStage::Present => return self.present(ctx),
            ChoiceStage::Awaiting { visible } => visible,
            ChoiceStage::Finished => return Step::Done,
        };

        match ctx.take_input() {
            Some(DialogueInput::ChoiceSelected { index }) if index < visible.len() => {
                let option = &self.options[visible[index]];
                let shown = visible
                    .iter()
                    .map(|&i| self.options[i].text.clone())
                    .collect();
                ctx.record(HistoryEvent::choice_made(shown, index));
                debug!(node_id = %ctx.node_id(), index, target = %option.target, "选择选项");

                let target = option.target.clone();
                self.stage = ChoiceStage::Finished;
                Step::Yield(Instruction::advance(target))
            }
            other => {
                warn!(
                    node_id = %ctx.node_id(),
                    input = ?other,
                    count = visible.len(),
                    "无效的选择输入，继续等待"
                );
                Step::Yield(Instruction::wait())
            }
        }
    }
}

struct BranchStream {
    condition: Condition,
    then: String,
    otherwise: Option<String>,
    done: bool,
}

impl InstructionStream for BranchStream {
    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Step {
        if self.done {
            return Step::Done;
        }
        self.done = true;

        if ctx.evaluate(&self.condition) {
            Step::Yield(Instruction::advance(self.then.clone()))
        } else {
            Step::Yield(exit_to(&self.otherwise))
        }
    }
}

struct SetStream {
    assignments: Vec<Assignment>,
    next: Option<String>,
    done: bool,
}

impl InstructionStream for SetStream {
    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Step {
        if self.done {
            return Step::Done;
        }
        self.done = true;

        for assignment in &self.assignments {
            match assignment.scope() {
                VarScope::Local => assignment.apply(ctx.local_mut()),
                VarScope::Global => match ctx.global_mut() {
                    Some(mut global) => assignment.apply(&mut global),
                    None => {
                        warn!(assignment = ?assignment, "未挂载全局存储，忽略赋值");
                    }
                },
            }
        }

        Step::Yield(exit_to(&self.next))
    }
}

enum EffectsStage {
    Start,
    Waiting(ParallelWait),
    Finished,
}

struct EffectsStream {
    effects: Vec<EffectRequest>,
    wait: bool,
    next: Option<String>,
    stage: EffectsStage,
}

impl EffectsStream {
    fn finish(&mut self) -> Step {
        self.stage = EffectsStage::Finished;
        Step::Yield(exit_to(&self.next))
    }
}

impl InstructionStream for EffectsStream {
    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Step {
        match &self.stage {
            EffectsStage::Start => {
                if !self.wait {
                    for request in &self.effects {
                        ctx.emit(Event::Effect {
                            id: None,
                            request: request.clone(),
                        });
                    }
                    return self.finish();
                }

                let tasks = self
                    .effects
                    .iter()
                    .map(|request| {
                        Some(Box::new(ctx.effect_task(request.clone())) as Box<dyn WaitTask>)
                    })
                    .collect();
                let wait = ParallelWait::new(tasks);
                if wait.is_complete() {
                    return self.finish();
                }

                debug!(node_id = %ctx.node_id(), total = wait.total(), "等待效果完成");
                self.stage = EffectsStage::Waiting(wait);
                Step::Pending
            }
            EffectsStage::Waiting(wait) => {
                if wait.is_complete() {
                    self.finish()
                } else {
                    Step::Pending
                }
            }
            EffectsStage::Finished => Step::Done,
        }
    }

    fn force_complete_waits(&mut self) {
        if let EffectsStage::Waiting(wait) = &self.stage {
            wait.force_complete();
        }
    }
}
