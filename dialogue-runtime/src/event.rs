//! # Event 模块
//!
//! 定义 Runtime 向表现层（音频、镜头、角色、文本 UI）发出的事件，以及单线程事件总线。
//!
//! ## 设计原则
//!
//! - **声明式**：事件描述"做什么"，不描述"怎么做"
//! - **发出即忘**：Runtime 不等待事件处理结果，除非节点显式用
//!   [`ParallelWait`](crate::parallel::ParallelWait) 包装了对应的效果任务
//! - **按主题订阅**：订阅者按 [`EventKind`] 过滤
//! - **作用域注销**：[`Subscription`] 被 drop 时自动注销，拥有者拆除时不会留下悬挂的监听

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::str::FromStr;
use std::time::Duration;

/// 效果请求的跟踪 ID
///
/// 只有被并行等待跟踪的效果才带 ID，Host 完成后通过
/// [`DialogueDriver::complete_effect`](crate::runtime::DialogueDriver::complete_effect) 回报。
pub type EffectId = u64;

/// 事件主题
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// 会话开始/结束
    Session,
    /// 台词显示
    Line,
    /// 选项呈现
    Choice,
    /// 音频
    Audio,
    /// 镜头
    Camera,
    /// 角色动作
    Character,
    /// 计时
    Timer,
}

/// 角色站位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Left,
    Center,
    Right,
    /// 画面左侧之外（入场/退场用）
    OffscreenLeft,
    /// 画面右侧之外（入场/退场用）
    OffscreenRight,
}

impl FromStr for Position {
    type Err = ();

    /// 从字符串解析位置（不区分大小写）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" | "middle" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            "offscreen_left" | "offscreenleft" => Ok(Self::OffscreenLeft),
            "offscreen_right" | "offscreenright" => Ok(Self::OffscreenRight),
            _ => Err(()),
        }
    }
}

/// 音频通道
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioChannel {
    Bgm,
    #[default]
    Sfx,
    Voice,
}

/// 角色动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharacterAction {
    Enter,
    Exit,
    Move,
}

/// 表现层效果请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectRequest {
    /// 播放音频
    PlayAudio {
        clip: String,
        #[serde(default)]
        channel: AudioChannel,
        /// 淡入时长（秒）
        #[serde(default)]
        fade_secs: f32,
        #[serde(default)]
        looping: bool,
    },

    /// 停止音频
    StopAudio {
        #[serde(default)]
        channel: AudioChannel,
        /// 淡出时长（秒）
        #[serde(default)]
        fade_secs: f32,
    },

    /// 移动镜头
    MoveCamera {
        x: f32,
        y: f32,
        #[serde(default)]
        zoom: Option<f32>,
        #[serde(default)]
        duration_secs: f32,
    },

    /// 角色入场/退场/移动
    Character {
        name: String,
        action: CharacterAction,
        #[serde(default)]
        position: Option<Position>,
        #[serde(default)]
        duration_secs: f32,
    },

    /// 纯计时（可用来组合超时）
    Delay { secs: f32 },
}

impl EffectRequest {
    /// 该请求所属的主题
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PlayAudio { .. } | Self::StopAudio { .. } => EventKind::Audio,
            Self::MoveCamera { .. } => EventKind::Camera,
            Self::Character { .. } => EventKind::Character,
            Self::Delay { .. } => EventKind::Timer,
        }
    }

    /// 预期时长（用于 Host 模拟或超时）
    pub fn duration(&self) -> Duration {
        let secs = match self {
            Self::PlayAudio { fade_secs, .. } | Self::StopAudio { fade_secs, .. } => *fade_secs,
            Self::MoveCamera { duration_secs, .. } | Self::Character { duration_secs, .. } => {
                *duration_secs
            }
            Self::Delay { secs } => *secs,
        };
        Duration::from_secs_f32(secs.max(0.0))
    }
}

/// 呈现给玩家的选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceView {
    /// 可见选项中的序号（`ChoiceSelected { index }` 使用此序号）
    pub index: usize,
    pub text: String,
}

/// 会话结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// 正常结束（EndDialogue 或生成器耗尽）
    Finished,
    /// 外部中止
    Aborted,
    /// 致命错误（如节点不存在）
    Failed,
}

/// Runtime 发出的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// 会话开始
    SessionStarted { graph_id: String, node_id: String },

    /// 显示一句台词
    ShowLine {
        node_id: String,
        /// 说话者（None 表示旁白）
        speaker: Option<String>,
        text: String,
    },

    /// 呈现选项
    PresentChoices {
        node_id: String,
        prompt: Option<String>,
        choices: Vec<ChoiceView>,
    },

    /// 效果请求
    ///
    /// `id` 为 `None` 时是纯发出即忘的请求。
    Effect {
        id: Option<EffectId>,
        request: EffectRequest,
    },

    /// 被跟踪的效果被取消（玩家跳过或会话拆除）
    EffectCancelled { id: EffectId, kind: EventKind },

    /// 会话结束
    SessionEnded { graph_id: String, reason: EndReason },
}

impl Event {
    /// 事件主题
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SessionStarted { .. } | Self::SessionEnded { .. } => EventKind::Session,
            Self::ShowLine { .. } => EventKind::Line,
            Self::PresentChoices { .. } => EventKind::Choice,
            Self::Effect { request, .. } => request.kind(),
            Self::EffectCancelled { kind, .. } => *kind,
        }
    }
}

type Handler = Rc<RefCell<dyn FnMut(&Event)>>;

struct Subscriber {
    id: u64,
    kind: Option<EventKind>,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
    queue: VecDeque<Event>,
    dispatching: bool,
}

/// 单线程事件总线
///
/// 处理函数内再次 `publish` 的事件会排队，在当前事件分发完后按顺序投递。
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅单个主题
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl FnMut(&Event) + 'static,
    ) -> Subscription {
        self.register(Some(kind), Rc::new(RefCell::new(handler)))
    }

    /// 订阅全部主题
    pub fn subscribe_all(&self, handler: impl FnMut(&Event) + 'static) -> Subscription {
        self.register(None, Rc::new(RefCell::new(handler)))
    }

    fn register(&self, kind: Option<EventKind>, handler: Handler) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.push(Subscriber { id, kind, handler });
        Subscription {
            id,
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// 发布事件
    pub fn publish(&self, event: Event) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.queue.push_back(event);
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }
        let _guard = DispatchGuard(&self.inner);

        loop {
            let (event, handlers) = {
                let mut inner = self.inner.borrow_mut();
                let Some(event) = inner.queue.pop_front() else {
                    break;
                };
                let kind = event.kind();
                let handlers: Vec<Handler> = inner
                    .subscribers
                    .iter()
                    .filter(|s| s.kind.is_none_or(|k| k == kind))
                    .map(|s| s.handler.clone())
                    .collect();
                (event, handlers)
            };

            for handler in handlers {
                // 处理函数自身正在执行时（递归发布）跳过
                if let Ok(mut handler) = handler.try_borrow_mut() {
                    (&mut *handler)(&event);
                }
            }
        }
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

/// 分发结束时复位 `dispatching`
///
/// 处理函数 panic 时同样生效，未投递的排队事件随之丢弃。
struct DispatchGuard<'a>(&'a RefCell<BusInner>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.0.try_borrow_mut() {
            inner.dispatching = false;
            if std::thread::panicking() {
                inner.queue.clear();
            }
        }
    }
}

/// 订阅凭证
///
/// drop 时自动从总线注销。
#[must_use = "Subscription 被丢弃时会立即注销"]
pub struct Subscription {
    id: u64,
    bus: Weak<RefCell<BusInner>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.borrow_mut().subscribers.retain(|s| s.id != self.id);
        }
    }
}
