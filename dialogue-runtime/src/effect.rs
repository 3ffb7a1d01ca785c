//! # Effect 模块
//!
//! 把表现层效果请求包装成可被 [`ParallelWait`](crate::parallel::ParallelWait) 等待的任务。
//!
//! ```text
//! EffectTask::start   -> 分配 EffectId，发布 Event::Effect { id: Some(id) }
//! Host 播放/移动结束  -> DialogueDriver::complete_effect(id) -> Completion::complete
//! EffectTask::cancel  -> 注销 id，发布 Event::EffectCancelled
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::event::{EffectId, EffectRequest, Event, EventBus};
use crate::parallel::{Completion, WaitTask};

#[derive(Default)]
struct RegistryInner {
    next_id: EffectId,
    pending: HashMap<EffectId, Completion>,
}

/// 等待中的效果登记表
///
/// 由驱动器持有，Host 回报完成时按 ID 找到对应的 [`Completion`]。
#[derive(Clone, Default)]
pub struct EffectRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectRegistry")
            .field("pending", &self.pending_ids())
            .finish()
    }
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个待完成的效果，返回新 ID（从 1 开始递增）
    pub fn register(&self, done: Completion) -> EffectId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.pending.insert(id, done);
        id
    }

    /// 回报效果完成
    ///
    /// 未知或已取消的 ID 返回 `false`。
    pub fn finish(&self, id: EffectId) -> bool {
        // 先移出再回报，回报可能触发监听，不能持有借用
        let done = self.inner.borrow_mut().pending.remove(&id);
        match done {
            Some(done) => {
                done.complete();
                true
            }
            None => false,
        }
    }

    /// 注销效果但不回报
    pub fn discard(&self, id: EffectId) -> bool {
        self.inner.borrow_mut().pending.remove(&id).is_some()
    }

    /// 当前等待中的 ID（升序）
    pub fn pending_ids(&self) -> Vec<EffectId> {
        let mut ids: Vec<EffectId> = self.inner.borrow().pending.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().pending.is_empty()
    }
}

/// 可等待的效果任务
pub struct EffectTask {
    request: EffectRequest,
    bus: EventBus,
    registry: EffectRegistry,
    id: Option<EffectId>,
}

impl EffectTask {
    pub fn new(request: EffectRequest, bus: EventBus, registry: EffectRegistry) -> Self {
        Self {
            request,
            bus,
            registry,
            id: None,
        }
    }

    /// 已分配的 ID（启动前为 `None`）
    pub fn id(&self) -> Option<EffectId> {
        self.id
    }
}

impl WaitTask for EffectTask {
    fn start(&mut self, done: Completion) {
        let id = self.registry.register(done);
        self.id = Some(id);
        debug!(effect_id = id, kind = ?self.request.kind(), "启动效果任务");
        self.bus.publish(Event::Effect {
            id: Some(id),
            request: self.request.clone(),
        });
    }

    fn cancel(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if self.registry.discard(id) {
            debug!(effect_id = id, "取消效果任务");
            self.bus.publish(Event::EffectCancelled {
                id,
                kind: self.request.kind(),
            });
        }
    }
}
