//! # Context 模块
//!
//! 节点指令生成器每次被拉取时能看到的执行上下文。

use std::cell::{Ref, RefMut};

use crate::condition::Condition;
use crate::effect::{EffectRegistry, EffectTask};
use crate::event::{EffectRequest, Event, EventBus};
use crate::history::{History, HistoryEvent};
use crate::input::DialogueInput;
use crate::variables::{GlobalStore, VariableStore};

/// 节点执行上下文
///
/// 由驱动器在每次 `resume` 前构造，只在这一次拉取期间有效。
pub struct NodeContext<'a> {
    node_id: &'a str,
    local: &'a mut VariableStore,
    global: Option<&'a GlobalStore>,
    input: &'a mut Option<DialogueInput>,
    events: &'a EventBus,
    effects: &'a EffectRegistry,
    history: &'a mut History,
}

impl<'a> NodeContext<'a> {
    /// 当前节点 ID
    pub fn node_id(&self) -> &str {
        self.node_id
    }

    pub fn local(&self) -> &VariableStore {
        &*self.local
    }

    pub fn local_mut(&mut self) -> &mut VariableStore {
        &mut *self.local
    }

    /// 全局存储（未挂载时为 `None`）
    pub fn global(&self) -> Option<Ref<'_, VariableStore>> {
        self.global.map(GlobalStore::borrow)
    }

    pub fn global_mut(&mut self) -> Option<RefMut<'_, VariableStore>> {
        self.global.map(GlobalStore::borrow_mut)
    }

    /// 在 local/global 两级作用域上求值条件
    pub fn evaluate(&self, condition: &Condition) -> bool {
        let global = self.global();
        condition.evaluate(&*self.local, global.as_deref())
    }

    /// 取走驱动器转交的输入
    ///
    /// 输入只在紧随 `submit` 的那一次拉取中可见。
    pub fn take_input(&mut self) -> Option<DialogueInput> {
        self.input.take()
    }

    /// 发布事件，台词同时写入历史
    pub fn emit(&mut self, event: Event) {
        if let Event::ShowLine { speaker, text, .. } = &event {
            self.history
                .push(HistoryEvent::line(speaker.clone(), text.clone()));
        }
        self.events.publish(event);
    }

    /// 追加历史记录
    pub fn record(&mut self, event: HistoryEvent) {
        self.history.push(event);
    }

    /// 创建可等待的效果任务
    pub fn effect_task(&self, request: EffectRequest) -> EffectTask {
        EffectTask::new(request, self.events.clone(), self.effects.clone())
    }

    pub fn events(&self) -> &EventBus {
        self.events
    }
}

/// [`NodeContext`] 借用的全部状态的所有者
///
/// 驱动器内部持有一份；自定义节点的单元测试也可以直接构造。
#[derive(Debug, Default)]
pub struct NodeContextParts {
    pub node_id: String,
    pub local: VariableStore,
    pub global: Option<GlobalStore>,
    pub input: Option<DialogueInput>,
    pub events: EventBus,
    pub effects: EffectRegistry,
    pub history: History,
}

impl NodeContextParts {
    /// 借出一次拉取用的上下文
    pub fn context(&mut self) -> NodeContext<'_> {
        NodeContext {
            node_id: &self.node_id,
            local: &mut self.local,
            global: self.global.as_ref(),
            input: &mut self.input,
            events: &self.events,
            effects: &self.effects,
            history: &mut self.history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ComparisonOp;
    use crate::event::EventKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_evaluate_uses_both_scopes() {
        let global = GlobalStore::new();
        global.borrow_mut().set("chapter", 2i64);

        let mut parts = NodeContextParts {
            global: Some(global),
            ..Default::default()
        };
        parts.local.set("favor", 5i64);
        let ctx = parts.context();

        let condition = Condition::always()
            .int("favor", ComparisonOp::GreaterOrEqual, 5)
            .int("chapter", ComparisonOp::Equal, 2);
        assert!(ctx.evaluate(&condition));
    }

    #[test]
    fn test_global_mut_writes_through_handle() {
        let global = GlobalStore::new();
        let mut parts = NodeContextParts {
            global: Some(global.clone()),
            ..Default::default()
        };

        let mut ctx = parts.context();
        if let Some(mut store) = ctx.global_mut() {
            store.set("cleared", true);
        }
        assert!(global.borrow().get::<bool>("cleared"));
    }

    #[test]
    fn test_emit_records_lines() {
        let mut parts = NodeContextParts::default();
        let received = Rc::new(RefCell::new(0));
        let sink = received.clone();
        let _sub = parts
            .events
            .subscribe(EventKind::Line, move |_| *sink.borrow_mut() += 1);

        let mut ctx = parts.context();
        ctx.emit(Event::ShowLine {
            node_id: "N0".to_string(),
            speaker: None,
            text: "你好".to_string(),
        });

        assert_eq!(*received.borrow(), 1);
        assert_eq!(parts.history.line_count(), 1);
    }

    #[test]
    fn test_take_input_consumes_once() {
        let mut parts = NodeContextParts {
            input: Some(DialogueInput::choice(1)),
            ..Default::default()
        };
        let mut ctx = parts.context();
        assert_eq!(ctx.take_input(), Some(DialogueInput::choice(1)));
        assert_eq!(ctx.take_input(), None);
    }
}
