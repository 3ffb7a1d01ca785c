//! # History 模块
//!
//! 对话回看记录。
//!
//! ## 设计原则
//!
//! - 记录会话中的关键事件（进入节点、台词、选择、会话结束）
//! - 所有数据可序列化
//! - 不记录表现层效果

use serde::{Deserialize, Serialize};

use crate::event::EndReason;

/// 历史事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEvent {
    /// 进入节点
    NodeEntered { node_id: String },

    /// 显示的台词
    Line {
        /// 说话者（None 表示旁白）
        speaker: Option<String>,
        text: String,
    },

    /// 做出的选择
    ChoiceMade {
        /// 呈现的选项文本
        options: Vec<String>,
        /// 选择的序号
        selected_index: usize,
    },

    /// 会话结束
    SessionEnded { graph_id: String, reason: EndReason },
}

impl HistoryEvent {
    pub fn node_entered(node_id: impl Into<String>) -> Self {
        Self::NodeEntered {
            node_id: node_id.into(),
        }
    }

    pub fn line(speaker: Option<String>, text: impl Into<String>) -> Self {
        Self::Line {
            speaker,
            text: text.into(),
        }
    }

    pub fn choice_made(options: Vec<String>, selected_index: usize) -> Self {
        Self::ChoiceMade {
            options,
            selected_index,
        }
    }
}

/// 历史记录容器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// 事件列表（按时间顺序）
    events: Vec<HistoryEvent>,
    /// 最大记录数（防止内存无限增长）
    max_events: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// 默认最多记录的条数
    pub const DEFAULT_MAX_EVENTS: usize = 1000;

    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            max_events: Self::DEFAULT_MAX_EVENTS,
        }
    }

    /// 设置最大记录数
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }

    /// 添加事件，超出上限时丢弃最早的
    pub fn push(&mut self, event: HistoryEvent) {
        self.events.push(event);

        if self.events.len() > self.max_events {
            let overflow = self.events.len() - self.max_events;
            self.events.drain(..overflow);
        }
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    /// 台词条数
    pub fn line_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, HistoryEvent::Line { .. }))
            .count()
    }

    /// 按顺序访问过的节点
    pub fn visited_nodes(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                HistoryEvent::NodeEntered { node_id } => Some(node_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// 最近的 N 句台词（按时间顺序）
    pub fn recent_lines(&self, count: usize) -> Vec<&HistoryEvent> {
        let mut lines: Vec<&HistoryEvent> = self
            .events
            .iter()
            .rev()
            .filter(|e| matches!(e, HistoryEvent::Line { .. }))
            .take(count)
            .collect();
        lines.reverse();
        lines
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_basic() {
        let mut history = History::new();
        assert!(history.is_empty());

        history.push(HistoryEvent::node_entered("N0"));
        history.push(HistoryEvent::line(Some("Alice".to_string()), "你好"));
        history.push(HistoryEvent::line(None, "旁白"));

        assert_eq!(history.len(), 3);
        assert_eq!(history.line_count(), 2);
        assert_eq!(history.visited_nodes(), vec!["N0"]);
    }

    #[test]
    fn test_history_max_events() {
        let mut history = History::new().with_max_events(5);

        for i in 0..10 {
            history.push(HistoryEvent::line(None, format!("台词 {}", i)));
        }

        assert_eq!(history.len(), 5);
        assert_eq!(history.events()[0], HistoryEvent::line(None, "台词 5"));
    }

    #[test]
    fn test_recent_lines() {
        let mut history = History::new();
        history.push(HistoryEvent::line(None, "1"));
        history.push(HistoryEvent::node_entered("N1"));
        history.push(HistoryEvent::line(None, "2"));
        history.push(HistoryEvent::line(None, "3"));

        let recent = history.recent_lines(2);
        assert_eq!(
            recent,
            vec![&HistoryEvent::line(None, "2"), &HistoryEvent::line(None, "3")]
        );
    }

    #[test]
    fn test_history_serialization() {
        let mut history = History::new();
        history.push(HistoryEvent::line(Some("A".to_string()), "内容"));
        history.push(HistoryEvent::choice_made(
            vec!["选项1".to_string(), "选项2".to_string()],
            0,
        ));

        let json = serde_json::to_string(&history).unwrap();
        let loaded: History = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, history);
    }
}
