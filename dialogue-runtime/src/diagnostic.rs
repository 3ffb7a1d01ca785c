//! # 诊断模块
//!
//! 提供对话图静态检查和诊断 API，不依赖 IO 或驱动器。
//!
//! ## 设计原则
//!
//! - 纯函数 API，可在无 IO 环境下运行
//! - 诊断分级：Error（必须修复）、Warn（建议修复）、Info（信息提示）
//! - 直接检查 [`GraphData`]，加载失败的图也能给出完整报告

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::graph::GraphData;
use crate::node::NodeKind;

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    /// 信息提示
    Info,
    /// 警告（建议修复）
    Warn,
    /// 错误（必须修复）
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 诊断条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 诊断级别
    pub level: DiagnosticLevel,
    /// 对话图 ID
    pub graph_id: String,
    /// 相关节点（如果可定位）
    pub node_id: Option<String>,
    /// 诊断消息
    pub message: String,
    /// 诊断详情（可选）
    pub detail: Option<String>,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, graph_id: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            graph_id: graph_id.to_string(),
            node_id: None,
            message: message.into(),
            detail: None,
        }
    }

    /// 创建错误诊断
    pub fn error(graph_id: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, graph_id, message)
    }

    /// 创建警告诊断
    pub fn warn(graph_id: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warn, graph_id, message)
    }

    /// 创建信息诊断
    pub fn info(graph_id: &str, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, graph_id, message)
    }

    /// 设置节点
    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// 设置详情
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.graph_id)?;
        if let Some(node_id) = &self.node_id {
            write!(f, "#{}", node_id)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n  | {}", detail)?;
        }
        Ok(())
    }
}

/// 诊断结果
#[derive(Debug, Clone, Default)]
pub struct DiagnosticResult {
    /// 诊断条目列表
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticResult {
    /// 创建空结果
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加诊断
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// 合并另一个结果
    pub fn merge(&mut self, other: DiagnosticResult) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// 获取错误数量
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .count()
    }

    /// 获取警告数量
    pub fn warn_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warn)
            .count()
    }

    /// 是否有错误
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// 按级别过滤
    pub fn filter_by_level(&self, min_level: DiagnosticLevel) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level >= min_level)
            .collect()
    }
}

//=============================================================================
// 对话图分析 API
//=============================================================================

/// 分析对话图，返回诊断结果
///
/// 执行以下检查：
/// - 重复的节点 ID、不存在的入口节点（Error）
/// - 指向不存在节点的跳转（Error）
/// - 没有任何选项的选择节点（Error）
/// - 从入口不可达的节点（Warn）
/// - 空台词（Warn）
/// - 没有赋值的 set 节点、没有效果的 effects 节点（Info）
pub fn analyze_graph(graph: &GraphData) -> DiagnosticResult {
    let mut result = DiagnosticResult::new();
    let graph_id = graph.id.as_str();

    // 重复的 ID 以第一次定义为准
    let mut defined: HashMap<&str, &NodeKind> = HashMap::new();
    for node in &graph.nodes {
        match defined.entry(node.id.as_str()) {
            Entry::Occupied(_) => {
                result.push(Diagnostic::error(graph_id, "节点 ID 重复").with_node(&node.id));
            }
            Entry::Vacant(slot) => {
                slot.insert(&node.kind);
            }
        }
    }

    if !defined.contains_key(graph.entry.as_str()) {
        result.push(
            Diagnostic::error(graph_id, format!("入口节点不存在: **{}**", graph.entry))
                .with_detail("entry 必须指向 nodes 中的某个节点"),
        );
    }

    for node in &graph.nodes {
        for target in node.kind.targets() {
            if !defined.contains_key(target) {
                result.push(
                    Diagnostic::error(graph_id, format!("未定义的跳转目标: **{}**", target))
                        .with_node(&node.id)
                        .with_detail(format!(
                            "{} 节点引用了不存在的节点 '{}'",
                            node.kind.type_name(),
                            target
                        )),
                );
            }
        }

        match &node.kind {
            NodeKind::Choice { options, .. } if options.is_empty() => {
                result.push(Diagnostic::error(graph_id, "选择节点没有任何选项").with_node(&node.id));
            }
            NodeKind::Line { text, .. } if text.trim().is_empty() => {
                result.push(Diagnostic::warn(graph_id, "台词为空").with_node(&node.id));
            }
            NodeKind::Set { assignments, .. } if assignments.is_empty() => {
                result.push(Diagnostic::info(graph_id, "set 节点没有任何赋值").with_node(&node.id));
            }
            NodeKind::Effects { effects, .. } if effects.is_empty() => {
                result.push(
                    Diagnostic::info(graph_id, "effects 节点没有任何效果").with_node(&node.id),
                );
            }
            _ => {}
        }
    }

    let reachable = reachable_nodes(graph, &defined);
    for node in &graph.nodes {
        if !reachable.contains(node.id.as_str()) {
            result.push(Diagnostic::warn(graph_id, "节点从入口不可达").with_node(&node.id));
        }
    }

    result
}

/// 从入口出发可达的节点
fn reachable_nodes<'a>(
    graph: &'a GraphData,
    defined: &HashMap<&'a str, &'a NodeKind>,
) -> HashSet<&'a str> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();

    if defined.contains_key(graph.entry.as_str()) {
        queue.push_back(graph.entry.as_str());
    }

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(kind) = defined.get(id) {
            queue.extend(kind.targets());
        }
    }

    visited
}
