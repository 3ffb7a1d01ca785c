//! # Graph 模块
//!
//! 对话图：驱动器只读的节点查找接口，以及 JSON 格式的图数据。
//!
//! ## 图数据格式
//!
//! ```json
//! {
//!   "id": "prologue",
//!   "entry": "N0",
//!   "nodes": [
//!     { "id": "N0", "type": "line", "speaker": "Alice", "text": "早上好", "next": "N1" },
//!     { "id": "N1", "type": "end" }
//!   ]
//! }
//! ```
//!
//! 节点类型见 [`NodeKind`](crate::node::NodeKind)。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::node::{Node, NodeData};

/// 驱动器消费的只读图接口
pub trait DialogueGraph {
    /// 图 ID（同时用于存档）
    fn graph_id(&self) -> &str;

    /// 入口节点 ID
    fn entry_node_id(&self) -> &str;

    /// 按 ID 查找节点
    fn node(&self, id: &str) -> Option<&dyn Node>;
}

/// 序列化形式的对话图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphData {
    pub id: String,
    pub entry: String,
    pub nodes: Vec<NodeData>,
}

impl GraphData {
    /// 从 JSON 解析（不做结构校验）
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        serde_json::from_str(text).map_err(|e| GraphError::Parse {
            message: e.to_string(),
        })
    }

    pub fn node(&self, id: &str) -> Option<&NodeData> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// 可执行的对话图
///
/// 节点按 ID 索引；同时保留插入顺序用于遍历。
pub struct Graph {
    id: String,
    entry: String,
    nodes: HashMap<String, Box<dyn Node>>,
    order: Vec<String>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .finish()
    }
}

impl Graph {
    /// 创建空图
    ///
    /// 入口节点在 [`Graph::validate`] 时检查。
    pub fn new(id: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry: entry.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// 从图数据构建并校验
    pub fn from_data(data: GraphData) -> Result<Self, GraphError> {
        let mut graph = Self::new(data.id, data.entry);
        for node in data.nodes {
            graph.add_node(node)?;
        }
        graph.validate()?;
        debug!(graph_id = %graph.id, nodes = graph.len(), "对话图加载完成");
        Ok(graph)
    }

    /// 从 JSON 构建并校验
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        Self::from_data(GraphData::from_json(text)?)
    }

    /// 添加节点，ID 重复时报错
    pub fn add_node(&mut self, node: impl Node + 'static) -> Result<(), GraphError> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode {
                graph_id: self.id.clone(),
                node_id: id,
            });
        }
        self.order.push(id.clone());
        self.nodes.insert(id, Box::new(node));
        Ok(())
    }

    /// 链式添加节点
    pub fn with_node(mut self, node: impl Node + 'static) -> Result<Self, GraphError> {
        self.add_node(node)?;
        Ok(self)
    }

    /// 检查入口节点存在
    pub fn validate(&self) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&self.entry) {
            return Err(GraphError::MissingEntry {
                graph_id: self.id.clone(),
                entry: self.entry.clone(),
            });
        }
        Ok(())
    }

    /// 节点 ID（插入顺序）
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl DialogueGraph for Graph {
    fn graph_id(&self) -> &str {
        &self.id
    }

    fn entry_node_id(&self) -> &str {
        &self.entry
    }

    fn node(&self, id: &str) -> Option<&dyn Node> {
        self.nodes.get(id).map(|node| &**node)
    }
}
