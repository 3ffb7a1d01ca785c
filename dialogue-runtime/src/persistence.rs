//! # Persistence 模块
//!
//! 会话存档的读写，建立在一个抽象的键值存储之上。
//!
//! ## 设计原则
//!
//! - Runtime 不做文件 IO，具体存储由 Host 实现 [`SaveStorage`]
//! - 读档只恢复状态，不恢复执行；把驱动器放回存档节点是调用方单独的一步
//! - 存档损坏或版本不兼容按"不存在"处理，绝不部分导入

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::error::{DialogueError, PersistenceError, StorageError};
use crate::graph::DialogueGraph;
use crate::runtime::DialogueDriver;
use crate::save::SaveRecord;
use crate::state::DriverState;
use crate::variables::VariableStore;

/// 持久化键值存储
pub trait SaveStorage {
    /// 写入（覆盖已有值）
    fn write_string(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// 读取，不存在时返回 `None`
    fn read_string(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 删除，不存在时为空操作
    fn delete_key(&mut self, key: &str) -> Result<(), StorageError>;
}

/// 内存存储
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SaveStorage for MemoryStorage {
    fn write_string(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn delete_key(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// 读档结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSession {
    pub graph_id: String,
    pub node_id: String,
    /// 重建的局部变量（不含字符串变量）
    pub local: VariableStore,
}

impl LoadedSession {
    /// 恢复局部变量并进入存档节点
    ///
    /// 等价于依次调用 [`DialogueDriver::restore_local`] 和 [`DialogueDriver::enter_node`]。
    pub fn resume(
        self,
        driver: &mut DialogueDriver,
        graph: Rc<dyn DialogueGraph>,
    ) -> Result<DriverState, DialogueError> {
        if graph.graph_id() != self.graph_id {
            warn!(
                saved = %self.graph_id,
                current = %graph.graph_id(),
                "存档的对话图与当前图不一致"
            );
        }
        driver.restore_local(self.local);
        driver.enter_node(graph, &self.node_id)
    }
}

/// 会话持久化
#[derive(Debug, Default)]
pub struct SessionPersistence<S> {
    storage: S,
}

impl<S: SaveStorage> SessionPersistence<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// 保存会话，覆盖同一槽位的旧存档
    pub fn save(
        &mut self,
        slot: &str,
        graph_id: &str,
        node_id: &str,
        local: &VariableStore,
    ) -> Result<(), PersistenceError> {
        let record = SaveRecord::capture(graph_id, node_id, local);
        let text = record
            .to_json()
            .map_err(|e| PersistenceError::Serialize(e.to_string()))?;
        self.storage.write_string(slot, &text)?;
        debug!(slot = %slot, graph_id = %graph_id, node_id = %node_id, "存档已写入");
        Ok(())
    }

    /// 读取存档
    ///
    /// 槽位不存在、存档损坏或版本不兼容都返回 [`PersistenceError::NotFound`]。
    pub fn load(&self, slot: &str) -> Result<LoadedSession, PersistenceError> {
        let not_found = || PersistenceError::NotFound {
            slot: slot.to_string(),
        };

        let text = self.storage.read_string(slot)?.ok_or_else(not_found)?;
        let record = SaveRecord::from_json(&text).map_err(|e| {
            warn!(slot = %slot, error = %e, "存档无法使用，按不存在处理");
            not_found()
        })?;

        debug!(slot = %slot, graph_id = %record.graph_id, node_id = %record.node_id, "存档已读取");
        Ok(LoadedSession {
            local: record.restore_local(),
            graph_id: record.graph_id,
            node_id: record.node_id,
        })
    }

    /// 删除存档，槽位不存在时为空操作
    pub fn clear(&mut self, slot: &str) -> Result<(), PersistenceError> {
        self.storage.delete_key(slot)?;
        debug!(slot = %slot, "存档已删除");
        Ok(())
    }

    /// 槽位是否有可读取的存档
    pub fn exists(&self, slot: &str) -> bool {
        self.load(slot).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::instruction::Instruction;
    use crate::node::ScriptedNode;

    /// 读写都失败的存储
    struct BrokenStorage;

    impl SaveStorage for BrokenStorage {
        fn write_string(&mut self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io {
                key: key.to_string(),
                message: "只读".to_string(),
            })
        }

        fn read_string(&self, key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Io {
                key: key.to_string(),
                message: "损坏".to_string(),
            })
        }

        fn delete_key(&mut self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let mut persistence = SessionPersistence::new(MemoryStorage::new());
        let mut local = VariableStore::new();
        local.set("favor", 3i64);
        local.set("seen_intro", true);

        persistence.save("s1", "prologue", "N4", &local).unwrap();
        let loaded = persistence.load("s1").unwrap();

        assert_eq!(loaded.graph_id, "prologue");
        assert_eq!(loaded.node_id, "N4");
        assert_eq!(loaded.local.get::<i64>("favor"), 3);
        assert!(loaded.local.get::<bool>("seen_intro"));
    }

    #[test]
    fn test_load_unwritten_slot_is_not_found() {
        let persistence = SessionPersistence::new(MemoryStorage::new());
        assert_eq!(
            persistence.load("never"),
            Err(PersistenceError::NotFound {
                slot: "never".to_string()
            })
        );
    }

    #[test]
    fn test_save_overwrites_slot() {
        let mut persistence = SessionPersistence::new(MemoryStorage::new());
        let local = VariableStore::new();
        persistence.save("s1", "g", "A", &local).unwrap();
        persistence.save("s1", "g", "B", &local).unwrap();

        assert_eq!(persistence.load("s1").unwrap().node_id, "B");
        assert_eq!(persistence.storage().len(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut persistence = SessionPersistence::new(MemoryStorage::new());
        persistence
            .save("s1", "g", "A", &VariableStore::new())
            .unwrap();

        persistence.clear("s1").unwrap();
        persistence.clear("s1").unwrap();
        assert!(!persistence.exists("s1"));
    }

    #[test]
    fn test_malformed_record_is_not_found() {
        let mut storage = MemoryStorage::new();
        storage.write_string("bad", "{ 这不是存档").unwrap();
        storage
            .write_string(
                "future",
                r#"{"version":{"major":9,"minor":0},"graph_id":"g","node_id":"A","int_vars":[],"bool_vars":[]}"#,
            )
            .unwrap();
        let persistence = SessionPersistence::new(storage);

        assert!(matches!(
            persistence.load("bad"),
            Err(PersistenceError::NotFound { .. })
        ));
        assert!(matches!(
            persistence.load("future"),
            Err(PersistenceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_storage_failure_is_surfaced() {
        let mut persistence = SessionPersistence::new(BrokenStorage);
        assert!(matches!(
            persistence.save("s1", "g", "A", &VariableStore::new()),
            Err(PersistenceError::Storage(_))
        ));
        assert!(matches!(
            persistence.load("s1"),
            Err(PersistenceError::Storage(_))
        ));
    }

    #[test]
    fn test_resume_into_driver() {
        let graph: Rc<dyn DialogueGraph> = Rc::new(
            Graph::new("prologue", "N0")
                .with_node(ScriptedNode::new("N0", vec![Instruction::end()]))
                .unwrap()
                .with_node(ScriptedNode::new(
                    "N4",
                    vec![Instruction::wait(), Instruction::end()],
                ))
                .unwrap(),
        );
        let mut persistence = SessionPersistence::new(MemoryStorage::new());
        let mut local = VariableStore::new();
        local.set("favor", 7i64);
        persistence.save("s1", "prologue", "N4", &local).unwrap();

        let mut driver = DialogueDriver::new(None);
        let state = persistence
            .load("s1")
            .unwrap()
            .resume(&mut driver, graph)
            .unwrap();

        assert_eq!(state, DriverState::AwaitingInput);
        assert_eq!(driver.current_node_id(), Some("N4"));
        assert_eq!(driver.local().get::<i64>("favor"), 7);
    }
}
