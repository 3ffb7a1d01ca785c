//! # SaveStorage 模块
//!
//! 基于文件的存档存储，每个存档键对应存档目录下的一个 JSON 文件。
//!
//! ## 文件布局
//!
//! ```text
//! saves/
//! ├── slot_001.json
//! ├── slot_002.json
//! └── ...
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dialogue_runtime::{SaveStorage, StorageError};
use tracing::{debug, warn};

/// 最大存档槽位数
pub const MAX_SAVE_SLOTS: u32 = 99;

/// 槽位编号对应的存档键
pub fn slot_key(slot: u32) -> String {
    format!("slot_{:03}", slot)
}

/// 文件存档存储
#[derive(Debug, Clone)]
pub struct FileStorage {
    /// 存档目录
    saves_dir: PathBuf,
}

impl FileStorage {
    /// 创建文件存储
    ///
    /// 目录在第一次写入时才创建。
    pub fn new(saves_dir: impl AsRef<Path>) -> Self {
        Self {
            saves_dir: saves_dir.as_ref().to_path_buf(),
        }
    }

    pub fn saves_dir(&self) -> &Path {
        &self.saves_dir
    }

    /// 确保存档目录存在
    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.saves_dir).map_err(|e| StorageError::Io {
            key: self.saves_dir.to_string_lossy().to_string(),
            message: format!("无法创建存档目录: {}", e),
        })
    }

    /// 获取存档文件路径
    ///
    /// 键只能由字母、数字、`_` 和 `-` 组成，防止写到存档目录之外。
    pub fn key_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::Io {
                key: key.to_string(),
                message: "非法的存档键".to_string(),
            });
        }
        Ok(self.saves_dir.join(format!("{}.json", key)))
    }

    /// 列出所有编号槽位（升序）
    pub fn list_slots(&self) -> Vec<u32> {
        let Ok(entries) = fs::read_dir(&self.saves_dir) else {
            return Vec::new();
        };

        let mut slots: Vec<u32> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                // 解析 slot_XXX.json
                name.to_str()?
                    .strip_prefix("slot_")?
                    .strip_suffix(".json")?
                    .parse::<u32>()
                    .ok()
            })
            .collect();

        slots.sort_unstable();
        slots
    }

    /// 获取下一个未使用的槽位，槽位用尽时返回 `None`
    pub fn next_available_slot(&self) -> Option<u32> {
        let used = self.list_slots();
        (1..=MAX_SAVE_SLOTS).find(|slot| !used.contains(slot))
    }
}

fn io_error(key: &str, action: &str, e: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        message: format!("{}: {}", action, e),
    }
}

impl SaveStorage for FileStorage {
    fn write_string(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.key_path(key)?;
        self.ensure_dir()?;
        fs::write(&path, value).map_err(|e| io_error(key, "无法写入存档文件", e))?;
        debug!(path = ?path, "存档文件已写入");
        Ok(())
    }

    fn read_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            // 非 UTF-8 内容按损坏的存档交给上层处理
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Ok(Some(text)),
                Err(e) => {
                    warn!(path = ?path, "存档文件不是有效的 UTF-8");
                    Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, "无法读取存档文件", e)),
        }
    }

    fn delete_key(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = ?path, "存档文件已删除");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key, "无法删除存档文件", e)),
        }
    }
}
