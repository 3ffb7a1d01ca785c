//! # Variables 模块
//!
//! 对话变量存储。
//!
//! ## 作用域
//!
//! - **local**：会话级，对话开始时创建为空，对话结束（或下一次开始）时清空
//! - **global**：进程级，由 Host 在启动时创建一次，跨会话保留，从不自动清空
//!
//! 查找时 local 优先于 global（见 [`crate::condition`]）。
//!
//! ## 类型
//!
//! 每个存储内部有三张互不相干的表：`i64`、`bool`、`String`。
//! 同名变量可以同时存在于不同类型的表中，读取按类型区分，不做交叉检查。
//! 读取不存在的变量返回该类型的零值（`0` / `false` / 空串），不会失败。

use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

mod sealed {
    pub trait Sealed {}

    impl Sealed for i64 {}
    impl Sealed for bool {}
    impl Sealed for String {}
}

/// 可存入 [`VariableStore`] 的变量类型
///
/// 仅对 `i64`、`bool`、`String` 实现，用于在泛型接口中选择对应的表。
pub trait VarType: sealed::Sealed + Clone + Default {
    /// 类型名称（用于日志/诊断）
    const NAME: &'static str;

    #[doc(hidden)]
    fn table(store: &VariableStore) -> &HashMap<String, Self>;

    #[doc(hidden)]
    fn table_mut(store: &mut VariableStore) -> &mut HashMap<String, Self>;
}

impl VarType for i64 {
    const NAME: &'static str = "int";

    fn table(store: &VariableStore) -> &HashMap<String, Self> {
        &store.ints
    }

    fn table_mut(store: &mut VariableStore) -> &mut HashMap<String, Self> {
        &mut store.ints
    }
}

impl VarType for bool {
    const NAME: &'static str = "bool";

    fn table(store: &VariableStore) -> &HashMap<String, Self> {
        &store.bools
    }

    fn table_mut(store: &mut VariableStore) -> &mut HashMap<String, Self> {
        &mut store.bools
    }
}

impl VarType for String {
    const NAME: &'static str = "string";

    fn table(store: &VariableStore) -> &HashMap<String, Self> {
        &store.strings
    }

    fn table_mut(store: &mut VariableStore) -> &mut HashMap<String, Self> {
        &mut store.strings
    }
}

/// 变量值
///
/// 用于数据驱动的赋值（图数据中的 `set` 节点）。
/// JSON 中直接写字面量：`3`、`true`、`"name"`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    /// 整数
    Int(i64),
    /// 布尔值
    Bool(bool),
    /// 字符串
    String(String),
}

impl From<i64> for VarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for VarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for VarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// 变量存储
///
/// 一个实例对应一个作用域（local 或 global）。
/// 除了修改自身的三张表之外没有任何副作用，不做 IO。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableStore {
    #[serde(default)]
    ints: HashMap<String, i64>,
    #[serde(default)]
    bools: HashMap<String, bool>,
    #[serde(default)]
    strings: HashMap<String, String>,
}

impl VariableStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定类型的变量是否存在
    pub fn has<T: VarType>(&self, name: &str) -> bool {
        T::table(self).contains_key(name)
    }

    /// 读取变量，不存在时返回零值
    pub fn get<T: VarType>(&self, name: &str) -> T {
        T::table(self).get(name).cloned().unwrap_or_default()
    }

    /// 写入变量
    pub fn set<T: VarType>(&mut self, name: impl Into<String>, value: T) {
        T::table_mut(self).insert(name.into(), value);
    }

    /// 按 [`VarValue`] 的类型写入对应的表
    pub fn set_value(&mut self, name: impl Into<String>, value: VarValue) {
        match value {
            VarValue::Int(v) => self.set(name, v),
            VarValue::Bool(v) => self.set(name, v),
            VarValue::String(v) => self.set(name, v),
        }
    }

    /// 整数累加，等价于 `set(name, get(name) + delta)`
    pub fn add_int(&mut self, name: &str, delta: i64) {
        let current: i64 = self.get(name);
        self.set(name, current.wrapping_add(delta));
    }

    /// 布尔取反，等价于 `set(name, !get(name))`
    pub fn toggle_bool(&mut self, name: &str) {
        let current: bool = self.get(name);
        self.set(name, !current);
    }

    /// 清空三张表
    pub fn clear(&mut self) {
        self.ints.clear();
        self.bools.clear();
        self.strings.clear();
    }

    /// 用另一个存储的深拷贝替换全部内容
    ///
    /// `None` 等价于 [`clear`](Self::clear)。
    pub fn copy_from(&mut self, other: Option<&VariableStore>) {
        match other {
            Some(other) => self.clone_from(other),
            None => self.clear(),
        }
    }

    /// 三张表都为空
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.bools.is_empty() && self.strings.is_empty()
    }

    /// 导出一张表为 `(name, value)` 列表
    ///
    /// 结果按变量名排序，只是为了输出稳定，调用方不应依赖顺序。
    pub fn export<T: VarType>(&self) -> Vec<(String, T)> {
        let mut entries: Vec<(String, T)> = T::table(self)
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// 清空一张表后按列表重建，重复的名字以后出现的为准
    pub fn import<T: VarType>(&mut self, entries: impl IntoIterator<Item = (String, T)>) {
        let table = T::table_mut(self);
        table.clear();
        table.extend(entries);
    }

    pub fn export_int(&self) -> Vec<(String, i64)> {
        self.export()
    }

    pub fn export_bool(&self) -> Vec<(String, bool)> {
        self.export()
    }

    pub fn export_string(&self) -> Vec<(String, String)> {
        self.export()
    }

    pub fn import_int(&mut self, entries: impl IntoIterator<Item = (String, i64)>) {
        self.import(entries);
    }

    pub fn import_bool(&mut self, entries: impl IntoIterator<Item = (String, bool)>) {
        self.import(entries);
    }

    pub fn import_string(&mut self, entries: impl IntoIterator<Item = (String, String)>) {
        self.import(entries);
    }
}

/// 全局变量存储句柄
///
/// 进程级共享状态，由 Host 在启动时创建一次，显式传给每个
/// [`DialogueDriver`](crate::runtime::DialogueDriver)，进程退出时随最后一个句柄一起释放。
/// 整个解释器运行在单个逻辑线程上，因此使用 `Rc<RefCell<_>>`。
#[derive(Debug, Clone, Default)]
pub struct GlobalStore(Rc<RefCell<VariableStore>>);

impl GlobalStore {
    /// 创建空的全局存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 用已有内容创建
    pub fn from_store(store: VariableStore) -> Self {
        Self(Rc::new(RefCell::new(store)))
    }

    pub fn borrow(&self) -> Ref<'_, VariableStore> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, VariableStore> {
        self.0.borrow_mut()
    }

    /// 获取当前内容的深拷贝
    pub fn snapshot(&self) -> VariableStore {
        self.0.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_reads_return_zero_values() {
        let store = VariableStore::new();

        assert!(!store.has::<i64>("missing"));
        assert!(!store.has::<bool>("missing"));
        assert!(!store.has::<String>("missing"));

        assert_eq!(store.get::<i64>("missing"), 0);
        assert!(!store.get::<bool>("missing"));
        assert_eq!(store.get::<String>("missing"), "");
    }

    #[test]
    fn test_set_and_get() {
        let mut store = VariableStore::new();
        store.set("favor", 3i64);
        store.set("seen_intro", true);
        store.set("player", "Alice".to_string());

        assert!(store.has::<i64>("favor"));
        assert_eq!(store.get::<i64>("favor"), 3);
        assert!(store.get::<bool>("seen_intro"));
        assert_eq!(store.get::<String>("player"), "Alice");
    }

    #[test]
    fn test_same_name_in_different_tables() {
        let mut store = VariableStore::new();
        store.set("flag", 7i64);
        store.set("flag", true);

        // 不做跨类型冲突检查，两张表各自独立
        assert_eq!(store.get::<i64>("flag"), 7);
        assert!(store.get::<bool>("flag"));
        assert!(!store.has::<String>("flag"));
    }

    #[test]
    fn test_add_int_and_toggle_bool() {
        let mut store = VariableStore::new();

        store.add_int("favor", 2);
        store.add_int("favor", -5);
        assert_eq!(store.get::<i64>("favor"), -3);

        store.toggle_bool("door_open");
        assert!(store.get::<bool>("door_open"));
        store.toggle_bool("door_open");
        assert!(!store.get::<bool>("door_open"));
        assert!(store.has::<bool>("door_open"));
    }

    #[test]
    fn test_set_value() {
        let mut store = VariableStore::new();
        store.set_value("a", VarValue::Int(1));
        store.set_value("b", VarValue::Bool(true));
        store.set_value("c", VarValue::from("text"));

        assert_eq!(store.get::<i64>("a"), 1);
        assert!(store.get::<bool>("b"));
        assert_eq!(store.get::<String>("c"), "text");
    }

    #[test]
    fn test_clear() {
        let mut store = VariableStore::new();
        store.set("a", 1i64);
        store.set("b", true);
        store.set("c", "x".to_string());

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_copy_from_is_deep() {
        let mut source = VariableStore::new();
        source.set("favor", 3i64);

        let mut target = VariableStore::new();
        target.set("stale", true);
        target.copy_from(Some(&source));

        assert_eq!(target, source);
        assert!(!target.has::<bool>("stale"));

        source.set("favor", 10i64);
        assert_eq!(target.get::<i64>("favor"), 3);

        target.copy_from(None);
        assert!(target.is_empty());
    }

    #[test]
    fn test_export_import() {
        let mut store = VariableStore::new();
        store.set("b", 2i64);
        store.set("a", 1i64);
        store.set("flag", true);

        let ints = store.export_int();
        assert_eq!(ints, vec![("a".to_string(), 1), ("b".to_string(), 2)]);

        let mut restored = VariableStore::new();
        restored.set("old", 99i64);
        restored.import_int(ints);
        restored.import_bool(store.export_bool());

        assert!(!restored.has::<i64>("old"));
        assert_eq!(restored.get::<i64>("a"), 1);
        assert!(restored.get::<bool>("flag"));
    }

    #[test]
    fn test_import_last_write_wins() {
        let mut store = VariableStore::new();
        store.import_string(vec![
            ("name".to_string(), "first".to_string()),
            ("name".to_string(), "second".to_string()),
        ]);

        assert_eq!(store.get::<String>("name"), "second");
        assert_eq!(store.export_string().len(), 1);
    }

    #[test]
    fn test_global_store_handle_is_shared() {
        let global = GlobalStore::new();
        let other = global.clone();

        global.borrow_mut().set("chapter", 2i64);
        assert_eq!(other.borrow().get::<i64>("chapter"), 2);

        let snapshot = other.snapshot();
        global.borrow_mut().set("chapter", 3i64);
        assert_eq!(snapshot.get::<i64>("chapter"), 2);
    }

    #[test]
    fn test_var_value_json_literals() {
        let values: Vec<VarValue> = serde_json::from_str(r#"[3, true, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![VarValue::Int(3), VarValue::Bool(true), VarValue::from("x")]
        );
    }
}
