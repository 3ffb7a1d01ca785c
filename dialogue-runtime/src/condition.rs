//! # Condition 模块
//!
//! 声明式条件与求值器。
//!
//! ## 设计原则
//!
//! - 条件是**不可变**的数据，只包含整数比较和布尔匹配两类检查
//! - 所有检查按 AND 组合，空条件恒为真
//! - 求值是**无副作用**的纯函数，遇到第一个失败的检查立即返回
//! - 未定义的变量不是错误，按类型零值参与比较
//!
//! ## 作用域
//!
//! 查找变量时先看 local，local 中不存在再看 global，都不存在取零值。

use serde::{Deserialize, Serialize};

use crate::variables::VariableStore;

/// 整数比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "==", alias = "eq")]
    Equal,
    #[serde(rename = "!=", alias = "ne")]
    NotEqual,
    #[serde(rename = ">", alias = "gt")]
    Greater,
    #[serde(rename = "<", alias = "lt")]
    Less,
    #[serde(rename = ">=", alias = "ge")]
    GreaterOrEqual,
    #[serde(rename = "<=", alias = "le")]
    LessOrEqual,
}

impl ComparisonOp {
    /// 计算 `left <op> right`
    pub fn apply(self, left: i64, right: i64) -> bool {
        match self {
            Self::Equal => left == right,
            Self::NotEqual => left != right,
            Self::Greater => left > right,
            Self::Less => left < right,
            Self::GreaterOrEqual => left >= right,
            Self::LessOrEqual => left <= right,
        }
    }
}

/// 整数检查：`name <op> value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntCheck {
    pub name: String,
    pub op: ComparisonOp,
    pub value: i64,
}

/// 布尔检查：`name == expected`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolCheck {
    pub name: String,
    pub expected: bool,
}

/// 条件
///
/// 先检查全部整数项，再检查全部布尔项。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub ints: Vec<IntCheck>,
    #[serde(default)]
    pub bools: Vec<BoolCheck>,
}

impl Condition {
    /// 创建空条件（恒为真）
    pub fn always() -> Self {
        Self::default()
    }

    /// 追加整数检查
    pub fn int(mut self, name: impl Into<String>, op: ComparisonOp, value: i64) -> Self {
        self.ints.push(IntCheck {
            name: name.into(),
            op,
            value,
        });
        self
    }

    /// 追加布尔检查
    pub fn bool(mut self, name: impl Into<String>, expected: bool) -> Self {
        self.bools.push(BoolCheck {
            name: name.into(),
            expected,
        });
        self
    }

    /// 是否没有任何检查
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.bools.is_empty()
    }

    /// 对 local/global 两级存储求值
    pub fn evaluate(&self, local: &VariableStore, global: Option<&VariableStore>) -> bool {
        evaluate(self, &Scopes::new(local, global))
    }
}

/// 变量查找上下文
///
/// 返回 `None` 表示变量在任何作用域都不存在。
pub trait VariableLookup {
    fn lookup_int(&self, name: &str) -> Option<i64>;
    fn lookup_bool(&self, name: &str) -> Option<bool>;
}

/// local 优先、global 兜底的两级作用域
#[derive(Debug, Clone, Copy)]
pub struct Scopes<'a> {
    pub local: &'a VariableStore,
    pub global: Option<&'a VariableStore>,
}

impl<'a> Scopes<'a> {
    pub fn new(local: &'a VariableStore, global: Option<&'a VariableStore>) -> Self {
        Self { local, global }
    }

    fn resolve<T: crate::variables::VarType>(&self, name: &str) -> Option<T> {
        if self.local.has::<T>(name) {
            return Some(self.local.get(name));
        }
        match self.global {
            Some(global) if global.has::<T>(name) => Some(global.get(name)),
            _ => None,
        }
    }
}

impl VariableLookup for Scopes<'_> {
    fn lookup_int(&self, name: &str) -> Option<i64> {
        self.resolve(name)
    }

    fn lookup_bool(&self, name: &str) -> Option<bool> {
        self.resolve(name)
    }
}

impl VariableLookup for VariableStore {
    fn lookup_int(&self, name: &str) -> Option<i64> {
        self.has::<i64>(name).then(|| self.get(name))
    }

    fn lookup_bool(&self, name: &str) -> Option<bool> {
        self.has::<bool>(name).then(|| self.get(name))
    }
}

/// 对条件求值
///
/// 第一个不满足的检查直接返回 `false`，其后的检查不会被查找。
pub fn evaluate(condition: &Condition, ctx: &impl VariableLookup) -> bool {
    for check in &condition.ints {
        let current = ctx.lookup_int(&check.name).unwrap_or(0);
        if !check.op.apply(current, check.value) {
            return false;
        }
    }

    for check in &condition.bools {
        let current = ctx.lookup_bool(&check.name).unwrap_or(false);
        if current != check.expected {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// 记录查找顺序，遇到 `poison` 直接 panic
    struct ProbeContext {
        store: VariableStore,
        lookups: RefCell<Vec<String>>,
    }

    impl ProbeContext {
        fn new(store: VariableStore) -> Self {
            Self {
                store,
                lookups: RefCell::new(Vec::new()),
            }
        }

        fn record(&self, name: &str) {
            if name == "poison" {
                panic!("不应查找 poison");
            }
            self.lookups.borrow_mut().push(name.to_string());
        }
    }

    impl VariableLookup for ProbeContext {
        fn lookup_int(&self, name: &str) -> Option<i64> {
            self.record(name);
            self.store.lookup_int(name)
        }

        fn lookup_bool(&self, name: &str) -> Option<bool> {
            self.record(name);
            self.store.lookup_bool(name)
        }
    }

    #[test]
    fn test_empty_condition_is_true() {
        let empty = VariableStore::new();
        let mut busy = VariableStore::new();
        busy.set("favor", -100i64);
        busy.set("flag", false);

        assert!(Condition::always().evaluate(&empty, None));
        assert!(Condition::always().evaluate(&busy, Some(&busy)));
    }

    #[test]
    fn test_comparison_ops() {
        use ComparisonOp::*;

        assert!(Equal.apply(3, 3));
        assert!(NotEqual.apply(3, 4));
        assert!(Greater.apply(4, 3));
        assert!(!Greater.apply(3, 3));
        assert!(Less.apply(2, 3));
        assert!(GreaterOrEqual.apply(3, 3));
        assert!(LessOrEqual.apply(3, 3));
        assert!(!LessOrEqual.apply(4, 3));
    }

    #[test]
    fn test_local_overrides_global() {
        let mut local = VariableStore::new();
        let mut global = VariableStore::new();
        local.set("favor", 5i64);
        global.set("favor", 1i64);
        local.set("met", true);
        global.set("met", false);

        let cond = Condition::always()
            .int("favor", ComparisonOp::Equal, 5)
            .bool("met", true);
        assert!(cond.evaluate(&local, Some(&global)));

        let cond = Condition::always().int("favor", ComparisonOp::Equal, 1);
        assert!(!cond.evaluate(&local, Some(&global)));
    }

    #[test]
    fn test_global_fallback_and_defaults() {
        let local = VariableStore::new();
        let mut global = VariableStore::new();
        global.set("chapter", 2i64);

        let cond = Condition::always().int("chapter", ComparisonOp::GreaterOrEqual, 2);
        assert!(cond.evaluate(&local, Some(&global)));

        // 无 global 时只看 local，缺失取 0
        assert!(!cond.evaluate(&local, None));

        let cond = Condition::always()
            .int("unknown", ComparisonOp::Equal, 0)
            .bool("unknown_flag", false);
        assert!(cond.evaluate(&local, None));
    }

    #[test]
    fn test_bool_mismatch_fails() {
        let mut local = VariableStore::new();
        local.set("seen_intro", true);

        let cond = Condition::always().bool("seen_intro", false);
        assert!(!cond.evaluate(&local, None));
    }

    #[test]
    fn test_short_circuit_on_first_failure() {
        let mut store = VariableStore::new();
        store.set("favor", 1i64);
        let ctx = ProbeContext::new(store);

        let cond = Condition::always()
            .int("favor", ComparisonOp::Greater, 10)
            .int("poison", ComparisonOp::Equal, 0)
            .bool("poison", true);

        assert!(!evaluate(&cond, &ctx));
        assert_eq!(*ctx.lookups.borrow(), vec!["favor".to_string()]);
    }

    #[test]
    fn test_ints_checked_before_bools() {
        let ctx = ProbeContext::new(VariableStore::new());
        let cond = Condition::always()
            .bool("flag", false)
            .int("count", ComparisonOp::Equal, 0);

        assert!(evaluate(&cond, &ctx));
        assert_eq!(
            *ctx.lookups.borrow(),
            vec!["count".to_string(), "flag".to_string()]
        );
    }

    #[test]
    fn test_condition_from_json() {
        let cond: Condition = serde_json::from_str(
            r#"{
                "ints": [{ "name": "favor", "op": ">=", "value": 3 }],
                "bools": [{ "name": "seen_intro", "expected": true }]
            }"#,
        )
        .unwrap();

        assert_eq!(cond.ints[0].op, ComparisonOp::GreaterOrEqual);

        let mut local = VariableStore::new();
        local.set("favor", 3i64);
        local.set("seen_intro", true);
        assert!(cond.evaluate(&local, None));

        let partial: Condition = serde_json::from_str(r#"{ "bools": [] }"#).unwrap();
        assert!(partial.is_empty());
    }
}
