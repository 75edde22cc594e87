//! 规则引擎领域模型

use cel_interpreter::Value;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// 表达式可见的语义类型
///
/// 上下文变量只会推断出 `Int`、`String`、`StringList`、`StringMap` 四种类型，
/// `Bool` 仅出现在扩展函数的返回类型中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Bool,
    Int,
    String,
    StringList,
    StringMap,
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::String => "string",
            Self::StringList => "list(string)",
            Self::StringMap => "map(string, string)",
        };
        write!(f, "{}", s)
    }
}

/// 上下文变量值
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ContextValue {
    Int(i64),
    String(String),
    StringList(Vec<String>),
    StringMap(HashMap<String, String>),
}

impl ContextValue {
    /// 从键值对构建字符串映射
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::StringMap(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// 值对应的语义类型
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Self::Int(_) => SemanticType::Int,
            Self::String(_) => SemanticType::String,
            Self::StringList(_) => SemanticType::StringList,
            Self::StringMap(_) => SemanticType::StringMap,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// 尝试将 CEL 运行时值还原为上下文值
    ///
    /// 列表中所有元素均为字符串、映射中所有键值均为字符串时才能还原。
    pub fn from_cel(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(Self::Int(*i)),
            Value::String(s) => Some(Self::String(s.to_string())),
            Value::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Some(s.to_string()),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(Self::StringList),
            Value::Map(map) => map
                .map
                .iter()
                .map(|(key, value)| match (key, value) {
                    (cel_interpreter::objects::Key::String(k), Value::String(v)) => {
                        Some((k.to_string(), v.to_string()))
                    }
                    _ => None,
                })
                .collect::<Option<HashMap<_, _>>>()
                .map(Self::StringMap),
            _ => None,
        }
    }
}

impl From<&ContextValue> for Value {
    fn from(value: &ContextValue) -> Self {
        match value {
            ContextValue::Int(i) => Value::Int(*i),
            ContextValue::String(s) => Value::String(Arc::new(s.clone())),
            ContextValue::StringList(items) => Value::from(items.clone()),
            ContextValue::StringMap(map) => Value::from(map.clone()),
        }
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ContextValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for ContextValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringList(value)
    }
}

impl From<Vec<&str>> for ContextValue {
    fn from(value: Vec<&str>) -> Self {
        Self::StringList(value.into_iter().map(str::to_string).collect())
    }
}

impl From<HashMap<String, String>> for ContextValue {
    fn from(value: HashMap<String, String>) -> Self {
        Self::StringMap(value)
    }
}

/// 评估上下文 - 提供给表达式的具名变量
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, ContextValue>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加变量（构建器模式）
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// 添加变量，返回被覆盖的旧值
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ContextValue>,
    ) -> Option<ContextValue> {
        self.values.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 从 JSON 字符串创建
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let data: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(&data)
    }

    /// 从无类型的 JSON 值创建，值类型不受支持时返回错误
    pub fn from_value(data: &serde_json::Value) -> crate::Result<Self> {
        crate::schema::context_from_json(data)
    }
}

impl<K, V> FromIterator<(K, V)> for Context
where
    K: Into<String>,
    V: Into<ContextValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// 变量声明：上下文中一个变量的名称和推断类型
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Declaration {
    pub name: String,
    pub semantic_type: SemanticType,
}

impl Declaration {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.semantic_type)
    }
}
