//! 上下文类型推断
//!
//! 将上下文变量映射为表达式编译器可识别的变量声明。类型化的 [`Context`]
//! 推断不会失败；无类型的 JSON 上下文在这里完成类型检查，遇到不支持的
//! 值类型立即中止。

use crate::error::{Result, RuleError};
use crate::models::{Context, ContextValue, Declaration, SemanticType};
use serde_json::Value;

/// 根名称，用于报告非对象类型的 JSON 上下文
const ROOT_KEY: &str = "$";

/// 为上下文中的每个变量生成一条声明
pub fn infer_declarations(context: &Context) -> Vec<Declaration> {
    context
        .iter()
        .map(|(name, value)| Declaration::new(name, value.semantic_type()))
        .collect()
}

/// 推断单个 JSON 值的语义类型
pub fn infer_value_type(key: &str, value: &Value) -> Result<SemanticType> {
    classify(value).ok_or_else(|| unsupported(key, value))
}

/// 对 JSON 上下文做类型推断，返回声明列表
///
/// 任意一个变量类型不受支持即返回错误，不会返回部分结果。
pub fn infer_json_declarations(data: &Value) -> Result<Vec<Declaration>> {
    Ok(infer_declarations(&context_from_json(data)?))
}

/// 将无类型的 JSON 上下文转换为类型化上下文
///
/// `null` 视为空上下文；其他非对象根值不受支持。
pub fn context_from_json(data: &Value) -> Result<Context> {
    let object = match data {
        Value::Null => return Ok(Context::new()),
        Value::Object(object) => object,
        other => return Err(unsupported(ROOT_KEY, other)),
    };

    let mut context = Context::new();
    for (key, value) in object {
        let converted = convert(value).ok_or_else(|| unsupported(key, value))?;
        context.insert(key.clone(), converted);
    }

    Ok(context)
}

fn classify(value: &Value) -> Option<SemanticType> {
    match value {
        Value::Number(n) if n.is_i64() => Some(SemanticType::Int),
        Value::String(_) => Some(SemanticType::String),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(SemanticType::StringList),
        Value::Object(map) if map.values().all(Value::is_string) => Some(SemanticType::StringMap),
        _ => None,
    }
}

fn convert(value: &Value) -> Option<ContextValue> {
    match value {
        Value::Number(n) => n.as_i64().map(ContextValue::Int),
        Value::String(s) => Some(ContextValue::String(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(ContextValue::StringList),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect::<Option<_>>()
            .map(ContextValue::StringMap),
        Value::Null | Value::Bool(_) => None,
    }
}

fn unsupported(key: &str, value: &Value) -> RuleError {
    RuleError::UnsupportedContextType {
        key: key.to_string(),
        type_name: json_type_name(value),
    }
}

/// 获取 JSON 值的类型描述，容器类型会带上元素类型
pub fn json_type_name(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_i64() => "int".to_string(),
        Value::Number(n) if n.is_u64() => "uint".to_string(),
        Value::Number(_) => "double".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("list({})", common_type_name(items.iter())),
        Value::Object(map) => format!("map(string, {})", common_type_name(map.values())),
    }
}

/// 元素类型一致时返回该类型，否则返回 dyn
fn common_type_name<'a>(mut values: impl Iterator<Item = &'a Value>) -> String {
    let Some(first) = values.next() else {
        return "dyn".to_string();
    };
    let first = json_type_name(first);
    if values.all(|v| json_type_name(v) == first) {
        first
    } else {
        "dyn".to_string()
    }
}
