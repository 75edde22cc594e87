//! 布尔表达式评估器
//!
//! 评估分为四个阶段，任一阶段失败都会返回明确的错误：
//! 1. 空表达式直接返回 `false`
//! 2. 类型推断并构建环境
//! 3. 编译表达式并做静态检查（未声明的变量、函数，参数类型）
//! 4. 执行并校验结果必须为布尔值；运行时 panic 转换为执行错误

use crate::environment::Environment;
use crate::error::{Result, RuleError};
use crate::functions::value_type_name;
use crate::models::Context;
use crate::schema;
use cel_interpreter::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// 布尔表达式评估器
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    /// 评估表达式
    ///
    /// 只有执行成功且结果为布尔值时返回 `Ok(value)`；空表达式恒为 `Ok(false)`。
    pub fn evaluate(expression: &str, context: &Context) -> Result<bool> {
        if expression.is_empty() {
            return Ok(false);
        }

        let env = Environment::new(schema::infer_declarations(context))?;
        let program = env.compile(expression)?;
        let activation = env.activation(context)?;

        let evaluation_error = |message: String| RuleError::EvaluationError {
            expression: expression.to_string(),
            message,
        };

        // 运行时整数运算溢出、除零会 panic，这里转换为执行错误
        let value = panic::catch_unwind(AssertUnwindSafe(|| program.execute(&activation)))
            .map_err(|payload| evaluation_error(panic_message(payload.as_ref())))?
            .map_err(|e| evaluation_error(e.to_string()))?;

        let result = Self::expect_bool(expression, value)?;
        debug!(expression, result, "Expression evaluated");
        Ok(result)
    }

    /// 使用无类型 JSON 上下文评估表达式
    ///
    /// `null` 视为空上下文；上下文中存在不支持的值类型时返回
    /// `UnsupportedContextType`。
    pub fn evaluate_json(expression: &str, context: &serde_json::Value) -> Result<bool> {
        if expression.is_empty() {
            return Ok(false);
        }

        let context = schema::context_from_json(context)?;
        Self::evaluate(expression, &context)
    }

    fn expect_bool(expression: &str, value: Value) -> Result<bool> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(RuleError::TypeMismatch {
                expression: expression.to_string(),
                actual: value_type_name(&other),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("运行时异常: {}", detail)
}

/// 评估布尔表达式，返回严格的布尔结果或错误
pub fn evaluate_boolean_expression(expression: &str, context: &Context) -> Result<bool> {
    ExpressionEvaluator::evaluate(expression, context)
}

/// 使用 JSON 上下文评估布尔表达式
pub fn evaluate_boolean_expression_json(
    expression: &str,
    context: &serde_json::Value,
) -> Result<bool> {
    ExpressionEvaluator::evaluate_json(expression, context)
}
