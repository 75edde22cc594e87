//! 规则集评估
//!
//! 对同一上下文独立评估多条规则并统计匹配数量。单条规则的任何错误都会被
//! 记录并降级为不匹配，不会中断其余规则的评估。

use crate::error::Result;
use crate::evaluator::ExpressionEvaluator;
use crate::models::Context;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// 单条规则的评估结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub index: usize,
    pub expression: String,
    pub matched: bool,
    /// 评估失败时的错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 规则集评估报告
#[derive(Debug, Clone, Serialize)]
pub struct RuleSetReport {
    pub total: usize,
    pub matched: usize,
    pub outcomes: Vec<RuleOutcome>,
    pub evaluation_time_ms: i64,
}

impl RuleSetReport {
    /// 评估失败的规则
    pub fn failures(&self) -> impl Iterator<Item = &RuleOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

/// 将严格评估结果降级为布尔值：任何错误都视为不匹配
pub fn degrade(expression: &str, result: Result<bool>) -> bool {
    match result {
        Ok(matched) => matched,
        Err(e) => {
            warn!(expression, kind = e.kind(), error = %e, "Rule evaluation failed, treating as not matched");
            false
        }
    }
}

/// 评估单条规则，错误降级为 `false`
pub fn evaluate_rule(expression: &str, context: &Context) -> bool {
    degrade(expression, ExpressionEvaluator::evaluate(expression, context))
}

/// 使用 JSON 上下文评估单条规则，错误降级为 `false`
pub fn evaluate_rule_json(expression: &str, context: &serde_json::Value) -> bool {
    degrade(expression, ExpressionEvaluator::evaluate_json(expression, context))
}

/// 评估规则集，返回匹配的规则数量
pub fn evaluate_rule_set<I, S>(expressions: I, context: &Context) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    expressions
        .into_iter()
        .filter(|expression| evaluate_rule(expression.as_ref(), context))
        .count()
}

/// 使用 JSON 上下文评估规则集
///
/// 上下文只转换一次；转换失败时所有规则都不匹配。
pub fn evaluate_rule_set_json<I, S>(expressions: I, context: &serde_json::Value) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    match Context::from_value(context) {
        Ok(context) => evaluate_rule_set(expressions, &context),
        Err(e) => {
            warn!(error = %e, "Rule set context rejected, no rule matched");
            0
        }
    }
}

/// 评估规则集并返回每条规则的结果
#[instrument(skip_all)]
pub fn evaluate_rule_set_report<I, S>(expressions: I, context: &Context) -> RuleSetReport
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let start = Instant::now();

    let outcomes: Vec<RuleOutcome> = expressions
        .into_iter()
        .enumerate()
        .map(|(index, expression)| {
            let expression = expression.as_ref();
            let result = ExpressionEvaluator::evaluate(expression, context);
            let error = result.as_ref().err().map(ToString::to_string);
            RuleOutcome {
                index,
                expression: expression.to_string(),
                matched: degrade(expression, result),
                error,
            }
        })
        .collect();

    let matched = outcomes.iter().filter(|o| o.matched).count();
    debug!(total = outcomes.len(), matched, "Rule set evaluated");

    RuleSetReport {
        total: outcomes.len(),
        matched,
        outcomes,
        evaluation_time_ms: duration_millis(start.elapsed()),
    }
}

/// 耗时毫秒数，超出 i64 范围时饱和
fn duration_millis(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuleError;
    use crate::models::ContextValue;
    use serde_json::json;

    fn sample_context() -> Context {
        Context::new()
            .with("a", 5)
            .with("b", 3)
            .with("artifact_type", "report")
            .with("val", vec!["a", "b", "c"])
            .with("m", ContextValue::map([("a", "b")]))
    }

    #[test]
    fn test_degrade() {
        assert!(degrade("x", Ok(true)));
        assert!(!degrade("x", Ok(false)));
        assert!(!degrade(
            "x",
            Err(RuleError::EnvironmentError("broken".to_string()))
        ));
    }

    #[test]
    fn test_evaluate_rule_swallows_errors() {
        let ctx = sample_context();
        assert!(evaluate_rule("a > b", &ctx));
        assert!(!evaluate_rule("a < b", &ctx));
        assert!(!evaluate_rule("", &ctx));
        assert!(!evaluate_rule("a >", &ctx));
        assert!(!evaluate_rule("1 + 1", &ctx));
        assert!(!evaluate_rule(r#"regex("abc", "[")"#, &ctx));
        assert!(!evaluate_rule("undefined_var", &ctx));
    }

    #[test]
    fn test_evaluate_rule_set_counts_matches() {
        let ctx = sample_context();
        let rules = vec![
            "a > b",                           // true
            r#"artifact_type == "report""#,    // true
            r#"contains(val, "z")"#,           // false
            "a >",                             // 编译失败
            "1 + 1",                           // 非布尔结果
            r#"getMapValue(m, "a") == "b""#,   // true
            "",                                // 空表达式
            r#"regex("abc", "[a-z")"#,         // 无效正则
        ];

        assert_eq!(evaluate_rule_set(&rules, &ctx), 3);
    }

    #[test]
    fn test_evaluate_rule_set_order_independent() {
        let ctx = sample_context();
        let mut rules = vec!["a > b", "a == b", "bad ((", r#"hasPrefix(artifact_type, "rep")"#];
        let count = evaluate_rule_set(&rules, &ctx);
        rules.reverse();
        assert_eq!(evaluate_rule_set(&rules, &ctx), count);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_evaluate_rule_set_empty() {
        let rules: Vec<String> = Vec::new();
        assert_eq!(evaluate_rule_set(&rules, &sample_context()), 0);
    }

    #[test]
    fn test_evaluate_rule_set_json() {
        let ctx = json!({"a": 1, "names": ["x"]});
        assert_eq!(
            evaluate_rule_set_json(["a == 1", "contains(names, 'x')", "a == 2"], &ctx),
            2
        );

        let invalid = json!({"a": 1.5});
        assert_eq!(evaluate_rule_set_json(["true"], &invalid), 0);
        assert!(!evaluate_rule_json("true", &invalid));
        assert!(evaluate_rule_json("a == 1", &ctx));
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(42)), 42);
        assert_eq!(duration_millis(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_report() {
        let ctx = sample_context();
        let report = evaluate_rule_set_report(["a > b", "a >", "false"], &ctx);

        assert_eq!(report.total, 3);
        assert_eq!(report.matched, 1);
        assert_eq!(report.matched, evaluate_rule_set(["a > b", "a >", "false"], &ctx));

        assert!(report.outcomes[0].matched);
        assert!(report.outcomes[0].error.is_none());
        assert!(!report.outcomes[1].matched);
        assert!(report.outcomes[1].error.as_deref().unwrap().contains("表达式编译失败"));
        assert_eq!(report.outcomes[2].index, 2);
        assert_eq!(report.failures().count(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["matched"], 1);
        assert!(json["outcomes"][0].get("error").is_none());
    }
}
