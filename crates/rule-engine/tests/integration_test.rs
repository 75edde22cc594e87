//! 规则引擎集成测试
//!
//! 测试完整的类型推断、编译、执行和规则集评估工作流。

use rule_engine::{
    evaluate_boolean_expression, evaluate_boolean_expression_json, evaluate_rule,
    evaluate_rule_set, evaluate_rule_set_json, evaluate_rule_set_report, Context, ContextValue,
    RuleError,
};
use serde_json::json;

/// 创建测试上下文：模拟一个工作流步骤的门控条件
fn create_workflow_context() -> Context {
    Context::new()
        .with("artifact_type", "report")
        .with("retries", 2)
        .with("max_retries", 5)
        .with("branch", "release/2024-01")
        .with("tags", vec!["nightly", "signed", "x86_64"])
        .with(
            "labels",
            ContextValue::map([("team", "platform"), ("env", "prod")]),
        )
}

// ==================== 基础表达式测试 ====================

#[test]
fn test_empty_expression_is_false() {
    assert!(!evaluate_boolean_expression("", &Context::new()).unwrap());
    assert!(!evaluate_boolean_expression("", &create_workflow_context()).unwrap());
    assert!(!evaluate_boolean_expression_json("", &serde_json::Value::Null).unwrap());
}

#[test]
fn test_true_with_empty_context() {
    assert!(evaluate_boolean_expression("true", &Context::new()).unwrap());
}

#[test]
fn test_integer_comparisons() {
    let cases = [
        (json!({"a": 5, "b": 3}), true),
        (json!({"a": 1, "b": 5}), false),
        (json!({"a": 0, "b": 0}), false),
        (json!({"a": -1, "b": -2}), true),
    ];

    for (ctx, expected) in cases {
        assert_eq!(
            evaluate_boolean_expression_json("a > b", &ctx).unwrap(),
            expected,
            "context: {}",
            ctx
        );
    }
}

#[test]
fn test_string_equality() {
    let ctx = json!({"artifact_type": "report"});
    assert!(evaluate_boolean_expression_json(r#"artifact_type == "report""#, &ctx).unwrap());
}

// ==================== 扩展函数测试 ====================

#[test]
fn test_contains() {
    let ctx = json!({"val": ["a", "b", "c"]});
    assert!(evaluate_boolean_expression_json(r#"contains(val, "a")"#, &ctx).unwrap());
    assert!(!evaluate_boolean_expression_json(r#"contains(val, "z")"#, &ctx).unwrap());
}

#[test]
fn test_contains_key() {
    let ctx = json!({"val": {"a": "b", "c": "d"}});
    assert!(evaluate_boolean_expression_json(r#"containsKey(val, "a")"#, &ctx).unwrap());
    assert!(!evaluate_boolean_expression_json(r#"containsKey(val, "z")"#, &ctx).unwrap());
}

#[test]
fn test_get_map_value() {
    let ctx = json!({"val": {"a": "b", "c": "d"}});
    assert!(evaluate_boolean_expression_json(r#"getMapValue(val, "a") == "b""#, &ctx).unwrap());
    assert!(!evaluate_boolean_expression_json(r#"getMapValue(val, "a") == "z""#, &ctx).unwrap());
    // 键不存在时返回空字符串，不报错
    assert!(evaluate_boolean_expression_json(r#"getMapValue(val, "z") == """#, &ctx).unwrap());
}

#[test]
fn test_has_prefix() {
    assert!(evaluate_boolean_expression(r#"hasPrefix("abc", "a")"#, &Context::new()).unwrap());
    assert!(!evaluate_boolean_expression(r#"hasPrefix("abc", "z")"#, &Context::new()).unwrap());
}

#[test]
fn test_in_path() {
    assert!(
        !evaluate_boolean_expression(r#"inPath("nonexistentcommand")"#, &Context::new()).unwrap()
    );
    assert!(!evaluate_boolean_expression(r#"inPath("")"#, &Context::new()).unwrap());
}

#[cfg(unix)]
#[test]
fn test_in_path_finds_shell() {
    // 仅在 PATH 中确实存在 sh 时断言为 true
    let expected = rule_engine::functions::lookup_executable("sh").is_some();
    assert_eq!(
        evaluate_boolean_expression(r#"inPath("sh")"#, &Context::new()).unwrap(),
        expected
    );
}

#[test]
fn test_regex() {
    assert!(evaluate_boolean_expression(r#"regex("abc", "[a-z]{3}")"#, &Context::new()).unwrap());

    let result = evaluate_boolean_expression(r#"regex("abc", "[a-z")"#, &Context::new());
    assert!(matches!(result, Err(RuleError::EvaluationError { .. })));
}

// ==================== 错误分类测试 ====================

#[test]
fn test_unsupported_context_type() {
    let ctx = json!({"nested": {"inner": {"a": 1}}});
    let err = evaluate_boolean_expression_json("true", &ctx).unwrap_err();
    match err {
        RuleError::UnsupportedContextType { key, type_name } => {
            assert_eq!(key, "nested");
            assert_eq!(type_name, "map(string, map(string, int))");
        }
        other => panic!("unexpected error: {}", other),
    }

    let err = evaluate_boolean_expression_json("true", &json!({"flag": true})).unwrap_err();
    assert!(err.to_string().contains("bool"));
}

#[test]
fn test_type_mismatch() {
    let err = evaluate_boolean_expression("1 + 1", &Context::new()).unwrap_err();
    assert!(matches!(err, RuleError::TypeMismatch { .. }));
    assert!(err.to_string().contains("1 + 1"));
    assert!(err.to_string().contains("int"));
}

#[test]
fn test_compile_error_carries_expression() {
    let err = evaluate_boolean_expression("artifact_type ==", &create_workflow_context())
        .unwrap_err();
    assert!(matches!(err, RuleError::CompileError { .. }));
    assert!(err.to_string().contains("artifact_type =="));
}

#[test]
fn test_environment_error() {
    let ctx = Context::new().with("my-key", "x");
    let err = evaluate_boolean_expression("true", &ctx).unwrap_err();
    assert!(matches!(err, RuleError::EnvironmentError(_)));
}

#[test]
fn test_invalid_references_rejected_regardless_of_operand_order() {
    let ctx = create_workflow_context();
    for expr in [
        "true || undeclared",
        "undeclared || true",
        "true || unknownFn(1)",
        "true || contains(1, 'a')",
        r#"retries > 0 || containsKey(tags, "signed")"#,
    ] {
        let err = evaluate_boolean_expression(expr, &ctx).unwrap_err();
        assert!(
            matches!(err, RuleError::CompileError { .. }),
            "expr: {}, error: {}",
            expr,
            err
        );
    }

    // 无效规则不计入匹配数
    assert_eq!(
        evaluate_rule_set(["true || undeclared", "true || unknownFn(1)", "true"], &ctx),
        1
    );
}

#[test]
fn test_integer_faults_are_errors_not_panics() {
    let ctx = Context::new().with("a", i64::MAX).with("b", 0);

    for expr in ["a + 1 > 0", "1 / 0 == 0", "a % b == 0"] {
        let err = evaluate_boolean_expression(expr, &ctx).unwrap_err();
        assert!(matches!(err, RuleError::EvaluationError { .. }), "expr: {}", expr);
    }
    assert_eq!(evaluate_rule_set(["a / b == 0", "a > b"], &ctx), 1);
}

// ==================== 完整工作流测试 ====================

#[test]
fn test_workflow_gate() {
    let ctx = create_workflow_context();

    assert!(evaluate_rule(
        r#"artifact_type == "report" && retries < max_retries"#,
        &ctx
    ));
    assert!(evaluate_rule(
        r#"hasPrefix(branch, "release/") && contains(tags, "signed")"#,
        &ctx
    ));
    assert!(evaluate_rule(
        r#"containsKey(labels, "team") && getMapValue(labels, "env") == "prod""#,
        &ctx
    ));
    assert!(evaluate_rule(r#"regex(branch, "^release/[0-9]{4}-[0-9]{2}$")"#, &ctx));
    assert!(!evaluate_rule(r#"contains(tags, "arm64")"#, &ctx));
}

#[test]
fn test_rule_set_counts_exactly_matching_rules() {
    let ctx = create_workflow_context();
    let rules = vec![
        r#"artifact_type == "report""#.to_string(),
        "retries >= max_retries".to_string(),
        "retries +".to_string(),
        r#"contains(tags, "nightly")"#.to_string(),
        "max_retries - retries".to_string(),
        r#"regex(branch, "(")"#.to_string(),
        "undefined_variable == 1".to_string(),
        String::new(),
        r#"getMapValue(labels, "missing") == """#.to_string(),
    ];

    assert_eq!(evaluate_rule_set(&rules, &ctx), 3);

    let report = evaluate_rule_set_report(&rules, &ctx);
    assert_eq!(report.matched, 3);
    assert_eq!(report.total, rules.len());
    assert_eq!(report.failures().count(), 4);
}

#[test]
fn test_rule_set_with_json_context() {
    let ctx = json!({
        "artifact_type": "report",
        "tags": ["a"],
    });
    assert_eq!(
        evaluate_rule_set_json(
            [r#"artifact_type == "report""#, r#"contains(tags, "a")"#, "false"],
            &ctx
        ),
        2
    );

    // 上下文类型不受支持时所有规则都不匹配
    let ctx = json!({"score": 9.5});
    assert_eq!(evaluate_rule_set_json(["true", "1 == 1"], &ctx), 0);
}

#[test]
fn test_rule_set_does_not_mutate_context() {
    let ctx = create_workflow_context();
    let before = ctx.clone();
    let rules = ["retries == 2", "retries == 2", r#"contains(tags, "signed")"#];

    assert_eq!(evaluate_rule_set(rules, &ctx), 3);
    assert_eq!(ctx, before);
}

#[test]
fn test_idempotent_evaluation() {
    let ctx = create_workflow_context();
    let expr = r#"artifact_type == "report" && contains(tags, "signed")"#;
    let results: Vec<bool> = (0..20)
        .map(|_| evaluate_boolean_expression(expr, &ctx).unwrap())
        .collect();
    assert!(results.iter().all(|r| *r));
}
