//! 布尔规则评估引擎
//!
//! 基于 CEL 表达式的轻量规则评估，支持：
//! - 从上下文推断变量类型声明
//! - 编译期检查变量、函数引用和扩展函数参数类型
//! - 扩展函数库（`contains`、`containsKey`、`getMapValue`、`hasPrefix`、`inPath`、`regex`）
//! - 严格的布尔结果校验和错误分类
//! - 规则集评估与匹配计数

pub mod aggregator;
pub mod checker;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod models;
pub mod schema;

pub use aggregator::{
    degrade, evaluate_rule, evaluate_rule_json, evaluate_rule_set, evaluate_rule_set_json,
    evaluate_rule_set_report, RuleOutcome, RuleSetReport,
};
pub use environment::Environment;
pub use error::{Result, RuleError};
pub use evaluator::{
    evaluate_boolean_expression, evaluate_boolean_expression_json, ExpressionEvaluator,
};
pub use functions::{extension_library, FunctionLibrary};
pub use models::{Context, ContextValue, Declaration, SemanticType};
