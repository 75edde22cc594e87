//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("不支持的上下文值类型: 变量 '{key}' 的类型为 {type_name}")]
    UnsupportedContextType { key: String, type_name: String },

    #[error("表达式环境构建失败: {0}")]
    EnvironmentError(String),

    #[error("表达式编译失败: expr: {expression}, error: {message}")]
    CompileError { expression: String, message: String },

    #[error("表达式执行失败: expr: {expression}, error: {message}")]
    EvaluationError { expression: String, message: String },

    #[error("表达式结果不是布尔值: expr: {expression}, type: {actual}")]
    TypeMismatch { expression: String, actual: String },

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    /// 错误类别名称，用于日志字段
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedContextType { .. } => "unsupported_context_type",
            Self::EnvironmentError(_) => "environment",
            Self::CompileError { .. } => "compile",
            Self::EvaluationError { .. } => "evaluation",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::JsonError(_) => "json",
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
