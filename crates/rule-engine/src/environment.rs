//! 表达式环境
//!
//! 将推断出的变量声明与扩展函数库合并为一个编译环境，负责表达式编译、
//! 静态检查和运行时变量绑定。环境在每次评估时重新构建，不做缓存。

use crate::checker::Checker;
use crate::error::{Result, RuleError};
use crate::functions::{self, FunctionLibrary};
use crate::models::{Context, Declaration, SemanticType};
use cel_interpreter::Program;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

/// CEL 保留字，不能用作变量名
const RESERVED_WORDS: &[&str] = &[
    "true", "false", "null", "in", "as", "break", "const", "continue", "else", "for", "function",
    "if", "import", "let", "loop", "package", "namespace", "return", "var", "void", "while",
];

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[_a-zA-Z][_a-zA-Z0-9]*$").expect("identifier pattern is valid")
});

/// 编译环境：变量声明 + 扩展函数
#[derive(Debug, Clone)]
pub struct Environment {
    declarations: BTreeMap<String, SemanticType>,
    library: &'static FunctionLibrary,
}

impl Environment {
    /// 构建环境
    ///
    /// 变量名重复、变量名不是合法标识符或为保留字、函数库存在重载冲突时返回
    /// `EnvironmentError`。
    pub fn new(declarations: impl IntoIterator<Item = Declaration>) -> Result<Self> {
        let library = functions::extension_library();
        library.validate()?;

        let mut env = Self {
            declarations: BTreeMap::new(),
            library,
        };
        for decl in declarations {
            env.declare(decl)?;
        }

        Ok(env)
    }

    /// 添加一条变量声明
    pub fn declare(&mut self, decl: Declaration) -> Result<()> {
        validate_name(&decl.name)?;

        if let Some(existing) = self.declarations.get(&decl.name) {
            return Err(RuleError::EnvironmentError(format!(
                "变量 '{}' 重复声明: {} 与 {}",
                decl.name, existing, decl.semantic_type
            )));
        }

        self.declarations.insert(decl.name, decl.semantic_type);
        Ok(())
    }

    /// 添加变量声明（构建器模式）
    pub fn with_declaration(mut self, decl: Declaration) -> Result<Self> {
        self.declare(decl)?;
        Ok(self)
    }

    pub fn declaration(&self, name: &str) -> Option<SemanticType> {
        self.declarations.get(name).copied()
    }

    pub fn declarations(&self) -> impl Iterator<Item = Declaration> + '_ {
        self.declarations
            .iter()
            .map(|(name, ty)| Declaration::new(name.clone(), *ty))
    }

    pub fn library(&self) -> &FunctionLibrary {
        self.library
    }

    /// 编译表达式
    ///
    /// 语法错误、未声明的变量或函数、静态可判定的重载不匹配都返回 `CompileError`。
    pub fn compile(&self, expression: &str) -> Result<Program> {
        let compile_error = |message: String| RuleError::CompileError {
            expression: expression.to_string(),
            message,
        };

        let ast = cel_parser::parse(expression).map_err(|e| compile_error(e.to_string()))?;
        Checker::new(&self.declarations, self.library)
            .check(&ast)
            .map_err(compile_error)?;

        Program::compile(expression).map_err(|e| compile_error(e.to_string()))
    }

    /// 构建运行时绑定：上下文变量和扩展函数
    ///
    /// 上下文中的每个变量都必须已在环境中以相同类型声明。
    pub fn activation(&self, context: &Context) -> Result<cel_interpreter::Context<'static>> {
        let mut activation = cel_interpreter::Context::default();

        for (name, value) in context.iter() {
            match self.declaration(name) {
                Some(ty) if ty == value.semantic_type() => {
                    activation.add_variable_from_value(name, value);
                }
                Some(ty) => {
                    return Err(RuleError::EnvironmentError(format!(
                        "变量 '{}' 声明类型为 {}，实际为 {}",
                        name,
                        ty,
                        value.semantic_type()
                    )));
                }
                None => {
                    return Err(RuleError::EnvironmentError(format!(
                        "变量 '{}' 未声明",
                        name
                    )));
                }
            }
        }

        for name in self.library.names() {
            activation.add_function(name, functions::dispatch);
        }

        debug!(
            variables = context.len(),
            functions = self.library.functions().len(),
            "Activation built"
        );

        Ok(activation)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if !IDENTIFIER.is_match(name) {
        return Err(RuleError::EnvironmentError(format!(
            "变量名 '{}' 不是合法的标识符",
            name
        )));
    }

    if RESERVED_WORDS.contains(&name) {
        return Err(RuleError::EnvironmentError(format!(
            "变量名 '{}' 是保留字",
            name
        )));
    }

    Ok(())
}
