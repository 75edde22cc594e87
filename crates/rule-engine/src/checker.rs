//! 表达式静态检查
//!
//! 在执行前遍历语法树，完成名称解析和扩展函数签名检查。引用未声明变量、
//! 调用未注册函数、或参数类型与所有重载都不匹配的表达式在编译阶段失败，
//! 结果不受 `||` / `&&` 短路顺序影响。
//!
//! 只有能静态确定类型的参数才参与重载检查（字面量、已声明变量、扩展函数的
//! 返回值）；其余参数的类型在执行阶段由运行时分派检查。

use crate::functions::FunctionLibrary;
use crate::models::SemanticType;
use cel_parser::{Atom, Expression, Member, UnaryOp};
use std::collections::BTreeMap;

/// CEL 运行时内置函数（扩展函数同名时以扩展函数为准）
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "contains",
    "size",
    "has",
    "map",
    "filter",
    "all",
    "max",
    "min",
    "startsWith",
    "endsWith",
    "string",
    "bytes",
    "double",
    "exists",
    "exists_one",
    "int",
    "uint",
    "matches",
    "duration",
    "timestamp",
    "getFullYear",
    "getMonth",
    "getDayOfYear",
    "getDayOfMonth",
    "getDate",
    "getDayOfWeek",
    "getHours",
    "getMinutes",
    "getSeconds",
    "getMilliseconds",
];

/// 绑定迭代变量的宏，如 `tags.exists(t, hasPrefix(t, "x"))`
const COMPREHENSION_MACROS: &[&str] = &["all", "exists", "exists_one", "filter", "map"];

/// 静态检查器
pub struct Checker<'a> {
    declarations: &'a BTreeMap<String, SemanticType>,
    library: &'a FunctionLibrary,
    /// 宏绑定的迭代变量，内层在后
    bound: Vec<String>,
}

impl<'a> Checker<'a> {
    pub fn new(
        declarations: &'a BTreeMap<String, SemanticType>,
        library: &'a FunctionLibrary,
    ) -> Self {
        Self {
            declarations,
            library,
            bound: Vec::new(),
        }
    }

    /// 检查表达式，返回能静态确定的结果类型
    pub fn check(mut self, expr: &Expression) -> Result<Option<SemanticType>, String> {
        self.visit(expr)
    }

    fn visit(&mut self, expr: &Expression) -> Result<Option<SemanticType>, String> {
        match expr {
            Expression::Atom(atom) => Ok(atom_type(atom)),
            Expression::Ident(name) => self.resolve_variable(name),
            Expression::Arithmetic(left, _, right) => {
                self.visit(left)?;
                self.visit(right)?;
                Ok(None)
            }
            Expression::Relation(left, _, right)
            | Expression::And(left, right)
            | Expression::Or(left, right) => {
                self.visit(left)?;
                self.visit(right)?;
                Ok(Some(SemanticType::Bool))
            }
            Expression::Ternary(condition, then, otherwise) => {
                self.visit(condition)?;
                let then = self.visit(then)?;
                let otherwise = self.visit(otherwise)?;
                Ok(if then == otherwise { then } else { None })
            }
            Expression::Unary(op, inner) => {
                let ty = self.visit(inner)?;
                Ok(match op {
                    UnaryOp::Not | UnaryOp::DoubleNot => Some(SemanticType::Bool),
                    UnaryOp::Minus | UnaryOp::DoubleMinus => {
                        ty.filter(|t| *t == SemanticType::Int)
                    }
                })
            }
            Expression::Member(target, member) => {
                self.visit(target)?;
                match member.as_ref() {
                    Member::Attribute(_) => {}
                    Member::Index(index) => {
                        self.visit(index)?;
                    }
                    Member::Fields(_) => return Err("不支持结构体构造表达式".to_string()),
                }
                Ok(None)
            }
            Expression::List(items) => {
                let mut all_strings = true;
                for item in items {
                    all_strings &= self.visit(item)? == Some(SemanticType::String);
                }
                Ok(all_strings.then_some(SemanticType::StringList))
            }
            Expression::Map(entries) => {
                let mut all_strings = true;
                for (key, value) in entries {
                    all_strings &= self.visit(key)? == Some(SemanticType::String);
                    all_strings &= self.visit(value)? == Some(SemanticType::String);
                }
                Ok(all_strings.then_some(SemanticType::StringMap))
            }
            Expression::FunctionCall(name, target, args) => {
                let Expression::Ident(name) = name.as_ref() else {
                    return Err("不支持的函数调用表达式".to_string());
                };
                self.visit_call(name, target.as_deref(), args)
            }
        }
    }

    fn resolve_variable(&self, name: &str) -> Result<Option<SemanticType>, String> {
        if self.bound.iter().rev().any(|bound| bound == name) {
            return Ok(None);
        }
        self.declarations
            .get(name)
            .map(|ty| Some(*ty))
            .ok_or_else(|| format!("未声明的变量: {}", name))
    }

    fn visit_call(
        &mut self,
        name: &str,
        target: Option<&Expression>,
        args: &[Expression],
    ) -> Result<Option<SemanticType>, String> {
        if self.library.get(name).is_some() {
            return self.visit_extension_call(name, target, args);
        }
        if !BUILTIN_FUNCTIONS.contains(&name) {
            return Err(format!("未声明的函数: {}", name));
        }
        if COMPREHENSION_MACROS.contains(&name) {
            return self.visit_comprehension(name, target, args);
        }

        if let Some(target) = target {
            self.visit(target)?;
        }
        for arg in args {
            self.visit(arg)?;
        }

        Ok(match name {
            "size" | "int" => Some(SemanticType::Int),
            "string" => Some(SemanticType::String),
            "has" | "startsWith" | "endsWith" | "matches" => Some(SemanticType::Bool),
            _ => None,
        })
    }

    fn visit_extension_call(
        &mut self,
        name: &str,
        target: Option<&Expression>,
        args: &[Expression],
    ) -> Result<Option<SemanticType>, String> {
        let mut types = Vec::with_capacity(args.len() + 1);
        if let Some(target) = target {
            types.push(self.visit(target)?);
        }
        for arg in args {
            types.push(self.visit(arg)?);
        }

        let Some(function) = self.library.get(name) else {
            return Err(format!("未声明的函数: {}", name));
        };
        let candidates: Vec<_> = function
            .overloads
            .iter()
            .filter(|o| o.params.len() == types.len())
            .collect();

        let Some(first) = candidates.first() else {
            return Err(format!("函数 '{}' 不接受 {} 个参数", name, types.len()));
        };

        // 参数类型全部已知时才能断定没有匹配的重载
        let known: Option<Vec<SemanticType>> = types.iter().copied().collect();
        if let Some(known) = known {
            return match candidates.iter().find(|o| o.accepts(&known)) {
                Some(overload) => Ok(Some(overload.result)),
                None => Err(format!(
                    "函数 '{}' 没有匹配的重载: ({})",
                    name,
                    known
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            };
        }

        let result = first.result;
        Ok(candidates
            .iter()
            .all(|o| o.result == result)
            .then_some(result))
    }

    fn visit_comprehension(
        &mut self,
        name: &str,
        target: Option<&Expression>,
        args: &[Expression],
    ) -> Result<Option<SemanticType>, String> {
        let (Some(target), [Expression::Ident(var), body]) = (target, args) else {
            return Err(format!("宏 '{}' 的用法应为 list.{}(x, expr)", name, name));
        };

        self.visit(target)?;
        self.bound.push(var.to_string());
        let result = self.visit(body);
        self.bound.pop();
        result?;

        Ok(match name {
            "map" | "filter" => None,
            _ => Some(SemanticType::Bool),
        })
    }
}

fn atom_type(atom: &Atom) -> Option<SemanticType> {
    match atom {
        Atom::Int(_) => Some(SemanticType::Int),
        Atom::String(_) => Some(SemanticType::String),
        Atom::Bool(_) => Some(SemanticType::Bool),
        _ => None,
    }
}
