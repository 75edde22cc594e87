//! 扩展函数库
//!
//! 在 CEL 标准函数之外注入的领域函数。每个函数可以有多个重载，按调用时的
//! 参数类型签名选择实现，例如 `contains` 同时支持字符串子串和字符串列表成员检查。
//!
//! | 函数 | 签名 | 说明 |
//! |---|---|---|
//! | `contains` | (string, string) -> bool | 子串检查 |
//! | `contains` | (list(string), string) -> bool | 列表成员检查（区分大小写） |
//! | `containsKey` | (map(string, string), string) -> bool | 键存在检查 |
//! | `getMapValue` | (map(string, string), string) -> string | 取值，键不存在时返回空字符串 |
//! | `hasPrefix` | (string, string) -> bool | 前缀检查 |
//! | `inPath` | (string) -> bool | 可执行文件是否能在 PATH 中找到 |
//! | `regex` | (string, string) -> bool | 正则匹配，无效的正则表达式返回错误 |

use crate::error::{Result, RuleError};
use crate::models::{ContextValue, SemanticType};
use cel_interpreter::extractors::Arguments;
use cel_interpreter::{FunctionContext, ResolveResult, Value};
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

/// 函数实现：接收已求值并还原为上下文类型的参数（方法调用时接收者在首位）
pub type FunctionImpl = fn(&[ContextValue]) -> std::result::Result<Value, String>;

/// 扩展函数的单个重载
#[derive(Clone)]
pub struct Overload {
    /// 重载标识（如 "string_contains_string"）
    pub id: &'static str,
    /// 参数类型
    pub params: Vec<SemanticType>,
    /// 返回类型
    pub result: SemanticType,
    pub implementation: FunctionImpl,
}

impl Overload {
    pub fn new(
        id: &'static str,
        params: Vec<SemanticType>,
        result: SemanticType,
        implementation: FunctionImpl,
    ) -> Self {
        Self {
            id,
            params,
            result,
            implementation,
        }
    }

    /// 参数类型是否与签名完全一致
    pub fn matches(&self, args: &[ContextValue]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| *param == arg.semantic_type())
    }

    /// 静态参数类型是否与签名完全一致
    pub fn accepts(&self, types: &[SemanticType]) -> bool {
        self.params == types
    }

    pub fn call(&self, args: &[ContextValue]) -> std::result::Result<Value, String> {
        (self.implementation)(args)
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overload")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("result", &self.result)
            .finish()
    }
}

/// 扩展函数及其全部重载
#[derive(Debug, Clone)]
pub struct ExtensionFunction {
    pub name: &'static str,
    pub overloads: Vec<Overload>,
}

impl ExtensionFunction {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            overloads: Vec::new(),
        }
    }

    pub fn with_overload(mut self, overload: Overload) -> Self {
        self.overloads.push(overload);
        self
    }

    /// 按参数类型选择重载
    pub fn resolve(&self, args: &[ContextValue]) -> Option<&Overload> {
        self.overloads.iter().find(|o| o.matches(args))
    }
}

/// 扩展函数注册表
#[derive(Debug, Clone, Default)]
pub struct FunctionLibrary {
    functions: Vec<ExtensionFunction>,
}

impl FunctionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加函数；同名函数的重载会合并
    pub fn with_function(mut self, function: ExtensionFunction) -> Self {
        match self.functions.iter_mut().find(|f| f.name == function.name) {
            Some(existing) => existing.overloads.extend(function.overloads),
            None => self.functions.push(function),
        }
        self
    }

    pub fn functions(&self) -> &[ExtensionFunction] {
        &self.functions
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.iter().map(|f| f.name)
    }

    /// 检查重载冲突：同名函数中不允许出现相同的参数签名或重复的重载标识
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for function in &self.functions {
            let mut signatures = HashSet::new();
            for overload in &function.overloads {
                if !ids.insert(overload.id) {
                    return Err(RuleError::EnvironmentError(format!(
                        "重载标识重复: {}",
                        overload.id
                    )));
                }
                if !signatures.insert(overload.params.as_slice()) {
                    return Err(RuleError::EnvironmentError(format!(
                        "函数 '{}' 的重载签名冲突: ({})",
                        function.name,
                        join_types(overload.params.iter().map(ToString::to_string))
                    )));
                }
            }
        }
        Ok(())
    }

    /// 按名称和参数类型调用函数
    pub fn call(&self, name: &str, args: &[Value]) -> std::result::Result<Value, String> {
        let function = self
            .get(name)
            .ok_or_else(|| format!("未注册的函数: {}", name))?;

        let converted = args
            .iter()
            .map(ContextValue::from_cel)
            .collect::<Option<Vec<_>>>();

        let resolved = converted
            .as_deref()
            .and_then(|typed| function.resolve(typed).map(|overload| (overload, typed)));

        match resolved {
            Some((overload, typed)) => overload.call(typed),
            None => Err(format!(
                "函数 '{}' 没有匹配的重载: ({})",
                name,
                join_types(args.iter().map(value_type_name))
            )),
        }
    }
}

/// 进程级扩展函数注册表，构建后只读
pub static EXTENSION_LIBRARY: LazyLock<FunctionLibrary> = LazyLock::new(build_extension_library);

pub fn extension_library() -> &'static FunctionLibrary {
    &EXTENSION_LIBRARY
}

fn build_extension_library() -> FunctionLibrary {
    use SemanticType::{Bool, String, StringList, StringMap};

    FunctionLibrary::new()
        .with_function(
            ExtensionFunction::new("contains")
                .with_overload(Overload::new(
                    "string_contains_string",
                    vec![String, String],
                    Bool,
                    contains_substring,
                ))
                .with_overload(Overload::new(
                    "list_string_contains_string",
                    vec![StringList, String],
                    Bool,
                    contains_element,
                )),
        )
        .with_function(ExtensionFunction::new("containsKey").with_overload(Overload::new(
            "map_contains_key",
            vec![StringMap, String],
            Bool,
            contains_key,
        )))
        .with_function(ExtensionFunction::new("getMapValue").with_overload(Overload::new(
            "map_get_value",
            vec![StringMap, String],
            String,
            get_map_value,
        )))
        .with_function(ExtensionFunction::new("hasPrefix").with_overload(Overload::new(
            "string_has_prefix",
            vec![String, String],
            Bool,
            has_prefix,
        )))
        .with_function(ExtensionFunction::new("inPath").with_overload(Overload::new(
            "in_path",
            vec![String],
            Bool,
            in_path,
        )))
        .with_function(ExtensionFunction::new("regex").with_overload(Overload::new(
            "string_matches_regex",
            vec![String, String],
            Bool,
            regex_match,
        )))
}

/// CEL 运行时回调入口：按被调用的函数名分派到扩展函数注册表
pub(crate) fn dispatch(ftx: &FunctionContext, Arguments(args): Arguments) -> ResolveResult {
    let mut values = Vec::with_capacity(args.len() + 1);
    if let Some(this) = &ftx.this {
        values.push(this.clone());
    }
    values.extend(args.iter().cloned());

    extension_library()
        .call(ftx.name.as_str(), &values)
        .map_err(|message| ftx.error(message))
}

// 以下实现的参数类型已由重载签名保证

fn contains_substring(args: &[ContextValue]) -> std::result::Result<Value, String> {
    match args {
        [ContextValue::String(s), ContextValue::String(substr)] => {
            Ok(Value::Bool(s.contains(substr.as_str())))
        }
        _ => Err(signature_violation("contains")),
    }
}

fn contains_element(args: &[ContextValue]) -> std::result::Result<Value, String> {
    match args {
        [ContextValue::StringList(items), ContextValue::String(item)] => {
            Ok(Value::Bool(items.contains(item)))
        }
        _ => Err(signature_violation("contains")),
    }
}

fn contains_key(args: &[ContextValue]) -> std::result::Result<Value, String> {
    match args {
        [ContextValue::StringMap(map), ContextValue::String(key)] => {
            Ok(Value::Bool(map.contains_key(key)))
        }
        _ => Err(signature_violation("containsKey")),
    }
}

/// 键不存在时返回空字符串，与值本身为空字符串无法区分
fn get_map_value(args: &[ContextValue]) -> std::result::Result<Value, String> {
    match args {
        [ContextValue::StringMap(map), ContextValue::String(key)] => {
            let value = map.get(key).cloned().unwrap_or_default();
            Ok(Value::String(Arc::new(value)))
        }
        _ => Err(signature_violation("getMapValue")),
    }
}

fn has_prefix(args: &[ContextValue]) -> std::result::Result<Value, String> {
    match args {
        [ContextValue::String(s), ContextValue::String(prefix)] => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        _ => Err(signature_violation("hasPrefix")),
    }
}

fn in_path(args: &[ContextValue]) -> std::result::Result<Value, String> {
    match args {
        [ContextValue::String(name)] => Ok(Value::Bool(lookup_executable(name).is_some())),
        _ => Err(signature_violation("inPath")),
    }
}

/// 正则表达式匹配（子串搜索语义，模式未锚定时匹配任意位置）
fn regex_match(args: &[ContextValue]) -> std::result::Result<Value, String> {
    match args {
        [ContextValue::String(input), ContextValue::String(pattern)] => {
            let regex = Regex::new(pattern)
                .map_err(|e| format!("无效的正则表达式 '{}': {}", pattern, e))?;
            Ok(Value::Bool(regex.is_match(input)))
        }
        _ => Err(signature_violation("regex")),
    }
}

fn signature_violation(name: &str) -> String {
    format!("函数 '{}' 的参数与重载签名不一致", name)
}

/// 在 PATH 中查找可执行文件
///
/// 任何查找失败（PATH 未设置、文件不存在、无执行权限）都返回 `None`。
pub fn lookup_executable(name: &str) -> Option<PathBuf> {
    let search_path = std::env::var_os("PATH")?;
    lookup_in(name, &search_path)
}

/// 在给定的搜索路径中查找可执行文件
///
/// 名称中包含路径分隔符时直接检查该路径，不搜索目录列表；空目录项被忽略。
pub fn lookup_in(name: &str, search_path: &OsStr) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') || name.contains(std::path::MAIN_SEPARATOR) {
        return executable_candidates(Path::new(name))
            .into_iter()
            .find(|p| is_executable(p));
    }

    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| executable_candidates(&dir.join(name)))
        .find(|p| is_executable(p))
}

#[cfg(not(windows))]
fn executable_candidates(path: &Path) -> Vec<PathBuf> {
    vec![path.to_path_buf()]
}

#[cfg(windows)]
fn executable_candidates(path: &Path) -> Vec<PathBuf> {
    let exts = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    let mut candidates = vec![path.to_path_buf()];
    for ext in exts.split(';').filter(|e| !e.is_empty()) {
        let mut candidate = path.as_os_str().to_os_string();
        candidate.push(ext);
        candidates.push(PathBuf::from(candidate));
    }
    candidates
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// 获取 CEL 运行时值的类型名称
pub fn value_type_name(value: &Value) -> String {
    match value {
        Value::Int(_) => "int".to_string(),
        Value::UInt(_) => "uint".to_string(),
        Value::Float(_) => "double".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Bytes(_) => "bytes".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Null => "null_type".to_string(),
        Value::List(items) => match ContextValue::from_cel(value) {
            Some(_) if !items.is_empty() => "list(string)".to_string(),
            _ => "list".to_string(),
        },
        Value::Map(_) => match ContextValue::from_cel(value) {
            Some(_) => "map(string, string)".to_string(),
            None => "map".to_string(),
        },
        _ => "dyn".to_string(),
    }
}

fn join_types(types: impl Iterator<Item = String>) -> String {
    types.collect::<Vec<_>>().join(", ")
}
