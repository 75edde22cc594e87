//! 规则评估命令行工具
//!
//! 从 JSON 文件加载上下文，对一组 CEL 规则求值并输出匹配结果。
//!
//! ```bash
//! # 评估单条规则
//! rule-eval --context ctx.json --rule 'artifact_type == "report"'
//!
//! # 从文件加载规则并输出 JSON 报告
//! rule-eval --context ctx.json --rules-file rules.txt --json
//!
//! # 严格模式：评估失败时返回错误
//! rule-eval --context ctx.json --rule 'a > b' --strict
//! ```

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use rule_engine::{evaluate_rule_set_report, Context, ExpressionEvaluator, RuleSetReport};
use rule_shared::config::AppConfig;
use rule_shared::observability;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

const SERVICE_NAME: &str = "rule-eval";

/// CEL 布尔规则评估工具
#[derive(Parser, Debug)]
#[command(name = "rule-eval")]
#[command(version, about = "CEL 布尔规则评估工具")]
struct Cli {
    /// 上下文 JSON 文件（"-" 表示标准输入）
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// 规则表达式，可重复指定
    #[arg(short, long = "rule")]
    rules: Vec<String>,

    /// 规则文件（每行一条表达式，忽略空行和 # 注释）
    #[arg(short = 'f', long)]
    rules_file: Option<PathBuf>,

    /// 以 JSON 格式输出报告
    #[arg(long)]
    json: bool,

    /// 严格模式：只评估一条规则，失败时返回错误
    #[arg(long)]
    strict: bool,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let mut obs_config = config.observability.clone().with_service_name(SERVICE_NAME);
    if let Some(level) = &cli.log_level {
        obs_config = obs_config.with_log_level(level);
    }
    observability::init(&obs_config)?;

    let context_path = cli.context.or(config.evaluation.context_file);
    let context = load_context(context_path.as_deref())?;

    let mut rules = cli.rules;
    if let Some(path) = cli.rules_file.or(config.evaluation.rules_file) {
        rules.extend(load_rules(&path)?);
    }
    if rules.is_empty() {
        bail!("未指定任何规则，请使用 --rule 或 --rules-file");
    }

    if cli.strict {
        if rules.len() != 1 {
            bail!("严格模式只能评估一条规则，当前有 {} 条", rules.len());
        }
        let matched = ExpressionEvaluator::evaluate(&rules[0], &context)?;
        println!("{}", matched);
        return Ok(());
    }

    let report = evaluate_rule_set_report(&rules, &context);
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    info!(
        total = report.total,
        matched = report.matched,
        "Evaluation complete"
    );
    Ok(())
}

/// 加载上下文，未指定时使用空上下文
fn load_context(path: Option<&Path>) -> Result<Context> {
    let Some(path) = path else {
        return Ok(Context::new());
    };

    let json = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("读取标准输入失败")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("读取上下文文件失败: {}", path.display()))?
    };

    Ok(Context::from_json(&json)?)
}

fn load_rules(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取规则文件失败: {}", path.display()))?;
    Ok(parse_rules(&text))
}

/// 每行一条规则，忽略空行和 # 开头的注释行
fn parse_rules(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn print_report(report: &RuleSetReport) {
    for outcome in &report.outcomes {
        let status = if outcome.matched {
            "MATCHED"
        } else {
            "NOT_MATCHED"
        };
        match &outcome.error {
            Some(error) => println!("[{}] {} => {} ({})", outcome.index, outcome.expression, status, error),
            None => println!("[{}] {} => {}", outcome.index, outcome.expression, status),
        }
    }
    println!("matched {}/{}", report.matched, report.total);
}
