use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Table};
use restassay::config::{ConfigLoader, RestAssayConfig};
use restassay::http::HttpTransport;
use restassay::model::CallSequence;
use restassay::parser::SequenceFileParser;
use restassay::perf::PerformanceRecorder;
use restassay::runner::{CallExecutor, HeaderAuthenticator, SuiteRegistry, SuiteRunner, TestReporter};
use restassay::variable::VariableResolver;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 执行测试描述文件，每个文件是一个 Call 序列
    Run(RunArgs),
    /// 只解析并列出文件中的 Call
    List {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Args)]
pub struct RunArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// 配置文件路径，默认向上查找 restassay.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 使用配置文件中的环境
    #[arg(long)]
    pub env: Option<String>,

    /// 覆盖变量 key=value，可重复
    #[arg(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    #[arg(long)]
    pub base_url: Option<String>,

    /// suite 名称，默认使用第一个序列的名称
    #[arg(long)]
    pub name: Option<String>,

    /// 并发执行各个序列
    #[arg(long)]
    pub parallel: bool,

    #[arg(short, long)]
    pub verbose: bool,

    /// 以 JSON 输出报告
    #[arg(long)]
    pub json: bool,

    #[arg(long)]
    pub track_performance: bool,

    /// 默认 poll 时长（秒）
    #[arg(long, value_name = "SECS")]
    pub poll_duration: Option<u64>,

    /// 默认 poll 间隔（秒）
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    ConfigLoader::parse_cli_var(s).ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn load_config(path: Option<&Path>) -> Result<RestAssayConfig> {
    let config = match path {
        Some(path) => ConfigLoader::load_from_path(path)?,
        None => ConfigLoader::find_and_load()?.unwrap_or_default(),
    };
    Ok(config)
}

fn load_sequences(files: &[PathBuf]) -> Result<Vec<CallSequence>> {
    let parser = SequenceFileParser::new();
    files
        .iter()
        .map(|path| {
            parser
                .parse_file(path)
                .map(|parsed| parsed.into_sequence())
                .with_context(|| format!("Failed to parse {}", path.display()))
        })
        .collect()
}

/// 执行测试，返回是否全部通过
pub async fn run(args: RunArgs) -> Result<bool> {
    let config = load_config(args.config.as_deref())?;
    let sequences = load_sequences(&args.files)?;
    let seed = ConfigLoader::build_seed(&config, args.env.as_deref(), &args.vars)?;

    let mut settings = config.executor_settings();
    if let Some(secs) = args.poll_duration {
        settings.poll_duration = Duration::from_secs(secs);
    }
    if let Some(secs) = args.poll_interval {
        settings.poll_interval = Duration::from_secs(secs);
    }

    let mut transport = HttpTransport::new()?;
    if let Some(root) = &config.suite.upload_root {
        transport = transport.with_upload_root(root);
    }
    if let Some(dir) = &config.suite.download_dir {
        transport = transport.with_download_dir(dir);
    }

    let mut runner = SuiteRunner::new(Arc::new(SuiteRegistry::new()), Arc::new(transport))
        .with_executor(CallExecutor::new(settings))
        .with_seed(seed)
        .parallel(args.parallel);

    if let Some(base_url) = args.base_url.as_ref().or(config.suite.base_url.as_ref()) {
        runner = runner.with_base_url(VariableResolver::resolve_env_vars(base_url));
    }
    for (name, value) in config.resolved_headers() {
        runner = runner.with_header(name, value);
    }
    if let Some(auth) = &config.suite.auth {
        let value = VariableResolver::resolve_env_vars(&auth.value);
        runner = runner.with_authenticator(Arc::new(HeaderAuthenticator::new(&auth.header, value)));
    }

    let recorder = (args.track_performance || config.suite.track_performance)
        .then(|| Arc::new(PerformanceRecorder::new()));
    if let Some(recorder) = &recorder {
        runner = runner.with_tracker(recorder.clone());
    }

    let name = args
        .name
        .clone()
        .or_else(|| sequences.first().map(|s| s.name.clone()))
        .unwrap_or_else(|| "suite".to_string());
    let report = runner.run(&name, sequences).await;

    let reporter = TestReporter::new(args.verbose);
    if args.json {
        reporter.print_json(&report)?;
    } else {
        reporter.print_report(&report);
        if let Some(recorder) = &recorder {
            reporter.print_performance(&recorder.entries());
        }
    }

    Ok(report.passed())
}

/// 列出文件中的 Call
pub fn list(files: &[PathBuf]) -> Result<()> {
    for sequence in load_sequences(files)? {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec![
            "#", "Call", "Method", "URL", "Status", "Poll", "Variables",
        ]);

        for (index, call) in sequence.calls.iter().enumerate() {
            let poll = if call.poll {
                let secs = |d: Option<Duration>| {
                    d.map(|d| format!("{}s", d.as_secs()))
                        .unwrap_or_else(|| "default".to_string())
                };
                format!("{} / {}", secs(call.poll_duration), secs(call.poll_interval))
            } else {
                "-".to_string()
            };
            let vars: Vec<String> = call.variables.iter().map(ToString::to_string).collect();

            table.add_row(vec![
                Cell::new(index + 1),
                Cell::new(&call.name),
                Cell::new(call.method),
                Cell::new(&call.url).add_attribute(Attribute::Dim),
                Cell::new(call.expected_status),
                Cell::new(poll),
                Cell::new(vars.join("\n")),
            ]);
        }

        let source = sequence
            .source_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!("\n{} ({})", sequence.name, source);
        println!("{}", table);
    }
    Ok(())
}
