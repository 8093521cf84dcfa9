// Data Fetch 命令行工具
// 不启动 HTTP 服务，直接在当前进程内加载插件并执行会话操作

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use data_fetch::config::AppConfig;
use data_fetch::logging::{LoggingSetup, OperationContext};
use data_fetch::plugins::{ConfigFieldSpec, FieldKind, PluginHost};

/// Data Fetch 命令行工具
#[derive(Parser, Debug)]
#[command(name = "data-fetch-cli", version, about, long_about = None)]
struct Cli {
    /// 覆盖配置中的插件目录
    #[arg(long, global = true)]
    plugins_dir: Option<PathBuf>,

    /// 日志级别
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描插件目录并列出连接器
    List,
    /// 显示连接器的配置项
    Fields {
        /// 插件 ID
        plugin_id: String,
    },
    /// 创建会话、测试连接、提取数据后销毁会话
    Sample {
        /// 插件 ID
        plugin_id: String,
        /// JSON 对象形式的会话配置
        #[arg(long, conflicts_with = "set")]
        config: Option<String>,
        /// key=value 形式的配置项，可重复
        #[arg(long = "set", value_parser = parse_key_value)]
        set: Vec<(String, String)>,
        /// 跳过连接测试
        #[arg(long)]
        skip_test: bool,
    },
    /// 加载单个动态库并报告其描述信息
    Check {
        /// 动态库路径
        path: String,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("配置项格式应为 key=value: {}", raw))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("加载配置失败")?;
    if let Some(dir) = &cli.plugins_dir {
        config.plugins.directory = dir.display().to_string();
    }
    config.logging.level = cli.log_level.clone();
    config.logging.file_enabled = false;
    // check 由本地操作者显式给出路径
    if matches!(cli.command, Commands::Check { .. }) {
        config.plugins.allow_external_paths = true;
    }
    config.validate().context("配置校验失败")?;

    let _log_guard = LoggingSetup::init(&config.logging)?;
    let host = PluginHost::new(&config.plugins);

    let result = match cli.command {
        Commands::List => list(&host, cli.json),
        Commands::Fields { plugin_id } => fields(&host, &plugin_id, cli.json),
        Commands::Sample {
            plugin_id,
            config,
            set,
            skip_test,
        } => sample(&host, &plugin_id, config.as_deref(), set, skip_test),
        Commands::Check { path } => check(&host, &path, cli.json),
    };

    host.shutdown();
    result
}

fn load_directory(host: &PluginHost) -> Result<()> {
    let report = host.load_all()?;
    for failure in &report.failed {
        eprintln!("跳过 {}: [{}] {}", failure.path, failure.error_code, failure.message);
    }
    Ok(())
}

fn list(host: &PluginHost, json: bool) -> Result<()> {
    let context = OperationContext::new("list");
    let _span = context.span().entered();

    load_directory(host)?;
    let summaries = host.connector_summaries();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else if summaries.is_empty() {
        println!("插件目录 {} 中没有可用的连接器", host.loader().plugins_directory().display());
    } else {
        for summary in &summaries {
            println!(
                "{:<32} {:<20} v{}  {}",
                summary.descriptor.id, summary.descriptor.name, summary.descriptor.api_version, summary.source
            );
        }
    }

    context.finish();
    Ok(())
}

fn fields(host: &PluginHost, plugin_id: &str, json: bool) -> Result<()> {
    let context = OperationContext::new("fields").with_plugin_id(plugin_id);
    let _span = context.span().entered();

    load_directory(host)?;
    let fields = host.config_fields(plugin_id)?;
    print_fields(&fields, json)?;

    context.finish();
    Ok(())
}

fn sample(
    host: &PluginHost,
    plugin_id: &str,
    config: Option<&str>,
    set: Vec<(String, String)>,
    skip_test: bool,
) -> Result<()> {
    let context = OperationContext::new("sample").with_plugin_id(plugin_id);
    let _span = context.span().entered();

    load_directory(host)?;
    let handle = match config {
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("--config 不是合法的 JSON")?;
            host.create_session(plugin_id, &value)?
        }
        None => {
            let map: HashMap<String, String> = set.into_iter().collect();
            host.create_session_from_map(plugin_id, &map)?
        }
    };
    eprintln!("会话已创建: {}", handle);

    let outcome = (|| -> Result<String> {
        if !skip_test {
            host.ensure_connected(&handle)?;
            eprintln!("连接测试通过");
        }
        Ok(host.fetch_data(&handle)?)
    })();

    host.destroy_session(handle)?;

    let payload = outcome?;
    match serde_json::from_str::<Value>(&payload) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{}", payload),
    }

    context.finish();
    Ok(())
}

fn check(host: &PluginHost, path: &str, json: bool) -> Result<()> {
    let context = OperationContext::new("check");
    let _span = context.span().entered();

    let descriptor = host.load_plugin(path)?;
    let summary = host.connector(&descriptor.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("ID:       {}", summary.descriptor.id);
        println!("名称:     {}", summary.descriptor.name);
        println!("描述:     {}", summary.descriptor.description);
        println!("ABI 版本: {}", summary.descriptor.api_version);
        println!("来源:     {}", summary.source);
        print_fields(&host.config_fields(&descriptor.id)?, false)?;
    }

    context.finish();
    Ok(())
}

fn print_fields(fields: &[ConfigFieldSpec], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(fields)?);
        return Ok(());
    }
    if fields.is_empty() {
        println!("（无配置项）");
    }

    for field in fields {
        let kind = field.kind();
        let kind_label = match &kind {
            FieldKind::Text => "文本",
            FieldKind::Select => "下拉",
            FieldKind::Password => "密码",
            FieldKind::Other(name) => name.as_str(),
        };

        let mut line = format!("{:<20} {:<10} {}", field.key, kind_label, field.label);
        if let Some(default) = field.display_default() {
            line.push_str(&format!(" (默认: {})", default));
        }
        if kind == FieldKind::Select {
            if let Some(options) = field.parsed_options() {
                line.push_str(&format!(" 选项: {}", options));
            }
        }
        println!("{}", line);
    }
    Ok(())
}
