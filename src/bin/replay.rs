use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use plate_pipeline::api::{load_capture_script, PlateEngine};
use plate_pipeline::core::plate::Direction;
use plate_pipeline::{init_logging, PipelineConfig, PipelineOutcome};

/// 回放录制的检测脚本，输出车牌事件
#[derive(Parser, Debug)]
#[command(author, version, about = "车牌事件离线回放", long_about = None)]
struct Args {
    /// 检测脚本（JSON）
    script: PathBuf,

    /// 流水线配置（JSON5），缺省使用默认值
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖方向: entry / exit
    #[arg(short, long)]
    direction: Option<String>,

    /// 只输出事件，不输出被拒绝和丢弃的会话
    #[arg(long)]
    events_only: bool,

    /// 格式化输出
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    camera: &'a str,
    outcomes: Vec<&'a PipelineOutcome>,
    stats: plate_pipeline::plate_extractor::PipelineStats,
}

fn parse_direction(value: &str) -> Result<Direction> {
    match value.to_lowercase().as_str() {
        "entry" | "in" => Ok(Direction::Entry),
        "exit" | "out" => Ok(Direction::Exit),
        other => anyhow::bail!("unknown direction '{}', expected entry or exit", other),
    }
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let script = load_capture_script(&args.script)
        .with_context(|| format!("failed to load capture script {}", args.script.display()))?;

    // 命令行 > 脚本 > 配置文件
    if let Some(direction) = script.direction {
        config.direction = direction;
    }
    if let Some(value) = &args.direction {
        config.direction = parse_direction(value)?;
    }

    info!(
        "▶️ replaying {} frames from {}",
        script.frames.len(),
        args.script.display()
    );

    let mut engine = PlateEngine::create(config);
    let outcomes = engine.replay(&script)?;

    let report = Report {
        camera: &script.camera,
        outcomes: outcomes
            .iter()
            .filter(|o| !args.events_only || o.event().is_some())
            .collect(),
        stats: engine.stats(),
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);

    Ok(())
}
