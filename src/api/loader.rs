//! 回放脚本加载：所有输入问题都在这里报错，流水线本身不返回错误

use std::fs;
use std::path::Path;

use super::models::CaptureScript;
use crate::core::error::PipelineError;

pub fn load_capture_script<P: AsRef<Path>>(path: P) -> Result<CaptureScript, PipelineError> {
    let text = fs::read_to_string(path)?;
    parse_capture_script(&text)
}

/// 解析并检查每一帧（框、置信度、时间戳顺序）
pub fn parse_capture_script(text: &str) -> Result<CaptureScript, PipelineError> {
    let script: CaptureScript = serde_json::from_str(text)?;
    script.to_inputs()?;
    Ok(script)
}
