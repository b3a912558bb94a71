//! 车牌事件引擎

use log::info;

use super::models::CaptureScript;
use crate::core::config::PipelineConfig;
use crate::core::error::PipelineError;
use crate::core::plate::frame::Direction;
use crate::core::plate::recognizer::{CandidateSource, EmbeddedCandidates};
use crate::plate_extractor::pipeline::{
    FrameInput, PipelineOutcome, PipelineStats, PlatePipeline,
};

/// 车牌事件引擎 - 跟踪 + 投票 + 校验 + 去重
///
/// ```ignore
/// let mut engine = PlateEngine::create(PipelineConfig::default());
/// let outcomes = engine.replay(&script)?;
/// let stats = engine.stats();
/// ```
pub struct PlateEngine {
    pipeline: PlatePipeline,
    source: Box<dyn CandidateSource>,
}

impl PlateEngine {
    /// 候选文本随裁剪图一起提供
    pub fn create(config: PipelineConfig) -> Self {
        Self::with_source(config, Box::new(EmbeddedCandidates))
    }

    pub fn with_source(config: PipelineConfig, source: Box<dyn CandidateSource>) -> Self {
        info!("🚦 PlateEngine: created direction={}", config.direction.as_str());
        Self {
            pipeline: PlatePipeline::with_config(config),
            source,
        }
    }

    pub fn direction(&self) -> Direction {
        self.pipeline.direction()
    }

    /// 同一个引擎在入口和出口之间切换时使用
    pub fn set_direction(&mut self, direction: Direction) {
        self.pipeline.set_direction(direction)
    }

    pub fn process_frame(&mut self, frame: FrameInput) -> Vec<PipelineOutcome> {
        self.pipeline.process_frame(frame, self.source.as_ref())
    }

    pub fn flush(&mut self, now_ms: u64) -> Vec<PipelineOutcome> {
        self.pipeline.flush(now_ms, self.source.as_ref())
    }

    /// 回放整段脚本，结尾时结束所有会话。输入有问题时一帧都不处理。
    pub fn replay(
        &mut self,
        script: &CaptureScript,
    ) -> Result<Vec<PipelineOutcome>, PipelineError> {
        let inputs = script.to_inputs()?;

        let mut outcomes = Vec::new();
        for input in inputs {
            outcomes.extend(self.process_frame(input));
        }
        outcomes.extend(self.flush(script.last_timestamp_ms()));

        info!(
            "🎞️ PlateEngine: replayed camera='{}' frames={} outcomes={}",
            script.camera,
            script.frames.len(),
            outcomes.len()
        );
        Ok(outcomes)
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn reset(&mut self) {
        self.pipeline.reset()
    }
}

impl Drop for PlateEngine {
    fn drop(&mut self) {
        info!("🗑️ PlateEngine: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::loader::parse_capture_script;
    use crate::core::plate::recognizer::MockCandidateSource;

    fn create_test_script(frames: u64, text: &str) -> String {
        let frames: Vec<String> = (0..frames)
            .map(|i| {
                let x = 100 + i * 4;
                format!(
                    r#"{{ "timestampMs": {}, "detections": [ {{
                        "kind": "plate", "box": [{}, 200, {}, 240], "confidence": 0.9,
                        "crop": {{ "candidates": [{{ "text": "{}", "confidence": 0.8 }}] }}
                    }} ] }}"#,
                    i * 40,
                    x,
                    x + 120,
                    text
                )
            })
            .collect();
        format!(r#"{{ "camera": "test", "frames": [{}] }}"#, frames.join(","))
    }

    #[test]
    fn test_replay_emits_event() {
        let script = parse_capture_script(&create_test_script(5, "ঢাকা-গখ-১২৩৪")).unwrap();
        let mut engine = PlateEngine::create(PipelineConfig::default());

        let outcomes = engine.replay(&script).unwrap();
        assert_eq!(outcomes.len(), 1);

        let event = outcomes[0].event().unwrap();
        assert_eq!(event.plate_text, "ঢাকা-গখ-১২৩৪");
        assert_eq!(engine.stats().frames, 5);
        assert_eq!(engine.stats().events, 1);
    }

    #[test]
    fn test_custom_source_overrides_embedded_text() {
        let script = parse_capture_script(&create_test_script(4, "garbage")).unwrap();
        let mut engine = PlateEngine::with_source(
            PipelineConfig::default(),
            Box::new(MockCandidateSource::with_fixed_text("চট্টগ্রাম-কখ-৯৮৭", 0.9)),
        );

        let outcomes = engine.replay(&script).unwrap();
        assert_eq!(outcomes[0].event().unwrap().plate_text, "চট্টগ্রাম-কখ-৯৮৭");
    }

    #[test]
    fn test_direction_switch_keeps_dedup_history() {
        let entry = parse_capture_script(&create_test_script(4, "ঢাকা-গখ-১২৩৪")).unwrap();
        let mut engine = PlateEngine::create(PipelineConfig::default());
        assert_eq!(engine.direction(), Direction::Entry);
        assert!(engine.replay(&entry).unwrap()[0].event().is_some());

        // 同一车牌 2 分钟后从出口离开
        let mut exit = entry.clone();
        for frame in &mut exit.frames {
            frame.timestamp_ms += 2 * 60 * 1000;
        }
        engine.set_direction(Direction::Exit);

        let outcomes = engine.replay(&exit).unwrap();
        assert!(matches!(outcomes[0], PipelineOutcome::Duplicate(_)));
        let event = outcomes[0].event().unwrap();
        assert_eq!(event.direction, Direction::Exit);
        assert_eq!(event.dedup.previous_event, Some(1));
    }

    #[test]
    fn test_reset_clears_stats() {
        let script = parse_capture_script(&create_test_script(3, "ঢাকা-গখ-১২৩৪")).unwrap();
        let mut engine = PlateEngine::create(PipelineConfig::default());
        engine.replay(&script).unwrap();

        engine.reset();
        assert_eq!(engine.stats().frames, 0);
        assert_eq!(engine.stats().events, 0);
    }
}
