use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::error::PipelineError;
use super::plate::deduplicator::DedupConfig;
use super::plate::frame::Direction;
use super::plate::manager::{RecognitionConfig, VoteCropPolicy};
use crate::plate_extractor::session::SessionConfig;
use crate::plate_extractor::tracker::TrackerConfig;

/// 整条流水线的配置，所有字段都有默认值，配置文件里只需写要改的部分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub session: SessionConfig,
    pub recognition: RecognitionConfig,
    pub dedup: DedupConfig,
    /// 摄像头朝向决定事件方向
    pub direction: Direction,
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path)?;
        Self::from_json5_str(&text)
    }

    pub fn from_json5_str(text: &str) -> Result<Self, PipelineError> {
        let config: PipelineConfig = json5::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        let iou = self.tracker.iou_threshold;
        if !iou.is_finite() || !(0.0..1.0).contains(&iou) {
            return invalid(format!("tracker.iou_threshold must be in [0, 1), got {}", iou));
        }
        if !self.tracker.frame_rate.is_finite() || self.tracker.frame_rate <= 0.0 {
            return invalid(format!(
                "tracker.frame_rate must be positive, got {}",
                self.tracker.frame_rate
            ));
        }
        if self.tracker.max_history == 0 {
            return invalid("tracker.max_history must be at least 1".to_string());
        }

        if self.session.max_crops == 0 {
            return invalid("session.max_crops must be at least 1".to_string());
        }
        if self.session.min_crops > self.session.max_crops {
            return invalid(format!(
                "session.min_crops ({}) exceeds session.max_crops ({})",
                self.session.min_crops, self.session.max_crops
            ));
        }

        let selector = &self.recognition.selector;
        let weights = [
            ("sharpness_weight", selector.sharpness_weight),
            ("contrast_weight", selector.contrast_weight),
            ("area_weight", selector.area_weight),
            ("default_sharpness", selector.default_sharpness),
            ("default_contrast", selector.default_contrast),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!(
                    "recognition.selector.{} must be non-negative, got {}",
                    name, value
                ));
            }
        }
        if !selector.reference_area.is_finite() || selector.reference_area <= 0.0 {
            return invalid(format!(
                "recognition.selector.reference_area must be positive, got {}",
                selector.reference_area
            ));
        }

        match self.recognition.vote_crops {
            VoteCropPolicy::Top { count: 0 } | VoteCropPolicy::Diverse { count: 0 } => {
                return invalid("recognition.vote_crops.count must be at least 1".to_string());
            }
            _ => {}
        }

        let validator = &self.recognition.validator;
        if validator.fallback_min_len > validator.fallback_max_len {
            return invalid(format!(
                "recognition.validator.fallback_min_len ({}) exceeds fallback_max_len ({})",
                validator.fallback_min_len, validator.fallback_max_len
            ));
        }

        if self.dedup.history_capacity == 0 {
            return invalid("dedup.history_capacity must be at least 1".to_string());
        }

        Ok(())
    }
}
