use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;
use crate::core::plate::frame::{
    BoundingBox, Detection, DetectionKind, Direction, EvidenceCrop, QualityMetrics,
    RecognitionCandidate,
};
use crate::plate_extractor::pipeline::FrameInput;

/// 录制下来的检测脚本，用于离线回放
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureScript {
    #[serde(default)]
    pub camera: String,
    /// 脚本自带的方向，覆盖配置里的默认值
    #[serde(default)]
    pub direction: Option<Direction>,
    pub frames: Vec<CapturedFrame>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedFrame {
    #[serde(rename = "timestampMs")]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub detections: Vec<CapturedDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedDetection {
    pub kind: DetectionKind,
    /// [x1, y1, x2, y2]
    #[serde(rename = "box")]
    pub bbox: [f32; 4],
    pub confidence: f32,
    #[serde(default)]
    pub crop: Option<CapturedCrop>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedCrop {
    /// 缺省时使用检测框
    #[serde(rename = "box", default)]
    pub bbox: Option<[f32; 4]>,
    #[serde(default)]
    pub quality: Option<QualityMetrics>,
    #[serde(default)]
    pub candidates: Vec<RecognitionCandidate>,
}

fn to_bbox(raw: [f32; 4]) -> Result<BoundingBox, PipelineError> {
    let [x1, y1, x2, y2] = raw;
    BoundingBox::new(x1, y1, x2, y2)
}

fn check_confidence(frame: usize, what: &str, confidence: f32) -> Result<(), PipelineError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        return Ok(());
    }
    Err(PipelineError::InvalidFrame {
        frame,
        message: format!("{} confidence {} outside [0, 1]", what, confidence),
    })
}

impl CapturedFrame {
    pub fn to_input(&self, frame: usize) -> Result<FrameInput, PipelineError> {
        let mut input = FrameInput::new(self.timestamp_ms);

        for det in &self.detections {
            check_confidence(frame, "detection", det.confidence)?;

            let bbox = to_bbox(det.bbox)?;
            let crop = match &det.crop {
                Some(raw) => {
                    for candidate in &raw.candidates {
                        check_confidence(frame, "candidate", candidate.confidence)?;
                    }

                    let crop_box = match raw.bbox {
                        Some(b) => to_bbox(b)?,
                        None => bbox,
                    };
                    let mut crop = EvidenceCrop::new(self.timestamp_ms, crop_box)
                        .with_candidates(raw.candidates.clone());
                    if let Some(quality) = raw.quality {
                        crop = crop.with_quality(quality);
                    }
                    Some(crop)
                }
                None => None,
            };

            let detection = Detection {
                kind: det.kind,
                bbox,
                confidence: det.confidence,
                track_id: None,
            };
            input = input.with_detection(detection, crop);
        }

        Ok(input)
    }
}

impl CaptureScript {
    /// 转成流水线输入；时间戳必须单调不减
    pub fn to_inputs(&self) -> Result<Vec<FrameInput>, PipelineError> {
        let mut last_ts = 0u64;
        let mut inputs = Vec::with_capacity(self.frames.len());

        for (index, frame) in self.frames.iter().enumerate() {
            if frame.timestamp_ms < last_ts {
                return Err(PipelineError::InvalidFrame {
                    frame: index,
                    message: format!(
                        "timestamp {} goes backwards from {}",
                        frame.timestamp_ms, last_ts
                    ),
                });
            }
            last_ts = frame.timestamp_ms;
            inputs.push(frame.to_input(index)?);
        }

        Ok(inputs)
    }

    pub fn last_timestamp_ms(&self) -> u64 {
        self.frames.last().map_or(0, |f| f.timestamp_ms)
    }
}
