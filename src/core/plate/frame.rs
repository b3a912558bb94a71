use serde::{Deserialize, Serialize};

use crate::core::error::PipelineError;

pub type TrackId = u64;
pub type SessionId = u64;
pub type EventId = u64;

/// 源帧像素坐标下的轴对齐框，x2 > x1 且 y2 > y1
///
/// 反序列化同样经过 [`BoundingBox::new`] 校验。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBox")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

#[derive(Deserialize)]
struct RawBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl TryFrom<RawBox> for BoundingBox {
    type Error = PipelineError;

    fn try_from(raw: RawBox) -> Result<Self, Self::Error> {
        BoundingBox::new(raw.x1, raw.y1, raw.x2, raw.y2)
    }
}

impl BoundingBox {
    /// 调用方在进入 pipeline 之前用它校验输入框
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self, PipelineError> {
        let invalid = |reason| PipelineError::InvalidBox {
            x1,
            y1,
            x2,
            y2,
            reason,
        };

        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(invalid("non-finite coordinate"));
        }
        if x2 <= x1 {
            return Err(invalid("non-positive width"));
        }
        if y2 <= y1 {
            return Err(invalid("non-positive height"));
        }

        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    Vehicle,
    Plate,
}

/// 单帧检测结果；`track_id` 由 Tracker 写入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub kind: DetectionKind,
    pub bbox: BoundingBox,
    pub confidence: f32,
    #[serde(default)]
    pub track_id: Option<TrackId>,
}

impl Detection {
    pub fn plate(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            kind: DetectionKind::Plate,
            bbox,
            confidence,
            track_id: None,
        }
    }

    pub fn vehicle(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            kind: DetectionKind::Vehicle,
            bbox,
            confidence,
            track_id: None,
        }
    }
}

/// 每项预先归一化到 [0,1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub sharpness: f32,
    pub contrast: f32,
    pub normalized_area: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionCandidate {
    pub text: String,
    pub confidence: f32,
    #[serde(default)]
    pub script: Option<String>,
}

impl RecognitionCandidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            script: None,
        }
    }
}

/// 车牌裁剪证据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCrop {
    pub timestamp_ms: u64,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub quality: Option<QualityMetrics>,
    /// 识别器对这张图给出的候选（多个备选）
    #[serde(default)]
    pub candidates: Vec<RecognitionCandidate>,
}

impl EvidenceCrop {
    pub fn new(timestamp_ms: u64, bbox: BoundingBox) -> Self {
        Self {
            timestamp_ms,
            bbox,
            quality: None,
            candidates: Vec::new(),
        }
    }

    pub fn with_quality(mut self, quality: QualityMetrics) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<RecognitionCandidate>) -> Self {
        self.candidates = candidates;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Entry,
    Exit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }
}
