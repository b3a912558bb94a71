use serde::Serialize;

use super::deduplicator::DedupResult;
use super::frame::{BoundingBox, Direction, EventId, SessionId, TrackId};
use super::validator::ValidationResult;
use super::voter::VoteResult;

/// 指向会话中被选为证据的那张裁剪图
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceRef {
    pub session_id: SessionId,
    pub crop_index: usize,
    pub timestamp_ms: u64,
    pub bbox: BoundingBox,
    pub quality_score: f32,
}

/// 识别事件，创建后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateEvent {
    pub id: EventId,
    pub plate_text: String,
    pub direction: Direction,
    pub timestamp_ms: u64,
    pub track_id: TrackId,
    pub session_id: SessionId,
    pub vote: VoteResult,
    pub validation: ValidationResult,
    pub dedup: DedupResult,
    pub evidence: Option<EvidenceRef>,
}

impl PlateEvent {
    pub fn is_duplicate(&self) -> bool {
        self.dedup.is_duplicate
    }
}
