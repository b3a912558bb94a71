//! 车牌识别的无状态部分与事件去重
//!
//! - 选帧：按质量给证据裁剪图打分
//! - 投票：多张图的候选文本取共识
//! - 校验：孟加拉车牌格式（严格 + 兜底）
//! - 去重：按进出方向区分时间窗口

pub mod deduplicator;
pub mod event;
pub mod frame;
pub mod manager;
pub mod recognizer;
pub mod selector;
pub mod validator;
pub mod voter;

pub use deduplicator::{
    DedupConfig, DedupReason, DedupResult, DedupStats, EventDeduplicator, EventDraft,
};
pub use event::{EvidenceRef, PlateEvent};
pub use frame::{
    BoundingBox, Detection, DetectionKind, Direction, EventId, EvidenceCrop, QualityMetrics,
    RecognitionCandidate, SessionId, TrackId,
};
pub use manager::{
    RecognitionConfig, RecognitionManager, RecognitionStats, SessionRecognition, VoteCropPolicy,
};
pub use recognizer::{CandidateSource, EmbeddedCandidates, MockCandidateSource};
pub use selector::{FrameSelector, ScoredCrop, SelectorConfig};
pub use validator::{
    PlateMetadata, PlateValidator, ValidationMode, ValidationResult, ValidatorConfig,
    VehicleCategory,
};
pub use voter::{CandidateVoter, VoteMethod, VoteResult, VoteTally};
