//! 车牌事件提取 - 从逐帧检测结果中得到去重后的出入事件
//!
//! 核心流程：
//! 1. IoU 贪心跟踪 - 为每个车牌框分配稳定的轨迹 ID
//! 2. 会话聚合 - 按轨迹收集证据裁剪图，丢失或攒满后封存
//! 3. 识别 - 选最佳证据帧、多帧候选投票、格式校验
//! 4. 事件去重 - 按进出方向区分时间窗口

pub mod pipeline;
pub mod session;
pub mod state_machine;
pub mod tracker;

pub use pipeline::{CropAssignment, FrameInput, PipelineOutcome, PipelineStats, PlatePipeline};
pub use session::{
    FinalizeReason, Session, SessionAggregator, SessionConfig, SessionOutcome, SessionStats,
    SessionStatus,
};
pub use state_machine::{LifecycleConfig, StatusChange, TrackEvent, TrackStatus};
pub use tracker::{CycleReport, Track, Tracker, TrackerConfig, TrackerStats};
