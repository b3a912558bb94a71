use serde::{Deserialize, Serialize};

/// 轨迹生命周期：Active ⇄ Lost → Finished（终态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Active,
    Lost,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackEvent {
    /// 每个周期开始时，所有未结束的轨迹先标为丢失
    CycleStart,
    /// 本周期匹配到了检测框
    Matched,
    /// 匹配结束后按距最后一次检测的时间老化
    Aged { idle_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Unchanged,
    Suspended,
    Matched,
    Finished,
}

#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub max_lost_frames: u32,
    pub frame_rate: f64,
}

impl LifecycleConfig {
    /// 丢失多久（毫秒）后结束轨迹
    pub fn finish_after_ms(&self) -> f64 {
        if self.frame_rate <= 0.0 {
            return 0.0;
        }
        self.max_lost_frames as f64 * 1000.0 / self.frame_rate
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_lost_frames: 30,
            frame_rate: 30.0,
        }
    }
}

impl TrackStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TrackStatus::Finished)
    }

    pub fn transition(
        &self,
        event: TrackEvent,
        config: &LifecycleConfig,
    ) -> (TrackStatus, StatusChange) {
        match (self, event) {
            (TrackStatus::Finished, _) => (TrackStatus::Finished, StatusChange::Unchanged),

            (TrackStatus::Active, TrackEvent::CycleStart) => {
                (TrackStatus::Lost, StatusChange::Suspended)
            }
            (TrackStatus::Lost, TrackEvent::CycleStart) => {
                (TrackStatus::Lost, StatusChange::Unchanged)
            }

            (_, TrackEvent::Matched) => (TrackStatus::Active, StatusChange::Matched),

            (TrackStatus::Lost, TrackEvent::Aged { idle_ms }) => {
                if idle_ms as f64 >= config.finish_after_ms() {
                    (TrackStatus::Finished, StatusChange::Finished)
                } else {
                    (TrackStatus::Lost, StatusChange::Unchanged)
                }
            }
            (TrackStatus::Active, TrackEvent::Aged { .. }) => {
                (TrackStatus::Active, StatusChange::Unchanged)
            }
        }
    }
}
