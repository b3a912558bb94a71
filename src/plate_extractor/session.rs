//! 会话聚合：把同一轨迹的证据裁剪图攒到一起，在合适的时机封存
//!
//! - 首次接触某条轨迹时开启会话
//! - 证据数达到上限立即封存（Capacity）
//! - 轨迹丢失超过阈值后封存（TrackLost）
//! - 证据不足 `min_crops` 的会话直接丢弃，不会产生事件
//! - 封存后不可变；同一轨迹后续的观测会开启新会话

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::state_machine::TrackStatus;
use super::tracker::{Track, Tracker};
use crate::core::logging::PipelineLogger;
use crate::core::plate::frame::{BoundingBox, Detection, EvidenceCrop, SessionId, TrackId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_crops: usize,
    pub min_crops: usize,
    /// 从最后一次真实检测开始计时
    pub lost_timeout_ms: u64,
    /// 已封存会话保留多久
    pub retention_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_crops: 20,
            min_crops: 3,
            lost_timeout_ms: 5000,
            retention_ms: 5 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    Capacity,
    TrackLost,
    Completed,
}

impl FinalizeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizeReason::Capacity => "capacity",
            FinalizeReason::TrackLost => "track_lost",
            FinalizeReason::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub track_id: TrackId,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub last_detection_ms: u64,
    pub last_bbox: BoundingBox,
    pub crops: Vec<EvidenceCrop>,
    pub status: SessionStatus,
    pub finalize_reason: Option<FinalizeReason>,
    pub finalized_at_ms: Option<u64>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn crop_count(&self) -> usize {
        self.crops.len()
    }

    pub fn duration_ms(&self) -> u64 {
        self.ended_at_ms.saturating_sub(self.started_at_ms)
    }
}

impl AsRef<[EvidenceCrop]> for Session {
    fn as_ref(&self) -> &[EvidenceCrop] {
        &self.crops
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Finalized(Session),
    Discarded {
        session_id: SessionId,
        track_id: TrackId,
        crop_count: usize,
        reason: FinalizeReason,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub active: usize,
    pub retained: usize,
    pub opened: u64,
    pub finalized: u64,
    pub discarded: u64,
    pub purged: u64,
    pub avg_crops_per_session: f32,
}

pub struct SessionAggregator {
    sessions: BTreeMap<SessionId, Session>,
    active_by_track: HashMap<TrackId, SessionId>,
    next_id: SessionId,
    config: SessionConfig,
    opened: u64,
    finalized: u64,
    discarded: u64,
    purged: u64,
    finalized_crops: u64,
    logger: PipelineLogger,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_logger(config, PipelineLogger::global())
    }

    pub fn with_logger(config: SessionConfig, logger: PipelineLogger) -> Self {
        Self {
            sessions: BTreeMap::new(),
            active_by_track: HashMap::new(),
            next_id: 1,
            config,
            opened: 0,
            finalized: 0,
            discarded: 0,
            purged: 0,
            finalized_crops: 0,
            logger: logger.scoped("plate_pipeline::session"),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 记录一次轨迹接触；达到容量上限时立即封存并返回结果
    pub fn observe(
        &mut self,
        track: &Track,
        detection: &Detection,
        now_ms: u64,
        crop: Option<EvidenceCrop>,
    ) -> Option<SessionOutcome> {
        let session_id = match self.active_by_track.get(&track.id) {
            Some(&id) => id,
            None => self.open(track.id, detection, now_ms),
        };

        let reached_capacity = {
            let session = self.sessions.get_mut(&session_id)?;
            session.last_detection_ms = now_ms;
            session.last_bbox = detection.bbox;

            if let Some(crop) = crop {
                session.crops.push(crop);
                session.ended_at_ms = session.ended_at_ms.max(now_ms);
            }

            session.crops.len() >= self.config.max_crops
        };

        if reached_capacity {
            self.finalize(session_id, FinalizeReason::Capacity, now_ms)
        } else {
            None
        }
    }

    fn open(&mut self, track_id: TrackId, detection: &Detection, now_ms: u64) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        self.opened += 1;

        self.sessions.insert(
            id,
            Session {
                id,
                track_id,
                started_at_ms: now_ms,
                ended_at_ms: now_ms,
                last_detection_ms: now_ms,
                last_bbox: detection.bbox,
                crops: Vec::with_capacity(self.config.max_crops),
                status: SessionStatus::Active,
                finalize_reason: None,
                finalized_at_ms: None,
            },
        );
        self.active_by_track.insert(track_id, id);

        self.logger.info(format_args!(
            "📸 session_id={} opened track_id={}",
            id, track_id
        ));
        id
    }

    /// 封存丢失轨迹的会话，并清理过期的已封存会话
    pub fn sweep_lost(&mut self, tracker: &Tracker, now_ms: u64) -> Vec<SessionOutcome> {
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.is_active())
            .filter(|s| {
                // 已被淘汰的轨迹视同丢失
                let track_gone = tracker
                    .track(s.track_id)
                    .map_or(true, |t| t.status != TrackStatus::Active);
                track_gone
                    && now_ms.saturating_sub(s.last_detection_ms) >= self.config.lost_timeout_ms
            })
            .map(|s| s.id)
            .collect();

        let outcomes = expired
            .into_iter()
            .filter_map(|id| self.finalize(id, FinalizeReason::TrackLost, now_ms))
            .collect();

        self.purge(now_ms);
        outcomes
    }

    /// 显式结束某条轨迹的当前会话
    pub fn complete(&mut self, track_id: TrackId, now_ms: u64) -> Option<SessionOutcome> {
        let session_id = *self.active_by_track.get(&track_id)?;
        self.finalize(session_id, FinalizeReason::Completed, now_ms)
    }

    pub fn complete_all(&mut self, now_ms: u64) -> Vec<SessionOutcome> {
        let active: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.id)
            .collect();

        active
            .into_iter()
            .filter_map(|id| self.finalize(id, FinalizeReason::Completed, now_ms))
            .collect()
    }

    fn finalize(
        &mut self,
        session_id: SessionId,
        reason: FinalizeReason,
        now_ms: u64,
    ) -> Option<SessionOutcome> {
        let session = self.sessions.get_mut(&session_id)?;
        if !session.is_active() {
            return None;
        }
        self.active_by_track.remove(&session.track_id);

        if session.crops.len() < self.config.min_crops {
            let track_id = session.track_id;
            let crop_count = session.crops.len();
            self.sessions.remove(&session_id);
            self.discarded += 1;

            self.logger.info(format_args!(
                "🗑️ session_id={} discarded reason={} crops={} min={}",
                session_id,
                reason.as_str(),
                crop_count,
                self.config.min_crops
            ));
            return Some(SessionOutcome::Discarded {
                session_id,
                track_id,
                crop_count,
                reason,
            });
        }

        session.status = SessionStatus::Finalized;
        session.finalize_reason = Some(reason);
        session.finalized_at_ms = Some(now_ms);

        self.finalized += 1;
        self.finalized_crops += session.crops.len() as u64;

        self.logger.info(format_args!(
            "✅ session_id={} finalized track_id={} reason={} crops={} duration_ms={}",
            session.id,
            session.track_id,
            reason.as_str(),
            session.crops.len(),
            session.duration_ms()
        ));

        Some(SessionOutcome::Finalized(session.clone()))
    }

    fn purge(&mut self, now_ms: u64) {
        let retention_ms = self.config.retention_ms;
        let before = self.sessions.len();

        self.sessions.retain(|_, s| match s.finalized_at_ms {
            Some(at) => now_ms.saturating_sub(at) < retention_ms,
            None => true,
        });

        let removed = before - self.sessions.len();
        if removed > 0 {
            self.purged += removed as u64;
            self.logger.debug(format_args!("purged {} finalized sessions", removed));
        }
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn active_session_for(&self, track_id: TrackId) -> Option<&Session> {
        self.active_by_track
            .get(&track_id)
            .and_then(|id| self.sessions.get(id))
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            active: self.active_by_track.len(),
            retained: self.sessions.len() - self.active_by_track.len(),
            opened: self.opened,
            finalized: self.finalized,
            discarded: self.discarded,
            purged: self.purged,
            avg_crops_per_session: if self.finalized > 0 {
                self.finalized_crops as f32 / self.finalized as f32
            } else {
                0.0
            },
        }
    }

    pub fn reset(&mut self) {
        self.sessions.clear();
        self.active_by_track.clear();
        self.next_id = 1;
        self.opened = 0;
        self.finalized = 0;
        self.discarded = 0;
        self.purged = 0;
        self.finalized_crops = 0;
    }
}

impl Default for SessionAggregator {
    fn default() -> Self {
        Self::new()
    }
}
