//! 基于 IoU 的贪心多目标跟踪
//!
//! 每个周期：
//! 1. 所有未结束的轨迹先标为 Lost
//! 2. 按检测顺序逐个匹配 IoU 最高（且严格大于阈值）的轨迹，一条轨迹一个周期只能匹配一次
//! 3. 没匹配上的检测新建轨迹，ID 从 1 单调递增、不复用
//! 4. 丢失超过 `max_lost_frames` 帧时长的轨迹结束；结束的轨迹只保留最近的若干条

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

use super::state_machine::{LifecycleConfig, StatusChange, TrackEvent, TrackStatus};
use crate::core::logging::PipelineLogger;
use crate::core::plate::frame::{BoundingBox, Detection, TrackId};

/// 置信度平滑：新值 = 0.7 * 旧值 + 0.3 * 检测值
const CONFIDENCE_KEEP: f32 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub iou_threshold: f32,
    pub max_lost_frames: u32,
    /// 名义帧率，用于把帧数换算成毫秒
    pub frame_rate: f64,
    pub max_finished_tracks: usize,
    pub max_history: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_lost_frames: 30,
            frame_rate: 30.0,
            max_finished_tracks: 10,
            max_history: 50,
        }
    }
}

impl TrackerConfig {
    fn lifecycle(&self) -> LifecycleConfig {
        LifecycleConfig {
            max_lost_frames: self.max_lost_frames,
            frame_rate: self.frame_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: TrackId,
    pub status: TrackStatus,
    pub created_at_ms: u64,
    pub last_seen_ms: u64,
    /// 最近一次匹配到的检测框
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub hits: u32,
    pub history: VecDeque<Detection>,
}

impl Track {
    fn spawn(id: TrackId, detection: &Detection, now_ms: u64) -> Self {
        let mut history = VecDeque::new();
        history.push_back(detection.clone());
        Self {
            id,
            status: TrackStatus::Active,
            created_at_ms: now_ms,
            last_seen_ms: now_ms,
            bbox: detection.bbox,
            confidence: detection.confidence,
            hits: 1,
            history,
        }
    }

    fn absorb(&mut self, detection: &Detection, now_ms: u64, max_history: usize) {
        self.bbox = detection.bbox;
        self.confidence =
            CONFIDENCE_KEEP * self.confidence + (1.0 - CONFIDENCE_KEEP) * detection.confidence;
        self.last_seen_ms = now_ms;
        self.hits += 1;

        self.history.push_back(detection.clone());
        while self.history.len() > max_history {
            self.history.pop_front();
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TrackStatus::Active
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_ms)
    }
}

/// 单个周期的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    /// (检测下标, 轨迹 ID)，覆盖本周期每一个检测
    pub assignments: Vec<(usize, TrackId)>,
    pub matched: usize,
    pub spawned: Vec<TrackId>,
    pub lost: Vec<TrackId>,
    pub finished: Vec<TrackId>,
    pub evicted: Vec<TrackId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerStats {
    pub cycles: u64,
    pub total_spawned: u64,
    pub active: usize,
    pub lost: usize,
    pub finished: usize,
}

pub struct Tracker {
    tracks: BTreeMap<TrackId, Track>,
    next_id: TrackId,
    cycles: u64,
    config: TrackerConfig,
    lifecycle: LifecycleConfig,
    logger: PipelineLogger,
}

impl Tracker {
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self::with_logger(config, PipelineLogger::global())
    }

    pub fn with_logger(config: TrackerConfig, logger: PipelineLogger) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            cycles: 0,
            lifecycle: config.lifecycle(),
            config,
            logger: logger.scoped("plate_pipeline::tracker"),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// 跑一个周期；匹配上的检测会被写入 `track_id`
    pub fn update(&mut self, detections: &mut [Detection], now_ms: u64) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport::default();

        for track in self.tracks.values_mut() {
            let (status, _) = track.status.transition(TrackEvent::CycleStart, &self.lifecycle);
            track.status = status;
        }

        let mut claimed: HashSet<TrackId> = HashSet::new();

        for (index, detection) in detections.iter_mut().enumerate() {
            let mut best: Option<(TrackId, f32)> = None;

            for track in self.tracks.values() {
                if track.status.is_finished() || claimed.contains(&track.id) {
                    continue;
                }
                let iou = track.bbox.iou(&detection.bbox);
                if iou <= self.config.iou_threshold {
                    continue;
                }
                // 严格大于才替换，同分保留先遇到的（ID 较小）
                if best.map_or(true, |(_, b)| iou > b) {
                    best = Some((track.id, iou));
                }
            }

            let track_id = match best.and_then(|(id, _)| self.tracks.get_mut(&id)) {
                Some(track) => {
                    let (status, _) = track.status.transition(TrackEvent::Matched, &self.lifecycle);
                    track.status = status;
                    detection.track_id = Some(track.id);
                    track.absorb(detection, now_ms, self.config.max_history);
                    report.matched += 1;
                    track.id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    detection.track_id = Some(id);
                    self.tracks.insert(id, Track::spawn(id, detection, now_ms));
                    report.spawned.push(id);
                    self.logger.info(format_args!(
                        "🆕 track_id={} spawned confidence={:.2}",
                        id, detection.confidence
                    ));
                    id
                }
            };

            claimed.insert(track_id);
            report.assignments.push((index, track_id));
        }

        for track in self.tracks.values_mut() {
            let idle_ms = track.idle_ms(now_ms);
            let (status, change) = track
                .status
                .transition(TrackEvent::Aged { idle_ms }, &self.lifecycle);
            track.status = status;

            match change {
                StatusChange::Finished => {
                    report.finished.push(track.id);
                    self.logger.info(format_args!(
                        "🏁 track_id={} finished idle_ms={} hits={}",
                        track.id, idle_ms, track.hits
                    ));
                }
                _ if track.status == TrackStatus::Lost => report.lost.push(track.id),
                _ => {}
            }
        }

        report.evicted = self.evict_finished();

        self.logger.debug(format_args!(
            "cycle={} detections={} matched={} spawned={} lost={} finished={} evicted={}",
            self.cycles,
            detections.len(),
            report.matched,
            report.spawned.len(),
            report.lost.len(),
            report.finished.len(),
            report.evicted.len()
        ));

        report
    }

    /// 只保留最近见到的 `max_finished_tracks` 条已结束轨迹
    fn evict_finished(&mut self) -> Vec<TrackId> {
        let mut finished: Vec<(u64, TrackId)> = self
            .tracks
            .values()
            .filter(|t| t.status.is_finished())
            .map(|t| (t.last_seen_ms, t.id))
            .collect();

        if finished.len() <= self.config.max_finished_tracks {
            return Vec::new();
        }

        // 新的在前
        finished.sort_by(|a, b| b.cmp(a));
        let evicted: Vec<TrackId> = finished
            .into_iter()
            .skip(self.config.max_finished_tracks)
            .map(|(_, id)| id)
            .collect();

        for id in &evicted {
            self.tracks.remove(id);
        }
        evicted
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn active_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values().filter(|t| t.is_active())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn stats(&self) -> TrackerStats {
        let mut stats = TrackerStats {
            cycles: self.cycles,
            total_spawned: self.next_id - 1,
            ..Default::default()
        };
        for track in self.tracks.values() {
            match track.status {
                TrackStatus::Active => stats.active += 1,
                TrackStatus::Lost => stats.lost += 1,
                TrackStatus::Finished => stats.finished += 1,
            }
        }
        stats
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.cycles = 0;
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}
