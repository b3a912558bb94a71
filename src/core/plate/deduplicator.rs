use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::frame::{Direction, EventId};
use crate::core::logging::PipelineLogger;

/// 事件去重器 - 按方向区分时间窗口
/// 同方向（进-进 / 出-出）用较长窗口，反方向用较短窗口
pub struct EventDeduplicator {
    /// 已接受事件的历史（只记录通过校验并被接受的）
    history: VecDeque<DedupEntry>,
    config: DedupConfig,
    checked: u64,
    duplicates: u64,
    logger: PipelineLogger,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub history_capacity: usize,
    pub same_direction_window_ms: u64,
    pub opposite_direction_window_ms: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            same_direction_window_ms: 5 * 60 * 1000,
            opposite_direction_window_ms: 3 * 60 * 1000,
        }
    }
}

/// 待判定的事件草稿
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub event_id: EventId,
    pub plate_text: String,
    pub direction: Direction,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct DedupEntry {
    event_id: EventId,
    plate_text: String,
    direction: Direction,
    timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupReason {
    NewPlate,         // 历史中没有该车牌
    OutsideWindow,    // 有记录但已超出窗口
    SameDirection,    // 同方向窗口内重复
    OppositeDirection, // 反方向窗口内重复
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupResult {
    pub is_duplicate: bool,
    pub reason: DedupReason,
    pub message: String,
    pub previous_event: Option<EventId>,
    pub elapsed_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupStats {
    pub history_len: usize,
    pub checked: u64,
    pub duplicates: u64,
}

impl EventDeduplicator {
    pub fn new() -> Self {
        Self::with_config(DedupConfig::default())
    }

    pub fn with_config(config: DedupConfig) -> Self {
        Self::with_logger(config, PipelineLogger::global())
    }

    pub fn with_logger(config: DedupConfig, logger: PipelineLogger) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_capacity),
            config,
            checked: 0,
            duplicates: 0,
            logger: logger.scoped("plate_pipeline::dedup"),
        }
    }

    fn window_for(&self, a: Direction, b: Direction) -> u64 {
        if a == b {
            self.config.same_direction_window_ms
        } else {
            self.config.opposite_direction_window_ms
        }
    }

    /// 与最近的同车牌记录比较；不重复则写入历史
    pub fn check(&mut self, draft: &EventDraft) -> DedupResult {
        self.checked += 1;
        let mut seen_outside_window = false;

        // 从新到旧，报告最近一条命中
        for prev in self.history.iter().rev() {
            if prev.plate_text != draft.plate_text {
                continue;
            }

            let elapsed = draft.timestamp_ms.abs_diff(prev.timestamp_ms);
            let window = self.window_for(prev.direction, draft.direction);

            if elapsed <= window {
                let (reason, label) = if prev.direction == draft.direction {
                    (DedupReason::SameDirection, "same direction")
                } else {
                    (DedupReason::OppositeDirection, "opposite direction")
                };
                let message = format!(
                    "duplicate of event #{} seen {:.1}s ago ({}, window {}s)",
                    prev.event_id,
                    elapsed as f64 / 1000.0,
                    label,
                    window / 1000
                );

                self.duplicates += 1;
                self.logger.info(format_args!(
                    "🔁 plate={} {} event_id={}",
                    draft.plate_text, message, draft.event_id
                ));

                return DedupResult {
                    is_duplicate: true,
                    reason,
                    message,
                    previous_event: Some(prev.event_id),
                    elapsed_ms: Some(elapsed),
                };
            }

            seen_outside_window = true;
        }

        self.push(DedupEntry {
            event_id: draft.event_id,
            plate_text: draft.plate_text.clone(),
            direction: draft.direction,
            timestamp_ms: draft.timestamp_ms,
        });

        let (reason, message) = if seen_outside_window {
            (DedupReason::OutsideWindow, "previous sighting outside window")
        } else {
            (DedupReason::NewPlate, "no previous sighting")
        };

        DedupResult {
            is_duplicate: false,
            reason,
            message: message.to_string(),
            previous_event: None,
            elapsed_ms: None,
        }
    }

    fn push(&mut self, entry: DedupEntry) {
        self.history.push_back(entry);
        while self.history.len() > self.config.history_capacity {
            self.history.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.checked = 0;
        self.duplicates = 0;
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            history_len: self.history.len(),
            checked: self.checked,
            duplicates: self.duplicates,
        }
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
