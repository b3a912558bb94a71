use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::config::PipelineConfig;
use crate::core::logging::PipelineLogger;
use crate::core::plate::deduplicator::{DedupStats, EventDeduplicator, EventDraft};
use crate::core::plate::event::{EvidenceRef, PlateEvent};
use crate::core::plate::frame::{
    Detection, DetectionKind, Direction, EventId, EvidenceCrop, SessionId, TrackId,
};
use crate::core::plate::manager::{RecognitionManager, RecognitionStats, SessionRecognition};
use crate::core::plate::recognizer::CandidateSource;
use crate::plate_extractor::session::{
    Session, SessionAggregator, SessionOutcome, SessionStats,
};
use crate::plate_extractor::tracker::{Tracker, TrackerStats};

/// 某个检测框对应的证据裁剪图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropAssignment {
    pub detection_index: usize,
    pub crop: EvidenceCrop,
}

/// 一帧的输入
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameInput {
    pub timestamp_ms: u64,
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub crops: Vec<CropAssignment>,
}

impl FrameInput {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }

    pub fn with_detection(mut self, detection: Detection, crop: Option<EvidenceCrop>) -> Self {
        if let Some(crop) = crop {
            self.crops.push(CropAssignment {
                detection_index: self.detections.len(),
                crop,
            });
        }
        self.detections.push(detection);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Event(PlateEvent),
    Duplicate(PlateEvent),
    Rejected {
        session_id: SessionId,
        track_id: TrackId,
        recognition: SessionRecognition,
    },
    Discarded {
        session_id: SessionId,
        track_id: TrackId,
        crop_count: usize,
    },
}

impl PipelineOutcome {
    pub fn event(&self) -> Option<&PlateEvent> {
        match self {
            PipelineOutcome::Event(event) | PipelineOutcome::Duplicate(event) => Some(event),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub frames: u64,
    pub detections: u64,
    pub plate_detections: u64,
    pub crops: u64,
    pub events: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub discarded: u64,
    pub tracker: TrackerStats,
    pub sessions: SessionStats,
    pub recognition: RecognitionStats,
    pub dedup: DedupStats,
}

/// 帧 → 事件：跟踪、会话聚合、识别、去重串在一起
pub struct PlatePipeline {
    tracker: Tracker,
    sessions: SessionAggregator,
    recognition: RecognitionManager,
    dedup: EventDeduplicator,
    direction: Direction,
    next_event_id: EventId,
    stats: PipelineStats,
    logger: PipelineLogger,
}

impl PlatePipeline {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self::with_logger(config, PipelineLogger::global())
    }

    pub fn with_logger(config: PipelineConfig, logger: PipelineLogger) -> Self {
        Self {
            tracker: Tracker::with_logger(config.tracker, logger.clone()),
            sessions: SessionAggregator::with_logger(config.session, logger.clone()),
            recognition: RecognitionManager::with_logger(config.recognition, logger.clone()),
            dedup: EventDeduplicator::with_logger(config.dedup, logger.clone()),
            direction: config.direction,
            next_event_id: 1,
            stats: PipelineStats::default(),
            logger: logger.scoped("plate_pipeline::pipeline"),
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn sessions(&self) -> &SessionAggregator {
        &self.sessions
    }

    pub fn recognition(&self) -> &RecognitionManager {
        &self.recognition
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// 切换之后封存的会话按新方向出事件，去重历史保留
    pub fn set_direction(&mut self, direction: Direction) {
        if direction != self.direction {
            self.logger.info(format_args!(
                "🧭 direction {} -> {}",
                self.direction.as_str(),
                direction.as_str()
            ));
        }
        self.direction = direction;
    }

    pub fn process_frame(
        &mut self,
        frame: FrameInput,
        source: &dyn CandidateSource,
    ) -> Vec<PipelineOutcome> {
        let now_ms = frame.timestamp_ms;
        self.stats.frames += 1;
        self.stats.detections += frame.detections.len() as u64;

        let mut crops: HashMap<usize, EvidenceCrop> = HashMap::new();
        for assignment in frame.crops {
            if assignment.detection_index >= frame.detections.len() {
                self.logger.warn(format_args!(
                    "⚠️ crop for missing detection index={} frame_ts={}",
                    assignment.detection_index, now_ms
                ));
                continue;
            }
            if crops
                .insert(assignment.detection_index, assignment.crop)
                .is_some()
            {
                self.logger.warn(format_args!(
                    "⚠️ duplicate crop for detection index={} frame_ts={}, keeping the last one",
                    assignment.detection_index, now_ms
                ));
            }
        }

        // 只跟踪车牌框，记下每个车牌框在原始检测里的下标
        let (source_indices, mut plates): (Vec<usize>, Vec<Detection>) = frame
            .detections
            .into_iter()
            .enumerate()
            .filter(|(_, d)| d.kind == DetectionKind::Plate)
            .unzip();
        self.stats.plate_detections += plates.len() as u64;

        let report = self.tracker.update(&mut plates, now_ms);

        let mut finished_sessions = Vec::new();
        for (plate_index, track_id) in report.assignments {
            let crop = crops.remove(&source_indices[plate_index]);
            if crop.is_some() {
                self.stats.crops += 1;
            }

            let Some(track) = self.tracker.track(track_id) else {
                continue;
            };
            let detection = &plates[plate_index];
            if let Some(outcome) = self.sessions.observe(track, detection, now_ms, crop) {
                finished_sessions.push(outcome);
            }
        }

        for index in crops.keys() {
            self.logger.debug(format_args!(
                "crop for non-plate detection index={} ignored",
                index
            ));
        }

        finished_sessions.extend(self.sessions.sweep_lost(&self.tracker, now_ms));

        finished_sessions
            .into_iter()
            .map(|outcome| self.resolve(outcome, source))
            .collect()
    }

    /// 结束所有进行中的会话（例如视频结束时）
    pub fn flush(&mut self, now_ms: u64, source: &dyn CandidateSource) -> Vec<PipelineOutcome> {
        let outcomes: Vec<PipelineOutcome> = self
            .sessions
            .complete_all(now_ms)
            .into_iter()
            .map(|outcome| self.resolve(outcome, source))
            .collect();

        self.logger.info(format_args!(
            "🚿 flushed at {}ms outcomes={}",
            now_ms,
            outcomes.len()
        ));
        outcomes
    }

    fn resolve(
        &mut self,
        outcome: SessionOutcome,
        source: &dyn CandidateSource,
    ) -> PipelineOutcome {
        match outcome {
            SessionOutcome::Discarded {
                session_id,
                track_id,
                crop_count,
                ..
            } => {
                self.stats.discarded += 1;
                PipelineOutcome::Discarded {
                    session_id,
                    track_id,
                    crop_count,
                }
            }
            SessionOutcome::Finalized(session) => self.recognize_session(&session, source),
        }
    }

    fn recognize_session(
        &mut self,
        session: &Session,
        source: &dyn CandidateSource,
    ) -> PipelineOutcome {
        let recognition = self.recognition.recognize(&session.crops, source);

        if !recognition.is_accepted() {
            self.stats.rejected += 1;
            self.logger.info(format_args!(
                "❌ session_id={} rejected text='{}' reasons={:?}",
                session.id, recognition.vote.text, recognition.validation.reasons
            ));
            return PipelineOutcome::Rejected {
                session_id: session.id,
                track_id: session.track_id,
                recognition,
            };
        }

        let event_id = self.next_event_id;
        self.next_event_id += 1;

        let evidence = recognition.best.and_then(|best| {
            session.crops.get(best.index).map(|crop| EvidenceRef {
                session_id: session.id,
                crop_index: best.index,
                timestamp_ms: crop.timestamp_ms,
                bbox: crop.bbox,
                quality_score: best.score,
            })
        });

        let draft = EventDraft {
            event_id,
            plate_text: recognition.validation.text.clone(),
            direction: self.direction,
            timestamp_ms: session.ended_at_ms,
        };
        let dedup = self.dedup.check(&draft);

        let SessionRecognition { vote, validation, .. } = recognition;
        let event = PlateEvent {
            id: event_id,
            plate_text: draft.plate_text,
            direction: draft.direction,
            timestamp_ms: draft.timestamp_ms,
            track_id: session.track_id,
            session_id: session.id,
            vote,
            validation,
            dedup,
            evidence,
        };

        if event.is_duplicate() {
            self.stats.duplicates += 1;
            PipelineOutcome::Duplicate(event)
        } else {
            self.stats.events += 1;
            self.logger.info(format_args!(
                "🚗 event_id={} plate={} direction={} track_id={} session_id={} confidence={:.3}",
                event.id,
                event.plate_text,
                event.direction.as_str(),
                event.track_id,
                event.session_id,
                event.vote.confidence
            ));
            PipelineOutcome::Event(event)
        }
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            tracker: self.tracker.stats(),
            sessions: self.sessions.stats(),
            recognition: self.recognition.get_stats(),
            dedup: self.dedup.stats(),
            ..self.stats.clone()
        }
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
        self.sessions.reset();
        self.recognition.reset();
        self.dedup.clear();
        self.next_event_id = 1;
        self.stats = PipelineStats::default();
    }
}

impl Default for PlatePipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::logging::capture::CaptureLog;
    use crate::core::plate::deduplicator::DedupReason;
    use crate::core::plate::frame::{BoundingBox, RecognitionCandidate};
    use crate::core::plate::recognizer::{EmbeddedCandidates, MockCandidateSource};
    use std::sync::Arc;

    const PLATE: &str = "ঢাকা মেট্রো-গখ-১২৩৪";
    const FRAME_MS: u64 = 100;

    fn create_test_detection(x: f32) -> Detection {
        Detection::plate(BoundingBox::new(x, 100.0, x + 120.0, 140.0).unwrap(), 0.9)
    }

    fn create_test_crop(timestamp_ms: u64, x: f32, text: &str) -> EvidenceCrop {
        EvidenceCrop::new(timestamp_ms, BoundingBox::new(x, 100.0, x + 120.0, 140.0).unwrap())
            .with_candidates(vec![RecognitionCandidate::new(text, 0.85)])
    }

    /// 车牌在画面里出现 `count` 帧，每帧缓慢右移并带一张裁剪图
    fn drive_pass(
        pipeline: &mut PlatePipeline,
        start_ms: u64,
        count: u64,
        text: &str,
    ) -> Vec<PipelineOutcome> {
        let mut outcomes = Vec::new();
        for i in 0..count {
            let ts = start_ms + i * FRAME_MS;
            let x = 10.0 + i as f32 * 5.0;
            let crop = create_test_crop(ts, x, text);
            let frame = FrameInput::new(ts).with_detection(create_test_detection(x), Some(crop));
            outcomes.extend(pipeline.process_frame(frame, &EmbeddedCandidates));
        }
        outcomes
    }

    /// 空帧推进时间直到会话因丢失而封存
    fn drive_idle(pipeline: &mut PlatePipeline, from_ms: u64, to_ms: u64) -> Vec<PipelineOutcome> {
        let mut outcomes = Vec::new();
        let mut ts = from_ms;
        while ts <= to_ms {
            outcomes.extend(pipeline.process_frame(FrameInput::new(ts), &EmbeddedCandidates));
            ts += 500;
        }
        outcomes
    }

    #[test]
    fn test_single_pass_produces_event() {
        let mut pipeline = PlatePipeline::new();

        let during = drive_pass(&mut pipeline, 0, 6, PLATE);
        assert!(during.is_empty());

        let after = drive_idle(&mut pipeline, 1000, 7000);
        assert_eq!(after.len(), 1);

        let event = match &after[0] {
            PipelineOutcome::Event(event) => event,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(event.id, 1);
        assert_eq!(event.plate_text, PLATE);
        assert_eq!(event.direction, Direction::Entry);
        assert_eq!(event.track_id, 1);
        assert_eq!(event.session_id, 1);
        assert_eq!(event.timestamp_ms, 500);
        assert!(event.validation.valid);
        assert!(!event.is_duplicate());

        let evidence = event.evidence.as_ref().unwrap();
        assert_eq!(evidence.session_id, 1);
        assert!(evidence.crop_index < 6);
    }

    #[test]
    fn test_repeat_pass_is_duplicate() {
        let mut pipeline = PlatePipeline::new();

        drive_pass(&mut pipeline, 0, 5, PLATE);
        drive_idle(&mut pipeline, 1000, 7000);

        // 一分钟后同一车牌再次经过
        let start = 60_000;
        drive_pass(&mut pipeline, start, 5, PLATE);
        let outcomes = drive_idle(&mut pipeline, start + 1000, start + 7000);

        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            PipelineOutcome::Duplicate(event) => {
                assert_eq!(event.id, 2);
                assert_eq!(event.track_id, 2);
                assert_eq!(event.dedup.previous_event, Some(1));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let stats = pipeline.stats();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.dedup.history_len, 1);
    }

    #[test]
    fn test_opposite_direction_uses_short_window() {
        const MINUTE: u64 = 60 * 1000;

        // 入口经过一次，随后切到出口方向
        let entry_then_exit = |exit_start: u64| {
            let mut pipeline = PlatePipeline::new();
            drive_pass(&mut pipeline, 0, 5, PLATE);
            let first = drive_idle(&mut pipeline, 1000, 7000);
            assert!(matches!(first[0], PipelineOutcome::Event(_)));

            pipeline.set_direction(Direction::Exit);
            assert_eq!(pipeline.direction(), Direction::Exit);

            drive_pass(&mut pipeline, exit_start, 5, PLATE);
            drive_idle(&mut pipeline, exit_start + 1000, exit_start + 7000)
        };

        let outcomes = entry_then_exit(2 * MINUTE);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            PipelineOutcome::Duplicate(event) => {
                assert_eq!(event.direction, Direction::Exit);
                assert_eq!(event.dedup.reason, DedupReason::OppositeDirection);
                assert_eq!(event.dedup.previous_event, Some(1));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let outcomes = entry_then_exit(4 * MINUTE);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            PipelineOutcome::Event(event) => {
                assert_eq!(event.direction, Direction::Exit);
                assert_eq!(event.dedup.reason, DedupReason::OutsideWindow);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_short_pass_is_discarded() {
        let mut pipeline = PlatePipeline::new();

        drive_pass(&mut pipeline, 0, 2, PLATE);
        let outcomes = drive_idle(&mut pipeline, 1000, 7000);

        assert_eq!(
            outcomes,
            vec![PipelineOutcome::Discarded {
                session_id: 1,
                track_id: 1,
                crop_count: 2,
            }]
        );
        assert_eq!(pipeline.stats().recognition.sessions, 0);
    }

    #[test]
    fn test_invalid_text_is_rejected() {
        let mut pipeline = PlatePipeline::new();

        drive_pass(&mut pipeline, 0, 4, "XY");
        let outcomes = drive_idle(&mut pipeline, 1000, 7000);

        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            PipelineOutcome::Rejected { recognition, .. } => {
                assert_eq!(recognition.vote.text, "XY");
                assert!(!recognition.validation.valid);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(outcomes[0].event().is_none());
    }

    #[test]
    fn test_no_candidates_is_rejected() {
        let mut pipeline = PlatePipeline::new();
        drive_pass(&mut pipeline, 0, 4, PLATE);

        let outcomes = pipeline.flush(1000, &MockCandidateSource::new());
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], PipelineOutcome::Rejected { .. }));
    }

    #[test]
    fn test_capacity_emits_event_while_plate_visible() {
        let mut config = PipelineConfig::default();
        config.session.max_crops = 4;
        let mut pipeline = PlatePipeline::with_config(config);

        let outcomes = drive_pass(&mut pipeline, 0, 6, PLATE);
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], PipelineOutcome::Event(_)));

        // 同一轨迹的后两张图进入新会话
        let session = pipeline.sessions().active_session_for(1).unwrap();
        assert_eq!(session.id, 2);
        assert_eq!(session.crop_count(), 2);
    }

    #[test]
    fn test_flush_completes_active_sessions() {
        let mut pipeline = PlatePipeline::new();
        drive_pass(&mut pipeline, 0, 3, PLATE);

        let outcomes = pipeline.flush(400, &EmbeddedCandidates);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].event().is_some());
        assert!(pipeline.flush(500, &EmbeddedCandidates).is_empty());
    }

    #[test]
    fn test_vehicle_detections_are_not_tracked() {
        let mut pipeline = PlatePipeline::new();
        let vehicle = Detection::vehicle(BoundingBox::new(0.0, 0.0, 400.0, 300.0).unwrap(), 0.95);
        let frame = FrameInput::new(0)
            .with_detection(vehicle, Some(create_test_crop(0, 0.0, PLATE)))
            .with_detection(create_test_detection(10.0), Some(create_test_crop(0, 10.0, PLATE)));

        pipeline.process_frame(frame, &EmbeddedCandidates);

        let stats = pipeline.stats();
        assert_eq!(stats.detections, 2);
        assert_eq!(stats.plate_detections, 1);
        assert_eq!(stats.crops, 1);
        assert_eq!(stats.tracker.total_spawned, 1);
        assert_eq!(pipeline.sessions().active_session_for(1).unwrap().crop_count(), 1);
    }

    #[test]
    fn test_crop_with_bad_index_is_ignored() {
        let mut pipeline = PlatePipeline::new();
        let mut frame = FrameInput::new(0).with_detection(create_test_detection(10.0), None);
        frame.crops.push(CropAssignment {
            detection_index: 7,
            crop: create_test_crop(0, 10.0, PLATE),
        });

        assert!(pipeline.process_frame(frame, &EmbeddedCandidates).is_empty());
        assert_eq!(pipeline.stats().crops, 0);
    }

    #[test]
    fn test_repeated_crop_index_keeps_last_and_warns() {
        let sink = Arc::new(CaptureLog::default());
        let logger = PipelineLogger::with_sink(sink.clone());
        let mut pipeline = PlatePipeline::with_logger(PipelineConfig::default(), logger);

        let mut frame = FrameInput::new(0)
            .with_detection(create_test_detection(10.0), Some(create_test_crop(0, 10.0, "first")));
        frame.crops.push(CropAssignment {
            detection_index: 0,
            crop: create_test_crop(0, 10.0, PLATE),
        });
        pipeline.process_frame(frame, &EmbeddedCandidates);

        assert_eq!(pipeline.stats().crops, 1);
        let session = pipeline.sessions().active_session_for(1).unwrap();
        assert_eq!(session.crops[0].candidates[0].text, PLATE);
        assert!(sink
            .messages()
            .iter()
            .any(|m| m.contains("duplicate crop for detection index=0")));
    }

    #[test]
    fn test_fresh_pipeline_stats_are_zero() {
        let stats = PlatePipeline::new().stats();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.events, 0);
        assert_eq!(stats.dedup.history_len, 0);
        assert_eq!(stats.dedup.checked, 0);
    }

    #[test]
    fn test_two_plates_get_separate_events() {
        let mut pipeline = PlatePipeline::new();
        let other = "ঢাকা-খগ-৫৬৭৮";

        for i in 0..4u64 {
            let ts = i * FRAME_MS;
            let frame = FrameInput::new(ts)
                .with_detection(
                    create_test_detection(10.0),
                    Some(create_test_crop(ts, 10.0, PLATE)),
                )
                .with_detection(
                    create_test_detection(600.0),
                    Some(create_test_crop(ts, 600.0, other)),
                );
            pipeline.process_frame(frame, &EmbeddedCandidates);
        }
        let outcomes = pipeline.flush(500, &EmbeddedCandidates);

        let texts: Vec<&str> = outcomes
            .iter()
            .filter_map(|o| o.event())
            .map(|e| e.plate_text.as_str())
            .collect();
        assert_eq!(texts, vec![PLATE, other]);
    }

    #[test]
    fn test_every_event_passed_validation() {
        let mut pipeline = PlatePipeline::new();
        let texts = [PLATE, "XY", "ঢাকা-খগ-৫৬৭৮", ""];

        let mut outcomes = Vec::new();
        for (n, text) in texts.iter().enumerate() {
            let start = n as u64 * 20_000;
            drive_pass(&mut pipeline, start, 4, text);
            outcomes.extend(drive_idle(&mut pipeline, start + 1000, start + 7000));
        }

        assert_eq!(outcomes.len(), texts.len());
        for outcome in &outcomes {
            if let Some(event) = outcome.event() {
                assert!(event.validation.valid);
                assert!(!event.plate_text.is_empty());
            }
        }
        assert_eq!(pipeline.stats().events, 2);
    }

    #[test]
    fn test_reset_restarts_identities() {
        let mut pipeline = PlatePipeline::new();
        drive_pass(&mut pipeline, 0, 3, PLATE);
        pipeline.flush(400, &EmbeddedCandidates);

        pipeline.reset();
        assert_eq!(pipeline.stats().frames, 0);

        drive_pass(&mut pipeline, 0, 3, PLATE);
        let outcomes = pipeline.flush(400, &EmbeddedCandidates);
        let event = outcomes[0].event().unwrap();
        assert_eq!(event.id, 1);
        assert_eq!(event.track_id, 1);
        assert!(!event.is_duplicate());
    }

    #[test]
    fn test_components_share_injected_logger() {
        let sink = Arc::new(CaptureLog::default());
        let logger = PipelineLogger::with_sink(sink.clone());
        let mut pipeline = PlatePipeline::with_logger(PipelineConfig::default(), logger);

        drive_pass(&mut pipeline, 0, 3, PLATE);
        pipeline.flush(400, &EmbeddedCandidates);

        let targets = sink.targets();
        for target in [
            "plate_pipeline::tracker",
            "plate_pipeline::session",
            "plate_pipeline::recognition",
            "plate_pipeline::pipeline",
        ] {
            assert!(targets.iter().any(|t| t == target), "missing logs for {}", target);
        }
        assert!(sink.messages().iter().any(|m| m.contains("event_id=1")));
    }
}
