//! 会话识别管理器：选帧 → 投票 → 校验

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::frame::EvidenceCrop;
use super::recognizer::CandidateSource;
use super::selector::{FrameSelector, ScoredCrop, SelectorConfig};
use super::validator::{PlateValidator, ValidationMode, ValidationResult, ValidatorConfig};
use super::voter::{CandidateVoter, VoteMethod, VoteResult};
use crate::core::logging::PipelineLogger;

/// 哪些裁剪图参与投票
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VoteCropPolicy {
    #[default]
    All,
    Top { count: usize },
    Diverse { count: usize },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub vote_crops: VoteCropPolicy,
    pub selector: SelectorConfig,
    pub validator: ValidatorConfig,
}

/// 单个会话的识别结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecognition {
    /// 最佳证据帧
    pub best: Option<ScoredCrop>,
    /// 参与投票的裁剪图下标
    pub voted_crops: Vec<usize>,
    pub vote: VoteResult,
    pub validation: ValidationResult,
}

impl SessionRecognition {
    pub fn is_accepted(&self) -> bool {
        !self.vote.is_empty() && self.validation.valid
    }
}

/// 识别统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecognitionStats {
    pub sessions: u64,
    pub by_frequency: u64,
    pub by_confidence: u64,
    pub by_tiebreak: u64,
    pub no_consensus: u64,
    pub strict_valid: u64,
    pub fallback_valid: u64,
    pub invalid: u64,
    pub avg_winner_confidence: f32,
}

#[derive(Debug, Default)]
struct Counters {
    stats: RecognitionStats,
    confidence_sum: f64,
    winners: u64,
}

pub struct RecognitionManager {
    selector: FrameSelector,
    voter: CandidateVoter,
    validator: PlateValidator,
    policy: VoteCropPolicy,
    counters: Arc<Mutex<Counters>>,
    logger: PipelineLogger,
}

impl RecognitionManager {
    pub fn new() -> Self {
        Self::with_config(RecognitionConfig::default())
    }

    pub fn with_config(config: RecognitionConfig) -> Self {
        Self::with_logger(config, PipelineLogger::global())
    }

    pub fn with_logger(config: RecognitionConfig, logger: PipelineLogger) -> Self {
        Self {
            selector: FrameSelector::with_config(config.selector),
            voter: CandidateVoter::new(),
            validator: PlateValidator::with_config(config.validator),
            policy: config.vote_crops,
            counters: Arc::new(Mutex::new(Counters::default())),
            logger: logger.scoped("plate_pipeline::recognition"),
        }
    }

    pub fn selector(&self) -> &FrameSelector {
        &self.selector
    }

    pub fn validator(&self) -> &PlateValidator {
        &self.validator
    }

    /// 纯计算：同样的输入永远得到同样的结果
    pub fn evaluate(
        &self,
        crops: &[EvidenceCrop],
        source: &dyn CandidateSource,
    ) -> SessionRecognition {
        let best = self.selector.select_best(crops);

        let voted_crops: Vec<usize> = match self.policy {
            VoteCropPolicy::All => (0..crops.len()).collect(),
            VoteCropPolicy::Top { count } => self
                .selector
                .select_top_n(crops, count)
                .iter()
                .map(|s| s.index)
                .collect(),
            VoteCropPolicy::Diverse { count } => self
                .selector
                .select_diverse(crops, count)
                .iter()
                .map(|s| s.index)
                .collect(),
        };

        let selected: Vec<&EvidenceCrop> = voted_crops.iter().map(|&i| &crops[i]).collect();
        let candidates = source.candidates_for(&selected);
        let vote = self.voter.vote(&candidates);
        let validation = self.validator.validate(&vote.text);

        SessionRecognition {
            best,
            voted_crops,
            vote,
            validation,
        }
    }

    /// evaluate + 计数
    pub fn recognize(
        &self,
        crops: &[EvidenceCrop],
        source: &dyn CandidateSource,
    ) -> SessionRecognition {
        let recognition = self.evaluate(crops, source);
        self.record(&recognition);

        self.logger.debug(format_args!(
            "crops={} voted={} winner='{}' method={} confidence={:.3} valid={}",
            crops.len(),
            recognition.voted_crops.len(),
            recognition.vote.text,
            recognition.vote.method.as_str(),
            recognition.vote.confidence,
            recognition.validation.valid
        ));

        recognition
    }

    /// 批量复核多个已完成会话，结果顺序与输入一致
    pub fn recognize_batch<S>(
        &self,
        sessions: &[S],
        source: &dyn CandidateSource,
    ) -> Vec<SessionRecognition>
    where
        S: AsRef<[EvidenceCrop]> + Sync,
    {
        let results: Vec<SessionRecognition> = sessions
            .par_iter()
            .map(|s| self.evaluate(s.as_ref(), source))
            .collect();

        for recognition in &results {
            self.record(recognition);
        }

        self.logger.info(format_args!(
            "📦 batch recognized sessions={} accepted={}",
            results.len(),
            results.iter().filter(|r| r.is_accepted()).count()
        ));

        results
    }

    fn record(&self, recognition: &SessionRecognition) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.stats.sessions += 1;

            if recognition.vote.is_empty() {
                counters.stats.no_consensus += 1;
            } else {
                match recognition.vote.method {
                    VoteMethod::Frequency => counters.stats.by_frequency += 1,
                    VoteMethod::Confidence => counters.stats.by_confidence += 1,
                    VoteMethod::Tiebreak => counters.stats.by_tiebreak += 1,
                }
                counters.confidence_sum += recognition.vote.confidence as f64;
                counters.winners += 1;
            }

            match (recognition.validation.valid, recognition.validation.mode) {
                (true, ValidationMode::Strict) => counters.stats.strict_valid += 1,
                (true, ValidationMode::Fallback) => counters.stats.fallback_valid += 1,
                (false, _) => counters.stats.invalid += 1,
            }
        }
    }

    pub fn get_stats(&self) -> RecognitionStats {
        match self.counters.lock() {
            Ok(counters) => {
                let mut stats = counters.stats.clone();
                if counters.winners > 0 {
                    stats.avg_winner_confidence =
                        (counters.confidence_sum / counters.winners as f64) as f32;
                }
                stats
            }
            Err(_) => RecognitionStats::default(),
        }
    }

    pub fn reset(&self) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters = Counters::default();
        }
    }
}

impl Default for RecognitionManager {
    fn default() -> Self {
        Self::new()
    }
}
