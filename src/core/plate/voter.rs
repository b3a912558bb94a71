//! 多候选共识投票
//!
//! 判定顺序：出现次数 → 平均置信度 → 最大置信度 → 首次出现顺序。
//! 最后一级依赖调用方聚合候选的顺序。

use serde::Serialize;
use std::collections::HashMap;

use super::frame::RecognitionCandidate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteMethod {
    Frequency,
    Confidence,
    Tiebreak,
}

impl VoteMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteMethod::Frequency => "frequency",
            VoteMethod::Confidence => "confidence",
            VoteMethod::Tiebreak => "tiebreak",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteTally {
    pub text: String,
    pub count: u32,
    pub mean_confidence: f32,
    pub max_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteResult {
    pub text: String,
    /// 胜出文本的平均置信度
    pub confidence: f32,
    pub method: VoteMethod,
    /// 按首次出现顺序
    pub tally: Vec<VoteTally>,
}

impl VoteResult {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            method: VoteMethod::Frequency,
            tally: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tally.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateVoter;

impl CandidateVoter {
    pub fn new() -> Self {
        Self
    }

    /// 每个内层列表是一张裁剪图的候选
    pub fn vote(&self, per_crop: &[Vec<RecognitionCandidate>]) -> VoteResult {
        let tally = Self::tally(per_crop.iter().flatten());
        if tally.is_empty() {
            return VoteResult::empty();
        }

        let (winner, method) = Self::decide(&tally);

        VoteResult {
            text: tally[winner].text.clone(),
            confidence: tally[winner].mean_confidence,
            method,
            tally,
        }
    }

    fn tally<'a>(candidates: impl Iterator<Item = &'a RecognitionCandidate>) -> Vec<VoteTally> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        // (text, count, sum, max)
        let mut groups: Vec<(&str, u32, f32, f32)> = Vec::new();

        for candidate in candidates {
            match index.get(candidate.text.as_str()) {
                Some(&i) => {
                    let group = &mut groups[i];
                    group.1 += 1;
                    group.2 += candidate.confidence;
                    group.3 = group.3.max(candidate.confidence);
                }
                None => {
                    index.insert(candidate.text.as_str(), groups.len());
                    groups.push((
                        candidate.text.as_str(),
                        1,
                        candidate.confidence,
                        candidate.confidence,
                    ));
                }
            }
        }

        groups
            .into_iter()
            .map(|(text, count, sum, max)| VoteTally {
                text: text.to_string(),
                count,
                mean_confidence: sum / count as f32,
                max_confidence: max,
            })
            .collect()
    }

    /// 返回胜出者下标和判定方式
    fn decide(tally: &[VoteTally]) -> (usize, VoteMethod) {
        let all: Vec<usize> = (0..tally.len()).collect();

        let by_count = Self::leaders(&all, |i| tally[i].count as f32);
        if by_count.len() == 1 {
            return (by_count[0], VoteMethod::Frequency);
        }

        let by_mean = Self::leaders(&by_count, |i| tally[i].mean_confidence);
        if by_mean.len() == 1 {
            return (by_mean[0], VoteMethod::Confidence);
        }

        // 全部打平时取首次出现者
        let by_max = Self::leaders(&by_mean, |i| tally[i].max_confidence);
        (by_max[0], VoteMethod::Tiebreak)
    }

    /// 取最大 key 的所有下标，保持原顺序；key 全为 NaN 时视为全部打平
    fn leaders(indices: &[usize], key: impl Fn(usize) -> f32) -> Vec<usize> {
        let best = indices
            .iter()
            .map(|&i| key(i))
            .fold(f32::NEG_INFINITY, f32::max);

        let leaders: Vec<usize> = indices.iter().copied().filter(|&i| key(i) == best).collect();
        if leaders.is_empty() {
            indices.to_vec()
        } else {
            leaders
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(text: &str, confidence: f32) -> RecognitionCandidate {
        RecognitionCandidate::new(text, confidence)
    }

    #[test]
    fn test_empty_input_yields_empty_result() {
        let voter = CandidateVoter::new();

        let result = voter.vote(&[]);
        assert_eq!(result, VoteResult::empty());

        let result = voter.vote(&[vec![], vec![]]);
        assert!(result.text.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, VoteMethod::Frequency);
        assert!(result.tally.is_empty());
    }

    #[test]
    fn test_frequency_winner() {
        let voter = CandidateVoter::new();
        let result = voter.vote(&[
            vec![c("A", 0.6), c("A", 0.7), c("B", 0.99)],
            vec![c("A", 0.8)],
        ]);

        assert_eq!(result.text, "A");
        assert_eq!(result.method, VoteMethod::Frequency);
        assert!((result.confidence - 0.7).abs() < 1e-6);
        assert_eq!(result.tally[0].count, 3);
        assert_eq!(result.tally[1].count, 1);
    }

    #[test]
    fn test_count_tie_resolved_by_mean_confidence() {
        let voter = CandidateVoter::new();
        let result = voter.vote(&[
            vec![c("A", 0.5), c("B", 0.9)],
            vec![c("A", 0.5), c("B", 0.7)],
        ]);

        assert_eq!(result.text, "B");
        assert_eq!(result.method, VoteMethod::Confidence);
        assert!((result.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_mean_tie_resolved_by_max_confidence() {
        let voter = CandidateVoter::new();
        let result = voter.vote(&[
            vec![c("A", 0.5), c("B", 0.25)],
            vec![c("A", 0.5), c("B", 0.75)],
        ]);

        assert_eq!(result.text, "B");
        assert_eq!(result.method, VoteMethod::Tiebreak);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_full_tie_falls_back_to_first_encountered() {
        let voter = CandidateVoter::new();
        let result = voter.vote(&[vec![c("B", 0.5)], vec![c("A", 0.5)]]);

        assert_eq!(result.text, "B");
        assert_eq!(result.method, VoteMethod::Tiebreak);
    }

    #[test]
    fn test_nan_confidences_fall_back_to_first_encountered() {
        let voter = CandidateVoter::new();
        let result = voter.vote(&[vec![c("A", f32::NAN), c("B", f32::NAN)]]);

        assert_eq!(result.text, "A");
        assert_eq!(result.method, VoteMethod::Tiebreak);
        assert_eq!(result.tally.len(), 2);
    }

    #[test]
    fn test_nan_loses_to_real_confidence() {
        let voter = CandidateVoter::new();
        let result = voter.vote(&[vec![c("A", f32::NAN), c("B", 0.4)]]);

        assert_eq!(result.text, "B");
        assert_eq!(result.method, VoteMethod::Confidence);
    }

    #[test]
    fn test_grouping_is_exact_match() {
        let voter = CandidateVoter::new();
        let result = voter.vote(&[vec![c("ঢাকা-খ-১২৩", 0.5), c("ঢাকা-খ-১২৩ ", 0.5)]]);
        assert_eq!(result.tally.len(), 2);
    }

    #[test]
    fn test_vote_is_deterministic() {
        let voter = CandidateVoter::new();
        let input = vec![vec![c("X", 0.3), c("Y", 0.3)], vec![c("Y", 0.4), c("X", 0.4)]];

        assert_eq!(voter.vote(&input), voter.vote(&input));
    }
}
