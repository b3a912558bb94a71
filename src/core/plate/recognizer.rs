use super::frame::{EvidenceCrop, RecognitionCandidate};

/// 外部识别器的边界：给一张裁剪图，返回候选文本
pub trait CandidateSource: Send + Sync {
    fn candidates(&self, crop: &EvidenceCrop) -> Vec<RecognitionCandidate>;

    /// 每张裁剪图一组候选，顺序与输入一致
    fn candidates_for(&self, crops: &[&EvidenceCrop]) -> Vec<Vec<RecognitionCandidate>> {
        crops.iter().map(|crop| self.candidates(crop)).collect()
    }
}

/// 直接使用裁剪图上携带的候选（识别结果随数据一起提供）
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedCandidates;

impl CandidateSource for EmbeddedCandidates {
    fn candidates(&self, crop: &EvidenceCrop) -> Vec<RecognitionCandidate> {
        crop.candidates.clone()
    }
}

pub struct MockCandidateSource {
    // 按裁剪图时间戳给出候选
    pattern: Option<Box<dyn Fn(&EvidenceCrop) -> Vec<RecognitionCandidate> + Send + Sync>>,
}

impl MockCandidateSource {
    pub fn new() -> Self {
        Self { pattern: None }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&EvidenceCrop) -> Vec<RecognitionCandidate> + Send + Sync + 'static,
    {
        Self {
            pattern: Some(Box::new(pattern)),
        }
    }

    /// 每张图都读出同一个文本
    pub fn with_fixed_text(text: &str, confidence: f32) -> Self {
        let text = text.to_string();
        Self::with_pattern(move |_| vec![RecognitionCandidate::new(text.clone(), confidence)])
    }
}

impl Default for MockCandidateSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateSource for MockCandidateSource {
    fn candidates(&self, crop: &EvidenceCrop) -> Vec<RecognitionCandidate> {
        self.pattern
            .as_ref()
            .map(|p| p(crop))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plate::frame::BoundingBox;

    fn create_test_crop(timestamp_ms: u64) -> EvidenceCrop {
        EvidenceCrop::new(timestamp_ms, BoundingBox::new(0.0, 0.0, 100.0, 30.0).unwrap())
    }

    #[test]
    fn test_embedded_returns_crop_candidates() {
        let crop = create_test_crop(0).with_candidates(vec![RecognitionCandidate::new("ক", 0.4)]);
        let candidates = EmbeddedCandidates.candidates(&crop);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].text, "ক");
    }

    #[test]
    fn test_mock_with_pattern() {
        let source = MockCandidateSource::with_pattern(|crop| {
            if crop.timestamp_ms >= 100 {
                vec![RecognitionCandidate::new("late", 0.9)]
            } else {
                vec![]
            }
        });

        let early = create_test_crop(0);
        let late = create_test_crop(200);
        let lists = source.candidates_for(&[&early, &late]);

        assert!(lists[0].is_empty());
        assert_eq!(lists[1][0].text, "late");
    }

    #[test]
    fn test_mock_default_is_empty() {
        assert!(MockCandidateSource::new().candidates(&create_test_crop(0)).is_empty());
    }
}
