//! 最佳证据帧选择
//!
//! 按加权质量分排序；缺少质量指标的裁剪图用框面积估算，不报错。

use serde::{Deserialize, Serialize};

use super::frame::{EvidenceCrop, QualityMetrics};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub sharpness_weight: f32,
    pub contrast_weight: f32,
    pub area_weight: f32,
    /// 估算 normalized_area 时的参考面积（像素²）
    pub reference_area: f32,
    pub default_sharpness: f32,
    pub default_contrast: f32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            sharpness_weight: 0.4,
            contrast_weight: 0.3,
            area_weight: 0.3,
            reference_area: 12_000.0,
            default_sharpness: 0.7,
            default_contrast: 0.7,
        }
    }
}

/// 选中的裁剪图在输入中的下标及其得分
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredCrop {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Default)]
pub struct FrameSelector {
    config: SelectorConfig,
}

impl FrameSelector {
    pub fn new() -> Self {
        Self::with_config(SelectorConfig::default())
    }

    pub fn with_config(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// 原生指标优先，否则用框面积估算
    pub fn quality_of(&self, crop: &EvidenceCrop) -> QualityMetrics {
        match crop.quality {
            Some(q) => q,
            None => {
                let area = if self.config.reference_area > 0.0 {
                    (crop.bbox.area() / self.config.reference_area).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                QualityMetrics {
                    sharpness: self.config.default_sharpness,
                    contrast: self.config.default_contrast,
                    normalized_area: area,
                }
            }
        }
    }

    pub fn score(&self, crop: &EvidenceCrop) -> f32 {
        let q = self.quality_of(crop);
        self.config.sharpness_weight * q.sharpness
            + self.config.contrast_weight * q.contrast
            + self.config.area_weight * q.normalized_area
    }

    /// 按得分降序，分数相同保持输入顺序
    pub fn rank(&self, crops: &[EvidenceCrop]) -> Vec<ScoredCrop> {
        let mut scored: Vec<ScoredCrop> = crops
            .iter()
            .enumerate()
            .map(|(index, crop)| ScoredCrop {
                index,
                score: self.score(crop),
            })
            .collect();

        // sort_by 是稳定排序
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }

    pub fn select_best(&self, crops: &[EvidenceCrop]) -> Option<ScoredCrop> {
        match crops.len() {
            0 => None,
            // 单张直接返回，不看质量
            1 => Some(ScoredCrop {
                index: 0,
                score: self.score(&crops[0]),
            }),
            _ => self.rank(crops).into_iter().next(),
        }
    }

    pub fn select_top_n(&self, crops: &[EvidenceCrop], n: usize) -> Vec<ScoredCrop> {
        let mut ranked = self.rank(crops);
        ranked.truncate(n);
        ranked
    }

    /// 先取质量最高的一张，之后每次取与已选集合最小时间间隔最大的一张
    pub fn select_diverse(&self, crops: &[EvidenceCrop], n: usize) -> Vec<ScoredCrop> {
        if n == 0 || crops.is_empty() {
            return Vec::new();
        }

        let mut pool = self.rank(crops);
        let mut selected = vec![pool.remove(0)];

        while selected.len() < n && !pool.is_empty() {
            let mut best_pos = 0;
            let mut best_distance = 0u64;

            for (pos, candidate) in pool.iter().enumerate() {
                let t = crops[candidate.index].timestamp_ms;
                let min_distance = selected
                    .iter()
                    .map(|s| crops[s.index].timestamp_ms.abs_diff(t))
                    .min()
                    .unwrap_or(0);

                // 严格大于：距离相同时保留排名靠前（质量更高）的
                if pos == 0 || min_distance > best_distance {
                    best_pos = pos;
                    best_distance = min_distance;
                }
            }

            selected.push(pool.remove(best_pos));
        }

        selected
    }
}
