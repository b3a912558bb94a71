//! 车牌格式校验
//!
//! 严格模式：`地区-字母序列-数字序列`，三段都要通过。
//! 严格失败且允许降级时，走宽松的兜底规则（长度 + 孟加拉文字符数）。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static REGIONS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ঢাকা",
        "ঢাকা মেট্রো",
        "চট্টগ্রাম",
        "চট্ট মেট্রো",
        "খুলনা",
        "খুলনা মেট্রো",
        "রাজশাহী",
        "রাজশাহী মেট্রো",
        "সিলেট",
        "সিলেট মেট্রো",
        "বরিশাল",
        "বরিশাল মেট্রো",
        "রংপুর",
        "ময়মনসিংহ",
        "গাজীপুর",
        "নারায়ণগঞ্জ",
        "কুমিল্লা",
        "বগুড়া",
        "যশোর",
        "ফরিদপুর",
    ]
    .into_iter()
    .collect()
});

// 字母区间 U+0980..U+09E3（含元音符号），数字 U+09E6..U+09EF
static SERIES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\x{0980}-\x{09E3}]{2,4}$").expect("series pattern"));
static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\x{09E6}-\x{09EF}]{3,4}$").expect("number pattern"));
static SCRIPT_CHAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{0980}-\x{09FF}]").expect("script pattern"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub allow_fallback: bool,
    pub fallback_min_len: usize,
    pub fallback_max_len: usize,
    pub fallback_min_script_chars: usize,
    /// 超过该长度应包含分隔符，否则给出警告
    pub separator_hint_len: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            allow_fallback: true,
            fallback_min_len: 3,
            fallback_max_len: 20,
            fallback_min_script_chars: 2,
            separator_hint_len: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Strict,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCategory {
    PrivateCar,
    Jeep,
    Microbus,
    Bus,
    Truck,
    Taxi,
    Motorcycle,
}

impl VehicleCategory {
    /// 由字母序列首字母推断
    pub fn from_series(series: &str) -> Option<Self> {
        match series.chars().next()? {
            'ক' | 'খ' | 'গ' => Some(VehicleCategory::PrivateCar),
            'ঘ' => Some(VehicleCategory::Jeep),
            'চ' => Some(VehicleCategory::Microbus),
            'জ' | 'ব' => Some(VehicleCategory::Bus),
            'ছ' | 'ট' | 'ঠ' | 'ড' | 'ন' | 'ম' => Some(VehicleCategory::Truck),
            'প' => Some(VehicleCategory::Taxi),
            'হ' | 'ল' => Some(VehicleCategory::Motorcycle),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateMetadata {
    pub region: Option<String>,
    pub series: Option<String>,
    pub vehicle_category: Option<VehicleCategory>,
    pub format: ValidationMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub mode: ValidationMode,
    pub text: String,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: Option<PlateMetadata>,
}

impl ValidationResult {
    fn invalid(text: &str, reasons: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: false,
            mode: ValidationMode::Strict,
            text: text.to_string(),
            reasons,
            warnings,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlateValidator {
    config: ValidatorConfig,
}

impl PlateValidator {
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default())
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn is_known_region(region: &str) -> bool {
        REGIONS.contains(region)
    }

    pub fn validate(&self, text: &str) -> ValidationResult {
        let text = text.trim();
        if text.is_empty() {
            return ValidationResult::invalid(
                text,
                vec!["plate text is empty".to_string()],
                Vec::new(),
            );
        }

        let strict_reasons = match Self::strict_pass(text) {
            Ok(metadata) => {
                return ValidationResult {
                    valid: true,
                    mode: ValidationMode::Strict,
                    text: text.to_string(),
                    reasons: Vec::new(),
                    warnings: Vec::new(),
                    metadata: Some(metadata),
                };
            }
            Err(reasons) => reasons,
        };

        if !self.config.allow_fallback {
            return ValidationResult::invalid(text, strict_reasons, Vec::new());
        }

        match self.fallback_pass(text) {
            Ok(mut warnings) => {
                warnings.insert(
                    0,
                    "strict validation bypassed, accepted by fallback rules".to_string(),
                );
                warnings.extend(strict_reasons.into_iter().map(|r| format!("strict: {}", r)));
                ValidationResult {
                    valid: true,
                    mode: ValidationMode::Fallback,
                    text: text.to_string(),
                    reasons: Vec::new(),
                    warnings,
                    metadata: Some(PlateMetadata {
                        region: None,
                        series: None,
                        vehicle_category: None,
                        format: ValidationMode::Fallback,
                    }),
                }
            }
            Err(fallback_reasons) => ValidationResult::invalid(
                text,
                strict_reasons,
                fallback_reasons
                    .into_iter()
                    .map(|r| format!("fallback: {}", r))
                    .collect(),
            ),
        }
    }

    fn strict_pass(text: &str) -> Result<PlateMetadata, Vec<String>> {
        let segments: Vec<&str> = text.split('-').collect();
        if segments.len() != 3 {
            return Err(vec![format!(
                "expected 3 hyphen-separated segments, found {}",
                segments.len()
            )]);
        }

        // 段内不允许多余空白
        let (region, series, number) = (segments[0], segments[1], segments[2]);
        let mut reasons = Vec::new();

        if !REGIONS.contains(region) {
            reasons.push(format!("unknown region '{}'", region));
        }
        if !SERIES_RE.is_match(series) {
            reasons.push(format!(
                "series '{}' must be 2-4 Bengali letters",
                series
            ));
        }
        if !NUMBER_RE.is_match(number) {
            reasons.push(format!(
                "number '{}' must be 3-4 Bengali digits",
                number
            ));
        }

        if !reasons.is_empty() {
            return Err(reasons);
        }

        Ok(PlateMetadata {
            region: Some(region.to_string()),
            series: Some(series.to_string()),
            vehicle_category: VehicleCategory::from_series(series),
            format: ValidationMode::Strict,
        })
    }

    /// Ok 时返回警告列表
    fn fallback_pass(&self, text: &str) -> Result<Vec<String>, Vec<String>> {
        let len = text.chars().count();
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        if len < self.config.fallback_min_len || len > self.config.fallback_max_len {
            reasons.push(format!(
                "length {} outside [{}, {}]",
                len, self.config.fallback_min_len, self.config.fallback_max_len
            ));
        }

        let script_chars = SCRIPT_CHAR_RE.find_iter(text).count();
        if script_chars < self.config.fallback_min_script_chars {
            reasons.push(format!(
                "only {} Bengali characters, need at least {}",
                script_chars, self.config.fallback_min_script_chars
            ));
        }

        if !reasons.is_empty() {
            return Err(reasons);
        }

        if len > self.config.separator_hint_len && !text.contains(['-', ' ']) {
            warnings.push(format!("{} characters without a separator", len));
        }

        Ok(warnings)
    }
}
