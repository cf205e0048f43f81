use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_SAMPLE_STRIDE: u32 = 30;
const DEFAULT_MIN_AREA: f64 = 6000.0;
const DEFAULT_AGREE_K: u8 = 2;
const DEFAULT_MAX_WORKING_DIM: u32 = 1280;
const DEFAULT_OPEN_RADIUS: u32 = 2;
const DEFAULT_MIN_SEVERITY: f64 = 0.9;
const DEFAULT_MIN_REGION_PIXELS: usize = 25;

/// Morphological cleanup applied to the consensus mask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Opening only: removes speckle, keeps fragments apart.
    #[default]
    Open,
    /// Opening followed by closing: also merges nearby fragments.
    OpenClose,
}

/// Which type labels the classifier may emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Taxonomy {
    /// Every occurrence is `low_signal`.
    #[default]
    Generic,
    /// Distinguishes `canopy_gap` and `exposed_soil` before falling back to `low_signal`.
    Extended,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnalysisConfigFile {
    sampling: Option<SamplingConfigFile>,
    detector: Option<DetectorConfigFile>,
    thresholds: Option<ThresholdsConfigFile>,
    scoring: Option<ScoringConfigFile>,
    boost: Option<BoostConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SamplingConfigFile {
    stride: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    min_area: Option<f64>,
    agree_k: Option<u8>,
    soil_guard: Option<bool>,
    max_working_dim: Option<u32>,
    open_radius: Option<u32>,
    cleanup: Option<CleanupPolicy>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ThresholdsConfigFile {
    vari: Option<f32>,
    ngrdi: Option<f32>,
    ifv: Option<f32>,
    soil_ifv_mean: Option<f32>,
    soil_ngrdi_mean: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ScoringConfigFile {
    min_severity: Option<f64>,
    min_region_pixels: Option<usize>,
    confidence_split: Option<f64>,
    confidence_low: Option<u8>,
    confidence_high: Option<u8>,
    recommend_high: Option<f64>,
    recommend_moderate: Option<f64>,
    taxonomy: Option<Taxonomy>,
    weights: Option<SeverityWeightsConfigFile>,
    extended: Option<ExtendedTypeRulesConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SeverityWeightsConfigFile {
    vari_ref: Option<f64>,
    vari_weight: Option<f64>,
    ngrdi_ref: Option<f64>,
    ngrdi_weight: Option<f64>,
    ifv_ref: Option<f64>,
    ifv_weight: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ExtendedTypeRulesConfigFile {
    canopy_gap_ifv: Option<f64>,
    canopy_gap_vari: Option<f64>,
    exposed_soil_vari: Option<f64>,
    exposed_soil_ifv: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BoostConfigFile {
    enabled: Option<bool>,
    false_positive_below: Option<f64>,
    false_positive_confidence_ceiling: Option<u8>,
    escalate_above: Option<f64>,
}

/// Full set of knobs for one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Process every Nth frame of the source.
    pub sample_stride: u32,
    pub detector: DetectorSettings,
    pub thresholds: IndexThresholds,
    pub scoring: ScoringSettings,
    pub boost: BoostSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Region area floor in full-resolution pixels.
    pub min_area: f64,
    /// How many of the three low-signal masks must agree (2 or 3).
    pub agree_k: u8,
    pub soil_guard_enabled: bool,
    /// Frames whose longest side exceeds this are halved before index work.
    pub max_working_dim: u32,
    pub open_radius: u32,
    pub cleanup: CleanupPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexThresholds {
    pub vari: f32,
    pub ngrdi: f32,
    pub ifv: f32,
    pub soil_ifv_mean: f32,
    pub soil_ngrdi_mean: f32,
}

/// Reference points and weights of the severity formula.
///
/// Each term is `max(0, (reference - mean) * weight)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityWeights {
    pub vari_ref: f64,
    pub vari_weight: f64,
    pub ngrdi_ref: f64,
    pub ngrdi_weight: f64,
    pub ifv_ref: f64,
    pub ifv_weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedTypeRules {
    pub canopy_gap_ifv: f64,
    pub canopy_gap_vari: f64,
    pub exposed_soil_vari: f64,
    pub exposed_soil_ifv: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringSettings {
    pub min_severity: f64,
    /// Regions sampling fewer working pixels than this are dropped.
    pub min_region_pixels: usize,
    pub weights: SeverityWeights,
    pub confidence_split: f64,
    pub confidence_low: u8,
    pub confidence_high: u8,
    pub recommend_high: f64,
    pub recommend_moderate: f64,
    pub taxonomy: Taxonomy,
    pub extended: ExtendedTypeRules,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoostSettings {
    /// When false the model only annotates its score.
    pub enabled: bool,
    pub false_positive_below: f64,
    pub false_positive_confidence_ceiling: u8,
    pub escalate_above: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_area: DEFAULT_MIN_AREA,
            agree_k: DEFAULT_AGREE_K,
            soil_guard_enabled: true,
            max_working_dim: DEFAULT_MAX_WORKING_DIM,
            open_radius: DEFAULT_OPEN_RADIUS,
            cleanup: CleanupPolicy::Open,
        }
    }
}

impl Default for IndexThresholds {
    fn default() -> Self {
        Self {
            vari: 0.02,
            ngrdi: 0.02,
            ifv: 0.30,
            soil_ifv_mean: 0.28,
            soil_ngrdi_mean: 0.02,
        }
    }
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            vari_ref: 0.15,
            vari_weight: 4.0,
            ngrdi_ref: 0.12,
            ngrdi_weight: 3.0,
            ifv_ref: 0.40,
            ifv_weight: 2.0,
        }
    }
}

impl Default for ExtendedTypeRules {
    fn default() -> Self {
        Self {
            canopy_gap_ifv: 0.28,
            canopy_gap_vari: 0.02,
            exposed_soil_vari: 0.01,
            exposed_soil_ifv: 0.22,
        }
    }
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            min_severity: DEFAULT_MIN_SEVERITY,
            min_region_pixels: DEFAULT_MIN_REGION_PIXELS,
            weights: SeverityWeights::default(),
            confidence_split: 1.3,
            confidence_low: 80,
            confidence_high: 92,
            recommend_high: 1.3,
            recommend_moderate: 0.8,
            taxonomy: Taxonomy::Generic,
            extended: ExtendedTypeRules::default(),
        }
    }
}

impl Default for BoostSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            false_positive_below: 0.35,
            false_positive_confidence_ceiling: 90,
            escalate_above: 0.75,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_stride: DEFAULT_SAMPLE_STRIDE,
            detector: DetectorSettings::default(),
            thresholds: IndexThresholds::default(),
            scoring: ScoringSettings::default(),
            boost: BoostSettings::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load from the file named by `VEGWATCH_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VEGWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file path (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: AnalysisConfigFile =
            toml::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AnalysisConfigFile) -> Self {
        let defaults = Self::default();

        let sample_stride = file
            .sampling
            .and_then(|sampling| sampling.stride)
            .unwrap_or(defaults.sample_stride);

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            min_area: detector_file
                .min_area
                .unwrap_or(defaults.detector.min_area),
            agree_k: detector_file.agree_k.unwrap_or(defaults.detector.agree_k),
            soil_guard_enabled: detector_file
                .soil_guard
                .unwrap_or(defaults.detector.soil_guard_enabled),
            max_working_dim: detector_file
                .max_working_dim
                .unwrap_or(defaults.detector.max_working_dim),
            open_radius: detector_file
                .open_radius
                .unwrap_or(defaults.detector.open_radius),
            cleanup: detector_file.cleanup.unwrap_or(defaults.detector.cleanup),
        };

        let thresholds_file = file.thresholds.unwrap_or_default();
        let thresholds = IndexThresholds {
            vari: thresholds_file.vari.unwrap_or(defaults.thresholds.vari),
            ngrdi: thresholds_file.ngrdi.unwrap_or(defaults.thresholds.ngrdi),
            ifv: thresholds_file.ifv.unwrap_or(defaults.thresholds.ifv),
            soil_ifv_mean: thresholds_file
                .soil_ifv_mean
                .unwrap_or(defaults.thresholds.soil_ifv_mean),
            soil_ngrdi_mean: thresholds_file
                .soil_ngrdi_mean
                .unwrap_or(defaults.thresholds.soil_ngrdi_mean),
        };

        let scoring_file = file.scoring.unwrap_or_default();
        let weights_file = scoring_file.weights.unwrap_or_default();
        let dw = &defaults.scoring.weights;
        let weights = SeverityWeights {
            vari_ref: weights_file.vari_ref.unwrap_or(dw.vari_ref),
            vari_weight: weights_file.vari_weight.unwrap_or(dw.vari_weight),
            ngrdi_ref: weights_file.ngrdi_ref.unwrap_or(dw.ngrdi_ref),
            ngrdi_weight: weights_file.ngrdi_weight.unwrap_or(dw.ngrdi_weight),
            ifv_ref: weights_file.ifv_ref.unwrap_or(dw.ifv_ref),
            ifv_weight: weights_file.ifv_weight.unwrap_or(dw.ifv_weight),
        };
        let extended_file = scoring_file.extended.unwrap_or_default();
        let de = &defaults.scoring.extended;
        let extended = ExtendedTypeRules {
            canopy_gap_ifv: extended_file.canopy_gap_ifv.unwrap_or(de.canopy_gap_ifv),
            canopy_gap_vari: extended_file.canopy_gap_vari.unwrap_or(de.canopy_gap_vari),
            exposed_soil_vari: extended_file
                .exposed_soil_vari
                .unwrap_or(de.exposed_soil_vari),
            exposed_soil_ifv: extended_file
                .exposed_soil_ifv
                .unwrap_or(de.exposed_soil_ifv),
        };
        let scoring = ScoringSettings {
            min_severity: scoring_file
                .min_severity
                .unwrap_or(defaults.scoring.min_severity),
            min_region_pixels: scoring_file
                .min_region_pixels
                .unwrap_or(defaults.scoring.min_region_pixels),
            weights,
            confidence_split: scoring_file
                .confidence_split
                .unwrap_or(defaults.scoring.confidence_split),
            confidence_low: scoring_file
                .confidence_low
                .unwrap_or(defaults.scoring.confidence_low),
            confidence_high: scoring_file
                .confidence_high
                .unwrap_or(defaults.scoring.confidence_high),
            recommend_high: scoring_file
                .recommend_high
                .unwrap_or(defaults.scoring.recommend_high),
            recommend_moderate: scoring_file
                .recommend_moderate
                .unwrap_or(defaults.scoring.recommend_moderate),
            taxonomy: scoring_file.taxonomy.unwrap_or(defaults.scoring.taxonomy),
            extended,
        };

        let boost_file = file.boost.unwrap_or_default();
        let boost = BoostSettings {
            enabled: boost_file.enabled.unwrap_or(defaults.boost.enabled),
            false_positive_below: boost_file
                .false_positive_below
                .unwrap_or(defaults.boost.false_positive_below),
            false_positive_confidence_ceiling: boost_file
                .false_positive_confidence_ceiling
                .unwrap_or(defaults.boost.false_positive_confidence_ceiling),
            escalate_above: boost_file
                .escalate_above
                .unwrap_or(defaults.boost.escalate_above),
        };

        Self {
            sample_stride,
            detector,
            thresholds,
            scoring,
            boost,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(stride) = std::env::var("VEGWATCH_SAMPLE_STRIDE") {
            self.sample_stride = stride
                .trim()
                .parse()
                .map_err(|_| anyhow!("VEGWATCH_SAMPLE_STRIDE must be a positive integer"))?;
        }
        if let Ok(min_area) = std::env::var("VEGWATCH_MIN_AREA") {
            self.detector.min_area = min_area
                .trim()
                .parse()
                .map_err(|_| anyhow!("VEGWATCH_MIN_AREA must be a number of pixels"))?;
        }
        if let Ok(agree_k) = std::env::var("VEGWATCH_AGREE_K") {
            self.detector.agree_k = agree_k
                .trim()
                .parse()
                .map_err(|_| anyhow!("VEGWATCH_AGREE_K must be 2 or 3"))?;
        }
        if let Ok(min_severity) = std::env::var("VEGWATCH_MIN_SEVERITY") {
            self.scoring.min_severity = min_severity
                .trim()
                .parse()
                .map_err(|_| anyhow!("VEGWATCH_MIN_SEVERITY must be a number"))?;
        }
        if let Ok(soil_guard) = std::env::var("VEGWATCH_SOIL_GUARD") {
            self.detector.soil_guard_enabled = parse_bool(&soil_guard)
                .ok_or_else(|| anyhow!("VEGWATCH_SOIL_GUARD must be true or false"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_stride == 0 {
            return Err(anyhow!("sample stride must be >= 1"));
        }
        if !matches!(self.detector.agree_k, 2 | 3) {
            return Err(anyhow!(
                "agree_k must be 2 or 3 (got {})",
                self.detector.agree_k
            ));
        }
        if !self.detector.min_area.is_finite() || self.detector.min_area < 0.0 {
            return Err(anyhow!("min_area must be a non-negative number"));
        }
        if !self.scoring.min_severity.is_finite() {
            return Err(anyhow!("min_severity must be finite"));
        }
        let w = &self.scoring.weights;
        for (name, value) in [
            ("vari_ref", w.vari_ref),
            ("vari_weight", w.vari_weight),
            ("ngrdi_ref", w.ngrdi_ref),
            ("ngrdi_weight", w.ngrdi_weight),
            ("ifv_ref", w.ifv_ref),
            ("ifv_weight", w.ifv_weight),
        ] {
            if !value.is_finite() {
                return Err(anyhow!("scoring.weights.{} must be finite", name));
            }
        }
        if self.detector.max_working_dim == 0 {
            return Err(anyhow!("max_working_dim must be greater than zero"));
        }
        if self.scoring.confidence_low > 100 || self.scoring.confidence_high > 100 {
            return Err(anyhow!("confidence tiers must lie within 0..=100"));
        }
        if self.boost.false_positive_confidence_ceiling > 100 {
            return Err(anyhow!("false positive confidence ceiling must lie within 0..=100"));
        }
        for (name, p) in [
            ("false_positive_below", self.boost.false_positive_below),
            ("escalate_above", self.boost.escalate_above),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(anyhow!("boost.{} must be a probability", name));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AnalysisConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
