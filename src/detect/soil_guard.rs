use crate::config::{DetectorSettings, IndexThresholds};
use crate::indices::IndexTriple;

/// Frame-level veto for frames that are mostly bare earth.
///
/// A frame is skipped when both its mean IFV and its mean NGRDI sit below the
/// soil thresholds; region detection never runs on such frames.
#[derive(Clone, Debug, PartialEq)]
pub struct SoilGuard {
    enabled: bool,
    ifv_mean: f64,
    ngrdi_mean: f64,
}

impl SoilGuard {
    pub fn new(settings: &DetectorSettings, thresholds: &IndexThresholds) -> Self {
        Self {
            enabled: settings.soil_guard_enabled,
            ifv_mean: thresholds.soil_ifv_mean as f64,
            ngrdi_mean: thresholds.soil_ngrdi_mean as f64,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_soil(&self, triple: &IndexTriple) -> bool {
        if !self.enabled || triple.is_empty() {
            return false;
        }
        let ifv = triple.mean_ifv();
        let ngrdi = triple.mean_ngrdi();
        let soil = ifv < self.ifv_mean && ngrdi < self.ngrdi_mean;
        if soil {
            log::debug!(
                "soil guard: mean ifv {:.3}, mean ngrdi {:.3}; skipping frame",
                ifv,
                ngrdi
            );
        }
        soil
    }
}
