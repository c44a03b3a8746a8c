use crate::constants::MultistageParams;

/// Cumulative hazards are capped here before exponentiation. At 50 the
/// survival term exp(-H) is ~2e-22, far below f64 resolution around 1.0, so
/// the cap is invisible except as a guard against overflow at extreme ages
/// or alphas.
pub const HAZARD_CAP: f64 = 50.0;

/// Closed-form multistage hazard model.
///
/// Holds the derived amplitude and growth exponent; both are fixed at
/// construction so every evaluation is a pure function of age and alpha.
#[derive(Debug, Clone, Copy)]
pub struct HazardModel {
    amplitude: f64,
    growth_rate: f64,
}

impl Default for HazardModel {
    fn default() -> Self {
        Self::new(&MultistageParams::default())
    }
}

impl HazardModel {
    pub fn new(params: &MultistageParams) -> Self {
        Self {
            amplitude: params.hazard_amplitude(),
            growth_rate: params.combined_advantage(),
        }
    }

    /// Amplitude `A` of the hazard curve (per year).
    #[inline]
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Baseline cumulative hazard H0(age) = A · age² · exp(b12 · age),
    /// capped at [`HAZARD_CAP`].
    #[inline]
    pub fn cumulative_hazard(&self, age: f64) -> f64 {
        debug_assert!(age >= 0.0, "age must be non-negative");
        let h = self.amplitude * age * age * (self.growth_rate * age).exp();
        h.min(HAZARD_CAP)
    }

    /// Baseline cumulative risk P0(age) = 1 − exp(−H0(age)).
    #[inline]
    pub fn baseline_risk(&self, age: f64) -> f64 {
        1.0 - (-self.cumulative_hazard(age)).exp()
    }

    /// Personalized cumulative risk: the baseline hazard is scaled by alpha
    /// and re-capped before the survival transform. Within the cap this is
    /// exact proportional-hazards scaling; beyond it the risk saturates
    /// silently rather than erroring.
    #[inline]
    pub fn personalized_risk(&self, age: f64, alpha: f64) -> f64 {
        debug_assert!(alpha > 0.0, "alpha must be strictly positive");
        let h = (alpha * self.cumulative_hazard(age)).min(HAZARD_CAP);
        1.0 - (-h).exp()
    }

    /// Probability of initiation in (age_now, age_future] given none by
    /// age_now. Callers must ensure `age_future >= age_now`; an inverted
    /// interval is a usage error rejected at the API boundary, not here.
    ///
    /// When the risk at age_now has already saturated to 1.0 the conditional
    /// probability is defined as 0.0: the survivor population is empty.
    pub fn conditional_risk(&self, age_now: f64, age_future: f64, alpha: f64) -> f64 {
        debug_assert!(
            age_future >= age_now,
            "conditional window must not be inverted"
        );
        let p_now = self.personalized_risk(age_now, alpha);
        if p_now >= 1.0 {
            return 0.0;
        }
        let p_future = self.personalized_risk(age_future, alpha);
        (p_future - p_now).max(0.0) / (1.0 - p_now)
    }
}
