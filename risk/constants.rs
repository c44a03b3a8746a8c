//! Multistage Carcinogenesis Constants (Paterson et al.)
//!
//! This module defines the biological parameters of the APC+KRAS multistage
//! initiation model and derives the closed-form hazard amplitude from them.
//!
//! # Background
//!
//! Colorectal carcinogenesis is modelled as sequential driver events in a
//! population of `N` colonic crypts: biallelic APC inactivation (point
//! mutation plus loss of heterozygosity), a KRAS activation, and a TP53 hit,
//! with clonal-expansion advantages `b1` (APC-/-) and `b2` (KRAS+) acting
//! between events. Integrating the stage occupancy over time collapses, for
//! ages well below the plateau, to
//!
//! ```text
//!     H0(t) ≈ A · t² · exp((b1 + b2) · t)
//! ```
//!
//! where the amplitude `A` absorbs every per-year event rate together with
//! the fixation corrections `c1 · c2`:
//!
//! ```text
//!     A = c1·c2 · N · r_APC · r_TP53 · r_KRAS · r_LOH²
//!         · [ 1/(b12³·(b12−b1)) + 1/(b12³·(b12−b2)) + 1/(b12²·(b12−b2)²) ]
//! ```
//!
//! with `b12 = b1 + b2`. Gene-specific mutation rates are the base per-site
//! rate times the gene's target size, e.g. `r_APC = n_APC · u`.
//!
//! The derived amplitude is on the order of 1e-13 per year, which puts the
//! uncalibrated cumulative hazard near 1 around age 80. Population-level
//! agreement with observed incidence is the calibrator's job, not this
//! module's.

/// Biological parameters of the multistage initiation model.
///
/// All fields are strictly positive. The defaults are the published Paterson
/// values; tests occasionally perturb individual fields to probe the
/// amplitude's sensitivity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultistageParams {
    /// Number of colorectal crypts at risk (N).
    pub crypt_count: f64,
    /// Base mutation rate per site per year (u).
    pub base_mutation_rate: f64,
    /// APC driver target size in sites (n_APC).
    pub apc_target_size: f64,
    /// TP53 driver target size in sites (n_TP53).
    pub tp53_target_size: f64,
    /// KRAS driver target size in sites (n_KRAS).
    pub kras_target_size: f64,
    /// Loss-of-heterozygosity rate per allele per year (r_LOH).
    pub loh_rate: f64,
    /// Clonal growth advantage of APC-/- crypts (b1).
    pub apc_advantage: f64,
    /// Clonal growth advantage of KRAS+ crypts (b2).
    pub kras_advantage: f64,
    /// First fixation correction constant (c1).
    pub fixation_primary: f64,
    /// Second fixation correction constant (c2).
    pub fixation_secondary: f64,
}

impl Default for MultistageParams {
    fn default() -> Self {
        Self {
            crypt_count: 1e8,
            base_mutation_rate: 1.25e-8,
            apc_target_size: 604.0,
            tp53_target_size: 73.0,
            kras_target_size: 20.0,
            loh_rate: 1.36e-4,
            apc_advantage: 0.20,
            kras_advantage: 0.07,
            fixation_primary: 5.88,
            fixation_secondary: 3.6,
        }
    }
}

impl MultistageParams {
    /// APC mutation rate per crypt per year (n_APC · u).
    #[inline]
    pub fn apc_mutation_rate(&self) -> f64 {
        self.apc_target_size * self.base_mutation_rate
    }

    /// TP53 mutation rate per crypt per year (n_TP53 · u).
    #[inline]
    pub fn tp53_mutation_rate(&self) -> f64 {
        self.tp53_target_size * self.base_mutation_rate
    }

    /// KRAS mutation rate per crypt per year (n_KRAS · u).
    #[inline]
    pub fn kras_mutation_rate(&self) -> f64 {
        self.kras_target_size * self.base_mutation_rate
    }

    /// Combined growth advantage of double-hit crypts (b12 = b1 + b2).
    ///
    /// This is derived, never stored: the double-hit advantage is the sum of
    /// the single advantages by construction of the model.
    #[inline]
    pub fn combined_advantage(&self) -> f64 {
        self.apc_advantage + self.kras_advantage
    }

    /// Product of the fixation corrections (c1 · c2).
    #[inline]
    pub fn fixation_correction(&self) -> f64 {
        self.fixation_primary * self.fixation_secondary
    }

    /// Closed-form hazard amplitude `A` (per year).
    ///
    /// Combines the crypt count, the three gene-specific mutation rates, the
    /// squared LOH rate and the fixation corrections with the stage-integral
    /// bracket in the combined advantage. Requires `b1 > 0` and `b2 > 0` so
    /// that `b12` strictly exceeds both and no bracket term divides by zero.
    pub fn hazard_amplitude(&self) -> f64 {
        let b12 = self.combined_advantage();
        debug_assert!(
            self.apc_advantage > 0.0 && self.kras_advantage > 0.0,
            "growth advantages must be strictly positive"
        );

        let rate_product = self.fixation_correction()
            * self.crypt_count
            * self.apc_mutation_rate()
            * self.tp53_mutation_rate()
            * self.kras_mutation_rate()
            * self.loh_rate
            * self.loh_rate;

        let bracket = 1.0 / (b12.powi(3) * (b12 - self.apc_advantage))
            + 1.0 / (b12.powi(3) * (b12 - self.kras_advantage))
            + 1.0 / (b12.powi(2) * (b12 - self.kras_advantage).powi(2));

        rate_product * bracket
    }
}
