//! Winner decisions of the cascade levels
//!
//! Every function here is total: it either solves the source or names the family it is promoted
//! to. `NaN` chi-squares never win a comparison.

use crate::cascade::state::{DecisionLevel, TrialCoord, TrialTable};
use crate::model::ModelFamily;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Verdict {
    /// The model fitted at `coord` wins
    Solved {
        family: ModelFamily,
        coord: TrialCoord,
    },
    /// Refit with a more complex family at the next level
    Promote(ModelFamily),
}

impl Verdict {
    const POINT_SOURCE: Self = Self::Solved {
        family: ModelFamily::PointSource,
        coord: TrialCoord::POINT_SOURCE,
    };
    const COMPACT_GALAXY: Self = Self::Solved {
        family: ModelFamily::CompactGalaxy,
        coord: TrialCoord::COMPACT_GALAXY,
    };
    const EXP_GALAXY: Self = Self::Solved {
        family: ModelFamily::ExpGalaxy,
        coord: TrialCoord::EXP_GALAXY,
    };
    const DEV_GALAXY: Self = Self::Solved {
        family: ModelFamily::DevGalaxy,
        coord: TrialCoord::DEV_GALAXY,
    };
    const COMPOSITE_GALAXY: Self = Self::Solved {
        family: ModelFamily::CompositeGalaxy,
        coord: TrialCoord::COMPOSITE_GALAXY,
    };
}

/// Point source wins only if it is strictly better than the compact galaxy
pub fn decide_level0(ps: f64, sg: f64) -> Verdict {
    if ps < sg {
        Verdict::POINT_SOURCE
    } else {
        Verdict::Promote(ModelFamily::ExpGalaxy)
    }
}

/// Exponential and de Vaucouleurs against the compact-galaxy baseline
///
/// A galaxy profile that doesn't beat the baseline never wins. When both beat it, a near-tie
/// (difference below `exp_dev_thresh`) or an exact tie is promoted to the composite, otherwise
/// the better one wins.
pub fn decide_level1(exp: f64, dev: f64, sg: f64, exp_dev_thresh: f64) -> Verdict {
    let near_tie = (exp - dev).abs() < exp_dev_thresh;
    match (exp < sg, dev < sg) {
        (false, false) => Verdict::COMPACT_GALAXY,
        (true, false) => Verdict::EXP_GALAXY,
        (false, true) => Verdict::DEV_GALAXY,
        (true, true) if near_tie => Verdict::Promote(ModelFamily::CompositeGalaxy),
        (true, true) if exp < dev => Verdict::EXP_GALAXY,
        (true, true) if dev < exp => Verdict::DEV_GALAXY,
        (true, true) => Verdict::Promote(ModelFamily::CompositeGalaxy),
    }
}

/// Composite wins if strictly better than both profiles, otherwise the better profile does,
/// exponential on a tie
pub fn decide_level2(composite: f64, exp: f64, dev: f64) -> Verdict {
    if composite < exp && composite < dev {
        Verdict::COMPOSITE_GALAXY
    } else if dev < exp {
        Verdict::DEV_GALAXY
    } else {
        Verdict::EXP_GALAXY
    }
}

/// Decision for `level` from the trials of a single source, `None` if a required trial is missing
pub fn decide(level: DecisionLevel, trials: &TrialTable, exp_dev_thresh: f64) -> Option<Verdict> {
    let verdict = match level {
        DecisionLevel::Zero => decide_level0(
            trials.chisq(TrialCoord::POINT_SOURCE)?,
            trials.chisq(TrialCoord::COMPACT_GALAXY)?,
        ),
        DecisionLevel::One => decide_level1(
            trials.chisq(TrialCoord::EXP_GALAXY)?,
            trials.chisq(TrialCoord::DEV_GALAXY)?,
            trials.chisq(TrialCoord::COMPACT_GALAXY)?,
            exp_dev_thresh,
        ),
        DecisionLevel::Two => decide_level2(
            trials.chisq(TrialCoord::COMPOSITE_GALAXY)?,
            trials.chisq(TrialCoord::EXP_GALAXY)?,
            trials.chisq(TrialCoord::DEV_GALAXY)?,
        ),
    };
    Some(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::state::Trial;
    use crate::model::{Fluxes, PixPos, SourceModel};

    #[test]
    fn level0_point_source_wins() {
        assert_eq!(decide_level0(10.0, 12.0), Verdict::POINT_SOURCE);
    }

    #[test]
    fn level0_tie_promotes() {
        assert_eq!(
            decide_level0(12.0, 12.0),
            Verdict::Promote(ModelFamily::ExpGalaxy)
        );
    }

    #[test]
    fn level1_baseline_wins_over_near_tie() {
        assert_eq!(
            decide_level1(20.0, 20.05, 19.9, 0.5),
            Verdict::COMPACT_GALAXY
        );
    }

    #[test]
    fn level1_clear_exponential() {
        assert_eq!(decide_level1(15.0, 25.0, 19.9, 0.5), Verdict::EXP_GALAXY);
    }

    #[test]
    fn level1_clear_de_vaucouleurs() {
        assert_eq!(decide_level1(18.0, 12.0, 19.9, 0.5), Verdict::DEV_GALAXY);
    }

    #[test]
    fn level1_near_tie_below_baseline_is_promoted() {
        assert_eq!(
            decide_level1(15.0, 15.2, 19.9, 0.5),
            Verdict::Promote(ModelFamily::CompositeGalaxy)
        );
    }

    #[test]
    fn level1_single_profile_beating_baseline_wins_even_if_close() {
        assert_eq!(decide_level1(19.8, 20.0, 19.9, 0.5), Verdict::EXP_GALAXY);
        assert_eq!(decide_level1(20.0, 19.8, 19.9, 0.5), Verdict::DEV_GALAXY);
    }

    #[test]
    fn level1_exact_tie_is_promoted_without_threshold() {
        assert_eq!(
            decide_level1(15.0, 15.0, 19.9, 0.0),
            Verdict::Promote(ModelFamily::CompositeGalaxy)
        );
    }

    #[test]
    fn level1_nan_falls_back_to_baseline() {
        assert_eq!(
            decide_level1(f64::NAN, f64::NAN, 19.9, 0.5),
            Verdict::COMPACT_GALAXY
        );
    }

    #[test]
    fn level2() {
        assert_eq!(decide_level2(9.0, 10.0, 11.0), Verdict::COMPOSITE_GALAXY);
        assert_eq!(decide_level2(10.5, 10.0, 11.0), Verdict::EXP_GALAXY);
        assert_eq!(decide_level2(10.5, 11.0, 10.0), Verdict::DEV_GALAXY);
        assert_eq!(decide_level2(12.0, 10.0, 10.0), Verdict::EXP_GALAXY);
    }

    #[test]
    fn decide_requires_both_trials() {
        let mut trials = TrialTable::default();
        let model = SourceModel::point_source(PixPos::new(0.0, 0.0), Fluxes::uniform(1.0, 1));
        trials.insert(
            TrialCoord::POINT_SOURCE,
            Trial {
                model: model.clone(),
                chisq: 10.0,
            },
        );
        assert_eq!(decide(DecisionLevel::Zero, &trials, 0.5), None);
        trials.insert(TrialCoord::COMPACT_GALAXY, Trial { model, chisq: 12.0 });
        assert_eq!(
            decide(DecisionLevel::Zero, &trials, 0.5),
            Some(Verdict::POINT_SOURCE)
        );
    }
}
