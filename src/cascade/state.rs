use crate::driver::{ParamVariance, Stage};
use crate::model::{ModelFamily, SourceModel};
use crate::types::SourceId;

use std::fmt;

/// Level of the model-selection cascade
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecisionLevel {
    /// Point source against compact galaxy
    Zero,
    /// Exponential against de Vaucouleurs, with the compact galaxy as baseline
    One,
    /// Composite against the better of exponential and de Vaucouleurs
    Two,
}

impl DecisionLevel {
    pub const ALL: [Self; 3] = [Self::Zero, Self::One, Self::Two];

    pub fn index(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
        }
    }

    /// Family fitted at each sublevel
    pub fn families(self) -> &'static [ModelFamily] {
        match self {
            Self::Zero => &[ModelFamily::PointSource, ModelFamily::CompactGalaxy],
            Self::One => &[ModelFamily::ExpGalaxy, ModelFamily::DevGalaxy],
            Self::Two => &[ModelFamily::CompositeGalaxy],
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Zero => Some(Self::One),
            Self::One => Some(Self::Two),
            Self::Two => None,
        }
    }
}

/// Cell of the trial table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TrialCoord {
    pub level: DecisionLevel,
    pub sublevel: u8,
}

impl TrialCoord {
    pub const POINT_SOURCE: Self = Self::new(DecisionLevel::Zero, 0);
    pub const COMPACT_GALAXY: Self = Self::new(DecisionLevel::Zero, 1);
    pub const EXP_GALAXY: Self = Self::new(DecisionLevel::One, 0);
    pub const DEV_GALAXY: Self = Self::new(DecisionLevel::One, 1);
    pub const COMPOSITE_GALAXY: Self = Self::new(DecisionLevel::Two, 0);

    pub const fn new(level: DecisionLevel, sublevel: u8) -> Self {
        assert!(sublevel < 2, "sublevel must be 0 or 1");
        Self { level, sublevel }
    }

    /// Family fitted at this cell
    pub fn family(self) -> Option<ModelFamily> {
        self.level.families().get(self.sublevel as usize).copied()
    }

    pub fn stage(self) -> Stage {
        Stage::Trial {
            level: self.level.index(),
            sublevel: self.sublevel,
        }
    }
}

impl fmt::Display for TrialCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.level.index(), self.sublevel)
    }
}

/// Model of a single source fitted at a trial, with its chi-square
#[derive(Clone, Debug, PartialEq)]
pub struct Trial {
    pub model: SourceModel,
    pub chisq: f64,
}

/// Trials of a single source indexed by (level, sublevel)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrialTable([[Option<Trial>; 2]; 3]);

impl TrialTable {
    pub fn get(&self, coord: TrialCoord) -> Option<&Trial> {
        self.0[coord.level.index() as usize][coord.sublevel as usize].as_ref()
    }

    pub fn chisq(&self, coord: TrialCoord) -> Option<f64> {
        self.get(coord).map(|trial| trial.chisq)
    }

    pub fn insert(&mut self, coord: TrialCoord, trial: Trial) {
        self.0[coord.level.index() as usize][coord.sublevel as usize] = Some(trial);
    }

    /// Filled cells in cascade order
    pub fn iter(&self) -> impl Iterator<Item = (TrialCoord, &Trial)> {
        DecisionLevel::ALL.into_iter().flat_map(move |level| {
            (0..level.families().len() as u8).filter_map(move |sublevel| {
                let coord = TrialCoord::new(level, sublevel);
                self.get(coord).map(|trial| (coord, trial))
            })
        })
    }
}

/// Winning model of a source
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
    pub family: ModelFamily,
    /// Trial the model comes from
    pub coord: TrialCoord,
    pub model: SourceModel,
    pub chisq: f64,
}

/// Working record of a single source inside the cascade
#[derive(Clone, Debug, PartialEq)]
pub struct SourceState {
    pub sid: SourceId,
    /// Family fitted next, or the winning family once solved
    pub family: ModelFamily,
    /// Highest level this source has been fitted at
    pub level: DecisionLevel,
    pub trials: TrialTable,
    pub solution: Option<Solution>,
    /// Variance of (x, y) captured at the first trial
    pub position_variance: Option<ParamVariance>,
}

impl SourceState {
    pub fn new(sid: SourceId) -> Self {
        Self {
            sid,
            family: ModelFamily::PointSource,
            level: DecisionLevel::Zero,
            trials: TrialTable::default(),
            solution: None,
            position_variance: None,
        }
    }

    pub fn is_solved(&self) -> bool {
        self.solution.is_some()
    }

    /// Record the model fitted at `coord` as the solution, returns `false` if there is no such
    /// trial
    pub fn solve(&mut self, family: ModelFamily, coord: TrialCoord) -> bool {
        let Some(trial) = self.trials.get(coord) else {
            return false;
        };
        self.solution = Some(Solution {
            family,
            coord,
            model: trial.model.clone(),
            chisq: trial.chisq,
        });
        self.family = family;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fluxes, PixPos};

    fn trial(chisq: f64) -> Trial {
        Trial {
            model: SourceModel::point_source(PixPos::new(0.0, 0.0), Fluxes::uniform(1.0, 1)),
            chisq,
        }
    }

    #[test]
    fn coords_match_families() {
        assert_eq!(TrialCoord::POINT_SOURCE.family(), Some(ModelFamily::PointSource));
        assert_eq!(TrialCoord::COMPACT_GALAXY.family(), Some(ModelFamily::CompactGalaxy));
        assert_eq!(TrialCoord::EXP_GALAXY.family(), Some(ModelFamily::ExpGalaxy));
        assert_eq!(TrialCoord::DEV_GALAXY.family(), Some(ModelFamily::DevGalaxy));
        assert_eq!(
            TrialCoord::COMPOSITE_GALAXY.family(),
            Some(ModelFamily::CompositeGalaxy)
        );
        assert_eq!(TrialCoord::new(DecisionLevel::Two, 1).family(), None);
    }

    #[test]
    fn table_iterates_in_cascade_order() {
        let mut table = TrialTable::default();
        table.insert(TrialCoord::DEV_GALAXY, trial(3.0));
        table.insert(TrialCoord::POINT_SOURCE, trial(1.0));
        table.insert(TrialCoord::COMPACT_GALAXY, trial(2.0));
        let chisq: Vec<_> = table.iter().map(|(_, t)| t.chisq).collect();
        assert_eq!(chisq, [1.0, 2.0, 3.0]);
        assert_eq!(table.chisq(TrialCoord::EXP_GALAXY), None);
    }

    #[test]
    fn solve_requires_trial() {
        let mut state = SourceState::new(3);
        assert!(!state.solve(ModelFamily::PointSource, TrialCoord::POINT_SOURCE));
        state.trials.insert(TrialCoord::POINT_SOURCE, trial(4.0));
        assert!(state.solve(ModelFamily::PointSource, TrialCoord::POINT_SOURCE));
        assert!(state.is_solved());
        assert_eq!(state.solution.unwrap().chisq, 4.0);
    }

    #[test]
    fn stage_of_coord() {
        assert_eq!(
            TrialCoord::DEV_GALAXY.stage().to_string(),
            "Morph Model (1, 1)"
        );
    }
}
