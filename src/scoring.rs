use crate::types::GameConfig;

/// Points and multiplier granted for one submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Award {
    pub points: u32,
    /// Only present for invested, correct answers.
    pub multiplier: Option<f64>,
}

/// Scoring parameters. Grading is a pure function of these and the inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringRules {
    pub base_points: u32,
    pub max_bonus: f64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            base_points: 10,
            max_bonus: 1.0,
        }
    }
}

impl From<&GameConfig> for ScoringRules {
    fn from(config: &GameConfig) -> Self {
        Self {
            base_points: config.base_points,
            max_bonus: config.max_bonus,
        }
    }
}

impl ScoringRules {
    /// Speed multiplier for the `rank`-th correct invested answer.
    ///
    /// Decreases linearly over the first half of the field, floored at 1.
    pub fn multiplier(&self, rank: u32, total_teams: usize) -> f64 {
        let half = total_teams.div_ceil(2).max(1) as f64;
        let rank = rank.max(1) as f64;
        let multiplier = 1.0 + self.max_bonus * (1.0 - (rank - 1.0) / half);
        multiplier.max(1.0)
    }

    /// Grade one submission. `rank` is the arrival order among correct
    /// answers and is ignored for wrong ones.
    pub fn grade(&self, is_correct: bool, invested: bool, rank: u32, total_teams: usize) -> Award {
        if !is_correct {
            return Award {
                points: 0,
                multiplier: None,
            };
        }

        if !invested {
            return Award {
                points: self.base_points,
                multiplier: None,
            };
        }

        let multiplier = self.multiplier(rank, total_teams);
        let points = (self.base_points as f64 * multiplier).round() as u32;
        Award {
            points,
            multiplier: Some(multiplier),
        }
    }
}

/// Case-insensitive comparison of a submission against the canonical answer.
pub fn is_correct(submitted: &str, answer: &str) -> bool {
    submitted.trim().to_uppercase() == answer.trim().to_uppercase()
}
