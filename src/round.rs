use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{InvestmentTally, LiveAnswer, Question, RoundPhase, ServerMsg, SocketId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoundError {
    #[error("{action} is not allowed in phase {phase}")]
    WrongPhase {
        action: &'static str,
        phase: RoundPhase,
    },
    #[error("team already answered this question")]
    AlreadySubmitted,
    #[error("timer for round {fired} fired during round {current}")]
    StaleTimer { fired: u64, current: u64 },
}

/// What a team is entitled to when its answer is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionSlot {
    pub invested: bool,
    /// Set only for correct answers.
    pub rank: Option<u32>,
}

/// The single active round shared by every connection.
#[derive(Debug)]
pub struct Round {
    generation: u64,
    question: Option<Question>,
    phase: RoundPhase,
    deadline: Option<DateTime<Utc>>,
    investments: HashMap<SocketId, bool>,
    submitted: HashSet<SocketId>,
    answers: Vec<LiveAnswer>,
    correct_count: u32,
}

impl Default for Round {
    fn default() -> Self {
        Self::new()
    }
}

impl Round {
    pub fn new() -> Self {
        Self {
            generation: 0,
            question: None,
            phase: RoundPhase::Idle,
            deadline: None,
            investments: HashMap::new(),
            submitted: HashSet::new(),
            answers: Vec::new(),
            correct_count: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    /// Graded answers of this round in arrival order.
    pub fn answers(&self) -> &[LiveAnswer] {
        &self.answers
    }

    /// Make `question` active and open the invest decision. Valid from any
    /// phase; everything per-round is reset. Returns the new generation.
    pub fn select(&mut self, question: Question) -> u64 {
        self.generation += 1;
        self.question = Some(question);
        self.phase = RoundPhase::InvestDecision;
        self.deadline = None;
        self.investments.clear();
        self.submitted.clear();
        self.answers.clear();
        self.correct_count = 0;
        self.generation
    }

    /// Record a team's invest/pass choice. The last choice before the timer
    /// starts wins.
    pub fn set_investment(&mut self, socket_id: &str, invested: bool) -> Result<(), RoundError> {
        self.require(RoundPhase::InvestDecision, "investing")?;
        self.investments.insert(socket_id.to_string(), invested);
        Ok(())
    }

    /// Drop a departed team's investment choice so the tally only counts
    /// connected teams.
    pub fn forget(&mut self, socket_id: &str) {
        self.investments.remove(socket_id);
    }

    pub fn is_invested(&self, socket_id: &str) -> bool {
        self.investments.get(socket_id).copied().unwrap_or(false)
    }

    /// Lock investments and open answering until `deadline`.
    pub fn start(&mut self, deadline: DateTime<Utc>) -> Result<u64, RoundError> {
        self.require(RoundPhase::InvestDecision, "starting the timer")?;
        self.phase = RoundPhase::Answering;
        self.deadline = Some(deadline);
        self.correct_count = 0;
        Ok(self.generation)
    }

    /// Claim the team's single submission slot for this round. Rank is
    /// handed out only to correct answers, in arrival order.
    pub fn claim_submission(
        &mut self,
        socket_id: &str,
        is_correct: bool,
    ) -> Result<SubmissionSlot, RoundError> {
        self.require(RoundPhase::Answering, "answering")?;
        if !self.submitted.insert(socket_id.to_string()) {
            return Err(RoundError::AlreadySubmitted);
        }

        let rank = if is_correct {
            self.correct_count += 1;
            Some(self.correct_count)
        } else {
            None
        };

        Ok(SubmissionSlot {
            invested: self.is_invested(socket_id),
            rank,
        })
    }

    pub fn push_answer(&mut self, answer: LiveAnswer) {
        self.answers.push(answer);
    }

    /// Host stop.
    pub fn close(&mut self) -> Result<(), RoundError> {
        self.require(RoundPhase::Answering, "stopping the timer")?;
        self.phase = RoundPhase::Closed;
        Ok(())
    }

    /// Deadline expiry scheduled for round `generation`.
    pub fn expire(&mut self, generation: u64) -> Result<(), RoundError> {
        if generation != self.generation {
            return Err(RoundError::StaleTimer {
                fired: generation,
                current: self.generation,
            });
        }
        self.require(RoundPhase::Answering, "expiring the timer")?;
        self.phase = RoundPhase::Closed;
        Ok(())
    }

    pub fn tally(&self, total_teams: usize) -> InvestmentTally {
        InvestmentTally {
            invested_count: self.investments.values().filter(|v| **v).count(),
            decided_count: self.investments.len(),
            total_teams,
        }
    }

    /// The message a late joiner needs to catch up with the current phase.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Option<ServerMsg> {
        let question = self.question.as_ref()?;
        match self.phase {
            RoundPhase::Idle => None,
            RoundPhase::InvestDecision => Some(ServerMsg::InvestPhase {
                question_id: question.id,
                question: question.jumbled.clone(),
            }),
            RoundPhase::Answering => {
                let deadline = self.deadline?;
                let remaining_ms = (deadline - now).num_milliseconds().max(0) as u64;
                Some(ServerMsg::TimerStarted {
                    question_id: question.id,
                    question: question.jumbled.clone(),
                    deadline: deadline.timestamp_millis(),
                    server_now: now.timestamp_millis(),
                    duration_secs: remaining_ms.div_ceil(1000),
                })
            }
            RoundPhase::Closed => Some(ServerMsg::RoundClosed),
        }
    }

    fn require(&self, phase: RoundPhase, action: &'static str) -> Result<(), RoundError> {
        if self.phase != phase {
            return Err(RoundError::WrongPhase {
                action,
                phase: self.phase,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn question(id: u32) -> Question {
        Question {
            id,
            jumbled: "IDDOE".to_string(),
            answer: "DIODE".to_string(),
        }
    }

    #[test]
    fn test_new_round_is_idle() {
        let round = Round::new();
        assert_eq!(round.phase(), RoundPhase::Idle);
        assert!(round.question().is_none());
        assert!(round.snapshot(Utc::now()).is_none());
    }

    #[test]
    fn test_select_resets_round_state() {
        let mut round = Round::new();
        let first = round.select(question(1));
        round.set_investment("a", true).unwrap();
        round.start(Utc::now() + Duration::seconds(60)).unwrap();
        round.claim_submission("a", true).unwrap();

        let second = round.select(question(2));
        assert!(second > first);
        assert_eq!(round.phase(), RoundPhase::InvestDecision);
        assert!(round.deadline.is_none());
        assert_eq!(round.tally(3), InvestmentTally { invested_count: 0, decided_count: 0, total_teams: 3 });

        round.start(Utc::now() + Duration::seconds(60)).unwrap();
        let slot = round.claim_submission("a", true).unwrap();
        assert_eq!(slot.rank, Some(1));
        assert!(!slot.invested);
    }

    #[test]
    fn test_investment_last_choice_wins() {
        let mut round = Round::new();
        round.select(question(1));
        round.set_investment("a", true).unwrap();
        round.set_investment("a", false).unwrap();
        round.set_investment("b", true).unwrap();

        assert_eq!(
            round.tally(3),
            InvestmentTally {
                invested_count: 1,
                decided_count: 2,
                total_teams: 3
            }
        );
    }

    #[test]
    fn test_forget_removes_investment_from_tally() {
        let mut round = Round::new();
        round.select(question(1));
        round.set_investment("a", true).unwrap();
        round.set_investment("b", false).unwrap();

        round.forget("a");
        round.forget("ghost");
        assert!(!round.is_invested("a"));
        assert_eq!(
            round.tally(1),
            InvestmentTally {
                invested_count: 0,
                decided_count: 1,
                total_teams: 1
            }
        );
    }

    #[test]
    fn test_investment_outside_decision_phase_rejected() {
        let mut round = Round::new();
        assert!(matches!(
            round.set_investment("a", true),
            Err(RoundError::WrongPhase { phase: RoundPhase::Idle, .. })
        ));

        round.select(question(1));
        round.start(Utc::now()).unwrap();
        assert!(round.set_investment("a", true).is_err());
        assert!(!round.is_invested("a"));
    }

    #[test]
    fn test_start_requires_selected_question() {
        let mut round = Round::new();
        assert!(round.start(Utc::now()).is_err());

        round.select(question(1));
        assert!(round.start(Utc::now()).is_ok());
        // Cannot restart a running clock
        assert!(round.start(Utc::now()).is_err());
    }

    #[test]
    fn test_ranks_only_count_correct_answers() {
        let mut round = Round::new();
        round.select(question(1));
        round.set_investment("b", true).unwrap();
        round.start(Utc::now()).unwrap();

        assert_eq!(round.claim_submission("a", false).unwrap().rank, None);
        let slot = round.claim_submission("b", true).unwrap();
        assert_eq!(slot, SubmissionSlot { invested: true, rank: Some(1) });
        assert_eq!(round.claim_submission("c", true).unwrap().rank, Some(2));
    }

    #[test]
    fn test_duplicate_submission_rejected() {
        let mut round = Round::new();
        round.select(question(1));
        round.start(Utc::now()).unwrap();

        round.claim_submission("a", false).unwrap();
        assert_eq!(round.claim_submission("a", true), Err(RoundError::AlreadySubmitted));
    }

    #[test]
    fn test_closed_round_rejects_submissions() {
        let mut round = Round::new();
        round.select(question(1));
        round.start(Utc::now()).unwrap();
        round.close().unwrap();

        assert!(matches!(
            round.claim_submission("a", true),
            Err(RoundError::WrongPhase { phase: RoundPhase::Closed, .. })
        ));
        // Second stop is a no-op error
        assert!(round.close().is_err());
    }

    #[test]
    fn test_stale_expiry_is_ignored() {
        let mut round = Round::new();
        let old = round.select(question(1));
        round.start(Utc::now()).unwrap();

        let current = round.select(question(1));
        round.start(Utc::now()).unwrap();

        assert_eq!(
            round.expire(old),
            Err(RoundError::StaleTimer { fired: old, current })
        );
        assert_eq!(round.phase(), RoundPhase::Answering);

        round.expire(current).unwrap();
        assert_eq!(round.phase(), RoundPhase::Closed);
    }

    #[test]
    fn test_expiry_after_stop_is_noop() {
        let mut round = Round::new();
        let generation = round.select(question(1));
        round.start(Utc::now()).unwrap();
        round.close().unwrap();

        assert!(round.expire(generation).is_err());
        assert_eq!(round.phase(), RoundPhase::Closed);
    }

    #[test]
    fn test_snapshot_matches_phase() {
        let mut round = Round::new();
        round.select(question(3));
        assert_eq!(
            round.snapshot(Utc::now()),
            Some(ServerMsg::InvestPhase {
                question_id: 3,
                question: "IDDOE".to_string()
            })
        );

        let now = Utc::now();
        let deadline = now + Duration::seconds(60);
        round.start(deadline).unwrap();
        match round.snapshot(now + Duration::seconds(15)) {
            Some(ServerMsg::TimerStarted {
                question,
                deadline: sent,
                duration_secs,
                ..
            }) => {
                assert_eq!(question, "IDDOE");
                assert_eq!(sent, deadline.timestamp_millis());
                assert_eq!(duration_secs, 45);
            }
            other => panic!("Expected TimerStarted, got {:?}", other),
        }

        round.close().unwrap();
        assert_eq!(round.snapshot(Utc::now()), Some(ServerMsg::RoundClosed));
    }
}
