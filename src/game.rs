use std::time::Duration;

use chrono::{TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

use crate::auth;
use crate::ledger::HistoryLedger;
use crate::registry::{self, MAX_TEAM_NAME_LEN, SessionRegistry};
use crate::round::{Round, RoundError};
use crate::scoring::{self, ScoringRules};
use crate::types::*;

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1024;

/// Commands the WebSocket handler sends to the game task.
#[derive(Debug, Clone, PartialEq)]
pub enum GameCommand {
    Join {
        socket_id: SocketId,
        team_name: String,
    },
    Disconnect {
        socket_id: SocketId,
    },
    HostLogin {
        socket_id: SocketId,
        password: String,
    },
    SelectQuestion {
        socket_id: SocketId,
        question_id: u32,
    },
    SubmitInvestment {
        socket_id: SocketId,
        invested: bool,
    },
    StartTimer {
        socket_id: SocketId,
    },
    SubmitAnswer {
        socket_id: SocketId,
        answer: String,
    },
    StopTimer {
        socket_id: SocketId,
    },
    FinishGame {
        socket_id: SocketId,
    },
    TabSwitch {
        socket_id: SocketId,
    },
    /// Sent by the round timer task for the round it was scheduled in.
    TimerExpired {
        generation: u64,
    },
}

/// Events broadcast from the game to WebSocket connections.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// Send a message to a specific socket.
    SendTo { socket_id: SocketId, msg: ServerMsg },
    /// Broadcast a message to every socket.
    Broadcast { msg: ServerMsg },
}

impl GameEvent {
    pub fn is_for(&self, socket_id: &str) -> bool {
        match self {
            GameEvent::SendTo { socket_id: target, .. } => target == socket_id,
            GameEvent::Broadcast { .. } => true,
        }
    }

    pub fn msg(&self) -> &ServerMsg {
        match self {
            GameEvent::SendTo { msg, .. } | GameEvent::Broadcast { msg } => msg,
        }
    }
}

/// Why a command did not change anything.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("socket {0} is not a logged-in host")]
    NotHost(SocketId),
    #[error("socket {0} has not joined as a team")]
    NotRegistered(SocketId),
    #[error("unknown question id {0}")]
    UnknownQuestion(u32),
    #[error("invalid team name {0:?}")]
    InvalidTeamName(String),
    #[error("the game is over")]
    GameOver,
    #[error("timer of {0}s does not fit a deadline")]
    TimerOutOfRange(u64),
    #[error(transparent)]
    Round(#[from] RoundError),
}

#[derive(Clone)]
pub struct GameHandle {
    pub cmd_tx: mpsc::Sender<GameCommand>,
    pub event_tx: broadcast::Sender<GameEvent>,
}

impl GameHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.event_tx.subscribe()
    }

    pub async fn send(&self, cmd: GameCommand) {
        if self.cmd_tx.send(cmd).await.is_err() {
            tracing::error!("Game task is gone, dropping command");
        }
    }
}

/// Owns every piece of mutable game state. All mutation goes through
/// [`Coordinator::handle`], one command at a time.
pub struct Coordinator {
    config: GameConfig,
    rules: ScoringRules,
    questions: Vec<Question>,

    registry: SessionRegistry,
    hosts: Vec<SocketId>,
    round: Round,
    ledger: HistoryLedger,
    finished: bool,

    timer_cancel: Option<watch::Sender<bool>>,

    event_tx: broadcast::Sender<GameEvent>,
    cmd_tx: mpsc::WeakSender<GameCommand>,
}

impl Coordinator {
    pub fn new(
        config: GameConfig,
        questions: Vec<Question>,
        event_tx: broadcast::Sender<GameEvent>,
        cmd_tx: mpsc::WeakSender<GameCommand>,
    ) -> Self {
        Self {
            rules: ScoringRules::from(&config),
            config,
            questions,
            registry: SessionRegistry::new(),
            hosts: Vec::new(),
            round: Round::new(),
            ledger: HistoryLedger::new(),
            finished: false,
            timer_cancel: None,
            event_tx,
            cmd_tx,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_host(&self, socket_id: &str) -> bool {
        self.hosts.iter().any(|h| h == socket_id)
    }

    pub fn handle(&mut self, cmd: GameCommand) {
        let result = match cmd {
            GameCommand::Join { socket_id, team_name } => self.handle_join(socket_id, team_name),
            GameCommand::Disconnect { socket_id } => {
                self.handle_disconnect(&socket_id);
                Ok(())
            }
            GameCommand::HostLogin { socket_id, password } => {
                self.handle_host_login(socket_id, &password);
                Ok(())
            }
            GameCommand::SelectQuestion { socket_id, question_id } => {
                self.handle_select_question(&socket_id, question_id)
            }
            GameCommand::SubmitInvestment { socket_id, invested } => {
                self.handle_submit_investment(&socket_id, invested)
            }
            GameCommand::StartTimer { socket_id } => self.handle_start_timer(&socket_id),
            GameCommand::SubmitAnswer { socket_id, answer } => {
                self.handle_submit_answer(&socket_id, answer)
            }
            GameCommand::StopTimer { socket_id } => self.handle_stop_timer(&socket_id),
            GameCommand::FinishGame { socket_id } => self.handle_finish_game(&socket_id),
            GameCommand::TabSwitch { socket_id } => self.handle_tab_switch(&socket_id),
            GameCommand::TimerExpired { generation } => self.handle_timer_expired(generation),
        };

        if let Err(e) = result {
            match e {
                CommandError::UnknownQuestion(_) | CommandError::NotHost(_) => {
                    tracing::warn!("Rejected command: {}", e)
                }
                CommandError::TimerOutOfRange(_) => tracing::error!("Cannot start round: {}", e),
                _ => tracing::debug!("Ignored command: {}", e),
            }
        }
    }

    // ─── Outbound ─────────────────────────────────────────────────

    fn broadcast(&self, msg: ServerMsg) {
        let _ = self.event_tx.send(GameEvent::Broadcast { msg });
    }

    fn send_to(&self, socket_id: &str, msg: ServerMsg) {
        let _ = self.event_tx.send(GameEvent::SendTo {
            socket_id: socket_id.to_string(),
            msg,
        });
    }

    fn send_to_hosts(&self, msg: ServerMsg) {
        for host in &self.hosts {
            self.send_to(host, msg.clone());
        }
    }

    fn broadcast_roster(&self) {
        self.broadcast(ServerMsg::TeamRoster {
            teams: self.registry.names(),
        });
    }

    fn send_tally_to_hosts(&self) {
        self.send_to_hosts(ServerMsg::InvestmentTally {
            tally: self.round.tally(self.registry.len()),
        });
    }

    /// Hosts see the team count change while teams are still deciding.
    fn refresh_tally_on_roster_change(&self) {
        if self.round.phase() == RoundPhase::InvestDecision {
            self.send_tally_to_hosts();
        }
    }

    fn game_over_msg(&self) -> ServerMsg {
        ServerMsg::GameOver {
            leaderboard: self.registry.leaderboard(),
            history: self.ledger.all().to_vec(),
        }
    }

    // ─── Guards ───────────────────────────────────────────────────

    fn require_host(&self, socket_id: &str) -> Result<(), CommandError> {
        if self.is_host(socket_id) {
            return Ok(());
        }
        self.send_to(socket_id, ServerMsg::Error {
            message: "Host login required".to_string(),
        });
        Err(CommandError::NotHost(socket_id.to_string()))
    }

    fn require_running(&self) -> Result<(), CommandError> {
        if self.finished {
            return Err(CommandError::GameOver);
        }
        Ok(())
    }

    // ─── Timer ────────────────────────────────────────────────────

    fn schedule_expiry(&mut self, generation: u64, duration: Duration) {
        self.cancel_timer();

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        self.timer_cancel = Some(cancel_tx);

        let cmd_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    if let Some(tx) = cmd_tx.upgrade() {
                        let _ = tx.send(GameCommand::TimerExpired { generation }).await;
                    }
                }
                _ = cancel_rx.changed() => {}
            }
        });
    }

    fn cancel_timer(&mut self) {
        if let Some(cancel) = self.timer_cancel.take() {
            let _ = cancel.send(true);
        }
    }

    // ─── Participant commands ─────────────────────────────────────

    fn handle_join(&mut self, socket_id: SocketId, team_name: String) -> Result<(), CommandError> {
        let Some(name) = registry::normalize_team_name(&team_name) else {
            self.send_to(&socket_id, ServerMsg::Error {
                message: format!("Team name must be 1 to {} characters", MAX_TEAM_NAME_LEN),
            });
            return Err(CommandError::InvalidTeamName(team_name));
        };

        if self.registry.join(&socket_id, name.clone()) {
            tracing::info!("Team {} joined ({})", name, socket_id);
        } else {
            tracing::info!("Socket {} renamed team to {}", socket_id, name);
        }

        self.send_to(&socket_id, ServerMsg::Joined { team_name: name });
        self.broadcast_roster();
        self.refresh_tally_on_roster_change();

        // Bring a late joiner up to the current phase
        if self.finished {
            self.send_to(&socket_id, self.game_over_msg());
        } else if let Some(snapshot) = self.round.snapshot(Utc::now()) {
            self.send_to(&socket_id, snapshot);
        }

        Ok(())
    }

    fn handle_disconnect(&mut self, socket_id: &str) {
        if self.is_host(socket_id) {
            self.hosts.retain(|h| h != socket_id);
            tracing::info!("Host {} disconnected", socket_id);
        }

        if let Some(team) = self.registry.remove(socket_id) {
            tracing::info!("Team {} left with {} points", team.name, team.score);
            self.round.forget(socket_id);
            self.broadcast_roster();
            self.refresh_tally_on_roster_change();
        }
    }

    fn handle_submit_investment(&mut self, socket_id: &str, invested: bool) -> Result<(), CommandError> {
        self.require_running()?;
        let team_name = self
            .registry
            .get(socket_id)
            .map(|t| t.name.clone())
            .ok_or_else(|| CommandError::NotRegistered(socket_id.to_string()))?;

        self.round.set_investment(socket_id, invested)?;
        tracing::info!("{} chose to {}", team_name, if invested { "INVEST" } else { "PASS" });

        self.send_tally_to_hosts();
        Ok(())
    }

    fn handle_submit_answer(&mut self, socket_id: &str, answer: String) -> Result<(), CommandError> {
        self.require_running()?;

        let phase = self.round.phase();
        if phase != RoundPhase::Answering {
            return Err(RoundError::WrongPhase {
                action: "answering",
                phase,
            }
            .into());
        }

        let Some(team_name) = self.registry.get(socket_id).map(|t| t.name.clone()) else {
            self.send_to(socket_id, ServerMsg::Error {
                message: "Please rejoin with a team name".to_string(),
            });
            return Err(CommandError::NotRegistered(socket_id.to_string()));
        };

        let Some(question) = self.round.question().cloned() else {
            return Err(RoundError::WrongPhase {
                action: "answering",
                phase,
            }
            .into());
        };

        let is_correct = scoring::is_correct(&answer, &question.answer);
        let slot = self.round.claim_submission(socket_id, is_correct)?;
        let award = self.rules.grade(
            is_correct,
            slot.invested,
            slot.rank.unwrap_or_default(),
            self.registry.len(),
        );

        self.registry.add_score(socket_id, award.points);

        let live = LiveAnswer {
            socket_id: socket_id.to_string(),
            team_name: team_name.clone(),
            answer: answer.clone(),
            is_correct,
            invested: slot.invested,
            score: award.points,
            multiplier: award.multiplier,
            rank: slot.rank,
        };
        self.round.push_answer(live.clone());

        self.ledger.record(HistoryEntry {
            socket_id: socket_id.to_string(),
            team: team_name.clone(),
            question: question.jumbled.clone(),
            correct_answer: question.answer.clone(),
            answer,
            is_correct,
            invested: slot.invested,
            score: award.points,
            multiplier: award.multiplier,
            rank: slot.rank,
            time: Utc::now().to_rfc3339(),
        });
        debug_assert_eq!(
            self.registry.get(socket_id).map(|t| t.score),
            Some(self.ledger.total_for(socket_id)),
            "team score drifted from its ledger entries"
        );

        tracing::info!(
            "{} answered question {}: correct={} invested={} rank={:?} points={}",
            team_name,
            question.id,
            is_correct,
            slot.invested,
            slot.rank,
            award.points
        );

        self.send_to(socket_id, ServerMsg::AnswerResult {
            is_correct,
            score: award.points,
            invested: slot.invested,
            multiplier: award.multiplier,
            rank: slot.rank,
        });
        self.send_to_hosts(ServerMsg::LiveAnswer { answer: live });

        Ok(())
    }

    fn handle_tab_switch(&mut self, socket_id: &str) -> Result<(), CommandError> {
        let team_name = self
            .registry
            .get(socket_id)
            .map(|t| t.name.clone())
            .ok_or_else(|| CommandError::NotRegistered(socket_id.to_string()))?;

        tracing::info!("Tab switch detected from {} ({})", team_name, socket_id);
        self.send_to_hosts(ServerMsg::TabSwitchWarning { team_name });
        Ok(())
    }

    // ─── Host commands ────────────────────────────────────────────

    fn handle_host_login(&mut self, socket_id: SocketId, password: &str) {
        if !auth::passphrase_matches(&self.config.host_password, password) {
            tracing::warn!("Failed host login from {}", socket_id);
            self.send_to(&socket_id, ServerMsg::HostLoginResult { success: false });
            return;
        }

        if !self.is_host(&socket_id) {
            self.hosts.push(socket_id.clone());
        }
        tracing::info!("Host logged in: {}", socket_id);

        self.send_to(&socket_id, ServerMsg::HostLoginResult { success: true });
        self.send_to(&socket_id, ServerMsg::HostRestoreState {
            answers: self.round.answers().to_vec(),
            phase: self.round.phase(),
            question_id: self.round.question().map(|q| q.id),
            tally: self.round.tally(self.registry.len()),
        });
        self.send_to(&socket_id, ServerMsg::TeamRoster {
            teams: self.registry.names(),
        });
        if self.finished {
            self.send_to(&socket_id, self.game_over_msg());
        }
    }

    fn handle_select_question(&mut self, socket_id: &str, question_id: u32) -> Result<(), CommandError> {
        self.require_host(socket_id)?;
        self.require_running()?;

        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
            .ok_or(CommandError::UnknownQuestion(question_id))?;

        self.cancel_timer();
        let generation = self.round.select(question.clone());
        tracing::info!(
            "Question {} selected ({}), round {}",
            question.id,
            question.jumbled,
            generation
        );

        self.broadcast(ServerMsg::InvestPhase {
            question_id: question.id,
            question: question.jumbled,
        });
        self.send_tally_to_hosts();
        Ok(())
    }

    fn handle_start_timer(&mut self, socket_id: &str) -> Result<(), CommandError> {
        self.require_host(socket_id)?;
        self.require_running()?;

        let seconds = self.config.timer_seconds;
        let now = Utc::now();
        let Some(deadline) = i64::try_from(seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delta| now.checked_add_signed(delta))
        else {
            self.send_to_hosts(ServerMsg::Error {
                message: format!("Timer of {}s is out of range", seconds),
            });
            return Err(CommandError::TimerOutOfRange(seconds));
        };
        let generation = self.round.start(deadline)?;

        let Some(question) = self.round.question() else {
            return Ok(());
        };
        tracing::info!("Timer started for question {} (round {})", question.id, generation);

        self.broadcast(ServerMsg::TimerStarted {
            question_id: question.id,
            question: question.jumbled.clone(),
            deadline: deadline.timestamp_millis(),
            server_now: now.timestamp_millis(),
            duration_secs: seconds,
        });

        self.schedule_expiry(generation, Duration::from_secs(seconds));
        Ok(())
    }

    fn handle_stop_timer(&mut self, socket_id: &str) -> Result<(), CommandError> {
        self.require_host(socket_id)?;
        self.require_running()?;

        self.round.close()?;
        self.cancel_timer();
        tracing::info!("Timer stopped by host for round {}", self.round.generation());

        self.broadcast(ServerMsg::RoundClosed);
        Ok(())
    }

    fn handle_timer_expired(&mut self, generation: u64) -> Result<(), CommandError> {
        self.require_running()?;
        self.round.expire(generation)?;
        self.timer_cancel = None;
        tracing::info!("Timer ended for round {}", generation);

        self.broadcast(ServerMsg::RoundClosed);
        Ok(())
    }

    fn handle_finish_game(&mut self, socket_id: &str) -> Result<(), CommandError> {
        self.require_host(socket_id)?;

        self.cancel_timer();
        if !self.finished {
            self.finished = true;
            tracing::info!(
                "Game finished: {} teams, {} graded answers",
                self.registry.len(),
                self.ledger.len()
            );
        }

        self.broadcast(self.game_over_msg());
        Ok(())
    }
}

/// Create the coordinator and spawn its task. Returns the game handle.
pub fn spawn_game(config: GameConfig, questions: Vec<Question>) -> GameHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let coordinator = Coordinator::new(config, questions, event_tx.clone(), cmd_tx.downgrade());
    tokio::spawn(game_task(coordinator, cmd_rx));

    GameHandle { cmd_tx, event_tx }
}

async fn game_task(mut coordinator: Coordinator, mut cmd_rx: mpsc::Receiver<GameCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        coordinator.handle(cmd);
    }

    coordinator.cancel_timer();
    tracing::info!("Game task ended");
}
