use serde::{Deserialize, Serialize};

/// Connection id assigned by the socket layer.
pub type SocketId = String;

/// A single unscramble question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: u32,
    #[serde(default)]
    pub jumbled: String,
    pub answer: String,
}

/// What the host page shows for a question. Never carries the answer.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionCard {
    pub id: u32,
    pub jumbled: String,
}

impl From<&Question> for QuestionCard {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            jumbled: q.jumbled.clone(),
        }
    }
}

/// Game configuration loaded from game.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    pub host_password: String,
    #[serde(default = "default_timer_seconds")]
    pub timer_seconds: u64,
    #[serde(default = "default_base_points")]
    pub base_points: u32,
    #[serde(default = "default_max_bonus")]
    pub max_bonus: f64,
}

fn default_timer_seconds() -> u64 {
    60
}

fn default_base_points() -> u32 {
    10
}

fn default_max_bonus() -> f64 {
    1.0
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            host_password: "PASSWORD".to_string(),
            timer_seconds: default_timer_seconds(),
            base_points: default_base_points(),
            max_bonus: default_max_bonus(),
        }
    }
}

/// Phase of the active round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundPhase {
    Idle,
    InvestDecision,
    Answering,
    Closed,
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::InvestDecision => write!(f, "INVEST_DECISION"),
            Self::Answering => write!(f, "ANSWERING"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// A graded submission as the host sees it during the round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveAnswer {
    #[serde(skip)]
    pub socket_id: SocketId,
    pub team_name: String,
    pub answer: String,
    pub is_correct: bool,
    pub invested: bool,
    pub score: u32,
    pub multiplier: Option<f64>,
    pub rank: Option<u32>,
}

/// Immutable audit record of one graded submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    #[serde(skip)]
    pub socket_id: SocketId,
    pub team: String,
    pub question: String,
    pub correct_answer: String,
    pub answer: String,
    pub is_correct: bool,
    pub invested: bool,
    pub score: u32,
    pub multiplier: Option<f64>,
    pub rank: Option<u32>,
    pub time: String,
}

/// One row of the final leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub team: String,
    pub score: u64,
}

/// Investment counts for the current round.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvestmentTally {
    pub invested_count: usize,
    pub decided_count: usize,
    pub total_teams: usize,
}

/// Messages sent from server to clients via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMsg {
    Joined {
        team_name: String,
    },
    TeamRoster {
        teams: Vec<String>,
    },
    InvestPhase {
        question_id: u32,
        question: String,
    },
    TimerStarted {
        question_id: u32,
        question: String,
        /// Epoch milliseconds.
        deadline: i64,
        server_now: i64,
        duration_secs: u64,
    },
    RoundClosed,
    AnswerResult {
        is_correct: bool,
        score: u32,
        invested: bool,
        multiplier: Option<f64>,
        rank: Option<u32>,
    },
    GameOver {
        leaderboard: Vec<LeaderboardEntry>,
        history: Vec<HistoryEntry>,
    },
    Error {
        message: String,
    },

    // Host-specific
    HostLoginResult {
        success: bool,
    },
    LiveAnswer {
        #[serde(flatten)]
        answer: LiveAnswer,
    },
    InvestmentTally {
        #[serde(flatten)]
        tally: InvestmentTally,
    },
    TabSwitchWarning {
        team_name: String,
    },
    HostRestoreState {
        answers: Vec<LiveAnswer>,
        phase: RoundPhase,
        question_id: Option<u32>,
        tally: InvestmentTally,
    },
}

/// Messages sent from clients to server via WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMsg {
    // Participant actions
    Join { team_name: String },
    SubmitInvestment { invested: bool },
    SubmitAnswer { answer: String },
    TabSwitchAlert,

    // Host actions
    HostLogin { password: String },
    SelectQuestion { question_id: u32 },
    StartTimer,
    StopTimer,
    FinishGame,
}
