use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;

use crate::types::{GameConfig, Question};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("question set is empty")]
    NoQuestions,
    #[error("question id {0} appears more than once")]
    DuplicateQuestion(u32),
    #[error("question {0} has an empty answer")]
    EmptyAnswer(u32),
    #[error("timerSeconds must be between 1 and {max}, got {got}")]
    InvalidTimer { got: u64, max: u64 },
}

/// Longest answering window a round may have.
pub const MAX_TIMER_SECONDS: u64 = 3600;

/// Config directory, `CONFIG_PATH` or `./config`.
pub fn config_dir() -> PathBuf {
    let base = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    PathBuf::from(base)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let data = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, data).map_err(io_err(path))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Initialize the config directory with defaults if files are missing.
pub fn init(base: &Path) -> Result<(), ConfigError> {
    if !base.exists() {
        fs::create_dir_all(base).map_err(io_err(base))?;
    }

    let game_path = base.join("game.json");
    if !game_path.exists() {
        write_json(&game_path, &GameConfig::default())?;
        tracing::info!("Wrote default {}", game_path.display());
    }

    let questions_path = base.join("questions.json");
    if !questions_path.exists() {
        write_json(&questions_path, &default_questions())?;
        tracing::info!("Wrote default {}", questions_path.display());
    }

    Ok(())
}

/// Load game.json. A non-empty `HOST_PASSWORD` overrides the stored passphrase.
pub fn load_game_config(base: &Path) -> Result<GameConfig, ConfigError> {
    let config: GameConfig = read_json(&base.join("game.json"))?;
    validate_game_config(&config)?;
    Ok(apply_password_override(
        config,
        std::env::var("HOST_PASSWORD").ok(),
    ))
}

fn validate_game_config(config: &GameConfig) -> Result<(), ConfigError> {
    if !(1..=MAX_TIMER_SECONDS).contains(&config.timer_seconds) {
        return Err(ConfigError::InvalidTimer {
            got: config.timer_seconds,
            max: MAX_TIMER_SECONDS,
        });
    }
    Ok(())
}

fn apply_password_override(mut config: GameConfig, password: Option<String>) -> GameConfig {
    if let Some(password) = password
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
    {
        tracing::info!("Host passphrase taken from HOST_PASSWORD");
        config.host_password = password;
    }
    config
}

/// Load questions.json, scrambling any question without a jumbled form.
pub fn load_questions(base: &Path) -> Result<Vec<Question>, ConfigError> {
    let questions: Vec<Question> = read_json(&base.join("questions.json"))?;
    prepare_questions(questions, &mut rand::rng())
}

fn prepare_questions<R: Rng + ?Sized>(
    mut questions: Vec<Question>,
    rng: &mut R,
) -> Result<Vec<Question>, ConfigError> {
    if questions.is_empty() {
        return Err(ConfigError::NoQuestions);
    }

    let mut seen = HashSet::new();
    for question in &mut questions {
        if !seen.insert(question.id) {
            return Err(ConfigError::DuplicateQuestion(question.id));
        }

        question.answer = question.answer.trim().to_string();
        if question.answer.is_empty() {
            return Err(ConfigError::EmptyAnswer(question.id));
        }

        if question.jumbled.trim().is_empty() {
            question.jumbled = scramble(&question.answer, rng);
            tracing::debug!("Scrambled question {} as {}", question.id, question.jumbled);
        }
    }

    Ok(questions)
}

/// Shuffle the letters of `word` (uppercased). Retries until the result
/// differs from the word unless every letter is the same.
pub fn scramble<R: Rng + ?Sized>(word: &str, rng: &mut R) -> String {
    let upper = word.to_uppercase();
    let mut letters: Vec<char> = upper.chars().collect();

    let first = letters.first().copied();
    if letters.iter().all(|c| Some(*c) == first) {
        return upper;
    }

    loop {
        letters.shuffle(rng);
        let candidate: String = letters.iter().collect();
        if candidate != upper {
            return candidate;
        }
    }
}

fn default_questions() -> Vec<Question> {
    [
        (1, "SISROER", "RESISTOR"),
        (2, "CAPOTAICR", "CAPACITOR"),
        (3, "IDDOE", "DIODE"),
        (4, "TRNASISTOR", "TRANSISTOR"),
        (5, "INUDCOTR", "INDUCTOR"),
        (6, "AMLFIEIRP", "AMPLIFIER"),
        (7, "OSICLLATOR", "OSCILLATOR"),
        (8, "MICORPRCSSEOR", "MICROPROCESSOR"),
        (9, "FRQNUCEY", "FREQUENCY"),
        (10, "VOTLGXE", "VOLTAGE"),
        (11, "CURRNET", "CURRENT"),
        (12, "MODUATLIN", "MODULATION"),
        (13, "NANETAN", "ANTENNA"),
        (14, "SGNIAL", "SIGNAL"),
        (15, "CIRCIUT", "CIRCUIT"),
        (16, "DIGITLA", "DIGITAL"),
        (17, "GAOLAN", "ANALOG"),
        (18, "BAWDIDTH", "BANDWIDTH"),
        (19, "COMMUNICAITON", "COMMUNICATION"),
        (20, "ELCETRONICS", "ELECTRONICS"),
    ]
    .into_iter()
    .map(|(id, jumbled, answer)| Question {
        id,
        jumbled: jumbled.to_string(),
        answer: answer.to_string(),
    })
    .collect()
}
