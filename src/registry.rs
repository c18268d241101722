use crate::types::{LeaderboardEntry, SocketId};

pub const MAX_TEAM_NAME_LEN: usize = 32;

/// A connected team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamSession {
    pub socket_id: SocketId,
    pub name: String,
    pub score: u64,
}

/// Live connections that have joined as a team, in join order.
///
/// Identity is the connection: a team that reconnects on a new socket is a
/// fresh session with a zero score.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    teams: Vec<TeamSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `socket_id` under `name`, or rename it if already registered.
    /// Returns true when a new session was created.
    pub fn join(&mut self, socket_id: &str, name: String) -> bool {
        if let Some(team) = self.teams.iter_mut().find(|t| t.socket_id == socket_id) {
            team.name = name;
            return false;
        }

        self.teams.push(TeamSession {
            socket_id: socket_id.to_string(),
            name,
            score: 0,
        });
        true
    }

    pub fn remove(&mut self, socket_id: &str) -> Option<TeamSession> {
        let index = self.teams.iter().position(|t| t.socket_id == socket_id)?;
        Some(self.teams.remove(index))
    }

    pub fn get(&self, socket_id: &str) -> Option<&TeamSession> {
        self.teams.iter().find(|t| t.socket_id == socket_id)
    }

    pub fn add_score(&mut self, socket_id: &str, points: u32) {
        if let Some(team) = self.teams.iter_mut().find(|t| t.socket_id == socket_id) {
            team.score += u64::from(points);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.teams.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Teams by score, highest first. Ties keep join order.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut board: Vec<LeaderboardEntry> = self
            .teams
            .iter()
            .map(|t| LeaderboardEntry {
                team: t.name.clone(),
                score: t.score,
            })
            .collect();
        board.sort_by(|a, b| b.score.cmp(&a.score));
        board
    }
}

/// Trim and validate a requested team name.
pub fn normalize_team_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_TEAM_NAME_LEN {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_rejoin_same_socket() {
        let mut registry = SessionRegistry::new();
        assert!(registry.join("s1", "Ohm".to_string()));
        registry.add_score("s1", 10);

        assert!(!registry.join("s1", "Volt".to_string()));
        assert_eq!(registry.names(), vec!["Volt".to_string()]);
        assert_eq!(registry.get("s1").unwrap().score, 10);
    }

    #[test]
    fn test_remove_drops_session_and_score() {
        let mut registry = SessionRegistry::new();
        registry.join("s1", "Ohm".to_string());
        registry.add_score("s1", 20);

        let removed = registry.remove("s1").unwrap();
        assert_eq!(removed.score, 20);
        assert!(registry.is_empty());
        assert!(registry.remove("s1").is_none());

        // Same name on a new connection starts from zero
        registry.join("s2", "Ohm".to_string());
        assert_eq!(registry.get("s2").unwrap().score, 0);
    }

    #[test]
    fn test_roster_has_no_stale_entries() {
        let mut registry = SessionRegistry::new();
        registry.join("a", "A".to_string());
        registry.join("b", "B".to_string());
        registry.join("c", "C".to_string());
        registry.join("b", "B2".to_string());
        registry.remove("a");

        assert_eq!(registry.names(), vec!["B2".to_string(), "C".to_string()]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_leaderboard_ties_keep_join_order() {
        let mut registry = SessionRegistry::new();
        registry.join("c", "C".to_string());
        registry.join("a", "A".to_string());
        registry.join("b", "B".to_string());
        // Remove and re-add C so it sits after A and B
        registry.remove("c");
        registry.join("c", "C".to_string());

        registry.add_score("a", 30);
        registry.add_score("b", 30);
        registry.add_score("c", 20);

        let board = registry.leaderboard();
        let names: Vec<_> = board.iter().map(|e| e.team.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_leaderboard_is_not_alphabetical() {
        let mut registry = SessionRegistry::new();
        registry.join("z", "Zeta".to_string());
        registry.join("a", "Alpha".to_string());
        registry.add_score("z", 10);
        registry.add_score("a", 10);

        let board = registry.leaderboard();
        assert_eq!(board[0].team, "Zeta");
        assert_eq!(board[1].team, "Alpha");
    }

    #[test]
    fn test_normalize_team_name() {
        assert_eq!(normalize_team_name("  Ohm  "), Some("Ohm".to_string()));
        assert_eq!(normalize_team_name("   "), None);
        assert_eq!(normalize_team_name(&"x".repeat(MAX_TEAM_NAME_LEN)).map(|n| n.len()), Some(32));
        assert_eq!(normalize_team_name(&"x".repeat(MAX_TEAM_NAME_LEN + 1)), None);
    }
}
