//! The competition document: participants with their league-scoped records
//! and the embedded list of games.
use crate::game::{ApprovalStatus, Game};
use crate::ranking;
use crate::record::PerformanceRecord;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Participant {
    #[n(0)]
    pub user_id: String,
    #[n(1)]
    pub record: PerformanceRecord,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Competition {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub participants: Vec<Participant>, // join order, used to break exact ranking ties
    #[n(3)]
    pub games: Vec<Game>,
}

impl Competition {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            participants: vec![],
            games: vec![],
        }
    }

    pub fn is_participant(&self, user: &str) -> bool {
        self.participants.iter().any(|p| p.user_id == user)
    }

    /// Returns `false` if the user had already joined.
    pub fn add_participant(&mut self, user: &str) -> bool {
        if self.is_participant(user) {
            return false;
        }
        self.participants.push(Participant {
            user_id: user.to_string(),
            record: PerformanceRecord::new(),
        });
        true
    }

    pub fn record(&self, user: &str) -> Option<&PerformanceRecord> {
        self.participants
            .iter()
            .find(|p| p.user_id == user)
            .map(|p| &p.record)
    }

    pub fn record_mut(&mut self, user: &str) -> Option<&mut PerformanceRecord> {
        self.participants
            .iter_mut()
            .find(|p| p.user_id == user)
            .map(|p| &mut p.record)
    }

    pub fn game(&self, game_id: &str) -> Option<&Game> {
        self.games.iter().find(|g| g.game_id == game_id)
    }

    /// Replace the stored copy of `game`, or append it if it is new.
    pub fn upsert_game(&mut self, game: Game) {
        match self.games.iter_mut().find(|g| g.game_id == game.game_id) {
            Some(slot) => *slot = game,
            None => self.games.push(game),
        }
    }

    pub fn remove_game(&mut self, game_id: &str) -> Option<Game> {
        let idx = self.games.iter().position(|g| g.game_id == game_id)?;
        Some(self.games.remove(idx))
    }

    pub fn pending_games(&self) -> impl Iterator<Item = &Game> {
        self.games
            .iter()
            .filter(|g| g.approval_status == ApprovalStatus::Pending)
    }

    pub fn standings(&self) -> Vec<(&str, &PerformanceRecord)> {
        ranking::standings(
            self.participants
                .iter()
                .map(|p| (p.user_id.as_str(), &p.record)),
        )
    }

    pub fn rank(&self, user: &str) -> Option<usize> {
        ranking::rank(
            self.participants
                .iter()
                .map(|p| (p.user_id.as_str(), &p.record)),
            user,
        )
    }
}
