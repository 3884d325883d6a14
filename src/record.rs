//! Player performance records
//!
//! Every player owns one [`PerformanceRecord`] per competition they play in and
//! one global [`PlayerProfile`] that mirrors the same statistics and also tracks
//! experience points. Both are mutated only by the [`ledger`](crate::ledger).
use super::game::GameDate;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    #[n(0)]
    Win,
    #[n(1)]
    Loss,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Win => write!(f, "W"),
            Outcome::Loss => write!(f, "L"),
        }
    }
}

/// Trailing run of identical outcomes. `count` is negative for a losing run.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CurrentStreak {
    #[n(0)]
    pub kind: Option<Outcome>,
    #[n(1)]
    pub count: i32,
}

impl CurrentStreak {
    pub fn len(&self) -> u32 {
        self.count.unsigned_abs()
    }
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Default)]
pub struct PerformanceRecord {
    #[n(0)]
    pub number_of_wins: u32,
    #[n(1)]
    pub number_of_losses: u32,
    #[n(2)]
    pub number_of_games_played: u32,
    #[n(3)]
    pub win_percentage: f64,
    #[n(4)]
    pub result_log: Vec<Outcome>,
    #[n(5)]
    pub current_streak: CurrentStreak,
    #[n(6)]
    pub total_points: u64,
    #[n(7)]
    pub total_point_difference: i64,
    #[n(8)]
    pub average_point_difference: i64,
    #[n(9)]
    pub point_difference_log: Vec<i64>,
    #[n(10)]
    pub demon_win: u32,
    #[n(11)]
    pub win_streak3: u32,
    #[n(12)]
    pub win_streak5: u32,
    #[n(13)]
    pub win_streak7: u32,
    #[n(14)]
    pub highest_win_streak: u32,
    #[n(15)]
    pub highest_loss_streak: u32,
    #[n(16)]
    pub last_active: Option<GameDate>,
    /// Id of the game behind each entry of `result_log` and `point_difference_log`
    #[n(17)]
    pub game_log: Vec<String>,
}

impl PerformanceRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute every field that is a pure function of the counters and logs
    pub fn refresh_derived(&mut self) {
        self.win_percentage = win_percentage(self.number_of_wins, self.number_of_games_played);
        self.current_streak = trailing_streak(&self.result_log);
        self.average_point_difference = average_point_difference(&self.point_difference_log);
    }
}

/// XP change one game made to a profile, after the floor was applied.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct XpEntry {
    #[n(0)]
    pub game_id: String,
    #[n(1)]
    pub delta: i64,
}

/// Global record for a user, mirrored across all their competitions.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct PlayerProfile {
    #[n(0)]
    pub user_id: String,
    #[n(1)]
    pub record: PerformanceRecord,
    #[n(2)]
    pub xp: u64,
    #[n(3)]
    pub prev_game_xp: i64, // effective delta of the last applied game
    #[n(4)]
    pub xp_log: Vec<XpEntry>,
}

impl PlayerProfile {
    pub fn new(user_id: &str, starting_xp: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            record: PerformanceRecord::new(),
            xp: starting_xp,
            prev_game_xp: 0,
            xp_log: vec![],
        }
    }
}

pub fn win_percentage(wins: u32, games_played: u32) -> f64 {
    if games_played == 0 {
        return 0.0;
    }
    wins as f64 / games_played as f64 * 100.0
}

/// Mean of the log rounded to the nearest integer, halves away from zero.
pub fn average_point_difference(log: &[i64]) -> i64 {
    if log.is_empty() {
        return 0;
    }
    let sum: i64 = log.iter().sum();
    (sum as f64 / log.len() as f64).round() as i64
}

/// Scan backwards from the end of the log until the run breaks.
pub fn trailing_streak(log: &[Outcome]) -> CurrentStreak {
    let Some(last) = log.last().copied() else {
        return CurrentStreak::default();
    };
    let len = log.iter().rev().take_while(|o| **o == last).count() as i32;
    CurrentStreak {
        kind: Some(last),
        count: match last {
            Outcome::Win => len,
            Outcome::Loss => -len,
        },
    }
}

/// Longest run of `outcome` anywhere in the log.
pub fn longest_run(log: &[Outcome], outcome: Outcome) -> u32 {
    let mut best = 0;
    let mut run = 0;
    for entry in log {
        if *entry == outcome {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}
