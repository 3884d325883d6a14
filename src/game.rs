//! Core game types and the submission builder
use super::error::GameError;
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(TimeStamp)
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
    /// Shift forwards (or backwards, for a negative delta) in time
    pub fn shifted(&self, delta: TimeDelta) -> Self {
        Self(self.0 + delta)
    }
    pub fn since(&self, earlier: &TimeStamp<Utc>) -> TimeDelta {
        self.0 - earlier.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

/// Calendar day a match was played on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameDate(pub NaiveDate);

impl GameDate {
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(GameDate)
    }
}

impl std::fmt::Display for GameDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of "now" for the auto-approval window. Swapped out in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> TimeStamp<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TimeStamp<Utc> {
        TimeStamp::new()
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Team {
    #[n(0)]
    pub player1: String,
    #[n(1)]
    pub player2: Option<String>, // doubles only
    #[n(2)]
    pub score: u32,
}

impl Team {
    pub fn singles(player: &str, score: u32) -> Self {
        Self {
            player1: player.to_string(),
            player2: None,
            score,
        }
    }
    pub fn doubles(player1: &str, player2: &str, score: u32) -> Self {
        Self {
            player1: player1.to_string(),
            player2: Some(player2.to_string()),
            score,
        }
    }
    pub fn players(&self) -> Vec<String> {
        let mut players = vec![self.player1.clone()];
        players.extend(self.player2.iter().cloned());
        players
    }
    pub fn contains(&self, user: &str) -> bool {
        self.player1 == user || self.player2.as_deref() == Some(user)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Team1,
    Team2,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TeamResult {
    #[n(0)]
    pub players: Vec<String>,
    #[n(1)]
    pub score: u32,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    #[n(0)]
    pub winner: TeamResult,
    #[n(1)]
    pub loser: TeamResult,
}

impl GameResult {
    /// Derive the result from two team scores. A tie is not a result.
    pub fn from_teams(team1: &Team, team2: &Team) -> Option<Self> {
        let (winner, loser) = match team1.score.cmp(&team2.score) {
            std::cmp::Ordering::Greater => (team1, team2),
            std::cmp::Ordering::Less => (team2, team1),
            std::cmp::Ordering::Equal => return None,
        };
        Some(Self {
            winner: TeamResult {
                players: winner.players(),
                score: winner.score,
            },
            loser: TeamResult {
                players: loser.players(),
                score: loser.score,
            },
        })
    }
    pub fn point_difference(&self) -> u32 {
        self.winner.score - self.loser.score
    }
    pub fn is_winner(&self, user: &str) -> bool {
        self.winner.players.iter().any(|p| p == user)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    AutoApproved,
    // never persisted, the game is removed from its competition
    #[n(3)]
    Declined,
}

impl ApprovalStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
    pub fn counts_in_ledger(&self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::AutoApproved)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Game {
    #[n(0)]
    pub game_id: String, // bech32 encoded uuid7
    #[n(1)]
    pub date: GameDate,
    #[n(2)]
    pub team1: Team,
    #[n(3)]
    pub team2: Team,
    #[n(4)]
    pub result: GameResult,
    #[n(5)]
    pub number_of_approvals: u32,
    #[n(6)]
    pub number_of_declines: u32,
    #[n(7)]
    pub approval_status: ApprovalStatus,
    #[n(8)]
    pub auto_approved: bool,
    #[n(9)]
    pub submitted_by: String,
    #[n(10)]
    pub submitted_at: TimeStamp<Utc>,
    #[n(11)]
    pub approved_by: Vec<String>, // distinct opposing-side approvers
}

impl Game {
    pub fn is_doubles(&self) -> bool {
        self.team1.player2.is_some()
    }
    /// One approval per opposing player: the submitter's side is implicit.
    pub fn approval_threshold(&self) -> u32 {
        if self.is_doubles() { 2 } else { 1 }
    }
    pub fn players(&self) -> Vec<String> {
        let mut players = self.team1.players();
        players.extend(self.team2.players());
        players
    }
    pub fn side_of(&self, user: &str) -> Option<Side> {
        if self.team1.contains(user) {
            Some(Side::Team1)
        } else if self.team2.contains(user) {
            Some(Side::Team2)
        } else {
            None
        }
    }
    pub fn team(&self, side: Side) -> &Team {
        match side {
            Side::Team1 => &self.team1,
            Side::Team2 => &self.team2,
        }
    }
    pub fn submitter_side(&self) -> Option<Side> {
        self.side_of(&self.submitted_by)
    }
    pub fn approval_deadline(&self, window: TimeDelta) -> TimeStamp<Utc> {
        self.submitted_at.shifted(window)
    }
}

// Used for constructing a submission before it is validated
#[derive(Debug, Default, Clone)]
pub struct GameDraft {
    date: Option<GameDate>,
    team1: Option<Team>,
    team2: Option<Team>,
    submitted_by: Option<String>,
}

impl GameDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_date(mut self, date: GameDate) -> Self {
        self.date = Some(date);
        self
    }
    pub fn set_team1(mut self, team: Team) -> Self {
        self.team1 = Some(team);
        self
    }
    pub fn set_team2(mut self, team: Team) -> Self {
        self.team2 = Some(team);
        self
    }
    pub fn set_submitted_by(mut self, user: &str) -> Self {
        self.submitted_by = Some(user.to_string());
        self
    }
    pub fn submitted_by(&self) -> Option<&str> {
        self.submitted_by.as_deref()
    }

    /// Checks fields and returns a `Pending` game with zeroed counters
    pub fn validate_and_finalise(
        self,
        game_id: String,
        submitted_at: TimeStamp<Utc>,
    ) -> Result<Game, GameError> {
        let invalid = |reason: &str| GameError::InvalidResult(reason.to_string());

        let date = self.date.ok_or_else(|| invalid("date is not set"))?;
        let team1 = self.team1.ok_or_else(|| invalid("team1 is not set"))?;
        let team2 = self.team2.ok_or_else(|| invalid("team2 is not set"))?;
        let submitted_by = self
            .submitted_by
            .ok_or_else(|| invalid("submitter is not set"))?;

        if team1.player2.is_some() != team2.player2.is_some() {
            return Err(invalid("doubles needs a second player on both teams"));
        }

        let mut players = team1.players();
        players.extend(team2.players());
        if players.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("player name is empty"));
        }
        for (idx, player) in players.iter().enumerate() {
            if players[idx + 1..].contains(player) {
                return Err(GameError::InvalidResult(format!(
                    "{player} is listed more than once"
                )));
            }
        }

        if !players.contains(&submitted_by) {
            return Err(GameError::NotParticipant {
                actor: submitted_by,
                target: game_id,
            });
        }

        let result = GameResult::from_teams(&team1, &team2)
            .ok_or_else(|| invalid("tied scores are not a result"))?;

        Ok(Game {
            game_id,
            date,
            team1,
            team2,
            result,
            number_of_approvals: 0,
            number_of_declines: 0,
            approval_status: ApprovalStatus::Pending,
            auto_approved: false,
            submitted_by,
            submitted_at,
            approved_by: vec![],
        })
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}
impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

// days since 0001-01-01 keeps the encoding a single small integer
impl<C> minicbor::Encode<C> for GameDate {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        use chrono::Datelike;
        e.i32(self.0.num_days_from_ce())?.ok()
    }
}
impl<'b, C> minicbor::Decode<'b, C> for GameDate {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let days = d.i32()?;

        NaiveDate::from_num_days_from_ce_opt(days)
            .map(GameDate)
            .ok_or(minicbor::decode::Error::message("day count out of range"))
    }
}
