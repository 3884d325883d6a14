//! Tunables for the approval lifecycle and the ledger
use chrono::TimeDelta;

/// Parameters of the performance ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRules {
    /// Smallest winning margin that counts as a demon win
    pub demon_win_margin: u32,
    /// XP a freshly registered player starts with
    pub starting_xp: u64,
    /// XP never drops below this after an adjustment
    pub xp_floor: u64,
    pub base_xp_gain: i64,
    /// Every this-many XP of upset gap adds one point of gain
    pub xp_gap_divisor: i64,
    pub min_xp_gain: i64,
    pub max_xp_gain: i64,
    /// Losers drop `gain / loss_divisor`
    pub loss_divisor: i64,
}

impl Default for LedgerRules {
    fn default() -> Self {
        Self {
            demon_win_margin: 10,
            starting_xp: 20,
            xp_floor: 20,
            base_xp_gain: 20,
            xp_gap_divisor: 25,
            min_xp_gain: 5,
            max_xp_gain: 50,
            loss_divisor: 2,
        }
    }
}

impl LedgerRules {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_demon_win_margin(mut self, margin: u32) -> Self {
        self.demon_win_margin = margin;
        self
    }
    pub fn set_xp_floor(mut self, floor: u64) -> Self {
        self.xp_floor = floor;
        self
    }
    pub fn set_starting_xp(mut self, xp: u64) -> Self {
        self.starting_xp = xp;
        self
    }
    pub fn set_gain_bounds(mut self, min: i64, max: i64) -> Self {
        self.min_xp_gain = min;
        self.max_xp_gain = max;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueConfig {
    /// Time after submission at which a pending game may be auto-approved
    pub auto_approve_after: TimeDelta,
    /// Optimistic commit attempts before giving up with a conflict
    pub max_commit_attempts: u32,
    pub ledger: LedgerRules,
}

impl Default for LeagueConfig {
    fn default() -> Self {
        Self {
            auto_approve_after: TimeDelta::hours(24),
            max_commit_attempts: 5,
            ledger: LedgerRules::default(),
        }
    }
}

impl LeagueConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_auto_approve_after(mut self, window: TimeDelta) -> Self {
        self.auto_approve_after = window;
        self
    }
    pub fn set_max_commit_attempts(mut self, attempts: u32) -> Self {
        // at least one attempt is always made
        self.max_commit_attempts = attempts.max(1);
        self
    }
    pub fn set_ledger_rules(mut self, rules: LedgerRules) -> Self {
        self.ledger = rules;
        self
    }
}
