//! Performance ledger.
//!
//! [`apply`] folds one approved game into the league-scoped and global records
//! of every listed player; [`revert`] removes exactly the entries that game
//! left, even when later games were applied since. `last_active` is cleared
//! and the `win_streak3/5/7` milestones are kept.
//!
//! Both operate on a [`Books`] working set and either update it completely or
//! leave it untouched. Neither guards against being called twice for the same
//! game: that is the approval state machine's job.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::LedgerRules;
use crate::error::LedgerError;
use crate::game::{Game, GameDate};
use crate::record::{
    Outcome, PerformanceRecord, PlayerProfile, XpEntry, longest_run, trailing_streak,
};

/// Records touched by one game, keyed by player.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Books {
    pub league: BTreeMap<String, PerformanceRecord>,
    pub profiles: BTreeMap<String, PlayerProfile>,
}

impl Books {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure every player of `game` has both records.
    fn check_complete(&self, game: &Game) -> Result<(), LedgerError> {
        for player in game.players() {
            if !self.league.contains_key(&player) || !self.profiles.contains_key(&player) {
                return Err(LedgerError::MissingRecord(player));
            }
        }
        Ok(())
    }
}

/// What one game means for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contribution {
    pub outcome: Outcome,
    /// The player's own team score
    pub own_score: u32,
    /// Point difference from this player's perspective
    pub signed_margin: i64,
    pub demon_win: bool,
    pub date: GameDate,
}

/// Per-player contributions of `game`, winners first.
pub fn contributions(game: &Game, rules: &LedgerRules) -> Vec<(String, Contribution)> {
    let margin = game.result.point_difference();
    let demon = margin >= rules.demon_win_margin;

    let winners = game.result.winner.players.iter().map(|player| {
        let contribution = Contribution {
            outcome: Outcome::Win,
            own_score: game.result.winner.score,
            signed_margin: margin as i64,
            demon_win: demon,
            date: game.date,
        };
        (player.clone(), contribution)
    });
    let losers = game.result.loser.players.iter().map(|player| {
        let contribution = Contribution {
            outcome: Outcome::Loss,
            own_score: game.result.loser.score,
            signed_margin: -(margin as i64),
            demon_win: false,
            date: game.date,
        };
        (player.clone(), contribution)
    });

    winners.chain(losers).collect()
}

/// XP change for each player, computed from pre-game XP.
///
/// `gain = clamp(base + (loser_xp - winner_xp) / divisor, min, max)` where the
/// XP of a team is the sum over its players. Winners gain `gain`, losers drop
/// `gain / loss_divisor`. Beating a stronger team is therefore never worth less
/// than beating a weaker one.
pub fn xp_deltas(
    game: &Game,
    profiles: &BTreeMap<String, PlayerProfile>,
    rules: &LedgerRules,
) -> Result<BTreeMap<String, i64>, LedgerError> {
    let team_xp = |players: &[String]| -> Result<i64, LedgerError> {
        players.iter().try_fold(0i64, |acc, player| {
            let profile = profiles
                .get(player)
                .ok_or_else(|| LedgerError::MissingRecord(player.clone()))?;
            Ok(acc + profile.xp as i64)
        })
    };

    let winner_xp = team_xp(&game.result.winner.players)?;
    let loser_xp = team_xp(&game.result.loser.players)?;

    let gap_bonus = (loser_xp - winner_xp) / rules.xp_gap_divisor.max(1);
    let gain = (rules.base_xp_gain + gap_bonus)
        .max(rules.min_xp_gain)
        .min(rules.max_xp_gain);
    let loss = gain / rules.loss_divisor.max(1);

    let mut deltas = BTreeMap::new();
    for player in &game.result.winner.players {
        deltas.insert(player.clone(), gain);
    }
    for player in &game.result.loser.players {
        deltas.insert(player.clone(), -loss);
    }
    Ok(deltas)
}

/// Fold an approved game into `books`.
pub fn apply(game: &Game, books: &mut Books, rules: &LedgerRules) -> Result<(), LedgerError> {
    books.check_complete(game)?;
    let deltas = xp_deltas(game, &books.profiles, rules)?;

    let mut working = books.clone();
    for (player, contribution) in contributions(game, rules) {
        let league = working
            .league
            .get_mut(&player)
            .ok_or_else(|| LedgerError::MissingRecord(player.clone()))?;
        apply_contribution(league, &game.game_id, &contribution);

        let profile = working
            .profiles
            .get_mut(&player)
            .ok_or_else(|| LedgerError::MissingRecord(player.clone()))?;
        apply_contribution(&mut profile.record, &game.game_id, &contribution);

        let delta = deltas.get(&player).copied().unwrap_or_default();
        apply_xp(profile, &game.game_id, delta, rules.xp_floor);

        debug!(
            game = %game.game_id,
            player = %player,
            outcome = %contribution.outcome,
            margin = contribution.signed_margin,
            xp = profile.xp,
            "ledger applied"
        );
    }

    *books = working;
    Ok(())
}

/// Undo a previously applied game.
pub fn revert(game: &Game, books: &mut Books, rules: &LedgerRules) -> Result<(), LedgerError> {
    books.check_complete(game)?;

    let mut working = books.clone();
    for (player, contribution) in contributions(game, rules) {
        let league = working
            .league
            .get_mut(&player)
            .ok_or_else(|| LedgerError::MissingRecord(player.clone()))?;
        revert_contribution(league, &game.game_id, &contribution, &player)?;

        let profile = working
            .profiles
            .get_mut(&player)
            .ok_or_else(|| LedgerError::MissingRecord(player.clone()))?;
        revert_contribution(&mut profile.record, &game.game_id, &contribution, &player)?;
        revert_xp(profile, &game.game_id, rules.xp_floor)?;

        debug!(
            game = %game.game_id,
            player = %player,
            outcome = %contribution.outcome,
            xp = profile.xp,
            "ledger reverted"
        );
    }

    *books = working;
    Ok(())
}

pub fn apply_contribution(
    record: &mut PerformanceRecord,
    game_id: &str,
    contribution: &Contribution,
) {
    record.number_of_games_played += 1;
    match contribution.outcome {
        Outcome::Win => record.number_of_wins += 1,
        Outcome::Loss => record.number_of_losses += 1,
    }

    record.result_log.push(contribution.outcome);
    record.game_log.push(game_id.to_string());
    let streak = trailing_streak(&record.result_log);
    match contribution.outcome {
        Outcome::Win => {
            record.highest_win_streak = record.highest_win_streak.max(streak.len());
            // milestones count the moment a run reaches them, not every win past it
            match streak.len() {
                3 => record.win_streak3 += 1,
                5 => record.win_streak5 += 1,
                7 => record.win_streak7 += 1,
                _ => {}
            }
        }
        Outcome::Loss => {
            record.highest_loss_streak = record.highest_loss_streak.max(streak.len());
        }
    }

    record.point_difference_log.push(contribution.signed_margin);
    record.total_point_difference += contribution.signed_margin;

    if contribution.demon_win {
        record.demon_win += 1;
    }
    record.total_points += contribution.own_score as u64;
    record.last_active = Some(contribution.date);

    record.refresh_derived();
}

/// Remove the entries `game_id` left in `record`, wherever they sit in the logs.
pub fn revert_contribution(
    record: &mut PerformanceRecord,
    game_id: &str,
    contribution: &Contribution,
    player: &str,
) -> Result<(), LedgerError> {
    let violation = |field: &'static str| LedgerError::InvariantViolation {
        player: player.to_string(),
        field,
    };

    // validate everything before touching the record
    let idx = record
        .game_log
        .iter()
        .rposition(|id| id == game_id)
        .ok_or_else(|| violation("game_log"))?;
    if record.result_log.get(idx) != Some(&contribution.outcome) {
        return Err(violation("result_log"));
    }
    if record.point_difference_log.get(idx) != Some(&contribution.signed_margin) {
        return Err(violation("point_difference_log"));
    }
    let games_played = record
        .number_of_games_played
        .checked_sub(1)
        .ok_or_else(|| violation("number_of_games_played"))?;
    let (wins, losses) = match contribution.outcome {
        Outcome::Win => (
            record
                .number_of_wins
                .checked_sub(1)
                .ok_or_else(|| violation("number_of_wins"))?,
            record.number_of_losses,
        ),
        Outcome::Loss => (
            record.number_of_wins,
            record
                .number_of_losses
                .checked_sub(1)
                .ok_or_else(|| violation("number_of_losses"))?,
        ),
    };
    let total_points = record
        .total_points
        .checked_sub(contribution.own_score as u64)
        .ok_or_else(|| violation("total_points"))?;

    record.number_of_games_played = games_played;
    record.number_of_wins = wins;
    record.number_of_losses = losses;
    record.total_points = total_points;

    record.game_log.remove(idx);
    record.result_log.remove(idx);
    record.point_difference_log.remove(idx);
    record.total_point_difference -= contribution.signed_margin;

    // the logs hold the whole history, so the record runs are theirs
    record.highest_win_streak = longest_run(&record.result_log, Outcome::Win);
    record.highest_loss_streak = longest_run(&record.result_log, Outcome::Loss);

    if contribution.demon_win {
        record.demon_win = record.demon_win.saturating_sub(1);
    }
    record.last_active = None;

    record.refresh_derived();
    Ok(())
}

/// Adjust XP, clamp to the floor and remember the delta that actually landed.
pub fn apply_xp(profile: &mut PlayerProfile, game_id: &str, delta: i64, floor: u64) {
    let before = profile.xp as i64;
    let after = (before + delta).max(floor as i64);
    let effective = after - before;

    profile.xp = after as u64;
    profile.prev_game_xp = effective;
    profile.xp_log.push(XpEntry {
        game_id: game_id.to_string(),
        delta: effective,
    });
}

/// Take back the XP `game_id` moved. For the latest game this is exact.
pub fn revert_xp(
    profile: &mut PlayerProfile,
    game_id: &str,
    floor: u64,
) -> Result<(), LedgerError> {
    let violation = |field: &'static str| LedgerError::InvariantViolation {
        player: profile.user_id.clone(),
        field,
    };

    let idx = profile
        .xp_log
        .iter()
        .rposition(|entry| entry.game_id == game_id)
        .ok_or_else(|| violation("xp_log"))?;
    let restored = profile.xp as i64 - profile.xp_log[idx].delta;
    if restored < 0 {
        return Err(violation("xp"));
    }

    profile.xp_log.remove(idx);
    profile.xp = (restored as u64).max(floor);
    profile.prev_game_xp = profile.xp_log.last().map(|e| e.delta).unwrap_or_default();
    Ok(())
}
