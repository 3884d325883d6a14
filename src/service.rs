//! Service layer API for the game result lifecycle
use super::approval::{self, Event, Next, Transition};
use super::competition::Competition;
use super::config::LeagueConfig;
use super::error::{GameError, StoreError};
use super::game::{Clock, Game, GameDraft, SystemClock};
use super::ledger::{self, Books};
use super::notify::{LogNotifier, Notifier};
use super::record::{PerformanceRecord, PlayerProfile};
use super::store::{Commit, GameStore, Versioned};
use super::utils;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct LeagueService<S: GameStore> {
    store: S,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: LeagueConfig,
}

/// Public API
impl<S: GameStore> LeagueService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            config: LeagueConfig::default(),
        }
    }
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
    pub fn with_config(mut self, config: LeagueConfig) -> Self {
        self.config = config;
        self
    }
    pub fn config(&self) -> &LeagueConfig {
        &self.config
    }
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the global profile for a user. Returns the existing one if present.
    pub fn register_player(&self, user_id: &str) -> Result<PlayerProfile, GameError> {
        self.with_retry("register", || match self.store.profile(user_id)? {
            Some(existing) => Ok((Commit::new(), existing.doc)),
            None => {
                let profile = PlayerProfile::new(user_id, self.config.ledger.starting_xp);
                Ok((Commit::new().profile(None, profile.clone()), profile))
            }
        })
    }

    pub fn create_competition(&self, name: &str) -> Result<Competition, GameError> {
        let competition = Competition::new(&utils::new_competition_id()?, name);
        self.store
            .commit(Commit::new().competition(None, competition.clone()))?;
        info!(competition = %competition.id, name, "competition created");
        Ok(competition)
    }

    /// Add a user to a competition with a zeroed league record. Their global
    /// profile is created alongside if they never played before.
    pub fn join_competition(
        &self,
        competition_id: &str,
        user_id: &str,
    ) -> Result<Competition, GameError> {
        self.with_retry("join", || {
            let Versioned {
                version,
                doc: mut competition,
            } = self.load_competition(competition_id)?;

            if !competition.add_participant(user_id) {
                return Ok((Commit::new(), competition));
            }

            let mut commit = Commit::new();
            if self.store.profile(user_id)?.is_none() {
                let profile = PlayerProfile::new(user_id, self.config.ledger.starting_xp);
                commit = commit.profile(None, profile);
            }
            let commit = commit.competition(Some(version), competition.clone());
            Ok((commit, competition))
        })
    }

    /// Submit a new game for approval
    pub fn submit_game(&self, competition_id: &str, draft: GameDraft) -> Result<Game, GameError> {
        let submitter = draft.submitted_by().unwrap_or_default().to_string();
        let result = self.submit(competition_id, draft);
        Self::log_result("submit", competition_id, &submitter, &result);
        result
    }

    /// Record an approval by one of the listed players
    pub fn approve_game(
        &self,
        competition_id: &str,
        game_id: &str,
        approver_id: &str,
    ) -> Result<Game, GameError> {
        let event = Event::Approve {
            by: approver_id.to_string(),
        };
        self.transition("approve", competition_id, game_id, approver_id, event)
    }

    /// Record a decline. The game is removed and its final snapshot returned.
    pub fn decline_game(
        &self,
        competition_id: &str,
        game_id: &str,
        decliner_id: &str,
    ) -> Result<Game, GameError> {
        let event = Event::Decline {
            by: decliner_id.to_string(),
        };
        self.transition("decline", competition_id, game_id, decliner_id, event)
    }

    /// Finalise a game whose approval window elapsed without a decline
    pub fn auto_approve(&self, competition_id: &str, game_id: &str) -> Result<Game, GameError> {
        let event = Event::AutoApprove {
            now: self.clock.now(),
        };
        self.transition("auto_approve", competition_id, game_id, "system", event)
    }

    /// Decline a game after it was finalised, undoing its ledger effect
    pub fn dispute_game(
        &self,
        competition_id: &str,
        game_id: &str,
        disputer_id: &str,
    ) -> Result<Game, GameError> {
        let event = Event::Dispute {
            by: disputer_id.to_string(),
        };
        self.transition("dispute", competition_id, game_id, disputer_id, event)
    }

    /// Auto-approve every pending game of a competition that is due. Games that
    /// were finalised or removed in the meantime are skipped.
    pub fn auto_approve_due(&self, competition_id: &str) -> Result<Vec<Game>, GameError> {
        let now = self.clock.now();
        let window = self.config.auto_approve_after;
        let due: Vec<String> = self
            .load_competition(competition_id)?
            .doc
            .pending_games()
            .filter(|g| g.number_of_declines == 0 && now.since(&g.submitted_at) >= window)
            .map(|g| g.game_id.clone())
            .collect();

        let mut approved = vec![];
        for game_id in due {
            match self.auto_approve(competition_id, &game_id) {
                Ok(game) => approved.push(game),
                Err(GameError::AlreadyFinal(_) | GameError::NotFound(_)) => {
                    debug!(competition = competition_id, game = %game_id, "no longer pending");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(approved)
    }

    pub fn competition(&self, competition_id: &str) -> Result<Competition, GameError> {
        Ok(self.load_competition(competition_id)?.doc)
    }

    pub fn game(&self, competition_id: &str, game_id: &str) -> Result<Game, GameError> {
        self.load_competition(competition_id)?
            .doc
            .game(game_id)
            .cloned()
            .ok_or_else(|| GameError::NotFound(format!("game {game_id}")))
    }

    pub fn profile(&self, user_id: &str) -> Result<PlayerProfile, GameError> {
        self.store
            .profile(user_id)?
            .map(|v| v.doc)
            .ok_or_else(|| GameError::NotFound(format!("profile {user_id}")))
    }

    pub fn rank(&self, competition_id: &str, user_id: &str) -> Result<Option<usize>, GameError> {
        Ok(self.competition(competition_id)?.rank(user_id))
    }

    pub fn standings(
        &self,
        competition_id: &str,
    ) -> Result<Vec<(String, PerformanceRecord)>, GameError> {
        let competition = self.competition(competition_id)?;
        Ok(competition
            .standings()
            .into_iter()
            .map(|(user, record)| (user.to_string(), record.clone()))
            .collect())
    }
}

/// Private API
impl<S: GameStore> LeagueService<S> {
    /// Small helper to log lifecycle results
    fn log_result(op: &str, competition: &str, actor: &str, result: &Result<Game, GameError>) {
        match result {
            Ok(game) => info!(
                competition,
                game = %game.game_id,
                actor,
                status = ?game.approval_status,
                approvals = game.number_of_approvals,
                "{op} applied"
            ),
            Err(e) => info!(competition, actor, reason = %e, "{op} skipped"),
        }
    }

    fn load_competition(&self, competition_id: &str) -> Result<Versioned<Competition>, GameError> {
        self.store
            .competition(competition_id)?
            .ok_or_else(|| GameError::NotFound(format!("competition {competition_id}")))
    }

    /// Read, compute and conditionally write, starting over while the write
    /// conflicts, up to the configured number of attempts.
    fn with_retry<T>(
        &self,
        op: &str,
        mut attempt: impl FnMut() -> Result<(Commit, T), GameError>,
    ) -> Result<T, GameError> {
        let attempts = self.config.max_commit_attempts.max(1);
        for n in 1..=attempts {
            let (commit, value) = attempt()?;
            if commit.is_empty() {
                return Ok(value);
            }
            match self.store.commit(commit) {
                Ok(()) => return Ok(value),
                Err(StoreError::Conflict { key }) => {
                    warn!(op, attempt = n, key = %key, "conflicting update, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(GameError::ConcurrentUpdateConflict { attempts })
    }

    fn submit(&self, competition_id: &str, draft: GameDraft) -> Result<Game, GameError> {
        let game = draft.validate_and_finalise(utils::new_game_id()?, self.clock.now())?;

        self.with_retry("submit", || {
            let Versioned {
                version,
                doc: mut competition,
            } = self.load_competition(competition_id)?;

            if let Some(outsider) = game
                .players()
                .into_iter()
                .find(|p| !competition.is_participant(p))
            {
                return Err(GameError::NotParticipant {
                    actor: outsider,
                    target: competition_id.to_string(),
                });
            }

            competition.upsert_game(game.clone());
            Ok((
                Commit::new().competition(Some(version), competition),
                game.clone(),
            ))
        })
    }

    fn transition(
        &self,
        op: &str,
        competition_id: &str,
        game_id: &str,
        actor: &str,
        event: Event,
    ) -> Result<Game, GameError> {
        let result = self.with_retry(op, || {
            let Versioned {
                version,
                doc: mut competition,
            } = self.load_competition(competition_id)?;
            let game = competition
                .game(game_id)
                .ok_or_else(|| GameError::NotFound(format!("game {game_id}")))?;

            let transition = approval::step(game, event.clone(), self.config.auto_approve_after)?;
            let unchanged = matches!(&transition.next, Next::Keep(next) if next == game);
            if unchanged && transition.effects.is_empty() {
                return Ok((Commit::new(), transition));
            }
            let commit = self.stage(&mut competition, &transition)?;
            Ok((commit.competition(Some(version), competition), transition))
        });

        let result = result.map(|transition| {
            // only after the commit landed
            for notification in transition.notifications() {
                self.notifier.notify(notification.clone());
            }
            transition.next.game().clone()
        });
        Self::log_result(op, competition_id, actor, &result);
        result
    }

    /// Carry out a transition's ledger effects and game change on a working
    /// copy of the competition, staging the profiles it touched.
    fn stage(
        &self,
        competition: &mut Competition,
        transition: &Transition,
    ) -> Result<Commit, GameError> {
        let mut commit = Commit::new();
        let game = transition.next.game();

        if transition.applies_ledger() || transition.reverts_ledger() {
            let (mut books, versions) = self.open_books(competition, game)?;
            if transition.applies_ledger() {
                ledger::apply(game, &mut books, &self.config.ledger)?;
            } else {
                ledger::revert(game, &mut books, &self.config.ledger)?;
            }

            for (user, record) in books.league {
                if let Some(slot) = competition.record_mut(&user) {
                    *slot = record;
                }
            }
            for (user, profile) in books.profiles {
                let expected = versions.get(&user).copied().flatten();
                commit = commit.profile(expected, profile);
            }
        }

        match &transition.next {
            Next::Keep(game) => competition.upsert_game(game.clone()),
            Next::Remove(game) => {
                competition.remove_game(&game.game_id);
            }
        }
        Ok(commit)
    }

    /// Gather the league and global records of every player in `game`,
    /// remembering the profile versions they were read at.
    fn open_books(
        &self,
        competition: &Competition,
        game: &Game,
    ) -> Result<(Books, BTreeMap<String, Option<u64>>), GameError> {
        let mut books = Books::new();
        let mut versions = BTreeMap::new();

        for player in game.players() {
            if let Some(record) = competition.record(&player) {
                books.league.insert(player.clone(), record.clone());
            }
            let (version, profile) = match self.store.profile(&player)? {
                Some(Versioned { version, doc }) => (Some(version), doc),
                None => (
                    None,
                    PlayerProfile::new(&player, self.config.ledger.starting_xp),
                ),
            };
            versions.insert(player.clone(), version);
            books.profiles.insert(player, profile);
        }
        Ok((books, versions))
    }
}
