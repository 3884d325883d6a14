//! Approval state machine for a submitted game.
//!
//! `Pending -> {Approved, AutoApproved, Declined}`; all three targets are
//! terminal. [`step`] is pure: it takes the current game and an [`Event`] and
//! returns what the game becomes plus the [`Effect`]s an outer driver has to
//! carry out. Ledger effects are emitted at most once per direction because
//! every path that emits one leaves the game terminal or removed.

use chrono::{TimeDelta, Utc};

use crate::error::GameError;
use crate::game::{ApprovalStatus, Game, TimeStamp};
use crate::notify::{Notification, NotificationKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Approve { by: String },
    Decline { by: String },
    /// Time-based finalisation, fired by a scheduler
    AutoApprove { now: TimeStamp<Utc> },
    /// Late decline, possibly after the game was finalised
    Dispute { by: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ApplyLedger,
    RevertLedger,
    Notify(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Keep(Game),
    /// Drop the game from its competition. Carries the final snapshot.
    Remove(Game),
}

impl Next {
    pub fn game(&self) -> &Game {
        match self {
            Next::Keep(game) | Next::Remove(game) => game,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Next,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(game: &Game) -> Self {
        Self {
            next: Next::Keep(game.clone()),
            effects: vec![],
        }
    }
    pub fn applies_ledger(&self) -> bool {
        self.effects.contains(&Effect::ApplyLedger)
    }
    pub fn reverts_ledger(&self) -> bool {
        self.effects.contains(&Effect::RevertLedger)
    }
    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.effects.iter().filter_map(|effect| match effect {
            Effect::Notify(notification) => Some(notification),
            _ => None,
        })
    }
}

/// Execute a transition: (game, event) -> (next, effects)
pub fn step(
    game: &Game,
    event: Event,
    auto_approve_after: TimeDelta,
) -> Result<Transition, GameError> {
    match event {
        Event::Approve { by } => approve(game, by),
        Event::Decline { by } => decline(game, by),
        Event::AutoApprove { now } => auto_approve(game, now, auto_approve_after),
        Event::Dispute { by } => dispute(game, by),
    }
}

fn ensure_participant(game: &Game, actor: &str) -> Result<(), GameError> {
    if game.side_of(actor).is_none() {
        return Err(GameError::NotParticipant {
            actor: actor.to_string(),
            target: game.game_id.clone(),
        });
    }
    Ok(())
}

fn ensure_pending(game: &Game) -> Result<(), GameError> {
    if game.approval_status.is_final() {
        return Err(GameError::AlreadyFinal(game.game_id.clone()));
    }
    Ok(())
}

fn notify_submitter(
    game: &Game,
    sender: Option<&str>,
    kind: NotificationKind,
    message: String,
) -> Option<Effect> {
    if sender == Some(game.submitted_by.as_str()) {
        return None;
    }
    Some(Effect::Notify(Notification::new(
        &game.submitted_by,
        sender,
        kind,
        &game.game_id,
        message,
    )))
}

fn approve(game: &Game, by: String) -> Result<Transition, GameError> {
    ensure_participant(game, &by)?;
    ensure_pending(game)?;

    // the submitter's own side has implicitly approved already
    if game.side_of(&by) == game.submitter_side() {
        return Ok(Transition::unchanged(game));
    }
    if game.approved_by.contains(&by) {
        return Err(GameError::AlreadyApproved {
            actor: by,
            game: game.game_id.clone(),
        });
    }

    let mut next = game.clone();
    next.number_of_approvals += 1;
    next.approved_by.push(by.clone());

    if next.number_of_approvals < next.approval_threshold() {
        return Ok(Transition {
            next: Next::Keep(next),
            effects: vec![],
        });
    }

    next.approval_status = ApprovalStatus::Approved;
    let mut effects = vec![Effect::ApplyLedger];
    effects.extend(notify_submitter(
        &next,
        Some(by.as_str()),
        NotificationKind::GameApproved,
        format!("{by} approved your game played on {}", next.date),
    ));

    Ok(Transition {
        next: Next::Keep(next),
        effects,
    })
}

fn decline(game: &Game, by: String) -> Result<Transition, GameError> {
    ensure_participant(game, &by)?;
    ensure_pending(game)?;

    let mut next = game.clone();
    next.number_of_declines += 1;
    next.approval_status = ApprovalStatus::Declined;

    let effects = notify_submitter(
        &next,
        Some(by.as_str()),
        NotificationKind::GameDeclined,
        format!("{by} declined your game played on {}", next.date),
    )
    .into_iter()
    .collect();

    Ok(Transition {
        next: Next::Remove(next),
        effects,
    })
}

fn auto_approve(
    game: &Game,
    now: TimeStamp<Utc>,
    window: TimeDelta,
) -> Result<Transition, GameError> {
    ensure_pending(game)?;
    if game.number_of_declines > 0 {
        return Err(GameError::AlreadyFinal(game.game_id.clone()));
    }
    if now.since(&game.submitted_at) < window {
        return Err(GameError::ApprovalWindowOpen(game.game_id.clone()));
    }

    let mut next = game.clone();
    next.approval_status = ApprovalStatus::AutoApproved;
    next.auto_approved = true;

    let mut effects = vec![Effect::ApplyLedger];
    effects.extend(notify_submitter(
        &next,
        None,
        NotificationKind::GameAutoApproved,
        format!("your game played on {} was approved automatically", next.date),
    ));

    Ok(Transition {
        next: Next::Keep(next),
        effects,
    })
}

fn dispute(game: &Game, by: String) -> Result<Transition, GameError> {
    ensure_participant(game, &by)?;

    match game.approval_status {
        // nothing has been applied yet
        ApprovalStatus::Pending => decline(game, by),
        status if status.counts_in_ledger() => {
            let mut next = game.clone();
            next.number_of_declines += 1;
            next.approval_status = ApprovalStatus::Declined;

            let mut effects = vec![Effect::RevertLedger];
            effects.extend(notify_submitter(
                &next,
                Some(by.as_str()),
                NotificationKind::GameDisputed,
                format!("{by} disputed your game played on {}", next.date),
            ));

            Ok(Transition {
                next: Next::Remove(next),
                effects,
            })
        }
        _ => Err(GameError::AlreadyFinal(game.game_id.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameDate, GameDraft, Team};

    fn day() -> TimeDelta {
        TimeDelta::hours(24)
    }

    fn submitted_at() -> TimeStamp<Utc> {
        TimeStamp::new_with(2024, 6, 15, 18, 0, 0).unwrap()
    }

    fn doubles() -> Game {
        GameDraft::new()
            .set_date(GameDate::from_ymd(2024, 6, 15).unwrap())
            .set_team1(Team::doubles("a", "b", 21))
            .set_team2(Team::doubles("c", "d", 9))
            .set_submitted_by("a")
            .validate_and_finalise("game_1".into(), submitted_at())
            .unwrap()
    }

    fn singles() -> Game {
        GameDraft::new()
            .set_date(GameDate::from_ymd(2024, 6, 15).unwrap())
            .set_team1(Team::singles("a", 11))
            .set_team2(Team::singles("c", 4))
            .set_submitted_by("a")
            .validate_and_finalise("game_2".into(), submitted_at())
            .unwrap()
    }

    fn approve_by(game: &Game, by: &str) -> Result<Transition, GameError> {
        step(game, Event::Approve { by: by.into() }, day())
    }

    #[test]
    fn doubles_needs_two_opposing_approvals() {
        let game = doubles();

        let t = approve_by(&game, "a").unwrap();
        assert_eq!(t, Transition::unchanged(&game));

        let t = approve_by(t.next.game(), "c").unwrap();
        assert_eq!(t.next.game().approval_status, ApprovalStatus::Pending);
        assert_eq!(t.next.game().number_of_approvals, 1);
        assert!(t.effects.is_empty());

        let t = approve_by(t.next.game(), "d").unwrap();
        assert_eq!(t.next.game().approval_status, ApprovalStatus::Approved);
        assert!(t.applies_ledger());
        let notes: Vec<_> = t.notifications().collect();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].recipient_id, "a");
        assert_eq!(notes[0].sender_id.as_deref(), Some("d"));
    }

    #[test]
    fn singles_approves_on_first_opposing_approval() {
        let t = approve_by(&singles(), "c").unwrap();
        assert_eq!(t.next.game().approval_status, ApprovalStatus::Approved);
        assert!(t.applies_ledger());
    }

    #[test]
    fn repeated_approval_is_rejected() {
        let t = approve_by(&doubles(), "c").unwrap();
        let err = approve_by(t.next.game(), "c").unwrap_err();
        assert!(matches!(err, GameError::AlreadyApproved { .. }));
    }

    #[test]
    fn approval_after_final_is_already_final() {
        let t = approve_by(&singles(), "c").unwrap();
        let err = approve_by(t.next.game(), "c").unwrap_err();
        assert!(matches!(err, GameError::AlreadyFinal(_)));
    }

    #[test]
    fn outsider_cannot_act() {
        let err = approve_by(&doubles(), "mallory").unwrap_err();
        assert!(matches!(err, GameError::NotParticipant { .. }));
        let err = step(&doubles(), Event::Decline { by: "mallory".into() }, day()).unwrap_err();
        assert!(matches!(err, GameError::NotParticipant { .. }));
    }

    #[test]
    fn single_decline_removes_without_ledger() {
        let t = step(&doubles(), Event::Decline { by: "d".into() }, day()).unwrap();
        assert!(matches!(t.next, Next::Remove(_)));
        assert_eq!(t.next.game().number_of_declines, 1);
        assert!(!t.applies_ledger());
        assert!(!t.reverts_ledger());
        assert_eq!(t.notifications().count(), 1);
    }

    #[test]
    fn submitter_withdrawing_is_not_notified() {
        let t = step(&doubles(), Event::Decline { by: "a".into() }, day()).unwrap();
        assert!(matches!(t.next, Next::Remove(_)));
        assert_eq!(t.notifications().count(), 0);
    }

    #[test]
    fn auto_approve_waits_for_window() {
        let early = submitted_at().shifted(TimeDelta::hours(23));
        let err = step(&doubles(), Event::AutoApprove { now: early }, day()).unwrap_err();
        assert!(matches!(err, GameError::ApprovalWindowOpen(_)));

        let due = submitted_at().shifted(day());
        let t = step(&doubles(), Event::AutoApprove { now: due.clone() }, day()).unwrap();
        let game = t.next.game();
        assert_eq!(game.approval_status, ApprovalStatus::AutoApproved);
        assert!(game.auto_approved);
        assert!(t.applies_ledger());

        let err = step(game, Event::AutoApprove { now: due }, day()).unwrap_err();
        assert!(matches!(err, GameError::AlreadyFinal(_)));
        let err = approve_by(game, "c").unwrap_err();
        assert!(matches!(err, GameError::AlreadyFinal(_)));
    }

    #[test]
    fn dispute_after_approval_reverts() {
        let approved = approve_by(&singles(), "c").unwrap().next.game().clone();
        let t = step(&approved, Event::Dispute { by: "c".into() }, day()).unwrap();

        assert!(matches!(t.next, Next::Remove(_)));
        assert!(t.reverts_ledger());
        assert!(!t.applies_ledger());
    }

    #[test]
    fn dispute_while_pending_is_a_decline() {
        let t = step(&doubles(), Event::Dispute { by: "c".into() }, day()).unwrap();
        assert!(matches!(t.next, Next::Remove(_)));
        assert!(!t.reverts_ledger());
    }

    #[test]
    fn decline_after_final_is_already_final() {
        let approved = approve_by(&singles(), "c").unwrap().next.game().clone();
        let err = step(&approved, Event::Decline { by: "c".into() }, day()).unwrap_err();
        assert!(matches!(err, GameError::AlreadyFinal(_)));
    }
}
