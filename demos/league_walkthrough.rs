//! Walk a doubles league through submission, approval and a late dispute.
//!
//! `RUST_LOG=game_ledger=debug cargo run --example league_walkthrough`
use std::sync::Arc;

use game_ledger::game::{GameDate, GameDraft, Team};
use game_ledger::{LeagueService, SledStore, utils};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let db = sled::Config::new().temporary(true).open()?;
    let service = LeagueService::new(SledStore::new(Arc::new(db)));

    let league = service.create_competition("Thursday doubles")?;
    let [a, b, c, d] = [
        utils::new_user_id()?,
        utils::new_user_id()?,
        utils::new_user_id()?,
        utils::new_user_id()?,
    ];
    for player in [&a, &b, &c, &d] {
        service.join_competition(&league.id, player)?;
    }

    let draft = GameDraft::new()
        .set_date(GameDate::from_ymd(2024, 6, 15).ok_or_else(|| anyhow::anyhow!("bad date"))?)
        .set_team1(Team::doubles(&a, &b, 21))
        .set_team2(Team::doubles(&c, &d, 9))
        .set_submitted_by(&a);
    let game = service.submit_game(&league.id, draft)?;

    service.approve_game(&league.id, &game.game_id, &c)?;
    service.approve_game(&league.id, &game.game_id, &d)?;

    for (position, (user, record)) in service.standings(&league.id)?.iter().enumerate() {
        info!(
            rank = position + 1,
            user = %user,
            wins = record.number_of_wins,
            diff = record.total_point_difference,
            demon = record.demon_win,
            "standings"
        );
    }

    service.dispute_game(&league.id, &game.game_id, &c)?;
    let profile = service.profile(&a)?;
    info!(user = %a, xp = profile.xp, wins = profile.record.number_of_wins, "after dispute");

    Ok(())
}
