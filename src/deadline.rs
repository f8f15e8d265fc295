//! Enforcement of the weekly deadlines: closing the priority window, removing players who
//! haven't paid, and lifting lapsed cooldowns.

use crate::{
    game::{
        self,
        Game,
        GameStatus,
    },
    prelude::*,
    registration::{
        self,
        Registration,
    },
    strike,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Game(#[from] game::Error),
    #[error(transparent)] Registration(#[from] registration::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
}

/// What a deadline pass changed.
#[derive(Debug, Default)]
pub(crate) struct Summary {
    pub(crate) priority_closed: Vec<NaiveDate>,
    pub(crate) invites_expired: u64,
    pub(crate) removed_nonpayment: Vec<Uuid>,
    pub(crate) promoted: Vec<Uuid>,
    pub(crate) cooldowns_lifted: u64,
}

impl Summary {
    pub(crate) fn is_empty(&self) -> bool {
        self.priority_closed.is_empty()
            && self.invites_expired == 0
            && self.removed_nonpayment.is_empty()
            && self.promoted.is_empty()
            && self.cooldowns_lifted == 0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "nothing to do")
        }
        let mut parts = Vec::default();
        if !self.priority_closed.is_empty() {
            parts.push(format!("closed priority window for {} ({} unanswered invites declined)", self.priority_closed.iter().join(", "), self.invites_expired));
        }
        if !self.removed_nonpayment.is_empty() {
            parts.push(format!("removed {} unpaid players", self.removed_nonpayment.len()));
        }
        if !self.promoted.is_empty() {
            parts.push(format!("promoted {} from the waitlist", self.promoted.len()));
        }
        if self.cooldowns_lifted > 0 {
            parts.push(format!("lifted {} lapsed cooldowns", self.cooldowns_lifted));
        }
        write!(f, "{}", parts.join("; "))
    }
}

async fn close_priority_windows(transaction: &mut Transaction<'_, Postgres>, now: DateTime<Utc>, summary: &mut Summary) -> Result<(), Error> {
    for mut game in Game::past_priority_deadline(transaction, now).await? {
        let expired = sqlx::query("UPDATE game_players SET status = 'priority_declined' WHERE game_id = $1 AND status = 'priority_invited'")
            .bind(game.id)
            .execute(&mut **transaction).await?
            .rows_affected();
        game.set_status(transaction, GameStatus::WaitlistOpen).await?;
        summary.invites_expired += expired;
        summary.priority_closed.push(game.game_date);
    }
    Ok(())
}

async fn enforce_payment(transaction: &mut Transaction<'_, Postgres>, config: &Config, now: DateTime<Utc>, summary: &mut Summary) -> Result<(), Error> {
    for game in Game::past_payment_deadline(transaction, now).await? {
        // players promoted after the deadline aren't included, so each only gets removed for their own lateness
        for unpaid in Registration::unpaid(transaction, &game).await? {
            let removal = registration::remove_for_nonpayment(transaction, config, &game, unpaid, now).await?;
            summary.removed_nonpayment.push(removal.registration.player_id);
            summary.promoted.extend(removal.promoted.into_iter().map(|registration| registration.player_id));
        }
    }
    Ok(())
}

/// Runs one pass over all deadlines that have passed as of `now`.
pub(crate) async fn tick(pool: &PgPool, config: &Config, now: DateTime<Utc>) -> Result<Summary, Error> {
    let mut summary = Summary::default();
    let mut transaction = pool.begin().await?;
    close_priority_windows(&mut transaction, now, &mut summary).await?;
    enforce_payment(&mut transaction, config, now, &mut summary).await?;
    summary.cooldowns_lifted = strike::expire_all(&mut transaction, now).await?;
    transaction.commit().await?;
    Ok(summary)
}
