//! Withdrawal strikes and the registration cooldown they trigger.

use crate::{
    config::StrikeDefaults,
    http::error_response,
    prelude::*,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("cooldown must be between 1 and 52 weeks, got {0}")]
    InvalidCooldownWeeks(i32),
    #[error("strikes before cooldown must be between 1 and 10, got {0}")]
    InvalidStrikeThreshold(i32),
    #[error("no such player")]
    NotFound,
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = match self {
            Self::Sql(_) => Status::InternalServerError,
            Self::InvalidCooldownWeeks(_) | Self::InvalidStrikeThreshold(_) => Status::BadRequest,
            Self::NotFound => Status::NotFound,
        };
        error_response(request, status, &self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub(crate) struct Settings {
    pub(crate) strikes_before_cooldown: i32,
    pub(crate) cooldown_weeks: i32,
}

impl From<StrikeDefaults> for Settings {
    fn from(StrikeDefaults { strikes_before_cooldown, cooldown_weeks, .. }: StrikeDefaults) -> Self {
        Self { strikes_before_cooldown, cooldown_weeks }
    }
}

impl Settings {
    pub(crate) fn validate(self) -> Result<Self, Error> {
        if !(1..=10).contains(&self.strikes_before_cooldown) {
            return Err(Error::InvalidStrikeThreshold(self.strikes_before_cooldown))
        }
        if !(1..=52).contains(&self.cooldown_weeks) {
            return Err(Error::InvalidCooldownWeeks(self.cooldown_weeks))
        }
        Ok(self)
    }

    pub(crate) fn cooldown(&self) -> TimeDelta {
        TimeDelta::weeks(self.cooldown_weeks.into())
    }

    /// The most recently saved settings, or the configured defaults if none were saved yet.
    pub(crate) async fn load(transaction: &mut Transaction<'_, Postgres>, defaults: StrikeDefaults) -> sqlx::Result<Self> {
        Ok(sqlx::query_as("SELECT strikes_before_cooldown, cooldown_weeks FROM strike_settings ORDER BY id DESC LIMIT 1")
            .fetch_optional(&mut **transaction).await?
            .unwrap_or_else(|| defaults.into()))
    }

    async fn save(self, transaction: &mut Transaction<'_, Postgres>, updated_by: Uuid) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO strike_settings (strikes_before_cooldown, cooldown_weeks, updated_by) VALUES ($1, $2, $3)")
            .bind(self.strikes_before_cooldown)
            .bind(self.cooldown_weeks)
            .bind(updated_by)
            .execute(&mut **transaction).await?;
        Ok(())
    }
}

/// Whether a player is currently allowed to register for games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum Gate {
    Open,
    CoolingDown { until: DateTime<Utc> },
}

/// A player's strike counter together with their cooldown expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub(crate) struct Standing {
    #[sqlx(rename = "withdrawal_strikes")]
    pub(crate) strikes: i32,
    #[sqlx(rename = "strike_cooldown_until")]
    pub(crate) cooldown_until: Option<DateTime<Utc>>,
}

impl Standing {
    pub(crate) fn of(profile: &Profile) -> Self {
        Self {
            strikes: profile.withdrawal_strikes,
            cooldown_until: profile.strike_cooldown_until,
        }
    }

    pub(crate) fn gate(&self, now: DateTime<Utc>) -> Gate {
        match self.cooldown_until {
            Some(until) if now < until => Gate::CoolingDown { until },
            _ => Gate::Open,
        }
    }

    /// Clears the counter once a cooldown has run out. Returns whether anything changed.
    pub(crate) fn expire(&mut self, now: DateTime<Utc>) -> bool {
        match self.cooldown_until {
            Some(until) if now >= until => {
                *self = Self { strikes: 0, cooldown_until: None };
                true
            }
            _ => false,
        }
    }

    /// Records one strike. Reaching the threshold starts a fresh cooldown.
    pub(crate) fn add_strike(&mut self, settings: Settings, now: DateTime<Utc>) {
        self.expire(now);
        self.strikes += 1;
        if self.strikes >= settings.strikes_before_cooldown {
            self.cooldown_until = Some(now + settings.cooldown());
        }
    }

    /// Strikes left before the next one triggers a cooldown.
    pub(crate) fn strikes_remaining(&self, settings: Settings) -> i32 {
        (settings.strikes_before_cooldown - self.strikes).max(0)
    }

    async fn save(&self, transaction: &mut Transaction<'_, Postgres>, player_id: Uuid) -> sqlx::Result<()> {
        sqlx::query("UPDATE profiles SET withdrawal_strikes = $1, strike_cooldown_until = $2 WHERE id = $3")
            .bind(self.strikes)
            .bind(self.cooldown_until)
            .bind(player_id)
            .execute(&mut **transaction).await?;
        Ok(())
    }

    /// Loads a player's standing, locking the row and applying a lapsed cooldown.
    pub(crate) async fn load(transaction: &mut Transaction<'_, Postgres>, player_id: Uuid, now: DateTime<Utc>) -> Result<Self, Error> {
        let mut standing = sqlx::query_as::<_, Self>("SELECT withdrawal_strikes, strike_cooldown_until FROM profiles WHERE id = $1 FOR UPDATE")
            .bind(player_id)
            .fetch_optional(&mut **transaction).await?
            .ok_or(Error::NotFound)?;
        if standing.expire(now) {
            standing.save(transaction, player_id).await?;
        }
        Ok(standing)
    }
}

/// Adds a strike to a player and persists the result.
pub(crate) async fn record(transaction: &mut Transaction<'_, Postgres>, defaults: StrikeDefaults, player_id: Uuid, now: DateTime<Utc>, reason: &str) -> Result<Standing, Error> {
    let settings = Settings::load(transaction, defaults).await?;
    let mut standing = Standing::load(transaction, player_id, now).await?;
    standing.add_strike(settings, now);
    standing.save(transaction, player_id).await?;
    match standing.gate(now) {
        Gate::Open => log::info!("strike {} for player {player_id}: {reason}", standing.strikes),
        Gate::CoolingDown { until } => log::info!("strike {} for player {player_id}: {reason}; cooling down until {until}", standing.strikes),
    }
    Ok(standing)
}

/// Resets every lapsed cooldown. Returns the number of players affected.
pub(crate) async fn expire_all(transaction: &mut Transaction<'_, Postgres>, now: DateTime<Utc>) -> sqlx::Result<u64> {
    Ok(sqlx::query("UPDATE profiles SET withdrawal_strikes = 0, strike_cooldown_until = NULL WHERE strike_cooldown_until <= $1")
        .bind(now)
        .execute(&mut **transaction).await?
        .rows_affected())
}

#[derive(Serialize)]
pub(crate) struct StandingView {
    #[serde(flatten)]
    standing: Standing,
    gate: Gate,
    strikes_remaining: i32,
    settings: Settings,
}

#[rocket::get("/me/strikes")]
pub(crate) async fn mine(pool: &State<PgPool>, config: &State<Config>, me: Profile) -> Result<Json<StandingView>, Error> {
    let now = Utc::now();
    let mut transaction = pool.begin().await?;
    let settings = Settings::load(&mut transaction, config.strikes).await?;
    transaction.commit().await?;
    let mut standing = Standing::of(&me);
    standing.expire(now);
    Ok(Json(StandingView {
        gate: standing.gate(now),
        strikes_remaining: standing.strikes_remaining(settings),
        standing,
        settings,
    }))
}

#[rocket::get("/admin/strikes/settings")]
pub(crate) async fn settings(pool: &State<PgPool>, config: &State<Config>, _admin: Admin) -> Result<Json<Settings>, Error> {
    let mut transaction = pool.begin().await?;
    let settings = Settings::load(&mut transaction, config.strikes).await?;
    transaction.commit().await?;
    Ok(Json(settings))
}

#[rocket::put("/admin/strikes/settings", data = "<form>")]
pub(crate) async fn update_settings(pool: &State<PgPool>, admin: Admin, form: Json<Settings>) -> Result<Json<Settings>, Error> {
    let settings = form.into_inner().validate()?;
    let mut transaction = pool.begin().await?;
    settings.save(&mut transaction, admin.0.id).await?;
    transaction.commit().await?;
    log::info!("{} updated strike settings: {} strikes, {} weeks", admin.0.display_name, settings.strikes_before_cooldown, settings.cooldown_weeks);
    Ok(Json(settings))
}

#[derive(Serialize, sqlx::FromRow)]
pub(crate) struct CooldownEntry {
    id: Uuid,
    display_name: String,
    email: String,
    withdrawal_strikes: i32,
    strike_cooldown_until: DateTime<Utc>,
}

#[rocket::get("/admin/strikes/cooldowns")]
pub(crate) async fn cooldowns(pool: &State<PgPool>, _admin: Admin) -> Result<Json<Vec<CooldownEntry>>, Error> {
    let mut transaction = pool.begin().await?;
    let players = sqlx::query_as("SELECT id, display_name, email, withdrawal_strikes, strike_cooldown_until FROM profiles WHERE strike_cooldown_until > $1 ORDER BY strike_cooldown_until")
        .bind(Utc::now())
        .fetch_all(&mut *transaction).await?;
    transaction.commit().await?;
    Ok(Json(players))
}

#[rocket::post("/admin/strikes/<player_id>")]
pub(crate) async fn add(pool: &State<PgPool>, config: &State<Config>, admin: Admin, player_id: Uuid) -> Result<Json<Standing>, Error> {
    let mut transaction = pool.begin().await?;
    let standing = record(&mut transaction, config.strikes, player_id, Utc::now(), &format!("manual strike by {}", admin.0.display_name)).await?;
    transaction.commit().await?;
    Ok(Json(standing))
}

#[rocket::delete("/admin/strikes/<player_id>")]
pub(crate) async fn clear(pool: &State<PgPool>, admin: Admin, player_id: Uuid) -> Result<Json<Standing>, Error> {
    let mut transaction = pool.begin().await?;
    let standing = Standing { strikes: 0, cooldown_until: None };
    let updated = sqlx::query("UPDATE profiles SET withdrawal_strikes = 0, strike_cooldown_until = NULL WHERE id = $1")
        .bind(player_id)
        .execute(&mut *transaction).await?
        .rows_affected();
    if updated == 0 {
        return Err(Error::NotFound)
    }
    transaction.commit().await?;
    log::info!("{} cleared strikes of player {player_id}", admin.0.display_name);
    Ok(Json(standing))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings { strikes_before_cooldown: 3, cooldown_weeks: 2 }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn cooldown_starts_at_threshold() {
        let mut standing = Standing { strikes: 0, cooldown_until: None };
        standing.add_strike(settings(), now());
        standing.add_strike(settings(), now());
        assert_eq!(standing.gate(now()), Gate::Open);
        assert_eq!(standing.strikes_remaining(settings()), 1);
        standing.add_strike(settings(), now());
        assert_eq!(standing.strikes, 3);
        assert_eq!(standing.gate(now()), Gate::CoolingDown { until: now() + TimeDelta::weeks(2) });
        assert_eq!(standing.strikes_remaining(settings()), 0);
    }

    #[test]
    fn gate_blocks_until_expiry_instant() {
        let until = now() + TimeDelta::days(3);
        let standing = Standing { strikes: 3, cooldown_until: Some(until) };
        assert_eq!(standing.gate(until - TimeDelta::seconds(1)), Gate::CoolingDown { until });
        assert_eq!(standing.gate(until), Gate::Open);
    }

    #[test]
    fn lapsed_cooldown_resets_counter() {
        let mut standing = Standing { strikes: 4, cooldown_until: Some(now() - TimeDelta::hours(1)) };
        assert!(standing.expire(now()));
        assert_eq!(standing, Standing { strikes: 0, cooldown_until: None });
        assert!(!standing.expire(now()));
    }

    #[test]
    fn active_cooldown_is_not_reset() {
        let mut standing = Standing { strikes: 3, cooldown_until: Some(now() + TimeDelta::hours(1)) };
        assert!(!standing.expire(now()));
        assert_eq!(standing.strikes, 3);
    }

    #[test]
    fn strike_after_lapse_starts_from_zero() {
        let mut standing = Standing { strikes: 3, cooldown_until: Some(now() - TimeDelta::days(1)) };
        standing.add_strike(settings(), now());
        assert_eq!(standing, Standing { strikes: 1, cooldown_until: None });
    }

    #[test]
    fn strike_during_cooldown_extends_it() {
        let mut standing = Standing { strikes: 3, cooldown_until: Some(now() + TimeDelta::days(1)) };
        standing.add_strike(settings(), now());
        assert_eq!(standing.strikes, 4);
        assert_eq!(standing.cooldown_until, Some(now() + TimeDelta::weeks(2)));
    }

    #[test]
    fn settings_bounds() {
        assert!(Settings { strikes_before_cooldown: 1, cooldown_weeks: 52 }.validate().is_ok());
        assert!(matches!(Settings { strikes_before_cooldown: 0, cooldown_weeks: 3 }.validate(), Err(Error::InvalidStrikeThreshold(0))));
        assert!(matches!(Settings { strikes_before_cooldown: 11, cooldown_weeks: 3 }.validate(), Err(Error::InvalidStrikeThreshold(11))));
        assert!(matches!(Settings { strikes_before_cooldown: 3, cooldown_weeks: 53 }.validate(), Err(Error::InvalidCooldownWeeks(53))));
    }
}
