use {
    chrono_tz::Tz,
    ics::{
        ICalendar,
        parameters::TzIDParam,
        properties::{
            Description,
            DtEnd,
            DtStart,
            Location,
            Summary,
        },
    },
    rocket::http::ContentType,
    crate::{
        config::GameConfig,
        http::error_response,
        prelude::*,
        registration::SPOT_HOLDING,
    },
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("a game on {0} already exists")]
    AlreadyExists(NaiveDate),
    #[error("cannot change game status from {from:?} to {to:?}")]
    InvalidTransition {
        from: GameStatus,
        to: GameStatus,
    },
    #[error("{0} does not exist in the configured time zone")]
    NonexistentLocalTime(NaiveDateTime),
    #[error("no such game")]
    NotFound,
    #[error("games can't be scheduled in the past")]
    Past,
    #[error("at most {capacity} players can be invited, got {invited}")]
    TooManyInvites {
        capacity: usize,
        invited: usize,
    },
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = match self {
            Self::Sql(_) => Status::InternalServerError,
            Self::AlreadyExists(_) | Self::InvalidTransition { .. } => Status::Conflict,
            Self::NonexistentLocalTime(_) | Self::Past | Self::TooManyInvites { .. } => Status::BadRequest,
            Self::NotFound => Status::NotFound,
        };
        error_response(request, status, &self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "game_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum GameStatus {
    /// Only invited returning players can confirm.
    PriorityOpen,
    /// Open spots are claimed first come, first served.
    WaitlistOpen,
    PaymentPending,
    TeamsAssigned,
    Completed,
    Cancelled,
}

impl GameStatus {
    pub(crate) fn accepts_joins(&self) -> bool {
        matches!(self, Self::WaitlistOpen | Self::PaymentPending)
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub(crate) fn can_advance_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::PriorityOpen, Self::WaitlistOpen) => true,
            (Self::WaitlistOpen, Self::PaymentPending) => true,
            (Self::PriorityOpen | Self::WaitlistOpen | Self::PaymentPending, Self::TeamsAssigned) => true,
            // reopening registration after teams were announced, e.g. when a player drops out
            (Self::TeamsAssigned, Self::PaymentPending) => true,
            (Self::TeamsAssigned, Self::Completed) => true,
            (current, Self::Cancelled) => !current.is_finished(),
            (_, _) => false,
        }
    }
}

/// Kickoff and registration deadlines of a game, derived from its date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Schedule {
    pub(crate) kickoff: DateTime<Utc>,
    /// Thursday noon before the game.
    pub(crate) priority_deadline: DateTime<Utc>,
    /// Saturday noon before the game.
    pub(crate) payment_reminder_time: DateTime<Utc>,
    /// Saturday 23:59 before the game.
    pub(crate) payment_deadline: DateTime<Utc>,
}

/// The last occurrence of `weekday` strictly before `date`.
fn previous_weekday(date: NaiveDate, weekday: Weekday) -> NaiveDate {
    let days_back = (date.weekday().num_days_from_monday() + 7 - weekday.num_days_from_monday()) % 7;
    date - TimeDelta::days(if days_back == 0 { 7 } else { days_back.into() })
}

fn local(tz: Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, Error> {
    let naive = date.and_time(time);
    tz.from_local_datetime(&naive).earliest().map(|datetime| datetime.to_utc()).ok_or(Error::NonexistentLocalTime(naive))
}

impl Schedule {
    pub(crate) fn for_date(config: &GameConfig, date: NaiveDate) -> Result<Self, Error> {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).expect("valid time");
        let saturday = previous_weekday(date, Weekday::Sat);
        Ok(Self {
            kickoff: local(config.time_zone, date, config.start_time)?,
            priority_deadline: local(config.time_zone, previous_weekday(date, Weekday::Thu), noon)?,
            payment_reminder_time: local(config.time_zone, saturday, noon)?,
            payment_deadline: local(config.time_zone, saturday, NaiveTime::from_hms_opt(23, 59, 0).expect("valid time"))?,
        })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub(crate) struct Game {
    pub(crate) id: Uuid,
    pub(crate) game_date: NaiveDate,
    pub(crate) kickoff: DateTime<Utc>,
    pub(crate) status: GameStatus,
    pub(crate) priority_deadline: DateTime<Utc>,
    pub(crate) payment_reminder_time: DateTime<Utc>,
    pub(crate) payment_deadline: DateTime<Utc>,
    pub(crate) teams_announced: bool,
    pub(crate) created_at: DateTime<Utc>,
}

impl Game {
    pub(crate) async fn from_id(transaction: &mut Transaction<'_, Postgres>, id: Uuid) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM games WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **transaction).await
    }

    /// Loads a game and locks its row until the end of the transaction, serializing roster changes.
    pub(crate) async fn lock(transaction: &mut Transaction<'_, Postgres>, id: Uuid) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM games WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **transaction).await
    }

    /// The next game that hasn't been cancelled, on or after today's date in the game's time zone.
    pub(crate) async fn upcoming(transaction: &mut Transaction<'_, Postgres>, tz: Tz) -> sqlx::Result<Option<Self>> {
        let today = Utc::now().with_timezone(&tz).date_naive();
        sqlx::query_as("SELECT * FROM games WHERE game_date >= $1 AND status <> 'cancelled' ORDER BY game_date LIMIT 1")
            .bind(today)
            .fetch_optional(&mut **transaction).await
    }

    pub(crate) async fn all_upcoming(transaction: &mut Transaction<'_, Postgres>, tz: Tz) -> sqlx::Result<Vec<Self>> {
        let today = Utc::now().with_timezone(&tz).date_naive();
        sqlx::query_as("SELECT * FROM games WHERE game_date >= $1 AND status <> 'cancelled' ORDER BY game_date")
            .bind(today)
            .fetch_all(&mut **transaction).await
    }

    /// Games still in the priority window after its deadline passed.
    pub(crate) async fn past_priority_deadline(transaction: &mut Transaction<'_, Postgres>, now: DateTime<Utc>) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM games WHERE status = 'priority_open' AND priority_deadline <= $1 FOR UPDATE")
            .bind(now)
            .fetch_all(&mut **transaction).await
    }

    /// Games past their payment deadline that haven't kicked off yet.
    pub(crate) async fn past_payment_deadline(transaction: &mut Transaction<'_, Postgres>, now: DateTime<Utc>) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM games WHERE status IN ('waitlist_open', 'payment_pending', 'teams_assigned') AND payment_deadline <= $1 AND kickoff > $1 FOR UPDATE")
            .bind(now)
            .fetch_all(&mut **transaction).await
    }

    pub(crate) async fn spots(&self, transaction: &mut Transaction<'_, Postgres>, config: &GameConfig) -> sqlx::Result<Spots> {
        let filled = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM game_players WHERE game_id = $1 AND status IN {SPOT_HOLDING}"))
            .bind(self.id)
            .fetch_one(&mut **transaction).await?;
        Ok(Spots::new(config.capacity(), filled.try_into().unwrap_or(usize::MAX)))
    }

    pub(crate) async fn set_status(&mut self, transaction: &mut Transaction<'_, Postgres>, status: GameStatus) -> Result<(), Error> {
        if !self.status.can_advance_to(status) {
            return Err(Error::InvalidTransition { from: self.status, to: status })
        }
        sqlx::query("UPDATE games SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(self.id)
            .execute(&mut **transaction).await?;
        log::info!("game {} ({}): {:?} → {:?}", self.id, self.game_date, self.status, status);
        self.status = status;
        Ok(())
    }

    /// Creates a game and invites the given players for the priority window.
    pub(crate) async fn create(transaction: &mut Transaction<'_, Postgres>, config: &GameConfig, date: NaiveDate, invitees: &[Uuid]) -> Result<Self, Error> {
        if invitees.len() > config.capacity() {
            return Err(Error::TooManyInvites { capacity: config.capacity(), invited: invitees.len() })
        }
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM games WHERE game_date = $1)")
            .bind(date)
            .fetch_one(&mut **transaction).await?;
        if exists {
            return Err(Error::AlreadyExists(date))
        }
        let schedule = Schedule::for_date(config, date)?;
        let game = sqlx::query_as::<_, Self>("INSERT INTO games (id, game_date, kickoff, priority_deadline, payment_reminder_time, payment_deadline) VALUES ($1, $2, $3, $4, $5, $6) RETURNING *")
            .bind(Uuid::new_v4())
            .bind(date)
            .bind(schedule.kickoff)
            .bind(schedule.priority_deadline)
            .bind(schedule.payment_reminder_time)
            .bind(schedule.payment_deadline)
            .fetch_one(&mut **transaction).await?;
        for &player_id in invitees.iter().unique() {
            sqlx::query("INSERT INTO game_players (id, game_id, player_id, status) VALUES ($1, $2, $3, 'priority_invited')")
                .bind(Uuid::new_v4())
                .bind(game.id)
                .bind(player_id)
                .execute(&mut **transaction).await?;
        }
        log::info!("created game {} on {date} with {} priority invites", game.id, invitees.len());
        Ok(game)
    }

    /// Active players of the most recently completed game, who get priority for the next one.
    pub(crate) async fn returning_players(transaction: &mut Transaction<'_, Postgres>) -> sqlx::Result<Vec<Uuid>> {
        sqlx::query_scalar(&format!("
            SELECT game_players.player_id FROM game_players
            JOIN profiles ON profiles.id = game_players.player_id
            WHERE game_players.game_id = (SELECT id FROM games WHERE status = 'completed' ORDER BY game_date DESC LIMIT 1)
            AND game_players.status IN {SPOT_HOLDING}
            AND profiles.is_active
            ORDER BY game_players.confirmed_at NULLS LAST
        "))
            .fetch_all(&mut **transaction).await
    }

    async fn priority_invitees(&self, transaction: &mut Transaction<'_, Postgres>) -> sqlx::Result<Vec<Uuid>> {
        sqlx::query_scalar("SELECT player_id FROM game_players WHERE game_id = $1 AND status IN ('priority_invited', 'priority_confirmed')")
            .bind(self.id)
            .fetch_all(&mut **transaction).await
    }

    /// Marks the game as played and updates player statistics.
    pub(crate) async fn complete(&mut self, transaction: &mut Transaction<'_, Postgres>) -> Result<(), Error> {
        self.set_status(transaction, GameStatus::Completed).await?;
        sqlx::query(&format!("
            UPDATE profiles SET
                total_games_played = total_games_played + 1,
                times_started_as_sub = times_started_as_sub + (CASE WHEN game_players.position = 'sub' THEN 1 ELSE 0 END),
                times_started_as_keeper = times_started_as_keeper + (CASE WHEN game_players.position = 'keeper' THEN 1 ELSE 0 END),
                weeks_since_last_played = 0
            FROM game_players
            WHERE game_players.player_id = profiles.id AND game_players.game_id = $1 AND game_players.status IN {SPOT_HOLDING}
        "))
            .bind(self.id)
            .execute(&mut **transaction).await?;
        sqlx::query(&format!("
            UPDATE profiles SET weeks_since_last_played = weeks_since_last_played + 1
            WHERE is_active AND id NOT IN (SELECT player_id FROM game_players WHERE game_id = $1 AND status IN {SPOT_HOLDING})
        "))
            .bind(self.id)
            .execute(&mut **transaction).await?;
        Ok(())
    }

    /// Cancels the game and schedules the following week's game with the same priority invitees.
    pub(crate) async fn cancel(&mut self, transaction: &mut Transaction<'_, Postgres>, config: &GameConfig) -> Result<Option<Self>, Error> {
        self.set_status(transaction, GameStatus::Cancelled).await?;
        let invitees = self.priority_invitees(transaction).await?;
        match Self::create(transaction, config, self.game_date + TimeDelta::weeks(1), &invitees).await {
            Ok(next) => Ok(Some(next)),
            Err(Error::AlreadyExists(date)) => {
                log::info!("not rescheduling cancelled game {}: a game on {date} already exists", self.id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct Spots {
    pub(crate) capacity: usize,
    pub(crate) filled: usize,
    pub(crate) available: usize,
}

impl Spots {
    pub(crate) fn new(capacity: usize, filled: usize) -> Self {
        Self { capacity, filled, available: capacity.saturating_sub(filled) }
    }
}

#[derive(Serialize)]
pub(crate) struct GameView {
    #[serde(flatten)]
    game: Game,
    spots: Spots,
}

#[rocket::get("/games/upcoming")]
pub(crate) async fn upcoming(pool: &State<PgPool>, config: &State<Config>) -> Result<Option<Json<GameView>>, Error> {
    let mut transaction = pool.begin().await?;
    let Some(game) = Game::upcoming(&mut transaction, config.game.time_zone).await? else { return Ok(None) };
    let spots = game.spots(&mut transaction, &config.game).await?;
    transaction.commit().await?;
    Ok(Some(Json(GameView { game, spots })))
}

#[rocket::get("/games/<id>", rank = 2)]
pub(crate) async fn get(pool: &State<PgPool>, config: &State<Config>, id: Uuid) -> Result<Json<GameView>, StatusOrError<Error>> {
    let mut transaction = pool.begin().await.map_err(|e| StatusOrError::Err(e.into()))?;
    let game = Game::from_id(&mut transaction, id).await.map_err(|e| StatusOrError::Err(e.into()))?.ok_or(Status::NotFound)?;
    let spots = game.spots(&mut transaction, &config.game).await.map_err(|e| StatusOrError::Err(e.into()))?;
    transaction.commit().await.map_err(|e| StatusOrError::Err(e.into()))?;
    Ok(Json(GameView { game, spots }))
}

#[rocket::get("/games/<id>/spots")]
pub(crate) async fn spots(pool: &State<PgPool>, config: &State<Config>, id: Uuid) -> Result<Json<Spots>, Error> {
    let mut transaction = pool.begin().await?;
    let game = Game::from_id(&mut transaction, id).await?.ok_or(Error::NotFound)?;
    let spots = game.spots(&mut transaction, &config.game).await?;
    transaction.commit().await?;
    Ok(Json(spots))
}

#[derive(Deserialize)]
pub(crate) struct CreateForm {
    game_date: NaiveDate,
    /// Defaults to the players of the last completed game.
    #[serde(default)]
    invitees: Option<Vec<Uuid>>,
}

#[rocket::post("/admin/games", data = "<form>")]
pub(crate) async fn create(pool: &State<PgPool>, config: &State<Config>, admin: Admin, form: Json<CreateForm>) -> Result<Json<Game>, Error> {
    if form.game_date < Utc::now().with_timezone(&config.game.time_zone).date_naive() {
        return Err(Error::Past)
    }
    if form.game_date.weekday() != config.game.weekday {
        log::warn!("{} scheduled a game on a {} instead of the usual {}", admin.0.display_name, form.game_date.weekday(), config.game.weekday);
    }
    let mut transaction = pool.begin().await?;
    let invitees = match form.invitees {
        Some(ref invitees) => invitees.clone(),
        None => Game::returning_players(&mut transaction).await?.into_iter().take(config.game.capacity()).collect(),
    };
    let game = Game::create(&mut transaction, &config.game, form.game_date, &invitees).await?;
    transaction.commit().await?;
    Ok(Json(game))
}

#[derive(Deserialize)]
pub(crate) struct StatusForm {
    status: GameStatus,
}

#[rocket::post("/admin/games/<id>/status", data = "<form>")]
pub(crate) async fn advance(pool: &State<PgPool>, _admin: Admin, id: Uuid, form: Json<StatusForm>) -> Result<Json<Game>, Error> {
    let mut transaction = pool.begin().await?;
    let mut game = Game::lock(&mut transaction, id).await?.ok_or(Error::NotFound)?;
    game.set_status(&mut transaction, form.status).await?;
    transaction.commit().await?;
    Ok(Json(game))
}

#[derive(Serialize)]
pub(crate) struct Cancellation {
    cancelled: Game,
    rescheduled: Option<Game>,
}

#[rocket::post("/admin/games/<id>/cancel")]
pub(crate) async fn cancel(pool: &State<PgPool>, config: &State<Config>, _admin: Admin, id: Uuid) -> Result<Json<Cancellation>, Error> {
    let mut transaction = pool.begin().await?;
    let mut game = Game::lock(&mut transaction, id).await?.ok_or(Error::NotFound)?;
    let rescheduled = game.cancel(&mut transaction, &config.game).await?;
    transaction.commit().await?;
    Ok(Json(Cancellation { cancelled: game, rescheduled }))
}

#[rocket::post("/admin/games/<id>/complete")]
pub(crate) async fn complete(pool: &State<PgPool>, _admin: Admin, id: Uuid) -> Result<Json<Game>, Error> {
    let mut transaction = pool.begin().await?;
    let mut game = Game::lock(&mut transaction, id).await?.ok_or(Error::NotFound)?;
    game.complete(&mut transaction).await?;
    transaction.commit().await?;
    Ok(Json(game))
}

fn dtstamp(datetime: DateTime<Utc>) -> String {
    datetime.format("%Y%m%dT%H%M%SZ").to_string()
}

fn dtstart(datetime: DateTime<Tz>) -> DtStart<'static> {
    let mut dtstart = DtStart::new(datetime.naive_local().format("%Y%m%dT%H%M%S").to_string());
    dtstart.add(TzIDParam::new(datetime.timezone().name()));
    dtstart
}

fn dtend(datetime: DateTime<Tz>) -> DtEnd<'static> {
    let mut dtend = DtEnd::new(datetime.naive_local().format("%Y%m%dT%H%M%S").to_string());
    dtend.add(TzIDParam::new(datetime.timezone().name()));
    dtend
}

pub(crate) fn calendar_for(config: &GameConfig, games: &[Game], now: DateTime<Utc>) -> ICalendar<'static> {
    let mut cal = ICalendar::new("2.0", concat!("dropin-fc/", env!("CARGO_PKG_VERSION")));
    for game in games {
        let start = game.kickoff.with_timezone(&config.time_zone);
        let mut cal_event = ics::Event::new(format!("{}@dropin-fc.app", game.id), dtstamp(now));
        cal_event.push(Summary::new(ics::escape_text("Drop-in FC")));
        cal_event.push(Location::new(ics::escape_text(config.location.clone())));
        cal_event.push(Description::new(ics::escape_text(format!("Pay by {}", game.payment_deadline.with_timezone(&config.time_zone).format("%A %-I:%M %p")))));
        cal_event.push(dtstart(start));
        cal_event.push(dtend(start + config.duration()));
        cal.add_event(cal_event);
    }
    cal
}

#[rocket::get("/calendar.ics")]
pub(crate) async fn calendar(pool: &State<PgPool>, config: &State<Config>) -> Result<(ContentType, String), Error> {
    let mut transaction = pool.begin().await?;
    let games = Game::all_upcoming(&mut transaction, config.game.time_zone).await?;
    transaction.commit().await?;
    Ok((ContentType::Calendar, calendar_for(&config.game, &games, Utc::now()).to_string()))
}

#[cfg(test)]
mod tests {
    use {
        crate::{
            balance::Position,
            fixtures,
            registration::PlayerGameStatus,
        },
        super::*,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn previous_weekday_is_strictly_before() {
        // 2026-01-13 is a Tuesday
        assert_eq!(previous_weekday(date(2026, 1, 13), Weekday::Thu), date(2026, 1, 8));
        assert_eq!(previous_weekday(date(2026, 1, 13), Weekday::Sat), date(2026, 1, 10));
        assert_eq!(previous_weekday(date(2026, 1, 13), Weekday::Tue), date(2026, 1, 6));
    }

    #[test]
    fn tuesday_schedule_in_vancouver() {
        let schedule = Schedule::for_date(&GameConfig::default(), date(2026, 1, 13)).unwrap();
        // PST is UTC-8
        assert_eq!(schedule.kickoff, Utc.with_ymd_and_hms(2026, 1, 14, 4, 30, 0).unwrap());
        assert_eq!(schedule.priority_deadline, Utc.with_ymd_and_hms(2026, 1, 8, 20, 0, 0).unwrap());
        assert_eq!(schedule.payment_reminder_time, Utc.with_ymd_and_hms(2026, 1, 10, 20, 0, 0).unwrap());
        assert_eq!(schedule.payment_deadline, Utc.with_ymd_and_hms(2026, 1, 11, 7, 59, 0).unwrap());
        assert!(schedule.priority_deadline < schedule.payment_reminder_time);
        assert!(schedule.payment_deadline < schedule.kickoff);
    }

    #[test]
    fn schedule_follows_daylight_saving_time() {
        // PDT is UTC-7
        let schedule = Schedule::for_date(&GameConfig::default(), date(2026, 7, 14)).unwrap();
        assert_eq!(schedule.kickoff, Utc.with_ymd_and_hms(2026, 7, 15, 3, 30, 0).unwrap());
    }

    #[test]
    fn status_transitions() {
        use GameStatus::*;
        assert!(PriorityOpen.can_advance_to(WaitlistOpen));
        assert!(WaitlistOpen.can_advance_to(PaymentPending));
        assert!(PaymentPending.can_advance_to(TeamsAssigned));
        assert!(TeamsAssigned.can_advance_to(Completed));
        assert!(PaymentPending.can_advance_to(Cancelled));
        assert!(!WaitlistOpen.can_advance_to(PriorityOpen));
        assert!(!PaymentPending.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Cancelled));
        assert!(!Cancelled.can_advance_to(Cancelled));
    }

    #[test]
    fn joins_only_after_priority_window() {
        assert!(!GameStatus::PriorityOpen.accepts_joins());
        assert!(GameStatus::WaitlistOpen.accepts_joins());
        assert!(GameStatus::PaymentPending.accepts_joins());
        assert!(!GameStatus::TeamsAssigned.accepts_joins());
    }

    #[test]
    fn spots_never_go_negative() {
        assert_eq!(Spots::new(16, 10).available, 6);
        assert_eq!(Spots::new(16, 17).available, 0);
    }

    #[test]
    fn calendar_contains_game() {
        let config = GameConfig::default();
        let schedule = Schedule::for_date(&config, date(2026, 1, 13)).unwrap();
        let game = Game {
            id: Uuid::nil(),
            game_date: date(2026, 1, 13),
            kickoff: schedule.kickoff,
            status: GameStatus::WaitlistOpen,
            priority_deadline: schedule.priority_deadline,
            payment_reminder_time: schedule.payment_reminder_time,
            payment_deadline: schedule.payment_deadline,
            teams_announced: false,
            created_at: schedule.priority_deadline,
        };
        let ics = calendar_for(&config, &[game], schedule.priority_deadline).to_string();
        assert!(ics.contains("DTSTART;TZID=America/Vancouver:20260113T203000"));
        assert!(ics.contains("DTEND;TZID=America/Vancouver:20260113T220000"));
        assert!(ics.contains("Windsor Bubble North Vancouver"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn completing_a_game_updates_player_stats(pool: PgPool) {
        let config = fixtures::config(8);
        let game = fixtures::game(&pool, &config, GameStatus::TeamsAssigned).await;
        let keeper = fixtures::player(&pool, "Kim").await;
        let sub = fixtures::player(&pool, "Sam").await;
        let field = fixtures::player(&pool, "Fay").await;
        let withdrawn = fixtures::player(&pool, "Wyn").await;
        let absent = fixtures::player(&pool, "Abe").await;
        let inactive = fixtures::player(&pool, "Ian").await;
        for (player, position) in [(keeper, Position::Keeper), (sub, Position::Sub), (field, Position::Field)] {
            fixtures::register(&pool, &game, player, PlayerGameStatus::Confirmed, game.priority_deadline).await;
            sqlx::query("UPDATE game_players SET team = 'dark', position = $1 WHERE game_id = $2 AND player_id = $3")
                .bind(position)
                .bind(game.id)
                .bind(player)
                .execute(&pool).await.unwrap();
        }
        fixtures::register(&pool, &game, withdrawn, PlayerGameStatus::Withdrawn, game.priority_deadline).await;
        sqlx::query("UPDATE profiles SET weeks_since_last_played = 2 WHERE id = $1").bind(absent).execute(&pool).await.unwrap();
        sqlx::query("UPDATE profiles SET is_active = FALSE WHERE id = $1").bind(inactive).execute(&pool).await.unwrap();
        let mut transaction = pool.begin().await.unwrap();
        let mut game = Game::lock(&mut transaction, game.id).await.unwrap().unwrap();
        game.complete(&mut transaction).await.unwrap();
        transaction.commit().await.unwrap();
        assert_eq!(game.status, GameStatus::Completed);
        let stats = |player: Uuid| {
            let pool = pool.clone();
            async move {
                sqlx::query_as::<_, (i32, i32, i32, i32)>("SELECT total_games_played, times_started_as_sub, times_started_as_keeper, weeks_since_last_played FROM profiles WHERE id = $1")
                    .bind(player)
                    .fetch_one(&pool).await.unwrap()
            }
        };
        assert_eq!(stats(keeper).await, (1, 0, 1, 0));
        assert_eq!(stats(sub).await, (1, 1, 0, 0));
        assert_eq!(stats(field).await, (1, 0, 0, 0));
        assert_eq!(stats(withdrawn).await, (0, 0, 0, 1));
        assert_eq!(stats(absent).await, (0, 0, 0, 3));
        assert_eq!(stats(inactive).await, (0, 0, 0, 0));
    }
}
