//! Per-player, per-game registration: the priority window, first come first served joins,
//! the waitlist, payments, and withdrawals.

use {
    enum_iterator::Sequence,
    crate::{
        balance::{
            Position,
            Team,
        },
        credit::{
            self,
            Cents,
            TransactionKind,
        },
        game::{
            Game,
            GameStatus,
        },
        http::error_response,
        prelude::*,
        profile::DEFAULT_SKILL_RATING,
        strike::{
            self,
            Gate,
            Standing,
        },
    },
};

/// Statuses that occupy one of the game's spots, as a SQL list.
pub(crate) const SPOT_HOLDING: &str = "('priority_invited', 'priority_confirmed', 'joined', 'confirmed')";
/// Statuses of players who have committed to playing, as a SQL list.
pub(crate) const CONFIRMED: &str = "('priority_confirmed', 'joined', 'confirmed')";
/// Payment statuses that count as paid, as a SQL list.
pub(crate) const PAID: &str = "('marked_paid', 'verified', 'credited')";
/// Payments made outside the app, which can be refunded as credit.
pub(crate) const PAID_BY_TRANSFER: &str = "('marked_paid', 'verified')";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Credit(#[from] credit::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error(transparent)] Strike(#[from] strike::Error),
    #[error("payment is already {0:?}")]
    AlreadyPaid(PaymentStatus),
    #[error("already registered for this game ({0:?})")]
    AlreadyRegistered(PlayerGameStatus),
    #[error("you can't register until your cooldown ends at {until}")]
    CoolingDown {
        until: DateTime<Utc>,
    },
    #[error("the game is full")]
    GameFull,
    #[error("no such game")]
    GameNotFound,
    #[error("only confirmed players can pay")]
    NotConfirmed,
    #[error("you weren't invited to the priority window of this game")]
    NotInvited,
    #[error("no payment has been marked as sent")]
    NotMarkedPaid,
    #[error("not registered for this game")]
    NotRegistered,
    #[error("not on the waitlist")]
    NotWaitlisted,
    #[error("payment has been made, so the player can't be removed for non-payment")]
    Paid,
    #[error("the priority window for this game has closed")]
    PriorityClosed,
    #[error("registration for this game is closed")]
    RegistrationClosed,
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        match self {
            Self::Credit(e) => e.respond_to(request),
            Self::Strike(e) => e.respond_to(request),
            Self::Sql(_) => error_response(request, Status::InternalServerError, &self),
            Self::CoolingDown { .. } | Self::NotInvited => error_response(request, Status::Forbidden, &self),
            Self::GameNotFound | Self::NotRegistered | Self::NotWaitlisted => error_response(request, Status::NotFound, &self),
            Self::AlreadyPaid(_) | Self::AlreadyRegistered(_) | Self::GameFull | Self::NotConfirmed | Self::NotMarkedPaid | Self::Paid | Self::PriorityClosed | Self::RegistrationClosed => error_response(request, Status::Conflict, &self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, Sequence, sqlx::Type)]
#[sqlx(type_name = "player_game_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum PlayerGameStatus {
    PriorityInvited,
    PriorityConfirmed,
    PriorityDeclined,
    Waitlist,
    /// Claimed an open spot first come, first served.
    Joined,
    /// Added by an admin.
    Confirmed,
    Withdrawn,
    RemovedNonpayment,
}

impl PlayerGameStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::PriorityInvited => "priority_invited",
            Self::PriorityConfirmed => "priority_confirmed",
            Self::PriorityDeclined => "priority_declined",
            Self::Waitlist => "waitlist",
            Self::Joined => "joined",
            Self::Confirmed => "confirmed",
            Self::Withdrawn => "withdrawn",
            Self::RemovedNonpayment => "removed_nonpayment",
        }
    }

    pub(crate) fn holds_spot(&self) -> bool {
        matches!(self, Self::PriorityInvited | Self::PriorityConfirmed | Self::Joined | Self::Confirmed)
    }

    pub(crate) fn is_confirmed(&self) -> bool {
        matches!(self, Self::PriorityConfirmed | Self::Joined | Self::Confirmed)
    }

    /// Players who stepped back voluntarily may sign up again.
    pub(crate) fn can_rejoin(&self) -> bool {
        matches!(self, Self::PriorityDeclined | Self::Withdrawn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Sequence, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum PaymentStatus {
    Pending,
    /// The player says they sent the money.
    MarkedPaid,
    /// An admin saw the money arrive.
    Verified,
    /// Paid from the player's credit balance.
    Credited,
}

impl PaymentStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::MarkedPaid => "marked_paid",
            Self::Verified => "verified",
            Self::Credited => "credited",
        }
    }

    pub(crate) fn is_paid(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    fn mark_paid(self) -> Result<Self, Error> {
        match self {
            Self::Pending => Ok(Self::MarkedPaid),
            _ => Err(Error::AlreadyPaid(self)),
        }
    }

    /// Admins can also verify cash payments that were never marked as sent.
    fn verify(self) -> Result<Self, Error> {
        match self {
            Self::Pending | Self::MarkedPaid => Ok(Self::Verified),
            Self::Verified | Self::Credited => Err(Error::AlreadyPaid(self)),
        }
    }

    fn reject(self) -> Result<Self, Error> {
        match self {
            Self::MarkedPaid => Ok(Self::Pending),
            Self::Pending => Err(Error::NotMarkedPaid),
            Self::Verified | Self::Credited => Err(Error::AlreadyPaid(self)),
        }
    }
}

/// The outcome of a priority invitee accepting or declining.
fn respond_to_invite(status: PlayerGameStatus, game: &Game, now: DateTime<Utc>, accept: bool) -> Result<PlayerGameStatus, Error> {
    if game.status != GameStatus::PriorityOpen || now >= game.priority_deadline {
        return Err(Error::PriorityClosed)
    }
    match status {
        PlayerGameStatus::PriorityInvited => Ok(if accept { PlayerGameStatus::PriorityConfirmed } else { PlayerGameStatus::PriorityDeclined }),
        _ => Err(Error::AlreadyRegistered(status)),
    }
}

/// The status a player gets when trying to claim a spot first come, first served.
fn join_status(existing: Option<PlayerGameStatus>, game_status: GameStatus, gate: Gate, available: usize) -> Result<PlayerGameStatus, Error> {
    if !game_status.accepts_joins() {
        return Err(Error::RegistrationClosed)
    }
    if let Gate::CoolingDown { until } = gate {
        return Err(Error::CoolingDown { until })
    }
    if let Some(status) = existing.filter(|status| !status.can_rejoin()) {
        return Err(Error::AlreadyRegistered(status))
    }
    Ok(if available > 0 { PlayerGameStatus::Joined } else { PlayerGameStatus::Waitlist })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Withdrawal {
    /// The player had paid and gets the fee back as credit.
    pub(crate) refund: bool,
    /// Withdrawing from a spot within the late window before kickoff counts as a strike.
    pub(crate) strike: bool,
    pub(crate) frees_spot: bool,
}

fn withdrawal(status: PlayerGameStatus, payment_status: PaymentStatus, game: &Game, late_window: TimeDelta, now: DateTime<Utc>) -> Result<Withdrawal, Error> {
    if game.status.is_finished() || now >= game.kickoff {
        return Err(Error::RegistrationClosed)
    }
    if !status.holds_spot() && status != PlayerGameStatus::Waitlist {
        return Err(Error::NotRegistered)
    }
    let frees_spot = status.holds_spot();
    Ok(Withdrawal {
        refund: frees_spot && payment_status.is_paid(),
        strike: frees_spot && now > game.kickoff - late_window,
        frees_spot,
    })
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub(crate) struct Registration {
    pub(crate) id: Uuid,
    pub(crate) game_id: Uuid,
    pub(crate) player_id: Uuid,
    pub(crate) status: PlayerGameStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) team: Option<Team>,
    pub(crate) position: Option<Position>,
    pub(crate) is_starting: Option<bool>,
    pub(crate) joined_waitlist_at: Option<DateTime<Utc>>,
    pub(crate) confirmed_at: Option<DateTime<Utc>>,
    pub(crate) paid_at: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Registration {
    fn new(game_id: Uuid, player_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: PlayerGameStatus::Waitlist,
            payment_status: PaymentStatus::Pending,
            team: None,
            position: None,
            is_starting: None,
            joined_waitlist_at: None,
            confirmed_at: None,
            paid_at: None,
            created_at: now,
            game_id, player_id,
        }
    }

    /// Moves into a fresh status, forgetting payment and team assignment from any earlier registration.
    fn enter(&mut self, status: PlayerGameStatus, now: DateTime<Utc>) {
        self.status = status;
        self.payment_status = PaymentStatus::Pending;
        self.paid_at = None;
        self.clear_team();
        if status == PlayerGameStatus::Waitlist {
            self.joined_waitlist_at = Some(now);
            self.confirmed_at = None;
        } else {
            self.joined_waitlist_at = None;
            self.confirmed_at = Some(now);
        }
    }

    fn clear_team(&mut self) {
        self.team = None;
        self.position = None;
        self.is_starting = None;
    }

    fn set_payment(&mut self, payment_status: PaymentStatus, now: DateTime<Utc>) {
        self.payment_status = payment_status;
        self.paid_at = payment_status.is_paid().then_some(now);
    }

    /// Loads a registration and locks its row until the end of the transaction.
    pub(crate) async fn lock(transaction: &mut Transaction<'_, Postgres>, game_id: Uuid, player_id: Uuid) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM game_players WHERE game_id = $1 AND player_id = $2 FOR UPDATE")
            .bind(game_id)
            .bind(player_id)
            .fetch_optional(&mut **transaction).await
    }

    /// Spot holders who confirmed before the payment deadline and still haven't paid.
    pub(crate) async fn unpaid(transaction: &mut Transaction<'_, Postgres>, game: &Game) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as(&format!("SELECT * FROM game_players WHERE game_id = $1 AND status IN {SPOT_HOLDING} AND payment_status = 'pending' AND (confirmed_at IS NULL OR confirmed_at <= $2) FOR UPDATE"))
            .bind(game.id)
            .bind(game.payment_deadline)
            .fetch_all(&mut **transaction).await
    }

    async fn insert(&self, transaction: &mut Transaction<'_, Postgres>) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO game_players (id, game_id, player_id, status, payment_status, joined_waitlist_at, confirmed_at, paid_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(self.id)
            .bind(self.game_id)
            .bind(self.player_id)
            .bind(self.status)
            .bind(self.payment_status)
            .bind(self.joined_waitlist_at)
            .bind(self.confirmed_at)
            .bind(self.paid_at)
            .bind(self.created_at)
            .execute(&mut **transaction).await?;
        Ok(())
    }

    async fn save(&self, transaction: &mut Transaction<'_, Postgres>) -> sqlx::Result<()> {
        sqlx::query("UPDATE game_players SET status = $1, payment_status = $2, team = $3, position = $4, is_starting = $5, joined_waitlist_at = $6, confirmed_at = $7, paid_at = $8 WHERE id = $9")
            .bind(self.status)
            .bind(self.payment_status)
            .bind(self.team)
            .bind(self.position)
            .bind(self.is_starting)
            .bind(self.joined_waitlist_at)
            .bind(self.confirmed_at)
            .bind(self.paid_at)
            .bind(self.id)
            .execute(&mut **transaction).await?;
        Ok(())
    }
}

/// Pays the game fee from credit if the player has enough.
async fn apply_credit(transaction: &mut Transaction<'_, Postgres>, config: &Config, registration: &mut Registration, now: DateTime<Utc>) -> Result<(), Error> {
    if registration.payment_status == PaymentStatus::Pending && credit::try_spend(transaction, registration.player_id, registration.game_id, config.game.fee_cents).await? {
        registration.set_payment(PaymentStatus::Credited, now);
        log::info!("paid for player {} in game {} with credit", registration.player_id, registration.game_id);
    }
    Ok(())
}

/// Puts a registration into a confirmed status and saves it.
async fn take_spot(transaction: &mut Transaction<'_, Postgres>, config: &Config, registration: &mut Registration, status: PlayerGameStatus, now: DateTime<Utc>) -> Result<(), Error> {
    registration.status = status;
    registration.confirmed_at = Some(now);
    registration.joined_waitlist_at = None;
    apply_credit(transaction, config, registration, now).await?;
    registration.save(transaction).await?;
    sqlx::query("UPDATE profiles SET weeks_since_last_played = 0 WHERE id = $1")
        .bind(registration.player_id)
        .execute(&mut **transaction).await?;
    Ok(())
}

/// Fills open spots from the head of the waitlist, skipping players whose cooldown is active.
pub(crate) async fn promote_waitlist(transaction: &mut Transaction<'_, Postgres>, config: &Config, game: &Game, now: DateTime<Utc>) -> Result<Vec<Registration>, Error> {
    let mut promoted = Vec::default();
    if game.status.is_finished() || now >= game.kickoff {
        return Ok(promoted)
    }
    let mut available = game.spots(transaction, &config.game).await?.available;
    while available > 0 {
        let next = sqlx::query_as::<_, Registration>("
            SELECT game_players.* FROM game_players
            JOIN profiles ON profiles.id = game_players.player_id
            WHERE game_players.game_id = $1
            AND game_players.status = 'waitlist'
            AND (profiles.strike_cooldown_until IS NULL OR profiles.strike_cooldown_until <= $2)
            ORDER BY game_players.joined_waitlist_at, game_players.created_at
            LIMIT 1
            FOR UPDATE OF game_players
        ")
            .bind(game.id)
            .bind(now)
            .fetch_optional(&mut **transaction).await?;
        let Some(mut next) = next else { break };
        take_spot(transaction, config, &mut next, PlayerGameStatus::Joined, now).await?;
        log::info!("promoted player {} from the waitlist of game {}", next.player_id, game.id);
        promoted.push(next);
        available -= 1;
    }
    Ok(promoted)
}

#[derive(Serialize)]
pub(crate) struct Removal {
    pub(crate) registration: Registration,
    pub(crate) standing: Standing,
    pub(crate) promoted: Vec<Registration>,
}

/// Removes an unpaid spot holder, adds a strike, and offers the spot to the waitlist.
pub(crate) async fn remove_for_nonpayment(transaction: &mut Transaction<'_, Postgres>, config: &Config, game: &Game, mut registration: Registration, now: DateTime<Utc>) -> Result<Removal, Error> {
    if !registration.status.holds_spot() {
        return Err(Error::NotRegistered)
    }
    if registration.payment_status.is_paid() {
        return Err(Error::Paid)
    }
    registration.status = PlayerGameStatus::RemovedNonpayment;
    registration.clear_team();
    registration.save(transaction).await?;
    let standing = strike::record(transaction, config.strikes, registration.player_id, now, &format!("no payment for game on {}", game.game_date)).await?;
    let promoted = promote_waitlist(transaction, config, game, now).await?;
    Ok(Removal { registration, standing, promoted })
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub(crate) struct RosterEntry {
    pub(crate) player_id: Uuid,
    pub(crate) display_name: String,
    pub(crate) whatsapp_name: String,
    #[serde(skip)]
    pub(crate) skill: i16,
    pub(crate) status: PlayerGameStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) team: Option<Team>,
    pub(crate) position: Option<Position>,
    pub(crate) is_starting: Option<bool>,
    pub(crate) joined_waitlist_at: Option<DateTime<Utc>>,
    pub(crate) confirmed_at: Option<DateTime<Utc>>,
}

/// Everyone registered for a game: spot holders first, then the waitlist in queue order, then players who dropped out.
pub(crate) async fn roster_of(transaction: &mut Transaction<'_, Postgres>, game_id: Uuid) -> sqlx::Result<Vec<RosterEntry>> {
    sqlx::query_as(&format!("
        SELECT
            game_players.player_id,
            profiles.display_name,
            profiles.whatsapp_name,
            COALESCE(profiles.skill_rating, $2) AS skill,
            game_players.status,
            game_players.payment_status,
            game_players.team,
            game_players.position,
            game_players.is_starting,
            game_players.joined_waitlist_at,
            game_players.confirmed_at
        FROM game_players JOIN profiles ON profiles.id = game_players.player_id
        WHERE game_players.game_id = $1
        ORDER BY
            CASE WHEN game_players.status IN {SPOT_HOLDING} THEN 0 WHEN game_players.status = 'waitlist' THEN 1 ELSE 2 END,
            game_players.confirmed_at NULLS LAST,
            game_players.joined_waitlist_at NULLS LAST,
            profiles.display_name
    "))
        .bind(game_id)
        .bind(DEFAULT_SKILL_RATING)
        .fetch_all(&mut **transaction).await
}

#[rocket::get("/games/<id>/roster")]
pub(crate) async fn roster(pool: &State<PgPool>, _me: Profile, id: Uuid) -> Result<Json<Vec<RosterEntry>>, Error> {
    let mut transaction = pool.begin().await?;
    Game::from_id(&mut transaction, id).await?.ok_or(Error::GameNotFound)?;
    let roster = roster_of(&mut transaction, id).await?;
    transaction.commit().await?;
    Ok(Json(roster))
}

async fn respond(pool: &PgPool, config: &Config, me: &Profile, id: Uuid, accept: bool) -> Result<Registration, Error> {
    let now = Utc::now();
    let mut transaction = pool.begin().await?;
    let game = Game::lock(&mut transaction, id).await?.ok_or(Error::GameNotFound)?;
    let mut registration = Registration::lock(&mut transaction, id, me.id).await?.ok_or(Error::NotInvited)?;
    let status = respond_to_invite(registration.status, &game, now, accept)?;
    if accept {
        if let Gate::CoolingDown { until } = Standing::load(&mut transaction, me.id, now).await?.gate(now) {
            return Err(Error::CoolingDown { until })
        }
        take_spot(&mut transaction, config, &mut registration, status, now).await?;
    } else {
        registration.status = status;
        registration.save(&mut transaction).await?;
    }
    transaction.commit().await?;
    log::info!("{} {} the priority invite for game {}", me.display_name, if accept { "accepted" } else { "declined" }, game.game_date);
    Ok(registration)
}

#[rocket::post("/games/<id>/confirm")]
pub(crate) async fn confirm(pool: &State<PgPool>, config: &State<Config>, me: Profile, id: Uuid) -> Result<Json<Registration>, Error> {
    Ok(Json(respond(pool, config, &me, id, true).await?))
}

#[rocket::post("/games/<id>/decline")]
pub(crate) async fn decline(pool: &State<PgPool>, config: &State<Config>, me: Profile, id: Uuid) -> Result<Json<Registration>, Error> {
    Ok(Json(respond(pool, config, &me, id, false).await?))
}

/// Claims an open spot for a player, or puts them on the waitlist if the game is full.
pub(crate) async fn join_game(pool: &PgPool, config: &Config, player_id: Uuid, id: Uuid, now: DateTime<Utc>) -> Result<Registration, Error> {
    let mut transaction = pool.begin().await?;
    // locking the game serializes joins, so two players can't claim the last spot
    let game = Game::lock(&mut transaction, id).await?.ok_or(Error::GameNotFound)?;
    let existing = Registration::lock(&mut transaction, id, player_id).await?;
    let gate = Standing::load(&mut transaction, player_id, now).await?.gate(now);
    let available = game.spots(&mut transaction, &config.game).await?.available;
    let status = join_status(existing.as_ref().map(|registration| registration.status), game.status, gate, available)?;
    let mut registration = match existing {
        Some(mut registration) => {
            registration.enter(status, now);
            registration.save(&mut transaction).await?;
            registration
        }
        None => {
            let mut registration = Registration::new(id, player_id, now);
            registration.enter(status, now);
            registration.insert(&mut transaction).await?;
            registration
        }
    };
    if status != PlayerGameStatus::Waitlist {
        take_spot(&mut transaction, config, &mut registration, status, now).await?;
    }
    transaction.commit().await?;
    log::info!("player {player_id} joined game {} as {status:?}", game.game_date);
    Ok(registration)
}

#[rocket::post("/games/<id>/join")]
pub(crate) async fn join(pool: &State<PgPool>, config: &State<Config>, me: Profile, id: Uuid) -> Result<Json<Registration>, Error> {
    Ok(Json(join_game(pool, config, me.id, id, Utc::now()).await?))
}

#[derive(Serialize)]
pub(crate) struct WaitlistPosition {
    /// 1-based.
    position: i64,
    waiting: i64,
}

#[rocket::get("/games/<id>/waitlist-position")]
pub(crate) async fn waitlist_position(pool: &State<PgPool>, me: Profile, id: Uuid) -> Result<Json<WaitlistPosition>, Error> {
    let mut transaction = pool.begin().await?;
    let registration = Registration::lock(&mut transaction, id, me.id).await?.ok_or(Error::NotRegistered)?;
    if registration.status != PlayerGameStatus::Waitlist {
        return Err(Error::NotWaitlisted)
    }
    let (position, waiting) = sqlx::query_as::<_, (i64, i64)>("
        SELECT
            COUNT(*) FILTER (WHERE (joined_waitlist_at, created_at) <= ($2, $3)),
            COUNT(*)
        FROM game_players WHERE game_id = $1 AND status = 'waitlist'
    ")
        .bind(id)
        .bind(registration.joined_waitlist_at)
        .bind(registration.created_at)
        .fetch_one(&mut *transaction).await?;
    transaction.commit().await?;
    Ok(Json(WaitlistPosition { position, waiting }))
}

#[rocket::post("/games/<id>/mark-paid")]
pub(crate) async fn mark_paid(pool: &State<PgPool>, me: Profile, id: Uuid) -> Result<Json<Registration>, Error> {
    let mut transaction = pool.begin().await?;
    let mut registration = Registration::lock(&mut transaction, id, me.id).await?.ok_or(Error::NotRegistered)?;
    if !registration.status.is_confirmed() {
        return Err(Error::NotConfirmed)
    }
    let payment_status = registration.payment_status.mark_paid()?;
    registration.set_payment(payment_status, Utc::now());
    registration.save(&mut transaction).await?;
    transaction.commit().await?;
    Ok(Json(registration))
}

#[derive(Serialize)]
pub(crate) struct WithdrawalReceipt {
    registration: Registration,
    /// Balance after the fee was returned as credit.
    credit_balance: Option<i32>,
    standing: Option<Standing>,
    promoted: Vec<Registration>,
}

/// Gives up a spot or waitlist place, returning a paid fee as credit and adding a strike if it's late.
pub(crate) async fn withdraw_from(pool: &PgPool, config: &Config, player_id: Uuid, id: Uuid, now: DateTime<Utc>) -> Result<WithdrawalReceipt, Error> {
    let mut transaction = pool.begin().await?;
    let game = Game::lock(&mut transaction, id).await?.ok_or(Error::GameNotFound)?;
    let mut registration = Registration::lock(&mut transaction, id, player_id).await?.ok_or(Error::NotRegistered)?;
    let outcome = withdrawal(registration.status, registration.payment_status, &game, config.strikes.late_withdrawal_window(), now)?;
    if game.teams_announced && registration.team.is_some() {
        log::warn!("player {player_id} withdrew from game {} after teams were announced", game.game_date);
    }
    registration.status = PlayerGameStatus::Withdrawn;
    registration.set_payment(PaymentStatus::Pending, now);
    registration.clear_team();
    registration.save(&mut transaction).await?;
    let credit_balance = if outcome.refund {
        Some(credit::record(&mut transaction, player_id, Some(id), config.game.fee_cents, TransactionKind::CreditAdded, "Credit for withdrawing from paid game").await?)
    } else {
        None
    };
    let standing = if outcome.strike {
        Some(strike::record(&mut transaction, config.strikes, player_id, now, &format!("late withdrawal from game on {}", game.game_date)).await?)
    } else {
        None
    };
    let promoted = if outcome.frees_spot {
        promote_waitlist(&mut transaction, config, &game, now).await?
    } else {
        Vec::default()
    };
    transaction.commit().await?;
    log::info!("player {player_id} withdrew from game {}{}", game.game_date, if outcome.refund { format!(", credited {}", Cents(config.game.fee_cents)) } else { String::default() });
    Ok(WithdrawalReceipt { registration, credit_balance, standing, promoted })
}

#[rocket::post("/games/<id>/withdraw")]
pub(crate) async fn withdraw(pool: &State<PgPool>, config: &State<Config>, me: Profile, id: Uuid) -> Result<Json<WithdrawalReceipt>, Error> {
    Ok(Json(withdraw_from(pool, config, me.id, id, Utc::now()).await?))
}

async fn set_payment(pool: &PgPool, admin: &Profile, id: Uuid, player_id: Uuid, update: fn(PaymentStatus) -> Result<PaymentStatus, Error>) -> Result<Registration, Error> {
    let mut transaction = pool.begin().await?;
    let mut registration = Registration::lock(&mut transaction, id, player_id).await?.ok_or(Error::NotRegistered)?;
    if !registration.status.is_confirmed() {
        return Err(Error::NotConfirmed)
    }
    let payment_status = update(registration.payment_status)?;
    registration.set_payment(payment_status, Utc::now());
    registration.save(&mut transaction).await?;
    transaction.commit().await?;
    log::info!("{} set payment of player {player_id} for game {id} to {payment_status:?}", admin.display_name);
    Ok(registration)
}

#[rocket::post("/admin/games/<id>/players/<player_id>/verify")]
pub(crate) async fn verify_payment(pool: &State<PgPool>, admin: Admin, id: Uuid, player_id: Uuid) -> Result<Json<Registration>, Error> {
    Ok(Json(set_payment(pool, &admin.0, id, player_id, PaymentStatus::verify).await?))
}

#[rocket::post("/admin/games/<id>/players/<player_id>/reject-payment")]
pub(crate) async fn reject_payment(pool: &State<PgPool>, admin: Admin, id: Uuid, player_id: Uuid) -> Result<Json<Registration>, Error> {
    Ok(Json(set_payment(pool, &admin.0, id, player_id, PaymentStatus::reject).await?))
}

#[rocket::post("/admin/games/<id>/players/<player_id>/remove-nonpayment")]
pub(crate) async fn remove_nonpayment(pool: &State<PgPool>, config: &State<Config>, admin: Admin, id: Uuid, player_id: Uuid) -> Result<Json<Removal>, Error> {
    let now = Utc::now();
    let mut transaction = pool.begin().await?;
    let game = Game::lock(&mut transaction, id).await?.ok_or(Error::GameNotFound)?;
    let registration = Registration::lock(&mut transaction, id, player_id).await?.ok_or(Error::NotRegistered)?;
    let removal = remove_for_nonpayment(&mut transaction, config, &game, registration, now).await?;
    transaction.commit().await?;
    log::info!("{} removed player {player_id} from game {} for non-payment", admin.0.display_name, game.game_date);
    Ok(Json(removal))
}

#[rocket::post("/admin/games/<id>/players/<player_id>")]
pub(crate) async fn admin_add(pool: &State<PgPool>, config: &State<Config>, admin: Admin, id: Uuid, player_id: Uuid) -> Result<Json<Registration>, Error> {
    let now = Utc::now();
    let mut transaction = pool.begin().await?;
    let game = Game::lock(&mut transaction, id).await?.ok_or(Error::GameNotFound)?;
    if game.status.is_finished() {
        return Err(Error::RegistrationClosed)
    }
    let existing = Registration::lock(&mut transaction, id, player_id).await?;
    if let Some(status) = existing.as_ref().map(|registration| registration.status).filter(|status| status.holds_spot()) {
        return Err(Error::AlreadyRegistered(status))
    }
    if game.spots(&mut transaction, &config.game).await?.available == 0 {
        return Err(Error::GameFull)
    }
    let mut registration = match existing {
        Some(mut registration) => {
            registration.enter(PlayerGameStatus::Confirmed, now);
            registration
        }
        None => {
            let mut registration = Registration::new(id, player_id, now);
            registration.enter(PlayerGameStatus::Confirmed, now);
            registration.insert(&mut transaction).await?;
            registration
        }
    };
    take_spot(&mut transaction, config, &mut registration, PlayerGameStatus::Confirmed, now).await?;
    transaction.commit().await?;
    log::info!("{} added player {player_id} to game {}", admin.0.display_name, game.game_date);
    Ok(Json(registration))
}

#[rocket::delete("/admin/games/<id>/players/<player_id>")]
pub(crate) async fn admin_remove(pool: &State<PgPool>, config: &State<Config>, admin: Admin, id: Uuid, player_id: Uuid) -> Result<Json<Vec<Registration>>, Error> {
    let now = Utc::now();
    let mut transaction = pool.begin().await?;
    let game = Game::lock(&mut transaction, id).await?.ok_or(Error::GameNotFound)?;
    let registration = Registration::lock(&mut transaction, id, player_id).await?.ok_or(Error::NotRegistered)?;
    sqlx::query("DELETE FROM game_players WHERE id = $1")
        .bind(registration.id)
        .execute(&mut *transaction).await?;
    let promoted = if registration.status.holds_spot() {
        promote_waitlist(&mut transaction, config, &game, now).await?
    } else {
        Vec::default()
    };
    transaction.commit().await?;
    log::info!("{} removed player {player_id} ({:?}) from game {}", admin.0.display_name, registration.status, game.game_date);
    Ok(Json(promoted))
}

#[cfg(test)]
mod tests {
    use {
        enum_iterator::all,
        crate::{
            config::{
                GameConfig,
                StrikeDefaults,
            },
            fixtures,
            game::Schedule,
        },
        super::*,
    };

    fn game(status: GameStatus) -> Game {
        let schedule = Schedule::for_date(&GameConfig::default(), NaiveDate::from_ymd_opt(2026, 1, 13).unwrap()).unwrap();
        Game {
            id: Uuid::nil(),
            game_date: NaiveDate::from_ymd_opt(2026, 1, 13).unwrap(),
            kickoff: schedule.kickoff,
            priority_deadline: schedule.priority_deadline,
            payment_reminder_time: schedule.payment_reminder_time,
            payment_deadline: schedule.payment_deadline,
            teams_announced: false,
            created_at: schedule.priority_deadline - TimeDelta::days(7),
            status,
        }
    }

    fn window() -> TimeDelta {
        StrikeDefaults::default().late_withdrawal_window()
    }

    #[test]
    fn sql_lists_match_statuses() {
        for status in all::<PlayerGameStatus>() {
            let quoted = format!("'{}'", status.as_str());
            assert_eq!(SPOT_HOLDING.contains(&quoted), status.holds_spot(), "{status:?}");
            assert_eq!(CONFIRMED.contains(&quoted), status.is_confirmed(), "{status:?}");
        }
        for payment_status in all::<PaymentStatus>() {
            assert_eq!(PAID.contains(&format!("'{}'", payment_status.as_str())), payment_status.is_paid(), "{payment_status:?}");
        }
    }

    #[test]
    fn invitees_respond_before_deadline() {
        let game = game(GameStatus::PriorityOpen);
        let before = game.priority_deadline - TimeDelta::hours(1);
        assert_eq!(respond_to_invite(PlayerGameStatus::PriorityInvited, &game, before, true).unwrap(), PlayerGameStatus::PriorityConfirmed);
        assert_eq!(respond_to_invite(PlayerGameStatus::PriorityInvited, &game, before, false).unwrap(), PlayerGameStatus::PriorityDeclined);
        assert!(matches!(respond_to_invite(PlayerGameStatus::PriorityConfirmed, &game, before, false), Err(Error::AlreadyRegistered(PlayerGameStatus::PriorityConfirmed))));
        assert!(matches!(respond_to_invite(PlayerGameStatus::PriorityInvited, &game, game.priority_deadline, true), Err(Error::PriorityClosed)));
    }

    #[test]
    fn invitees_cant_respond_after_window_closes() {
        let game = game(GameStatus::WaitlistOpen);
        let before = game.priority_deadline - TimeDelta::hours(1);
        assert!(matches!(respond_to_invite(PlayerGameStatus::PriorityInvited, &game, before, true), Err(Error::PriorityClosed)));
    }

    #[test]
    fn join_claims_open_spot_or_waits() {
        assert_eq!(join_status(None, GameStatus::WaitlistOpen, Gate::Open, 3).unwrap(), PlayerGameStatus::Joined);
        assert_eq!(join_status(None, GameStatus::PaymentPending, Gate::Open, 0).unwrap(), PlayerGameStatus::Waitlist);
    }

    #[test]
    fn join_requires_open_registration() {
        assert!(matches!(join_status(None, GameStatus::PriorityOpen, Gate::Open, 16), Err(Error::RegistrationClosed)));
        assert!(matches!(join_status(None, GameStatus::TeamsAssigned, Gate::Open, 1), Err(Error::RegistrationClosed)));
        assert!(matches!(join_status(None, GameStatus::Cancelled, Gate::Open, 1), Err(Error::RegistrationClosed)));
    }

    #[test]
    fn cooldown_blocks_join() {
        let until = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        assert!(matches!(join_status(None, GameStatus::WaitlistOpen, Gate::CoolingDown { until }, 5), Err(Error::CoolingDown { until: blocked_until }) if blocked_until == until));
    }

    #[test]
    fn rejoin_only_after_stepping_back() {
        for status in all::<PlayerGameStatus>() {
            let result = join_status(Some(status), GameStatus::WaitlistOpen, Gate::Open, 1);
            if status.can_rejoin() {
                assert_eq!(result.unwrap(), PlayerGameStatus::Joined);
            } else {
                assert!(matches!(result, Err(Error::AlreadyRegistered(existing)) if existing == status));
            }
        }
    }

    #[test]
    fn payment_flow() {
        assert_eq!(PaymentStatus::Pending.mark_paid().unwrap(), PaymentStatus::MarkedPaid);
        assert!(matches!(PaymentStatus::Credited.mark_paid(), Err(Error::AlreadyPaid(PaymentStatus::Credited))));
        assert_eq!(PaymentStatus::MarkedPaid.verify().unwrap(), PaymentStatus::Verified);
        assert_eq!(PaymentStatus::Pending.verify().unwrap(), PaymentStatus::Verified);
        assert!(matches!(PaymentStatus::Verified.verify(), Err(Error::AlreadyPaid(_))));
        assert_eq!(PaymentStatus::MarkedPaid.reject().unwrap(), PaymentStatus::Pending);
        assert!(matches!(PaymentStatus::Pending.reject(), Err(Error::NotMarkedPaid)));
        assert!(matches!(PaymentStatus::Credited.reject(), Err(Error::AlreadyPaid(_))));
    }

    #[test]
    fn early_withdrawal_is_free() {
        let game = game(GameStatus::WaitlistOpen);
        let now = game.payment_deadline - TimeDelta::days(1);
        let outcome = withdrawal(PlayerGameStatus::Joined, PaymentStatus::Pending, &game, window(), now).unwrap();
        assert_eq!(outcome, Withdrawal { refund: false, strike: false, frees_spot: true });
    }

    #[test]
    fn paid_withdrawal_is_credited() {
        let game = game(GameStatus::PaymentPending);
        let now = game.payment_deadline - TimeDelta::days(1);
        for payment_status in [PaymentStatus::MarkedPaid, PaymentStatus::Verified, PaymentStatus::Credited] {
            assert!(withdrawal(PlayerGameStatus::PriorityConfirmed, payment_status, &game, window(), now).unwrap().refund);
        }
    }

    #[test]
    fn late_withdrawal_is_a_strike() {
        let game = game(GameStatus::TeamsAssigned);
        let now = game.kickoff - TimeDelta::hours(23);
        let outcome = withdrawal(PlayerGameStatus::Confirmed, PaymentStatus::Verified, &game, window(), now).unwrap();
        assert_eq!(outcome, Withdrawal { refund: true, strike: true, frees_spot: true });
    }

    #[test]
    fn withdrawal_after_payment_deadline_but_a_day_out_is_free() {
        let game = game(GameStatus::TeamsAssigned);
        for now in [game.payment_deadline + TimeDelta::hours(1), game.kickoff - TimeDelta::hours(48), game.kickoff - TimeDelta::hours(24)] {
            let outcome = withdrawal(PlayerGameStatus::Joined, PaymentStatus::Verified, &game, window(), now).unwrap();
            assert_eq!(outcome, Withdrawal { refund: true, strike: false, frees_spot: true }, "{now}");
        }
    }

    #[test]
    fn leaving_waitlist_has_no_consequences() {
        let game = game(GameStatus::PaymentPending);
        let now = game.payment_deadline + TimeDelta::hours(1);
        let outcome = withdrawal(PlayerGameStatus::Waitlist, PaymentStatus::Pending, &game, window(), now).unwrap();
        assert_eq!(outcome, Withdrawal { refund: false, strike: false, frees_spot: false });
    }

    #[test]
    fn no_withdrawal_after_kickoff_or_without_registration() {
        let game = game(GameStatus::TeamsAssigned);
        assert!(matches!(withdrawal(PlayerGameStatus::Joined, PaymentStatus::Verified, &game, window(), game.kickoff), Err(Error::RegistrationClosed)));
        let now = game.payment_deadline;
        assert!(matches!(withdrawal(PlayerGameStatus::Withdrawn, PaymentStatus::Pending, &game, window(), now), Err(Error::NotRegistered)));
        assert!(matches!(withdrawal(PlayerGameStatus::RemovedNonpayment, PaymentStatus::Pending, &game, window(), now), Err(Error::NotRegistered)));
    }

    #[test]
    fn entering_a_status_resets_registration() {
        let now = Utc.with_ymd_and_hms(2026, 1, 9, 12, 0, 0).unwrap();
        let mut registration = Registration::new(Uuid::nil(), Uuid::nil(), now);
        registration.enter(PlayerGameStatus::Joined, now);
        registration.set_payment(PaymentStatus::Verified, now);
        registration.team = Some(Team::Dark);
        registration.position = Some(Position::Sub);
        registration.is_starting = Some(false);
        let later = now + TimeDelta::hours(2);
        registration.enter(PlayerGameStatus::Waitlist, later);
        assert_eq!(registration.payment_status, PaymentStatus::Pending);
        assert_eq!(registration.paid_at, None);
        assert_eq!(registration.team, None);
        assert_eq!(registration.position, None);
        assert_eq!(registration.joined_waitlist_at, Some(later));
        assert_eq!(registration.confirmed_at, None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn waitlist_promotion_skips_cooldowns_and_stops_at_capacity(pool: PgPool) {
        let config = fixtures::config(2);
        let game = fixtures::game(&pool, &config, GameStatus::WaitlistOpen).await;
        let opened = game.priority_deadline;
        for name in ["Ann", "Bo"] {
            let player = fixtures::player(&pool, name).await;
            fixtures::register(&pool, &game, player, PlayerGameStatus::Joined, opened).await;
        }
        let mut waitlist = Vec::default();
        for (idx, name) in ["Cy", "Di", "Ed", "Flo"].into_iter().enumerate() {
            let player = fixtures::player(&pool, name).await;
            fixtures::register(&pool, &game, player, PlayerGameStatus::Waitlist, opened + TimeDelta::hours(idx as i64 + 1)).await;
            waitlist.push(player);
        }
        sqlx::query("UPDATE profiles SET withdrawal_strikes = 3, strike_cooldown_until = $1 WHERE id = $2")
            .bind(game.kickoff + TimeDelta::weeks(1))
            .bind(waitlist[0])
            .execute(&pool).await.unwrap();
        let now = opened + TimeDelta::days(1);
        let mut transaction = pool.begin().await.unwrap();
        let promoted = promote_waitlist(&mut transaction, &config, &game, now).await.unwrap();
        transaction.commit().await.unwrap();
        assert_eq!(promoted.iter().map(|registration| registration.player_id).collect::<Vec<_>>(), [waitlist[1], waitlist[2]]);
        assert_eq!(fixtures::status_of(&pool, &game, waitlist[0]).await.0, PlayerGameStatus::Waitlist);
        assert_eq!(fixtures::status_of(&pool, &game, waitlist[1]).await.0, PlayerGameStatus::Joined);
        assert_eq!(fixtures::status_of(&pool, &game, waitlist[2]).await.0, PlayerGameStatus::Joined);
        assert_eq!(fixtures::status_of(&pool, &game, waitlist[3]).await.0, PlayerGameStatus::Waitlist);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn simultaneous_joins_dont_overfill(pool: PgPool) {
        let config = fixtures::config(2);
        let game = fixtures::game(&pool, &config, GameStatus::WaitlistOpen).await;
        let now = game.priority_deadline + TimeDelta::hours(1);
        let mut players = Vec::default();
        for idx in 0..6 {
            players.push(fixtures::player(&pool, &format!("Player{idx}")).await);
        }
        let joins = players.iter().map(|&player_id| {
            let pool = pool.clone();
            let config = config.clone();
            let game_id = game.id;
            tokio::spawn(async move { join_game(&pool, &config, player_id, game_id, now).await.map(|registration| registration.status) })
        }).collect::<Vec<_>>();
        let mut statuses = Vec::default();
        for join in joins {
            statuses.push(join.await.unwrap().unwrap());
        }
        assert_eq!(statuses.iter().filter(|&&status| status == PlayerGameStatus::Joined).count(), 4);
        assert_eq!(statuses.iter().filter(|&&status| status == PlayerGameStatus::Waitlist).count(), 2);
        let mut transaction = pool.begin().await.unwrap();
        let spots = game.spots(&mut transaction, &config.game).await.unwrap();
        assert_eq!((spots.filled, spots.available), (4, 0));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn nonpayment_removal_strikes_and_promotes(pool: PgPool) {
        let config = fixtures::config(1);
        let game = fixtures::game(&pool, &config, GameStatus::PaymentPending).await;
        let opened = game.priority_deadline;
        let unpaid = fixtures::player(&pool, "Ann").await;
        let paid = fixtures::player(&pool, "Bo").await;
        let waiting = fixtures::player(&pool, "Cy").await;
        fixtures::register(&pool, &game, unpaid, PlayerGameStatus::Joined, opened).await;
        fixtures::register(&pool, &game, paid, PlayerGameStatus::Joined, opened).await;
        fixtures::set_payment(&pool, &game, paid, PaymentStatus::Verified).await;
        fixtures::register(&pool, &game, waiting, PlayerGameStatus::Waitlist, opened + TimeDelta::hours(1)).await;
        let now = game.payment_deadline + TimeDelta::hours(1);
        let mut transaction = pool.begin().await.unwrap();
        let registration = Registration::lock(&mut transaction, game.id, paid).await.unwrap().unwrap();
        assert!(matches!(remove_for_nonpayment(&mut transaction, &config, &game, registration, now).await, Err(Error::Paid)));
        let registration = Registration::lock(&mut transaction, game.id, unpaid).await.unwrap().unwrap();
        let removal = remove_for_nonpayment(&mut transaction, &config, &game, registration, now).await.unwrap();
        transaction.commit().await.unwrap();
        assert_eq!(removal.registration.status, PlayerGameStatus::RemovedNonpayment);
        assert_eq!(removal.standing.strikes, 1);
        assert_eq!(removal.promoted.iter().map(|registration| registration.player_id).collect::<Vec<_>>(), [waiting]);
        assert_eq!(fixtures::status_of(&pool, &game, unpaid).await.0, PlayerGameStatus::RemovedNonpayment);
        assert_eq!(fixtures::status_of(&pool, &game, waiting).await.0, PlayerGameStatus::Joined);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unpaid_excludes_players_confirmed_after_deadline(pool: PgPool) {
        let config = fixtures::config(8);
        let game = fixtures::game(&pool, &config, GameStatus::PaymentPending).await;
        let early = fixtures::player(&pool, "Ann").await;
        let late = fixtures::player(&pool, "Bo").await;
        let invited = fixtures::player(&pool, "Cy").await;
        let paid = fixtures::player(&pool, "Di").await;
        fixtures::register(&pool, &game, early, PlayerGameStatus::Joined, game.payment_deadline - TimeDelta::hours(1)).await;
        fixtures::register(&pool, &game, late, PlayerGameStatus::Joined, game.payment_deadline + TimeDelta::minutes(30)).await;
        fixtures::register(&pool, &game, invited, PlayerGameStatus::PriorityInvited, game.created_at).await;
        fixtures::register(&pool, &game, paid, PlayerGameStatus::Joined, game.payment_deadline - TimeDelta::hours(2)).await;
        fixtures::set_payment(&pool, &game, paid, PaymentStatus::MarkedPaid).await;
        let mut transaction = pool.begin().await.unwrap();
        let unpaid = Registration::unpaid(&mut transaction, &game).await.unwrap();
        let unpaid = unpaid.iter().map(|registration| registration.player_id).collect::<HashSet<_>>();
        assert_eq!(unpaid, HashSet::from([early, invited]));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn refunded_fee_isnt_credited_again_on_withdrawal(pool: PgPool) {
        let config = fixtures::config(8);
        let game = fixtures::game(&pool, &config, GameStatus::PaymentPending).await;
        let now = game.priority_deadline + TimeDelta::hours(1);
        let refunded_first = fixtures::player(&pool, "Ann").await;
        let withdrew_first = fixtures::player(&pool, "Bo").await;
        let mut requests = Vec::default();
        for player in [refunded_first, withdrew_first] {
            fixtures::register(&pool, &game, player, PlayerGameStatus::Joined, game.priority_deadline).await;
            fixtures::set_payment(&pool, &game, player, PaymentStatus::Verified).await;
            let request = Uuid::new_v4();
            sqlx::query("INSERT INTO refund_requests (id, player_id, game_id, amount) VALUES ($1, $2, $3, $4)")
                .bind(request)
                .bind(player)
                .bind(game.id)
                .bind(config.game.fee_cents)
                .execute(&pool).await.unwrap();
            requests.push(request);
        }
        // refund approved, then the player withdraws
        let mut transaction = pool.begin().await.unwrap();
        credit::approve(&mut transaction, requests[0], None).await.unwrap();
        transaction.commit().await.unwrap();
        assert_eq!(fixtures::status_of(&pool, &game, refunded_first).await, (PlayerGameStatus::Joined, PaymentStatus::Pending));
        let receipt = withdraw_from(&pool, &config, refunded_first, game.id, now).await.unwrap();
        assert_eq!(receipt.credit_balance, None);
        assert_eq!(fixtures::credit_balance(&pool, refunded_first).await, 1500);
        // the player withdraws, then the pending refund is approved
        let receipt = withdraw_from(&pool, &config, withdrew_first, game.id, now).await.unwrap();
        assert_eq!(receipt.credit_balance, Some(1500));
        let mut transaction = pool.begin().await.unwrap();
        assert!(matches!(credit::approve(&mut transaction, requests[1], None).await, Err(credit::Error::NotPaid)));
        drop(transaction);
        assert_eq!(fixtures::credit_balance(&pool, withdrew_first).await, 1500);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn roster_lists_spot_holders_then_waitlist(pool: PgPool) {
        let config = fixtures::config(8);
        let game = fixtures::game(&pool, &config, GameStatus::WaitlistOpen).await;
        let opened = game.priority_deadline;
        let left = fixtures::player(&pool, "Al").await;
        let waiting = fixtures::player(&pool, "Bea").await;
        let playing = fixtures::player(&pool, "Cam").await;
        fixtures::register(&pool, &game, left, PlayerGameStatus::Withdrawn, opened).await;
        fixtures::register(&pool, &game, waiting, PlayerGameStatus::Waitlist, opened + TimeDelta::hours(1)).await;
        fixtures::register(&pool, &game, playing, PlayerGameStatus::Joined, opened + TimeDelta::hours(2)).await;
        let mut transaction = pool.begin().await.unwrap();
        let roster = roster_of(&mut transaction, game.id).await.unwrap();
        assert_eq!(roster.iter().map(|entry| entry.player_id).collect::<Vec<_>>(), [playing, waiting, left]);
        assert_eq!(roster[0].skill, DEFAULT_SKILL_RATING);
    }
}
