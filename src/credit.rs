//! Account credit: the transaction ledger, spending credit on game fees, and refund requests.

use crate::{
    http::error_response,
    prelude::*,
    registration::PAID_BY_TRANSFER,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("a refund for this game was already requested")]
    AlreadyRequested,
    #[error("this refund request was already {0:?}")]
    AlreadyResolved(RefundStatus),
    #[error("credit balance is {balance}, can't take {amount}")]
    InsufficientCredit {
        balance: Cents,
        amount: Cents,
    },
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("you haven't paid for this game")]
    NotPaid,
    #[error("no such player")]
    NoSuchPlayer,
    #[error("no such refund request")]
    NotFound,
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = match self {
            Self::Sql(_) => Status::InternalServerError,
            Self::AlreadyRequested | Self::AlreadyResolved(_) => Status::Conflict,
            Self::InsufficientCredit { .. } | Self::InvalidAmount | Self::NotPaid => Status::BadRequest,
            Self::NoSuchPlayer | Self::NotFound => Status::NotFound,
        };
        error_response(request, status, &self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "credit_transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum TransactionKind {
    CreditAdded,
    CreditUsed,
    RefundRequested,
    RefundCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum RefundStatus {
    Pending,
    Approved,
    Denied,
}

/// An amount of money in cents, displayed as dollars, e.g. `-$15.00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cents(pub(crate) i32);

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub(crate) struct CreditTransaction {
    pub(crate) id: Uuid,
    pub(crate) player_id: Uuid,
    pub(crate) game_id: Option<Uuid>,
    pub(crate) amount: i32,
    pub(crate) kind: TransactionKind,
    pub(crate) notes: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

/// Changes a player's credit balance by `amount` and adds the matching ledger entry.
/// The balance never goes negative. Returns the new balance.
pub(crate) async fn record(transaction: &mut Transaction<'_, Postgres>, player_id: Uuid, game_id: Option<Uuid>, amount: i32, kind: TransactionKind, notes: &str) -> Result<i32, Error> {
    let balance = sqlx::query_scalar::<_, i32>("UPDATE profiles SET credit_balance = credit_balance + $1 WHERE id = $2 AND credit_balance + $1 >= 0 RETURNING credit_balance")
        .bind(amount)
        .bind(player_id)
        .fetch_optional(&mut **transaction).await?;
    let Some(balance) = balance else {
        let balance = sqlx::query_scalar::<_, i32>("SELECT credit_balance FROM profiles WHERE id = $1")
            .bind(player_id)
            .fetch_optional(&mut **transaction).await?
            .ok_or(Error::NoSuchPlayer)?;
        return Err(Error::InsufficientCredit { balance: Cents(balance), amount: Cents(-amount) })
    };
    sqlx::query("INSERT INTO credit_transactions (id, player_id, game_id, amount, kind, notes) VALUES ($1, $2, $3, $4, $5, $6)")
        .bind(Uuid::new_v4())
        .bind(player_id)
        .bind(game_id)
        .bind(amount)
        .bind(kind)
        .bind(notes)
        .execute(&mut **transaction).await?;
    log::info!("credit {kind:?} {} for player {player_id}, balance now {}", Cents(amount), Cents(balance));
    Ok(balance)
}

/// Pays a game fee from the player's credit balance if it covers the fee.
/// Returns whether the fee was paid.
pub(crate) async fn try_spend(transaction: &mut Transaction<'_, Postgres>, player_id: Uuid, game_id: Uuid, fee: i32) -> Result<bool, Error> {
    match record(transaction, player_id, Some(game_id), -fee, TransactionKind::CreditUsed, "Game fee paid with credit").await {
        Ok(_) => Ok(true),
        Err(Error::InsufficientCredit { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

#[rocket::get("/me/credits")]
pub(crate) async fn history(pool: &State<PgPool>, me: Profile) -> Result<Json<Vec<CreditTransaction>>, Error> {
    let mut transaction = pool.begin().await?;
    let transactions = sqlx::query_as("SELECT * FROM credit_transactions WHERE player_id = $1 ORDER BY created_at DESC")
        .bind(me.id)
        .fetch_all(&mut *transaction).await?;
    transaction.commit().await?;
    Ok(Json(transactions))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub(crate) struct RefundRequest {
    pub(crate) id: Uuid,
    pub(crate) player_id: Uuid,
    /// `None` for a withdrawal of the credit balance.
    pub(crate) game_id: Option<Uuid>,
    pub(crate) amount: i32,
    pub(crate) reason: Option<String>,
    pub(crate) status: RefundStatus,
    pub(crate) admin_notes: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) resolved_at: Option<DateTime<Utc>>,
}

impl RefundRequest {
    async fn lock(transaction: &mut Transaction<'_, Postgres>, id: Uuid) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM refund_requests WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **transaction).await
    }

    async fn resolve(&mut self, transaction: &mut Transaction<'_, Postgres>, status: RefundStatus, admin_notes: Option<String>) -> Result<(), Error> {
        if self.status != RefundStatus::Pending {
            return Err(Error::AlreadyResolved(self.status))
        }
        let resolved_at = Utc::now();
        sqlx::query("UPDATE refund_requests SET status = $1, admin_notes = $2, resolved_at = $3 WHERE id = $4")
            .bind(status)
            .bind(&admin_notes)
            .bind(resolved_at)
            .bind(self.id)
            .execute(&mut **transaction).await?;
        self.status = status;
        self.admin_notes = admin_notes;
        self.resolved_at = Some(resolved_at);
        Ok(())
    }

    fn note(&self) -> &str {
        self.admin_notes.as_deref().or(self.reason.as_deref()).unwrap_or("no reason provided")
    }
}

#[derive(Deserialize)]
pub(crate) struct RefundForm {
    /// Refund of a game fee. Omit to withdraw credit balance instead.
    game_id: Option<Uuid>,
    /// Only for balance withdrawals. Defaults to the whole balance.
    amount: Option<i32>,
    reason: Option<String>,
}

#[rocket::post("/me/refunds", data = "<form>")]
pub(crate) async fn request_refund(pool: &State<PgPool>, config: &State<Config>, me: Profile, form: Json<RefundForm>) -> Result<Json<RefundRequest>, Error> {
    let RefundForm { game_id, amount, reason } = form.into_inner();
    let mut transaction = pool.begin().await?;
    let amount = if let Some(game_id) = game_id {
        let paid = sqlx::query_scalar::<_, bool>(&format!("SELECT EXISTS (SELECT 1 FROM game_players WHERE game_id = $1 AND player_id = $2 AND payment_status IN {PAID_BY_TRANSFER})"))
            .bind(game_id)
            .bind(me.id)
            .fetch_one(&mut *transaction).await?;
        if !paid {
            return Err(Error::NotPaid)
        }
        let requested = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM refund_requests WHERE game_id = $1 AND player_id = $2 AND status <> 'denied')")
            .bind(game_id)
            .bind(me.id)
            .fetch_one(&mut *transaction).await?;
        if requested {
            return Err(Error::AlreadyRequested)
        }
        config.game.fee_cents
    } else {
        let amount = amount.unwrap_or(me.credit_balance);
        if amount <= 0 {
            return Err(Error::InvalidAmount)
        }
        if amount > me.credit_balance {
            return Err(Error::InsufficientCredit { balance: Cents(me.credit_balance), amount: Cents(amount) })
        }
        amount
    };
    let request = sqlx::query_as::<_, RefundRequest>("INSERT INTO refund_requests (id, player_id, game_id, amount, reason) VALUES ($1, $2, $3, $4, $5) RETURNING *")
        .bind(Uuid::new_v4())
        .bind(me.id)
        .bind(game_id)
        .bind(amount)
        .bind(&reason)
        .fetch_one(&mut *transaction).await?;
    sqlx::query("INSERT INTO credit_transactions (id, player_id, game_id, amount, kind, notes) VALUES ($1, $2, $3, 0, 'refund_requested', $4)")
        .bind(Uuid::new_v4())
        .bind(me.id)
        .bind(game_id)
        .bind(format!("Requested {}", Cents(amount)))
        .execute(&mut *transaction).await?;
    transaction.commit().await?;
    Ok(Json(request))
}

#[derive(Serialize, sqlx::FromRow)]
pub(crate) struct RefundEntry {
    #[serde(flatten)]
    #[sqlx(flatten)]
    request: RefundRequest,
    display_name: String,
    email: String,
    game_date: Option<NaiveDate>,
}

#[rocket::get("/admin/refunds")]
pub(crate) async fn refunds(pool: &State<PgPool>, _admin: Admin) -> Result<Json<Vec<RefundEntry>>, Error> {
    let mut transaction = pool.begin().await?;
    let refunds = sqlx::query_as("
        SELECT refund_requests.*, profiles.display_name, profiles.email, games.game_date
        FROM refund_requests
        JOIN profiles ON profiles.id = refund_requests.player_id
        LEFT JOIN games ON games.id = refund_requests.game_id
        ORDER BY refund_requests.status = 'pending' DESC, refund_requests.created_at DESC
    ")
        .fetch_all(&mut *transaction).await?;
    transaction.commit().await?;
    Ok(Json(refunds))
}

#[derive(Default, Deserialize)]
pub(crate) struct ResolveForm {
    admin_notes: Option<String>,
}

/// Approves a pending refund request. A game refund turns the fee into credit and takes the
/// registration back to unpaid, so the fee can't be returned again on withdrawal.
pub(crate) async fn approve(transaction: &mut Transaction<'_, Postgres>, id: Uuid, admin_notes: Option<String>) -> Result<RefundRequest, Error> {
    let mut request = RefundRequest::lock(transaction, id).await?.ok_or(Error::NotFound)?;
    request.resolve(transaction, RefundStatus::Approved, admin_notes).await?;
    if let Some(game_id) = request.game_id {
        let reset = sqlx::query(&format!("UPDATE game_players SET payment_status = 'pending', paid_at = NULL WHERE game_id = $1 AND player_id = $2 AND payment_status IN {PAID_BY_TRANSFER}"))
            .bind(game_id)
            .bind(request.player_id)
            .execute(&mut **transaction).await?
            .rows_affected();
        if reset == 0 {
            // the fee was already returned, e.g. as credit on withdrawal
            return Err(Error::NotPaid)
        }
        record(transaction, request.player_id, Some(game_id), request.amount, TransactionKind::CreditAdded, &format!("Game refund approved: {}", request.note())).await?;
    } else {
        record(transaction, request.player_id, None, -request.amount, TransactionKind::RefundCompleted, &format!("Withdrawal sent: {}", request.note())).await?;
    }
    Ok(request)
}

#[rocket::post("/admin/refunds/<id>/approve", data = "<form>")]
pub(crate) async fn approve_refund(pool: &State<PgPool>, admin: Admin, id: Uuid, form: Option<Json<ResolveForm>>) -> Result<Json<RefundRequest>, Error> {
    let ResolveForm { admin_notes } = form.map(Json::into_inner).unwrap_or_default();
    let mut transaction = pool.begin().await?;
    let request = approve(&mut transaction, id, admin_notes).await?;
    transaction.commit().await?;
    log::info!("{} approved refund request {} for {}", admin.0.display_name, request.id, Cents(request.amount));
    Ok(Json(request))
}

#[rocket::post("/admin/refunds/<id>/deny", data = "<form>")]
pub(crate) async fn deny_refund(pool: &State<PgPool>, admin: Admin, id: Uuid, form: Option<Json<ResolveForm>>) -> Result<Json<RefundRequest>, Error> {
    let ResolveForm { admin_notes } = form.map(Json::into_inner).unwrap_or_default();
    let mut transaction = pool.begin().await?;
    let mut request = RefundRequest::lock(&mut transaction, id).await?.ok_or(Error::NotFound)?;
    request.resolve(&mut transaction, RefundStatus::Denied, admin_notes).await?;
    transaction.commit().await?;
    log::info!("{} denied refund request {}", admin.0.display_name, request.id);
    Ok(Json(request))
}
