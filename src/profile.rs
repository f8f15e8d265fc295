use {
    lazy_regex::regex_is_match,
    rocket::{
        http::{
            Cookie,
            CookieJar,
            SameSite,
        },
        request::{
            FromRequest,
            Outcome,
        },
    },
    crate::{
        http::error_response,
        prelude::*,
    },
};

/// Skill rating assumed for players an admin hasn't rated yet.
pub(crate) const DEFAULT_SKILL_RATING: i16 = 3;

const SESSION_COOKIE: &str = "session";

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("display name must not be empty")]
    EmptyDisplayName,
    #[error("a profile with this email address already exists")]
    EmailTaken,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("skill rating must be between 1 and 5, got {0}")]
    InvalidSkillRating(i16),
    #[error("this account has been deactivated")]
    Inactive,
    #[error("admin access required")]
    NotAdmin,
    #[error("no such player")]
    NotFound,
    #[error("only super admins can change roles")]
    NotSuperAdmin,
    #[error("sign in required")]
    Unauthenticated,
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = match self {
            Self::Sql(_) => Status::InternalServerError,
            Self::EmptyDisplayName | Self::InvalidEmail | Self::InvalidSkillRating(_) => Status::BadRequest,
            Self::EmailTaken => Status::Conflict,
            Self::Inactive | Self::NotAdmin | Self::NotSuperAdmin => Status::Forbidden,
            Self::NotFound => Status::NotFound,
            Self::Unauthenticated => Status::Unauthorized,
        };
        error_response(request, status, &self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum Role {
    Player,
    Admin,
    SuperAdmin,
}

impl Role {
    pub(crate) fn is_admin(&self) -> bool {
        match self {
            Self::Player => false,
            Self::Admin | Self::SuperAdmin => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub(crate) struct Profile {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) display_name: String,
    pub(crate) whatsapp_name: String,
    pub(crate) is_permanent_keeper: bool,
    pub(crate) skill_rating: Option<i16>,
    /// In cents.
    pub(crate) credit_balance: i32,
    pub(crate) withdrawal_strikes: i32,
    pub(crate) strike_cooldown_until: Option<DateTime<Utc>>,
    pub(crate) total_games_played: i32,
    pub(crate) times_started_as_sub: i32,
    pub(crate) times_started_as_keeper: i32,
    pub(crate) weeks_since_last_played: i32,
    pub(crate) role: Role,
    pub(crate) is_active: bool,
    pub(crate) created_at: DateTime<Utc>,
}

impl Profile {
    pub(crate) async fn from_id(transaction: &mut Transaction<'_, Postgres>, id: Uuid) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **transaction).await
    }

    async fn from_session(transaction: &mut Transaction<'_, Postgres>, token: Uuid) -> sqlx::Result<Option<Self>> {
        sqlx::query_as("SELECT profiles.* FROM sessions JOIN profiles ON profiles.id = sessions.profile_id WHERE token = $1")
            .bind(token)
            .fetch_optional(&mut **transaction).await
    }

    pub(crate) async fn all(transaction: &mut Transaction<'_, Postgres>) -> sqlx::Result<Vec<Self>> {
        sqlx::query_as("SELECT * FROM profiles ORDER BY display_name")
            .fetch_all(&mut **transaction).await
    }
}

async fn new_session(transaction: &mut Transaction<'_, Postgres>, profile_id: Uuid) -> sqlx::Result<Uuid> {
    let token = Uuid::new_v4();
    sqlx::query("INSERT INTO sessions (token, profile_id) VALUES ($1, $2)")
        .bind(token)
        .bind(profile_id)
        .execute(&mut **transaction).await?;
    Ok(token)
}

fn session_token(request: &Request<'_>) -> Option<Uuid> {
    if let Some(header) = request.headers().get_one("Authorization") {
        header.strip_prefix("Bearer ")?.trim().parse().ok()
    } else {
        request.cookies().get_private(SESSION_COOKIE)?.value().parse().ok()
    }
}

/// The session token a request was authenticated with, from the `Authorization` header or the session cookie.
pub(crate) struct SessionToken(Uuid);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionToken {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match session_token(request) {
            Some(token) => Outcome::Success(Self(token)),
            None => Outcome::Error((Status::Unauthorized, Error::Unauthenticated)),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Profile {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(token) = session_token(request) else { return Outcome::Error((Status::Unauthorized, Error::Unauthenticated)) };
        let Some(pool) = request.rocket().state::<PgPool>() else { return Outcome::Error((Status::InternalServerError, Error::Unauthenticated)) };
        let profile = match pool.begin().await {
            Ok(mut transaction) => Self::from_session(&mut transaction, token).await,
            Err(e) => Err(e),
        };
        match profile {
            Ok(Some(profile)) if profile.is_active => Outcome::Success(profile),
            Ok(Some(_)) => Outcome::Error((Status::Forbidden, Error::Inactive)),
            Ok(None) => Outcome::Error((Status::Unauthorized, Error::Unauthenticated)),
            Err(e) => Outcome::Error((Status::InternalServerError, Error::Sql(e))),
        }
    }
}

/// A signed-in profile with the admin or super admin role.
pub(crate) struct Admin(pub(crate) Profile);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.guard::<Profile>().await {
            Outcome::Success(profile) if profile.role.is_admin() => Outcome::Success(Self(profile)),
            Outcome::Success(_) => Outcome::Error((Status::Forbidden, Error::NotAdmin)),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

fn validate_display_name(display_name: &str) -> Result<&str, Error> {
    let display_name = display_name.trim();
    if display_name.is_empty() { Err(Error::EmptyDisplayName) } else { Ok(display_name) }
}

/// WhatsApp names are stored without the leading `@` used when mentioning them.
fn normalize_whatsapp_name<'a>(whatsapp_name: Option<&'a str>, display_name: &'a str) -> &'a str {
    whatsapp_name.map(|name| name.trim().trim_start_matches('@').trim()).filter(|name| !name.is_empty()).unwrap_or(display_name)
}

fn validate_skill_rating(rating: Option<i16>) -> Result<Option<i16>, Error> {
    match rating {
        Some(rating) if !(1..=5).contains(&rating) => Err(Error::InvalidSkillRating(rating)),
        _ => Ok(rating),
    }
}

#[derive(Deserialize)]
pub(crate) struct SignupForm {
    email: String,
    display_name: String,
    #[serde(default)]
    whatsapp_name: Option<String>,
    #[serde(default)]
    is_permanent_keeper: bool,
}

#[derive(Serialize)]
pub(crate) struct Session {
    profile: Profile,
    token: Uuid,
}

#[rocket::post("/signup", data = "<form>")]
pub(crate) async fn signup(pool: &State<PgPool>, cookies: &CookieJar<'_>, form: Json<SignupForm>) -> Result<Json<Session>, Error> {
    let email = form.email.trim().to_lowercase();
    if !regex_is_match!(r"^[^@\s]+@[^@\s]+\.[^@\s]+$", &email) {
        return Err(Error::InvalidEmail)
    }
    let display_name = validate_display_name(&form.display_name)?;
    let whatsapp_name = normalize_whatsapp_name(form.whatsapp_name.as_deref(), display_name);
    let mut transaction = pool.begin().await?;
    let taken = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM profiles WHERE email = $1)")
        .bind(&email)
        .fetch_one(&mut *transaction).await?;
    if taken {
        return Err(Error::EmailTaken)
    }
    let profile = sqlx::query_as::<_, Profile>("INSERT INTO profiles (id, email, display_name, whatsapp_name, is_permanent_keeper) VALUES ($1, $2, $3, $4, $5) RETURNING *")
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(display_name)
        .bind(whatsapp_name)
        .bind(form.is_permanent_keeper)
        .fetch_one(&mut *transaction).await?;
    let token = new_session(&mut transaction, profile.id).await?;
    transaction.commit().await?;
    log::info!("new player signed up: {} ({})", profile.display_name, profile.id);
    cookies.add_private(Cookie::build((SESSION_COOKIE, token.to_string())).http_only(true).same_site(SameSite::Lax));
    Ok(Json(Session { profile, token }))
}

#[rocket::get("/me")]
pub(crate) fn me(me: Profile) -> Json<Profile> {
    Json(me)
}

#[derive(Deserialize)]
pub(crate) struct ProfileUpdate {
    display_name: Option<String>,
    whatsapp_name: Option<String>,
    is_permanent_keeper: Option<bool>,
}

#[rocket::patch("/me", data = "<form>")]
pub(crate) async fn update_me(pool: &State<PgPool>, me: Profile, form: Json<ProfileUpdate>) -> Result<Json<Profile>, Error> {
    let display_name = match form.display_name {
        Some(ref display_name) => validate_display_name(display_name)?,
        None => &me.display_name,
    };
    let whatsapp_name = match form.whatsapp_name {
        Some(ref whatsapp_name) => normalize_whatsapp_name(Some(whatsapp_name), display_name),
        None => &me.whatsapp_name,
    };
    let mut transaction = pool.begin().await?;
    let profile = sqlx::query_as::<_, Profile>("UPDATE profiles SET display_name = $1, whatsapp_name = $2, is_permanent_keeper = $3 WHERE id = $4 RETURNING *")
        .bind(display_name)
        .bind(whatsapp_name)
        .bind(form.is_permanent_keeper.unwrap_or(me.is_permanent_keeper))
        .bind(me.id)
        .fetch_one(&mut *transaction).await?;
    transaction.commit().await?;
    Ok(Json(profile))
}

#[rocket::post("/logout")]
pub(crate) async fn logout(pool: &State<PgPool>, cookies: &CookieJar<'_>, _me: Profile, token: SessionToken) -> Result<Status, Error> {
    let SessionToken(token) = token;
    sqlx::query("DELETE FROM sessions WHERE token = $1").bind(token).execute(&**pool).await?;
    cookies.remove_private(SESSION_COOKIE);
    Ok(Status::NoContent)
}

#[rocket::get("/admin/players")]
pub(crate) async fn players(pool: &State<PgPool>, _admin: Admin) -> Result<Json<Vec<Profile>>, Error> {
    let mut transaction = pool.begin().await?;
    let players = Profile::all(&mut transaction).await?;
    transaction.commit().await?;
    Ok(Json(players))
}

#[derive(Deserialize)]
pub(crate) struct SkillRatingForm {
    rating: Option<i16>,
}

#[rocket::post("/admin/players/<id>/skill", data = "<form>")]
pub(crate) async fn set_skill_rating(pool: &State<PgPool>, admin: Admin, id: Uuid, form: Json<SkillRatingForm>) -> Result<Json<Profile>, Error> {
    let Admin(admin) = admin;
    let rating = validate_skill_rating(form.rating)?;
    let mut transaction = pool.begin().await?;
    let profile = sqlx::query_as::<_, Profile>("UPDATE profiles SET skill_rating = $1 WHERE id = $2 RETURNING *")
        .bind(rating)
        .bind(id)
        .fetch_optional(&mut *transaction).await?
        .ok_or(Error::NotFound)?;
    transaction.commit().await?;
    log::info!("{} set skill rating of {} to {rating:?}", admin.display_name, profile.display_name);
    Ok(Json(profile))
}

#[derive(Deserialize)]
pub(crate) struct RoleForm {
    role: Role,
}

#[rocket::post("/admin/players/<id>/role", data = "<form>")]
pub(crate) async fn set_role(pool: &State<PgPool>, admin: Admin, id: Uuid, form: Json<RoleForm>) -> Result<Json<Profile>, Error> {
    let Admin(admin) = admin;
    if admin.role != Role::SuperAdmin {
        return Err(Error::NotSuperAdmin)
    }
    let mut transaction = pool.begin().await?;
    let profile = sqlx::query_as::<_, Profile>("UPDATE profiles SET role = $1 WHERE id = $2 RETURNING *")
        .bind(form.role)
        .bind(id)
        .fetch_optional(&mut *transaction).await?
        .ok_or(Error::NotFound)?;
    transaction.commit().await?;
    log::info!("{} changed role of {} to {:?}", admin.display_name, profile.display_name, profile.role);
    Ok(Json(profile))
}

#[derive(Deserialize)]
pub(crate) struct ActiveForm {
    active: bool,
}

#[rocket::post("/admin/players/<id>/active", data = "<form>")]
pub(crate) async fn set_active(pool: &State<PgPool>, _admin: Admin, id: Uuid, form: Json<ActiveForm>) -> Result<Json<Profile>, Error> {
    let mut transaction = pool.begin().await?;
    let profile = sqlx::query_as::<_, Profile>("UPDATE profiles SET is_active = $1 WHERE id = $2 RETURNING *")
        .bind(form.active)
        .bind(id)
        .fetch_optional(&mut *transaction).await?
        .ok_or(Error::NotFound)?;
    if !form.active {
        sqlx::query("DELETE FROM sessions WHERE profile_id = $1").bind(id).execute(&mut *transaction).await?;
    }
    transaction.commit().await?;
    Ok(Json(profile))
}

/// Issues a session token for a player, for sign-in links handed out by the identity provider.
#[rocket::post("/admin/players/<id>/token")]
pub(crate) async fn issue_token(pool: &State<PgPool>, _admin: Admin, id: Uuid) -> Result<Json<Session>, Error> {
    let mut transaction = pool.begin().await?;
    let profile = Profile::from_id(&mut transaction, id).await?.ok_or(Error::NotFound)?;
    let token = new_session(&mut transaction, profile.id).await?;
    transaction.commit().await?;
    Ok(Json(Session { profile, token }))
}
