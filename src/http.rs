use {
    base64::engine::{
        Engine as _,
        general_purpose::STANDARD as BASE64,
    },
    rocket::{
        Rocket,
        config::SecretKey,
    },
    crate::{
        balance,
        credit,
        game,
        lineup,
        message,
        prelude::*,
        profile,
        registration,
        strike,
    },
};

#[derive(Responder)]
pub(crate) enum StatusOrError<E> {
    Status(Status),
    Err(E),
}

impl<E> From<Status> for StatusOrError<E> {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

/// Responds with the given status and the error's message as a plain text body.
pub(crate) fn error_response<'r>(request: &'r Request<'_>, status: Status, e: &impl fmt::Display) -> rocket::response::Result<'static> {
    if status == Status::InternalServerError {
        log::error!("internal server error: {e}");
    }
    (status, e.to_string()).respond_to(request)
}

#[derive(Serialize)]
struct Index {
    name: &'static str,
    version: &'static str,
    location: String,
    upcoming_game: Option<game::Game>,
}

#[rocket::get("/")]
async fn index(pool: &State<PgPool>, config: &State<Config>) -> Result<Json<Index>, game::Error> {
    let mut transaction = pool.begin().await?;
    let upcoming_game = game::Game::upcoming(&mut transaction, config.game.time_zone).await?;
    transaction.commit().await?;
    Ok(Json(Index {
        name: "Drop-in FC",
        version: env!("CARGO_PKG_VERSION"),
        location: config.game.location.clone(),
        upcoming_game,
    }))
}

#[rocket::get("/robots.txt")]
fn robots_txt() -> RawText<&'static str> {
    RawText("User-agent: *\nDisallow: /\n")
}

#[rocket::catch(404)]
fn not_found() -> RawText<&'static str> {
    RawText("not found")
}

#[rocket::catch(401)]
fn unauthorized() -> RawText<&'static str> {
    RawText("sign in required")
}

#[rocket::catch(403)]
fn forbidden() -> RawText<&'static str> {
    RawText("admin access required")
}

pub(crate) async fn rocket(pool: PgPool, config: Config, port: u16) -> Result<Rocket<rocket::Ignite>, crate::Error> {
    Ok(rocket::custom(rocket::Config::figment().merge(rocket::Config {
        secret_key: SecretKey::from(&BASE64.decode(&config.secret_key)?),
        log_level: rocket::config::LogLevel::Critical,
        ..rocket::Config::default()
    }).merge(("port", port)))
    .mount("/", rocket::routes![
        index,
        robots_txt,
        credit::history,
        credit::request_refund,
        credit::refunds,
        credit::approve_refund,
        credit::deny_refund,
        game::upcoming,
        game::get,
        game::spots,
        game::create,
        game::advance,
        game::cancel,
        game::complete,
        game::calendar,
        lineup::export,
        message::generate,
        message::kinds,
        profile::signup,
        profile::me,
        profile::update_me,
        profile::logout,
        profile::players,
        profile::set_skill_rating,
        profile::set_role,
        profile::set_active,
        profile::issue_token,
        registration::roster,
        registration::confirm,
        registration::decline,
        registration::join,
        registration::waitlist_position,
        registration::mark_paid,
        registration::withdraw,
        registration::verify_payment,
        registration::reject_payment,
        registration::remove_nonpayment,
        registration::admin_add,
        registration::admin_remove,
        balance::generate,
        balance::confirm,
        strike::mine,
        strike::settings,
        strike::update_settings,
        strike::cooldowns,
        strike::add,
        strike::clear,
    ])
    .register("/", rocket::catchers![
        not_found,
        unauthorized,
        forbidden,
    ])
    .manage(config)
    .manage(pool)
    .ignite().await?)
}
