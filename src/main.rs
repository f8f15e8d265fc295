use {
    rocket::Rocket,
    sqlx::{
        ConnectOptions as _,
        postgres::{
            PgConnectOptions,
            PgPoolOptions,
        },
    },
    crate::prelude::*,
};

mod balance;
mod config;
mod credit;
mod deadline;
#[cfg(test)] mod fixtures;
mod game;
mod http;
mod lineup;
mod message;
mod prelude;
mod profile;
mod registration;
mod strike;

#[allow(unused)] // variants only constructed under conditional compilation
#[derive(Default, Clone, Copy)]
enum Environment {
    #[cfg_attr(any(feature = "production", not(any(feature = "dev", feature = "local", debug_assertions))), default)]
    Production,
    #[cfg_attr(any(feature = "dev", all(debug_assertions, not(feature = "production"), not(feature = "local"))), default)]
    Dev,
    #[cfg_attr(feature = "local", default)]
    Local,
}

impl Environment {
    fn is_dev(&self) -> bool {
        match self {
            Self::Production => false,
            Self::Dev => true,
            Self::Local => true,
        }
    }

    fn base_uri(&self) -> &'static str {
        match self {
            Self::Production => "https://dropin-fc.app",
            Self::Dev => "https://dev.dropin-fc.app",
            Self::Local => "http://localhost:24824",
        }
    }

    fn default_port(&self) -> u16 {
        if self.is_dev() { 24824 } else { 24822 }
    }
}

fn parse_port(arg: &str) -> Result<u16, std::num::ParseIntError> {
    match arg {
        "production" => Ok(24822),
        "dev" => Ok(24824),
        _ => arg.parse(),
    }
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Print a team balancing proposal for a game without saving it
    Balance {
        game: Uuid,
    },
    /// Run a single pass of the deadline manager
    Tick,
}

#[derive(clap::Parser)]
#[clap(version)]
struct Args {
    #[clap(long, value_parser = parse_port)]
    port: Option<u16>,
    #[clap(subcommand)]
    subcommand: Option<Subcommand>,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Balance(#[from] balance::Error),
    #[error(transparent)] Base64(#[from] base64::DecodeError),
    #[error(transparent)] Config(#[from] config::Error),
    #[error(transparent)] Deadline(#[from] deadline::Error),
    #[error(transparent)] Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)] Rocket(#[from] rocket::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error(transparent)] Task(#[from] tokio::task::JoinError),
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let Args { port, subcommand } = clap::Parser::parse();
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let default_panic_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        log::error!("Thread panic: {:?}", info);
        default_panic_hook(info)
    }));
    let config = Config::load().await?;
    let mut db_options = PgConnectOptions::default()
        .username("dropin")
        .database(if Environment::default().is_dev() { "dropin_fc_dev" } else { "dropin_fc" })
        .application_name("dropin-fc")
        .log_slow_statements(log::LevelFilter::Warn, Duration::from_secs(10));
    if let Some(ref db_config) = config.database {
        if let Some(ref host) = db_config.host {
            db_options = db_options.host(host);
        }
        if let Some(port) = db_config.port {
            db_options = db_options.port(port);
        }
        if let Some(ref username) = db_config.username {
            db_options = db_options.username(username);
        }
        if let Some(ref password) = db_config.password {
            db_options = db_options.password(password);
        }
        if let Some(ref database) = db_config.database {
            db_options = db_options.database(database);
        }
    }
    let db_pool = PgPoolOptions::default()
        .max_connections(16)
        .connect_with(db_options)
        .await?;
    sqlx::migrate!().run(&db_pool).await?;
    match subcommand {
        Some(Subcommand::Balance { game }) => {
            let mut transaction = db_pool.begin().await?;
            let proposal = balance::propose(&mut transaction, &config.game, game).await?;
            transaction.rollback().await?;
            for assignment in proposal.assignments {
                println!("{} {:?} {:?} starting={}", assignment.player_id, assignment.team, assignment.position, assignment.is_starting);
            }
            println!("skill difference: {}", proposal.skill_difference);
        }
        Some(Subcommand::Tick) => {
            let summary = deadline::tick(&db_pool, &config, Utc::now()).await?;
            println!("{summary}");
        }
        None => {
            let rocket = http::rocket(db_pool.clone(), config.clone(), port.unwrap_or_else(|| Environment::default().default_port())).await?;
            let deadline_task = tokio::spawn(deadline_manager(db_pool, config, rocket.shutdown()));
            let rocket_task = tokio::spawn(rocket.launch());
            let (deadline_res, rocket_res) = tokio::try_join!(deadline_task, rocket_task)?;
            deadline_res?;
            let Rocket { .. } = rocket_res?;
        }
    }
    Ok(())
}

/// Background task enforcing priority and payment deadlines.
async fn deadline_manager(
    db_pool: PgPool,
    config: Config,
    shutdown: rocket::Shutdown,
) -> Result<(), Error> {
    let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match deadline::tick(&db_pool, &config, Utc::now()).await {
                    Ok(summary) => if !summary.is_empty() {
                        log::info!("deadline manager: {summary}");
                    },
                    Err(e) => log::error!("error enforcing deadlines: {e}"),
                }
            }
            _ = shutdown.clone() => break,
        }
    }
    Ok(())
}
