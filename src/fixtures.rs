//! Database fixtures for tests running against a fresh schema.

use {
    base64::engine::{
        Engine as _,
        general_purpose::STANDARD as BASE64,
    },
    crate::{
        config::{
            GameConfig,
            StrikeDefaults,
        },
        game::{
            Game,
            GameStatus,
        },
        prelude::*,
        registration::{
            PaymentStatus,
            PlayerGameStatus,
        },
    },
};

/// Config for a game with `players_per_team` players on each side.
pub(crate) fn config(players_per_team: usize) -> Config {
    Config {
        secret_key: BASE64.encode([7u8; 64]),
        database: None,
        game: GameConfig { players_per_team, ..GameConfig::default() },
        strikes: StrikeDefaults::default(),
        dashboard_url: format!("https://dropin-fc.app/dashboard"),
        payment_email: None,
    }
}

pub(crate) async fn player(pool: &PgPool, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO profiles (id, email, display_name, whatsapp_name) VALUES ($1, $2, $3, $3)")
        .bind(id)
        .bind(format!("{}@dropin-fc.test", name.to_lowercase()))
        .bind(name)
        .execute(pool).await.unwrap();
    id
}

/// The game on Tuesday 2026-01-13, already moved to `status`.
pub(crate) async fn game(pool: &PgPool, config: &Config, status: GameStatus) -> Game {
    let mut transaction = pool.begin().await.unwrap();
    let game = Game::create(&mut transaction, &config.game, NaiveDate::from_ymd_opt(2026, 1, 13).unwrap(), &[]).await.unwrap();
    let game = sqlx::query_as::<_, Game>("UPDATE games SET status = $1 WHERE id = $2 RETURNING *")
        .bind(status)
        .bind(game.id)
        .fetch_one(&mut *transaction).await.unwrap();
    transaction.commit().await.unwrap();
    game
}

/// Registers a player directly, as if they had reached `status` at `at`.
pub(crate) async fn register(pool: &PgPool, game: &Game, player_id: Uuid, status: PlayerGameStatus, at: DateTime<Utc>) {
    let joined_waitlist_at = (status == PlayerGameStatus::Waitlist).then_some(at);
    let confirmed_at = status.is_confirmed().then_some(at);
    sqlx::query("INSERT INTO game_players (id, game_id, player_id, status, joined_waitlist_at, confirmed_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
        .bind(Uuid::new_v4())
        .bind(game.id)
        .bind(player_id)
        .bind(status)
        .bind(joined_waitlist_at)
        .bind(confirmed_at)
        .bind(at)
        .execute(pool).await.unwrap();
}

pub(crate) async fn set_payment(pool: &PgPool, game: &Game, player_id: Uuid, payment_status: PaymentStatus) {
    sqlx::query("UPDATE game_players SET payment_status = $1 WHERE game_id = $2 AND player_id = $3")
        .bind(payment_status)
        .bind(game.id)
        .bind(player_id)
        .execute(pool).await.unwrap();
}

pub(crate) async fn status_of(pool: &PgPool, game: &Game, player_id: Uuid) -> (PlayerGameStatus, PaymentStatus) {
    sqlx::query_as("SELECT status, payment_status FROM game_players WHERE game_id = $1 AND player_id = $2")
        .bind(game.id)
        .bind(player_id)
        .fetch_one(pool).await.unwrap()
}

pub(crate) async fn credit_balance(pool: &PgPool, player_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT credit_balance FROM profiles WHERE id = $1")
        .bind(player_id)
        .fetch_one(pool).await.unwrap()
}
