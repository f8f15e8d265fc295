//! Splitting the confirmed, paid players of a game into two skill-balanced teams.

use {
    enum_iterator::{
        Sequence,
        all,
    },
    rand::{
        Rng,
        seq::SliceRandom as _,
    },
    crate::{
        config::GameConfig,
        game::{
            self,
            Game,
            GameStatus,
        },
        http::error_response,
        prelude::*,
        profile::DEFAULT_SKILL_RATING,
        registration::{
            CONFIRMED,
            PAID,
        },
    },
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Game(#[from] game::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error("player {0} is assigned more than once")]
    DuplicatePlayer(Uuid),
    #[error("{team} team needs exactly one starting keeper, got {count}")]
    KeeperCount {
        team: Team,
        count: usize,
    },
    #[error("player {0} is not a confirmed, paid player of this game")]
    NotEligible(Uuid),
    #[error("need at least 2 confirmed, paid players, got {0}")]
    NotEnoughPlayers(usize),
    #[error("no such game")]
    NotFound,
    #[error("teams can't be changed for a game that is {0:?}")]
    Finished(GameStatus),
    #[error("at most {capacity} players fit on two teams, got {count}")]
    TooManyPlayers {
        count: usize,
        capacity: usize,
    },
    #[error("player {0} has no team assignment")]
    Unassigned(Uuid),
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        match self {
            Self::Game(e) => e.respond_to(request),
            Self::Sql(_) => error_response(request, Status::InternalServerError, &self),
            Self::NotFound => error_response(request, Status::NotFound, &self),
            Self::Finished(_) => error_response(request, Status::Conflict, &self),
            Self::DuplicatePlayer(_) | Self::KeeperCount { .. } | Self::NotEligible(_) | Self::NotEnoughPlayers(_) | Self::TooManyPlayers { .. } | Self::Unassigned(_) => error_response(request, Status::BadRequest, &self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Sequence, sqlx::Type)]
#[sqlx(type_name = "team_name", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum Team {
    Dark,
    Light,
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dark => write!(f, "Dark"),
            Self::Light => write!(f, "Light"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize, sqlx::Type)]
#[sqlx(type_name = "position_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum Position {
    Keeper,
    Field,
    Sub,
}

/// A player eligible for team assignment.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct Candidate {
    pub(crate) player_id: Uuid,
    pub(crate) skill: i16,
    pub(crate) prefers_keeper: bool,
    pub(crate) times_started_as_sub: i32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Shape {
    pub(crate) players_per_team: usize,
    /// Including the keeper.
    pub(crate) starters_per_team: usize,
}

impl From<&GameConfig> for Shape {
    fn from(config: &GameConfig) -> Self {
        Self {
            players_per_team: config.players_per_team,
            starters_per_team: config.starters_per_team,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct Assignment {
    pub(crate) player_id: Uuid,
    pub(crate) team: Team,
    pub(crate) position: Position,
    pub(crate) is_starting: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Proposal {
    pub(crate) assignments: Vec<Assignment>,
    pub(crate) dark_skill: i32,
    pub(crate) light_skill: i32,
    pub(crate) skill_difference: i32,
}

#[derive(Default)]
struct Side<'a> {
    keeper: Option<&'a Candidate>,
    field: Vec<&'a Candidate>,
}

impl Side<'_> {
    fn len(&self) -> usize {
        usize::from(self.keeper.is_some()) + self.field.len()
    }

    fn skill(&self) -> i32 {
        self.keeper.into_iter().chain(self.field.iter().copied()).map(|candidate| i32::from(candidate.skill)).sum()
    }
}

/// Picks the pair of players whose exchange brings the two sides' skill sums closest together,
/// as long as it strictly improves on the current difference.
fn best_swap(a: &Side<'_>, b: &Side<'_>) -> Option<Swap> {
    let diff = a.skill() - b.skill();
    let mut best = None;
    let mut best_diff = diff.abs();
    let mut consider = |swap, delta: i32| {
        let new_diff = (diff - 2 * delta).abs();
        if new_diff < best_diff {
            best_diff = new_diff;
            best = Some(swap);
        }
    };
    if let (Some(keeper_a), Some(keeper_b)) = (a.keeper, b.keeper) {
        consider(Swap::Keepers, i32::from(keeper_a.skill) - i32::from(keeper_b.skill));
    }
    for (i, player_a) in a.field.iter().enumerate() {
        for (j, player_b) in b.field.iter().enumerate() {
            consider(Swap::Field(i, j), i32::from(player_a.skill) - i32::from(player_b.skill));
        }
    }
    best
}

#[derive(Clone, Copy)]
enum Swap {
    Keepers,
    Field(usize, usize),
}

fn assign_side<'a>(side: Side<'a>, team: Team, starters_per_team: usize, rng: &mut impl Rng, assignments: &mut Vec<Assignment>) {
    let Side { keeper, mut field } = side;
    let size = usize::from(keeper.is_some()) + field.len();
    let num_subs = size.saturating_sub(starters_per_team.max(1));
    // shuffle first so the stable sort breaks ties randomly
    field.shuffle(rng);
    field.sort_by_key(|candidate| candidate.times_started_as_sub);
    if let Some(keeper) = keeper {
        assignments.push(Assignment { player_id: keeper.player_id, team, position: Position::Keeper, is_starting: true });
    }
    let (subs, starters) = field.split_at(num_subs.min(field.len()));
    for starter in starters {
        assignments.push(Assignment { player_id: starter.player_id, team, position: Position::Field, is_starting: true });
    }
    for sub in subs {
        assignments.push(Assignment { player_id: sub.player_id, team, position: Position::Sub, is_starting: false });
    }
}

/// Partitions players into two teams of (nearly) equal size with one keeper each,
/// keeping the difference between the teams' skill sums small.
pub(crate) fn balance_teams(candidates: &[Candidate], shape: Shape, rng: &mut impl Rng) -> Result<Proposal, Error> {
    let capacity = shape.players_per_team * 2;
    if candidates.len() < 2 {
        return Err(Error::NotEnoughPlayers(candidates.len()))
    }
    if candidates.len() > capacity {
        return Err(Error::TooManyPlayers { count: candidates.len(), capacity })
    }
    if let Some(duplicate) = candidates.iter().map(|candidate| candidate.player_id).duplicates().next() {
        return Err(Error::DuplicatePlayer(duplicate))
    }
    let mut pool = candidates.iter().collect_vec();
    pool.shuffle(rng);
    let (flagged, mut others): (Vec<_>, Vec<_>) = pool.into_iter().partition(|candidate| candidate.prefers_keeper);
    let mut flagged = flagged.into_iter();
    let mut keepers = flagged.by_ref().take(2).collect_vec();
    // extra permanent keepers play in the field
    others.extend(flagged);
    while keepers.len() < 2 && let Some(candidate) = others.pop() {
        keepers.push(candidate);
    }
    let mut sides = [Side::default(), Side::default()];
    let room = [candidates.len().div_ceil(2), candidates.len() / 2];
    sides[0].keeper = Some(keepers[0]);
    sides[1].keeper = Some(keepers[1]);
    // stable sort of a shuffled list, so equally skilled players are placed in random order
    others.sort_by_key(|candidate| std::cmp::Reverse(candidate.skill));
    for candidate in others {
        let side = if sides[0].len() >= room[0] {
            1
        } else if sides[1].len() >= room[1] {
            0
        } else if sides[0].skill() <= sides[1].skill() {
            0
        } else {
            1
        };
        sides[side].field.push(candidate);
    }
    let [mut a, mut b] = sides;
    while let Some(swap) = best_swap(&a, &b) {
        match swap {
            Swap::Keepers => std::mem::swap(&mut a.keeper, &mut b.keeper),
            Swap::Field(i, j) => std::mem::swap(&mut a.field[i], &mut b.field[j]),
        }
    }
    let (dark, light) = if rng.random_bool(0.5) { (a, b) } else { (b, a) };
    let dark_skill = dark.skill();
    let light_skill = light.skill();
    let mut assignments = Vec::with_capacity(candidates.len());
    assign_side(dark, Team::Dark, shape.starters_per_team, rng, &mut assignments);
    assign_side(light, Team::Light, shape.starters_per_team, rng, &mut assignments);
    Ok(Proposal {
        assignments,
        dark_skill,
        light_skill,
        skill_difference: (dark_skill - light_skill).abs(),
    })
}

/// Checks a (possibly hand-edited) set of assignments against the game's eligible players.
/// Starting flags are derived from positions: keepers and field players start, subs don't.
pub(crate) fn validate(assignments: Vec<Assignment>, eligible: &[Candidate]) -> Result<Vec<Assignment>, Error> {
    let eligible_ids = eligible.iter().map(|candidate| candidate.player_id).collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    for assignment in &assignments {
        if !eligible_ids.contains(&assignment.player_id) {
            return Err(Error::NotEligible(assignment.player_id))
        }
        if !seen.insert(assignment.player_id) {
            return Err(Error::DuplicatePlayer(assignment.player_id))
        }
    }
    if let Some(missing) = eligible.iter().find(|candidate| !seen.contains(&candidate.player_id)) {
        return Err(Error::Unassigned(missing.player_id))
    }
    for team in all::<Team>() {
        let count = assignments.iter().filter(|assignment| assignment.team == team && assignment.position == Position::Keeper).count();
        if count != 1 {
            return Err(Error::KeeperCount { team, count })
        }
    }
    Ok(assignments.into_iter().map(|assignment| Assignment { is_starting: assignment.position != Position::Sub, ..assignment }).collect())
}

/// Confirmed players of a game who have paid (or marked their payment as sent).
pub(crate) async fn eligible(transaction: &mut Transaction<'_, Postgres>, game_id: Uuid) -> sqlx::Result<Vec<Candidate>> {
    sqlx::query_as(&format!("
        SELECT
            game_players.player_id,
            COALESCE(profiles.skill_rating, $2) AS skill,
            profiles.is_permanent_keeper AS prefers_keeper,
            profiles.times_started_as_sub
        FROM game_players JOIN profiles ON profiles.id = game_players.player_id
        WHERE game_players.game_id = $1 AND game_players.status IN {CONFIRMED} AND game_players.payment_status IN {PAID}
        ORDER BY game_players.confirmed_at
    "))
        .bind(game_id)
        .bind(DEFAULT_SKILL_RATING)
        .fetch_all(&mut **transaction).await
}

/// Generates a team proposal for a game without saving it.
pub(crate) async fn propose(transaction: &mut Transaction<'_, Postgres>, config: &GameConfig, game_id: Uuid) -> Result<Proposal, Error> {
    let game = Game::from_id(transaction, game_id).await?.ok_or(Error::NotFound)?;
    if game.status.is_finished() {
        return Err(Error::Finished(game.status))
    }
    let candidates = eligible(transaction, game_id).await?;
    balance_teams(&candidates, Shape::from(config), &mut rand::rng())
}

/// Saves team assignments and announces the teams.
async fn store(transaction: &mut Transaction<'_, Postgres>, game: &mut Game, assignments: &[Assignment]) -> Result<(), Error> {
    sqlx::query("UPDATE game_players SET team = NULL, position = NULL, is_starting = NULL WHERE game_id = $1")
        .bind(game.id)
        .execute(&mut **transaction).await?;
    for assignment in assignments {
        sqlx::query("UPDATE game_players SET team = $1, position = $2, is_starting = $3 WHERE game_id = $4 AND player_id = $5")
            .bind(assignment.team)
            .bind(assignment.position)
            .bind(assignment.is_starting)
            .bind(game.id)
            .bind(assignment.player_id)
            .execute(&mut **transaction).await?;
    }
    sqlx::query("UPDATE games SET teams_announced = TRUE WHERE id = $1")
        .bind(game.id)
        .execute(&mut **transaction).await?;
    game.teams_announced = true;
    if game.status != GameStatus::TeamsAssigned {
        game.set_status(transaction, GameStatus::TeamsAssigned).await?;
    }
    Ok(())
}

#[rocket::post("/admin/games/<id>/teams/generate")]
pub(crate) async fn generate(pool: &State<PgPool>, config: &State<Config>, _admin: Admin, id: Uuid) -> Result<Json<Proposal>, Error> {
    let mut transaction = pool.begin().await?;
    let proposal = propose(&mut transaction, &config.game, id).await?;
    transaction.commit().await?;
    Ok(Json(proposal))
}

#[rocket::post("/admin/games/<id>/teams", data = "<assignments>")]
pub(crate) async fn confirm(pool: &State<PgPool>, admin: Admin, id: Uuid, assignments: Json<Vec<Assignment>>) -> Result<Json<Vec<Assignment>>, Error> {
    let mut transaction = pool.begin().await?;
    let mut game = Game::lock(&mut transaction, id).await?.ok_or(Error::NotFound)?;
    if game.status.is_finished() {
        return Err(Error::Finished(game.status))
    }
    let eligible = eligible(&mut transaction, id).await?;
    let assignments = validate(assignments.into_inner(), &eligible)?;
    store(&mut transaction, &mut game, &assignments).await?;
    transaction.commit().await?;
    log::info!("{} announced teams for game {} ({})", admin.0.display_name, game.id, game.game_date);
    Ok(Json(assignments))
}
