//! Spreadsheet export of the announced teams.

use {
    rocket::http::ContentType,
    crate::{
        balance::{
            Position,
            Team,
        },
        game::Game,
        http::error_response,
        prelude::*,
        registration::{
            RosterEntry,
            roster_of,
        },
    },
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Csv(#[from] csv::Error),
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] Sql(#[from] sqlx::Error),
    #[error(transparent)] Utf8(#[from] std::string::FromUtf8Error),
    #[error("no such game")]
    NotFound,
    #[error("teams for this game haven't been announced yet")]
    NotAnnounced,
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = match self {
            Self::Csv(_) | Self::Io(_) | Self::Sql(_) | Self::Utf8(_) => Status::InternalServerError,
            Self::NotFound => Status::NotFound,
            Self::NotAnnounced => Status::Conflict,
        };
        error_response(request, status, &self)
    }
}

#[derive(Serialize)]
struct Row<'a> {
    team: Team,
    position: Position,
    starting: bool,
    name: &'a str,
    whatsapp: String,
    skill: i16,
}

/// One row per assigned player, ordered by team, then keeper, field players, and subs.
pub(crate) fn to_csv(roster: &[RosterEntry]) -> Result<String, Error> {
    let mut writer = csv::Writer::from_writer(Vec::default());
    let rows = roster.iter()
        .filter_map(|entry| Some((entry, entry.team?, entry.position?)))
        .sorted_by_key(|(entry, team, position)| (*team, *position, entry.display_name.to_lowercase()));
    for (entry, team, position) in rows {
        writer.serialize(Row {
            starting: entry.is_starting.unwrap_or(position != Position::Sub),
            name: &entry.display_name,
            whatsapp: format!("@{}", entry.whatsapp_name),
            skill: entry.skill,
            team, position,
        })?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

#[rocket::get("/admin/games/<id>/lineup.csv")]
pub(crate) async fn export(pool: &State<PgPool>, _admin: Admin, id: Uuid) -> Result<(ContentType, String), Error> {
    let mut transaction = pool.begin().await?;
    let game = Game::from_id(&mut transaction, id).await?.ok_or(Error::NotFound)?;
    if !game.teams_announced {
        return Err(Error::NotAnnounced)
    }
    let roster = roster_of(&mut transaction, id).await?;
    transaction.commit().await?;
    Ok((ContentType::CSV, to_csv(&roster)?))
}

#[cfg(test)]
mod tests {
    use {
        crate::registration::{
            PaymentStatus,
            PlayerGameStatus,
        },
        super::*,
    };

    fn entry(name: &str, skill: i16, assignment: Option<(Team, Position)>) -> RosterEntry {
        RosterEntry {
            player_id: Uuid::new_v4(),
            display_name: name.to_owned(),
            whatsapp_name: name.to_lowercase(),
            status: PlayerGameStatus::Joined,
            payment_status: PaymentStatus::Verified,
            team: assignment.map(|(team, _)| team),
            position: assignment.map(|(_, position)| position),
            is_starting: assignment.map(|(_, position)| position != Position::Sub),
            joined_waitlist_at: None,
            confirmed_at: None,
            skill,
        }
    }

    #[test]
    fn lineup_is_grouped_by_team_and_position() {
        let roster = [
            entry("Zed", 2, Some((Team::Light, Position::Sub))),
            entry("Bea", 4, Some((Team::Dark, Position::Field))),
            entry("Ann", 3, Some((Team::Dark, Position::Field))),
            entry("Kim", 5, Some((Team::Light, Position::Keeper))),
            entry("Dee", 1, Some((Team::Dark, Position::Keeper))),
            entry("Late", 3, None),
        ];
        assert_eq!(to_csv(&roster).unwrap(), "\
team,position,starting,name,whatsapp,skill
dark,keeper,true,Dee,@dee,1
dark,field,true,Ann,@ann,3
dark,field,true,Bea,@bea,4
light,keeper,true,Kim,@kim,5
light,sub,false,Zed,@zed,2
");
    }

    #[test]
    fn names_with_commas_are_quoted() {
        let roster = [entry("Smith, J", 3, Some((Team::Dark, Position::Keeper)))];
        assert!(to_csv(&roster).unwrap().contains("\"Smith, J\""));
    }

    #[test]
    fn empty_lineup_has_no_rows() {
        assert_eq!(to_csv(&[]).unwrap(), "");
    }
}
