//! Announcements for the WhatsApp group, with players mentioned by their WhatsApp names.

use {
    enum_iterator::{
        Sequence,
        all,
    },
    rocket::request::FromParam,
    crate::{
        balance::{
            Position,
            Team,
        },
        credit::Cents,
        game::Game,
        prelude::*,
        registration::{
            self,
            PaymentStatus,
            PlayerGameStatus,
            RosterEntry,
            roster_of,
        },
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Sequence)]
#[serde(rename_all = "snake_case")]
pub(crate) enum MessageKind {
    Priority,
    SpotsAvailable,
    SpotReopened,
    PaymentReminder,
    Teams,
}

impl MessageKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::SpotsAvailable => "spots_available",
            Self::SpotReopened => "spot_reopened",
            Self::PaymentReminder => "payment_reminder",
            Self::Teams => "teams",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Priority => "Priority invites",
            Self::SpotsAvailable => "Spots available",
            Self::SpotReopened => "Spot reopened after non-payment",
            Self::PaymentReminder => "Payment reminder",
            Self::Teams => "Team lineups",
        }
    }
}

impl<'a> FromParam<'a> for MessageKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        all::<Self>().find(|kind| kind.as_str() == param).ok_or(param)
    }
}

fn mention(entry: &RosterEntry) -> String {
    format!("@{}", entry.whatsapp_name)
}

fn mentions<'a>(entries: impl IntoIterator<Item = &'a RosterEntry>, separator: &str) -> String {
    entries.into_iter().map(mention).join(separator)
}

struct Details<'a> {
    config: &'a Config,
    game: &'a Game,
}

impl Details<'_> {
    fn local(&self, datetime: DateTime<Utc>) -> DateTime<chrono_tz::Tz> {
        datetime.with_timezone(&self.config.game.time_zone)
    }

    fn date(&self) -> String {
        self.game.game_date.format("%A, %B %-d").to_string()
    }

    fn deadline(&self, datetime: DateTime<Utc>) -> String {
        self.local(datetime).format("%A %-I:%M %p").to_string()
    }

    fn block(&self) -> String {
        let kickoff = self.local(self.game.kickoff);
        let end = kickoff + self.config.game.duration();
        format!(
            "📅 {}\n⏰ {}–{}\n📍 {}\n💰 {}",
            self.date(),
            kickoff.format("%-I:%M %p"),
            end.format("%-I:%M %p"),
            self.config.game.location,
            Cents(self.config.game.fee_cents),
        )
    }
}

fn priority(details: &Details<'_>, roster: &[RosterEntry]) -> String {
    let invited = roster.iter().filter(|entry| entry.status == PlayerGameStatus::PriorityInvited);
    format!(
        "🏆 *PRIORITY INVITES: {}*\n\n{}\n\nYou get first dibs on this week's game! Confirm or decline on the dashboard by {}:\n👉 {}\n\n{}\n\nSpots that aren't confirmed by the deadline open up to everyone.",
        details.date(),
        mentions(invited, " "),
        details.deadline(details.game.priority_deadline),
        details.config.dashboard_url,
        details.block(),
    )
}

fn spots_available(details: &Details<'_>, roster: &[RosterEntry]) -> String {
    let filled = roster.iter().filter(|entry| entry.status.holds_spot()).count();
    let available = details.config.game.capacity().saturating_sub(filled);
    format!(
        "⚡ *SPOTS AVAILABLE: {}*\n\n{available} {} open. First come, first served:\n👉 {}\n\n{}\n\nPayment is due by {}.",
        details.date(),
        if available == 1 { "spot is" } else { "spots are" },
        details.config.dashboard_url,
        details.block(),
        details.deadline(details.game.payment_deadline),
    )
}

fn spot_reopened(details: &Details<'_>) -> String {
    format!(
        "🔓 *SPOT REOPENED: {}*\n\nA spot just opened up because a payment didn't come in. First come, first served:\n👉 {}\n\n{}\n\nPayment is due by {}.",
        details.date(),
        details.config.dashboard_url,
        details.block(),
        details.deadline(details.game.payment_deadline),
    )
}

fn payment_reminder(details: &Details<'_>, roster: &[RosterEntry]) -> String {
    let unpaid = roster.iter().filter(|entry| entry.status.is_confirmed() && entry.payment_status == PaymentStatus::Pending);
    let destination = details.config.payment_email.as_deref().map(|email| format!(" to {email}")).unwrap_or_default();
    format!(
        "💰 *PAYMENT REMINDER: {}*\n\n{}\n\nPlease e-transfer {}{destination} by {} and mark it as paid on the dashboard:\n👉 {}\n\nUnpaid spots go to the waitlist after the deadline.",
        details.date(),
        mentions(unpaid, " "),
        Cents(details.config.game.fee_cents),
        details.deadline(details.game.payment_deadline),
        details.config.dashboard_url,
    )
}

fn team_block(roster: &[RosterEntry], team: Team) -> String {
    let players = roster.iter().filter(|entry| entry.team == Some(team)).collect_vec();
    let keeper = players.iter().find(|entry| entry.position == Some(Position::Keeper)).map(|entry| mention(entry)).unwrap_or_else(|| format!("TBD"));
    let field = mentions(players.iter().copied().filter(|entry| entry.position == Some(Position::Field) && entry.is_starting == Some(true)), ", ");
    let subs = mentions(players.iter().copied().filter(|entry| entry.is_starting != Some(true)), ", ");
    let (icon, name) = match team {
        Team::Dark => ("🖤", "DARK"),
        Team::Light => ("🤍", "LIGHT"),
    };
    format!("*{icon} {name} TEAM*\n🧤 Keeper: {keeper}\n⚽ Field: {field}\n🔄 Subs: {subs}")
}

fn teams(details: &Details<'_>, roster: &[RosterEntry]) -> String {
    if !details.game.teams_announced {
        return format!("Teams have not been announced yet.")
    }
    format!(
        "⚽ *TEAM LINEUPS: {}*\n\n{}\n\n{}\n\n{}",
        details.date(),
        details.block(),
        team_block(roster, Team::Dark),
        team_block(roster, Team::Light),
    )
}

pub(crate) fn render(kind: MessageKind, config: &Config, game: &Game, roster: &[RosterEntry]) -> String {
    let details = Details { config, game };
    match kind {
        MessageKind::Priority => priority(&details, roster),
        MessageKind::SpotsAvailable => spots_available(&details, roster),
        MessageKind::SpotReopened => spot_reopened(&details),
        MessageKind::PaymentReminder => payment_reminder(&details, roster),
        MessageKind::Teams => teams(&details, roster),
    }
}

#[rocket::get("/admin/games/<id>/messages/<kind>")]
pub(crate) async fn generate(pool: &State<PgPool>, config: &State<Config>, _admin: Admin, id: Uuid, kind: MessageKind) -> Result<RawText<String>, registration::Error> {
    let mut transaction = pool.begin().await?;
    let game = Game::from_id(&mut transaction, id).await?.ok_or(registration::Error::GameNotFound)?;
    let roster = roster_of(&mut transaction, id).await?;
    transaction.commit().await?;
    Ok(RawText(render(kind, config, &game, &roster)))
}

#[derive(Serialize)]
pub(crate) struct KindInfo {
    kind: MessageKind,
    label: &'static str,
}

#[rocket::get("/admin/messages")]
pub(crate) fn kinds(_admin: Admin) -> Json<Vec<KindInfo>> {
    Json(all::<MessageKind>().map(|kind| KindInfo { kind, label: kind.label() }).collect())
}
