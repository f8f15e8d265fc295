use {
    chrono_tz::Tz,
    smart_default::SmartDefault,
    crate::prelude::*,
};
#[cfg(unix)] use xdg::BaseDirectories;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] Json(#[from] serde_json::Error),
    #[cfg(unix)]
    #[error("missing config file")]
    Missing,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Config {
    pub(crate) secret_key: String,
    #[serde(default)]
    pub(crate) database: Option<ConfigDatabase>,
    #[serde(default)]
    pub(crate) game: GameConfig,
    #[serde(default)]
    pub(crate) strikes: StrikeDefaults,
    /// Public URL of the player dashboard, linked from WhatsApp messages.
    #[serde(default = "default_dashboard_url")]
    pub(crate) dashboard_url: String,
    /// Where players send e-transfers, mentioned in payment reminders.
    #[serde(default)]
    pub(crate) payment_email: Option<String>,
}

fn default_dashboard_url() -> String {
    format!("{}/dashboard", Environment::default().base_uri())
}

impl Config {
    pub(crate) async fn load() -> Result<Self, Error> {
        #[cfg(unix)] {
            if let Some(config_path) = BaseDirectories::new().find_config_file(if Environment::default().is_dev() { "dropin-fc-dev.json" } else { "dropin-fc.json" }) {
                Ok(serde_json::from_slice(&tokio::fs::read(config_path).await?)?)
            } else {
                Err(Error::Missing)
            }
        }
        #[cfg(windows)] {
            Ok(serde_json::from_slice(&tokio::fs::read("cfg/dropin-fc.json").await?)?)
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigDatabase {
    pub(crate) host: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) database: Option<String>,
}

/// The fixed parameters of the weekly game.
#[derive(Debug, Clone, Deserialize, SmartDefault)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct GameConfig {
    #[default = "Windsor Bubble North Vancouver"]
    pub(crate) location: String,
    #[default(Weekday::Tue)]
    pub(crate) weekday: Weekday,
    #[default(NaiveTime::from_hms_opt(20, 30, 0).expect("valid kickoff time"))]
    pub(crate) start_time: NaiveTime,
    #[default = 90]
    pub(crate) duration_minutes: i64,
    #[default(chrono_tz::America::Vancouver)]
    pub(crate) time_zone: Tz,
    /// Game fee in cents.
    #[default = 1500]
    pub(crate) fee_cents: i32,
    #[default = 8]
    pub(crate) players_per_team: usize,
    /// Starters per team, including the keeper.
    #[default = 6]
    pub(crate) starters_per_team: usize,
}

impl GameConfig {
    pub(crate) fn capacity(&self) -> usize {
        self.players_per_team * 2
    }

    pub(crate) fn duration(&self) -> TimeDelta {
        TimeDelta::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, SmartDefault)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct StrikeDefaults {
    #[default = 3]
    pub(crate) strikes_before_cooldown: i32,
    #[default = 3]
    pub(crate) cooldown_weeks: i32,
    /// Withdrawing from a spot this close to kickoff earns a strike.
    #[default = 24]
    pub(crate) late_withdrawal_hours: i64,
}

impl StrikeDefaults {
    pub(crate) fn late_withdrawal_window(&self) -> TimeDelta {
        TimeDelta::hours(self.late_withdrawal_hours)
    }
}
