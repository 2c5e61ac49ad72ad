use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serenity::model::prelude::GatewayIntents;

use crate::{
    client::BotOptions,
    error::{Error, Result},
    events::DEFAULT_MAX_LISTENERS,
    presence::{Activity, PresenceStatus},
    variable::VariableOptions,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Configuration {
    pub authentication: Authentication,
    pub discord: Discord,
    pub variable: VariableOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence: Option<Presence>,
}
impl Default for Configuration {
    fn default() -> Self {
        Self {
            authentication: Authentication {
                discord_token: None,
            },
            discord: Discord::default(),
            variable: VariableOptions::default(),
            presence: None,
        }
    }
}
impl Configuration {
    pub const FILENAME: &str = "config.toml";

    pub fn load() -> Result<Self> {
        Self::load_from(Self::FILENAME)
    }

    /// Reads the config at `path`, falling back to defaults if there is none,
    /// and writes the result back so new options show up in the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if let Ok(file) = std::fs::read_to_string(path) {
            toml::from_str(&file)?
        } else {
            Self::default()
        };
        config.save(path)?;

        Ok(config)
    }

    fn save(&self, path: &Path) -> Result<()> {
        Ok(std::fs::write(path, toml::to_string_pretty(self)?)?)
    }

    pub fn bot_options(&self) -> Result<BotOptions> {
        let token = self
            .authentication
            .discord_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(Error::MissingToken)?;

        Ok(
            BotOptions::new(token, &self.discord.prefix, self.discord.gateway_intents()?)
                .variable(self.variable.clone())
                .events_dir(&self.discord.events_dir),
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Authentication {
    pub discord_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Discord {
    pub prefix: String,
    /// Gateway intent flag names, e.g. "GUILD_MESSAGES"
    pub intents: Vec<String>,
    pub commands_dir: PathBuf,
    pub events_dir: PathBuf,
    /// Print a status line for every loaded handler
    pub show_load: bool,
    /// Listeners per event before a leak warning; 0 disables the warning
    pub max_listeners: usize,
}
impl Default for Discord {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            intents: ["GUILDS", "GUILD_MESSAGES", "MESSAGE_CONTENT"]
                .map(String::from)
                .to_vec(),
            commands_dir: PathBuf::from("scripts/commands"),
            events_dir: PathBuf::from("scripts/events"),
            show_load: true,
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }
}
impl Discord {
    pub fn gateway_intents(&self) -> Result<GatewayIntents> {
        self.intents.iter().try_fold(GatewayIntents::empty(), |intents, name| {
            GatewayIntents::from_name(&name.to_uppercase())
                .map(|intent| intents | intent)
                .ok_or_else(|| Error::UnknownIntent(name.clone()))
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Presence {
    pub interval_secs: u64,
    #[serde(default)]
    pub status: PresenceStatus,
    pub activities: Vec<Activity>,
}
impl Presence {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
