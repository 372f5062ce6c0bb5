//! Application-level configuration loading, including the table rules and the episode list.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SUNNY_DECK_BACK_CONFIG_PATH";
const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    rules: GameRules,
    persist_debounce: Duration,
}

/// Table rules applied by the lobby state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRules {
    /// Maximum number of players allowed in one lobby.
    pub max_players: usize,
    /// Drinks a Golden God may refuse or redirect per game.
    pub golden_god_redirects: u32,
    /// Tiny-hands sips Uncle Jack may take per game.
    pub uncle_jack_uses: u32,
    /// Denials Cricket gets before a confession is required.
    pub cricket_denials: u32,
    /// Gender-card passes a non-binary player may take per game.
    pub non_binary_passes: u32,
    /// Total Mac actions (bodyguard, protein share, challenges) per game.
    pub mac_actions: u32,
    /// Rounds a player must win to take a rock-paper-scissors match.
    pub rps_wins_needed: u8,
    /// Draws the dayman/nightman pairing lasts.
    pub nightman_rounds: u32,
    /// Seconds the nightman has to answer a call-out.
    pub nightman_response_secs: u64,
    /// Episode titles accepted by the episodes word game.
    pub episodes: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in rules.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        episodes = app_config.rules.episodes.len(),
                        max_players = app_config.rules.max_players,
                        "loaded table rules from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Rules enforced by every lobby.
    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Quiet period the persistence queue waits for before flushing a lobby.
    pub fn persist_debounce(&self) -> Duration {
        self.persist_debounce
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rules: GameRules::default(),
            persist_debounce: Duration::from_millis(DEFAULT_PERSIST_DEBOUNCE_MS),
        }
    }
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_players: 10,
            golden_god_redirects: 3,
            uncle_jack_uses: 3,
            cricket_denials: 3,
            non_binary_passes: 4,
            mac_actions: 5,
            rps_wins_needed: 2,
            nightman_rounds: 3,
            nightman_response_secs: 10,
            episodes: default_episodes(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    rules: RawRules,
    persist_debounce_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// Partial rule overrides; every missing key keeps its built-in value.
struct RawRules {
    max_players: Option<usize>,
    golden_god_redirects: Option<u32>,
    uncle_jack_uses: Option<u32>,
    cricket_denials: Option<u32>,
    non_binary_passes: Option<u32>,
    mac_actions: Option<u32>,
    rps_wins_needed: Option<u8>,
    nightman_rounds: Option<u32>,
    nightman_response_secs: Option<u64>,
    episodes: Option<Vec<String>>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = GameRules::default();
        let raw = value.rules;
        let rules = GameRules {
            max_players: raw.max_players.unwrap_or(defaults.max_players).max(1),
            golden_god_redirects: raw
                .golden_god_redirects
                .unwrap_or(defaults.golden_god_redirects),
            uncle_jack_uses: raw.uncle_jack_uses.unwrap_or(defaults.uncle_jack_uses),
            cricket_denials: raw.cricket_denials.unwrap_or(defaults.cricket_denials),
            non_binary_passes: raw.non_binary_passes.unwrap_or(defaults.non_binary_passes),
            mac_actions: raw.mac_actions.unwrap_or(defaults.mac_actions),
            rps_wins_needed: raw
                .rps_wins_needed
                .unwrap_or(defaults.rps_wins_needed)
                .max(1),
            nightman_rounds: raw.nightman_rounds.unwrap_or(defaults.nightman_rounds),
            nightman_response_secs: raw
                .nightman_response_secs
                .unwrap_or(defaults.nightman_response_secs),
            episodes: raw
                .episodes
                .filter(|list| !list.is_empty())
                .unwrap_or(defaults.episodes),
        };

        Self {
            rules,
            persist_debounce: Duration::from_millis(
                value
                    .persist_debounce_ms
                    .unwrap_or(DEFAULT_PERSIST_DEBOUNCE_MS),
            ),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in episode list shipped with the binary.
fn default_episodes() -> Vec<String> {
    [
        "The Gang Gets Racist",
        "Charlie Wants an Abortion",
        "Underage Drinking: A National Concern",
        "Charlie Has Cancer",
        "Gun Fever",
        "The Gang Finds a Dead Guy",
        "Charlie Gets Crippled",
        "The Gang Goes Jihad",
        "The Gang Gives Back",
        "Dennis and Dee Go on Welfare",
        "Mac Bangs Dennis' Mom",
        "Hundred Dollar Baby",
        "The Gang Exploits a Miracle",
        "Dennis Looks Like a Registered Sex Offender",
        "Mac is a Serial Killer",
        "The Gang Solves the North Korea Situation",
        "The Gang Gets Invincible",
        "Dennis Reynolds: An Erotic Life",
        "Dee Reynolds: Shaping America's Youth",
        "Mac and Charlie: White Trash",
        "Dee Gets Audited",
        "The Gang Gets Held Hostage",
        "The Gang Finds a Dumpster Baby",
        "The Gang Gets Extreme: Home Makeover Edition",
        "America's Next Top Paddy's Billboard Model Contest",
        "The Aluminum Monster vs. Fatty Magoo",
        "Who Pooped the Bed?",
        "The Nightman Cometh",
        "Mac and Dennis: Manhunters",
        "The Gang Hits the Road",
        "The Great Recession",
        "The Gang Gets a New Member",
        "Mac and Charlie Write a Movie",
        "The Gang Cracks the Liberty Bell",
        "The Gang Wrestles for the Troops",
        "The Gang Reignites the Rivalry",
        "Paddy's Pub: Home of the Original Kitten Mittens",
        "Mac and Dennis Break Up",
        "The D.E.N.N.I.S. System",
        "The Gang Gives Frank an Intervention",
        "Dee Gives Birth",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}
