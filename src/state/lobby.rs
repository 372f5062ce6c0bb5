use std::{collections::BTreeMap, fmt, str::FromStr, time::SystemTime};

use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    cards::{Card, shuffled_deck},
    minigames::{RpsGame, Vote, WordGame},
    prompt::ActivePrompt,
    state_machine::{CommandContext, CommandError, GameEventKind, GameLogEntry},
};

/// Stable identifier of a player, serialized as a plain UUID string everywhere.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    SerializeDisplay,
    DeserializeFromStr,
    ToSchema,
)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PlayerId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value).map(Self)
    }
}

/// Self-declared player gender, used by the gender drink cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

/// Character handed out by aces and face cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    GoldenGod,
    Mac,
    Frank,
    Charlie,
    Dee,
    Carmen,
    Maureen,
    Waitress,
    UncleJack,
    Cricket,
    Z,
    Liam,
    Barbara,
    Bruce,
    Gino,
    Gail,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::GoldenGod => "golden-god",
            Role::Mac => "mac",
            Role::Frank => "frank",
            Role::Charlie => "charlie",
            Role::Dee => "dee",
            Role::Carmen => "carmen",
            Role::Maureen => "maureen",
            Role::Waitress => "waitress",
            Role::UncleJack => "uncle-jack",
            Role::Cricket => "cricket",
            Role::Z => "z",
            Role::Liam => "liam",
            Role::Barbara => "barbara",
            Role::Bruce => "bruce",
            Role::Gino => "gino",
            Role::Gail => "gail",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LobbyStatus {
    /// Seats are open; nobody has drawn yet.
    Waiting,
    /// Cards are being drawn.
    Playing,
    /// Every card has been flipped.
    Finished,
}

/// A participant, kept in join order inside the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable identifier handed out on join.
    pub id: PlayerId,
    /// Display name, trimmed and non-empty.
    pub name: String,
    /// Only the host may start or reset the game.
    pub is_host: bool,
    /// Gang member picked by the player, if any.
    pub role: Option<Role>,
    /// Used by the gendered card rules.
    pub gender: Option<Gender>,
    /// When the seat was taken.
    pub joined_at: SystemTime,
}

/// Two players whose drink obligations propagate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Mate {
    /// Player who drew the mate card.
    pub player1: PlayerId,
    /// Partner they picked.
    pub player2: PlayerId,
}

impl Mate {
    /// The other half of the pair, if `player` is in it.
    pub fn partner_of(&self, player: PlayerId) -> Option<PlayerId> {
        if self.player1 == player {
            Some(self.player2)
        } else if self.player2 == player {
            Some(self.player1)
        } else {
            None
        }
    }

    /// Whether `player` is one of the two mates.
    pub fn involves(&self, player: PlayerId) -> bool {
        self.partner_of(player).is_some()
    }
}

/// Charlie's nightman pick, counted down on every draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DaymanNightman {
    /// Charlie, who made the pick.
    pub dayman: PlayerId,
    /// Player who drinks alongside Charlie.
    pub nightman: PlayerId,
    /// Draws left before the pairing lapses.
    pub rounds_remaining: u32,
}

/// Per-player tallies shown on the stats board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerStats {
    /// Cards this player flipped.
    pub cards_drawn: u32,
    /// Aces and face cards among them.
    pub face_cards: u32,
    /// Confirmed drinks, two for a double.
    pub drinks: u32,
    /// Role abilities spent.
    pub actions_used: u32,
}

/// Role ability usage, keyed by player. Values only grow until a reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RoleCounters {
    /// Drinks the Golden God redirected.
    #[schema(value_type = Object)]
    pub golden_god_redirects: BTreeMap<PlayerId, u32>,
    /// Tiny hands sips taken by Uncle Jack.
    #[schema(value_type = Object)]
    pub uncle_jack_uses: BTreeMap<PlayerId, u32>,
    /// Drinks Cricket refused outright.
    #[schema(value_type = Object)]
    pub cricket_denials: BTreeMap<PlayerId, u32>,
    /// Confessions Cricket made to get out of a drink.
    #[schema(value_type = Object)]
    pub cricket_confessions: BTreeMap<PlayerId, u32>,
    /// Drinks passed on by non-binary players.
    #[schema(value_type = Object)]
    pub non_binary_passes: BTreeMap<PlayerId, u32>,
    /// Mac abilities spent.
    #[schema(value_type = Object)]
    pub mac_action_uses: BTreeMap<PlayerId, u32>,
    /// Turn number of each Mac's most recent action.
    #[schema(value_type = Object)]
    pub mac_last_action_turn: BTreeMap<PlayerId, u32>,
    /// Gino's swap votes.
    #[schema(value_type = Object)]
    pub gino_swaps_used: BTreeMap<PlayerId, u32>,
    /// Performances given at Frank's call.
    #[schema(value_type = Object)]
    pub frank_performances: BTreeMap<PlayerId, u32>,
}

impl RoleCounters {
    /// Current value of a counter, zero when absent.
    pub fn get(map: &BTreeMap<PlayerId, u32>, player: PlayerId) -> u32 {
        map.get(&player).copied().unwrap_or(0)
    }

    /// Increment a counter and return the new value.
    pub fn bump(map: &mut BTreeMap<PlayerId, u32>, player: PlayerId) -> u32 {
        let entry = map.entry(player).or_insert(0);
        *entry += 1;
        *entry
    }
}

/// Aggregate for one game session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lobby {
    /// Storage identifier.
    pub id: Uuid,
    /// Six-character join code.
    pub code: String,
    /// Lifecycle stage.
    pub status: LobbyStatus,
    /// The table of 52 cards, face down until drawn.
    pub deck: Vec<Card>,
    /// Players in join order; turn order follows this list.
    pub players: Vec<Player>,
    /// Whose turn it is to draw.
    pub current_player_id: Option<PlayerId>,
    /// Starts at 1 when the game is dealt.
    pub turn_number: u32,
    /// Blocks the next draw until resolved.
    pub active_prompt: Option<ActivePrompt>,
    /// Running word association round.
    pub word_game: Option<WordGame>,
    /// Running rock paper scissors duel.
    pub rps_game: Option<RpsGame>,
    /// Only ever open on top of an active drink prompt.
    pub vote: Option<Vote>,
    /// Current drinking pair.
    pub mate: Option<Mate>,
    /// Charlie's active pick.
    pub dayman_nightman: Option<DaymanNightman>,
    /// Holder of the snail card.
    pub snail_player: Option<PlayerId>,
    /// Per-player tallies.
    pub stats: BTreeMap<PlayerId, PlayerStats>,
    /// Role ability usage.
    pub counters: RoleCounters,
    /// Incremented on every accepted mutation.
    pub version: u64,
    /// When the lobby was opened.
    pub created_at: SystemTime,
    /// Last accepted mutation.
    pub updated_at: SystemTime,
}

impl Lobby {
    /// Open a new lobby whose first member becomes the host.
    pub fn open(code: String, host: PlayerId, ctx: &mut CommandContext<'_>) -> Self {
        let now = ctx.now;
        let mut lobby = Self {
            id: Uuid::new_v4(),
            code,
            status: LobbyStatus::Waiting,
            deck: shuffled_deck(ctx.rng),
            players: Vec::new(),
            current_player_id: None,
            turn_number: 0,
            active_prompt: None,
            word_game: None,
            rps_game: None,
            vote: None,
            mate: None,
            dayman_nightman: None,
            snail_player: None,
            stats: BTreeMap::new(),
            counters: RoleCounters::default(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        lobby.push_player(host, ctx);
        lobby
    }

    /// Look a player up by id.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub(crate) fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    /// Position of a player in join order.
    pub fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|player| player.id == id)
    }

    /// Fail unless `id` belongs to this lobby.
    pub fn require_player(&self, id: PlayerId) -> Result<&Player, CommandError> {
        self.player(id).ok_or(CommandError::UnknownPlayer(id))
    }

    /// Display name of a player, falling back to a placeholder after they left.
    pub fn name_of(&self, id: PlayerId) -> String {
        self.player(id)
            .map(|player| player.name.clone())
            .unwrap_or_else(|| "Someone".to_owned())
    }

    /// Current host, if anyone is left.
    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|player| player.is_host)
    }

    /// Role currently held by a player.
    pub fn role_of(&self, id: PlayerId) -> Option<Role> {
        self.player(id).and_then(|player| player.role)
    }

    /// Whether a prompt, mini-game or vote is gating the next draw.
    pub fn is_blocked(&self) -> bool {
        self.active_prompt.is_some()
            || self.word_game.is_some()
            || self.rps_game.is_some()
            || self.vote.is_some()
    }

    /// Whether every card on the table has been flipped.
    pub fn is_exhausted(&self) -> bool {
        self.deck.iter().all(|card| card.drawn)
    }

    /// Extend a drink set so that the partner of any listed mate drinks too.
    pub fn with_mates(&self, drinkers: impl IntoIterator<Item = PlayerId>) -> Vec<PlayerId> {
        let mut expanded: Vec<PlayerId> = Vec::new();
        for id in drinkers {
            if !expanded.contains(&id) {
                expanded.push(id);
            }
        }

        if let Some(mate) = self.mate {
            let partners: Vec<PlayerId> = expanded
                .iter()
                .filter_map(|id| mate.partner_of(*id))
                .collect();
            for partner in partners {
                if !expanded.contains(&partner) && self.player(partner).is_some() {
                    expanded.push(partner);
                }
            }
        }

        expanded
    }

    /// Stats entry for a player, created on first use.
    pub(crate) fn stats_mut(&mut self, id: PlayerId) -> &mut PlayerStats {
        self.stats.entry(id).or_default()
    }

    /// Fail unless the acting player is the host.
    pub(crate) fn require_host(
        &self,
        actor: PlayerId,
        action: &'static str,
    ) -> Result<(), CommandError> {
        if self.require_player(actor)?.is_host {
            Ok(())
        } else {
            Err(CommandError::HostOnly(action))
        }
    }

    /// Add a participant while the lobby is still gathering players.
    pub fn join(&mut self, id: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        if self.status != LobbyStatus::Waiting {
            return Err(CommandError::AlreadyStarted);
        }
        let max = ctx.rules.max_players;
        if self.players.len() >= max {
            return Err(CommandError::LobbyFull { max });
        }
        if self.player(id).is_some() {
            return Err(CommandError::InvalidInput(format!(
                "player `{id}` already joined"
            )));
        }
        self.push_player(id, ctx);
        Ok(())
    }

    fn push_player(&mut self, id: PlayerId, ctx: &mut CommandContext<'_>) {
        let is_host = self.players.is_empty();
        let name = if is_host {
            "Host".to_owned()
        } else {
            format!("Player {}", self.players.len() + 1)
        };
        self.players.push(Player {
            id,
            name: name.clone(),
            is_host,
            role: None,
            gender: None,
            joined_at: ctx.now,
        });
        ctx.record(GameLogEntry::new(GameEventKind::PlayerJoined, Some(id), name));
    }

    /// Rename a player and/or change their gender; `None` leaves a field untouched.
    pub fn update_player(
        &mut self,
        id: PlayerId,
        name: Option<String>,
        gender: Option<Option<Gender>>,
    ) -> Result<(), CommandError> {
        let name = match name {
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(CommandError::InvalidInput("name must not be empty".into()));
                }
                Some(trimmed.to_owned())
            }
            None => None,
        };

        let player = self.player_mut(id).ok_or(CommandError::UnknownPlayer(id))?;
        if let Some(name) = name {
            player.name = name;
        }
        if let Some(gender) = gender {
            player.gender = gender;
        }
        Ok(())
    }

    /// Host-only: deal the first turn to a random player.
    pub fn start(&mut self, actor: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        self.require_host(actor, "start the game")?;
        if self.status != LobbyStatus::Waiting {
            return Err(CommandError::AlreadyStarted);
        }
        self.status = LobbyStatus::Playing;
        self.deal_first_turn(ctx);
        ctx.record(GameLogEntry::new(
            GameEventKind::GameStarted,
            Some(actor),
            self.name_of(actor),
        ));
        Ok(())
    }

    /// Host-only: fresh deck, cleared table state, roles and counters, random first player.
    pub fn reset(&mut self, actor: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        self.require_host(actor, "reset the game")?;
        if self.status == LobbyStatus::Waiting {
            return Err(CommandError::NotPlaying);
        }

        self.deck = shuffled_deck(ctx.rng);
        self.active_prompt = None;
        self.word_game = None;
        self.rps_game = None;
        self.vote = None;
        self.mate = None;
        self.dayman_nightman = None;
        self.snail_player = None;
        self.stats.clear();
        self.counters = RoleCounters::default();
        for player in &mut self.players {
            player.role = None;
        }
        self.status = LobbyStatus::Playing;
        self.deal_first_turn(ctx);

        ctx.record(GameLogEntry::new(
            GameEventKind::GameReset,
            Some(actor),
            self.name_of(actor),
        ));
        Ok(())
    }

    fn deal_first_turn(&mut self, ctx: &mut CommandContext<'_>) {
        use rand::Rng;

        self.turn_number = 1;
        self.current_player_id = if self.players.is_empty() {
            None
        } else {
            let index = ctx.rng.random_range(0..self.players.len());
            Some(self.players[index].id)
        };
    }

    /// Record an accepted mutation.
    pub fn commit(&mut self, now: SystemTime) {
        self.version += 1;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::config::GameRules;

    fn lobby_with(players: usize) -> (Lobby, Vec<PlayerId>) {
        let rules = GameRules::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut ctx = CommandContext::new(&rules, &mut rng, SystemTime::now());
        let ids: Vec<PlayerId> = (0..players).map(|_| PlayerId::new()).collect();
        let mut lobby = Lobby::open("ABC123".into(), ids[0], &mut ctx);
        for id in &ids[1..] {
            lobby.join(*id, &mut ctx).unwrap();
        }
        (lobby, ids)
    }

    #[test]
    fn first_joiner_hosts_and_others_are_numbered() {
        let (lobby, ids) = lobby_with(3);
        assert_eq!(lobby.players[0].name, "Host");
        assert!(lobby.players[0].is_host);
        assert_eq!(lobby.players[1].name, "Player 2");
        assert_eq!(lobby.players[2].name, "Player 3");
        assert_eq!(lobby.host().map(|p| p.id), Some(ids[0]));
    }

    #[test]
    fn join_is_capped() {
        let rules = GameRules::default();
        let (mut lobby, _) = lobby_with(rules.max_players);
        let mut rng = StdRng::seed_from_u64(2);
        let mut ctx = CommandContext::new(&rules, &mut rng, SystemTime::now());
        assert_eq!(
            lobby.join(PlayerId::new(), &mut ctx),
            Err(CommandError::LobbyFull { max: 10 })
        );
    }

    #[test]
    fn only_host_can_start() {
        let rules = GameRules::default();
        let (mut lobby, ids) = lobby_with(2);
        let mut rng = StdRng::seed_from_u64(3);
        let mut ctx = CommandContext::new(&rules, &mut rng, SystemTime::now());

        assert!(matches!(
            lobby.start(ids[1], &mut ctx),
            Err(CommandError::HostOnly(_))
        ));
        lobby.start(ids[0], &mut ctx).unwrap();
        assert_eq!(lobby.status, LobbyStatus::Playing);
        assert_eq!(lobby.turn_number, 1);
        assert!(lobby.current_player_id.is_some());
        assert_eq!(lobby.join(PlayerId::new(), &mut ctx), Err(CommandError::AlreadyStarted));
    }

    #[test]
    fn reset_reshuffles_and_clears_the_table() {
        let rules = GameRules::default();
        let (mut lobby, ids) = lobby_with(3);
        let mut rng = StdRng::seed_from_u64(4);
        let mut ctx = CommandContext::new(&rules, &mut rng, SystemTime::now());
        lobby.start(ids[0], &mut ctx).unwrap();

        for card in &mut lobby.deck {
            card.drawn = true;
            card.drawn_by = Some(ids[1]);
        }
        lobby.status = LobbyStatus::Finished;
        lobby.turn_number = 53;
        lobby.players[1].role = Some(Role::Bruce);
        lobby.snail_player = Some(ids[2]);
        lobby.mate = Some(Mate {
            player1: ids[1],
            player2: ids[2],
        });
        lobby.stats.entry(ids[1]).or_default().drinks = 4;
        RoleCounters::bump(&mut lobby.counters.gino_swaps_used, ids[2]);

        assert!(matches!(
            lobby.reset(ids[1], &mut ctx),
            Err(CommandError::HostOnly(_))
        ));
        assert_eq!(lobby.status, LobbyStatus::Finished);

        lobby.reset(ids[0], &mut ctx).unwrap();
        assert_eq!(lobby.deck.len(), 52);
        assert!(lobby.deck.iter().all(|card| !card.drawn && card.drawn_by.is_none()));
        assert_eq!(lobby.counters, RoleCounters::default());
        assert!(lobby.players.iter().all(|player| player.role.is_none()));
        assert!(lobby.stats.is_empty());
        assert!(lobby.mate.is_none());
        assert!(lobby.snail_player.is_none());
        assert!(lobby.active_prompt.is_none());
        assert_eq!(lobby.status, LobbyStatus::Playing);
        assert_eq!(lobby.turn_number, 1);
        assert!(lobby.current_player_id.is_some());
    }

    #[test]
    fn mates_pull_their_partner_into_drink_sets() {
        let (mut lobby, ids) = lobby_with(3);
        lobby.mate = Some(Mate {
            player1: ids[0],
            player2: ids[2],
        });

        assert_eq!(lobby.with_mates([ids[2]]), vec![ids[2], ids[0]]);
        assert_eq!(lobby.with_mates([ids[1]]), vec![ids[1]]);
        assert_eq!(lobby.with_mates([ids[0], ids[2], ids[0]]), vec![ids[0], ids[2]]);
    }

    #[test]
    fn blank_names_are_rejected() {
        let (mut lobby, ids) = lobby_with(1);
        assert!(lobby.update_player(ids[0], Some("   ".into()), None).is_err());
        lobby
            .update_player(ids[0], Some("  Dennis ".into()), Some(Some(Gender::Male)))
            .unwrap();
        assert_eq!(lobby.players[0].name, "Dennis");
        assert_eq!(lobby.players[0].gender, Some(Gender::Male));
    }
}
