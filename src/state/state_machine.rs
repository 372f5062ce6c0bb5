//! Turn/prompt state machine: validates player commands against a lobby, applies
//! them atomically and decides when the turn moves on.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::GameRules,
    state::{
        cards::{CardCode, CardEffect},
        lobby::{Gender, Lobby, LobbyStatus, Mate, PlayerId, Role},
        minigames::{
            RpsChoice, RpsGame, WordGame, WordRejection, WordVerdict,
        },
        prompt::{
            ActivePrompt, ChoicePurpose, DrinkPrompt, GenderCard, MacChallengeKind,
            PerformanceKind, PromptKind,
        },
    },
};

/// Everything a command needs besides the lobby itself.
pub struct CommandContext<'a> {
    pub rules: &'a GameRules,
    pub rng: &'a mut dyn RngCore,
    pub now: SystemTime,
    events: Vec<GameLogEntry>,
}

impl<'a> CommandContext<'a> {
    /// Build a context for one mutation.
    pub fn new(rules: &'a GameRules, rng: &'a mut dyn RngCore, now: SystemTime) -> Self {
        Self {
            rules,
            rng,
            now,
            events: Vec::new(),
        }
    }

    /// Queue a log entry produced by the mutation.
    pub fn record(&mut self, entry: GameLogEntry) {
        self.events.push(entry);
    }

    /// Entries recorded so far.
    pub fn events(&self) -> &[GameLogEntry] {
        &self.events
    }

    /// Consume the context, keeping the recorded entries.
    pub fn into_events(self) -> Vec<GameLogEntry> {
        self.events
    }

    /// Current time as Unix epoch milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.now
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0)
    }

    pub(crate) fn roll_die(&mut self) -> u8 {
        self.rng.random_range(1..=6)
    }

    fn checkpoint(&self) -> usize {
        self.events.len()
    }

    fn rollback(&mut self, checkpoint: usize) {
        self.events.truncate(checkpoint);
    }
}

/// Reasons a command is refused. The lobby is left untouched when one is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The lobby is waiting or finished.
    #[error("the game is not in progress")]
    NotPlaying,
    /// Seats close once the first turn is dealt.
    #[error("the game has already started")]
    AlreadyStarted,
    /// Every seat is taken.
    #[error("lobby is full ({max} players)")]
    LobbyFull {
        /// Seat limit from the rules.
        max: usize,
    },
    /// The acting or targeted player has no seat.
    #[error("player `{0}` is not part of this lobby")]
    UnknownPlayer(PlayerId),
    /// A host action from anyone else; carries the action name.
    #[error("only the host can {0}")]
    HostOnly(&'static str),
    /// Someone other than the current player tried to draw.
    #[error("it is not your turn")]
    NotYourTurn,
    /// A prompt, mini-game or vote must finish first.
    #[error("another prompt or mini-game is still in progress")]
    Blocked,
    /// The command answers a prompt that is not open.
    #[error("nothing matching this command is in progress")]
    NoActivePrompt,
    /// Position outside the deck.
    #[error("there is no card at position {0}")]
    UnknownCard(usize),
    /// That card is already face up.
    #[error("the card at position {0} has already been drawn")]
    AlreadyDrawn(usize),
    /// The open prompt is owed by someone else.
    #[error("this prompt is not waiting on you")]
    NotYourPrompt,
    /// The player already confirmed this prompt.
    #[error("you have already confirmed")]
    AlreadyConfirmed,
    /// The ability belongs to another role.
    #[error("this needs the {0} role")]
    MissingRole(Role),
    /// A per-player ability allowance is spent.
    #[error("{ability} limit reached ({cap})")]
    CapReached {
        /// Ability name shown to the player.
        ability: &'static str,
        /// Allowance that was hit.
        cap: u32,
    },
    /// A game rule forbids the move.
    #[error("{0}")]
    Rule(&'static str),
    /// Malformed or out-of-range input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Category of a game-history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameEventKind {
    CardDrawn,
    RoleAssigned,
    DrinkAssigned,
    DrinkConfirmed,
    MateAssigned,
    MateBroken,
    SpecialAction,
    MiniGameStarted,
    MiniGameEnded,
    PlayerJoined,
    PlayerLeft,
    HostMigrated,
    GameStarted,
    GameReset,
    GameEnded,
}

/// Free-form details attached to a history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EventDetails {
    /// Card involved, as a two-character code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_code: Option<String>,
    /// Role handed out or used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Machine-readable name of a special action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Display name of the affected player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Free text shown in the history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// History entry produced while applying a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLogEntry {
    /// What happened.
    pub kind: GameEventKind,
    /// Acting player, when there is one.
    pub player_id: Option<PlayerId>,
    /// Acting player's name at the time.
    pub player_name: String,
    /// Extra context for the entry.
    pub details: EventDetails,
}

impl GameLogEntry {
    /// Entry without details.
    pub fn new(kind: GameEventKind, player_id: Option<PlayerId>, player_name: String) -> Self {
        Self {
            kind,
            player_id,
            player_name,
            details: EventDetails::default(),
        }
    }

    /// Attach the card involved.
    pub fn card(mut self, code: CardCode) -> Self {
        self.details.card_code = Some(code.to_string());
        self
    }

    /// Attach the role involved.
    pub fn role(mut self, role: Role) -> Self {
        self.details.role = Some(role);
        self
    }

    /// Name the special action.
    pub fn action(mut self, action: &str) -> Self {
        self.details.action = Some(action.to_owned());
        self
    }

    /// Name the affected player.
    pub fn target(mut self, target: String) -> Self {
        self.details.target = Some(target);
        self
    }

    /// Attach free text.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.details.message = Some(message.into());
        self
    }
}

/// Moves a player can make once the game is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameCommand {
    /// Flip the face-down card at `position`.
    DrawCard { position: usize },
    /// Confirm that you drank.
    ConfirmDrink,
    /// Pick the player for a 2 (drink) or 4 (rock-paper-scissors).
    ChoosePlayer { target: PlayerId },
    /// Back out of a player choice; the turn moves on.
    CancelChoice,
    /// Pick a mate after drawing an 8.
    ChooseMate { target: PlayerId },
    SubmitWord { word: String },
    /// Give up on the current word.
    PassWord,
    /// Challenge the last word-game answer.
    ChallengeWord,
    EndWordGame,
    ThrowRps { choice: RpsChoice },
    /// Vote on the open charity or swap request.
    CastVote { approve: bool },
    GoldenGodRedirect {
        #[serde(default)]
        target: Option<PlayerId>,
    },
    NonBinaryPass,
    TinyHands,
    CricketDeny,
    CricketConfess { confession: String },
    MacBodyguard { target: PlayerId },
    MacProteinShare { target: PlayerId },
    MacChallenge {
        target: PlayerId,
        challenge: MacChallengeKind,
    },
    RespondMacChallenge { perform: bool },
    BarbaraRoll,
    BarbaraRedirect { target: PlayerId },
    StartCharityVote { target: PlayerId, reason: String },
    StartSwapVote { target: PlayerId, excuse: String },
    FrankCallOut { target: PlayerId },
    FrankPerform { performance: PerformanceKind },
    FrankRefuse,
    FrankJudge { moved: bool },
    DaymanChooseNightman { target: PlayerId },
    DaymanCallOut,
    NightmanRespond { success: bool },
    SaltSnail,
}

impl GameCommand {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            GameCommand::DrawCard { .. } => "draw_card",
            GameCommand::ConfirmDrink => "confirm_drink",
            GameCommand::ChoosePlayer { .. } => "choose_player",
            GameCommand::CancelChoice => "cancel_choice",
            GameCommand::ChooseMate { .. } => "choose_mate",
            GameCommand::SubmitWord { .. } => "submit_word",
            GameCommand::PassWord => "pass_word",
            GameCommand::ChallengeWord => "challenge_word",
            GameCommand::EndWordGame => "end_word_game",
            GameCommand::ThrowRps { .. } => "throw_rps",
            GameCommand::CastVote { .. } => "cast_vote",
            GameCommand::GoldenGodRedirect { .. } => "golden_god_redirect",
            GameCommand::NonBinaryPass => "non_binary_pass",
            GameCommand::TinyHands => "tiny_hands",
            GameCommand::CricketDeny => "cricket_deny",
            GameCommand::CricketConfess { .. } => "cricket_confess",
            GameCommand::MacBodyguard { .. } => "mac_bodyguard",
            GameCommand::MacProteinShare { .. } => "mac_protein_share",
            GameCommand::MacChallenge { .. } => "mac_challenge",
            GameCommand::RespondMacChallenge { .. } => "respond_mac_challenge",
            GameCommand::BarbaraRoll => "barbara_roll",
            GameCommand::BarbaraRedirect { .. } => "barbara_redirect",
            GameCommand::StartCharityVote { .. } => "start_charity_vote",
            GameCommand::StartSwapVote { .. } => "start_swap_vote",
            GameCommand::FrankCallOut { .. } => "frank_call_out",
            GameCommand::FrankPerform { .. } => "frank_perform",
            GameCommand::FrankRefuse => "frank_refuse",
            GameCommand::FrankJudge { .. } => "frank_judge",
            GameCommand::DaymanChooseNightman { .. } => "dayman_choose_nightman",
            GameCommand::DaymanCallOut => "dayman_call_out",
            GameCommand::NightmanRespond { .. } => "nightman_respond",
            GameCommand::SaltSnail => "salt_snail",
        }
    }
}

/// How whatever is blocking the table resolves.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// Nothing follows; the turn advances if the prompt was resolving a draw.
    Resolved,
    /// A follow-up prompt inherits the draw being resolved.
    Chain(PromptKind),
    /// A mini-game takes over the draw being resolved.
    Launch(MiniGame),
}

#[derive(Debug)]
pub(crate) enum MiniGame {
    Word(WordGame),
    Rps(RpsGame),
}

impl Lobby {
    /// Apply a player command. Either the whole command takes effect or none of it does.
    pub fn apply(
        &mut self,
        actor: PlayerId,
        command: GameCommand,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_player(actor)?;
        if self.status != LobbyStatus::Playing {
            return Err(CommandError::NotPlaying);
        }

        let checkpoint = ctx.checkpoint();
        let mut next = self.clone();
        match next.dispatch(actor, command, ctx) {
            Ok(()) => {
                next.settle(ctx);
                *self = next;
                Ok(())
            }
            Err(err) => {
                ctx.rollback(checkpoint);
                Err(err)
            }
        }
    }

    fn dispatch(
        &mut self,
        actor: PlayerId,
        command: GameCommand,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        match command {
            GameCommand::DrawCard { position } => self.draw_card(actor, position, ctx),
            GameCommand::ConfirmDrink => self.confirm_drink(actor, ctx),
            GameCommand::ChoosePlayer { target } => self.choose_player(actor, target, ctx),
            GameCommand::CancelChoice => self.cancel_choice(actor, ctx),
            GameCommand::ChooseMate { target } => self.choose_mate(actor, target, ctx),
            GameCommand::SubmitWord { word } => self.submit_word(actor, &word, ctx),
            GameCommand::PassWord => self.pass_word(actor, ctx),
            GameCommand::ChallengeWord => self.challenge_word(actor, ctx),
            GameCommand::EndWordGame => self.end_word_game(actor, ctx),
            GameCommand::ThrowRps { choice } => self.throw_rps(actor, choice, ctx),
            GameCommand::CastVote { approve } => self.cast_vote(actor, approve, ctx),
            GameCommand::GoldenGodRedirect { target } => {
                self.golden_god_redirect(actor, target, ctx)
            }
            GameCommand::NonBinaryPass => self.non_binary_pass(actor, ctx),
            GameCommand::TinyHands => self.tiny_hands(actor, ctx),
            GameCommand::CricketDeny => self.cricket_deny(actor, ctx),
            GameCommand::CricketConfess { confession } => {
                self.cricket_confess(actor, &confession, ctx)
            }
            GameCommand::MacBodyguard { target } => self.mac_bodyguard(actor, target, ctx),
            GameCommand::MacProteinShare { target } => {
                self.mac_protein_share(actor, target, ctx)
            }
            GameCommand::MacChallenge { target, challenge } => {
                self.mac_challenge(actor, target, challenge, ctx)
            }
            GameCommand::RespondMacChallenge { perform } => {
                self.respond_mac_challenge(actor, perform, ctx)
            }
            GameCommand::BarbaraRoll => self.barbara_roll(actor, ctx),
            GameCommand::BarbaraRedirect { target } => self.barbara_redirect(actor, target, ctx),
            GameCommand::StartCharityVote { target, reason } => {
                self.start_charity_vote(actor, target, &reason, ctx)
            }
            GameCommand::StartSwapVote { target, excuse } => {
                self.start_swap_vote(actor, target, &excuse, ctx)
            }
            GameCommand::FrankCallOut { target } => self.frank_call_out(actor, target, ctx),
            GameCommand::FrankPerform { performance } => {
                self.frank_perform(actor, performance, ctx)
            }
            GameCommand::FrankRefuse => self.frank_refuse(actor, ctx),
            GameCommand::FrankJudge { moved } => self.frank_judge(actor, moved, ctx),
            GameCommand::DaymanChooseNightman { target } => {
                self.dayman_choose_nightman(actor, target, ctx)
            }
            GameCommand::DaymanCallOut => self.dayman_call_out(actor, ctx),
            GameCommand::NightmanRespond { success } => {
                self.nightman_respond(actor, success, ctx)
            }
            GameCommand::SaltSnail => self.salt_snail(actor, ctx),
        }
    }

    /// Remove a player, repairing every piece of table state that referenced them.
    pub fn leave(&mut self, id: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let index = self.index_of(id).ok_or(CommandError::UnknownPlayer(id))?;
        let mut next = self.clone();
        next.remove_player(index, id, ctx);
        *self = next;
        Ok(())
    }

    /// The nightman ran out of time. Stale timers (the prompt already moved on) are refused.
    pub fn expire_nightman(
        &mut self,
        prompt_id: Uuid,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let Some(prompt) = self.active_prompt.as_ref() else {
            return Err(CommandError::NoActivePrompt);
        };
        let PromptKind::NightmanResponse { nightman, .. } = prompt.kind else {
            return Err(CommandError::NoActivePrompt);
        };
        if prompt.id != prompt_id {
            return Err(CommandError::NoActivePrompt);
        }
        let drawn_by = prompt.drawn_by;

        let name = self.name_of(nightman);
        ctx.record(
            GameLogEntry::new(GameEventKind::SpecialAction, Some(nightman), name.clone())
                .action("nightman_timeout"),
        );
        let drink = self.drink_for([nightman], format!("{name} froze up. Nightman drinks!"), ctx);
        self.conclude(drawn_by, None, Outcome::Chain(PromptKind::Drink(drink)), ctx);
        self.settle(ctx);
        Ok(())
    }

    /// The only place that clears blocking state and advances the turn.
    pub(crate) fn conclude(
        &mut self,
        drawn_by: Option<PlayerId>,
        card_code: Option<CardCode>,
        outcome: Outcome,
        ctx: &mut CommandContext<'_>,
    ) {
        self.active_prompt = None;
        self.word_game = None;
        self.rps_game = None;
        self.vote = None;

        match outcome {
            Outcome::Resolved => {
                if let Some(owner) = drawn_by {
                    self.advance_turn_from(owner);
                }
            }
            Outcome::Chain(PromptKind::Drink(drink)) if drink.drinkers.is_empty() => {
                self.conclude(drawn_by, card_code, Outcome::Resolved, ctx);
            }
            Outcome::Chain(kind) => {
                self.active_prompt = Some(ActivePrompt::new(kind, card_code, drawn_by));
            }
            Outcome::Launch(MiniGame::Word(game)) => self.word_game = Some(game),
            Outcome::Launch(MiniGame::Rps(game)) => self.rps_game = Some(game),
        }
    }

    /// Hand the turn to the player after `owner` in join order.
    ///
    /// When `owner` has left, the current player (who took over the leaver's
    /// seat) keeps the turn instead.
    pub(crate) fn advance_turn_from(&mut self, owner: PlayerId) {
        if self.players.is_empty() {
            self.current_player_id = None;
            return;
        }

        let count = self.players.len();
        let next = match self.index_of(owner) {
            Some(index) => (index + 1) % count,
            None => self
                .current_player_id
                .and_then(|current| self.index_of(current))
                .unwrap_or(0),
        };

        self.turn_number = if self.current_player_id.is_none() {
            1
        } else {
            self.turn_number + 1
        };
        self.current_player_id = Some(self.players[next].id);
    }

    /// Finish the game once the last card is resolved.
    fn settle(&mut self, ctx: &mut CommandContext<'_>) {
        if self.status == LobbyStatus::Playing && !self.is_blocked() && self.is_exhausted() {
            self.status = LobbyStatus::Finished;
            ctx.record(
                GameLogEntry::new(GameEventKind::GameEnded, None, "Table".to_owned())
                    .message("every card has been drawn"),
            );
        }
    }

    /// Drink body for `drinkers` plus their mates, logging each assignment.
    pub(crate) fn drink_for(
        &self,
        drinkers: impl IntoIterator<Item = PlayerId>,
        message: String,
        ctx: &mut CommandContext<'_>,
    ) -> DrinkPrompt {
        let drinkers = self.with_mates(drinkers);
        for id in &drinkers {
            ctx.record(
                GameLogEntry::new(GameEventKind::DrinkAssigned, Some(*id), self.name_of(*id))
                    .message(message.clone()),
            );
        }
        DrinkPrompt::new(drinkers, message)
    }

    pub(crate) fn drink_prompt(&self) -> Result<&DrinkPrompt, CommandError> {
        self.active_prompt
            .as_ref()
            .and_then(ActivePrompt::drink)
            .ok_or(CommandError::NoActivePrompt)
    }

    pub(crate) fn drink_prompt_mut(&mut self) -> Result<&mut DrinkPrompt, CommandError> {
        self.active_prompt
            .as_mut()
            .and_then(ActivePrompt::drink_mut)
            .ok_or(CommandError::NoActivePrompt)
    }

    /// Clear the drink prompt if everyone is done and no vote is pending.
    pub(crate) fn try_clear_drink(&mut self, ctx: &mut CommandContext<'_>) {
        if self.vote.is_some() {
            return;
        }
        let Some(prompt) = self.active_prompt.as_ref() else {
            return;
        };
        let Some(drink) = prompt.drink() else {
            return;
        };
        if drink.is_satisfied() {
            let (drawn_by, card_code) = (prompt.drawn_by, prompt.card_code);
            self.conclude(drawn_by, card_code, Outcome::Resolved, ctx);
        }
    }

    fn draw_card(
        &mut self,
        actor: PlayerId,
        position: usize,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        if self.is_blocked() {
            return Err(CommandError::Blocked);
        }
        if self.current_player_id.is_some_and(|current| current != actor) {
            return Err(CommandError::NotYourTurn);
        }

        let card = self
            .deck
            .get_mut(position)
            .ok_or(CommandError::UnknownCard(position))?;
        if card.drawn {
            return Err(CommandError::AlreadyDrawn(position));
        }
        card.drawn = true;
        card.drawn_by = Some(actor);
        let code = card.code;

        let name = self.name_of(actor);
        ctx.record(GameLogEntry::new(GameEventKind::CardDrawn, Some(actor), name.clone()).card(code));
        let stats = self.stats_mut(actor);
        stats.cards_drawn += 1;
        if code.rank.is_face() {
            stats.face_cards += 1;
        }
        self.tick_nightman(ctx);

        let (drawn_by, card_code) = (Some(actor), Some(code));
        match code.rank.effect() {
            CardEffect::AssignRole => {
                self.assign_role(actor, code, ctx);
                self.conclude(drawn_by, card_code, Outcome::Resolved, ctx);
            }
            CardEffect::ChooseDrinker => {
                let kind = PromptKind::ChoosePlayer {
                    chooser: actor,
                    purpose: ChoicePurpose::Drink,
                };
                self.conclude(drawn_by, card_code, Outcome::Chain(kind), ctx);
            }
            CardEffect::DrawerDrinks => {
                let drink = self.drink_for([actor], format!("{name} drinks"), ctx);
                self.conclude(drawn_by, card_code, Outcome::Chain(PromptKind::Drink(drink)), ctx);
            }
            CardEffect::GenderDrink(gender_card) => {
                let matching: Vec<PlayerId> = self
                    .players
                    .iter()
                    .filter(|player| gender_matches(gender_card, player.gender))
                    .map(|player| player.id)
                    .collect();
                let message = match gender_card {
                    GenderCard::Guys => "Guys drink!",
                    GenderCard::Chicks => "Chicks drink!",
                };
                if matching.is_empty() {
                    ctx.record(
                        GameLogEntry::new(GameEventKind::SpecialAction, Some(actor), name)
                            .card(code)
                            .message(format!("{message} Nobody qualifies, moving on")),
                    );
                }
                let mut drink = self.drink_for(matching, message.to_owned(), ctx);
                drink.gender_card = Some(gender_card);
                self.conclude(drawn_by, card_code, Outcome::Chain(PromptKind::Drink(drink)), ctx);
            }
            CardEffect::RpsChallenge => {
                let kind = PromptKind::ChoosePlayer {
                    chooser: actor,
                    purpose: ChoicePurpose::Rps,
                };
                self.conclude(drawn_by, card_code, Outcome::Chain(kind), ctx);
            }
            CardEffect::WordGame(kind) => {
                let index = self.index_of(actor).unwrap_or(0);
                ctx.record(
                    GameLogEntry::new(GameEventKind::MiniGameStarted, Some(actor), name)
                        .card(code)
                        .action(kind.label()),
                );
                let game = WordGame::new(kind, actor, index);
                self.conclude(drawn_by, card_code, Outcome::Launch(MiniGame::Word(game)), ctx);
            }
            CardEffect::ChooseMate => {
                if let Some(mate) = self.mate.take() {
                    ctx.record(
                        GameLogEntry::new(
                            GameEventKind::MateBroken,
                            Some(mate.player1),
                            self.name_of(mate.player1),
                        )
                        .target(self.name_of(mate.player2)),
                    );
                }
                let kind = PromptKind::ChooseMate { chooser: actor };
                self.conclude(drawn_by, card_code, Outcome::Chain(kind), ctx);
            }
        }
        Ok(())
    }

    fn assign_role(&mut self, actor: PlayerId, code: CardCode, ctx: &mut CommandContext<'_>) {
        let Some(role) = code.character() else {
            return;
        };
        let Some(player) = self.player_mut(actor) else {
            return;
        };
        player.role = Some(role);
        let name = player.name.clone();

        if role == Role::Gail {
            self.snail_player = Some(actor);
        } else if self.snail_player == Some(actor) {
            self.snail_player = None;
        }
        ctx.record(
            GameLogEntry::new(GameEventKind::RoleAssigned, Some(actor), name)
                .card(code)
                .role(role),
        );
    }

    fn tick_nightman(&mut self, ctx: &mut CommandContext<'_>) {
        let Some(pairing) = self.dayman_nightman.as_mut() else {
            return;
        };
        pairing.rounds_remaining = pairing.rounds_remaining.saturating_sub(1);
        if pairing.rounds_remaining == 0 {
            let nightman = pairing.nightman;
            self.dayman_nightman = None;
            ctx.record(
                GameLogEntry::new(GameEventKind::SpecialAction, Some(nightman), self.name_of(nightman))
                    .action("nightman_released"),
            );
        }
    }

    /// A player whose drink is up for a vote cannot act on it until the table decides.
    pub(crate) fn require_no_vote_on(&self, actor: PlayerId) -> Result<(), CommandError> {
        match self.vote.as_ref() {
            Some(vote) if vote.initiator() == actor => {
                Err(CommandError::Rule("your drink is up for a vote"))
            }
            _ => Ok(()),
        }
    }

    fn confirm_drink(&mut self, actor: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        self.require_no_vote_on(actor)?;
        let drink = self.drink_prompt_mut()?;
        drink.confirm(actor)?;
        let amount = if drink.double { 2 } else { 1 };

        self.stats_mut(actor).drinks += amount;
        ctx.record(GameLogEntry::new(
            GameEventKind::DrinkConfirmed,
            Some(actor),
            self.name_of(actor),
        ));
        self.try_clear_drink(ctx);
        Ok(())
    }

    fn choice_prompt(&self, actor: PlayerId) -> Result<(ChoicePurpose, Option<PlayerId>, Option<CardCode>), CommandError> {
        let prompt = self.active_prompt.as_ref().ok_or(CommandError::NoActivePrompt)?;
        let PromptKind::ChoosePlayer { chooser, purpose } = prompt.kind else {
            return Err(CommandError::NoActivePrompt);
        };
        if chooser != actor {
            return Err(CommandError::NotYourPrompt);
        }
        Ok((purpose, prompt.drawn_by, prompt.card_code))
    }

    /// Validate a target other than the actor.
    pub(crate) fn require_other(&self, actor: PlayerId, target: PlayerId) -> Result<(), CommandError> {
        self.require_player(target)?;
        if target == actor {
            return Err(CommandError::Rule("pick someone other than yourself"));
        }
        Ok(())
    }

    fn choose_player(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let (purpose, drawn_by, card_code) = self.choice_prompt(actor)?;
        self.require_other(actor, target)?;

        let (actor_name, target_name) = (self.name_of(actor), self.name_of(target));
        match purpose {
            ChoicePurpose::Drink => {
                let drink = self.drink_for(
                    [target],
                    format!("{actor_name} picked {target_name} to drink"),
                    ctx,
                );
                self.conclude(drawn_by, card_code, Outcome::Chain(PromptKind::Drink(drink)), ctx);
            }
            ChoicePurpose::Rps => {
                ctx.record(
                    GameLogEntry::new(GameEventKind::MiniGameStarted, Some(actor), actor_name)
                        .action("rock_paper_scissors")
                        .target(target_name),
                );
                let game = RpsGame::new(actor, target);
                self.conclude(drawn_by, card_code, Outcome::Launch(MiniGame::Rps(game)), ctx);
            }
        }
        Ok(())
    }

    fn cancel_choice(&mut self, actor: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let (_, drawn_by, card_code) = self.choice_prompt(actor)?;
        ctx.record(
            GameLogEntry::new(GameEventKind::SpecialAction, Some(actor), self.name_of(actor))
                .action("choice_cancelled"),
        );
        self.conclude(drawn_by, card_code, Outcome::Resolved, ctx);
        Ok(())
    }

    fn choose_mate(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let prompt = self.active_prompt.as_ref().ok_or(CommandError::NoActivePrompt)?;
        let PromptKind::ChooseMate { chooser } = prompt.kind else {
            return Err(CommandError::NoActivePrompt);
        };
        if chooser != actor {
            return Err(CommandError::NotYourPrompt);
        }
        let (drawn_by, card_code) = (prompt.drawn_by, prompt.card_code);
        self.require_other(actor, target)?;

        self.mate = Some(Mate {
            player1: actor,
            player2: target,
        });
        ctx.record(
            GameLogEntry::new(GameEventKind::MateAssigned, Some(actor), self.name_of(actor))
                .target(self.name_of(target)),
        );
        self.conclude(drawn_by, card_code, Outcome::Resolved, ctx);
        Ok(())
    }

    fn word_game_turn(&self, actor: PlayerId) -> Result<&WordGame, CommandError> {
        let game = self.word_game.as_ref().ok_or(CommandError::NoActivePrompt)?;
        match self.players.get(game.current_index) {
            Some(player) if player.id == actor => Ok(game),
            _ => Err(CommandError::NotYourTurn),
        }
    }

    fn submit_word(
        &mut self,
        actor: PlayerId,
        word: &str,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let word = word.trim();
        if word.is_empty() {
            return Err(CommandError::InvalidInput("word must not be empty".into()));
        }
        let verdict = self.word_game_turn(actor)?.judge(word, &ctx.rules.episodes);
        let name = self.name_of(actor);
        let count = self.players.len();

        match verdict {
            WordVerdict::Subject(subject) => {
                ctx.record(
                    GameLogEntry::new(GameEventKind::SpecialAction, Some(actor), name)
                        .action("word_game_subject")
                        .message(subject.clone()),
                );
                if let Some(game) = self.word_game.as_mut() {
                    game.subject = Some(subject);
                    game.pass_to_next(count);
                }
            }
            WordVerdict::Accepted(answer) => {
                ctx.record(
                    GameLogEntry::new(GameEventKind::SpecialAction, Some(actor), name)
                        .action("word_game_answer")
                        .message(answer.clone()),
                );
                if let Some(game) = self.word_game.as_mut() {
                    game.used_words.push(answer);
                    game.last_answer_by = Some(actor);
                    game.pass_to_next(count);
                }
            }
            WordVerdict::Rejected(reason) => {
                let message = match reason {
                    WordRejection::Duplicate => format!("{name} repeated \"{word}\""),
                    WordRejection::UnknownEpisode => {
                        format!("\"{word}\" is not an episode, {name}")
                    }
                };
                self.fail_word_game(actor, message, ctx);
            }
        }
        Ok(())
    }

    fn pass_word(&mut self, actor: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        self.word_game_turn(actor)?;
        let message = format!("{} couldn't answer", self.name_of(actor));
        self.fail_word_game(actor, message, ctx);
        Ok(())
    }

    fn challenge_word(&mut self, actor: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let game = self.word_game.as_ref().ok_or(CommandError::NoActivePrompt)?;
        let Some(challenged) = game.last_answer_by else {
            return Err(CommandError::Rule("there is no answer to challenge yet"));
        };
        if challenged == actor {
            return Err(CommandError::Rule("you cannot challenge your own answer"));
        }
        let message = format!(
            "{} challenged {}'s answer",
            self.name_of(actor),
            self.name_of(challenged)
        );
        self.fail_word_game(challenged, message, ctx);
        Ok(())
    }

    fn end_word_game(&mut self, actor: PlayerId, ctx: &mut CommandContext<'_>) -> Result<(), CommandError> {
        let game = self.word_game.as_ref().ok_or(CommandError::NoActivePrompt)?;
        let (owner, kind) = (game.starting_player, game.kind);
        ctx.record(
            GameLogEntry::new(GameEventKind::MiniGameEnded, Some(actor), self.name_of(actor))
                .action(kind.label()),
        );
        self.conclude(Some(owner), None, Outcome::Resolved, ctx);
        Ok(())
    }

    /// End the word game with one drink prompt for `loser`.
    fn fail_word_game(&mut self, loser: PlayerId, message: String, ctx: &mut CommandContext<'_>) {
        let Some(game) = self.word_game.as_ref() else {
            return;
        };
        let (owner, kind) = (game.starting_player, game.kind);
        ctx.record(
            GameLogEntry::new(GameEventKind::MiniGameEnded, Some(loser), self.name_of(loser))
                .action(kind.label())
                .message(message.clone()),
        );
        let drink = self.drink_for([loser], message, ctx);
        self.conclude(Some(owner), None, Outcome::Chain(PromptKind::Drink(drink)), ctx);
    }

    fn throw_rps(
        &mut self,
        actor: PlayerId,
        choice: RpsChoice,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let wins_needed = ctx.rules.rps_wins_needed;
        let game = self.rps_game.as_mut().ok_or(CommandError::NoActivePrompt)?;
        let scored = game.throw(actor, choice)?;
        let decided = game.decided(wins_needed);
        let owner = game.player1;

        if let Some(round) = scored {
            let message = match round.winner {
                Some(winner) => format!("round {} goes to {}", round.round, self.name_of(winner)),
                None => format!("round {} is a tie", round.round),
            };
            ctx.record(
                GameLogEntry::new(GameEventKind::SpecialAction, Some(actor), self.name_of(actor))
                    .action("rps_round")
                    .message(message),
            );
        }

        if let Some((winner, loser)) = decided {
            let message = format!(
                "{} lost rock-paper-scissors to {}",
                self.name_of(loser),
                self.name_of(winner)
            );
            ctx.record(
                GameLogEntry::new(GameEventKind::MiniGameEnded, Some(winner), self.name_of(winner))
                    .action("rock_paper_scissors")
                    .target(self.name_of(loser)),
            );
            let drink = self.drink_for([loser], message, ctx);
            self.conclude(Some(owner), None, Outcome::Chain(PromptKind::Drink(drink)), ctx);
        }
        Ok(())
    }

    fn cast_vote(
        &mut self,
        actor: PlayerId,
        approve: bool,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let vote = self.vote.as_mut().ok_or(CommandError::NoActivePrompt)?;
        vote.cast(actor, approve)?;
        self.finish_vote_if_complete(ctx);
        self.try_clear_drink(ctx);
        Ok(())
    }

    /// Apply the vote outcome to the drink prompt once every eligible voter is in.
    pub(crate) fn finish_vote_if_complete(&mut self, ctx: &mut CommandContext<'_>) {
        let eligible = self.players.len().saturating_sub(1);
        let Some(vote) = self.vote.as_ref() else {
            return;
        };
        if !vote.is_complete(eligible) {
            return;
        }

        let passes = vote.passes(eligible);
        let (initiator, target) = (vote.initiator(), vote.target());
        let (approvals, rejections) = vote.tally();
        self.vote = None;

        let replacement: Vec<PlayerId> = self
            .with_mates([target])
            .into_iter()
            .filter(|id| *id != initiator)
            .collect();
        if passes {
            if let Ok(drink) = self.drink_prompt_mut() {
                drink.release(initiator);
                drink.enlist(replacement);
            }
        }

        let drinker = if passes { target } else { initiator };
        ctx.record(
            GameLogEntry::new(GameEventKind::MiniGameEnded, Some(initiator), self.name_of(initiator))
                .action("vote")
                .target(self.name_of(target))
                .message(format!(
                    "{approvals} for, {rejections} against: {} drinks",
                    self.name_of(drinker)
                )),
        );
    }

    fn remove_player(&mut self, index: usize, id: PlayerId, ctx: &mut CommandContext<'_>) {
        let removed = self.players.remove(index);
        ctx.record(GameLogEntry::new(
            GameEventKind::PlayerLeft,
            Some(id),
            removed.name.clone(),
        ));

        if removed.is_host {
            if let Some(heir) = self.players.first_mut() {
                heir.is_host = true;
                let heir_entry =
                    GameLogEntry::new(GameEventKind::HostMigrated, Some(heir.id), heir.name.clone());
                ctx.record(heir_entry);
            }
        }

        if self.players.is_empty() {
            self.current_player_id = None;
            self.active_prompt = None;
            self.word_game = None;
            self.rps_game = None;
            self.vote = None;
            return;
        }

        if self.current_player_id == Some(id) {
            let seat = index % self.players.len();
            self.current_player_id = Some(self.players[seat].id);
        }
        if self.mate.is_some_and(|mate| mate.involves(id)) {
            self.mate = None;
            ctx.record(
                GameLogEntry::new(GameEventKind::MateBroken, Some(id), removed.name.clone()),
            );
        }
        if self
            .dayman_nightman
            .is_some_and(|pairing| pairing.dayman == id || pairing.nightman == id)
        {
            self.dayman_nightman = None;
        }
        if self.snail_player == Some(id) {
            self.snail_player = None;
        }

        if let Some(vote) = self.vote.as_mut() {
            if vote.initiator() == id || vote.target() == id {
                self.vote = None;
            } else {
                vote.ballots.remove(&id);
                self.finish_vote_if_complete(ctx);
            }
        }

        if let Some(game) = self.word_game.as_mut() {
            if index < game.current_index {
                game.current_index -= 1;
            }
            if game.current_index >= self.players.len() {
                game.current_index = 0;
            }
            if game.last_answer_by == Some(id) {
                game.last_answer_by = None;
            }
        }

        if let Some(game) = self.rps_game.as_ref() {
            if game.involves(id) {
                let owner = game.player1;
                self.conclude(Some(owner), None, Outcome::Resolved, ctx);
            }
        }

        let stranded = match self.active_prompt.as_mut() {
            Some(prompt) => {
                if let Some(drink) = prompt.drink_mut() {
                    drink.release(id);
                    None
                } else if prompt.kind.involves(id) {
                    Some((prompt.drawn_by, prompt.card_code))
                } else {
                    None
                }
            }
            None => None,
        };
        if let Some((drawn_by, card_code)) = stranded {
            self.conclude(drawn_by, card_code, Outcome::Resolved, ctx);
        }

        self.try_clear_drink(ctx);
        self.settle(ctx);
    }
}

fn gender_matches(card: GenderCard, gender: Option<Gender>) -> bool {
    matches!(
        (card, gender),
        (GenderCard::Guys, Some(Gender::Male))
            | (GenderCard::Chicks, Some(Gender::Female))
            | (_, Some(Gender::NonBinary))
    )
}


#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::testing::Table;
    use super::*;

    #[test]
    fn drawer_drinks_then_turn_passes_once() {
        let mut table = Table::new(3);
        let (a, b) = (table.id(0), table.id(1));
        assert_eq!(table.lobby.turn_number, 1);

        table.draw(0, "3S").unwrap();
        assert_eq!(table.drinkers(), vec![a]);
        assert_eq!(table.current(), Some(a));

        table.run(0, GameCommand::ConfirmDrink).unwrap();
        assert!(table.lobby.active_prompt.is_none());
        assert_eq!(table.current(), Some(b));
        assert_eq!(table.lobby.turn_number, 2);

        assert_eq!(
            table.run(0, GameCommand::ConfirmDrink),
            Err(CommandError::NoActivePrompt)
        );
        assert_eq!(table.lobby.turn_number, 2);
    }

    #[test]
    fn duplicate_confirmation_does_not_advance_twice() {
        let mut table = Table::new(3);
        table.lobby.mate = Some(Mate {
            player1: table.id(0),
            player2: table.id(2),
        });
        table.draw(0, "3H").unwrap();
        assert_eq!(table.drinkers(), vec![table.id(0), table.id(2)]);

        table.run(0, GameCommand::ConfirmDrink).unwrap();
        assert_eq!(
            table.run(0, GameCommand::ConfirmDrink),
            Err(CommandError::AlreadyConfirmed)
        );
        assert_eq!(table.lobby.turn_number, 1);

        table.run(2, GameCommand::ConfirmDrink).unwrap();
        assert_eq!(table.lobby.turn_number, 2);
        assert_eq!(table.current(), Some(table.id(1)));
    }

    #[test]
    fn advancement_follows_the_drawer_not_the_pointer() {
        let mut table = Table::new(4);
        table.lobby.current_player_id = None;
        table.lobby.turn_number = 0;

        table.draw(2, "KS").unwrap();
        assert_eq!(table.current(), Some(table.id(3)));
        assert_eq!(table.lobby.turn_number, 1);

        table.draw(3, "QS").unwrap();
        assert_eq!(table.current(), Some(table.id(0)));
        assert_eq!(table.lobby.turn_number, 2);
    }

    #[test]
    fn only_the_current_player_draws_and_nothing_while_blocked() {
        let mut table = Table::new(3);
        assert_eq!(table.draw(1, "AS"), Err(CommandError::NotYourTurn));

        table.draw(0, "3S").unwrap();
        assert_eq!(table.draw(0, "4S"), Err(CommandError::Blocked));

        let position = table.position_of("3S");
        table.run(0, GameCommand::ConfirmDrink).unwrap();
        assert_eq!(
            table.run(1, GameCommand::DrawCard { position }),
            Err(CommandError::AlreadyDrawn(position))
        );
        assert_eq!(
            table.run(1, GameCommand::DrawCard { position: 99 }),
            Err(CommandError::UnknownCard(99))
        );
    }

    #[test]
    fn rejected_commands_leave_no_trace() {
        let mut table = Table::new(2);
        let before = table.lobby.clone();
        assert!(table.run(1, GameCommand::ConfirmDrink).is_err());
        assert!(table.draw(1, "KH").is_err());
        assert_eq!(table.lobby, before);
    }

    #[test]
    fn face_cards_assign_roles_and_advance_immediately() {
        let mut table = Table::new(2);
        let events = table.draw(0, "KH").unwrap();

        assert_eq!(table.lobby.role_of(table.id(0)), Some(Role::Mac));
        assert!(!table.lobby.is_blocked());
        assert_eq!(table.current(), Some(table.id(1)));
        assert!(events.iter().any(|event| event.kind == GameEventKind::RoleAssigned));
        assert_eq!(table.lobby.stats[&table.id(0)].face_cards, 1);

        table.draw(1, "AD").unwrap();
        assert_eq!(table.lobby.snail_player, Some(table.id(1)));
    }

    #[test]
    fn gender_cards_pick_matching_players() {
        let mut table = Table::new(4);
        table.set_gender(0, Gender::Male);
        table.set_gender(1, Gender::Female);
        table.set_gender(2, Gender::NonBinary);

        table.draw(0, "5S").unwrap();
        assert_eq!(table.drinkers(), vec![table.id(0), table.id(2)]);
        table.confirm_all();

        table.draw(1, "6S").unwrap();
        assert_eq!(table.drinkers(), vec![table.id(1), table.id(2)]);
    }

    #[test]
    fn gender_card_with_nobody_matching_moves_on() {
        let mut table = Table::new(2);
        table.draw(0, "6H").unwrap();
        assert!(table.lobby.active_prompt.is_none());
        assert_eq!(table.current(), Some(table.id(1)));
        assert_eq!(table.lobby.turn_number, 2);
    }

    #[test]
    fn choosing_a_drinker_chains_into_a_drink_prompt() {
        let mut table = Table::new(3);
        table.draw(0, "2C").unwrap();
        assert_eq!(
            table.run(1, GameCommand::ChoosePlayer { target: table.id(2) }),
            Err(CommandError::NotYourPrompt)
        );
        assert!(table
            .run(0, GameCommand::ChoosePlayer { target: table.id(0) })
            .is_err());

        table
            .run(0, GameCommand::ChoosePlayer { target: table.id(2) })
            .unwrap();
        assert_eq!(table.drinkers(), vec![table.id(2)]);
        assert_eq!(table.lobby.turn_number, 1);

        table.run(2, GameCommand::ConfirmDrink).unwrap();
        assert_eq!(table.current(), Some(table.id(1)));
        assert_eq!(table.lobby.turn_number, 2);
    }

    #[test]
    fn cancelling_a_choice_advances_the_turn() {
        let mut table = Table::new(2);
        table.draw(0, "2D").unwrap();
        table.run(0, GameCommand::CancelChoice).unwrap();
        assert!(!table.lobby.is_blocked());
        assert_eq!(table.current(), Some(table.id(1)));
    }

    #[test]
    fn eight_breaks_the_old_mate_and_pairs_a_new_one() {
        let mut table = Table::new(3);
        table.lobby.mate = Some(Mate {
            player1: table.id(1),
            player2: table.id(2),
        });

        let events = table.draw(0, "8S").unwrap();
        assert!(table.lobby.mate.is_none());
        assert!(events.iter().any(|event| event.kind == GameEventKind::MateBroken));

        table
            .run(0, GameCommand::ChooseMate { target: table.id(2) })
            .unwrap();
        assert_eq!(
            table.lobby.mate,
            Some(Mate {
                player1: table.id(0),
                player2: table.id(2),
            })
        );
        assert_eq!(table.current(), Some(table.id(1)));
    }

    #[test]
    fn rps_loser_drinks_and_turn_advances_from_the_drawer() {
        let mut table = Table::new(3);
        table.draw(0, "4H").unwrap();
        table
            .run(0, GameCommand::ChoosePlayer { target: table.id(2) })
            .unwrap();
        assert!(table.lobby.rps_game.is_some());
        assert_eq!(table.draw(0, "9S"), Err(CommandError::Blocked));

        for _ in 0..2 {
            table
                .run(0, GameCommand::ThrowRps { choice: RpsChoice::Rock })
                .unwrap();
            table
                .run(2, GameCommand::ThrowRps { choice: RpsChoice::Paper })
                .unwrap();
        }

        assert!(table.lobby.rps_game.is_none());
        assert_eq!(table.drinkers(), vec![table.id(0)]);
        assert_eq!(table.lobby.turn_number, 1);

        table.run(0, GameCommand::ConfirmDrink).unwrap();
        assert_eq!(table.current(), Some(table.id(1)));
        assert_eq!(table.lobby.turn_number, 2);
    }

    #[test]
    fn episode_game_cycles_and_fails_on_duplicates() {
        let mut table = Table::new(3);
        table.draw(0, "7S").unwrap();

        table
            .run(0, GameCommand::SubmitWord { word: "Gun Fever".into() })
            .unwrap();
        assert_eq!(
            table.run(0, GameCommand::SubmitWord { word: "Dee Gives Birth".into() }),
            Err(CommandError::NotYourTurn)
        );
        table
            .run(1, GameCommand::SubmitWord { word: "gun fever".into() })
            .unwrap();

        assert!(table.lobby.word_game.is_none());
        assert_eq!(table.drinkers(), vec![table.id(1)]);
        table.run(1, GameCommand::ConfirmDrink).unwrap();
        assert_eq!(table.current(), Some(table.id(1)));
        assert_eq!(table.lobby.turn_number, 2);
    }

    #[test]
    fn unknown_episode_fails_the_current_player() {
        let mut table = Table::new(2);
        table.draw(0, "7H").unwrap();
        table
            .run(0, GameCommand::SubmitWord { word: "Charlie Goes to Mars".into() })
            .unwrap();
        assert_eq!(table.drinkers(), vec![table.id(0)]);
    }

    #[test]
    fn rhyme_game_subject_then_challenge() {
        let mut table = Table::new(3);
        table.draw(0, "9D").unwrap();
        table
            .run(0, GameCommand::SubmitWord { word: "cat".into() })
            .unwrap();
        assert_eq!(
            table.lobby.word_game.as_ref().map(|game| game.current_index),
            Some(1)
        );
        table
            .run(1, GameCommand::SubmitWord { word: "hat".into() })
            .unwrap();
        assert_eq!(
            table.run(1, GameCommand::ChallengeWord),
            Err(CommandError::Rule("you cannot challenge your own answer"))
        );

        table.run(2, GameCommand::ChallengeWord).unwrap();
        assert_eq!(table.drinkers(), vec![table.id(1)]);
    }

    #[test]
    fn passing_or_ending_a_category_game() {
        let mut table = Table::new(2);
        table.draw(0, "0C").unwrap();
        table
            .run(0, GameCommand::SubmitWord { word: "beers".into() })
            .unwrap();
        table.run(1, GameCommand::PassWord).unwrap();
        assert_eq!(table.drinkers(), vec![table.id(1)]);
        table.confirm_all();
        assert_eq!(table.current(), Some(table.id(1)));

        table.draw(1, "0H").unwrap();
        table.run(0, GameCommand::EndWordGame).unwrap();
        assert!(!table.lobby.is_blocked());
        assert_eq!(table.current(), Some(table.id(0)));
    }

    #[test]
    fn drawing_every_card_finishes_the_game() {
        let rules = GameRules {
            max_players: 3,
            ..GameRules::default()
        };
        let mut table = Table::with_rules(3, rules);

        let mut guard = 0;
        while table.lobby.status == LobbyStatus::Playing {
            guard += 1;
            assert!(guard < 1_000, "game never finished");
            resolve_whatever_blocks(&mut table);
            if table.lobby.status != LobbyStatus::Playing {
                break;
            }
            if !table.lobby.is_blocked() {
                let current = table.current().unwrap();
                let seat = table.ids.iter().position(|id| *id == current).unwrap();
                let position = table
                    .lobby
                    .deck
                    .iter()
                    .position(|card| !card.drawn)
                    .unwrap();
                table.run(seat, GameCommand::DrawCard { position }).unwrap();
            }
        }

        assert_eq!(table.lobby.status, LobbyStatus::Finished);
        assert!(table.lobby.is_exhausted());
    }

    fn seat_of(table: &Table, id: PlayerId) -> usize {
        table.ids.iter().position(|candidate| *candidate == id).unwrap()
    }

    fn resolve_whatever_blocks(table: &mut Table) {
        if let Some(game) = table.lobby.word_game.clone() {
            let player = table.lobby.players[game.current_index].id;
            let seat = seat_of(table, player);
            table.run(seat, GameCommand::PassWord).unwrap();
            return;
        }
        if let Some(game) = table.lobby.rps_game.clone() {
            let (one, two) = (seat_of(table, game.player1), seat_of(table, game.player2));
            table
                .run(one, GameCommand::ThrowRps { choice: RpsChoice::Rock })
                .unwrap();
            table
                .run(two, GameCommand::ThrowRps { choice: RpsChoice::Scissors })
                .unwrap();
            return;
        }
        let Some(prompt) = table.lobby.active_prompt.clone() else {
            return;
        };
        match prompt.kind {
            PromptKind::Drink(_) => table.confirm_all(),
            PromptKind::ChoosePlayer { chooser, .. } | PromptKind::ChooseMate { chooser } => {
                let seat = seat_of(table, chooser);
                let target = table.ids[(seat + 1) % table.ids.len()];
                let command = match prompt.kind {
                    PromptKind::ChooseMate { .. } => GameCommand::ChooseMate { target },
                    _ => GameCommand::ChoosePlayer { target },
                };
                table.run(seat, command).unwrap();
            }
            other => panic!("unexpected prompt during a plain game: {other:?}"),
        }
    }

    #[test]
    fn host_leaving_migrates_and_passes_the_turn() {
        let mut table = Table::new(3);
        table.draw(0, "2S").unwrap();
        table.leave(0);

        let lobby = &table.lobby;
        assert!(lobby.players[0].is_host);
        assert_eq!(lobby.players[0].id, table.id(1));
        assert!(lobby.active_prompt.is_none());
        assert_eq!(lobby.current_player_id, Some(table.id(1)));
        assert_eq!(lobby.turn_number, 2);
    }

    #[test]
    fn leaving_drinker_no_longer_blocks_the_prompt() {
        let mut table = Table::new(3);
        table.set_gender(0, Gender::Female);
        table.set_gender(2, Gender::Female);
        table.draw(0, "6D").unwrap();
        table.run(0, GameCommand::ConfirmDrink).unwrap();

        table.leave(2);
        assert!(table.lobby.active_prompt.is_none());
        assert_eq!(table.current(), Some(table.id(1)));
    }

    #[test]
    fn nightman_timeout_ignores_stale_prompts() {
        let mut table = Table::new(2);
        table.set_role(0, Role::Charlie);
        table
            .run(0, GameCommand::DaymanChooseNightman { target: table.id(1) })
            .unwrap();
        table.run(0, GameCommand::DaymanCallOut).unwrap();
        let prompt_id = table.lobby.active_prompt.as_ref().unwrap().id;

        let rules = table.rules.clone();
        let mut rng = StdRng::seed_from_u64(5);
        let mut ctx = CommandContext::new(&rules, &mut rng, SystemTime::now());
        assert_eq!(
            table.lobby.expire_nightman(Uuid::new_v4(), &mut ctx),
            Err(CommandError::NoActivePrompt)
        );
        table.lobby.expire_nightman(prompt_id, &mut ctx).unwrap();
        assert_eq!(table.drinkers(), vec![table.id(1)]);
        assert_eq!(
            table.lobby.expire_nightman(prompt_id, &mut ctx),
            Err(CommandError::NoActivePrompt)
        );
    }
}
