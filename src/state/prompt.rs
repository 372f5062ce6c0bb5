//! Blocking prompts awaiting player input.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{cards::CardCode, lobby::PlayerId, state_machine::CommandError};

/// Gender drink cards: 5 is for the guys, 6 for the chicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenderCard {
    Guys,
    Chicks,
}

/// What the chosen player is picked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChoicePurpose {
    Drink,
    Rps,
}

/// Challenges Mac can throw at another player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MacChallengeKind {
    Karate,
    Confession,
    Toughness,
}

/// Act a player can put on when Frank calls them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceKind {
    Dance,
    Song,
    Impression,
    Joke,
    Poem,
    Freestyle,
}

/// Players who must drink and who has confirmed so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DrinkPrompt {
    pub drinkers: Vec<PlayerId>,
    pub confirmed: Vec<PlayerId>,
    pub message: String,
    /// Set when the prompt comes from a gender card; enables non-binary passes.
    pub gender_card: Option<GenderCard>,
    /// Drinkers owe a double.
    #[serde(default)]
    pub double: bool,
    /// Barbara's die roll, once she has rolled on this prompt.
    #[serde(default)]
    pub barbara_roll: Option<u8>,
}

impl DrinkPrompt {
    /// A prompt for `drinkers`, none of whom has confirmed yet.
    pub fn new(drinkers: Vec<PlayerId>, message: impl Into<String>) -> Self {
        Self {
            drinkers,
            confirmed: Vec::new(),
            message: message.into(),
            gender_card: None,
            double: false,
            barbara_roll: None,
        }
    }

    /// Whether `player` still owes a confirmation.
    pub fn is_pending(&self, player: PlayerId) -> bool {
        self.drinkers.contains(&player) && !self.confirmed.contains(&player)
    }

    /// Drinkers that have not confirmed yet.
    pub fn pending(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.drinkers
            .iter()
            .copied()
            .filter(|id| !self.confirmed.contains(id))
    }

    /// Confirmed set covers the drink set.
    pub fn is_satisfied(&self) -> bool {
        self.drinkers.iter().all(|id| self.confirmed.contains(id))
    }

    /// Mark a pending drinker as done.
    pub fn confirm(&mut self, player: PlayerId) -> Result<(), CommandError> {
        if self.confirmed.contains(&player) {
            return Err(CommandError::AlreadyConfirmed);
        }
        if !self.drinkers.contains(&player) {
            return Err(CommandError::NotYourPrompt);
        }
        self.confirmed.push(player);
        Ok(())
    }

    /// Drop a player from the obligation entirely.
    pub fn release(&mut self, player: PlayerId) {
        self.drinkers.retain(|id| *id != player);
        self.confirmed.retain(|id| *id != player);
    }

    /// Add drinkers; a player who already confirmed owes another drink.
    pub fn enlist(&mut self, players: impl IntoIterator<Item = PlayerId>) {
        for player in players {
            self.confirmed.retain(|id| *id != player);
            if !self.drinkers.contains(&player) {
                self.drinkers.push(player);
            }
        }
    }
}

/// The shape of the prompt currently gating the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptKind {
    Drink(DrinkPrompt),
    ChoosePlayer {
        chooser: PlayerId,
        purpose: ChoicePurpose,
    },
    ChooseMate {
        chooser: PlayerId,
    },
    MacChallenge {
        mac: PlayerId,
        target: PlayerId,
        challenge: MacChallengeKind,
    },
    FrankPerformance {
        frank: PlayerId,
        target: PlayerId,
    },
    FrankJudgement {
        frank: PlayerId,
        performer: PlayerId,
        performance: PerformanceKind,
    },
    NightmanResponse {
        dayman: PlayerId,
        nightman: PlayerId,
        /// Unix epoch milliseconds after which the call-out expires.
        deadline_ms: u64,
    },
}

impl PromptKind {
    /// Whether the prompt waits on `player` or names them.
    pub fn involves(&self, player: PlayerId) -> bool {
        match self {
            PromptKind::Drink(drink) => drink.drinkers.contains(&player),
            PromptKind::ChoosePlayer { chooser, .. } | PromptKind::ChooseMate { chooser } => {
                *chooser == player
            }
            PromptKind::MacChallenge { mac, target, .. } => *mac == player || *target == player,
            PromptKind::FrankPerformance { frank, target } => *frank == player || *target == player,
            PromptKind::FrankJudgement {
                frank, performer, ..
            } => *frank == player || *performer == player,
            PromptKind::NightmanResponse {
                dayman, nightman, ..
            } => *dayman == player || *nightman == player,
        }
    }
}

/// The single prompt blocking the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActivePrompt {
    pub id: Uuid,
    /// Card that produced the prompt, for card-resolution prompts.
    #[schema(value_type = Option<String>)]
    pub card_code: Option<CardCode>,
    /// Drawer of the card being resolved. Clearing the prompt advances the
    /// turn from this player; unset for prompts raised out of turn.
    pub drawn_by: Option<PlayerId>,
    pub kind: PromptKind,
}

impl ActivePrompt {
    /// Wrap a prompt body with a fresh id.
    pub fn new(kind: PromptKind, card_code: Option<CardCode>, drawn_by: Option<PlayerId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_code,
            drawn_by,
            kind,
        }
    }

    /// Drink body, if this is a drink prompt.
    pub fn drink(&self) -> Option<&DrinkPrompt> {
        match &self.kind {
            PromptKind::Drink(drink) => Some(drink),
            _ => None,
        }
    }

    /// Mutable drink body, if this is a drink prompt.
    pub fn drink_mut(&mut self) -> Option<&mut DrinkPrompt> {
        match &mut self.kind {
            PromptKind::Drink(drink) => Some(drink),
            _ => None,
        }
    }
}
