//! The 52-card deck: ranks, suits, card codes and the effect each rank triggers.

use std::{fmt, str::FromStr};

use rand::{RngCore, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::{
    lobby::{PlayerId, Role},
    minigames::WordGameKind,
    prompt::GenderCard,
};

/// Number of cards in a full deck.
pub const DECK_SIZE: usize = 52;

/// Card suit; only selects flavor and the character granted by face cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suit {
    Spades,
    Hearts,
    Clubs,
    Diamonds,
}

impl Suit {
    /// Suits in the order the unshuffled deck is built.
    pub const ALL: [Suit; 4] = [Suit::Spades, Suit::Hearts, Suit::Clubs, Suit::Diamonds];

    fn code(self) -> char {
        match self {
            Suit::Spades => 'S',
            Suit::Hearts => 'H',
            Suit::Clubs => 'C',
            Suit::Diamonds => 'D',
        }
    }

    fn from_code(code: char) -> Option<Self> {
        match code {
            'S' => Some(Suit::Spades),
            'H' => Some(Suit::Hearts),
            'C' => Some(Suit::Clubs),
            'D' => Some(Suit::Diamonds),
            _ => None,
        }
    }
}

/// Card face value; the rank alone decides the mechanic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

/// Mechanic triggered by drawing a card of a given rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardEffect {
    /// Face cards and aces hand the drawer a character.
    AssignRole,
    /// The drawer picks someone to drink.
    ChooseDrinker,
    /// The drawer drinks.
    DrawerDrinks,
    /// Everyone matching the gender card drinks.
    GenderDrink(GenderCard),
    /// The drawer picks a rock-paper-scissors opponent.
    RpsChallenge,
    /// A word game starts with the drawer.
    WordGame(WordGameKind),
    /// The drawer picks a mate.
    ChooseMate,
}

impl Rank {
    /// Ranks in the order the unshuffled deck is built.
    pub const ALL: [Rank; 13] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ];

    fn code(self) -> char {
        match self {
            Rank::Ace => 'A',
            Rank::Two => '2',
            Rank::Three => '3',
            Rank::Four => '4',
            Rank::Five => '5',
            Rank::Six => '6',
            Rank::Seven => '7',
            Rank::Eight => '8',
            Rank::Nine => '9',
            Rank::Ten => '0',
            Rank::Jack => 'J',
            Rank::Queen => 'Q',
            Rank::King => 'K',
        }
    }

    fn from_code(code: char) -> Option<Self> {
        Rank::ALL.into_iter().find(|rank| rank.code() == code)
    }

    /// Whether the rank counts as a face card for stats.
    pub fn is_face(self) -> bool {
        matches!(self, Rank::Ace | Rank::Jack | Rank::Queen | Rank::King)
    }

    /// Mechanic triggered when a card of this rank is drawn.
    pub fn effect(self) -> CardEffect {
        match self {
            Rank::Ace | Rank::Jack | Rank::Queen | Rank::King => CardEffect::AssignRole,
            Rank::Two => CardEffect::ChooseDrinker,
            Rank::Three => CardEffect::DrawerDrinks,
            Rank::Four => CardEffect::RpsChallenge,
            Rank::Five => CardEffect::GenderDrink(GenderCard::Guys),
            Rank::Six => CardEffect::GenderDrink(GenderCard::Chicks),
            Rank::Seven => CardEffect::WordGame(WordGameKind::Episodes),
            Rank::Eight => CardEffect::ChooseMate,
            Rank::Nine => CardEffect::WordGame(WordGameKind::Rhymes),
            Rank::Ten => CardEffect::WordGame(WordGameKind::Categories),
        }
    }
}

/// Two-character card code such as `KH` or `0S` (`0` stands for ten).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct CardCode {
    pub rank: Rank,
    pub suit: Suit,
}

/// Raised when a string is not a valid two-character card code.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid card code `{0}`")]
pub struct InvalidCardCode(String);

impl CardCode {
    /// Build a code from its parts.
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { rank, suit }
    }

    /// Character granted by this card, for aces and face cards.
    pub fn character(self) -> Option<Role> {
        let role = match (self.rank, self.suit) {
            (Rank::King, Suit::Spades) => Role::GoldenGod,
            (Rank::King, Suit::Hearts) => Role::Mac,
            (Rank::King, Suit::Clubs) => Role::Frank,
            (Rank::King, Suit::Diamonds) => Role::Charlie,
            (Rank::Queen, Suit::Spades) => Role::Dee,
            (Rank::Queen, Suit::Hearts) => Role::Carmen,
            (Rank::Queen, Suit::Clubs) => Role::Maureen,
            (Rank::Queen, Suit::Diamonds) => Role::Waitress,
            (Rank::Jack, Suit::Spades) => Role::UncleJack,
            (Rank::Jack, Suit::Hearts) => Role::Cricket,
            (Rank::Jack, Suit::Clubs) => Role::Z,
            (Rank::Jack, Suit::Diamonds) => Role::Liam,
            (Rank::Ace, Suit::Spades) => Role::Barbara,
            (Rank::Ace, Suit::Hearts) => Role::Bruce,
            (Rank::Ace, Suit::Clubs) => Role::Gino,
            (Rank::Ace, Suit::Diamonds) => Role::Gail,
            _ => return None,
        };
        Some(role)
    }
}

impl fmt::Display for CardCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.code(), self.suit.code())
    }
}

impl FromStr for CardCode {
    type Err = InvalidCardCode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut chars = value.chars();
        let parsed = match (chars.next(), chars.next(), chars.next()) {
            (Some(rank), Some(suit), None) => Rank::from_code(rank)
                .zip(Suit::from_code(suit))
                .map(|(rank, suit)| CardCode::new(rank, suit)),
            _ => None,
        };
        parsed.ok_or_else(|| InvalidCardCode(value.to_owned()))
    }
}

/// One slot on the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Card {
    /// Card code (rank then suit).
    #[schema(value_type = String, example = "KH")]
    pub code: CardCode,
    /// Whether the card has been flipped this game.
    pub drawn: bool,
    /// Player who flipped the card.
    pub drawn_by: Option<PlayerId>,
    /// Slot index on the table.
    pub position: usize,
}

/// Every card code in suit-major order.
pub fn ordered_codes() -> impl Iterator<Item = CardCode> {
    Suit::ALL
        .into_iter()
        .flat_map(|suit| Rank::ALL.into_iter().map(move |rank| CardCode::new(rank, suit)))
}

/// Build a fresh face-down deck shuffled with Fisher–Yates.
pub fn shuffled_deck(rng: &mut dyn RngCore) -> Vec<Card> {
    let mut codes: Vec<CardCode> = ordered_codes().collect();
    codes.shuffle(rng);
    codes
        .into_iter()
        .enumerate()
        .map(|(position, code)| Card {
            code,
            drawn: false,
            drawn_by: None,
            position,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn codes_round_trip_through_strings() {
        let code: CardCode = "0D".parse().unwrap();
        assert_eq!(code, CardCode::new(Rank::Ten, Suit::Diamonds));
        assert_eq!(code.to_string(), "0D");
        assert_eq!(
            serde_json::to_string(&CardCode::new(Rank::King, Suit::Hearts)).unwrap(),
            "\"KH\""
        );
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!("1S".parse::<CardCode>().is_err());
        assert!("KX".parse::<CardCode>().is_err());
        assert!("KHS".parse::<CardCode>().is_err());
        assert!("".parse::<CardCode>().is_err());
    }

    #[test]
    fn shuffled_deck_holds_every_card_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let deck = shuffled_deck(&mut rng);

        assert_eq!(deck.len(), DECK_SIZE);
        let unique: HashSet<_> = deck.iter().map(|card| card.code).collect();
        assert_eq!(unique.len(), DECK_SIZE);
        assert!(deck.iter().all(|card| !card.drawn && card.drawn_by.is_none()));
        assert!(deck.iter().enumerate().all(|(i, card)| card.position == i));
    }

    #[test]
    fn rank_decides_the_mechanic_regardless_of_suit() {
        for suit in Suit::ALL {
            assert_eq!(
                CardCode::new(Rank::Three, suit).rank.effect(),
                CardEffect::DrawerDrinks
            );
            assert!(CardCode::new(Rank::Queen, suit).character().is_some());
            assert!(CardCode::new(Rank::Nine, suit).character().is_none());
        }
        assert_eq!(
            CardCode::new(Rank::King, Suit::Diamonds).character(),
            Some(Role::Charlie)
        );
        assert_eq!(
            CardCode::new(Rank::Ace, Suit::Diamonds).character(),
            Some(Role::Gail)
        );
    }
}
