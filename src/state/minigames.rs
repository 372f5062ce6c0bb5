//! Word game, rock-paper-scissors and voting mini-games layered on the lobby.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::{lobby::PlayerId, state_machine::CommandError};

/// Flavor of word game started by a 7, 9 or 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WordGameKind {
    Episodes,
    Rhymes,
    Categories,
}

impl WordGameKind {
    /// Short label used in logs and event details.
    pub fn label(self) -> &'static str {
        match self {
            WordGameKind::Episodes => "episodes",
            WordGameKind::Rhymes => "rhymes",
            WordGameKind::Categories => "categories",
        }
    }
}

/// Why a word-game submission was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordRejection {
    Duplicate,
    UnknownEpisode,
}

/// Outcome of checking a submission against the game so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordVerdict {
    /// The first rhyme/category entry sets the subject.
    Subject(String),
    /// A fresh, valid answer.
    Accepted(String),
    Rejected(WordRejection),
}

/// Players take turns naming episodes, rhymes or category members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WordGame {
    /// Which word game the card started.
    pub kind: WordGameKind,
    /// Rhyme word or category, once the starter has named it.
    pub subject: Option<String>,
    /// Accepted answers, in order.
    pub used_words: Vec<String>,
    /// Index into the lobby's join-order player list.
    pub current_index: usize,
    /// Drawer of the card that started the game.
    pub starting_player: PlayerId,
    /// Player who gave the most recent accepted answer.
    pub last_answer_by: Option<PlayerId>,
}

impl WordGame {
    /// Start a game with the drawer at `starter_index`.
    pub fn new(kind: WordGameKind, starting_player: PlayerId, starter_index: usize) -> Self {
        Self {
            kind,
            subject: None,
            used_words: Vec::new(),
            current_index: starter_index,
            starting_player,
            last_answer_by: None,
        }
    }

    /// Check a trimmed, non-empty submission.
    pub fn judge(&self, word: &str, episodes: &[String]) -> WordVerdict {
        let needs_subject = self.kind != WordGameKind::Episodes && self.subject.is_none();
        if needs_subject {
            return WordVerdict::Subject(word.to_owned());
        }

        if self.kind == WordGameKind::Episodes
            && !episodes
                .iter()
                .any(|episode| episode.trim().eq_ignore_ascii_case(word))
        {
            return WordVerdict::Rejected(WordRejection::UnknownEpisode);
        }

        let repeats_subject = self.kind == WordGameKind::Rhymes
            && self
                .subject
                .as_deref()
                .is_some_and(|subject| subject.eq_ignore_ascii_case(word));
        if repeats_subject || self.is_used(word) {
            return WordVerdict::Rejected(WordRejection::Duplicate);
        }

        WordVerdict::Accepted(word.to_owned())
    }

    /// Case-insensitive membership in the used words.
    pub fn is_used(&self, word: &str) -> bool {
        self.used_words
            .iter()
            .any(|used| used.eq_ignore_ascii_case(word))
    }

    /// Move to the next player in join order.
    pub fn pass_to_next(&mut self, player_count: usize) {
        if player_count > 0 {
            self.current_index = (self.current_index + 1) % player_count;
        }
    }
}

/// A rock-paper-scissors throw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RpsChoice {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
}

impl RpsChoice {
    /// Whether this throw beats `other`.
    pub fn beats(self, other: RpsChoice) -> bool {
        matches!(
            (self, other),
            (RpsChoice::Rock, RpsChoice::Scissors)
                | (RpsChoice::Scissors, RpsChoice::Paper)
                | (RpsChoice::Paper, RpsChoice::Rock)
        )
    }
}

/// Both throws of a scored round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RpsRound {
    /// One-based round number.
    pub round: u32,
    /// Throw of the drawer.
    pub choice1: RpsChoice,
    /// Throw of the challenged player.
    pub choice2: RpsChoice,
    /// Unset on a tie.
    pub winner: Option<PlayerId>,
}

/// A best-of-three between the drawer and the player they picked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RpsGame {
    /// The drawer.
    pub player1: PlayerId,
    /// The player they picked.
    pub player2: PlayerId,
    /// Hidden until both have thrown.
    pub choice1: Option<RpsChoice>,
    /// Hidden until both have thrown.
    pub choice2: Option<RpsChoice>,
    /// Rounds won by `player1`.
    pub score1: u8,
    /// Rounds won by `player2`.
    pub score2: u8,
    /// Round currently being thrown.
    pub round: u32,
    /// Most recently scored round.
    pub last_round: Option<RpsRound>,
}

impl RpsGame {
    /// Fresh match, round one.
    pub fn new(player1: PlayerId, player2: PlayerId) -> Self {
        Self {
            player1,
            player2,
            choice1: None,
            choice2: None,
            score1: 0,
            score2: 0,
            round: 1,
            last_round: None,
        }
    }

    /// Whether `player` is one of the two contestants.
    pub fn involves(&self, player: PlayerId) -> bool {
        self.player1 == player || self.player2 == player
    }

    /// Record a throw; once both are in, score the round and return it.
    pub fn throw(
        &mut self,
        player: PlayerId,
        choice: RpsChoice,
    ) -> Result<Option<RpsRound>, CommandError> {
        let slot = if player == self.player1 {
            &mut self.choice1
        } else if player == self.player2 {
            &mut self.choice2
        } else {
            return Err(CommandError::NotYourPrompt);
        };
        if slot.is_some() {
            return Err(CommandError::Rule("you already threw this round"));
        }
        *slot = Some(choice);

        let (Some(choice1), Some(choice2)) = (self.choice1, self.choice2) else {
            return Ok(None);
        };

        let winner = if choice1.beats(choice2) {
            self.score1 += 1;
            Some(self.player1)
        } else if choice2.beats(choice1) {
            self.score2 += 1;
            Some(self.player2)
        } else {
            None
        };

        let scored = RpsRound {
            round: self.round,
            choice1,
            choice2,
            winner,
        };
        self.last_round = Some(scored);
        self.round += 1;
        self.choice1 = None;
        self.choice2 = None;
        Ok(Some(scored))
    }

    /// `(winner, loser)` once someone reached `wins_needed`.
    pub fn decided(&self, wins_needed: u8) -> Option<(PlayerId, PlayerId)> {
        if self.score1 >= wins_needed {
            Some((self.player1, self.player2))
        } else if self.score2 >= wins_needed {
            Some((self.player2, self.player1))
        } else {
            None
        }
    }
}

/// What the table is voting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoteKind {
    /// Bruce wants to donate his drink to `target`.
    Charity {
        bruce: PlayerId,
        target: PlayerId,
        reason: String,
    },
    /// Gino wants to swap his drink onto `target`.
    Swap {
        gino: PlayerId,
        target: PlayerId,
        excuse: String,
    },
}

/// An open ballot; `true` approves the initiator's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Vote {
    /// Request being voted on.
    pub kind: VoteKind,
    #[schema(value_type = Object)]
    pub ballots: BTreeMap<PlayerId, bool>,
}

impl Vote {
    /// Open a vote with no ballots cast.
    pub fn new(kind: VoteKind) -> Self {
        Self {
            kind,
            ballots: BTreeMap::new(),
        }
    }

    /// Player who asked for the vote.
    pub fn initiator(&self) -> PlayerId {
        match &self.kind {
            VoteKind::Charity { bruce, .. } => *bruce,
            VoteKind::Swap { gino, .. } => *gino,
        }
    }

    /// Player who would take the drink if the vote passes.
    pub fn target(&self) -> PlayerId {
        match &self.kind {
            VoteKind::Charity { target, .. } | VoteKind::Swap { target, .. } => *target,
        }
    }

    /// Record a ballot from an eligible voter.
    pub fn cast(&mut self, voter: PlayerId, approve: bool) -> Result<(), CommandError> {
        if voter == self.initiator() {
            return Err(CommandError::Rule("you cannot vote on your own request"));
        }
        if self.ballots.contains_key(&voter) {
            return Err(CommandError::Rule("you already voted"));
        }
        self.ballots.insert(voter, approve);
        Ok(())
    }

    /// `(approvals, rejections)` so far.
    pub fn tally(&self) -> (usize, usize) {
        let approvals = self.ballots.values().filter(|ballot| **ballot).count();
        (approvals, self.ballots.len() - approvals)
    }

    /// Whether every eligible voter has voted.
    pub fn is_complete(&self, eligible: usize) -> bool {
        self.ballots.len() >= eligible
    }

    /// Whether the request is granted given `eligible` voters.
    ///
    /// A charity donation stands unless scam votes strictly outnumber legit
    /// ones. A swap needs approvals from at least half the voters, rounded up.
    pub fn passes(&self, eligible: usize) -> bool {
        let (approvals, rejections) = self.tally();
        match self.kind {
            VoteKind::Charity { .. } => rejections <= approvals,
            VoteKind::Swap { .. } => approvals >= eligible.div_ceil(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episodes() -> Vec<String> {
        vec!["The Nightman Cometh".into(), "Gun Fever".into()]
    }

    #[test]
    fn episodes_must_be_known_and_fresh() {
        let mut game = WordGame::new(WordGameKind::Episodes, PlayerId::new(), 0);
        assert_eq!(
            game.judge("the nightman cometh", &episodes()),
            WordVerdict::Accepted("the nightman cometh".into())
        );
        game.used_words.push("the nightman cometh".into());

        assert_eq!(
            game.judge("THE NIGHTMAN COMETH", &episodes()),
            WordVerdict::Rejected(WordRejection::Duplicate)
        );
        assert_eq!(
            game.judge("Charlie Work", &episodes()),
            WordVerdict::Rejected(WordRejection::UnknownEpisode)
        );
    }

    #[test]
    fn rhymes_start_with_a_subject() {
        let mut game = WordGame::new(WordGameKind::Rhymes, PlayerId::new(), 1);
        assert_eq!(game.judge("cat", &[]), WordVerdict::Subject("cat".into()));
        game.subject = Some("cat".into());

        assert_eq!(
            game.judge("Cat", &[]),
            WordVerdict::Rejected(WordRejection::Duplicate)
        );
        assert_eq!(game.judge("hat", &[]), WordVerdict::Accepted("hat".into()));
        game.used_words.push("hat".into());
        assert_eq!(
            game.judge("HAT", &[]),
            WordVerdict::Rejected(WordRejection::Duplicate)
        );
    }

    #[test]
    fn word_game_index_wraps() {
        let mut game = WordGame::new(WordGameKind::Categories, PlayerId::new(), 2);
        game.pass_to_next(3);
        assert_eq!(game.current_index, 0);
    }

    #[test]
    fn rps_ties_replay_and_first_to_two_wins() {
        let a = PlayerId::new();
        let b = PlayerId::new();
        let mut game = RpsGame::new(a, b);

        assert_eq!(game.throw(a, RpsChoice::Rock).unwrap(), None);
        assert!(game.throw(a, RpsChoice::Paper).is_err());
        let tie = game.throw(b, RpsChoice::Rock).unwrap().unwrap();
        assert_eq!(tie.winner, None);
        assert_eq!((game.score1, game.score2), (0, 0));

        game.throw(a, RpsChoice::Paper).unwrap();
        game.throw(b, RpsChoice::Rock).unwrap();
        assert_eq!(game.decided(2), None);
        game.throw(b, RpsChoice::Scissors).unwrap();
        let last = game.throw(a, RpsChoice::Rock).unwrap().unwrap();
        assert_eq!(last.winner, Some(a));
        assert_eq!(game.decided(2), Some((a, b)));
        assert_eq!(game.round, 4);
    }

    #[test]
    fn strangers_cannot_throw() {
        let mut game = RpsGame::new(PlayerId::new(), PlayerId::new());
        assert_eq!(
            game.throw(PlayerId::new(), RpsChoice::Rock),
            Err(CommandError::NotYourPrompt)
        );
    }

    #[test]
    fn charity_fails_only_on_strict_scam_majority() {
        let bruce = PlayerId::new();
        let voters: Vec<PlayerId> = (0..4).map(|_| PlayerId::new()).collect();
        let mut vote = Vote::new(VoteKind::Charity {
            bruce,
            target: voters[0],
            reason: "orphans".into(),
        });
        assert!(vote.cast(bruce, true).is_err());

        vote.cast(voters[0], true).unwrap();
        vote.cast(voters[1], false).unwrap();
        assert!(!vote.is_complete(4));
        assert!(vote.cast(voters[1], true).is_err());
        vote.cast(voters[2], true).unwrap();
        vote.cast(voters[3], false).unwrap();
        assert!(vote.is_complete(4));
        assert!(vote.passes(4));
    }

    #[test]
    fn swap_needs_half_rounded_up() {
        let gino = PlayerId::new();
        let voters: Vec<PlayerId> = (0..3).map(|_| PlayerId::new()).collect();
        let mut vote = Vote::new(VoteKind::Swap {
            gino,
            target: voters[2],
            excuse: "my cousin".into(),
        });
        vote.cast(voters[0], true).unwrap();
        vote.cast(voters[1], false).unwrap();
        vote.cast(voters[2], false).unwrap();
        assert!(!vote.passes(3));

        let mut vote = Vote::new(VoteKind::Swap {
            gino,
            target: voters[2],
            excuse: "my cousin".into(),
        });
        vote.cast(voters[0], true).unwrap();
        vote.cast(voters[1], true).unwrap();
        vote.cast(voters[2], false).unwrap();
        assert!(vote.passes(3));
    }
}
