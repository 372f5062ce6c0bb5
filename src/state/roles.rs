//! Character abilities: drink-prompt interceptions and out-of-turn actions.

use std::collections::BTreeMap;

use crate::state::{
    lobby::{DaymanNightman, Gender, Lobby, PlayerId, Role, RoleCounters},
    minigames::{Vote, VoteKind},
    prompt::{DrinkPrompt, MacChallengeKind, PerformanceKind, PromptKind},
    state_machine::{CommandContext, CommandError, GameEventKind, GameLogEntry, Outcome},
};

fn under_cap(
    counters: &BTreeMap<PlayerId, u32>,
    player: PlayerId,
    cap: u32,
    ability: &'static str,
) -> Result<(), CommandError> {
    if RoleCounters::get(counters, player) < cap {
        Ok(())
    } else {
        Err(CommandError::CapReached { ability, cap })
    }
}

impl Lobby {
    fn require_role(&self, actor: PlayerId, role: Role) -> Result<(), CommandError> {
        if self.role_of(actor) == Some(role) {
            Ok(())
        } else {
            Err(CommandError::MissingRole(role))
        }
    }

    /// The active drink prompt, provided `actor` still owes a drink on it.
    fn owed_drink(&self, actor: PlayerId) -> Result<&DrinkPrompt, CommandError> {
        self.require_no_vote_on(actor)?;
        let drink = self.drink_prompt()?;
        if drink.is_pending(actor) {
            Ok(drink)
        } else {
            Err(CommandError::NotYourPrompt)
        }
    }

    fn require_idle(&self) -> Result<(), CommandError> {
        if self.is_blocked() {
            Err(CommandError::Blocked)
        } else {
            Ok(())
        }
    }

    fn special(&self, actor: PlayerId, action: &str) -> GameLogEntry {
        GameLogEntry::new(GameEventKind::SpecialAction, Some(actor), self.name_of(actor))
            .action(action)
    }

    /// Drinkers a redirect adds: `target` and their mate, never the redirecting player.
    fn redirect_set(&self, actor: PlayerId, target: PlayerId) -> Vec<PlayerId> {
        self.with_mates([target])
            .into_iter()
            .filter(|id| *id != actor)
            .collect()
    }

    /// Replace the current out-of-turn prompt, keeping its turn owner.
    fn follow_up(&mut self, outcome: Outcome, ctx: &mut CommandContext<'_>) {
        let (drawn_by, card_code) = self
            .active_prompt
            .as_ref()
            .map(|prompt| (prompt.drawn_by, prompt.card_code))
            .unwrap_or_default();
        self.conclude(drawn_by, card_code, outcome, ctx);
    }

    fn check_mac_action(&self, mac: PlayerId, cap: u32) -> Result<(), CommandError> {
        under_cap(&self.counters.mac_action_uses, mac, cap, "mac actions")?;
        if self.counters.mac_last_action_turn.get(&mac) == Some(&self.turn_number) {
            return Err(CommandError::Rule("Mac already acted this turn"));
        }
        Ok(())
    }

    fn spend_mac_action(&mut self, mac: PlayerId) {
        RoleCounters::bump(&mut self.counters.mac_action_uses, mac);
        self.counters
            .mac_last_action_turn
            .insert(mac, self.turn_number);
        self.stats_mut(mac).actions_used += 1;
    }

    pub(super) fn golden_god_redirect(
        &mut self,
        actor: PlayerId,
        target: Option<PlayerId>,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::GoldenGod)?;
        self.owed_drink(actor)?;
        under_cap(
            &self.counters.golden_god_redirects,
            actor,
            ctx.rules.golden_god_redirects,
            "golden god redirects",
        )?;
        let added = match target {
            Some(target) => {
                self.require_other(actor, target)?;
                self.redirect_set(actor, target)
            }
            None => Vec::new(),
        };

        RoleCounters::bump(&mut self.counters.golden_god_redirects, actor);
        self.stats_mut(actor).actions_used += 1;
        let drink = self.drink_prompt_mut()?;
        drink.release(actor);
        drink.enlist(added);

        let mut entry = self.special(actor, "golden_god_redirect");
        if let Some(target) = target {
            entry = entry.target(self.name_of(target));
        }
        ctx.record(entry);
        self.try_clear_drink(ctx);
        Ok(())
    }

    pub(super) fn non_binary_pass(
        &mut self,
        actor: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        if self.player(actor).and_then(|player| player.gender) != Some(Gender::NonBinary) {
            return Err(CommandError::Rule("only non-binary players can pass"));
        }
        if self.owed_drink(actor)?.gender_card.is_none() {
            return Err(CommandError::Rule("passes only work on gender cards"));
        }
        under_cap(
            &self.counters.non_binary_passes,
            actor,
            ctx.rules.non_binary_passes,
            "non-binary passes",
        )?;

        RoleCounters::bump(&mut self.counters.non_binary_passes, actor);
        self.stats_mut(actor).actions_used += 1;
        self.drink_prompt_mut()?.confirm(actor)?;
        ctx.record(self.special(actor, "non_binary_pass"));
        self.try_clear_drink(ctx);
        Ok(())
    }

    pub(super) fn tiny_hands(
        &mut self,
        actor: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::UncleJack)?;
        self.owed_drink(actor)?;
        under_cap(
            &self.counters.uncle_jack_uses,
            actor,
            ctx.rules.uncle_jack_uses,
            "tiny hands",
        )?;

        RoleCounters::bump(&mut self.counters.uncle_jack_uses, actor);
        self.drink_prompt_mut()?.confirm(actor)?;
        let stats = self.stats_mut(actor);
        stats.actions_used += 1;
        stats.drinks += 1;
        ctx.record(self.special(actor, "tiny_hands").message("a tiny sip"));
        self.try_clear_drink(ctx);
        Ok(())
    }

    fn cricket_allowance(&self, cricket: PlayerId, per_confession: u32) -> u32 {
        let confessions = RoleCounters::get(&self.counters.cricket_confessions, cricket);
        per_confession.saturating_mul(confessions + 1)
    }

    pub(super) fn cricket_deny(
        &mut self,
        actor: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Cricket)?;
        self.owed_drink(actor)?;
        let allowance = self.cricket_allowance(actor, ctx.rules.cricket_denials);
        under_cap(&self.counters.cricket_denials, actor, allowance, "cricket denials")?;

        RoleCounters::bump(&mut self.counters.cricket_denials, actor);
        self.stats_mut(actor).actions_used += 1;
        self.drink_prompt_mut()?.release(actor);
        ctx.record(self.special(actor, "cricket_deny"));
        self.try_clear_drink(ctx);
        Ok(())
    }

    pub(super) fn cricket_confess(
        &mut self,
        actor: PlayerId,
        confession: &str,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Cricket)?;
        self.owed_drink(actor)?;
        let allowance = self.cricket_allowance(actor, ctx.rules.cricket_denials);
        if RoleCounters::get(&self.counters.cricket_denials, actor) < allowance {
            return Err(CommandError::Rule("confess once your denials are used up"));
        }
        let confession = confession.trim();
        if confession.is_empty() {
            return Err(CommandError::InvalidInput("confession must not be empty".into()));
        }

        RoleCounters::bump(&mut self.counters.cricket_confessions, actor);
        self.drink_prompt_mut()?.confirm(actor)?;
        let stats = self.stats_mut(actor);
        stats.actions_used += 1;
        stats.drinks += 1;
        ctx.record(self.special(actor, "cricket_confess").message(confession));
        self.try_clear_drink(ctx);
        Ok(())
    }

    pub(super) fn mac_bodyguard(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Mac)?;
        self.require_other(actor, target)?;
        if !self.drink_prompt()?.is_pending(target) {
            return Err(CommandError::Rule("that player has nothing to drink"));
        }
        self.check_mac_action(actor, ctx.rules.mac_actions)?;

        self.spend_mac_action(actor);
        self.drink_prompt_mut()?.release(target);
        ctx.record(
            self.special(actor, "mac_bodyguard")
                .target(self.name_of(target)),
        );
        self.try_clear_drink(ctx);
        Ok(())
    }

    pub(super) fn mac_protein_share(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Mac)?;
        self.owed_drink(actor)?;
        self.require_other(actor, target)?;
        self.check_mac_action(actor, ctx.rules.mac_actions)?;
        let added = self.redirect_set(actor, target);

        self.spend_mac_action(actor);
        let drink = self.drink_prompt_mut()?;
        drink.enlist(added);
        drink.confirm(actor)?;
        self.stats_mut(actor).drinks += 1;
        ctx.record(
            self.special(actor, "mac_protein_share")
                .target(self.name_of(target)),
        );
        self.try_clear_drink(ctx);
        Ok(())
    }

    pub(super) fn barbara_roll(
        &mut self,
        actor: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Barbara)?;
        if self.owed_drink(actor)?.barbara_roll.is_some() {
            return Err(CommandError::Rule("Barbara already rolled for this drink"));
        }

        let roll = ctx.roll_die();
        self.drink_prompt_mut()?.barbara_roll = Some(roll);
        self.stats_mut(actor).actions_used += 1;
        let verdict = if roll % 2 == 1 {
            "odd, pick someone to drink instead"
        } else {
            "even, Barbara drinks"
        };
        ctx.record(
            self.special(actor, "barbara_roll")
                .message(format!("rolled {roll}: {verdict}")),
        );
        Ok(())
    }

    pub(super) fn barbara_redirect(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Barbara)?;
        match self.owed_drink(actor)?.barbara_roll {
            Some(roll) if roll % 2 == 1 => {}
            Some(_) => return Err(CommandError::Rule("only an odd roll lets Barbara redirect")),
            None => return Err(CommandError::Rule("roll the die first")),
        }
        self.require_other(actor, target)?;
        let added = self.redirect_set(actor, target);

        let drink = self.drink_prompt_mut()?;
        drink.release(actor);
        drink.enlist(added);
        ctx.record(
            self.special(actor, "barbara_redirect")
                .target(self.name_of(target)),
        );
        self.try_clear_drink(ctx);
        Ok(())
    }

    fn open_vote(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        kind: VoteKind,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        if self.vote.is_some() {
            return Err(CommandError::Rule("a vote is already open"));
        }
        self.require_other(actor, target)?;

        let action = match kind {
            VoteKind::Charity { .. } => "charity_vote",
            VoteKind::Swap { .. } => "swap_vote",
        };
        self.vote = Some(Vote::new(kind));
        self.stats_mut(actor).actions_used += 1;
        ctx.record(
            GameLogEntry::new(GameEventKind::MiniGameStarted, Some(actor), self.name_of(actor))
                .action(action)
                .target(self.name_of(target)),
        );
        Ok(())
    }

    pub(super) fn start_charity_vote(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        reason: &str,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Bruce)?;
        self.owed_drink(actor)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CommandError::InvalidInput("give the table a reason".into()));
        }
        let kind = VoteKind::Charity {
            bruce: actor,
            target,
            reason: reason.to_owned(),
        };
        self.open_vote(actor, target, kind, ctx)
    }

    pub(super) fn start_swap_vote(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        excuse: &str,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Gino)?;
        self.owed_drink(actor)?;
        let excuse = excuse.trim();
        if excuse.is_empty() {
            return Err(CommandError::InvalidInput("give the table an excuse".into()));
        }
        let rounds = self.turn_number / self.players.len().max(1) as u32;
        under_cap(&self.counters.gino_swaps_used, actor, rounds + 1, "gino swaps")?;

        let kind = VoteKind::Swap {
            gino: actor,
            target,
            excuse: excuse.to_owned(),
        };
        self.open_vote(actor, target, kind, ctx)?;
        RoleCounters::bump(&mut self.counters.gino_swaps_used, actor);
        Ok(())
    }

    pub(super) fn mac_challenge(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        challenge: MacChallengeKind,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Mac)?;
        self.require_idle()?;
        self.require_other(actor, target)?;
        self.check_mac_action(actor, ctx.rules.mac_actions)?;

        self.spend_mac_action(actor);
        let (mac_name, target_name) = (self.name_of(actor), self.name_of(target));
        let entry = self.special(actor, "mac_challenge").target(target_name.clone());

        let outcome = match challenge {
            MacChallengeKind::Karate | MacChallengeKind::Confession => {
                ctx.record(entry);
                Outcome::Chain(PromptKind::MacChallenge {
                    mac: actor,
                    target,
                    challenge,
                })
            }
            MacChallengeKind::Toughness => {
                let (mac_roll, target_roll) = (ctx.roll_die(), ctx.roll_die());
                ctx.record(entry.message(format!(
                    "{mac_name} rolled {mac_roll}, {target_name} rolled {target_roll}"
                )));
                let drink = if mac_roll == target_roll {
                    self.drink_for([actor, target], "Dead even. Both drink".to_owned(), ctx)
                } else {
                    let loser = if mac_roll < target_roll { actor } else { target };
                    let mut drink =
                        self.drink_for([loser], format!("{} is weaker. Double!", self.name_of(loser)), ctx);
                    drink.double = true;
                    drink
                };
                Outcome::Chain(PromptKind::Drink(drink))
            }
        };
        self.conclude(None, None, outcome, ctx);
        Ok(())
    }

    pub(super) fn respond_mac_challenge(
        &mut self,
        actor: PlayerId,
        perform: bool,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let prompt = self.active_prompt.as_ref().ok_or(CommandError::NoActivePrompt)?;
        let PromptKind::MacChallenge { mac, target, .. } = prompt.kind else {
            return Err(CommandError::NoActivePrompt);
        };
        if actor != target {
            return Err(CommandError::NotYourPrompt);
        }

        let (drinker, message) = if perform {
            (mac, format!("{} rose to the challenge. Mac drinks", self.name_of(target)))
        } else {
            (target, format!("{} chickened out", self.name_of(target)))
        };
        ctx.record(self.special(actor, "mac_challenge_response").message(message.clone()));
        let drink = self.drink_for([drinker], message, ctx);
        self.follow_up(Outcome::Chain(PromptKind::Drink(drink)), ctx);
        Ok(())
    }

    pub(super) fn frank_call_out(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Frank)?;
        self.require_idle()?;
        self.require_other(actor, target)?;

        self.stats_mut(actor).actions_used += 1;
        ctx.record(
            self.special(actor, "frank_call_out")
                .target(self.name_of(target)),
        );
        let kind = PromptKind::FrankPerformance {
            frank: actor,
            target,
        };
        self.conclude(None, None, Outcome::Chain(kind), ctx);
        Ok(())
    }

    fn frank_performer(&self, actor: PlayerId) -> Result<PlayerId, CommandError> {
        let prompt = self.active_prompt.as_ref().ok_or(CommandError::NoActivePrompt)?;
        let PromptKind::FrankPerformance { frank, target } = prompt.kind else {
            return Err(CommandError::NoActivePrompt);
        };
        if actor != target {
            return Err(CommandError::NotYourPrompt);
        }
        Ok(frank)
    }

    pub(super) fn frank_perform(
        &mut self,
        actor: PlayerId,
        performance: PerformanceKind,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let frank = self.frank_performer(actor)?;

        RoleCounters::bump(&mut self.counters.frank_performances, actor);
        ctx.record(self.special(actor, "frank_perform"));
        let kind = PromptKind::FrankJudgement {
            frank,
            performer: actor,
            performance,
        };
        self.follow_up(Outcome::Chain(kind), ctx);
        Ok(())
    }

    pub(super) fn frank_refuse(
        &mut self,
        actor: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.frank_performer(actor)?;

        let message = format!("{} refused to perform", self.name_of(actor));
        ctx.record(self.special(actor, "frank_refuse"));
        let drink = self.drink_for([actor], message, ctx);
        self.follow_up(Outcome::Chain(PromptKind::Drink(drink)), ctx);
        Ok(())
    }

    pub(super) fn frank_judge(
        &mut self,
        actor: PlayerId,
        moved: bool,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let prompt = self.active_prompt.as_ref().ok_or(CommandError::NoActivePrompt)?;
        let PromptKind::FrankJudgement {
            frank, performer, ..
        } = prompt.kind
        else {
            return Err(CommandError::NoActivePrompt);
        };
        if actor != frank {
            return Err(CommandError::NotYourPrompt);
        }

        let (drinker, message) = if moved {
            (frank, "Frank was moved. Frank drinks".to_owned())
        } else {
            (performer, format!("Frank was not impressed, {}", self.name_of(performer)))
        };
        ctx.record(self.special(actor, "frank_judge").message(message.clone()));
        let drink = self.drink_for([drinker], message, ctx);
        self.follow_up(Outcome::Chain(PromptKind::Drink(drink)), ctx);
        Ok(())
    }

    pub(super) fn dayman_choose_nightman(
        &mut self,
        actor: PlayerId,
        target: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        self.require_role(actor, Role::Charlie)?;
        self.require_idle()?;
        self.require_other(actor, target)?;
        if self.dayman_nightman.is_some() {
            return Err(CommandError::Rule("a nightman is already on duty"));
        }

        self.dayman_nightman = Some(DaymanNightman {
            dayman: actor,
            nightman: target,
            rounds_remaining: ctx.rules.nightman_rounds,
        });
        self.stats_mut(actor).actions_used += 1;
        ctx.record(
            self.special(actor, "dayman_choose_nightman")
                .target(self.name_of(target)),
        );
        Ok(())
    }

    pub(super) fn dayman_call_out(
        &mut self,
        actor: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let pairing = self
            .dayman_nightman
            .ok_or(CommandError::Rule("no nightman has been chosen"))?;
        if pairing.dayman != actor {
            return Err(CommandError::NotYourPrompt);
        }
        self.require_idle()?;

        let deadline_ms = ctx.now_ms() + ctx.rules.nightman_response_secs * 1_000;
        ctx.record(
            self.special(actor, "dayman_call_out")
                .target(self.name_of(pairing.nightman)),
        );
        let kind = PromptKind::NightmanResponse {
            dayman: actor,
            nightman: pairing.nightman,
            deadline_ms,
        };
        self.conclude(None, None, Outcome::Chain(kind), ctx);
        Ok(())
    }

    pub(super) fn nightman_respond(
        &mut self,
        actor: PlayerId,
        success: bool,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let prompt = self.active_prompt.as_ref().ok_or(CommandError::NoActivePrompt)?;
        let PromptKind::NightmanResponse { nightman, .. } = prompt.kind else {
            return Err(CommandError::NoActivePrompt);
        };
        if actor != nightman {
            return Err(CommandError::NotYourPrompt);
        }

        if success {
            ctx.record(self.special(actor, "nightman_respond").message("answered the call"));
            self.follow_up(Outcome::Resolved, ctx);
        } else {
            let message = format!("{} blew it. Nightman drinks", self.name_of(actor));
            ctx.record(self.special(actor, "nightman_respond").message(message.clone()));
            let drink = self.drink_for([actor], message, ctx);
            self.follow_up(Outcome::Chain(PromptKind::Drink(drink)), ctx);
        }
        Ok(())
    }

    pub(super) fn salt_snail(
        &mut self,
        actor: PlayerId,
        ctx: &mut CommandContext<'_>,
    ) -> Result<(), CommandError> {
        let snail = self
            .snail_player
            .ok_or(CommandError::Rule("there is no snail to salt"))?;
        if snail == actor {
            return Err(CommandError::Rule("you cannot salt yourself"));
        }
        self.require_idle()?;

        self.snail_player = None;
        if let Some(player) = self.player_mut(snail) {
            if player.role == Some(Role::Gail) {
                player.role = None;
            }
        }
        ctx.record(
            self.special(actor, "salt_snail")
                .target(self.name_of(snail)),
        );
        let message = format!("{} got salted. Finish your drink", self.name_of(snail));
        let drink = self.drink_for([snail], message, ctx);
        self.conclude(None, None, Outcome::Chain(PromptKind::Drink(drink)), ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::state::{
        lobby::{Gender, Mate, Role},
        minigames::VoteKind,
        prompt::{MacChallengeKind, PerformanceKind, PromptKind},
        state_machine::{CommandError, GameCommand, testing::Table},
    };

    #[test]
    fn golden_god_redirects_until_the_cap() {
        let mut table = Table::new(3);
        table.set_role(0, Role::GoldenGod);
        table.draw(0, "3S").unwrap();

        table
            .run(0, GameCommand::GoldenGodRedirect { target: Some(table.id(2)) })
            .unwrap();
        assert_eq!(table.drinkers(), vec![table.id(2)]);
        assert_eq!(table.lobby.counters.golden_god_redirects[&table.id(0)], 1);

        table.confirm_all();
        table.lobby.counters.golden_god_redirects.insert(table.id(0), 3);
        table.lobby.current_player_id = Some(table.id(0));
        table.draw(0, "3H").unwrap();
        assert_eq!(
            table.run(0, GameCommand::GoldenGodRedirect { target: None }),
            Err(CommandError::CapReached {
                ability: "golden god redirects",
                cap: 3,
            })
        );
    }

    #[test]
    fn golden_god_without_target_clears_the_prompt() {
        let mut table = Table::new(2);
        table.set_role(0, Role::GoldenGod);
        table.draw(0, "3C").unwrap();
        table
            .run(0, GameCommand::GoldenGodRedirect { target: None })
            .unwrap();
        assert!(table.lobby.active_prompt.is_none());
        assert_eq!(table.current(), Some(table.id(1)));
    }

    #[test]
    fn non_binary_pass_only_on_gender_cards() {
        let mut table = Table::new(2);
        table.set_gender(0, Gender::NonBinary);
        table.draw(0, "3S").unwrap();
        assert_eq!(
            table.run(0, GameCommand::NonBinaryPass),
            Err(CommandError::Rule("passes only work on gender cards"))
        );
        table.confirm_all();

        table.lobby.current_player_id = Some(table.id(0));
        table.draw(0, "5D").unwrap();
        table.run(0, GameCommand::NonBinaryPass).unwrap();
        assert!(table.lobby.active_prompt.is_none());
        assert_eq!(table.lobby.counters.non_binary_passes[&table.id(0)], 1);
        assert_eq!(table.lobby.stats[&table.id(0)].drinks, 1);
    }

    #[test]
    fn tiny_hands_counts_as_a_sip() {
        let mut table = Table::new(2);
        table.set_role(0, Role::UncleJack);
        table.draw(0, "3S").unwrap();
        table.run(0, GameCommand::TinyHands).unwrap();
        assert!(table.lobby.active_prompt.is_none());
        assert_eq!(table.lobby.stats[&table.id(0)].drinks, 1);
        assert_eq!(table.lobby.counters.uncle_jack_uses[&table.id(0)], 1);
    }

    #[test]
    fn cricket_confession_rearms_denials_without_resetting_counters() {
        let mut table = Table::new(2);
        table.set_role(0, Role::Cricket);
        table.lobby.counters.cricket_denials.insert(table.id(0), 3);
        table.draw(0, "3S").unwrap();

        assert!(matches!(
            table.run(0, GameCommand::CricketDeny),
            Err(CommandError::CapReached { .. })
        ));
        assert!(table
            .run(0, GameCommand::CricketConfess { confession: "  ".into() })
            .is_err());
        table
            .run(0, GameCommand::CricketConfess { confession: "I sold the church organ".into() })
            .unwrap();
        assert_eq!(table.lobby.counters.cricket_denials[&table.id(0)], 3);
        assert_eq!(table.lobby.counters.cricket_confessions[&table.id(0)], 1);

        table.lobby.current_player_id = Some(table.id(0));
        table.draw(0, "3H").unwrap();
        assert_eq!(
            table.run(0, GameCommand::CricketConfess { confession: "again".into() }),
            Err(CommandError::Rule("confess once your denials are used up"))
        );
        table.run(0, GameCommand::CricketDeny).unwrap();
        assert_eq!(table.lobby.counters.cricket_denials[&table.id(0)], 4);
        assert!(table.lobby.active_prompt.is_none());
    }

    #[test]
    fn mac_acts_once_per_turn() {
        let mut table = Table::new(3);
        table.set_role(1, Role::Mac);
        table.set_gender(0, Gender::Female);
        table.set_gender(2, Gender::Female);
        table.draw(0, "6S").unwrap();

        table
            .run(1, GameCommand::MacBodyguard { target: table.id(2) })
            .unwrap();
        assert_eq!(table.drinkers(), vec![table.id(0)]);
        assert_eq!(
            table.run(1, GameCommand::MacBodyguard { target: table.id(0) }),
            Err(CommandError::Rule("Mac already acted this turn"))
        );
        assert_eq!(table.lobby.counters.mac_action_uses[&table.id(1)], 1);
    }

    #[test]
    fn protein_share_adds_target_and_confirms_mac() {
        let mut table = Table::new(3);
        table.set_role(0, Role::Mac);
        table.draw(0, "3S").unwrap();
        table
            .run(0, GameCommand::MacProteinShare { target: table.id(1) })
            .unwrap();
        assert_eq!(table.drinkers(), vec![table.id(0), table.id(1)]);
        assert!(table.lobby.active_prompt.is_some());
        table.run(1, GameCommand::ConfirmDrink).unwrap();
        assert_eq!(table.current(), Some(table.id(1)));
    }

    #[test]
    fn barbara_redirects_only_after_an_odd_roll() {
        let mut table = Table::new(3);
        table.set_role(0, Role::Barbara);
        table.draw(0, "3S").unwrap();
        assert_eq!(
            table.run(0, GameCommand::BarbaraRedirect { target: table.id(1) }),
            Err(CommandError::Rule("roll the die first"))
        );

        table.run(0, GameCommand::BarbaraRoll).unwrap();
        let roll = table.lobby.drink_prompt().unwrap().barbara_roll.unwrap();
        assert!((1..=6).contains(&roll));
        assert!(table.run(0, GameCommand::BarbaraRoll).is_err());

        table.lobby.drink_prompt_mut().unwrap().barbara_roll = Some(3);
        table
            .run(0, GameCommand::BarbaraRedirect { target: table.id(1) })
            .unwrap();
        assert_eq!(table.drinkers(), vec![table.id(1)]);
    }

    #[test]
    fn charity_vote_holds_the_prompt_until_everyone_votes() {
        let mut table = Table::new(3);
        table.set_role(0, Role::Bruce);
        table.lobby.mate = Some(Mate {
            player1: table.id(1),
            player2: table.id(2),
        });
        table.draw(0, "3S").unwrap();
        table
            .run(0, GameCommand::StartCharityVote {
                target: table.id(1),
                reason: "for the kids".into(),
            })
            .unwrap();
        assert!(matches!(
            table.lobby.vote.as_ref().map(|vote| &vote.kind),
            Some(VoteKind::Charity { .. })
        ));
        assert_eq!(
            table.run(0, GameCommand::CastVote { approve: true }),
            Err(CommandError::Rule("you cannot vote on your own request"))
        );

        assert_eq!(
            table.run(0, GameCommand::ConfirmDrink),
            Err(CommandError::Rule("your drink is up for a vote"))
        );
        assert!(table.lobby.active_prompt.is_some());

        table.run(1, GameCommand::CastVote { approve: false }).unwrap();
        table.run(2, GameCommand::CastVote { approve: true }).unwrap();
        assert!(table.lobby.vote.is_none());
        assert_eq!(table.drinkers(), vec![table.id(1), table.id(2)]);
        assert_eq!(table.lobby.turn_number, 1);
    }

    #[test]
    fn bruce_cannot_drink_or_dodge_while_the_table_votes() {
        let mut table = Table::new(3);
        table.set_role(0, Role::Bruce);
        table.draw(0, "3S").unwrap();
        table
            .run(0, GameCommand::StartCharityVote {
                target: table.id(2),
                reason: "the orphanage".into(),
            })
            .unwrap();

        assert!(table.run(0, GameCommand::ConfirmDrink).is_err());
        assert!(table
            .run(0, GameCommand::StartCharityVote {
                target: table.id(1),
                reason: "second thoughts".into(),
            })
            .is_err());

        table.run(1, GameCommand::CastVote { approve: true }).unwrap();
        table.run(2, GameCommand::CastVote { approve: true }).unwrap();
        assert_eq!(table.drinkers(), vec![table.id(2)]);
        assert_eq!(
            table.lobby.stats.get(&table.id(0)).map(|stats| stats.drinks).unwrap_or(0),
            0
        );

        table.run(2, GameCommand::ConfirmDrink).unwrap();
        assert!(table.lobby.active_prompt.is_none());
        assert_eq!(table.lobby.stats[&table.id(2)].drinks, 1);
    }

    #[test]
    fn failed_swap_vote_leaves_gino_drinking() {
        let mut table = Table::new(3);
        table.set_role(0, Role::Gino);
        table.draw(0, "3S").unwrap();
        table
            .run(0, GameCommand::StartSwapVote {
                target: table.id(2),
                excuse: "allergies".into(),
            })
            .unwrap();
        table.run(1, GameCommand::CastVote { approve: false }).unwrap();
        table.run(2, GameCommand::CastVote { approve: false }).unwrap();
        assert_eq!(table.drinkers(), vec![table.id(0)]);

        table.run(0, GameCommand::ConfirmDrink).unwrap();
        table.lobby.current_player_id = Some(table.id(0));
        table.draw(0, "3H").unwrap();
        assert!(matches!(
            table.run(0, GameCommand::StartSwapVote {
                target: table.id(2),
                excuse: "again".into(),
            }),
            Err(CommandError::CapReached { ability: "gino swaps", .. })
        ));
    }

    #[test]
    fn karate_challenge_is_out_of_turn() {
        let mut table = Table::new(2);
        table.set_role(1, Role::Mac);
        table
            .run(1, GameCommand::MacChallenge {
                target: table.id(0),
                challenge: MacChallengeKind::Karate,
            })
            .unwrap();
        assert_eq!(table.draw(0, "3S"), Err(CommandError::Blocked));

        table
            .run(0, GameCommand::RespondMacChallenge { perform: true })
            .unwrap();
        assert_eq!(table.drinkers(), vec![table.id(1)]);
        table.confirm_all();
        assert_eq!(table.current(), Some(table.id(0)));
        assert_eq!(table.lobby.turn_number, 1);
    }

    #[test]
    fn toughness_challenge_rolls_immediately() {
        let mut table = Table::new(2);
        table.set_role(0, Role::Mac);
        table
            .run(0, GameCommand::MacChallenge {
                target: table.id(1),
                challenge: MacChallengeKind::Toughness,
            })
            .unwrap();
        let drink = table.lobby.drink_prompt().unwrap();
        assert!(!drink.drinkers.is_empty());
        assert_eq!(drink.double, drink.drinkers.len() == 1);
    }

    #[test]
    fn frank_judges_the_performance() {
        let mut table = Table::new(3);
        table.set_role(0, Role::Frank);
        table
            .run(0, GameCommand::FrankCallOut { target: table.id(2) })
            .unwrap();
        assert_eq!(
            table.run(1, GameCommand::FrankPerform { performance: PerformanceKind::Song }),
            Err(CommandError::NotYourPrompt)
        );
        table
            .run(2, GameCommand::FrankPerform { performance: PerformanceKind::Song })
            .unwrap();
        assert!(matches!(
            table.lobby.active_prompt.as_ref().map(|prompt| &prompt.kind),
            Some(PromptKind::FrankJudgement { .. })
        ));

        table.run(0, GameCommand::FrankJudge { moved: false }).unwrap();
        assert_eq!(table.drinkers(), vec![table.id(2)]);
        assert_eq!(table.lobby.counters.frank_performances[&table.id(2)], 1);
    }

    #[test]
    fn nightman_duty_expires_after_draws() {
        let mut table = Table::new(2);
        table.rules.nightman_rounds = 2;
        table.set_role(0, Role::Charlie);
        table
            .run(0, GameCommand::DaymanChooseNightman { target: table.id(1) })
            .unwrap();

        table.draw(0, "KH").unwrap();
        assert_eq!(
            table.lobby.dayman_nightman.map(|pairing| pairing.rounds_remaining),
            Some(1)
        );
        table.draw(1, "QH").unwrap();
        assert!(table.lobby.dayman_nightman.is_none());
        assert!(table.run(0, GameCommand::DaymanCallOut).is_err());
    }

    #[test]
    fn nightman_success_clears_without_advancing() {
        let mut table = Table::new(2);
        table.set_role(0, Role::Charlie);
        table
            .run(0, GameCommand::DaymanChooseNightman { target: table.id(1) })
            .unwrap();
        table.run(0, GameCommand::DaymanCallOut).unwrap();
        table
            .run(1, GameCommand::NightmanRespond { success: true })
            .unwrap();
        assert!(table.lobby.active_prompt.is_none());
        assert_eq!(table.lobby.turn_number, 1);
    }

    #[test]
    fn salting_the_snail_clears_gail() {
        let mut table = Table::new(2);
        table.draw(0, "AD").unwrap();
        assert_eq!(table.lobby.snail_player, Some(table.id(0)));
        assert_eq!(
            table.run(0, GameCommand::SaltSnail),
            Err(CommandError::Rule("you cannot salt yourself"))
        );

        table.run(1, GameCommand::SaltSnail).unwrap();
        assert_eq!(table.lobby.snail_player, None);
        assert_eq!(table.lobby.role_of(table.id(0)), None);
        assert_eq!(table.drinkers(), vec![table.id(0)]);
    }

    #[test]
    fn abilities_need_the_matching_role() {
        let mut table = Table::new(2);
        table.draw(0, "3S").unwrap();
        assert_eq!(
            table.run(0, GameCommand::TinyHands),
            Err(CommandError::MissingRole(Role::UncleJack))
        );
    }
}
