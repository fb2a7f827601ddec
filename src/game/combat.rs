//! Combat system - round resolution, damage and shields
//!
//! `resolve` is a pure function of the two submissions and the current
//! shields. It never fails and its result does not depend on which player
//! is passed first.

use std::time::Duration;

use crate::config::BattleRules;
use crate::ws::protocol::{Action, AnswerOption, PlayerId, PlayerTotals, RoundKind, RoundResult};

/// One player's submission for the current round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundState {
    pub selected_action: Action,
    pub submitted_answer: Option<AnswerOption>,
    pub is_correct: bool,
    pub time_remaining: Duration,
    /// The player submitted (false for a timeout fill-in)
    pub ready: bool,
}

impl RoundState {
    pub fn submitted(
        action: Action,
        answer: Option<AnswerOption>,
        is_correct: bool,
        time_remaining: Duration,
    ) -> Self {
        Self {
            selected_action: action,
            submitted_answer: answer,
            is_correct,
            time_remaining,
            ready: true,
        }
    }

    /// Missed deadline: no answer, never correct, no time left
    pub fn timed_out(action: Action) -> Self {
        Self {
            selected_action: action,
            submitted_answer: None,
            is_correct: false,
            time_remaining: Duration::ZERO,
            ready: false,
        }
    }
}

/// A player entering resolution
#[derive(Debug, Clone, Copy)]
pub struct Contender<'a> {
    pub player_id: PlayerId,
    pub round: &'a RoundState,
    pub shield: u32,
}

/// `ceil(time_remaining / limit * max_damage)`, time clamped to the limit
pub fn time_damage(time_remaining: Duration, rules: &BattleRules) -> u32 {
    scaled_damage(time_remaining, rules, 100)
}

/// Out-of-position hit, scaled by `counter_hit_percent`
pub fn counter_damage(time_remaining: Duration, rules: &BattleRules) -> u32 {
    scaled_damage(time_remaining, rules, rules.counter_hit_percent)
}

fn scaled_damage(time_remaining: Duration, rules: &BattleRules, percent: u32) -> u32 {
    let limit = rules.question_time_limit.as_millis().max(1);
    let remaining = time_remaining.as_millis().min(limit);
    let numerator = remaining * rules.max_damage as u128 * percent as u128;
    let denominator = limit * 100;
    numerator.div_ceil(denominator) as u32
}

/// Resolve one round between two contenders
pub fn resolve(round: u32, p1: Contender<'_>, p2: Contender<'_>, rules: &BattleRules) -> RoundResult {
    let (a, b) = (p1.round, p2.round);

    if !a.is_correct && !b.is_correct {
        return RoundResult {
            mutual_penalty: rules.wrong_answer_penalty,
            ..empty(round, RoundKind::BothWrong)
        };
    }

    if a.selected_action == b.selected_action {
        return resolve_mirror(round, p1, p2, rules);
    }

    let (adv, dis) = if a.selected_action.has_advantage_over(b.selected_action) {
        (p1, p2)
    } else {
        (p2, p1)
    };

    match (adv.round.is_correct, dis.round.is_correct) {
        // A correct guard against a correct strike banks shield instead of trading hits
        (true, true) if adv.round.selected_action == Action::Guard => RoundResult {
            defender_id: Some(adv.player_id),
            defender_shield_gained: time_damage(adv.round.time_remaining, rules),
            ..empty(round, RoundKind::DefenseSuccess)
        },
        (true, _) => attack(
            round,
            RoundKind::Advantage,
            adv,
            dis,
            time_damage(adv.round.time_remaining, rules),
        ),
        (false, _) => attack(
            round,
            RoundKind::CounterHit,
            dis,
            adv,
            counter_damage(dis.round.time_remaining, rules),
        ),
    }
}

fn resolve_mirror(round: u32, p1: Contender<'_>, p2: Contender<'_>, rules: &BattleRules) -> RoundResult {
    let (a, b) = (p1.round, p2.round);
    match (a.is_correct, b.is_correct) {
        (true, true) => {
            if a.time_remaining == b.time_remaining {
                return empty(round, RoundKind::NoAttack);
            }
            let (fast, slow) = if a.time_remaining > b.time_remaining {
                (p1, p2)
            } else {
                (p2, p1)
            };
            let lead = fast.round.time_remaining - slow.round.time_remaining;
            attack(round, RoundKind::MirrorTimeLead, fast, slow, time_damage(lead, rules))
        }
        (true, false) => attack(
            round,
            RoundKind::MirrorSoloCorrect,
            p1,
            p2,
            time_damage(a.time_remaining, rules),
        ),
        (false, true) => attack(
            round,
            RoundKind::MirrorSoloCorrect,
            p2,
            p1,
            time_damage(b.time_remaining, rules),
        ),
        (false, false) => RoundResult {
            mutual_penalty: rules.wrong_answer_penalty,
            ..empty(round, RoundKind::BothWrong)
        },
    }
}

/// The defender's shield soaks what it can and is worn down by the full hit
fn attack(
    round: u32,
    kind: RoundKind,
    attacker: Contender<'_>,
    defender: Contender<'_>,
    damage: u32,
) -> RoundResult {
    let shield_absorbed = defender.shield.min(damage);
    RoundResult {
        attacker_id: Some(attacker.player_id),
        defender_id: Some(defender.player_id),
        damage,
        shield_absorbed,
        shield_broken: defender.shield > 0 && damage >= defender.shield,
        ..empty(round, kind)
    }
}

fn empty(round: u32, kind: RoundKind) -> RoundResult {
    RoundResult {
        round,
        kind,
        attacker_id: None,
        defender_id: None,
        damage: 0,
        shield_absorbed: 0,
        shield_broken: false,
        defender_shield_gained: 0,
        mutual_penalty: 0,
    }
}

/// Fold a round result into one player's totals. Health and shield floor at zero.
pub fn apply_result(totals: &mut PlayerTotals, result: &RoundResult) {
    let me = Some(totals.player_id);

    totals.health = totals.health.saturating_sub(result.mutual_penalty);

    if result.attacker_id == me {
        totals.damage_dealt = totals.damage_dealt.saturating_add(result.damage);
    }

    if result.defender_id == me {
        if result.attacker_id.is_some() {
            let through = result.damage.saturating_sub(result.shield_absorbed);
            totals.health = totals.health.saturating_sub(through);
            totals.shield = totals.shield.saturating_sub(result.damage);
        } else {
            totals.shield = totals.shield.saturating_add(result.defender_shield_gained);
        }
    }
}
