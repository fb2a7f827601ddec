//! Post-match rewards and rating updates

use std::time::Duration;

use crate::config::RewardRules;
use crate::ws::protocol::{PlayerId, PlayerReward, PlayerTotals, Rewards};

use super::Match;

/// A player's result from their own perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Standing {
    Won,
    Lost,
    Drew,
}

impl Standing {
    pub fn for_player(player_id: &PlayerId, winner_id: Option<PlayerId>) -> Self {
        match winner_id {
            None => Standing::Drew,
            Some(winner) if &winner == player_id => Standing::Won,
            Some(_) => Standing::Lost,
        }
    }

    /// The opponent's standing
    pub fn inverse(self) -> Self {
        match self {
            Standing::Won => Standing::Lost,
            Standing::Lost => Standing::Won,
            Standing::Drew => Standing::Drew,
        }
    }

    fn actual_score(self) -> f64 {
        match self {
            Standing::Won => 1.0,
            Standing::Lost => 0.0,
            Standing::Drew => 0.5,
        }
    }
}

/// Inputs to the reward formula
#[derive(Debug, Clone, Copy)]
pub struct RewardInput {
    pub final_score: u32,
    pub total_questions: u32,
    pub difficulty_multiplier: f64,
    /// Longest run of consecutive correct answers
    pub streak: u32,
    pub time_left_at_end: Duration,
}

pub fn compute_rewards(input: &RewardInput, rules: &RewardRules) -> Rewards {
    let base = input.final_score * rules.xp_per_correct + input.total_questions * rules.xp_per_question;
    let scaled = base as f64 * input.difficulty_multiplier.max(0.0);

    let streak_pct = input
        .streak
        .saturating_mul(rules.streak_step_percent)
        .min(rules.streak_max_percent);
    let time_pct = (input.time_left_at_end.as_secs() as u32)
        .saturating_mul(rules.time_percent_per_sec)
        .min(rules.time_max_percent);

    let streak_bonus = (scaled * streak_pct as f64 / 100.0).round() as u32;
    let time_bonus = (scaled * time_pct as f64 / 100.0).round() as u32;
    let xp = scaled.round() as u32 + streak_bonus + time_bonus;

    Rewards {
        xp,
        coins: xp / rules.coins_divisor.max(1),
        streak_bonus,
        time_bonus,
    }
}

/// Winner bonus applied on top of the base rewards
pub fn apply_win_bonus(rewards: Rewards, rules: &RewardRules) -> Rewards {
    let bonus = (rewards.xp as f64 * rules.win_bonus_percent as f64 / 100.0).round() as u32;
    let xp = rewards.xp + bonus;
    Rewards {
        xp,
        coins: xp / rules.coins_divisor.max(1),
        ..rewards
    }
}

/// Logistic expected score of `self_rating` against `opponent_rating`
pub fn expected_score(self_rating: i32, opponent_rating: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent_rating - self_rating) as f64 / 400.0))
}

/// Elo delta. Always computed from one canonical side and negated for the
/// other, so `delta(a, b, s) == -delta(b, a, s.inverse())` holds exactly.
pub fn rating_delta(self_rating: i32, opponent_rating: i32, standing: Standing, k_factor: f64) -> i32 {
    match standing {
        Standing::Lost => -rating_delta(opponent_rating, self_rating, Standing::Won, k_factor),
        Standing::Drew if self_rating > opponent_rating => {
            -rating_delta(opponent_rating, self_rating, Standing::Drew, k_factor)
        }
        _ => (k_factor * (standing.actual_score() - expected_score(self_rating, opponent_rating))).round()
            as i32,
    }
}

/// Rewards and rating changes for both seats. Bots earn nothing and bot
/// matches leave ratings untouched.
pub fn settle(
    created: &Match,
    totals: &[PlayerTotals],
    winner_id: Option<PlayerId>,
    total_questions: u32,
    difficulty_multiplier: f64,
    rules: &RewardRules,
) -> Vec<PlayerReward> {
    let rated = created.players.iter().all(|p| !p.kind.is_bot());

    created
        .players
        .iter()
        .map(|player| {
            let standing = Standing::for_player(&player.player_id, winner_id);
            let opponent_rating = created
                .opponent_of(&player.player_id)
                .map_or(player.rating, |o| o.rating);

            let rewards = match totals.iter().find(|t| t.player_id == player.player_id) {
                Some(t) if !player.kind.is_bot() => {
                    let base = compute_rewards(
                        &RewardInput {
                            final_score: t.score,
                            total_questions,
                            difficulty_multiplier,
                            streak: t.best_streak,
                            time_left_at_end: Duration::from_millis(t.last_time_remaining_ms),
                        },
                        rules,
                    );
                    if standing == Standing::Won {
                        apply_win_bonus(base, rules)
                    } else {
                        base
                    }
                }
                _ => Rewards::default(),
            };

            let rating_delta = if rated {
                rating_delta(player.rating, opponent_rating, standing, rules.k_factor)
            } else {
                0
            };

            PlayerReward {
                player_id: player.player_id,
                rewards,
                rating_before: player.rating,
                rating_delta,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{MatchPlayer, PlayerKind};
    use crate::ws::protocol::MatchPreferences;
    use uuid::Uuid;

    fn input(score: u32, streak: u32, time_secs: u64) -> RewardInput {
        RewardInput {
            final_score: score,
            total_questions: 5,
            difficulty_multiplier: 1.0,
            streak,
            time_left_at_end: Duration::from_secs(time_secs),
        }
    }

    #[test]
    fn test_reward_formula() {
        let rewards = compute_rewards(&input(4, 3, 12), &RewardRules::default());
        assert_eq!(
            rewards,
            Rewards {
                xp: 71,
                coins: 35,
                streak_bonus: 15,
                time_bonus: 6,
            }
        );
    }

    #[test]
    fn test_bonuses_are_capped() {
        let rewards = compute_rewards(&input(4, 10, 60), &RewardRules::default());
        assert_eq!(rewards.streak_bonus, 25);
        assert_eq!(rewards.time_bonus, 13);
    }

    #[test]
    fn test_difficulty_scales_everything() {
        let mut hard = input(4, 0, 0);
        hard.difficulty_multiplier = 1.5;
        let rewards = compute_rewards(&hard, &RewardRules::default());
        assert_eq!(rewards.xp, 75);
    }

    #[test]
    fn test_win_bonus() {
        let base = compute_rewards(&input(5, 0, 0), &RewardRules::default());
        assert_eq!(base.xp, 60);
        let won = apply_win_bonus(base, &RewardRules::default());
        assert_eq!(won.xp, 72);
        assert_eq!(won.coins, 36);
    }

    #[test]
    fn test_equal_ratings() {
        assert_eq!(rating_delta(1000, 1000, Standing::Won, 32.0), 16);
        assert_eq!(rating_delta(1000, 1000, Standing::Lost, 32.0), -16);
        assert_eq!(rating_delta(1000, 1000, Standing::Drew, 32.0), 0);
    }

    #[test]
    fn test_favourite_gains_less() {
        assert_eq!(rating_delta(1200, 1000, Standing::Won, 32.0), 8);
        assert_eq!(rating_delta(1000, 1200, Standing::Won, 32.0), 24);
    }

    #[test]
    fn test_rating_delta_is_zero_sum() {
        let ratings = [0, 450, 999, 1000, 1001, 1187, 1500, 2399, 3000];
        for &a in &ratings {
            for &b in &ratings {
                for standing in [Standing::Won, Standing::Lost, Standing::Drew] {
                    assert_eq!(
                        rating_delta(a, b, standing, 32.0),
                        -rating_delta(b, a, standing.inverse(), 32.0),
                        "a={} b={} {:?}",
                        a,
                        b,
                        standing
                    );
                }
            }
        }
    }

    fn seat(rating: i32, kind: PlayerKind) -> MatchPlayer {
        MatchPlayer {
            player_id: Uuid::new_v4(),
            rating,
            level: 1,
            kind,
        }
    }

    fn final_totals(player_id: PlayerId, score: u32) -> PlayerTotals {
        PlayerTotals {
            player_id,
            health: 50,
            shield: 0,
            score,
            current_streak: 0,
            best_streak: 0,
            damage_dealt: 0,
            last_time_remaining_ms: 0,
        }
    }

    #[test]
    fn test_settle_rated_match() {
        let created = Match::new(
            seat(1000, PlayerKind::Human),
            seat(1000, PlayerKind::Human),
            MatchPreferences::default(),
        );
        let [a, b] = created.player_ids();
        let totals = vec![final_totals(a, 5), final_totals(b, 2)];

        let settled = settle(&created, &totals, Some(a), 5, 1.0, &RewardRules::default());
        assert_eq!(settled[0].rating_delta, 16);
        assert_eq!(settled[1].rating_delta, -16);
        assert_eq!(settled[0].rewards.xp, 72);
        assert_eq!(settled[1].rewards.xp, 30);
    }

    #[test]
    fn test_settle_bot_match_is_unrated() {
        let created = Match::new(
            seat(1000, PlayerKind::Human),
            seat(1000, PlayerKind::Bot { accuracy_percent: 50 }),
            MatchPreferences::default(),
        );
        let [a, b] = created.player_ids();
        let totals = vec![final_totals(a, 3), final_totals(b, 3)];

        let settled = settle(&created, &totals, None, 5, 1.0, &RewardRules::default());
        assert!(settled.iter().all(|r| r.rating_delta == 0));
        assert!(settled[0].rewards.xp > 0);
        assert_eq!(settled[1].rewards, Rewards::default());
    }
}
