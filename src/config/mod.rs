//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of text
    pub log_json: bool,

    /// HS256 secret used to verify client bearer tokens
    pub jwt_secret: String,
    /// Allowed CORS origins, comma separated
    pub client_origin: String,

    /// Supabase project URL and service role key. When either is missing
    /// the in-memory collaborators are used.
    pub supabase: Option<SupabaseConfig>,

    pub matchmaking: MatchmakingConfig,
    pub battle: BattleRules,
    pub rewards: RewardRules,
}

#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    pub url: String,
    /// Service role key (bypasses RLS - server only!)
    pub service_role_key: String,
}

/// Queue tuning
#[derive(Clone, Debug)]
pub struct MatchmakingConfig {
    /// Rating difference tolerated on join
    pub base_rating_window: u32,
    /// Extra tolerance gained per elapsed interval
    pub rating_window_growth: u32,
    pub window_interval: Duration,
    /// How long an entry may wait before it is timed out
    pub queue_timeout: Duration,
    /// Background sweep period
    pub sweep_interval: Duration,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            base_rating_window: 200,
            rating_window_growth: 50,
            window_interval: Duration::from_secs(10),
            queue_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_millis(500),
        }
    }
}

/// Battle balance and session lifecycle settings
#[derive(Clone, Debug)]
pub struct BattleRules {
    /// Questions per match
    pub rounds: usize,
    pub question_time_limit: Duration,
    pub starting_health: u32,
    pub starting_shield: u32,
    /// Damage dealt by a correct answer submitted with the full time remaining
    pub max_damage: u32,
    /// Health lost by both players when both answer wrong
    pub wrong_answer_penalty: u32,
    /// Counter-hit strength of a correct answer played out of position
    pub counter_hit_percent: u32,
    /// How long PREPARING waits for both clients to confirm
    pub confirm_timeout: Duration,
    pub forfeit_on_disconnect: bool,
    pub persist_attempts: u32,
    pub persist_backoff: Duration,
    /// How long a completed match keeps an unpersisted outcome for retries
    pub persist_retry_window: Duration,
    pub bot_accuracy_percent: u32,
}

impl Default for BattleRules {
    fn default() -> Self {
        Self {
            rounds: 5,
            question_time_limit: Duration::from_secs(30),
            starting_health: 100,
            starting_shield: 0,
            max_damage: 20,
            wrong_answer_penalty: 5,
            counter_hit_percent: 50,
            confirm_timeout: Duration::from_secs(15),
            forfeit_on_disconnect: false,
            persist_attempts: 3,
            persist_backoff: Duration::from_millis(500),
            persist_retry_window: Duration::from_secs(600),
            bot_accuracy_percent: 60,
        }
    }
}

/// Reward and rating formula constants
#[derive(Clone, Debug)]
pub struct RewardRules {
    pub xp_per_correct: u32,
    pub xp_per_question: u32,
    pub coins_divisor: u32,
    pub streak_step_percent: u32,
    pub streak_max_percent: u32,
    pub time_percent_per_sec: u32,
    pub time_max_percent: u32,
    pub win_bonus_percent: u32,
    pub k_factor: f64,
}

impl Default for RewardRules {
    fn default() -> Self {
        Self {
            xp_per_correct: 10,
            xp_per_question: 2,
            coins_divisor: 2,
            streak_step_percent: 10,
            streak_max_percent: 50,
            time_percent_per_sec: 1,
            time_max_percent: 25,
            win_bonus_percent: 20,
            k_factor: 32.0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let supabase = match (lookup("SUPABASE_URL"), lookup("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig {
                url,
                service_role_key,
            }),
            _ => None,
        };

        let mm = MatchmakingConfig::default();
        let matchmaking = MatchmakingConfig {
            base_rating_window: parse_or(&lookup, "MM_BASE_RATING_WINDOW", mm.base_rating_window)?,
            rating_window_growth: parse_or(&lookup, "MM_RATING_WINDOW_GROWTH", mm.rating_window_growth)?,
            window_interval: Duration::from_secs(parse_or(
                &lookup,
                "MM_WINDOW_INTERVAL_SECS",
                mm.window_interval.as_secs(),
            )?),
            queue_timeout: Duration::from_secs(parse_or(
                &lookup,
                "MM_QUEUE_TIMEOUT_SECS",
                mm.queue_timeout.as_secs(),
            )?),
            sweep_interval: Duration::from_millis(parse_or(
                &lookup,
                "MM_SWEEP_INTERVAL_MS",
                mm.sweep_interval.as_millis() as u64,
            )?),
        };
        if matchmaking.window_interval.is_zero() {
            return Err(ConfigError::Invalid("MM_WINDOW_INTERVAL_SECS"));
        }

        let b = BattleRules::default();
        let battle = BattleRules {
            rounds: parse_or(&lookup, "BATTLE_ROUNDS", b.rounds)?,
            question_time_limit: Duration::from_secs(parse_or(
                &lookup,
                "BATTLE_QUESTION_TIME_SECS",
                b.question_time_limit.as_secs(),
            )?),
            starting_health: parse_or(&lookup, "BATTLE_STARTING_HEALTH", b.starting_health)?,
            starting_shield: parse_or(&lookup, "BATTLE_STARTING_SHIELD", b.starting_shield)?,
            max_damage: parse_or(&lookup, "BATTLE_MAX_DAMAGE", b.max_damage)?,
            wrong_answer_penalty: parse_or(&lookup, "BATTLE_WRONG_PENALTY", b.wrong_answer_penalty)?,
            counter_hit_percent: parse_or(&lookup, "BATTLE_COUNTER_HIT_PERCENT", b.counter_hit_percent)?,
            confirm_timeout: Duration::from_secs(parse_or(
                &lookup,
                "BATTLE_CONFIRM_TIMEOUT_SECS",
                b.confirm_timeout.as_secs(),
            )?),
            forfeit_on_disconnect: parse_or(&lookup, "BATTLE_FORFEIT_ON_DISCONNECT", b.forfeit_on_disconnect)?,
            persist_attempts: parse_or(&lookup, "BATTLE_PERSIST_ATTEMPTS", b.persist_attempts)?,
            persist_backoff: b.persist_backoff,
            persist_retry_window: Duration::from_secs(parse_or(
                &lookup,
                "BATTLE_PERSIST_RETRY_WINDOW_SECS",
                b.persist_retry_window.as_secs(),
            )?),
            bot_accuracy_percent: parse_or(&lookup, "BATTLE_BOT_ACCURACY_PERCENT", b.bot_accuracy_percent)?,
        };
        if battle.rounds == 0 {
            return Err(ConfigError::Invalid("BATTLE_ROUNDS"));
        }
        if battle.question_time_limit.is_zero() {
            return Err(ConfigError::Invalid("BATTLE_QUESTION_TIME_SECS"));
        }

        let r = RewardRules::default();
        let rewards = RewardRules {
            xp_per_correct: parse_or(&lookup, "REWARD_XP_PER_CORRECT", r.xp_per_correct)?,
            xp_per_question: parse_or(&lookup, "REWARD_XP_PER_QUESTION", r.xp_per_question)?,
            coins_divisor: parse_or(&lookup, "REWARD_COINS_DIVISOR", r.coins_divisor)?.max(1),
            streak_step_percent: parse_or(&lookup, "REWARD_STREAK_STEP_PERCENT", r.streak_step_percent)?,
            streak_max_percent: parse_or(&lookup, "REWARD_STREAK_MAX_PERCENT", r.streak_max_percent)?,
            time_percent_per_sec: parse_or(&lookup, "REWARD_TIME_PERCENT_PER_SEC", r.time_percent_per_sec)?,
            time_max_percent: parse_or(&lookup, "REWARD_TIME_MAX_PERCENT", r.time_max_percent)?,
            win_bonus_percent: parse_or(&lookup, "REWARD_WIN_BONUS_PERCENT", r.win_bonus_percent)?,
            k_factor: parse_or(&lookup, "RATING_K_FACTOR", r.k_factor)?,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),

            jwt_secret: lookup("AUTH_JWT_SECRET").ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?,
            client_origin: lookup("CLIENT_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string()),

            supabase,
            matchmaking,
            battle,
            rewards,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
