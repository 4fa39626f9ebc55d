//! Heuristic bot scoring from environment signals.
//!
//! Each signal that matches adds a fixed weight; the total is clamped to
//! [`MAX_BOT_SCORE`]. A score at or above [`BOT_BLOCK_THRESHOLD`] blocks every
//! attempt in the session, ahead of any other gate.
//!
//! # Example
//!
//! ```
//! use download_gate::gate::{BotHeuristicScorer, EnvironmentSnapshot};
//!
//! let scorer = BotHeuristicScorer::new();
//! let mut env = EnvironmentSnapshot::interactive("Mozilla/5.0 (X11; Linux x86_64)");
//! assert!(!scorer.score(&env).is_blocking());
//!
//! env.webdriver = true;
//! assert!(scorer.score(&env).is_blocking());
//! ```

use regex::Regex;
use serde::Serialize;

use super::environment::EnvironmentSnapshot;

/// Upper bound of the score.
pub const MAX_BOT_SCORE: u8 = 100;

/// Scores at or above this value are an unconditional block.
pub const BOT_BLOCK_THRESHOLD: u8 = 50;

const WEIGHT_AUTOMATION_MARKER: u8 = 50;
const WEIGHT_HEADLESS_USER_AGENT: u8 = 40;
const WEIGHT_BOT_USER_AGENT: u8 = 30;
const WEIGHT_ZERO_WINDOW: u8 = 20;
const WEIGHT_NO_LANGUAGES: u8 = 15;
const WEIGHT_NO_PLUGINS: u8 = 10;

const HEADLESS_PATTERN: &str = r"(?i)headless|phantomjs|slimerjs";
const BOT_PATTERN: &str =
    r"(?i)bot|crawl|spider|scrape|curl|wget|python-requests|httpclient|selenium|puppeteer|playwright";

/// One evaluated heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotSignal {
    /// Stable key, used in security telemetry.
    pub key: &'static str,
    /// Whether the signal matched.
    pub active: bool,
    /// Weight contributed to the score (zero when inactive).
    pub contribution: u8,
}

impl BotSignal {
    /// Builds a signal contributing `weight` when `active`.
    #[must_use]
    pub fn scored(key: &'static str, active: bool, weight: u8) -> Self {
        Self {
            key,
            active,
            contribution: if active { weight } else { 0 },
        }
    }
}

/// Collects signals in evaluation order and sums their contributions.
#[derive(Debug, Default)]
pub struct SignalAccumulator {
    score: u8,
    signals: Vec<BotSignal>,
}

impl SignalAccumulator {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            score: 0,
            signals: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, signal: BotSignal) {
        self.score = self.score.saturating_add(signal.contribution);
        self.signals.push(signal);
    }

    #[must_use]
    pub fn finish(self) -> BotScore {
        BotScore {
            value: self.score.min(MAX_BOT_SCORE),
            signals: self.signals,
        }
    }
}

/// Risk estimate for one session. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotScore {
    value: u8,
    signals: Vec<BotSignal>,
}

impl BotScore {
    /// Score in `0..=100`.
    #[must_use]
    pub fn value(&self) -> u8 {
        self.value
    }

    /// All evaluated signals, matched or not.
    #[must_use]
    pub fn signals(&self) -> &[BotSignal] {
        &self.signals
    }

    /// Keys of the signals that matched.
    #[must_use]
    pub fn active_keys(&self) -> Vec<&'static str> {
        self.signals
            .iter()
            .filter(|s| s.active)
            .map(|s| s.key)
            .collect()
    }

    /// The matched signal with the largest contribution, if any.
    #[must_use]
    pub fn strongest_signal(&self) -> Option<&BotSignal> {
        self.signals
            .iter()
            .filter(|s| s.active)
            .max_by_key(|s| s.contribution)
    }

    /// Whether this score blocks downloads outright.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.value >= BOT_BLOCK_THRESHOLD
    }
}

/// Computes a [`BotScore`] from an [`EnvironmentSnapshot`].
///
/// Deterministic and side-effect free.
#[derive(Debug, Clone)]
pub struct BotHeuristicScorer {
    headless: Regex,
    bot: Regex,
}

impl Default for BotHeuristicScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl BotHeuristicScorer {
    /// Creates a scorer with the built-in pattern set.
    ///
    /// # Panics
    ///
    /// Panics if the static user-agent patterns fail to compile. This cannot
    /// happen with the patterns shipped in this module.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            headless: Regex::new(HEADLESS_PATTERN).expect("static headless pattern compiles"),
            bot: Regex::new(BOT_PATTERN).expect("static bot pattern compiles"),
        }
    }

    /// Scores an environment snapshot.
    #[must_use]
    pub fn score(&self, env: &EnvironmentSnapshot) -> BotScore {
        let ua = env.user_agent.trim();
        let mut acc = SignalAccumulator::with_capacity(6);

        acc.push(BotSignal::scored(
            "automation_marker",
            env.webdriver,
            WEIGHT_AUTOMATION_MARKER,
        ));
        acc.push(BotSignal::scored(
            "headless_user_agent",
            self.headless.is_match(ua),
            WEIGHT_HEADLESS_USER_AGENT,
        ));
        acc.push(BotSignal::scored(
            "bot_user_agent",
            ua.is_empty() || self.bot.is_match(ua),
            WEIGHT_BOT_USER_AGENT,
        ));
        acc.push(BotSignal::scored(
            "zero_window",
            env.outer_width == 0 || env.outer_height == 0,
            WEIGHT_ZERO_WINDOW,
        ));
        acc.push(BotSignal::scored(
            "no_languages",
            env.languages.is_empty(),
            WEIGHT_NO_LANGUAGES,
        ));
        acc.push(BotSignal::scored(
            "no_plugins",
            env.plugin_count == 0,
            WEIGHT_NO_PLUGINS,
        ));

        acc.finish()
    }
}
