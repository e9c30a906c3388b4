use std::collections::{HashSet, VecDeque};
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;

const ADJECTIVES: &[&str] = &[
    "Happy", "Swift", "Brave", "Calm", "Clever", "Wise", "Noble", "Quick",
    "Bright", "Silent", "Bold", "Gentle", "Cool", "Cosmic", "Lucky", "Mystic",
    "Stellar", "Lunar", "Solar", "Azure", "Crimson", "Golden", "Silver", "Amber",
];

const NOUNS: &[&str] = &[
    "Tiger", "Eagle", "Dolphin", "Phoenix", "Dragon", "Wolf", "Hawk", "Lion",
    "Panda", "Falcon", "Raven", "Bear", "Fox", "Owl", "Lynx", "Jaguar",
    "Orca", "Koala", "Cheetah", "Panther", "Cobra", "Viper", "Sparrow", "Swan",
];

const MAX_ATTEMPTS: usize = 100;
const HISTORY_LIMIT: usize = 1000;

fn simple_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^Guest\d{4,5}$").expect("valid guest pattern"))
}

fn compound_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Z][a-z]+[A-Z][a-z]+\d{4}$").expect("valid compound pattern")
    })
}

/// Produces display names for users who have not picked one.
///
/// Names come in two shapes: `AdjectiveNoun1234` and, after repeated
/// collisions, `Guest12345`. A generator never hands out a name that is
/// still in its recent history.
pub struct GuestNameGenerator {
    rng: StdRng,
    recent: VecDeque<String>,
    used: HashSet<String>,
    history_limit: usize,
}

impl Default for GuestNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestNameGenerator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic generator, for tests and reproducible fixtures.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            recent: VecDeque::with_capacity(HISTORY_LIMIT),
            used: HashSet::with_capacity(HISTORY_LIMIT),
            history_limit: HISTORY_LIMIT,
        }
    }

    pub fn generate_unique_name(&mut self) -> String {
        let mut name = self.compound_name();
        let mut attempts = 1;

        while self.used.contains(&name) {
            if attempts >= MAX_ATTEMPTS {
                name = format!("Guest{}", self.rng.gen_range(10000..100000));
                break;
            }
            name = self.compound_name();
            attempts += 1;
        }

        self.remember(name.clone());
        name
    }

    /// `Guest` followed by four digits. Not tracked in the history.
    pub fn generate_simple_name(&mut self) -> String {
        format!("Guest{}", self.rng.gen_range(1000..10000))
    }

    pub fn is_guest_name(&self, username: &str) -> bool {
        is_guest_name(username)
    }

    pub fn recent_count(&self) -> usize {
        self.recent.len()
    }

    fn compound_name(&mut self) -> String {
        let adjective = ADJECTIVES.choose(&mut self.rng).copied().unwrap_or("Happy");
        let noun = NOUNS.choose(&mut self.rng).copied().unwrap_or("Tiger");
        let number = self.rng.gen_range(1000..10000);
        format!("{}{}{}", adjective, noun, number)
    }

    fn remember(&mut self, name: String) {
        if self.recent.len() >= self.history_limit {
            if let Some(oldest) = self.recent.pop_front() {
                self.used.remove(&oldest);
            }
        }
        self.used.insert(name.clone());
        self.recent.push_back(name);
    }
}

/// True for `Guest` + 4-5 digits, or two capitalized words + 4 digits.
pub fn is_guest_name(username: &str) -> bool {
    if username.trim().is_empty() {
        return false;
    }
    simple_pattern().is_match(username) || compound_pattern().is_match(username)
}
