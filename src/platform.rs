//! # Platforms
//!
//! Closed set of third-party platforms the engine knows how to select, rate
//! limit and normalize. Declaration order doubles as the fixed tie-break
//! order: when two platforms score the same, the one declared first wins.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GoogleSearch,
    Linkedin,
    Github,
    StackOverflow,
    HackerNews,
    Twitter,
    ProductHunt,
    Crunchbase,
    Angellist,
    Reddit,
    Medium,
    Substack,
    Youtube,
    JobBoards,
    Eventbrite,
    Meetup,
    Discord,
}

impl Platform {
    /// All platforms in tie-break order.
    pub const ALL: [Platform; 17] = [
        Platform::GoogleSearch,
        Platform::Linkedin,
        Platform::Github,
        Platform::StackOverflow,
        Platform::HackerNews,
        Platform::Twitter,
        Platform::ProductHunt,
        Platform::Crunchbase,
        Platform::Angellist,
        Platform::Reddit,
        Platform::Medium,
        Platform::Substack,
        Platform::Youtube,
        Platform::JobBoards,
        Platform::Eventbrite,
        Platform::Meetup,
        Platform::Discord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GoogleSearch => "google_search",
            Platform::Linkedin => "linkedin",
            Platform::Github => "github",
            Platform::StackOverflow => "stack_overflow",
            Platform::HackerNews => "hacker_news",
            Platform::Twitter => "twitter",
            Platform::ProductHunt => "product_hunt",
            Platform::Crunchbase => "crunchbase",
            Platform::Angellist => "angellist",
            Platform::Reddit => "reddit",
            Platform::Medium => "medium",
            Platform::Substack => "substack",
            Platform::Youtube => "youtube",
            Platform::JobBoards => "job_boards",
            Platform::Eventbrite => "eventbrite",
            Platform::Meetup => "meetup",
            Platform::Discord => "discord",
        }
    }

    /// Position in the fixed tie-break table (0 = preferred).
    pub fn rank(&self) -> usize {
        Platform::ALL
            .iter()
            .position(|p| p == self)
            .unwrap_or(Platform::ALL.len())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    /// Case-insensitive; accepts `-` and spaces in place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let alias = match key.as_str() {
            "google" => "google_search",
            "stackoverflow" => "stack_overflow",
            "hackernews" | "hn" => "hacker_news",
            "producthunt" => "product_hunt",
            "x" => "twitter",
            "angel_list" | "wellfound" => "angellist",
            other => other,
        };
        Platform::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == alias)
            .ok_or_else(|| format!("unknown platform: {s}"))
    }
}
