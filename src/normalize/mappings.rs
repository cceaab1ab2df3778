// src/normalize/mappings.rs
//! Per-platform field mapping tables.
//!
//! Paths are dotted (`user.public_metrics.followers_count`). For each field
//! the rules are tried in order and the first one producing a valid value wins.

use crate::platform::Platform;
use crate::prospect::{signals, Field};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Text,
    Email,
    Url,
    /// Bare handle rendered through a profile URL template (`{}` = handle).
    Handle(&'static str),
    Timestamp,
    Company,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: Field,
    pub paths: &'static [&'static str],
    pub transform: Transform,
}

/// Numeric or boolean value copied into a versioned signal key.
#[derive(Debug, Clone, Copy)]
pub struct SignalRule {
    pub key: &'static str,
    pub paths: &'static [&'static str],
}

/// Timestamp that implies a buying-signal event of `kind`.
#[derive(Debug, Clone, Copy)]
pub struct EventRule {
    pub kind: &'static str,
    pub paths: &'static [&'static str],
}

#[derive(Debug)]
pub struct MappingTable {
    pub fields: &'static [FieldRule],
    pub signals: &'static [SignalRule],
    pub events: &'static [EventRule],
    pub source_url: &'static [&'static str],
}

pub const TWITTER_PROFILE: &str = "https://twitter.com/{}";
pub const GITHUB_PROFILE: &str = "https://github.com/{}";
pub const LINKEDIN_PROFILE: &str = "https://www.linkedin.com/in/{}";

const fn rule(field: Field, paths: &'static [&'static str], transform: Transform) -> FieldRule {
    FieldRule {
        field,
        paths,
        transform,
    }
}

const fn signal(key: &'static str, paths: &'static [&'static str]) -> SignalRule {
    SignalRule { key, paths }
}

const fn event(kind: &'static str, paths: &'static [&'static str]) -> EventRule {
    EventRule { kind, paths }
}

use Transform::*;

static GITHUB: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["name", "login"], Text),
        rule(Field::Email, &["email"], Email),
        rule(Field::Company, &["company"], Company),
        rule(Field::Location, &["location"], Text),
        rule(Field::Bio, &["bio"], Text),
        rule(Field::GithubUrl, &["html_url"], Url),
        rule(Field::GithubUrl, &["login"], Handle(GITHUB_PROFILE)),
        rule(Field::TwitterUrl, &["twitter_username"], Handle(TWITTER_PROFILE)),
        rule(Field::Website, &["blog"], Url),
        rule(Field::LastActivity, &["updated_at"], Timestamp),
    ],
    signals: &[
        signal(signals::FOLLOWERS, &["followers"]),
        signal(signals::ACTIVITY, &["public_repos", "contributions"]),
    ],
    events: &[],
    source_url: &["source_url", "html_url"],
};

static TWITTER: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["user.name", "name"], Text),
        rule(Field::TwitterUrl, &["user.username", "username"], Handle(TWITTER_PROFILE)),
        rule(Field::Bio, &["user.description", "description"], Text),
        rule(Field::Location, &["user.location", "location"], Text),
        rule(Field::Website, &["user.url", "url"], Url),
        rule(Field::LastActivity, &["tweet.created_at", "created_at"], Timestamp),
    ],
    signals: &[
        signal(
            signals::FOLLOWERS,
            &["user.public_metrics.followers_count", "followers_count"],
        ),
        signal(
            signals::ACTIVITY,
            &["user.public_metrics.tweet_count", "tweet_count"],
        ),
        signal(signals::VERIFIED, &["user.verified", "verified"]),
    ],
    events: &[],
    source_url: &["source_url"],
};

static REDDIT: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["author_fullname", "name", "author", "username"], Text),
        rule(Field::Bio, &["subreddit.public_description", "description"], Text),
        rule(Field::Website, &["website"], Url),
        rule(Field::LastActivity, &["created_utc", "created"], Timestamp),
    ],
    signals: &[
        signal(signals::FOLLOWERS, &["total_karma", "link_karma"]),
        signal(signals::ACTIVITY, &["comment_karma", "num_comments"]),
    ],
    events: &[],
    source_url: &["source_url", "permalink", "url"],
};

static STACK_OVERFLOW: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["display_name", "owner.display_name"], Text),
        rule(Field::Location, &["location"], Text),
        rule(Field::Bio, &["about_me"], Text),
        rule(Field::Website, &["website_url"], Url),
        rule(Field::LastActivity, &["last_access_date", "last_activity_date"], Timestamp),
    ],
    signals: &[
        signal(signals::FOLLOWERS, &["reputation", "owner.reputation"]),
        signal(signals::ACTIVITY, &["answer_count", "question_count"]),
    ],
    events: &[],
    source_url: &["source_url", "link", "owner.link"],
};

static LINKEDIN: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["full_name", "name"], Text),
        rule(Field::Title, &["headline", "title"], Text),
        rule(Field::Company, &["current_company.name", "company"], Company),
        rule(Field::Location, &["location"], Text),
        rule(Field::Industry, &["industry"], Text),
        rule(Field::Email, &["email"], Email),
        rule(Field::LinkedinUrl, &["profile_url", "url"], Url),
        rule(Field::LinkedinUrl, &["public_identifier"], Handle(LINKEDIN_PROFILE)),
        rule(Field::Bio, &["summary"], Text),
        rule(Field::LastActivity, &["last_activity", "updated_at"], Timestamp),
    ],
    signals: &[signal(signals::FOLLOWERS, &["connections", "followers"])],
    events: &[],
    source_url: &["source_url", "profile_url", "url"],
};

static CRUNCHBASE: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["name", "person.name"], Text),
        rule(Field::Title, &["title", "job_title"], Text),
        rule(Field::Company, &["organization.name", "company"], Company),
        rule(Field::Industry, &["organization.industry", "industry"], Text),
        rule(Field::Location, &["location", "organization.location"], Text),
        rule(Field::Email, &["email"], Email),
        rule(Field::LinkedinUrl, &["linkedin_url", "linkedin"], Url),
        rule(Field::TwitterUrl, &["twitter_url", "twitter"], Url),
        rule(Field::Website, &["organization.website", "website"], Url),
        rule(Field::Bio, &["short_description", "description"], Text),
        rule(Field::LastActivity, &["updated_at"], Timestamp),
    ],
    signals: &[],
    events: &[event(
        "funding",
        &["organization.last_funding_at", "last_funding_at"],
    )],
    source_url: &["source_url", "permalink"],
};

static HACKER_NEWS: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["author", "by", "username"], Text),
        rule(Field::Bio, &["about"], Text),
        rule(Field::Website, &["website"], Url),
        rule(Field::LastActivity, &["created_at_i", "created_at", "time"], Timestamp),
    ],
    signals: &[
        signal(signals::FOLLOWERS, &["karma"]),
        signal(signals::ACTIVITY, &["num_comments", "points"]),
    ],
    events: &[],
    source_url: &["source_url", "hn_url", "story_url"],
};

static PRODUCT_HUNT: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["maker.name", "name"], Text),
        rule(Field::Title, &["maker.headline", "headline"], Text),
        rule(Field::Company, &["maker.company", "product.name"], Company),
        rule(
            Field::TwitterUrl,
            &["maker.twitter_username", "twitter_username"],
            Handle(TWITTER_PROFILE),
        ),
        rule(Field::Website, &["maker.website_url", "website_url"], Url),
        rule(Field::Bio, &["product.tagline", "tagline"], Text),
        rule(Field::LastActivity, &["product.featured_at", "featured_at"], Timestamp),
    ],
    signals: &[signal(signals::ACTIVITY, &["product.votes_count", "votes_count"])],
    events: &[event(
        "launch",
        &["product.featured_at", "featured_at", "launched_at"],
    )],
    source_url: &["source_url", "product.url", "url"],
};

/// Canonical field names as keys, for platforms without a dedicated table.
static GENERIC: MappingTable = MappingTable {
    fields: &[
        rule(Field::Name, &["name", "full_name", "display_name"], Text),
        rule(Field::Title, &["title", "headline"], Text),
        rule(Field::Company, &["company", "organization"], Company),
        rule(Field::Location, &["location"], Text),
        rule(Field::Industry, &["industry"], Text),
        rule(Field::Email, &["email"], Email),
        rule(Field::LinkedinUrl, &["linkedin_url"], Url),
        rule(Field::TwitterUrl, &["twitter_url"], Url),
        rule(Field::TwitterUrl, &["twitter_username"], Handle(TWITTER_PROFILE)),
        rule(Field::GithubUrl, &["github_url"], Url),
        rule(Field::GithubUrl, &["github_username"], Handle(GITHUB_PROFILE)),
        rule(Field::Website, &["website", "url"], Url),
        rule(Field::Bio, &["bio", "description", "about"], Text),
        rule(Field::LastActivity, &["last_activity", "updated_at", "created_at"], Timestamp),
    ],
    signals: &[
        signal(signals::FOLLOWERS, &["followers", "subscribers", "members"]),
        signal(signals::ACTIVITY, &["activity", "posts", "events_attended"]),
        signal(signals::PLATFORM_ENGAGEMENT, &["engagement"]),
        signal(signals::VERIFIED, &["verified"]),
    ],
    events: &[
        event("hiring", &["posted_at"]),
        event("event", &["event_date", "start_time"]),
    ],
    source_url: &["source_url", "profile_url", "permalink"],
};

pub fn table_for(platform: Platform) -> &'static MappingTable {
    match platform {
        Platform::Github => &GITHUB,
        Platform::Twitter => &TWITTER,
        Platform::Reddit => &REDDIT,
        Platform::StackOverflow => &STACK_OVERFLOW,
        Platform::Linkedin => &LINKEDIN,
        Platform::Crunchbase => &CRUNCHBASE,
        Platform::HackerNews => &HACKER_NEWS,
        Platform::ProductHunt => &PRODUCT_HUNT,
        _ => &GENERIC,
    }
}
