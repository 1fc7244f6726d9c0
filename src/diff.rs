//! Followers/following export parsing and comparison.
//!
//! Instagram's data export ships followers as a bare array of entries and
//! following as an object wrapping a `relationships_following` array. The
//! two formats disagree about where the username lives: followers carry it
//! in `string_list_data[0].value`, following carries it in the entry
//! `title`. Comparison is keyed on lowercased usernames.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::queue::SubmittedUser;

#[derive(Debug, Clone, Deserialize)]
pub struct StringListEntry {
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub string_list_data: Vec<StringListEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowingExport {
    #[serde(default)]
    pub relationships_following: Vec<ExportEntry>,
}

/// One account extracted from an export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub username: String,
    pub profile_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    /// Accounts that follow you and you follow back.
    pub mutual_followers: Vec<Account>,
    /// Accounts you follow that don't follow you.
    pub not_following_back: Vec<Account>,
    /// Accounts that follow you but you don't follow.
    pub you_dont_follow_back: Vec<Account>,
    pub followers: Vec<Account>,
    pub following: Vec<Account>,
}

/// Parse followers export data (bare array format).
pub fn parse_followers(entries: Vec<ExportEntry>) -> Vec<Account> {
    entries
        .into_iter()
        .filter_map(|entry| {
            let data = entry.string_list_data.into_iter().next()?;
            Some(Account {
                username: data.value,
                profile_url: data.href,
                timestamp: data.timestamp,
            })
        })
        .filter(|account| !account.username.is_empty())
        .collect()
}

/// Parse following export data (`relationships_following` format).
pub fn parse_following(export: FollowingExport) -> Vec<Account> {
    export
        .relationships_following
        .into_iter()
        .filter_map(|entry| {
            let data = entry.string_list_data.into_iter().next()?;
            Some(Account {
                // Following uses `title` for the username.
                username: entry.title,
                profile_url: data.href,
                timestamp: data.timestamp,
            })
        })
        .filter(|account| !account.username.is_empty())
        .collect()
}

/// Compare followers and following, preserving input order.
pub fn compute_diff(followers: Vec<Account>, following: Vec<Account>) -> DiffResult {
    let follower_names: HashSet<String> =
        followers.iter().map(|a| a.username.to_lowercase()).collect();
    let following_names: HashSet<String> =
        following.iter().map(|a| a.username.to_lowercase()).collect();

    let mutual_followers = followers
        .iter()
        .filter(|a| following_names.contains(&a.username.to_lowercase()))
        .cloned()
        .collect();

    let not_following_back = following
        .iter()
        .filter(|a| !follower_names.contains(&a.username.to_lowercase()))
        .cloned()
        .collect();

    let you_dont_follow_back = followers
        .iter()
        .filter(|a| !following_names.contains(&a.username.to_lowercase()))
        .cloned()
        .collect();

    DiffResult {
        mutual_followers,
        not_following_back,
        you_dont_follow_back,
        followers,
        following,
    }
}

pub fn load_followers(path: &Path) -> Result<Vec<Account>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let entries: Vec<ExportEntry> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse followers export {}", path.display()))?;
    Ok(parse_followers(entries))
}

pub fn load_following(path: &Path) -> Result<Vec<Account>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let export: FollowingExport = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse following export {}", path.display()))?;
    Ok(parse_following(export))
}

/// Convert accounts into batch entries ready for submission.
pub fn to_submitted(accounts: &[Account]) -> Vec<SubmittedUser> {
    accounts
        .iter()
        .map(|a| SubmittedUser {
            username: a.username.clone(),
            profile_url: if a.profile_url.is_empty() {
                None
            } else {
                Some(a.profile_url.clone())
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOLLOWERS_JSON: &str = r#"[
        {"title": "", "string_list_data": [
            {"href": "https://www.instagram.com/alice", "value": "alice", "timestamp": 1700000000}
        ]},
        {"title": "", "string_list_data": [
            {"href": "https://www.instagram.com/Bob", "value": "Bob", "timestamp": 1700000001}
        ]},
        {"title": "", "string_list_data": []}
    ]"#;

    const FOLLOWING_JSON: &str = r#"{
        "relationships_following": [
            {"title": "bob", "string_list_data": [
                {"href": "https://www.instagram.com/bob", "value": "bob", "timestamp": 1700000002}
            ]},
            {"title": "carol", "string_list_data": [
                {"href": "https://www.instagram.com/carol", "value": "carol", "timestamp": 1700000003}
            ]}
        ]
    }"#;

    fn parsed() -> (Vec<Account>, Vec<Account>) {
        let followers = parse_followers(serde_json::from_str(FOLLOWERS_JSON).unwrap());
        let following = parse_following(serde_json::from_str(FOLLOWING_JSON).unwrap());
        (followers, following)
    }

    #[test]
    fn followers_username_comes_from_string_list_value() {
        let (followers, _) = parsed();
        let names: Vec<_> = followers.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "Bob"]);
    }

    #[test]
    fn following_username_comes_from_title() {
        let (_, following) = parsed();
        let names: Vec<_> = following.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);
    }

    #[test]
    fn entries_without_string_list_data_are_skipped() {
        let (followers, _) = parsed();
        assert_eq!(followers.len(), 2);
    }

    #[test]
    fn diff_is_case_insensitive() {
        let (followers, following) = parsed();
        let diff = compute_diff(followers, following);

        // "Bob" follows and is followed, despite the case mismatch.
        let mutual: Vec<_> = diff.mutual_followers.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(mutual, vec!["Bob"]);

        let not_back: Vec<_> = diff
            .not_following_back
            .iter()
            .map(|a| a.username.as_str())
            .collect();
        assert_eq!(not_back, vec!["carol"]);

        let you_dont: Vec<_> = diff
            .you_dont_follow_back
            .iter()
            .map(|a| a.username.as_str())
            .collect();
        assert_eq!(you_dont, vec!["alice"]);
    }

    #[test]
    fn submitted_batch_keeps_profile_urls() {
        let (_, following) = parsed();
        let batch = to_submitted(&following);
        assert_eq!(batch[0].username, "bob");
        assert_eq!(
            batch[0].profile_url.as_deref(),
            Some("https://www.instagram.com/bob")
        );
    }
}
