//! Locally stored records.

use serde::{Deserialize, Serialize};

/// A platform user.
///
/// `userid` is the platform's identifier and is unique locally; `id` is the
/// row id once the user has been stored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub userid: String,
    pub username: String,
    pub usericon: String,
    pub user_type: String,

    // Extended profile
    pub is_watching: Option<bool>,
    pub profile_url: Option<String>,
    pub user_is_artist: Option<bool>,
    pub artist_level: Option<String>,
    pub artist_specialty: Option<String>,
    pub real_name: Option<String>,
    pub tagline: Option<String>,
    pub country_id: Option<i64>,
    pub country: Option<String>,
    pub website: Option<String>,
    pub bio: Option<String>,

    // Profile statistics
    pub user_deviations: Option<i64>,
    pub user_favourites: Option<i64>,
    pub user_comments: Option<i64>,
    pub profile_pageviews: Option<i64>,
    pub profile_comments: Option<i64>,
}

/// A gallery folder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gallery {
    pub id: Option<i64>,
    pub folderid: String,
    pub name: String,
    pub parent: Option<String>,
    pub size: Option<i64>,
    /// Local flag; never overwritten by a sync
    pub sync_enabled: bool,
}
