use crate::api::{GalleryFolder, Profile, WhoAmI};
use crate::entity::{Gallery, User};

/// Build a user from the `/user/whoami` response.
pub fn user_from_whoami(whoami: &WhoAmI) -> User {
    User {
        id: None,
        userid: whoami.userid.clone(),
        username: whoami.username.clone(),
        usericon: whoami.usericon.clone(),
        user_type: whoami.user_type.clone(),
        ..User::default()
    }
}

/// Copy extended profile fields and statistics onto `user`.
pub fn apply_profile(user: &mut User, profile: &Profile) {
    user.is_watching = profile.is_watching;
    user.profile_url = profile.profile_url.clone();
    user.user_is_artist = profile.user_is_artist;
    user.artist_level = profile.artist_level.clone();
    user.artist_specialty = profile.artist_specialty.clone();
    user.real_name = profile.real_name.clone();
    user.tagline = profile.tagline.clone();
    user.country_id = profile.countryid;
    user.country = profile.country.clone();
    user.website = profile.website.clone();
    user.bio = profile.bio.clone();

    let stats = profile.stats.clone().unwrap_or_default();
    user.user_deviations = stats.user_deviations;
    user.user_favourites = stats.user_favourites;
    user.user_comments = stats.user_comments;
    user.profile_pageviews = stats.profile_pageviews;
    user.profile_comments = stats.profile_comments;
}

/// Transform a gallery folder into a gallery with sync enabled.
pub fn folder_to_gallery(folder: &GalleryFolder) -> Gallery {
    Gallery {
        id: None,
        folderid: folder.folderid.clone(),
        name: folder.name.clone(),
        parent: folder.parent.clone(),
        size: folder.size,
        sync_enabled: true,
    }
}
