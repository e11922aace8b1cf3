//! Local persistence for synced records.
//!
//! Both repositories live in one SQLite database. Users are keyed by the
//! platform `userid`, galleries by `folderid`; saving an existing record
//! updates it in place and keeps its row id.

use crate::entity::{Gallery, User};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Storage for users.
pub trait UserRepository: Send + Sync {
    /// Insert or update by `userid`. Returns the row id.
    fn save_user(&self, user: &User) -> Result<i64>;
    fn get_user_by_userid(&self, userid: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
}

/// Storage for gallery folders.
pub trait GalleryRepository: Send + Sync {
    /// Insert or update by `folderid`. An update keeps the stored
    /// `sync_enabled` flag. Returns the row id.
    fn save_gallery(&self, gallery: &Gallery) -> Result<i64>;
    fn get_gallery_by_folderid(&self, folderid: &str) -> Result<Option<Gallery>>;
    /// All galleries ordered by name.
    fn list_galleries(&self) -> Result<Vec<Gallery>>;
    /// Returns false if no gallery has this `folderid`.
    fn set_sync_enabled(&self, folderid: &str, enabled: bool) -> Result<bool>;
}

const USER_COLUMNS: &str = "id, userid, username, usericon, type, is_watching, profile_url, \
     user_is_artist, artist_level, artist_specialty, real_name, tagline, country_id, country, \
     website, bio, user_deviations, user_favourites, user_comments, profile_pageviews, \
     profile_comments";

const GALLERY_COLUMNS: &str = "id, folderid, name, parent, size, sync_enabled";

/// SQLite implementation of both repositories.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Opens (or creates) the database and ensures the tables exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Self::with_connection(conn)
    }

    pub fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                userid            TEXT NOT NULL UNIQUE,
                username          TEXT NOT NULL,
                usericon          TEXT NOT NULL,
                type              TEXT NOT NULL,
                is_watching       INTEGER,
                profile_url       TEXT,
                user_is_artist    INTEGER,
                artist_level      TEXT,
                artist_specialty  TEXT,
                real_name         TEXT,
                tagline           TEXT,
                country_id        INTEGER,
                country           TEXT,
                website           TEXT,
                bio               TEXT,
                user_deviations   INTEGER,
                user_favourites   INTEGER,
                user_comments     INTEGER,
                profile_pageviews INTEGER,
                profile_comments  INTEGER,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

            CREATE TABLE IF NOT EXISTS galleries (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                folderid     TEXT NOT NULL UNIQUE,
                name         TEXT NOT NULL,
                parent       TEXT,
                size         INTEGER,
                sync_enabled INTEGER NOT NULL DEFAULT 1,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );",
        )
        .context("Failed to create sync tables")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Repository lock poisoned"))
    }
}

impl UserRepository for SqliteRepository {
    fn save_user(&self, user: &User) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (
                userid, username, usericon, type, is_watching, profile_url, user_is_artist,
                artist_level, artist_specialty, real_name, tagline, country_id, country,
                website, bio, user_deviations, user_favourites, user_comments,
                profile_pageviews, profile_comments, created_at, updated_at
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?21)
             ON CONFLICT(userid) DO UPDATE SET
                username = excluded.username,
                usericon = excluded.usericon,
                type = excluded.type,
                is_watching = excluded.is_watching,
                profile_url = excluded.profile_url,
                user_is_artist = excluded.user_is_artist,
                artist_level = excluded.artist_level,
                artist_specialty = excluded.artist_specialty,
                real_name = excluded.real_name,
                tagline = excluded.tagline,
                country_id = excluded.country_id,
                country = excluded.country,
                website = excluded.website,
                bio = excluded.bio,
                user_deviations = excluded.user_deviations,
                user_favourites = excluded.user_favourites,
                user_comments = excluded.user_comments,
                profile_pageviews = excluded.profile_pageviews,
                profile_comments = excluded.profile_comments,
                updated_at = excluded.updated_at",
            params![
                user.userid,
                user.username,
                user.usericon,
                user.user_type,
                user.is_watching,
                user.profile_url,
                user.user_is_artist,
                user.artist_level,
                user.artist_specialty,
                user.real_name,
                user.tagline,
                user.country_id,
                user.country,
                user.website,
                user.bio,
                user.user_deviations,
                user.user_favourites,
                user.user_comments,
                user.profile_pageviews,
                user.profile_comments,
                now,
            ],
        )
        .context("Failed to save user")?;

        conn.query_row(
            "SELECT id FROM users WHERE userid = ?1",
            params![user.userid],
            |row| row.get(0),
        )
        .context("Failed to read saved user id")
    }

    fn get_user_by_userid(&self, userid: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE userid = ?1", USER_COLUMNS),
            params![userid],
            row_to_user,
        )
        .optional()
        .context("Failed to query user by userid")
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            row_to_user,
        )
        .optional()
        .context("Failed to query user by username")
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list users")?;
        Ok(users)
    }
}

impl GalleryRepository for SqliteRepository {
    fn save_gallery(&self, gallery: &Gallery) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO galleries (folderid, name, parent, size, sync_enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(folderid) DO UPDATE SET
                name = excluded.name,
                parent = excluded.parent,
                size = excluded.size,
                updated_at = excluded.updated_at",
            params![
                gallery.folderid,
                gallery.name,
                gallery.parent,
                gallery.size,
                gallery.sync_enabled,
                now,
            ],
        )
        .context("Failed to save gallery")?;

        conn.query_row(
            "SELECT id FROM galleries WHERE folderid = ?1",
            params![gallery.folderid],
            |row| row.get(0),
        )
        .context("Failed to read saved gallery id")
    }

    fn get_gallery_by_folderid(&self, folderid: &str) -> Result<Option<Gallery>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM galleries WHERE folderid = ?1", GALLERY_COLUMNS),
            params![folderid],
            row_to_gallery,
        )
        .optional()
        .context("Failed to query gallery")
    }

    fn list_galleries(&self) -> Result<Vec<Gallery>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM galleries ORDER BY name",
            GALLERY_COLUMNS
        ))?;
        let galleries = stmt
            .query_map([], row_to_gallery)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list galleries")?;
        Ok(galleries)
    }

    fn set_sync_enabled(&self, folderid: &str, enabled: bool) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE galleries SET sync_enabled = ?1, updated_at = ?2 WHERE folderid = ?3",
                params![enabled, Utc::now().to_rfc3339(), folderid],
            )
            .context("Failed to update sync_enabled")?;
        Ok(changed > 0)
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: Some(row.get(0)?),
        userid: row.get(1)?,
        username: row.get(2)?,
        usericon: row.get(3)?,
        user_type: row.get(4)?,
        is_watching: row.get(5)?,
        profile_url: row.get(6)?,
        user_is_artist: row.get(7)?,
        artist_level: row.get(8)?,
        artist_specialty: row.get(9)?,
        real_name: row.get(10)?,
        tagline: row.get(11)?,
        country_id: row.get(12)?,
        country: row.get(13)?,
        website: row.get(14)?,
        bio: row.get(15)?,
        user_deviations: row.get(16)?,
        user_favourites: row.get(17)?,
        user_comments: row.get(18)?,
        profile_pageviews: row.get(19)?,
        profile_comments: row.get(20)?,
    })
}

fn row_to_gallery(row: &Row<'_>) -> rusqlite::Result<Gallery> {
    Ok(Gallery {
        id: Some(row.get(0)?),
        folderid: row.get(1)?,
        name: row.get(2)?,
        parent: row.get(3)?,
        size: row.get(4)?,
        sync_enabled: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo() -> SqliteRepository {
        SqliteRepository::new(":memory:").unwrap()
    }

    fn make_user(userid: &str, username: &str) -> User {
        User {
            userid: userid.to_string(),
            username: username.to_string(),
            usericon: "https://a.deviantart.net/avatars/default.gif".to_string(),
            user_type: "regular".to_string(),
            ..User::default()
        }
    }

    fn make_gallery(folderid: &str, name: &str) -> Gallery {
        Gallery {
            id: None,
            folderid: folderid.to_string(),
            name: name.to_string(),
            parent: None,
            size: Some(3),
            sync_enabled: true,
        }
    }

    #[test]
    fn test_save_and_get_user() {
        let repo = make_repo();
        let mut user = make_user("U-1", "sketcher");
        user.user_is_artist = Some(true);
        user.profile_pageviews = Some(120);

        let id = repo.save_user(&user).unwrap();

        let by_userid = repo.get_user_by_userid("U-1").unwrap().unwrap();
        assert_eq!(by_userid.id, Some(id));
        assert_eq!(by_userid.username, "sketcher");
        assert_eq!(by_userid.user_is_artist, Some(true));
        assert_eq!(by_userid.profile_pageviews, Some(120));

        let by_username = repo.get_user_by_username("sketcher").unwrap().unwrap();
        assert_eq!(by_username.userid, "U-1");

        assert!(repo.get_user_by_userid("U-2").unwrap().is_none());
    }

    #[test]
    fn test_save_user_upserts_by_userid() {
        let repo = make_repo();
        let first = repo.save_user(&make_user("U-1", "old-name")).unwrap();
        let second = repo.save_user(&make_user("U-1", "new-name")).unwrap();

        assert_eq!(first, second);
        let users = repo.list_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "new-name");
        assert!(repo.get_user_by_username("old-name").unwrap().is_none());
    }

    #[test]
    fn test_list_users_in_insert_order() {
        let repo = make_repo();
        repo.save_user(&make_user("U-1", "zed")).unwrap();
        repo.save_user(&make_user("U-2", "amy")).unwrap();

        let names: Vec<String> = repo
            .list_users()
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["zed", "amy"]);
    }

    #[test]
    fn test_save_gallery_upserts_by_folderid() {
        let repo = make_repo();
        let first = repo.save_gallery(&make_gallery("F-1", "Sketches")).unwrap();

        let mut renamed = make_gallery("F-1", "Old Sketches");
        renamed.size = Some(9);
        let second = repo.save_gallery(&renamed).unwrap();

        assert_eq!(first, second);
        let stored = repo.get_gallery_by_folderid("F-1").unwrap().unwrap();
        assert_eq!(stored.name, "Old Sketches");
        assert_eq!(stored.size, Some(9));
        assert_eq!(repo.list_galleries().unwrap().len(), 1);
    }

    #[test]
    fn test_update_keeps_sync_enabled() {
        let repo = make_repo();
        repo.save_gallery(&make_gallery("F-1", "Sketches")).unwrap();
        assert!(repo.set_sync_enabled("F-1", false).unwrap());

        // A later sync brings the folder back with the default flag
        repo.save_gallery(&make_gallery("F-1", "Sketches")).unwrap();

        let stored = repo.get_gallery_by_folderid("F-1").unwrap().unwrap();
        assert!(!stored.sync_enabled);
    }

    #[test]
    fn test_set_sync_enabled_unknown_folder() {
        let repo = make_repo();
        assert!(!repo.set_sync_enabled("missing", false).unwrap());
    }

    #[test]
    fn test_list_galleries_ordered_by_name() {
        let repo = make_repo();
        repo.save_gallery(&make_gallery("F-1", "Sketches")).unwrap();
        repo.save_gallery(&make_gallery("F-2", "Featured")).unwrap();
        repo.save_gallery(&make_gallery("F-3", "Landscapes")).unwrap();

        let names: Vec<String> = repo
            .list_galleries()
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["Featured", "Landscapes", "Sketches"]);
    }
}
