//! Sync services: fetch from the platform, normalize, upsert locally.

use crate::api::{GalleryFolderOptions, PlatformClient};
use crate::entity::User;
use crate::repository::{GalleryRepository, UserRepository};
use crate::transformer::{apply_profile, folder_to_gallery, user_from_whoami};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SyncService {
    client: PlatformClient,
    users: Arc<dyn UserRepository>,
    galleries: Arc<dyn GalleryRepository>,
}

impl SyncService {
    pub fn new(
        client: PlatformClient,
        users: Arc<dyn UserRepository>,
        galleries: Arc<dyn GalleryRepository>,
    ) -> Self {
        Self {
            client,
            users,
            galleries,
        }
    }

    /// Sync the authenticated user, optionally with the extended profile.
    ///
    /// A failed profile request only costs the extended fields; the basic
    /// user is still saved. Returns the stored user with its row id.
    pub async fn sync_user(&self, access_token: &str, extended: bool) -> Result<User> {
        let whoami = self
            .client
            .whoami(access_token)
            .await
            .context("Failed to fetch authenticated user")?;
        info!(username = %whoami.username, "Fetched user info");

        let mut user = user_from_whoami(&whoami);

        if extended {
            match self.client.profile(access_token, &whoami.username).await {
                Ok(profile) => {
                    apply_profile(&mut user, &profile);
                    debug!(username = %user.username, "Extended profile added");
                }
                Err(e) => {
                    warn!(
                        username = %whoami.username,
                        error = %e,
                        "Could not fetch extended profile, continuing with basic info"
                    );
                }
            }
        }

        let id = self.users.save_user(&user)?;
        user.id = Some(id);
        info!(username = %user.username, id, "User synced");
        Ok(user)
    }

    /// Sync gallery folders. Returns how many were upserted.
    ///
    /// The fetch is all or nothing, so a failed page leaves storage untouched.
    pub async fn sync_galleries(
        &self,
        access_token: &str,
        options: &GalleryFolderOptions,
    ) -> Result<usize> {
        let folders = self
            .client
            .gallery_folders(access_token, options)
            .await
            .context("Failed to fetch gallery folders")?;
        info!(count = folders.len(), "Fetched gallery folders");

        for folder in &folders {
            let gallery = folder_to_gallery(folder);
            let id = self.galleries.save_gallery(&gallery)?;
            debug!(name = %gallery.name, folderid = %gallery.folderid, id, "Gallery synced");
        }

        info!(count = folders.len(), "Galleries synced");
        Ok(folders.len())
    }
}
