//! Tab-group collection and sync for TMarks.
//!
//! `New` and `Folder` collections are staged locally first and get their
//! remote id attached once the remote side accepted them; a network failure
//! leaves them staged for [`TabGroupSyncService::sync_unsynced_groups`].
//! `Existing` collections target a server-assigned id and go remote only.

use std::sync::Arc;

use tracing::{info, warn};

use crate::database::Database;
use crate::managers::tab_group_manager::{build_tree, TabGroupManager, TabGroupManagerTrait};
use crate::services::bookmark_sync::{classify_api_error, surface_api_error};
use crate::services::tmarks_client::BookmarkApi;
use crate::types::errors::{ApiError, FailureClass, StoreError, SyncError};
use crate::types::remote::{CreateTabGroupInput, RemoteTabItem};
use crate::types::tab_group::{
    CollectMode, CollectResult, FolderTarget, GroupSyncReport, TabGroup, TabGroupItem, TabGroupNode, TabInput,
};

fn remote_items_from_tabs(tabs: &[TabInput]) -> Vec<RemoteTabItem> {
    tabs.iter()
        .map(|tab| RemoteTabItem {
            title: tab.title.clone(),
            url: tab.url.clone(),
            favicon: tab.favicon.clone(),
        })
        .collect()
}

fn remote_items(items: &[TabGroupItem]) -> Vec<RemoteTabItem> {
    items
        .iter()
        .map(|item| RemoteTabItem {
            title: item.title.clone(),
            url: item.url.clone(),
            favicon: item.favicon.clone(),
        })
        .collect()
}

fn required(value: &str, message: &str) -> Result<String, SyncError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncError::Validation(message.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Local staging plus remote sync for tab groups.
pub struct TabGroupSyncService {
    db: Arc<Database>,
    api: Arc<dyn BookmarkApi>,
}

impl TabGroupSyncService {
    pub fn new(db: Arc<Database>, api: Arc<dyn BookmarkApi>) -> Self {
        Self { db, api }
    }

    /// Collects `tabs` into a group according to `mode`.
    pub async fn collect_tabs(&self, mode: CollectMode, tabs: Vec<TabInput>) -> Result<CollectResult, SyncError> {
        if tabs.is_empty() {
            return Err(SyncError::Validation("没有可收纳的标签页".to_string()));
        }

        match mode {
            CollectMode::Existing { remote_group_id } => {
                let remote_group_id = required(&remote_group_id, "请选择目标分组")?;
                self.api
                    .add_items_to_group(&remote_group_id, &remote_items_from_tabs(&tabs))
                    .await
                    .map_err(surface_api_error)?;
                info!(remote_id = %remote_group_id, items = tabs.len(), "tabs appended to remote group");
                Ok(CollectResult {
                    success: true,
                    remote_id: Some(remote_group_id),
                    items_added: tabs.len(),
                    message: Some("标签页已添加到分组".to_string()),
                    ..Default::default()
                })
            }
            CollectMode::New { title } => {
                let title = required(&title, "分组名称不能为空")?;
                self.collect_new(title, None, tabs).await
            }
            CollectMode::Folder { title, folder } => {
                let title = required(&title, "分组名称不能为空")?;
                let parent = match folder {
                    FolderTarget::Existing(remote_id) => required(&remote_id, "请选择文件夹")?,
                    FolderTarget::New(name) => {
                        let name = required(&name, "文件夹名称不能为空")?;
                        let (folder, remote_id) = self.create_folder(&name).await?;
                        match remote_id {
                            Some(remote_id) => remote_id,
                            None => return self.stage_under_local_folder(folder, title, tabs).await,
                        }
                    }
                };
                self.collect_new(title, Some(parent), tabs).await
            }
        }
    }

    async fn attach_remote_id(&self, group_id: &str, remote_id: &str) -> Result<(), StoreError> {
        let group_id = group_id.to_string();
        let remote_id = remote_id.to_string();
        self.db
            .run_blocking(move |conn| TabGroupManager::new(conn).set_remote_id(&group_id, &remote_id))
            .await
    }

    /// Creates a folder locally and remotely. A `None` remote id means the
    /// remote side was unreachable and the folder stays staged.
    async fn create_folder(&self, name: &str) -> Result<(TabGroup, Option<String>), SyncError> {
        let title = name.to_string();
        let folder = self
            .db
            .run_blocking(move |conn| TabGroupManager::new(conn).create_group(&title, None, true))
            .await?;
        let input = CreateTabGroupInput {
            title: name.to_string(),
            is_folder: true,
            ..Default::default()
        };
        match self.api.create_tab_group(&input).await {
            Ok(remote_id) => {
                self.attach_remote_id(&folder.id, &remote_id).await?;
                info!(folder_id = %folder.id, remote_id = %remote_id, "folder created");
                Ok((folder, Some(remote_id)))
            }
            Err(error) => match classify_api_error(&error) {
                FailureClass::Network => {
                    warn!(folder_id = %folder.id, error = %error, "network failure, folder staged locally");
                    Ok((folder, None))
                }
                FailureClass::Auth => Err(SyncError::Auth(error)),
                FailureClass::Other => Err(SyncError::Remote(error)),
            },
        }
    }

    /// Offline path for a group filed under a folder that was just staged.
    async fn stage_under_local_folder(
        &self,
        folder: TabGroup,
        title: String,
        tabs: Vec<TabInput>,
    ) -> Result<CollectResult, SyncError> {
        let (group, items) = self
            .db
            .run_blocking(move |conn| {
                let mut groups = TabGroupManager::new(conn);
                let group = groups.create_group(&title, Some(folder.id.as_str()), false)?;
                let items = groups.add_items(&group.id, &tabs)?;
                Ok((group, items))
            })
            .await?;
        Ok(Self::offline_result(&group, items.len()))
    }

    /// Local-first creation of a standalone or foldered group.
    ///
    /// A parent folder without a local row is recorded by its remote id so
    /// an offline replay still files the group under it.
    async fn collect_new(
        &self,
        title: String,
        parent_remote_id: Option<String>,
        tabs: Vec<TabInput>,
    ) -> Result<CollectResult, SyncError> {
        let staged_parent = parent_remote_id.clone();
        let staged_title = title.clone();
        let (group, items) = self
            .db
            .run_blocking(move |conn| {
                let mut groups = TabGroupManager::new(conn);
                let group = match staged_parent.as_deref() {
                    Some(remote_id) => match groups.find_by_remote_id(remote_id)? {
                        Some(folder) => groups.create_group(&staged_title, Some(folder.id.as_str()), false)?,
                        None => groups.create_under_remote_folder(&staged_title, remote_id)?,
                    },
                    None => groups.create_group(&staged_title, None, false)?,
                };
                let items = groups.add_items(&group.id, &tabs)?;
                Ok((group, items))
            })
            .await?;

        let input = CreateTabGroupInput {
            title,
            parent_id: parent_remote_id,
            is_folder: false,
            items: remote_items(&items),
        };
        match self.api.create_tab_group(&input).await {
            Ok(remote_id) => {
                self.attach_remote_id(&group.id, &remote_id).await?;
                info!(group_id = %group.id, remote_id = %remote_id, items = items.len(), "tab group created");
                Ok(CollectResult {
                    success: true,
                    group_id: Some(group.id),
                    remote_id: Some(remote_id),
                    items_added: items.len(),
                    message: Some("标签页已收纳".to_string()),
                    ..Default::default()
                })
            }
            Err(error) => Self::staged_failure(&group, items.len(), error),
        }
    }

    fn staged_failure(group: &TabGroup, items: usize, error: ApiError) -> Result<CollectResult, SyncError> {
        match classify_api_error(&error) {
            FailureClass::Network => {
                warn!(group_id = %group.id, error = %error, "network failure, tab group staged locally");
                Ok(Self::offline_result(group, items))
            }
            FailureClass::Auth => Err(SyncError::Auth(error)),
            FailureClass::Other => Err(SyncError::Remote(error)),
        }
    }

    fn offline_result(group: &TabGroup, items: usize) -> CollectResult {
        CollectResult {
            success: true,
            group_id: Some(group.id.clone()),
            remote_id: None,
            items_added: items,
            offline: true,
            message: Some("网络不可用，标签页已保存到本地，将在联网后同步".to_string()),
        }
    }

    /// Pushes every locally staged group to the remote side, folders first.
    ///
    /// A group whose local parent folder is still unsynced is skipped until a
    /// later run; one filed under a remote-only folder is sent with that
    /// folder's id. Failures are logged per group and do not stop the replay.
    pub async fn sync_unsynced_groups(&self) -> Result<GroupSyncReport, SyncError> {
        let pending = self
            .db
            .run_blocking(|conn| TabGroupManager::new(conn).unsynced_groups())
            .await?;

        let mut report = GroupSyncReport::default();
        for group in pending {
            let group_id = group.id.clone();
            let local_parent = group.parent_id.clone();
            let (parent_remote_id, items) = self
                .db
                .run_blocking(move |conn| {
                    let groups = TabGroupManager::new(conn);
                    let parent = match local_parent.as_deref() {
                        Some(parent_id) => groups.get_group(parent_id)?,
                        None => None,
                    };
                    Ok((parent.map(|p| p.remote_id), groups.list_items(&group_id)?))
                })
                .await?;
            let parent_id = match parent_remote_id {
                Some(Some(remote_id)) => Some(remote_id),
                Some(None) => {
                    warn!(group_id = %group.id, "parent folder not synced yet, skipping group");
                    report.failed += 1;
                    continue;
                }
                None => group.parent_remote_id.clone(),
            };

            let input = CreateTabGroupInput {
                title: group.title.clone(),
                parent_id,
                is_folder: group.is_folder,
                items: remote_items(&items),
            };
            match self.api.create_tab_group(&input).await {
                Ok(remote_id) => {
                    self.attach_remote_id(&group.id, &remote_id).await?;
                    report.synced += 1;
                }
                Err(error) => {
                    warn!(group_id = %group.id, class = %classify_api_error(&error), error = %error, "tab group sync failed");
                    report.failed += 1;
                }
            }
        }
        info!(synced = report.synced, failed = report.failed, "tab group sync finished");
        Ok(report)
    }

    /// URLs of a group in restore order.
    pub async fn restore_tab_group(&self, group_id: &str) -> Result<Vec<String>, SyncError> {
        let group_id = group_id.to_string();
        Ok(self
            .db
            .run_blocking(move |conn| TabGroupManager::new(conn).restore_urls(&group_id))
            .await?)
    }

    /// All local groups as a folder hierarchy.
    pub async fn group_tree(&self) -> Result<Vec<TabGroupNode>, SyncError> {
        let groups = self
            .db
            .run_blocking(|conn| TabGroupManager::new(conn).list_groups())
            .await?;
        Ok(build_tree(&groups))
    }
}
