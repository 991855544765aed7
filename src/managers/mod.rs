// TMarks local cache managers
// Managers handle synchronous SQLite CRUD: tags, bookmarks, tab groups, offline queue.

pub mod bookmark_manager;
pub mod pending_queue;
pub mod tab_group_manager;
pub mod tag_manager;
