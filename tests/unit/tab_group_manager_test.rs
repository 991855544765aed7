//! Unit tests for the local tab-group store and hierarchy builder.

use tmarks::database::Database;
use tmarks::managers::tab_group_manager::{build_tree, TabGroupManager, TabGroupManagerTrait};
use tmarks::types::errors::StoreError;
use tmarks::types::tab_group::{TabGroup, TabGroupItem, TabInput};

fn tab(n: usize) -> TabInput {
    TabInput {
        title: format!("Tab {}", n),
        url: format!("https://example.com/{}", n),
        favicon: None,
    }
}

fn item(group_id: &str, url: &str, position: i64) -> TabGroupItem {
    TabGroupItem {
        id: format!("item-{}", position),
        group_id: group_id.to_string(),
        title: url.to_string(),
        url: url.to_string(),
        favicon: None,
        position,
        created_at: 0,
    }
}

fn group(id: &str, parent: Option<&str>) -> TabGroup {
    TabGroup {
        id: id.to_string(),
        title: id.to_string(),
        created_at: 0,
        remote_id: None,
        parent_id: parent.map(str::to_string),
        parent_remote_id: None,
        is_folder: parent.is_none(),
    }
}

#[test]
fn test_add_items_assigns_contiguous_positions() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = TabGroupManager::new(&conn);
    let g = mgr.create_group("Reading", None, false).unwrap();

    mgr.add_items(&g.id, &[tab(0), tab(1)]).unwrap();
    let more = mgr.add_items(&g.id, &[tab(2)]).unwrap();

    assert_eq!(more[0].position, 2);
    let positions: Vec<i64> = mgr.list_items(&g.id).unwrap().iter().map(|i| i.position).collect();
    assert_eq!(positions, vec![0, 1, 2]);
}

#[test]
fn test_add_items_to_missing_group_fails() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = TabGroupManager::new(&conn);

    assert!(matches!(mgr.add_items("nope", &[tab(0)]), Err(StoreError::NotFound(_))));
}

#[test]
fn test_restore_follows_position_not_insertion_order() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = TabGroupManager::new(&conn);
    let g = mgr.create_group("Shuffled", None, false).unwrap();

    mgr.insert_item(&item(&g.id, "https://c.example", 2)).unwrap();
    mgr.insert_item(&item(&g.id, "https://a.example", 0)).unwrap();
    mgr.insert_item(&item(&g.id, "https://b.example", 1)).unwrap();

    assert_eq!(
        mgr.restore_urls(&g.id).unwrap(),
        vec!["https://a.example", "https://b.example", "https://c.example"]
    );
}

#[test]
fn test_remove_item_closes_the_gap() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = TabGroupManager::new(&conn);
    let g = mgr.create_group("Reading", None, false).unwrap();
    let items = mgr.add_items(&g.id, &[tab(0), tab(1), tab(2), tab(3)]).unwrap();

    mgr.remove_item(&items[1].id).unwrap();

    let remaining = mgr.list_items(&g.id).unwrap();
    let positions: Vec<i64> = remaining.iter().map(|i| i.position).collect();
    let urls: Vec<&str> = remaining.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(positions, vec![0, 1, 2]);
    assert_eq!(urls, vec!["https://example.com/0", "https://example.com/2", "https://example.com/3"]);
}

#[test]
fn test_delete_group_cascades_items() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = TabGroupManager::new(&conn);
    let g = mgr.create_group("Temp", None, false).unwrap();
    mgr.add_items(&g.id, &[tab(0)]).unwrap();

    mgr.delete_group(&g.id).unwrap();

    assert!(mgr.get_group(&g.id).unwrap().is_none());
    assert!(mgr.list_items(&g.id).unwrap().is_empty());
    assert!(matches!(mgr.restore_urls(&g.id), Err(StoreError::NotFound(_))));
}

#[test]
fn test_unsynced_groups_list_folders_first() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    let mut mgr = TabGroupManager::new(&conn);
    let plain = mgr.create_group("Plain", None, false).unwrap();
    let folder = mgr.create_group("Folder", None, true).unwrap();
    let synced = mgr.create_group("Synced", None, false).unwrap();
    mgr.set_remote_id(&synced.id, "remote-1").unwrap();

    let ids: Vec<String> = mgr.unsynced_groups().unwrap().into_iter().map(|g| g.id).collect();

    assert_eq!(ids, vec![folder.id, plain.id]);
    assert_eq!(mgr.find_by_remote_id("remote-1").unwrap().unwrap().id, synced.id);
}

#[test]
fn test_build_tree_nests_children() {
    let groups = vec![group("folder", None), group("a", Some("folder")), group("b", Some("folder"))];
    let tree = build_tree(&groups);

    assert_eq!(tree.len(), 1);
    let children: Vec<&str> = tree[0].children.iter().map(|n| n.group.id.as_str()).collect();
    assert_eq!(children, vec!["a", "b"]);
}

#[test]
fn test_build_tree_promotes_dangling_parent_to_root() {
    let groups = vec![group("folder", None), group("orphan", Some("missing"))];
    let tree = build_tree(&groups);

    let roots: Vec<&str> = tree.iter().map(|n| n.group.id.as_str()).collect();
    assert_eq!(roots, vec!["folder", "orphan"]);
}

#[test]
fn test_build_tree_breaks_cycles() {
    let groups = vec![group("a", Some("b")), group("b", Some("a")), group("self", Some("self"))];
    let tree = build_tree(&groups);

    fn count(nodes: &[tmarks::types::tab_group::TabGroupNode]) -> usize {
        nodes.iter().map(|n| 1 + count(&n.children)).sum()
    }
    assert_eq!(count(&tree), 3, "every group appears exactly once");
}
