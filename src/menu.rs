use serde::Serialize;

use crate::model::{Page, SiteTree, Viewer};
use crate::publication::live_for_user;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MenuItem {
    pub title: String,
    pub url: String,
    pub active: bool,
}

/// The root page's children that opted into menus, in tree order.
pub fn site_menu(tree: &SiteTree, viewer: Viewer, current: Option<&Page>) -> Vec<MenuItem> {
    let Some(root) = tree.root() else {
        return Vec::new();
    };

    live_for_user(tree.children(root.id), viewer)
        .into_iter()
        .filter(|page| page.show_in_menus)
        .map(|page| MenuItem {
            title: page.title.clone(),
            url: page.url_path.clone(),
            active: current.is_some_and(|current| current.url_path.starts_with(&page.url_path)),
        })
        .collect()
}
