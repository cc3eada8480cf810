//! The cleartext transaction-category list, stored in the sync repo at
//! `<account>/sync/Categories.json` so category names follow the user
//! across devices.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{files, AccountDir};

#[derive(Default, Serialize, Deserialize)]
struct CategoriesFile {
    categories: Vec<String>,
}

/// Load the category list; empty if none was saved.
pub fn load_categories(account: &AccountDir) -> Result<Vec<String>> {
    let file: Option<CategoriesFile> = files::read_json_opt(&account.categories_path())?;
    Ok(file.map(|f| f.categories).unwrap_or_default())
}

/// Replace the category list.
pub fn save_categories(account: &AccountDir, categories: &[String]) -> Result<()> {
    account.sync_dir()?;
    files::write_json(
        &account.categories_path(),
        &CategoriesFile {
            categories: categories.to_vec(),
        },
    )
}

/// Add a category if not already present.
pub fn add_category(account: &AccountDir, category: &str) -> Result<()> {
    let mut categories = load_categories(account)?;
    if !categories.iter().any(|c| c == category) {
        categories.push(category.to_string());
        save_categories(account, &categories)?;
    }
    Ok(())
}

/// Remove a category; no-op if absent.
pub fn remove_category(account: &AccountDir, category: &str) -> Result<()> {
    let mut categories = load_categories(account)?;
    let before = categories.len();
    categories.retain(|c| c != category);
    if categories.len() != before {
        save_categories(account, &categories)?;
    }
    Ok(())
}
