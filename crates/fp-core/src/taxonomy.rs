//! Category/subcategory taxonomy parsed once from the home page.
//!
//! The index is immutable after construction and safe to share across
//! concurrent readers; rebuilding means re-running the home-page parse.

use std::collections::HashMap;

use tracing::warn;

use crate::markup;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubCategoryKind {
    Common,
    /// In-game currency sections trade through a separate path segment
    /// and carry their own id namespace.
    Currency,
}

/// A game section. Regional variants of one game are distinct
/// categories whose name carries the variant label.
#[derive(Clone, Debug, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Emission-order position across all categories of the page.
    pub position: u32,
    /// Owned subcategories in emission order, as `(kind, id)` keys.
    pub subcategories: Vec<(SubCategoryKind, i64)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubCategory {
    pub id: i64,
    pub name: String,
    pub kind: SubCategoryKind,
    pub category_id: i64,
    /// Emission-order position across all subcategories of the page.
    pub position: u32,
}

/// Immutable taxonomy of the whole marketplace.
#[derive(Clone, Debug, Default)]
pub struct TaxonomyIndex {
    categories: Vec<Category>,
    subcategories: Vec<SubCategory>,
    by_category: HashMap<i64, usize>,
    by_subcategory: HashMap<(SubCategoryKind, i64), usize>,
}

impl TaxonomyIndex {
    /// Builds the index from the home page markup.
    ///
    /// An absent or empty game-list container yields an empty index;
    /// the caller validates authentication separately.
    pub fn from_home_page(html: &str) -> TaxonomyIndex {
        let mut builder = Builder::default();

        let containers = markup::find_all_by_class(html, "div", "promo-game-list");
        // The page renders the list twice (desktop and mobile); the
        // second copy is the complete one when both are present.
        let Some(container) = containers.get(1).or_else(|| containers.first()) else {
            return builder.finish();
        };

        for item in markup::find_all_by_class(container.inner, "div", "promo-game-item") {
            builder.add_game(item.inner);
        }
        builder.finish()
    }

    pub fn category(&self, id: i64) -> Option<&Category> {
        self.by_category.get(&id).map(|&i| &self.categories[i])
    }

    pub fn subcategory(&self, kind: SubCategoryKind, id: i64) -> Option<&SubCategory> {
        self.by_subcategory
            .get(&(kind, id))
            .map(|&i| &self.subcategories[i])
    }

    /// All categories in emission order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// All subcategories in emission order.
    pub fn subcategories(&self) -> &[SubCategory] {
        &self.subcategories
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[derive(Default)]
struct Builder {
    index: TaxonomyIndex,
    category_position: u32,
    subcategory_position: u32,
}

impl Builder {
    /// One game block: a base category, optional regional variants, and
    /// per-category subcategory lists keyed back by `data-id`.
    fn add_game(&mut self, item: &str) {
        let Some(id) = markup::find_by_class(item, "div", "game-title")
            .and_then(|t| t.tag.attr("data-id")?.parse::<i64>().ok())
        else {
            warn!("game block without a numeric data-id, skipping");
            return;
        };
        let name = markup::find_block(item, "a", |_| true)
            .map(|a| markup::text(a.inner))
            .unwrap_or_default();

        let mut game_ids = vec![id];
        self.push_category(id, name.clone());

        if let Some(group) = markup::find_by_attr(item, "div", "role", "group") {
            let mut pos = 0usize;
            while pos < group.inner.len() {
                let Some(btn) = markup::find_block(&group.inner[pos..], "button", |_| true) else {
                    break;
                };
                if let Some(variant_id) = btn.tag.attr("data-id").and_then(|v| v.parse().ok()) {
                    let label = markup::text(btn.inner);
                    self.push_category(variant_id, format!("{name} ({label})"));
                    game_ids.push(variant_id);
                }
                pos += btn.end;
            }
        }

        for list in markup::find_all_by_class(item, "ul", "list-inline") {
            let Some(owner_id) = list.tag.attr("data-id").and_then(|v| v.parse::<i64>().ok())
            else {
                continue;
            };
            if !game_ids.contains(&owner_id) {
                warn!(owner_id, "subcategory list references an unknown game id");
                continue;
            }
            let mut pos = 0usize;
            while pos < list.inner.len() {
                let Some(li) = markup::find_block(&list.inner[pos..], "li", |_| true) else {
                    break;
                };
                self.add_subcategory(owner_id, li.inner);
                pos += li.end;
            }
        }
    }

    fn add_subcategory(&mut self, category_id: i64, li: &str) {
        let Some(a) = markup::find_block(li, "a", |_| true) else {
            return;
        };
        let Some(link) = a.tag.attr("href") else {
            return;
        };
        let Some(id) = markup::trailing_id(link) else {
            return;
        };
        let kind = if link.contains("chips") {
            SubCategoryKind::Currency
        } else {
            SubCategoryKind::Common
        };

        let slot = self.index.subcategories.len();
        self.index.subcategories.push(SubCategory {
            id,
            name: markup::text(a.inner),
            kind,
            category_id,
            position: self.subcategory_position,
        });
        self.subcategory_position += 1;
        self.index.by_subcategory.insert((kind, id), slot);

        if let Some(&cat) = self.index.by_category.get(&category_id) {
            self.index.categories[cat].subcategories.push((kind, id));
        }
    }

    fn push_category(&mut self, id: i64, name: String) {
        let slot = self.index.categories.len();
        self.index.categories.push(Category {
            id,
            name,
            position: self.category_position,
            subcategories: Vec::new(),
        });
        self.category_position += 1;
        self.index.by_category.insert(id, slot);
    }

    fn finish(self) -> TaxonomyIndex {
        self.index
    }
}
