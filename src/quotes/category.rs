use indexmap::IndexSet;

use super::{Quote, ALL_CATEGORIES};

/// Distinct categories of the store in first-seen order, led by `All`.
///
/// Rebuilt from scratch on every store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryIndex {
    categories: IndexSet<String>,
}

impl Default for CategoryIndex {
    fn default() -> Self {
        Self::rebuild(&[])
    }
}

impl CategoryIndex {
    pub fn rebuild(quotes: &[Quote]) -> Self {
        let mut categories = IndexSet::with_capacity(quotes.len() + 1);
        categories.insert(ALL_CATEGORIES.to_string());
        for quote in quotes {
            if !categories.contains(quote.category.as_str()) {
                categories.insert(quote.category.clone());
            }
        }
        Self { categories }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains(category)
    }
}

/// Quotes visible under `selected`; a category absent from the store yields nothing.
pub fn filter<'a>(quotes: &'a [Quote], selected: &str) -> Vec<&'a Quote> {
    if selected == ALL_CATEGORIES {
        return quotes.iter().collect();
    }
    quotes
        .iter()
        .filter(|quote| quote.category == selected)
        .collect()
}
