//! Processing order for a batch of suggestions.
//!
//! Core attractions are validated first so that a batch cut short by an
//! upstream failure has already handled the most valuable items.
use crate::suggestion::{Category, ContentType, Suggestion};

pub fn content_type_rank(content_type: ContentType) -> u32 {
    match content_type {
        ContentType::Place => 0,
        ContentType::Restaurant => 1,
        ContentType::Artisan | ContentType::Guide | ContentType::Business => 2,
        ContentType::Accommodation => 3,
    }
}

pub fn category_rank(category: Category) -> u32 {
    match category {
        Category::Historical | Category::Cultural | Category::Religious => 0,
        Category::Natural | Category::Adventure => 1,
        Category::Culinary => 2,
        Category::Accommodation => 3,
        Category::Other => 4,
    }
}

/// Lower scores are processed first.
pub fn priority_score(suggestion: &Suggestion) -> u32 {
    content_type_rank(suggestion.content_type) * 10 + category_rank(suggestion.category)
}

/// Stable sort: equal scores keep their model-given order.
pub fn sort_by_priority(suggestions: &mut [Suggestion]) {
    suggestions.sort_by_key(priority_score);
}
