//! Item catalog
//!
//! The pool of items rounds are drawn from. A catalog source has one item
//! per line in the form `name|value|image_url`; blank lines and lines
//! starting with `#` are ignored. A catalog always holds at least two items:
//! sources yielding fewer fall back to the built-in list.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;

/// An item whose value players compare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Display label
    pub label: String,
    /// Value being compared
    pub value: i64,
    /// Optional picture
    pub image_url: Option<String>,
}

impl Item {
    fn new(label: &str, value: i64, image_url: &str) -> Self {
        Self {
            label: label.to_owned(),
            value,
            image_url: Some(image_url.to_owned()),
        }
    }

    /// Parses one `name|value|image_url` line
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.splitn(3, '|').map(str::trim);
        let label = fields.next().filter(|label| !label.is_empty())?;
        let value = fields.next()?.parse().ok()?;
        let image_url = fields
            .next()
            .filter(|url| !url.is_empty())
            .map(ToOwned::to_owned);
        Some(Self {
            label: label.to_owned(),
            value,
            image_url,
        })
    }
}

/// The item pool of a lobby
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            items: vec![
                Item::new(
                    "iPhone 15 Pro",
                    1199,
                    "https://images.unsplash.com/photo-1695048133142-1a20484d2569?w=400",
                ),
                Item::new(
                    "MacBook Pro",
                    2499,
                    "https://images.unsplash.com/photo-1517336714731-489689fd1ca8?w=400",
                ),
                Item::new(
                    "PlayStation 5",
                    499,
                    "https://images.unsplash.com/photo-1606813907291-d86efa9b94db?w=400",
                ),
                Item::new(
                    "Nike Air Jordan",
                    170,
                    "https://images.unsplash.com/photo-1556906781-9a412961c28c?w=400",
                ),
                Item::new(
                    "Tesla Model 3",
                    42990,
                    "https://images.unsplash.com/photo-1560958089-b8a1929cea89?w=400",
                ),
            ],
        }
    }
}

impl Catalog {
    /// Builds a catalog from a list of items
    ///
    /// # Returns
    ///
    /// `None` if fewer than two items are given
    pub fn new(items: Vec<Item>) -> Option<Self> {
        (items.len() >= 2).then_some(Self { items })
    }

    /// Parses a catalog source, falling back to the built-in items
    pub fn parse(text: &str) -> Self {
        let items: Vec<Item> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let item = Item::parse(line);
                if item.is_none() {
                    tracing::debug!(line, "skipping malformed catalog line");
                }
                item
            })
            .take(constants::catalog::MAX_ITEMS)
            .collect();

        let count = items.len();
        Self::new(items).unwrap_or_else(|| {
            tracing::warn!(count, "catalog has fewer than two items, using defaults");
            Self::default()
        })
    }

    /// Reads and parses a catalog file, falling back to the built-in items
    /// if it cannot be read
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let catalog = Self::parse(&text);
                tracing::info!(path = %path.display(), items = catalog.len(), "loaded catalog");
                catalog
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "cannot read catalog, using defaults");
                Self::default()
            }
        }
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always `false`; a catalog holds at least two items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in source order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Draws a random item, never the one at `except`
    ///
    /// # Returns
    ///
    /// The index of the drawn item and a copy of it
    pub fn draw(&self, except: Option<usize>, rng: &mut fastrand::Rng) -> (usize, Item) {
        let len = self.items.len();
        let index = match except {
            Some(except) if except < len => {
                let index = rng.usize(..len - 1);
                if index >= except { index + 1 } else { index }
            }
            _ => rng.usize(..len),
        };
        (index, self.items[index].clone())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let catalog = Catalog::parse(
            "# prices in USD\n\
             Coffee|4|https://example.com/coffee.png\n\
             \n\
             Bicycle | 350 |\n\
             Castle|100000000",
        );
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.items()[0].label, "Coffee");
        assert_eq!(
            catalog.items()[0].image_url.as_deref(),
            Some("https://example.com/coffee.png")
        );
        assert_eq!(catalog.items()[1].value, 350);
        assert_eq!(catalog.items()[1].image_url, None);
        assert_eq!(catalog.items()[2].value, 100_000_000);
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let catalog = Catalog::parse("A|1\nB|not a number\n|5\nC|3");
        assert_eq!(
            catalog.items().iter().map(|i| i.label.as_str()).collect::<Vec<_>>(),
            vec!["A", "C"]
        );
    }

    #[test]
    fn test_parse_falls_back_to_defaults() {
        assert_eq!(Catalog::parse("Only|1"), Catalog::default());
        assert_eq!(Catalog::parse(""), Catalog::default());
        assert_eq!(Catalog::default().len(), 5);
    }

    #[test]
    fn test_parse_caps_item_count() {
        let text = (0..constants::catalog::MAX_ITEMS + 10)
            .map(|i| format!("Item {i}|{i}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(Catalog::parse(&text).len(), constants::catalog::MAX_ITEMS);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        assert_eq!(
            Catalog::load("/definitely/not/here/items.txt"),
            Catalog::default()
        );
    }

    #[test]
    fn test_new_requires_two_items() {
        assert!(Catalog::new(vec![Item::new("a", 1, "")]).is_none());
        assert!(Catalog::new(vec![Item::new("a", 1, ""), Item::new("b", 2, "")]).is_some());
    }

    #[test]
    fn test_draw_never_repeats_excluded() {
        let catalog = Catalog::default();
        let mut rng = fastrand::Rng::with_seed(42);
        for except in 0..catalog.len() {
            for _ in 0..50 {
                let (index, item) = catalog.draw(Some(except), &mut rng);
                assert_ne!(index, except);
                assert_eq!(item, catalog.items()[index]);
            }
        }
    }

    #[test]
    fn test_draw_covers_catalog() {
        let catalog = Catalog::default();
        let mut rng = fastrand::Rng::with_seed(7);
        let mut seen = vec![false; catalog.len()];
        for _ in 0..500 {
            seen[catalog.draw(None, &mut rng).0] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }
}
