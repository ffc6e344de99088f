use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub contact_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
    /// Stored reference, e.g. `/uploads/tiles/1700000000000_oak.jpg`.
    pub image_path: Option<String>,
    /// Free text such as "600x600 mm".
    pub size: Option<String>,
    pub stock: Option<i64>,
    pub category: Option<Category>,
    pub shop: Option<Shop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Tile {
    /// A tile without a shop belongs to nobody.
    pub fn is_owned_by(&self, shop_id: i64) -> bool {
        self.shop.as_ref().is_some_and(|shop| shop.id == shop_id)
    }
}

/// Fields written when a tile is listed.
#[derive(Debug, Clone, Default)]
pub struct NewTile {
    pub name: String,
    pub price: f64,
    pub description: Option<String>,
    pub image_path: Option<String>,
    pub size: Option<String>,
    pub stock: Option<i64>,
    pub category_id: Option<i64>,
    pub shop_id: Option<i64>,
}

/// Fields a seller may change on an existing tile.
#[derive(Debug, Clone)]
pub struct TileUpdate {
    pub name: String,
    pub price: f64,
    pub description: String,
    pub size: String,
    pub stock: i64,
    pub category_id: i64,
}

/// Case-insensitive substring filters for the tile listing. Empty values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TileFilter {
    pub name: Option<String>,
    pub shop: Option<String>,
    pub category: Option<String>,
}

impl TileFilter {
    pub fn matches(&self, tile: &Tile) -> bool {
        contains(Some(&tile.name), self.name.as_deref())
            && contains(
                tile.shop.as_ref().map(|s| &s.name),
                self.shop.as_deref(),
            )
            && contains(
                tile.category.as_ref().map(|c| &c.name),
                self.category.as_deref(),
            )
    }
}

fn contains(field: Option<&String>, needle: Option<&str>) -> bool {
    match needle.filter(|n| !n.is_empty()) {
        None => true,
        Some(needle) => field.is_some_and(|f| f.to_lowercase().contains(&needle.to_lowercase())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Customer,
    Seller,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Seller => "SELLER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CUSTOMER" => Ok(Role::Customer),
            "SELLER" => Ok(Role::Seller),
            other => Err(format!("unknown role {other}")),
        }
    }
}

/// Stored account. Deliberately not `Serialize`: it carries the password hash.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub shop_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(name: &str, shop: Option<&str>, category: Option<&str>) -> Tile {
        Tile {
            id: 1,
            name: name.to_string(),
            price: 10.0,
            description: None,
            image_path: None,
            size: None,
            stock: None,
            category: category.map(|name| Category {
                id: 1,
                name: name.to_string(),
            }),
            shop: shop.map(|name| Shop {
                id: 7,
                name: name.to_string(),
                location: String::new(),
                contact_number: String::new(),
            }),
            image_url: None,
        }
    }

    #[test]
    fn filter_is_case_insensitive_substring() {
        let glossy = tile("Glossy White Floor", Some("Sai Tiles Center"), Some("Floor Tiles"));
        let filter = TileFilter {
            name: Some("WHITE".into()),
            shop: Some("sai".into()),
            category: Some("floor".into()),
        };

        assert!(filter.matches(&glossy));
        assert!(!TileFilter {
            name: Some("black".into()),
            ..Default::default()
        }
        .matches(&glossy));
    }

    #[test]
    fn empty_filter_values_are_ignored() {
        let filter = TileFilter {
            name: Some(String::new()),
            shop: Some(String::new()),
            category: None,
        };

        assert!(filter.matches(&tile("Anything", None, None)));
    }

    #[test]
    fn missing_relation_fails_relation_filter() {
        let orphan = tile("Loose Tile", None, None);
        let by_shop = TileFilter {
            shop: Some("sai".into()),
            ..Default::default()
        };

        assert!(!by_shop.matches(&orphan));
    }

    #[test]
    fn ownership_is_shop_id_equality() {
        assert!(tile("a", Some("s"), None).is_owned_by(7));
        assert!(!tile("a", Some("s"), None).is_owned_by(8));
        assert!(!tile("a", None, None).is_owned_by(7));
    }

    #[test]
    fn tile_serializes_camel_case() {
        let mut t = tile("a", Some("s"), Some("c"));
        t.image_path = Some("/uploads/tiles/1_a.jpg".into());
        let json = serde_json::to_value(&t).expect("json");

        assert_eq!(json["imagePath"], "/uploads/tiles/1_a.jpg");
        assert_eq!(json["shop"]["contactNumber"], "");
        assert!(json.get("imageUrl").is_none());
    }

    #[test]
    fn role_parsing_ignores_case_and_whitespace() {
        assert_eq!(" seller ".parse::<Role>(), Ok(Role::Seller));
        assert_eq!("Customer".parse::<Role>(), Ok(Role::Customer));
        assert!("admin".parse::<Role>().is_err());
    }
}
