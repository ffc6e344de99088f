//! SQLite catalog of categories, shops, tiles and users.
//!
//! One connection guarded by a mutex. Every method takes the lock, runs its
//! statements, and releases it before returning, so callers never hold it
//! across an `.await`.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;
use tracing::info;

use crate::models::{Category, NewTile, NewUser, Role, Shop, Tile, TileFilter, TileUpdate, User};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS categories (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS shops (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL,
        location        TEXT NOT NULL DEFAULT '',
        contact_number  TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS tiles (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL,
        price           REAL NOT NULL,
        description     TEXT,
        image_path      TEXT,
        size            TEXT,
        stock           INTEGER,
        category_id     INTEGER REFERENCES categories(id),
        shop_id         INTEGER REFERENCES shops(id)
    );
    CREATE TABLE IF NOT EXISTS users (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL,
        email           TEXT NOT NULL UNIQUE,
        password_hash   TEXT NOT NULL,
        role            TEXT NOT NULL,
        shop_id         INTEGER REFERENCES shops(id)
    );
    CREATE INDEX IF NOT EXISTS idx_tiles_shop_id ON tiles(shop_id);
    CREATE INDEX IF NOT EXISTS idx_tiles_category_id ON tiles(category_id);
";

const TILE_SELECT: &str = "
    SELECT t.id, t.name, t.price, t.description, t.image_path, t.size, t.stock,
           c.id, c.name, s.id, s.name, s.location, s.contact_number
    FROM tiles t
    LEFT JOIN categories c ON c.id = t.category_id
    LEFT JOIN shops s ON s.id = t.shop_id";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the catalog. `:memory:` gives a private in-memory database.
    pub fn open(path: &str) -> StoreResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("Catalog database ready at {path}");

        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(":memory:")
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied in SQLite itself.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Categories

    pub fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY id")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(categories)
    }

    pub fn create_category(&self, name: &str) -> StoreResult<Category> {
        let conn = self.conn();
        if find_category(&conn, name)?.is_some() {
            return Err(StoreError::Conflict(format!("Category {name} already exists")));
        }
        insert_category(&conn, name)
    }

    /// Categories named on tile uploads and edits are created on first use.
    pub fn find_or_create_category(&self, name: &str) -> StoreResult<Category> {
        let conn = self.conn();
        match find_category(&conn, name)? {
            Some(category) => Ok(category),
            None => {
                let category = insert_category(&conn, name)?;
                info!("Created new category: {name}");
                Ok(category)
            }
        }
    }

    // Shops

    pub fn list_shops(&self) -> StoreResult<Vec<Shop>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, name, location, contact_number FROM shops ORDER BY id")?;
        let shops = stmt
            .query_map([], shop_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(shops)
    }

    pub fn get_shop(&self, id: i64) -> StoreResult<Shop> {
        self.conn()
            .query_row(
                "SELECT id, name, location, contact_number FROM shops WHERE id = ?1",
                [id],
                shop_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound("Shop"))
    }

    pub fn create_shop(&self, name: &str, location: &str, contact_number: &str) -> StoreResult<Shop> {
        insert_shop(&self.conn(), name, location, contact_number)
    }

    /// Existing shop with this exact name, or a new one.
    pub fn find_or_create_shop(
        &self,
        name: &str,
        location: &str,
        contact_number: &str,
    ) -> StoreResult<Shop> {
        let conn = self.conn();
        let existing = conn
            .query_row(
                "SELECT id, name, location, contact_number FROM shops WHERE name = ?1 ORDER BY id LIMIT 1",
                [name],
                shop_from_row,
            )
            .optional()?;

        match existing {
            Some(shop) => Ok(shop),
            None => insert_shop(&conn, name, location, contact_number),
        }
    }

    // Tiles

    pub fn count_tiles(&self) -> StoreResult<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn list_tiles(&self, filter: &TileFilter) -> StoreResult<Vec<Tile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{TILE_SELECT} ORDER BY t.id"))?;
        let tiles = stmt
            .query_map([], tile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        // SQLite's lower() only folds ASCII.
        Ok(tiles.into_iter().filter(|t| filter.matches(t)).collect())
    }

    pub fn get_tile(&self, id: i64) -> StoreResult<Tile> {
        load_tile(&self.conn(), id)
    }

    pub fn insert_tile(&self, tile: &NewTile) -> StoreResult<Tile> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tiles (name, price, description, image_path, size, stock, category_id, shop_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                tile.name,
                tile.price,
                tile.description,
                tile.image_path,
                tile.size,
                tile.stock,
                tile.category_id,
                tile.shop_id,
            ],
        )?;

        load_tile(&conn, conn.last_insert_rowid())
    }

    /// Rewrites the editable fields. The image and owning shop never change.
    pub fn update_tile(&self, id: i64, update: &TileUpdate) -> StoreResult<Tile> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE tiles
             SET name = ?1, price = ?2, description = ?3, size = ?4, stock = ?5, category_id = ?6
             WHERE id = ?7",
            params![
                update.name,
                update.price,
                update.description,
                update.size,
                update.stock,
                update.category_id,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound("Tile"));
        }

        load_tile(&conn, id)
    }

    pub fn delete_tile(&self, id: i64) -> StoreResult<()> {
        let changed = self.conn().execute("DELETE FROM tiles WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(StoreError::NotFound("Tile"));
        }
        Ok(())
    }

    // Users

    pub fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, name, email, password_hash, role, shop_id FROM users WHERE email = ?1",
                [email],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    /// Insert a user, creating their shop in the same transaction when one is given.
    pub fn register_user(
        &self,
        user: &NewUser,
        shop: Option<(&str, &str, &str)>,
    ) -> StoreResult<User> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            [&user.email],
            |row| row.get(0),
        )?;
        if taken {
            return Err(StoreError::Conflict("Email already exists".to_string()));
        }

        let shop_id = match shop {
            Some((name, location, contact_number)) => {
                Some(insert_shop(&tx, name, location, contact_number)?.id)
            }
            None => None,
        };

        tx.execute(
            "INSERT INTO users (name, email, password_hash, role, shop_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.name,
                user.email,
                user.password_hash,
                user.role.as_str(),
                shop_id
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(User {
            id,
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            shop_id,
        })
    }
}

fn find_category(conn: &Connection, name: &str) -> StoreResult<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name FROM categories WHERE name = ?1",
            [name],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(category)
}

fn insert_category(conn: &Connection, name: &str) -> StoreResult<Category> {
    conn.execute("INSERT INTO categories (name) VALUES (?1)", [name])?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
    })
}

fn insert_shop(
    conn: &Connection,
    name: &str,
    location: &str,
    contact_number: &str,
) -> StoreResult<Shop> {
    conn.execute(
        "INSERT INTO shops (name, location, contact_number) VALUES (?1, ?2, ?3)",
        [name, location, contact_number],
    )?;
    Ok(Shop {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        location: location.to_string(),
        contact_number: contact_number.to_string(),
    })
}

fn load_tile(conn: &Connection, id: i64) -> StoreResult<Tile> {
    conn.query_row(&format!("{TILE_SELECT} WHERE t.id = ?1"), [id], tile_from_row)
        .optional()?
        .ok_or(StoreError::NotFound("Tile"))
}

fn shop_from_row(row: &Row<'_>) -> rusqlite::Result<Shop> {
    Ok(Shop {
        id: row.get(0)?,
        name: row.get(1)?,
        location: row.get(2)?,
        contact_number: row.get(3)?,
    })
}

fn tile_from_row(row: &Row<'_>) -> rusqlite::Result<Tile> {
    let category = match row.get::<_, Option<i64>>(7)? {
        Some(id) => Some(Category {
            id,
            name: row.get(8)?,
        }),
        None => None,
    };
    let shop = match row.get::<_, Option<i64>>(9)? {
        Some(id) => Some(Shop {
            id,
            name: row.get(10)?,
            location: row.get(11)?,
            contact_number: row.get(12)?,
        }),
        None => None,
    };

    Ok(Tile {
        id: row.get(0)?,
        name: row.get(1)?,
        price: row.get(2)?,
        description: row.get(3)?,
        image_path: row.get(4)?,
        size: row.get(5)?,
        stock: row.get(6)?,
        category,
        shop,
        image_url: None,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(4)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role,
        shop_id: row.get(5)?,
    })
}
