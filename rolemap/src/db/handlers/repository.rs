//! Base repository trait for database operations.

use std::collections::HashMap;
use std::hash::Hash;

/// Contains the Repository trait.
///
/// A repository is a data access layer for one sqlite table. It provides methods for
/// creating, reading, updating and deleting entities, as well as listing them with a
/// simple window filter.
///
/// Each repository is tied to one domain model through the `Entity` associated type, so
/// handing a role to the permission repository does not compile.
use crate::db::{errors::Result, models::Entity};

/// Offset/limit window used by every `list` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub skip: i64,
    /// Maximum number of rows, negative means unbounded
    pub limit: i64,
}

impl Filter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit }
    }

    /// Every row, in order
    pub fn all() -> Self {
        // sqlite treats a negative LIMIT as "no limit"
        Self { skip: 0, limit: -1 }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

/// Base repository trait providing common database operations
#[async_trait::async_trait]
pub trait Repository: Send {
    /// The domain model stored by this repository
    type Entity: Entity + Send + Sync;

    /// The identifier type for lookups
    type Id: Copy + Eq + Hash + Send + Sync;

    /// A blank, unsaved entity (id = 0)
    fn create(&self) -> Self::Entity;

    /// Get an entity by ID
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Entity>>;

    /// Get an entity by its unique name
    async fn get_by_name(&mut self, name: &str) -> Result<Option<Self::Entity>>;

    /// Get lots of entities by their IDs, keyed by ID
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Entity>>;

    /// List entities in a window
    async fn list(&mut self, filter: &Filter) -> Result<Vec<Self::Entity>>;

    /// Insert an unsaved entity, returning it with its generated id
    async fn insert(&mut self, entity: &Self::Entity) -> Result<Self::Entity>;

    /// Update a saved entity by id
    async fn update(&mut self, entity: &Self::Entity) -> Result<Self::Entity>;

    /// Delete an entity, returning whether a row was removed
    async fn delete(&mut self, entity: Self::Entity) -> Result<bool>;

    /// Insert the entity if it was never saved, update it otherwise
    async fn save(&mut self, entity: &Self::Entity) -> Result<Self::Entity> {
        if entity.is_new() {
            self.insert(entity).await
        } else {
            self.update(entity).await
        }
    }

    async fn fetch_all(&mut self) -> Result<Vec<Self::Entity>> {
        self.list(&Filter::all()).await
    }

    async fn fetch_limit(&mut self, offset: i64, count: i64) -> Result<Vec<Self::Entity>> {
        self.list(&Filter::new(offset, count)).await
    }
}
