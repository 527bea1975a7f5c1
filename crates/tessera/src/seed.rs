//! # World Seed
//!
//! Initial entities for an empty store, one JSON [`Entity`] per line:
//!
//! ```text
//! # terrain shard at the origin
//! {"id":5,"components":{"terrain":{...},"bounds":{...}}}
//! {"id":1,"components":{"position":{"x":0.0,"y":0.0,"z":0.0},"health":{"current":20,"maximum":20}}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. The whole seed is
//! created in one store commit, so it lands completely or not at all.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tessera_core::{BackingStore, Change, ChangeOutcome, Entity, EntityId, StoreError};
use thiserror::Error;
use tracing::{debug, info};

/// Seed loading failures.
#[derive(Error, Debug)]
pub enum SeedError {
    /// The file could not be read.
    #[error("failed to read seed file {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A line is not a valid entity.
    #[error("seed line {line}: {source}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Two lines describe the same entity.
    #[error("seed line {line}: {id} appears more than once")]
    DuplicateId {
        /// 1-based line number of the repeat.
        line: usize,
        /// The repeated id.
        id: EntityId,
    },

    /// The store already holds a seeded id.
    #[error("seeded {0} already exists in the store")]
    AlreadyExists(EntityId),

    /// The store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for seeding.
pub type SeedResult<T> = Result<T, SeedError>;

/// Parses seed text.
pub fn parse_seed(text: &str) -> SeedResult<Vec<Entity>> {
    let mut entities = Vec::new();
    let mut seen = HashSet::new();
    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let entity: Entity =
            serde_json::from_str(trimmed).map_err(|source| SeedError::Parse { line, source })?;
        if !seen.insert(entity.id) {
            return Err(SeedError::DuplicateId {
                line,
                id: entity.id,
            });
        }
        entities.push(entity);
    }
    Ok(entities)
}

/// Reads and parses a seed file.
pub fn load_seed(path: &Path) -> SeedResult<Vec<Entity>> {
    let text = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entities = parse_seed(&text)?;
    debug!(path = %path.display(), entities = entities.len(), "seed file parsed");
    Ok(entities)
}

/// Creates every seeded entity in one commit. Returns how many were created.
pub async fn apply_seed(store: &dyn BackingStore, entities: Vec<Entity>) -> SeedResult<usize> {
    if entities.is_empty() {
        return Ok(0);
    }
    let ids: Vec<EntityId> = entities.iter().map(|e| e.id).collect();
    let changes = entities
        .into_iter()
        .map(|entity| Change::Create { entity })
        .collect();
    let outcomes = store.apply(changes).await?;

    if !outcomes.iter().all(ChangeOutcome::is_applied) {
        let conflicting = ids
            .iter()
            .zip(&outcomes)
            .find(|(_, outcome)| matches!(outcome, ChangeOutcome::Conflict { .. }))
            .map_or(ids[0], |(id, _)| *id);
        return Err(SeedError::AlreadyExists(conflicting));
    }
    info!(entities = ids.len(), "world seeded");
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{Components, Health, MemoryStore, Position};

    fn line(entity: &Entity) -> String {
        serde_json::to_string(entity).unwrap()
    }

    fn walker(raw: u64) -> Entity {
        Entity::new(
            EntityId::new(raw),
            Components::default()
                .with(Position::new(1.0, 0.0, 2.0))
                .with(Health::full(20)),
        )
    }

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let text = format!("# walkers\n\n{}\n   \n{}\n", line(&walker(1)), line(&walker(2)));
        let entities = parse_seed(&text).unwrap();
        assert_eq!(entities, vec![walker(1), walker(2)]);
    }

    #[test]
    fn test_parse_reports_bad_line_number() {
        let text = format!("{}\n{{\"id\": \"nope\"}}\n", line(&walker(1)));
        assert!(matches!(parse_seed(&text), Err(SeedError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_parse_rejects_repeated_id() {
        let text = format!("{}\n{}\n", line(&walker(3)), line(&walker(3)));
        assert!(matches!(
            parse_seed(&text),
            Err(SeedError::DuplicateId { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_components_default_to_empty() {
        let entities = parse_seed(r#"{"id":9,"components":{}}"#).unwrap();
        assert_eq!(entities, vec![Entity::new(EntityId::new(9), Components::default())]);
    }

    #[tokio::test]
    async fn test_apply_creates_all_or_nothing() {
        let store = MemoryStore::new();
        assert_eq!(apply_seed(&store, vec![walker(1), walker(2)]).await.unwrap(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(EntityId::new(2)).await.unwrap().unwrap().version, 1);

        let again = apply_seed(&store, vec![walker(3), walker(1)]).await;
        assert!(matches!(again, Err(SeedError::AlreadyExists(id)) if id == EntityId::new(1)));
        assert!(store.get(EntityId::new(3)).await.unwrap().is_none());
        assert_eq!(apply_seed(&store, Vec::new()).await.unwrap(), 0);
    }
}
