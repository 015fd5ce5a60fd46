use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use tracing::{debug, info};

use crate::{
    client::SourceClient,
    error::SourceError,
    model::Coordinate,
    sources::GridPoint,
};

/// Coordinate to grid-address mapping, cached for the life of the resolver.
///
/// Entries never expire: a grid address for a fixed coordinate is permanent.
#[derive(Debug, Default)]
pub struct GridResolver {
    cache: Mutex<HashMap<String, GridPoint>>,
}

impl GridResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self, coordinate: Coordinate) -> Option<GridPoint> {
        self.entries().get(&coordinate.cache_key()).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached grid point, or resolves it with one network call.
    pub async fn resolve(
        &self,
        client: &SourceClient,
        coordinate: Coordinate,
    ) -> Result<GridPoint, SourceError> {
        if let Some(hit) = self.cached(coordinate) {
            debug!(%coordinate, office = %hit.address.office_id, "Grid address cache hit");
            return Ok(hit);
        }

        let point = client.fetch_point(coordinate).await?;

        info!(
            %coordinate,
            office = %point.address.office_id,
            grid_x = point.address.grid_x,
            grid_y = point.address.grid_y,
            "Cached grid address"
        );
        self.entries().insert(coordinate.cache_key(), point.clone());

        Ok(point)
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, GridPoint>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
