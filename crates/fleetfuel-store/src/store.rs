//! Document collections over sled trees.

use std::path::Path;

use chrono::Utc;
use fleetfuel_core::types::{
    ManifestStatus, ModelManifest, PredictionSummary, SampleDoc, TripDoc,
};

use crate::error::StoreError;
use crate::queue::JobQueue;

const SAMPLES_TREE: &str = "samples";
const TRIPS_TREE: &str = "trips";
const MODELS_TREE: &str = "models";
const MODELS_INDEX_TREE: &str = "models.by-vehicle-version";

/// Handle on the embedded database. Cheap to clone; all clones share the
/// same underlying sled instance.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    samples: sled::Tree,
    trips: sled::Tree,
    models: sled::Tree,
    models_index: sled::Tree,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Store {
            samples: db.open_tree(SAMPLES_TREE)?,
            trips: db.open_tree(TRIPS_TREE)?,
            models: db.open_tree(MODELS_TREE)?,
            models_index: db.open_tree(MODELS_INDEX_TREE)?,
            db,
        })
    }

    /// Open (creating if needed) a durable queue in this database.
    pub fn queue(&self, name: &str) -> Result<JobQueue, StoreError> {
        JobQueue::open(&self.db, name)
    }

    // ----- samples -------------------------------------------------------

    /// Append one sample. Keys are `tripId \0 timestamp seq`, so a prefix
    /// scan yields a trip's samples roughly in time order; readers re-sort
    /// regardless.
    pub fn insert_sample(&self, doc: &SampleDoc) -> Result<(), StoreError> {
        let seq = self.db.generate_id()?;
        let mut key = Vec::with_capacity(doc.trip_id.len() + 17);
        key.extend_from_slice(doc.trip_id.as_bytes());
        key.push(0);
        key.extend_from_slice(&(doc.timestamp.timestamp_millis() as u64).to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        self.samples.insert(key, serde_json::to_vec(doc)?)?;
        Ok(())
    }

    /// All samples of one trip, sorted by timestamp. Ties keep store order.
    pub fn samples_for_trip(&self, trip_id: &str) -> Result<Vec<SampleDoc>, StoreError> {
        let mut prefix = Vec::with_capacity(trip_id.len() + 1);
        prefix.extend_from_slice(trip_id.as_bytes());
        prefix.push(0);
        let mut docs = Vec::new();
        for entry in self.samples.scan_prefix(prefix) {
            let (_, value) = entry?;
            docs.push(serde_json::from_slice::<SampleDoc>(&value)?);
        }
        docs.sort_by_key(|doc| doc.timestamp);
        Ok(docs)
    }

    // ----- trips ---------------------------------------------------------

    pub fn put_trip(&self, doc: &TripDoc) -> Result<(), StoreError> {
        self.trips
            .insert(doc.id.as_bytes(), serde_json::to_vec(doc)?)?;
        Ok(())
    }

    pub fn get_trip(&self, trip_id: &str) -> Result<Option<TripDoc>, StoreError> {
        match self.trips.get(trip_id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Upsert the prediction summary onto an existing trip document.
    /// Samples are never touched.
    pub fn set_prediction_summary(
        &self,
        trip_id: &str,
        summary: &PredictionSummary,
    ) -> Result<(), StoreError> {
        let mut doc = self
            .get_trip(trip_id)?
            .ok_or_else(|| StoreError::not_found(TRIPS_TREE, trip_id))?;
        doc.prediction_summary = Some(summary.clone());
        self.put_trip(&doc)
    }

    // ----- model manifests ----------------------------------------------

    pub fn insert_manifest(&self, manifest: &ModelManifest) -> Result<(), StoreError> {
        self.models
            .insert(manifest.id.as_bytes(), serde_json::to_vec(manifest)?)?;
        self.models_index.insert(
            vehicle_version_key(&manifest.vehicle_id, &manifest.version),
            manifest.id.as_bytes(),
        )?;
        Ok(())
    }

    pub fn get_manifest(&self, id: &str) -> Result<Option<ModelManifest>, StoreError> {
        match self.models.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn find_manifest(
        &self,
        vehicle_id: &str,
        version: &str,
    ) -> Result<Option<ModelManifest>, StoreError> {
        match self
            .models_index
            .get(vehicle_version_key(vehicle_id, version))?
        {
            Some(id) => self.get_manifest(&String::from_utf8_lossy(&id)),
            None => Ok(None),
        }
    }

    /// Compare-and-swap status transition.
    ///
    /// Re-reads the manifest, verifies it is still in `from`, applies
    /// `mutate`, and writes back only if nobody raced us; otherwise
    /// retries, and reports [`StoreError::Conflict`] once the precondition
    /// is gone for good. This is what makes training at-most-once per
    /// manifest under message redelivery.
    pub fn transition_manifest<F>(
        &self,
        id: &str,
        from: ManifestStatus,
        mutate: F,
    ) -> Result<ModelManifest, StoreError>
    where
        F: Fn(&mut ModelManifest),
    {
        loop {
            let old = self
                .models
                .get(id.as_bytes())?
                .ok_or_else(|| StoreError::not_found(MODELS_TREE, id))?;
            let mut manifest: ModelManifest = serde_json::from_slice(&old)?;
            if manifest.status != from {
                return Err(StoreError::Conflict(format!(
                    "manifest {id} is '{}', expected '{}'",
                    manifest.status.as_str(),
                    from.as_str()
                )));
            }
            mutate(&mut manifest);
            manifest.updated_at = Utc::now();
            let new = serde_json::to_vec(&manifest)?;
            match self.models.compare_and_swap(
                id.as_bytes(),
                Some(old),
                Some(new),
            )? {
                Ok(()) => return Ok(manifest),
                Err(_) => continue, // lost the race, re-read and re-check
            }
        }
    }

    /// Flush everything to disk. Tests and clean shutdown call this.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

fn vehicle_version_key(vehicle_id: &str, version: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(vehicle_id.len() + version.len() + 1);
    key.extend_from_slice(vehicle_id.as_bytes());
    key.push(0);
    key.extend_from_slice(version.as_bytes());
    key
}
