// Post-processing workers that run on their own cadence against the
// persisted event set.

pub mod details;
pub mod geocode;

pub use details::DetailEnrichmentWorker;
pub use geocode::{EnrichmentTrigger, GeocodeWorker, TriggerKind};
