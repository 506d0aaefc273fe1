use crate::error::EngineError;
use crate::geo::haversine_km;
use crate::types::{Candidate, GeoPoint, ServiceId, WorkerSnapshot};
use crate::workers::AvailabilityRepository;
use std::cmp::Ordering;

pub struct CandidateFinder<'a, R: AvailabilityRepository> {
    workers: &'a R,
}

impl<'a, R: AvailabilityRepository> CandidateFinder<'a, R> {
    pub fn new(workers: &'a R) -> Self {
        Self { workers }
    }

    /// An empty result is not an error. Store failures are surfaced so the
    /// caller can escalate instead of retrying.
    pub fn find(
        &self,
        location: &GeoPoint,
        service: Option<&ServiceId>,
        radius_km: f64,
        max_candidates: usize,
    ) -> Result<Vec<Candidate>, EngineError> {
        let snapshots = self.workers.available(service)?;
        let scanned = snapshots.len();
        let ranked = rank_candidates(location, snapshots, service, radius_km, max_candidates);
        tracing::debug!(scanned, ranked = ranked.len(), radius_km, "ranked candidates");
        Ok(ranked)
    }
}

/// Nearest first, then higher rating, then worker id, so the order never
/// depends on how the store iterates.
pub fn rank_candidates<I>(
    location: &GeoPoint,
    snapshots: I,
    service: Option<&ServiceId>,
    radius_km: f64,
    max_candidates: usize,
) -> Vec<Candidate>
where
    I: IntoIterator<Item = WorkerSnapshot>,
{
    let mut candidates: Vec<Candidate> = snapshots
        .into_iter()
        .filter(|worker| worker.is_available)
        .filter(|worker| service.is_none_or(|service| worker.offers(service)))
        .filter_map(|worker| {
            let point = worker.location?;
            let distance_km = haversine_km(location, &point);
            (distance_km <= radius_km).then(|| Candidate {
                worker_id: worker.worker_id,
                distance_km,
                rating: if worker.rating.is_finite() {
                    worker.rating
                } else {
                    0.0
                },
            })
        })
        .collect();

    candidates.sort_by(compare_candidates);
    candidates.truncate(max_candidates);
    candidates
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| b.rating.total_cmp(&a.rating))
        .then_with(|| a.worker_id.cmp(&b.worker_id))
}
