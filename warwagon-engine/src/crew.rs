//! Crew assignments and driver resolution.
//!
//! An assignment binds one creature to one station on one vehicle. The
//! driver is the first crew member in a driver-role station, or failing
//! that the earliest assignment to the lowest-indexed station.

use crate::template::StationRole;
use crate::vehicle::Vehicle;
use serde::{Deserialize, Serialize};

/// A (creature, vehicle, station) binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewAssignment {
    pub creature_id: String,
    pub vehicle_id: String,
    pub station_index: usize,
    /// Snapshot-global monotonic counter; backs the earliest-assigned
    /// driver fallback.
    #[serde(default)]
    pub assigned_order: u64,
}

/// All assignments aboard the given vehicle.
pub fn assignments_for<'a>(
    crew: &'a [CrewAssignment],
    vehicle_id: &'a str,
) -> impl Iterator<Item = &'a CrewAssignment> {
    crew.iter()
        .filter(move |assignment| assignment.vehicle_id == vehicle_id)
}

/// The creature's current assignment, if any.
#[must_use]
pub fn assignment_of<'a>(
    crew: &'a [CrewAssignment],
    creature_id: &str,
) -> Option<&'a CrewAssignment> {
    crew.iter()
        .find(|assignment| assignment.creature_id == creature_id)
}

/// Number of creatures currently at the given station.
#[must_use]
pub fn station_occupancy(crew: &[CrewAssignment], vehicle_id: &str, station_index: usize) -> usize {
    crew.iter()
        .filter(|assignment| {
            assignment.vehicle_id == vehicle_id && assignment.station_index == station_index
        })
        .count()
}

/// Resolve the vehicle's driver assignment.
///
/// Driver-role stations win, ordered by assignment age; otherwise the
/// assignment at the lowest-indexed station, ties broken by age.
#[must_use]
pub fn driver_of<'a>(crew: &'a [CrewAssignment], vehicle: &'a Vehicle) -> Option<&'a CrewAssignment> {
    let aboard: Vec<&CrewAssignment> = assignments_for(crew, &vehicle.id).collect();
    aboard
        .iter()
        .filter(|assignment| {
            vehicle
                .template
                .stations
                .get(assignment.station_index)
                .is_some_and(|station| station.role == StationRole::Driver)
        })
        .min_by_key(|assignment| assignment.assigned_order)
        .or_else(|| {
            aboard
                .iter()
                .min_by_key(|assignment| (assignment.station_index, assignment.assigned_order))
        })
        .copied()
}
