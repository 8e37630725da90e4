//! Warwagon Encounter Engine
//!
//! Platform-agnostic core rules for tracking vehicle-vs-vehicle combat
//! encounters at the tabletop. This crate owns the encounter state machine
//! and its derived views; rendering, persistence backends, and the external
//! creature database are collaborators behind the traits below.

pub mod complication;
pub mod constants;
pub mod creature;
pub mod crew;
pub mod engine;
pub mod event;
pub mod geometry;
pub mod mishap;
pub mod projection;
pub mod scale;
pub mod snapshot;
pub mod template;
pub mod vehicle;

// Re-export commonly used types
pub use complication::{
    ActiveComplication, ComplicationCatalog, ComplicationEffect, ComplicationEntry,
    ComplicationResolution, ResolutionStatus, complication_catalog, roll_complication,
};
pub use creature::{Ability, AbilityScores, Creature, Faction, Statblock, ability_modifier};
pub use crew::{CrewAssignment, assignment_of, driver_of, station_occupancy};
pub use engine::apply;
pub use event::EncounterEvent;
pub use geometry::{
    ElevationZone, GeometryConfig, Position, Rect, SightLine, attack_arc, effective_cover,
    effective_weapon_range, elevation_at, elevation_attack_modifier, line_of_sight, sight_line,
};
pub use mishap::{
    ActiveMishap, MishapCatalog, MishapDuration, MishapEffect, MishapEntry, MishapRoll,
    RepairSpec, mishap_catalog, roll_mishap_for_vehicle,
};
pub use projection::{BroadcastView, broadcast_view};
pub use scale::Scale;
pub use snapshot::{
    CombatantRef, EncounterSnapshot, LogEntry, LogKind, Phase, TargetRef, TurnEntry,
};
pub use template::{
    Arc, CoverClass, Station, StationRole, TemplateCatalog, VehicleTemplate, Weapon, WeaponRange,
    classify_station_role, stock_templates,
};
pub use vehicle::{HullHit, ModifierScope, SpeedModifier, Vehicle};

/// Trait for abstracting snapshot persistence.
/// Platform-specific implementations should provide this.
pub trait SnapshotStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Save an encounter snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be saved.
    fn save_encounter(&self, slot: &str, snapshot: &EncounterSnapshot) -> Result<(), Self::Error>;

    /// Load an encounter snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded.
    fn load_encounter(&self, slot: &str) -> Result<Option<EncounterSnapshot>, Self::Error>;

    /// Delete a saved encounter.
    ///
    /// # Errors
    ///
    /// Returns an error if the save cannot be deleted.
    fn delete_encounter(&self, slot: &str) -> Result<(), Self::Error>;
}

/// Trait for the external creature-database client.
///
/// Lookup results are mapped into [`Statblock`] values and fed to the
/// engine through ordinary add-creature events; the core treats the
/// database as just another event source.
pub trait StatblockSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a statblock by creature name.
    ///
    /// # Errors
    ///
    /// Returns an error if the creature cannot be found or fetched.
    fn fetch_statblock(&self, name: &str) -> Result<Statblock, Self::Error>;
}

type ChangeListener = Box<dyn Fn(&EncounterSnapshot) + Send + Sync>;

/// Engine wrapper binding the pure transition function to a persistence
/// collaborator.
///
/// Persistence scheduling is explicit: every applied event notifies the
/// registered change listener with the fresh snapshot, and the listener
/// decides when to write. The core never runs timers of its own.
pub struct EncounterEngine<S>
where
    S: SnapshotStorage,
{
    storage: S,
    change_listener: Option<ChangeListener>,
}

impl<S> EncounterEngine<S>
where
    S: SnapshotStorage,
{
    /// Create a new engine with the provided storage collaborator.
    pub const fn new(storage: S) -> Self {
        Self {
            storage,
            change_listener: None,
        }
    }

    /// Register a callback invoked with every snapshot produced by
    /// [`Self::apply`].
    #[must_use]
    pub fn with_change_listener(
        mut self,
        listener: impl Fn(&EncounterSnapshot) + Send + Sync + 'static,
    ) -> Self {
        self.change_listener = Some(Box::new(listener));
        self
    }

    /// Start a fresh, empty encounter.
    #[must_use]
    pub fn new_encounter(&self, name: &str) -> EncounterSnapshot {
        EncounterSnapshot::new(name)
    }

    /// Fold one event into the snapshot and notify the change listener.
    #[must_use]
    pub fn apply<R: rand::Rng + ?Sized>(
        &self,
        snapshot: &EncounterSnapshot,
        event: &EncounterEvent,
        rng: &mut R,
    ) -> EncounterSnapshot {
        let next = engine::apply(snapshot, event, rng);
        if let Some(listener) = &self.change_listener {
            listener(&next);
        }
        next
    }

    /// Save a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be saved.
    pub fn save(&self, slot: &str, snapshot: &EncounterSnapshot) -> Result<(), S::Error> {
        self.storage.save_encounter(slot, snapshot)
    }

    /// Load a snapshot, running the defensive migration pass so older
    /// saves remain loadable.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be loaded.
    pub fn load(&self, slot: &str) -> Result<Option<EncounterSnapshot>, anyhow::Error>
    where
        S::Error: Into<anyhow::Error>,
    {
        let loaded = self.storage.load_encounter(slot).map_err(Into::into)?;
        Ok(loaded.map(EncounterSnapshot::migrate))
    }

    /// Delete a saved encounter.
    ///
    /// # Errors
    ///
    /// Returns an error if the save cannot be deleted.
    pub fn delete(&self, slot: &str) -> Result<(), S::Error> {
        self.storage.delete_encounter(slot)
    }
}
