//! Event Filter: decides which journal events the relay tracks
//!
//! Two overlapping category sets:
//! - **important**: gates whether an event enters the relay at all
//! - **fleet carrier**: routes an event to the fleet-carrier pipeline
//!
//! Both are plain data so tests and config can substitute their own sets.

use std::collections::HashSet;

/// Fleet-carrier operations and ship interactions that happen at a carrier.
pub const FLEET_CARRIER_EVENTS: &[&str] = &[
    // Core carrier events
    "CarrierJump",
    "CarrierBuy",
    "CarrierStats",
    "CarrierDockingPermission",
    "CarrierCrewServices",
    "CarrierFinance",
    "CarrierTradeOrder",
    "CarrierDepositFuel",
    // Ship interaction with carriers
    "Docked",
    "Undocked",
    "MarketBuy",
    "MarketSell",
    "StoredShips",
    "ShipyardBuy",
    "ModuleBuy",
    "ModuleSell",
];

/// Every event the relay forwards. Superset of [`FLEET_CARRIER_EVENTS`].
pub const IMPORTANT_EVENTS: &[&str] = &[
    "CarrierJump",
    "CarrierBuy",
    "CarrierStats",
    "CarrierDockingPermission",
    "CarrierCrewServices",
    "CarrierFinance",
    "CarrierTradeOrder",
    "CarrierDepositFuel",
    "CarrierJumpRequest",
    "CarrierJumpCancelled",
    "CarrierDecommission",
    "CarrierCancelDecommission",
    "CarrierBankTransfer",
    "CarrierModulePack",
    "CarrierShipPack",
    "CarrierNameChanged",
    "Docked",
    "Undocked",
    "MarketBuy",
    "MarketSell",
    "Market",
    "StoredShips",
    "ShipyardBuy",
    "ModuleBuy",
    "ModuleSell",
    "FSDJump",
    "Location",
    "SupercruiseExit",
    "ApproachSettlement",
    "Loadout",
    "LoadGame",
    "MissionAccepted",
    "MissionCompleted",
    "CommunityGoal",
];

/// Closed membership set of event type names.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    names: HashSet<String>,
}

impl EventFilter {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn important() -> Self {
        Self::new(IMPORTANT_EVENTS.iter().copied())
    }

    pub fn fleet_carrier() -> Self {
        Self::new(FLEET_CARRIER_EVENTS.iter().copied())
    }

    pub fn accepts(&self, event_name: &str) -> bool {
        self.names.contains(event_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Where an incoming event goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not tracked; dropped without enqueueing
    Ignored,
    /// General pipeline (live permission header, no enrichment)
    General,
    /// Fleet-carrier pipeline (fixed header, ship/system enrichment)
    FleetCarrier,
}

/// Routes events using the important set as the entry gate.
#[derive(Debug, Clone)]
pub struct EventRouter {
    important: EventFilter,
    fleet_carrier: EventFilter,
}

impl EventRouter {
    pub fn new(important: EventFilter, fleet_carrier: EventFilter) -> Self {
        Self {
            important,
            fleet_carrier,
        }
    }

    pub fn route(&self, event_name: &str) -> Route {
        if !self.important.accepts(event_name) {
            Route::Ignored
        } else if self.fleet_carrier.accepts(event_name) {
            Route::FleetCarrier
        } else {
            Route::General
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(EventFilter::important(), EventFilter::fleet_carrier())
    }
}
