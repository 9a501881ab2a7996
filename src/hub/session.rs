//! Driver connection state machine.
//!
//! Each connection is either `Disconnected` (not reporting a bus) or
//! `Active` for exactly one bus. [`transition`] is pure: it maps the current
//! state and a validated command to the next state and the effects the hub
//! must carry out.
//!
//! | state        | command          | next         | effects                                  |
//! |--------------|------------------|--------------|------------------------------------------|
//! | any          | `Start(b)`       | `Active(b)`  | register b, upsert active, `bus:online`  |
//! | any          | `UpdateLocation` | unchanged    | upsert location, `bus:locationUpdated`   |
//! | any          | `Stop(b)`        | Disconnected | deactivate b, `bus:offline`, unregister  |
//! | `Active(b)`  | `Disconnect`     | Disconnected | deactivate b, `bus:offline`, unregister  |
//! | Disconnected | `Disconnect`     | Disconnected | none                                     |

use chrono::{DateTime, Utc};

use crate::hub::persist::PersistOp;
use crate::hub::protocol::{BusOffline, BusOnline, DriverCommand, LocationUpdated, ServerEvent};
use crate::store::{BusLocation, BusUpdate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverState {
    Disconnected,
    Active { bus_number: String },
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Map this connection to the bus in the presence registry.
    Register(String),
    /// Drop this connection's presence entry.
    Unregister,
    Persist(PersistOp),
    Broadcast(ServerEvent),
}

/// Computes the next state and effects. `now` stamps location updates.
pub fn transition(
    state: &DriverState,
    command: DriverCommand,
    now: DateTime<Utc>,
) -> (DriverState, Vec<Effect>) {
    match command {
        DriverCommand::Start {
            bus_number,
            bus_name,
            driver_name,
            driver_id,
        } => {
            let effects = vec![
                Effect::Register(bus_number.clone()),
                Effect::Persist(PersistOp::Upsert {
                    bus_number: bus_number.clone(),
                    update: BusUpdate::started(
                        bus_name.clone(),
                        driver_name.clone(),
                        driver_id,
                    ),
                }),
                Effect::Broadcast(ServerEvent::BusOnline(BusOnline {
                    bus_number: bus_number.clone(),
                    bus_name,
                    driver_name,
                })),
            ];
            (DriverState::Active { bus_number }, effects)
        }

        // Location updates never touch presence: a driver may report without
        // having sent start, matching the permissive protocol.
        DriverCommand::UpdateLocation {
            bus_number,
            bus_name,
            driver_name,
            lat,
            lng,
        } => {
            let location = BusLocation {
                lat,
                lng,
                updated_at: now,
            };
            let effects = vec![
                Effect::Persist(PersistOp::Upsert {
                    bus_number: bus_number.clone(),
                    update: BusUpdate::located(bus_name.clone(), driver_name.clone(), location),
                }),
                Effect::Broadcast(ServerEvent::LocationUpdated(LocationUpdated {
                    bus_number,
                    bus_name,
                    lat,
                    lng,
                    driver_name,
                    updated_at: Some(now),
                })),
            ];
            (state.clone(), effects)
        }

        DriverCommand::Stop { bus_number } => {
            (DriverState::Disconnected, go_offline(bus_number))
        }

        DriverCommand::Disconnect => match state {
            DriverState::Active { bus_number } => {
                (DriverState::Disconnected, go_offline(bus_number.clone()))
            }
            DriverState::Disconnected => (DriverState::Disconnected, Vec::new()),
        },
    }
}

fn go_offline(bus_number: String) -> Vec<Effect> {
    vec![
        Effect::Persist(PersistOp::SetActive {
            bus_number: bus_number.clone(),
            active: false,
        }),
        Effect::Broadcast(ServerEvent::BusOffline(BusOffline { bus_number })),
        Effect::Unregister,
    ]
}
