//! Connection liveness and time-based policy observers for the VPN control
//! plane: a periodic prober that emits connect/disconnect/timeout events per
//! peer, and a daily sweep that warns and blocks users past their account
//! expiry.

#![forbid(unsafe_code)]

pub mod bus;
pub mod connection;
pub mod error;
pub mod events;
pub mod interval;
pub mod liveness;

pub use bus::EventBus;
pub use connection::{ConnectionObserver, ConnectionObserverConfig};
pub use error::{ObserveError, Result};
pub use events::{
    ConnectEvent, DisconnectEvent, ExpireBlockEvent, ExpireWarnEvent, ObserverStartupEvent, TimerEvent,
};
pub use interval::{IntervalObserver, IntervalObserverConfig};
pub use liveness::{FakeProbe, IcmpProbe, LivenessProbe};
