pub mod background;
pub mod bus;
pub mod inbound;

pub use background::{register_periodic, PeriodicHandle};
pub use bus::{BusEvent, EventBus, Subscription, STATE_CHANGED_TOPIC};
