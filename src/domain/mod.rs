//! Core business types: shipments, status vocabulary, task values

pub mod status;
pub mod task_value;
pub mod types;

pub use status::{normalize_status, normalize_substatus, Status, Substatus};
pub use task_value::{TaskValue, TaskValueError};
pub use types::{
    Carrier, PushEnvironment, ReceivedShipment, Shipment, ShipmentUpdate, TrackingInfo,
    TrackingRequest, User, UserDevice,
};
