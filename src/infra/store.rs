//! Record store boundary
//!
//! Persistence proper (users, devices, received-shipment rows) belongs to an
//! external collaborator; the core only needs the lookups below. The
//! in-memory implementation backs tests and single-process deployments.

use crate::domain::{ReceivedShipment, User, UserDevice};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Read-mostly access to user, device, and shipment ownership records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Option<User>;
    async fn find_user_by_mailbox(&self, mailbox: &str) -> Option<User>;
    /// Resolve the owner of a shipment previously registered here.
    /// Providers that embed no owner id in their webhooks rely on this.
    async fn find_user_by_shipment(&self, shipment_id: &str) -> Option<User>;
    async fn devices_for(&self, user_id: Uuid) -> Vec<UserDevice>;
    async fn record_shipment(&self, user_id: Uuid, shipment: ReceivedShipment);
}

#[derive(Default)]
struct MemoryStoreInner {
    users: HashMap<Uuid, User>,
    devices: HashMap<Uuid, Vec<UserDevice>>,
    /// shipment id -> owning user id
    shipment_owners: HashMap<String, Uuid>,
    received: HashMap<Uuid, Vec<ReceivedShipment>>,
}

/// In-memory record store
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(MemoryStoreInner::default()) }
    }

    pub fn insert_user(&self, user: User, devices: Vec<UserDevice>) {
        let mut inner = self.inner.write();
        inner.devices.insert(user.id, devices);
        inner.users.insert(user.id, user);
    }

    /// Register shipment ownership directly (normally done through
    /// `record_shipment`).
    pub fn insert_shipment_owner(&self, shipment_id: &str, user_id: Uuid) {
        self.inner.write().shipment_owners.insert(shipment_id.to_string(), user_id);
    }

    pub fn received_shipments(&self, user_id: Uuid) -> Vec<ReceivedShipment> {
        self.inner.read().received.get(&user_id).cloned().unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> Option<User> {
        self.inner.read().users.get(&id).cloned()
    }

    async fn find_user_by_mailbox(&self, mailbox: &str) -> Option<User> {
        self.inner.read().users.values().find(|u| u.mailbox == mailbox).cloned()
    }

    async fn find_user_by_shipment(&self, shipment_id: &str) -> Option<User> {
        let inner = self.inner.read();
        let owner = inner.shipment_owners.get(shipment_id)?;
        inner.users.get(owner).cloned()
    }

    async fn devices_for(&self, user_id: Uuid) -> Vec<UserDevice> {
        self.inner.read().devices.get(&user_id).cloned().unwrap_or_default()
    }

    async fn record_shipment(&self, user_id: Uuid, shipment: ReceivedShipment) {
        let mut inner = self.inner.write();
        inner.shipment_owners.insert(shipment.shipment_id.clone(), user_id);
        inner.received.entry(user_id).or_default().push(shipment);
    }
}
