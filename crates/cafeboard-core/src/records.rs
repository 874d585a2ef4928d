//! Planning records kept alongside the whiteboard.
//!
//! Each domain (cost estimates, suppliers, equipment, tasks, financing,
//! calendar events, locations, menu items) is a flat collection of records.
//! Stores push the full record set to subscribers on every change; updates
//! carry a patch in which only the present fields are applied.

use crate::storage::BoxFuture;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

/// Record store errors.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Record not found: {collection}/{id}")]
    NotFound { collection: &'static str, id: String },
    #[error("Record store error: {0}")]
    Other(String),
}

pub type RecordResult<T> = Result<T, RecordError>;

/// A record type stored in its own collection.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection name in the document store.
    const COLLECTION: &'static str;

    /// Partial update: every field optional.
    type Patch: Clone + Default + Serialize + DeserializeOwned + Send + Sync;

    fn id(&self) -> &str;

    /// Assign the store-generated id and creation time.
    fn created(&mut self, id: String, at: DateTime<Utc>);

    /// Apply the fields present in `patch` and bump the update time.
    fn apply(&mut self, patch: Self::Patch, at: DateTime<Utc>);
}

/// A patch field that is present in the input, `null` included, is `Some`.
///
/// For optional record fields this makes `null` clear the value while an
/// absent key leaves it alone.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

macro_rules! record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident / $patch:ident in $collection:literal {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            #[serde(default)]
            pub id: String,
            $( $(#[$fmeta])* pub $field: $ty, )*
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub created_at: Option<DateTime<Utc>>,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub updated_at: Option<DateTime<Utc>>,
        }

        #[doc = concat!("Partial update for [`", stringify!($name), "`].")]
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $patch {
            $(
                $(#[$fmeta])*
                #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl Record for $name {
            const COLLECTION: &'static str = $collection;
            type Patch = $patch;

            fn id(&self) -> &str {
                &self.id
            }

            fn created(&mut self, id: String, at: DateTime<Utc>) {
                self.id = id;
                self.created_at = Some(at);
                self.updated_at = Some(at);
            }

            fn apply(&mut self, patch: $patch, at: DateTime<Utc>) {
                $(
                    if let Some(value) = patch.$field {
                        self.$field = value;
                    }
                )*
                self.updated_at = Some(at);
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipmentStatus {
    #[default]
    Pending,
    Ordered,
    Received,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinancingKind {
    Credit,
    Grant,
    Loan,
    Investment,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinancingStatus {
    #[default]
    Applied,
    Approved,
    Rejected,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Inspection,
    Meeting,
    Deadline,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    #[default]
    Viewing,
    Interested,
    Negotiating,
    Rejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuCategory {
    #[default]
    Beverage,
    Dessert,
    Snack,
    Main,
    Breakfast,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dietary {
    #[default]
    None,
    Vegetarian,
    Vegan,
}

record! {
    /// A line of the opening budget.
    pub struct CostEstimate / CostEstimatePatch in "costEstimates" {
        pub name: String,
        pub quantity: f64,
        pub unit_price: f64,
        pub total: f64,
        pub category: Option<String>,
    }
}

record! {
    pub struct Supplier / SupplierPatch in "suppliers" {
        pub name: String,
        pub contact: String,
        pub email: String,
        pub phone: String,
        pub category: Option<String>,
        pub notes: Option<String>,
    }
}

record! {
    /// Equipment to buy, optionally linked to a supplier by name.
    pub struct Equipment / EquipmentPatch in "equipment" {
        pub name: String,
        pub quantity: f64,
        pub unit_price: f64,
        pub supplier: Option<String>,
        pub status: Option<EquipmentStatus>,
    }
}

record! {
    pub struct Task / TaskPatch in "tasks" {
        pub title: String,
        pub description: Option<String>,
        pub assigned_to: Option<String>,
        pub status: Option<TaskStatus>,
        pub due_date: Option<DateTime<Utc>>,
        pub priority: Option<Priority>,
    }
}

record! {
    /// A credit, grant, loan or investment application.
    pub struct Financing / FinancingPatch in "financing" {
        pub name: String,
        #[serde(rename = "type")]
        pub kind: FinancingKind,
        pub amount: f64,
        pub approved_amount: Option<f64>,
        pub interest_rate: Option<f64>,
        /// Months.
        pub repayment_period: Option<u32>,
        pub status: Option<FinancingStatus>,
        pub lender: Option<String>,
        pub notes: Option<String>,
    }
}

record! {
    pub struct CalendarEvent / CalendarEventPatch in "events" {
        pub title: String,
        pub description: Option<String>,
        pub start_date: DateTime<Utc>,
        pub end_date: DateTime<Utc>,
        pub category: Option<EventCategory>,
        pub color: Option<String>,
        pub notes: Option<String>,
    }
}

record! {
    /// A candidate venue.
    pub struct Location / LocationPatch in "locations" {
        pub street: String,
        pub square_meters: f64,
        pub monthly_rent: f64,
        pub link: Option<String>,
        pub status: LocationStatus,
        pub notes: Option<String>,
    }
}

record! {
    pub struct MenuItem / MenuItemPatch in "menuItems" {
        pub name: String,
        pub description: Option<String>,
        pub category: MenuCategory,
        pub dietary: Dietary,
        pub price: f64,
        pub notes: Option<String>,
    }
}

/// Push-based view of a collection: the full record set after every change.
#[derive(Debug)]
pub struct RecordSubscription<R> {
    updates: Receiver<Vec<R>>,
}

impl<R> RecordSubscription<R> {
    /// The most recent record set since the last poll, if any.
    pub fn poll(&mut self) -> Option<Vec<R>> {
        let mut latest = None;
        while let Ok(records) = self.updates.try_recv() {
            latest = Some(records);
        }
        latest
    }
}

/// Backend for one record collection.
pub trait RecordStore<R: Record>: Send + Sync {
    /// Subscribe to the collection. The current set is delivered first.
    fn subscribe(&self) -> RecordResult<RecordSubscription<R>>;

    /// Insert a record, ignoring its id, and return the generated id.
    fn create(&self, record: R) -> BoxFuture<'_, RecordResult<String>>;

    /// Merge the present fields of `patch` into the record.
    fn update(&self, id: &str, patch: R::Patch) -> BoxFuture<'_, RecordResult<()>>;

    /// Remove a record. Removing an unknown id is not an error.
    fn delete(&self, id: &str) -> BoxFuture<'_, RecordResult<()>>;
}

/// In-process record collection.
#[derive(Debug)]
pub struct MemoryRecordStore<R> {
    records: RwLock<Vec<R>>,
    subscribers: Mutex<Vec<Sender<Vec<R>>>>,
}

impl<R> Default for MemoryRecordStore<R> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<R: Record> MemoryRecordStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current records in creation order.
    pub fn records(&self) -> RecordResult<Vec<R>> {
        self.records
            .read()
            .map(|records| records.clone())
            .map_err(|e| RecordError::Other(format!("Lock error: {}", e)))
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Vec<R>) -> RecordResult<T>) -> RecordResult<T> {
        let (result, snapshot) = {
            let mut records = self
                .records
                .write()
                .map_err(|e| RecordError::Other(format!("Lock error: {}", e)))?;
            let result = f(&mut records)?;
            (result, records.clone())
        };
        self.notify(snapshot);
        Ok(result)
    }

    fn notify(&self, snapshot: Vec<R>) {
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok()),
            Err(e) => log::error!("{} subscriber lock poisoned: {}", R::COLLECTION, e),
        }
    }
}

impl<R: Record> RecordStore<R> for MemoryRecordStore<R> {
    fn subscribe(&self) -> RecordResult<RecordSubscription<R>> {
        let (tx, rx) = channel();
        let current = self.records()?;
        tx.send(current)
            .map_err(|e| RecordError::Other(format!("Subscription channel closed: {}", e)))?;
        self.subscribers
            .lock()
            .map_err(|e| RecordError::Other(format!("Lock error: {}", e)))?
            .push(tx);
        Ok(RecordSubscription { updates: rx })
    }

    fn create(&self, mut record: R) -> BoxFuture<'_, RecordResult<String>> {
        Box::pin(async move {
            let id = uuid::Uuid::new_v4().to_string();
            record.created(id.clone(), Utc::now());
            self.modify(|records| {
                records.push(record);
                Ok(())
            })?;
            log::debug!("Created {}/{}", R::COLLECTION, id);
            Ok(id)
        })
    }

    fn update(&self, id: &str, patch: R::Patch) -> BoxFuture<'_, RecordResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.modify(|records| {
                let record = records
                    .iter_mut()
                    .find(|r| r.id() == id)
                    .ok_or_else(|| RecordError::NotFound {
                        collection: R::COLLECTION,
                        id: id.clone(),
                    })?;
                record.apply(patch, Utc::now());
                Ok(())
            })
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'_, RecordResult<()>> {
        let id = id.to_string();
        Box::pin(async move {
            self.modify(|records| {
                records.retain(|r| r.id() != id);
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_util::block_on;

    fn espresso_machine() -> Equipment {
        Equipment {
            id: String::new(),
            name: "Espresso machine".to_string(),
            quantity: 1.0,
            unit_price: 12_500.0,
            supplier: Some("La Marzocco".to_string()),
            status: Some(EquipmentStatus::Pending),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_create_assigns_id_and_timestamps() {
        let store = MemoryRecordStore::<Equipment>::new();

        let id = block_on(store.create(espresso_machine())).unwrap();

        let records = store.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert!(records[0].created_at.is_some());
        assert_eq!(records[0].created_at, records[0].updated_at);
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let store = MemoryRecordStore::<Equipment>::new();
        let id = block_on(store.create(espresso_machine())).unwrap();

        let patch = EquipmentPatch {
            status: Some(Some(EquipmentStatus::Ordered)),
            ..Default::default()
        };
        block_on(store.update(&id, patch)).unwrap();

        let record = &store.records().unwrap()[0];
        assert_eq!(record.status, Some(EquipmentStatus::Ordered));
        assert_eq!(record.name, "Espresso machine");
        assert_eq!(record.unit_price, 12_500.0);
    }

    #[test]
    fn test_patch_null_clears_optional_field() {
        let store = MemoryRecordStore::<Equipment>::new();
        let id = block_on(store.create(espresso_machine())).unwrap();

        let patch: EquipmentPatch =
            serde_json::from_str(r#"{"supplier": null, "quantity": 2}"#).unwrap();
        assert_eq!(patch.supplier, Some(None));
        assert_eq!(patch.status, None);
        block_on(store.update(&id, patch)).unwrap();

        let record = &store.records().unwrap()[0];
        assert_eq!(record.supplier, None);
        assert_eq!(record.quantity, 2.0);
        assert_eq!(record.status, Some(EquipmentStatus::Pending));
    }

    #[test]
    fn test_update_unknown_id() {
        let store = MemoryRecordStore::<Task>::new();
        let result = block_on(store.update("missing", TaskPatch::default()));
        assert!(matches!(
            result,
            Err(RecordError::NotFound { collection: "tasks", .. })
        ));
    }

    #[test]
    fn test_subscription_receives_full_set() {
        let store = MemoryRecordStore::<Equipment>::new();
        let mut sub = store.subscribe().unwrap();
        assert_eq!(sub.poll(), Some(vec![]));

        let first = block_on(store.create(espresso_machine())).unwrap();
        block_on(store.create(espresso_machine())).unwrap();
        assert_eq!(sub.poll().unwrap().len(), 2);

        block_on(store.delete(&first)).unwrap();
        let remaining = sub.poll().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, first);
        assert_eq!(sub.poll(), None);
    }

    #[test]
    fn test_wire_field_names() {
        let financing = Financing {
            id: "f1".to_string(),
            name: "Startup grant".to_string(),
            kind: FinancingKind::Grant,
            amount: 50_000.0,
            approved_amount: None,
            interest_rate: None,
            repayment_period: Some(24),
            status: Some(FinancingStatus::Applied),
            lender: None,
            notes: None,
            created_at: None,
            updated_at: None,
        };
        let json = serde_json::to_value(&financing).unwrap();
        assert_eq!(json["type"], "grant");
        assert_eq!(json["repaymentPeriod"], 24);
        assert_eq!(json["status"], "applied");
        assert_eq!(Financing::COLLECTION, "financing");

        let task: Task = serde_json::from_value(serde_json::json!({
            "id": "t1",
            "title": "Sanitary inspection",
            "status": "in-progress",
            "priority": "high"
        }))
        .unwrap();
        assert_eq!(task.status, Some(TaskStatus::InProgress));
        assert_eq!(task.priority, Some(Priority::High));
        assert!(task.due_date.is_none());
    }
}
