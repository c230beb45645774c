use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

/// Field map shared by local records and remote payloads
pub type Fields = serde_json::Map<String, Value>;

/// Identifier assigned by the local store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub String);

impl LocalId {
    /// Generate a fresh, globally unique local identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the string representation of the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LocalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for LocalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier assigned by the external system of record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(pub String);

impl ExternalId {
    /// Get the string representation of the id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExternalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ExternalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Caller-supplied credential forwarded to the external system
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a bearer token
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building the authorization header
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Kind tag of every entity that lives in both stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Customer account
    Account,
    /// Sales opportunity
    Opportunity,
    /// Price list tied to an account
    PriceList,
    /// Catalog item
    ProductOffering,
    /// Price of an offering within a price list
    ProductOfferingPrice,
    /// Priced line of an opportunity
    OpportunityLineItem,
    /// Quote computed by the external system
    Quote,
    /// Line of a quote
    QuoteLine,
}

impl EntityKind {
    /// Every kind, in declaration order
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Account,
        EntityKind::Opportunity,
        EntityKind::PriceList,
        EntityKind::ProductOffering,
        EntityKind::ProductOfferingPrice,
        EntityKind::OpportunityLineItem,
        EntityKind::Quote,
        EntityKind::QuoteLine,
    ];

    /// Stable tag used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Account => "account",
            EntityKind::Opportunity => "opportunity",
            EntityKind::PriceList => "price_list",
            EntityKind::ProductOffering => "product_offering",
            EntityKind::ProductOfferingPrice => "product_offering_price",
            EntityKind::OpportunityLineItem => "opportunity_line_item",
            EntityKind::Quote => "quote",
            EntityKind::QuoteLine => "quote_line",
        }
    }

    /// Name of the remote collection holding this kind
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Account => "accounts",
            EntityKind::Opportunity => "opportunities",
            EntityKind::PriceList => "price_lists",
            EntityKind::ProductOffering => "product_offerings",
            EntityKind::ProductOfferingPrice => "product_offering_prices",
            EntityKind::OpportunityLineItem => "opportunity_line_items",
            EntityKind::Quote => "quotes",
            EntityKind::QuoteLine => "quote_lines",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StoreError::Serialization(format!("Unknown entity kind: {}", s)))
    }
}

/// A row of the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Entity kind
    pub kind: EntityKind,
    /// Local identifier, immutable from creation
    pub local_id: LocalId,
    /// External identifier, set once by the first successful remote write
    pub external_id: Option<ExternalId>,
    /// Domain fields; references hold local ids
    pub fields: Fields,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl LocalRecord {
    /// Create a new record stamped with the current time
    pub fn new(
        kind: EntityKind,
        local_id: LocalId,
        external_id: Option<ExternalId>,
        fields: Fields,
    ) -> Self {
        let now = Utc::now();
        Self {
            kind,
            local_id,
            external_id,
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a reference field as a local id
    pub fn reference(&self, field: &str) -> Option<LocalId> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(LocalId::from)
    }

    /// Decode the fields into a typed view
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }

    /// Whether every criterion equals the corresponding field
    pub fn matches(&self, criteria: &Fields) -> bool {
        criteria
            .iter()
            .all(|(key, expected)| self.fields.get(key) == Some(expected))
    }

    /// Both identifiers, when the record has been synced
    pub fn synced(&self) -> Option<Synced> {
        self.external_id.as_ref().map(|external_id| Synced {
            local_id: self.local_id.clone(),
            external_id: external_id.clone(),
        })
    }

    /// Reference to this record for reporting
    pub fn sync_ref(&self) -> SyncRef {
        SyncRef {
            kind: self.kind,
            local_id: self.local_id.clone(),
            external_id: self.external_id.clone(),
        }
    }
}

/// Both identifiers of an entity that exists in the two stores
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Synced {
    /// Local identifier
    pub local_id: LocalId,
    /// External identifier
    pub external_id: ExternalId,
}

impl Synced {
    /// Reference to this entity for reporting
    pub fn to_ref(&self, kind: EntityKind) -> SyncRef {
        SyncRef {
            kind,
            local_id: self.local_id.clone(),
            external_id: Some(self.external_id.clone()),
        }
    }
}

/// Reference to a record, as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRef {
    /// Entity kind
    pub kind: EntityKind,
    /// Local identifier
    pub local_id: LocalId,
    /// External identifier, if synced
    pub external_id: Option<ExternalId>,
}

/// Encode a typed value as a field map
pub fn to_fields<T: Serialize>(value: &T) -> Fields {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => Fields::new(),
    }
}
