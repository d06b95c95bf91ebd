//! Cutting-list records as the engine sees them.
//!
//! The full planning backend owns far richer work-order documents; the
//! suggestion engine only needs the product/size header, the order quantity,
//! and the profile line items underneath it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CuttingListId(pub String);

/// One historical (or freshly created) cutting list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CuttingList {
    pub id: CuttingListId,
    pub product_name: String,
    pub size: String,
    pub order_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub items: Vec<CuttingListItem>,
}

/// A single profile entry under a cutting list.
///
/// `profile` is optional at the edge; the key model maps a missing profile to
/// the `UNKNOWN` placeholder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CuttingListItem {
    pub profile: Option<String>,
    pub measurement: String,
    pub quantity: i64,
}
