use serde::{Deserialize, Serialize};
use tangle_types::{Address, Melange, Timestamp};

/// Spendable funds of an address as seen by this node at `accounted_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub accounted_at: Timestamp,
    pub address: Address,
    pub spice: Melange,
}

impl Balance {
    pub fn new(address: Address, spice: Melange) -> Self {
        Self {
            accounted_at: Timestamp::now(),
            address,
            spice,
        }
    }
}
