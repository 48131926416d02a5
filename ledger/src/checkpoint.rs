//! Truncation checkpoints.
//!
//! When old history is archived out of the in-memory graph, every address it
//! touched keeps a signed net of that history. Validation and balance
//! queries fold the net back in, so pruning never changes a balance.

use std::collections::HashMap;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use tangle_types::{Address, Melange, MelangeError, VertexHash};

use crate::vertex::Vertex;

/// Net funds of one address over archived history. At most one side is
/// non-zero: `credit` when the address received more than it spent,
/// `debit` otherwise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecalculatedFunds {
    pub credit: Melange,
    pub debit: Melange,
}

impl PrecalculatedFunds {
    pub fn receive(&mut self, amount: Melange) -> Result<(), MelangeError> {
        Self::shift(amount, &mut self.debit, &mut self.credit)
    }

    pub fn spend(&mut self, amount: Melange) -> Result<(), MelangeError> {
        Self::shift(amount, &mut self.credit, &mut self.debit)
    }

    /// Cancel `amount` against `opposite` first, then add any remainder to `same`.
    fn shift(amount: Melange, opposite: &mut Melange, same: &mut Melange) -> Result<(), MelangeError> {
        if *opposite >= amount {
            *opposite = opposite.checked_sub(amount)?;
            return Ok(());
        }
        let remainder = amount.checked_sub(*opposite)?;
        *same = same.checked_add(remainder)?;
        *opposite = Melange::ZERO;
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Per-address accumulator built while walking history about to be archived.
#[derive(Default)]
pub struct FundsMap {
    funds: HashMap<Address, PrecalculatedFunds>,
}

impl FundsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, address: Address, funds: PrecalculatedFunds) {
        self.funds.insert(address, funds);
    }

    pub fn get(&self, address: &Address) -> Option<&PrecalculatedFunds> {
        self.funds.get(address)
    }

    /// Fold one archived vertex into the issuer's and receiver's nets.
    pub fn apply(&mut self, vertex: &Vertex) -> Result<(), MelangeError> {
        let trx = &vertex.transaction;
        if !trx.is_spice_transfer() {
            return Ok(());
        }
        self.funds.entry(trx.issuer.clone()).or_default().spend(trx.spice)?;
        self.funds.entry(trx.receiver.clone()).or_default().receive(trx.spice)?;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &PrecalculatedFunds)> {
        self.funds.iter()
    }

    pub fn len(&self) -> usize {
        self.funds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funds.is_empty()
    }
}

/// Counts vertices down an ancestor walk and remembers the one at `depth`.
pub struct HashAtDepth {
    remaining: u64,
    hash: Option<VertexHash>,
}

impl HashAtDepth {
    pub fn new(depth: u64) -> Self {
        Self {
            remaining: depth,
            hash: None,
        }
    }

    /// Feed the next walked vertex; `Break` once the depth is reached.
    pub fn visit(&mut self, vertex: &Vertex) -> ControlFlow<()> {
        if self.hash.is_some() {
            return ControlFlow::Break(());
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.hash = Some(vertex.hash);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    pub fn hash(&self) -> Option<VertexHash> {
        self.hash
    }
}

/// Whether a frontier at `current` weight has moved far enough past `mark`
/// that a checkpoint `depth` vertices back would itself lie beyond it.
pub fn can_truncate(current: u64, mark: u64, depth: u64) -> bool {
    current > mark && current > depth && current - depth > mark
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle_crypto::{Signer, Wallet};
    use tangle_transactions::Transaction;

    #[test]
    fn net_switches_sides() {
        let mut f = PrecalculatedFunds::default();
        f.receive(Melange::new(10, 0)).unwrap();
        f.spend(Melange::new(4, 0)).unwrap();
        assert_eq!(f, PrecalculatedFunds { credit: Melange::new(6, 0), debit: Melange::ZERO });
        f.spend(Melange::new(7, 5)).unwrap();
        assert_eq!(f, PrecalculatedFunds { credit: Melange::ZERO, debit: Melange::new(1, 5) });
        f.receive(Melange::new(1, 5)).unwrap();
        assert_eq!(f, PrecalculatedFunds::default());
    }

    #[test]
    fn funds_map_applies_transfers() {
        let issuer = Wallet::from_seed(&[1; 32]);
        let receiver = Wallet::from_seed(&[2; 32]);
        let tx = Transaction::new("t", Melange::new(3, 0), vec![], receiver.address(), &issuer).unwrap();
        let v = Vertex::new(tx, VertexHash::ZERO, VertexHash::ZERO, 0, &issuer);

        let mut map = FundsMap::new();
        map.apply(&v).unwrap();
        map.apply(&v).unwrap();
        assert_eq!(map.get(&receiver.address()).unwrap().credit, Melange::new(6, 0));
        assert_eq!(map.get(&issuer.address()).unwrap().debit, Melange::new(6, 0));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn hash_at_depth_breaks_on_target() {
        let issuer = Wallet::from_seed(&[1; 32]);
        let receiver = Wallet::from_seed(&[2; 32]);
        let vertices: Vec<Vertex> = (0..3u8)
            .map(|i| {
                let tx = Transaction::new("t", Melange::ZERO, vec![i], receiver.address(), &issuer).unwrap();
                Vertex::new(tx, VertexHash::ZERO, VertexHash::ZERO, 0, &issuer)
            })
            .collect();

        let mut h = HashAtDepth::new(2);
        assert_eq!(h.visit(&vertices[0]), ControlFlow::Continue(()));
        assert_eq!(h.visit(&vertices[1]), ControlFlow::Break(()));
        assert_eq!(h.hash(), Some(vertices[1].hash));
        assert_eq!(h.visit(&vertices[2]), ControlFlow::Break(()));
        assert_eq!(h.hash(), Some(vertices[1].hash));
    }

    #[test]
    fn truncation_threshold() {
        assert!(!can_truncate(10, 10, 2));
        assert!(!can_truncate(12, 10, 2));
        assert!(can_truncate(13, 10, 2));
        assert!(!can_truncate(3, 0, 5));
    }
}
