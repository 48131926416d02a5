//! The accounting book: owns the DAG and admits, validates and prunes vertices.
//!
//! Every graph mutation happens under one write lock. There is no balance
//! table; a spender's funds are re-derived from its visible history (plus the
//! truncation checkpoint) each time a vertex carrying a transfer is admitted,
//! so two spends of the same funds can never both pass validation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tangle_crypto::{SignatureVerifier, Signer};
use tangle_transactions::Transaction;
use tangle_types::{Address, Melange, MelangeError, Timestamp, TxHash, VertexHash};

use crate::balance::Balance;
use crate::checkpoint::{can_truncate, FundsMap, HashAtDepth, PrecalculatedFunds};
use crate::config::LedgerConfig;
use crate::graph::{Graph, GraphError};
use crate::replier::Replier;
use crate::storage::LedgerStores;
use crate::vertex::{next_weight, Vertex};
use crate::LedgerError;

const STREAM_CAPACITY: usize = 256;

struct TruncationState {
    /// Frontier weight past which the next truncation may run.
    next_mark: u64,
    /// Sequence to pass to the next incremental archive backup.
    last_backup: u64,
}

pub struct AccountingBook {
    config: LedgerConfig,
    signer: Arc<dyn Signer>,
    verifier: Arc<dyn SignatureVerifier>,
    stores: LedgerStores,
    graph: RwLock<Graph>,
    replier: Replier,
    weight: AtomicU64,
    throughput: AtomicU64,
    dag_loaded: AtomicBool,
    genesis: RwLock<Option<Address>>,
    truncation: Mutex<TruncationState>,
    truncate_tx: mpsc::Sender<u64>,
    truncate_rx: Mutex<Option<mpsc::Receiver<u64>>>,
}

impl AccountingBook {
    pub fn new(
        config: LedgerConfig,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn SignatureVerifier>,
        stores: LedgerStores,
    ) -> Self {
        let config = config.validated();
        let (truncate_tx, truncate_rx) = mpsc::channel(config.truncate_signal_capacity);
        Self {
            replier: Replier::new(
                config.replier_capacity,
                config.replier_max_repeats,
                config.replier_longevity(),
            ),
            weight: AtomicU64::new(0),
            throughput: AtomicU64::new(config.initial_throughput),
            dag_loaded: AtomicBool::new(false),
            genesis: RwLock::new(None),
            truncation: Mutex::new(TruncationState {
                next_mark: config.truncate_at_weight,
                last_backup: 0,
            }),
            truncate_tx,
            truncate_rx: Mutex::new(Some(truncate_rx)),
            graph: RwLock::new(Graph::new()),
            config,
            signer,
            verifier,
            stores,
        }
    }

    /// Open the stores named by `config` and build a book on top of them.
    pub fn open(
        config: LedgerConfig,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, LedgerError> {
        let stores = LedgerStores::open(&config)?;
        Ok(Self::new(config, signer, verifier, stores))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Address of the node signing the vertices this book creates.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn dag_loaded(&self) -> bool {
        self.dag_loaded.load(Ordering::SeqCst)
    }

    /// Heaviest weight admitted so far.
    pub fn weight(&self) -> u64 {
        self.weight.load(Ordering::SeqCst)
    }

    pub fn throughput(&self) -> u64 {
        self.throughput.load(Ordering::SeqCst)
    }

    pub fn genesis_address(&self) -> Result<Option<Address>, LedgerError> {
        Ok(self
            .genesis
            .read()
            .map_err(|_| LedgerError::Unexpected("genesis lock poisoned".into()))?
            .clone())
    }

    /// Number of vertices currently held in memory.
    pub fn vertex_count(&self) -> Result<usize, LedgerError> {
        Ok(self.read_graph()?.len())
    }

    pub fn pending_retries(&self) -> usize {
        self.replier.len()
    }

    pub fn add_trusted_node(&self, address: &Address) -> Result<(), LedgerError> {
        self.stores.add_trusted(address)?;
        info!(node = %address, "trusted node added");
        Ok(())
    }

    pub fn remove_trusted_node(&self, address: &Address) -> Result<(), LedgerError> {
        self.stores.remove_trusted(address)?;
        info!(node = %address, "trusted node removed");
        Ok(())
    }

    // ── Bootstrap ──────────────────────────────────────────────────────

    /// Start a new DAG: a parentless, weight-0 vertex in which this node
    /// issues `spice` to `receiver`. Calling it twice yields two roots.
    pub fn create_genesis(
        &self,
        subject: impl Into<String>,
        spice: Melange,
        data: Vec<u8>,
        receiver: Address,
    ) -> Result<Vertex, LedgerError> {
        let address = self.signer.address();
        if receiver == address {
            return Err(LedgerError::GenesisRejected("issuer cannot be the receiver".into()));
        }
        let trx = Transaction::new(subject, spice, data, receiver, self.signer.as_ref())
            .map_err(|e| LedgerError::GenesisRejected(e.to_string()))?;
        let vertex = Vertex::new(trx, VertexHash::ZERO, VertexHash::ZERO, 0, self.signer.as_ref());

        let mut graph = self.write_graph()?;
        self.insert_vertex(&mut graph, vertex.clone())?;
        self.throughput.store(self.config.initial_throughput, Ordering::SeqCst);
        self.update_weight_and_throughput(&graph, vertex.weight);
        self.dag_loaded.store(true, Ordering::SeqCst);
        *self.write_genesis()? = Some(address.clone());
        drop(graph);

        info!(vertex = %vertex.hash, genesis = %address, "genesis vertex created");
        Ok(vertex)
    }

    /// Populate an empty book from another node's vertices, in any order.
    ///
    /// A stream taken after a truncation lacks the archived history, so its
    /// balances only match once the exporter's [`checkpoints`](Self::checkpoints)
    /// have been handed to [`load_checkpoints`](Self::load_checkpoints) first.
    /// A failure leaves the graph partially populated; the book must then be
    /// discarded.
    pub fn load_dag(&self, vertices: impl IntoIterator<Item = Vertex>) -> Result<(), LedgerError> {
        let mut graph = self.write_graph()?;
        if self.dag_loaded() {
            return Err(LedgerError::DagAlreadyLoaded);
        }

        let mut hashes = Vec::new();
        let mut max_weight = 0;
        let mut genesis = None;
        let mut last_issuer = None;
        for vertex in vertices {
            self.stores.map_trx(&vertex.transaction.hash, &vertex.hash)?;
            max_weight = max_weight.max(vertex.weight);
            if vertex.has_no_parents() {
                genesis = Some(vertex.transaction.issuer.clone());
            }
            last_issuer = Some(vertex.transaction.issuer.clone());
            hashes.push(vertex.hash);
            graph.add_vertex(vertex)?;
        }
        let Some(genesis) = genesis.or(last_issuer) else {
            return Err(LedgerError::Unexpected("dag stream was empty".into()));
        };

        for hash in &hashes {
            let parents: Vec<VertexHash> = match graph.get(hash) {
                Some(vertex) => vertex.distinct_parents().filter(|p| !p.is_zero()).collect(),
                None => continue,
            };
            for parent in parents {
                if !graph.contains(&parent) {
                    debug!(vertex = %hash, parent = %parent, "parent not in stream, vertex kept as root");
                    continue;
                }
                graph.add_edge(parent, *hash)?;
            }
        }

        self.throughput.store(self.config.initial_throughput, Ordering::SeqCst);
        self.update_weight_and_throughput(&graph, max_weight);
        self.lock_truncation()?.next_mark += max_weight;
        *self.write_genesis()? = Some(genesis.clone());
        self.dag_loaded.store(true, Ordering::SeqCst);

        info!(vertices = hashes.len(), weight = max_weight, genesis = %genesis, "dag loaded");
        Ok(())
    }

    /// Drain `stream` and load what it carried.
    pub async fn load_dag_stream(
        &self,
        mut stream: mpsc::Receiver<Vertex>,
        cancel: &CancellationToken,
    ) -> Result<(), LedgerError> {
        if self.dag_loaded() {
            return Err(LedgerError::DagAlreadyLoaded);
        }
        let mut vertices = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
                next = stream.recv() => match next {
                    Some(vertex) => vertices.push(vertex),
                    None => break,
                },
            }
        }
        self.load_dag(vertices)
    }

    /// Send every in-memory vertex, newest first, to the returned channel.
    ///
    /// The graph is snapshotted before this returns; the sending happens on
    /// a spawned task, so it must be called inside a tokio runtime.
    pub fn stream_dag(&self, cancel: &CancellationToken) -> Result<mpsc::Receiver<Vertex>, LedgerError> {
        if !self.dag_loaded() {
            return Err(LedgerError::DagNotLoaded);
        }
        let snapshot: Vec<Vertex> = {
            let graph = self.read_graph()?;
            let leaves: Vec<VertexHash> = graph.leaves().iter().map(|v| v.hash).collect();
            graph
                .lineage_walk(leaves, cancel)
                .map(|visited| visited.cloned())
                .collect::<Result<_, _>>()?
        };

        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for vertex in snapshot {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("dag stream cancelled");
                        return;
                    }
                    sent = tx.send(vertex) => if sent.is_err() {
                        return;
                    },
                }
            }
        });
        Ok(rx)
    }

    /// Net funds folded out of the graph by earlier truncations.
    pub fn checkpoints(&self) -> Result<Vec<(Address, PrecalculatedFunds)>, LedgerError> {
        let _graph = self.read_graph()?;
        self.stores.all_funds()
    }

    /// Seed an empty book with another node's checkpoint nets.
    pub fn load_checkpoints(&self, nets: &[(Address, PrecalculatedFunds)]) -> Result<(), LedgerError> {
        let _graph = self.write_graph()?;
        if self.dag_loaded() {
            return Err(LedgerError::DagAlreadyLoaded);
        }
        self.stores.save_all_funds(nets.iter().map(|(address, net)| (address, net)))?;
        debug!(addresses = nets.len(), "checkpoint nets loaded");
        Ok(())
    }

    // ── Admission ──────────────────────────────────────────────────────

    /// Wrap a transaction received by this node into a new signed leaf,
    /// attached to up to two admissible leaves.
    pub fn create_leaf(&self, trx: Transaction, cancel: &CancellationToken) -> Result<Vertex, LedgerError> {
        if !self.dag_loaded() {
            return Err(LedgerError::DagNotLoaded);
        }
        if trx.issuer == self.signer.address() {
            return Err(LedgerError::SelfDealing);
        }
        if self.genesis_address()?.as_ref() == Some(&trx.issuer) {
            return Err(LedgerError::GenesisAsSpender);
        }
        let verified = if trx.is_contract() {
            trx.verify_issuer_receiver(self.verifier.as_ref())
        } else {
            trx.verify_issuer(self.verifier.as_ref())
        };
        verified.map_err(|e| LedgerError::NewLeafRejected(e.to_string()))?;

        let mut graph = self.write_graph()?;
        if self.stores.is_trx_mapped(&trx.hash)? {
            return Err(LedgerError::TrxAlreadyMapped);
        }
        let [(left, left_weight), (right, right_weight)] = self.select_parents(&mut graph, cancel)?;
        let weight = next_weight(left_weight, right_weight);
        let vertex = Vertex::new(trx, left, right, weight, self.signer.as_ref());

        if let Err(e) = self.validate_leaf(&graph, &vertex, cancel) {
            warn!(trx = %vertex.transaction.hash, error = %e, "new leaf rejected");
            return Err(e);
        }
        self.insert_vertex(&mut graph, vertex.clone())?;
        self.update_weight_and_throughput(&graph, weight);
        drop(graph);

        self.signal_truncation(weight);
        debug!(vertex = %vertex.hash, weight, "leaf created");
        Ok(vertex)
    }

    /// Admit a vertex created elsewhere. A vertex whose parents are not yet
    /// known is parked in the retry buffer and `Ok` is returned.
    pub fn add_leaf(&self, vertex: Vertex, cancel: &CancellationToken) -> Result<(), LedgerError> {
        if !self.dag_loaded() {
            return Err(LedgerError::DagNotLoaded);
        }
        if self.genesis_address()?.as_ref() == Some(&vertex.transaction.issuer) {
            return Err(LedgerError::GenesisAsSpender);
        }
        if vertex.has_no_parents() {
            return Err(LedgerError::LeafRejected("vertex declares no parents".into()));
        }
        vertex.verify(self.verifier.as_ref())?;

        let mut graph = self.write_graph()?;
        if graph.contains(&vertex.hash) || self.stores.is_archived(&vertex.hash)? {
            return Err(LedgerError::LeafAlreadyExists);
        }
        if self.stores.is_trx_mapped(&vertex.transaction.hash)? {
            return Err(LedgerError::TrxAlreadyMapped);
        }

        let mut parent_weights = [0u64; 2];
        for (slot, parent) in vertex.parents().into_iter().enumerate() {
            if slot == 1 && parent == vertex.left_parent {
                parent_weights[1] = parent_weights[0];
                continue;
            }
            let Some(found) = graph.get(&parent) else {
                drop(graph);
                return self.defer(vertex);
            };
            parent_weights[slot] = found.weight;
            if !graph.is_leaf(&parent)? {
                continue;
            }
            if let Err(e) = self.validate_leaf(&graph, found, cancel) {
                if !e.is_rejected_input() {
                    return Err(e);
                }
                warn!(parent = %parent, error = %e, "invalid parent leaf removed");
                self.drop_vertex(&mut graph, &parent)?;
                return Err(LedgerError::LeafRejected(format!("parent {parent} is invalid: {e}")));
            }
        }

        let expected = next_weight(parent_weights[0], parent_weights[1]);
        if vertex.weight != expected {
            return Err(LedgerError::LeafRejected(format!(
                "weight {} does not follow parents, expected {expected}",
                vertex.weight
            )));
        }
        if let Err(e) = self.validate_leaf(&graph, &vertex, cancel) {
            warn!(vertex = %vertex.hash, error = %e, "leaf rejected");
            return Err(e);
        }

        let (hash, weight) = (vertex.hash, vertex.weight);
        self.insert_vertex(&mut graph, vertex)?;
        self.update_weight_and_throughput(&graph, weight);
        drop(graph);

        self.signal_truncation(weight);
        debug!(vertex = %hash, weight, "leaf added");
        Ok(())
    }

    /// Pop the oldest parked vertex, if any, and offer it to [`add_leaf`](Self::add_leaf)
    /// again. Returns whether a vertex was replayed.
    pub fn replay_next(&self, cancel: &CancellationToken) -> Result<bool, LedgerError> {
        let swept = self.replier.sweep(Timestamp::now());
        if swept > 0 {
            debug!(swept, "expired retry memories swept");
        }
        let Some(vertex) = self.replier.pop_next() else {
            return Ok(false);
        };
        let hash = vertex.hash;
        match self.add_leaf(vertex, cancel) {
            Ok(()) => Ok(true),
            Err(e) if e.is_rejected_input() => {
                warn!(vertex = %hash, error = %e, "replayed leaf rejected");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Net funds of `address`: every transfer reachable from the current
    /// leaves plus the checkpoint left by earlier truncations.
    pub fn calculate_balance(&self, address: &Address, cancel: &CancellationToken) -> Result<Balance, LedgerError> {
        if !self.dag_loaded() {
            return Err(LedgerError::DagNotLoaded);
        }
        let graph = self.read_graph()?;
        let mut net = self.stores.funds(address)?;
        let leaves: Vec<VertexHash> = graph.leaves().iter().map(|v| v.hash).collect();
        for visited in graph.lineage_walk(leaves, cancel) {
            settle(visited?, address, &mut net)?;
        }
        drop(graph);

        // Only the genesis issuer ends up in debit; its balance drains to zero.
        Ok(Balance::new(address.clone(), net.credit))
    }

    pub fn read_vertex(&self, hash: &VertexHash) -> Result<Vertex, LedgerError> {
        if let Some(vertex) = self.read_graph()?.get(hash) {
            return Ok(vertex.clone());
        }
        self.stores.archived_vertex(hash)?.ok_or(LedgerError::VertexNotFound)
    }

    pub fn read_transaction_by_hash(&self, hash: &TxHash) -> Result<Transaction, LedgerError> {
        let vertex = self.stores.vertex_of_trx(hash)?.ok_or(LedgerError::TrxNotFound)?;
        Ok(self.read_vertex(&vertex)?.transaction)
    }

    /// Transactions in memory that `address` issued or received, oldest first.
    pub fn read_dag_transactions_by_address(
        &self,
        address: &Address,
        cancel: &CancellationToken,
    ) -> Result<Vec<Transaction>, LedgerError> {
        if !self.dag_loaded() {
            return Err(LedgerError::DagNotLoaded);
        }
        let graph = self.read_graph()?;
        let leaves: Vec<VertexHash> = graph.leaves().iter().map(|v| v.hash).collect();
        let mut found = Vec::new();
        for visited in graph.lineage_walk(leaves, cancel) {
            let trx = &visited?.transaction;
            if &trx.issuer == address || &trx.receiver == address {
                found.push(trx.clone());
            }
        }
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.hash.cmp(&b.hash)));
        Ok(found)
    }

    // ── Truncation ─────────────────────────────────────────────────────

    /// Archive everything older than the vertex `truncate_depth` steps behind
    /// the heaviest leaf and fold it into per-address checkpoints. Returns
    /// `false` when the graph is not yet deep enough.
    pub fn truncate(&self, cancel: &CancellationToken) -> Result<bool, LedgerError> {
        let mut graph = self.write_graph()?;
        let Some((head, head_weight)) = graph.leaves().first().map(|v| (v.hash, v.weight)) else {
            return Ok(false);
        };

        let mut target = HashAtDepth::new(self.config.truncate_depth);
        for visited in graph.ancestors_walk(&head, cancel)? {
            if target.visit(visited?).is_break() {
                break;
            }
        }
        let Some(checkpoint) = target.hash() else {
            debug!(head = %head, depth = self.config.truncate_depth, "dag too shallow to truncate");
            return Ok(false);
        };

        let mut state = self.lock_truncation()?;
        if let Some(dir) = &self.config.backup_dir {
            let (path, next) = self.stores.backup_archive(dir, state.last_backup)?;
            state.last_backup = next;
            info!(path = %path.display(), "vertex archive backed up");
        }

        let mut funds = FundsMap::new();
        for (address, net) in self.stores.all_funds()? {
            funds.set(address, net);
        }
        let mut archived = Vec::new();
        for visited in graph.ancestors_walk(&checkpoint, cancel)? {
            let vertex = visited?;
            funds.apply(vertex)?;
            self.stores.archive_vertex(vertex)?;
            archived.push(vertex.hash);
        }
        // Archived copies of vertices still in memory are shadowed by the
        // graph, so only the nets have to land together with the prune.
        self.stores.save_all_funds(funds.iter())?;
        for hash in &archived {
            graph.delete(hash);
        }

        state.next_mark = head_weight.saturating_add(self.config.truncate_at_weight);
        self.update_weight_and_throughput(&graph, head_weight);
        info!(
            checkpoint = %checkpoint,
            archived = archived.len(),
            remaining = graph.len(),
            next_mark = state.next_mark,
            "dag truncated"
        );
        Ok(true)
    }

    fn truncation_due(&self, weight: u64) -> bool {
        match self.lock_truncation() {
            Ok(state) => can_truncate(weight, state.next_mark, self.config.truncate_depth),
            Err(_) => false,
        }
    }

    // ── Background loops ───────────────────────────────────────────────

    /// Spawn the retry-buffer ticker and the truncation loop. Both stop when
    /// `shutdown` fires; a failed truncation fires it.
    pub fn run(self: &Arc<Self>, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>, LedgerError> {
        let mut signals = self
            .truncate_rx
            .lock()
            .map_err(|_| LedgerError::Unexpected("truncation receiver lock poisoned".into()))?
            .take()
            .ok_or_else(|| LedgerError::Unexpected("background loops already running".into()))?;

        let replier = {
            let book = Arc::clone(self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(book.config.replier_tick());
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    let worker = Arc::clone(&book);
                    let cancel = shutdown.clone();
                    match tokio::task::spawn_blocking(move || worker.replay_next(&cancel)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) if e.is_cancelled() => break,
                        Ok(Err(e)) => error!(error = %e, "retry buffer replay failed"),
                        Err(e) => error!(error = %e, "retry buffer task panicked"),
                    }
                }
                debug!("retry buffer loop stopped");
            })
        };

        let truncation = {
            let book = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let weight = tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        next = signals.recv() => match next {
                            Some(weight) => weight,
                            None => break,
                        },
                    };
                    if !book.truncation_due(weight) {
                        continue;
                    }
                    let worker = Arc::clone(&book);
                    let cancel = shutdown.clone();
                    match tokio::task::spawn_blocking(move || worker.truncate(&cancel)).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) if e.is_cancelled() => break,
                        Ok(Err(e)) => {
                            error!(error = %e, "truncation failed, shutting down");
                            shutdown.cancel();
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "truncation task panicked, shutting down");
                            shutdown.cancel();
                            break;
                        }
                    }
                }
                debug!("truncation loop stopped");
            })
        };

        Ok(vec![replier, truncation])
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// The double-spend guard. `candidate` may or may not be in `graph`.
    fn validate_leaf(&self, graph: &Graph, candidate: &Vertex, cancel: &CancellationToken) -> Result<(), LedgerError> {
        let current = self.weight.load(Ordering::SeqCst);
        let throughput = self.throughput.load(Ordering::SeqCst);
        if throughput <= current && candidate.weight < current - throughput {
            return Err(LedgerError::WeightBelowThreshold {
                weight: candidate.weight,
                current,
                throughput,
            });
        }

        candidate.verify(self.verifier.as_ref())?;

        if candidate.has_no_parents() || (graph.contains(&candidate.hash) && graph.is_root(&candidate.hash)?) {
            return Ok(());
        }

        let trx = &candidate.transaction;
        if !trx.is_spice_transfer() || self.stores.is_trusted(&candidate.signer)? {
            for parent in candidate.distinct_parents() {
                if !graph.contains(&parent) {
                    return Err(LedgerError::LeafRejected(format!("parent {parent} unknown")));
                }
            }
            return Ok(());
        }

        let issuer = &trx.issuer;
        let overflow = |e: MelangeError| LedgerError::LeafRejected(format!("funds of {issuer}: {e}"));
        let mut net = self.stores.funds(issuer)?;
        settle(candidate, issuer, &mut net).map_err(overflow)?;

        let declared = candidate.parents();
        for visited in graph.lineage_walk(candidate.distinct_parents(), cancel) {
            let vertex = visited?;
            if declared.contains(&vertex.hash) {
                vertex
                    .verify(self.verifier.as_ref())
                    .map_err(|e| LedgerError::LeafRejected(format!("parent {}: {e}", vertex.hash)))?;
            }
            settle(vertex, issuer, &mut net).map_err(overflow)?;
        }

        if !net.debit.is_empty() {
            return Err(LedgerError::InsufficientFunds);
        }
        Ok(())
    }

    /// Up to two admissible leaves, heaviest first. Invalid leaves met on
    /// the way are removed, which may expose their parents as new leaves,
    /// so the scan repeats until nothing more is removed. A lone admissible
    /// leaf fills both slots.
    fn select_parents(
        &self,
        graph: &mut Graph,
        cancel: &CancellationToken,
    ) -> Result<[(VertexHash, u64); 2], LedgerError> {
        let mut chosen: Vec<(VertexHash, u64)> = Vec::with_capacity(2);
        loop {
            let candidates: Vec<VertexHash> = graph
                .leaves()
                .iter()
                .map(|v| v.hash)
                .filter(|hash| chosen.iter().all(|(picked, _)| picked != hash))
                .collect();
            let mut removed = false;
            for hash in candidates {
                if chosen.len() == 2 {
                    break;
                }
                let verdict = match graph.get(&hash) {
                    Some(leaf) => self.validate_leaf(graph, leaf, cancel).map(|()| leaf.weight),
                    None => continue,
                };
                match verdict {
                    Ok(weight) => chosen.push((hash, weight)),
                    Err(e) if e.is_rejected_input() => {
                        warn!(leaf = %hash, error = %e, "invalid leaf removed");
                        self.drop_vertex(graph, &hash)?;
                        removed = true;
                    }
                    Err(e) => return Err(e),
                }
            }
            if chosen.len() == 2 || !removed {
                break;
            }
        }
        match chosen.as_slice() {
            [] => Err(LedgerError::Unexpected("no admissible leaf to attach to".into())),
            [only] => Ok([*only, *only]),
            [left, right, ..] => Ok([*left, *right]),
        }
    }

    /// Put `vertex` in the graph, wire its parents and index its
    /// transaction. Nothing is left behind on failure.
    fn insert_vertex(&self, graph: &mut Graph, vertex: Vertex) -> Result<(), LedgerError> {
        let hash = vertex.hash;
        let trx = vertex.transaction.hash;
        let parents: Vec<VertexHash> = vertex.distinct_parents().filter(|p| !p.is_zero()).collect();

        graph.add_vertex(vertex).map_err(|e| match e {
            GraphError::AlreadyExists(_) => LedgerError::VertexAlreadyExists,
            other => other.into(),
        })?;
        for parent in parents {
            if let Err(e) = graph.add_edge(parent, hash) {
                graph.delete(&hash);
                return Err(e.into());
            }
        }
        if let Err(e) = self.stores.map_trx(&trx, &hash) {
            graph.delete(&hash);
            return Err(e.into());
        }
        Ok(())
    }

    fn drop_vertex(&self, graph: &mut Graph, hash: &VertexHash) -> Result<(), LedgerError> {
        if let Some(vertex) = graph.delete(hash) {
            self.stores.unmap_trx(&vertex.transaction.hash)?;
        }
        self.update_weight_and_throughput(graph, 0);
        Ok(())
    }

    fn defer(&self, vertex: Vertex) -> Result<(), LedgerError> {
        let hash = vertex.hash;
        match self.replier.insert(vertex) {
            Ok(()) => {
                debug!(vertex = %hash, "parent unknown, leaf deferred");
                Ok(())
            }
            Err(e) => {
                warn!(vertex = %hash, error = %e, "leaf dropped from retry buffer");
                Err(LedgerError::LeafRejected(e.to_string()))
            }
        }
    }

    /// Weight only grows; throughput follows the number of open tips and
    /// never drops below the configured floor.
    fn update_weight_and_throughput(&self, graph: &Graph, weight: u64) {
        self.weight.fetch_max(weight, Ordering::SeqCst);
        let tips = graph.leaf_count() as u64 + 1;
        self.throughput
            .store(self.config.initial_throughput.max(tips), Ordering::SeqCst);
    }

    fn signal_truncation(&self, weight: u64) {
        if let Err(e) = self.truncate_tx.try_send(weight) {
            debug!(weight, "truncation signal dropped: {e}");
        }
    }

    fn read_graph(&self) -> Result<RwLockReadGuard<'_, Graph>, LedgerError> {
        self.graph
            .read()
            .map_err(|_| LedgerError::Unexpected("graph lock poisoned".into()))
    }

    fn write_graph(&self) -> Result<RwLockWriteGuard<'_, Graph>, LedgerError> {
        self.graph
            .write()
            .map_err(|_| LedgerError::Unexpected("graph lock poisoned".into()))
    }

    fn write_genesis(&self) -> Result<RwLockWriteGuard<'_, Option<Address>>, LedgerError> {
        self.genesis
            .write()
            .map_err(|_| LedgerError::Unexpected("genesis lock poisoned".into()))
    }

    fn lock_truncation(&self) -> Result<MutexGuard<'_, TruncationState>, LedgerError> {
        self.truncation
            .lock()
            .map_err(|_| LedgerError::Unexpected("truncation state lock poisoned".into()))
    }
}

/// Fold a transfer touching `address` into its running net. Receipts and
/// spends cancel before they accumulate, so the net stays in range for any
/// history whose balance does.
fn settle(vertex: &Vertex, address: &Address, net: &mut PrecalculatedFunds) -> Result<(), MelangeError> {
    let trx = &vertex.transaction;
    if !trx.is_spice_transfer() {
        return Ok(());
    }
    if &trx.receiver == address {
        net.receive(trx.spice)?;
    }
    if &trx.issuer == address {
        net.spend(trx.spice)?;
    }
    Ok(())
}
