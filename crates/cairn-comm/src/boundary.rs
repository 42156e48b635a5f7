//! Per-entity boundary-exchange phase machines.
//!
//! One halo exchange walks every entity of a process through
//! `Idle → ReceivingSetup → Exchanging → Complete → Idle`. Receive slots
//! are posted before any send is issued, sends pack interior strips
//! through the codec, and the only blocking operation is
//! `receive_and_set_boundaries_with_wait`. Call order is enforced at the
//! interface: an out-of-order call returns
//! [`CommError::IllegalTransition`] instead of corrupting ghost data.
//!
//! Same-process neighbors hand their packed buffer through an in-process
//! mailbox instead of a channel. The data still goes through the codec,
//! so the local path is element-identical to the serialized one.

use std::collections::VecDeque;

use cairn_core::{BlockId, ChannelTag, CommError, Rank};
use cairn_mesh::{Block, CellRange, Face, Mesh};
use indexmap::IndexMap;

use crate::codec::{pack_vars, unpack_vars};
use crate::fabric::Transport;

// ── Phases and states ───────────────────────────────────────────

/// Which exchange within a cycle a phase belongs to.
///
/// Distinguishes the mesh-initialization exchange, an exchange inside an
/// integration sub-step, and the full-step exchange, so a cleared
/// channel can be reused by the next phase without ambiguity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangePhase {
    /// Ghost fill during problem setup.
    Initialization,
    /// Exchange inside an integration sub-step.
    SubStep,
    /// The once-per-cycle full exchange.
    FullStep,
}

impl ExchangePhase {
    /// Stable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialization => "Initialization",
            Self::SubStep => "SubStep",
            Self::FullStep => "FullStep",
        }
    }
}

/// Where an entity stands in the current exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryState {
    /// No exchange in progress; channels reusable.
    Idle,
    /// Receive slots posted, nothing sent yet.
    ReceivingSetup,
    /// Sends issued; receives arriving.
    Exchanging,
    /// All buffers arrived and applied; awaiting clear.
    Complete,
}

impl BoundaryState {
    /// Stable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::ReceivingSetup => "ReceivingSetup",
            Self::Exchanging => "Exchanging",
            Self::Complete => "Complete",
        }
    }
}

// ── Topology ────────────────────────────────────────────────────

/// How a link's transfer buffer travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Both blocks live on this process; deliver through the mailbox.
    Local,
    /// The peer block lives on another rank.
    Remote {
        /// Rank owning the receiving block (`to`); only the send side
        /// uses it, receives match by tag.
        rank: Rank,
        /// Persistent channel tag for this directed link.
        tag: ChannelTag,
    },
}

/// One directed neighbor relation: `from` sends across its `face` to
/// `to`, which fills the ghost strip on the opposite face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TopoLink {
    /// Sending block.
    pub from: BlockId,
    /// Receiving block.
    pub to: BlockId,
    /// The sender's face.
    pub face: Face,
    /// Delivery route.
    pub route: Route,
}

/// The neighbor graph for one mesh configuration, produced by the
/// refinement/load-balance engine.
///
/// The epoch changes whenever the blocks or their adjacency change;
/// boundary sets use it to make channel setup idempotent per
/// configuration.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    /// Monotonic configuration counter.
    pub epoch: u64,
    /// All directed links touching this process.
    pub links: Vec<TopoLink>,
}

// ── Entity state ────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
struct SendLink {
    to: BlockId,
    face: Face,
    route: Route,
}

#[derive(Clone, Copy, Debug)]
struct RecvLink {
    from: BlockId,
    /// The receiving block's face (opposite of the sender's).
    face: Face,
    route: Route,
}

#[derive(Debug)]
struct EntityComm {
    block: BlockId,
    state: BoundaryState,
    phase: Option<ExchangePhase>,
    sends: Vec<SendLink>,
    recvs: Vec<RecvLink>,
    arrived: Vec<Option<Vec<f64>>>,
}

impl EntityComm {
    fn new(block: BlockId) -> Self {
        Self {
            block,
            state: BoundaryState::Idle,
            phase: None,
            sends: Vec::new(),
            recvs: Vec::new(),
            arrived: Vec::new(),
        }
    }

    fn expect_state(&self, want: BoundaryState, op: &'static str) -> Result<(), CommError> {
        if self.state == want {
            Ok(())
        } else {
            Err(CommError::IllegalTransition {
                op,
                state: self.state.name(),
            })
        }
    }
}

// ── Shared core ─────────────────────────────────────────────────

/// State common to the field and swarm machines: the per-entity link
/// tables, the local mailbox keyed `(to, from)`, and the topology epoch.
///
/// Mailbox ordering note: when two links share a `(to, from)` pair
/// (periodic domains), both sides enumerate them in topology order, so
/// FIFO delivery pairs them up correctly.
#[derive(Debug, Default)]
struct BoundaryCore {
    entities: IndexMap<BlockId, EntityComm>,
    mail: IndexMap<(BlockId, BlockId), VecDeque<Vec<f64>>>,
    epoch: Option<u64>,
}

impl BoundaryCore {
    fn ready(&self) -> Result<(), CommError> {
        if self.epoch.is_none() {
            return Err(CommError::ChannelsNotReady);
        }
        Ok(())
    }

    fn setup(&mut self, topo: &Topology, local: &[BlockId]) -> Result<(), CommError> {
        // Idempotent per topology — but only while the local block set
        // still matches; a mesh change under an unchanged epoch forces
        // a rebuild.
        if self.epoch == Some(topo.epoch)
            && self.entities.len() == local.len()
            && local.iter().all(|id| self.entities.contains_key(id))
        {
            return Ok(());
        }
        for ent in self.entities.values() {
            ent.expect_state(BoundaryState::Idle, "setup_persistent_channels")?;
        }
        for link in &topo.links {
            if let Route::Remote { tag, .. } = link.route {
                if tag.0 >= ChannelTag::RESERVED_BASE {
                    return Err(CommError::ReservedTag { tag });
                }
            }
        }

        let mut entities: IndexMap<BlockId, EntityComm> = local
            .iter()
            .map(|&id| (id, EntityComm::new(id)))
            .collect();
        for link in &topo.links {
            let local_from = entities.contains_key(&link.from);
            let local_to = entities.contains_key(&link.to);
            if link.route == Route::Local && !(local_from && local_to) {
                let missing = if local_from { link.to } else { link.from };
                return Err(CommError::UnknownBlock { id: missing });
            }
            if let Some(ent) = entities.get_mut(&link.from) {
                ent.sends.push(SendLink {
                    to: link.to,
                    face: link.face,
                    route: link.route,
                });
            }
            if let Some(ent) = entities.get_mut(&link.to) {
                ent.recvs.push(RecvLink {
                    from: link.from,
                    face: link.face.opposite(),
                    route: link.route,
                });
            }
        }

        self.entities = entities;
        self.mail.clear();
        self.epoch = Some(topo.epoch);
        Ok(())
    }

    fn start_receiving(&mut self, phase: ExchangePhase) -> Result<(), CommError> {
        self.ready()?;
        for ent in self.entities.values() {
            ent.expect_state(BoundaryState::Idle, "start_receiving")?;
        }
        for ent in self.entities.values_mut() {
            ent.state = BoundaryState::ReceivingSetup;
            ent.phase = Some(phase);
            ent.arrived = vec![None; ent.recvs.len()];
        }
        Ok(())
    }

    fn begin_sending(&mut self, op: &'static str) -> Result<(), CommError> {
        self.ready()?;
        for ent in self.entities.values() {
            ent.expect_state(BoundaryState::ReceivingSetup, op)?;
        }
        for ent in self.entities.values_mut() {
            ent.state = BoundaryState::Exchanging;
        }
        Ok(())
    }

    fn poll_arrivals(
        &mut self,
        transport: &mut dyn Transport,
        op: &'static str,
    ) -> Result<bool, CommError> {
        self.ready()?;
        for ent in self.entities.values() {
            ent.expect_state(BoundaryState::Exchanging, op)?;
        }
        let mail = &mut self.mail;
        let mut all = true;
        for ent in self.entities.values_mut() {
            for (slot, link) in ent.arrived.iter_mut().zip(&ent.recvs) {
                if slot.is_none() {
                    *slot = match link.route {
                        Route::Local => mail
                            .get_mut(&(ent.block, link.from))
                            .and_then(VecDeque::pop_front),
                        Route::Remote { tag, .. } => transport.poll(tag),
                    };
                }
                if slot.is_none() {
                    all = false;
                }
            }
        }
        Ok(all)
    }

    /// Blocking collection of every expected buffer; entities move to
    /// `Complete`. Returns `(block, [(from, receiving face, payload)])`
    /// in entity order.
    fn wait_all(
        &mut self,
        transport: &mut dyn Transport,
    ) -> Result<Vec<(BlockId, Vec<(BlockId, Face, Vec<f64>)>)>, CommError> {
        self.ready()?;
        for ent in self.entities.values() {
            ent.expect_state(BoundaryState::Exchanging, "receive_and_set_boundaries_with_wait")?;
        }
        let mail = &mut self.mail;
        let mut out = Vec::with_capacity(self.entities.len());
        for ent in self.entities.values_mut() {
            let mut got = Vec::with_capacity(ent.recvs.len());
            for (slot, link) in ent.arrived.iter_mut().zip(&ent.recvs) {
                let payload = match slot.take() {
                    Some(p) => p,
                    None => match link.route {
                        // begin_sending ran set-wide, so every local
                        // buffer is already in the mailbox.
                        Route::Local => mail
                            .get_mut(&(ent.block, link.from))
                            .and_then(VecDeque::pop_front)
                            .expect("local boundary buffer posted before wait"),
                        Route::Remote { tag, .. } => transport.wait(tag)?,
                    },
                };
                got.push((link.from, link.face, payload));
            }
            ent.state = BoundaryState::Complete;
            out.push((ent.block, got));
        }
        Ok(out)
    }

    fn clear(&mut self, phase: ExchangePhase) -> Result<(), CommError> {
        self.ready()?;
        for ent in self.entities.values() {
            match (ent.state, ent.phase) {
                (BoundaryState::Idle, _) | (_, None) => {
                    return Err(CommError::IllegalTransition {
                        op: "clear_boundary",
                        state: ent.state.name(),
                    });
                }
                (_, Some(p)) if p != phase => {
                    return Err(CommError::PhaseMismatch {
                        started: p.name(),
                        cleared: phase.name(),
                    });
                }
                _ => {}
            }
        }
        for ent in self.entities.values_mut() {
            ent.state = BoundaryState::Idle;
            ent.phase = None;
            ent.arrived.clear();
        }
        self.mail.clear();
        Ok(())
    }

    fn state_of(&self, block: BlockId) -> Option<BoundaryState> {
        self.entities.get(&block).map(|e| e.state)
    }
}

// ── Field exchange ──────────────────────────────────────────────

fn pack_field_strip(block: &Block, face: Face) -> Vec<f64> {
    let r = block.extents.send_range(face);
    let cells = block.extents.strip_len(face);
    let nvars: usize = block.fields.iter().map(|(_, a)| a.nvar()).sum();
    let mut buf = vec![0.0; nvars * cells];
    let mut off = 0;
    for (_, arr) in block.fields.iter() {
        pack_vars(
            arr,
            &mut buf,
            CellRange::new(0, arr.nvar() - 1),
            r[2],
            r[1],
            r[0],
            &mut off,
        );
    }
    buf
}

fn unpack_field_strip(block: &mut Block, face: Face, payload: &[f64]) -> Result<(), CommError> {
    let r = block.extents.recv_range(face);
    let cells: usize = r.iter().map(CellRange::len).product();
    let nvars: usize = block.fields.iter().map(|(_, a)| a.nvar()).sum();
    if payload.len() != nvars * cells {
        return Err(CommError::SizeMismatch {
            expected: nvars * cells,
            got: payload.len(),
        });
    }
    let mut off = 0;
    for (_, arr) in block.fields.iter_mut() {
        let vr = CellRange::new(0, arr.nvar() - 1);
        unpack_vars(payload, arr, vr, r[2], r[1], r[0], &mut off);
    }
    Ok(())
}

/// The boundary phase machine over every field container on a process.
///
/// Every field array must be allocated to its block's full (real +
/// ghost) extents, and neighboring blocks must carry the same variable
/// schema; both are preconditions checked upstream by problem setup.
#[derive(Debug, Default)]
pub struct FieldBoundarySet {
    core: BoundaryCore,
}

impl FieldBoundarySet {
    /// Create an empty set; channels are not ready until
    /// [`setup_persistent_channels`](Self::setup_persistent_channels).
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)build the per-entity channel tables for `topo`.
    ///
    /// Idempotent per topology epoch. Must be re-invoked whenever the
    /// block-to-neighbor topology changes.
    ///
    /// # Errors
    ///
    /// [`CommError::IllegalTransition`] when an exchange is still in
    /// flight, [`CommError::ReservedTag`]/[`CommError::UnknownBlock`]
    /// for a malformed topology.
    pub fn setup_persistent_channels(
        &mut self,
        topo: &Topology,
        mesh: &Mesh,
    ) -> Result<(), CommError> {
        let local: Vec<BlockId> = mesh.blocks().map(|b| b.id).collect();
        self.core.setup(topo, &local)
    }

    /// Post receive slots for `phase`. Must precede any send, globally.
    ///
    /// # Errors
    ///
    /// [`CommError::IllegalTransition`] unless every entity is idle.
    pub fn start_receiving(&mut self, phase: ExchangePhase) -> Result<(), CommError> {
        self.core.start_receiving(phase)
    }

    /// Pack and hand off every boundary strip.
    ///
    /// # Errors
    ///
    /// [`CommError::IllegalTransition`] out of order, or a transport
    /// error from a remote post.
    pub fn send_boundary_buffers(
        &mut self,
        mesh: &Mesh,
        transport: &mut dyn Transport,
    ) -> Result<(), CommError> {
        self.core.begin_sending("send_boundary_buffers")?;
        let core = &mut self.core;
        for ent in core.entities.values() {
            let block = mesh
                .block(ent.block)
                .map_err(|_| CommError::UnknownBlock { id: ent.block })?;
            for link in &ent.sends {
                let buf = pack_field_strip(block, link.face);
                match link.route {
                    Route::Local => core
                        .mail
                        .entry((link.to, ent.block))
                        .or_default()
                        .push_back(buf),
                    Route::Remote { rank, tag } => transport.post(rank, tag, buf)?,
                }
            }
        }
        Ok(())
    }

    /// Non-blocking arrival poll; returns whether everything expected
    /// has arrived. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// [`CommError::IllegalTransition`] out of order.
    pub fn receive_boundary_buffers(
        &mut self,
        transport: &mut dyn Transport,
    ) -> Result<bool, CommError> {
        self.core.poll_arrivals(transport, "receive_boundary_buffers")
    }

    /// Block until every buffer arrives, then unpack each into its
    /// destination ghost strip. The only blocking operation here.
    ///
    /// # Errors
    ///
    /// Transport errors, [`CommError::SizeMismatch`] for a malformed
    /// payload, [`CommError::IllegalTransition`] out of order.
    pub fn receive_and_set_boundaries_with_wait(
        &mut self,
        mesh: &mut Mesh,
        transport: &mut dyn Transport,
    ) -> Result<(), CommError> {
        let arrived = self.core.wait_all(transport)?;
        for (block_id, payloads) in arrived {
            let block = mesh
                .block_mut(block_id)
                .map_err(|_| CommError::UnknownBlock { id: block_id })?;
            for (_, face, payload) in payloads {
                unpack_field_strip(block, face, &payload)?;
            }
        }
        Ok(())
    }

    /// Release phase-scoped buffers and return every entity to idle.
    /// Exactly once per [`start_receiving`](Self::start_receiving), on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// [`CommError::IllegalTransition`] when nothing is in flight,
    /// [`CommError::PhaseMismatch`] for the wrong phase.
    pub fn clear_boundary(&mut self, phase: ExchangePhase) -> Result<(), CommError> {
        self.core.clear(phase)
    }

    /// Current state of one entity, for diagnostics and tests.
    pub fn state_of(&self, block: BlockId) -> Option<BoundaryState> {
        self.core.state_of(block)
    }
}

// ── Swarm exchange ──────────────────────────────────────────────

fn absorb_swarm_payload(block: &mut Block, payload: &[f64]) -> Result<(), CommError> {
    let mut pos = 0;
    for swarm in block.swarms.iter_mut() {
        if pos >= payload.len() {
            return Err(CommError::SizeMismatch {
                expected: pos + 1,
                got: payload.len(),
            });
        }
        let count = payload[pos] as usize;
        pos += 1;
        let n = count * swarm.n_attrs();
        if payload.len() < pos + n {
            return Err(CommError::SizeMismatch {
                expected: pos + n,
                got: payload.len(),
            });
        }
        swarm.immigrate(count, &payload[pos..pos + n]);
        pos += n;
    }
    if pos != payload.len() {
        return Err(CommError::SizeMismatch {
            expected: pos,
            got: payload.len(),
        });
    }
    Ok(())
}

/// The boundary phase machine over every swarm container on a process.
///
/// A send moves every departure-marked particle to its destination
/// block: attributes travel particle-major, one `[count, data..]`
/// segment per swarm in container order. Neighboring blocks must carry
/// the same swarm schema. Source indices are invalidated by the
/// swap-removal — nothing may hold particle indices across an exchange.
#[derive(Debug, Default)]
pub struct SwarmBoundarySet {
    core: BoundaryCore,
}

impl SwarmBoundarySet {
    /// Create an empty set; channels are not ready until
    /// [`setup_persistent_channels`](Self::setup_persistent_channels).
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)build the per-entity channel tables for `topo`. Idempotent
    /// per topology epoch.
    ///
    /// # Errors
    ///
    /// As for [`FieldBoundarySet::setup_persistent_channels`].
    pub fn setup_persistent_channels(
        &mut self,
        topo: &Topology,
        mesh: &Mesh,
    ) -> Result<(), CommError> {
        let local: Vec<BlockId> = mesh.blocks().map(|b| b.id).collect();
        self.core.setup(topo, &local)
    }

    /// Post receive slots for `phase`. Must precede any send, globally.
    ///
    /// # Errors
    ///
    /// [`CommError::IllegalTransition`] unless every entity is idle.
    pub fn start_receiving(&mut self, phase: ExchangePhase) -> Result<(), CommError> {
        self.core.start_receiving(phase)
    }

    /// Extract departing particles and hand them to their destinations.
    /// Every send link gets a buffer, empty segments included, so the
    /// receive side always knows how many buffers to expect.
    ///
    /// # Errors
    ///
    /// [`CommError::UnknownBlock`] for a departure to a non-neighbor,
    /// [`CommError::IllegalTransition`] out of order, or a transport
    /// error.
    pub fn send_boundary_buffers(
        &mut self,
        mesh: &mut Mesh,
        transport: &mut dyn Transport,
    ) -> Result<(), CommError> {
        self.core.begin_sending("send_boundary_buffers")?;
        let core = &mut self.core;
        for ent in core.entities.values() {
            let block = mesh
                .block_mut(ent.block)
                .map_err(|_| CommError::UnknownBlock { id: ent.block })?;
            let n_swarms = block.swarms.len();

            // Gather departures per destination, one slot per swarm.
            let mut outgoing: IndexMap<BlockId, Vec<(usize, Vec<f64>)>> = IndexMap::new();
            for (s_idx, swarm) in block.swarms.iter_mut().enumerate() {
                for d in swarm.emigrate() {
                    let slots = outgoing
                        .entry(d.dest)
                        .or_insert_with(|| vec![(0, Vec::new()); n_swarms]);
                    slots[s_idx] = (d.count, d.data);
                }
            }
            for &dest in outgoing.keys() {
                if !ent.sends.iter().any(|l| l.to == dest) {
                    return Err(CommError::UnknownBlock { id: dest });
                }
            }

            for link in &ent.sends {
                let slots = outgoing
                    .shift_remove(&link.to)
                    .unwrap_or_else(|| vec![(0, Vec::new()); n_swarms]);
                let mut buf = Vec::new();
                for (count, data) in slots {
                    buf.push(count as f64);
                    buf.extend(data);
                }
                match link.route {
                    Route::Local => core
                        .mail
                        .entry((link.to, ent.block))
                        .or_default()
                        .push_back(buf),
                    Route::Remote { rank, tag } => transport.post(rank, tag, buf)?,
                }
            }
        }
        Ok(())
    }

    /// Non-blocking arrival poll; returns whether everything expected
    /// has arrived. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// [`CommError::IllegalTransition`] out of order.
    pub fn receive_boundary_buffers(
        &mut self,
        transport: &mut dyn Transport,
    ) -> Result<bool, CommError> {
        self.core.poll_arrivals(transport, "receive_boundary_buffers")
    }

    /// Block until every buffer arrives, then append the arriving
    /// particles to their swarms. The only blocking operation here.
    ///
    /// # Errors
    ///
    /// Transport errors, [`CommError::SizeMismatch`] for a malformed
    /// payload, [`CommError::IllegalTransition`] out of order.
    pub fn receive_and_set_boundaries_with_wait(
        &mut self,
        mesh: &mut Mesh,
        transport: &mut dyn Transport,
    ) -> Result<(), CommError> {
        let arrived = self.core.wait_all(transport)?;
        for (block_id, payloads) in arrived {
            let block = mesh
                .block_mut(block_id)
                .map_err(|_| CommError::UnknownBlock { id: block_id })?;
            for (_, _, payload) in payloads {
                absorb_swarm_payload(block, &payload)?;
            }
        }
        Ok(())
    }

    /// Release phase-scoped buffers and return every entity to idle.
    /// Exactly once per [`start_receiving`](Self::start_receiving), on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// As for [`FieldBoundarySet::clear_boundary`].
    pub fn clear_boundary(&mut self, phase: ExchangePhase) -> Result<(), CommError> {
        self.core.clear(phase)
    }

    /// Current state of one entity, for diagnostics and tests.
    pub fn state_of(&self, block: BlockId) -> Option<BoundaryState> {
        self.core.state_of(block)
    }
}
