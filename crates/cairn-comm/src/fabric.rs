//! The rank substrate: persistent channels and the minimum-reduction.
//!
//! [`Fabric::connect`] wires `n` ranks together with crossbeam channels,
//! one [`Endpoint`] per rank. Endpoints are `Send`, so a multi-rank
//! world runs as one thread per rank inside a single test process — the
//! same shape the production launcher gets from one OS process per rank.
//!
//! Message matching is by [`ChannelTag`]. An endpoint's merged inbox is
//! drained into a tag-keyed store on every poll/wait, so out-of-order
//! arrivals for other tags are parked rather than lost.

use std::collections::VecDeque;

use cairn_core::{ChannelTag, CommError, Rank, SetupError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use indexmap::IndexMap;

/// One in-flight transfer buffer with its matching metadata.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Sending rank.
    pub from: Rank,
    /// Channel tag for receive-side matching.
    pub tag: ChannelTag,
    /// The transfer buffer; ownership moves with the envelope.
    pub payload: Vec<f64>,
}

/// Persistent, reusable, non-blocking point-to-point channels with an
/// explicit completion query ([`poll`](Transport::poll)) and an explicit
/// blocking wait ([`wait`](Transport::wait)).
pub trait Transport {
    /// This endpoint's rank.
    fn rank(&self) -> Rank;

    /// Hand a transfer buffer to the channel layer. Non-blocking;
    /// ownership of the payload transfers on success.
    ///
    /// # Errors
    ///
    /// [`CommError::RankOutOfRange`] for an unknown destination,
    /// [`CommError::ChannelClosed`] when the peer has gone away.
    fn post(&mut self, to: Rank, tag: ChannelTag, payload: Vec<f64>) -> Result<(), CommError>;

    /// Take the next arrived buffer for `tag`, if any. Non-blocking and
    /// side-effect free beyond arrival bookkeeping — safe to call
    /// repeatedly.
    fn poll(&mut self, tag: ChannelTag) -> Option<Vec<f64>>;

    /// Block until a buffer for `tag` arrives and take it.
    ///
    /// # Errors
    ///
    /// [`CommError::ChannelClosed`] when every peer sender has been
    /// dropped and nothing further can arrive.
    fn wait(&mut self, tag: ChannelTag) -> Result<Vec<f64>, CommError>;
}

/// Blocking barrier-style minimum-reduction over all ranks.
pub trait Collective {
    /// Reduce `local` to the global minimum. Every rank observes the
    /// bit-identical result.
    ///
    /// # Errors
    ///
    /// [`CommError::ChannelClosed`] when a peer exits mid-collective.
    fn min_reduce(&mut self, local: f64) -> Result<f64, CommError>;
}

/// Builder for an in-process world of connected ranks.
pub struct Fabric;

impl Fabric {
    /// Connect `n` ranks; returns one endpoint per rank, in rank order.
    ///
    /// # Errors
    ///
    /// [`SetupError::Fabric`] for an empty world.
    pub fn connect(n: usize) -> Result<Vec<Endpoint>, SetupError> {
        if n == 0 {
            return Err(SetupError::Fabric {
                reason: "world must have at least one rank".to_string(),
            });
        }
        let n32 = u32::try_from(n).map_err(|_| SetupError::Fabric {
            reason: format!("world of {n} ranks exceeds u32::MAX"),
        })?;

        let (txs, rxs): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..n).map(|_| unbounded()).unzip();

        Ok(rxs
            .into_iter()
            .enumerate()
            .map(|(rank, rx)| Endpoint {
                rank: Rank(rank as u32),
                world: n32,
                peers: txs.clone(),
                rx,
                inbox: IndexMap::new(),
                reduce_seq: 0,
            })
            .collect())
    }
}

/// One rank's attachment to the fabric.
///
/// Holds a sender to every peer (itself included, for loopback) and its
/// own merged receiver. Not `Sync`: exactly one control thread per rank
/// drives it, matching the one-thread-per-process scheduling model.
pub struct Endpoint {
    rank: Rank,
    world: u32,
    peers: Vec<Sender<Envelope>>,
    rx: Receiver<Envelope>,
    inbox: IndexMap<ChannelTag, VecDeque<Vec<f64>>>,
    reduce_seq: u64,
}

impl Endpoint {
    /// Number of ranks in the world.
    pub fn world_size(&self) -> u32 {
        self.world
    }

    /// Park everything currently queued into the tag-keyed inbox.
    fn drain(&mut self) {
        while let Ok(env) = self.rx.try_recv() {
            self.inbox.entry(env.tag).or_default().push_back(env.payload);
        }
    }

    fn take(&mut self, tag: ChannelTag) -> Option<Vec<f64>> {
        self.inbox.get_mut(&tag).and_then(VecDeque::pop_front)
    }
}

impl Transport for Endpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn post(&mut self, to: Rank, tag: ChannelTag, payload: Vec<f64>) -> Result<(), CommError> {
        let Some(sender) = self.peers.get(to.0 as usize) else {
            return Err(CommError::RankOutOfRange {
                rank: to,
                world: self.world,
            });
        };
        sender
            .send(Envelope {
                from: self.rank,
                tag,
                payload,
            })
            .map_err(|_| CommError::ChannelClosed { rank: to })
    }

    fn poll(&mut self, tag: ChannelTag) -> Option<Vec<f64>> {
        self.drain();
        self.take(tag)
    }

    fn wait(&mut self, tag: ChannelTag) -> Result<Vec<f64>, CommError> {
        loop {
            self.drain();
            if let Some(payload) = self.take(tag) {
                return Ok(payload);
            }
            match self.rx.recv() {
                Ok(env) => {
                    self.inbox.entry(env.tag).or_default().push_back(env.payload);
                }
                Err(_) => {
                    return Err(CommError::ChannelClosed { rank: self.rank });
                }
            }
        }
    }
}

impl Collective for Endpoint {
    /// All-to-all exchange on a reserved tag: every rank sends its value
    /// to every peer, folds the world's values in rank order, and lands
    /// on the identical minimum. The per-endpoint sequence number keeps
    /// successive reductions from cross-matching; ranks execute
    /// reductions in the same program order, so sequences agree.
    fn min_reduce(&mut self, local: f64) -> Result<f64, CommError> {
        let tag = ChannelTag(ChannelTag::RESERVED_BASE + self.reduce_seq);
        self.reduce_seq += 1;

        for peer in 0..self.world {
            if peer != self.rank.0 {
                self.post(Rank(peer), tag, vec![local])?;
            }
        }

        let mut acc = local;
        for _ in 1..self.world {
            let payload = self.wait(tag)?;
            acc = acc.min(payload[0]);
        }
        Ok(acc)
    }
}

/// Degenerate collective for a single-process world.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoloCollective;

impl Collective for SoloCollective {
    fn min_reduce(&mut self, local: f64) -> Result<f64, CommError> {
        Ok(local)
    }
}
