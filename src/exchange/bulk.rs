//! Batched bulk all-to-all row exchange with adaptive receive-buffer growth.

use bytes::Bytes;
use tracing::{debug, info};

use crate::config::ExchangeConfig;
use crate::error::{CollectiveError, Result};
use crate::exchange::collectives::Collectives;
use crate::storage::row_table::RowTable;
use crate::types::{FixedWidth, ProcessId};

/// Per-destination staging buffers paired with one contiguous receive
/// buffer, implementing a variable-size all-to-all transfer.
///
/// Rows are appended to the staging buffer of their destination between
/// exchanges; [`communicate`](Self::communicate) negotiates byte counts,
/// grows the receive buffer to exactly the incoming volume when needed,
/// performs the transfer, and clears every staging buffer. Staged rows never
/// persist between exchanges.
#[derive(Debug)]
pub struct BulkExchangePair<R> {
    /// One staging table per destination rank.
    send: Vec<RowTable<R>>,

    /// Contiguous receive buffer; its high-water mark after an exchange is
    /// exactly the number of rows received in that exchange.
    recv: RowTable<R>,

    /// Rows sent per destination in the last exchange.
    last_send_counts: Vec<usize>,

    /// Rows received in the last exchange.
    last_recv_count: usize,
}

impl<R: FixedWidth + Default> BulkExchangePair<R> {
    /// Create staging and receive buffers for a group of `n_ranks`.
    pub fn new(n_ranks: usize, config: &ExchangeConfig) -> Self {
        let send = (0..n_ranks)
            .map(|_| RowTable::new(config.init_capacity_per_peer, config.growth_factor))
            .collect();
        Self {
            send,
            // the receive buffer is sized exactly on demand, so it starts
            // with the same estimate but grows without padding
            recv: RowTable::new(config.init_capacity_per_peer * n_ranks, 0.0),
            last_send_counts: vec![0; n_ranks],
            last_recv_count: 0,
        }
    }

    /// Stage a row for delivery to `dest` in the next exchange.
    pub fn stage(&mut self, dest: ProcessId, row: R) {
        self.send[dest].push(row);
    }

    /// The staging table for `dest`.
    pub fn send_table(&self, dest: ProcessId) -> &RowTable<R> {
        &self.send[dest]
    }

    /// The receive buffer, holding the rows delivered by the last exchange.
    pub fn recv(&self) -> &RowTable<R> {
        &self.recv
    }

    /// Rows sent per destination in the last exchange.
    pub fn last_send_counts(&self) -> &[usize] {
        &self.last_send_counts
    }

    /// Rows received in the last exchange.
    pub fn last_recv_count(&self) -> usize {
        self.last_recv_count
    }

    /// Perform the variable-length bulk all-to-all transfer.
    ///
    /// Any allocation divergence or structural transfer failure is fatal for
    /// the whole run; the verdicts are AND-reduced so every rank observes
    /// the failure. Insufficient receive capacity is not an error: the
    /// buffer grows to exactly the negotiated volume.
    pub fn communicate<C: Collectives>(&mut self, comm: &C) -> Result<()> {
        let n = comm.n_ranks();
        let me = comm.rank();
        debug_assert_eq!(self.send.len(), n, "staging buffers per rank");

        // negotiate per-source incoming byte counts
        for (count, table) in self.last_send_counts.iter_mut().zip(&self.send) {
            *count = table.hwm();
        }
        let send_bytes: Vec<u64> = self
            .send
            .iter()
            .map(|table| table.used_bytes() as u64)
            .collect();
        let recv_bytes = comm.all_to_all(&send_bytes)?;
        let total_bytes: u64 = recv_bytes.iter().sum();
        let incoming_rows = (total_bytes / R::WIDTH as u64) as usize;

        // the receive buffer never carries rows between exchanges
        self.recv.clear()?;
        if incoming_rows > self.recv.capacity() {
            info!(
                incoming_rows,
                old_capacity = self.recv.capacity(),
                "growing receive buffer to the negotiated transfer volume"
            );
            self.recv.resize_exact(incoming_rows);
        }
        let alloc_ok = self.recv.capacity() >= incoming_rows;
        if !comm.all_agree(alloc_ok)? {
            return Err(if alloc_ok {
                CollectiveError::PeerInconsistency.into()
            } else {
                CollectiveError::BufferUnallocated.into()
            });
        }

        let segments: Vec<Bytes> = self.send.iter().map(RowTable::encode).collect();
        let self_sent = segments[me].clone();
        let received = comm.all_to_all_bytes(segments)?;

        // unpack in source order; each segment must land at the displacement
        // implied by the prefix sum of the negotiated counts
        let mut displacement = 0u64;
        for (source, segment) in received.iter().enumerate() {
            if segment.len() as u64 != recv_bytes[source] {
                return Err(CollectiveError::SizeMismatch {
                    source_rank: source,
                    expected: recv_bytes[source] as usize,
                    got: segment.len(),
                }
                .into());
            }
            let first = self.recv.decode_extend(segment);
            debug_assert_eq!(
                first as u64 * R::WIDTH as u64,
                displacement,
                "segment landed off its displacement"
            );
            displacement += segment.len() as u64;
        }
        debug_assert_eq!(self.recv.hwm(), incoming_rows);

        // structural check: bytes this rank addressed to itself must come
        // back unchanged in its own receive segment
        let echo_ok = received[me] == self_sent;
        if !comm.all_agree(echo_ok)? {
            return Err(if echo_ok {
                CollectiveError::PeerInconsistency.into()
            } else {
                CollectiveError::SelfEchoMismatch {
                    sent_bytes: self_sent.len(),
                    received_bytes: received[me].len(),
                }
                .into()
            });
        }

        self.last_recv_count = incoming_rows;
        debug!(
            sent = self.last_send_counts.iter().sum::<usize>(),
            received = incoming_rows,
            "bulk exchange complete"
        );
        for table in &mut self.send {
            table.clear()?;
        }
        Ok(())
    }
}
